//! OpenTelemetry export
//!
//! Enabled when the `telemetry` feature is compiled in and
//! `OTEL_EXPORTER_OTLP_ENDPOINT` is set.
//!
//! ```text
//! OTEL_EXPORTER_OTLP_ENDPOINT=http://localhost:4317 \
//! OTEL_SERVICE_NAME=commandeer-dev \
//!     ./commandeer
//! ```

use anyhow::Result;

const DEFAULT_SERVICE_NAME: &str = "commandeer";

/// Configured OTLP endpoint, if any
pub fn endpoint() -> Option<String> {
    std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT")
        .ok()
        .filter(|e| !e.trim().is_empty())
}

fn service_name() -> String {
    std::env::var("OTEL_SERVICE_NAME").unwrap_or_else(|_| DEFAULT_SERVICE_NAME.to_string())
}

/// Tracing layer exporting spans over OTLP, or `None` when not configured
#[cfg(feature = "telemetry")]
pub fn otel_layer<S>(
) -> Result<Option<tracing_opentelemetry::OpenTelemetryLayer<S, opentelemetry_sdk::trace::Tracer>>>
where
    S: tracing::Subscriber + for<'span> tracing_subscriber::registry::LookupSpan<'span>,
{
    use opentelemetry::trace::TracerProvider as _;
    use opentelemetry::KeyValue;
    use opentelemetry_otlp::WithExportConfig;
    use opentelemetry_sdk::Resource;

    let Some(endpoint) = endpoint() else {
        return Ok(None);
    };
    let service_name = service_name();

    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_tonic()
        .with_endpoint(endpoint)
        .build()?;
    let provider = opentelemetry_sdk::trace::TracerProvider::builder()
        .with_batch_exporter(exporter, opentelemetry_sdk::runtime::Tokio)
        .with_resource(Resource::new(vec![KeyValue::new(
            "service.name",
            service_name.clone(),
        )]))
        .build();
    let tracer = provider.tracer(service_name);
    opentelemetry::global::set_tracer_provider(provider);

    Ok(Some(tracing_opentelemetry::layer().with_tracer(tracer)))
}

#[cfg(not(feature = "telemetry"))]
pub fn otel_layer() -> Result<Option<tracing_subscriber::layer::Identity>> {
    Ok(None)
}

/// Report what happened to telemetry once logging is up
pub fn log_status(enabled: bool) {
    match (endpoint(), enabled) {
        (Some(endpoint), true) => {
            tracing::info!(endpoint = %endpoint, service_name = %service_name(), "OpenTelemetry export enabled")
        }
        (Some(_), false) => {
            tracing::warn!("OpenTelemetry endpoint set but feature 'telemetry' not enabled");
            tracing::warn!("Rebuild with: cargo build --features telemetry");
        }
        (None, _) => tracing::debug!("OpenTelemetry not configured"),
    }
}
