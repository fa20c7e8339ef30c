//! Command bus against real child processes
//!
//! Uses `/bin/sh` so the scripts run on any unix host.

#![cfg(unix)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use commandeer_core::application::CommandBus;
use commandeer_core::config::BusConfig;
use commandeer_core::domain::{CommandError, CommandResult, Priority};
use commandeer_core::port::time_provider::SystemTimeProvider;
use commandeer_core::port::{ExitCodeHintTable, NoExitCodeHints};
use commandeer_infra_system::{is_process_alive, ProcessRunner};

const SH: &str = "/bin/sh";

fn bus(max_concurrent: usize) -> CommandBus {
    let config = BusConfig {
        max_concurrent,
        ..BusConfig::default()
    };
    CommandBus::new(
        config,
        Arc::new(ProcessRunner::new()),
        Arc::new(NoExitCodeHints),
        Arc::new(SystemTimeProvider),
    )
    .unwrap()
}

fn script(body: &str) -> Vec<String> {
    vec!["-c".to_string(), body.to_string()]
}

#[tokio::test]
async fn test_real_command_success() {
    let bus = bus(2);
    let result = bus
        .submit_and_wait(SH, script("echo hello; echo warn >&2"), Priority::Normal, None)
        .await;

    assert!(result.success, "{}", result.message());
    assert_eq!(result.output, "hello\nwarn");
    assert_eq!(result.message(), "hello\nwarn");
    assert_eq!(bus.history().len(), 1);
}

#[tokio::test]
async fn test_timeout_terminates_process() {
    let dir = tempfile::tempdir().unwrap();
    let pid_file = dir.path().join("pid");
    let body = format!("echo $$ > {}; exec sleep 30", pid_file.display());

    let bus = bus(1);
    let started = Instant::now();
    let result = bus
        .submit_and_wait(SH, script(&body), Priority::High, Some(Duration::from_millis(300)))
        .await;

    assert!(!result.success);
    assert!(started.elapsed() < Duration::from_secs(10));
    assert_eq!(
        result.failure,
        Some(CommandError::TimedOut { secs: 0.3 })
    );
    assert!(result.message().contains("0.3 seconds"));

    let pid: u32 = std::fs::read_to_string(&pid_file)
        .unwrap()
        .trim()
        .parse()
        .unwrap();
    assert!(!is_process_alive(pid), "process {} still running", pid);
    assert_eq!(bus.active_count(), 0);
}

#[tokio::test]
async fn test_missing_executable_never_queues() {
    let bus = bus(1);
    let seen: Arc<Mutex<Vec<CommandResult>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    bus.submit(
        "/no/such/binary",
        vec![],
        Priority::Critical,
        None,
        move |result| sink.lock().unwrap().push(result),
    );

    // Delivered before submit returned
    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    assert!(matches!(
        seen[0].failure,
        Some(CommandError::ExecutableNotFound(_))
    ));
    assert_eq!(bus.queue_len(), 0);
}

#[tokio::test]
async fn test_non_zero_exit_with_hint() {
    let mut hints = HashMap::new();
    hints.insert("3".to_string(), "Backend reported a locked instance".to_string());
    let bus = CommandBus::new(
        BusConfig::default(),
        Arc::new(ProcessRunner::new()),
        Arc::new(ExitCodeHintTable::from_config(&hints)),
        Arc::new(SystemTimeProvider),
    )
    .unwrap();

    let result = bus
        .submit_and_wait(SH, script("echo partial; echo locked >&2; exit 3"), Priority::Normal, None)
        .await;

    assert!(!result.success);
    assert_eq!(result.return_code, Some(3));
    assert_eq!(
        result.message(),
        "Command failed (return code: 3)\nBackend reported a locked instance\nError: locked\nOutput: partial"
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_priority_order_with_single_slot() {
    let bus = bus(1);
    let order = Arc::new(Mutex::new(Vec::new()));
    let (done_tx, mut done_rx) = tokio::sync::mpsc::unbounded_channel();

    // Occupies the only slot while the rest queue up
    let blocker_tx = done_tx.clone();
    bus.submit(SH, script("sleep 0.3"), Priority::Low, None, move |_| {
        let _ = blocker_tx.send(());
    });

    for (label, priority) in [
        ("low", Priority::Low),
        ("normal", Priority::Normal),
        ("critical", Priority::Critical),
        ("high", Priority::High),
    ] {
        let order = Arc::clone(&order);
        let tx = done_tx.clone();
        bus.submit(
            SH,
            script(&format!("echo {}", label)),
            priority,
            None,
            move |result| {
                order.lock().unwrap().push(result.output);
                let _ = tx.send(());
            },
        );
    }

    for _ in 0..5 {
        tokio::time::timeout(Duration::from_secs(10), done_rx.recv())
            .await
            .unwrap();
    }
    assert_eq!(
        order.lock().unwrap().as_slice(),
        &["critical", "high", "normal", "low"]
    );
}

#[tokio::test]
async fn test_cancel_running_command() {
    let bus = bus(1);
    let (tx, rx) = tokio::sync::oneshot::channel();
    let id = bus.submit(SH, script("sleep 30"), Priority::Normal, None, move |result| {
        let _ = tx.send(result);
    });
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(bus.cancel(&id));

    let result = tokio::time::timeout(Duration::from_secs(10), rx)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(result.failure, Some(CommandError::Cancelled));
    assert!(!bus.cancel(&id));
}
