// Panic isolation for callbacks and task payloads
use std::any::Any;
use std::panic::{catch_unwind, UnwindSafe};
use tracing::error;

/// Result of a panic-guarded execution
#[derive(Debug)]
pub enum PanicGuardResult<T> {
    /// Execution completed successfully
    Success(T),
    /// Execution panicked
    Panicked(String),
}

/// Execute a closure with panic isolation
///
/// If the closure panics, the panic is caught and returned as
/// `PanicGuardResult::Panicked`, so a faulty completion callback cannot
/// take the dispatching task down with it.
///
/// # Example
/// ```text
/// let result = execute_guarded(|| panic!("test panic"));
/// assert!(matches!(result, PanicGuardResult::Panicked(_)));
/// ```
pub fn execute_guarded<F, T>(f: F) -> PanicGuardResult<T>
where
    F: FnOnce() -> T + UnwindSafe,
{
    match catch_unwind(f) {
        Ok(result) => PanicGuardResult::Success(result),
        Err(payload) => {
            let panic_msg = panic_message(payload.as_ref());
            error!(panic_msg = %panic_msg, "Guarded closure panicked");
            PanicGuardResult::Panicked(panic_msg)
        }
    }
}

/// Extract a readable message from a panic payload
///
/// Also used on `JoinError::into_panic()` payloads from spawned tasks.
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "Unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_passes_through() {
        match execute_guarded(|| 7) {
            PanicGuardResult::Success(v) => assert_eq!(v, 7),
            PanicGuardResult::Panicked(msg) => panic!("unexpected panic: {}", msg),
        }
    }

    #[test]
    fn test_panic_is_caught_with_message() {
        let result: PanicGuardResult<()> = execute_guarded(|| panic!("callback exploded"));
        match result {
            PanicGuardResult::Panicked(msg) => assert_eq!(msg, "callback exploded"),
            PanicGuardResult::Success(_) => panic!("panic was not caught"),
        }
    }

    #[test]
    fn test_formatted_panic_message() {
        let result: PanicGuardResult<()> = execute_guarded(|| panic!("code {}", 3));
        assert!(matches!(result, PanicGuardResult::Panicked(msg) if msg == "code 3"));
    }
}
