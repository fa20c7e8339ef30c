// Command Runner Port
// Abstraction over spawning one external process to completion

use crate::domain::{CommandResult, CommandSpec, StopToken};
use async_trait::async_trait;
use std::path::Path;

/// Runs a single external command.
///
/// Implementations never fail: every outcome (spawn failure, crash,
/// timeout, cancellation, non-zero exit) is folded into the returned
/// `CommandResult`.
///
/// Implementations:
/// - ProcessRunner: tokio child process (infra-system)
/// - MockCommandRunner: scripted results for tests
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Whether `path` references an existing executable file
    fn executable_exists(&self, path: &Path) -> bool {
        path.is_file()
    }

    /// Spawn, wait for exit or timeout, and collect output.
    ///
    /// When `cancel` fires the child must be terminated and a
    /// `CommandError::Cancelled` result returned.
    async fn run(&self, spec: &CommandSpec, cancel: StopToken) -> CommandResult;
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use crate::domain::CommandError;
    use std::collections::HashSet;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::{Duration, Instant};

    /// Mock runner behavior
    #[derive(Debug, Clone)]
    pub enum MockRunBehavior {
        /// Exit 0 with the given stdout
        Succeed(String),
        /// Exit with a code and stderr
        Exit { code: i32, stderr: String },
        /// Never exit on its own (only timeout or cancel end it)
        Hang,
    }

    /// Mock Command Runner for testing
    ///
    /// Every path exists unless marked missing. Records the order in which
    /// commands started and the peak number of simultaneous runs.
    pub struct MockCommandRunner {
        delay: Duration,
        behavior: Mutex<MockRunBehavior>,
        missing: Mutex<HashSet<PathBuf>>,
        calls: Mutex<Vec<CommandSpec>>,
        running: AtomicUsize,
        peak: AtomicUsize,
    }

    impl MockCommandRunner {
        pub fn new(behavior: MockRunBehavior, delay: Duration) -> Self {
            Self {
                delay,
                behavior: Mutex::new(behavior),
                missing: Mutex::new(HashSet::new()),
                calls: Mutex::new(Vec::new()),
                running: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
            }
        }

        pub fn new_success() -> Self {
            Self::new(MockRunBehavior::Succeed("mock output".to_string()), Duration::ZERO)
        }

        pub fn with_delay(delay: Duration) -> Self {
            Self::new(MockRunBehavior::Succeed("mock output".to_string()), delay)
        }

        pub fn set_behavior(&self, behavior: MockRunBehavior) {
            *self.behavior.lock().unwrap() = behavior;
        }

        pub fn mark_missing(&self, path: impl Into<PathBuf>) {
            self.missing.lock().unwrap().insert(path.into());
        }

        /// Specs in the order they started running
        pub fn calls(&self) -> Vec<CommandSpec> {
            self.calls.lock().unwrap().clone()
        }

        /// First argument of each started command, in start order
        pub fn started_labels(&self) -> Vec<String> {
            self.calls()
                .iter()
                .map(|spec| spec.args.first().cloned().unwrap_or_default())
                .collect()
        }

        pub fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }

        pub fn peak_concurrency(&self) -> usize {
            self.peak.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl CommandRunner for MockCommandRunner {
        fn executable_exists(&self, path: &Path) -> bool {
            !self.missing.lock().unwrap().contains(path)
        }

        async fn run(&self, spec: &CommandSpec, mut cancel: StopToken) -> CommandResult {
            self.calls.lock().unwrap().push(spec.clone());
            let now_running = self.running.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now_running, Ordering::SeqCst);

            let started = Instant::now();
            let behavior = self.behavior.lock().unwrap().clone();
            let hang = matches!(behavior, MockRunBehavior::Hang);
            let delay = self.delay;
            let work = async move {
                if hang {
                    std::future::pending::<()>().await;
                }
                tokio::time::sleep(delay).await;
            };

            let result = tokio::select! {
                _ = work => match behavior {
                    MockRunBehavior::Succeed(out) => {
                        CommandResult::from_exit(0, out, String::new(), started.elapsed())
                    }
                    MockRunBehavior::Exit { code, stderr } => {
                        CommandResult::from_exit(code, String::new(), stderr, started.elapsed())
                    }
                    MockRunBehavior::Hang => CommandResult::cancelled(started.elapsed()),
                },
                _ = tokio::time::sleep(spec.timeout) => CommandResult::failed(
                    CommandError::TimedOut { secs: spec.timeout.as_secs_f64() },
                    String::new(),
                    String::new(),
                    started.elapsed(),
                ),
                _ = cancel.wait() => CommandResult::cancelled(started.elapsed()),
            };

            self.running.fetch_sub(1, Ordering::SeqCst);
            result
        }
    }
}
