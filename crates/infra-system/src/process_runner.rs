// Process runner implementation
// reason: tokio::process for async child management, nix for group signals
use async_trait::async_trait;
use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use commandeer_core::domain::{CommandError, CommandResult, CommandSpec, StopToken};
use commandeer_core::port::CommandRunner;

/// How long a terminated child gets to exit before SIGKILL
const DEFAULT_KILL_GRACE: Duration = Duration::from_millis(500);

/// How long to wait for pipe readers once the child is gone.
/// Grandchildren that inherited the pipes may keep them open.
const OUTPUT_DRAIN_TIMEOUT: Duration = Duration::from_millis(200);

/// Why a run stopped before the child exited on its own
enum Interrupt {
    Timeout,
    Cancelled,
}

/// Runs commands as child processes with piped stdout/stderr.
///
/// On unix each child leads its own process group, so a timeout or cancel
/// takes down anything it spawned as well.
pub struct ProcessRunner {
    kill_grace: Duration,
}

impl ProcessRunner {
    pub fn new() -> Self {
        Self {
            kill_grace: DEFAULT_KILL_GRACE,
        }
    }

    pub fn with_kill_grace(kill_grace: Duration) -> Self {
        Self { kill_grace }
    }

    fn build_command(spec: &CommandSpec) -> Command {
        let mut cmd = Command::new(&spec.path);
        cmd.args(&spec.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        cmd.process_group(0);
        cmd
    }

    /// SIGTERM the process group, then SIGKILL if it outlives the grace period
    async fn terminate(&self, child: &mut Child) {
        #[cfg(unix)]
        {
            use nix::sys::signal::{killpg, Signal};
            use nix::unistd::Pid;

            if let Some(pid) = child.id() {
                let group = Pid::from_raw(pid as i32);
                debug!(pid, "Sending SIGTERM to process group");
                if let Err(e) = killpg(group, Signal::SIGTERM) {
                    debug!(pid, error = %e, "SIGTERM failed");
                }
                if tokio::time::timeout(self.kill_grace, child.wait()).await.is_ok() {
                    return;
                }
                warn!(pid, "Process did not exit after SIGTERM, sending SIGKILL");
                let _ = killpg(group, Signal::SIGKILL);
            }
        }

        if let Err(e) = child.kill().await {
            debug!(error = %e, "Kill after exit");
        }
    }
}

impl Default for ProcessRunner {
    fn default() -> Self {
        Self::new()
    }
}

fn spawn_reader<R>(pipe: Option<R>) -> JoinHandle<String>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut buf = Vec::new();
        if let Some(mut pipe) = pipe {
            if let Err(e) = pipe.read_to_end(&mut buf).await {
                debug!(error = %e, "Pipe read failed");
            }
        }
        String::from_utf8_lossy(&buf).into_owned()
    })
}

async fn collect(mut reader: JoinHandle<String>) -> String {
    match tokio::time::timeout(OUTPUT_DRAIN_TIMEOUT, &mut reader).await {
        Ok(Ok(text)) => text,
        Ok(Err(_)) => String::new(),
        Err(_) => {
            reader.abort();
            String::new()
        }
    }
}

/// Map an exit status that carries no code (killed by a signal)
fn crash_reason(status: ExitStatus) -> String {
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return format!("terminated by signal {}", signal);
        }
    }
    format!("abnormal exit ({})", status)
}

#[async_trait]
impl CommandRunner for ProcessRunner {
    async fn run(&self, spec: &CommandSpec, mut cancel: StopToken) -> CommandResult {
        let started = Instant::now();
        info!(
            path = %spec.path.display(),
            args = ?spec.args,
            timeout_ms = spec.timeout.as_millis() as u64,
            "Starting process"
        );

        let mut child = match Self::build_command(spec).spawn() {
            Ok(child) => child,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return CommandResult::not_found(&spec.path);
            }
            Err(e) => {
                warn!(path = %spec.path.display(), error = %e, "Process spawn failed");
                return CommandResult::failed(
                    CommandError::SpawnFailed(e.to_string()),
                    String::new(),
                    String::new(),
                    started.elapsed(),
                );
            }
        };
        let pid = child.id();
        let stdout = spawn_reader(child.stdout.take());
        let stderr = spawn_reader(child.stderr.take());

        let waited = tokio::select! {
            status = child.wait() => Ok(status),
            _ = tokio::time::sleep(spec.timeout) => Err(Interrupt::Timeout),
            _ = cancel.wait() => Err(Interrupt::Cancelled),
        };

        let result = match waited {
            Ok(Ok(status)) => {
                let stdout = collect(stdout).await;
                let stderr = collect(stderr).await;
                match status.code() {
                    Some(code) => CommandResult::from_exit(code, stdout, stderr, started.elapsed()),
                    None => CommandResult::failed(
                        CommandError::Crashed(crash_reason(status)),
                        stdout,
                        stderr,
                        started.elapsed(),
                    ),
                }
            }
            Ok(Err(e)) => {
                self.terminate(&mut child).await;
                CommandResult::failed(
                    CommandError::Crashed(e.to_string()),
                    collect(stdout).await,
                    collect(stderr).await,
                    started.elapsed(),
                )
            }
            Err(Interrupt::Timeout) => {
                warn!(pid = ?pid, timeout_ms = spec.timeout.as_millis() as u64, "Process timed out");
                self.terminate(&mut child).await;
                CommandResult::failed(
                    CommandError::TimedOut {
                        secs: spec.timeout.as_secs_f64(),
                    },
                    collect(stdout).await,
                    collect(stderr).await,
                    started.elapsed(),
                )
            }
            Err(Interrupt::Cancelled) => {
                info!(pid = ?pid, "Process cancelled");
                self.terminate(&mut child).await;
                CommandResult::cancelled(started.elapsed())
            }
        };

        info!(
            path = %spec.path.display(),
            pid = ?pid,
            success = result.success,
            return_code = ?result.return_code,
            elapsed_ms = result.elapsed.as_millis() as u64,
            "Process finished"
        );
        result
    }
}

/// Whether a process with `pid` still exists (signal 0 probe)
#[cfg(unix)]
pub fn is_process_alive(pid: u32) -> bool {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    kill(Pid::from_raw(pid as i32), None::<Signal>).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use commandeer_core::domain::stop_channel;
    use std::path::PathBuf;

    fn sh(script: &str, timeout: Duration) -> CommandSpec {
        CommandSpec::new(
            "/bin/sh",
            vec!["-c".to_string(), script.to_string()],
            timeout,
        )
    }

    #[tokio::test]
    async fn test_success_merges_streams() {
        let runner = ProcessRunner::new();
        let (_stop, token) = stop_channel();
        let result = runner
            .run(&sh("echo out; echo err >&2", Duration::from_secs(5)), token)
            .await;

        assert!(result.success);
        assert_eq!(result.return_code, Some(0));
        assert_eq!(result.output, "out\nerr");
    }

    #[tokio::test]
    async fn test_non_zero_exit() {
        let runner = ProcessRunner::new();
        let (_stop, token) = stop_channel();
        let result = runner
            .run(&sh("echo boom >&2; exit 3", Duration::from_secs(5)), token)
            .await;

        assert!(!result.success);
        assert_eq!(result.return_code, Some(3));
        assert_eq!(result.error, "boom");
        assert_eq!(
            result.failure,
            Some(CommandError::NonZeroExit { code: 3 })
        );
    }

    #[tokio::test]
    async fn test_timeout_kills_process() {
        let runner = ProcessRunner::new();
        let (_stop, token) = stop_channel();
        let started = Instant::now();
        let result = runner
            .run(&sh("sleep 10", Duration::from_millis(200)), token)
            .await;

        assert!(!result.success);
        assert!(matches!(result.failure, Some(CommandError::TimedOut { .. })));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_cancel_stops_process() {
        let runner = ProcessRunner::new();
        let (stop, token) = stop_channel();
        let handle = tokio::spawn(async move {
            runner.run(&sh("sleep 10", Duration::from_secs(30)), token).await
        });
        tokio::time::sleep(Duration::from_millis(100)).await;
        stop.stop();

        let result = handle.await.unwrap();
        assert_eq!(result.failure, Some(CommandError::Cancelled));
    }

    #[tokio::test]
    async fn test_signal_exit_is_a_crash() {
        let runner = ProcessRunner::new();
        let (_stop, token) = stop_channel();
        let result = runner
            .run(&sh("kill -9 $$", Duration::from_secs(5)), token)
            .await;

        assert!(matches!(result.failure, Some(CommandError::Crashed(_))));
        assert_eq!(result.return_code, None);
    }

    #[tokio::test]
    async fn test_missing_binary() {
        let runner = ProcessRunner::new();
        let path = PathBuf::from("/definitely/not/here");
        assert!(!runner.executable_exists(&path));

        let (_stop, token) = stop_channel();
        let result = runner
            .run(&CommandSpec::new(path, vec![], Duration::from_secs(1)), token)
            .await;
        assert!(matches!(
            result.failure,
            Some(CommandError::ExecutableNotFound(_))
        ));
    }

    #[cfg(unix)]
    #[test]
    fn test_own_process_is_alive() {
        assert!(is_process_alive(std::process::id()));
    }
}
