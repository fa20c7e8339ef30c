// Commandeer Infrastructure - System Adapters
// Implements: CommandRunner, SystemProbe

pub mod process_runner;
pub mod system_probe_impl;

#[cfg(unix)]
pub use process_runner::is_process_alive;
pub use process_runner::ProcessRunner;
pub use system_probe_impl::SystemProbeImpl;
