mod isolated;
mod process;
mod simple;

pub use isolated::IsolatedSandbox;
pub use simple::SimpleSandbox;

use std::ffi::OsString;
use std::path::PathBuf;
use std::process::ExitStatus;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::config::{ResourceLimits, SandboxBackend, SandboxConfig};

/// A single process invocation handed to a sandbox
#[derive(Debug, Clone)]
pub struct SandboxCommand {
    pub program: OsString,
    pub args: Vec<OsString>,
    pub stdin: String,
    pub work_dir: PathBuf,
    pub timeout: Duration,
    pub limits: ResourceLimits,
}

/// Captured outcome of one process run
#[derive(Debug, Clone, Default)]
pub struct ProcessOutput {
    /// `None` when the process was killed on timeout
    pub status: Option<ExitStatus>,
    pub stdout: String,
    pub stderr: String,
    pub timed_out: bool,
    pub stdout_truncated: bool,
    pub stderr_truncated: bool,
    pub elapsed: Duration,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        !self.timed_out && self.status.is_some_and(|s| s.success())
    }

    /// Exit code, with death by signal N reported as `-N`
    pub fn termination_code(&self) -> Option<i32> {
        let status = self.status?;
        if let Some(code) = status.code() {
            return Some(code);
        }

        #[cfg(unix)]
        {
            use std::os::unix::process::ExitStatusExt;
            status.signal().map(|signal| -signal)
        }
        #[cfg(not(unix))]
        {
            None
        }
    }
}

/// Execution backend for untrusted programs
///
/// Runners stage files and build the command line; the sandbox decides how the
/// process is confined. Implementations must kill the process when the wall
/// timeout elapses and must not return before it is reaped.
#[async_trait]
pub trait Sandbox: Send + Sync {
    fn name(&self) -> &'static str;

    /// Runs the command to completion or timeout
    ///
    /// An `Err` means the process could not be started at all; an
    /// `ErrorKind::NotFound` error means the program does not exist.
    async fn execute(&self, command: SandboxCommand) -> std::io::Result<ProcessOutput>;
}

/// Creates the sandbox backend selected by the configuration
pub fn create_sandbox(config: &SandboxConfig) -> Arc<dyn Sandbox> {
    match config.backend {
        SandboxBackend::Simple => {
            log::info!("Creating SimpleSandbox");
            log::warn!("SimpleSandbox provides NO resource limits - use only in trusted environments");
            Arc::new(SimpleSandbox::new(config.output_limit))
        }
        SandboxBackend::Isolated => {
            log::info!(
                "Creating IsolatedSandbox (deny_network: {})",
                config.deny_network
            );
            Arc::new(IsolatedSandbox::new(config.output_limit, config.deny_network))
        }
    }
}
