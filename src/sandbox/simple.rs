use async_trait::async_trait;
use tokio::process::Command;

use super::{ProcessOutput, Sandbox, SandboxCommand, process};
use crate::config::ByteSize;

/// A sandbox that runs programs as plain child processes
///
/// SimpleSandbox only enforces the wall-clock timeout and the output cap. The
/// child inherits the host environment and has no memory, file system or
/// network restrictions. This is intended for development/testing
/// environments where isolation is not critical.
#[derive(Debug, Clone)]
pub struct SimpleSandbox {
    output_limit: usize,
}

impl SimpleSandbox {
    pub fn new(output_limit: ByteSize) -> Self {
        Self {
            output_limit: usize::try_from(output_limit.0).unwrap_or(usize::MAX),
        }
    }
}

#[async_trait]
impl Sandbox for SimpleSandbox {
    fn name(&self) -> &'static str {
        "simple"
    }

    async fn execute(&self, command: SandboxCommand) -> std::io::Result<ProcessOutput> {
        let mut cmd = Command::new(&command.program);
        cmd.args(&command.args);

        process::drive(cmd, &command, self.output_limit).await
    }
}
