#![allow(dead_code)]

use std::os::unix::process::ExitStatusExt;
use std::process::ExitStatus;
use std::sync::Mutex;

use async_trait::async_trait;

use edujudge::config::{JudgeConfig, Second};
use edujudge::sandbox::{ProcessOutput, Sandbox, SandboxCommand};

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Whether `tool` is installed where the isolated sandbox looks for it
pub fn has_tool(tool: &str) -> bool {
    let found = ["/usr/local/bin", "/usr/bin", "/bin"]
        .iter()
        .any(|dir| std::path::Path::new(dir).join(tool).is_file());
    if !found {
        eprintln!("{tool} not found, skipping");
    }
    found
}

/// Configuration used by the toolchain tests: the checked-in example with
/// short timeouts
pub fn test_config() -> JudgeConfig {
    let mut config = JudgeConfig::load("data/judge.json").unwrap();
    config.python.timeout = Second(2);
    config.c.run_timeout = Second(2);
    config
}

pub fn exited(code: i32, stdout: &str, stderr: &str) -> ProcessOutput {
    ProcessOutput {
        status: Some(ExitStatus::from_raw(code << 8)),
        stdout: stdout.to_string(),
        stderr: stderr.to_string(),
        ..Default::default()
    }
}

pub fn timed_out() -> ProcessOutput {
    ProcessOutput {
        timed_out: true,
        ..Default::default()
    }
}

/// A sandbox that answers from a script instead of running anything
///
/// The script receives the staged `main.py` (empty for other programs) and
/// the stdin of the call. Every call is recorded.
pub struct ScriptedSandbox<F> {
    script: F,
    calls: Mutex<Vec<(String, String)>>,
}

impl<F> ScriptedSandbox<F>
where
    F: Fn(&str, &str) -> ProcessOutput + Send + Sync + 'static,
{
    pub fn new(script: F) -> Self {
        Self {
            script,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// `(source, stdin)` of every execution so far
    pub fn calls(&self) -> Vec<(String, String)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl<F> Sandbox for ScriptedSandbox<F>
where
    F: Fn(&str, &str) -> ProcessOutput + Send + Sync + 'static,
{
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn execute(&self, command: SandboxCommand) -> std::io::Result<ProcessOutput> {
        let source =
            std::fs::read_to_string(command.work_dir.join("main.py")).unwrap_or_default();
        let output = (self.script)(&source, &command.stdin);
        self.calls
            .lock()
            .unwrap()
            .push((source, command.stdin.clone()));
        Ok(output)
    }
}
