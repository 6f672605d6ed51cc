use std::ffi::OsString;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use super::{
    ExecutionResult, create_work_dir, describe_termination, output_limit_message, staging_failure,
};
use crate::config::{InterpreterConfig, ResourceLimits};
use crate::error::FailureKind;
use crate::sandbox::{ProcessOutput, Sandbox, SandboxCommand};

const SOURCE_NAME: &str = "main.py";

/// Exit code reserved by the bootstrap for exhausted input
const INPUT_EXHAUSTED_EXIT_CODE: i32 = 86;
const INPUT_EXHAUSTED_MARKER: &str = "__edujudge_input_exhausted__";

/// Runs the submission as `main.py` with `input()` bound to the supplied stdin
///
/// Tracebacks skip the bootstrap frame so students only see their own code.
/// `InputExhausted` subclasses `EOFError`, so submissions that catch `EOFError`
/// keep working.
const BOOTSTRAP: &str = r#"
import builtins
import sys
import traceback

for _stream in (sys.stdin, sys.stdout, sys.stderr):
    _stream.reconfigure(encoding="utf-8", errors="replace")


class InputExhausted(EOFError):
    pass


def _judge_input(prompt=""):
    if prompt:
        sys.stdout.write(str(prompt))
    line = sys.stdin.readline()
    if not line:
        raise InputExhausted("no more input")
    return line.rstrip("\n")


def _judge_main(path):
    with open(path, encoding="utf-8") as f:
        source = f.read()
    namespace = {
        "__name__": "__main__",
        "__builtins__": builtins,
        "input": _judge_input,
    }
    try:
        exec(compile(source, path, "exec"), namespace)
    except InputExhausted:
        sys.stdout.flush()
        sys.stderr.write("__MARKER__\n")
        sys.stderr.flush()
        sys.exit(__EXIT_CODE__)
    except Exception as e:
        sys.stdout.flush()
        tb = e.__traceback__.tb_next if e.__traceback__ is not None else None
        traceback.print_exception(type(e), e, tb)
        sys.stderr.flush()
        sys.exit(1)


_judge_main(sys.argv[1])
"#;

/// Interpreted runner for Python submissions
///
/// Every execution is a fresh interpreter process in a fresh working
/// directory, confined by the configured sandbox. The wall timeout kills the
/// process instead of abandoning it.
pub struct PythonRunner {
    config: InterpreterConfig,
    limits: ResourceLimits,
    work_root: PathBuf,
    sandbox: Arc<dyn Sandbox>,
}

impl PythonRunner {
    pub fn new(
        config: InterpreterConfig,
        limits: ResourceLimits,
        work_root: PathBuf,
        sandbox: Arc<dyn Sandbox>,
    ) -> Self {
        Self {
            config,
            limits,
            work_root,
            sandbox,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.config.timeout.into()
    }

    pub async fn execute(&self, source_code: &str, stdin: &str) -> ExecutionResult {
        let work_dir = match create_work_dir(&self.work_root) {
            Ok(dir) => dir,
            Err(e) => return staging_failure(e),
        };
        if let Err(e) = std::fs::write(work_dir.path().join(SOURCE_NAME), source_code) {
            return staging_failure(e);
        }

        let bootstrap = BOOTSTRAP
            .replace("__MARKER__", INPUT_EXHAUSTED_MARKER)
            .replace("__EXIT_CODE__", &INPUT_EXHAUSTED_EXIT_CODE.to_string());
        let mut args: Vec<OsString> = self.config.args.iter().map(OsString::from).collect();
        args.extend(["-c".into(), bootstrap.into(), SOURCE_NAME.into()]);

        let command = SandboxCommand {
            program: (&self.config.command).into(),
            args,
            stdin: stdin.to_string(),
            work_dir: work_dir.path().to_path_buf(),
            timeout: self.timeout(),
            limits: self.limits.clone(),
        };

        let result = match self.sandbox.execute(command).await {
            Ok(output) => self.interpret(output),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => ExecutionResult::failed(
                FailureKind::ToolchainMissing,
                String::new(),
                format!(
                    "Python interpreter not found, make sure {} is installed",
                    self.config.command
                ),
            ),
            Err(e) => {
                log::error!("Failed to launch {}: {e}", self.config.command);
                ExecutionResult::failed(
                    FailureKind::SystemError,
                    String::new(),
                    format!("Failed to start the Python interpreter: {e}"),
                )
            }
        };

        if let Err(e) = work_dir.close() {
            log::warn!("Failed to remove Python working directory: {e}");
        }
        result
    }

    /// Maps the raw process outcome onto the interpreted success predicate:
    /// clean exit AND empty stderr
    fn interpret(&self, output: ProcessOutput) -> ExecutionResult {
        if output.timed_out {
            return ExecutionResult::timeout(format!(
                "Execution timed out (exceeded {} seconds), check your code for an infinite loop",
                self.config.timeout.0
            ));
        }

        let code = output.termination_code().unwrap_or(-1);
        if code == INPUT_EXHAUSTED_EXIT_CODE && output.stderr.contains(INPUT_EXHAUSTED_MARKER) {
            return ExecutionResult::failed(
                FailureKind::InsufficientInput,
                output.stdout,
                "Not enough input: your code called input() more times than the test case \
                 provides input lines.\nCheck how many times your program calls input()."
                    .to_string(),
            );
        }

        if output.stdout_truncated || output.stderr_truncated {
            let stream = if output.stdout_truncated { "stdout" } else { "stderr" };
            return ExecutionResult::failed(
                FailureKind::OutputLimitExceeded,
                output.stdout,
                output_limit_message(stream),
            );
        }

        match code {
            0 if output.stderr.is_empty() => ExecutionResult::completed(output.stdout, None),
            // Anything on stderr fails the run, even after a clean exit
            0 => ExecutionResult::failed(FailureKind::RuntimeError, output.stdout, output.stderr),
            // Uncaught exception, traceback already on stderr
            1 if !output.stderr.trim().is_empty() => {
                ExecutionResult::failed(FailureKind::RuntimeError, output.stdout, output.stderr)
            }
            code => {
                let (kind, message) = describe_termination(code, &output.stderr);
                ExecutionResult::failed(kind, output.stdout, message)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Second;

    fn runner() -> PythonRunner {
        PythonRunner::new(
            InterpreterConfig {
                timeout: Second(2),
                ..Default::default()
            },
            ResourceLimits::default(),
            std::env::temp_dir(),
            Arc::new(crate::sandbox::SimpleSandbox::new(crate::config::ByteSize(1024))),
        )
    }

    #[cfg(unix)]
    fn exited(code: i32, stdout: &str, stderr: &str) -> ProcessOutput {
        use std::os::unix::process::ExitStatusExt;

        ProcessOutput {
            status: Some(std::process::ExitStatus::from_raw(code << 8)),
            stdout: stdout.to_string(),
            stderr: stderr.to_string(),
            ..Default::default()
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_clean_exit_succeeds() {
        let result = runner().interpret(exited(0, "15\n", ""));
        assert!(result.succeeded);
        assert_eq!(result.stdout, "15\n");
        assert_eq!(result.error, None);
    }

    #[cfg(unix)]
    #[test]
    fn test_stderr_fails_clean_exit() {
        let result = runner().interpret(exited(0, "ok\n", "warning: something\n"));
        assert!(!result.succeeded);
        assert_eq!(result.kind, Some(FailureKind::RuntimeError));
        assert_eq!(result.error.as_deref(), Some("warning: something\n"));
    }

    #[cfg(unix)]
    #[test]
    fn test_input_exhausted_is_diagnosed() {
        let stderr = format!("{INPUT_EXHAUSTED_MARKER}\n");
        let result = runner().interpret(exited(INPUT_EXHAUSTED_EXIT_CODE, "Enter: ", &stderr));
        assert_eq!(result.kind, Some(FailureKind::InsufficientInput));
        assert!(result.error.unwrap().contains("input()"));
        assert_eq!(result.stdout, "Enter: ");
    }

    #[cfg(unix)]
    #[test]
    fn test_reserved_exit_code_without_marker_is_plain_exit() {
        let result = runner().interpret(exited(INPUT_EXHAUSTED_EXIT_CODE, "", ""));
        assert_eq!(result.kind, Some(FailureKind::RuntimeError));
        assert_eq!(
            result.error.as_deref(),
            Some("Program exited abnormally (exit code 86)")
        );
    }

    #[test]
    fn test_timeout_message_names_limit() {
        let result = runner().interpret(ProcessOutput {
            timed_out: true,
            ..Default::default()
        });
        assert!(result.timed_out);
        assert!(!result.succeeded);
        assert_eq!(result.stdout, "");
        assert!(result.error.unwrap().contains("exceeded 2 seconds"));
    }

    #[test]
    fn test_bootstrap_placeholders_are_known() {
        assert!(BOOTSTRAP.contains("__MARKER__"));
        assert!(BOOTSTRAP.contains("__EXIT_CODE__"));
    }
}
