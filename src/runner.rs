mod c;
mod python;

pub use c::CRunner;
pub use python::PythonRunner;

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tempfile::TempDir;

use crate::error::{FailureKind, JudgeError};

/// Languages a submission can be written in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Python,
    C,
}

impl Language {
    pub const ALL: [Language; 2] = [Language::Python, Language::C];

    pub fn kind(self) -> RunnerKind {
        match self {
            Self::Python => RunnerKind::Interpreted,
            Self::C => RunnerKind::Compiled,
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Python => f.write_str("python"),
            Self::C => f.write_str("c"),
        }
    }
}

impl FromStr for Language {
    type Err = JudgeError;

    fn from_str(tag: &str) -> Result<Self, Self::Err> {
        match tag.trim().to_ascii_lowercase().as_str() {
            "python" | "py" => Ok(Self::Python),
            "c" => Ok(Self::C),
            _ => Err(JudgeError::UnsupportedLanguage(tag.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunnerKind {
    Interpreted,
    Compiled,
}

/// Input to a single run
#[derive(Debug, Clone, Deserialize)]
pub struct ExecutionRequest {
    pub source_code: String,
    #[serde(default)]
    pub stdin: String,
    pub language: Language,
}

/// Outcome of one execution
///
/// Serializes to the single-run contract:
/// `{success, output, error, timeout?, compile_error?, warnings?, kind?}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExecutionResult {
    #[serde(rename = "success")]
    pub succeeded: bool,
    #[serde(rename = "output")]
    pub stdout: String,
    pub error: Option<String>,
    #[serde(rename = "timeout", skip_serializing_if = "is_false")]
    pub timed_out: bool,
    #[serde(skip_serializing_if = "is_false")]
    pub compile_error: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warnings: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<FailureKind>,
}

fn is_false(value: &bool) -> bool {
    !*value
}

impl ExecutionResult {
    /// A run that completed; `diagnostics` is attached without failing it
    pub fn completed(stdout: String, diagnostics: Option<String>) -> Self {
        Self {
            succeeded: true,
            stdout,
            error: diagnostics,
            timed_out: false,
            compile_error: false,
            warnings: None,
            kind: None,
        }
    }

    pub fn failed(kind: FailureKind, stdout: String, message: String) -> Self {
        Self {
            succeeded: false,
            stdout,
            error: Some(message),
            timed_out: kind == FailureKind::Timeout,
            compile_error: kind == FailureKind::CompileError,
            warnings: None,
            kind: Some(kind),
        }
    }

    pub fn timeout(message: String) -> Self {
        Self::failed(FailureKind::Timeout, String::new(), message)
    }

    pub fn with_warnings(mut self, warnings: Option<String>) -> Self {
        self.warnings = warnings;
        self
    }
}

/// A language runner, selected per language by the dispatcher
pub enum Runner {
    Interpreted(PythonRunner),
    Compiled(CRunner),
}

impl Runner {
    pub fn language(&self) -> Language {
        match self {
            Self::Interpreted(_) => Language::Python,
            Self::Compiled(_) => Language::C,
        }
    }

    /// Runs `source_code` once with `stdin`; never fails, every problem is in the result
    pub async fn execute(&self, source_code: &str, stdin: &str) -> ExecutionResult {
        match self {
            Self::Interpreted(runner) => runner.execute(source_code, stdin).await,
            Self::Compiled(runner) => runner.execute(source_code, stdin).await,
        }
    }
}

/// Creates a fresh, uniquely named working directory for one execution
///
/// The directory and everything in it is removed when the guard drops.
fn create_work_dir(work_root: &Path) -> std::io::Result<TempDir> {
    std::fs::create_dir_all(work_root)?;
    tempfile::Builder::new().prefix("code_").tempdir_in(work_root)
}

fn staging_failure(e: std::io::Error) -> ExecutionResult {
    log::error!("Failed to prepare execution environment: {e}");
    ExecutionResult::failed(
        FailureKind::SystemError,
        String::new(),
        format!("Failed to prepare the execution environment: {e}"),
    )
}

/// Well-known abnormal termination codes; signals appear as negative numbers
const TERMINATION_MESSAGES: &[(i32, &str)] = &[
    (-6, "Program aborted (SIGABRT)"),
    (-8, "Floating point error (SIGFPE), possibly a division by zero"),
    (-9, "Program was forcibly killed (SIGKILL)"),
    (-11, "Segmentation fault (SIGSEGV), possibly an invalid memory access"),
    (-24, "CPU time limit exceeded (SIGXCPU)"),
    (-25, "File size limit exceeded (SIGXFSZ)"),
    (139, "Segmentation fault, check for out-of-bounds array access or null pointers"),
    (136, "Floating point exception, check for division by zero"),
];

/// Translates a non-zero exit into a message a student can act on
pub fn describe_termination(code: i32, stderr: &str) -> (FailureKind, String) {
    if let Some((_, message)) = TERMINATION_MESSAGES.iter().find(|(c, _)| *c == code) {
        return (FailureKind::AbnormalTermination, (*message).to_string());
    }

    let stderr = stderr.trim();
    if stderr.is_empty() {
        (
            FailureKind::RuntimeError,
            format!("Program exited abnormally (exit code {code})"),
        )
    } else {
        (
            FailureKind::RuntimeError,
            format!("Runtime error (exit code {code}):\n{stderr}"),
        )
    }
}

fn output_limit_message(stream: &str) -> String {
    format!("Output limit exceeded: the program wrote too much to {stream}")
}
