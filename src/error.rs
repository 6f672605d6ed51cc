use serde::Serialize;
use thiserror::Error;

/// Reasons a whole submission is rejected before any code runs
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum JudgeError {
    #[error("Malformed test specification: {0}")]
    MalformedTestSpec(String),
    #[error("Unknown test type: {0}")]
    UnknownTestType(String),
    #[error("Unsupported language: {0}")]
    UnsupportedLanguage(String),
}

impl JudgeError {
    pub fn kind(&self) -> RejectionKind {
        match self {
            Self::MalformedTestSpec(_) => RejectionKind::MalformedTestSpec,
            Self::UnknownTestType(_) => RejectionKind::UnknownTestType,
            Self::UnsupportedLanguage(_) => RejectionKind::UnsupportedLanguage,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectionKind {
    MalformedTestSpec,
    UnknownTestType,
    UnsupportedLanguage,
}

/// Why a single execution did not succeed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Uncaught exception, non-zero exit, or stderr output from the interpreter
    RuntimeError,
    /// The program asked for more input lines than were supplied
    InsufficientInput,
    Timeout,
    CompileError,
    /// The interpreter or compiler is not installed on the host
    ToolchainMissing,
    /// Killed by a signal or a well-known crash exit code
    AbnormalTermination,
    OutputLimitExceeded,
    /// The host failed to stage or launch the execution
    SystemError,
}

/// A function-mode call that cannot be synthesized for the target language
///
/// Only the affected case fails; judging continues with the next case.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum HarnessError {
    #[error("Unsupported {what} for {language} function tests: {detail}")]
    Unsupported {
        language: &'static str,
        what: &'static str,
        detail: String,
    },
}
