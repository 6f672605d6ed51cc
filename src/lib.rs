pub mod config;
pub mod dispatch;
pub mod error;
pub mod judge;
pub mod runner;
pub mod sandbox;

pub use config::JudgeConfig;
pub use dispatch::Dispatcher;
pub use error::{FailureKind, JudgeError};
pub use judge::{Judge, JudgeReport, JudgeResult, TestSpec};
pub use runner::{ExecutionRequest, ExecutionResult, Language, Runner};
