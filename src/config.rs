use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use serde::Deserialize;

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(default)]
pub struct JudgeConfig {
    pub python: InterpreterConfig,
    pub c: CompilerConfig,
    pub sandbox: SandboxConfig,
}

impl JudgeConfig {
    /// Load the configuration from the specified JSON file
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let file = std::fs::File::open(path)
            .with_context(|| format!("Failed to open config file {}", path.display()))?;
        let reader = std::io::BufReader::new(file);
        serde_json::from_reader(reader)
            .with_context(|| format!("Failed to parse config file {}", path.display()))
    }

    pub fn from_json(json: &str) -> anyhow::Result<Self> {
        serde_json::from_str(json).context("Failed to parse judge configuration")
    }
}

/// Interpreter settings for the Python runner
#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct InterpreterConfig {
    pub command: String,
    pub args: Vec<String>,
    pub timeout: Second,
}

impl Default for InterpreterConfig {
    fn default() -> Self {
        Self {
            command: "python3".to_string(),
            args: vec!["-I".to_string()],
            timeout: Second(5),
        }
    }
}

/// Compiler settings for the C runner
///
/// `command` is a template: `%INPUT%` is replaced by the staged source file and
/// `%OUTPUT%` by the binary path. The first element is the compiler executable.
#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct CompilerConfig {
    pub command: Vec<String>,
    pub display_name: String,
    pub compile_timeout: Second,
    pub run_timeout: Second,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            command: ["gcc", "-Wall", "-o", "%OUTPUT%", "%INPUT%", "-lm"]
                .into_iter()
                .map(String::from)
                .collect(),
            display_name: "main.c".to_string(),
            compile_timeout: Second(10),
            run_timeout: Second(5),
        }
    }
}

impl CompilerConfig {
    /// Name of the compiler executable, used in diagnostics
    pub fn compiler_name(&self) -> &str {
        self.command.first().map(String::as_str).unwrap_or("gcc")
    }
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct SandboxConfig {
    pub backend: SandboxBackend,
    /// Maximum number of bytes kept per output stream
    pub output_limit: ByteSize,
    pub run_limits: ResourceLimits,
    pub compile_limits: ResourceLimits,
    /// Run programs in fresh user and network namespaces (Linux only).
    /// Only the isolated backend honors it.
    pub deny_network: bool,
    /// Parent directory for per-execution working directories
    pub work_root: Option<PathBuf>,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            backend: SandboxBackend::Isolated,
            output_limit: ByteSize(1 << 20),
            run_limits: ResourceLimits {
                memory: Some(ByteSize(512 << 20)),
                cpu_time: None,
                file_size: Some(ByteSize(16 << 20)),
                open_files: Some(64),
                processes: None,
            },
            compile_limits: ResourceLimits {
                memory: Some(ByteSize(1 << 30)),
                cpu_time: None,
                file_size: Some(ByteSize(64 << 20)),
                open_files: Some(512),
                processes: None,
            },
            deny_network: true,
            work_root: None,
        }
    }
}

impl SandboxConfig {
    pub fn work_root(&self) -> PathBuf {
        self.work_root.clone().unwrap_or_else(std::env::temp_dir)
    }
}

#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SandboxBackend {
    Simple,
    Isolated,
}

/// OS resource limits applied by the isolated backend; `None` leaves a limit unset
#[derive(Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(default)]
pub struct ResourceLimits {
    pub memory: Option<ByteSize>,
    pub cpu_time: Option<Second>,
    pub file_size: Option<ByteSize>,
    pub open_files: Option<u64>,
    pub processes: Option<u64>,
}

#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Second(pub u64);

impl From<Second> for Duration {
    fn from(value: Second) -> Self {
        Duration::from_secs(value.0)
    }
}

#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct ByteSize(pub u64);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_deserialization() {
        let config = JudgeConfig::load("data/judge.json").unwrap();
        assert_eq!(config.python.command, "python3");
        assert_eq!(config.python.timeout, Second(5));
        assert_eq!(config.c.compile_timeout, Second(10));
        assert_eq!(config.c.run_timeout, Second(5));
        assert_eq!(config.sandbox.backend, SandboxBackend::Isolated);
        assert_eq!(config.sandbox.run_limits.memory, Some(ByteSize(268435456)));
        assert_eq!(config.sandbox.run_limits.cpu_time, Some(Second(6)));
        // Opted out so the toolchain tests also run where namespaces are unavailable
        assert!(!config.sandbox.deny_network);
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = JudgeConfig::from_json("{}").unwrap();
        assert_eq!(config.python.timeout, Second(5));
        assert_eq!(config.python.args, vec!["-I".to_string()]);
        assert_eq!(config.c.compiler_name(), "gcc");
        assert_eq!(config.c.display_name, "main.c");
        assert_eq!(config.sandbox.output_limit, ByteSize(1 << 20));
        assert_eq!(config.sandbox.backend, SandboxBackend::Isolated);
        assert!(config.sandbox.deny_network);
    }

    #[test]
    fn test_partial_override() {
        let config = JudgeConfig::from_json(
            r#"{"python": {"timeout": 1}, "sandbox": {"backend": "simple"}}"#,
        )
        .unwrap();
        assert_eq!(config.python.timeout, Second(1));
        assert_eq!(config.python.command, "python3");
        assert_eq!(config.sandbox.backend, SandboxBackend::Simple);
    }

    #[test]
    fn test_unknown_backend_rejected() {
        assert!(JudgeConfig::from_json(r#"{"sandbox": {"backend": "docker"}}"#).is_err());
    }

    #[test]
    fn test_second_to_duration() {
        assert_eq!(Duration::from(Second(3)), Duration::from_secs(3));
    }
}
