use std::collections::HashMap;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::{
    ExecutionResult, create_work_dir, describe_termination, output_limit_message, staging_failure,
};
use crate::config::{CompilerConfig, ResourceLimits};
use crate::error::FailureKind;
use crate::sandbox::{ProcessOutput, Sandbox, SandboxCommand};

/// Paths staged for one compile-and-run cycle
#[derive(Debug)]
struct CompilationPaths {
    work_dir: PathBuf,
    source: PathBuf,
    executable: PathBuf,
}

enum CompileOutcome {
    Compiled { warnings: Option<String> },
    Failed(ExecutionResult),
}

/// Compiled runner for C submissions
///
/// The source is written to a uniquely named file in a per-execution
/// directory, compiled with the configured command under the compile timeout,
/// and the resulting binary is run under the run timeout. The directory is
/// removed on every exit path.
pub struct CRunner {
    config: CompilerConfig,
    run_limits: ResourceLimits,
    compile_limits: ResourceLimits,
    work_root: PathBuf,
    sandbox: Arc<dyn Sandbox>,
}

impl CRunner {
    pub fn new(
        config: CompilerConfig,
        run_limits: ResourceLimits,
        compile_limits: ResourceLimits,
        work_root: PathBuf,
        sandbox: Arc<dyn Sandbox>,
    ) -> Self {
        Self {
            config,
            run_limits,
            compile_limits,
            work_root,
            sandbox,
        }
    }

    pub async fn execute(&self, source_code: &str, stdin: &str) -> ExecutionResult {
        let work_dir = match create_work_dir(&self.work_root) {
            Ok(dir) => dir,
            Err(e) => return staging_failure(e),
        };
        let paths = Self::compilation_paths(work_dir.path());
        if let Err(e) = std::fs::write(&paths.source, source_code) {
            return staging_failure(e);
        }

        let result = match self.compile(&paths).await {
            CompileOutcome::Compiled { warnings } => {
                self.run(&paths, stdin).await.with_warnings(warnings)
            }
            CompileOutcome::Failed(result) => result,
        };

        if let Err(e) = work_dir.close() {
            log::warn!("Failed to remove C working directory: {e}");
        }
        result
    }

    fn compilation_paths(work_dir: &Path) -> CompilationPaths {
        // The directory name is already unique; reuse it for the file names
        let unique = work_dir
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "code".to_string());
        let executable_name = if cfg!(windows) {
            format!("{unique}.exe")
        } else {
            unique.clone()
        };

        CompilationPaths {
            work_dir: work_dir.to_path_buf(),
            source: work_dir.join(format!("{unique}.c")),
            executable: work_dir.join(executable_name),
        }
    }

    async fn compile(&self, paths: &CompilationPaths) -> CompileOutcome {
        let source = paths.source.to_string_lossy();
        let executable = paths.executable.to_string_lossy();
        let mut mapping = HashMap::<&str, &str>::new();
        mapping.insert("%INPUT%", &source);
        mapping.insert("%OUTPUT%", &executable);
        let command = apply_template(&self.config.command, &mapping);

        let Some((program, args)) = command.split_first() else {
            return CompileOutcome::Failed(ExecutionResult::failed(
                FailureKind::SystemError,
                String::new(),
                "Empty compile command".to_string(),
            ));
        };

        let request = SandboxCommand {
            program: program.into(),
            args: args.iter().map(OsString::from).collect(),
            stdin: String::new(),
            work_dir: paths.work_dir.clone(),
            timeout: self.config.compile_timeout.into(),
            limits: self.compile_limits.clone(),
        };

        let output = match self.sandbox.execute(request).await {
            Ok(output) => output,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return CompileOutcome::Failed(ExecutionResult::failed(
                    FailureKind::ToolchainMissing,
                    String::new(),
                    format!(
                        "Compiler not found, make sure {} is installed",
                        self.config.compiler_name()
                    ),
                ));
            }
            Err(e) => {
                log::error!("Failed to launch {}: {e}", self.config.compiler_name());
                return CompileOutcome::Failed(ExecutionResult::failed(
                    FailureKind::SystemError,
                    String::new(),
                    format!("Failed to start the compiler: {e}"),
                ));
            }
        };

        if output.timed_out {
            return CompileOutcome::Failed(ExecutionResult::timeout(format!(
                "Compilation timed out (exceeded {} seconds)",
                self.config.compile_timeout.0
            )));
        }

        // Some compilers write diagnostics to stdout
        let diagnostics = [output.stderr.trim(), output.stdout.trim()]
            .into_iter()
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join("\n");
        let diagnostics = self.sanitize(&diagnostics, paths);

        if !output.success() || !paths.executable.exists() {
            log::debug!("Compilation failed: {diagnostics}");
            return CompileOutcome::Failed(ExecutionResult::failed(
                FailureKind::CompileError,
                String::new(),
                format!("Compilation error:\n{diagnostics}"),
            ));
        }

        CompileOutcome::Compiled {
            warnings: (!diagnostics.is_empty()).then_some(diagnostics),
        }
    }

    async fn run(&self, paths: &CompilationPaths, stdin: &str) -> ExecutionResult {
        let request = SandboxCommand {
            program: paths.executable.clone().into_os_string(),
            args: Vec::new(),
            stdin: stdin.to_string(),
            work_dir: paths.work_dir.clone(),
            timeout: self.config.run_timeout.into(),
            limits: self.run_limits.clone(),
        };

        match self.sandbox.execute(request).await {
            Ok(output) => self.interpret(output),
            Err(e) => {
                log::error!("Failed to launch compiled program: {e}");
                ExecutionResult::failed(
                    FailureKind::SystemError,
                    String::new(),
                    format!("Failed to start the compiled program: {e}"),
                )
            }
        }
    }

    /// Maps the raw process outcome onto the compiled success predicate: zero
    /// exit, with any stderr attached but not fatal
    fn interpret(&self, output: ProcessOutput) -> ExecutionResult {
        if output.timed_out {
            return ExecutionResult::timeout(format!(
                "Run timed out (exceeded {} seconds), check your code for an infinite loop",
                self.config.run_timeout.0
            ));
        }

        if output.stdout_truncated {
            return ExecutionResult::failed(
                FailureKind::OutputLimitExceeded,
                output.stdout,
                output_limit_message("stdout"),
            );
        }

        let stderr = output.stderr.trim();
        match output.termination_code() {
            Some(0) => ExecutionResult::completed(
                output.stdout.clone(),
                (!stderr.is_empty()).then(|| stderr.to_string()),
            ),
            code => {
                let (kind, message) = describe_termination(code.unwrap_or(-1), stderr);
                ExecutionResult::failed(kind, output.stdout.clone(), message)
            }
        }
    }

    /// Rewrites host paths in compiler output to the neutral display name
    fn sanitize(&self, diagnostics: &str, paths: &CompilationPaths) -> String {
        let display = self.config.display_name.as_str();
        let mut text = diagnostics.replace(&*paths.source.to_string_lossy(), display);
        if let Some(name) = paths.source.file_name() {
            text = text.replace(&*name.to_string_lossy(), display);
        }
        text.replace(&*paths.executable.to_string_lossy(), "main")
            .replace(&*paths.work_dir.to_string_lossy(), ".")
    }
}

/// Applies template substitutions to command arguments
///
/// Each placeholder in `mapping` is replaced in every argument; arguments are
/// kept separate so paths with spaces survive.
fn apply_template(cmd_template: &[String], mapping: &HashMap<&str, &str>) -> Vec<String> {
    cmd_template
        .iter()
        .map(|s| {
            let mut t = s.clone();
            for (k, v) in mapping.iter() {
                t = t.replace(k, v);
            }
            t
        })
        .collect()
}
