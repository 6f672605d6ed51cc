use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use anyhow::anyhow;

use crate::config::JudgeConfig;
use crate::error::{FailureKind, JudgeError};
use crate::judge::{Judge, JudgeReport};
use crate::runner::{CRunner, ExecutionRequest, ExecutionResult, Language, PythonRunner, Runner};
use crate::sandbox::{Sandbox, create_sandbox};

/// Entry point for running and judging submissions
///
/// Holds one explicitly constructed runner per language, all sharing the same
/// sandbox. Immutable after construction, so it can be shared across tasks
/// and judge submissions concurrently.
pub struct Dispatcher {
    runners: HashMap<Language, Runner>,
    sandbox: Arc<dyn Sandbox>,
}

impl Dispatcher {
    /// Builds the sandbox selected by `config` and a runner for every language
    pub fn new(config: &JudgeConfig) -> anyhow::Result<Self> {
        Self::with_sandbox(config, create_sandbox(&config.sandbox))
    }

    pub fn with_sandbox(config: &JudgeConfig, sandbox: Arc<dyn Sandbox>) -> anyhow::Result<Self> {
        let work_root = config.sandbox.work_root();
        std::fs::create_dir_all(&work_root).map_err(|e| {
            anyhow!(
                "Failed to create work root {}: {}",
                work_root.display(),
                e
            )
        })?;

        let runners = Language::ALL
            .into_iter()
            .map(|language| {
                let runner = build_runner(language, config, &work_root, sandbox.clone());
                (language, runner)
            })
            .collect();

        log::info!(
            "Dispatcher ready with {} sandbox, working in {}",
            sandbox.name(),
            work_root.display()
        );
        Ok(Self { runners, sandbox })
    }

    pub fn sandbox_name(&self) -> &'static str {
        self.sandbox.name()
    }

    pub fn runner(&self, language: Language) -> Option<&Runner> {
        self.runners.get(&language)
    }

    fn runner_for_tag(&self, tag: &str) -> Result<&Runner, JudgeError> {
        let language: Language = tag.parse()?;
        self.runner(language)
            .ok_or_else(|| JudgeError::UnsupportedLanguage(tag.to_string()))
    }

    /// Runs a single program once
    pub async fn run(&self, request: &ExecutionRequest) -> ExecutionResult {
        match self.runner(request.language) {
            Some(runner) => runner.execute(&request.source_code, &request.stdin).await,
            None => ExecutionResult::failed(
                FailureKind::SystemError,
                String::new(),
                format!("No runner registered for {}", request.language),
            ),
        }
    }

    /// Runs a single program given a language tag such as `"python"` or `"c"`
    pub async fn run_tagged(
        &self,
        tag: &str,
        source_code: &str,
        stdin: &str,
    ) -> Result<ExecutionResult, JudgeError> {
        let runner = self.runner_for_tag(tag)?;
        Ok(runner.execute(source_code, stdin).await)
    }

    /// Judges a submission against its `test_cases_json`
    ///
    /// Never fails: unsupported languages and unreadable specifications come
    /// back as `JudgeReport::Rejected`.
    pub async fn check_submission(
        &self,
        tag: &str,
        source_code: &str,
        test_cases_json: &str,
    ) -> JudgeReport {
        match self.runner_for_tag(tag) {
            Ok(runner) => {
                Judge::new(runner)
                    .check_submission(source_code, test_cases_json)
                    .await
            }
            Err(e) => {
                log::warn!("Rejected submission: {e}");
                JudgeReport::rejected(&e)
            }
        }
    }
}

fn build_runner(
    language: Language,
    config: &JudgeConfig,
    work_root: &Path,
    sandbox: Arc<dyn Sandbox>,
) -> Runner {
    match language {
        Language::Python => Runner::Interpreted(PythonRunner::new(
            config.python.clone(),
            config.sandbox.run_limits.clone(),
            work_root.to_path_buf(),
            sandbox,
        )),
        Language::C => Runner::Compiled(CRunner::new(
            config.c.clone(),
            config.sandbox.run_limits.clone(),
            config.sandbox.compile_limits.clone(),
            work_root.to_path_buf(),
            sandbox,
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SandboxBackend;

    fn dispatcher() -> Dispatcher {
        let mut config = JudgeConfig::default();
        config.sandbox.backend = SandboxBackend::Simple;
        Dispatcher::new(&config).unwrap()
    }

    #[test]
    fn test_every_language_has_a_runner() {
        let dispatcher = dispatcher();
        for language in Language::ALL {
            assert_eq!(dispatcher.runner(language).unwrap().language(), language);
        }
        assert_eq!(dispatcher.sandbox_name(), "simple");
    }

    #[test]
    fn test_dispatcher_is_shareable() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Dispatcher>();
    }

    #[tokio::test]
    async fn test_unknown_tag_is_rejected_without_running() {
        let dispatcher = dispatcher();
        let err = dispatcher.run_tagged("java", "class A {}", "").await.unwrap_err();
        assert_eq!(err, JudgeError::UnsupportedLanguage("java".to_string()));

        let report = dispatcher
            .check_submission("rust", "fn main() {}", r#"{"cases": []}"#)
            .await;
        assert!(matches!(
            report,
            JudgeReport::Rejected {
                success: false,
                kind: crate::error::RejectionKind::UnsupportedLanguage,
                ..
            }
        ));
    }
}
