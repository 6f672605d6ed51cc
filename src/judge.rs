mod harness;
mod pyliteral;

pub use harness::{Harness, synthesize};
pub use pyliteral::{ParseError, PyValue, python_literal};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{JudgeError, RejectionKind};
use crate::runner::{ExecutionResult, Runner};

/// Parsed test specification of one exercise
#[derive(Debug, Clone, PartialEq)]
pub enum TestSpec {
    Output(Vec<OutputCase>),
    Function {
        function_name: String,
        tests: Vec<FunctionCase>,
    },
}

/// Whole-program case: stdin in, trimmed stdout compared to the expected text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputCase {
    pub input: String,
    pub expected_output: String,
    pub description: String,
}

/// One call of the function under test
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct FunctionCase {
    #[serde(default)]
    pub args: Vec<Value>,
    #[serde(default)]
    pub expected: Value,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawOutputCase {
    #[serde(default)]
    input: String,
    #[serde(default)]
    expected_output: Value,
    #[serde(default)]
    description: Option<String>,
}

impl TestSpec {
    /// Parses a `test_cases_json` document
    pub fn parse(json: &str) -> Result<Self, JudgeError> {
        let value: Value = serde_json::from_str(json)
            .map_err(|e| JudgeError::MalformedTestSpec(e.to_string()))?;
        Self::from_value(value)
    }

    pub fn from_value(value: Value) -> Result<Self, JudgeError> {
        let Value::Object(mut spec) = value else {
            return Err(malformed("test specification must be a JSON object"));
        };

        let test_type = match spec.remove("test_type") {
            None | Some(Value::Null) => "output".to_string(),
            Some(Value::String(s)) => s,
            Some(other) => return Err(malformed(format!("test_type must be a string, got {other}"))),
        };

        match test_type.as_str() {
            "output" => {
                let raw: Vec<RawOutputCase> = field(&mut spec, "cases")?;
                let cases = raw
                    .into_iter()
                    .enumerate()
                    .map(|(idx, case)| -> Result<OutputCase, JudgeError> {
                        Ok(OutputCase {
                            expected_output: expected_text(case.expected_output)?,
                            input: case.input,
                            description: case
                                .description
                                .unwrap_or_else(|| default_description(idx)),
                        })
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Self::Output(cases))
            }
            "function" => {
                let function_name = match spec.remove("function_name") {
                    Some(Value::String(name)) if is_identifier(&name) => name,
                    Some(Value::String(name)) => {
                        return Err(malformed(format!(
                            "function_name {name:?} is not a valid identifier"
                        )));
                    }
                    _ => return Err(malformed("function_name is required")),
                };
                let tests = field(&mut spec, "function_tests")?;
                Ok(Self::Function {
                    function_name,
                    tests,
                })
            }
            _ => Err(JudgeError::UnknownTestType(test_type)),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Self::Output(cases) => cases.len(),
            Self::Function { tests, .. } => tests.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn malformed(message: impl Into<String>) -> JudgeError {
    JudgeError::MalformedTestSpec(message.into())
}

/// Reads an optional list field, defaulting to empty
fn field<T: serde::de::DeserializeOwned>(
    spec: &mut serde_json::Map<String, Value>,
    name: &str,
) -> Result<Vec<T>, JudgeError> {
    match spec.remove(name) {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(value) => {
            serde_json::from_value(value).map_err(|e| malformed(format!("invalid {name}: {e}")))
        }
    }
}

/// Scalars are accepted as expected output and rendered the way Python's `str` would
fn expected_text(value: Value) -> Result<String, JudgeError> {
    match value {
        Value::Null => Ok(String::new()),
        Value::String(s) => Ok(s),
        Value::Bool(true) => Ok("True".to_string()),
        Value::Bool(false) => Ok("False".to_string()),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(malformed(format!(
            "expected_output must be a string, got {other}"
        ))),
    }
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn default_description(idx: usize) -> String {
    format!("Test case {}", idx + 1)
}

/// Verdict for a single test case
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CaseOutcome {
    /// 1-based position in the test list
    pub case_id: usize,
    pub passed: bool,
    /// The call made, for function-mode cases
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input: Option<String>,
    pub expected: String,
    pub actual: String,
    pub error: Option<String>,
    pub description: String,
}

/// Aggregate verdict of one submission
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JudgeResult {
    pub success: bool,
    pub is_correct: bool,
    pub total_cases: usize,
    pub passed_cases: usize,
    pub results: Vec<CaseOutcome>,
    /// Output of the first case, for preview
    pub code_output: String,
    /// Error of the first case, empty when there was none
    pub code_error: String,
    pub message: String,
}

impl JudgeResult {
    fn new(results: Vec<CaseOutcome>, code_output: String, code_error: String) -> Self {
        let total_cases = results.len();
        let passed_cases = results.iter().filter(|r| r.passed).count();
        let message = if passed_cases == total_cases {
            "All tests passed!".to_string()
        } else {
            format!("Passed {passed_cases}/{total_cases} test cases")
        };

        Self {
            success: true,
            is_correct: passed_cases == total_cases,
            total_cases,
            passed_cases,
            results,
            code_output,
            code_error,
            message,
        }
    }
}

/// What a judged submission returns to the caller
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum JudgeReport {
    Judged(JudgeResult),
    /// The submission could not be judged at all; no code was run
    Rejected {
        success: bool,
        error: String,
        kind: RejectionKind,
    },
}

impl JudgeReport {
    pub fn rejected(error: &JudgeError) -> Self {
        Self::Rejected {
            success: false,
            error: error.to_string(),
            kind: error.kind(),
        }
    }

    pub fn is_correct(&self) -> bool {
        matches!(self, Self::Judged(result) if result.is_correct)
    }

    pub fn judged(&self) -> Option<&JudgeResult> {
        match self {
            Self::Judged(result) => Some(result),
            Self::Rejected { .. } => None,
        }
    }
}

impl From<JudgeError> for JudgeReport {
    fn from(error: JudgeError) -> Self {
        Self::rejected(&error)
    }
}

/// Evaluates submissions against test specifications with one runner
///
/// Cases run strictly in order; a failing, crashing or timed-out case is
/// recorded and judging moves on to the next one.
pub struct Judge<'a> {
    runner: &'a Runner,
}

impl<'a> Judge<'a> {
    pub fn new(runner: &'a Runner) -> Self {
        Self { runner }
    }

    /// Parses `test_cases_json` and judges `source_code` against it
    pub async fn check_submission(&self, source_code: &str, test_cases_json: &str) -> JudgeReport {
        match TestSpec::parse(test_cases_json) {
            Ok(spec) => JudgeReport::Judged(self.evaluate(source_code, &spec).await),
            Err(e) => {
                log::warn!("Rejected submission: {e}");
                JudgeReport::rejected(&e)
            }
        }
    }

    pub async fn evaluate(&self, source_code: &str, spec: &TestSpec) -> JudgeResult {
        let result = match spec {
            TestSpec::Output(cases) => self.check_output(source_code, cases).await,
            TestSpec::Function {
                function_name,
                tests,
            } => self.check_function(source_code, function_name, tests).await,
        };
        log::info!(
            "Judged {} submission: {}/{} passed",
            self.runner.language(),
            result.passed_cases,
            result.total_cases
        );
        result
    }

    async fn check_output(&self, source_code: &str, cases: &[OutputCase]) -> JudgeResult {
        let mut results = Vec::with_capacity(cases.len());
        let mut code_output = String::new();
        let mut code_error = String::new();

        for (idx, case) in cases.iter().enumerate() {
            let run = self.runner.execute(source_code, &case.input).await;
            if idx == 0 {
                code_output = run.stdout.clone();
                code_error = run.error.clone().unwrap_or_default();
            }

            let expected = case.expected_output.trim();
            let actual = run.stdout.trim();
            let passed = run.succeeded && actual == expected;
            log::debug!(
                "Case {}: {}",
                idx + 1,
                if passed { "passed" } else { "failed" }
            );

            results.push(CaseOutcome {
                case_id: idx + 1,
                passed,
                input: None,
                expected: expected.to_string(),
                actual: actual.to_string(),
                error: run.error,
                description: case.description.clone(),
            });
        }

        JudgeResult::new(results, code_output, code_error)
    }

    async fn check_function(
        &self,
        source_code: &str,
        function_name: &str,
        tests: &[FunctionCase],
    ) -> JudgeResult {
        let mut results = Vec::with_capacity(tests.len());
        let mut code_output = String::new();
        let mut code_error = String::new();

        for (idx, test) in tests.iter().enumerate() {
            let description = test
                .description
                .clone()
                .unwrap_or_else(|| default_description(idx));
            let expected = python_literal(&test.expected);

            let harness = match synthesize(
                self.runner.language(),
                source_code,
                function_name,
                &test.args,
                &test.expected,
            ) {
                Ok(harness) => harness,
                Err(e) => {
                    let message = e.to_string();
                    if idx == 0 {
                        code_error = message.clone();
                    }
                    results.push(CaseOutcome {
                        case_id: idx + 1,
                        passed: false,
                        input: None,
                        expected,
                        actual: message.clone(),
                        error: Some(message),
                        description,
                    });
                    continue;
                }
            };

            let run = self.runner.execute(&harness.program, "").await;
            if idx == 0 {
                code_output = format!(
                    "Return value of {}: {}",
                    harness.call,
                    run.stdout.trim()
                );
                code_error = run.error.clone().unwrap_or_default();
            }

            let (passed, actual, error) = compare_return_value(&run, &test.expected);
            log::debug!(
                "Case {} ({}): {}",
                idx + 1,
                harness.call,
                if passed { "passed" } else { "failed" }
            );

            results.push(CaseOutcome {
                case_id: idx + 1,
                passed,
                input: Some(harness.call),
                expected,
                actual,
                error,
                description,
            });
        }

        JudgeResult::new(results, code_output, code_error)
    }
}

const NO_OUTPUT: &str = "Execution produced no output";

/// Reads the return value from the last non-empty stdout line
///
/// Returns `(passed, actual, error)`.
fn compare_return_value(run: &ExecutionResult, expected: &Value) -> (bool, String, Option<String>) {
    let printed = run.stdout.lines().rev().map(str::trim).find(|l| !l.is_empty());

    if !run.succeeded {
        let actual = run
            .error
            .clone()
            .or_else(|| printed.map(str::to_string))
            .unwrap_or_else(|| NO_OUTPUT.to_string());
        return (false, actual, run.error.clone());
    }

    let Some(printed) = printed else {
        return (false, NO_OUTPUT.to_string(), run.error.clone());
    };

    match PyValue::parse(printed) {
        Ok(value) => {
            let passed = value.equals_json(expected);
            let error = if passed { None } else { run.error.clone() };
            (passed, value.to_string(), error)
        }
        Err(e) => (false, printed.to_string(), Some(e.to_string())),
    }
}
