#![cfg(unix)]

mod common;

use std::time::{Duration, Instant};

use pretty_assertions::assert_eq;
use serde_json::json;

use common::{has_tool, init_logger, test_config};
use edujudge::config::Second;
use edujudge::{Dispatcher, ExecutionRequest, FailureKind, Language};

fn dispatcher() -> Option<Dispatcher> {
    init_logger();
    if !has_tool("python3") {
        return None;
    }
    Some(Dispatcher::new(&test_config()).unwrap())
}

async fn run(dispatcher: &Dispatcher, source: &str, stdin: &str) -> edujudge::ExecutionResult {
    dispatcher
        .run(&ExecutionRequest {
            source_code: source.to_string(),
            stdin: stdin.to_string(),
            language: Language::Python,
        })
        .await
}

#[tokio::test]
async fn test_area_example() {
    let Some(dispatcher) = dispatcher() else { return };
    let source = "length=int(input()); width=int(input()); print(length*width)";

    let result = run(&dispatcher, source, "5\n3").await;
    assert!(result.succeeded, "{result:?}");
    assert_eq!(result.stdout, "15\n");
    assert_eq!(result.error, None);

    let report = dispatcher
        .check_submission(
            "python",
            source,
            r#"{"test_type": "output", "cases": [{"input": "5\n3", "expected_output": "15"}]}"#,
        )
        .await;
    assert!(report.is_correct());
    assert_eq!(report.judged().unwrap().results[0].actual, "15");
}

#[tokio::test]
async fn test_prompts_are_part_of_stdout() {
    let Some(dispatcher) = dispatcher() else { return };
    let result = run(&dispatcher, "name = input('Name: ')\nprint('Hi', name)", "Ada\n").await;
    assert!(result.succeeded);
    assert_eq!(result.stdout, "Name: Hi Ada\n");
}

#[tokio::test]
async fn test_insufficient_input_is_diagnosed() {
    let Some(dispatcher) = dispatcher() else { return };
    let source = "a = input()\nb = input()\nc = input()\nprint(a, b, c)";

    let result = run(&dispatcher, source, "1\n2").await;
    assert!(!result.succeeded);
    assert_eq!(result.kind, Some(FailureKind::InsufficientInput));
    let error = result.error.unwrap();
    assert!(error.contains("Not enough input"), "{error}");
    assert!(!error.contains("Traceback"));
}

#[tokio::test]
async fn test_eof_error_can_still_be_caught() {
    let Some(dispatcher) = dispatcher() else { return };
    let source = "try:\n    input()\nexcept EOFError:\n    print('done')";
    let result = run(&dispatcher, source, "").await;
    assert!(result.succeeded, "{result:?}");
    assert_eq!(result.stdout, "done\n");
}

#[tokio::test]
async fn test_traceback_names_main_py_only() {
    let Some(dispatcher) = dispatcher() else { return };
    let result = run(&dispatcher, "print('before')\nx = 1 / 0", "").await;

    assert!(!result.succeeded);
    assert_eq!(result.kind, Some(FailureKind::RuntimeError));
    assert_eq!(result.stdout, "before\n");
    let error = result.error.unwrap();
    assert!(error.contains("ZeroDivisionError"), "{error}");
    assert!(error.contains("main.py\", line 2"), "{error}");
    assert!(!error.contains("_judge_main"), "{error}");
}

#[tokio::test]
async fn test_stderr_output_fails_the_run() {
    let Some(dispatcher) = dispatcher() else { return };
    let source = "import sys\nprint('15')\nsys.stderr.write('oops\\n')";
    let result = run(&dispatcher, source, "").await;
    assert!(!result.succeeded);
    assert_eq!(result.stdout, "15\n");
    assert_eq!(result.error.as_deref(), Some("oops\n"));
}

#[tokio::test]
async fn test_sys_exit_codes() {
    let Some(dispatcher) = dispatcher() else { return };

    let result = run(&dispatcher, "import sys\nprint('x')\nsys.exit(0)", "").await;
    assert!(result.succeeded);

    let result = run(&dispatcher, "import sys\nsys.exit(3)", "").await;
    assert!(!result.succeeded);
    assert_eq!(
        result.error.as_deref(),
        Some("Program exited abnormally (exit code 3)")
    );
}

#[tokio::test]
async fn test_runs_are_idempotent() {
    let Some(dispatcher) = dispatcher() else { return };
    let source = "n = int(input())\nfor i in range(n):\n    print(i * i)";
    let first = run(&dispatcher, source, "5").await;
    let second = run(&dispatcher, source, "5").await;
    assert!(first.succeeded);
    assert_eq!(first, second);
}

#[tokio::test]
async fn test_infinite_loop_times_out_promptly() {
    init_logger();
    if !has_tool("python3") {
        return;
    }
    let mut config = test_config();
    config.python.timeout = Second(1);
    let dispatcher = Dispatcher::new(&config).unwrap();

    let start = Instant::now();
    let result = run(&dispatcher, "while True:\n    pass", "").await;
    let elapsed = start.elapsed();

    assert!(result.timed_out);
    assert!(!result.succeeded);
    assert_eq!(result.kind, Some(FailureKind::Timeout));
    assert!(result.error.unwrap().contains("exceeded 1 seconds"));
    assert!(elapsed < Duration::from_secs(4), "took {elapsed:?}");
}

#[tokio::test]
async fn test_function_mode_square() {
    let Some(dispatcher) = dispatcher() else { return };
    let spec = json!({
        "test_type": "function",
        "function_name": "square",
        "function_tests": [{"args": [5], "expected": 25}, {"args": [-3], "expected": 9}]
    });

    let report = dispatcher
        .check_submission("python", "def square(n):\n    return n**2", &spec.to_string())
        .await;

    let result = report.judged().unwrap();
    assert!(result.is_correct, "{result:?}");
    assert_eq!(result.results[0].input.as_deref(), Some("square(5)"));
    assert_eq!(result.results[0].actual, "25");
    assert_eq!(result.code_output, "Return value of square(5): 25");
}

#[tokio::test]
async fn test_function_mode_structures() {
    let Some(dispatcher) = dispatcher() else { return };
    let source = "\
def stats(words):
    print('computing...')
    counts = {}
    for w in reversed(words):
        counts[w] = counts.get(w, 0) + 1
    return counts

def pair(a, b):
    return (a, b)
";
    let spec = json!({
        "test_type": "function",
        "function_name": "stats",
        "function_tests": [
            {"args": [["a", "b", "a"]], "expected": {"a": 2, "b": 1}},
            {"args": [["it's", "x\ny"]], "expected": {"x\ny": 1, "it's": 1}}
        ]
    });
    let report = dispatcher
        .check_submission("python", source, &spec.to_string())
        .await;
    assert!(report.is_correct(), "{report:?}");

    let spec = json!({
        "test_type": "function",
        "function_name": "pair",
        "function_tests": [{"args": [1, 2], "expected": [1, 2]}]
    });
    let report = dispatcher
        .check_submission("python", source, &spec.to_string())
        .await;
    let result = report.judged().unwrap();
    assert!(!result.is_correct);
    assert_eq!(result.results[0].actual, "(1, 2)");
}
