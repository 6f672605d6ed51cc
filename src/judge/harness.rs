//! Synthesizes the programs used by function-mode tests.
//!
//! Each harness embeds the submission verbatim, calls the named function with
//! literal arguments, and prints the return value as a Python literal on the
//! last line of stdout.

use std::fmt::Write;

use serde_json::Value;

use super::pyliteral::{float_repr, python_literal};
use crate::error::HarnessError;
use crate::runner::Language;

/// A synthesized program and the call it makes, for display
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Harness {
    pub call: String,
    pub program: String,
}

pub fn synthesize(
    language: Language,
    source_code: &str,
    function_name: &str,
    args: &[Value],
    expected: &Value,
) -> Result<Harness, HarnessError> {
    match language {
        Language::Python => Ok(python_harness(source_code, function_name, args)),
        Language::C => c_harness(source_code, function_name, args, expected),
    }
}

fn python_harness(source_code: &str, function_name: &str, args: &[Value]) -> Harness {
    let args: Vec<String> = args.iter().map(python_literal).collect();
    let call = format!("{function_name}({})", args.join(", "));
    let program = format!("{source_code}\n\n__result__ = {call}\nprint(repr(__result__))\n");
    Harness { call, program }
}

/// Printers for C return values, selected by the static type of the call
///
/// Each prints the value in Python literal form on its own line. A plain
/// `char` prints as a one-character string. Types with no Python counterpart
/// print a marker that fails to parse.
const C_PRINTERS: &str = r#"
#define __JUDGE_UNUSED __attribute__((unused))

static __JUDGE_UNUSED void __judge_print_bool(_Bool v)
{
    puts(v ? "True" : "False");
}

static __JUDGE_UNUSED void __judge_print_int(long long v)
{
    printf("%lld\n", v);
}

static __JUDGE_UNUSED void __judge_print_uint(unsigned long long v)
{
    printf("%llu\n", v);
}

static __JUDGE_UNUSED void __judge_print_double(double v)
{
    char buf[64];
    for (int precision = 1; precision <= 17; precision++) {
        snprintf(buf, sizeof buf, "%.*g", precision, v);
        if (strtod(buf, NULL) == v)
            break;
    }
    fputs(buf, stdout);
    if (strpbrk(buf, ".eEn") == NULL)
        fputs(".0", stdout);
    putchar('\n');
}

static __JUDGE_UNUSED void __judge_print_str(const char *s)
{
    if (s == NULL) {
        puts("None");
        return;
    }
    char quote = (strchr(s, '\'') != NULL && strchr(s, '"') == NULL) ? '"' : '\'';
    putchar(quote);
    for (const unsigned char *p = (const unsigned char *)s; *p; p++) {
        switch (*p) {
        case '\\': fputs("\\\\", stdout); break;
        case '\n': fputs("\\n", stdout); break;
        case '\r': fputs("\\r", stdout); break;
        case '\t': fputs("\\t", stdout); break;
        default:
            if (*p == (unsigned char)quote) {
                putchar('\\');
                putchar(*p);
            } else if (*p < 0x20 || *p == 0x7f) {
                printf("\\x%02x", *p);
            } else {
                putchar(*p);
            }
        }
    }
    putchar(quote);
    putchar('\n');
}

static __JUDGE_UNUSED void __judge_print_char(char c)
{
    char text[2] = {c, '\0'};
    __judge_print_str(text);
}

static __JUDGE_UNUSED void __judge_print_unsupported(int unused)
{
    (void)unused;
    puts("<unsupported return type>");
}

#define __JUDGE_PRINTER(x) _Generic((x), \
    _Bool: __judge_print_bool, \
    char: __judge_print_char, \
    signed char: __judge_print_int, \
    short: __judge_print_int, \
    int: __judge_print_int, \
    long: __judge_print_int, \
    long long: __judge_print_int, \
    unsigned char: __judge_print_uint, \
    unsigned short: __judge_print_uint, \
    unsigned int: __judge_print_uint, \
    unsigned long: __judge_print_uint, \
    unsigned long long: __judge_print_uint, \
    float: __judge_print_double, \
    double: __judge_print_double, \
    long double: __judge_print_double, \
    char *: __judge_print_str, \
    const char *: __judge_print_str, \
    default: __judge_print_unsupported)

/* Unsupported types hand 0 to the marker printer */
#define __JUDGE_PRINTABLE(x) _Generic((x), \
    _Bool: (x), char: (x), signed char: (x), short: (x), int: (x), long: (x), long long: (x), \
    unsigned char: (x), unsigned short: (x), unsigned int: (x), unsigned long: (x), \
    unsigned long long: (x), float: (x), double: (x), long double: (x), \
    char *: (x), const char *: (x), \
    default: 0)

#define __judge_print(x) __JUDGE_PRINTER(x)(__JUDGE_PRINTABLE(x))
"#;

/// The printer follows the C type of the call, so the printed value is the one
/// the function actually returned. A `null` expectation calls the function
/// for its effects and prints `None`, which is how `void` functions are tested.
fn c_harness(
    source_code: &str,
    function_name: &str,
    args: &[Value],
    expected: &Value,
) -> Result<Harness, HarnessError> {
    let args = args
        .iter()
        .map(c_literal)
        .collect::<Result<Vec<_>, _>>()?;
    let call = format!("{function_name}({})", args.join(", "));

    let statement = match expected {
        Value::Null => format!("{call};\n    puts(\"None\");"),
        Value::Array(_) | Value::Object(_) => {
            return Err(unsupported("expected value", expected));
        }
        _ => format!("__judge_print({call});"),
    };

    let mut program = String::new();
    program.push_str("#include <stdio.h>\n#include <stdlib.h>\n#include <string.h>\n");
    program.push_str(C_PRINTERS);
    program.push_str("#line 1 \"main.c\"\n");
    program.push_str(source_code);
    let _ = write!(
        program,
        "\n\nint main(void)\n{{\n    {statement}\n    return 0;\n}}\n"
    );

    Ok(Harness { call, program })
}

fn unsupported(what: &'static str, value: &Value) -> HarnessError {
    HarnessError::Unsupported {
        language: "C",
        what,
        detail: value.to_string(),
    }
}

fn c_literal(value: &Value) -> Result<String, HarnessError> {
    match value {
        Value::Null => Ok("NULL".to_string()),
        Value::Bool(b) => Ok(if *b { "1" } else { "0" }.to_string()),
        Value::Number(n) if n.is_f64() => Ok(float_repr(n.as_f64().unwrap_or_default())),
        Value::Number(n) => Ok(n.to_string()),
        Value::String(s) => Ok(c_string(s)),
        Value::Array(items) => c_array(value, items),
        Value::Object(_) => Err(unsupported("argument", value)),
    }
}

/// Flat homogeneous arrays become compound literals
fn c_array(value: &Value, items: &[Value]) -> Result<String, HarnessError> {
    let is_integral = |v: &Value| v.is_i64() || v.is_u64() || v.is_boolean();
    let element_type = if items.is_empty() {
        None
    } else if items.iter().all(is_integral) {
        Some("int")
    } else if items.iter().all(Value::is_number) {
        Some("double")
    } else if items.iter().all(Value::is_string) {
        Some("char *")
    } else {
        None
    };

    let Some(element_type) = element_type else {
        return Err(unsupported("argument", value));
    };
    let elements = items
        .iter()
        .map(c_literal)
        .collect::<Result<Vec<_>, _>>()?;
    Ok(format!("({element_type}[]){{{}}}", elements.join(", ")))
}

fn c_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            // Octal escapes stop after three digits, hex escapes do not
            c if (c as u32) < 0x20 || c as u32 == 0x7f => {
                let _ = write!(out, "\\{:03o}", c as u32);
            }
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_python_harness() {
        let harness = synthesize(
            Language::Python,
            "def square(n):\n    return n**2",
            "square",
            &[json!(5)],
            &json!(25),
        )
        .unwrap();
        assert_eq!(harness.call, "square(5)");
        assert_eq!(
            harness.program,
            "def square(n):\n    return n**2\n\n__result__ = square(5)\nprint(repr(__result__))\n"
        );
    }

    #[test]
    fn test_python_harness_renders_literals() {
        let harness = synthesize(
            Language::Python,
            "",
            "f",
            &[json!("it's"), json!([1, 2.5]), json!({"k": null}), json!(true)],
            &json!(null),
        )
        .unwrap();
        assert_eq!(harness.call, r#"f("it's", [1, 2.5], {'k': None}, True)"#);
    }

    #[test]
    fn test_c_harness_int() {
        let harness = synthesize(
            Language::C,
            "int add(int a, int b) { return a + b; }",
            "add",
            &[json!(2), json!(3)],
            &json!(5),
        )
        .unwrap();
        assert_eq!(harness.call, "add(2, 3)");
        assert!(harness.program.contains("#line 1 \"main.c\"\nint add(int a, int b)"));
        assert!(harness.program.ends_with(
            "int main(void)\n{\n    __judge_print(add(2, 3));\n    return 0;\n}\n"
        ));
    }

    #[test]
    fn test_c_printer_follows_the_return_type() {
        let program = |expected: Value| {
            synthesize(Language::C, "", "f", &[], &expected)
                .unwrap()
                .program
        };
        // The expected value never forces a conversion of the result
        for expected in [json!(true), json!(2), json!(2.5), json!("hi")] {
            let program = program(expected);
            assert!(program.contains("    __judge_print(f());\n"), "{program}");
            assert!(!program.contains("(long long)(f())"));
        }
        assert!(program(json!(null)).contains("f();\n    puts(\"None\");"));

        let program = program(json!(0));
        assert!(program.contains("double: __judge_print_double"));
        assert!(program.contains("int: __judge_print_int"));
        assert!(program.contains("char: __judge_print_char"));
        assert!(program.contains("_Bool: __judge_print_bool"));
        assert!(program.contains("const char *: __judge_print_str"));
        // Helpers come before the submission so its line numbers start at 1
        let helpers = program.find("__judge_print_double(double v)").unwrap();
        assert!(helpers < program.find("#line 1 \"main.c\"").unwrap());
    }

    #[test]
    fn test_c_arguments() {
        let harness = synthesize(
            Language::C,
            "",
            "g",
            &[
                json!([1, 2, 3]),
                json!([1.5, 2]),
                json!(["a", "b\"c"]),
                json!(2.0),
                json!(false),
                json!(null),
                json!("tab\tnul\u{0}"),
            ],
            &json!(0),
        )
        .unwrap();
        assert_eq!(
            harness.call,
            r#"g((int[]){1, 2, 3}, (double[]){1.5, 2}, (char *[]){"a", "b\"c"}, 2.0, 0, NULL, "tab\tnul\000")"#
        );
    }

    #[test]
    fn test_c_rejects_unrepresentable_values() {
        for args in [json!([[1], [2]]), json!([]), json!({"a": 1}), json!([1, "a"])] {
            let err = synthesize(Language::C, "", "f", &[args], &json!(0)).unwrap_err();
            assert!(matches!(err, HarnessError::Unsupported { what: "argument", .. }));
        }
        let err = synthesize(Language::C, "", "f", &[], &json!([1, 2])).unwrap_err();
        assert!(matches!(
            err,
            HarnessError::Unsupported {
                what: "expected value",
                ..
            }
        ));
    }
}
