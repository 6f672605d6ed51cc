//! Python literal values: parsing `repr()` output and rendering JSON as Python source.

use std::fmt::{self, Write};

use serde_json::Value;
use thiserror::Error;

/// A value as printed by Python's `repr()`
#[derive(Debug, Clone, PartialEq)]
pub enum PyValue {
    None,
    Bool(bool),
    Int(i128),
    Float(f64),
    Str(String),
    List(Vec<PyValue>),
    Tuple(Vec<PyValue>),
    Dict(Vec<(PyValue, PyValue)>),
    Set(Vec<PyValue>),
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("cannot parse return value at offset {offset}: {message}")]
pub struct ParseError {
    pub offset: usize,
    pub message: String,
}

/// Deepest container nesting accepted from printed output
pub const MAX_DEPTH: usize = 256;

impl PyValue {
    pub fn parse(text: &str) -> Result<Self, ParseError> {
        let mut parser = Parser {
            src: text,
            pos: 0,
            depth: 0,
        };
        let value = parser.value()?;
        parser.skip_ws();
        if parser.pos != text.len() {
            return Err(parser.error("unexpected trailing characters"));
        }
        Ok(value)
    }

    /// Python `==` between this value and a JSON value
    ///
    /// bool, int and float compare numerically, dict comparison ignores key
    /// order, and tuples or sets never equal a JSON array.
    pub fn equals_json(&self, json: &Value) -> bool {
        if let (Some(a), Some(b)) = (self.as_number(), json_number(json)) {
            return a.equals(b);
        }

        match (self, json) {
            (Self::None, Value::Null) => true,
            (Self::Str(a), Value::String(b)) => a == b,
            (Self::List(items), Value::Array(expected)) => {
                items.len() == expected.len()
                    && items.iter().zip(expected).all(|(a, b)| a.equals_json(b))
            }
            (Self::Dict(entries), Value::Object(expected)) => {
                entries.len() == expected.len()
                    && entries.iter().all(|(key, value)| match key {
                        Self::Str(key) => expected.get(key).is_some_and(|v| value.equals_json(v)),
                        _ => false,
                    })
            }
            _ => false,
        }
    }

    fn as_number(&self) -> Option<Number> {
        match self {
            Self::Bool(b) => Some(Number::Int(i128::from(*b))),
            Self::Int(i) => Some(Number::Int(*i)),
            Self::Float(f) => Some(Number::Float(*f)),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Number {
    Int(i128),
    Float(f64),
}

impl Number {
    fn equals(self, other: Number) -> bool {
        match (self, other) {
            (Number::Int(a), Number::Int(b)) => a == b,
            (Number::Int(i), Number::Float(f)) | (Number::Float(f), Number::Int(i)) => {
                // Exact comparison: `i as f64` alone would round large integers
                f.is_finite()
                    && f.fract() == 0.0
                    && f.abs() < i128::MAX as f64
                    && f as i128 == i
            }
            (Number::Float(a), Number::Float(b)) => a == b,
        }
    }
}

fn json_number(value: &Value) -> Option<Number> {
    match value {
        Value::Bool(b) => Some(Number::Int(i128::from(*b))),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Some(Number::Int(i128::from(i)))
            } else if let Some(u) = n.as_u64() {
                Some(Number::Int(i128::from(u)))
            } else {
                n.as_f64().map(Number::Float)
            }
        }
        _ => None,
    }
}

impl fmt::Display for PyValue {
    /// Formats the value the way Python's `repr()` does
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => f.write_str("None"),
            Self::Bool(true) => f.write_str("True"),
            Self::Bool(false) => f.write_str("False"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(x) => f.write_str(&float_repr(*x)),
            Self::Str(s) => f.write_str(&str_repr(s)),
            Self::List(items) => write_seq(f, "[", items, "]"),
            Self::Tuple(items) if items.len() == 1 => write!(f, "({},)", items[0]),
            Self::Tuple(items) => write_seq(f, "(", items, ")"),
            Self::Set(items) if items.is_empty() => f.write_str("set()"),
            Self::Set(items) => write_seq(f, "{", items, "}"),
            Self::Dict(entries) => {
                f.write_char('{')?;
                for (i, (k, v)) in entries.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{k}: {v}")?;
                }
                f.write_char('}')
            }
        }
    }
}

fn write_seq(f: &mut fmt::Formatter<'_>, open: &str, items: &[PyValue], close: &str) -> fmt::Result {
    f.write_str(open)?;
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{item}")?;
    }
    f.write_str(close)
}

/// Renders a JSON value as the equivalent Python literal (`repr` form)
pub fn python_literal(value: &Value) -> String {
    match value {
        Value::Null => "None".to_string(),
        Value::Bool(true) => "True".to_string(),
        Value::Bool(false) => "False".to_string(),
        Value::Number(n) => {
            if n.is_i64() || n.is_u64() {
                n.to_string()
            } else {
                float_repr(n.as_f64().unwrap_or(f64::NAN))
            }
        }
        Value::String(s) => str_repr(s),
        Value::Array(items) => {
            let items: Vec<String> = items.iter().map(python_literal).collect();
            format!("[{}]", items.join(", "))
        }
        Value::Object(map) => {
            let entries: Vec<String> = map
                .iter()
                .map(|(k, v)| format!("{}: {}", str_repr(k), python_literal(v)))
                .collect();
            format!("{{{}}}", entries.join(", "))
        }
    }
}

/// Python's `repr(float)`: shortest round-trip digits, scientific notation
/// outside `1e-4 <= |x| < 1e16`
pub fn float_repr(x: f64) -> String {
    if x.is_nan() {
        return "nan".to_string();
    }
    if x.is_infinite() {
        return if x > 0.0 { "inf" } else { "-inf" }.to_string();
    }
    if x == 0.0 {
        return if x.is_sign_negative() { "-0.0" } else { "0.0" }.to_string();
    }

    // `{:e}` yields the shortest round-trip digits, e.g. "1.2345e-5"
    let sci = format!("{x:e}");
    let Some((mantissa, exponent)) = sci.split_once('e') else {
        return sci;
    };
    let exponent: i32 = exponent.parse().unwrap_or(0);
    let (sign, mantissa) = match mantissa.strip_prefix('-') {
        Some(rest) => ("-", rest),
        None => ("", mantissa),
    };
    let digits: String = mantissa.chars().filter(|c| *c != '.').collect();

    if !(-4..16).contains(&exponent) {
        let (head, tail) = digits.split_at(1);
        let mantissa = if tail.is_empty() {
            head.to_string()
        } else {
            format!("{head}.{tail}")
        };
        let exp_sign = if exponent < 0 { '-' } else { '+' };
        return format!("{sign}{mantissa}e{exp_sign}{:02}", exponent.abs());
    }

    let point = exponent + 1;
    let body = if point <= 0 {
        format!("0.{}{digits}", "0".repeat(point.unsigned_abs() as usize))
    } else if point as usize >= digits.len() {
        format!("{digits}{}.0", "0".repeat(point as usize - digits.len()))
    } else {
        let (int_part, frac_part) = digits.split_at(point as usize);
        format!("{int_part}.{frac_part}")
    };
    format!("{sign}{body}")
}

/// Python's `repr(str)`: single quotes unless the text contains only single quotes
pub fn str_repr(s: &str) -> String {
    let quote = if s.contains('\'') && !s.contains('"') {
        '"'
    } else {
        '\''
    };

    let mut out = String::with_capacity(s.len() + 2);
    out.push(quote);
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c == quote => {
                out.push('\\');
                out.push(c);
            }
            c if (c as u32) < 0x20 || c as u32 == 0x7f => {
                let _ = write!(out, "\\x{:02x}", c as u32);
            }
            c => out.push(c),
        }
    }
    out.push(quote);
    out
}

struct Parser<'a> {
    src: &'a str,
    pos: usize,
    depth: usize,
}

impl Parser<'_> {
    fn error(&self, message: &str) -> ParseError {
        ParseError {
            offset: self.pos,
            message: message.to_string(),
        }
    }

    fn rest(&self) -> &str {
        &self.src[self.pos..]
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn skip_ws(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.bump();
        }
    }

    fn eat(&mut self, expected: char) -> bool {
        self.skip_ws();
        if self.peek() == Some(expected) {
            self.bump();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, expected: char) -> Result<(), ParseError> {
        if self.eat(expected) {
            Ok(())
        } else {
            Err(self.error(&format!("expected '{expected}'")))
        }
    }

    /// Parses one container level, refusing to recurse past `MAX_DEPTH`
    fn nested(
        &mut self,
        parse: impl FnOnce(&mut Self) -> Result<PyValue, ParseError>,
    ) -> Result<PyValue, ParseError> {
        if self.depth >= MAX_DEPTH {
            return Err(self.error("nesting too deep"));
        }
        self.depth += 1;
        self.bump();
        let value = parse(self);
        self.depth -= 1;
        value
    }

    fn value(&mut self) -> Result<PyValue, ParseError> {
        self.skip_ws();
        match self.peek() {
            Some('[') => self.nested(|p| p.sequence(']').map(|(items, _)| PyValue::List(items))),
            Some('(') => self.nested(|p| {
                let (items, trailing_comma) = p.sequence(')')?;
                // "(x)" is just a parenthesized value, "(x,)" is a tuple
                if items.len() == 1 && !trailing_comma {
                    Ok(items.into_iter().next().unwrap_or(PyValue::None))
                } else {
                    Ok(PyValue::Tuple(items))
                }
            }),
            Some('{') => self.nested(Self::braces),
            Some('\'' | '"') => self.string().map(PyValue::Str),
            Some(c) if c.is_ascii_digit() || c == '-' || c == '+' || c == '.' => self.number(),
            Some(c) if c.is_alphabetic() || c == '_' => self.word(),
            Some(_) => Err(self.error("unexpected character")),
            None => Err(self.error("unexpected end of input")),
        }
    }

    /// Comma separated values up to `close`; reports whether a trailing comma was seen
    fn sequence(&mut self, close: char) -> Result<(Vec<PyValue>, bool), ParseError> {
        let mut items = Vec::new();
        let mut trailing_comma = false;
        loop {
            if self.eat(close) {
                return Ok((items, trailing_comma));
            }
            items.push(self.value()?);
            trailing_comma = self.eat(',');
            if !trailing_comma {
                self.expect(close)?;
                return Ok((items, false));
            }
        }
    }

    fn braces(&mut self) -> Result<PyValue, ParseError> {
        if self.eat('}') {
            return Ok(PyValue::Dict(Vec::new()));
        }

        let first = self.value()?;
        if self.eat(':') {
            let mut entries = vec![(first, self.value()?)];
            while self.eat(',') {
                if self.eat('}') {
                    return Ok(PyValue::Dict(entries));
                }
                let key = self.value()?;
                self.expect(':')?;
                entries.push((key, self.value()?));
            }
            self.expect('}')?;
            Ok(PyValue::Dict(entries))
        } else {
            let mut items = vec![first];
            if self.eat(',') {
                let (rest, _) = self.sequence('}')?;
                items.extend(rest);
            } else {
                self.expect('}')?;
            }
            Ok(PyValue::Set(items))
        }
    }

    fn word(&mut self) -> Result<PyValue, ParseError> {
        let start = self.pos;
        while self
            .peek()
            .is_some_and(|c| c.is_alphanumeric() || c == '_')
        {
            self.bump();
        }
        match &self.src[start..self.pos] {
            "None" => Ok(PyValue::None),
            "True" => Ok(PyValue::Bool(true)),
            "False" => Ok(PyValue::Bool(false)),
            "set" => {
                self.expect('(')?;
                self.expect(')')?;
                Ok(PyValue::Set(Vec::new()))
            }
            _ => {
                self.pos = start;
                Err(self.error("unsupported name"))
            }
        }
    }

    fn number(&mut self) -> Result<PyValue, ParseError> {
        let start = self.pos;
        if matches!(self.peek(), Some('-' | '+')) {
            self.bump();
        }
        let mut is_float = false;
        while let Some(c) = self.peek() {
            match c {
                '0'..='9' | '_' => {}
                '.' => is_float = true,
                'e' | 'E' => {
                    is_float = true;
                    self.bump();
                    if matches!(self.peek(), Some('-' | '+')) {
                        self.bump();
                    }
                    continue;
                }
                _ => break,
            }
            self.bump();
        }

        let text: String = self.src[start..self.pos].chars().filter(|c| *c != '_').collect();
        if is_float {
            text.parse::<f64>()
                .map(PyValue::Float)
                .map_err(|_| self.error("invalid float literal"))
        } else {
            text.parse::<i128>()
                .map(PyValue::Int)
                .map_err(|_| self.error("invalid or out of range integer literal"))
        }
    }

    fn string(&mut self) -> Result<String, ParseError> {
        let quote = self.bump().ok_or_else(|| self.error("expected string"))?;
        let mut out = String::new();
        loop {
            let c = self
                .bump()
                .ok_or_else(|| self.error("unterminated string literal"))?;
            match c {
                c if c == quote => return Ok(out),
                '\\' => {
                    let escape = self
                        .bump()
                        .ok_or_else(|| self.error("unterminated escape sequence"))?;
                    match escape {
                        'n' => out.push('\n'),
                        'r' => out.push('\r'),
                        't' => out.push('\t'),
                        '0' => out.push('\0'),
                        'a' => out.push('\x07'),
                        'b' => out.push('\x08'),
                        'f' => out.push('\x0c'),
                        'v' => out.push('\x0b'),
                        '\\' | '\'' | '"' => out.push(escape),
                        'x' => out.push(self.hex_escape(2)?),
                        'u' => out.push(self.hex_escape(4)?),
                        'U' => out.push(self.hex_escape(8)?),
                        _ => return Err(self.error("unsupported escape sequence")),
                    }
                }
                c => out.push(c),
            }
        }
    }

    fn hex_escape(&mut self, len: usize) -> Result<char, ParseError> {
        let digits = self
            .rest()
            .get(..len)
            .ok_or_else(|| self.error("truncated escape sequence"))?;
        let code = u32::from_str_radix(digits, 16)
            .map_err(|_| self.error("invalid hex escape"))?;
        let c = char::from_u32(code).ok_or_else(|| self.error("invalid code point"))?;
        self.pos += len;
        Ok(c)
    }
}
