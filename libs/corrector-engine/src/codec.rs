//! Argument Codec - Test Case Input/Output Text Model
//!
//! **Core Responsibility:**
//! Turn a call descriptor into a typed argument vector, and turn whatever a
//! routine returns into one canonical string.
//!
//! **Canonical Encoding Rules:**
//! - Integers as written, floats without trailing zeros (`6.0` → `6`)
//! - Strings unquoted at top level, double-quoted inside lists
//! - Lists as `[a, b]`, maps as `{key: value}` in key order
//! - Unit (no value) encodes as the empty string
//!
//! Comparison between expected and actual is plain string equality on this
//! projection: no numeric tolerance, no coercion beyond these rules.

use corrector_common::types::{CallDescriptor, LiteralValue};
use rhai::{Array, Dynamic, Map};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("Empty call descriptor")]
    Empty,
    #[error("Ambiguous call descriptor: both a call expression and an argument list were given")]
    Ambiguous,
    #[error("Malformed call expression: {0}")]
    Malformed(String),
}

/// A decoded test-case input.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedCall {
    /// Routine named by a call expression; `None` for positional lists
    pub routine: Option<String>,
    pub args: Vec<LiteralValue>,
}

pub fn decode(descriptor: &CallDescriptor) -> Result<DecodedCall, DecodeError> {
    match (&descriptor.call, &descriptor.args) {
        (Some(_), Some(_)) => Err(DecodeError::Ambiguous),
        (Some(call), None) => parse_call(call),
        (None, Some(args)) if !args.is_empty() => Ok(DecodedCall {
            routine: None,
            args: args.clone(),
        }),
        _ => Err(DecodeError::Empty),
    }
}

/// Parse a call expression such as `sum(2, "a, b", [1, 2])`.
pub fn parse_call(expression: &str) -> Result<DecodedCall, DecodeError> {
    let expression = expression.trim();
    if expression.is_empty() {
        return Err(DecodeError::Empty);
    }

    let open = expression
        .find('(')
        .ok_or_else(|| malformed("missing opening parenthesis"))?;
    if !expression.ends_with(')') {
        return Err(malformed("missing closing parenthesis"));
    }

    let name = expression[..open].trim();
    if name.is_empty() {
        return Err(malformed("missing routine name before '('"));
    }
    if !is_identifier(name) {
        return Err(malformed(format!("'{}' is not a valid routine name", name)));
    }

    let inner = &expression[open + 1..expression.len() - 1];
    let args = if inner.trim().is_empty() {
        Vec::new()
    } else {
        split_top_level(inner)?
            .into_iter()
            .map(parse_token)
            .collect::<Result<Vec<_>, _>>()?
    };

    Ok(DecodedCall {
        routine: Some(name.to_string()),
        args,
    })
}

pub(crate) fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        _ => false,
    }
}

fn malformed(reason: impl Into<String>) -> DecodeError {
    DecodeError::Malformed(reason.into())
}

/// Split on commas that sit outside quotes and brackets.
fn split_top_level(text: &str) -> Result<Vec<&str>, DecodeError> {
    let mut parts = Vec::new();
    let mut depth: usize = 0;
    let mut quote: Option<char> = None;
    let mut escaped = false;
    let mut start = 0;

    for (idx, c) in text.char_indices() {
        if let Some(q) = quote {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == q {
                quote = None;
            }
            continue;
        }

        match c {
            '"' | '\'' => quote = Some(c),
            '(' | '[' | '{' => depth += 1,
            ')' | ']' | '}' => {
                depth = depth
                    .checked_sub(1)
                    .ok_or_else(|| malformed(format!("unexpected '{}'", c)))?;
            }
            ',' if depth == 0 => {
                parts.push(&text[start..idx]);
                start = idx + 1;
            }
            _ => {}
        }
    }

    if quote.is_some() {
        return Err(malformed("unterminated string literal"));
    }
    if depth != 0 {
        return Err(malformed("unbalanced brackets"));
    }
    parts.push(&text[start..]);
    Ok(parts)
}

fn parse_token(token: &str) -> Result<LiteralValue, DecodeError> {
    let token = token.trim();
    if token.is_empty() {
        return Err(malformed("empty argument"));
    }

    if is_quoted(token) {
        return snailquote::unescape(&as_double_quoted(token))
            .map(LiteralValue::String)
            .map_err(|e| malformed(format!("bad string literal {}: {}", token, e)));
    }

    if token.starts_with('[') && token.ends_with(']') {
        let inner = &token[1..token.len() - 1];
        if inner.trim().is_empty() {
            return Ok(LiteralValue::List(Vec::new()));
        }
        return split_top_level(inner)?
            .into_iter()
            .map(parse_token)
            .collect::<Result<Vec<_>, _>>()
            .map(LiteralValue::List);
    }

    match token {
        "true" => return Ok(LiteralValue::Bool(true)),
        "false" => return Ok(LiteralValue::Bool(false)),
        _ => {}
    }

    if looks_numeric(token) {
        if let Ok(integer) = token.parse::<i64>() {
            return Ok(LiteralValue::Integer(integer));
        }
        if let Ok(float) = token.parse::<f64>() {
            return Ok(LiteralValue::Float(float));
        }
    }

    Ok(LiteralValue::String(token.to_string()))
}

fn is_quoted(token: &str) -> bool {
    token.len() >= 2
        && ((token.starts_with('"') && token.ends_with('"'))
            || (token.starts_with('\'') && token.ends_with('\'')))
}

/// Rewrites a quoted token with double quotes so both quote styles share
/// one set of backslash escapes.
fn as_double_quoted(token: &str) -> String {
    if token.starts_with('"') {
        return token.to_string();
    }
    let mut out = String::with_capacity(token.len() + 2);
    out.push('"');
    let mut escaped = false;
    for c in token[1..token.len() - 1].chars() {
        if escaped {
            if c != '\'' {
                out.push('\\');
            }
            out.push(c);
            escaped = false;
        } else if c == '\\' {
            escaped = true;
        } else if c == '"' {
            out.push_str("\\\"");
        } else {
            out.push(c);
        }
    }
    out.push('"');
    out
}

/// Keeps words like `inf` or `NaN` as strings.
fn looks_numeric(token: &str) -> bool {
    let body = token.strip_prefix(['-', '+']).unwrap_or(token);
    body.starts_with(|c: char| c.is_ascii_digit() || c == '.')
        && body.chars().any(|c| c.is_ascii_digit())
}

pub fn encode(value: &LiteralValue) -> String {
    match value {
        LiteralValue::String(s) => s.clone(),
        other => encode_nested(other),
    }
}

fn encode_nested(value: &LiteralValue) -> String {
    match value {
        LiteralValue::Bool(b) => b.to_string(),
        LiteralValue::Integer(i) => i.to_string(),
        LiteralValue::Float(f) => format_float(*f),
        LiteralValue::String(s) => format!("{:?}", s),
        LiteralValue::List(items) => format!(
            "[{}]",
            items.iter().map(encode_nested).collect::<Vec<_>>().join(", ")
        ),
    }
}

/// Canonical string for a value produced by the interpreter.
pub fn encode_dynamic(value: &Dynamic) -> String {
    let value = value.flatten_clone();
    if value.is_string() {
        return value.to_string();
    }
    if let Ok(c) = value.as_char() {
        return c.to_string();
    }
    encode_dynamic_nested(&value)
}

fn encode_dynamic_nested(value: &Dynamic) -> String {
    let value = value.flatten_clone();
    if value.is_unit() {
        return String::new();
    }
    if let Ok(b) = value.as_bool() {
        return b.to_string();
    }
    if let Ok(i) = value.as_int() {
        return i.to_string();
    }
    if let Ok(f) = value.as_float() {
        return format_float(f);
    }
    if let Ok(c) = value.as_char() {
        return format!("{:?}", c.to_string());
    }
    if value.is_string() {
        return format!("{:?}", value.to_string());
    }
    if let Some(array) = value.read_lock::<Array>() {
        return format!(
            "[{}]",
            array
                .iter()
                .map(encode_dynamic_nested)
                .collect::<Vec<_>>()
                .join(", ")
        );
    }
    if let Some(map) = value.read_lock::<Map>() {
        return format!(
            "{{{}}}",
            map.iter()
                .map(|(key, item)| format!("{}: {}", key, encode_dynamic_nested(item)))
                .collect::<Vec<_>>()
                .join(", ")
        );
    }
    value.to_string()
}

pub fn format_float(value: f64) -> String {
    if value.is_nan() {
        "NaN".to_string()
    } else if value.is_infinite() {
        let sign = if value > 0.0 { "" } else { "-" };
        format!("{}Infinity", sign)
    } else if value == value.trunc() && value.abs() < 1e15 {
        // also folds -0.0 into "0"
        format!("{}", value as i64)
    } else {
        format!("{}", value)
    }
}

pub fn to_dynamic(value: &LiteralValue) -> Dynamic {
    match value {
        LiteralValue::Bool(b) => Dynamic::from_bool(*b),
        LiteralValue::Integer(i) => Dynamic::from_int(*i),
        LiteralValue::Float(f) => Dynamic::from_float(*f),
        LiteralValue::String(s) => Dynamic::from(s.clone()),
        LiteralValue::List(items) => Dynamic::from_array(items.iter().map(to_dynamic).collect()),
    }
}

/// Human-readable rendering of a descriptor for case results.
pub fn describe(descriptor: &CallDescriptor) -> String {
    match (&descriptor.call, &descriptor.args) {
        (Some(call), _) => call.trim().to_string(),
        (None, Some(args)) => format!(
            "({})",
            args.iter().map(encode_nested).collect::<Vec<_>>().join(", ")
        ),
        (None, None) => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args_of(expression: &str) -> Vec<LiteralValue> {
        parse_call(expression).unwrap().args
    }

    #[test]
    fn test_decode_simple_call() {
        let decoded = parse_call("sum(2, 3)").unwrap();
        assert_eq!(decoded.routine.as_deref(), Some("sum"));
        assert_eq!(
            decoded.args,
            vec![LiteralValue::Integer(2), LiteralValue::Integer(3)]
        );
    }

    #[test]
    fn test_decode_numeric_round_trip() {
        let decoded = parse_call("f(3)").unwrap();
        assert_eq!(encode(&decoded.args[0]), "3");
    }

    #[test]
    fn test_decode_coercions() {
        assert_eq!(
            args_of(r#"f(-1.5, "a, b", 'x', bare, true, [1, "two"])"#),
            vec![
                LiteralValue::Float(-1.5),
                LiteralValue::String("a, b".to_string()),
                LiteralValue::String("x".to_string()),
                LiteralValue::String("bare".to_string()),
                LiteralValue::Bool(true),
                LiteralValue::List(vec![
                    LiteralValue::Integer(1),
                    LiteralValue::String("two".to_string()),
                ]),
            ]
        );
    }

    #[test]
    fn test_decode_keeps_word_like_numbers_as_strings() {
        assert_eq!(
            args_of("f(inf, NaN)"),
            vec![
                LiteralValue::String("inf".to_string()),
                LiteralValue::String("NaN".to_string()),
            ]
        );
    }

    #[test]
    fn test_decode_escaped_quote() {
        assert_eq!(
            args_of(r#"greet("say \"hi\"")"#),
            vec![LiteralValue::String(r#"say "hi""#.to_string())]
        );
    }

    #[test]
    fn test_decode_escaped_quote_in_single_quotes() {
        assert_eq!(
            args_of(r#"greet('it\'s', 'a, b', 'say "hi"', 'tab\tend')"#),
            vec![
                LiteralValue::String("it's".to_string()),
                LiteralValue::String("a, b".to_string()),
                LiteralValue::String(r#"say "hi""#.to_string()),
                LiteralValue::String("tab\tend".to_string()),
            ]
        );
        assert!(parse_call(r#"f('open\')"#).is_err());
    }

    #[test]
    fn test_decode_no_arguments() {
        let decoded = parse_call("now()").unwrap();
        assert!(decoded.args.is_empty());
    }

    #[test]
    fn test_decode_malformed() {
        for bad in ["sum 2, 3", "sum(2, 3", "(2, 3)", "sum(1,,2)", "f(\"open)", "f(1))(", "9f(1)"] {
            assert!(
                matches!(parse_call(bad), Err(DecodeError::Malformed(_))),
                "expected malformed: {}",
                bad
            );
        }
    }

    #[test]
    fn test_decode_rejects_empty_and_ambiguous() {
        assert_eq!(decode(&CallDescriptor::call("   ")), Err(DecodeError::Empty));
        assert_eq!(decode(&CallDescriptor::args(vec![])), Err(DecodeError::Empty));
        assert_eq!(
            decode(&CallDescriptor {
                call: None,
                args: None
            }),
            Err(DecodeError::Empty)
        );
        assert_eq!(
            decode(&CallDescriptor {
                call: Some("f(1)".to_string()),
                args: Some(vec![LiteralValue::Integer(1)]),
            }),
            Err(DecodeError::Ambiguous)
        );
    }

    #[test]
    fn test_decode_positional_passthrough() {
        let args = vec![LiteralValue::Integer(4), LiteralValue::String("x".to_string())];
        let decoded = decode(&CallDescriptor::args(args.clone())).unwrap();
        assert_eq!(decoded.routine, None);
        assert_eq!(decoded.args, args);
    }

    #[test]
    fn test_format_float() {
        assert_eq!(format_float(6.0), "6");
        assert_eq!(format_float(2.50), "2.5");
        assert_eq!(format_float(-0.0), "0");
        assert_eq!(format_float(0.1 + 0.2), "0.30000000000000004");
        assert_eq!(format_float(f64::NAN), "NaN");
        assert_eq!(format_float(f64::NEG_INFINITY), "-Infinity");
    }

    #[test]
    fn test_encode_dynamic() {
        assert_eq!(encode_dynamic(&Dynamic::from_int(6)), "6");
        assert_eq!(encode_dynamic(&Dynamic::from_float(6.0)), "6");
        assert_eq!(encode_dynamic(&Dynamic::from("hello".to_string())), "hello");
        assert_eq!(encode_dynamic(&Dynamic::UNIT), "");
        let array = Dynamic::from_array(vec![
            Dynamic::from_int(1),
            Dynamic::from("a".to_string()),
            Dynamic::from_float(2.5),
        ]);
        assert_eq!(encode_dynamic(&array), r#"[1, "a", 2.5]"#);
    }

    #[test]
    fn test_encode_matches_dynamic_projection() {
        let value = LiteralValue::List(vec![LiteralValue::Bool(false), LiteralValue::Float(3.0)]);
        assert_eq!(encode(&value), encode_dynamic(&to_dynamic(&value)));
    }

    #[test]
    fn test_describe() {
        assert_eq!(describe(&CallDescriptor::call(" f(1) ")), "f(1)");
        assert_eq!(
            describe(&CallDescriptor::args(vec![
                LiteralValue::Integer(1),
                LiteralValue::String("a".to_string())
            ])),
            r#"(1, "a")"#
        );
    }
}
