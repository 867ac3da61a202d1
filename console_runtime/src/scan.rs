//! Byte-level scanning helpers shared by the evaluator and the type resolver.
//!
//! Every structural character the grammar cares about is ASCII, so slicing at
//! the positions found here always lands on a char boundary.

use crate::error::{ErrorCode, EvalError};
use crate::value::Value;

pub(crate) fn is_ident_byte(byte: u8) -> bool {
    byte.is_ascii_alphanumeric() || byte == b'_'
}

pub(crate) fn is_identifier(text: &str) -> bool {
    let bytes = text.as_bytes();
    !bytes.is_empty() && !bytes[0].is_ascii_digit() && bytes.iter().all(|b| is_ident_byte(*b))
}

/// Index of the closing quote of the string literal opening at `start`.
pub(crate) fn string_end(bytes: &[u8], start: usize) -> Option<usize> {
    let mut at = start + 1;
    while at < bytes.len() {
        match bytes[at] {
            b'\\' => at += 2,
            b'"' => return Some(at),
            _ => at += 1,
        }
    }
    None
}

/// Index of the `>` closing a generic argument list opened at `open`, or
/// `None` when the `<` there is a comparison.
///
/// A generic list follows an identifier, holds only type-name characters and
/// is followed by the end of input or by `( ) . , [ ] ;` or whitespace.
pub(crate) fn generic_close(src: &str, open: usize) -> Option<usize> {
    let bytes = src.as_bytes();
    if open == 0 || bytes.get(open) != Some(&b'<') || !is_ident_byte(bytes[open - 1]) {
        return None;
    }
    let mut depth = 0usize;
    for (at, &byte) in bytes.iter().enumerate().skip(open) {
        match byte {
            b'<' => depth += 1,
            b'>' => {
                depth -= 1;
                if depth == 0 {
                    let follows = match bytes.get(at + 1) {
                        None => true,
                        Some(next) => {
                            next.is_ascii_whitespace()
                                || matches!(next, b'(' | b')' | b'.' | b',' | b'[' | b']' | b';')
                        }
                    };
                    return follows.then_some(at);
                }
            }
            b'.' | b',' | b'[' | b']' => {}
            _ if is_ident_byte(byte) || byte.is_ascii_whitespace() => {}
            _ => return None,
        }
    }
    None
}

/// Marks the bytes of `src` that sit outside every parenthesis, bracket,
/// generic argument list and string literal.
pub(crate) fn top_level_mask(src: &str) -> Result<Vec<bool>, EvalError> {
    let bytes = src.as_bytes();
    let mut mask = vec![false; bytes.len()];
    let mut closers: Vec<u8> = Vec::new();
    let mut at = 0;
    while at < bytes.len() {
        let byte = bytes[at];
        match byte {
            b'"' => {
                let end = string_end(bytes, at)
                    .ok_or_else(|| EvalError::parse(format!("unterminated string in '{src}'")))?;
                at = end + 1;
                continue;
            }
            b'(' | b'[' => {
                mask[at] = closers.is_empty();
                closers.push(if byte == b'(' { b')' } else { b']' });
            }
            b')' | b']' => {
                if closers.pop() != Some(byte) {
                    return Err(EvalError::parse(format!(
                        "unbalanced '{}' in '{src}'",
                        byte as char
                    )));
                }
                mask[at] = closers.is_empty();
            }
            b'<' => match generic_close(src, at) {
                Some(close) => {
                    at = close + 1;
                    continue;
                }
                None => mask[at] = closers.is_empty(),
            },
            _ => mask[at] = closers.is_empty(),
        }
        at += 1;
    }
    if let Some(missing) = closers.last() {
        return Err(EvalError::parse(format!(
            "missing '{}' in '{src}'",
            *missing as char
        )));
    }
    Ok(mask)
}

/// Splits on every top-level `separator`. An empty input yields one empty
/// piece.
pub(crate) fn split_top_level(src: &str, separator: u8) -> Result<Vec<&str>, EvalError> {
    let mask = top_level_mask(src)?;
    let mut pieces = Vec::new();
    let mut start = 0;
    for (at, byte) in src.bytes().enumerate() {
        if byte == separator && mask[at] {
            pieces.push(&src[start..at]);
            start = at + 1;
        }
    }
    pieces.push(&src[start..]);
    Ok(pieces)
}

/// Splits a reference chain on top-level `.`, keeping decimal points of
/// numeric literals inside their segment.
pub(crate) fn split_chain(src: &str) -> Result<Vec<&str>, EvalError> {
    let mask = top_level_mask(src)?;
    let bytes = src.as_bytes();
    let mut pieces = Vec::new();
    let mut start = 0;
    for (at, &byte) in bytes.iter().enumerate() {
        if byte != b'.' || !mask[at] {
            continue;
        }
        let current = src[start..at].trim();
        let decimal = !current.is_empty()
            && current.bytes().all(|b| b.is_ascii_digit())
            && bytes.get(at + 1).is_some_and(u8::is_ascii_digit);
        if !decimal {
            pieces.push(&src[start..at]);
            start = at + 1;
        }
    }
    pieces.push(&src[start..]);
    Ok(pieces)
}

/// Index of the `)` or `]` matching the opener at `open`.
pub(crate) fn find_matching(src: &str, open: usize) -> Option<usize> {
    let bytes = src.as_bytes();
    let mut closers: Vec<u8> = Vec::new();
    let mut at = open;
    while at < bytes.len() {
        match bytes[at] {
            b'"' => at = string_end(bytes, at)?,
            b'(' => closers.push(b')'),
            b'[' => closers.push(b']'),
            byte @ (b')' | b']') => {
                if closers.pop() != Some(byte) {
                    return None;
                }
                if closers.is_empty() {
                    return Some(at);
                }
            }
            _ => {}
        }
        at += 1;
    }
    None
}

/// Index of the opener matched by the `)` or `]` at `close`.
pub(crate) fn find_opening(src: &str, close: usize) -> Option<usize> {
    let bytes = src.as_bytes();
    let mut openers: Vec<usize> = Vec::new();
    let mut at = 0;
    while at <= close && at < bytes.len() {
        match bytes[at] {
            b'"' => at = string_end(bytes, at)?,
            b'(' | b'[' => openers.push(at),
            b')' | b']' => {
                let opener = openers.pop()?;
                if at == close {
                    return Some(opener);
                }
            }
            _ => {}
        }
        at += 1;
    }
    None
}

/// Removes parentheses that enclose the whole expression, repeatedly.
pub(crate) fn strip_outer_parens(src: &str) -> &str {
    let mut text = src.trim();
    while text.starts_with('(') && find_matching(text, 0) == Some(text.len() - 1) {
        text = text[1..text.len() - 1].trim();
    }
    text
}

/// Position of the first top-level `=` that is an assignment rather than
/// part of `==`, `!=`, `<=` or `>=`.
pub(crate) fn find_assignment(src: &str) -> Result<Option<usize>, EvalError> {
    let mask = top_level_mask(src)?;
    let bytes = src.as_bytes();
    Ok((0..bytes.len()).find(|&at| {
        bytes[at] == b'='
            && mask[at]
            && !matches!(at.checked_sub(1).map(|prev| bytes[prev]), Some(b'=' | b'!' | b'<' | b'>'))
            && bytes.get(at + 1) != Some(&b'=')
    }))
}

/// Parses `text` when the whole of it is a literal. `None` means "not a
/// literal"; `Some(Err)` is a malformed or out-of-range literal.
pub(crate) fn parse_literal(text: &str) -> Option<Result<Value, EvalError>> {
    match text {
        "true" => return Some(Ok(Value::Bool(true))),
        "false" => return Some(Ok(Value::Bool(false))),
        "null" => return Some(Ok(Value::Null)),
        _ => {}
    }
    if text.starts_with('"') {
        return match string_end(text.as_bytes(), 0) {
            Some(end) if end == text.len() - 1 => Some(unescape(&text[1..end]).map(Value::Str)),
            _ => None,
        };
    }
    parse_number(text)
}

fn parse_number(text: &str) -> Option<Result<Value, EvalError>> {
    let body = text.strip_prefix('-').unwrap_or(text);
    if !body.starts_with(|c: char| c.is_ascii_digit()) {
        return None;
    }
    let (number, suffix) = match body.as_bytes()[body.len() - 1] {
        suffix @ (b'L' | b'l' | b'f' | b'F' | b'd' | b'D') => {
            (&text[..text.len() - 1], Some(suffix.to_ascii_lowercase()))
        }
        _ => (text, None),
    };
    let is_float = numeric_shape(number.strip_prefix('-').unwrap_or(number))?;
    match (is_float, suffix) {
        (true, Some(b'l')) => None,
        (false, None | Some(b'l')) => Some(number.parse::<i64>().map(Value::from).map_err(|_| {
            EvalError::new(
                ErrorCode::Overflow,
                format!("integer literal {text} is out of range"),
            )
        })),
        _ => Some(match number.parse::<f64>() {
            Ok(value) if value.is_finite() => Ok(Value::from(value)),
            _ => Err(EvalError::new(
                ErrorCode::Overflow,
                format!("float literal {text} is out of range"),
            )),
        }),
    }
}

/// `Some(is_float)` when `body` is `digits[.digits][e[+-]digits]`.
fn numeric_shape(body: &str) -> Option<bool> {
    let bytes = body.as_bytes();
    let digits = |from: usize| bytes[from..].iter().take_while(|b| b.is_ascii_digit()).count();
    let mut at = digits(0);
    if at == 0 {
        return None;
    }
    let mut is_float = false;
    if bytes.get(at) == Some(&b'.') {
        let fraction = digits(at + 1);
        if fraction == 0 {
            return None;
        }
        at += 1 + fraction;
        is_float = true;
    }
    if matches!(bytes.get(at), Some(b'e' | b'E')) {
        at += 1;
        if matches!(bytes.get(at), Some(b'+' | b'-')) {
            at += 1;
        }
        let exponent = digits(at);
        if exponent == 0 {
            return None;
        }
        at += exponent;
        is_float = true;
    }
    (at == bytes.len()).then_some(is_float)
}

fn unescape(raw: &str) -> Result<String, EvalError> {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }
        match chars.next() {
            Some('"') => out.push('"'),
            Some('\\') => out.push('\\'),
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('0') => out.push('\0'),
            Some(other) => {
                return Err(EvalError::parse(format!("unknown escape '\\{other}'")));
            }
            None => return Err(EvalError::parse("dangling escape at end of string")),
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::RawValue;

    fn raw(text: &str) -> Option<RawValue> {
        parse_literal(text).unwrap().unwrap().raw_value()
    }

    #[test]
    fn literals_parse_to_native_values() {
        assert_eq!(raw("42"), Some(RawValue::Int(42)));
        assert_eq!(raw("42L"), Some(RawValue::Int(42)));
        assert_eq!(raw("-7"), Some(RawValue::Int(-7)));
        assert_eq!(raw("3.14"), Some(RawValue::Float(3.14)));
        assert_eq!(raw("2.5f"), Some(RawValue::Float(2.5)));
        assert_eq!(raw("1e3"), Some(RawValue::Float(1000.0)));
        assert_eq!(raw("4d"), Some(RawValue::Float(4.0)));
        assert_eq!(raw("true"), Some(RawValue::Bool(true)));
        assert_eq!(raw("\"a\\\"b\\n\""), Some(RawValue::Str("a\"b\n".into())));
        assert_eq!(raw("null"), None);
    }

    #[test]
    fn non_literals_are_left_alone() {
        assert!(parse_literal("x").is_none());
        assert!(parse_literal("1.5L").is_none());
        assert!(parse_literal("1.").is_none());
        assert!(parse_literal("\"a\" + \"b\"").is_none());
        assert!(parse_literal("12abc").is_none());
    }

    #[test]
    fn oversized_integers_overflow() {
        let err = parse_literal("99999999999999999999").unwrap().unwrap_err();
        assert_eq!(err.code, ErrorCode::Overflow);
        assert!(parse_literal("-9223372036854775808").unwrap().is_ok());
    }

    #[test]
    fn generic_brackets_are_told_apart_from_comparisons() {
        assert_eq!(generic_close("List<int>()", 4), Some(8));
        assert_eq!(generic_close("Dictionary<string, List<int>>", 10), Some(28));
        assert_eq!(generic_close("a < b", 2), None);
        assert_eq!(generic_close("a<b && c>d", 1), None);
        assert_eq!(generic_close("x<y>z", 1), None);
    }

    #[test]
    fn splitting_respects_nesting() {
        assert_eq!(
            split_top_level("f(a, b), \"x,y\", c[1,2]", b',').unwrap(),
            vec!["f(a, b)", " \"x,y\"", " c[1,2]"]
        );
        assert_eq!(
            split_chain("a.b(c.d).e[f.g]").unwrap(),
            vec!["a", "b(c.d)", "e[f.g]"]
        );
        assert_eq!(split_chain("1.5.ToString()").unwrap(), vec!["1.5", "ToString()"]);
        assert_eq!(
            split_chain("System.Collections.Generic.List<System.Int32>").unwrap(),
            vec!["System", "Collections", "Generic", "List<System.Int32>"]
        );
    }

    #[test]
    fn unbalanced_input_is_a_parse_error() {
        assert_eq!(top_level_mask("(1 + 2").unwrap_err().code, ErrorCode::ParseError);
        assert_eq!(top_level_mask("a]").unwrap_err().code, ErrorCode::ParseError);
        assert_eq!(top_level_mask("\"open").unwrap_err().code, ErrorCode::ParseError);
    }

    #[test]
    fn outer_parens_and_assignment() {
        assert_eq!(strip_outer_parens(" ((1 + 2)) "), "1 + 2");
        assert_eq!(strip_outer_parens("(1) + (2)"), "(1) + (2)");
        assert_eq!(find_assignment("x = a == b").unwrap(), Some(2));
        assert_eq!(find_assignment("a <= b").unwrap(), None);
        assert_eq!(find_assignment("a[\"=\"] != 1").unwrap(), None);
        assert_eq!(find_opening("a[b[1]]", 6), Some(1));
    }
}
