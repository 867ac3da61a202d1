//! Operator table and operator semantics.

use std::cmp::Ordering;

use crate::error::{ErrorCode, EvalError};
use crate::scan::is_ident_byte;
use crate::value::{values_equal, Numeric, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BinaryOp {
    Or,
    And,
    Eq,
    Ne,
    Le,
    Ge,
    Lt,
    Gt,
    Add,
    Sub,
    Mul,
    Div,
    Rem,
}

impl BinaryOp {
    pub(crate) fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Or => "||",
            BinaryOp::And => "&&",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::Le => "<=",
            BinaryOp::Ge => ">=",
            BinaryOp::Lt => "<",
            BinaryOp::Gt => ">",
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Rem => "%",
        }
    }
}

/// Loosest binding first. Within a level two-character symbols come first.
const LEVELS: [&[BinaryOp]; 6] = [
    &[BinaryOp::Or],
    &[BinaryOp::And],
    &[BinaryOp::Eq, BinaryOp::Ne],
    &[BinaryOp::Le, BinaryOp::Ge, BinaryOp::Lt, BinaryOp::Gt],
    &[BinaryOp::Add, BinaryOp::Sub],
    &[BinaryOp::Mul, BinaryOp::Div, BinaryOp::Rem],
];

/// Finds where to split `text`: the last top-level occurrence of the loosest
/// operator present, which makes every level left-associative.
pub(crate) fn find_split(text: &str, mask: &[bool]) -> Option<(usize, BinaryOp)> {
    let bytes = text.as_bytes();
    for level in LEVELS {
        for at in (0..bytes.len()).rev() {
            if !mask[at] {
                continue;
            }
            for &op in level {
                let symbol = op.symbol();
                let end = at + symbol.len();
                if end <= bytes.len()
                    && &bytes[at..end] == symbol.as_bytes()
                    && mask[end - 1]
                    && stands_alone(bytes, at, op)
                {
                    return Some((at, op));
                }
            }
        }
    }
    None
}

fn stands_alone(bytes: &[u8], at: usize, op: BinaryOp) -> bool {
    let prev = at.checked_sub(1).map(|index| bytes[index]);
    let next = bytes.get(at + op.symbol().len()).copied();
    match op {
        BinaryOp::Eq => !matches!(prev, Some(b'=' | b'!' | b'<' | b'>')),
        BinaryOp::Lt | BinaryOp::Gt => {
            next != Some(b'=') && !matches!(prev, Some(b'<' | b'>' | b'='))
        }
        BinaryOp::Add | BinaryOp::Sub => ends_operand(bytes, at) && !is_exponent_sign(bytes, at),
        _ => true,
    }
}

/// Whether the last non-space byte before `at` can end an operand, which is
/// what makes `+`/`-` binary rather than unary.
fn ends_operand(bytes: &[u8], at: usize) -> bool {
    bytes[..at]
        .iter()
        .rev()
        .find(|b| !b.is_ascii_whitespace())
        .is_some_and(|&b| is_ident_byte(b) || matches!(b, b')' | b']' | b'"'))
}

/// `1e-5`: the sign belongs to the numeric literal.
fn is_exponent_sign(bytes: &[u8], at: usize) -> bool {
    if at < 2 || !matches!(bytes[at - 1], b'e' | b'E') {
        return false;
    }
    let start = bytes[..at - 1]
        .iter()
        .rposition(|b| !(b.is_ascii_digit() || *b == b'.'))
        .map_or(0, |index| index + 1);
    let token = &bytes[start..at - 1];
    !token.is_empty()
        && token[0].is_ascii_digit()
        && (start == 0 || !is_ident_byte(bytes[start - 1]))
}

fn numeric_operands(op: BinaryOp, left: &Value, right: &Value) -> Result<(Numeric, Numeric), EvalError> {
    match (left.as_numeric(), right.as_numeric()) {
        (Some(a), Some(b)) => Ok((a, b)),
        _ => Err(EvalError::wrong_type(format!(
            "operator '{}' cannot be applied to {} and {}",
            op.symbol(),
            left.kind_name(),
            right.kind_name()
        ))),
    }
}

fn overflow(op: BinaryOp) -> EvalError {
    EvalError::new(
        ErrorCode::Overflow,
        format!("integer overflow in '{}'", op.symbol()),
    )
}

fn is_zero(number: Numeric) -> bool {
    match number {
        Numeric::Int(value) => value == 0,
        Numeric::Float(value) => value == 0.0,
    }
}

fn arithmetic(op: BinaryOp, left: Numeric, right: Numeric) -> Result<Value, EvalError> {
    if matches!(op, BinaryOp::Div | BinaryOp::Rem) && is_zero(right) {
        return Err(EvalError::new(ErrorCode::DivideByZero, "division by zero"));
    }
    if op == BinaryOp::Div {
        return Ok(Value::from(left.to_f64() / right.to_f64()));
    }
    match (left, right) {
        (Numeric::Int(a), Numeric::Int(b)) => {
            let result = match op {
                BinaryOp::Add => a.checked_add(b),
                BinaryOp::Sub => a.checked_sub(b),
                BinaryOp::Mul => a.checked_mul(b),
                BinaryOp::Rem => a.checked_rem(b),
                _ => None,
            };
            result.map(Value::from).ok_or_else(|| overflow(op))
        }
        _ => {
            let (a, b) = (left.to_f64(), right.to_f64());
            Ok(Value::from(match op {
                BinaryOp::Add => a + b,
                BinaryOp::Sub => a - b,
                BinaryOp::Mul => a * b,
                _ => a % b,
            }))
        }
    }
}

fn compare(op: BinaryOp, left: &Value, right: &Value) -> Result<Value, EvalError> {
    let ordering = match (left, right) {
        (Value::Str(a), Value::Str(b)) => Some(a.cmp(b)),
        (Value::Numeric(Numeric::Int(a)), Value::Numeric(Numeric::Int(b))) => Some(a.cmp(b)),
        _ => {
            let (a, b) = numeric_operands(op, left, right)?;
            a.to_f64().partial_cmp(&b.to_f64())
        }
    };
    // NaN compares false both ways.
    let Some(ordering) = ordering else {
        return Ok(Value::Bool(false));
    };
    Ok(Value::Bool(match op {
        BinaryOp::Lt => ordering == Ordering::Less,
        BinaryOp::Le => ordering != Ordering::Greater,
        BinaryOp::Gt => ordering == Ordering::Greater,
        _ => ordering != Ordering::Less,
    }))
}

/// Applies every operator except the short-circuiting `&&`/`||`, which the
/// evaluator handles before the right operand exists.
pub(crate) fn binary(op: BinaryOp, left: Value, right: Value) -> Result<Value, EvalError> {
    match op {
        BinaryOp::Eq => Ok(Value::Bool(values_equal(&left, &right))),
        BinaryOp::Ne => Ok(Value::Bool(!values_equal(&left, &right))),
        BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => compare(op, &left, &right),
        BinaryOp::Add if matches!(left, Value::Str(_)) || matches!(right, Value::Str(_)) => {
            Ok(Value::Str(format!("{}{}", left.format(), right.format())))
        }
        BinaryOp::Or | BinaryOp::And => {
            let (Value::Bool(a), Value::Bool(b)) = (&left, &right) else {
                return Err(logic_operand(op, &left, &right));
            };
            Ok(Value::Bool(if op == BinaryOp::Or { *a || *b } else { *a && *b }))
        }
        _ => {
            let (a, b) = numeric_operands(op, &left, &right)?;
            arithmetic(op, a, b)
        }
    }
}

pub(crate) fn logic_operand(op: BinaryOp, left: &Value, right: &Value) -> EvalError {
    EvalError::wrong_type(format!(
        "operator '{}' needs bool operands, got {} and {}",
        op.symbol(),
        left.kind_name(),
        right.kind_name()
    ))
}

pub(crate) fn not(value: Value) -> Result<Value, EvalError> {
    match value {
        Value::Bool(flag) => Ok(Value::Bool(!flag)),
        other => Err(EvalError::wrong_type(format!(
            "operator '!' cannot be applied to {}",
            other.kind_name()
        ))),
    }
}

pub(crate) fn negate(value: Value) -> Result<Value, EvalError> {
    match value {
        Value::Numeric(Numeric::Int(number)) => number
            .checked_neg()
            .map(Value::from)
            .ok_or_else(|| EvalError::new(ErrorCode::Overflow, "integer overflow in '-'")),
        Value::Numeric(Numeric::Float(number)) => Ok(Value::from(-number)),
        other => Err(EvalError::wrong_type(format!(
            "operator '-' cannot be applied to {}",
            other.kind_name()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scan::top_level_mask;

    fn split(text: &str) -> Option<(usize, BinaryOp)> {
        find_split(text, &top_level_mask(text).unwrap())
    }

    #[test]
    fn loosest_operator_wins_and_last_occurrence_splits() {
        assert_eq!(split("2 + 3 * 4"), Some((2, BinaryOp::Add)));
        assert_eq!(split("8 - 4 - 2"), Some((6, BinaryOp::Sub)));
        assert_eq!(split("a || b && c"), Some((2, BinaryOp::Or)));
        assert_eq!(split("a <= b"), Some((2, BinaryOp::Le)));
        assert_eq!(split("a != b"), Some((2, BinaryOp::Ne)));
    }

    #[test]
    fn unary_signs_and_exponents_do_not_split() {
        assert_eq!(split("-5"), None);
        assert_eq!(split("2 * -3"), Some((2, BinaryOp::Mul)));
        assert_eq!(split("1e-5 + 1"), Some((5, BinaryOp::Add)));
        assert_eq!(split("x - -1"), Some((2, BinaryOp::Sub)));
        assert_eq!(split("value-1"), Some((5, BinaryOp::Sub)));
    }

    #[test]
    fn nested_and_generic_text_is_skipped() {
        assert_eq!(split("(1 + 2)"), None);
        assert_eq!(split("f(a < b)"), None);
        assert_eq!(split("new List<int>()"), None);
        assert_eq!(split("\"a+b\""), None);
    }

    #[test]
    fn division_is_float_and_checks_zero() {
        let result = binary(BinaryOp::Div, Value::from(10i64), Value::from(4i64)).unwrap();
        assert_eq!(result.as_numeric(), Some(Numeric::Float(2.5)));
        let err = binary(BinaryOp::Rem, Value::from(10i64), Value::from(0i64)).unwrap_err();
        assert_eq!(err.code, ErrorCode::DivideByZero);
        let err = binary(BinaryOp::Div, Value::from(1.0f64), Value::from(0.0f64)).unwrap_err();
        assert_eq!(err.code, ErrorCode::DivideByZero);
    }

    #[test]
    fn integer_arithmetic_is_checked() {
        let err = binary(BinaryOp::Add, Value::from(i64::MAX), Value::from(1i64)).unwrap_err();
        assert_eq!(err.code, ErrorCode::Overflow);
        let err = negate(Value::from(i64::MIN)).unwrap_err();
        assert_eq!(err.code, ErrorCode::Overflow);
        let mixed = binary(BinaryOp::Mul, Value::from(2i64), Value::from(1.5f64)).unwrap();
        assert_eq!(mixed.as_numeric(), Some(Numeric::Float(3.0)));
    }

    #[test]
    fn strings_concatenate_and_compare() {
        let joined = binary(BinaryOp::Add, Value::from("hp: "), Value::from(5i64)).unwrap();
        assert_eq!(joined.format(), "hp: 5");
        let less = binary(BinaryOp::Lt, Value::from("abc"), Value::from("abd")).unwrap();
        assert_eq!(less.as_bool(), Some(true));
        let err = binary(BinaryOp::Sub, Value::from("a"), Value::from(1i64)).unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidArgumentType);
    }
}
