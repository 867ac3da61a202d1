use std::fmt;

use thiserror::Error;

/// Closed set of failure categories carried by [`crate::Value::Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum ErrorCode {
    InvalidArgumentCount = 1,
    InvalidArgumentType = 2,
    DivideByZero = 3,
    Overflow = 4,
    IndexOutOfRange = 5,
    MemberNotFound = 6,
    NotCallable = 7,
    NullReference = 8,
    TypeNotFound = 9,
    ParseError = 10,
    UnknownError = 11,
}

impl ErrorCode {
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::InvalidArgumentCount => "InvalidArgumentCount",
            ErrorCode::InvalidArgumentType => "InvalidArgumentType",
            ErrorCode::DivideByZero => "DivideByZero",
            ErrorCode::Overflow => "Overflow",
            ErrorCode::IndexOutOfRange => "IndexOutOfRange",
            ErrorCode::MemberNotFound => "MemberNotFound",
            ErrorCode::NotCallable => "NotCallable",
            ErrorCode::NullReference => "NullReference",
            ErrorCode::TypeNotFound => "TypeNotFound",
            ErrorCode::ParseError => "ParseError",
            ErrorCode::UnknownError => "UnknownError",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Evaluation failure. Never escapes the evaluator as a panic; it is either
/// returned through `Result` internally or surfaced as a `Value::Error`.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("error[{code}]: {message}")]
pub struct EvalError {
    pub code: ErrorCode,
    pub message: String,
}

impl EvalError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn parse(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ParseError, message)
    }

    pub fn member_not_found(owner: impl fmt::Display, member: &str) -> Self {
        Self::new(
            ErrorCode::MemberNotFound,
            format!("'{owner}' has no member '{member}'"),
        )
    }

    pub fn wrong_type(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidArgumentType, message)
    }

    pub fn read_only(target: &str) -> Self {
        Self::new(
            ErrorCode::InvalidArgumentType,
            format!("'{target}' is read-only"),
        )
    }
}

/// Failure reported by host code (member getters, methods, constructors,
/// preset getters). Host faults surface as [`ErrorCode::UnknownError`];
/// built-in members may pick a more precise code.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct HostError {
    pub code: ErrorCode,
    pub message: String,
}

impl HostError {
    pub fn new(message: impl Into<String>) -> Self {
        Self::with_code(ErrorCode::UnknownError, message)
    }

    pub fn with_code(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl From<&str> for HostError {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

impl From<String> for HostError {
    fn from(message: String) -> Self {
        Self::new(message)
    }
}

impl From<EvalError> for HostError {
    fn from(err: EvalError) -> Self {
        Self::with_code(err.code, err.message)
    }
}

impl From<HostError> for EvalError {
    fn from(err: HostError) -> Self {
        EvalError::new(err.code, err.message)
    }
}

/// Extracts a readable message from a caught panic payload.
pub fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(text) = payload.downcast_ref::<&str>() {
        (*text).to_string()
    } else if let Some(text) = payload.downcast_ref::<String>() {
        text.clone()
    } else {
        "host code panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_code_name() {
        let err = EvalError::new(ErrorCode::DivideByZero, "division by zero");
        assert_eq!(err.to_string(), "error[DivideByZero]: division by zero");
    }

    #[test]
    fn host_errors_become_unknown() {
        let err: EvalError = HostError::from("boom").into();
        assert_eq!(err.code, ErrorCode::UnknownError);
        assert_eq!(err.message, "boom");
    }

    #[test]
    fn codes_are_stable() {
        assert_eq!(ErrorCode::InvalidArgumentCount.as_i32(), 1);
        assert_eq!(ErrorCode::UnknownError.as_i32(), 11);
    }
}
