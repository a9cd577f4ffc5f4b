use std::fmt;

use thiserror::Error;

pub const ERROR_TAG: &str = "\x1b[31m[ERROR]\x1b[0m";
pub const WARN_TAG: &str = "\x1b[33m[WARN]\x1b[0m";

#[derive(Clone, Debug)]
pub struct RuntimeErrorData {
    pub message: String,
}

impl RuntimeErrorData {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl fmt::Display for RuntimeErrorData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

#[derive(Clone, Debug)]
pub struct GuardErrorData {
    pub message: String,
}

impl GuardErrorData {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl fmt::Display for GuardErrorData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

#[derive(Error, Debug, Clone)]
pub enum SorrelError {
    #[error("Arity mismatch: {0}")]
    Arity(RuntimeErrorData),

    #[error("Type mismatch: expected {expected}, got {actual}")]
    TypeMismatch { expected: String, actual: String },

    #[error("Message: {0}")]
    Message(RuntimeErrorData),

    #[error("Runtime error: {0}")]
    Other(RuntimeErrorData),

    #[error("{0}")]
    Guard(GuardErrorData),
}

impl SorrelError {
    pub fn arity(message: impl Into<String>) -> Self {
        SorrelError::Arity(RuntimeErrorData::new(message))
    }

    pub fn type_mismatch(expected: impl Into<String>, actual: impl Into<String>) -> Self {
        SorrelError::TypeMismatch {
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    pub fn message(message: impl Into<String>) -> Self {
        SorrelError::Message(RuntimeErrorData::new(message))
    }

    pub fn runtime(message: impl Into<String>) -> Self {
        SorrelError::Other(RuntimeErrorData::new(message))
    }

    pub fn guard(message: impl Into<String>) -> Self {
        SorrelError::Guard(GuardErrorData::new(message))
    }
}

pub fn format_error(err: &SorrelError) -> Vec<String> {
    vec![format!("{} {}", ERROR_TAG, err)]
}

impl From<String> for SorrelError {
    fn from(s: String) -> Self {
        SorrelError::runtime(s)
    }
}

impl From<&str> for SorrelError {
    fn from(s: &str) -> Self {
        SorrelError::runtime(s.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arity_error_displays_message() {
        let err = SorrelError::arity("expected at least 1 args, got 0");
        assert_eq!(err.to_string(), "Arity mismatch: expected at least 1 args, got 0");
    }

    #[test]
    fn type_mismatch_names_both_sides() {
        let err = SorrelError::type_mismatch("callable", "str");
        assert_eq!(err.to_string(), "Type mismatch: expected callable, got str");
    }

    #[test]
    fn string_conversions_land_on_runtime_error() {
        let err: SorrelError = "boom".into();
        assert!(matches!(err, SorrelError::Other(_)));
        let err: SorrelError = String::from("boom").into();
        assert_eq!(err.to_string(), "Runtime error: boom");
    }

    #[test]
    fn format_error_prefixes_tag() {
        let lines = format_error(&SorrelError::runtime("bad call"));
        assert_eq!(lines.len(), 1);
        assert!(lines[0].starts_with(ERROR_TAG));
        assert!(lines[0].ends_with("Runtime error: bad call"));
    }
}
