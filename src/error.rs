//! Application-wide error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("config error: {0}")]
    Config(String),

    #[error("logger error: {0}")]
    Logger(String),

    #[error("store error: {0}")]
    Store(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("invalid input: {0}")]
    Validation(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("no approval rule applies: {0}")]
    NoApplicableRule(String),

    #[error("no approver available: {0}")]
    NoApprover(String),
}

impl AppError {
    /// Short machine-readable code used in API error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Config(_) => "config",
            AppError::Logger(_) => "logger",
            AppError::Store(_) | AppError::Io(_) => "internal",
            AppError::NotFound(_) => "not_found",
            AppError::Forbidden(_) => "forbidden",
            AppError::Unauthorized(_) => "unauthorized",
            AppError::Validation(_) => "bad_request",
            AppError::Conflict(_) => "conflict",
            AppError::NoApplicableRule(_) => "no_applicable_rule",
            AppError::NoApprover(_) => "no_approver",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn config_error_display() {
        let e = AppError::Config("missing field".into());
        assert!(e.to_string().contains("missing field"));
        assert!(e.to_string().starts_with("config error"));
    }

    #[test]
    fn store_error_display() {
        let e = AppError::Store("disk full".into());
        assert!(e.to_string().contains("disk full"));
        assert_eq!(e.code(), "internal");
    }

    #[test]
    fn workflow_errors_have_distinct_codes() {
        assert_eq!(AppError::NoApplicableRule("leave".into()).code(), "no_applicable_rule");
        assert_eq!(AppError::NoApprover("department_leader".into()).code(), "no_approver");
        assert_eq!(AppError::Conflict("x".into()).code(), "conflict");
    }

    #[test]
    fn io_error_converts() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file missing");
        let e: AppError = io_err.into();
        assert!(e.to_string().contains("io error"));
        let _: &dyn Error = &e;
    }
}
