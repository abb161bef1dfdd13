use std::fmt::Display;

use thiserror::Error;

/// Failure of a service operation, shared by every service boundary.
///
/// `Timeout` and `Unavailable` together mean "a dependency could not answer";
/// callers decide whether that dependency was required or can be degraded.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ServiceError {
    #[error("not found")]
    NotFound,
    #[error("access denied")]
    AccessDenied,
    #[error("unauthorized")]
    Unauthorized,
    #[error("validation failed: {0}")]
    ValidationFailed(String),
    #[error("{service} did not answer in time")]
    Timeout { service: String },
    #[error("{service} unavailable: {cause}")]
    Unavailable { service: String, cause: String },
}

impl ServiceError {
    pub fn timeout(service: impl Into<String>) -> Self {
        Self::Timeout {
            service: service.into(),
        }
    }

    pub fn unavailable(service: impl Into<String>, cause: impl Display) -> Self {
        Self::Unavailable {
            service: service.into(),
            cause: cause.to_string(),
        }
    }

    pub fn is_dependency_failure(&self) -> bool {
        matches!(self, Self::Timeout { .. } | Self::Unavailable { .. })
    }

    /// Machine-stable reason string.
    pub fn reason(&self) -> &'static str {
        match self {
            Self::NotFound => "not_found",
            Self::AccessDenied => "access_denied",
            Self::Unauthorized => "unauthorized",
            Self::ValidationFailed(_) => "validation_failed",
            Self::Timeout { .. } => "timeout",
            Self::Unavailable { .. } => "unavailable",
        }
    }
}

impl From<sqlx::Error> for ServiceError {
    fn from(value: sqlx::Error) -> Self {
        match value {
            sqlx::Error::RowNotFound => Self::NotFound,
            other => Self::unavailable("database", other),
        }
    }
}
