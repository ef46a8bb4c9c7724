use serde::Serialize;
use serde_json::{json, Value};
use std::time::Duration;
use thiserror::Error;

/// Closed set of failure kinds reported at the service boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    ValidationError,
    Unauthorized,
    Forbidden,
    NotFound,
    RateLimited,
    InternalError,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::ValidationError => "VALIDATION_ERROR",
            ErrorKind::Unauthorized => "UNAUTHORIZED",
            ErrorKind::Forbidden => "FORBIDDEN",
            ErrorKind::NotFound => "NOT_FOUND",
            ErrorKind::RateLimited => "RATE_LIMITED",
            ErrorKind::InternalError => "INTERNAL_ERROR",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug, Clone)]
pub enum WatchlistError {
    #[error("{message}")]
    Validation {
        message: String,
        details: Option<Value>,
    },

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    #[error("Rate limit exceeded, retry in {}ms", .retry_after.as_millis())]
    RateLimited { retry_after: Duration },

    #[error("{message}")]
    Internal {
        message: String,
        details: Option<Value>,
    },
}

pub type WatchlistResult<T> = Result<T, WatchlistError>;

impl WatchlistError {
    pub fn validation(message: impl Into<String>) -> Self {
        WatchlistError::Validation {
            message: message.into(),
            details: None,
        }
    }

    pub fn validation_field(field: &str, message: impl Into<String>) -> Self {
        WatchlistError::Validation {
            message: message.into(),
            details: Some(json!({ "field": field })),
        }
    }

    pub fn not_found(what: &str, id: impl std::fmt::Display) -> Self {
        WatchlistError::NotFound(format!("{} not found: {}", what, id))
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        WatchlistError::Forbidden(message.into())
    }

    pub fn unauthorized() -> Self {
        WatchlistError::Unauthorized("Authentication required".to_string())
    }

    /// Wrap a fault from outside the taxonomy. The cause is only
    /// kept when `expose` is set; production deployments pass `false`.
    pub fn internal(err: &anyhow::Error, expose: bool) -> Self {
        tracing::error!("Internal error: {:#}", err);
        let details = expose.then(|| json!({ "cause": format!("{:#}", err) }));
        WatchlistError::Internal {
            message: "An internal error occurred".to_string(),
            details,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            WatchlistError::Validation { .. } => ErrorKind::ValidationError,
            WatchlistError::Unauthorized(_) => ErrorKind::Unauthorized,
            WatchlistError::Forbidden(_) => ErrorKind::Forbidden,
            WatchlistError::NotFound(_) => ErrorKind::NotFound,
            WatchlistError::RateLimited { .. } => ErrorKind::RateLimited,
            WatchlistError::Internal { .. } => ErrorKind::InternalError,
        }
    }

    pub fn details(&self) -> Option<Value> {
        match self {
            WatchlistError::Validation { details, .. } | WatchlistError::Internal { details, .. } => {
                details.clone()
            }
            WatchlistError::RateLimited { retry_after } => {
                Some(json!({ "retry_after_ms": retry_after.as_millis() as u64 }))
            }
            _ => None,
        }
    }

    /// Prefix the message with a field path, used when an element validator
    /// fails inside an array.
    pub fn with_prefix(self, prefix: &str) -> Self {
        match self {
            WatchlistError::Validation { message, details } => WatchlistError::Validation {
                message: format!("{}: {}", prefix, message),
                details,
            },
            other => other,
        }
    }

    pub fn to_body(&self) -> ErrorBody {
        ErrorBody {
            code: self.kind(),
            message: self.to_string(),
            details: self.details(),
        }
    }
}

/// Serializable error payload of the response envelope.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorBody {
    pub code: ErrorKind,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_serializes_screaming_snake() {
        let body = WatchlistError::not_found("Watchlist", "wl_9").to_body();
        let value = serde_json::to_value(&body).unwrap();
        assert_eq!(value["code"], "NOT_FOUND");
        assert_eq!(value["message"], "Watchlist not found: wl_9");
        assert!(value.get("details").is_none());
    }

    #[test]
    fn test_rate_limited_details() {
        let err = WatchlistError::RateLimited {
            retry_after: Duration::from_millis(1500),
        };
        assert_eq!(err.kind(), ErrorKind::RateLimited);
        assert_eq!(err.details().unwrap()["retry_after_ms"], 1500);
    }

    #[test]
    fn test_internal_hides_cause_when_not_exposed() {
        let cause = anyhow::anyhow!("socket closed");
        let hidden = WatchlistError::internal(&cause, false);
        assert!(hidden.details().is_none());
        assert_eq!(hidden.to_string(), "An internal error occurred");

        let shown = WatchlistError::internal(&cause, true);
        assert_eq!(shown.details().unwrap()["cause"], "socket closed");
    }

    #[test]
    fn test_prefix_only_touches_validation() {
        let err = WatchlistError::validation("must be a string").with_prefix("tags[1]");
        assert_eq!(err.to_string(), "tags[1]: must be a string");

        let err = WatchlistError::forbidden("nope").with_prefix("tags[1]");
        assert_eq!(err.to_string(), "nope");
    }
}
