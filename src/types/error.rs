//! Error types for Wellspring
//!
//! Every handler funnels its failures through [`WellspringError`], which owns
//! the mapping onto HTTP status codes and the JSON body returned to clients.

use hyper::StatusCode;
use serde::Serialize;

/// A single field-level validation failure
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Main error type for Wellspring operations
#[derive(Debug, thiserror::Error)]
pub enum WellspringError {
    #[error("Authentication required")]
    Unauthorized,

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Validation failed")]
    Validation(Vec<FieldError>),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// JSON body sent for every error response
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<FieldError>,
}

impl WellspringError {
    /// Shorthand for a single-field validation failure
    pub fn invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation(vec![FieldError::new(field, message)])
    }

    /// Convert error to HTTP status code
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            // State conflicts are reported as 400 with a descriptive message
            Self::Conflict(_) => StatusCode::BAD_REQUEST,
            Self::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Auth(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Whether the detail of this error must stay on the server
    pub fn is_server_fault(&self) -> bool {
        self.status_code().is_server_error()
    }

    /// Build the client-facing body. Server faults get a generic message.
    pub fn into_body(self) -> (StatusCode, ErrorBody) {
        let status = self.status_code();
        let (message, errors) = match self {
            Self::Unauthorized => ("Authentication required".to_string(), Vec::new()),
            Self::Forbidden(msg) => (msg, Vec::new()),
            Self::Validation(errors) => ("Validation failed".to_string(), errors),
            Self::BadRequest(msg) | Self::Conflict(msg) => (msg, Vec::new()),
            Self::NotFound(what) => (format!("{what} not found"), Vec::new()),
            Self::Database(_) | Self::Auth(_) | Self::Config(_) | Self::Internal(_) => {
                ("Internal server error".to_string(), Vec::new())
            }
        };
        (
            status,
            ErrorBody {
                success: false,
                message,
                errors,
            },
        )
    }
}

impl From<std::io::Error> for WellspringError {
    fn from(err: std::io::Error) -> Self {
        Self::Internal(err.to_string())
    }
}

impl From<serde_json::Error> for WellspringError {
    fn from(err: serde_json::Error) -> Self {
        Self::BadRequest(format!("Invalid JSON: {}", err))
    }
}

impl From<mongodb::error::Error> for WellspringError {
    fn from(err: mongodb::error::Error) -> Self {
        Self::Database(err.to_string())
    }
}

impl From<bson::ser::Error> for WellspringError {
    fn from(err: bson::ser::Error) -> Self {
        Self::Database(format!("BSON encode failed: {}", err))
    }
}

impl From<bson::de::Error> for WellspringError {
    fn from(err: bson::de::Error) -> Self {
        Self::Database(format!("BSON decode failed: {}", err))
    }
}

impl From<jsonwebtoken::errors::Error> for WellspringError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        Self::Auth(format!("JWT error: {}", err))
    }
}

/// Result type alias for Wellspring operations
pub type Result<T> = std::result::Result<T, WellspringError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(WellspringError::Unauthorized.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            WellspringError::Forbidden("no".into()).status_code(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            WellspringError::Conflict("already paid".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            WellspringError::NotFound("Payment".into()).status_code(),
            StatusCode::NOT_FOUND
        );
    }

    #[test]
    fn test_server_fault_detail_is_hidden() {
        let (status, body) = WellspringError::Database("connection reset by peer".into()).into_body();
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body.message, "Internal server error");
        assert!(!body.message.contains("peer"));
    }

    #[test]
    fn test_validation_body_lists_fields() {
        let (status, body) = WellspringError::invalid("month", "must be between 1 and 12").into_body();
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body.errors.len(), 1);
        assert_eq!(body.errors[0].field, "month");
    }
}
