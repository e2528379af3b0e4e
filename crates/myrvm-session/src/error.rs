use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use myrvm_cache::CacheError;
use myrvm_core::AppError;

/// Machine-readable code sent to API clients whose session failed validation.
pub const SESSION_SECURITY_FAILED: &str = "SESSION_SECURITY_FAILED";

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Session not found: {0}")]
    NotFound(String),

    #[error("Session conflict: {0}")]
    Conflict(String),

    #[error("Session security validation failed")]
    SecurityViolation,

    #[error("Session store unavailable: {0}")]
    StoreUnavailable(CacheError),

    #[error("Session serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

// Serialization failures inside the store are still serialization failures;
// everything else means the store could not be reached.
impl From<CacheError> for SessionError {
    fn from(err: CacheError) -> Self {
        match err {
            CacheError::Serialization(e) => Self::Serialization(e),
            other => Self::StoreUnavailable(other),
        }
    }
}

impl SessionError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::SecurityViolation => StatusCode::UNAUTHORIZED,
            Self::StoreUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Serialization(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Converts into the HTTP error, keeping the status. `AppError`'s blanket
    /// `From` would report every variant as 500.
    pub fn into_app_error(self) -> AppError {
        let status = self.status_code();
        let security = matches!(self, Self::SecurityViolation);
        let err = AppError::new(status, self);
        if security {
            err.with_code(SESSION_SECURITY_FAILED)
        } else {
            err
        }
    }
}

impl IntoResponse for SessionError {
    fn into_response(self) -> Response {
        self.into_app_error().into_response()
    }
}
