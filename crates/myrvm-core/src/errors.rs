use anyhow::Error;
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;

/// HTTP-facing error: a status, the underlying error and an optional
/// machine-readable code for API clients.
#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub error: Error,
    pub code: Option<&'static str>,
}

impl AppError {
    pub fn new<E>(status: StatusCode, err: E) -> Self
    where
        E: Into<Error>,
    {
        Self {
            status,
            error: err.into(),
            code: None,
        }
    }

    /// Attach a machine-readable error code (e.g. `SESSION_SECURITY_FAILED`).
    pub fn with_code(mut self, code: &'static str) -> Self {
        self.code = Some(code);
        self
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let message = self.error.to_string();
        let body = match self.code {
            Some(code) => Json(json!({
                "message": message,
                "error": code,
            })),
            None => Json(json!({
                "error": message,
            })),
        };

        (self.status, body).into_response()
    }
}

impl<E> From<E> for AppError
where
    E: Into<Error>,
{
    fn from(err: E) -> Self {
        AppError::new(StatusCode::INTERNAL_SERVER_ERROR, err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unmapped_errors_are_internal() {
        let err: AppError = anyhow::anyhow!("boom").into();
        assert_eq!(err.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.code, None);
    }

    #[test]
    fn test_with_code() {
        let err = AppError::new(StatusCode::UNAUTHORIZED, anyhow::anyhow!("nope")).with_code("SOME_CODE");
        assert_eq!(err.code, Some("SOME_CODE"));
        assert_eq!(err.into_response().status(), StatusCode::UNAUTHORIZED);
    }
}
