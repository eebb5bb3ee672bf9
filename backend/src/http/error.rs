//! HTTP error handling and response types.

use axum::{
    extract::rejection::{JsonRejection, PathRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::db::repository::RepositoryError;

/// API error response body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiError {
    /// Error code for programmatic handling
    pub code: String,
    /// Human-readable error message
    pub message: String,
    /// Optional additional details
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ApiError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}

/// Application error type for HTTP handlers.
#[derive(Debug)]
pub enum AppError {
    /// No usable identity on the request
    Unauthorized(String),
    /// Identity is known but not allowed in
    Forbidden(String),
    /// Invalid request (malformed body, path or query)
    BadRequest(String),
    /// Internal server error
    Internal(String),
    /// Repository error
    Repository(RepositoryError),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Repository(e) => repository_status(e).0,
        }
    }
}

fn repository_status(err: &RepositoryError) -> (StatusCode, &'static str) {
    match err {
        RepositoryError::NotFound { .. } => (StatusCode::NOT_FOUND, "NOT_FOUND"),
        RepositoryError::Conflict { .. } => (StatusCode::CONFLICT, "CONFLICT"),
        RepositoryError::Forbidden { .. } => (StatusCode::FORBIDDEN, "FORBIDDEN"),
        RepositoryError::SemesterClosed { .. } => (StatusCode::CONFLICT, "SEMESTER_CLOSED"),
        RepositoryError::ValidationError { .. } => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR"),
        RepositoryError::ConnectionError { .. } => {
            (StatusCode::INTERNAL_SERVER_ERROR, "CONNECTION_ERROR")
        }
        RepositoryError::ConfigurationError { .. } => {
            (StatusCode::INTERNAL_SERVER_ERROR, "CONFIGURATION_ERROR")
        }
        RepositoryError::QueryError { .. }
        | RepositoryError::TransactionError { .. }
        | RepositoryError::InternalError { .. } => {
            (StatusCode::INTERNAL_SERVER_ERROR, "REPOSITORY_ERROR")
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error) = match self {
            AppError::Unauthorized(msg) => {
                (StatusCode::UNAUTHORIZED, ApiError::new("UNAUTHORIZED", msg))
            }
            AppError::Forbidden(msg) => (StatusCode::FORBIDDEN, ApiError::new("FORBIDDEN", msg)),
            AppError::BadRequest(msg) => {
                (StatusCode::BAD_REQUEST, ApiError::new("BAD_REQUEST", msg))
            }
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ApiError::new("INTERNAL_ERROR", msg),
                )
            }
            AppError::Repository(e) => {
                let (status, code) = repository_status(&e);
                if status.is_server_error() {
                    tracing::error!("Repository failure: {}", e);
                }
                let mut body = ApiError::new(code, e.message());
                if let Some(details) = e.context().details.clone() {
                    body = body.with_details(details);
                }
                (status, body)
            }
        };

        (status, Json(error)).into_response()
    }
}

impl From<RepositoryError> for AppError {
    fn from(err: RepositoryError) -> Self {
        AppError::Repository(err)
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::BadRequest(rejection.body_text())
    }
}

impl From<PathRejection> for AppError {
    fn from(rejection: PathRejection) -> Self {
        AppError::BadRequest(rejection.body_text())
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        AppError::BadRequest(rejection.body_text())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repository_errors_map_to_statuses() {
        let cases = [
            (RepositoryError::not_found("slot"), StatusCode::NOT_FOUND),
            (RepositoryError::conflict("taken"), StatusCode::CONFLICT),
            (RepositoryError::forbidden("admin only"), StatusCode::FORBIDDEN),
            (RepositoryError::validation("bad code"), StatusCode::BAD_REQUEST),
            (
                RepositoryError::configuration("no url"),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, status) in cases {
            assert_eq!(AppError::from(err).status(), status);
        }
    }

    #[test]
    fn test_semester_closed_has_its_own_code() {
        let err = RepositoryError::semester_closed_with_context(
            "Semester 3 is archived",
            crate::db::repository::ErrorContext::new("claim_slot").with_details("archived"),
        );
        assert_eq!(
            repository_status(&err),
            (StatusCode::CONFLICT, "SEMESTER_CLOSED")
        );
        assert_eq!(AppError::from(err).into_response().status(), StatusCode::CONFLICT);
    }
}
