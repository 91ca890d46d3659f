use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use log::error;
use thiserror::Error;

use crate::model::ErrorResp;

/// Error kinds surfaced by the gate pipeline.
///
/// `Persistence` and `Config` are internal failures whose details are only
/// logged; every other kind is a client error.
#[derive(Debug, Error)]
pub enum GateError {
    /// Missing or malformed input (bad direction, bad period, empty plate).
    #[error("{0}")]
    Validation(String),

    /// Unknown or already consumed preview session.
    #[error("{0}")]
    NotFound(String),

    /// Plate already registered.
    #[error("{0}")]
    Conflict(String),

    /// Stored upload that does not exist.
    #[error("{0}")]
    MissingFile(String),

    /// Detection collaborator failed, timed out, or found nothing usable.
    #[error("{0}")]
    Detection(String),

    #[error("storage failure: {0}")]
    Persistence(String),

    #[error("configuration error: {0}")]
    Config(String),
}

pub type GateResult<T> = Result<T, GateError>;

impl From<rusqlite::Error> for GateError {
    fn from(e: rusqlite::Error) -> Self {
        GateError::Persistence(e.to_string())
    }
}

impl From<std::io::Error> for GateError {
    fn from(e: std::io::Error) -> Self {
        GateError::Persistence(e.to_string())
    }
}

impl GateError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            GateError::Validation(_) | GateError::NotFound(_) | GateError::Detection(_) => {
                StatusCode::BAD_REQUEST
            }
            GateError::Conflict(_) => StatusCode::CONFLICT,
            GateError::MissingFile(_) => StatusCode::NOT_FOUND,
            GateError::Persistence(_) | GateError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for GateError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = if status.is_server_error() {
            error!("request failed: {}", self);
            "internal server error".to_string()
        } else {
            self.to_string()
        };
        (status, Json(ErrorResp { error: message })).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_and_server_errors_map_to_distinct_statuses() {
        assert_eq!(
            GateError::Validation("x".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            GateError::NotFound("x".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            GateError::Detection("x".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            GateError::Conflict("x".into()).status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            GateError::MissingFile("x".into()).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            GateError::Persistence("disk".into()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn sqlite_errors_become_persistence() {
        let err: GateError = rusqlite::Error::InvalidQuery.into();
        assert!(matches!(err, GateError::Persistence(_)));
    }
}
