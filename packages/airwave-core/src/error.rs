//! Centralized error types for the Airwave core library.
//!
//! This module provides a unified error handling system that:
//! - Defines structured error types using `thiserror`
//! - Maps errors to appropriate HTTP status codes
//! - Implements `IntoResponse` for automatic JSON error responses

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

use crate::services::SkipError;
use crate::store::StoreError;

/// Trait for error types that provide machine-readable error codes.
pub trait ErrorCode {
    /// Returns a machine-readable error code for API responses.
    fn code(&self) -> &'static str;
}

impl ErrorCode for StoreError {
    fn code(&self) -> &'static str {
        match self {
            Self::Unavailable(_) => "store_unavailable",
            Self::Io(_) => "store_io_failed",
            Self::Serialization(_) => "store_serialization_failed",
        }
    }
}

impl ErrorCode for SkipError {
    fn code(&self) -> &'static str {
        match self {
            Self::NotRunning => "autodj_not_running",
            Self::EmptyPlaylist(_) => "playlist_empty",
            Self::Superseded => "skip_superseded",
            Self::Store(_) => "storage_error",
        }
    }
}

/// Application-wide error type.
#[derive(Debug, Error)]
pub enum AirwaveError {
    /// Client sent an invalid or malformed request (unknown mode, bad payload).
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Requested track does not exist in the store.
    #[error("Track not found: {0}")]
    TrackNotFound(String),

    /// The storage collaborator failed.
    #[error("Storage error: {0}")]
    Storage(String),

    /// Server configuration error.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A skip request that put no new track on air.
    #[error(transparent)]
    Skip(#[from] SkipError),
}

impl AirwaveError {
    /// Returns a machine-readable error code for API responses.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidRequest(_) => "invalid_request",
            Self::TrackNotFound(_) => "track_not_found",
            Self::Storage(_) => "storage_error",
            Self::Configuration(_) => "configuration_error",
            Self::Skip(e) => e.code(),
        }
    }

    /// Maps the error to an appropriate HTTP status code.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            Self::TrackNotFound(_) => StatusCode::NOT_FOUND,
            Self::Storage(_) | Self::Skip(SkipError::Store(_)) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            Self::Skip(_) => StatusCode::CONFLICT,
            Self::Configuration(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Convenient Result alias for application-wide operations.
pub type AirwaveResult<T> = Result<T, AirwaveError>;

/// JSON response body for error responses.
#[derive(Serialize)]
struct ErrorResponse {
    error: &'static str,
    message: String,
    status: u16,
}

impl IntoResponse for AirwaveError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorResponse {
            error: self.code(),
            message: self.to_string(),
            status: status.as_u16(),
        };
        (status, Json(body)).into_response()
    }
}

impl From<StoreError> for AirwaveError {
    fn from(err: StoreError) -> Self {
        Self::Storage(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PlaylistId;

    #[test]
    fn invalid_request_maps_to_bad_request() {
        let err = AirwaveError::InvalidRequest("unknown mode".into());
        assert_eq!(err.code(), "invalid_request");
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn store_error_converts_to_storage() {
        let err: AirwaveError = StoreError::Unavailable("db down".into()).into();
        assert_eq!(err.code(), "storage_error");
        assert_eq!(err.status_code(), StatusCode::SERVICE_UNAVAILABLE);
        assert!(err.to_string().contains("db down"));
    }

    #[test]
    fn skip_errors_keep_distinct_codes() {
        let not_running: AirwaveError = SkipError::NotRunning.into();
        assert_eq!(not_running.code(), "autodj_not_running");
        assert_eq!(not_running.status_code(), StatusCode::CONFLICT);

        let empty: AirwaveError = SkipError::EmptyPlaylist(PlaylistId(4)).into();
        assert_eq!(empty.code(), "playlist_empty");
        assert_eq!(empty.to_string(), "Playlist 4 is empty");

        let superseded: AirwaveError = SkipError::Superseded.into();
        assert_eq!(superseded.code(), "skip_superseded");
        assert_eq!(superseded.status_code(), StatusCode::CONFLICT);

        let store: AirwaveError = SkipError::from(StoreError::Unavailable("db".into())).into();
        assert_eq!(store.status_code(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn store_error_codes() {
        assert_eq!(
            StoreError::Unavailable("x".into()).code(),
            "store_unavailable"
        );
    }
}
