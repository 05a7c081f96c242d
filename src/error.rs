// src/error.rs

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Main error type for the gateway
#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("needs apikey header")]
    MissingApiKey,

    #[error("wrong apikey")]
    WrongApiKey,

    #[error("missing {field}")]
    MissingField { field: String },

    #[error("not found")]
    NotFound,

    #[error("Invalid SQL identifier: {name:?}")]
    InvalidIdentifier { name: String },

    #[error("Procedure {procedure} returned no rows")]
    NoResult { procedure: String },

    #[error("Procedure {procedure} returned an unusable result: {reason}")]
    InvalidResult { procedure: String, reason: String },

    #[error("Procedure {procedure} timed out after {seconds}s")]
    DatabaseTimeout { procedure: String, seconds: u64 },

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Internal server error: {message}")]
    Internal { message: String },
}

impl GatewayError {
    /// Create a missing-field error for the given form field
    pub fn missing_field(field: impl Into<String>) -> Self {
        Self::MissingField {
            field: field.into(),
        }
    }

    /// Create an internal error with a custom message
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            GatewayError::MissingApiKey | GatewayError::WrongApiKey => StatusCode::UNAUTHORIZED,
            GatewayError::MissingField { .. } => StatusCode::PRECONDITION_FAILED,
            GatewayError::NotFound => StatusCode::NOT_FOUND,
            GatewayError::InvalidIdentifier { .. }
            | GatewayError::NoResult { .. }
            | GatewayError::InvalidResult { .. }
            | GatewayError::DatabaseTimeout { .. }
            | GatewayError::Database(_)
            | GatewayError::Migration(_)
            | GatewayError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Check if this error should be logged as a warning vs error
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            GatewayError::MissingApiKey
                | GatewayError::WrongApiKey
                | GatewayError::MissingField { .. }
                | GatewayError::NotFound
        )
    }

    /// JSON body sent to the client. Server-side detail never leaves the process.
    pub fn body(&self) -> serde_json::Value {
        match self {
            GatewayError::NotFound => json!({}),
            err if err.is_client_error() => json!({ "error": err.to_string() }),
            _ => json!({ "error": "internal server error" }),
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        if self.is_client_error() {
            tracing::warn!(status = status.as_u16(), "Client error: {}", self);
        } else {
            tracing::error!(status = status.as_u16(), "Server error: {}", self);
        }

        (status, Json(self.body())).into_response()
    }
}
