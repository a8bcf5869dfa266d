//! Server-specific error types

use axum::http::StatusCode;
use media_convert_lib::ConversionError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ServerError>;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("{0}")]
    Conversion(#[from] ConversionError),

    /// Malformed upload: bad multipart body, missing field
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ServerError {
    pub fn status(&self) -> StatusCode {
        match self {
            ServerError::Conversion(e) if e.is_client_error() => StatusCode::BAD_REQUEST,
            ServerError::BadRequest(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Label for the error counter
    pub fn kind(&self) -> &'static str {
        match self {
            ServerError::Conversion(e) => e.kind(),
            ServerError::BadRequest(_) => "bad_request",
            ServerError::Config(_) => "config",
            ServerError::Io(_) => "io",
        }
    }
}

impl axum::response::IntoResponse for ServerError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status();
        // Tool output and filesystem paths stay in the logs
        let body = match &self {
            ServerError::Conversion(ConversionError::Resource { context, .. }) => {
                format!("Resource error: {}", context)
            }
            ServerError::Io(_) => "Internal server error".to_string(),
            other => other.to_string(),
        };

        (status, body).into_response()
    }
}
