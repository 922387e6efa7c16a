//! Error types for the offline proxy

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use offline_worker::WorkerError;
use serde_json::json;
use std::fmt;

#[derive(Debug)]
pub enum ProxyError {
    Worker(WorkerError),
    Http(Box<reqwest::Error>),
    Io(Box<std::io::Error>),
    Config(String),
    BadRequest(String),
}

impl fmt::Display for ProxyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProxyError::Worker(err) => write!(f, "Worker error: {}", err),
            ProxyError::Http(err) => write!(f, "HTTP error: {}", err),
            ProxyError::Io(err) => write!(f, "IO error: {}", err),
            ProxyError::Config(msg) => write!(f, "Configuration error: {}", msg),
            ProxyError::BadRequest(msg) => write!(f, "Bad request: {}", msg),
        }
    }
}

impl std::error::Error for ProxyError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ProxyError::Worker(err) => Some(err),
            ProxyError::Http(err) => Some(err.as_ref()),
            ProxyError::Io(err) => Some(err.as_ref()),
            _ => None,
        }
    }
}

impl From<WorkerError> for ProxyError {
    fn from(err: WorkerError) -> Self {
        ProxyError::Worker(err)
    }
}

impl From<reqwest::Error> for ProxyError {
    fn from(err: reqwest::Error) -> Self {
        ProxyError::Http(Box::new(err))
    }
}

impl From<std::io::Error> for ProxyError {
    fn from(err: std::io::Error) -> Self {
        ProxyError::Io(Box::new(err))
    }
}

impl From<tracing_subscriber::filter::ParseError> for ProxyError {
    fn from(err: tracing_subscriber::filter::ParseError) -> Self {
        ProxyError::Config(err.to_string())
    }
}

impl ProxyError {
    fn status(&self) -> StatusCode {
        match self {
            ProxyError::Worker(WorkerError::Network(_)) | ProxyError::Http(_) => {
                StatusCode::BAD_GATEWAY
            }
            ProxyError::Worker(WorkerError::Offline(_)) => StatusCode::SERVICE_UNAVAILABLE,
            ProxyError::BadRequest(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match status {
            StatusCode::BAD_GATEWAY => "Upstream unreachable".to_string(),
            StatusCode::SERVICE_UNAVAILABLE => "Offline".to_string(),
            StatusCode::BAD_REQUEST => self.to_string(),
            _ => {
                tracing::error!(error = %self, "Internal proxy error");
                "Internal server error".to_string()
            }
        };

        (status, axum::Json(json!({ "error": message }))).into_response()
    }
}

pub type Result<T> = std::result::Result<T, ProxyError>;
