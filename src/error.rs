//! Application error types

use serde::Serialize;
use thiserror::Error;

/// Application-wide error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    /// Backend answered with a non-success HTTP status.
    #[error("API error ({status}): {}", .message.as_deref().unwrap_or("no details"))]
    Api { status: u16, message: Option<String> },

    /// Backend answered 2xx with `success: false`.
    #[error("Request rejected: {0}")]
    Envelope(String),

    #[error("Task failed: {0}")]
    TaskFailed(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("URL error: {0}")]
    Url(#[from] url::ParseError),

    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Busy: {0}")]
    Busy(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Human-readable message shown to the operator.
    ///
    /// Transport failures, HTTP statuses, rejected envelopes and failed tasks
    /// all collapse into one line of text.
    pub fn user_message(&self) -> String {
        match self {
            AppError::Http(e) if e.is_timeout() => "Request timed out".to_string(),
            AppError::Http(e) if e.is_status() => match e.status() {
                Some(status) => status_message(status.as_u16()),
                None => "Request failed".to_string(),
            },
            AppError::Http(e) if e.is_builder() => format!("Invalid request: {}", e),
            AppError::Http(_) => "Network request failed, check the connection".to_string(),
            AppError::Api { status, message } => match message {
                Some(m) if !m.is_empty() => m.clone(),
                _ => status_message(*status),
            },
            AppError::Envelope(m)
            | AppError::TaskFailed(m)
            | AppError::Auth(m)
            | AppError::Busy(m)
            | AppError::Validation(m)
            | AppError::NotFound(m)
            | AppError::Config(m)
            | AppError::Internal(m) => m.clone(),
            other => other.to_string(),
        }
    }

    /// Stable error code for machine-readable output
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Http(_) => "HTTP_ERROR",
            AppError::Api { .. } => "API_ERROR",
            AppError::Envelope(_) => "REQUEST_REJECTED",
            AppError::TaskFailed(_) => "TASK_FAILED",
            AppError::Serialization(_) => "SERIALIZATION_ERROR",
            AppError::Url(_) => "URL_ERROR",
            AppError::Auth(_) => "AUTH_ERROR",
            AppError::Busy(_) => "BUSY",
            AppError::Validation(_) => "VALIDATION_ERROR",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::Config(_) => "CONFIG_ERROR",
            AppError::Io(_) => "IO_ERROR",
            AppError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

fn status_message(status: u16) -> String {
    match status {
        401 => "Login required".to_string(),
        403 => "Permission denied".to_string(),
        404 => "Resource not found".to_string(),
        500 => "Internal server error".to_string(),
        other => format!("Request failed ({})", other),
    }
}

/// Serializable error response for the command line front end
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub code: String,
    pub message: String,
}

impl From<&AppError> for ErrorResponse {
    fn from(err: &AppError) -> Self {
        ErrorResponse {
            code: err.code().to_string(),
            message: err.user_message(),
        }
    }
}

impl From<AppError> for ErrorResponse {
    fn from(err: AppError) -> Self {
        ErrorResponse::from(&err)
    }
}

impl From<toml::de::Error> for AppError {
    fn from(err: toml::de::Error) -> Self {
        AppError::Config(format!("Invalid config file: {}", err))
    }
}

pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_error_prefers_body_message() {
        let err = AppError::Api {
            status: 422,
            message: Some("collection is read-only".to_string()),
        };
        assert_eq!(err.user_message(), "collection is read-only");
        assert_eq!(err.code(), "API_ERROR");
    }

    #[test]
    fn test_api_error_falls_back_to_status_text() {
        let cases = [
            (404, "Resource not found"),
            (403, "Permission denied"),
            (500, "Internal server error"),
            (502, "Request failed (502)"),
        ];
        for (status, expected) in cases {
            let err = AppError::Api { status, message: None };
            assert_eq!(err.user_message(), expected);
        }

        let empty = AppError::Api {
            status: 404,
            message: Some(String::new()),
        };
        assert_eq!(empty.user_message(), "Resource not found");
    }

    #[test]
    fn test_envelope_and_task_errors_pass_message_through() {
        assert_eq!(
            AppError::Envelope("unknown collection".into()).user_message(),
            "unknown collection"
        );
        assert_eq!(
            AppError::TaskFailed("provider offline".into()).user_message(),
            "provider offline"
        );
    }

    #[test]
    fn test_error_response_from_error() {
        let response = ErrorResponse::from(AppError::Busy("refresh running".into()));
        assert_eq!(response.code, "BUSY");
        assert_eq!(response.message, "refresh running");
    }
}
