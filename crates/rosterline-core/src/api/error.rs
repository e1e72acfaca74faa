use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

pub const MSG_NETWORK_ERROR: &str = "Network error. Please check your connection.";
pub const MSG_UNAUTHORIZED: &str = "Your session has expired. Please login again.";
pub const MSG_FORBIDDEN: &str = "You do not have permission to access this resource.";
pub const MSG_NOT_FOUND: &str = "The requested resource was not found.";
pub const MSG_SERVER_ERROR: &str = "An error occurred on the server. Please try again later.";
pub const MSG_VALIDATION_ERROR: &str = "Please check your input and try again.";
pub const MSG_DEFAULT: &str = "An unexpected error occurred. Please try again.";
pub const MSG_INVALID_RESPONSE: &str = "The server sent a response that could not be read.";
pub const MSG_INVALID_REQUEST: &str = "The request could not be prepared.";

pub const CODE_NETWORK_ERROR: &str = "NETWORK_ERROR";
pub const CODE_INVALID_RESPONSE: &str = "INVALID_RESPONSE";
pub const CODE_INVALID_REQUEST: &str = "INVALID_REQUEST";

/// Maximum length for error response bodies kept in error details
const MAX_ERROR_BODY_LENGTH: usize = 500;

/// Failure taxonomy for a resolved call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    /// No response reached the client.
    Network,
    /// 401/403. Terminal, never retried, always ends the session.
    Auth,
    /// 400 with a field-level message from the server.
    Validation,
    NotFound,
    /// 5xx
    Server,
    Unknown,
}

impl ErrorKind {
    pub fn from_status(status: u16) -> Self {
        match status {
            401 | 403 => ErrorKind::Auth,
            400 => ErrorKind::Validation,
            404 => ErrorKind::NotFound,
            500..=599 => ErrorKind::Server,
            _ => ErrorKind::Unknown,
        }
    }
}

/// Display-ready error carried by a failed [`ApiResponse`](super::ApiResponse).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Error)]
#[error("{message}")]
pub struct ApiError {
    pub kind: ErrorKind,
    pub message: String,
    /// Server-provided code, `HTTP_<status>`, or one of the client codes.
    pub code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

impl ApiError {
    pub fn network() -> Self {
        Self {
            kind: ErrorKind::Network,
            message: MSG_NETWORK_ERROR.to_string(),
            code: CODE_NETWORK_ERROR.to_string(),
            details: None,
        }
    }

    pub fn invalid_response(reason: impl std::fmt::Display) -> Self {
        Self {
            kind: ErrorKind::Unknown,
            message: MSG_INVALID_RESPONSE.to_string(),
            code: CODE_INVALID_RESPONSE.to_string(),
            details: Some(Value::String(truncate_body(&reason.to_string()))),
        }
    }

    /// The request body could not be serialized; nothing was sent.
    pub fn invalid_request(reason: impl std::fmt::Display) -> Self {
        Self {
            kind: ErrorKind::Unknown,
            message: MSG_INVALID_REQUEST.to_string(),
            code: CODE_INVALID_REQUEST.to_string(),
            details: Some(Value::String(reason.to_string())),
        }
    }

    /// Map a non-2xx response onto the fixed message table.
    ///
    /// `body` is the raw response text; when it is a JSON object its
    /// `message` and `code` fields are honored where the table allows.
    pub fn from_status(status: u16, body: &str) -> Self {
        let details = parse_details(body);
        let server_message = details
            .as_ref()
            .and_then(|d| d.get("message"))
            .and_then(Value::as_str)
            .filter(|m| !m.is_empty())
            .map(str::to_string);
        let server_code = details
            .as_ref()
            .and_then(|d| d.get("code"))
            .and_then(server_code_text);

        let message = match status {
            400 => server_message.unwrap_or_else(|| MSG_VALIDATION_ERROR.to_string()),
            401 => MSG_UNAUTHORIZED.to_string(),
            403 => MSG_FORBIDDEN.to_string(),
            404 => MSG_NOT_FOUND.to_string(),
            500 => MSG_SERVER_ERROR.to_string(),
            _ => server_message.unwrap_or_else(|| MSG_DEFAULT.to_string()),
        };

        Self {
            kind: ErrorKind::from_status(status),
            message,
            code: server_code.unwrap_or_else(|| format!("HTTP_{}", status)),
            details,
        }
    }

    pub fn is_auth(&self) -> bool {
        self.kind == ErrorKind::Auth
    }
}

/// Any truthy `code` counts: non-empty strings, non-zero numbers.
fn server_code_text(code: &Value) -> Option<String> {
    match code {
        Value::String(text) if !text.is_empty() => Some(text.clone()),
        Value::Number(number) if number.as_f64() != Some(0.0) => Some(number.to_string()),
        _ => None,
    }
}

fn parse_details(body: &str) -> Option<Value> {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return None;
    }
    match serde_json::from_str::<Value>(trimmed) {
        Ok(value) => Some(value),
        Err(_) => Some(Value::String(truncate_body(trimmed))),
    }
}

/// Truncate a response body to avoid carrying excessive data
fn truncate_body(body: &str) -> String {
    if body.len() <= MAX_ERROR_BODY_LENGTH {
        body.to_string()
    } else {
        let mut end = MAX_ERROR_BODY_LENGTH;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}... (truncated, {} total bytes)", &body[..end], body.len())
    }
}

/// Errors raised while building a client, before any call is made.
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Invalid base URL: {0}")]
    InvalidBaseUrl(String),

    #[error("Invalid default header {name}: {reason}")]
    InvalidHeader { name: String, reason: String },

    #[error("Failed to build HTTP client: {0}")]
    Build(#[from] reqwest::Error),
}
