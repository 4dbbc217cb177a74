//! Failure taxonomy for calls against the inventory API and the single
//! classifier deciding whether a 401 means "the session is over".

use reqwest::StatusCode;
use serde_json::Value;
use shared::error::ErrorBody;
use thiserror::Error;

/// Substrings of the `error` field that mark a 401 as a dead session.
const SESSION_EXPIRY_MARKERS: [&str; 3] = ["JWT expired", "Invalid JWT token", "JWT"];
const SESSION_EXPIRY_STATUS_CODE: &str = "UNAUTHORIZED";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Validation,
    Unauthorized,
    SessionExpired,
    Connectivity,
    Rejected,
    InvalidResponse,
}

#[derive(Debug, Clone, Error)]
pub enum ApiError {
    /// Local precondition failure; never reaches the network.
    #[error("{0}")]
    Validation(String),
    #[error("unauthorized: {message}")]
    Unauthorized { message: String },
    #[error("session expired: {message}")]
    SessionExpired { message: String },
    /// No response at all (refused connection, DNS, TLS, reset).
    #[error("connectivity failure: {0}")]
    Connectivity(String),
    #[error("request rejected with status {status}: {}", message.as_deref().unwrap_or("no details"))]
    Rejected {
        status: u16,
        message: Option<String>,
    },
    #[error("invalid response body: {0}")]
    InvalidResponse(String),
}

impl ApiError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) => ErrorKind::Validation,
            Self::Unauthorized { .. } => ErrorKind::Unauthorized,
            Self::SessionExpired { .. } => ErrorKind::SessionExpired,
            Self::Connectivity(_) => ErrorKind::Connectivity,
            Self::Rejected { .. } => ErrorKind::Rejected,
            Self::InvalidResponse(_) => ErrorKind::InvalidResponse,
        }
    }

    pub fn is_session_expired(&self) -> bool {
        matches!(self, Self::SessionExpired { .. })
    }

    /// Text the server put in the error body, if any.
    pub fn server_message(&self) -> Option<&str> {
        match self {
            Self::Unauthorized { message } | Self::SessionExpired { message } => {
                Some(message.as_str()).filter(|m| !m.is_empty())
            }
            Self::Rejected { message, .. } => message.as_deref(),
            _ => None,
        }
    }

    /// Translates a non-success response into the taxonomy.
    pub fn from_status(status: StatusCode, body: &[u8]) -> Self {
        let body = parse_error_body(body);
        if is_session_expired(status, &body) {
            return Self::SessionExpired {
                message: body.text().unwrap_or_default().to_string(),
            };
        }
        if status == StatusCode::UNAUTHORIZED {
            return Self::Unauthorized {
                message: body.text().unwrap_or_default().to_string(),
            };
        }
        Self::Rejected {
            status: status.as_u16(),
            message: body.text().map(str::to_string),
        }
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Self::InvalidResponse(err.to_string())
        } else {
            Self::Connectivity(err.to_string())
        }
    }
}

/// Decides whether a response means the server no longer accepts the session
/// credential. Only 401s qualify; the `error` text is matched against the
/// known JWT failure markers and `statusCode` against `UNAUTHORIZED`.
pub fn is_session_expired(status: StatusCode, body: &ErrorBody) -> bool {
    if status != StatusCode::UNAUTHORIZED {
        return false;
    }
    let message = body.error.as_deref().unwrap_or_default();
    SESSION_EXPIRY_MARKERS
        .iter()
        .any(|marker| message.contains(marker))
        || body.status_code.as_deref() == Some(SESSION_EXPIRY_STATUS_CODE)
}

/// Lenient decoding of an error body. Non-string `statusCode` values are
/// stringified and a bare field -> message object (bean validation output)
/// is folded into `error`.
pub fn parse_error_body(bytes: &[u8]) -> ErrorBody {
    let Ok(Value::Object(map)) = serde_json::from_slice::<Value>(bytes) else {
        return ErrorBody::default();
    };

    let as_text = |value: &Value| match value {
        Value::String(text) => Some(text.clone()),
        Value::Null => None,
        other => Some(other.to_string()),
    };

    let mut body = ErrorBody {
        error: map.get("error").and_then(as_text),
        message: map.get("message").and_then(as_text),
        status_code: map.get("statusCode").and_then(as_text),
    };

    if body.error.is_none() && body.message.is_none() {
        let fields: Vec<String> = map
            .iter()
            .filter_map(|(field, value)| value.as_str().map(|text| format!("{field}: {text}")))
            .collect();
        if !fields.is_empty() {
            body.error = Some(fields.join("; "));
        }
    }

    body
}
