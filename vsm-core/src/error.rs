//! API error codes and formatting

use serde::Serialize;
use thiserror::Error;

use crate::request_id::RequestId;

/// Error codes exposed over the HTTP API
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    // Caller errors
    InvalidInput,
    MalformedRequest,
    NotFound,

    // Storage integrity
    Corrupted,
    DecryptionFailed,
    PartialDelete,

    // Service errors
    BackendFailure,
    ServiceUnavailable,
    InternalError,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidInput => "InvalidInput",
            Self::MalformedRequest => "MalformedRequest",
            Self::NotFound => "NotFound",
            Self::Corrupted => "Corrupted",
            Self::DecryptionFailed => "DecryptionFailed",
            Self::PartialDelete => "PartialDelete",
            Self::BackendFailure => "BackendFailure",
            Self::ServiceUnavailable => "ServiceUnavailable",
            Self::InternalError => "InternalError",
        }
    }

    pub fn http_status(&self) -> u16 {
        match self {
            Self::InvalidInput | Self::MalformedRequest => 400,
            Self::NotFound => 404,
            Self::BackendFailure => 502,
            Self::ServiceUnavailable => 503,
            Self::Corrupted | Self::DecryptionFailed | Self::PartialDelete | Self::InternalError => {
                500
            }
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned to API callers
#[derive(Debug, Error)]
#[error("{code}: {message}")]
pub struct ApiError {
    pub code: ErrorCode,
    pub message: String,
    pub request_id: String,
}

impl ApiError {
    pub fn new(code: ErrorCode, message: impl Into<String>, request_id: &RequestId) -> Self {
        Self {
            code,
            message: message.into(),
            request_id: request_id.to_string(),
        }
    }

    /// Format as a JSON error body
    pub fn to_json(&self) -> String {
        #[derive(Serialize)]
        #[serde(rename_all = "camelCase")]
        struct JsonError<'a> {
            code: &'static str,
            message: &'a str,
            request_id: &'a str,
        }

        let error = JsonError {
            code: self.code.as_str(),
            message: &self.message,
            request_id: &self.request_id,
        };

        serde_json::to_string(&error).unwrap_or_else(|_| {
            format!(r#"{{"code":"{}","message":"{}"}}"#, self.code.as_str(), self.message)
        })
    }
}
