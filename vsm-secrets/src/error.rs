//! Secret manager errors

use thiserror::Error;
use vsm_core::ErrorCode;

use crate::storage::StorageError;

/// Orchestration step in which a backend call failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Init,
    GenerateId,
    CreateKey,
    StoreRecord,
    FetchRecord,
    FetchKey,
    DeleteRecord,
    DeleteKey,
    Close,
}

impl Step {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Init => "init",
            Self::GenerateId => "generate id",
            Self::CreateKey => "create key",
            Self::StoreRecord => "store record",
            Self::FetchRecord => "fetch record",
            Self::FetchKey => "fetch key",
            Self::DeleteRecord => "delete record",
            Self::DeleteKey => "delete key",
            Self::Close => "close",
        }
    }
}

impl std::fmt::Display for Step {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which of the two backends a failure came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Data,
    Key,
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Data => f.write_str("data store"),
            Self::Key => f.write_str("key store"),
        }
    }
}

/// Closed set of error kinds callers can branch on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidInput,
    NotFound,
    Corrupted,
    DecryptionFailed,
    PartialDelete,
    Backend,
    NotInitialized,
    AlreadyInitialized,
    Closed,
    Internal,
}

/// Secret manager errors
#[derive(Debug, Error)]
pub enum SecretError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Secret not found: {0}")]
    NotFound(String),

    #[error("Backends diverged for {id}: {detail}")]
    Corrupted { id: String, detail: String },

    #[error("Decryption failed for {0}")]
    DecryptionFailed(String),

    #[error("Secret {id} deleted but its key record remains: {source}")]
    PartialDelete {
        id: String,
        #[source]
        source: StorageError,
    },

    #[error("{step} failed on {backend}: {source}{}", compensation_note(.compensation))]
    Backend {
        step: Step,
        backend: BackendKind,
        #[source]
        source: StorageError,
        /// Set when the key store step that follows also failed: undoing a
        /// half-finished create, or closing alongside the data store
        compensation: Option<StorageError>,
    },

    #[error("Secret manager is not initialized")]
    NotInitialized,

    #[error("Secret manager is already initialized")]
    AlreadyInitialized,

    #[error("Secret manager is closed")]
    Closed,

    #[error("Internal error: {0}")]
    Internal(String),
}

fn compensation_note(compensation: &Option<StorageError>) -> String {
    match compensation {
        Some(err) => format!(" (key store also failed: {err})"),
        None => String::new(),
    }
}

impl SecretError {
    pub(crate) fn backend(step: Step, backend: BackendKind, source: StorageError) -> Self {
        Self::Backend {
            step,
            backend,
            source,
            compensation: None,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidInput(_) => ErrorKind::InvalidInput,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Corrupted { .. } => ErrorKind::Corrupted,
            Self::DecryptionFailed(_) => ErrorKind::DecryptionFailed,
            Self::PartialDelete { .. } => ErrorKind::PartialDelete,
            Self::Backend { .. } => ErrorKind::Backend,
            Self::NotInitialized => ErrorKind::NotInitialized,
            Self::AlreadyInitialized => ErrorKind::AlreadyInitialized,
            Self::Closed => ErrorKind::Closed,
            Self::Internal(_) => ErrorKind::Internal,
        }
    }

    /// API error code for this failure
    pub fn code(&self) -> ErrorCode {
        match self.kind() {
            ErrorKind::InvalidInput => ErrorCode::InvalidInput,
            ErrorKind::NotFound => ErrorCode::NotFound,
            ErrorKind::Corrupted => ErrorCode::Corrupted,
            ErrorKind::DecryptionFailed => ErrorCode::DecryptionFailed,
            ErrorKind::PartialDelete => ErrorCode::PartialDelete,
            ErrorKind::Backend => ErrorCode::BackendFailure,
            ErrorKind::NotInitialized | ErrorKind::Closed => ErrorCode::ServiceUnavailable,
            ErrorKind::AlreadyInitialized | ErrorKind::Internal => ErrorCode::InternalError,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_error_message_has_context() {
        let err = SecretError::backend(
            Step::StoreRecord,
            BackendKind::Data,
            StorageError::Unavailable("disk full".to_string()),
        );
        assert_eq!(
            err.to_string(),
            "store record failed on data store: Store unavailable: disk full"
        );
        assert_eq!(err.kind(), ErrorKind::Backend);
        assert_eq!(err.code(), ErrorCode::BackendFailure);
    }

    #[test]
    fn test_failed_compensation_is_reported() {
        let err = SecretError::Backend {
            step: Step::StoreRecord,
            backend: BackendKind::Data,
            source: StorageError::Unavailable("disk full".to_string()),
            compensation: Some(StorageError::Closed),
        };
        assert!(err
            .to_string()
            .ends_with("(key store also failed: Store is closed)"));
    }

    #[test]
    fn test_codes() {
        assert_eq!(
            SecretError::NotFound("x".into()).code().http_status(),
            404
        );
        assert_eq!(
            SecretError::InvalidInput("x".into()).code().http_status(),
            400
        );
        assert_eq!(SecretError::Closed.code(), ErrorCode::ServiceUnavailable);
        assert_eq!(
            SecretError::Corrupted {
                id: "x".into(),
                detail: "key missing".into()
            }
            .code(),
            ErrorCode::Corrupted
        );
    }
}
