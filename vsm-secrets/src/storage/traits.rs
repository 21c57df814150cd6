//! Storage backend traits

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

/// Errors from storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Store is closed")]
    Closed,

    #[error("Store unavailable: {0}")]
    Unavailable(String),

}

impl StorageError {
    /// Whether the backend reported the id as absent, as opposed to failing.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

/// Bulk storage for encrypted records.
///
/// Implementations must be safe for concurrent use; the secret manager adds
/// no locking of its own.
#[async_trait]
pub trait DataStore: Send + Sync {
    /// Short backend name used in logs and error context
    fn name(&self) -> &'static str;

    /// Readiness check run once when the secret manager is initialized
    async fn health_check(&self) -> Result<(), StorageError> {
        Ok(())
    }

    /// Store a record, replacing any existing record with the same id
    async fn put(&self, id: &str, blob: Bytes) -> Result<(), StorageError>;

    /// Fetch a record; fails with [`StorageError::NotFound`] when absent
    async fn get(&self, id: &str) -> Result<Bytes, StorageError>;

    /// Delete a record. Deleting an absent id succeeds.
    async fn delete(&self, id: &str) -> Result<(), StorageError>;

    /// Release the backend. Idempotent.
    async fn close(&self) -> Result<(), StorageError>;
}

/// Durable storage for wrapped key material.
#[async_trait]
pub trait KeyStore: Send + Sync {
    /// Short backend name used in logs and error context
    fn name(&self) -> &'static str;

    /// Readiness check run once when the secret manager is initialized
    async fn health_check(&self) -> Result<(), StorageError> {
        Ok(())
    }

    /// Store a key record, replacing any existing record with the same id
    async fn put(&self, id: &str, blob: Bytes) -> Result<(), StorageError>;

    /// Fetch a key record; fails with [`StorageError::NotFound`] when absent
    async fn get(&self, id: &str) -> Result<Bytes, StorageError>;

    /// Delete a key record. Deleting an absent id succeeds.
    async fn delete(&self, id: &str) -> Result<(), StorageError>;

    /// Release the backend. Idempotent.
    async fn close(&self) -> Result<(), StorageError>;
}
