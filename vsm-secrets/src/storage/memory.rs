//! In-memory storage backends

use super::traits::*;
use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, Ordering};

/// Id-keyed table shared by both in-memory backends
#[derive(Default)]
struct MemoryTable {
    records: DashMap<String, Bytes>,
    closed: AtomicBool,
}

impl MemoryTable {
    fn ensure_open(&self) -> Result<(), StorageError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(StorageError::Closed);
        }
        Ok(())
    }

    fn put(&self, id: &str, blob: Bytes) -> Result<(), StorageError> {
        self.ensure_open()?;
        self.records.insert(id.to_string(), blob);
        Ok(())
    }

    fn get(&self, id: &str) -> Result<Bytes, StorageError> {
        self.ensure_open()?;
        self.records
            .get(id)
            .map(|r| r.value().clone())
            .ok_or_else(|| StorageError::NotFound(id.to_string()))
    }

    fn delete(&self, id: &str) -> Result<(), StorageError> {
        self.ensure_open()?;
        self.records.remove(id);
        Ok(())
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }
}

/// Ephemeral (in-memory) data store
#[derive(Default)]
pub struct MemoryDataStore {
    table: MemoryTable,
}

impl MemoryDataStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records, expired or not
    pub fn len(&self) -> usize {
        self.table.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.records.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.table.records.contains_key(id)
    }
}

#[async_trait]
impl DataStore for MemoryDataStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn health_check(&self) -> Result<(), StorageError> {
        self.table.ensure_open()
    }

    async fn put(&self, id: &str, blob: Bytes) -> Result<(), StorageError> {
        self.table.put(id, blob)
    }

    async fn get(&self, id: &str) -> Result<Bytes, StorageError> {
        self.table.get(id)
    }

    async fn delete(&self, id: &str) -> Result<(), StorageError> {
        self.table.delete(id)
    }

    async fn close(&self) -> Result<(), StorageError> {
        self.table.close();
        Ok(())
    }
}

/// Ephemeral (in-memory) key store
#[derive(Default)]
pub struct MemoryKeyStore {
    table: MemoryTable,
}

impl MemoryKeyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.table.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.records.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.table.records.contains_key(id)
    }
}

#[async_trait]
impl KeyStore for MemoryKeyStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn health_check(&self) -> Result<(), StorageError> {
        self.table.ensure_open()
    }

    async fn put(&self, id: &str, blob: Bytes) -> Result<(), StorageError> {
        self.table.put(id, blob)
    }

    async fn get(&self, id: &str) -> Result<Bytes, StorageError> {
        self.table.get(id)
    }

    async fn delete(&self, id: &str) -> Result<(), StorageError> {
        self.table.delete(id)
    }

    async fn close(&self) -> Result<(), StorageError> {
        self.table.close();
        Ok(())
    }
}
