//! Secret lifecycle orchestration across the data store and key store
//!
//! A secret occupies one record in each backend under the same id: the wrapped
//! data key in the key store and the ciphertext in the data store. There is no
//! transaction spanning the two, so every operation writes and removes them in
//! a fixed order:
//!
//! - create: key record first, then data record. If the data record cannot be
//!   written the key record is deleted again before the error is returned.
//! - delete: data record first, then key record. A failure on the second step
//!   is reported as [`SecretError::PartialDelete`].
//! - get: a data record whose key record is missing is reported as
//!   [`SecretError::Corrupted`], never as not-found.
//!
//! Operations on different ids are independent. Operations on the same id are
//! not serialized here: a get racing a delete may observe the data record and
//! then miss the key record, surfacing as `Corrupted`.

use bytes::Bytes;
use chrono::Utc;
use parking_lot::RwLock;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::crypto::{CryptoEngine, CryptoError, KeyHandle, MasterKey};
use crate::error::{BackendKind, SecretError, Step};
use crate::id::{IdSource, UuidSource};
use crate::model::{EncryptedRecord, SecretEntry, RECORD_VERSION};
use crate::storage::{DataStore, KeyStore, StorageError};

/// Candidate ids drawn before giving up on finding a free one
pub const MAX_ID_ATTEMPTS: usize = 8;

/// Default upper bound on a secret payload
pub const DEFAULT_MAX_SECRET_SIZE: usize = 64 * 1024;

/// Secret manager configuration
#[derive(Clone, Deserialize)]
pub struct ManagerConfig {
    /// Hex-encoded 32-byte master key. A random key is generated when unset,
    /// which makes every stored secret unreadable after a restart.
    #[serde(default)]
    pub master_key: Option<String>,

    #[serde(default = "default_max_secret_size")]
    pub max_secret_size: usize,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            master_key: None,
            max_secret_size: default_max_secret_size(),
        }
    }
}

impl std::fmt::Debug for ManagerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManagerConfig")
            .field("master_key", &self.master_key.as_ref().map(|_| "<redacted>"))
            .field("max_secret_size", &self.max_secret_size)
            .finish()
    }
}

fn default_max_secret_size() -> usize {
    DEFAULT_MAX_SECRET_SIZE
}

/// Backend handles bound by `init`
#[derive(Clone)]
struct Backends {
    data: Arc<dyn DataStore>,
    keys: Arc<dyn KeyStore>,
    crypto: Arc<CryptoEngine>,
    max_secret_size: usize,
}

enum Lifecycle {
    Uninitialized,
    Running(Backends),
    Closed,
}

/// Per-id progress of a create. `KeyOnly` never outlives `create_secret`.
enum CreateState {
    Empty,
    KeyOnly(KeyHandle),
    Committed,
}

struct Creation<'a> {
    id: String,
    backends: &'a Backends,
    state: CreateState,
}

impl<'a> Creation<'a> {
    fn new(id: String, backends: &'a Backends) -> Self {
        Self {
            id,
            backends,
            state: CreateState::Empty,
        }
    }

    async fn create_key(&mut self) -> Result<(), SecretError> {
        let handle = self
            .backends
            .crypto
            .new_key_for(&self.id)
            .await
            .map_err(|e| match e {
                CryptoError::Store(source) => {
                    SecretError::backend(Step::CreateKey, BackendKind::Key, source)
                }
                other => SecretError::Internal(format!("key generation failed: {other}")),
            })?;
        self.state = CreateState::KeyOnly(handle);
        Ok(())
    }

    async fn commit(&mut self, entry: &SecretEntry) -> Result<(), SecretError> {
        let CreateState::KeyOnly(handle) = &self.state else {
            return Err(SecretError::Internal(format!(
                "commit of {} without a key record",
                self.id
            )));
        };

        let (ciphertext, nonce) = self
            .backends
            .crypto
            .encrypt(&entry.secret_data, handle)
            .map_err(|e| SecretError::Internal(e.to_string()))?;

        let record = EncryptedRecord {
            version: RECORD_VERSION,
            id: self.id.clone(),
            owner: entry.owner.clone(),
            ciphertext,
            nonce,
            expiration_time: entry.expiration_time,
        };
        let blob = record
            .to_bytes()
            .map_err(|e| SecretError::Internal(format!("record encoding failed: {e}")))?;

        self.backends
            .data
            .put(&self.id, Bytes::from(blob))
            .await
            .map_err(|e| SecretError::backend(Step::StoreRecord, BackendKind::Data, e))?;

        self.state = CreateState::Committed;
        Ok(())
    }

    /// Undo a create that failed after its key record was written
    async fn abort(self, err: SecretError) -> SecretError {
        if !matches!(self.state, CreateState::KeyOnly(_)) {
            return err;
        }

        warn!(id = %self.id, error = %err, "Create failed after key was stored, removing key record");
        match self.backends.crypto.destroy_key(&self.id).await {
            Ok(()) => err,
            Err(cleanup) => {
                warn!(id = %self.id, error = %cleanup, "Failed to remove orphaned key record");
                with_failed_compensation(err, cleanup)
            }
        }
    }
}

fn with_failed_compensation(err: SecretError, cleanup: StorageError) -> SecretError {
    match err {
        SecretError::Backend {
            step,
            backend,
            source,
            compensation: None,
        } => SecretError::Backend {
            step,
            backend,
            source,
            compensation: Some(cleanup),
        },
        other => SecretError::Internal(format!("{other} (key store also failed: {cleanup})")),
    }
}

/// Creates, reads and deletes secrets over a data store and a key store
pub struct SecretManager {
    ids: Arc<dyn IdSource>,
    state: RwLock<Lifecycle>,
}

impl Default for SecretManager {
    fn default() -> Self {
        Self::new()
    }
}

impl SecretManager {
    /// A manager that assigns random UUIDs
    pub fn new() -> Self {
        Self::with_id_source(Arc::new(UuidSource))
    }

    pub fn with_id_source(ids: Arc<dyn IdSource>) -> Self {
        Self {
            ids,
            state: RwLock::new(Lifecycle::Uninitialized),
        }
    }

    /// Bind the manager to its backends. Must be called exactly once.
    pub async fn init(
        &self,
        config: &ManagerConfig,
        data: Arc<dyn DataStore>,
        keys: Arc<dyn KeyStore>,
    ) -> Result<(), SecretError> {
        self.ensure_uninitialized()?;

        data.health_check()
            .await
            .map_err(|e| SecretError::backend(Step::Init, BackendKind::Data, e))?;
        keys.health_check()
            .await
            .map_err(|e| SecretError::backend(Step::Init, BackendKind::Key, e))?;

        let master = match &config.master_key {
            Some(hex_key) => MasterKey::from_hex(hex_key)
                .map_err(|e| SecretError::InvalidInput(format!("master key: {e}")))?,
            None => {
                warn!("No master key configured, generating an ephemeral one");
                MasterKey::generate()
            }
        };

        let backends = Backends {
            crypto: Arc::new(CryptoEngine::new(master, keys.clone())),
            data: data.clone(),
            keys: keys.clone(),
            max_secret_size: config.max_secret_size,
        };

        {
            let mut state = self.state.write();
            if !matches!(*state, Lifecycle::Uninitialized) {
                return Err(SecretError::AlreadyInitialized);
            }
            *state = Lifecycle::Running(backends);
        }

        info!(
            data_store = data.name(),
            key_store = keys.name(),
            "Secret manager initialized"
        );
        Ok(())
    }

    /// Encrypt and store a secret under a freshly generated id.
    ///
    /// Any id already set on `entry` is ignored.
    pub async fn create_secret(&self, entry: &SecretEntry) -> Result<String, SecretError> {
        let backends = self.backends()?;
        validate(entry, backends.max_secret_size)?;

        let id = self.allocate_id(&backends).await?;
        let mut creation = Creation::new(id, &backends);

        creation.create_key().await?;
        if let Err(err) = creation.commit(entry).await {
            return Err(creation.abort(err).await);
        }

        info!(id = %creation.id, owner = %entry.owner, expires = %entry.expiration_time, "Created secret");
        Ok(creation.id)
    }

    /// Fetch and decrypt a live secret
    pub async fn get_secret(&self, id: &str) -> Result<SecretEntry, SecretError> {
        let backends = self.backends()?;

        let blob = match backends.data.get(id).await {
            Ok(blob) => blob,
            Err(e) if e.is_not_found() => return Err(SecretError::NotFound(id.to_string())),
            Err(e) => return Err(SecretError::backend(Step::FetchRecord, BackendKind::Data, e)),
        };

        let record = EncryptedRecord::from_bytes(&blob).map_err(|e| {
            warn!(id = %id, error = %e, "Data record could not be decoded");
            SecretError::DecryptionFailed(id.to_string())
        })?;
        if record.id != id {
            warn!(id = %id, stored = %record.id, "Data record belongs to another id");
            return Err(SecretError::DecryptionFailed(id.to_string()));
        }

        if record.is_expired_at(Utc::now()) {
            debug!(id = %id, "Secret expired, reclaiming");
            reclaim_expired(&backends, id).await;
            return Err(SecretError::NotFound(id.to_string()));
        }

        let handle = match backends.crypto.key_for(id).await {
            Ok(handle) => handle,
            Err(CryptoError::Store(e)) if e.is_not_found() => {
                return Err(SecretError::Corrupted {
                    id: id.to_string(),
                    detail: "key record missing".to_string(),
                })
            }
            Err(CryptoError::Store(e)) => {
                return Err(SecretError::backend(Step::FetchKey, BackendKind::Key, e))
            }
            Err(e) => {
                warn!(id = %id, error = %e, "Key record could not be unwrapped");
                return Err(SecretError::DecryptionFailed(id.to_string()));
            }
        };

        let secret_data = backends
            .crypto
            .decrypt(&record.ciphertext, &record.nonce, &handle)
            .map_err(|_| SecretError::DecryptionFailed(id.to_string()))?;

        debug!(id = %id, "Fetched secret");
        Ok(SecretEntry {
            id: id.to_string(),
            secret_data,
            owner: record.owner,
            expiration_time: record.expiration_time,
        })
    }

    /// Remove a secret from both backends. Deleting an unknown id succeeds.
    pub async fn delete_secret(&self, id: &str) -> Result<(), SecretError> {
        let backends = self.backends()?;

        backends
            .data
            .delete(id)
            .await
            .map_err(|e| SecretError::backend(Step::DeleteRecord, BackendKind::Data, e))?;

        if let Err(source) = backends.crypto.destroy_key(id).await {
            warn!(id = %id, error = %source, "Data record deleted but key record remains");
            return Err(SecretError::PartialDelete {
                id: id.to_string(),
                source,
            });
        }

        info!(id = %id, "Deleted secret");
        Ok(())
    }

    /// Release both backends. Idempotent.
    pub async fn close(&self) -> Result<(), SecretError> {
        let previous = std::mem::replace(&mut *self.state.write(), Lifecycle::Closed);
        let Lifecycle::Running(backends) = previous else {
            return Ok(());
        };

        let data_result = backends.data.close().await;
        let key_result = backends.keys.close().await;

        match (data_result, key_result) {
            (Ok(()), Ok(())) => {}
            (Err(source), Ok(())) => {
                return Err(SecretError::backend(Step::Close, BackendKind::Data, source))
            }
            (Ok(()), Err(source)) => {
                return Err(SecretError::backend(Step::Close, BackendKind::Key, source))
            }
            (Err(source), Err(key_err)) => {
                warn!(error = %key_err, "Key store also failed to close");
                return Err(SecretError::Backend {
                    step: Step::Close,
                    backend: BackendKind::Data,
                    source,
                    compensation: Some(key_err),
                });
            }
        }

        info!("Secret manager closed");
        Ok(())
    }

    fn ensure_uninitialized(&self) -> Result<(), SecretError> {
        match *self.state.read() {
            Lifecycle::Uninitialized => Ok(()),
            Lifecycle::Running(_) | Lifecycle::Closed => Err(SecretError::AlreadyInitialized),
        }
    }

    fn backends(&self) -> Result<Backends, SecretError> {
        match &*self.state.read() {
            Lifecycle::Running(backends) => Ok(backends.clone()),
            Lifecycle::Uninitialized => Err(SecretError::NotInitialized),
            Lifecycle::Closed => Err(SecretError::Closed),
        }
    }

    async fn allocate_id(&self, backends: &Backends) -> Result<String, SecretError> {
        for _ in 0..MAX_ID_ATTEMPTS {
            let candidate = self.ids.next_id();
            if candidate.is_empty() {
                continue;
            }
            if is_live(backends, &candidate).await? {
                debug!(id = %candidate, "Generated id already in use, drawing another");
                continue;
            }
            return Ok(candidate);
        }
        Err(SecretError::Internal(format!(
            "no unused id after {MAX_ID_ATTEMPTS} attempts"
        )))
    }
}

fn validate(entry: &SecretEntry, max_secret_size: usize) -> Result<(), SecretError> {
    if entry.secret_data.is_empty() {
        return Err(SecretError::InvalidInput("secret data is empty".to_string()));
    }
    if entry.secret_data.len() > max_secret_size {
        return Err(SecretError::InvalidInput(format!(
            "secret data is {} bytes, limit is {}",
            entry.secret_data.len(),
            max_secret_size
        )));
    }
    if entry.is_expired_at(Utc::now()) {
        return Err(SecretError::InvalidInput(format!(
            "expiration time {} is not in the future",
            entry.expiration_time
        )));
    }
    Ok(())
}

async fn is_live(backends: &Backends, id: &str) -> Result<bool, SecretError> {
    match backends.keys.get(id).await {
        Ok(_) => return Ok(true),
        Err(e) if e.is_not_found() => {}
        Err(e) => return Err(SecretError::backend(Step::GenerateId, BackendKind::Key, e)),
    }
    match backends.data.get(id).await {
        Ok(_) => Ok(true),
        Err(e) if e.is_not_found() => Ok(false),
        Err(e) => Err(SecretError::backend(Step::GenerateId, BackendKind::Data, e)),
    }
}

/// Best-effort removal of an expired secret, data record first
async fn reclaim_expired(backends: &Backends, id: &str) {
    if let Err(e) = backends.data.delete(id).await {
        warn!(id = %id, error = %e, "Failed to reclaim expired data record");
        return;
    }
    if let Err(e) = backends.crypto.destroy_key(id).await {
        warn!(id = %id, error = %e, "Failed to reclaim expired key record");
    }
}
