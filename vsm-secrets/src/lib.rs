//! Secret storage for VSM
//!
//! Secrets are envelope-encrypted and split across two independently
//! pluggable backends:
//! - a [`KeyStore`] holding one wrapped data key per secret
//! - a [`DataStore`] holding the ciphertext, owner and expiration
//!
//! [`SecretManager`] coordinates create, get and delete across both.

pub mod crypto;
pub mod error;
pub mod handlers;
pub mod id;
pub mod manager;
pub mod model;
pub mod storage;

pub use crypto::{CryptoEngine, CryptoError, KeyHandle, MasterKey};
pub use error::{BackendKind, ErrorKind, SecretError, Step};
pub use handlers::SecretsState;
pub use id::{IdSource, SequenceSource, UuidSource};
pub use manager::{ManagerConfig, SecretManager};
pub use model::{EncryptedRecord, SecretEntry};
pub use storage::{DataStore, KeyStore, MemoryDataStore, MemoryKeyStore, StorageError};
