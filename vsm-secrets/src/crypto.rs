//! Envelope encryption over the key store
//!
//! Every secret gets its own random data key. The data key seals the payload
//! with AES-256-GCM and is itself sealed under the master key before it is
//! written to the key store, so the key store never holds a usable key and the
//! data store never holds anything but ciphertext.

use aes_gcm::aead::{Aead, KeyInit, Payload};
use aes_gcm::{Aes256Gcm, Nonce};
use bytes::Bytes;
use rand::rngs::OsRng;
use rand::RngCore;
use std::sync::Arc;
use thiserror::Error;
use zeroize::Zeroizing;

use crate::storage::{KeyStore, StorageError};

pub const KEY_LEN: usize = 32;
pub const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;

/// Errors from the crypto engine
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("key store error: {0}")]
    Store(#[from] StorageError),

    #[error("failed to unwrap key record for {0}")]
    Unwrap(String),

    #[error("encryption failed")]
    Seal,

    #[error("ciphertext failed authentication")]
    Open,

    #[error("malformed key material: {0}")]
    MalformedKey(String),
}

/// Key-encryption key protecting every data key in the key store
pub struct MasterKey(Zeroizing<[u8; KEY_LEN]>);

impl MasterKey {
    /// Parse a 64-character hex string
    pub fn from_hex(hex_key: &str) -> Result<Self, CryptoError> {
        if hex_key.len() != KEY_LEN * 2 {
            return Err(CryptoError::MalformedKey(format!(
                "master key must be {} hex chars, got {}",
                KEY_LEN * 2,
                hex_key.len()
            )));
        }
        let bytes = Zeroizing::new(
            hex::decode(hex_key).map_err(|e| CryptoError::MalformedKey(e.to_string()))?,
        );
        let mut key = Zeroizing::new([0u8; KEY_LEN]);
        key.copy_from_slice(&bytes);
        Ok(Self(key))
    }

    /// Random key that lives only as long as the process
    pub fn generate() -> Self {
        let mut key = Zeroizing::new([0u8; KEY_LEN]);
        OsRng.fill_bytes(&mut key[..]);
        Self(key)
    }
}

impl std::fmt::Debug for MasterKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("MasterKey(<redacted>)")
    }
}

/// Unwrapped data key for one secret id. Zeroed on drop.
pub struct KeyHandle {
    id: String,
    key: Zeroizing<[u8; KEY_LEN]>,
}

impl std::fmt::Debug for KeyHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyHandle")
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}

/// Encrypts and decrypts secret payloads with per-secret keys
pub struct CryptoEngine {
    master: MasterKey,
    keys: Arc<dyn KeyStore>,
}

impl CryptoEngine {
    pub fn new(master: MasterKey, keys: Arc<dyn KeyStore>) -> Self {
        Self { master, keys }
    }

    /// Generate a data key for `id` and persist it, wrapped, in the key store
    pub async fn new_key_for(&self, id: &str) -> Result<KeyHandle, CryptoError> {
        let mut key = Zeroizing::new([0u8; KEY_LEN]);
        OsRng.fill_bytes(&mut key[..]);

        let wrapped = self.wrap_key(id, &key)?;
        self.keys.put(id, Bytes::from(wrapped)).await?;

        Ok(KeyHandle {
            id: id.to_string(),
            key,
        })
    }

    /// Load and unwrap the data key stored for `id`
    pub async fn key_for(&self, id: &str) -> Result<KeyHandle, CryptoError> {
        let record = self.keys.get(id).await?;
        let key = self.unwrap_key(id, &record)?;
        Ok(KeyHandle {
            id: id.to_string(),
            key,
        })
    }

    /// Remove the key record for `id`. Idempotent.
    pub async fn destroy_key(&self, id: &str) -> Result<(), StorageError> {
        self.keys.delete(id).await
    }

    /// Seal `plaintext` under the handle's key with a fresh nonce
    pub fn encrypt(
        &self,
        plaintext: &[u8],
        handle: &KeyHandle,
    ) -> Result<(Vec<u8>, Vec<u8>), CryptoError> {
        let nonce = random_nonce();
        let ciphertext = seal(&handle.key, &nonce, plaintext, handle.id.as_bytes())?;
        Ok((ciphertext, nonce.to_vec()))
    }

    /// Open ciphertext produced by [`CryptoEngine::encrypt`] for the same id
    pub fn decrypt(
        &self,
        ciphertext: &[u8],
        nonce: &[u8],
        handle: &KeyHandle,
    ) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
        if nonce.len() != NONCE_LEN || ciphertext.len() < TAG_LEN {
            return Err(CryptoError::Open);
        }
        open(&handle.key, nonce, ciphertext, handle.id.as_bytes())
    }

    // Key record layout: nonce || AES-256-GCM(master, data key), id as AAD
    fn wrap_key(&self, id: &str, key: &[u8; KEY_LEN]) -> Result<Vec<u8>, CryptoError> {
        let nonce = random_nonce();
        let sealed = seal(&self.master.0, &nonce, key, id.as_bytes())?;

        let mut record = Vec::with_capacity(NONCE_LEN + sealed.len());
        record.extend_from_slice(&nonce);
        record.extend_from_slice(&sealed);
        Ok(record)
    }

    fn unwrap_key(&self, id: &str, record: &[u8]) -> Result<Zeroizing<[u8; KEY_LEN]>, CryptoError> {
        if record.len() != NONCE_LEN + KEY_LEN + TAG_LEN {
            return Err(CryptoError::MalformedKey(format!(
                "key record for {} has length {}",
                id,
                record.len()
            )));
        }
        let (nonce, sealed) = record.split_at(NONCE_LEN);
        let opened = open(&self.master.0, nonce, sealed, id.as_bytes())
            .map_err(|_| CryptoError::Unwrap(id.to_string()))?;

        let mut key = Zeroizing::new([0u8; KEY_LEN]);
        key.copy_from_slice(&opened);
        Ok(key)
    }
}

fn seal(
    key: &[u8; KEY_LEN],
    nonce: &[u8],
    plaintext: &[u8],
    aad: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    let cipher = Aes256Gcm::new_from_slice(key).map_err(|_| CryptoError::Seal)?;
    cipher
        .encrypt(
            Nonce::from_slice(nonce),
            Payload {
                msg: plaintext,
                aad,
            },
        )
        .map_err(|_| CryptoError::Seal)
}

fn open(
    key: &[u8; KEY_LEN],
    nonce: &[u8],
    ciphertext: &[u8],
    aad: &[u8],
) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
    let cipher = Aes256Gcm::new_from_slice(key).map_err(|_| CryptoError::Open)?;
    cipher
        .decrypt(
            Nonce::from_slice(nonce),
            Payload {
                msg: ciphertext,
                aad,
            },
        )
        .map(Zeroizing::new)
        .map_err(|_| CryptoError::Open)
}

fn random_nonce() -> [u8; NONCE_LEN] {
    let mut nonce = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce);
    nonce
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryKeyStore;

    fn engine() -> (CryptoEngine, Arc<MemoryKeyStore>) {
        let keys = Arc::new(MemoryKeyStore::new());
        let engine = CryptoEngine::new(MasterKey::generate(), keys.clone());
        (engine, keys)
    }

    #[tokio::test]
    async fn test_encrypt_decrypt_roundtrip() {
        let (engine, keys) = engine();
        let handle = engine.new_key_for("id-1").await.unwrap();
        assert!(keys.contains("id-1"));

        let (ciphertext, nonce) = engine.encrypt(b"secret0", &handle).unwrap();
        assert_ne!(ciphertext.as_slice(), b"secret0");
        assert_eq!(nonce.len(), NONCE_LEN);

        let reloaded = engine.key_for("id-1").await.unwrap();
        let plaintext = engine.decrypt(&ciphertext, &nonce, &reloaded).unwrap();
        assert_eq!(plaintext.as_slice(), b"secret0");
    }

    #[tokio::test]
    async fn test_fresh_nonce_per_encryption() {
        let (engine, _) = engine();
        let handle = engine.new_key_for("id-1").await.unwrap();

        let (c1, n1) = engine.encrypt(b"same", &handle).unwrap();
        let (c2, n2) = engine.encrypt(b"same", &handle).unwrap();
        assert_ne!(n1, n2);
        assert_ne!(c1, c2);
    }

    #[tokio::test]
    async fn test_tampered_ciphertext_fails_closed() {
        let (engine, _) = engine();
        let handle = engine.new_key_for("id-1").await.unwrap();
        let (mut ciphertext, nonce) = engine.encrypt(b"secret0", &handle).unwrap();
        ciphertext[0] ^= 0x01;

        assert!(matches!(
            engine.decrypt(&ciphertext, &nonce, &handle),
            Err(CryptoError::Open)
        ));
    }

    #[tokio::test]
    async fn test_malformed_input_fails_closed() {
        let (engine, _) = engine();
        let handle = engine.new_key_for("id-1").await.unwrap();
        let (ciphertext, _) = engine.encrypt(b"secret0", &handle).unwrap();

        assert!(matches!(
            engine.decrypt(&ciphertext, &[0u8; 4], &handle),
            Err(CryptoError::Open)
        ));
        assert!(matches!(
            engine.decrypt(&[1, 2, 3], &[0u8; NONCE_LEN], &handle),
            Err(CryptoError::Open)
        ));
    }

    #[tokio::test]
    async fn test_handle_bound_to_its_id() {
        let (engine, _) = engine();
        let first = engine.new_key_for("id-1").await.unwrap();
        let (ciphertext, nonce) = engine.encrypt(b"secret0", &first).unwrap();

        // Same key bytes under a different id must not open the ciphertext.
        let moved = KeyHandle {
            id: "id-2".to_string(),
            key: first.key.clone(),
        };
        assert!(engine.decrypt(&ciphertext, &nonce, &moved).is_err());
    }

    #[tokio::test]
    async fn test_key_record_is_wrapped() {
        let (engine, keys) = engine();
        let handle = engine.new_key_for("id-1").await.unwrap();

        let record = keys.get("id-1").await.unwrap();
        assert_eq!(record.len(), NONCE_LEN + KEY_LEN + TAG_LEN);
        assert!(!record
            .windows(KEY_LEN)
            .any(|w| w == handle.key.as_slice()));
    }

    #[tokio::test]
    async fn test_wrong_master_key_cannot_unwrap() {
        let keys = Arc::new(MemoryKeyStore::new());
        let writer = CryptoEngine::new(MasterKey::generate(), keys.clone());
        writer.new_key_for("id-1").await.unwrap();

        let reader = CryptoEngine::new(MasterKey::generate(), keys);
        assert!(matches!(
            reader.key_for("id-1").await,
            Err(CryptoError::Unwrap(ref id)) if id == "id-1"
        ));
    }

    #[tokio::test]
    async fn test_missing_key_surfaces_not_found() {
        let (engine, _) = engine();
        match engine.key_for("nope").await {
            Err(CryptoError::Store(e)) => assert!(e.is_not_found()),
            other => panic!("expected not found, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_destroy_key_is_idempotent() {
        let (engine, keys) = engine();
        engine.new_key_for("id-1").await.unwrap();
        engine.destroy_key("id-1").await.unwrap();
        engine.destroy_key("id-1").await.unwrap();
        assert!(keys.is_empty());
    }

    #[test]
    fn test_master_key_from_hex() {
        let hex_key = "00".repeat(KEY_LEN);
        assert!(MasterKey::from_hex(&hex_key).is_ok());
        assert!(matches!(
            MasterKey::from_hex("abcd"),
            Err(CryptoError::MalformedKey(_))
        ));
        assert!(matches!(
            MasterKey::from_hex(&"zz".repeat(KEY_LEN)),
            Err(CryptoError::MalformedKey(_))
        ));
        assert_eq!(
            format!("{:?}", MasterKey::from_hex(&hex_key).unwrap()),
            "MasterKey(<redacted>)"
        );
    }
}
