//! Secret entries and the records persisted for them

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

/// A secret as seen by callers
#[derive(Clone, PartialEq, Eq)]
pub struct SecretEntry {
    /// Assigned by the secret manager on creation; ignored on input
    pub id: String,
    /// Secret payload, zeroed on drop
    pub secret_data: Zeroizing<Vec<u8>>,
    /// Principal that created the secret
    pub owner: String,
    /// Instant after which the secret is treated as gone
    pub expiration_time: DateTime<Utc>,
}

impl SecretEntry {
    pub fn new(
        secret_data: impl Into<Vec<u8>>,
        owner: impl Into<String>,
        expiration_time: DateTime<Utc>,
    ) -> Self {
        Self {
            id: String::new(),
            secret_data: Zeroizing::new(secret_data.into()),
            owner: owner.into(),
            expiration_time,
        }
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expiration_time <= now
    }

    /// Compares payload, owner and expiration, ignoring the id.
    pub fn same_secret(&self, other: &SecretEntry) -> bool {
        self.secret_data == other.secret_data
            && self.owner == other.owner
            && self.expiration_time == other.expiration_time
    }
}

impl std::fmt::Debug for SecretEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretEntry")
            .field("id", &self.id)
            .field(
                "secret_data",
                &format_args!("<redacted {} bytes>", self.secret_data.len()),
            )
            .field("owner", &self.owner)
            .field("expiration_time", &self.expiration_time)
            .finish()
    }
}

/// Current on-store format of [`EncryptedRecord`]
pub const RECORD_VERSION: u32 = 1;

/// Ciphertext-bearing record kept in the data store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncryptedRecord {
    pub version: u32,
    pub id: String,
    pub owner: String,
    #[serde(with = "b64")]
    pub ciphertext: Vec<u8>,
    #[serde(with = "b64")]
    pub nonce: Vec<u8>,
    pub expiration_time: DateTime<Utc>,
}

impl EncryptedRecord {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expiration_time <= now
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}

mod b64 {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD.decode(encoded).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_debug_redacts_secret_data() {
        let entry = SecretEntry::new("hunter2", "user0", Utc::now());
        let printed = format!("{entry:?}");
        assert!(!printed.contains("hunter2"));
        assert!(printed.contains("<redacted 7 bytes>"));
        assert!(printed.contains("user0"));
    }

    #[test]
    fn test_same_secret_ignores_id() {
        let expires = Utc::now() + Duration::hours(1);
        let mut a = SecretEntry::new("secret0", "user0", expires);
        let b = SecretEntry::new("secret0", "user0", expires);
        a.id = "assigned".to_string();

        assert!(a.same_secret(&b));
        assert_ne!(a, b);

        let c = SecretEntry::new("secret1", "user0", expires);
        assert!(!a.same_secret(&c));
    }

    #[test]
    fn test_expiry_boundary_is_expired() {
        let now = Utc::now();
        let entry = SecretEntry::new("x", "o", now);
        assert!(entry.is_expired_at(now));
        assert!(!entry.is_expired_at(now - Duration::milliseconds(1)));
    }

    #[test]
    fn test_record_encoding_keeps_timestamp_precision() {
        let record = EncryptedRecord {
            version: RECORD_VERSION,
            id: "id-1".to_string(),
            owner: "user0".to_string(),
            ciphertext: vec![0xde, 0xad, 0xbe, 0xef],
            nonce: vec![7; 12],
            expiration_time: Utc::now(),
        };

        let bytes = record.to_bytes().unwrap();
        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(json["ciphertext"], "3q2+7w==");

        let decoded = EncryptedRecord::from_bytes(&bytes).unwrap();
        assert_eq!(decoded, record);
    }

    #[test]
    fn test_record_rejects_bad_base64() {
        let raw = br#"{"version":1,"id":"a","owner":"o","ciphertext":"!!","nonce":"","expirationTime":"2030-01-01T00:00:00Z"}"#;
        assert!(EncryptedRecord::from_bytes(raw).is_err());
    }
}
