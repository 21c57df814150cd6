//! Request ID generation

use uuid::Uuid;

/// Header carrying the request ID on every response
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Per-request identifier, uppercase simple-hex UUID
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestId(String);

impl RequestId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().simple().to_string().to_uppercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_id_generation() {
        let id1 = RequestId::new();
        let id2 = RequestId::new();

        assert_ne!(id1, id2);
        assert_eq!(id1.as_str().len(), 32);
        assert!(id1.as_str().chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(id1.as_str(), id1.as_str().to_uppercase());
        assert_eq!(id1.to_string(), id1.as_str());
    }
}
