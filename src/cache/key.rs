//! Cache key generation.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheKey {
    pub hash: String,
}

impl CacheKey {
    pub fn new(hash: impl Into<String>) -> Self {
        Self { hash: hash.into() }
    }

    pub fn as_str(&self) -> &str {
        &self.hash
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.hash)
    }
}

impl From<&str> for CacheKey {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for CacheKey {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

/// Derives keys from request payloads.
///
/// Two requests with equal payloads map to the same key regardless of their
/// ids or priorities. Object keys are serialized in sorted order, so field
/// order in the payload does not matter.
#[derive(Debug, Clone, Default)]
pub struct CacheKeyGenerator {
    salt: Option<String>,
}

impl CacheKeyGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Namespace keys, e.g. per executor, so unrelated caches never collide.
    pub fn with_salt(mut self, salt: impl Into<String>) -> Self {
        self.salt = Some(salt.into());
        self
    }

    pub fn generate(&self, payload: &serde_json::Value) -> CacheKey {
        let mut hasher = Sha256::new();
        if let Some(ref s) = self.salt {
            hasher.update(s.as_bytes());
            hasher.update(b":");
        }
        hasher.update(canonical_json(payload).as_bytes());
        CacheKey::new(hex(&hasher.finalize()))
    }
}

/// SHA-256 of a JSON value's canonical form, hex encoded.
pub fn content_hash(value: &serde_json::Value) -> String {
    hex(&Sha256::digest(canonical_json(value).as_bytes()))
}

fn canonical_json(value: &serde_json::Value) -> String {
    // serde_json's default map is ordered by key
    serde_json::to_string(value).unwrap_or_default()
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}
