//! Credential material for remote engines.
//!
//! Write-only by contract: the secret goes in at registration and never
//! comes back out. `Debug` and `Serialize` emit a redacted placeholder,
//! and equality checks go through a blake3 fingerprint so the registry
//! can detect "same engine id, different credentials" without keeping
//! the secret in comparable form anywhere outside this type.

use serde::{Serialize, Serializer};

pub const REDACTED: &str = "[redacted]";

#[derive(Clone)]
pub struct EngineCredentials {
    secret: String,
}

impl EngineCredentials {
    pub fn new(secret: impl Into<String>) -> Self {
        Self { secret: secret.into() }
    }

    /// Free local engines need no credential.
    pub fn none() -> Self {
        Self { secret: String::new() }
    }

    pub fn is_empty(&self) -> bool {
        self.secret.is_empty()
    }

    /// Stable fingerprint of the secret; safe to store and log.
    pub fn fingerprint(&self) -> String {
        blake3::hash(self.secret.as_bytes()).to_hex().to_string()
    }

    /// Adapter-internal access for the actual provider call. Deliberately
    /// not `pub`-reexported anywhere that serializes.
    pub fn expose(&self) -> &str {
        &self.secret
    }
}

impl PartialEq for EngineCredentials {
    fn eq(&self, other: &Self) -> bool {
        self.fingerprint() == other.fingerprint()
    }
}

impl Eq for EngineCredentials {}

impl std::fmt::Debug for EngineCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineCredentials").field("secret", &REDACTED).finish()
    }
}

impl Serialize for EngineCredentials {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(REDACTED)
    }
}
