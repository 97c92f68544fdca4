//! Key types with secure memory handling.
//!
//! All key types automatically zeroize their memory on drop to prevent
//! sensitive data from persisting in memory.

use blake2::digest::consts::U32;
use blake2::{Blake2b, Digest};
use serde::{Deserialize, Serialize};
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Length of encryption keys in bytes (256-bit).
pub const KEY_LENGTH: usize = 32;

/// Length of the KDF salt in bytes.
pub const SALT_LENGTH: usize = 32;

/// Salt label used when the deployment does not configure one.
pub const DEFAULT_SALT_LABEL: &str = "submitvault/submission-key/v1";

/// Symmetric key derived from the deployment secret.
///
/// One key encrypts every submission; uniqueness per submission is carried
/// by the IV. Never persisted, never logged.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct DerivedKey {
    key: [u8; KEY_LENGTH],
}

impl DerivedKey {
    /// Create a key from raw bytes.
    pub fn from_bytes(key: [u8; KEY_LENGTH]) -> Self {
        Self { key }
    }

    /// Get the key bytes.
    ///
    /// # Security
    /// The returned slice should be used immediately and not stored.
    pub fn as_bytes(&self) -> &[u8; KEY_LENGTH] {
        &self.key
    }
}

impl fmt::Debug for DerivedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DerivedKey([REDACTED])")
    }
}

/// Salt for key derivation.
///
/// Fixed per deployment: the key is re-derived on demand and must come out
/// identical every time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Salt(pub [u8; SALT_LENGTH]);

impl Salt {
    /// Build the salt from a deployment label.
    ///
    /// The label is hashed with BLAKE2b-256 so any string yields a
    /// full-length salt.
    pub fn from_label(label: &str) -> Self {
        let mut hasher = Blake2b::<U32>::new();
        hasher.update(b"submitvault-salt");
        hasher.update(label.as_bytes());
        let digest = hasher.finalize();

        let mut salt = [0u8; SALT_LENGTH];
        salt.copy_from_slice(&digest);
        Self(salt)
    }

    /// Create from bytes.
    pub fn from_bytes(bytes: [u8; SALT_LENGTH]) -> Self {
        Self(bytes)
    }

    /// Get the salt bytes.
    pub fn as_bytes(&self) -> &[u8; SALT_LENGTH] {
        &self.0
    }
}

impl Default for Salt {
    fn default() -> Self {
        Self::from_label(DEFAULT_SALT_LABEL)
    }
}
