//! Key derivation using Argon2id.
//!
//! Argon2id is a memory-hard password hashing function that provides
//! resistance to both GPU and time-memory trade-off attacks, which keeps
//! brute-forcing the deployment secret from a leaked key expensive.

use argon2::{Algorithm, Argon2, Params, Version};
use serde::{Deserialize, Serialize};

use crate::keys::{DerivedKey, Salt, KEY_LENGTH};
use submitvault_common::{Error, Result};

/// Parameters for Argon2id key derivation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KdfParams {
    /// Memory cost in KiB (e.g., 65536 = 64 MiB).
    pub memory_cost: u32,
    /// Number of iterations.
    pub time_cost: u32,
    /// Degree of parallelism.
    pub parallelism: u32,
}

impl KdfParams {
    /// Create parameters suitable for interactive use.
    ///
    /// These parameters provide a balance between security and usability,
    /// targeting approximately 0.5-1 second of derivation time.
    pub fn interactive() -> Self {
        Self {
            memory_cost: 65536, // 64 MiB
            time_cost: 3,
            parallelism: 4,
        }
    }

    /// Create parameters suitable for sensitive data.
    ///
    /// Higher security parameters that may take several seconds.
    pub fn sensitive() -> Self {
        Self {
            memory_cost: 262144, // 256 MiB
            time_cost: 4,
            parallelism: 4,
        }
    }

    /// Create moderate parameters for small hosts.
    pub fn moderate() -> Self {
        Self {
            memory_cost: 32768, // 32 MiB
            time_cost: 3,
            parallelism: 2,
        }
    }

    /// Look up a preset by name.
    pub fn preset(name: &str) -> Result<Self> {
        match name {
            "interactive" => Ok(Self::interactive()),
            "moderate" => Ok(Self::moderate()),
            "sensitive" => Ok(Self::sensitive()),
            other => Err(Error::Configuration(format!(
                "Unknown KDF strength {:?}; use interactive, moderate or sensitive",
                other
            ))),
        }
    }
}

impl Default for KdfParams {
    fn default() -> Self {
        Self::interactive()
    }
}

/// Derive the submission key from the deployment secret and salt.
///
/// # Preconditions
/// - `secret` must not be empty
/// - `params` must have valid Argon2id parameters
///
/// # Postconditions
/// - The derived key is deterministic given the same inputs
///
/// # Errors
/// - `Configuration` if the secret is empty; a key is never derived from
///   an empty string
/// - `Configuration` if Argon2id parameters are invalid
///
/// # Security
/// - Secret is not stored or logged
pub fn derive_key(secret: &[u8], salt: &Salt, params: &KdfParams) -> Result<DerivedKey> {
    if secret.is_empty() {
        return Err(Error::Configuration(
            "Encryption secret is missing or empty".to_string(),
        ));
    }

    let argon2_params = Params::new(
        params.memory_cost,
        params.time_cost,
        params.parallelism,
        Some(KEY_LENGTH),
    )
    .map_err(|e| Error::Configuration(format!("Invalid KDF parameters: {}", e)))?;

    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, argon2_params);

    let mut key_bytes = [0u8; KEY_LENGTH];
    argon2
        .hash_password_into(secret, salt.as_bytes(), &mut key_bytes)
        .map_err(|e| Error::Configuration(format!("Key derivation failed: {}", e)))?;

    let key = DerivedKey::from_bytes(key_bytes);
    zeroize::Zeroize::zeroize(&mut key_bytes);
    Ok(key)
}

#[cfg(test)]
pub(crate) fn test_params() -> KdfParams {
    KdfParams {
        memory_cost: 1024,
        time_cost: 1,
        parallelism: 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derive_key_deterministic() {
        let secret = b"test-password-123";
        let salt = Salt::from_bytes([42u8; 32]);
        let params = test_params();

        let key1 = derive_key(secret, &salt, &params).unwrap();
        let key2 = derive_key(secret, &salt, &params).unwrap();

        assert_eq!(key1.as_bytes(), key2.as_bytes());
    }

    #[test]
    fn test_derive_key_different_salt() {
        let secret = b"test-password-123";
        let params = test_params();

        let key1 = derive_key(secret, &Salt::from_label("a"), &params).unwrap();
        let key2 = derive_key(secret, &Salt::from_label("b"), &params).unwrap();

        assert_ne!(key1.as_bytes(), key2.as_bytes());
    }

    #[test]
    fn test_derive_key_different_secret() {
        let salt = Salt::default();
        let params = test_params();

        let key1 = derive_key(b"password1", &salt, &params).unwrap();
        let key2 = derive_key(b"password2", &salt, &params).unwrap();

        assert_ne!(key1.as_bytes(), key2.as_bytes());
    }

    #[test]
    fn test_derive_key_empty_secret_is_configuration_error() {
        let result = derive_key(b"", &Salt::default(), &test_params());
        assert!(matches!(result, Err(Error::Configuration(_))));
    }

    #[test]
    fn test_derive_key_invalid_params() {
        let params = KdfParams {
            memory_cost: 1,
            time_cost: 0,
            parallelism: 1,
        };
        let result = derive_key(b"secret", &Salt::default(), &params);
        assert!(matches!(result, Err(Error::Configuration(_))));
    }

    #[test]
    fn test_preset_lookup() {
        assert_eq!(KdfParams::preset("moderate").unwrap(), KdfParams::moderate());
        assert!(KdfParams::preset("extreme").is_err());
    }
}
