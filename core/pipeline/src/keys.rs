//! Access to the submission key under the configured policy.

use std::sync::Arc;
use tracing::debug;

use crate::config::{KeyPolicy, PipelineConfig};
use submitvault_common::{Error, Result, SensitiveBytes};
use submitvault_crypto::{derive_key, DerivedKey, KdfParams, Salt};

/// Hands out the process-wide submission key.
///
/// Constructed once from the secret and shared by both pipelines. The key
/// is checked at construction under either policy, so a bad secret or bad
/// KDF parameters stop the process before it accepts traffic.
pub struct KeyProvider {
    secret: SensitiveBytes,
    salt: Salt,
    params: KdfParams,
    cached: Option<Arc<DerivedKey>>,
}

impl KeyProvider {
    /// Create a provider, deriving the key once.
    ///
    /// # Errors
    /// - `Configuration` if the secret is empty or the KDF parameters are
    ///   unusable
    pub fn new(secret: SensitiveBytes, config: &PipelineConfig) -> Result<Self> {
        let salt = config.salt();
        let params = config.kdf.clone();
        let key = derive_key(secret.as_bytes(), &salt, &params)?;

        let cached = match config.key_policy {
            KeyPolicy::Cached => Some(Arc::new(key)),
            KeyPolicy::PerRequest => None,
        };
        debug!(policy = ?config.key_policy, "Submission key ready");

        Ok(Self {
            secret,
            salt,
            params,
            cached,
        })
    }

    /// Get the key for one ingest or egress.
    pub async fn key(&self) -> Result<Arc<DerivedKey>> {
        if let Some(key) = &self.cached {
            return Ok(Arc::clone(key));
        }

        let secret = self.secret.clone();
        let salt = self.salt.clone();
        let params = self.params.clone();
        let key = tokio::task::spawn_blocking(move || derive_key(secret.as_bytes(), &salt, &params))
            .await
            .map_err(|e| Error::Configuration(format!("Key derivation task failed: {}", e)))??;

        Ok(Arc::new(key))
    }
}
