//! Pipeline configuration.

use serde::{Deserialize, Serialize};
use std::path::Path;

use submitvault_common::{Error, Result, SensitiveBytes};
use submitvault_crypto::keys::DEFAULT_SALT_LABEL;
use submitvault_crypto::{KdfParams, Salt, DEFAULT_CHUNK_SIZE, MAX_CHUNK_SIZE};

/// Environment variable holding the deployment secret.
pub const SECRET_ENV_VAR: &str = "ENCRYPTION_PASSWORD";

/// When the submission key is derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum KeyPolicy {
    /// Derive once at startup and keep the key for the process lifetime.
    #[default]
    Cached,
    /// Derive again for every ingest and egress; nothing stays resident.
    PerRequest,
}

/// Settings shared by ingest and egress.
///
/// The secret itself is deliberately not part of this struct; it only ever
/// comes from the environment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Plaintext bytes per encrypted frame.
    pub chunk_size: usize,
    /// Deployment label the KDF salt is built from.
    pub salt_label: String,
    /// Argon2id cost parameters.
    pub kdf: KdfParams,
    /// Key caching policy.
    pub key_policy: KeyPolicy,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            salt_label: DEFAULT_SALT_LABEL.to_string(),
            kdf: KdfParams::default(),
            key_policy: KeyPolicy::default(),
        }
    }
}

impl PipelineConfig {
    /// Load configuration from a JSON file. Missing fields take defaults.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let data = std::fs::read(path).map_err(|e| {
            Error::Configuration(format!("Cannot read {}: {}", path.display(), e))
        })?;
        let config: Self = serde_json::from_slice(&data)
            .map_err(|e| Error::Configuration(format!("Invalid {}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Check the values before anything is derived or written.
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 || self.chunk_size > MAX_CHUNK_SIZE {
            return Err(Error::Configuration(format!(
                "chunk_size must be between 1 and {}, got {}",
                MAX_CHUNK_SIZE, self.chunk_size
            )));
        }
        if self.salt_label.is_empty() {
            return Err(Error::Configuration("salt_label must not be empty".to_string()));
        }
        Ok(())
    }

    /// The deployment salt.
    pub fn salt(&self) -> Salt {
        Salt::from_label(&self.salt_label)
    }
}

/// Read the deployment secret from `ENCRYPTION_PASSWORD`.
///
/// # Errors
/// - `Configuration` if the variable is unset, empty or not UTF-8
pub fn secret_from_env() -> Result<SensitiveBytes> {
    match std::env::var(SECRET_ENV_VAR) {
        Ok(value) if !value.is_empty() => Ok(SensitiveBytes::from(value)),
        _ => Err(Error::Configuration(format!(
            "{} is not set; refusing to start without an encryption secret",
            SECRET_ENV_VAR
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = PipelineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.key_policy, KeyPolicy::Cached);
        assert_eq!(config.salt(), Salt::default());
    }

    #[test]
    fn test_chunk_size_bounds() {
        let mut config = PipelineConfig {
            chunk_size: 0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(Error::Configuration(_))));

        config.chunk_size = MAX_CHUNK_SIZE + 1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_json_takes_defaults() {
        let config: PipelineConfig =
            serde_json::from_str(r#"{"key_policy": "per-request", "chunk_size": 4096}"#).unwrap();

        assert_eq!(config.key_policy, KeyPolicy::PerRequest);
        assert_eq!(config.chunk_size, 4096);
        assert_eq!(config.salt_label, DEFAULT_SALT_LABEL);
        assert_eq!(config.kdf, KdfParams::default());
    }

    #[test]
    fn test_secret_from_env() {
        std::env::remove_var(SECRET_ENV_VAR);
        assert!(matches!(secret_from_env(), Err(Error::Configuration(_))));

        std::env::set_var(SECRET_ENV_VAR, "");
        assert!(matches!(secret_from_env(), Err(Error::Configuration(_))));

        std::env::set_var(SECRET_ENV_VAR, "hunter2");
        let secret = secret_from_env().unwrap();
        assert_eq!(secret.as_bytes(), b"hunter2");

        std::env::remove_var(SECRET_ENV_VAR);
    }

    #[test]
    fn test_from_file_rejects_bad_values() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("pipeline.json");
        std::fs::write(&path, r#"{"chunk_size": 0}"#).unwrap();

        assert!(matches!(
            PipelineConfig::from_file(&path),
            Err(Error::Configuration(_))
        ));
        assert!(PipelineConfig::from_file(dir.path().join("missing.json")).is_err());
    }
}
