//! Common types used throughout SubmitVault.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, Utc};
use futures::Stream;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::pin::Pin;
use std::str::FromStr;
use uuid::Uuid;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Length of a per-submission IV in bytes (96-bit).
pub const IV_LENGTH: usize = 12;

/// Longest file name kept in a record.
const MAX_FILE_NAME_LEN: usize = 128;

/// Byte stream type for upload/download operations.
pub type ByteStream<'a> = Pin<Box<dyn Stream<Item = crate::Result<Vec<u8>>> + Send + 'a>>;

/// Unique identifier for a submission.
///
/// Doubles as the storage key of the ciphertext blob, so only values that
/// parse as a UUID are ever accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubmissionId(Uuid);

impl SubmissionId {
    /// Generate a fresh random identifier.
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse an identifier received from outside.
    ///
    /// # Errors
    /// - Returns `Validation` if the value is not a UUID
    pub fn parse(id: &str) -> crate::Result<Self> {
        Uuid::parse_str(id)
            .map(Self)
            .map_err(|_| crate::Error::Validation(format!("Malformed submission id: {:?}", id)))
    }
}

impl FromStr for SubmissionId {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for SubmissionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

/// Per-submission nonce.
///
/// Serialized as base64 in records. Not secret, but never exposed through
/// the listing endpoint either.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Iv([u8; IV_LENGTH]);

impl Iv {
    /// Create from bytes.
    pub fn from_bytes(bytes: [u8; IV_LENGTH]) -> Self {
        Self(bytes)
    }

    /// Get the IV bytes.
    pub fn as_bytes(&self) -> &[u8; IV_LENGTH] {
        &self.0
    }
}

impl fmt::Debug for Iv {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Iv([{} bytes])", IV_LENGTH)
    }
}

impl Serialize for Iv {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(self.0))
    }
}

impl<'de> Deserialize<'de> for Iv {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        let decoded = STANDARD
            .decode(encoded.as_bytes())
            .map_err(serde::de::Error::custom)?;
        let bytes: [u8; IV_LENGTH] = decoded.try_into().map_err(|v: Vec<u8>| {
            serde::de::Error::custom(format!("IV must be {} bytes, got {}", IV_LENGTH, v.len()))
        })?;
        Ok(Self(bytes))
    }
}

/// Persisted metadata of one submission.
///
/// The ciphertext blob is addressed by `id`; there is no separate pointer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Submission {
    pub id: SubmissionId,
    pub name: String,
    pub email: String,
    pub genre: String,
    /// Sanitized name of the uploaded file, if the client sent one.
    #[serde(default)]
    pub file_name: Option<String>,
    pub iv: Iv,
    pub created_at: DateTime<Utc>,
}

impl Submission {
    /// Public download location of this submission.
    pub fn download_path(&self) -> String {
        format!("/download/{}", self.id)
    }

    /// File name offered to downloaders.
    pub fn attachment_name(&self) -> String {
        self.file_name
            .clone()
            .unwrap_or_else(|| self.id.to_string())
    }
}

/// Reduce a client-supplied file name to a safe header/path value.
///
/// Keeps only the final path component and `[A-Za-z0-9._-]`. Returns `None`
/// when nothing usable is left.
pub fn sanitize_file_name(raw: &str) -> Option<String> {
    let base = raw.rsplit(|c: char| c == '/' || c == '\\').next().unwrap_or(raw);
    let cleaned: String = base
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
        .take(MAX_FILE_NAME_LEN)
        .collect();
    let trimmed = cleaned.trim_start_matches('.');
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Sensitive data wrapper that zeroizes on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SensitiveBytes(Vec<u8>);

impl SensitiveBytes {
    /// Create new sensitive bytes.
    pub fn new(data: Vec<u8>) -> Self {
        Self(data)
    }

    /// Get a reference to the inner bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl From<String> for SensitiveBytes {
    fn from(value: String) -> Self {
        Self(value.into_bytes())
    }
}

impl fmt::Debug for SensitiveBytes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SensitiveBytes([REDACTED; {} bytes])", self.0.len())
    }
}
