//! Ingest: validate, encrypt and persist one upload.
//!
//! The plaintext is never written anywhere. It flows from the caller's
//! stream through the encryptor straight into the store's staging area, and
//! becomes visible only when the store commits.

use chrono::Utc;
use futures::stream::{self, StreamExt, TryStreamExt};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::task::Poll;
use tracing::{debug, info, warn};

use crate::config::PipelineConfig;
use crate::keys::KeyProvider;
use submitvault_common::{
    sanitize_file_name, ByteStream, Error, Result, Submission, SubmissionId,
};
use submitvault_crypto::{encrypt_stream, generate_iv};
use submitvault_storage::SubmissionStore;

/// One upload as handed over by the transport.
pub struct Upload<'a> {
    pub name: String,
    pub email: String,
    pub genre: String,
    /// Client-side file name, sanitized before it is stored.
    pub file_name: Option<String>,
    /// File content; `None` if the client sent no file.
    pub file: Option<ByteStream<'a>>,
}

/// Progress of a single ingest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestStage {
    Validating,
    Deriving,
    Encrypting,
    Persisting,
    Committed,
    Failed,
}

impl fmt::Display for IngestStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            IngestStage::Validating => "validating",
            IngestStage::Deriving => "deriving",
            IngestStage::Encrypting => "encrypting",
            IngestStage::Persisting => "persisting",
            IngestStage::Committed => "committed",
            IngestStage::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Turns uploads into committed submissions.
pub struct IngestPipeline {
    keys: Arc<KeyProvider>,
    store: Arc<dyn SubmissionStore>,
    chunk_size: usize,
}

impl IngestPipeline {
    /// Create an ingest pipeline.
    pub fn new(
        keys: Arc<KeyProvider>,
        store: Arc<dyn SubmissionStore>,
        config: &PipelineConfig,
    ) -> Self {
        Self {
            keys,
            store,
            chunk_size: config.chunk_size,
        }
    }

    /// Ingest one upload.
    ///
    /// # Postconditions
    /// - On success the returned submission is committed and listed
    /// - On failure nothing of the upload is observable in the store
    ///
    /// # Errors
    /// - `Validation` if a field or the file is missing (nothing touched)
    /// - `Configuration` if the key cannot be derived
    /// - `Encryption` if the upload stream breaks mid-way
    /// - `Storage` if the store cannot write or commit
    pub async fn ingest(&self, upload: Upload<'_>) -> Result<Submission> {
        let mut stage = IngestStage::Validating;
        let result = self.run(upload, &mut stage).await;

        match &result {
            Ok(submission) => {
                info!(id = %submission.id, store = self.store.name(), "Submission stored");
            }
            Err(e) => {
                if e.is_client_error() {
                    debug!(stage = %stage, error = %e, "Upload rejected");
                } else {
                    warn!(stage = %stage, error = %e, "Ingest failed");
                }
                advance(&mut stage, IngestStage::Failed);
            }
        }
        result
    }

    async fn run(&self, upload: Upload<'_>, stage: &mut IngestStage) -> Result<Submission> {
        let Upload {
            name,
            email,
            genre,
            file_name,
            file,
        } = upload;

        let name = required("name", name)?;
        let email = required("email", email)?;
        let genre = required("genre", genre)?;
        let file = file.ok_or_else(|| Error::Validation("A file is required".to_string()))?;

        advance(stage, IngestStage::Deriving);
        let key = self.keys.key().await?;
        let submission = Submission {
            id: SubmissionId::generate(),
            name,
            email,
            genre,
            file_name: file_name.as_deref().and_then(sanitize_file_name),
            iv: generate_iv(),
            created_at: Utc::now(),
        };

        advance(stage, IngestStage::Encrypting);
        let plaintext: ByteStream<'_> = Box::pin(file.map_err(upload_error));
        let ciphertext = encrypt_stream(&key, submission.iv, self.chunk_size, plaintext)?;
        drop(key);

        // Flips once the ciphertext is exhausted; from then on only the
        // store is working.
        let drained = Arc::new(AtomicBool::new(false));
        let marker = {
            let drained = Arc::clone(&drained);
            stream::poll_fn(move |_| -> Poll<Option<Result<Vec<u8>>>> {
                drained.store(true, Ordering::Release);
                Poll::Ready(None)
            })
        };

        let result = self
            .store
            .put(&submission, Box::pin(ciphertext.chain(marker)))
            .await;
        if drained.load(Ordering::Acquire) {
            advance(stage, IngestStage::Persisting);
        }
        result?;

        advance(stage, IngestStage::Committed);
        Ok(submission)
    }
}

fn advance(stage: &mut IngestStage, next: IngestStage) {
    debug!(from = %stage, to = %next, "Ingest stage");
    *stage = next;
}

fn required(field: &str, value: String) -> Result<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(Error::Validation(format!("The {} field is required", field)));
    }
    Ok(trimmed.to_string())
}

/// Failures of the plaintext source surface as `Encryption`; a
/// `Validation` raised by the transport (e.g. a size limit) stays one.
fn upload_error(err: Error) -> Error {
    match err {
        Error::Validation(_) | Error::Encryption(_) => err,
        other => Error::Encryption(format!("Upload stream failed: {}", other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::{fast_config, pipelines, upload};
    use submitvault_storage::MemoryStore;

    #[tokio::test]
    async fn test_missing_fields_rejected_before_storage() {
        let store = Arc::new(MemoryStore::new());
        let (ingest, _) = pipelines(store.clone(), fast_config());

        for (name, email, genre) in [("", "a@b.com", "G"), ("A", "  ", "G"), ("A", "a@b.com", "")] {
            let mut bad = upload(b"data");
            bad.name = name.to_string();
            bad.email = email.to_string();
            bad.genre = genre.to_string();
            assert!(matches!(
                ingest.ingest(bad).await,
                Err(Error::Validation(_))
            ));
        }

        let mut no_file = upload(b"data");
        no_file.file = None;
        assert!(matches!(
            ingest.ingest(no_file).await,
            Err(Error::Validation(_))
        ));

        assert!(store.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_broken_upload_is_encryption_error() {
        let store = Arc::new(MemoryStore::new());
        let (ingest, _) = pipelines(store.clone(), fast_config());

        let parts: Vec<Result<Vec<u8>>> = vec![
            Ok(vec![0u8; 10]),
            Err(Error::Storage("connection reset".to_string())),
        ];
        let mut broken = upload(b"");
        broken.file = Some(Box::pin(stream::iter(parts)));

        assert!(matches!(
            ingest.ingest(broken).await,
            Err(Error::Encryption(_))
        ));
        assert!(store.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_transport_validation_passes_through() {
        let store = Arc::new(MemoryStore::new());
        let (ingest, _) = pipelines(store.clone(), fast_config());

        let parts: Vec<Result<Vec<u8>>> =
            vec![Err(Error::Validation("File is too large".to_string()))];
        let mut oversized = upload(b"");
        oversized.file = Some(Box::pin(stream::iter(parts)));

        assert!(matches!(
            ingest.ingest(oversized).await,
            Err(Error::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_fields_trimmed_and_file_name_sanitized() {
        let store = Arc::new(MemoryStore::new());
        let (ingest, _) = pipelines(store, fast_config());

        let mut input = upload(b"data");
        input.name = "  Ada  ".to_string();
        input.file_name = Some("../../evil name.wav".to_string());

        let submission = ingest.ingest(input).await.unwrap();
        assert_eq!(submission.name, "Ada");
        assert_eq!(submission.file_name.as_deref(), Some("evilname.wav"));
    }

    #[test]
    fn test_stage_display() {
        assert_eq!(IngestStage::Persisting.to_string(), "persisting");
        assert_eq!(IngestStage::Failed.to_string(), "failed");
    }
}
