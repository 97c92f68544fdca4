//! Egress: look up a submission and stream its plaintext back.

use futures::{StreamExt, TryStreamExt};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::keys::KeyProvider;
use submitvault_common::{ByteStream, Result, Submission, SubmissionId};
use submitvault_crypto::decrypt_stream;
use submitvault_storage::SubmissionStore;

/// An opened submission.
///
/// `body` yields verified plaintext only. If the blob fails authentication
/// the stream ends with an `Authentication` error; consumers must abort
/// rather than treat what they got so far as the complete file.
pub struct Download {
    pub submission: Submission,
    pub body: ByteStream<'static>,
}

/// Serves submissions back as plaintext.
pub struct EgressPipeline {
    keys: Arc<KeyProvider>,
    store: Arc<dyn SubmissionStore>,
}

impl EgressPipeline {
    /// Create an egress pipeline.
    pub fn new(keys: Arc<KeyProvider>, store: Arc<dyn SubmissionStore>) -> Self {
        Self { keys, store }
    }

    /// Open a submission for download.
    ///
    /// # Errors
    /// - `NotFound` if the id is unknown (propagated from the store)
    /// - `Configuration` if the key cannot be derived
    pub async fn open(&self, id: &SubmissionId) -> Result<Download> {
        let submission = self.store.get(id).await?;
        let key = self.keys.key().await?;
        let blob = self.store.open_blob(id).await?;
        debug!(id = %id, "Opening submission");

        let id = *id;
        let body = decrypt_stream(&key, submission.iv, blob).inspect_err(move |e| {
            warn!(id = %id, error = %e, "Download aborted");
        });

        Ok(Download {
            submission,
            body: Box::pin(body),
        })
    }

    /// Decrypt a submission end to end without keeping the plaintext.
    ///
    /// Returns the plaintext length on success.
    pub async fn verify(&self, id: &SubmissionId) -> Result<u64> {
        let mut body = self.open(id).await?.body;
        let mut total = 0u64;
        while let Some(chunk) = body.next().await {
            total += chunk?.len() as u64;
        }
        Ok(total)
    }

    /// All committed submissions.
    pub async fn list(&self) -> Result<Vec<Submission>> {
        self.store.list().await
    }
}
