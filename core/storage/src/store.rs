//! Submission store trait definition.

use async_trait::async_trait;

use submitvault_common::{ByteStream, Result, Submission, SubmissionId};

/// Durable mapping from submission id to record and ciphertext blob.
///
/// All operations are async. Blobs are opaque ciphertext to the store; it
/// never sees keys or plaintext.
#[async_trait]
pub trait SubmissionStore: Send + Sync {
    /// Get the backend name (e.g., "local", "memory").
    fn name(&self) -> &str;

    /// Persist a record together with its ciphertext blob.
    ///
    /// # Postconditions
    /// - On success, `get`, `list` and `open_blob` observe the submission
    /// - On failure, nothing of it is observable
    ///
    /// # Errors
    /// - `Storage` on I/O failure or if the id is already taken
    /// - Any error yielded by `blob` is returned unchanged
    async fn put(&self, submission: &Submission, blob: ByteStream<'_>) -> Result<SubmissionId>;

    /// Fetch the record of one submission.
    ///
    /// # Errors
    /// - `NotFound` if no committed submission has this id
    async fn get(&self, id: &SubmissionId) -> Result<Submission>;

    /// List all committed records, ordered by creation time then id.
    async fn list(&self) -> Result<Vec<Submission>>;

    /// Open the ciphertext blob of one submission for streaming.
    ///
    /// # Errors
    /// - `NotFound` if no committed submission has this id
    async fn open_blob(&self, id: &SubmissionId) -> Result<ByteStream<'static>>;
}
