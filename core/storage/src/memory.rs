//! In-memory submission store for testing.

use async_trait::async_trait;
use futures::{stream, StreamExt};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::store::SubmissionStore;
use submitvault_common::{ByteStream, Error, Result, Submission, SubmissionId};

#[derive(Debug, Clone)]
struct Entry {
    submission: Submission,
    blob: Vec<u8>,
}

/// In-memory submission store.
///
/// Useful for testing and development. All data is stored in memory
/// and lost on drop. A blob is collected completely before the entry is
/// inserted, so a failing stream leaves nothing behind.
#[derive(Default)]
pub struct MemoryStore {
    entries: Arc<RwLock<HashMap<SubmissionId, Entry>>>,
}

impl MemoryStore {
    /// Create a new empty memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the stored blob of a submission in place.
    ///
    /// Exists to simulate on-disk corruption in tests.
    pub fn replace_blob(&self, id: &SubmissionId, blob: Vec<u8>) -> Result<()> {
        let mut entries = self.entries.write().map_err(|_| poisoned())?;
        let entry = entries
            .get_mut(id)
            .ok_or_else(|| Error::NotFound(format!("Submission not found: {}", id)))?;
        entry.blob = blob;
        Ok(())
    }

    fn entry(&self, id: &SubmissionId) -> Result<Entry> {
        let entries = self.entries.read().map_err(|_| poisoned())?;
        entries
            .get(id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("Submission not found: {}", id)))
    }
}

fn poisoned() -> Error {
    Error::Storage("Memory store lock poisoned".to_string())
}

#[async_trait]
impl SubmissionStore for MemoryStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn put(&self, submission: &Submission, mut blob: ByteStream<'_>) -> Result<SubmissionId> {
        let mut data = Vec::new();
        while let Some(chunk) = blob.next().await {
            data.extend_from_slice(&chunk?);
        }

        let mut entries = self.entries.write().map_err(|_| poisoned())?;
        if entries.contains_key(&submission.id) {
            return Err(Error::Storage(format!(
                "Submission already exists: {}",
                submission.id
            )));
        }
        entries.insert(
            submission.id,
            Entry {
                submission: submission.clone(),
                blob: data,
            },
        );
        Ok(submission.id)
    }

    async fn get(&self, id: &SubmissionId) -> Result<Submission> {
        Ok(self.entry(id)?.submission)
    }

    async fn list(&self) -> Result<Vec<Submission>> {
        let entries = self.entries.read().map_err(|_| poisoned())?;
        let mut results: Vec<Submission> =
            entries.values().map(|e| e.submission.clone()).collect();
        results.sort_by(|a, b| (a.created_at, a.id).cmp(&(b.created_at, b.id)));
        Ok(results)
    }

    async fn open_blob(&self, id: &SubmissionId) -> Result<ByteStream<'static>> {
        let data = self.entry(id)?.blob;
        Ok(Box::pin(stream::once(async move { Ok(data) })))
    }
}
