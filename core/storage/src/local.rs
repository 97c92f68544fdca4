//! Local filesystem submission store.
//!
//! Layout under the root directory:
//!
//! ```text
//! staging/<id>-XXXXXX/     in-flight writes, never read
//! submissions/<id>/
//!     submission.json      record
//!     content.enc          ciphertext blob
//! ```
//!
//! A submission is written into its own staging directory and published by
//! renaming that directory into `submissions/`. The rename is the commit
//! point; readers only ever look inside `submissions/`.

use async_trait::async_trait;
use futures::StreamExt;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio_util::io::ReaderStream;
use tracing::{debug, warn};

use crate::store::SubmissionStore;
use submitvault_common::{ByteStream, Error, Result, Submission, SubmissionId};

const STAGING_DIR: &str = "staging";
const SUBMISSIONS_DIR: &str = "submissions";
const RECORD_FILE: &str = "submission.json";
const BLOB_FILE: &str = "content.enc";

/// Read buffer size when streaming blobs back out.
const READ_CAPACITY: usize = 64 * 1024;

/// Filesystem-backed submission store.
pub struct LocalStore {
    staging: PathBuf,
    submissions: PathBuf,
}

impl LocalStore {
    /// Open (or create) a store rooted at the given directory.
    ///
    /// # Postconditions
    /// - `staging/` and `submissions/` exist
    /// - Leftovers of interrupted writes in `staging/` are removed
    ///
    /// # Errors
    /// - `Storage` if the directories cannot be created
    pub fn new(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        let staging = root.join(STAGING_DIR);
        let submissions = root.join(SUBMISSIONS_DIR);

        // Sync for constructor
        std::fs::create_dir_all(&staging)?;
        std::fs::create_dir_all(&submissions)?;

        let store = Self {
            staging,
            submissions,
        };
        store.sweep_staging()?;
        Ok(store)
    }

    /// Directory holding a committed submission.
    pub fn submission_dir(&self, id: &SubmissionId) -> PathBuf {
        self.submissions.join(id.to_string())
    }

    fn sweep_staging(&self) -> Result<()> {
        for entry in std::fs::read_dir(&self.staging)? {
            let path = entry?.path();
            let removed = if path.is_dir() {
                std::fs::remove_dir_all(&path)
            } else {
                std::fs::remove_file(&path)
            };
            match removed {
                Ok(()) => debug!(path = %path.display(), "Removed stale staging entry"),
                Err(e) => warn!(path = %path.display(), error = %e, "Failed to remove staging entry"),
            }
        }
        Ok(())
    }

    /// Start writing a submission into a private staging directory.
    pub(crate) fn stage(&self, id: &SubmissionId) -> Result<StagedSubmission> {
        let dir = tempfile::Builder::new()
            .prefix(&format!("{}-", id))
            .tempdir_in(&self.staging)?;

        Ok(StagedSubmission {
            dir,
            target: self.submission_dir(id),
        })
    }

    async fn read_record(&self, id: &SubmissionId) -> Result<Submission> {
        let path = self.submission_dir(id).join(RECORD_FILE);
        let data = fs::read(&path).await.map_err(|e| not_found_or(e, id))?;
        Ok(serde_json::from_slice(&data)?)
    }
}

/// A submission being written.
///
/// Dropping it before `commit` removes everything written so far, which
/// covers both errors and cancelled futures.
pub(crate) struct StagedSubmission {
    dir: TempDir,
    target: PathBuf,
}

impl StagedSubmission {
    /// Write the blob, returning its length in bytes.
    pub(crate) async fn write_blob(&self, mut blob: ByteStream<'_>) -> Result<u64> {
        let mut file = fs::File::create(self.dir.path().join(BLOB_FILE)).await?;
        let mut written = 0u64;

        while let Some(chunk) = blob.next().await {
            let chunk = chunk?;
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }

        file.flush().await?;
        file.sync_all().await?;
        Ok(written)
    }

    /// Write the record.
    pub(crate) async fn write_record(&self, submission: &Submission) -> Result<()> {
        let data = serde_json::to_vec_pretty(submission)?;
        let mut file = fs::File::create(self.dir.path().join(RECORD_FILE)).await?;
        file.write_all(&data).await?;
        file.sync_all().await?;
        Ok(())
    }

    /// Publish the staged directory.
    ///
    /// # Errors
    /// - `Storage` if the id is already committed or the rename fails
    pub(crate) async fn commit(self) -> Result<()> {
        if fs::try_exists(&self.target).await? {
            return Err(Error::Storage(format!(
                "Submission already exists: {}",
                self.target.display()
            )));
        }

        let staged = self.dir.keep();
        if let Err(e) = fs::rename(&staged, &self.target).await {
            if let Err(cleanup) = fs::remove_dir_all(&staged).await {
                warn!(path = %staged.display(), error = %cleanup, "Failed to clean up staging directory");
            }
            return Err(Error::Storage(format!("Failed to commit submission: {}", e)));
        }

        // The rename is durable only once the parent directory is synced.
        if let Some(parent) = self.target.parent() {
            sync_dir(parent).await?;
        }
        Ok(())
    }
}

async fn sync_dir(dir: &Path) -> Result<()> {
    let handle = fs::File::open(dir).await?;
    handle.sync_all().await?;
    Ok(())
}

fn not_found_or(err: std::io::Error, id: &SubmissionId) -> Error {
    if err.kind() == ErrorKind::NotFound {
        Error::NotFound(format!("Submission not found: {}", id))
    } else {
        err.into()
    }
}

#[async_trait]
impl SubmissionStore for LocalStore {
    fn name(&self) -> &str {
        "local"
    }

    async fn put(&self, submission: &Submission, blob: ByteStream<'_>) -> Result<SubmissionId> {
        let staged = self.stage(&submission.id)?;
        let size = staged.write_blob(blob).await?;
        staged.write_record(submission).await?;
        staged.commit().await?;

        debug!(id = %submission.id, size, "Submission committed");
        Ok(submission.id)
    }

    async fn get(&self, id: &SubmissionId) -> Result<Submission> {
        self.read_record(id).await
    }

    async fn list(&self) -> Result<Vec<Submission>> {
        let mut results = Vec::new();
        let mut entries = fs::read_dir(&self.submissions).await?;

        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let Some(id) = name.to_str().and_then(|n| SubmissionId::parse(n).ok()) else {
                debug!(entry = ?name, "Skipping unknown entry in submissions directory");
                continue;
            };

            match self.read_record(&id).await {
                Ok(submission) => results.push(submission),
                Err(e) => warn!(id = %id, error = %e, "Skipping unreadable submission record"),
            }
        }

        results.sort_by(|a, b| (a.created_at, a.id).cmp(&(b.created_at, b.id)));
        Ok(results)
    }

    async fn open_blob(&self, id: &SubmissionId) -> Result<ByteStream<'static>> {
        let path = self.submission_dir(id).join(BLOB_FILE);
        let file = fs::File::open(&path)
            .await
            .map_err(|e| not_found_or(e, id))?;

        let stream = ReaderStream::with_capacity(file, READ_CAPACITY)
            .map(|chunk| chunk.map(|bytes| bytes.to_vec()).map_err(Error::from));
        Ok(Box::pin(stream))
    }
}
