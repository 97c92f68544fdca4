//! Submission pipelines for SubmitVault.
//!
//! Ingest validates an upload, encrypts it under a fresh IV and commits it
//! to a [`SubmissionStore`]; egress looks a submission up and streams the
//! verified plaintext back. Both share one [`KeyProvider`].
//!
//! [`SubmissionStore`]: submitvault_storage::SubmissionStore

pub mod config;
pub mod egress;
pub mod ingest;
pub mod keys;

pub use config::{secret_from_env, KeyPolicy, PipelineConfig, SECRET_ENV_VAR};
pub use egress::{Download, EgressPipeline};
pub use ingest::{IngestPipeline, IngestStage, Upload};
pub use keys::KeyProvider;

use std::sync::Arc;

use submitvault_common::{Result, SensitiveBytes};
use submitvault_storage::SubmissionStore;

/// Ingest and egress wired to the same key and store.
pub struct Pipelines {
    pub ingest: IngestPipeline,
    pub egress: EgressPipeline,
}

impl Pipelines {
    /// Validate the configuration, derive the key and build both pipelines.
    ///
    /// # Errors
    /// - `Configuration` for an invalid config or an empty secret
    pub fn new(
        secret: SensitiveBytes,
        config: &PipelineConfig,
        store: Arc<dyn SubmissionStore>,
    ) -> Result<Self> {
        config.validate()?;
        let keys = Arc::new(KeyProvider::new(secret, config)?);

        Ok(Self {
            ingest: IngestPipeline::new(Arc::clone(&keys), Arc::clone(&store), config),
            egress: EgressPipeline::new(keys, store),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::{stream, StreamExt};
    use std::collections::HashSet;
    use submitvault_common::{ByteStream, Error};
    use submitvault_crypto::KdfParams;
    use submitvault_storage::{LocalStore, MemoryStore};

    pub(crate) fn fast_config() -> PipelineConfig {
        PipelineConfig {
            chunk_size: 16,
            kdf: KdfParams {
                memory_cost: 1024,
                time_cost: 1,
                parallelism: 1,
            },
            ..Default::default()
        }
    }

    pub(crate) fn pipelines(
        store: Arc<dyn SubmissionStore>,
        config: PipelineConfig,
    ) -> (IngestPipeline, EgressPipeline) {
        let secret = SensitiveBytes::from("correct horse battery staple".to_string());
        let pipelines = Pipelines::new(secret, &config, store).unwrap();
        (pipelines.ingest, pipelines.egress)
    }

    pub(crate) fn upload(data: &[u8]) -> Upload<'static> {
        let parts: Vec<Result<Vec<u8>>> = data.chunks(7).map(|c| Ok(c.to_vec())).collect();
        Upload {
            name: "A".to_string(),
            email: "a@b.com".to_string(),
            genre: "G".to_string(),
            file_name: None,
            file: Some(Box::pin(stream::iter(parts))),
        }
    }

    pub(crate) async fn read_all(mut body: ByteStream<'_>) -> Vec<u8> {
        let mut data = Vec::new();
        while let Some(chunk) = body.next().await {
            data.extend(chunk.unwrap());
        }
        data
    }

    #[tokio::test]
    async fn test_roundtrip_local_store() {
        let temp = tempfile::TempDir::new().unwrap();
        let store = Arc::new(LocalStore::new(temp.path()).unwrap());
        let (ingest, egress) = pipelines(store, fast_config());

        for payload in [vec![], vec![0xFF; 10], vec![0x42; 16], (0..=255).collect()] {
            let submission = ingest.ingest(upload(&payload)).await.unwrap();
            let download = egress.open(&submission.id).await.unwrap();

            assert_eq!(download.submission, submission);
            assert_eq!(read_all(download.body).await, payload);
        }
        assert_eq!(egress.list().await.unwrap().len(), 4);
    }

    #[tokio::test]
    async fn test_per_request_policy_roundtrip() {
        let mut config = fast_config();
        config.key_policy = KeyPolicy::PerRequest;
        let (ingest, egress) = pipelines(Arc::new(MemoryStore::new()), config);

        let submission = ingest.ingest(upload(b"re-derived every time")).await.unwrap();
        let body = egress.open(&submission.id).await.unwrap().body;
        assert_eq!(read_all(body).await, b"re-derived every time");
    }

    #[tokio::test]
    async fn test_other_secret_cannot_read() {
        let store: Arc<dyn SubmissionStore> = Arc::new(MemoryStore::new());
        let (ingest, _) = pipelines(Arc::clone(&store), fast_config());
        let submission = ingest.ingest(upload(b"private")).await.unwrap();

        let other = Pipelines::new(
            SensitiveBytes::from("wrong secret".to_string()),
            &fast_config(),
            store,
        )
        .unwrap();
        assert!(matches!(
            other.egress.verify(&submission.id).await,
            Err(Error::Authentication(_))
        ));
    }

    #[tokio::test]
    async fn test_empty_secret_refused() {
        let result = Pipelines::new(
            SensitiveBytes::new(Vec::new()),
            &fast_config(),
            Arc::new(MemoryStore::new()),
        );
        assert!(matches!(result, Err(Error::Configuration(_))));
    }

    #[tokio::test]
    async fn test_concurrent_ingests_independent() {
        let temp = tempfile::TempDir::new().unwrap();
        let store = Arc::new(LocalStore::new(temp.path()).unwrap());
        let (ingest, egress) = pipelines(store, fast_config());
        let ingest = Arc::new(ingest);

        let handles: Vec<_> = (0..50u8)
            .map(|i| {
                let ingest = Arc::clone(&ingest);
                tokio::spawn(async move {
                    let payload = vec![i; 40 + i as usize];
                    let submission = ingest.ingest(upload(&payload)).await.unwrap();
                    (submission, payload)
                })
            })
            .collect();

        let mut ids = HashSet::new();
        let mut ivs = HashSet::new();
        for handle in handles {
            let (submission, payload) = handle.await.unwrap();
            assert!(ids.insert(submission.id));
            assert!(ivs.insert(*submission.iv.as_bytes()));

            let body = egress.open(&submission.id).await.unwrap().body;
            assert_eq!(read_all(body).await, payload);
        }
        assert_eq!(egress.list().await.unwrap().len(), 50);
    }
}
