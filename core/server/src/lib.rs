//! HTTP surface for SubmitVault.
//!
//! Exposes three routes:
//! - `POST /submit`: multipart form (name, email, genre, file)
//! - `GET /download/{id}`: decrypted file as an attachment
//! - `GET /submissions`: public listing, without IVs
//!
//! Request and response plumbing lives here; everything cryptographic or
//! persistent is delegated to the pipelines.

pub mod config;
pub mod error;
pub mod form;
pub mod handlers;

pub use config::ServerConfig;
pub use error::{ApiError, ApiResult};

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::info;

use submitvault_common::{Result, SensitiveBytes};
use submitvault_pipeline::Pipelines;
use submitvault_storage::LocalStore;

/// Room for multipart boundaries and the text fields on top of the file.
const FORM_OVERHEAD_BYTES: u64 = 64 * 1024;

/// Shared state of all handlers.
#[derive(Clone)]
pub struct AppState {
    pipelines: Arc<Pipelines>,
    max_upload_bytes: u64,
}

impl AppState {
    /// Create state around already built pipelines.
    pub fn new(pipelines: Pipelines, max_upload_bytes: u64) -> Self {
        Self {
            pipelines: Arc::new(pipelines),
            max_upload_bytes,
        }
    }

    /// Open the configured store and build the pipelines.
    ///
    /// # Errors
    /// - `Configuration` for invalid settings or an empty secret
    /// - `Storage` if the store directory cannot be prepared
    pub fn from_config(config: &ServerConfig, secret: SensitiveBytes) -> Result<Self> {
        config.validate()?;
        let store = Arc::new(LocalStore::new(&config.storage_root)?);
        let pipelines = Pipelines::new(secret, &config.pipeline, store)?;
        Ok(Self::new(pipelines, config.max_upload_bytes))
    }
}

/// Build the router.
pub fn router(state: AppState) -> Router {
    let body_limit = state.max_upload_bytes.saturating_add(FORM_OVERHEAD_BYTES);

    Router::new()
        .route("/submit", post(handlers::submit))
        .route("/download/{id}", get(handlers::download))
        .route("/submissions", get(handlers::list))
        .layer(DefaultBodyLimit::max(
            usize::try_from(body_limit).unwrap_or(usize::MAX),
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve on `listener` until `shutdown` resolves.
pub async fn serve<F>(listener: TcpListener, state: AppState, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    info!(addr = %listener.local_addr()?, "Listening for submissions");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await
}
