//! SubmitVault CLI - run the submission server and manage stored submissions.
//!
//! The encryption secret is read from `ENCRYPTION_PASSWORD`; it is never
//! accepted as a flag or from a config file.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use futures::StreamExt;
use std::io::Write;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::level_filters::LevelFilter;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use submitvault_common::SubmissionId;
use submitvault_crypto::KdfParams;
use submitvault_pipeline::{secret_from_env, KeyPolicy, Pipelines};
use submitvault_server::handlers::SubmissionSummary;
use submitvault_server::{serve, AppState, ServerConfig};
use submitvault_storage::{LocalStore, SubmissionStore};

#[derive(Parser)]
#[command(name = "submitvault")]
#[command(about = "SubmitVault - Encrypted submission intake")]
#[command(version)]
struct Cli {
    /// Enable verbose logging.
    #[arg(short, long)]
    verbose: bool,

    /// JSON configuration file.
    #[arg(short, long, env = "SUBMITVAULT_CONFIG")]
    config: Option<PathBuf>,

    /// Directory holding the submission store.
    #[arg(long, env = "SUBMITVAULT_STORAGE")]
    storage_root: Option<PathBuf>,

    /// KDF strength: "interactive", "moderate", or "sensitive".
    #[arg(long)]
    kdf_strength: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP server.
    Serve {
        /// Address to bind.
        #[arg(long)]
        bind: Option<SocketAddr>,

        /// Port to bind; overrides the port of --bind.
        #[arg(short, long, env = "PORT")]
        port: Option<u16>,

        /// Largest accepted file in bytes.
        #[arg(long)]
        max_upload_bytes: Option<u64>,

        /// Re-derive the key for every request instead of caching it.
        #[arg(long)]
        per_request_keys: bool,
    },

    /// Print stored submissions as JSON lines.
    List,

    /// Decrypt one submission to a file.
    Export {
        /// Submission id.
        #[arg(short, long)]
        id: String,

        /// Output file.
        #[arg(short, long)]
        out: PathBuf,
    },

    /// Decrypt every stored submission and report any that fail.
    Verify,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let level = if cli.verbose {
        LevelFilter::DEBUG
    } else {
        LevelFilter::INFO
    };
    let filter = match std::env::var("RUST_LOG") {
        Ok(directives) => EnvFilter::try_new(directives).context("Invalid RUST_LOG")?,
        Err(_) => EnvFilter::default().add_directive(level.into()),
    };

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let mut config = load_config(&cli)?;

    match cli.command {
        Commands::Serve {
            bind,
            port,
            max_upload_bytes,
            per_request_keys,
        } => {
            if let Some(bind) = bind {
                config.bind_addr = bind;
            }
            if let Some(port) = port {
                config.bind_addr.set_port(port);
            }
            if let Some(max) = max_upload_bytes {
                config.max_upload_bytes = max;
            }
            if per_request_keys {
                config.pipeline.key_policy = KeyPolicy::PerRequest;
            }
            cmd_serve(config).await
        }

        Commands::List => cmd_list(&config).await,

        Commands::Export { id, out } => cmd_export(&config, &id, &out).await,

        Commands::Verify => cmd_verify(&config).await,
    }
}

fn load_config(cli: &Cli) -> Result<ServerConfig> {
    let mut config = match &cli.config {
        Some(path) => ServerConfig::from_file(path)?,
        None => ServerConfig::default(),
    };

    if let Some(root) = &cli.storage_root {
        config.storage_root = root.clone();
    }
    if let Some(strength) = &cli.kdf_strength {
        config.pipeline.kdf = KdfParams::preset(strength)?;
    }

    config.validate()?;
    Ok(config)
}

fn open_store(config: &ServerConfig) -> Result<Arc<LocalStore>> {
    let store = LocalStore::new(&config.storage_root).with_context(|| {
        format!(
            "Failed to open submission store at {}",
            config.storage_root.display()
        )
    })?;
    Ok(Arc::new(store))
}

fn open_pipelines(config: &ServerConfig, store: Arc<LocalStore>) -> Result<Pipelines> {
    let secret = secret_from_env()?;
    Ok(Pipelines::new(secret, &config.pipeline, store)?)
}

async fn cmd_serve(config: ServerConfig) -> Result<()> {
    let secret = secret_from_env()?;
    let state = AppState::from_config(&config, secret)?;

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.bind_addr))?;

    info!(
        storage = %config.storage_root.display(),
        policy = ?config.pipeline.key_policy,
        "Server starting"
    );

    serve(listener, state, shutdown_signal()).await?;
    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
    info!("Shutdown requested");
}

async fn cmd_list(config: &ServerConfig) -> Result<()> {
    let store = open_store(config)?;
    let submissions = store.list().await?;

    let mut stdout = std::io::stdout().lock();
    for submission in submissions {
        let line = serde_json::to_string(&SubmissionSummary::from(submission))?;
        writeln!(stdout, "{}", line)?;
    }
    Ok(())
}

async fn cmd_export(config: &ServerConfig, id: &str, out: &Path) -> Result<()> {
    let id = SubmissionId::parse(id)?;
    let pipelines = open_pipelines(config, open_store(config)?)?;
    let download = pipelines.egress.open(&id).await?;

    let parent = match out.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    let mut staged = tempfile::NamedTempFile::new_in(&parent)
        .with_context(|| format!("Cannot write into {}", parent.display()))?;

    let mut body = download.body;
    let mut total = 0u64;
    while let Some(chunk) = body.next().await {
        let chunk = chunk.with_context(|| format!("Submission {} failed to decrypt", id))?;
        staged.write_all(&chunk)?;
        total += chunk.len() as u64;
    }
    staged.as_file().sync_all()?;
    staged
        .persist(out)
        .with_context(|| format!("Failed to write {}", out.display()))?;

    println!("Exported {} ({} bytes) to {}", id, total, out.display());
    Ok(())
}

async fn cmd_verify(config: &ServerConfig) -> Result<()> {
    let store = open_store(config)?;
    let pipelines = open_pipelines(config, Arc::clone(&store))?;

    let submissions = pipelines.egress.list().await?;
    let mut failed = 0usize;
    for submission in &submissions {
        match pipelines.egress.verify(&submission.id).await {
            Ok(size) => println!("ok      {} ({} bytes)", submission.id, size),
            Err(e) => {
                failed += 1;
                println!(
                    "FAILED  {} at {}: {}",
                    submission.id,
                    store.submission_dir(&submission.id).display(),
                    e
                );
            }
        }
    }

    println!("{} checked, {} failed", submissions.len(), failed);
    if failed > 0 {
        bail!("{} submission(s) failed verification", failed);
    }
    Ok(())
}
