//! # murmur-server
//!
//! Local chat assistant server.
//!
//! This binary provides:
//! - **REST API** (axum) for accounts, sessions and chat transcripts
//! - **Encrypted document storage**: every account and chat is one
//!   XChaCha20-Poly1305 sealed JSON file under the data directory
//! - **Streaming completions** from an Ollama-compatible model service, with
//!   an offline mock mode when the service is unreachable

mod api;
mod completion;
mod config;
mod error;
mod mock;
mod session;

use std::sync::Arc;

use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use murmur_shared::constants::APP_NAME;
use murmur_shared::keyfile;
use murmur_shared::Codec;
use murmur_store::{Accounts, ChatLedger, DocumentStore};

use crate::api::AppState;
use crate::completion::{Aggregator, Mode};
use crate::config::ServerConfig;
use crate::session::Sessions;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // -----------------------------------------------------------------------
    // 1. Initialize tracing (respects RUST_LOG env var)
    // -----------------------------------------------------------------------
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                EnvFilter::new("info,murmur_server=debug,murmur_store=info")
            }),
        )
        .init();

    info!("Starting {APP_NAME} server v{}", env!("CARGO_PKG_VERSION"));

    // -----------------------------------------------------------------------
    // 2. Load configuration
    // -----------------------------------------------------------------------
    let config = ServerConfig::from_env();
    info!(?config, "Loaded configuration");

    // -----------------------------------------------------------------------
    // 3. Key and storage
    // -----------------------------------------------------------------------
    let key = keyfile::load_or_create_key(&config.key_path)?;
    let store = DocumentStore::open(config.data_dir.clone(), Codec::new(key)).await?;
    let ledger = ChatLedger::new(store.clone());
    let accounts = Accounts::new(store, ledger.clone());

    // -----------------------------------------------------------------------
    // 4. Model service
    // -----------------------------------------------------------------------
    let aggregator = Arc::new(Aggregator::from_config(&config));
    if config.force_mock {
        aggregator.set_mode(Mode::Mock);
        info!("Mock mode forced by configuration");
    } else {
        let report = aggregator.probe().await;
        if report.available {
            info!(version = ?report.version, url = %aggregator.base_url(), "Model service available");
        } else {
            warn!(message = %report.message, "Model service unavailable, starting in mock mode");
            aggregator.set_mode(Mode::Mock);
        }
    }

    let app_state = AppState {
        accounts,
        ledger,
        aggregator,
        sessions: Sessions::new(),
    };

    // -----------------------------------------------------------------------
    // 5. Run the HTTP API server (blocks until shutdown)
    // -----------------------------------------------------------------------
    tokio::select! {
        result = api::serve(app_state, config.http_addr) => {
            if let Err(e) = result {
                tracing::error!(error = %e, "HTTP server failed");
                return Err(e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }

    Ok(())
}
