//! Server configuration loaded from environment variables.
//!
//! All settings have sensible defaults so the server can start with zero
//! configuration next to a local model service.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use murmur_shared::constants::{DEFAULT_COMPLETION_URL, DEFAULT_HTTP_PORT};

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Socket address for the HTTP (axum) API server.
    /// Env: `HTTP_ADDR`
    /// Default: `127.0.0.1:5000`
    pub http_addr: SocketAddr,

    /// Root directory of the encrypted document store.
    /// Env: `MURMUR_DATA_DIR`
    /// Default: `./Data`
    pub data_dir: PathBuf,

    /// Raw 32-byte encryption key file. Created on first start.
    /// Env: `MURMUR_KEY_PATH`
    /// Default: `./Key/encryption.key`
    pub key_path: PathBuf,

    /// Base URL of the Ollama-compatible model service.
    /// Env: `COMPLETION_URL`
    /// Default: `http://127.0.0.1:11434`
    pub completion_url: String,

    /// Upper bound for one streamed completion.
    /// Env: `COMPLETION_TIMEOUT_SECS`
    /// Default: `60`
    pub completion_timeout: Duration,

    /// Upper bound for a reachability probe.
    /// Env: `PROBE_TIMEOUT_SECS`
    /// Default: `3`
    pub probe_timeout: Duration,

    /// Start in mock mode without probing the model service.
    /// Env: `MURMUR_FORCE_MOCK` (true/false)
    /// Default: `false`
    pub force_mock: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_addr: ([127, 0, 0, 1], DEFAULT_HTTP_PORT).into(),
            data_dir: PathBuf::from("./Data"),
            key_path: PathBuf::from("./Key/encryption.key"),
            completion_url: DEFAULT_COMPLETION_URL.to_string(),
            completion_timeout: Duration::from_secs(60),
            probe_timeout: Duration::from_secs(3),
            force_mock: false,
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(addr) = var("HTTP_ADDR") {
            if let Ok(parsed) = addr.parse::<SocketAddr>() {
                config.http_addr = parsed;
            } else {
                tracing::warn!(value = %addr, "Invalid HTTP_ADDR, using default");
            }
        }

        if let Some(path) = var("MURMUR_DATA_DIR") {
            config.data_dir = PathBuf::from(path);
        }

        if let Some(path) = var("MURMUR_KEY_PATH") {
            config.key_path = PathBuf::from(path);
        }

        if let Some(url) = var("COMPLETION_URL") {
            let url = url.trim().trim_end_matches('/');
            if url.starts_with("http://") || url.starts_with("https://") {
                config.completion_url = url.to_string();
            } else {
                tracing::warn!(value = %url, "Invalid COMPLETION_URL, using default");
            }
        }

        if let Some(secs) = parse_secs(var("COMPLETION_TIMEOUT_SECS"), "COMPLETION_TIMEOUT_SECS") {
            config.completion_timeout = secs;
        }

        if let Some(secs) = parse_secs(var("PROBE_TIMEOUT_SECS"), "PROBE_TIMEOUT_SECS") {
            config.probe_timeout = secs;
        }

        if let Some(val) = var("MURMUR_FORCE_MOCK") {
            config.force_mock = val == "true" || val == "1";
        }

        // RUST_LOG is handled directly by tracing-subscriber's EnvFilter,
        // so we do not store it here.

        config
    }
}

fn parse_secs(value: Option<String>, name: &str) -> Option<Duration> {
    let value = value?;
    match value.trim().parse::<u64>() {
        Ok(secs) if secs > 0 => Some(Duration::from_secs(secs)),
        _ => {
            tracing::warn!(var = name, value = %value, "Invalid timeout, using default");
            None
        }
    }
}
