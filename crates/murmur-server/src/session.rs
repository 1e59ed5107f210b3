//! In-memory login sessions keyed by a random cookie token.
//!
//! Sessions live only as long as the process; a restart logs everyone out.
//! A session also expires [`SESSION_TTL`] after it was issued, and expired
//! entries are purged whenever a new session starts.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::http::{header, HeaderMap};
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

pub const SESSION_COOKIE: &str = "murmur_session";

/// Lifetime of a session from the moment it is issued.
pub const SESSION_TTL: Duration = Duration::from_secs(7 * 24 * 60 * 60);

struct Session {
    username: String,
    issued_at: Instant,
}

impl Session {
    fn is_fresh(&self, ttl: Duration) -> bool {
        self.issued_at.elapsed() < ttl
    }
}

#[derive(Clone)]
pub struct Sessions {
    /// Cache: token -> session.
    tokens: Arc<RwLock<HashMap<String, Session>>>,
    ttl: Duration,
}

impl Default for Sessions {
    fn default() -> Self {
        Self::with_ttl(SESSION_TTL)
    }
}

impl Sessions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            tokens: Arc::new(RwLock::new(HashMap::new())),
            ttl,
        }
    }

    /// Open a session for `username` and return its token.
    pub async fn start(&self, username: &str) -> String {
        let token = Uuid::new_v4().to_string();
        let mut tokens = self.tokens.write().await;

        let before = tokens.len();
        tokens.retain(|_, session| session.is_fresh(self.ttl));
        let purged = before - tokens.len();
        if purged > 0 {
            debug!(purged, "Purged expired sessions");
        }

        tokens.insert(
            token.clone(),
            Session {
                username: username.to_string(),
                issued_at: Instant::now(),
            },
        );
        debug!(username = %username, "Session started");
        token
    }

    pub async fn username(&self, token: &str) -> Option<String> {
        self.tokens
            .read()
            .await
            .get(token)
            .filter(|session| session.is_fresh(self.ttl))
            .map(|session| session.username.clone())
    }

    pub async fn end(&self, token: &str) -> Option<String> {
        self.tokens
            .write()
            .await
            .remove(token)
            .map(|session| session.username)
    }

    /// Drop every session of `username` (e.g. after account deletion).
    pub async fn end_all_for(&self, username: &str) {
        self.tokens
            .write()
            .await
            .retain(|_, session| session.username != username);
    }

    /// Number of stored sessions, expired ones included until purged.
    pub async fn len(&self) -> usize {
        self.tokens.read().await.len()
    }
}

/// Session token from the request's `Cookie` headers, if any.
pub fn token_from_headers(headers: &HeaderMap) -> Option<&str> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().strip_prefix(SESSION_COOKIE)?.strip_prefix('='))
        .find(|token| !token.is_empty())
}

pub fn session_cookie(token: &str) -> String {
    format!("{SESSION_COOKIE}={token}; Path=/; HttpOnly; SameSite=Lax")
}

pub fn expired_cookie() -> String {
    format!("{SESSION_COOKIE}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0")
}
