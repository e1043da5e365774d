//! Operator sessions. A successful login hands out an opaque random token;
//! only its hash is kept, so the session table never holds a usable token.

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header, request::Parts, HeaderMap},
};
use rand::RngCore;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::config::SESSION_COOKIE;
use crate::error::{ApiError, Result};
use crate::server::AppState;

/// A session older than this has to log in again
pub const SESSION_TTL: Duration = Duration::from_secs(12 * 3600);
/// Upper bound on concurrently active sessions; the oldest go first
pub const MAX_SESSIONS: usize = 256;

pub fn hash_session_token(token: &str) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(b"session_token:");
    hasher.update(token.as_bytes());
    let result = hasher.finalize();

    let mut hash = [0u8; 32];
    hash.copy_from_slice(&result);
    hash
}

/// `password == configured_secret`, compared in constant time
pub fn check_password(candidate: &str, secret: &str) -> bool {
    constant_time_eq::constant_time_eq(candidate.as_bytes(), secret.as_bytes())
}

pub struct SessionStore {
    secret: String,
    ttl: Duration,
    max_sessions: usize,
    /// Token hash -> login time
    active: RwLock<HashMap<[u8; 32], Instant>>,
}

impl SessionStore {
    pub fn new(secret: String) -> Self {
        Self::with_limits(secret, SESSION_TTL, MAX_SESSIONS)
    }

    pub fn with_limits(secret: String, ttl: Duration, max_sessions: usize) -> Self {
        Self {
            secret,
            ttl,
            max_sessions: max_sessions.max(1),
            active: RwLock::new(HashMap::new()),
        }
    }

    /// Start a session if `password` matches, returning the token to hand
    /// back to the client.
    pub async fn login(&self, password: &str) -> Result<String> {
        if !check_password(password, &self.secret) {
            warn!("Rejected operator login");
            return Err(ApiError::InvalidCredentials);
        }

        let mut bytes = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut bytes);
        let token = hex::encode(bytes);

        let now = Instant::now();
        let mut active = self.active.write().await;
        active.retain(|_, started| now.duration_since(*started) < self.ttl);

        if active.len() >= self.max_sessions {
            let mut entries: Vec<_> = active.iter().map(|(k, t)| (*k, *t)).collect();
            entries.sort_by_key(|(_, started)| *started);
            let excess = active.len() - self.max_sessions + 1;
            for (key, _) in entries.into_iter().take(excess) {
                active.remove(&key);
            }
            warn!("Session limit reached, dropped the {} oldest", excess);
        }

        active.insert(hash_session_token(&token), now);
        info!("Operator logged in ({} active sessions)", active.len());
        Ok(token)
    }

    pub async fn logout(&self, token: &str) -> bool {
        let removed = self
            .active
            .write()
            .await
            .remove(&hash_session_token(token))
            .is_some();
        if removed {
            info!("Operator logged out");
        }
        removed
    }

    pub async fn is_active(&self, token: &str) -> bool {
        self.active
            .read()
            .await
            .get(&hash_session_token(token))
            .is_some_and(|started| started.elapsed() < self.ttl)
    }
}

/// Per-request view of who is calling
#[derive(Debug, Clone, Default)]
pub struct OperatorContext {
    pub authenticated: bool,
    pub token: Option<String>,
}

impl OperatorContext {
    pub fn require(&self) -> Result<()> {
        if self.authenticated {
            Ok(())
        } else {
            Err(ApiError::Unauthorized)
        }
    }
}

#[async_trait]
impl FromRequestParts<Arc<AppState>> for OperatorContext {
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> std::result::Result<Self, Self::Rejection> {
        let Some(token) = session_token(&parts.headers) else {
            return Ok(Self::default());
        };
        let authenticated = state.sessions.is_active(&token).await;
        Ok(Self {
            authenticated,
            token: Some(token),
        })
    }
}

/// Token from the session cookie, or from `Authorization: Bearer` for
/// scanner clients that do not keep cookies.
pub fn session_token(headers: &HeaderMap) -> Option<String> {
    let from_cookie = headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, value)| *name == SESSION_COOKIE && !value.is_empty())
        .map(|(_, value)| value.to_string());

    from_cookie.or_else(|| {
        headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .map(|v| v.trim().to_string())
            .filter(|token| !token.is_empty())
    })
}

pub fn session_cookie(token: &str) -> String {
    format!(
        "{}={}; Path=/; HttpOnly; SameSite=Strict",
        SESSION_COOKIE, token
    )
}

pub fn expired_session_cookie() -> String {
    format!(
        "{}=; Path=/; HttpOnly; SameSite=Strict; Max-Age=0",
        SESSION_COOKIE
    )
}
