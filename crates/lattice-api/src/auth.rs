//! Token authentication for the registry endpoint.
//!
//! Tokens arrive as `authorization: Bearer <token>` (modern clients) or
//! `x-api-token: <token>` (legacy CLI versions). A token resolves to the
//! target it is scoped to plus a scope set; resolution is an external
//! concern behind [`TokenResolver`], with an in-memory implementation for
//! tests and local development.

use async_trait::async_trait;
use axum::http::HeaderMap;
use sha2::{Digest, Sha256};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};

use lattice_core::id::TargetId;
use lattice_core::Result;
use lattice_registry::{RegistryScope, RequestContext};

/// What a token grants.
#[derive(Debug, Clone)]
pub struct TokenInfo {
    /// The target the token is scoped to.
    pub target_id: TargetId,
    /// Granted scopes.
    pub scopes: HashSet<RegistryScope>,
}

/// Resolves raw tokens to grants.
#[async_trait]
pub trait TokenResolver: Send + Sync {
    /// Resolves a token; `None` for unknown or revoked tokens.
    async fn resolve(&self, token: &str) -> Result<Option<TokenInfo>>;
}

/// In-memory resolver for tests and local development.
#[derive(Debug, Default)]
pub struct MemoryTokenResolver {
    tokens: RwLock<HashMap<String, TokenInfo>>,
}

impl MemoryTokenResolver {
    /// Creates an empty resolver.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a token.
    pub fn insert(&self, token: impl Into<String>, info: TokenInfo) {
        self.tokens
            .write()
            .expect("token lock")
            .insert(token.into(), info);
    }
}

#[async_trait]
impl TokenResolver for MemoryTokenResolver {
    async fn resolve(&self, token: &str) -> Result<Option<TokenInfo>> {
        Ok(self.tokens.read().expect("token lock").get(token).cloned())
    }
}

/// An authenticated request: the caller context plus the token's target.
#[derive(Debug, Clone)]
pub struct Session {
    /// Caller identity and scopes, for the coordinator.
    pub context: RequestContext,
    /// The target every operation of this request applies to.
    pub target_id: TargetId,
}

/// Header-level authentication service.
pub struct AuthService {
    resolver: Arc<dyn TokenResolver>,
}

impl AuthService {
    /// Creates an auth service over the given resolver.
    #[must_use]
    pub fn new(resolver: Arc<dyn TokenResolver>) -> Self {
        Self { resolver }
    }

    /// Authenticates a request; `None` when no valid token is presented.
    pub async fn authenticate(&self, headers: &HeaderMap) -> Option<Session> {
        let token = extract_token(headers)?;
        let info = match self.resolver.resolve(&token).await {
            Ok(Some(info)) => info,
            Ok(None) => {
                tracing::debug!("unknown registry token presented");
                return None;
            }
            Err(e) => {
                tracing::error!(error = %e, "token resolution failed");
                return None;
            }
        };

        let request_id = headers
            .get("x-request-id")
            .and_then(|v| v.to_str().ok())
            .map_or_else(|| uuid::Uuid::new_v4().to_string(), ToString::to_string);

        Some(Session {
            context: RequestContext::new(token_fingerprint(&token), info.scopes, request_id),
            target_id: info.target_id,
        })
    }
}

/// Pulls the raw token out of the supported headers, preferring the
/// modern `authorization` header.
fn extract_token(headers: &HeaderMap) -> Option<String> {
    if let Some(value) = headers.get("authorization").and_then(|v| v.to_str().ok()) {
        if let Some(token) = value.strip_prefix("Bearer ") {
            let token = token.trim();
            if !token.is_empty() {
                return Some(token.to_string());
            }
        }
    }

    headers
        .get("x-api-token")
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .map(ToString::to_string)
}

/// A loggable token fingerprint; never the token itself.
fn token_fingerprint(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    let digest = hex::encode(hasher.finalize());
    format!("token:{}", &digest[..12])
}
