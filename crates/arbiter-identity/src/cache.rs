//! Token validation cache.
//!
//! Wraps any [`IdentityBackend`] and remembers successful validations so
//! repeated requests with the same token skip the backend round trip.
//! Rejections and backend failures are never cached.
//!
//! Entries are keyed by the SHA-256 digest of the token; the raw token is not
//! stored. An entry lives for the configured TTL, or until the token's own
//! expiry if that comes first.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use sha2::{Digest, Sha256};
use tokio::time::Instant;
use tracing::debug;

use crate::backend::{BackendError, IdentityBackend, IdentityClaims};

/// Configuration for [`CachingBackend`].
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// How long a validation is reused.
    pub ttl: Duration,
    /// Maximum number of cached tokens.
    pub max_entries: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(300),
            max_entries: 10_000,
        }
    }
}

impl CacheConfig {
    /// Returns true if this configuration caches anything.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.max_entries > 0 && !self.ttl.is_zero()
    }
}

/// Cache statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Lookups answered from the cache.
    pub hits: u64,
    /// Lookups that went to the backend.
    pub misses: u64,
    /// Entries currently held.
    pub size: usize,
}

#[derive(Debug, Clone)]
struct CacheEntry {
    claims: IdentityClaims,
    valid_until: Instant,
}

/// Backend wrapper that caches successful validations.
#[derive(Debug)]
pub struct CachingBackend<B> {
    inner: B,
    config: CacheConfig,
    entries: RwLock<HashMap<String, CacheEntry>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl<B: IdentityBackend> CachingBackend<B> {
    /// Wraps `inner`.
    pub fn new(inner: B, config: CacheConfig) -> Self {
        Self {
            inner,
            config,
            entries: RwLock::new(HashMap::new()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Returns the wrapped backend.
    pub const fn inner(&self) -> &B {
        &self.inner
    }

    /// Returns cache statistics.
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            size: self.entries.read().len(),
        }
    }

    /// Drops every cached entry.
    pub fn clear(&self) {
        self.entries.write().clear();
    }

    fn lookup(&self, key: &str) -> Option<IdentityClaims> {
        let entries = self.entries.read();
        entries
            .get(key)
            .filter(|entry| entry.valid_until > Instant::now())
            .map(|entry| entry.claims.clone())
    }

    fn store(&self, key: String, claims: &IdentityClaims) {
        let now = Instant::now();
        let mut lifetime = self.config.ttl;
        if let Some(expires_at) = claims.expires_at {
            match (expires_at - Utc::now()).to_std() {
                Ok(remaining) => lifetime = lifetime.min(remaining),
                // Already expired according to the backend.
                Err(_) => return,
            }
        }

        let Some(valid_until) = now.checked_add(lifetime) else {
            debug!(ttl = ?lifetime, "token cache lifetime out of range, not caching");
            return;
        };

        let mut entries = self.entries.write();
        if entries.len() >= self.config.max_entries {
            entries.retain(|_, entry| entry.valid_until > now);
        }
        if entries.len() >= self.config.max_entries && !entries.contains_key(&key) {
            debug!(max_entries = self.config.max_entries, "token cache full");
            return;
        }

        entries.insert(
            key,
            CacheEntry {
                claims: claims.clone(),
                valid_until,
            },
        );
    }
}

fn cache_key(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

#[async_trait]
impl<B: IdentityBackend> IdentityBackend for CachingBackend<B> {
    fn name(&self) -> &'static str {
        self.inner.name()
    }

    async fn validate(&self, token: &str) -> Result<IdentityClaims, BackendError> {
        if !self.config.is_enabled() {
            return self.inner.validate(token).await;
        }

        let key = cache_key(token);
        if let Some(claims) = self.lookup(&key) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(claims);
        }
        self.misses.fetch_add(1, Ordering::Relaxed);

        let claims = self.inner.validate(token).await?;
        self.store(key, &claims);
        Ok(claims)
    }
}
