/// Best-effort refresh-token cache
///
/// The store is the only source of truth. The cache may remember that a
/// token hash was revoked so that a replayed refresh token can be turned
/// away without a store round trip; losing or disabling it changes latency,
/// never outcomes.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use thiserror::Error;
use uuid::Uuid;

use crate::error::BoxError;

/// What the cache knows about one refresh-token hash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    pub user_id: Uuid,
    pub expires_at: DateTime<Utc>,
    pub revoked: bool,
}

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache is closed")]
    Closed,

    #[error("cache backend failure")]
    Backend(#[source] BoxError),
}

#[async_trait]
pub trait TokenCache: Send + Sync {
    async fn get(&self, hash: &str) -> Result<Option<CacheEntry>, CacheError>;

    async fn set(&self, hash: &str, entry: CacheEntry, ttl: Duration) -> Result<(), CacheError>;

    /// Flag a known entry as revoked. Unknown hashes are ignored.
    async fn mark_revoked(&self, hash: &str) -> Result<(), CacheError>;

    async fn close(&self) -> Result<(), CacheError>;
}

/// Used when caching is disabled.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopCache;

#[async_trait]
impl TokenCache for NoopCache {
    async fn get(&self, _hash: &str) -> Result<Option<CacheEntry>, CacheError> {
        Ok(None)
    }

    async fn set(&self, _hash: &str, _entry: CacheEntry, _ttl: Duration) -> Result<(), CacheError> {
        Ok(())
    }

    async fn mark_revoked(&self, _hash: &str) -> Result<(), CacheError> {
        Ok(())
    }

    async fn close(&self) -> Result<(), CacheError> {
        Ok(())
    }
}

/// Every this many inserts, `set` drops all expired entries.
pub const PRUNE_EVERY: u64 = 256;

#[derive(Default)]
struct Entries {
    by_hash: HashMap<String, (CacheEntry, Instant)>,
    inserts: u64,
}

/// Process-local cache with per-entry TTL.
///
/// Expired entries are dropped when read and in a full sweep every
/// `PRUNE_EVERY` inserts, so hashes that are never read again do not pile
/// up.
#[derive(Default)]
pub struct InMemoryCache {
    entries: Mutex<Entries>,
    closed: AtomicBool,
}

impl InMemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries held, expired or not.
    pub fn len(&self) -> usize {
        self.entries.lock().by_hash.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn ensure_open(&self) -> Result<(), CacheError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(CacheError::Closed);
        }
        Ok(())
    }
}

#[async_trait]
impl TokenCache for InMemoryCache {
    async fn get(&self, hash: &str) -> Result<Option<CacheEntry>, CacheError> {
        self.ensure_open()?;
        let mut entries = self.entries.lock();
        match entries.by_hash.get(hash) {
            Some((entry, deadline)) if *deadline > Instant::now() => Ok(Some(entry.clone())),
            Some(_) => {
                entries.by_hash.remove(hash);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set(&self, hash: &str, entry: CacheEntry, ttl: Duration) -> Result<(), CacheError> {
        self.ensure_open()?;
        let now = Instant::now();
        let mut entries = self.entries.lock();
        entries.by_hash.insert(hash.to_string(), (entry, now + ttl));

        entries.inserts += 1;
        if entries.inserts % PRUNE_EVERY == 0 {
            entries.by_hash.retain(|_, (_, deadline)| *deadline > now);
        }
        Ok(())
    }

    async fn mark_revoked(&self, hash: &str) -> Result<(), CacheError> {
        self.ensure_open()?;
        if let Some((entry, _)) = self.entries.lock().by_hash.get_mut(hash) {
            entry.revoked = true;
        }
        Ok(())
    }

    async fn close(&self) -> Result<(), CacheError> {
        self.closed.store(true, Ordering::Release);
        self.entries.lock().by_hash.clear();
        Ok(())
    }
}
