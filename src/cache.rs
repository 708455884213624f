// 13.1: leaderboard cache. a short-TTL read-through slot in front of the store fetch.
// a slow or missing cache only costs latency, every miss falls through to the store.

use crate::leaderboard::LeaderboardEntry;
use crate::storage::Store;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::time::{Duration, Instant};

#[async_trait]
pub trait LeaderboardCache: Send + Sync {
    async fn get(&self) -> Option<Vec<LeaderboardEntry>>;

    async fn set(&self, entries: &[LeaderboardEntry]);

    async fn invalidate(&self);
}

/// In-process cache with a fixed TTL.
#[derive(Debug)]
pub struct MemoryCache {
    ttl: Duration,
    slot: Mutex<Option<(Instant, Vec<LeaderboardEntry>)>>,
}

impl MemoryCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            slot: Mutex::new(None),
        }
    }
}

#[async_trait]
impl LeaderboardCache for MemoryCache {
    async fn get(&self) -> Option<Vec<LeaderboardEntry>> {
        let mut slot = self.slot.lock();
        match slot.as_ref() {
            Some((stored_at, entries)) if stored_at.elapsed() < self.ttl => Some(entries.clone()),
            Some(_) => {
                *slot = None;
                None
            }
            None => None,
        }
    }

    async fn set(&self, entries: &[LeaderboardEntry]) {
        *self.slot.lock() = Some((Instant::now(), entries.to_vec()));
    }

    async fn invalidate(&self) {
        *self.slot.lock() = None;
    }
}

/// Always misses.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoCache;

#[async_trait]
impl LeaderboardCache for NoCache {
    async fn get(&self) -> Option<Vec<LeaderboardEntry>> {
        None
    }

    async fn set(&self, _entries: &[LeaderboardEntry]) {}

    async fn invalidate(&self) {}
}

// 13.1.1: cache-then-store fetch. `None` means the store cannot answer right now and the
// caller should keep (or drop) its in-memory board.
pub async fn fetch_leaderboard(
    store: &dyn Store,
    cache: &dyn LeaderboardCache,
    limit: usize,
    cache_timeout: Duration,
) -> Option<Vec<LeaderboardEntry>> {
    if !store.status().is_ready() {
        return None;
    }

    match tokio::time::timeout(cache_timeout, cache.get()).await {
        Ok(Some(hit)) => return Some(hit),
        Ok(None) => {}
        Err(_) => tracing::warn!("leaderboard cache get timed out"),
    }

    match store.fetch_leaderboard(limit).await {
        Ok(entries) => {
            if tokio::time::timeout(cache_timeout, cache.set(&entries)).await.is_err() {
                tracing::warn!("leaderboard cache set timed out");
            }
            Some(entries)
        }
        Err(err) => {
            tracing::warn!(error = %err, "leaderboard fetch failed");
            None
        }
    }
}
