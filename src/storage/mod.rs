//! Durable storage collaborator.
//!
//! The game core never talks to a database directly. It issues requests against the
//! [`Store`] trait and treats every failure as a degraded dependency: the call is logged,
//! the store flips its own health flag, and the caller falls back to memory.
//!
//! Two implementations are selected once at startup: [`SqliteStore`] when a database path
//! is configured, [`MemoryStore`] otherwise.

mod memory;
mod sqlite;

pub use memory::{MemoryStore, StoredSession};
pub use sqlite::SqliteStore;

use crate::leaderboard::{LeaderboardEntry, NewLeaderboardEntry};
use crate::pack::{core_pack, EventPack, EventPackInput, EventPackSummary, CORE_PACK_ID};
use crate::types::{RoomId, Timestamp};
use async_trait::async_trait;
use serde::Serialize;

/// Health snapshot, cheap to read from the game loop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreStatus {
    /// Backed by something that survives a restart.
    pub durable: bool,
    pub healthy: bool,
    pub last_error: Option<String>,
}

impl StoreStatus {
    pub fn memory() -> Self {
        Self {
            durable: false,
            healthy: true,
            last_error: None,
        }
    }

    /// Durable and answering. Leaderboard writes and pack edits need this.
    pub fn is_ready(&self) -> bool {
        self.durable && self.healthy
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    #[error("store timeout: {0}")]
    Timeout(&'static str),

    #[error("database error: {0}")]
    Database(String),

    #[error("corrupt row: {0}")]
    Corrupt(String),

    #[error("background task failed: {0}")]
    Join(String),
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        StoreError::Database(err.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Corrupt(err.to_string())
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// A stored pack plus the bits only the store knows.
#[derive(Debug, Clone, PartialEq)]
pub struct PackRecord {
    pub pack: EventPack,
    pub updated_at: Option<Timestamp>,
    pub edit_token: Option<String>,
}

impl PackRecord {
    pub fn summary(&self) -> EventPackSummary {
        self.pack.summary(self.updated_at)
    }

    /// Anonymous edits need the token handed out at creation.
    pub fn allows_edit(&self, edit_token: Option<&str>, allow_anonymous: bool) -> bool {
        match (edit_token, self.edit_token.as_deref()) {
            (Some(given), Some(stored)) => allow_anonymous && !given.is_empty() && given == stored,
            _ => false,
        }
    }
}

#[async_trait]
pub trait Store: Send + Sync {
    fn status(&self) -> StoreStatus;

    /// Returns the new session id.
    async fn create_session(&self, room_id: &RoomId, pack_id: &str, started_at: Timestamp) -> StoreResult<String>;

    async fn end_session(&self, session_id: &str, ended_at: Timestamp) -> StoreResult<()>;

    async fn insert_leaderboard_entry(&self, entry: &NewLeaderboardEntry, now: Timestamp) -> StoreResult<LeaderboardEntry>;

    /// Best entries first.
    async fn fetch_leaderboard(&self, limit: usize) -> StoreResult<Vec<LeaderboardEntry>>;

    /// Custom packs only, most recently updated first.
    async fn list_packs(&self) -> StoreResult<Vec<EventPackSummary>>;

    async fn get_pack_by_id(&self, pack_id: &str) -> StoreResult<Option<PackRecord>>;

    async fn create_pack(&self, input: &EventPackInput, edit_token: &str, now: Timestamp) -> StoreResult<PackRecord>;

    /// Bumps the version. `None` when the id is unknown.
    async fn update_pack(&self, pack_id: &str, input: &EventPackInput, now: Timestamp) -> StoreResult<Option<PackRecord>>;

    /// `false` when nothing was deleted.
    async fn delete_pack(&self, pack_id: &str) -> StoreResult<bool>;
}

pub fn core_pack_record() -> PackRecord {
    PackRecord {
        pack: core_pack().clone(),
        updated_at: None,
        edit_token: None,
    }
}

// 13.1: pack lookups that know about the built-in pack
pub async fn find_pack(store: &dyn Store, pack_id: &str) -> StoreResult<Option<PackRecord>> {
    if pack_id == CORE_PACK_ID {
        return Ok(Some(core_pack_record()));
    }
    if !store.status().durable {
        return Ok(None);
    }
    store.get_pack_by_id(pack_id).await
}

/// Core pack first, then whatever the store lists. A failing store lists only the core pack.
pub async fn pack_summaries(store: &dyn Store) -> Vec<EventPackSummary> {
    let mut summaries = vec![core_pack().summary(None)];
    if !store.status().durable {
        return summaries;
    }
    match store.list_packs().await {
        Ok(custom) => summaries.extend(custom.into_iter().filter(|p| p.id != CORE_PACK_ID)),
        Err(err) => tracing::warn!(error = %err, "pack listing failed"),
    }
    summaries
}
