// 12.0: LeaderboardRanker. the global ROI-sorted board, the per-client result records that
// back late claims, and the session-key de-dup that stops a result being submitted twice.
// durable insertion happens elsewhere (storage/), this module only decides and remembers.

use crate::storage::StoreStatus;
use crate::types::{ClientId, Quote, RoomId, Timestamp};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashMap;
use uuid::Uuid;

const MONEY_DP: u32 = 2;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardEntry {
    pub id: String,
    pub player_name: String,
    pub handle: Option<String>,
    pub avatar_url: Option<String>,
    pub role: String,
    pub cash: Quote,
    pub peak_cash: Quote,
    pub roi: Decimal,
    pub days_survived: u32,
    pub wallet_address: Option<String>,
    pub created_at: Timestamp,
}

/// An entry before it has an id. What gets handed to the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewLeaderboardEntry {
    pub session_id: Option<String>,
    pub room_id: RoomId,
    pub player_name: String,
    pub role: String,
    pub cash: Quote,
    pub peak_cash: Quote,
    pub roi: Decimal,
    pub days_survived: u32,
}

impl NewLeaderboardEntry {
    pub fn into_entry(self, id: String, created_at: Timestamp) -> LeaderboardEntry {
        LeaderboardEntry {
            id,
            player_name: self.player_name,
            handle: None,
            avatar_url: None,
            role: self.role,
            cash: self.cash,
            peak_cash: self.peak_cash,
            roi: self.roi,
            days_survived: self.days_survived,
            wallet_address: None,
            created_at,
        }
    }
}

/// Snapshot of one player's finished session, claimable for a bounded window.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionResult {
    pub client_id: ClientId,
    pub session_id: Option<String>,
    pub session_key: String,
    pub room_id: RoomId,
    pub player_name: String,
    pub role: String,
    pub cash: Quote,
    pub peak_cash: Quote,
    pub roi: Decimal,
    pub days_survived: u32,
    pub captured_at: Timestamp,
}

impl SessionResult {
    pub fn to_new_entry(&self, name_override: Option<String>) -> NewLeaderboardEntry {
        NewLeaderboardEntry {
            session_id: self.session_id.clone(),
            room_id: self.room_id.clone(),
            player_name: name_override.unwrap_or_else(|| self.player_name.clone()),
            role: self.role.clone(),
            cash: self.cash,
            peak_cash: self.peak_cash,
            roi: self.roi,
            days_survived: self.days_survived,
        }
    }
}

// 12.1: helpers shared by room claims and session end
pub fn roi_pct(initial_cash: Quote, cash: Quote) -> Decimal {
    if !initial_cash.is_positive() {
        return Decimal::ZERO;
    }
    ((cash.value() - initial_cash.value()) / initial_cash.value() * dec!(100)).round_dp(MONEY_DP)
}

pub fn round_money(amount: Quote) -> Quote {
    Quote::new(amount.value().round_dp(MONEY_DP))
}

/// Durable session id when known, otherwise `{room}-{started}`.
pub fn session_key(session_id: Option<&str>, room_id: &RoomId, started_at: Timestamp) -> String {
    match session_id {
        Some(id) => id.to_string(),
        None => format!("{room_id}-{started_at}"),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LeaderboardError {
    #[error("No result found for client.")]
    NotFound,

    #[error("Already submitted.")]
    AlreadySubmitted,

    #[error("Leaderboard service unavailable.")]
    Unavailable,

    #[error("Failed to submit leaderboard.")]
    InsertFailed,
}

/// Where a claim should be written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimRoute {
    Store,
    Memory,
    Unavailable,
}

pub fn claim_route(status: &StoreStatus, allow_memory: bool) -> ClaimRoute {
    if status.is_ready() {
        ClaimRoute::Store
    } else if allow_memory {
        ClaimRoute::Memory
    } else {
        ClaimRoute::Unavailable
    }
}

fn by_roi_desc(a: &LeaderboardEntry, b: &LeaderboardEntry) -> Ordering {
    b.roi.cmp(&a.roi)
}

// 12.2: the ranker itself
#[derive(Debug, Clone)]
pub struct LeaderboardRanker {
    entries: Vec<LeaderboardEntry>,
    max_entries: usize,
    // client -> session key of the last accepted submission, and when it was accepted
    submitted: HashMap<ClientId, (String, Timestamp)>,
    recent_results: HashMap<ClientId, SessionResult>,
}

impl LeaderboardRanker {
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: Vec::new(),
            max_entries: max_entries.max(1),
            submitted: HashMap::new(),
            recent_results: HashMap::new(),
        }
    }

    pub fn entries(&self) -> &[LeaderboardEntry] {
        &self.entries
    }

    pub fn to_vec(&self) -> Vec<LeaderboardEntry> {
        self.entries.clone()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Swap in a freshly fetched board.
    pub fn replace(&mut self, mut entries: Vec<LeaderboardEntry>) {
        entries.sort_by(by_roi_desc);
        entries.truncate(self.max_entries);
        self.entries = entries;
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Merge one accepted entry. Ids already on the board are left alone.
    pub fn accept(&mut self, entry: LeaderboardEntry) {
        if self.entries.iter().any(|e| e.id == entry.id) {
            return;
        }
        self.entries.insert(0, entry);
        self.entries.sort_by(by_roi_desc);
        self.entries.truncate(self.max_entries);
    }

    /// Memory fallback: mint an id and merge.
    pub fn insert_memory(&mut self, entry: NewLeaderboardEntry, now: Timestamp) -> LeaderboardEntry {
        let entry = entry.into_entry(Uuid::new_v4().to_string(), now);
        self.accept(entry.clone());
        entry
    }

    // 12.3: claim bookkeeping
    pub fn is_submitted(&self, client_id: &ClientId, session_key: &str) -> bool {
        self.submitted
            .get(client_id)
            .is_some_and(|(key, _)| key == session_key)
    }

    pub fn mark_submitted(&mut self, client_id: ClientId, session_key: String, now: Timestamp) {
        self.submitted.insert(client_id, (session_key, now));
    }

    pub fn record_result(&mut self, result: SessionResult) {
        self.recent_results.insert(result.client_id.clone(), result);
    }

    pub fn recent_result(&self, client_id: &ClientId) -> Option<&SessionResult> {
        self.recent_results.get(client_id)
    }

    /// Result a late claim would submit, or why it cannot.
    pub fn check_claim(&self, client_id: &ClientId) -> Result<&SessionResult, LeaderboardError> {
        let result = self
            .recent_results
            .get(client_id)
            .ok_or(LeaderboardError::NotFound)?;
        if self.is_submitted(client_id, &result.session_key) {
            return Err(LeaderboardError::AlreadySubmitted);
        }
        Ok(result)
    }

    // drop results and submission marks older than the retention window
    pub fn prune(&mut self, now: Timestamp, retention_ms: i64) {
        let cutoff = now.plus(-retention_ms);
        let expired: Vec<ClientId> = self
            .recent_results
            .iter()
            .filter(|(_, result)| result.captured_at < cutoff)
            .map(|(id, _)| id.clone())
            .collect();
        for id in expired {
            self.recent_results.remove(&id);
            self.submitted.remove(&id);
        }
        let results = &self.recent_results;
        self.submitted
            .retain(|id, (_, marked_at)| *marked_at >= cutoff || results.contains_key(id));
    }

    pub fn submission_count(&self) -> usize {
        self.submitted.len()
    }
}
