// 13.3: process-local store. used when no database path is configured. it keeps sessions,
// entries and packs in maps but reports itself as not durable, so callers treat it like
// "no database": leaderboard writes go to the ranker's memory list and pack edits are refused.

use super::{PackRecord, Store, StoreResult, StoreStatus};
use crate::leaderboard::{LeaderboardEntry, NewLeaderboardEntry};
use crate::pack::{EventPack, EventPackInput, EventPackSummary};
use crate::types::{RoomId, Timestamp};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq)]
pub struct StoredSession {
    pub room_id: RoomId,
    pub pack_id: String,
    pub started_at: Timestamp,
    pub ended_at: Option<Timestamp>,
}

#[derive(Debug, Default)]
struct Tables {
    sessions: HashMap<String, StoredSession>,
    entries: Vec<LeaderboardEntry>,
    packs: HashMap<String, PackRecord>,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn session(&self, session_id: &str) -> Option<StoredSession> {
        self.tables.lock().sessions.get(session_id).cloned()
    }
}

#[async_trait]
impl Store for MemoryStore {
    fn status(&self) -> StoreStatus {
        StoreStatus::memory()
    }

    async fn create_session(&self, room_id: &RoomId, pack_id: &str, started_at: Timestamp) -> StoreResult<String> {
        let id = Uuid::new_v4().to_string();
        self.tables.lock().sessions.insert(
            id.clone(),
            StoredSession {
                room_id: room_id.clone(),
                pack_id: pack_id.to_string(),
                started_at,
                ended_at: None,
            },
        );
        Ok(id)
    }

    async fn end_session(&self, session_id: &str, ended_at: Timestamp) -> StoreResult<()> {
        if let Some(row) = self.tables.lock().sessions.get_mut(session_id) {
            row.ended_at = Some(ended_at);
        }
        Ok(())
    }

    async fn insert_leaderboard_entry(&self, entry: &NewLeaderboardEntry, now: Timestamp) -> StoreResult<LeaderboardEntry> {
        let entry = entry.clone().into_entry(Uuid::new_v4().to_string(), now);
        self.tables.lock().entries.push(entry.clone());
        Ok(entry)
    }

    async fn fetch_leaderboard(&self, limit: usize) -> StoreResult<Vec<LeaderboardEntry>> {
        let mut entries = self.tables.lock().entries.clone();
        entries.sort_by(|a, b| b.roi.cmp(&a.roi));
        entries.truncate(limit);
        Ok(entries)
    }

    async fn list_packs(&self) -> StoreResult<Vec<EventPackSummary>> {
        let tables = self.tables.lock();
        let mut records: Vec<&PackRecord> = tables.packs.values().collect();
        records.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(records.into_iter().map(PackRecord::summary).collect())
    }

    async fn get_pack_by_id(&self, pack_id: &str) -> StoreResult<Option<PackRecord>> {
        Ok(self.tables.lock().packs.get(pack_id).cloned())
    }

    async fn create_pack(&self, input: &EventPackInput, edit_token: &str, now: Timestamp) -> StoreResult<PackRecord> {
        let id = Uuid::new_v4().to_string();
        let record = PackRecord {
            pack: EventPack::from_input(id.clone(), 1, input.clone()),
            updated_at: Some(now),
            edit_token: Some(edit_token.to_string()),
        };
        self.tables.lock().packs.insert(id, record.clone());
        Ok(record)
    }

    async fn update_pack(&self, pack_id: &str, input: &EventPackInput, now: Timestamp) -> StoreResult<Option<PackRecord>> {
        let mut tables = self.tables.lock();
        let Some(record) = tables.packs.get_mut(pack_id) else {
            return Ok(None);
        };
        let version = record.pack.version + 1;
        record.pack = EventPack::from_input(pack_id, version, input.clone());
        record.updated_at = Some(now);
        Ok(Some(record.clone()))
    }

    async fn delete_pack(&self, pack_id: &str) -> StoreResult<bool> {
        Ok(self.tables.lock().packs.remove(pack_id).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pack::core_pack;
    use crate::types::Quote;
    use rust_decimal_macros::dec;

    fn entry(roi: rust_decimal::Decimal) -> NewLeaderboardEntry {
        NewLeaderboardEntry {
            session_id: None,
            room_id: RoomId::new("r"),
            player_name: "p".into(),
            role: "OG".into(),
            cash: Quote::new(dec!(100)),
            peak_cash: Quote::new(dec!(100)),
            roi,
            days_survived: 1,
        }
    }

    #[tokio::test]
    async fn sessions_open_and_close() {
        let store = MemoryStore::new();
        let id = store
            .create_session(&RoomId::new("r"), "core", Timestamp::from_millis(5))
            .await
            .unwrap();
        let session = store.session(&id).unwrap();
        assert_eq!(session.room_id, RoomId::new("r"));
        assert_eq!(session.pack_id, "core");
        assert_eq!(session.ended_at, None);
        store.end_session(&id, Timestamp::from_millis(9)).await.unwrap();
        assert_eq!(store.session(&id).unwrap().ended_at, Some(Timestamp::from_millis(9)));
    }

    #[tokio::test]
    async fn leaderboard_fetch_sorted() {
        let store = MemoryStore::new();
        for roi in [dec!(1), dec!(30), dec!(-4)] {
            store.insert_leaderboard_entry(&entry(roi), Timestamp::from_millis(1)).await.unwrap();
        }
        let top = store.fetch_leaderboard(2).await.unwrap();
        assert_eq!(top.len(), 2);
        assert_eq!(top[0].roi, dec!(30));
        assert_eq!(top[1].roi, dec!(1));
    }

    #[tokio::test]
    async fn pack_crud_bumps_version() {
        let store = MemoryStore::new();
        let input = core_pack().to_input();
        let created = store.create_pack(&input, "tok", Timestamp::from_millis(1)).await.unwrap();
        assert_eq!(created.pack.version, 1);

        let updated = store
            .update_pack(&created.pack.id, &input, Timestamp::from_millis(2))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.pack.version, 2);
        assert_eq!(updated.edit_token.as_deref(), Some("tok"));

        assert!(store.delete_pack(&created.pack.id).await.unwrap());
        assert!(!store.delete_pack(&created.pack.id).await.unwrap());
        assert!(store.update_pack("missing", &input, Timestamp::from_millis(3)).await.unwrap().is_none());
    }
}
