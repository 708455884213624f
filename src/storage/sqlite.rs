// 13.2: SQLite-backed store. one connection behind a mutex, every call runs on the blocking pool
// under a deadline. a failed or late call flips the health flag, the next good call flips it back.

use super::{PackRecord, Store, StoreError, StoreResult, StoreStatus};
use crate::leaderboard::{LeaderboardEntry, NewLeaderboardEntry};
use crate::pack::{EventPack, EventPackInput, EventPackSummary};
use crate::types::{Quote, RoomId, Timestamp};
use async_trait::async_trait;
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension, Row};
use rust_decimal::Decimal;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Create tables if missing. Safe to call on every start.
pub fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS sessions (
            id TEXT PRIMARY KEY,
            room_id TEXT NOT NULL,
            pack_id TEXT NOT NULL,
            started_at INTEGER NOT NULL,
            ended_at INTEGER
        )",
        [],
    )?;

    // money stored as decimal text, ordering casts
    conn.execute(
        "CREATE TABLE IF NOT EXISTS leaderboard_entries (
            id TEXT PRIMARY KEY,
            session_id TEXT,
            room_id TEXT NOT NULL,
            player_name TEXT NOT NULL,
            role TEXT NOT NULL,
            cash TEXT NOT NULL,
            peak_cash TEXT NOT NULL,
            roi TEXT NOT NULL,
            days_survived INTEGER NOT NULL,
            created_at INTEGER NOT NULL
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_leaderboard_created ON leaderboard_entries(created_at)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS event_packs (
            id TEXT PRIMARY KEY,
            version INTEGER NOT NULL,
            data TEXT NOT NULL,
            edit_token TEXT,
            updated_at INTEGER NOT NULL
        )",
        [],
    )?;

    Ok(())
}

fn decimal_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<Decimal> {
    let text: String = row.get(idx)?;
    Decimal::from_str(&text)
        .map_err(|err| rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(err)))
}

fn entry_from_row(row: &Row<'_>) -> rusqlite::Result<LeaderboardEntry> {
    Ok(LeaderboardEntry {
        id: row.get(0)?,
        player_name: row.get(1)?,
        handle: None,
        avatar_url: None,
        role: row.get(2)?,
        cash: Quote::new(decimal_column(row, 3)?),
        peak_cash: Quote::new(decimal_column(row, 4)?),
        roi: decimal_column(row, 5)?,
        days_survived: row.get(6)?,
        wallet_address: None,
        created_at: Timestamp::from_millis(row.get(7)?),
    })
}

struct PackRow {
    id: String,
    version: u32,
    data: String,
    edit_token: Option<String>,
    updated_at: i64,
}

impl PackRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            version: row.get(1)?,
            data: row.get(2)?,
            edit_token: row.get(3)?,
            updated_at: row.get(4)?,
        })
    }

    fn into_record(self) -> StoreResult<PackRecord> {
        let input: EventPackInput = serde_json::from_str(&self.data)?;
        Ok(PackRecord {
            pack: EventPack::from_input(self.id, self.version, input),
            updated_at: Some(Timestamp::from_millis(self.updated_at)),
            edit_token: self.edit_token,
        })
    }
}

const PACK_COLUMNS: &str = "id, version, data, edit_token, updated_at";

#[derive(Debug, Default)]
struct Health {
    unhealthy: bool,
    last_error: Option<String>,
}

pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
    timeout: Duration,
    health: Mutex<Health>,
}

impl std::fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStore")
            .field("timeout", &self.timeout)
            .field("health", &*self.health.lock())
            .finish()
    }
}

impl SqliteStore {
    pub fn open<P: AsRef<Path>>(path: P, timeout: Duration) -> StoreResult<Self> {
        let conn = Connection::open(path)?;
        Self::with_connection(conn, timeout)
    }

    pub fn open_in_memory(timeout: Duration) -> StoreResult<Self> {
        Self::with_connection(Connection::open_in_memory()?, timeout)
    }

    fn with_connection(conn: Connection, timeout: Duration) -> StoreResult<Self> {
        init_schema(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            timeout,
            health: Mutex::new(Health::default()),
        })
    }

    // 13.2.1: run one blocking call under the deadline and record how it went
    async fn run<T, F>(&self, op: &'static str, f: F) -> StoreResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> StoreResult<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        let task = tokio::task::spawn_blocking(move || {
            let guard = conn.lock();
            f(&guard)
        });

        let result = match tokio::time::timeout(self.timeout, task).await {
            Err(_) => Err(StoreError::Timeout(op)),
            Ok(Err(join)) => Err(StoreError::Join(join.to_string())),
            Ok(Ok(inner)) => inner,
        };

        let mut health = self.health.lock();
        match &result {
            Ok(_) => {
                if health.unhealthy {
                    tracing::info!(op, "store recovered");
                }
                health.unhealthy = false;
            }
            Err(err) => {
                tracing::warn!(op, error = %err, "store call failed");
                health.unhealthy = true;
                health.last_error = Some(err.to_string());
            }
        }
        result
    }
}

#[async_trait]
impl Store for SqliteStore {
    fn status(&self) -> StoreStatus {
        let health = self.health.lock();
        StoreStatus {
            durable: true,
            healthy: !health.unhealthy,
            last_error: health.last_error.clone(),
        }
    }

    async fn create_session(&self, room_id: &RoomId, pack_id: &str, started_at: Timestamp) -> StoreResult<String> {
        let id = Uuid::new_v4().to_string();
        let row_id = id.clone();
        let room_id = room_id.to_string();
        let pack_id = pack_id.to_string();
        self.run("create_session", move |conn| {
            conn.execute(
                "INSERT INTO sessions (id, room_id, pack_id, started_at) VALUES (?1, ?2, ?3, ?4)",
                params![row_id, room_id, pack_id, started_at.as_millis()],
            )?;
            Ok(())
        })
        .await?;
        Ok(id)
    }

    async fn end_session(&self, session_id: &str, ended_at: Timestamp) -> StoreResult<()> {
        let session_id = session_id.to_string();
        self.run("end_session", move |conn| {
            conn.execute(
                "UPDATE sessions SET ended_at = ?1 WHERE id = ?2",
                params![ended_at.as_millis(), session_id],
            )?;
            Ok(())
        })
        .await
    }

    async fn insert_leaderboard_entry(&self, entry: &NewLeaderboardEntry, now: Timestamp) -> StoreResult<LeaderboardEntry> {
        let new = entry.clone();
        let stored = new.clone().into_entry(Uuid::new_v4().to_string(), now);
        let row = stored.clone();
        self.run("insert_leaderboard_entry", move |conn| {
            conn.execute(
                "INSERT INTO leaderboard_entries
                    (id, session_id, room_id, player_name, role, cash, peak_cash, roi, days_survived, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    row.id,
                    new.session_id,
                    new.room_id.to_string(),
                    row.player_name,
                    row.role,
                    row.cash.value().to_string(),
                    row.peak_cash.value().to_string(),
                    row.roi.to_string(),
                    row.days_survived,
                    row.created_at.as_millis(),
                ],
            )?;
            Ok(())
        })
        .await?;
        Ok(stored)
    }

    async fn fetch_leaderboard(&self, limit: usize) -> StoreResult<Vec<LeaderboardEntry>> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        self.run("fetch_leaderboard", move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, player_name, role, cash, peak_cash, roi, days_survived, created_at
                 FROM leaderboard_entries
                 ORDER BY CAST(roi AS REAL) DESC, created_at ASC
                 LIMIT ?1",
            )?;
            let rows = stmt.query_map(params![limit], entry_from_row)?;
            Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
        })
        .await
    }

    async fn list_packs(&self) -> StoreResult<Vec<EventPackSummary>> {
        self.run("list_packs", |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {PACK_COLUMNS} FROM event_packs ORDER BY updated_at DESC"
            ))?;
            let rows = stmt
                .query_map([], PackRow::from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            rows.into_iter()
                .map(|row| row.into_record().map(|record| record.summary()))
                .collect()
        })
        .await
    }

    async fn get_pack_by_id(&self, pack_id: &str) -> StoreResult<Option<PackRecord>> {
        let pack_id = pack_id.to_string();
        self.run("get_pack_by_id", move |conn| {
            let row = conn
                .query_row(
                    &format!("SELECT {PACK_COLUMNS} FROM event_packs WHERE id = ?1"),
                    params![pack_id],
                    PackRow::from_row,
                )
                .optional()?;
            row.map(PackRow::into_record).transpose()
        })
        .await
    }

    async fn create_pack(&self, input: &EventPackInput, edit_token: &str, now: Timestamp) -> StoreResult<PackRecord> {
        let record = PackRecord {
            pack: EventPack::from_input(Uuid::new_v4().to_string(), 1, input.clone()),
            updated_at: Some(now),
            edit_token: Some(edit_token.to_string()),
        };
        let data = serde_json::to_string(input)?;
        let row = record.clone();
        self.run("create_pack", move |conn| {
            conn.execute(
                "INSERT INTO event_packs (id, version, data, edit_token, updated_at) VALUES (?1, ?2, ?3, ?4, ?5)",
                params![row.pack.id, row.pack.version, data, row.edit_token, now.as_millis()],
            )?;
            Ok(())
        })
        .await?;
        Ok(record)
    }

    async fn update_pack(&self, pack_id: &str, input: &EventPackInput, now: Timestamp) -> StoreResult<Option<PackRecord>> {
        let pack_id = pack_id.to_string();
        let data = serde_json::to_string(input)?;
        self.run("update_pack", move |conn| {
            let changed = conn.execute(
                "UPDATE event_packs SET version = version + 1, data = ?1, updated_at = ?2 WHERE id = ?3",
                params![data, now.as_millis(), pack_id],
            )?;
            if changed == 0 {
                return Ok(None);
            }
            let row = conn.query_row(
                &format!("SELECT {PACK_COLUMNS} FROM event_packs WHERE id = ?1"),
                params![pack_id],
                PackRow::from_row,
            )?;
            row.into_record().map(Some)
        })
        .await
    }

    async fn delete_pack(&self, pack_id: &str) -> StoreResult<bool> {
        let pack_id = pack_id.to_string();
        self.run("delete_pack", move |conn| {
            let deleted = conn.execute("DELETE FROM event_packs WHERE id = ?1", params![pack_id])?;
            Ok(deleted > 0)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pack::core_pack;
    use crate::storage::{find_pack, pack_summaries};
    use rust_decimal_macros::dec;

    fn store() -> SqliteStore {
        SqliteStore::open_in_memory(Duration::from_secs(2)).unwrap()
    }

    fn entry(name: &str, roi: Decimal) -> NewLeaderboardEntry {
        NewLeaderboardEntry {
            session_id: Some("s-1".into()),
            room_id: RoomId::new("lobby"),
            player_name: name.into(),
            role: "Crypto OG".into(),
            cash: Quote::new(dec!(1234.56)),
            peak_cash: Quote::new(dec!(2000)),
            roi,
            days_survived: 4,
        }
    }

    #[tokio::test]
    async fn leaderboard_orders_by_roi() {
        let store = store();
        for (name, roi) in [("a", dec!(2.5)), ("b", dec!(-10)), ("c", dec!(120.75))] {
            store.insert_leaderboard_entry(&entry(name, roi), Timestamp::from_millis(1)).await.unwrap();
        }
        let board = store.fetch_leaderboard(10).await.unwrap();
        let names: Vec<&str> = board.iter().map(|e| e.player_name.as_str()).collect();
        assert_eq!(names, vec!["c", "a", "b"]);
        assert_eq!(board[0].cash.value(), dec!(1234.56));
        assert_eq!(board[0].roi, dec!(120.75));
        assert_eq!(store.fetch_leaderboard(1).await.unwrap().len(), 1);
        assert!(store.status().is_ready());
    }

    #[tokio::test]
    async fn pack_lifecycle() {
        let store = store();
        let mut input = core_pack().to_input();
        input.name = "Custom".into();
        let created = store.create_pack(&input, "secret", Timestamp::from_millis(10)).await.unwrap();

        let found = find_pack(&store, &created.pack.id).await.unwrap().unwrap();
        assert_eq!(found.pack.name, "Custom");
        assert_eq!(found.edit_token.as_deref(), Some("secret"));

        input.name = "Renamed".into();
        let updated = store
            .update_pack(&created.pack.id, &input, Timestamp::from_millis(20))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.pack.version, 2);
        assert_eq!(updated.pack.name, "Renamed");

        let listed = pack_summaries(&store).await;
        assert_eq!(listed.len(), 2);
        assert!(listed[0].is_core);
        assert_eq!(listed[1].name, "Renamed");

        assert!(store.delete_pack(&created.pack.id).await.unwrap());
        assert!(store.get_pack_by_id(&created.pack.id).await.unwrap().is_none());
        assert!(store.update_pack("nope", &input, Timestamp::from_millis(30)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn sessions_round_trip() {
        let store = store();
        let id = store
            .create_session(&RoomId::new("r"), "core", Timestamp::from_millis(5))
            .await
            .unwrap();
        store.end_session(&id, Timestamp::from_millis(50)).await.unwrap();
        let ended: Option<i64> = store
            .conn
            .lock()
            .query_row("SELECT ended_at FROM sessions WHERE id = ?1", params![id], |row| row.get(0))
            .unwrap();
        assert_eq!(ended, Some(50));
    }

    #[tokio::test]
    async fn corrupt_row_marks_unhealthy() {
        let store = store();
        store
            .conn
            .lock()
            .execute(
                "INSERT INTO event_packs (id, version, data, edit_token, updated_at) VALUES ('bad', 1, 'not json', NULL, 0)",
                [],
            )
            .unwrap();
        assert!(store.get_pack_by_id("bad").await.is_err());
        let status = store.status();
        assert!(!status.healthy);
        assert!(status.last_error.is_some());

        // next good call recovers
        store.fetch_leaderboard(5).await.unwrap();
        assert!(store.status().healthy);
    }
}
