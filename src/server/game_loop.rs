// 14.2: the game loop actor. owns the registry, ticks it on a fixed interval and applies
// commands in arrival order. store work never runs inline: each task is spawned and its
// outcome comes back through the same command channel.

use super::bridge::{ClaimResult, GameCommand, Outbound};
use crate::cache::{fetch_leaderboard, LeaderboardCache};
use crate::config::GameConfig;
use crate::engine::RoomError;
use crate::events::{StoreOutcome, StoreTask};
use crate::protocol::ServerMessage;
use crate::registry::RoomRegistry;
use crate::storage::{find_pack, pack_summaries, Store};
use crate::types::{ConnId, Timestamp};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};
use uuid::Uuid;

pub struct GameLoop {
    registry: RoomRegistry,
    config: Arc<GameConfig>,
    store: Arc<dyn Store>,
    cache: Arc<dyn LeaderboardCache>,
    conns: HashMap<ConnId, Outbound>,
    pending_claims: HashMap<u64, oneshot::Sender<ClaimResult>>,
    next_request: u64,
    cmd_tx: mpsc::UnboundedSender<GameCommand>,
    cmd_rx: mpsc::UnboundedReceiver<GameCommand>,
}

/// Start the loop on the current runtime. The sender is what handlers talk to.
pub fn spawn_game_loop(
    config: Arc<GameConfig>,
    store: Arc<dyn Store>,
    cache: Arc<dyn LeaderboardCache>,
) -> (mpsc::UnboundedSender<GameCommand>, JoinHandle<()>) {
    let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
    let game = GameLoop {
        registry: RoomRegistry::new(config.clone()),
        config,
        store,
        cache,
        conns: HashMap::new(),
        pending_claims: HashMap::new(),
        next_request: 0,
        cmd_tx: cmd_tx.clone(),
        cmd_rx,
    };
    let handle = tokio::spawn(game.run());
    (cmd_tx, handle)
}

impl GameLoop {
    async fn run(mut self) {
        let period = Duration::from_millis(u64::try_from(self.config.tick_interval_ms).unwrap_or(1_000).max(1));
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!(tick_ms = period.as_millis() as u64, "game loop started");

        self.registry.set_store_status(self.store.status());
        self.registry.refresh_leaderboard();
        self.pump();

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.registry.set_store_status(self.store.status());
                    self.registry.tick(Timestamp::now());
                }
                cmd = self.cmd_rx.recv() => match cmd {
                    Some(cmd) => self.apply(cmd),
                    None => break,
                },
            }
            self.pump();
        }
        info!("game loop stopped");
    }

    fn apply(&mut self, cmd: GameCommand) {
        let now = Timestamp::now();
        match cmd {
            GameCommand::Connect { conn, outbound } => {
                debug!(conn = conn.0, "connection opened");
                self.conns.insert(conn, outbound);
                self.registry.connect(conn);
            }
            GameCommand::Text { conn, text } => {
                self.registry.set_store_status(self.store.status());
                self.registry.handle_text(conn, &text, now);
            }
            GameCommand::Disconnect { conn } => {
                debug!(conn = conn.0, "connection closed");
                self.conns.remove(&conn);
                self.registry.disconnect(conn, now);
            }
            GameCommand::Rooms { reply } => {
                let _ = reply.send(self.registry.room_list());
            }
            GameCommand::Leaderboard { reply } => {
                let _ = reply.send(self.registry.leaderboard());
            }
            GameCommand::SubmitClaim {
                client_id,
                player_name,
                reply,
            } => {
                self.registry.set_store_status(self.store.status());
                self.next_request += 1;
                let request_id = self.next_request;
                match self
                    .registry
                    .submit_claim(request_id, &client_id, player_name.as_deref(), now)
                {
                    Some(result) => {
                        let _ = reply.send(result);
                    }
                    None => {
                        self.pending_claims.insert(request_id, reply);
                    }
                }
            }
            GameCommand::Outcome(outcome) => self.registry.handle_outcome(outcome, now),
        }
    }

    /// Deliver everything the registry queued since the last pump.
    fn pump(&mut self) {
        for out in self.registry.drain_outgoing() {
            if let Some(tx) = self.conns.get(&out.conn) {
                let _ = tx.send(out.message);
            }
        }
        for conn in self.registry.drain_closed() {
            self.conns.remove(&conn);
        }
        for reply in self.registry.drain_claim_replies() {
            if let Some(tx) = self.pending_claims.remove(&reply.request_id) {
                let _ = tx.send(reply.result);
            }
        }
        for task in self.registry.drain_tasks() {
            let store = self.store.clone();
            let cache = self.cache.clone();
            let config = self.config.clone();
            let cmd_tx = self.cmd_tx.clone();
            tokio::spawn(async move {
                let outcome = execute(task, store.as_ref(), cache.as_ref(), &config).await;
                let _ = cmd_tx.send(GameCommand::Outcome(outcome));
            });
        }
    }
}

fn error_reply(err: RoomError) -> ServerMessage {
    ServerMessage::error(err.to_string())
}

/** 14.2.1: run one store task. failures are logged and folded into the outcome, never raised */
pub async fn execute(
    task: StoreTask,
    store: &dyn Store,
    cache: &dyn LeaderboardCache,
    config: &GameConfig,
) -> StoreOutcome {
    let now = Timestamp::now();
    let ready = store.status().is_ready();
    let name = task.name();

    match task {
        StoreTask::CreateSession {
            room_id,
            started_at,
            pack_id,
        } => {
            let session_id = if ready {
                match store.create_session(&room_id, &pack_id, started_at).await {
                    Ok(id) => Some(id),
                    Err(err) => {
                        warn!(task = name, room = %room_id, error = %err, "store task failed");
                        None
                    }
                }
            } else {
                None
            };
            StoreOutcome::SessionCreated {
                room_id,
                started_at,
                session_id,
            }
        }
        StoreTask::EndSession { session_id, ended_at } => {
            if ready {
                if let Err(err) = store.end_session(&session_id, ended_at).await {
                    warn!(task = name, session = %session_id, error = %err, "store task failed");
                }
            }
            StoreOutcome::Done
        }
        StoreTask::InsertEntry(ticket) => {
            let entry = if ready {
                match store.insert_leaderboard_entry(&ticket.entry, now).await {
                    Ok(entry) => {
                        cache.invalidate().await;
                        Some(entry)
                    }
                    Err(err) => {
                        warn!(task = name, client = %ticket.client_id, error = %err, "store task failed");
                        None
                    }
                }
            } else {
                None
            };
            StoreOutcome::EntryInserted { ticket, entry }
        }
        StoreTask::RefreshLeaderboard => {
            let timeout = Duration::from_millis(config.cache_timeout_ms);
            StoreOutcome::LeaderboardFetched(fetch_leaderboard(store, cache, config.max_leaderboard, timeout).await)
        }
        StoreTask::ListPacks { reply_to } => StoreOutcome::PacksListed {
            reply_to,
            packs: pack_summaries(store).await,
        },
        StoreTask::LoadPack { conn, purpose, pack_id } => {
            let record = find_pack(store, &pack_id).await.unwrap_or_else(|err| {
                warn!(task = name, pack = %pack_id, error = %err, "store task failed");
                None
            });
            StoreOutcome::PackLoaded {
                conn,
                purpose,
                pack_id,
                record,
            }
        }
        StoreTask::CreatePack { conn, input } => {
            let edit_token = Uuid::new_v4().to_string();
            match store.create_pack(&input, &edit_token, now).await {
                Ok(record) => StoreOutcome::PackChanged {
                    conn,
                    reply: ServerMessage::PackCreated {
                        pack: record.summary(),
                        edit_token: Some(edit_token),
                    },
                    changed: true,
                },
                Err(err) => {
                    warn!(task = name, error = %err, "store task failed");
                    StoreOutcome::PackChanged {
                        conn,
                        reply: error_reply(RoomError::CreatePackFailed),
                        changed: false,
                    }
                }
            }
        }
        StoreTask::UpdatePack {
            conn,
            pack_id,
            input,
            edit_token,
        } => {
            let reply = update_pack(store, &pack_id, &input, edit_token.as_deref(), config, now).await;
            let changed = matches!(reply, ServerMessage::PackUpdated { .. });
            StoreOutcome::PackChanged { conn, reply, changed }
        }
        StoreTask::DeletePack {
            conn,
            pack_id,
            edit_token,
        } => {
            let reply = delete_pack(store, &pack_id, edit_token.as_deref(), config).await;
            let changed = matches!(reply, ServerMessage::PackDeleted { .. });
            StoreOutcome::PackChanged { conn, reply, changed }
        }
    }
}

async fn update_pack(
    store: &dyn Store,
    pack_id: &str,
    input: &crate::pack::EventPackInput,
    edit_token: Option<&str>,
    config: &GameConfig,
    now: Timestamp,
) -> ServerMessage {
    let existing = match store.get_pack_by_id(pack_id).await {
        Ok(Some(record)) => record,
        Ok(None) => return error_reply(RoomError::PackNotFound),
        Err(err) => {
            warn!(pack = %pack_id, error = %err, "pack lookup failed");
            return error_reply(RoomError::UpdatePackFailed);
        }
    };
    if !existing.allows_edit(edit_token, config.allow_anon_pack_edit) {
        return error_reply(RoomError::EditForbidden);
    }
    match store.update_pack(pack_id, input, now).await {
        Ok(Some(record)) => ServerMessage::PackUpdated { pack: record.summary() },
        Ok(None) => error_reply(RoomError::PackNotFound),
        Err(err) => {
            warn!(pack = %pack_id, error = %err, "pack update failed");
            error_reply(RoomError::UpdatePackFailed)
        }
    }
}

async fn delete_pack(store: &dyn Store, pack_id: &str, edit_token: Option<&str>, config: &GameConfig) -> ServerMessage {
    let existing = match store.get_pack_by_id(pack_id).await {
        Ok(Some(record)) => record,
        Ok(None) => return error_reply(RoomError::PackNotFound),
        Err(err) => {
            warn!(pack = %pack_id, error = %err, "pack lookup failed");
            return error_reply(RoomError::DeletePackFailed);
        }
    };
    if !existing.allows_edit(edit_token, config.allow_anon_pack_edit) {
        return error_reply(RoomError::DeleteForbidden);
    }
    match store.delete_pack(pack_id).await {
        Ok(true) => ServerMessage::PackDeleted {
            pack_id: pack_id.to_string(),
        },
        Ok(false) => error_reply(RoomError::PackNotFound),
        Err(err) => {
            warn!(pack = %pack_id, error = %err, "pack delete failed");
            error_reply(RoomError::DeletePackFailed)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::NoCache;
    use crate::events::{ClaimOrigin, ClaimTicket, PackListTarget, PackPurpose};
    use crate::leaderboard::NewLeaderboardEntry;
    use crate::pack::core_pack;
    use crate::storage::{MemoryStore, SqliteStore};
    use crate::types::{ClientId, Quote, RoomId};
    use rust_decimal_macros::dec;

    fn sqlite() -> SqliteStore {
        SqliteStore::open_in_memory(Duration::from_secs(5)).unwrap()
    }

    fn ticket() -> ClaimTicket {
        ClaimTicket {
            client_id: ClientId::new("c1"),
            room_id: RoomId::new("pit"),
            session_key: "pit-1".into(),
            entry: NewLeaderboardEntry {
                session_id: None,
                room_id: RoomId::new("pit"),
                player_name: "cat".into(),
                role: "Monk".into(),
                cash: Quote::new(dec!(6000)),
                peak_cash: Quote::new(dec!(6500)),
                roi: dec!(20),
                days_survived: 6,
            },
            origin: ClaimOrigin::Auto,
        }
    }

    #[tokio::test]
    async fn memory_store_skips_durable_work() {
        let store = MemoryStore::new();
        let config = GameConfig::test();
        let outcome = execute(
            StoreTask::CreateSession {
                room_id: RoomId::new("pit"),
                started_at: Timestamp::from_millis(1),
                pack_id: "core".into(),
            },
            &store,
            &NoCache,
            &config,
        )
        .await;
        assert!(matches!(outcome, StoreOutcome::SessionCreated { session_id: None, .. }));

        let outcome = execute(StoreTask::InsertEntry(ticket()), &store, &NoCache, &config).await;
        assert!(matches!(outcome, StoreOutcome::EntryInserted { entry: None, .. }));
    }

    #[tokio::test]
    async fn sqlite_insert_then_refresh() {
        let store = sqlite();
        let config = GameConfig::test();
        let outcome = execute(StoreTask::InsertEntry(ticket()), &store, &NoCache, &config).await;
        let StoreOutcome::EntryInserted { entry: Some(entry), .. } = outcome else {
            panic!("insert failed: {outcome:?}");
        };
        assert_eq!(entry.player_name, "cat");

        let outcome = execute(StoreTask::RefreshLeaderboard, &store, &NoCache, &config).await;
        let StoreOutcome::LeaderboardFetched(Some(entries)) = outcome else {
            panic!("refresh failed: {outcome:?}");
        };
        assert_eq!(entries.len(), 1);
    }

    #[tokio::test]
    async fn pack_lifecycle_with_edit_token() {
        let store = sqlite();
        let config = GameConfig::test();
        let conn = ConnId(1);
        let input = core_pack().to_input();

        let outcome = execute(
            StoreTask::CreatePack {
                conn,
                input: input.clone(),
            },
            &store,
            &NoCache,
            &config,
        )
        .await;
        let StoreOutcome::PackChanged {
            reply: ServerMessage::PackCreated { pack, edit_token: Some(token) },
            changed: true,
            ..
        } = outcome
        else {
            panic!("create failed: {outcome:?}");
        };

        let outcome = execute(
            StoreTask::UpdatePack {
                conn,
                pack_id: pack.id.clone(),
                input: input.clone(),
                edit_token: Some("wrong".into()),
            },
            &store,
            &NoCache,
            &config,
        )
        .await;
        assert!(matches!(
            outcome,
            StoreOutcome::PackChanged {
                reply: ServerMessage::Error { ref message },
                changed: false,
                ..
            } if message == "Not authorized to edit this pack."
        ));

        let outcome = execute(
            StoreTask::UpdatePack {
                conn,
                pack_id: pack.id.clone(),
                input,
                edit_token: Some(token.clone()),
            },
            &store,
            &NoCache,
            &config,
        )
        .await;
        assert!(matches!(outcome, StoreOutcome::PackChanged { changed: true, .. }));

        let outcome = execute(
            StoreTask::ListPacks {
                reply_to: PackListTarget::Conn(conn),
            },
            &store,
            &NoCache,
            &config,
        )
        .await;
        let StoreOutcome::PacksListed { packs, .. } = outcome else {
            panic!("listing failed");
        };
        assert_eq!(packs.len(), 2);
        assert_eq!(packs[0].id, "core");

        let outcome = execute(
            StoreTask::DeletePack {
                conn,
                pack_id: pack.id.clone(),
                edit_token: Some(token),
            },
            &store,
            &NoCache,
            &config,
        )
        .await;
        assert!(matches!(
            outcome,
            StoreOutcome::PackChanged {
                reply: ServerMessage::PackDeleted { .. },
                changed: true,
                ..
            }
        ));

        let outcome = execute(
            StoreTask::LoadPack {
                conn,
                purpose: PackPurpose::Detail,
                pack_id: pack.id,
            },
            &store,
            &NoCache,
            &config,
        )
        .await;
        assert!(matches!(outcome, StoreOutcome::PackLoaded { record: None, .. }));
    }
}
