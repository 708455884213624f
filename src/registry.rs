// 10.0: the room registry. owns every room, every connection's session record and the
// client -> connection bindings. all inbound traffic and every tick go through here; rooms
// queue dispatches and the registry turns them into per-connection messages and store tasks.
// 10.1 inbound messages. 10.2 dispatch resolution. 10.3 store outcomes. 10.4 claims.

use crate::config::GameConfig;
use crate::engine::{JoinRequest, Room, RoomError, RoomOptions};
use crate::events::{Audience, ClaimOrigin, ClaimTicket, Dispatch, PackListTarget, PackPurpose, StoreOutcome, StoreTask};
use crate::leaderboard::{claim_route, ClaimRoute, LeaderboardEntry, LeaderboardError, LeaderboardRanker};
use crate::pack::{EventPackInput, CORE_PACK_ID};
use crate::player::RoleKey;
use crate::protocol::{
    hash_room_key, parse_client_message, sanitize_client_id, sanitize_name, sanitize_room_id, sanitize_room_key,
    sanitize_room_name, ClientMessage, RoomListItem, ServerMessage,
};
use crate::storage::{PackRecord, StoreStatus};
use crate::types::{ClientId, ConnId, RoomId, Timestamp};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Which room a connection joined, and as whom.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionRecord {
    pub client_id: ClientId,
    pub room_id: RoomId,
}

/// One message bound for one connection.
#[derive(Debug, Clone, PartialEq)]
pub struct Outgoing {
    pub conn: ConnId,
    pub message: ServerMessage,
}

/// Answer to an out-of-band HTTP claim, keyed by the caller's request id.
#[derive(Debug, Clone, PartialEq)]
pub struct ClaimReply {
    pub request_id: u64,
    pub result: Result<LeaderboardEntry, LeaderboardError>,
}

#[derive(Debug)]
pub struct RoomRegistry {
    config: Arc<GameConfig>,
    rooms: HashMap<RoomId, Room>,
    connections: BTreeSet<ConnId>,
    sessions: HashMap<ConnId, SessionRecord>,
    bindings: HashMap<ClientId, ConnId>,
    ranker: LeaderboardRanker,
    store_status: StoreStatus,
    rooms_created: u64,
    outgoing: Vec<Outgoing>,
    tasks: Vec<StoreTask>,
    closed: Vec<ConnId>,
    claim_replies: Vec<ClaimReply>,
}

impl RoomRegistry {
    pub fn new(config: Arc<GameConfig>) -> Self {
        let ranker = LeaderboardRanker::new(config.max_leaderboard);
        Self {
            config,
            rooms: HashMap::new(),
            connections: BTreeSet::new(),
            sessions: HashMap::new(),
            bindings: HashMap::new(),
            ranker,
            store_status: StoreStatus::memory(),
            rooms_created: 0,
            outgoing: Vec::new(),
            tasks: Vec::new(),
            closed: Vec::new(),
            claim_replies: Vec::new(),
        }
    }

    pub fn config(&self) -> &GameConfig {
        &self.config
    }

    pub fn room(&self, room_id: &RoomId) -> Option<&Room> {
        self.rooms.get(room_id)
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    pub fn session(&self, conn: ConnId) -> Option<&SessionRecord> {
        self.sessions.get(&conn)
    }

    pub fn ranker(&self) -> &LeaderboardRanker {
        &self.ranker
    }

    pub fn store_status(&self) -> &StoreStatus {
        &self.store_status
    }

    pub fn set_store_status(&mut self, status: StoreStatus) {
        self.store_status = status;
    }

    pub fn leaderboard(&self) -> Vec<LeaderboardEntry> {
        self.ranker.to_vec()
    }

    /// Lobby first, then countdown, live and ended; busier rooms first within a status.
    pub fn room_list(&self) -> Vec<RoomListItem> {
        let mut items: Vec<RoomListItem> = self.rooms.values().map(Room::list_item).collect();
        items.sort_by(|a, b| {
            a.status
                .rank()
                .cmp(&b.status.rank())
                .then(b.player_count.cmp(&a.player_count))
                .then_with(|| a.room_id.as_str().cmp(b.room_id.as_str()))
        });
        items
    }

    // 10.0.1: drains for the driver

    pub fn drain_outgoing(&mut self) -> Vec<Outgoing> {
        std::mem::take(&mut self.outgoing)
    }

    pub fn drain_tasks(&mut self) -> Vec<StoreTask> {
        std::mem::take(&mut self.tasks)
    }

    /// Connections the driver should hang up.
    pub fn drain_closed(&mut self) -> Vec<ConnId> {
        std::mem::take(&mut self.closed)
    }

    pub fn drain_claim_replies(&mut self) -> Vec<ClaimReply> {
        std::mem::take(&mut self.claim_replies)
    }

    fn send(&mut self, conn: ConnId, message: ServerMessage) {
        if self.connections.contains(&conn) {
            self.outgoing.push(Outgoing { conn, message });
        }
    }

    fn next_seed(&mut self) -> Option<u64> {
        let seed = self.config.rng_seed.map(|seed| seed.wrapping_add(self.rooms_created));
        self.rooms_created += 1;
        seed
    }

    // 10.1: connections

    pub fn connect(&mut self, conn: ConnId) {
        self.connections.insert(conn);
    }

    pub fn disconnect(&mut self, conn: ConnId, now: Timestamp) {
        self.connections.remove(&conn);
        self.detach(conn, now);
    }

    /// Drop a connection's session record and take its player out of the room.
    fn detach(&mut self, conn: ConnId, now: Timestamp) {
        let Some(record) = self.sessions.remove(&conn) else {
            return;
        };
        if self.bindings.get(&record.client_id) == Some(&conn) {
            self.bindings.remove(&record.client_id);
        }
        let Some(room) = self.rooms.get_mut(&record.room_id) else {
            return;
        };
        room.leave(&record.client_id, now);
        let dispatches = room.take_dispatches();
        if !room.has_online_players() {
            self.rooms.remove(&record.room_id);
            info!(room = %record.room_id, "room closed");
        }
        for dispatch in dispatches {
            self.resolve(&record.room_id, dispatch, now);
        }
    }

    /** 10.1.1: one raw text frame from a connection */
    pub fn handle_text(&mut self, conn: ConnId, text: &str, now: Timestamp) {
        match parse_client_message(text) {
            Ok(message) => self.handle_message(conn, message, now),
            Err(err) => {
                debug!(conn = conn.0, error = %err, "malformed payload");
                self.send(conn, ServerMessage::error(RoomError::from(err).to_string()));
            }
        }
    }

    pub fn handle_message(&mut self, conn: ConnId, message: ClientMessage, now: Timestamp) {
        let result = match message {
            ClientMessage::Join {
                room_id,
                room_name,
                player_name,
                role_key,
                pack_id,
                room_key,
                max_players,
                client_id,
            } => {
                let join = JoinRequest {
                    client_id: sanitize_client_id(client_id.as_deref().unwrap_or("")),
                    name: sanitize_name(&player_name),
                    role_key: RoleKey::parse_or_default(role_key.as_deref()),
                    room_name,
                    room_key: sanitize_room_key(room_key.as_deref()),
                };
                let max_players = max_players.map(|n| usize::try_from(n).unwrap_or(0));
                self.join(conn, sanitize_room_id(&room_id), join, max_players, pack_id, now)
            }
            ClientMessage::ListRooms => {
                let rooms = self.room_list();
                self.send(conn, ServerMessage::Rooms { rooms });
                Ok(())
            }
            ClientMessage::ListPacks => {
                self.tasks.push(StoreTask::ListPacks {
                    reply_to: PackListTarget::Conn(conn),
                });
                Ok(())
            }
            ClientMessage::GetPack { pack_id } => {
                self.tasks.push(StoreTask::LoadPack {
                    conn,
                    purpose: PackPurpose::Detail,
                    pack_id,
                });
                Ok(())
            }
            other => match self.sessions.get(&conn).cloned() {
                Some(record) => self.room_message(conn, record, other, now),
                None => Err(RoomError::NotJoined),
            },
        };

        if let Err(err) = result {
            if err.is_silent() {
                debug!(conn = conn.0, error = %err, "request dropped");
            } else {
                self.send(conn, ServerMessage::error(err.to_string()));
            }
        }
    }

    // 10.1.2: join. creates the room on demand, undone again if the first admit fails
    fn join(
        &mut self,
        conn: ConnId,
        room_id: RoomId,
        join: JoinRequest,
        max_players: Option<usize>,
        pack_id: Option<String>,
        now: Timestamp,
    ) -> Result<(), RoomError> {
        if self.sessions.get(&conn).is_some_and(|record| record.room_id != room_id) {
            self.detach(conn, now);
        }

        let created = !self.rooms.contains_key(&room_id);
        if created {
            let options = RoomOptions {
                display_name: sanitize_room_name(join.room_name.as_deref(), Some(room_id.as_str())),
                max_players: self.config.clamp_room_players(max_players),
                key_hash: (!join.room_key.is_empty()).then(|| hash_room_key(&join.room_key)),
                seed: self.next_seed(),
            };
            let room = Room::new(room_id.clone(), options, self.config.clone(), now);
            self.rooms.insert(room_id.clone(), room);
            info!(room = %room_id, "room created");
        }

        let client_id = join.client_id.clone();
        let Some(room) = self.rooms.get_mut(&room_id) else {
            return Err(RoomError::NotJoined);
        };
        if let Err(err) = room.admit(join, now) {
            if created && room.players().is_empty() {
                self.rooms.remove(&room_id);
            }
            return Err(err);
        }

        if let Some(previous) = self.bindings.insert(client_id.clone(), conn) {
            if previous != conn {
                self.sessions.remove(&previous);
                debug!(client = %client_id, from = previous.0, to = conn.0, "client rebound");
            }
        }
        self.sessions.insert(
            conn,
            SessionRecord {
                client_id: client_id.clone(),
                room_id: room_id.clone(),
            },
        );
        self.flush(&room_id, now);

        self.tasks.push(StoreTask::ListPacks {
            reply_to: PackListTarget::Conn(conn),
        });
        if let Some(pack_id) = pack_id {
            let wants_pack = self
                .rooms
                .get(&room_id)
                .is_some_and(|room| room.check_set_pack(&client_id).is_ok());
            if wants_pack {
                self.tasks.push(StoreTask::LoadPack {
                    conn,
                    purpose: PackPurpose::JoinPack,
                    pack_id,
                });
            }
        }
        Ok(())
    }

    // 10.1.3: everything that needs a session record
    fn room_message(
        &mut self,
        conn: ConnId,
        record: SessionRecord,
        message: ClientMessage,
        now: Timestamp,
    ) -> Result<(), RoomError> {
        let client = record.client_id.clone();
        let room_id = record.room_id.clone();
        if !self.rooms.contains_key(&room_id) {
            return Err(RoomError::NotJoined);
        }

        let result = match message {
            ClientMessage::Ping => {
                self.send(conn, ServerMessage::Pong);
                Ok(())
            }
            ClientMessage::ClaimLeaderboard { player_name } => self.claim_in_room(conn, &record, player_name, now),
            ClientMessage::CreatePack { pack } => self.pack_input(&room_id, &client, pack).map(|input| {
                self.tasks.push(StoreTask::CreatePack { conn, input });
            }),
            ClientMessage::UpdatePack {
                pack_id,
                pack,
                edit_token,
            } => self.pack_input(&room_id, &client, pack).and_then(|input| {
                if pack_id == CORE_PACK_ID {
                    return Err(RoomError::CorePackImmutable);
                }
                self.tasks.push(StoreTask::UpdatePack {
                    conn,
                    pack_id,
                    input,
                    edit_token,
                });
                Ok(())
            }),
            ClientMessage::DeletePack { pack_id, edit_token } => {
                self.require_pack_store(&room_id, &client).and_then(|()| {
                    if pack_id == CORE_PACK_ID {
                        return Err(RoomError::CorePackUndeletable);
                    }
                    self.tasks.push(StoreTask::DeletePack {
                        conn,
                        pack_id,
                        edit_token,
                    });
                    Ok(())
                })
            }
            message => {
                let Some(room) = self.rooms.get_mut(&room_id) else {
                    return Err(RoomError::NotJoined);
                };
                match message {
                    ClientMessage::Chat { text } => room.chat(&client, &text, now),
                    ClientMessage::Trade { trade } => room.execute_trade(&client, &trade, now).map(|_| ()),
                    ClientMessage::EventChoice { event_id, choice_id } => {
                        room.event_choice(&client, &event_id, &choice_id, now)
                    }
                    ClientMessage::SetReady { ready } => room.set_ready(&client, ready, now),
                    ClientMessage::StartCountdown => room.start_countdown(&client, now),
                    ClientMessage::KickPlayer { player_id } => room.kick(&client, &player_id, now),
                    ClientMessage::SetPack { pack_id } => room.check_set_pack(&client).map(|()| {
                        self.tasks.push(StoreTask::LoadPack {
                            conn,
                            purpose: PackPurpose::SetPack,
                            pack_id,
                        });
                    }),
                    ClientMessage::SetRoomKey { room_key } => room.set_room_key(&client, room_key.as_deref()),
                    ClientMessage::UpdateName { name } => room.update_name(&client, &name),
                    // join, listings and pack CRUD are routed before this point
                    _ => Err(RoomError::NoOp),
                }
            }
        };

        self.flush(&room_id, now);
        result
    }

    // 10.1.4: pack CRUD gates, checked before anything is queued
    fn require_pack_store(&self, room_id: &RoomId, client: &ClientId) -> Result<(), RoomError> {
        self.rooms
            .get(room_id)
            .and_then(|room| room.player(client))
            .ok_or(RoomError::UnknownPlayer)?;
        if !self.store_status.is_ready() {
            return Err(RoomError::StoreNotConfigured);
        }
        Ok(())
    }

    fn pack_input(
        &self,
        room_id: &RoomId,
        client: &ClientId,
        payload: serde_json::Value,
    ) -> Result<EventPackInput, RoomError> {
        self.require_pack_store(room_id, client)?;
        let input: EventPackInput = serde_json::from_value(payload).map_err(|_| RoomError::InvalidPack)?;
        input.validate().map_err(|_| RoomError::InvalidPack)?;
        Ok(input)
    }

    // 10.2: dispatch resolution

    fn flush(&mut self, room_id: &RoomId, now: Timestamp) {
        let Some(room) = self.rooms.get_mut(room_id) else {
            return;
        };
        for dispatch in room.take_dispatches() {
            self.resolve(room_id, dispatch, now);
        }
    }

    /// Live connections of a room, in seat order.
    fn room_conns(&self, room_id: &RoomId) -> Vec<(ClientId, ConnId)> {
        let Some(room) = self.rooms.get(room_id) else {
            return Vec::new();
        };
        room.players()
            .iter()
            .filter_map(|player| {
                let conn = *self.bindings.get(player.id())?;
                let record = self.sessions.get(&conn)?;
                (record.room_id == *room_id).then(|| (player.id().clone(), conn))
            })
            .collect()
    }

    fn client_conn(&self, room_id: &RoomId, client_id: &ClientId) -> Option<ConnId> {
        let conn = *self.bindings.get(client_id)?;
        let record = self.sessions.get(&conn)?;
        (record.room_id == *room_id).then_some(conn)
    }

    fn resolve(&mut self, room_id: &RoomId, dispatch: Dispatch, now: Timestamp) {
        match dispatch {
            Dispatch::Message {
                audience: Audience::Room,
                message,
            } => {
                for (_, conn) in self.room_conns(room_id) {
                    self.send(conn, message.clone());
                }
            }
            Dispatch::Message {
                audience: Audience::Client(client_id),
                message,
            } => {
                if let Some(conn) = self.client_conn(room_id, &client_id) {
                    self.send(conn, message);
                }
            }
            Dispatch::RoomStates => {
                let targets = self.room_conns(room_id);
                let Some(room) = self.rooms.get(room_id) else {
                    return;
                };
                let snapshots: Vec<(ConnId, ServerMessage)> = targets
                    .into_iter()
                    .map(|(client, conn)| {
                        let room = Box::new(room.snapshot_for(&client, now));
                        (conn, ServerMessage::RoomState { room })
                    })
                    .collect();
                for (conn, message) in snapshots {
                    self.send(conn, message);
                }
            }
            Dispatch::RoomList => self.broadcast_room_list(),
            Dispatch::Store(task) => self.tasks.push(task),
            Dispatch::SessionResults(results) => {
                let auto_submit = self.config.auto_submit_leaderboard && self.store_status.is_ready();
                for result in results {
                    let already = self.ranker.is_submitted(&result.client_id, &result.session_key)
                        || self
                            .rooms
                            .get(room_id)
                            .and_then(|room| room.player(&result.client_id))
                            .is_some_and(|player| player.leaderboard_submitted);
                    if auto_submit && !already {
                        self.tasks.push(StoreTask::InsertEntry(ClaimTicket {
                            client_id: result.client_id.clone(),
                            room_id: result.room_id.clone(),
                            session_key: result.session_key.clone(),
                            entry: result.to_new_entry(None),
                            origin: ClaimOrigin::Auto,
                        }));
                    }
                    self.ranker.record_result(result);
                }
                self.ranker.prune(now, self.config.result_retention_ms);
            }
            Dispatch::Close(client_id) => {
                if let Some(conn) = self.client_conn(room_id, &client_id) {
                    self.bindings.remove(&client_id);
                    self.sessions.remove(&conn);
                    self.closed.push(conn);
                    debug!(room = %room_id, client = %client_id, "connection closed");
                }
            }
        }
    }

    fn broadcast_room_list(&mut self) {
        let rooms = self.room_list();
        let conns: Vec<ConnId> = self.connections.iter().copied().collect();
        for conn in conns {
            self.send(conn, ServerMessage::Rooms { rooms: rooms.clone() });
        }
    }

    /// Push the current board into every room and to every joined connection.
    fn broadcast_leaderboard(&mut self) {
        let entries = self.ranker.to_vec();
        for room in self.rooms.values_mut() {
            room.set_leaderboard(entries.clone());
        }
        let conns: Vec<ConnId> = self.sessions.keys().copied().collect();
        for conn in conns {
            self.send(
                conn,
                ServerMessage::Leaderboard {
                    entries: entries.clone(),
                },
            );
        }
    }

    /** 10.2.1: advance every room one tick */
    pub fn tick(&mut self, now: Timestamp) {
        let ids: Vec<RoomId> = self.rooms.keys().cloned().collect();
        for room_id in ids {
            if let Some(room) = self.rooms.get_mut(&room_id) {
                room.tick(now);
            }
            self.flush(&room_id, now);
        }
    }

    /// Ask the store for a fresh board.
    pub fn refresh_leaderboard(&mut self) {
        self.tasks.push(StoreTask::RefreshLeaderboard);
    }

    // 10.3: store answers

    pub fn handle_outcome(&mut self, outcome: StoreOutcome, now: Timestamp) {
        match outcome {
            StoreOutcome::Done => {}
            StoreOutcome::SessionCreated {
                room_id,
                started_at,
                session_id,
            } => {
                if let (Some(room), Some(session_id)) = (self.rooms.get_mut(&room_id), session_id) {
                    room.attach_session_id(started_at, session_id);
                }
            }
            StoreOutcome::EntryInserted { ticket, entry } => self.finish_claim(ticket, entry, now),
            StoreOutcome::LeaderboardFetched(entries) => {
                match entries {
                    Some(entries) => self.ranker.replace(entries),
                    None if !self.config.allow_memory_leaderboard => self.ranker.clear(),
                    None => {}
                }
                self.broadcast_leaderboard();
            }
            StoreOutcome::PacksListed { reply_to, packs } => match reply_to {
                PackListTarget::Conn(conn) => self.send(conn, ServerMessage::Packs { packs }),
                PackListTarget::Everyone => {
                    let conns: Vec<ConnId> = self.sessions.keys().copied().collect();
                    for conn in conns {
                        self.send(conn, ServerMessage::Packs { packs: packs.clone() });
                    }
                }
            },
            StoreOutcome::PackLoaded {
                conn,
                purpose,
                pack_id,
                record,
            } => self.pack_loaded(conn, purpose, pack_id, record, now),
            StoreOutcome::PackChanged { conn, reply, changed } => {
                self.send(conn, reply);
                if changed {
                    self.tasks.push(StoreTask::ListPacks {
                        reply_to: PackListTarget::Everyone,
                    });
                }
            }
        }
    }

    fn pack_loaded(
        &mut self,
        conn: ConnId,
        purpose: PackPurpose,
        pack_id: String,
        record: Option<PackRecord>,
        now: Timestamp,
    ) {
        if purpose == PackPurpose::Detail {
            let message = match record {
                Some(record) => ServerMessage::PackDetail {
                    pack_id,
                    pack: record.pack.to_input(),
                },
                None => ServerMessage::error(RoomError::PackNotFound.to_string()),
            };
            self.send(conn, message);
            return;
        }

        let Some(record_for_conn) = self.sessions.get(&conn).cloned() else {
            return;
        };
        let Some(pack) = record.map(|r| r.pack) else {
            if purpose == PackPurpose::SetPack {
                self.send(conn, ServerMessage::error(RoomError::PackNotFound.to_string()));
            }
            return;
        };
        let Some(room) = self.rooms.get_mut(&record_for_conn.room_id) else {
            return;
        };
        let result = room.apply_pack(&record_for_conn.client_id, pack, purpose, now);
        self.flush(&record_for_conn.room_id, now);
        if let Err(err) = result {
            if !err.is_silent() {
                self.send(conn, ServerMessage::error(err.to_string()));
            }
        }
    }

    // 10.4: leaderboard claims

    fn claim_in_room(
        &mut self,
        conn: ConnId,
        record: &SessionRecord,
        name_override: Option<String>,
        now: Timestamp,
    ) -> Result<(), RoomError> {
        let room = self.rooms.get(&record.room_id).ok_or(RoomError::NotJoined)?;
        let draft = room.claim_entry(&record.client_id, name_override.as_deref())?;

        let already = self.ranker.is_submitted(&record.client_id, &draft.session_key)
            || room.player(&record.client_id).is_some_and(|p| p.leaderboard_submitted);
        if already {
            let entry = room.last_claim(&record.client_id).cloned().ok_or(RoomError::AlreadySubmitted)?;
            self.send(conn, ServerMessage::LeaderboardSubmitted { entry });
            return Ok(());
        }

        match claim_route(&self.store_status, self.config.allow_memory_leaderboard) {
            ClaimRoute::Store => {
                self.tasks.push(StoreTask::InsertEntry(ClaimTicket {
                    client_id: record.client_id.clone(),
                    room_id: record.room_id.clone(),
                    session_key: draft.session_key,
                    entry: draft.entry,
                    origin: ClaimOrigin::Room(conn),
                }));
                Ok(())
            }
            ClaimRoute::Memory => {
                let entry = self.ranker.insert_memory(draft.entry, now);
                self.ranker.mark_submitted(record.client_id.clone(), draft.session_key, now);
                self.record_claim_everywhere(&record.client_id, &entry);
                self.broadcast_leaderboard();
                self.send(conn, ServerMessage::LeaderboardSubmitted { entry });
                Ok(())
            }
            ClaimRoute::Unavailable => Err(RoomError::LeaderboardUnavailable),
        }
    }

    /** 10.4.1: out-of-band claim for a finished session. `None` means the answer comes later
    as a [`ClaimReply`] carrying `request_id`. */
    pub fn submit_claim(
        &mut self,
        request_id: u64,
        raw_client_id: &str,
        player_name: Option<&str>,
        now: Timestamp,
    ) -> Option<Result<LeaderboardEntry, LeaderboardError>> {
        let client_id = sanitize_client_id(raw_client_id);
        let result = match self.ranker.check_claim(&client_id) {
            Ok(result) => result.clone(),
            Err(err) => return Some(Err(err)),
        };
        let entry = result.to_new_entry(player_name.map(sanitize_name));

        match claim_route(&self.store_status, self.config.allow_memory_leaderboard) {
            ClaimRoute::Store => {
                self.tasks.push(StoreTask::InsertEntry(ClaimTicket {
                    client_id,
                    room_id: result.room_id,
                    session_key: result.session_key,
                    entry,
                    origin: ClaimOrigin::Http(request_id),
                }));
                None
            }
            ClaimRoute::Memory => {
                let entry = self.ranker.insert_memory(entry, now);
                self.ranker.mark_submitted(client_id.clone(), result.session_key, now);
                self.record_claim_everywhere(&client_id, &entry);
                self.broadcast_leaderboard();
                Some(Ok(entry))
            }
            ClaimRoute::Unavailable => Some(Err(LeaderboardError::Unavailable)),
        }
    }

    fn record_claim_everywhere(&mut self, client_id: &ClientId, entry: &LeaderboardEntry) {
        for room in self.rooms.values_mut() {
            room.record_claim(client_id, entry.clone());
        }
    }

    fn finish_claim(&mut self, ticket: ClaimTicket, entry: Option<LeaderboardEntry>, now: Timestamp) {
        let ClaimTicket {
            client_id,
            session_key,
            entry: draft,
            origin,
            ..
        } = ticket;

        let entry = match (entry, origin) {
            (Some(entry), _) => {
                self.ranker.accept(entry.clone());
                entry
            }
            (None, ClaimOrigin::Room(_)) if self.config.allow_memory_leaderboard => {
                self.ranker.insert_memory(draft, now)
            }
            (None, ClaimOrigin::Room(conn)) => {
                self.send(conn, ServerMessage::error(RoomError::LeaderboardUnavailable.to_string()));
                return;
            }
            (None, ClaimOrigin::Http(request_id)) => {
                self.claim_replies.push(ClaimReply {
                    request_id,
                    result: Err(LeaderboardError::InsertFailed),
                });
                return;
            }
            (None, ClaimOrigin::Auto) => {
                warn!(client = %client_id, "auto-submit failed");
                return;
            }
        };

        self.ranker.mark_submitted(client_id.clone(), session_key, now);
        self.record_claim_everywhere(&client_id, &entry);
        self.broadcast_leaderboard();

        match origin {
            ClaimOrigin::Room(conn) => self.send(conn, ServerMessage::LeaderboardSubmitted { entry }),
            ClaimOrigin::Http(request_id) => self.claim_replies.push(ClaimReply {
                request_id,
                result: Ok(entry),
            }),
            ClaimOrigin::Auto => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::StoreOutcome;
    use crate::protocol::{SessionStatus, TradeRequest};
    use crate::types::Side;
    use rust_decimal_macros::dec;

    fn registry() -> RoomRegistry {
        RoomRegistry::new(Arc::new(GameConfig::test()))
    }

    fn t(ms: i64) -> Timestamp {
        Timestamp::from_millis(ms)
    }

    fn join_text(room: &str, name: &str, client: &str) -> String {
        serde_json::json!({
            "type": "join",
            "roomId": room,
            "playerName": name,
            "clientId": client,
        })
        .to_string()
    }

    fn kinds(out: &[Outgoing], conn: ConnId) -> Vec<&'static str> {
        out.iter().filter(|o| o.conn == conn).map(|o| o.message.kind()).collect()
    }

    fn errors(out: &[Outgoing], conn: ConnId) -> Vec<String> {
        out.iter()
            .filter(|o| o.conn == conn)
            .filter_map(|o| match &o.message {
                ServerMessage::Error { message } => Some(message.clone()),
                _ => None,
            })
            .collect()
    }

    fn joined(reg: &mut RoomRegistry, conn: u64, room: &str, client: &str) -> ConnId {
        let conn = ConnId(conn);
        reg.connect(conn);
        reg.handle_text(conn, &join_text(room, client, client), t(0));
        conn
    }

    #[test]
    fn join_creates_room_and_replies_in_order() {
        let mut reg = registry();
        let conn = joined(&mut reg, 1, "Pit!", "alice");
        let out = reg.drain_outgoing();

        assert_eq!(
            kinds(&out, conn),
            vec!["connected", "room_state", "leaderboard", "presence", "rooms"]
        );
        let room = reg.room(&RoomId::new("pit")).unwrap();
        assert_eq!(room.display_name(), "alice's Room");
        assert_eq!(room.max_players(), 6);
        assert!(matches!(
            reg.drain_tasks().as_slice(),
            [StoreTask::ListPacks {
                reply_to: PackListTarget::Conn(ConnId(1))
            }]
        ));
    }

    #[test]
    fn requests_before_join_are_refused() {
        let mut reg = registry();
        let conn = ConnId(9);
        reg.connect(conn);
        reg.handle_text(conn, r#"{"type":"chat","text":"hi"}"#, t(0));
        reg.handle_text(conn, "{not json", t(0));
        reg.handle_text(conn, r#"{"type":"fly"}"#, t(0));
        reg.handle_text(conn, r#"{"type":"list_rooms"}"#, t(0));

        let out = reg.drain_outgoing();
        assert_eq!(
            errors(&out, conn),
            vec!["Join a room first.", "Invalid JSON payload.", "Invalid message payload."]
        );
        assert_eq!(kinds(&out, conn).last(), Some(&"rooms"));
    }

    #[test]
    fn failed_first_join_removes_the_room() {
        let mut reg = registry();
        let a = joined(&mut reg, 1, "pit", "alice");
        reg.handle_text(a, r#"{"type":"set_ready","ready":true}"#, t(1));
        reg.handle_text(a, r#"{"type":"start_countdown"}"#, t(2));
        let countdown = reg.room(&RoomId::new("pit")).unwrap().countdown_ends_at().unwrap();
        reg.tick(countdown);
        assert_eq!(reg.room(&RoomId::new("pit")).unwrap().status(), SessionStatus::Live);
        reg.drain_outgoing();

        let b = joined(&mut reg, 2, "pit", "bob");
        assert_eq!(errors(&reg.drain_outgoing(), b), vec!["Game already started."]);
        assert!(reg.session(b).is_none());

        let c = ConnId(3);
        reg.connect(c);
        reg.handle_text(
            c,
            r#"{"type":"join","roomId":"locked","roomKey":"s3cret","clientId":"cat"}"#,
            t(0),
        );
        reg.handle_text(c, r#"{"type":"join","roomId":"locked","clientId":"dan"}"#, t(0));
        assert!(reg.room(&RoomId::new("locked")).is_some());
        assert_eq!(errors(&reg.drain_outgoing(), c), vec!["Room key required."]);
        assert_eq!(reg.room_count(), 2);
    }

    #[test]
    fn disconnect_removes_the_empty_room() {
        let mut reg = registry();
        let a = joined(&mut reg, 1, "pit", "alice");
        let b = joined(&mut reg, 2, "pit", "bob");
        reg.drain_outgoing();

        reg.disconnect(a, t(5));
        let room = reg.room(&RoomId::new("pit")).unwrap();
        assert_eq!(room.host_id(), Some(&ClientId::new("bob")));
        let out = reg.drain_outgoing();
        assert!(kinds(&out, b).contains(&"presence"));
        assert!(kinds(&out, a).is_empty());

        reg.disconnect(b, t(6));
        assert_eq!(reg.room_count(), 0);
    }

    #[test]
    fn rebinding_a_client_ignores_the_old_connection() {
        let mut reg = registry();
        let old = joined(&mut reg, 1, "pit", "alice");
        let new = joined(&mut reg, 2, "pit", "alice");
        assert!(reg.session(old).is_none());
        assert_eq!(reg.room(&RoomId::new("pit")).unwrap().players().len(), 1);

        reg.disconnect(old, t(1));
        assert_eq!(reg.room(&RoomId::new("pit")).unwrap().online_count(), 1);
        reg.drain_outgoing();
        reg.handle_text(new, r#"{"type":"ping"}"#, t(2));
        assert_eq!(kinds(&reg.drain_outgoing(), new), vec!["pong"]);
    }

    #[test]
    fn live_seat_survives_a_reconnect() {
        let mut reg = registry();
        let pit = RoomId::new("pit");
        let a = joined(&mut reg, 1, "pit", "alice");
        let b = joined(&mut reg, 2, "pit", "bob");
        reg.handle_text(a, r#"{"type":"set_ready","ready":true}"#, t(1));
        reg.handle_text(b, r#"{"type":"set_ready","ready":true}"#, t(1));
        reg.handle_text(a, r#"{"type":"start_countdown"}"#, t(2));
        let countdown = reg.room(&pit).unwrap().countdown_ends_at().unwrap();
        reg.tick(countdown);
        assert_eq!(reg.room(&pit).unwrap().status(), SessionStatus::Live);

        reg.handle_message(
            b,
            ClientMessage::Trade {
                trade: TradeRequest::open(Side::Long),
            },
            countdown,
        );
        let bob = ClientId::new("bob");
        let cash_before = reg.room(&pit).unwrap().player(&bob).unwrap().state.cash;
        assert!(reg.room(&pit).unwrap().player(&bob).unwrap().state.position.is_some());

        reg.disconnect(b, countdown);
        assert!(!reg.room(&pit).unwrap().player(&bob).unwrap().online);
        reg.drain_outgoing();

        let back = ConnId(3);
        reg.connect(back);
        reg.handle_text(back, &join_text("pit", "bob", "bob"), countdown);
        let out = reg.drain_outgoing();
        assert!(errors(&out, back).is_empty());
        assert_eq!(&kinds(&out, back)[..2], &["connected", "room_state"]);

        let room = reg.room(&pit).unwrap();
        let seat = room.player(&bob).unwrap();
        assert!(seat.online);
        assert_eq!(seat.state.cash, cash_before);
        assert!(seat.state.position.is_some());
        assert_eq!(room.players().len(), 2);
        assert!(reg.session(back).is_some());

        let c = joined(&mut reg, 4, "pit", "carol");
        assert_eq!(errors(&reg.drain_outgoing(), c), vec!["Game already started."]);
    }

    #[test]
    fn kick_hangs_up_the_target() {
        let mut reg = registry();
        let a = joined(&mut reg, 1, "pit", "alice");
        let b = joined(&mut reg, 2, "pit", "bob");
        reg.handle_text(a, r#"{"type":"kick_player","playerId":"bob"}"#, t(1));
        assert_eq!(reg.drain_closed(), vec![b]);
        assert!(reg.session(b).is_none());
        assert_eq!(reg.room(&RoomId::new("pit")).unwrap().players().len(), 1);
    }

    #[test]
    fn room_list_orders_by_status_then_size() {
        let mut reg = registry();
        joined(&mut reg, 1, "quiet", "a");
        joined(&mut reg, 2, "busy", "b");
        joined(&mut reg, 3, "busy", "c");
        let live = joined(&mut reg, 4, "arena", "d");
        reg.handle_text(live, r#"{"type":"set_ready","ready":true}"#, t(1));
        reg.handle_text(live, r#"{"type":"start_countdown"}"#, t(1));

        let ids: Vec<String> = reg.room_list().into_iter().map(|r| r.room_id.0).collect();
        assert_eq!(ids, vec!["busy", "quiet", "arena"]);
    }

    #[test]
    fn pack_crud_needs_a_durable_store() {
        let mut reg = registry();
        let a = joined(&mut reg, 1, "pit", "alice");
        reg.drain_outgoing();
        reg.drain_tasks();

        reg.handle_text(a, r#"{"type":"create_pack","pack":{}}"#, t(1));
        reg.set_store_status(StoreStatus {
            durable: true,
            healthy: true,
            last_error: None,
        });
        reg.handle_text(a, r#"{"type":"create_pack","pack":{"name":""}}"#, t(1));
        reg.handle_text(a, r#"{"type":"delete_pack","packId":"core"}"#, t(1));
        assert_eq!(
            errors(&reg.drain_outgoing(), a),
            vec!["Database not configured.", "Invalid pack payload.", "Core pack cannot be deleted."]
        );

        reg.handle_text(a, r#"{"type":"delete_pack","packId":"p1","editToken":"tok"}"#, t(1));
        assert!(matches!(reg.drain_tasks().as_slice(), [StoreTask::DeletePack { .. }]));
    }

    #[test]
    fn memory_claim_and_repeat() {
        let mut reg = registry();
        let a = joined(&mut reg, 1, "pit", "alice");
        reg.drain_outgoing();

        reg.handle_text(a, r#"{"type":"claim_leaderboard","playerName":"Al"}"#, t(1));
        let out = reg.drain_outgoing();
        let entry = out
            .iter()
            .find_map(|o| match &o.message {
                ServerMessage::LeaderboardSubmitted { entry } => Some(entry.clone()),
                _ => None,
            })
            .unwrap();
        assert_eq!(entry.player_name, "Al");
        assert_eq!(entry.cash.value(), dec!(5000));
        assert_eq!(reg.leaderboard().len(), 1);

        reg.handle_text(a, r#"{"type":"claim_leaderboard"}"#, t(2));
        let out = reg.drain_outgoing();
        assert_eq!(kinds(&out, a), vec!["leaderboard_submitted"]);
        assert_eq!(reg.leaderboard().len(), 1);
    }

    #[test]
    fn claim_without_any_backend_is_refused() {
        let mut reg = RoomRegistry::new(Arc::new(GameConfig {
            allow_memory_leaderboard: false,
            ..GameConfig::test()
        }));
        let a = joined(&mut reg, 1, "pit", "alice");
        reg.drain_outgoing();
        reg.handle_text(a, r#"{"type":"claim_leaderboard"}"#, t(1));
        assert_eq!(errors(&reg.drain_outgoing(), a), vec!["Leaderboard service unavailable."]);
    }

    #[test]
    fn http_claim_after_session_end() {
        let mut reg = registry();
        let a = joined(&mut reg, 1, "pit", "alice");
        reg.handle_text(a, r#"{"type":"set_ready","ready":true}"#, t(1));
        reg.handle_text(a, r#"{"type":"start_countdown"}"#, t(1));
        let room_id = RoomId::new("pit");
        let start = reg.room(&room_id).unwrap().countdown_ends_at().unwrap();
        reg.tick(start);
        let end = reg.room(&room_id).unwrap().ends_at().unwrap();
        reg.tick(end);
        assert_eq!(reg.room(&room_id).unwrap().status(), SessionStatus::Ended);
        assert!(reg.ranker().recent_result(&ClientId::new("alice")).is_some());

        assert_eq!(reg.submit_claim(1, "ghost", None, end), Some(Err(LeaderboardError::NotFound)));
        let entry = reg.submit_claim(2, "alice", Some("Ally"), end).unwrap().unwrap();
        assert_eq!(entry.player_name, "Ally");
        assert_eq!(
            reg.submit_claim(3, "alice", None, end),
            Some(Err(LeaderboardError::AlreadySubmitted))
        );
        assert!(reg.room(&room_id).unwrap().players()[0].leaderboard_submitted);
    }

    #[test]
    fn store_claims_answer_later() {
        let mut reg = registry();
        reg.set_store_status(StoreStatus {
            durable: true,
            healthy: true,
            last_error: None,
        });
        let a = joined(&mut reg, 1, "pit", "alice");
        reg.drain_tasks();
        reg.drain_outgoing();

        reg.handle_text(a, r#"{"type":"claim_leaderboard"}"#, t(1));
        let ticket = match reg.drain_tasks().pop() {
            Some(StoreTask::InsertEntry(ticket)) => ticket,
            other => panic!("expected an insert, got {other:?}"),
        };
        assert_eq!(ticket.origin, ClaimOrigin::Room(a));

        reg.handle_outcome(
            StoreOutcome::EntryInserted {
                ticket: ticket.clone(),
                entry: None,
            },
            t(2),
        );
        // store write failed, memory fallback is on
        assert_eq!(reg.leaderboard().len(), 1);
        assert!(kinds(&reg.drain_outgoing(), a).contains(&"leaderboard_submitted"));
    }

    #[test]
    fn leaderboard_refresh_respects_memory_fallback() {
        let mut reg = RoomRegistry::new(Arc::new(GameConfig {
            allow_memory_leaderboard: false,
            ..GameConfig::test()
        }));
        let a = joined(&mut reg, 1, "pit", "alice");
        reg.ranker.insert_memory(
            crate::leaderboard::NewLeaderboardEntry {
                session_id: None,
                room_id: RoomId::new("pit"),
                player_name: "x".into(),
                role: "Monk".into(),
                cash: crate::types::Quote::new(dec!(1)),
                peak_cash: crate::types::Quote::new(dec!(1)),
                roi: dec!(0),
                days_survived: 1,
            },
            t(0),
        );
        reg.drain_outgoing();

        reg.handle_outcome(StoreOutcome::LeaderboardFetched(None), t(1));
        assert!(reg.leaderboard().is_empty());
        assert_eq!(kinds(&reg.drain_outgoing(), a), vec!["leaderboard"]);
    }
}
