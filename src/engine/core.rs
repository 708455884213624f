// 8.0 engine/core.rs: one room. players, market, timers, chat and the session clock all live here.

use super::config::RoomOptions;
use super::results::RoomError;
use crate::chat::{ChatLog, ChatMessage};
use crate::config::GameConfig;
use crate::events::{Dispatch, Outbox};
use crate::leaderboard::{session_key, LeaderboardEntry};
use crate::market::MarketState;
use crate::pack::{core_pack, EventPack};
use crate::player::PlayerRuntime;
use crate::protocol::{ServerMessage, SessionStatus};
use crate::respawn::RespawnPolicy;
use crate::scheduler::EventScheduler;
use crate::simulator::MarketSimulator;
use crate::types::{ClientId, RoomId, Timestamp};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::sync::Arc;

/** 8.1: room struct. all state for one simulated game lives here */
#[derive(Debug)]
pub struct Room {
    pub(super) id: RoomId,
    pub(super) display_name: String,
    pub(super) max_players: usize,
    pub(super) key_hash: Option<String>,
    pub(super) host_id: Option<ClientId>,
    // join order, host hand-off walks it front to back
    pub(super) players: Vec<PlayerRuntime>,
    pub(super) status: SessionStatus,
    pub(super) countdown_ends_at: Option<Timestamp>,
    pub(super) started_at: Option<Timestamp>,
    pub(super) ends_at: Option<Timestamp>,
    pub(super) current_day: u32,
    pub(super) session_id: Option<String>,
    pub(super) created_at: Timestamp,
    pub(super) market: MarketState,
    pub(super) simulator: MarketSimulator,
    pub(super) scheduler: EventScheduler,
    pub(super) chat: ChatLog,
    pub(super) leaderboard: Vec<LeaderboardEntry>,
    pub(super) pack: EventPack,
    pub(super) respawn: RespawnPolicy,
    pub(super) config: Arc<GameConfig>,
    pub(super) rng: StdRng,
    pub(super) outbox: Outbox,
}

impl Room {
    pub fn new(id: RoomId, options: RoomOptions, config: Arc<GameConfig>, now: Timestamp) -> Self {
        let mut rng = match options.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let pack = core_pack().clone();
        let market = MarketState::generate(&mut rng, now);
        let scheduler = EventScheduler::new(
            &pack.settings,
            (config.npc_chat_min_ms, config.npc_chat_max_ms),
            config.recent_market_events,
            &mut rng,
            now,
        );
        let display_name = if options.display_name.is_empty() {
            id.to_string()
        } else {
            options.display_name
        };

        Self {
            id,
            display_name,
            max_players: options.max_players.max(1),
            key_hash: options.key_hash,
            host_id: None,
            players: Vec::new(),
            status: SessionStatus::Lobby,
            countdown_ends_at: None,
            started_at: None,
            ends_at: None,
            current_day: 1,
            session_id: None,
            created_at: now,
            market,
            simulator: MarketSimulator::new(config.max_candles),
            scheduler,
            chat: ChatLog::new(config.max_chat_history),
            leaderboard: Vec::new(),
            pack,
            respawn: RespawnPolicy::new(config.respawn_base_pct, config.respawn_pause_ms),
            config,
            rng,
            outbox: Outbox::new(),
        }
    }

    pub fn id(&self) -> &RoomId {
        &self.id
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub fn max_players(&self) -> usize {
        self.max_players
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    pub fn host_id(&self) -> Option<&ClientId> {
        self.host_id.as_ref()
    }

    pub fn is_host(&self, client_id: &ClientId) -> bool {
        self.host_id.as_ref() == Some(client_id)
    }

    pub fn is_locked(&self) -> bool {
        self.key_hash.is_some()
    }

    pub fn players(&self) -> &[PlayerRuntime] {
        &self.players
    }

    pub fn player(&self, client_id: &ClientId) -> Option<&PlayerRuntime> {
        self.players.iter().find(|p| p.id() == client_id)
    }

    pub fn player_mut(&mut self, client_id: &ClientId) -> Option<&mut PlayerRuntime> {
        self.players.iter_mut().find(|p| p.id() == client_id)
    }

    pub(super) fn player_index(&self, client_id: &ClientId) -> Result<usize, RoomError> {
        self.players
            .iter()
            .position(|p| p.id() == client_id)
            .ok_or(RoomError::UnknownPlayer)
    }

    pub fn online_count(&self) -> usize {
        self.players.iter().filter(|p| p.online).count()
    }

    pub fn has_online_players(&self) -> bool {
        self.players.iter().any(|p| p.online)
    }

    pub fn market(&self) -> &MarketState {
        &self.market
    }

    pub fn pack(&self) -> &EventPack {
        &self.pack
    }

    pub fn scheduler(&self) -> &EventScheduler {
        &self.scheduler
    }

    pub fn current_day(&self) -> u32 {
        self.current_day
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    pub fn started_at(&self) -> Option<Timestamp> {
        self.started_at
    }

    pub fn countdown_ends_at(&self) -> Option<Timestamp> {
        self.countdown_ends_at
    }

    pub fn ends_at(&self) -> Option<Timestamp> {
        self.ends_at
    }

    pub fn chat_log(&self) -> &ChatLog {
        &self.chat
    }

    pub fn config(&self) -> &GameConfig {
        &self.config
    }

    /// Durable session id, else `{room}-{started}` (creation time before the first start).
    pub fn session_key(&self) -> String {
        session_key(
            self.session_id.as_deref(),
            &self.id,
            self.started_at.unwrap_or(self.created_at),
        )
    }

    /// Everyone present has readied up. An empty room is never ready.
    pub fn all_ready(&self) -> bool {
        !self.players.is_empty() && self.players.iter().all(|p| p.state.ready)
    }

    pub fn set_online(&mut self, client_id: &ClientId, online: bool) {
        if let Some(player) = self.player_mut(client_id) {
            player.online = online;
        }
    }

    pub fn set_leaderboard(&mut self, entries: Vec<LeaderboardEntry>) {
        self.leaderboard = entries;
    }

    pub fn leaderboard(&self) -> &[LeaderboardEntry] {
        &self.leaderboard
    }

    pub fn outbox(&self) -> &Outbox {
        &self.outbox
    }

    pub fn take_dispatches(&mut self) -> Vec<Dispatch> {
        self.outbox.drain()
    }

    // 8.1.1: emit helpers
    pub(super) fn broadcast(&mut self, message: ServerMessage) {
        self.outbox.to_room(message);
    }

    pub(super) fn send_to(&mut self, client_id: &ClientId, message: ServerMessage) {
        self.outbox.to_client(client_id, message);
    }

    pub(super) fn send_self_state(&mut self, index: usize) {
        let player = &self.players[index];
        let message = ServerMessage::SelfState {
            state: player.state.clone(),
        };
        let id = player.id().clone();
        self.outbox.to_client(&id, message);
    }

    pub(super) fn push_chat(&mut self, message: ChatMessage) {
        self.chat.push(message.clone());
        self.broadcast(ServerMessage::Chat { message });
    }

    pub(super) fn system_chat(&mut self, text: String, now: Timestamp) {
        self.push_chat(ChatMessage::system(text, now));
    }

    pub(super) fn broadcast_session_status(&mut self, now: Timestamp) {
        let session = self.session_snapshot(now);
        self.broadcast(ServerMessage::SessionStatus { session });
    }

    pub(super) fn broadcast_presence(&mut self) {
        let message = self.presence();
        self.broadcast(message);
    }

    /// COUNTDOWN falls back to LOBBY once readiness breaks.
    pub(super) fn reset_countdown(&mut self, now: Timestamp) {
        if self.status != SessionStatus::Countdown {
            return;
        }
        self.status = SessionStatus::Lobby;
        self.countdown_ends_at = None;
        self.broadcast_session_status(now);
        self.outbox.room_list();
    }
}
