//! Lobby and session lifecycle: joins, readiness, host actions, session start and end, claims.

use super::config::JoinRequest;
use super::core::Room;
use super::results::{ClaimDraft, RoomError};
use crate::chat::{ChatKind, ChatMessage};
use crate::events::{Dispatch, PackPurpose, StoreTask};
use crate::leaderboard::{roi_pct, round_money, LeaderboardEntry, NewLeaderboardEntry, SessionResult};
use crate::market::MarketState;
use crate::pack::EventPack;
use crate::player::{EndReason, PlayerRuntime, PlayerStatus};
use crate::protocol::{
    hash_room_key, sanitize_chat, sanitize_client_id, sanitize_name, sanitize_room_key, sanitize_room_name,
    ServerMessage, SessionStatus,
};
use crate::scheduler::schedule_personal_event;
use crate::types::{ClientId, Timestamp};
use tracing::{debug, info};

const GUEST_SENDER: &str = "Guest";

impl Room {
    fn require_host(&self, client_id: &ClientId) -> Result<(), RoomError> {
        if self.is_host(client_id) {
            Ok(())
        } else {
            Err(RoomError::NotHost)
        }
    }

    fn require_lobby(&self) -> Result<(), RoomError> {
        if self.status == SessionStatus::Lobby {
            Ok(())
        } else {
            Err(RoomError::WrongStatus)
        }
    }

    fn host_room_name(name: &str) -> String {
        format!("{name}'s Room")
    }

    // 8.2: joining. rejections leave the room untouched. a seated client may resume during LIVE
    pub fn admit(&mut self, join: JoinRequest, now: Timestamp) -> Result<(), RoomError> {
        let resuming = self.status == SessionStatus::Live && self.player(&join.client_id).is_some();
        if !self.status.is_joinable() && !resuming {
            return Err(RoomError::AlreadyStarted);
        }

        if self.is_host(&join.client_id) && self.status == SessionStatus::Lobby {
            self.display_name = sanitize_room_name(join.room_name.as_deref(), Some(self.id.as_str()));
        }

        if let Some(expected) = &self.key_hash {
            if join.room_key.is_empty() || hash_room_key(&join.room_key) != *expected {
                return Err(RoomError::KeyRequired);
            }
        }

        match self.players.iter().position(|p| p.id() == &join.client_id) {
            Some(index) => {
                let player = &mut self.players[index];
                player.state.name = join.name.clone();
                player.online = true;
            }
            None => {
                if self.online_count() >= self.max_players {
                    return Err(RoomError::Full);
                }
                let mut player = PlayerRuntime::new(join.client_id.clone(), join.name.clone(), join.role_key);
                schedule_personal_event(&mut player, &self.pack.settings, &mut self.rng, now);
                self.players.push(player);
            }
        }

        if self.host_id.is_none() {
            self.host_id = Some(join.client_id.clone());
            if self.display_name == self.id.as_str() {
                let fallback = Self::host_room_name(&join.name);
                self.display_name = sanitize_room_name(join.room_name.as_deref(), Some(&fallback));
            }
        }

        if self.status == SessionStatus::Countdown && !self.all_ready() {
            self.reset_countdown(now);
        }

        info!(room = %self.id, client = %join.client_id, "player joined");

        let is_host = self.is_host(&join.client_id);
        self.send_to(
            &join.client_id,
            ServerMessage::Connected {
                client_id: join.client_id.clone(),
                room_id: self.id.clone(),
                is_host,
            },
        );
        self.outbox.room_states();
        let entries = self.leaderboard.clone();
        self.send_to(&join.client_id, ServerMessage::Leaderboard { entries });
        self.broadcast_presence();
        self.outbox.room_list();
        Ok(())
    }

    /// Connection gone. Outside LIVE the player is dropped, during LIVE it stays as an offline seat.
    pub fn leave(&mut self, client_id: &ClientId, now: Timestamp) {
        self.set_online(client_id, false);
        if self.status != SessionStatus::Live {
            self.players.retain(|p| p.id() != client_id);
        }

        if self.is_host(client_id) {
            self.host_id = self.players.iter().find(|p| p.online).map(|p| p.id().clone());
            debug!(room = %self.id, host = ?self.host_id, "host handed off");
        }

        if self.status == SessionStatus::Countdown && !self.all_ready() {
            self.reset_countdown(now);
        }

        self.broadcast_presence();
        self.outbox.room_list();
    }

    // 8.3: lobby controls
    pub fn set_ready(&mut self, client_id: &ClientId, ready: bool, now: Timestamp) -> Result<(), RoomError> {
        if !self.status.is_joinable() {
            return Err(RoomError::WrongStatus);
        }
        let index = self.player_index(client_id)?;
        self.players[index].state.ready = ready;
        self.broadcast_presence();

        if self.status == SessionStatus::Countdown && !self.all_ready() {
            self.reset_countdown(now);
        }
        Ok(())
    }

    pub fn start_countdown(&mut self, client_id: &ClientId, now: Timestamp) -> Result<(), RoomError> {
        if !matches!(self.status, SessionStatus::Lobby | SessionStatus::Ended) {
            return Err(RoomError::WrongStatus);
        }
        self.require_host(client_id)?;
        if !self.all_ready() {
            return Err(RoomError::NotReady);
        }

        self.status = SessionStatus::Countdown;
        self.countdown_ends_at = Some(now.plus(self.config.countdown_ms));
        info!(room = %self.id, "countdown started");
        self.broadcast_session_status(now);
        self.outbox.room_list();
        Ok(())
    }

    pub fn kick(&mut self, client_id: &ClientId, target: &str, now: Timestamp) -> Result<(), RoomError> {
        self.require_host(client_id)?;
        if !self.status.is_joinable() {
            return Err(RoomError::WrongStatus);
        }
        let target = sanitize_client_id(target);
        if &target == client_id {
            return Err(RoomError::NoOp);
        }
        let index = self.player_index(&target)?;
        self.players.remove(index);
        info!(room = %self.id, target = %target, "player kicked");
        self.outbox.close(target);

        if self.status == SessionStatus::Countdown && !self.all_ready() {
            self.reset_countdown(now);
        }
        self.outbox.room_states();
        self.broadcast_presence();
        self.outbox.room_list();
        Ok(())
    }

    pub fn set_room_key(&mut self, client_id: &ClientId, raw_key: Option<&str>) -> Result<(), RoomError> {
        self.require_host(client_id)?;
        self.require_lobby()?;
        let key = sanitize_room_key(raw_key);
        self.key_hash = if key.is_empty() { None } else { Some(hash_room_key(&key)) };
        self.outbox.room_states();
        self.outbox.room_list();
        Ok(())
    }

    pub fn update_name(&mut self, client_id: &ClientId, raw_name: &str) -> Result<(), RoomError> {
        let index = self.player_index(client_id)?;
        let name = sanitize_name(raw_name);
        self.players[index].state.name = name.clone();

        if self.is_host(client_id) && self.status == SessionStatus::Lobby {
            let fallback = Self::host_room_name(&name);
            self.display_name = sanitize_room_name(Some(&self.display_name), Some(&fallback));
        }

        self.send_self_state(index);
        self.broadcast_presence();
        self.outbox.room_list();
        Ok(())
    }

    pub fn chat(&mut self, client_id: &ClientId, raw_text: &str, now: Timestamp) -> Result<(), RoomError> {
        if self.status == SessionStatus::Ended {
            return Err(RoomError::NoOp);
        }
        let text = sanitize_chat(raw_text);
        if text.is_empty() {
            return Err(RoomError::NoOp);
        }
        let sender = self
            .player(client_id)
            .map(|p| p.name().to_string())
            .unwrap_or_else(|| GUEST_SENDER.to_string());
        self.push_chat(ChatMessage::new(sender, text, ChatKind::Chat, now));
        Ok(())
    }

    // 8.4: packs. the registry loads the record, the room only checks and swaps
    pub fn check_set_pack(&self, client_id: &ClientId) -> Result<(), RoomError> {
        self.require_host(client_id)?;
        self.require_lobby()
    }

    pub fn apply_pack(
        &mut self,
        client_id: &ClientId,
        pack: EventPack,
        purpose: PackPurpose,
        now: Timestamp,
    ) -> Result<(), RoomError> {
        self.check_set_pack(client_id)?;
        info!(room = %self.id, pack = %pack.id, "pack selected");
        self.pack = pack;
        self.scheduler.schedule_market_event(&self.pack.settings, &mut self.rng, now);

        match purpose {
            PackPurpose::JoinPack => {
                self.scheduler.schedule_npc_chat(&mut self.rng, now);
            }
            _ => {
                for player in self.players.iter_mut() {
                    schedule_personal_event(player, &self.pack.settings, &mut self.rng, now);
                }
            }
        }

        self.outbox.room_states();
        self.outbox.room_list();
        Ok(())
    }

    // 8.5: session start. every seat is reset and re-armed from `now`
    pub fn start_session(&mut self, now: Timestamp) {
        self.status = SessionStatus::Live;
        self.started_at = Some(now);
        self.ends_at = Some(now.plus(self.config.session_duration_ms));
        self.countdown_ends_at = None;
        self.current_day = 1;
        self.session_id = None;
        self.market = MarketState::generate(&mut self.rng, now);
        self.scheduler.reset();
        self.scheduler.schedule_market_event(&self.pack.settings, &mut self.rng, now);
        self.scheduler.schedule_npc_chat(&mut self.rng, now);

        for index in 0..self.players.len() {
            let player = &mut self.players[index];
            player.reset_for_session();
            schedule_personal_event(player, &self.pack.settings, &mut self.rng, now);
            self.send_self_state(index);
        }

        info!(room = %self.id, players = self.players.len(), "session started");
        self.outbox.store(StoreTask::CreateSession {
            room_id: self.id.clone(),
            started_at: now,
            pack_id: self.pack.id.clone(),
        });
        self.broadcast_session_status(now);
        self.outbox.room_list();
    }

    /// Durable session id arrived. Dropped if the room moved on to another session meanwhile.
    pub fn attach_session_id(&mut self, started_at: Timestamp, session_id: String) {
        if self.status == SessionStatus::Live && self.started_at == Some(started_at) {
            self.session_id = Some(session_id);
        }
    }

    // 8.6: session end. idempotent once ENDED
    pub fn end_session(&mut self, now: Timestamp) {
        if self.status == SessionStatus::Ended {
            return;
        }
        self.status = SessionStatus::Ended;
        self.ends_at = Some(now);

        let session_key = self.session_key();
        let mut results = Vec::with_capacity(self.players.len());
        for index in 0..self.players.len() {
            self.force_close(index, now);

            let player = &mut self.players[index];
            if player.is_active() {
                player.state.status = PlayerStatus::Finished;
                player.state.end_reason = Some(EndReason::Time);
            }
            let cash = player.state.cash;
            player.peak_cash = player.peak_cash.max(cash);

            results.push(SessionResult {
                client_id: player.id().clone(),
                session_id: self.session_id.clone(),
                session_key: session_key.clone(),
                room_id: self.id.clone(),
                player_name: player.name().to_string(),
                role: player.state.role.clone(),
                cash: round_money(cash),
                peak_cash: round_money(player.peak_cash),
                roi: roi_pct(player.state.initial_cash, cash),
                days_survived: self.current_day,
                captured_at: now,
            });

            let message = ServerMessage::GameOver {
                result: player.state.clone(),
            };
            let id = player.id().clone();
            self.send_to(&id, message);
        }

        info!(room = %self.id, session = %session_key, "session ended");
        self.outbox.push(Dispatch::SessionResults(results));
        if let Some(session_id) = self.session_id.clone() {
            self.outbox.store(StoreTask::EndSession { session_id, ended_at: now });
        }
        self.outbox.store(StoreTask::RefreshLeaderboard);
        self.broadcast_session_status(now);
        self.outbox.room_list();
    }

    // 8.7: leaderboard claims, priced at the current mark
    pub fn claim_entry(&self, client_id: &ClientId, name_override: Option<&str>) -> Result<ClaimDraft, RoomError> {
        let player = self.player(client_id).ok_or(RoomError::UnknownPlayer)?;
        let price = self.market.price;
        let cash = player.net_worth(price);
        let peak_cash = player.peak_cash.max(cash);
        let player_name = match name_override {
            Some(name) => sanitize_name(name),
            None => player.name().to_string(),
        };

        Ok(ClaimDraft {
            session_key: self.session_key(),
            entry: NewLeaderboardEntry {
                session_id: self.session_id.clone(),
                room_id: self.id.clone(),
                player_name,
                role: player.state.role.clone(),
                cash: round_money(cash),
                peak_cash: round_money(peak_cash),
                roi: roi_pct(player.state.initial_cash, cash),
                days_survived: self.current_day,
            },
        })
    }

    pub fn record_claim(&mut self, client_id: &ClientId, entry: LeaderboardEntry) {
        if let Some(player) = self.player_mut(client_id) {
            player.leaderboard_submitted = true;
            player.last_leaderboard_entry = Some(entry);
        }
    }

    pub fn last_claim(&self, client_id: &ClientId) -> Option<&LeaderboardEntry> {
        self.player(client_id)?.last_leaderboard_entry.as_ref()
    }
}
