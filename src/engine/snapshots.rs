//! Read-only views of a room for the wire.

use super::core::Room;
use crate::player::PlayerRuntime;
use crate::protocol::{PlayerSummary, RoomListItem, RoomSnapshot, ServerMessage, SessionSnapshot};
use crate::types::{ClientId, Timestamp};

impl Room {
    pub fn session_snapshot(&self, now: Timestamp) -> SessionSnapshot {
        SessionSnapshot {
            status: self.status,
            countdown_ends_at: self.countdown_ends_at,
            pause_ends_at: self.scheduler.pause_ends_at,
            started_at: self.started_at,
            ends_at: self.ends_at,
            duration_ms: self.config.session_duration_ms,
            tick_interval_ms: self.config.tick_interval_ms,
            current_day: self.current_day,
            elapsed_ms: self.started_at.map_or(0, |started| now.since(started)),
        }
    }

    pub fn player_summary(&self, player: &PlayerRuntime) -> PlayerSummary {
        PlayerSummary {
            id: player.id().clone(),
            name: player.name().to_string(),
            handle: None,
            avatar_url: None,
            role_key: player.state.role_key,
            role: player.state.role.clone(),
            initial_cash: player.state.initial_cash,
            cash: player.state.cash,
            stress: player.state.stress,
            status: player.state.status,
            position: player.state.position.clone(),
            ready: player.state.ready,
            is_host: self.is_host(player.id()),
            online: player.online,
        }
    }

    pub fn presence(&self) -> ServerMessage {
        ServerMessage::Presence {
            players: self.players.iter().map(|p| self.player_summary(p)).collect(),
            host_id: self.host_id.clone(),
        }
    }

    /// Full room view as one client sees it.
    pub fn snapshot_for(&self, client_id: &ClientId, now: Timestamp) -> RoomSnapshot {
        RoomSnapshot {
            room_id: self.id.clone(),
            display_name: self.display_name.clone(),
            max_players: self.max_players,
            host_id: self.host_id.clone(),
            self_id: client_id.clone(),
            self_state: self.player(client_id).map(|p| p.state.clone()),
            players: self.players.iter().map(|p| self.player_summary(p)).collect(),
            is_locked: self.is_locked(),
            market: self.market.clone(),
            chat: self.chat.to_vec(),
            session: self.session_snapshot(now),
            leaderboard: self.leaderboard.clone(),
            pack: self.pack.summary(None),
        }
    }

    pub fn list_item(&self) -> RoomListItem {
        RoomListItem {
            room_id: self.id.clone(),
            display_name: self.display_name.clone(),
            status: self.status,
            player_count: self.online_count(),
            max_players: self.max_players,
            pack_name: Some(self.pack.name.clone()),
            host_name: self
                .host_id
                .as_ref()
                .and_then(|id| self.player(id))
                .map(|p| p.name().to_string()),
            is_locked: self.is_locked(),
        }
    }
}
