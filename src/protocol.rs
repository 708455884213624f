// 9.0: wire protocol. one JSON object per message, tagged by `type`. inbound text is parsed in
// two steps so a broken payload and a well-formed but unknown message get different errors.
// also home to the sanitizers every piece of client text passes through.

use crate::chat::ChatMessage;
use crate::leaderboard::LeaderboardEntry;
use crate::market::MarketState;
use crate::pack::{EventPackInput, EventPackSummary, MarketEvent, PersonalEvent};
use crate::player::{PlayerState, PlayerStatus, RoleKey};
use crate::position::Position;
use crate::respawn::RespawnNotice;
use crate::types::{ClientId, Quote, RoomId, Side, Timestamp};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

pub const MAX_NAME_CHARS: usize = 16;
pub const MAX_ROOM_ID_CHARS: usize = 32;
pub const MAX_ROOM_NAME_CHARS: usize = 24;
pub const MAX_ROOM_KEY_CHARS: usize = 32;
pub const MAX_CHAT_CHARS: usize = 240;
pub const MAX_CLIENT_ID_CHARS: usize = 36;

const DEFAULT_NAME: &str = "Guest";
const DEFAULT_ROOM_ID: &str = "public";
const DEFAULT_ROOM_NAME: &str = "Room";

// 9.1: inbound

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TradeAction {
    Open,
    Close,
}

/// Numbers are optional and clamped by the engine, never rejected here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TradeRequest {
    pub action: TradeAction,
    #[serde(default)]
    pub side: Option<Side>,
    #[serde(default)]
    pub leverage: Option<Decimal>,
    #[serde(default)]
    pub size_percent: Option<Decimal>,
    #[serde(default)]
    pub size_cash: Option<Decimal>,
    #[serde(default)]
    pub take_profit_pct: Option<Decimal>,
    #[serde(default)]
    pub stop_loss_pct: Option<Decimal>,
}

impl TradeRequest {
    pub fn open(side: Side) -> Self {
        Self {
            action: TradeAction::Open,
            side: Some(side),
            leverage: None,
            size_percent: None,
            size_cash: None,
            take_profit_pct: None,
            stop_loss_pct: None,
        }
    }

    pub fn close() -> Self {
        Self {
            action: TradeAction::Close,
            ..Self::open(Side::Long)
        }
    }

    pub fn side(&self) -> Side {
        self.side.unwrap_or(Side::Long)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    #[serde(rename_all = "camelCase")]
    Join {
        #[serde(default)]
        room_id: String,
        #[serde(default)]
        room_name: Option<String>,
        #[serde(default)]
        player_name: String,
        #[serde(default)]
        role_key: Option<String>,
        #[serde(default)]
        pack_id: Option<String>,
        #[serde(default)]
        room_key: Option<String>,
        #[serde(default)]
        max_players: Option<i64>,
        #[serde(default)]
        client_id: Option<String>,
    },
    ListRooms,
    Chat {
        text: String,
    },
    Trade {
        trade: TradeRequest,
    },
    #[serde(rename_all = "camelCase")]
    EventChoice {
        event_id: String,
        choice_id: String,
    },
    SetReady {
        ready: bool,
    },
    StartCountdown,
    #[serde(rename_all = "camelCase")]
    KickPlayer {
        player_id: String,
    },
    #[serde(rename_all = "camelCase")]
    SetPack {
        pack_id: String,
    },
    #[serde(rename_all = "camelCase")]
    SetRoomKey {
        #[serde(default)]
        room_key: Option<String>,
    },
    UpdateName {
        name: String,
    },
    ListPacks,
    #[serde(rename_all = "camelCase")]
    GetPack {
        pack_id: String,
    },
    CreatePack {
        pack: serde_json::Value,
    },
    #[serde(rename_all = "camelCase")]
    UpdatePack {
        pack_id: String,
        pack: serde_json::Value,
        #[serde(default)]
        edit_token: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    DeletePack {
        pack_id: String,
        #[serde(default)]
        edit_token: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    ClaimLeaderboard {
        #[serde(default)]
        player_name: Option<String>,
    },
    Ping,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    #[error("Invalid JSON payload.")]
    InvalidJson,

    #[error("Invalid message payload.")]
    InvalidMessage,
}

/// Text first, shape second.
pub fn parse_client_message(text: &str) -> Result<ClientMessage, ProtocolError> {
    let value: serde_json::Value = serde_json::from_str(text).map_err(|_| ProtocolError::InvalidJson)?;
    serde_json::from_value(value).map_err(|_| ProtocolError::InvalidMessage)
}

// 9.2: snapshots

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SessionStatus {
    Lobby,
    Countdown,
    Live,
    Ended,
}

impl SessionStatus {
    /// Room list ordering.
    pub fn rank(&self) -> u8 {
        match self {
            SessionStatus::Lobby => 0,
            SessionStatus::Countdown => 1,
            SessionStatus::Live => 2,
            SessionStatus::Ended => 3,
        }
    }

    pub fn is_joinable(&self) -> bool {
        matches!(self, SessionStatus::Lobby | SessionStatus::Countdown)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub status: SessionStatus,
    pub countdown_ends_at: Option<Timestamp>,
    pub pause_ends_at: Option<Timestamp>,
    pub started_at: Option<Timestamp>,
    pub ends_at: Option<Timestamp>,
    pub duration_ms: i64,
    pub tick_interval_ms: i64,
    pub current_day: u32,
    pub elapsed_ms: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerSummary {
    pub id: ClientId,
    pub name: String,
    pub handle: Option<String>,
    pub avatar_url: Option<String>,
    pub role_key: RoleKey,
    pub role: String,
    pub initial_cash: Quote,
    pub cash: Quote,
    pub stress: Decimal,
    pub status: PlayerStatus,
    pub position: Option<Position>,
    pub ready: bool,
    pub is_host: bool,
    pub online: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomListItem {
    pub room_id: RoomId,
    pub display_name: String,
    pub status: SessionStatus,
    pub player_count: usize,
    pub max_players: usize,
    pub pack_name: Option<String>,
    pub host_name: Option<String>,
    pub is_locked: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomSnapshot {
    pub room_id: RoomId,
    pub display_name: String,
    pub max_players: usize,
    pub host_id: Option<ClientId>,
    pub self_id: ClientId,
    #[serde(rename = "self")]
    pub self_state: Option<PlayerState>,
    pub players: Vec<PlayerSummary>,
    pub is_locked: bool,
    pub market: MarketState,
    pub chat: Vec<ChatMessage>,
    pub session: SessionSnapshot,
    pub leaderboard: Vec<LeaderboardEntry>,
    pub pack: EventPackSummary,
}

// 9.3: outbound

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    #[serde(rename_all = "camelCase")]
    Connected {
        client_id: ClientId,
        room_id: RoomId,
        is_host: bool,
    },
    RoomState {
        room: Box<RoomSnapshot>,
    },
    Rooms {
        rooms: Vec<RoomListItem>,
    },
    SessionStatus {
        session: SessionSnapshot,
    },
    #[serde(rename_all = "camelCase")]
    Presence {
        players: Vec<PlayerSummary>,
        host_id: Option<ClientId>,
    },
    MarketTick {
        market: MarketState,
    },
    SelfState {
        state: PlayerState,
    },
    #[serde(rename_all = "camelCase")]
    PersonalEvent {
        event: PersonalEvent,
        expires_at: Timestamp,
    },
    MarketEvent {
        event: MarketEvent,
    },
    Chat {
        message: ChatMessage,
    },
    Leaderboard {
        entries: Vec<LeaderboardEntry>,
    },
    RespawnNotice(RespawnNotice),
    Packs {
        packs: Vec<EventPackSummary>,
    },
    #[serde(rename_all = "camelCase")]
    PackCreated {
        pack: EventPackSummary,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        edit_token: Option<String>,
    },
    PackUpdated {
        pack: EventPackSummary,
    },
    #[serde(rename_all = "camelCase")]
    PackDeleted {
        pack_id: String,
    },
    #[serde(rename_all = "camelCase")]
    PackDetail {
        pack_id: String,
        pack: EventPackInput,
    },
    GameOver {
        result: PlayerState,
    },
    LeaderboardSubmitted {
        entry: LeaderboardEntry,
    },
    Pong,
    Error {
        message: String,
    },
}

impl ServerMessage {
    pub fn error(message: impl Into<String>) -> Self {
        ServerMessage::Error {
            message: message.into(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ServerMessage::Connected { .. } => "connected",
            ServerMessage::RoomState { .. } => "room_state",
            ServerMessage::Rooms { .. } => "rooms",
            ServerMessage::SessionStatus { .. } => "session_status",
            ServerMessage::Presence { .. } => "presence",
            ServerMessage::MarketTick { .. } => "market_tick",
            ServerMessage::SelfState { .. } => "self_state",
            ServerMessage::PersonalEvent { .. } => "personal_event",
            ServerMessage::MarketEvent { .. } => "market_event",
            ServerMessage::Chat { .. } => "chat",
            ServerMessage::Leaderboard { .. } => "leaderboard",
            ServerMessage::RespawnNotice(_) => "respawn_notice",
            ServerMessage::Packs { .. } => "packs",
            ServerMessage::PackCreated { .. } => "pack_created",
            ServerMessage::PackUpdated { .. } => "pack_updated",
            ServerMessage::PackDeleted { .. } => "pack_deleted",
            ServerMessage::PackDetail { .. } => "pack_detail",
            ServerMessage::GameOver { .. } => "game_over",
            ServerMessage::LeaderboardSubmitted { .. } => "leaderboard_submitted",
            ServerMessage::Pong => "pong",
            ServerMessage::Error { .. } => "error",
        }
    }
}

// 9.4: sanitizers

fn truncate_chars(value: &str, max: usize) -> String {
    value.chars().take(max).collect()
}

/// Runs of whitespace other than line breaks become one space.
fn collapse_spaces(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut in_run = false;
    for ch in value.chars() {
        if ch.is_whitespace() && ch != '\n' && ch != '\r' {
            if !in_run {
                out.push(' ');
            }
            in_run = true;
        } else {
            out.push(ch);
            in_run = false;
        }
    }
    out
}

pub fn sanitize_name(value: &str) -> String {
    let cleaned = collapse_spaces(&truncate_chars(value.trim(), MAX_NAME_CHARS));
    if cleaned.is_empty() {
        DEFAULT_NAME.to_string()
    } else {
        cleaned
    }
}

pub fn sanitize_room_id(value: &str) -> RoomId {
    let cleaned: String = value
        .trim()
        .to_lowercase()
        .chars()
        .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || *c == '_' || *c == '-')
        .take(MAX_ROOM_ID_CHARS)
        .collect();
    if cleaned.is_empty() {
        RoomId::new(DEFAULT_ROOM_ID)
    } else {
        RoomId::new(cleaned)
    }
}

pub fn sanitize_room_name(value: Option<&str>, fallback: Option<&str>) -> String {
    let flattened: String = value
        .unwrap_or("")
        .trim()
        .chars()
        .map(|c| if matches!(c, '\t' | '\n' | '\r') { ' ' } else { c })
        .collect();
    let capped = truncate_chars(&collapse_spaces(&flattened), MAX_ROOM_NAME_CHARS);
    if !capped.is_empty() {
        return capped;
    }
    match fallback {
        Some(name) if !name.is_empty() => name.to_string(),
        _ => DEFAULT_ROOM_NAME.to_string(),
    }
}

/// Empty means "no key".
pub fn sanitize_room_key(value: Option<&str>) -> String {
    truncate_chars(value.unwrap_or("").trim(), MAX_ROOM_KEY_CHARS)
}

pub fn sanitize_chat(value: &str) -> String {
    collapse_spaces(&truncate_chars(value.trim(), MAX_CHAT_CHARS))
}

pub fn sanitize_client_id(value: &str) -> ClientId {
    let cleaned: String = value
        .trim()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_' || *c == '-')
        .take(MAX_CLIENT_ID_CHARS)
        .collect();
    if cleaned.is_empty() {
        ClientId::new(Uuid::new_v4().to_string())
    } else {
        ClientId::new(cleaned)
    }
}

pub fn hash_room_key(key: &str) -> String {
    format!("{:x}", Sha256::digest(key.as_bytes()))
}
