//! Player state and per-session runtime bookkeeping.
//!
//! `PlayerState` is the public view sent to clients. `PlayerRuntime` wraps it with the
//! server-only counters: peak net worth, pending event, timers, respawns.

use crate::leaderboard::LeaderboardEntry;
use crate::pack::{PersonalEvent, PlayerEffect};
use crate::position::Position;
use crate::types::{ClientId, Price, Quote, Side, Timestamp};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

const MAX_TRADE_HISTORY: usize = 100;
const ROLE_STARTING_CASH: Decimal = dec!(5000);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PlayerStatus {
    Active,
    Eliminated,
    Finished,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EndReason {
    Broke,
    Dead,
    Time,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TradeKind {
    Open,
    Close,
    Liquidation,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeHistoryItem {
    #[serde(rename = "type")]
    pub kind: TradeKind,
    pub side: Side,
    pub price: Price,
    pub time: Timestamp,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pnl: Option<Quote>,
}

// 4.1: roles. all start with the same stake, the key only changes flavor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RoleKey {
    Worker,
    Student,
    CollegeBoy,
    Og,
    Noob,
    Monk,
    LeverageKid,
    KolStar,
    KolHype,
    LastChance,
    Simp,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Role {
    pub key: RoleKey,
    pub name: &'static str,
    pub initial_cash: Decimal,
}

impl RoleKey {
    pub const ALL: [RoleKey; 11] = [
        RoleKey::Worker,
        RoleKey::Student,
        RoleKey::CollegeBoy,
        RoleKey::Og,
        RoleKey::Noob,
        RoleKey::Monk,
        RoleKey::LeverageKid,
        RoleKey::KolStar,
        RoleKey::KolHype,
        RoleKey::LastChance,
        RoleKey::Simp,
    ];

    /// Unknown or missing keys become WORKER.
    pub fn parse_or_default(raw: Option<&str>) -> Self {
        raw.and_then(|raw| serde_json::from_value(serde_json::Value::String(raw.trim().to_uppercase())).ok())
            .unwrap_or(RoleKey::Worker)
    }

    pub fn role(&self) -> Role {
        let name = match self {
            RoleKey::Worker => "Office Worker",
            RoleKey::Student => "Student",
            RoleKey::CollegeBoy => "College Boy",
            RoleKey::Og => "OG",
            RoleKey::Noob => "Noob",
            RoleKey::Monk => "Monk",
            RoleKey::LeverageKid => "Leverage Kid",
            RoleKey::KolStar => "KOL Star",
            RoleKey::KolHype => "KOL Hype",
            RoleKey::LastChance => "Last Chance",
            RoleKey::Simp => "Simp",
        };
        Role {
            key: *self,
            name,
            initial_cash: ROLE_STARTING_CASH,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerState {
    pub id: ClientId,
    pub name: String,
    pub role_key: RoleKey,
    pub role: String,
    pub initial_cash: Quote,
    pub cash: Quote,
    pub stress: Decimal,
    pub history: Vec<TradeHistoryItem>,
    pub position: Option<Position>,
    pub status: PlayerStatus,
    pub ready: bool,
    pub end_reason: Option<EndReason>,
}

/// A personal event waiting on the player's decision.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingEvent {
    pub event: PersonalEvent,
    pub expires_at: Timestamp,
}

// 4.2: server-side wrapper. never sent as-is
#[derive(Debug, Clone)]
pub struct PlayerRuntime {
    pub state: PlayerState,
    pub base_cash: Quote,
    pub peak_cash: Quote,
    pub pending_event: Option<PendingEvent>,
    pub recent_personal_events: VecDeque<String>,
    pub next_personal_event_at: Option<Timestamp>,
    pub last_expense_day: u32,
    pub respawns: u32,
    pub respawn_cooldown_ends_at: Option<Timestamp>,
    pub online: bool,
    pub leaderboard_submitted: bool,
    pub last_leaderboard_entry: Option<LeaderboardEntry>,
}

impl PlayerRuntime {
    pub fn new(id: ClientId, name: String, role_key: RoleKey) -> Self {
        let role = role_key.role();
        let cash = Quote::new(role.initial_cash);
        Self {
            state: PlayerState {
                id,
                name,
                role_key,
                role: role.name.to_string(),
                initial_cash: cash,
                cash,
                stress: Decimal::ZERO,
                history: Vec::new(),
                position: None,
                status: PlayerStatus::Active,
                ready: false,
                end_reason: None,
            },
            base_cash: cash,
            peak_cash: cash,
            pending_event: None,
            recent_personal_events: VecDeque::new(),
            next_personal_event_at: None,
            last_expense_day: 1,
            respawns: 0,
            respawn_cooldown_ends_at: None,
            online: true,
            leaderboard_submitted: false,
            last_leaderboard_entry: None,
        }
    }

    pub fn id(&self) -> &ClientId {
        &self.state.id
    }

    pub fn name(&self) -> &str {
        &self.state.name
    }

    pub fn is_active(&self) -> bool {
        self.state.status == PlayerStatus::Active
    }

    pub fn in_respawn_cooldown(&self, now: Timestamp) -> bool {
        self.respawn_cooldown_ends_at.is_some_and(|ends| now < ends)
    }

    /// cash + margin + unrealized pnl
    pub fn net_worth(&self, price: Price) -> Quote {
        match &self.state.position {
            Some(position) => self.state.cash.add(position.equity(price)),
            None => self.state.cash,
        }
    }

    pub fn update_peak(&mut self, price: Price) {
        let worth = self.net_worth(price);
        if worth > self.peak_cash {
            self.peak_cash = worth;
        }
    }

    // 4.3: cash mutations. every path floors at zero
    pub fn credit(&mut self, amount: Quote) {
        self.state.cash = self.state.cash.add(amount).floor_zero().round();
    }

    pub fn charge(&mut self, amount: Quote) {
        self.state.cash = self.state.cash.sub(amount).floor_zero().round();
    }

    pub fn apply_effect(&mut self, effect: &PlayerEffect) {
        if let Some(delta) = effect.cash {
            self.credit(Quote::new(delta));
        }
        if let Some(pct) = effect.cash_percent {
            let delta = self.state.cash.mul(pct / dec!(100));
            self.credit(delta);
        }
        if let Some(delta) = effect.stress {
            self.state.stress = (self.state.stress + delta).max(Decimal::ZERO);
        }
    }

    pub fn record_trade(&mut self, item: TradeHistoryItem) {
        self.state.history.push(item);
        if self.state.history.len() > MAX_TRADE_HISTORY {
            let overflow = self.state.history.len() - MAX_TRADE_HISTORY;
            self.state.history.drain(0..overflow);
        }
    }

    pub fn remember_personal_event(&mut self, event_id: &str, cap: usize) {
        self.recent_personal_events.push_back(event_id.to_string());
        while self.recent_personal_events.len() > cap {
            self.recent_personal_events.pop_front();
        }
    }

    /// Fresh run state for a new LIVE session. Identity and connection survive, readiness does not.
    pub fn reset_for_session(&mut self) {
        let cash = Quote::new(self.state.role_key.role().initial_cash);
        self.base_cash = cash;
        self.peak_cash = cash;
        self.state.initial_cash = cash;
        self.state.cash = cash;
        self.state.stress = Decimal::ZERO;
        self.state.history.clear();
        self.state.position = None;
        self.state.status = PlayerStatus::Active;
        self.state.end_reason = None;
        self.state.ready = false;
        self.pending_event = None;
        self.recent_personal_events.clear();
        self.next_personal_event_at = None;
        self.last_expense_day = 1;
        self.respawns = 0;
        self.respawn_cooldown_ends_at = None;
        self.leaderboard_submitted = false;
        self.last_leaderboard_entry = None;
    }

    pub fn set_role(&mut self, role_key: RoleKey) {
        let role = role_key.role();
        self.state.role_key = role_key;
        self.state.role = role.name.to_string();
    }
}
