//! Messages between the async edge (sockets, HTTP handlers, store workers) and the game loop.
//!
//! The game loop is the only owner of the [`RoomRegistry`](crate::registry::RoomRegistry).
//! Everything else talks to it through [`GameCommand`]s on one unbounded channel, so all
//! room mutations are serialized without locks.

use crate::events::StoreOutcome;
use crate::leaderboard::{LeaderboardEntry, LeaderboardError};
use crate::protocol::{RoomListItem, ServerMessage};
use crate::types::ConnId;
use tokio::sync::{mpsc, oneshot};

/// Per-connection outbound queue. Dropping the sender hangs the socket up.
pub type Outbound = mpsc::UnboundedSender<ServerMessage>;

pub type ClaimResult = Result<LeaderboardEntry, LeaderboardError>;

#[derive(Debug)]
pub enum GameCommand {
    /// A socket finished its upgrade.
    Connect { conn: ConnId, outbound: Outbound },
    /// One text frame, unparsed.
    Text { conn: ConnId, text: String },
    Disconnect { conn: ConnId },
    Rooms { reply: oneshot::Sender<Vec<RoomListItem>> },
    Leaderboard { reply: oneshot::Sender<Vec<LeaderboardEntry>> },
    SubmitClaim {
        client_id: String,
        player_name: Option<String>,
        reply: oneshot::Sender<ClaimResult>,
    },
    /// A store worker finished.
    Outcome(StoreOutcome),
}

impl GameCommand {
    pub fn name(&self) -> &'static str {
        match self {
            GameCommand::Connect { .. } => "connect",
            GameCommand::Text { .. } => "text",
            GameCommand::Disconnect { .. } => "disconnect",
            GameCommand::Rooms { .. } => "rooms",
            GameCommand::Leaderboard { .. } => "leaderboard",
            GameCommand::SubmitClaim { .. } => "submit_claim",
            GameCommand::Outcome(_) => "outcome",
        }
    }
}
