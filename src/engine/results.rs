// 8.0.2: result types and errors for room operations.

use crate::leaderboard::NewLeaderboardEntry;
use crate::protocol::ProtocolError;
use crate::types::{Quote, Side};

/// What a trade request did. `Ignored` covers the silent no-ops (zero margin, close without a position).
#[derive(Debug, Clone, PartialEq)]
pub enum TradeOutcome {
    Opened { side: Side, margin: Quote },
    Added { side: Side, margin: Quote },
    Reduced { side: Side, pnl: Quote },
    Closed { side: Side, pnl: Quote },
    Ignored,
}

/// A leaderboard claim priced and keyed by the room, not yet written anywhere.
#[derive(Debug, Clone, PartialEq)]
pub struct ClaimDraft {
    pub session_key: String,
    pub entry: NewLeaderboardEntry,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TradeDenied {
    #[error("Trading disabled: session is not LIVE.")]
    NotLive,

    #[error("Trading disabled: player is not ACTIVE.")]
    NotActive,

    #[error("Trading paused: respawning.")]
    Respawning,

    #[error("Trading paused.")]
    Paused,

    #[error("Trading paused: personal event.")]
    PersonalEvent,

    #[error("Trading disabled: invalid market price.")]
    InvalidPrice,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RoomError {
    #[error("{0}")]
    Trade(#[from] TradeDenied),

    #[error("Game already started.")]
    AlreadyStarted,

    #[error("Room key required.")]
    KeyRequired,

    #[error("Room is full.")]
    Full,

    #[error("Waiting for everyone to ready up.")]
    NotReady,

    #[error("Join a room first.")]
    NotJoined,

    #[error("Leaderboard already submitted.")]
    AlreadySubmitted,

    #[error("Leaderboard service unavailable.")]
    LeaderboardUnavailable,

    #[error("Pack not found.")]
    PackNotFound,

    #[error("Invalid pack payload.")]
    InvalidPack,

    #[error("Core pack cannot be edited.")]
    CorePackImmutable,

    #[error("Core pack cannot be deleted.")]
    CorePackUndeletable,

    #[error("Not authorized to edit this pack.")]
    EditForbidden,

    #[error("Not authorized to delete this pack.")]
    DeleteForbidden,

    #[error("Database not configured.")]
    StoreNotConfigured,

    #[error("Failed to create pack.")]
    CreatePackFailed,

    #[error("Failed to update pack.")]
    UpdatePackFailed,

    #[error("Failed to delete pack.")]
    DeletePackFailed,

    #[error("Invalid JSON payload.")]
    InvalidJson,

    #[error("Invalid message payload.")]
    InvalidMessage,

    // silent: races between a disconnect and a queued action land here
    #[error("unknown player")]
    UnknownPlayer,

    #[error("not the host")]
    NotHost,

    #[error("not allowed in the current session status")]
    WrongStatus,

    #[error("nothing to do")]
    NoOp,
}

impl RoomError {
    /// Dropped without a reply.
    pub fn is_silent(&self) -> bool {
        matches!(
            self,
            RoomError::UnknownPlayer | RoomError::NotHost | RoomError::WrongStatus | RoomError::NoOp
        )
    }
}

impl From<ProtocolError> for RoomError {
    fn from(err: ProtocolError) -> Self {
        match err {
            ProtocolError::InvalidJson => RoomError::InvalidJson,
            ProtocolError::InvalidMessage => RoomError::InvalidMessage,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn denial_texts_are_wire_exact() {
        assert_eq!(
            RoomError::from(TradeDenied::NotLive).to_string(),
            "Trading disabled: session is not LIVE."
        );
        assert_eq!(RoomError::Full.to_string(), "Room is full.");
        assert_eq!(RoomError::from(ProtocolError::InvalidJson).to_string(), "Invalid JSON payload.");
    }

    #[test]
    fn only_invariant_violations_are_silent() {
        assert!(RoomError::UnknownPlayer.is_silent());
        assert!(RoomError::WrongStatus.is_silent());
        assert!(!RoomError::KeyRequired.is_silent());
        assert!(!RoomError::Trade(TradeDenied::Paused).is_silent());
    }
}
