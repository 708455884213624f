// 8.0: rooms. one Room owns a session's players, market, timers and chat, and advances
// only when a message or a tick is applied to it. no I/O: everything a room wants sent
// or stored is queued in its outbox for the registry to resolve.

mod config;
mod core;
mod orders;
mod positions;
mod results;
mod scheduling;
mod session;
mod snapshots;
mod tick;

pub use config::{JoinRequest, RoomOptions};
pub use core::Room;
pub use orders::resolve_margin;
pub use results::{ClaimDraft, RoomError, TradeDenied, TradeOutcome};
