//! Route handlers.
//!
//! - [`health`]: liveness and store readiness
//! - [`ws`]: the game socket
//! - [`rooms`]: room listing
//! - [`leaderboard`]: board reads and out-of-band claims

pub mod health;
pub mod leaderboard;
pub mod rooms;
pub mod ws;
