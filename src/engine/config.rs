//! Per-room options fixed at creation, plus the sanitized join request.

use crate::player::RoleKey;
use crate::types::ClientId;

/// Room creation options.
#[derive(Debug, Clone, Default)]
pub struct RoomOptions {
    /// Shown in listings. Renamed to "{host}'s Room" while it still equals the room id.
    pub display_name: String,
    /// Already clamped to the configured bounds.
    pub max_players: usize,
    /// SHA-256 hex of the room key, `None` for open rooms.
    pub key_hash: Option<String>,
    /// Fixed RNG seed. `None` seeds from entropy.
    pub seed: Option<u64>,
}

/// A join after every field went through the sanitizers.
#[derive(Debug, Clone)]
pub struct JoinRequest {
    pub client_id: ClientId,
    pub name: String,
    pub role_key: RoleKey,
    pub room_name: Option<String>,
    /// Empty when the client sent no key.
    pub room_key: String,
}
