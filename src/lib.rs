// candle-arena: multiplayer candlestick speculation game server.
// rooms are tick-driven and single-writer: all game math is deterministic given a seed and a
// clock, and the only I/O lives behind the registry's dispatch queue and the server edge.
//
// file map (search X.0 for structs, X.1+ for logic):
//   1.x  types.rs: primitives: ClientId, RoomId, ConnId, Side, Price, Quote, Leverage, Timestamp
//   2.x  market.rs: token, candles, phases, market event effects
//   2.4  simulator.rs: MarketSimulator, phase transitions and candle generation
//   3.x  position.rs: position math, pnl, liquidation price, open/add/reduce
//   3.1x conditional.rs: take profit / stop loss
//   3.2  liquidation.rs: liquidation price-cross check
//   4.x  player.rs: player state, roles, runtime bookkeeping
//   5.x  pack.rs: event packs, conditions, validation, core pack
//   5.1  scheduler.rs: EventScheduler, timers, eligibility, pause shifting
//   5.2  chat.rs: chat log + npc chatter
//   6.x  respawn.rs: RespawnPolicy
//   7.x  config.rs: tunables, presets, validation
//   8.x  engine/: Room: lifecycle, trading, tick step, events, snapshots
//   9.x  protocol.rs: wire messages + sanitizers
//   10.x registry.rs: RoomRegistry, connections, session records, dispatch
//   11.x events.rs: dispatch queue + store task/outcome types
//   12.x leaderboard.rs: LeaderboardRanker, claims
//   13.x storage/: Store trait, sqlite + memory stores
//   13.1 cache.rs: leaderboard cache
//   14.x server/: axum app, routes, websocket, game loop

// game core
pub mod chat;
pub mod conditional;
pub mod engine;
pub mod liquidation;
pub mod market;
pub mod pack;
pub mod player;
pub mod position;
pub mod respawn;
pub mod scheduler;
pub mod simulator;
pub mod types;

// rooms and wire
pub mod events;
pub mod leaderboard;
pub mod protocol;
pub mod registry;

// integration modules
pub mod cache;
pub mod config;
pub mod server;
pub mod storage;

// re exports for convenience
pub use config::{ConfigError, GameConfig, Preset};
pub use engine::{JoinRequest, Room, RoomError, RoomOptions, TradeDenied, TradeOutcome};
pub use events::{Audience, Dispatch, Outbox, StoreOutcome, StoreTask};
pub use leaderboard::{LeaderboardEntry, LeaderboardError, LeaderboardRanker};
pub use protocol::{ClientMessage, ServerMessage, SessionStatus};
pub use registry::{Outgoing, RoomRegistry};
pub use storage::{MemoryStore, SqliteStore, Store, StoreStatus};
pub use types::*;
