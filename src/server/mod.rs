// 14.0: the network edge. axum serves HTTP and the game socket; a single game loop task owns
// the registry. handlers and sockets only send commands and await replies.
// 14.1 app + routes. 14.2 game loop and store worker.

pub mod app;
pub mod bridge;
pub mod error;
pub mod game_loop;
pub mod routes;
pub mod state;

pub use app::{create_app, ServerConfig};
pub use bridge::{GameCommand, Outbound};
pub use error::{AppError, AppResult};
pub use game_loop::{execute, spawn_game_loop};
pub use state::ServerState;
