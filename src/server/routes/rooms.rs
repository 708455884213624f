//! `GET /rooms`.

use crate::protocol::RoomListItem;
use crate::server::bridge::GameCommand;
use crate::server::error::AppResult;
use crate::server::state::ServerState;
use axum::extract::State;
use axum::Json;
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct RoomsResponse {
    pub rooms: Vec<RoomListItem>,
}

pub async fn list_rooms(State(state): State<ServerState>) -> AppResult<Json<RoomsResponse>> {
    let rooms = state.ask(|reply| GameCommand::Rooms { reply }).await?;
    Ok(Json(RoomsResponse { rooms }))
}
