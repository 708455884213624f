//! `GET /leaderboard` and `POST /leaderboard/submit`.

use crate::leaderboard::LeaderboardEntry;
use crate::server::bridge::GameCommand;
use crate::server::error::{AppError, AppResult};
use crate::server::state::ServerState;
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize)]
pub struct LeaderboardResponse {
    pub leaderboard: Vec<LeaderboardEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitRequest {
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub player_name: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SubmitResponse {
    pub entry: LeaderboardEntry,
}

pub async fn get_leaderboard(State(state): State<ServerState>) -> AppResult<Json<LeaderboardResponse>> {
    let leaderboard = state.ask(|reply| GameCommand::Leaderboard { reply }).await?;
    Ok(Json(LeaderboardResponse { leaderboard }))
}

/// Claim the caller's last finished session by client id.
pub async fn submit(
    State(state): State<ServerState>,
    body: Result<Json<SubmitRequest>, JsonRejection>,
) -> AppResult<Json<SubmitResponse>> {
    let Json(request) = body.map_err(|_| AppError::BadRequest("Invalid JSON payload.".into()))?;
    let client_id = request
        .client_id
        .filter(|id| !id.trim().is_empty())
        .ok_or_else(|| AppError::BadRequest("clientId is required.".into()))?;

    let result = state
        .ask(|reply| GameCommand::SubmitClaim {
            client_id,
            player_name: request.player_name,
            reply,
        })
        .await?;
    let entry = result?;
    Ok(Json(SubmitResponse { entry }))
}
