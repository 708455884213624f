//! `GET /health` and `GET /health/ready`.

use crate::server::state::ServerState;
use crate::storage::StoreStatus;
use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: &'static str,
    pub uptime_secs: u64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadyResponse {
    pub ready: bool,
    pub store: StoreStatus,
}

pub async fn health(State(state): State<ServerState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        uptime_secs: state.uptime_secs(),
    })
}

/// 503 while the configured store is failing. A memory store is always ready.
pub async fn ready(State(state): State<ServerState>) -> (StatusCode, Json<ReadyResponse>) {
    let store = state.store.status();
    let ready = store.healthy;
    let code = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (code, Json(ReadyResponse { ready, store }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ready_response_shape() {
        let body = ReadyResponse {
            ready: true,
            store: StoreStatus::memory(),
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["ready"], true);
        assert_eq!(json["store"]["durable"], false);
    }
}
