//! HTTP error type. Every failure leaves as `{"error": msg, "status": code}`.

use crate::leaderboard::LeaderboardError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    Internal(String),

    #[error("{0}")]
    Unavailable(String),

    /// Game loop is gone.
    #[error("Game server unavailable.")]
    GameLoopDown,
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Unavailable(_) | AppError::GameLoopDown => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

impl From<LeaderboardError> for AppError {
    fn from(err: LeaderboardError) -> Self {
        let message = err.to_string();
        match err {
            LeaderboardError::NotFound => AppError::NotFound(message),
            LeaderboardError::AlreadySubmitted => AppError::Conflict(message),
            LeaderboardError::Unavailable => AppError::Unavailable(message),
            LeaderboardError::InsertFailed => AppError::Internal(message),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = axum::Json(json!({
            "error": self.to_string(),
            "status": status.as_u16()
        }));
        (status, body).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;
