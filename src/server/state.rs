//! Shared handler state. Cheap to clone: a command sender, a connection counter and the store.

use super::bridge::GameCommand;
use super::error::{AppError, AppResult};
use crate::storage::Store;
use crate::types::ConnId;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, oneshot};

#[derive(Clone)]
pub struct ServerState {
    pub cmd_tx: mpsc::UnboundedSender<GameCommand>,
    pub store: Arc<dyn Store>,
    pub start_time: Instant,
    next_conn: Arc<AtomicU64>,
}

impl ServerState {
    pub fn new(cmd_tx: mpsc::UnboundedSender<GameCommand>, store: Arc<dyn Store>) -> Self {
        Self {
            cmd_tx,
            store,
            start_time: Instant::now(),
            next_conn: Arc::new(AtomicU64::new(1)),
        }
    }

    pub fn uptime_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    pub fn next_conn_id(&self) -> ConnId {
        ConnId(self.next_conn.fetch_add(1, Ordering::Relaxed))
    }

    /// Fire and forget. `false` once the game loop has stopped.
    pub fn send(&self, cmd: GameCommand) -> bool {
        self.cmd_tx.send(cmd).is_ok()
    }

    /// Send a command carrying a oneshot and wait for the answer.
    pub async fn ask<T>(&self, build: impl FnOnce(oneshot::Sender<T>) -> GameCommand) -> AppResult<T> {
        let (reply, rx) = oneshot::channel();
        self.cmd_tx.send(build(reply)).map_err(|_| AppError::GameLoopDown)?;
        rx.await.map_err(|_| AppError::GameLoopDown)
    }
}
