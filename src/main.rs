//! candle-arena server.
//!
//! Every tunable can come from a flag or an environment variable. Without a database path the
//! server runs on the in-memory store: leaderboard claims stay in memory and pack editing is off.

use anyhow::Context;
use candle_arena::cache::{LeaderboardCache, MemoryCache, NoCache};
use candle_arena::config::{GameConfig, Preset};
use candle_arena::server::{create_app, spawn_game_loop, ServerConfig, ServerState};
use candle_arena::storage::{MemoryStore, SqliteStore, Store};
use clap::Parser;
use rust_decimal::Decimal;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn, Level};
use tracing_subscriber::EnvFilter;

/// Multiplayer candlestick speculation game server
#[derive(Parser, Debug)]
#[command(name = "candle-arena")]
#[command(version)]
struct ServerArgs {
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    host: String,

    #[arg(long, env = "PORT", default_value_t = 8080)]
    port: u16,

    /// SQLite file. Unset runs on the in-memory store
    #[arg(long, env = "DATABASE_PATH")]
    database_path: Option<PathBuf>,

    /// standard, quick or test
    #[arg(long, env = "GAME_PRESET", default_value = "standard")]
    preset: Preset,

    #[arg(long, env = "TICK_INTERVAL_MS")]
    tick_interval_ms: Option<i64>,

    #[arg(long, env = "SESSION_DURATION_MS")]
    session_duration_ms: Option<i64>,

    #[arg(long, env = "COUNTDOWN_MS")]
    countdown_ms: Option<i64>,

    #[arg(long, env = "EVENT_PAUSE_MS")]
    event_pause_ms: Option<i64>,

    #[arg(long, env = "DAYS_PER_SESSION")]
    days_per_session: Option<u32>,

    #[arg(long, env = "MAX_CHAT_HISTORY")]
    max_chat_history: Option<usize>,

    #[arg(long, env = "MAX_LEADERBOARD")]
    max_leaderboard: Option<usize>,

    #[arg(long, env = "MAX_LEVERAGE")]
    max_leverage: Option<Decimal>,

    #[arg(long, env = "MIN_ROOM_PLAYERS")]
    min_room_players: Option<usize>,

    #[arg(long, env = "MAX_ROOM_PLAYERS")]
    max_room_players: Option<usize>,

    #[arg(long, env = "DEFAULT_ROOM_PLAYERS")]
    default_room_players: Option<usize>,

    #[arg(long, env = "NPC_CHAT_MIN_MS")]
    npc_chat_min_ms: Option<i64>,

    #[arg(long, env = "NPC_CHAT_MAX_MS")]
    npc_chat_max_ms: Option<i64>,

    #[arg(long, env = "RESPAWN_BASE_PCT")]
    respawn_base_pct: Option<Decimal>,

    #[arg(long, env = "RESPAWN_PAUSE_MS")]
    respawn_pause_ms: Option<i64>,

    #[arg(long, env = "PERSONAL_EVENT_DECISION_MS")]
    personal_event_decision_ms: Option<i64>,

    #[arg(long, env = "RECENT_MARKET_EVENTS")]
    recent_market_events: Option<usize>,

    #[arg(long, env = "RECENT_PERSONAL_EVENTS")]
    recent_personal_events: Option<usize>,

    #[arg(long, env = "MAX_CANDLES")]
    max_candles: Option<usize>,

    #[arg(long, env = "RESULT_RETENTION_MS")]
    result_retention_ms: Option<i64>,

    #[arg(long, env = "ALLOW_MEMORY_LEADERBOARD")]
    allow_memory_leaderboard: Option<bool>,

    #[arg(long, env = "AUTO_SUBMIT_LEADERBOARD")]
    auto_submit_leaderboard: Option<bool>,

    #[arg(long, env = "ALLOW_ANON_PACK_EDIT")]
    allow_anon_pack_edit: Option<bool>,

    #[arg(long, env = "STORE_TIMEOUT_MS")]
    store_timeout_ms: Option<u64>,

    #[arg(long, env = "CACHE_TIMEOUT_MS")]
    cache_timeout_ms: Option<u64>,

    /// 0 disables the leaderboard cache
    #[arg(long, env = "CACHE_TTL_SECS")]
    cache_ttl_secs: Option<u64>,

    /// Fixed seed for every room RNG
    #[arg(long, env = "RNG_SEED")]
    rng_seed: Option<u64>,
}

// copy every override that was given onto the preset
macro_rules! overrides {
    ($args:expr, $config:expr, $($field:ident),+ $(,)?) => {
        $(if let Some(value) = $args.$field {
            $config.$field = value;
        })+
    };
}

impl ServerArgs {
    fn server_config(&self) -> ServerConfig {
        ServerConfig {
            host: self.host.clone(),
            port: self.port,
        }
    }

    fn game_config(&self) -> anyhow::Result<GameConfig> {
        let mut config = self.preset.config();
        overrides!(
            self,
            config,
            tick_interval_ms,
            session_duration_ms,
            countdown_ms,
            event_pause_ms,
            days_per_session,
            max_chat_history,
            max_leaderboard,
            max_leverage,
            min_room_players,
            max_room_players,
            default_room_players,
            npc_chat_min_ms,
            npc_chat_max_ms,
            respawn_base_pct,
            respawn_pause_ms,
            personal_event_decision_ms,
            recent_market_events,
            recent_personal_events,
            max_candles,
            result_retention_ms,
            allow_memory_leaderboard,
            auto_submit_leaderboard,
            allow_anon_pack_edit,
            store_timeout_ms,
            cache_timeout_ms,
            cache_ttl_secs,
        );
        if self.rng_seed.is_some() {
            config.rng_seed = self.rng_seed;
        }
        config.validate().context("invalid game config")?;
        Ok(config)
    }
}

fn open_store(args: &ServerArgs, config: &GameConfig) -> anyhow::Result<Arc<dyn Store>> {
    let timeout = Duration::from_millis(config.store_timeout_ms);
    match &args.database_path {
        Some(path) => {
            let store = SqliteStore::open(path, timeout)
                .with_context(|| format!("opening database {}", path.display()))?;
            info!(path = %path.display(), "using sqlite store");
            Ok(Arc::new(store))
        }
        None => {
            warn!("no database configured, leaderboard and packs stay in memory");
            Ok(Arc::new(MemoryStore::new()))
        }
    }
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutting down");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .init();

    let args = ServerArgs::parse();
    let config = Arc::new(args.game_config()?);
    let store = open_store(&args, &config)?;
    let cache: Arc<dyn LeaderboardCache> = if config.cache_ttl_secs == 0 {
        Arc::new(NoCache)
    } else {
        Arc::new(MemoryCache::new(Duration::from_secs(config.cache_ttl_secs)))
    };

    let (cmd_tx, game_loop) = spawn_game_loop(config.clone(), store.clone(), cache);
    let app = create_app(ServerState::new(cmd_tx, store));

    let server_config = args.server_config();
    let listener = tokio::net::TcpListener::bind(server_config.bind_addr())
        .await
        .with_context(|| format!("binding {}", server_config.bind_addr()))?;
    info!(addr = %server_config.bind_addr(), "candle-arena listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    game_loop.abort();
    Ok(())
}
