// 7.0 config.rs: all game tunables in one place. timing, room sizes, leverage, respawn, caps.
// 7.1 presets for local play and tests. 7.2 validation.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameConfig {
    // Tick driver period
    pub tick_interval_ms: i64,
    // LIVE phase length
    pub session_duration_ms: i64,
    pub countdown_ms: i64,
    // Trading freeze after a market event
    pub event_pause_ms: i64,
    // Session is split into this many equal days, each charging one expense
    pub days_per_session: u32,
    pub max_chat_history: usize,
    pub max_leaderboard: usize,
    pub max_leverage: Decimal,
    pub min_room_players: usize,
    pub max_room_players: usize,
    pub default_room_players: usize,
    pub npc_chat_min_ms: i64,
    pub npc_chat_max_ms: i64,
    // Respawn cash = base * pct^n
    pub respawn_base_pct: Decimal,
    pub respawn_pause_ms: i64,
    pub personal_event_decision_ms: i64,
    // Anti-repeat ring sizes
    pub recent_market_events: usize,
    pub recent_personal_events: usize,
    pub max_candles: usize,
    // How long finished results stay claimable over HTTP
    pub result_retention_ms: i64,
    pub allow_memory_leaderboard: bool,
    pub auto_submit_leaderboard: bool,
    pub allow_anon_pack_edit: bool,
    pub store_timeout_ms: u64,
    pub cache_timeout_ms: u64,
    pub cache_ttl_secs: u64,
    // None = seed from entropy
    pub rng_seed: Option<u64>,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 1_000,
            session_duration_ms: 180_000, // 3 minutes
            countdown_ms: 5_000,
            event_pause_ms: 5_000,
            days_per_session: 6,
            max_chat_history: 120,
            max_leaderboard: 50,
            max_leverage: dec!(100),
            min_room_players: 1,
            max_room_players: 6,
            default_room_players: 6,
            npc_chat_min_ms: 8_000,
            npc_chat_max_ms: 18_000,
            respawn_base_pct: dec!(0.5),
            respawn_pause_ms: 5_000,
            personal_event_decision_ms: 10_000,
            recent_market_events: 6,
            recent_personal_events: 5,
            max_candles: crate::market::DEFAULT_MAX_CANDLES,
            result_retention_ms: 3_600_000, // 1 hour
            allow_memory_leaderboard: true,
            auto_submit_leaderboard: false,
            allow_anon_pack_edit: true,
            store_timeout_ms: 5_000,
            cache_timeout_ms: 2_000,
            cache_ttl_secs: 60,
            rng_seed: None,
        }
    }
}

impl GameConfig {
    // 7.1: short sessions for local play
    pub fn quick() -> Self {
        Self {
            session_duration_ms: 60_000,
            countdown_ms: 2_000,
            event_pause_ms: 3_000,
            days_per_session: 3,
            ..Self::default()
        }
    }

    // fixed seed and auto-submit so runs replay in tests
    pub fn test() -> Self {
        Self {
            rng_seed: Some(42),
            auto_submit_leaderboard: true,
            ..Self::default()
        }
    }

    /// Length of one in-game day.
    pub fn day_length_ms(&self) -> i64 {
        (self.session_duration_ms / i64::from(self.days_per_session.max(1))).max(1)
    }

    /// Normalize a requested room size into the configured bounds.
    pub fn clamp_room_players(&self, requested: Option<usize>) -> usize {
        requested
            .unwrap_or(self.default_room_players)
            .clamp(self.min_room_players, self.max_room_players)
    }

    // 7.2: internal consistency checks
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tick_interval_ms <= 0 {
            return Err(ConfigError::InvalidTiming {
                reason: "Tick interval must be positive".to_string(),
            });
        }

        if self.session_duration_ms < self.tick_interval_ms {
            return Err(ConfigError::InvalidTiming {
                reason: "Session must last at least one tick".to_string(),
            });
        }

        if self.countdown_ms < 0 || self.event_pause_ms < 0 || self.respawn_pause_ms < 0 {
            return Err(ConfigError::InvalidTiming {
                reason: "Durations cannot be negative".to_string(),
            });
        }

        if self.days_per_session == 0 {
            return Err(ConfigError::InvalidTiming {
                reason: "Need at least one day per session".to_string(),
            });
        }

        if self.npc_chat_min_ms <= 0 || self.npc_chat_min_ms > self.npc_chat_max_ms {
            return Err(ConfigError::InvalidTiming {
                reason: "NPC chat bounds must satisfy 0 < min <= max".to_string(),
            });
        }

        if self.min_room_players == 0
            || self.min_room_players > self.default_room_players
            || self.default_room_players > self.max_room_players
        {
            return Err(ConfigError::InvalidRoom {
                reason: "Room sizes must satisfy 1 <= min <= default <= max".to_string(),
            });
        }

        if self.max_leverage < Decimal::ONE {
            return Err(ConfigError::InvalidTrading {
                reason: "Max leverage must be at least 1x".to_string(),
            });
        }

        if self.respawn_base_pct <= Decimal::ZERO || self.respawn_base_pct > Decimal::ONE {
            return Err(ConfigError::InvalidTrading {
                reason: "Respawn base pct must be in (0, 1]".to_string(),
            });
        }

        if self.max_chat_history == 0 || self.max_leaderboard == 0 || self.max_candles == 0 {
            return Err(ConfigError::InvalidCaps {
                reason: "Chat, leaderboard and candle caps must be positive".to_string(),
            });
        }

        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid timing: {reason}")]
    InvalidTiming { reason: String },
    #[error("Invalid room settings: {reason}")]
    InvalidRoom { reason: String },
    #[error("Invalid trading settings: {reason}")]
    InvalidTrading { reason: String },
    #[error("Invalid caps: {reason}")]
    InvalidCaps { reason: String },
}

// Named presets, selectable from the command line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Preset {
    Standard,
    Quick,
    Test,
}

impl Preset {
    pub fn config(&self) -> GameConfig {
        match self {
            Preset::Standard => GameConfig::default(),
            Preset::Quick => GameConfig::quick(),
            Preset::Test => GameConfig::test(),
        }
    }
}

impl std::str::FromStr for Preset {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "standard" | "default" => Ok(Preset::Standard),
            "quick" => Ok(Preset::Quick),
            "test" => Ok(Preset::Test),
            other => Err(format!("unknown preset: {other}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_presets_valid() {
        assert!(GameConfig::default().validate().is_ok());
        assert!(GameConfig::quick().validate().is_ok());
        assert!(GameConfig::test().validate().is_ok());
        assert!(Preset::Quick.config().session_duration_ms < GameConfig::default().session_duration_ms);
    }

    #[test]
    fn test_day_length() {
        let config = GameConfig::default();
        assert_eq!(config.day_length_ms(), 30_000);
    }

    #[test]
    fn test_room_size_clamp() {
        let config = GameConfig::default();
        assert_eq!(config.clamp_room_players(None), 6);
        assert_eq!(config.clamp_room_players(Some(0)), 1);
        assert_eq!(config.clamp_room_players(Some(40)), 6);
    }

    #[test]
    fn test_invalid_timing() {
        let config = GameConfig {
            session_duration_ms: 10,
            ..GameConfig::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::InvalidTiming { .. })));
    }

    #[test]
    fn test_invalid_room_sizes() {
        let config = GameConfig {
            min_room_players: 4,
            default_room_players: 2,
            ..GameConfig::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::InvalidRoom { .. })));
    }

    #[test]
    fn test_invalid_respawn_pct() {
        let config = GameConfig {
            respawn_base_pct: dec!(1.5),
            ..GameConfig::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::InvalidTrading { .. })));
    }

    #[test]
    fn test_preset_parse() {
        assert_eq!("QUICK".parse::<Preset>(), Ok(Preset::Quick));
        assert!("fast".parse::<Preset>().is_err());
    }

    #[test]
    fn test_config_serialization() {
        let config = GameConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let back: GameConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, config);
    }
}
