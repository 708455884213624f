// 2.0: the room's market. one synthetic token per session, a bounded candle window,
// and a regime phase that drives how the next candle is drawn (see simulator.rs).

use crate::types::{Price, Timestamp, MIN_PRICE};
use rand::Rng;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

pub const INITIAL_VOLATILITY: Decimal = dec!(0.02);
pub const MIN_VOLATILITY: Decimal = dec!(0.01);
pub const MAX_VOLATILITY: Decimal = dec!(0.2);
pub const MIN_PRICE_MULTIPLIER: Decimal = dec!(0.1);
pub const MAX_PRICE_MULTIPLIER: Decimal = dec!(5);
pub const DEFAULT_MAX_CANDLES: usize = 300;

const TOKEN_NAMES: &[&str] = &[
    "PEPE", "DOGE", "SHIB", "ELON", "MOON", "SAFE", "ROCKET", "CAT", "INU", "POGAI", "LOWB",
    "RATS", "SATS", "ORDI", "TROLL", "SQUID",
];

const TOKEN_SUFFIXES: &[&str] = &["AI", "GPT", "2.0", "CEO", "BABY", "GOLD", "DAO", "FI", "X", "PRO", "MAX"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MarketPhase {
    #[serde(rename = "IDLE")]
    Idle,
    #[serde(rename = "Accumulation")]
    Accumulation,
    #[serde(rename = "PUMP")]
    Pump,
    #[serde(rename = "DUMP")]
    Dump,
    #[serde(rename = "MOON")]
    Moon,
    #[serde(rename = "RUG")]
    Rug,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub open: Price,
    pub close: Price,
    pub high: Price,
    pub low: Price,
    pub time: Timestamp,
}

impl Candle {
    pub fn flat(price: Price, time: Timestamp) -> Self {
        Self {
            open: price,
            close: price,
            high: price,
            low: price,
            time,
        }
    }

    fn scaled(&self, factor: Decimal) -> Self {
        Self {
            open: self.open.scale(factor),
            close: self.close.scale(factor),
            high: self.high.scale(factor),
            low: self.low.scale(factor),
            time: self.time,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenInfo {
    pub name: String,
    pub ticker: String,
    pub initial_price: Price,
    pub narrative: String,
    pub risk: u32,
    pub rug_pull_chance: Decimal,
    pub is_rug: bool,
}

// 2.1: market effect payload carried by market events and some npc chatter
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketEffect {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<MarketPhase>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volatility_delta: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price_multiplier: Option<Decimal>,
}

/// Runtime market state for one room. `price` always equals the last candle's close.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketState {
    pub token: TokenInfo,
    pub price: Price,
    pub candles: VecDeque<Candle>,
    pub phase: MarketPhase,
    pub volatility: Decimal,
    pub is_rugged: bool,
}

impl MarketState {
    pub fn new(token: TokenInfo, now: Timestamp) -> Self {
        let price = token.initial_price;
        let mut candles = VecDeque::with_capacity(DEFAULT_MAX_CANDLES);
        candles.push_back(Candle::flat(price, now));
        Self {
            token,
            price,
            candles,
            phase: MarketPhase::Accumulation,
            volatility: INITIAL_VOLATILITY,
            is_rugged: false,
        }
    }

    /// Fresh market with a randomly generated token.
    pub fn generate<R: Rng + ?Sized>(rng: &mut R, now: Timestamp) -> Self {
        Self::new(generate_token(rng), now)
    }

    pub fn last_close(&self) -> Price {
        self.candles
            .back()
            .map(|c| c.close)
            .unwrap_or(self.token.initial_price)
    }

    // append and trim from the front so the window stays bounded
    pub fn push_candle(&mut self, candle: Candle, max_candles: usize) {
        self.candles.push_back(candle);
        while self.candles.len() > max_candles.max(1) {
            self.candles.pop_front();
        }
        self.price = candle.close;
    }
}

// 2.2: uniform draw in [0, 1) at 6dp. all game randomness goes through the injected rng.
pub fn unit_interval<R: Rng + ?Sized>(rng: &mut R) -> Decimal {
    Decimal::new(rng.gen_range(0..1_000_000), 6)
}

pub fn clamp_decimal(value: Decimal, min: Decimal, max: Decimal) -> Decimal {
    value.max(min).min(max)
}

pub fn generate_token<R: Rng + ?Sized>(rng: &mut R) -> TokenInfo {
    let name = TOKEN_NAMES[rng.gen_range(0..TOKEN_NAMES.len())];
    let suffix = TOKEN_SUFFIXES[rng.gen_range(0..TOKEN_SUFFIXES.len())];
    let ticker: String = format!("{name}{suffix}").chars().take(5).collect();
    let start = unit_interval(rng) * dec!(0.001) + dec!(0.00001);

    TokenInfo {
        name: format!("{name} {suffix}"),
        ticker,
        initial_price: Price::floored(start),
        narrative: "The next 1000x coin!".to_string(),
        risk: rng.gen_range(0..100),
        rug_pull_chance: unit_interval(rng) * dec!(0.3),
        is_rug: rng.gen_bool(0.3),
    }
}

// 2.3: phase override, volatility nudge, price multiplier. the multiplier also rescales the
// last candle so the chart and the price agree.
pub fn apply_market_event(market: &MarketState, effect: &MarketEffect) -> MarketState {
    let mut next = market.clone();

    if let Some(phase) = effect.phase {
        next.phase = phase;
        if phase == MarketPhase::Rug {
            next.is_rugged = true;
        }
    }

    if let Some(delta) = effect.volatility_delta {
        if !delta.is_zero() {
            next.volatility = clamp_decimal(next.volatility + delta, MIN_VOLATILITY, MAX_VOLATILITY);
        }
    }

    if let Some(multiplier) = effect.price_multiplier {
        if !multiplier.is_zero() {
            let factor = clamp_decimal(multiplier, MIN_PRICE_MULTIPLIER, MAX_PRICE_MULTIPLIER);
            if let Some(last) = next.candles.pop_back() {
                let adjusted = last.scaled(factor);
                next.candles.push_back(adjusted);
                next.price = adjusted.close;
            } else {
                next.price = next.price.scale(factor);
            }
        }
    }

    debug_assert!(next.price.value() >= MIN_PRICE);
    next
}
