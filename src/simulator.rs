// 2.4: MarketSimulator. pure transform: (market, rng, now) -> (market', candle).
// no I/O and no ambient randomness, seed the rng and the whole run replays.

use crate::market::{clamp_decimal, unit_interval, Candle, MarketPhase, MarketState, MAX_VOLATILITY, MIN_VOLATILITY};
use crate::types::{Price, Timestamp};
use rand::Rng;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

#[derive(Debug, Clone)]
pub struct MarketSimulator {
    max_candles: usize,
}

impl Default for MarketSimulator {
    fn default() -> Self {
        Self::new(crate::market::DEFAULT_MAX_CANDLES)
    }
}

impl MarketSimulator {
    pub fn new(max_candles: usize) -> Self {
        Self {
            max_candles: max_candles.max(1),
        }
    }

    pub fn max_candles(&self) -> usize {
        self.max_candles
    }

    /// One step: pick the next regime, draw a candle from it, append it.
    pub fn advance<R: Rng + ?Sized>(
        &self,
        market: &MarketState,
        rng: &mut R,
        now: Timestamp,
    ) -> (MarketState, Candle) {
        let r = unit_interval(rng);
        let (phase, volatility) = next_phase(market.phase, market.volatility, market.token.is_rug, r);

        let candle = generate_candle(market.last_close(), phase, volatility, rng, now);

        let mut next = market.clone();
        next.phase = phase;
        next.volatility = volatility;
        if phase == MarketPhase::Rug {
            next.is_rugged = true;
        }
        next.push_candle(candle, self.max_candles);
        (next, candle)
    }
}

// 2.5: weighted regime transition. `r` is a uniform draw in [0, 1).
pub fn next_phase(phase: MarketPhase, volatility: Decimal, is_rug: bool, r: Decimal) -> (MarketPhase, Decimal) {
    match phase {
        MarketPhase::Accumulation => {
            if r < dec!(0.10) {
                (MarketPhase::Pump, dec!(0.06))
            } else if r < dec!(0.13) {
                (MarketPhase::Moon, dec!(0.10))
            } else {
                (phase, volatility)
            }
        }
        MarketPhase::Pump => {
            if r < dec!(0.18) {
                let crash = if is_rug { MarketPhase::Rug } else { MarketPhase::Dump };
                (crash, dec!(0.08))
            } else if r < dec!(0.23) {
                (MarketPhase::Moon, dec!(0.12))
            } else if r > dec!(0.92) {
                (MarketPhase::Accumulation, dec!(0.03))
            } else {
                (phase, volatility)
            }
        }
        MarketPhase::Moon => {
            if r < dec!(0.28) {
                (MarketPhase::Dump, dec!(0.09))
            } else if r > dec!(0.82) {
                (MarketPhase::Pump, dec!(0.06))
            } else {
                (phase, volatility)
            }
        }
        MarketPhase::Dump => {
            if r < dec!(0.15) {
                (MarketPhase::Accumulation, dec!(0.03))
            } else {
                (phase, volatility)
            }
        }
        // the rug candle is one-shot, the bleed afterwards is an ordinary dump
        MarketPhase::Rug => (MarketPhase::Dump, dec!(0.08)),
        MarketPhase::Idle => (phase, volatility),
    }
}

// 2.6: percent change per phase
pub fn candle_change<R: Rng + ?Sized>(phase: MarketPhase, volatility: Decimal, rng: &mut R) -> Decimal {
    let smooth_vol = clamp_decimal(volatility, MIN_VOLATILITY, MAX_VOLATILITY);
    let r = unit_interval(rng);
    match phase {
        MarketPhase::Pump => r * dec!(0.015) + dec!(0.005),
        MarketPhase::Dump => -(r * dec!(0.015) + dec!(0.005)),
        MarketPhase::Rug => -(dec!(0.2) + r * dec!(0.25)),
        MarketPhase::Moon => r * dec!(0.03) + dec!(0.01),
        MarketPhase::Accumulation | MarketPhase::Idle => (r - dec!(0.5)) * smooth_vol,
    }
}

pub fn generate_candle<R: Rng + ?Sized>(
    prev_close: Price,
    phase: MarketPhase,
    volatility: Decimal,
    rng: &mut R,
    now: Timestamp,
) -> Candle {
    let change = candle_change(phase, volatility, rng);
    let smooth_vol = clamp_decimal(volatility, MIN_VOLATILITY, MAX_VOLATILITY);

    let open = prev_close;
    let close = prev_close.scale(Decimal::ONE + change);

    let body_high = open.value().max(close.value());
    let body_low = open.value().min(close.value());
    let base_wick = (close.value() - open.value())
        .abs()
        .max(prev_close.value() * smooth_vol * dec!(0.12));
    let wick_up = base_wick * (dec!(0.3) + unit_interval(rng) * dec!(0.6));
    let wick_down = base_wick * (dec!(0.3) + unit_interval(rng) * dec!(0.6));

    Candle {
        open,
        close,
        high: Price::floored(body_high + wick_up),
        low: Price::floored(body_low - wick_down),
        time: now,
    }
}
