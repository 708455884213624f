// 3.1x: take profit and stop loss. derived from percent offsets around a reference price,
// checked once per tick against the current price. tp wins when both would fire.

use crate::position::Position;
use crate::types::{Price, Side};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

pub const MIN_TAKE_PROFIT_PCT: Decimal = dec!(1);
pub const MAX_TAKE_PROFIT_PCT: Decimal = dec!(500);
pub const MIN_STOP_LOSS_PCT: Decimal = dec!(1);
pub const MAX_STOP_LOSS_PCT: Decimal = dec!(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StopKind {
    TakeProfit,
    StopLoss,
}

pub fn clamp_take_profit_pct(pct: Decimal) -> Decimal {
    pct.max(MIN_TAKE_PROFIT_PCT).min(MAX_TAKE_PROFIT_PCT)
}

pub fn clamp_stop_loss_pct(pct: Decimal) -> Decimal {
    pct.max(MIN_STOP_LOSS_PCT).min(MAX_STOP_LOSS_PCT)
}

// long tp above the reference, short tp below it (floored)
pub fn take_profit_price(side: Side, reference: Price, pct: Decimal) -> Price {
    let offset = clamp_take_profit_pct(pct) / dec!(100);
    match side {
        Side::Long => Price::floored(reference.value() * (Decimal::ONE + offset)),
        Side::Short => Price::floored(reference.value() * (Decimal::ONE - offset)),
    }
}

pub fn stop_loss_price(side: Side, reference: Price, pct: Decimal) -> Price {
    let offset = clamp_stop_loss_pct(pct) / dec!(100);
    match side {
        Side::Long => Price::floored(reference.value() * (Decimal::ONE - offset)),
        Side::Short => Price::floored(reference.value() * (Decimal::ONE + offset)),
    }
}

/// Which stop, if any, the current price triggers.
pub fn check_stops(position: &Position, price: Price) -> Option<StopKind> {
    if let Some(tp) = position.take_profit_price {
        let hit = match position.side {
            Side::Long => price >= tp,
            Side::Short => price <= tp,
        };
        if hit {
            return Some(StopKind::TakeProfit);
        }
    }

    if let Some(sl) = position.stop_loss_price {
        let hit = match position.side {
            Side::Long => price <= sl,
            Side::Short => price >= sl,
        };
        if hit {
            return Some(StopKind::StopLoss);
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::position::open_position;
    use crate::types::{Leverage, Quote, Timestamp};

    fn long_with_stops() -> Position {
        open_position(
            Side::Long,
            Price::new_unchecked(dec!(1)),
            Quote::new(dec!(100)),
            Leverage::new(dec!(2)).unwrap(),
            Some(dec!(20)),
            Some(dec!(10)),
            Timestamp::from_millis(0),
        )
    }

    #[test]
    fn stop_prices_for_long() {
        let pos = long_with_stops();
        assert_eq!(pos.take_profit_price.unwrap().value(), dec!(1.2));
        assert_eq!(pos.stop_loss_price.unwrap().value(), dec!(0.9));
    }

    #[test]
    fn pct_inputs_are_clamped() {
        let reference = Price::new_unchecked(dec!(1));
        // 1000% tp clamps to 500%
        assert_eq!(take_profit_price(Side::Long, reference, dec!(1000)).value(), dec!(6));
        // 100% short tp would be zero, floors instead
        assert_eq!(take_profit_price(Side::Short, reference, dec!(100)), Price::min());
        // 0% sl clamps to 1%
        assert_eq!(stop_loss_price(Side::Short, reference, dec!(0)).value(), dec!(1.01));
    }

    #[test]
    fn triggers() {
        let pos = long_with_stops();
        assert_eq!(check_stops(&pos, Price::new_unchecked(dec!(1.05))), None);
        assert_eq!(check_stops(&pos, Price::new_unchecked(dec!(1.2))), Some(StopKind::TakeProfit));
        assert_eq!(check_stops(&pos, Price::new_unchecked(dec!(0.85))), Some(StopKind::StopLoss));
    }
}
