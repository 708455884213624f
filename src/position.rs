// 3.0: open position tracking. pnl = (price - entry) * size for longs, mirrored for shorts.
// 3.4 has open/increase/reduce/close at the bottom.

use crate::conditional::{stop_loss_price, take_profit_price};
use crate::types::{Leverage, Price, Quote, Side, Timestamp, SIZE_DP};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Position {
    pub side: Side,
    pub entry_price: Price,
    /// Units of the room token.
    pub size: Decimal,
    pub margin: Quote,
    pub leverage: Leverage,
    pub liquidation_price: Price,
    pub take_profit_price: Option<Price>,
    pub stop_loss_price: Option<Price>,
    pub opened_at: Timestamp,
}

impl Position {
    // 3.1: paper gains/losses at the given price
    pub fn unrealized_pnl(&self, price: Price) -> Quote {
        calculate_unrealized_pnl(self.side, self.entry_price, self.size, price)
    }

    // 3.2: margin + pnl. what closing right now would hand back
    pub fn equity(&self, price: Price) -> Quote {
        self.margin.add(self.unrealized_pnl(price))
    }

    pub fn notional_value(&self, price: Price) -> Quote {
        Quote::new(self.size * price.value())
    }

    pub fn entry_value(&self) -> Quote {
        Quote::new(self.size * self.entry_price.value())
    }
}

// 3.3: the pnl formula
pub fn calculate_unrealized_pnl(side: Side, entry_price: Price, size: Decimal, price: Price) -> Quote {
    let per_unit = (price.value() - entry_price.value()) * side.sign();
    Quote::new(per_unit * size).round()
}

/// Price at which the margin is fully consumed: `entry * (1 ∓ 1/leverage)`.
pub fn liquidation_price(side: Side, entry_price: Price, leverage: Leverage) -> Price {
    let fraction = leverage.margin_fraction();
    match side {
        Side::Long => Price::floored(entry_price.value() * (Decimal::ONE - fraction)),
        Side::Short => Price::floored(entry_price.value() * (Decimal::ONE + fraction)),
    }
}

pub fn effective_leverage(size: Decimal, entry_price: Price, margin: Quote, max_leverage: Decimal) -> Leverage {
    if !margin.is_positive() {
        return Leverage::clamped(max_leverage, max_leverage);
    }
    Leverage::clamped(size * entry_price.value() / margin.value(), max_leverage)
}

#[derive(Debug, Clone)]
pub struct PositionUpdate {
    pub new_position: Option<Position>,
    pub realized_pnl: Quote,
    pub margin_returned: Quote,
}

impl PositionUpdate {
    pub fn is_closed(&self) -> bool {
        self.new_position.is_none()
    }

    /// Cash handed back to the player: margin + pnl.
    pub fn cash_returned(&self) -> Quote {
        self.margin_returned.add(self.realized_pnl)
    }
}

// 3.4: fresh position from margin, leverage and optional tp/sl percentages
pub fn open_position(
    side: Side,
    price: Price,
    margin: Quote,
    leverage: Leverage,
    take_profit_pct: Option<Decimal>,
    stop_loss_pct: Option<Decimal>,
    timestamp: Timestamp,
) -> Position {
    let size = (margin.value() * leverage.value() / price.value()).round_dp(SIZE_DP);
    Position {
        side,
        entry_price: price,
        size,
        margin,
        leverage,
        liquidation_price: liquidation_price(side, price, leverage),
        take_profit_price: take_profit_pct.map(|pct| take_profit_price(side, price, pct)),
        stop_loss_price: stop_loss_pct.map(|pct| stop_loss_price(side, price, pct)),
        opened_at: timestamp,
    }
}

// 3.5: same-side add. entry becomes the size-weighted average, leverage is recombined.
// tp/sl are re-derived from the new entry when given, otherwise kept.
pub fn increase_position(
    position: &Position,
    added_margin: Quote,
    leverage: Leverage,
    price: Price,
    take_profit_pct: Option<Decimal>,
    stop_loss_pct: Option<Decimal>,
    max_leverage: Decimal,
) -> Position {
    let size_delta = (added_margin.value() * leverage.value() / price.value()).round_dp(SIZE_DP);
    let total_size = position.size + size_delta;
    let total_margin = position.margin.add(added_margin);

    // Weighted average entry price
    let entry_price = if total_size > Decimal::ZERO {
        let weighted_sum = position.entry_price.value() * position.size + price.value() * size_delta;
        Price::floored(weighted_sum / total_size)
    } else {
        position.entry_price
    };

    let leverage = effective_leverage(total_size, entry_price, total_margin, max_leverage);
    let side = position.side;

    Position {
        side,
        entry_price,
        size: total_size,
        margin: total_margin,
        leverage,
        liquidation_price: liquidation_price(side, entry_price, leverage),
        take_profit_price: match take_profit_pct {
            Some(pct) => Some(take_profit_price(side, entry_price, pct)),
            None => position.take_profit_price,
        },
        stop_loss_price: match stop_loss_pct {
            Some(pct) => Some(stop_loss_price(side, entry_price, pct)),
            None => position.stop_loss_price,
        },
        opened_at: position.opened_at,
    }
}

// 3.6: opposite-side order. realizes pnl on the reduced fraction of the position.
pub fn reduce_position(position: &Position, reduce_margin: Quote, price: Price, max_leverage: Decimal) -> PositionUpdate {
    let reduce_margin = reduce_margin.clamp(Quote::zero(), position.margin);
    if reduce_margin >= position.margin || !position.margin.is_positive() {
        return close_position(position, price);
    }

    let fraction = reduce_margin.value() / position.margin.value();
    let size_delta = (position.size * fraction).round_dp(SIZE_DP);
    let realized_pnl = calculate_unrealized_pnl(position.side, position.entry_price, size_delta, price);

    let remaining_size = position.size - size_delta;
    let remaining_margin = position.margin.sub(reduce_margin);

    if remaining_size <= Decimal::ZERO || !remaining_margin.is_positive() {
        return PositionUpdate {
            new_position: None,
            realized_pnl,
            margin_returned: reduce_margin,
        };
    }

    let leverage = effective_leverage(remaining_size, position.entry_price, remaining_margin, max_leverage);
    let remaining = Position {
        size: remaining_size,
        margin: remaining_margin,
        leverage,
        liquidation_price: liquidation_price(position.side, position.entry_price, leverage),
        ..position.clone()
    };

    PositionUpdate {
        new_position: Some(remaining),
        realized_pnl,
        margin_returned: reduce_margin,
    }
}

pub fn close_position(position: &Position, price: Price) -> PositionUpdate {
    PositionUpdate {
        new_position: None,
        realized_pnl: position.unrealized_pnl(price),
        margin_returned: position.margin,
    }
}
