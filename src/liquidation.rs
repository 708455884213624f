//! Liquidation conditions.
//!
//! A position is liquidated the moment the price touches or crosses its liquidation price.
//! The whole margin is lost. There are no partial liquidations.

use crate::position::Position;
use crate::types::{Price, Quote, Side, Timestamp};
use serde::{Deserialize, Serialize};

/// Outcome of a forced close, recorded as a LIQUIDATION history entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiquidationResult {
    pub side: Side,
    pub price: Price,
    pub realized_pnl: Quote,
    pub timestamp: Timestamp,
}

/// True once the price reaches the losing side of the liquidation price.
pub fn is_liquidatable(position: &Position, price: Price) -> bool {
    match position.side {
        Side::Long => price <= position.liquidation_price,
        Side::Short => price >= position.liquidation_price,
    }
}

/// Liquidation forfeits the margin: pnl is always `-margin`.
pub fn liquidate(position: &Position, price: Price, timestamp: Timestamp) -> LiquidationResult {
    LiquidationResult {
        side: position.side,
        price,
        realized_pnl: position.margin.negate(),
        timestamp,
    }
}

/// Liquidate if the price has crossed, otherwise leave the position alone.
pub fn check_liquidation(position: &Position, price: Price, timestamp: Timestamp) -> Option<LiquidationResult> {
    if is_liquidatable(position, price) {
        Some(liquidate(position, price, timestamp))
    } else {
        None
    }
}
