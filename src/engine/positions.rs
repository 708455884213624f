//! Position bookkeeping on a seat: closes, stop triggers and liquidations.

use super::core::Room;
use crate::conditional::{check_stops, StopKind};
use crate::liquidation::check_liquidation;
use crate::player::{TradeHistoryItem, TradeKind};
use crate::position::close_position;
use crate::types::{Price, Quote, Side, Timestamp};
use rust_decimal::RoundingStrategy;
use tracing::debug;

/// What the per-tick check did to a seat's position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum PositionCheck {
    Untouched,
    Liquidated,
    Stopped(StopKind),
}

/// `+12.34` / `-5.00`, the shape trade chat lines use.
pub(super) fn signed_pnl(pnl: Quote) -> String {
    let sign = if pnl.is_negative() { "" } else { "+" };
    let rounded = pnl.value().round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    format!("{sign}{rounded:.2}")
}

pub(super) fn price_text(price: Price) -> String {
    let rounded = price.value().round_dp_with_strategy(6, RoundingStrategy::MidpointAwayFromZero);
    format!("{rounded:.6}")
}

impl Room {
    /// Close at the current mark, record CLOSE, hand margin + pnl back.
    pub(super) fn force_close(&mut self, index: usize, now: Timestamp) -> Option<(Side, Quote)> {
        let price = self.market.price;
        let player = &mut self.players[index];
        let position = player.state.position.take()?;
        let update = close_position(&position, price);

        player.credit(update.cash_returned());
        player.record_trade(TradeHistoryItem {
            kind: TradeKind::Close,
            side: position.side,
            price,
            time: now,
            pnl: Some(update.realized_pnl),
        });
        player.update_peak(price);
        Some((position.side, update.realized_pnl))
    }

    // 8.5.1: liquidation wins over stops. a liquidated margin is simply gone
    pub(super) fn check_position(&mut self, index: usize, now: Timestamp) -> PositionCheck {
        let price = self.market.price;
        let player = &mut self.players[index];
        let Some(position) = player.state.position.as_ref() else {
            return PositionCheck::Untouched;
        };

        if let Some(result) = check_liquidation(position, price, now) {
            debug!(room = %self.id, client = %player.id(), price = %price, "position liquidated");
            player.state.position = None;
            player.record_trade(TradeHistoryItem {
                kind: TradeKind::Liquidation,
                side: result.side,
                price: result.price,
                time: result.timestamp,
                pnl: Some(result.realized_pnl),
            });
            return PositionCheck::Liquidated;
        }

        match check_stops(position, price) {
            Some(kind) => {
                self.force_close(index, now);
                PositionCheck::Stopped(kind)
            }
            None => PositionCheck::Untouched,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GameConfig;
    use crate::engine::RoomOptions;
    use crate::player::{PlayerRuntime, RoleKey};
    use crate::position::open_position;
    use crate::types::{ClientId, Leverage, RoomId};
    use rust_decimal_macros::dec;
    use std::sync::Arc;

    fn room_with_position(side: Side, leverage: rust_decimal::Decimal, tp: Option<rust_decimal::Decimal>) -> Room {
        let mut room = Room::new(
            RoomId::new("r"),
            RoomOptions {
                max_players: 2,
                seed: Some(3),
                ..RoomOptions::default()
            },
            Arc::new(GameConfig::test()),
            Timestamp::from_millis(0),
        );
        room.market.price = Price::new_unchecked(dec!(1));
        let mut player = PlayerRuntime::new(ClientId::new("p"), "p".into(), RoleKey::Worker);
        player.state.cash = Quote::new(dec!(4000));
        player.state.position = Some(open_position(
            side,
            Price::new_unchecked(dec!(1)),
            Quote::new(dec!(1000)),
            Leverage::new(leverage).unwrap(),
            tp,
            None,
            Timestamp::from_millis(0),
        ));
        room.players.push(player);
        room
    }

    #[test]
    fn force_close_returns_margin_plus_pnl() {
        let mut room = room_with_position(Side::Long, dec!(2), None);
        room.market.price = Price::new_unchecked(dec!(1.1));
        let (side, pnl) = room.force_close(0, Timestamp::from_millis(5)).unwrap();
        assert_eq!(side, Side::Long);
        assert_eq!(pnl.value(), dec!(200));
        assert_eq!(room.players[0].state.cash.value(), dec!(5200));
        assert_eq!(room.players[0].state.history.last().unwrap().kind, TradeKind::Close);
        assert!(room.force_close(0, Timestamp::from_millis(6)).is_none());
    }

    #[test]
    fn liquidation_forfeits_margin() {
        let mut room = room_with_position(Side::Long, dec!(10), None);
        room.market.price = Price::new_unchecked(dec!(0.85));
        assert_eq!(room.check_position(0, Timestamp::from_millis(5)), PositionCheck::Liquidated);
        let player = &room.players[0];
        assert!(player.state.position.is_none());
        assert_eq!(player.state.cash.value(), dec!(4000));
        assert_eq!(player.state.history.last().unwrap().pnl.unwrap().value(), dec!(-1000));
    }

    #[test]
    fn take_profit_closes_at_the_mark() {
        let mut room = room_with_position(Side::Short, dec!(2), Some(dec!(10)));
        room.market.price = Price::new_unchecked(dec!(0.89));
        assert_eq!(
            room.check_position(0, Timestamp::from_millis(5)),
            PositionCheck::Stopped(StopKind::TakeProfit)
        );
        assert!(room.players[0].state.cash > Quote::new(dec!(5000)));
    }

    #[test]
    fn pnl_text_is_signed() {
        assert_eq!(signed_pnl(Quote::new(dec!(12.346))), "+12.35");
        assert_eq!(signed_pnl(Quote::new(dec!(-5))), "-5.00");
        assert_eq!(price_text(Price::new_unchecked(dec!(0.0001234567))), "0.000123");
    }
}
