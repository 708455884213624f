//! Trade execution at the room's current token price.

use super::core::Room;
use super::positions::{price_text, signed_pnl};
use super::results::{RoomError, TradeDenied, TradeOutcome};
use crate::conditional::{clamp_stop_loss_pct, clamp_take_profit_pct};
use crate::player::{TradeHistoryItem, TradeKind};
use crate::position::{increase_position, open_position, reduce_position};
use crate::protocol::{SessionStatus, TradeAction, TradeRequest};
use crate::types::{ClientId, Leverage, Quote, Timestamp};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

/// Margin a request commits out of `budget`. `size_cash` wins over `size_percent`.
pub fn resolve_margin(request: &TradeRequest, budget: Quote) -> Quote {
    match request.size_cash {
        Some(cash) => Quote::new(cash).clamp(Quote::zero(), budget),
        None => {
            let pct = request.size_percent.unwrap_or(dec!(100)).max(dec!(1)).min(dec!(100));
            budget.mul(pct / dec!(100)).round()
        }
    }
}

impl Room {
    // 8.3.1: preconditions, checked in this order
    fn check_trade_allowed(&self, index: usize, now: Timestamp) -> Result<(), TradeDenied> {
        let player = &self.players[index];
        if self.status != SessionStatus::Live {
            return Err(TradeDenied::NotLive);
        }
        if !player.is_active() {
            return Err(TradeDenied::NotActive);
        }
        if player.in_respawn_cooldown(now) {
            return Err(TradeDenied::Respawning);
        }
        if self.scheduler.is_paused(now) {
            return Err(TradeDenied::Paused);
        }
        if player.pending_event.as_ref().is_some_and(|p| now < p.expires_at) {
            return Err(TradeDenied::PersonalEvent);
        }
        if !self.market.price.is_tradable() {
            return Err(TradeDenied::InvalidPrice);
        }
        Ok(())
    }

    /** 8.3.2: execute a trade. OPEN opens, adds or reduces depending on the held side. */
    pub fn execute_trade(
        &mut self,
        client_id: &ClientId,
        request: &TradeRequest,
        now: Timestamp,
    ) -> Result<TradeOutcome, RoomError> {
        let index = self.player_index(client_id)?;
        self.check_trade_allowed(index, now)?;

        let outcome = match request.action {
            TradeAction::Open => self.open_or_adjust(index, request, now),
            TradeAction::Close => self.close_trade(index, now),
        };

        if outcome != TradeOutcome::Ignored {
            self.send_self_state(index);
            let line = self.trade_line(index, &outcome);
            self.system_chat(line, now);
            self.broadcast_presence();
        }
        Ok(outcome)
    }

    fn open_or_adjust(&mut self, index: usize, request: &TradeRequest, now: Timestamp) -> TradeOutcome {
        let price = self.market.price;
        let max_leverage = self.config.max_leverage;
        let side = request.side();
        let leverage = Leverage::clamped(request.leverage.unwrap_or(Decimal::ONE), max_leverage);
        let take_profit = request.take_profit_pct.map(clamp_take_profit_pct);
        let stop_loss = request.stop_loss_pct.map(clamp_stop_loss_pct);

        let player = &mut self.players[index];
        let held = player.state.position.clone();

        match held {
            None => {
                let margin = resolve_margin(request, player.state.cash);
                if !margin.is_positive() {
                    return TradeOutcome::Ignored;
                }
                player.charge(margin);
                player.state.position = Some(open_position(side, price, margin, leverage, take_profit, stop_loss, now));
                player.record_trade(TradeHistoryItem {
                    kind: TradeKind::Open,
                    side,
                    price,
                    time: now,
                    pnl: None,
                });
                TradeOutcome::Opened { side, margin }
            }
            Some(position) if position.side == side => {
                let margin = resolve_margin(request, player.state.cash);
                if !margin.is_positive() {
                    return TradeOutcome::Ignored;
                }
                player.charge(margin);
                player.state.position = Some(increase_position(
                    &position,
                    margin,
                    leverage,
                    price,
                    take_profit,
                    stop_loss,
                    max_leverage,
                ));
                player.record_trade(TradeHistoryItem {
                    kind: TradeKind::Open,
                    side,
                    price,
                    time: now,
                    pnl: None,
                });
                TradeOutcome::Added { side, margin }
            }
            Some(position) => {
                let reduce = resolve_margin(request, position.margin);
                if !reduce.is_positive() {
                    return TradeOutcome::Ignored;
                }
                let update = reduce_position(&position, reduce, price, max_leverage);
                player.credit(update.cash_returned());
                player.record_trade(TradeHistoryItem {
                    kind: TradeKind::Close,
                    side: position.side,
                    price,
                    time: now,
                    pnl: Some(update.realized_pnl),
                });
                let closed = update.is_closed();
                player.state.position = update.new_position;
                player.update_peak(price);

                if closed {
                    TradeOutcome::Closed {
                        side: position.side,
                        pnl: update.realized_pnl,
                    }
                } else {
                    TradeOutcome::Reduced {
                        side: position.side,
                        pnl: update.realized_pnl,
                    }
                }
            }
        }
    }

    fn close_trade(&mut self, index: usize, now: Timestamp) -> TradeOutcome {
        match self.force_close(index, now) {
            Some((side, pnl)) => TradeOutcome::Closed { side, pnl },
            None => TradeOutcome::Ignored,
        }
    }

    fn trade_line(&self, index: usize, outcome: &TradeOutcome) -> String {
        let player = &self.players[index];
        let name = player.name();
        let price = price_text(self.market.price);
        match outcome {
            TradeOutcome::Opened { side, .. } => {
                let leverage = player
                    .state
                    .position
                    .as_ref()
                    .map(|p| p.leverage.to_string())
                    .unwrap_or_else(|| Leverage::one().to_string());
                format!("{name} opened {side} {leverage} @ {price}")
            }
            TradeOutcome::Added { side, .. } => format!("{name} added {side} @ {price}"),
            TradeOutcome::Reduced { side, pnl } => {
                format!("{name} reduced {side} @ {price} ({} U)", signed_pnl(*pnl))
            }
            TradeOutcome::Closed { side, pnl } => {
                format!("{name} closed {side} @ {price} ({} U)", signed_pnl(*pnl))
            }
            TradeOutcome::Ignored => String::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GameConfig;
    use crate::engine::{JoinRequest, RoomOptions};
    use crate::pack::core_pack;
    use crate::player::{PendingEvent, RoleKey};
    use crate::types::{Price, RoomId, Side};
    use std::sync::Arc;

    fn live_room() -> (Room, ClientId) {
        let mut room = Room::new(
            RoomId::new("pit"),
            RoomOptions {
                max_players: 4,
                seed: Some(5),
                ..RoomOptions::default()
            },
            Arc::new(GameConfig::test()),
            Timestamp::from_millis(0),
        );
        let id = ClientId::new("trader");
        room.admit(
            JoinRequest {
                client_id: id.clone(),
                name: "trader".into(),
                role_key: RoleKey::Worker,
                room_name: None,
                room_key: String::new(),
            },
            Timestamp::from_millis(0),
        )
        .unwrap();
        room.start_session(Timestamp::from_millis(1_000));
        room.market.price = Price::new_unchecked(dec!(1));
        room.take_dispatches();
        (room, id)
    }

    fn open(side: Side, leverage: Decimal, pct: Decimal) -> TradeRequest {
        TradeRequest {
            leverage: Some(leverage),
            size_percent: Some(pct),
            ..TradeRequest::open(side)
        }
    }

    #[test]
    fn margin_resolution_prefers_cash() {
        let budget = Quote::new(dec!(1000));
        let mut req = TradeRequest::open(Side::Long);
        assert_eq!(resolve_margin(&req, budget).value(), dec!(1000));
        req.size_percent = Some(dec!(0));
        assert_eq!(resolve_margin(&req, budget).value(), dec!(10));
        req.size_cash = Some(dec!(5000));
        assert_eq!(resolve_margin(&req, budget).value(), dec!(1000));
        req.size_cash = Some(dec!(-3));
        assert_eq!(resolve_margin(&req, budget), Quote::zero());
    }

    #[test]
    fn open_add_reduce_close() {
        let (mut room, id) = live_room();
        let now = Timestamp::from_millis(2_000);

        let outcome = room.execute_trade(&id, &open(Side::Long, dec!(10), dec!(20)), now).unwrap();
        assert_eq!(
            outcome,
            TradeOutcome::Opened {
                side: Side::Long,
                margin: Quote::new(dec!(1000))
            }
        );
        assert_eq!(room.players()[0].state.cash.value(), dec!(4000));
        assert_eq!(
            room.chat_log().last().unwrap().text,
            "trader opened LONG 10x @ 1.000000"
        );

        let outcome = room.execute_trade(&id, &open(Side::Long, dec!(10), dec!(25)), now).unwrap();
        assert!(matches!(outcome, TradeOutcome::Added { .. }));
        assert_eq!(room.players()[0].state.cash.value(), dec!(3000));

        room.market.price = Price::new_unchecked(dec!(1.05));
        let outcome = room.execute_trade(&id, &open(Side::Short, dec!(1), dec!(50)), now).unwrap();
        let TradeOutcome::Reduced { pnl, .. } = outcome else {
            panic!("expected a reduce, got {outcome:?}");
        };
        // half of 20000 units, +0.05 each
        assert_eq!(pnl.value(), dec!(500));
        assert_eq!(room.players()[0].state.cash.value(), dec!(4500));

        let outcome = room.execute_trade(&id, &TradeRequest::close(), now).unwrap();
        assert!(matches!(outcome, TradeOutcome::Closed { .. }));
        assert!(room.players()[0].state.position.is_none());
        assert_eq!(room.players()[0].state.cash.value(), dec!(6000));
        assert!(room.chat_log().last().unwrap().text.ends_with("(+500.00 U)"));

        assert_eq!(
            room.execute_trade(&id, &TradeRequest::close(), now).unwrap(),
            TradeOutcome::Ignored
        );
    }

    #[test]
    fn denials_follow_precondition_order() {
        let (mut room, id) = live_room();
        let now = Timestamp::from_millis(2_000);

        room.players[0].pending_event = Some(PendingEvent {
            event: core_pack().personal_events[0].clone(),
            expires_at: now.plus(10_000),
        });
        assert_eq!(
            room.execute_trade(&id, &TradeRequest::open(Side::Long), now),
            Err(RoomError::Trade(TradeDenied::PersonalEvent))
        );

        room.scheduler.pause_ends_at = Some(now.plus(1));
        assert_eq!(
            room.execute_trade(&id, &TradeRequest::open(Side::Long), now),
            Err(RoomError::Trade(TradeDenied::Paused))
        );

        room.players[0].respawn_cooldown_ends_at = Some(now.plus(1));
        assert_eq!(
            room.execute_trade(&id, &TradeRequest::open(Side::Long), now),
            Err(RoomError::Trade(TradeDenied::Respawning))
        );

        room.end_session(now);
        assert_eq!(
            room.execute_trade(&id, &TradeRequest::open(Side::Long), now),
            Err(RoomError::Trade(TradeDenied::NotLive))
        );
    }

    #[test]
    fn empty_wallet_open_is_a_no_op() {
        let (mut room, id) = live_room();
        room.players[0].state.cash = Quote::zero();
        let outcome = room
            .execute_trade(&id, &TradeRequest::open(Side::Short), Timestamp::from_millis(2_000))
            .unwrap();
        assert_eq!(outcome, TradeOutcome::Ignored);
        assert!(room.take_dispatches().is_empty());
    }
}
