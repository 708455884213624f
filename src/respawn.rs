// 6.0: respawn instead of elimination. a broke player is force-closed, reset to ACTIVE and
// handed a shrinking stake: max(1, floor(base * pct^n)) after the nth respawn.
// trading stays locked until the cooldown deadline passes.

use crate::liquidation::liquidate;
use crate::player::{EndReason, PlayerRuntime, PlayerStatus, TradeHistoryItem, TradeKind};
use crate::types::{Price, Quote, Timestamp};
use rust_decimal::{Decimal, MathematicalOps};
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy)]
pub struct RespawnPolicy {
    pub base_pct: Decimal,
    pub pause_ms: i64,
}

impl Default for RespawnPolicy {
    fn default() -> Self {
        Self {
            base_pct: dec!(0.5),
            pause_ms: 5_000,
        }
    }
}

/// Private notice for the respawned connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RespawnNotice {
    pub reason: EndReason,
    pub pause_ms: i64,
    pub current_cash: Quote,
    pub respawn_cash: Quote,
    pub penalty_pct: Decimal,
}

impl RespawnPolicy {
    pub fn new(base_pct: Decimal, pause_ms: i64) -> Self {
        Self { base_pct, pause_ms }
    }

    // 6.1: stake after the nth respawn. overflow or underflow of the power collapses to the floor of 1
    pub fn respawn_cash(&self, base_cash: Quote, respawns: u32) -> Quote {
        let factor = self
            .base_pct
            .checked_powu(u64::from(respawns))
            .unwrap_or(Decimal::ZERO);
        let cash = (base_cash.value() * factor).floor();
        Quote::new(cash.max(Decimal::ONE))
    }

    /// Respawn stake as a percent of the base stake.
    pub fn penalty_pct(&self, base_cash: Quote, respawn_cash: Quote) -> Decimal {
        if !base_cash.is_positive() {
            return Decimal::ZERO;
        }
        (respawn_cash.value() / base_cash.value() * dec!(100)).round()
    }

    // 6.2: apply the reset. `current_cash` is the net worth observed before the reset
    pub fn respawn(
        &self,
        player: &mut PlayerRuntime,
        price: Price,
        reason: EndReason,
        current_cash: Quote,
        now: Timestamp,
    ) -> RespawnNotice {
        player.respawns += 1;

        if let Some(position) = player.state.position.take() {
            let result = liquidate(&position, price, now);
            player.record_trade(TradeHistoryItem {
                kind: TradeKind::Liquidation,
                side: result.side,
                price: result.price,
                time: result.timestamp,
                pnl: Some(result.realized_pnl),
            });
        }

        player.state.status = PlayerStatus::Active;
        player.state.end_reason = None;
        player.pending_event = None;

        let respawn_cash = self.respawn_cash(player.base_cash, player.respawns);
        player.state.cash = respawn_cash;
        player.state.stress = Decimal::ZERO;
        player.respawn_cooldown_ends_at = Some(now.plus(self.pause_ms));

        RespawnNotice {
            reason: match reason {
                EndReason::Broke => EndReason::Broke,
                _ => EndReason::Dead,
            },
            pause_ms: self.pause_ms,
            current_cash: current_cash.floor_zero(),
            respawn_cash,
            penalty_pct: self.penalty_pct(player.base_cash, respawn_cash),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::player::RoleKey;
    use crate::position::open_position;
    use crate::types::{ClientId, Leverage, Side};

    #[test]
    fn respawn_cash_halves() {
        let policy = RespawnPolicy::default();
        let base = Quote::new(dec!(5000));
        assert_eq!(policy.respawn_cash(base, 1).value(), dec!(2500));
        assert_eq!(policy.respawn_cash(base, 2).value(), dec!(1250));
        assert_eq!(policy.respawn_cash(base, 3).value(), dec!(625));
        // 5000 / 8192 floors to 0, clamps to 1
        assert_eq!(policy.respawn_cash(base, 13).value(), dec!(1));
        assert_eq!(policy.respawn_cash(base, 500).value(), dec!(1));
    }

    #[test]
    fn respawn_force_closes_as_liquidation() {
        let policy = RespawnPolicy::default();
        let mut player = PlayerRuntime::new(ClientId::new("p"), "bob".into(), RoleKey::Og);
        player.state.cash = Quote::zero();
        player.state.position = Some(open_position(
            Side::Long,
            Price::new_unchecked(dec!(1)),
            Quote::new(dec!(5000)),
            Leverage::new(dec!(10)).unwrap(),
            None,
            None,
            Timestamp::from_millis(0),
        ));

        let now = Timestamp::from_millis(10_000);
        let notice = policy.respawn(&mut player, Price::new_unchecked(dec!(0.85)), EndReason::Broke, Quote::zero(), now);

        assert!(player.state.position.is_none());
        assert_eq!(player.state.cash.value(), dec!(2500));
        assert_eq!(player.respawns, 1);
        assert_eq!(player.respawn_cooldown_ends_at, Some(now.plus(5_000)));
        assert!(player.in_respawn_cooldown(now.plus(4_999)));
        assert!(!player.in_respawn_cooldown(now.plus(5_000)));

        let last = player.state.history.last().unwrap();
        assert_eq!(last.kind, TradeKind::Liquidation);
        assert_eq!(last.pnl.unwrap().value(), dec!(-5000));

        assert_eq!(notice.respawn_cash.value(), dec!(2500));
        assert_eq!(notice.penalty_pct, dec!(50));
        assert_eq!(notice.reason, EndReason::Broke);
    }
}
