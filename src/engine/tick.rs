// 8.5: the per-tick step for one room. the step order matters: the market moves before any
// timer fires and every seat is checked against the freshly moved price.

use super::core::Room;
use super::positions::PositionCheck;
use crate::player::EndReason;
use crate::protocol::{ServerMessage, SessionStatus};
use crate::types::{Quote, Timestamp};
use tracing::debug;

impl Room {
    /** 8.5.1: advance the room by one tick */
    pub fn tick(&mut self, now: Timestamp) {
        if self.status == SessionStatus::Countdown && self.countdown_ends_at.is_some_and(|at| now >= at) {
            self.start_session(now);
        }
        if self.status != SessionStatus::Live {
            return;
        }
        if self.ends_at.is_some_and(|at| now >= at) {
            self.end_session(now);
            return;
        }

        // 8.5.2: pause window freezes the market and every timer
        if let Some(pause_ends_at) = self.scheduler.pause_ends_at {
            if now < pause_ends_at {
                self.broadcast_presence();
                return;
            }
            self.scheduler.pause_ends_at = None;
            self.broadcast_session_status(now);
        }

        let (market, _) = self.simulator.advance(&self.market, &mut self.rng, now);
        self.market = market;
        self.broadcast(ServerMessage::MarketTick {
            market: self.market.clone(),
        });

        self.advance_day(now);
        self.run_market_event(now);
        self.run_npc_chat(now);

        let mut active = 0;
        for index in 0..self.players.len() {
            self.tick_player(index, now);
            if self.players[index].is_active() {
                active += 1;
            }
        }

        if active == 0 {
            self.end_session(now);
        } else {
            self.broadcast_presence();
        }
    }

    // 8.5.3: one seat
    fn tick_player(&mut self, index: usize, now: Timestamp) {
        let liquidated = self.players[index].is_active()
            && self.check_position(index, now) == PositionCheck::Liquidated;

        let price = self.market.price;
        let player = &mut self.players[index];
        let net_worth = player.net_worth(price);
        player.update_peak(price);

        if player.is_active() && (liquidated || !net_worth.is_positive()) {
            self.respawn_player(index, EndReason::Broke, net_worth, now);
        }

        self.expire_personal_event(index, now);
        self.maybe_deliver_personal_event(index, now);
        self.send_self_state(index);
    }

    fn respawn_player(&mut self, index: usize, reason: EndReason, net_worth: Quote, now: Timestamp) {
        let policy = self.respawn;
        let price = self.market.price;
        let player = &mut self.players[index];
        let notice = policy.respawn(player, price, reason, net_worth, now);
        debug!(room = %self.id, client = %player.id(), respawns = player.respawns, "player respawned");

        let name = player.name().to_string();
        let id = player.id().clone();
        let line = match notice.reason {
            EndReason::Broke => format!("{name} got liquidated and respawned with fresh funds."),
            _ => format!("{name} went down and respawned with fresh funds."),
        };
        self.system_chat(line, now);
        self.send_to(&id, ServerMessage::RespawnNotice(notice));
    }
}
