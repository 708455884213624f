//! Timed room content: market events, NPC chatter, personal events and daily expenses.

use super::core::Room;
use super::results::RoomError;
use crate::chat::{npc_line, ChatKind, ChatMessage};
use crate::market::apply_market_event;
use crate::player::PendingEvent;
use crate::protocol::ServerMessage;
use crate::scheduler::{personal_event_due, pick_personal_event, schedule_personal_event};
use crate::types::{ClientId, Quote, Timestamp};
use rand::seq::SliceRandom;
use tracing::debug;

impl Room {
    // 8.4.1: market events. with nothing eligible the timer is simply re-armed
    pub(super) fn run_market_event(&mut self, now: Timestamp) {
        if !self.scheduler.market_event_due(now) {
            return;
        }
        let phase = self.market.phase;
        let Some(event) = self
            .scheduler
            .pick_market_event(&self.pack, phase, self.current_day, &mut self.rng)
            .cloned()
        else {
            self.scheduler.schedule_market_event(&self.pack.settings, &mut self.rng, now);
            return;
        };

        debug!(room = %self.id, event = %event.id, "market event");
        self.market = apply_market_event(&self.market, &event.effect);
        self.scheduler.remember_market_event(&event.id);
        self.scheduler.schedule_market_event(&self.pack.settings, &mut self.rng, now);
        let shifted = self.scheduler.apply_pause(now, self.config.event_pause_ms, &mut self.players);
        if shifted > 0 {
            self.broadcast_session_status(now);
        }

        let line = format!("{}: {}", event.title, event.description);
        self.broadcast(ServerMessage::MarketEvent { event });
        self.system_chat(line, now);
    }

    pub(super) fn run_npc_chat(&mut self, now: Timestamp) {
        if !self.scheduler.npc_chat_due(now) {
            return;
        }
        let line = npc_line(self.market.phase, &mut self.rng);
        if let Some(effect) = &line.effect {
            self.market = apply_market_event(&self.market, &effect.to_market_effect());
        }
        self.push_chat(ChatMessage::new(line.sender, line.text, ChatKind::Npc, now));
        self.scheduler.schedule_npc_chat(&mut self.rng, now);
    }

    // 8.4.2: day rollover. each ACTIVE seat pays one expense per new day
    pub(super) fn advance_day(&mut self, now: Timestamp) {
        let Some(started_at) = self.started_at else {
            return;
        };
        let elapsed_days = now.since(started_at) / self.config.day_length_ms();
        let day = u32::try_from(elapsed_days)
            .unwrap_or(u32::MAX)
            .saturating_add(1)
            .min(self.config.days_per_session);
        if day == self.current_day {
            return;
        }
        self.current_day = day;

        for index in 0..self.players.len() {
            let player = &self.players[index];
            if !player.is_active() || player.last_expense_day >= day {
                continue;
            }
            let Some(expense) = self.pack.daily_expenses.choose(&mut self.rng).cloned() else {
                continue;
            };
            let player = &mut self.players[index];
            player.charge(Quote::new(expense.cost));
            player.last_expense_day = day;
            let line = format!("{} spent {} on {}.", player.name(), expense.cost, expense.label);
            self.system_chat(line, now);
        }

        self.broadcast_session_status(now);
    }

    // 8.4.3: personal events
    pub(super) fn maybe_deliver_personal_event(&mut self, index: usize, now: Timestamp) {
        let player = &self.players[index];
        if !player.is_active() || player.pending_event.is_some() || !personal_event_due(player, now) {
            return;
        }

        let phase = self.market.phase;
        let picked = pick_personal_event(&self.pack, &self.players[index], phase, self.current_day, &mut self.rng).cloned();
        let player = &mut self.players[index];
        let Some(event) = picked else {
            schedule_personal_event(player, &self.pack.settings, &mut self.rng, now);
            return;
        };

        let expires_at = now.plus(self.config.personal_event_decision_ms);
        player.remember_personal_event(&event.id, self.config.recent_personal_events);
        player.pending_event = Some(PendingEvent {
            event: event.clone(),
            expires_at,
        });
        let id = player.id().clone();
        self.send_to(&id, ServerMessage::PersonalEvent { event, expires_at });
    }

    /// Apply a choice, clear the pending event and re-arm the timer from `now`.
    fn resolve_personal_event(&mut self, index: usize, choice_id: Option<&str>, now: Timestamp) {
        let player = &mut self.players[index];
        let Some(pending) = player.pending_event.take() else {
            return;
        };
        let choice = match choice_id {
            Some(id) => pending.event.choice(id),
            None => pending.event.fallback_choice(),
        };
        if let Some(choice) = choice {
            player.apply_effect(&choice.effect);
        }
        schedule_personal_event(player, &self.pack.settings, &mut self.rng, now);
        self.send_self_state(index);
    }

    pub(super) fn expire_personal_event(&mut self, index: usize, now: Timestamp) {
        let expired = self.players[index]
            .pending_event
            .as_ref()
            .is_some_and(|pending| now >= pending.expires_at);
        if !expired {
            return;
        }

        let has_choice = self.players[index]
            .pending_event
            .as_ref()
            .is_some_and(|pending| pending.event.fallback_choice().is_some());
        if has_choice {
            self.resolve_personal_event(index, None, now);
        } else {
            let player = &mut self.players[index];
            player.pending_event = None;
            schedule_personal_event(player, &self.pack.settings, &mut self.rng, now);
        }
    }

    /// Player's answer. Stale, mismatched or unknown choices are dropped.
    pub fn event_choice(
        &mut self,
        client_id: &ClientId,
        event_id: &str,
        choice_id: &str,
        now: Timestamp,
    ) -> Result<(), RoomError> {
        let index = self.player_index(client_id)?;
        let valid = self.players[index].pending_event.as_ref().is_some_and(|pending| {
            pending.event.id == event_id && now <= pending.expires_at && pending.event.choice(choice_id).is_some()
        });
        if !valid {
            return Err(RoomError::NoOp);
        }
        self.resolve_personal_event(index, Some(choice_id), now);
        Ok(())
    }
}
