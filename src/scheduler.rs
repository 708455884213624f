// 5.1: EventScheduler. independent absolute-deadline timers: one for market events and one
// for npc chatter per room, one personal-event timer per player. a market event opens a pause
// window and every outstanding timer is pushed back by the same delta.

use crate::market::{unit_interval, MarketPhase};
use crate::pack::{conditions_match, EligibilityContext, EventPack, EventPackSettings, MarketEvent, PersonalEvent};
use crate::player::PlayerRuntime;
use crate::types::Timestamp;
use rand::seq::SliceRandom;
use rand::Rng;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::collections::VecDeque;

/// Uniform delay in `[min, max)` ms. Degenerate ranges return `min`.
pub fn random_delay<R: Rng + ?Sized>(rng: &mut R, min_ms: i64, max_ms: i64) -> i64 {
    if max_ms <= min_ms {
        return min_ms.max(0);
    }
    let span = Decimal::from(max_ms - min_ms);
    let offset = (unit_interval(rng) * span).floor().to_i64().unwrap_or(0);
    min_ms + offset
}

#[derive(Debug, Clone)]
pub struct EventScheduler {
    pub next_market_event_at: Timestamp,
    pub next_npc_chat_at: Timestamp,
    pub pause_ends_at: Option<Timestamp>,
    recent_market_events: VecDeque<String>,
    recent_market_cap: usize,
    npc_min_ms: i64,
    npc_max_ms: i64,
}

impl EventScheduler {
    pub fn new<R: Rng + ?Sized>(
        settings: &EventPackSettings,
        npc_bounds: (i64, i64),
        recent_market_cap: usize,
        rng: &mut R,
        now: Timestamp,
    ) -> Self {
        let mut scheduler = Self {
            next_market_event_at: now,
            next_npc_chat_at: now,
            pause_ends_at: None,
            recent_market_events: VecDeque::new(),
            recent_market_cap: recent_market_cap.max(1),
            npc_min_ms: npc_bounds.0,
            npc_max_ms: npc_bounds.1,
        };
        scheduler.schedule_market_event(settings, rng, now);
        scheduler.schedule_npc_chat(rng, now);
        scheduler
    }

    // 5.1.1: re-arming
    pub fn schedule_market_event<R: Rng + ?Sized>(&mut self, settings: &EventPackSettings, rng: &mut R, now: Timestamp) {
        let delay = random_delay(rng, settings.market_event_min_ms, settings.market_event_max_ms);
        self.next_market_event_at = now.plus(delay);
    }

    pub fn schedule_npc_chat<R: Rng + ?Sized>(&mut self, rng: &mut R, now: Timestamp) {
        let delay = random_delay(rng, self.npc_min_ms, self.npc_max_ms);
        self.next_npc_chat_at = now.plus(delay);
    }

    pub fn market_event_due(&self, now: Timestamp) -> bool {
        now >= self.next_market_event_at
    }

    pub fn npc_chat_due(&self, now: Timestamp) -> bool {
        now >= self.next_npc_chat_at
    }

    pub fn is_paused(&self, now: Timestamp) -> bool {
        self.pause_ends_at.is_some_and(|ends| now < ends)
    }

    pub fn recent_market_events(&self) -> impl Iterator<Item = &str> {
        self.recent_market_events.iter().map(String::as_str)
    }

    pub fn remember_market_event(&mut self, event_id: &str) {
        self.recent_market_events.push_back(event_id.to_string());
        while self.recent_market_events.len() > self.recent_market_cap {
            self.recent_market_events.pop_front();
        }
    }

    /// New session: forget history and any open pause.
    pub fn reset(&mut self) {
        self.recent_market_events.clear();
        self.pause_ends_at = None;
    }

    // 5.1.2: market events are checked against a zero-cash, zero-stress context
    pub fn pick_market_event<'a, R: Rng + ?Sized>(
        &self,
        pack: &'a EventPack,
        phase: MarketPhase,
        day: u32,
        rng: &mut R,
    ) -> Option<&'a MarketEvent> {
        let ctx = EligibilityContext {
            cash: Decimal::ZERO,
            stress: Decimal::ZERO,
            day,
            phase,
        };
        let candidates: Vec<&MarketEvent> = pack
            .market_events
            .iter()
            .filter(|event| !self.recent_market_events.contains(&event.id))
            .filter(|event| conditions_match(event.conditions.as_ref(), &ctx))
            .collect();
        candidates.choose(rng).copied()
    }

    // 5.1.3: pause window. extends to max(current end, now + ms) and shifts every timer by the
    // extension. returns the shift applied, 0 when the existing pause already covers it.
    pub fn apply_pause(&mut self, now: Timestamp, pause_ms: i64, players: &mut [PlayerRuntime]) -> i64 {
        let previous = self.pause_ends_at.unwrap_or(now);
        let next = previous.max(now.plus(pause_ms));
        let delta = next.since(previous);
        if delta <= 0 {
            return 0;
        }

        self.pause_ends_at = Some(next);
        self.next_market_event_at = self.next_market_event_at.plus(delta);
        self.next_npc_chat_at = self.next_npc_chat_at.plus(delta);
        for player in players.iter_mut() {
            if let Some(at) = player.next_personal_event_at {
                player.next_personal_event_at = Some(at.plus(delta));
            }
        }
        delta
    }
}

// 5.1.4: per-player personal events
pub fn schedule_personal_event<R: Rng + ?Sized>(
    player: &mut PlayerRuntime,
    settings: &EventPackSettings,
    rng: &mut R,
    now: Timestamp,
) {
    let delay = random_delay(rng, settings.personal_event_min_ms, settings.personal_event_max_ms);
    player.next_personal_event_at = Some(now.plus(delay));
}

pub fn personal_event_due(player: &PlayerRuntime, now: Timestamp) -> bool {
    player.next_personal_event_at.is_some_and(|at| now >= at)
}

pub fn pick_personal_event<'a, R: Rng + ?Sized>(
    pack: &'a EventPack,
    player: &PlayerRuntime,
    phase: MarketPhase,
    day: u32,
    rng: &mut R,
) -> Option<&'a PersonalEvent> {
    let ctx = EligibilityContext {
        cash: player.state.cash.value(),
        stress: player.state.stress,
        day,
        phase,
    };
    let candidates: Vec<&PersonalEvent> = pack
        .personal_events
        .iter()
        .filter(|event| !player.recent_personal_events.contains(&event.id))
        .filter(|event| conditions_match(event.conditions.as_ref(), &ctx))
        .collect();
    candidates.choose(rng).copied()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pack::core_pack;
    use crate::player::RoleKey;
    use crate::types::{ClientId, Quote};
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use rust_decimal_macros::dec;

    fn scheduler(rng: &mut StdRng, now: Timestamp) -> EventScheduler {
        EventScheduler::new(&core_pack().settings, (8_000, 18_000), 6, rng, now)
    }

    #[test]
    fn delays_stay_in_range() {
        let mut rng = StdRng::seed_from_u64(1);
        for _ in 0..500 {
            let d = random_delay(&mut rng, 30_000, 55_000);
            assert!((30_000..55_000).contains(&d));
        }
        assert_eq!(random_delay(&mut rng, 5, 5), 5);
    }

    #[test]
    fn pause_shifts_every_timer_equally() {
        let mut rng = StdRng::seed_from_u64(2);
        let now = Timestamp::from_millis(100_000);
        let mut sched = scheduler(&mut rng, now);
        let mut players = vec![PlayerRuntime::new(ClientId::new("a"), "a".into(), RoleKey::Worker)];
        schedule_personal_event(&mut players[0], &core_pack().settings, &mut rng, now);

        let market_before = sched.next_market_event_at;
        let npc_before = sched.next_npc_chat_at;
        let personal_before = players[0].next_personal_event_at.unwrap();

        let delta = sched.apply_pause(now, 5_000, &mut players);
        assert_eq!(delta, 5_000);
        assert_eq!(sched.pause_ends_at, Some(now.plus(5_000)));
        assert_eq!(sched.next_market_event_at, market_before.plus(5_000));
        assert_eq!(sched.next_npc_chat_at, npc_before.plus(5_000));
        assert_eq!(players[0].next_personal_event_at, Some(personal_before.plus(5_000)));
        assert!(sched.is_paused(now.plus(4_999)));
        assert!(!sched.is_paused(now.plus(5_000)));

        // overlapping pause only extends by the uncovered part
        let delta = sched.apply_pause(now.plus(2_000), 5_000, &mut players);
        assert_eq!(delta, 2_000);
        assert_eq!(sched.pause_ends_at, Some(now.plus(7_000)));
    }

    #[test]
    fn market_events_skip_recent_ids() {
        let mut rng = StdRng::seed_from_u64(3);
        let now = Timestamp::from_millis(0);
        let mut sched = scheduler(&mut rng, now);
        let pack = core_pack();
        for event in &pack.market_events[..4] {
            sched.remember_market_event(&event.id);
        }
        for _ in 0..20 {
            let picked = sched.pick_market_event(pack, MarketPhase::Pump, 1, &mut rng).unwrap();
            assert_eq!(picked.id, "market-205");
        }
        // 205 is limited to a phase list that excludes RUG
        assert!(sched.pick_market_event(pack, MarketPhase::Rug, 1, &mut rng).is_none());
    }

    #[test]
    fn recent_ring_is_bounded() {
        let mut rng = StdRng::seed_from_u64(4);
        let mut sched = scheduler(&mut rng, Timestamp::from_millis(0));
        for i in 0..10 {
            sched.remember_market_event(&format!("e{i}"));
        }
        assert_eq!(sched.recent_market_events().count(), 6);
        assert_eq!(sched.recent_market_events().next(), Some("e4"));
    }

    #[test]
    fn personal_event_respects_cash_conditions() {
        let mut rng = StdRng::seed_from_u64(5);
        let mut player = PlayerRuntime::new(ClientId::new("p"), "p".into(), RoleKey::Worker);
        player.state.cash = Quote::new(dec!(50));
        for _ in 0..200 {
            let event = pick_personal_event(core_pack(), &player, MarketPhase::Accumulation, 1, &mut rng).unwrap();
            let cond = event.conditions.clone().unwrap_or_default();
            assert!(cond.min_cash.map_or(true, |min| dec!(50) >= min));
            assert_ne!(event.id, "club-001");
        }
    }

    #[test]
    fn personal_timer_due() {
        let mut rng = StdRng::seed_from_u64(6);
        let mut player = PlayerRuntime::new(ClientId::new("p"), "p".into(), RoleKey::Worker);
        assert!(!personal_event_due(&player, Timestamp::from_millis(0)));
        schedule_personal_event(&mut player, &core_pack().settings, &mut rng, Timestamp::from_millis(0));
        assert!(!personal_event_due(&player, Timestamp::from_millis(44_999)));
        assert!(personal_event_due(&player, Timestamp::from_millis(80_000)));
    }
}
