//! Whole-session scenarios driven through the public room and registry APIs.
//!
//! Every run uses a fixed seed and an injected clock, so the outcomes replay exactly.

use candle_arena::events::{PackListTarget, PackPurpose, StoreTask};
use candle_arena::leaderboard::round_money;
use candle_arena::market::{apply_market_event, MarketEffect, MarketPhase, MarketState};
use candle_arena::pack::{core_pack, MarketEvent};
use candle_arena::player::{EndReason, PlayerRuntime, PlayerStatus, RoleKey, TradeKind};
use candle_arena::protocol::TradeRequest;
use candle_arena::registry::Outgoing;
use candle_arena::scheduler::EventScheduler;
use candle_arena::*;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rust_decimal_macros::dec;
use std::sync::Arc;

const TICK_MS: i64 = 1_000;

fn t(ms: i64) -> Timestamp {
    Timestamp::from_millis(ms)
}

fn join(id: &str, name: &str) -> JoinRequest {
    JoinRequest {
        client_id: ClientId::new(id),
        name: name.into(),
        role_key: RoleKey::Worker,
        room_name: None,
        room_key: String::new(),
    }
}

fn seeded_room(seed: u64) -> Room {
    let mut room = Room::new(
        RoomId::new("arena"),
        RoomOptions {
            display_name: "arena".into(),
            max_players: 4,
            key_hash: None,
            seed: Some(seed),
        },
        Arc::new(GameConfig::test()),
        t(0),
    );
    room.admit(join("alice", "Alice"), t(0)).unwrap();
    room.admit(join("bob", "Bob"), t(0)).unwrap();
    room
}

// ready both seats and run the countdown out
fn start(room: &mut Room) -> Timestamp {
    let alice = ClientId::new("alice");
    let bob = ClientId::new("bob");
    room.set_ready(&alice, true, t(10)).unwrap();
    room.set_ready(&bob, true, t(10)).unwrap();
    room.start_countdown(&alice, t(100)).unwrap();
    let begins = room.countdown_ends_at().unwrap();
    room.tick(begins);
    assert_eq!(room.status(), SessionStatus::Live);
    begins
}

fn run_to_end(room: &mut Room, from: Timestamp) -> Vec<Dispatch> {
    let mut now = from;
    let mut last = Vec::new();
    for _ in 0..1_000 {
        if room.status() == SessionStatus::Ended {
            return last;
        }
        now = now.plus(TICK_MS);
        room.tick(now);
        for player in room.players() {
            assert!(!player.state.cash.is_negative(), "{} went below zero", player.name());
        }
        assert!(room.market().price.is_tradable());
        last = room.take_dispatches();
    }
    panic!("session never ended");
}

#[test]
fn session_runs_from_lobby_to_results() {
    let mut room = seeded_room(7);
    room.take_dispatches();
    let begins = start(&mut room);

    let opened = room.take_dispatches();
    assert!(opened.iter().any(|d| matches!(
        d,
        Dispatch::Store(StoreTask::CreateSession { room_id, .. }) if room_id.as_str() == "arena"
    )));

    let alice = ClientId::new("alice");
    let trade = TradeRequest {
        leverage: Some(dec!(2)),
        size_percent: Some(dec!(50)),
        ..TradeRequest::open(Side::Long)
    };
    let outcome = room.execute_trade(&alice, &trade, begins).unwrap();
    assert!(matches!(outcome, TradeOutcome::Opened { side: Side::Long, .. }));
    assert!(room.player(&alice).unwrap().state.position.is_some());

    let closing = run_to_end(&mut room, begins);
    assert_eq!(room.status(), SessionStatus::Ended);

    for player in room.players() {
        assert!(player.state.position.is_none());
        assert_eq!(player.state.status, PlayerStatus::Finished);
        assert_eq!(player.state.end_reason, Some(EndReason::Time));
    }

    let results = closing
        .iter()
        .find_map(|d| match d {
            Dispatch::SessionResults(results) => Some(results.clone()),
            _ => None,
        })
        .expect("session results");
    assert_eq!(results.len(), 2);
    assert!(results.iter().all(|r| r.session_key == room.session_key()));

    let game_overs = closing
        .iter()
        .filter(|d| {
            matches!(
                d,
                Dispatch::Message {
                    audience: Audience::Client(_),
                    message: ServerMessage::GameOver { .. },
                }
            )
        })
        .count();
    assert_eq!(game_overs, 2);
    assert!(closing
        .iter()
        .any(|d| matches!(d, Dispatch::Store(StoreTask::RefreshLeaderboard))));
}

#[test]
fn trading_is_refused_outside_live() {
    let mut room = seeded_room(3);
    let alice = ClientId::new("alice");
    assert_eq!(
        room.execute_trade(&alice, &TradeRequest::open(Side::Short), t(50)),
        Err(RoomError::Trade(TradeDenied::NotLive))
    );

    let begins = start(&mut room);
    run_to_end(&mut room, begins);
    assert_eq!(
        room.execute_trade(&alice, &TradeRequest::open(Side::Short), t(999_999)),
        Err(RoomError::Trade(TradeDenied::NotLive))
    );
}

#[test]
fn same_seed_same_session() {
    let replay = |seed: u64| {
        let mut room = seeded_room(seed);
        let begins = start(&mut room);
        run_to_end(&mut room, begins);
        let closes: Vec<Price> = room.market().candles.iter().map(|c| c.close).collect();
        let cash: Vec<Quote> = room.players().iter().map(|p| p.state.cash).collect();
        (closes, cash)
    };
    assert_eq!(replay(11), replay(11));
}

#[test]
fn ended_room_is_closed_to_joins() {
    let mut room = seeded_room(5);
    let begins = start(&mut room);
    run_to_end(&mut room, begins);
    let after = room.ends_at().unwrap().plus(1);

    let alice = ClientId::new("alice");
    assert_eq!(room.admit(join("carol", "Carol"), after), Err(RoomError::AlreadyStarted));
    assert_eq!(room.set_ready(&alice, true, after), Err(RoomError::WrongStatus));

    // the settled balance is still claimable
    let draft = room.claim_entry(&alice, Some("  Alice  B ")).unwrap();
    assert_eq!(draft.entry.player_name, "Alice B");
    assert_eq!(draft.entry.cash, round_money(room.player(&alice).unwrap().state.cash));
    assert_eq!(draft.session_key, room.session_key());
}

// registry-level flow: joins, a full session, then room and HTTP claims against memory

fn kinds(out: &[Outgoing], conn: ConnId) -> Vec<&'static str> {
    out.iter().filter(|o| o.conn == conn).map(|o| o.message.kind()).collect()
}

fn send(reg: &mut RoomRegistry, conn: ConnId, value: serde_json::Value, now: Timestamp) {
    reg.handle_text(conn, &value.to_string(), now);
}

fn connect_and_join(reg: &mut RoomRegistry, conn: u64, client: &str) -> ConnId {
    let conn = ConnId(conn);
    reg.connect(conn);
    send(
        reg,
        conn,
        serde_json::json!({
            "type": "join",
            "roomId": "arena",
            "playerName": client,
            "clientId": client,
        }),
        t(0),
    );
    conn
}

#[test]
fn registry_session_then_claims() {
    let config = GameConfig {
        rng_seed: Some(3),
        ..GameConfig::test()
    };
    let mut reg = RoomRegistry::new(Arc::new(config));
    let a = connect_and_join(&mut reg, 1, "alice");
    let b = connect_and_join(&mut reg, 2, "bob");
    assert!(reg.drain_tasks().iter().all(|task| matches!(
        task,
        StoreTask::ListPacks {
            reply_to: PackListTarget::Conn(_)
        }
    )));

    for conn in [a, b] {
        send(&mut reg, conn, serde_json::json!({"type": "set_ready", "ready": true}), t(5));
    }
    send(&mut reg, a, serde_json::json!({"type": "start_countdown"}), t(10));
    let arena = RoomId::new("arena");
    let begins = reg.room(&arena).unwrap().countdown_ends_at().unwrap();

    let mut now = begins;
    reg.tick(now);
    assert_eq!(reg.room(&arena).unwrap().status(), SessionStatus::Live);
    while reg.room(&arena).unwrap().status() != SessionStatus::Ended {
        now = now.plus(TICK_MS);
        reg.tick(now);
    }

    let out = reg.drain_outgoing();
    assert!(kinds(&out, a).contains(&"game_over"));
    assert!(kinds(&out, b).contains(&"game_over"));
    // no durable store: the end-of-session auto-submit stays off
    assert!(!reg
        .drain_tasks()
        .iter()
        .any(|task| matches!(task, StoreTask::InsertEntry(_))));
    assert!(reg.ranker().is_empty());

    send(&mut reg, a, serde_json::json!({"type": "claim_leaderboard"}), now);
    let out = reg.drain_outgoing();
    assert!(kinds(&out, a).contains(&"leaderboard_submitted"));
    assert!(kinds(&out, b).contains(&"leaderboard"));
    assert_eq!(reg.leaderboard().len(), 1);

    // repeat claims echo the stored entry instead of inserting again
    send(&mut reg, a, serde_json::json!({"type": "claim_leaderboard"}), now);
    assert_eq!(kinds(&reg.drain_outgoing(), a), vec!["leaderboard_submitted"]);
    assert_eq!(reg.leaderboard().len(), 1);

    assert_eq!(
        reg.submit_claim(1, "alice", None, now),
        Some(Err(LeaderboardError::AlreadySubmitted))
    );
    let bobby = reg.submit_claim(2, "bob", Some("Bobby"), now).unwrap().unwrap();
    assert_eq!(bobby.player_name, "Bobby");
    assert_eq!(reg.leaderboard().len(), 2);
    assert_eq!(
        reg.submit_claim(3, "nobody", None, now),
        Some(Err(LeaderboardError::NotFound))
    );
}

// the worked scenarios from the game rules

#[test]
fn ten_x_long_liquidates_and_respawns_at_half_stake() {
    let mut room = seeded_room(5);
    let alice = ClientId::new("alice");
    let mut pack = core_pack().clone();
    pack.settings.market_event_min_ms = 5_000;
    pack.settings.market_event_max_ms = 5_000;
    pack.settings.personal_event_min_ms = 600_000;
    pack.settings.personal_event_max_ms = 600_000;
    pack.market_events = vec![MarketEvent {
        id: "crash".into(),
        title: "Crash".into(),
        description: "Price drops 15%".into(),
        effect: MarketEffect {
            phase: None,
            volatility_delta: None,
            price_multiplier: Some(dec!(0.85)),
        },
        conditions: None,
    }];
    room.apply_pack(&alice, pack, PackPurpose::SetPack, t(1)).unwrap();

    let begins = start(&mut room);
    let due = room.scheduler().next_market_event_at;
    assert_eq!(due, begins.plus(5_000));

    let mut now = begins;
    while now.plus(TICK_MS) < due {
        now = now.plus(TICK_MS);
        room.tick(now);
    }

    let request = TradeRequest {
        leverage: Some(dec!(10)),
        size_percent: Some(dec!(100)),
        ..TradeRequest::open(Side::Long)
    };
    room.execute_trade(&alice, &request, now).unwrap();
    let position = room.player(&alice).unwrap().state.position.clone().unwrap();
    let entry = room.market().price;
    assert_eq!(position.entry_price, entry);
    let expected = entry.value() * dec!(0.9);
    assert!((position.liquidation_price.value() - expected).abs() < dec!(0.000000001));
    room.take_dispatches();

    // the crash event lands on this tick and the same tick liquidates
    room.tick(due);
    assert!(room.market().price < position.liquidation_price);

    let player = room.player(&alice).unwrap();
    let last = player.state.history.last().unwrap();
    assert_eq!(last.kind, TradeKind::Liquidation);
    assert_eq!(last.pnl.unwrap().value(), -position.margin.value());
    assert!(player.state.position.is_none());
    assert_eq!(player.respawns, 1);
    assert!(player.is_active());

    let notice = room
        .outbox()
        .messages_for(&alice)
        .into_iter()
        .find_map(|m| match m {
            ServerMessage::RespawnNotice(notice) => Some(notice.clone()),
            _ => None,
        })
        .expect("respawn notice");
    assert_eq!(notice.reason, EndReason::Broke);
    assert_eq!(notice.respawn_cash.value(), dec!(2500));
}

#[test]
fn single_seat_room_starts_alone() {
    let mut reg = RoomRegistry::new(Arc::new(GameConfig::test()));
    let solo = ConnId(1);
    reg.connect(solo);
    send(
        &mut reg,
        solo,
        serde_json::json!({"type": "join", "roomId": "solo", "clientId": "only", "maxPlayers": 1}),
        t(0),
    );
    let room_id = RoomId::new("solo");
    assert_eq!(reg.room(&room_id).unwrap().max_players(), 1);

    let late = ConnId(2);
    reg.connect(late);
    send(&mut reg, late, serde_json::json!({"type": "join", "roomId": "solo", "clientId": "late"}), t(1));
    reg.drain_outgoing();

    send(&mut reg, solo, serde_json::json!({"type": "set_ready", "ready": true}), t(2));
    send(&mut reg, solo, serde_json::json!({"type": "start_countdown"}), t(3));
    let begins = reg.room(&room_id).unwrap().countdown_ends_at().unwrap();
    reg.tick(begins);

    let room = reg.room(&room_id).unwrap();
    assert_eq!(room.status(), SessionStatus::Live);
    assert_eq!(room.players().len(), 1);
    assert!(reg.session(late).is_none());
}

#[test]
fn market_event_bumps_volatility_and_delays_timers() {
    let mut rng = StdRng::seed_from_u64(8);
    let now = t(60_000);
    let market = MarketState::generate(&mut rng, t(0));
    assert_eq!(market.phase, MarketPhase::Accumulation);

    let effect = MarketEffect {
        volatility_delta: Some(dec!(0.04)),
        ..MarketEffect::default()
    };
    let moved = apply_market_event(&market, &effect);
    assert_eq!(moved.volatility, market.volatility + dec!(0.04));

    let settings = core_pack().settings;
    let mut scheduler = EventScheduler::new(&settings, (8_000, 18_000), 6, &mut rng, now);
    let mut players = vec![PlayerRuntime::new(ClientId::new("p"), "pat".into(), RoleKey::Monk)];
    players[0].next_personal_event_at = Some(now.plus(45_000));
    let market_at = scheduler.next_market_event_at;

    let delta = scheduler.apply_pause(now, 5_000, &mut players);
    assert_eq!(delta, 5_000);
    assert!(scheduler.is_paused(now.plus(4_999)));
    assert_eq!(scheduler.next_market_event_at, market_at.plus(5_000));
    assert_eq!(players[0].next_personal_event_at, Some(now.plus(50_000)));
}

#[test]
fn ending_twice_reports_once() {
    let mut room = seeded_room(9);
    let begins = start(&mut room);
    room.take_dispatches();

    let end = begins.plus(10_000);
    room.end_session(end);
    let first = room.take_dispatches();
    assert_eq!(
        first.iter().filter(|d| matches!(d, Dispatch::SessionResults(_))).count(),
        1
    );

    room.end_session(end.plus(1));
    room.tick(room.ends_at().unwrap().plus(TICK_MS));
    assert!(room.take_dispatches().is_empty());
    assert_eq!(room.status(), SessionStatus::Ended);
    assert_eq!(room.ends_at(), Some(end));
}
