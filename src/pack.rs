// 5.0: event packs. immutable data bundles of personal events, market events and daily
// expenses that parameterize a room. packs are edited elsewhere and consumed read-only here.
// 5.3 has validation, 5.4 the built-in core pack.

use crate::market::{MarketEffect, MarketPhase};
use crate::types::Timestamp;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

pub const CORE_PACK_ID: &str = "core";

const MAX_NAME_CHARS: usize = 64;
const MAX_DESCRIPTION_CHARS: usize = 200;
const PERSONAL_MIN_RANGE: (i64, i64) = (10_000, 180_000);
const PERSONAL_MAX_RANGE: (i64, i64) = (15_000, 240_000);
const PERSONAL_EVENT_COUNT: (usize, usize) = (4, 200);
const CHOICE_COUNT: (usize, usize) = (2, 4);
const MARKET_EVENT_COUNT: (usize, usize) = (2, 200);
const EXPENSE_COUNT: (usize, usize) = (3, 200);

/// Eligibility bounds. Every present bound must hold.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventCondition {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_cash: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_cash: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_stress: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_stress: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_day: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_day: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase_in: Option<Vec<MarketPhase>>,
}

/// What the condition is checked against.
#[derive(Debug, Clone, Copy)]
pub struct EligibilityContext {
    pub cash: Decimal,
    pub stress: Decimal,
    pub day: u32,
    pub phase: MarketPhase,
}

impl EventCondition {
    pub fn matches(&self, ctx: &EligibilityContext) -> bool {
        if self.min_cash.is_some_and(|min| ctx.cash < min) {
            return false;
        }
        if self.max_cash.is_some_and(|max| ctx.cash > max) {
            return false;
        }
        if self.min_stress.is_some_and(|min| ctx.stress < min) {
            return false;
        }
        if self.max_stress.is_some_and(|max| ctx.stress > max) {
            return false;
        }
        if self.min_day.is_some_and(|min| ctx.day < min) {
            return false;
        }
        if self.max_day.is_some_and(|max| ctx.day > max) {
            return false;
        }
        if let Some(phases) = &self.phase_in {
            if !phases.contains(&ctx.phase) {
                return false;
            }
        }
        true
    }
}

pub fn conditions_match(conditions: Option<&EventCondition>, ctx: &EligibilityContext) -> bool {
    conditions.map_or(true, |c| c.matches(ctx))
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerEffect {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cash: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cash_percent: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stress: Option<Decimal>,
}

impl PlayerEffect {
    pub fn cash(amount: Decimal) -> Self {
        Self {
            cash: Some(amount),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersonalEventChoice {
    pub id: String,
    pub text: String,
    pub effect: PlayerEffect,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersonalEvent {
    pub id: String,
    pub title: String,
    pub description: String,
    pub choices: Vec<PersonalEventChoice>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conditions: Option<EventCondition>,
}

impl PersonalEvent {
    pub fn choice(&self, choice_id: &str) -> Option<&PersonalEventChoice> {
        self.choices.iter().find(|c| c.id == choice_id)
    }

    // used when the decision window runs out
    pub fn fallback_choice(&self) -> Option<&PersonalEventChoice> {
        self.choices.first()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketEvent {
    pub id: String,
    pub title: String,
    pub description: String,
    pub effect: MarketEffect,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conditions: Option<EventCondition>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyExpense {
    pub id: String,
    pub label: String,
    pub cost: Decimal,
}

// 5.1: timer bounds in ms, the scheduler draws uniformly in [min, max)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventPackSettings {
    pub personal_event_min_ms: i64,
    pub personal_event_max_ms: i64,
    pub market_event_min_ms: i64,
    pub market_event_max_ms: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventPack {
    pub id: String,
    pub name: String,
    pub description: String,
    pub version: u32,
    pub settings: EventPackSettings,
    pub personal_events: Vec<PersonalEvent>,
    pub market_events: Vec<MarketEvent>,
    pub daily_expenses: Vec<DailyExpense>,
}

/// Editable body of a pack, without identity or version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventPackInput {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub settings: EventPackSettings,
    pub personal_events: Vec<PersonalEvent>,
    pub market_events: Vec<MarketEvent>,
    pub daily_expenses: Vec<DailyExpense>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventPackSummary {
    pub id: String,
    pub name: String,
    pub description: String,
    pub version: u32,
    pub personal_event_count: usize,
    pub market_event_count: usize,
    pub updated_at: Option<Timestamp>,
    #[serde(default)]
    pub is_core: bool,
}

// 5.2: pack conversions
impl EventPack {
    pub fn from_input(id: impl Into<String>, version: u32, input: EventPackInput) -> Self {
        Self {
            id: id.into(),
            name: input.name,
            description: input.description,
            version,
            settings: input.settings,
            personal_events: input.personal_events,
            market_events: input.market_events,
            daily_expenses: input.daily_expenses,
        }
    }

    pub fn to_input(&self) -> EventPackInput {
        EventPackInput {
            name: self.name.clone(),
            description: self.description.clone(),
            settings: self.settings,
            personal_events: self.personal_events.clone(),
            market_events: self.market_events.clone(),
            daily_expenses: self.daily_expenses.clone(),
        }
    }

    pub fn is_core(&self) -> bool {
        self.id == CORE_PACK_ID
    }

    pub fn summary(&self, updated_at: Option<Timestamp>) -> EventPackSummary {
        EventPackSummary {
            id: self.id.clone(),
            name: self.name.clone(),
            description: self.description.clone(),
            version: self.version,
            personal_event_count: self.personal_events.len(),
            market_event_count: self.market_events.len(),
            updated_at,
            is_core: self.is_core(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PackError {
    #[error("Pack name must be 1-{MAX_NAME_CHARS} characters")]
    InvalidName,

    #[error("Pack description exceeds {MAX_DESCRIPTION_CHARS} characters")]
    DescriptionTooLong,

    #[error("Setting {field} = {value} outside [{min}, {max}]")]
    SettingOutOfRange {
        field: &'static str,
        value: i64,
        min: i64,
        max: i64,
    },

    #[error("Setting {0} min exceeds max")]
    InvertedRange(&'static str),

    #[error("{kind} count {count} outside [{min}, {max}]")]
    CountOutOfRange {
        kind: &'static str,
        count: usize,
        min: usize,
        max: usize,
    },

    #[error("Personal event {0} needs 2-4 choices")]
    ChoiceCount(String),

    #[error("Expense {0} has a negative cost")]
    NegativeCost(String),

    #[error("Empty id in {0}")]
    EmptyId(&'static str),
}

// 5.3: validation of user-authored packs
impl EventPackInput {
    pub fn validate(&self) -> Result<(), PackError> {
        let name_len = self.name.trim().chars().count();
        if name_len == 0 || name_len > MAX_NAME_CHARS {
            return Err(PackError::InvalidName);
        }
        if self.description.chars().count() > MAX_DESCRIPTION_CHARS {
            return Err(PackError::DescriptionTooLong);
        }

        let s = &self.settings;
        check_range("personalEventMinMs", s.personal_event_min_ms, PERSONAL_MIN_RANGE)?;
        check_range("personalEventMaxMs", s.personal_event_max_ms, PERSONAL_MAX_RANGE)?;
        check_range("marketEventMinMs", s.market_event_min_ms, PERSONAL_MIN_RANGE)?;
        check_range("marketEventMaxMs", s.market_event_max_ms, PERSONAL_MAX_RANGE)?;
        if s.personal_event_min_ms > s.personal_event_max_ms {
            return Err(PackError::InvertedRange("personalEvent"));
        }
        if s.market_event_min_ms > s.market_event_max_ms {
            return Err(PackError::InvertedRange("marketEvent"));
        }

        check_count("personalEvents", self.personal_events.len(), PERSONAL_EVENT_COUNT)?;
        check_count("marketEvents", self.market_events.len(), MARKET_EVENT_COUNT)?;
        check_count("dailyExpenses", self.daily_expenses.len(), EXPENSE_COUNT)?;

        for event in &self.personal_events {
            if event.id.trim().is_empty() {
                return Err(PackError::EmptyId("personalEvents"));
            }
            let choices = event.choices.len();
            if choices < CHOICE_COUNT.0 || choices > CHOICE_COUNT.1 {
                return Err(PackError::ChoiceCount(event.id.clone()));
            }
            if event.choices.iter().any(|c| c.id.trim().is_empty()) {
                return Err(PackError::EmptyId("choices"));
            }
        }
        if self.market_events.iter().any(|e| e.id.trim().is_empty()) {
            return Err(PackError::EmptyId("marketEvents"));
        }
        for expense in &self.daily_expenses {
            if expense.id.trim().is_empty() {
                return Err(PackError::EmptyId("dailyExpenses"));
            }
            if expense.cost < Decimal::ZERO {
                return Err(PackError::NegativeCost(expense.id.clone()));
            }
        }

        Ok(())
    }
}

fn check_range(field: &'static str, value: i64, (min, max): (i64, i64)) -> Result<(), PackError> {
    if value < min || value > max {
        return Err(PackError::SettingOutOfRange { field, value, min, max });
    }
    Ok(())
}

fn check_count(kind: &'static str, count: usize, (min, max): (usize, usize)) -> Result<(), PackError> {
    if count < min || count > max {
        return Err(PackError::CountOutOfRange { kind, count, min, max });
    }
    Ok(())
}

// 5.4: the built-in pack every room starts with
pub fn core_pack() -> &'static EventPack {
    static CORE: OnceLock<EventPack> = OnceLock::new();
    CORE.get_or_init(build_core_pack)
}

fn personal(
    id: &str,
    title: &str,
    description: &str,
    conditions: Option<EventCondition>,
    choices: [(&str, Decimal); 2],
) -> PersonalEvent {
    PersonalEvent {
        id: id.to_string(),
        title: title.to_string(),
        description: description.to_string(),
        conditions,
        choices: choices
            .iter()
            .zip(["A", "B"])
            .map(|((text, cash), choice_id)| PersonalEventChoice {
                id: choice_id.to_string(),
                text: text.to_string(),
                effect: PlayerEffect::cash(*cash),
            })
            .collect(),
    }
}

fn cash_between(min: Option<Decimal>, max: Option<Decimal>) -> Option<EventCondition> {
    Some(EventCondition {
        min_cash: min,
        max_cash: max,
        ..Default::default()
    })
}

fn market(id: &str, title: &str, description: &str, phase: MarketPhase, volatility_delta: Decimal) -> MarketEvent {
    MarketEvent {
        id: id.to_string(),
        title: title.to_string(),
        description: description.to_string(),
        effect: MarketEffect {
            phase: Some(phase),
            volatility_delta: Some(volatility_delta),
            price_multiplier: None,
        },
        conditions: None,
    }
}

fn build_core_pack() -> EventPack {
    let personal_events = vec![
        personal("health-001", "Gas Allergy", "Hours of charts and airdrop quests. You are now allergic to 'confirm one more time'.", None,
            [("Rest and buy an eye lamp", dec!(-200)), ("Click confirm again", dec!(0))]),
        personal("stress-001", "Scalp Staking", "Your hair falls out on a vesting schedule. You suspect you staked your scalp.", None,
            [("Buy a hair-growth mystery box", dec!(-800)), ("Stream bald, on-chain", dec!(300))]),
        personal("kol-001", "KOL Signal", "A big account posts a rocket emoji and a ticker you have never heard of.", None,
            [("Follow the call, just to try", dec!(500)), ("Fade it and get schooled", dec!(-400))]),
        personal("faith-001", "Faith Check", "A red candle the size of a skyscraper tests your conviction.", None,
            [("Panic stop-loss", dec!(-300)), ("Read the on-chain data first", dec!(200))]),
        personal("listing-001", "Listing Rumor", "Someone in the group swears an exchange listing is coming.", None,
            [("Position early", dec!(700)), ("Wait for the announcement", dec!(-200))]),
        personal("poor-001", "Gas Ate Lunch", "One transfer fee costs more than your lunch.", cash_between(None, Some(dec!(100))),
            [("Take a Web3 side gig", dec!(120)), ("Keep digging", dec!(-30))]),
        personal("club-001", "On-chain Afterparty", "The 'financial freedom' group is throwing a party tonight.", cash_between(Some(dec!(10000)), None),
            [("Pay for everyone", dec!(-2000)), ("Go home and journal", dec!(300))]),
        personal("house-001", "Coins for a House", "The agent accepts BTC and sounds more confident than the whitepaper.", cash_between(Some(dec!(50000)), None),
            [("Send the down payment", dec!(-50000)), ("Keep holding", dec!(0))]),
        personal("ex-001", "Ex Slides In", "Your ex noticed your PnL screenshot and wants to catch up.", cash_between(Some(dec!(5000)), None),
            [("Send 888U", dec!(-888)), ("Leave on read", dec!(200))]),
        personal("match-001", "Blind Date", "Your date asks what you do for a living.", cash_between(Some(dec!(2000)), None),
            [("Claim you run a quant fund", dec!(-150)), ("Admit you farm airdrops", dec!(80))]),
        personal("hack-001", "Surprise Airdrop", "A shiny token appears in your wallet with a claim link.", cash_between(Some(dec!(500)), None),
            [("Approve everything", dec!(-1000)), ("Report the phishing", dec!(50))]),
        personal("loan-001", "Loan Shark DM", "A stranger offers instant credit at a very friendly rate.", cash_between(Some(dec!(1)), Some(dec!(500))),
            [("Lever up one more time", dec!(2000)), ("Mute notifications", dec!(-100))]),
        personal("pc-001", "Laptop Meltdown", "Your laptop dies mid-trade.", None,
            [("Emergency repair", dec!(-600)), ("Borrow a friend's", dec!(-150))]),
        personal("usb-001", "Mystery USB", "You find a USB stick labeled 'seed phrases'.", None,
            [("Plug it in", dec!(-400)), ("Sell it secondhand", dec!(100))]),
    ];

    let mut buyback = market("market-205", "Treasury Buyback", "The treasury buys back on-chain and the chart starts to turn.", MarketPhase::Pump, dec!(0.025));
    buyback.conditions = Some(EventCondition {
        phase_in: Some(vec![MarketPhase::Accumulation, MarketPhase::Pump, MarketPhase::Dump, MarketPhase::Moon]),
        ..Default::default()
    });

    let market_events = vec![
        market("market-201", "KOLs Go Live", "Every Space is on fire and sentiment is maxed out.", MarketPhase::Pump, dec!(0.03)),
        market("market-202", "Exchange Wink", "An exchange alt account likes a meme. The group takes off.", MarketPhase::Pump, dec!(0.02)),
        market("market-203", "Regulator Speaks", "A tightening rumor cools the whole market instantly.", MarketPhase::Dump, dec!(0.03)),
        market("market-204", "Whale Moves", "On-chain alerts fire: a large deposit is heading to an exchange.", MarketPhase::Dump, dec!(0.04)),
        buyback,
    ];

    let daily_expenses = [
        ("expense-01", "anti-hair-loss shampoo", dec!(80)),
        ("expense-02", "bubble tea for the group", dec!(120)),
        ("expense-03", "a VPN subscription", dec!(50)),
        ("expense-04", "a deluxe takeout order", dec!(60)),
        ("expense-05", "gifts for a streamer", dec!(200)),
        ("expense-06", "a hardware wallet", dec!(150)),
        ("expense-07", "an offline meetup", dec!(300)),
        ("expense-08", "the broadband bill", dec!(100)),
        ("expense-09", "a new game", dec!(70)),
        ("expense-10", "a clinic visit", dec!(50)),
    ]
    .into_iter()
    .map(|(id, label, cost)| DailyExpense {
        id: id.to_string(),
        label: label.to_string(),
        cost,
    })
    .collect();

    EventPack {
        id: CORE_PACK_ID.to_string(),
        name: "Core Meme Pack".to_string(),
        description: "Base event pack with classic candle-room flavor.".to_string(),
        version: 1,
        settings: EventPackSettings {
            personal_event_min_ms: 45_000,
            personal_event_max_ms: 80_000,
            market_event_min_ms: 30_000,
            market_event_max_ms: 55_000,
        },
        personal_events,
        market_events,
        daily_expenses,
    }
}
