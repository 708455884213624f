// 5.2: room chat. a bounded log of system, player and npc lines, plus the npc chatter
// generator. some npc lines carry a market effect applied when the line is posted.

use crate::market::{MarketEffect, MarketPhase};
use crate::types::Timestamp;
use rand::seq::SliceRandom;
use rand::Rng;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use uuid::Uuid;

pub const SYSTEM_SENDER: &str = "SYSTEM";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatKind {
    System,
    Chat,
    Npc,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub id: String,
    pub sender: String,
    pub text: String,
    #[serde(rename = "type")]
    pub kind: ChatKind,
    pub created_at: Timestamp,
}

impl ChatMessage {
    pub fn new(sender: impl Into<String>, text: impl Into<String>, kind: ChatKind, now: Timestamp) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            sender: sender.into(),
            text: text.into(),
            kind,
            created_at: now,
        }
    }

    pub fn system(text: impl Into<String>, now: Timestamp) -> Self {
        Self::new(SYSTEM_SENDER, text, ChatKind::System, now)
    }
}

/// Ring of the most recent messages.
#[derive(Debug, Clone)]
pub struct ChatLog {
    messages: VecDeque<ChatMessage>,
    max_messages: usize,
}

impl ChatLog {
    pub fn new(max_messages: usize) -> Self {
        Self {
            messages: VecDeque::with_capacity(max_messages.min(256)),
            max_messages: max_messages.max(1),
        }
    }

    pub fn push(&mut self, message: ChatMessage) {
        self.messages.push_back(message);
        while self.messages.len() > self.max_messages {
            self.messages.pop_front();
        }
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn last(&self) -> Option<&ChatMessage> {
        self.messages.back()
    }

    pub fn to_vec(&self) -> Vec<ChatMessage> {
        self.messages.iter().cloned().collect()
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatEffectKind {
    Pump,
    Dump,
    Volatility,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChatEffect {
    pub kind: ChatEffectKind,
    pub strength: Decimal,
}

impl ChatEffect {
    // pump/dump force the phase and add volatility, volatility only adds
    pub fn to_market_effect(&self) -> MarketEffect {
        let phase = match self.kind {
            ChatEffectKind::Pump => Some(MarketPhase::Pump),
            ChatEffectKind::Dump => Some(MarketPhase::Dump),
            ChatEffectKind::Volatility => None,
        };
        MarketEffect {
            phase,
            volatility_delta: Some(self.strength),
            price_multiplier: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NpcLine {
    pub sender: String,
    pub text: String,
    pub effect: Option<ChatEffect>,
}

enum Line {
    Plain(&'static str),
    Moving(&'static str, ChatEffectKind, Decimal),
}

struct Character {
    name: &'static str,
    lines: &'static [Line],
}

use ChatEffectKind::{Dump, Pump, Volatility};
use Line::{Moving, Plain};

const CHARACTERS: &[Character] = &[
    Character {
        name: "Campus Legend",
        lines: &[
            Plain("Roommate asked why I'm kneeling at my phone. I said I'm reading candles."),
            Plain("Cafeteria lady's hand shook and there went my allowance."),
            Plain("If this one wins, instant noodles for the whole dorm."),
            Plain("Opened a trade during lecture, almost lost my phone to the professor."),
            Plain("Haven't washed my hair in three days. Charts come first."),
        ],
    },
    Character {
        name: "Little Gui",
        lines: &[
            Plain("100x on this one. Win and I retire, lose and I get a job."),
            Plain("All in. Don't ask, it's conviction."),
            Plain("Anyone spare 50U for lunch? I pay back after I recover."),
            Plain("Tonight it's either a lambo or a liquidation."),
            Plain("Liquidation SMS just arrived..."),
        ],
    },
    Character {
        name: "Monk Tofu",
        lines: &[
            Plain("Up or down, it is all the same."),
            Plain("Do not cling to the candles, friend. All is empty."),
            Plain("This pullback is a gift for those who are meant to board."),
            Plain("Holding is winning."),
        ],
    },
    Character {
        name: "KOL HotBaby",
        lines: &[
            Moving("Fam! I like this coin, target 100x!", Pump, dec!(0.04)),
            Moving("Send it! No fear!", Pump, dec!(0.02)),
            Plain("Who sold the bottom? Step forward."),
            Plain("Beautiful rounded bottom on this chart."),
            Plain("If this dumps I eat my keyboard on stream."),
        ],
    },
    Character {
        name: "KOL Shizuka",
        lines: &[
            Plain("Nice gains today, buying a new bag."),
            Plain("Anyone want to see my live account?"),
            Plain("Ugh, stopped out again."),
            Plain("Recap stream tonight, don't miss it."),
        ],
    },
    Character {
        name: "NeverLeverageAgain",
        lines: &[
            Plain("Last time. Really the last time I touch leverage."),
            Plain("...this feels great actually."),
            Plain("Why does it dump every time I long? Am I being watched?"),
            Plain("Guys, I couldn't help myself again..."),
        ],
    },
    Character {
        name: "Simp Supreme",
        lines: &[
            Plain("When this prints I'm buying her that bag."),
            Plain("She replied! Just 'ok', but she cares."),
            Plain("Can this coin go up? Saving for the wedding."),
        ],
    },
    Character {
        name: "Justin Cut",
        lines: &[
            Moving("I have decided to acquire this project!", Pump, dec!(0.06)),
            Moving("I'm riding this hype wave.", Volatility, dec!(0.08)),
            Plain("Some call me a harvester. I'm here to save the industry."),
        ],
    },
    Character {
        name: "Cold Breeze",
        lines: &[
            Plain("Who can lend me 200U? I always pay back!"),
            Moving("Live account proof: this one goes down!", Dump, dec!(0.04)),
            Plain("Liquidated again... mental state gone."),
        ],
    },
    Character {
        name: "Old Leek",
        lines: &[
            Plain("Seen a hundred of these. Whoever runs first wins."),
            Plain("Read the chart, not the group."),
            Plain("Take out the principal, let the profit fly."),
        ],
    },
    Character {
        name: "Project Team",
        lines: &[
            Moving("We are building.", Pump, dec!(0.02)),
            Plain("No FUD please, devs are working overtime."),
            Plain("Just a technical pullback."),
        ],
    },
    Character {
        name: "Bot",
        lines: &[
            Moving("Whale buy detected!", Pump, dec!(0.05)),
            Moving("Whale sell detected!", Dump, dec!(0.05)),
            Plain("Current holder count: 1337"),
            Plain("Burn mechanism engaged."),
        ],
    },
];

const CROWD: &[&str] = &["Member A", "Member B", "Passerby"];

const COMMON_LINES: &[&str] = &[
    "How is this project?",
    "Anyone read the contract?",
    "Where is the admin?",
    "When pump?",
    "Post the contract address",
    "What slippage are you using?",
    "Is liquidity locked?",
    "See you on the rooftop",
    "Zero. It's going to zero.",
];

const PUMP_LINES: &[&str] = &["Lift off!", "So green it hurts", "Whales are pushing it", "Exchange listing incoming"];
const MOON_LINES: &[&str] = &["WHAT!!!", "100x already!", "Financial freedom!", "To the moon"];
const DUMP_LINES: &[&str] = &["Help!", "Who is dumping?", "Hold steady, technical pullback", "Give me my money back"];
const RUG_LINES: &[&str] = &["RUGGED!!!", "Call the police", "My money...", "Website is down", "Dev left the group"];

// chance a phase-flavored line replaces the character line
const PHASE_FLAVOR_CHANCE: f64 = 0.4;

/// One random npc line, flavored by the current phase.
pub fn npc_line<R: Rng + ?Sized>(phase: MarketPhase, rng: &mut R) -> NpcLine {
    let pick = rng.gen_range(0..CHARACTERS.len() + CROWD.len());

    let (sender, mut text, mut effect) = match CHARACTERS.get(pick) {
        Some(character) => match character.lines.choose(rng) {
            Some(Moving(text, kind, strength)) => (
                character.name,
                *text,
                Some(ChatEffect {
                    kind: *kind,
                    strength: *strength,
                }),
            ),
            Some(Plain(text)) => (character.name, *text, None),
            None => (character.name, "...", None),
        },
        None => {
            let sender = CROWD[(pick - CHARACTERS.len()) % CROWD.len()];
            (sender, COMMON_LINES.choose(rng).copied().unwrap_or("..."), None)
        }
    };

    if rng.gen_bool(PHASE_FLAVOR_CHANCE) {
        let flavor = match phase {
            MarketPhase::Pump => Some(PUMP_LINES),
            MarketPhase::Moon => Some(MOON_LINES),
            MarketPhase::Dump => Some(DUMP_LINES),
            MarketPhase::Rug => Some(RUG_LINES),
            MarketPhase::Accumulation | MarketPhase::Idle => None,
        };
        if let Some(line) = flavor.and_then(|lines| lines.choose(rng)) {
            text = *line;
            effect = None;
        }
    }

    NpcLine {
        sender: sender.to_string(),
        text: text.to_string(),
        effect,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn log_is_bounded() {
        let mut log = ChatLog::new(3);
        for i in 0..5 {
            log.push(ChatMessage::system(format!("line {i}"), Timestamp::from_millis(i)));
        }
        assert_eq!(log.len(), 3);
        assert_eq!(log.to_vec()[0].text, "line 2");
        assert_eq!(log.last().unwrap().kind, ChatKind::System);
    }

    #[test]
    fn chat_effect_mapping() {
        let pump = ChatEffect {
            kind: ChatEffectKind::Pump,
            strength: dec!(0.04),
        }
        .to_market_effect();
        assert_eq!(pump.phase, Some(MarketPhase::Pump));
        assert_eq!(pump.volatility_delta, Some(dec!(0.04)));

        let vol = ChatEffect {
            kind: ChatEffectKind::Volatility,
            strength: dec!(0.08),
        }
        .to_market_effect();
        assert_eq!(vol.phase, None);
    }

    #[test]
    fn npc_lines_are_never_empty() {
        let mut rng = StdRng::seed_from_u64(5);
        let mut saw_effect = false;
        for _ in 0..500 {
            let line = npc_line(MarketPhase::Accumulation, &mut rng);
            assert!(!line.sender.is_empty());
            assert!(!line.text.is_empty());
            saw_effect |= line.effect.is_some();
        }
        assert!(saw_effect);
    }

    #[test]
    fn rug_flavor_drops_effects() {
        let mut rng = StdRng::seed_from_u64(9);
        let flavored = (0..300)
            .map(|_| npc_line(MarketPhase::Rug, &mut rng))
            .filter(|line| RUG_LINES.contains(&line.text.as_str()))
            .collect::<Vec<_>>();
        assert!(!flavored.is_empty());
        assert!(flavored.iter().all(|line| line.effect.is_none()));
    }

    #[test]
    fn wire_shape() {
        let msg = ChatMessage::new("bob", "hi", ChatKind::Chat, Timestamp::from_millis(3));
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "chat");
        assert_eq!(json["createdAt"], 3);
    }
}
