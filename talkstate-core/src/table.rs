//! Transition table: states, signals, and the legal moves between them.
//!
//! The table is plain data. Rules can also be loaded from JSON:
//!
//! ```json
//! [
//!   {"signal": "start_review", "from": ["new", "rejected"], "to": "review"},
//!   {"signal": "confirm", "from": "unconfirmed", "to": "confirmed"},
//!   {"signal": "accept", "from": ["new", "review"], "to": "unconfirmed", "hook": "process_acceptance"}
//! ]
//! ```

use crate::error::CoreError;
use crate::hook::HookKind;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// Review state of a talk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum State {
    #[default]
    New,
    Review,
    Withdrawn,
    /// Declared but never targeted by any rule.
    Accepted,
    Unconfirmed,
    Confirmed,
    Canceled,
    Rejected,
}

impl State {
    /// All states in declaration order.
    pub const ALL: [State; 8] = [
        State::New,
        State::Review,
        State::Withdrawn,
        State::Accepted,
        State::Unconfirmed,
        State::Confirmed,
        State::Canceled,
        State::Rejected,
    ];

    /// State assigned to freshly submitted talks.
    pub const INITIAL: State = State::New;

    pub fn as_str(&self) -> &'static str {
        match self {
            State::New => "new",
            State::Review => "review",
            State::Withdrawn => "withdrawn",
            State::Accepted => "accepted",
            State::Unconfirmed => "unconfirmed",
            State::Confirmed => "confirmed",
            State::Canceled => "canceled",
            State::Rejected => "rejected",
        }
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for State {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        State::ALL
            .into_iter()
            .find(|state| state.as_str() == s)
            .ok_or_else(|| CoreError::UnknownState(s.to_string()))
    }
}

/// A lifecycle signal requesting a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Signal {
    StartReview,
    Withdraw,
    Accept,
    Unconfirm,
    Confirm,
    Cancel,
    Reject,
}

impl Signal {
    /// All signals in declaration order.
    pub const ALL: [Signal; 7] = [
        Signal::StartReview,
        Signal::Withdraw,
        Signal::Accept,
        Signal::Unconfirm,
        Signal::Confirm,
        Signal::Cancel,
        Signal::Reject,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Signal::StartReview => "start_review",
            Signal::Withdraw => "withdraw",
            Signal::Accept => "accept",
            Signal::Unconfirm => "unconfirm",
            Signal::Confirm => "confirm",
            Signal::Cancel => "cancel",
            Signal::Reject => "reject",
        }
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Signal {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Signal::ALL
            .into_iter()
            .find(|signal| signal.as_str() == s)
            .ok_or_else(|| CoreError::UnknownSignal(s.to_string()))
    }
}

/// One declared transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionRule {
    /// Signal that triggers this rule.
    pub signal: Signal,

    /// Source states. A single string or an array in JSON.
    #[serde(deserialize_with = "deserialize_from_states")]
    pub from: Vec<State>,

    /// Target state.
    pub to: State,

    /// Side effect bound to this rule.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hook: Option<HookKind>,
}

impl TransitionRule {
    pub fn new(signal: Signal, from: &[State], to: State) -> Self {
        Self {
            signal,
            from: from.to_vec(),
            to,
            hook: None,
        }
    }

    pub fn with_hook(mut self, hook: HookKind) -> Self {
        self.hook = Some(hook);
        self
    }

    /// Returns true if `state` is one of this rule's sources.
    pub fn applies_to(&self, state: State) -> bool {
        self.from.contains(&state)
    }
}

fn deserialize_from_states<'de, D>(deserializer: D) -> Result<Vec<State>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::de::{self, Visitor};

    struct FromStatesVisitor;

    impl<'de> Visitor<'de> for FromStatesVisitor {
        type Value = Vec<State>;

        fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
            formatter.write_str("a state or array of states")
        }

        fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            v.parse::<State>().map(|s| vec![s]).map_err(E::custom)
        }

        fn visit_seq<A>(self, mut seq: A) -> Result<Self::Value, A::Error>
        where
            A: de::SeqAccess<'de>,
        {
            let mut states = Vec::new();
            while let Some(s) = seq.next_element::<State>()? {
                states.push(s);
            }
            Ok(states)
        }
    }

    deserializer.deserialize_any(FromStatesVisitor)
}

/// Validated, indexed transition table.
#[derive(Debug, Clone)]
pub struct TransitionTable {
    rules: Vec<TransitionRule>,

    /// (from, signal) -> position in `rules`.
    index: HashMap<(State, Signal), usize>,

    checksum: String,
}

impl TransitionTable {
    /// The conference review lifecycle.
    pub fn conference() -> Result<Self, CoreError> {
        use State::*;

        Self::new(vec![
            TransitionRule::new(Signal::StartReview, &[New, Rejected], Review),
            TransitionRule::new(Signal::Withdraw, &[New, Review, Unconfirmed], Withdrawn),
            TransitionRule::new(Signal::Accept, &[New, Review], Unconfirmed)
                .with_hook(HookKind::ProcessAcceptance),
            TransitionRule::new(Signal::Unconfirm, &[Confirmed], Review),
            TransitionRule::new(Signal::Confirm, &[Unconfirmed], Confirmed),
            TransitionRule::new(Signal::Cancel, &[Unconfirmed, Confirmed], Canceled),
            TransitionRule::new(Signal::Reject, &[New, Review], Rejected)
                .with_hook(HookKind::ProcessRejection),
        ])
    }

    /// Builds a table, rejecting empty source sets and overlapping rules.
    pub fn new(rules: Vec<TransitionRule>) -> Result<Self, CoreError> {
        let mut index = HashMap::new();
        for (pos, rule) in rules.iter().enumerate() {
            if rule.from.is_empty() {
                return Err(CoreError::InvalidTable {
                    reason: format!("rule for '{}' has no source states", rule.signal),
                });
            }

            for from in &rule.from {
                if index.insert((*from, rule.signal), pos).is_some() {
                    return Err(CoreError::InvalidTable {
                        reason: format!(
                            "overlapping rules for '{}' from state '{}'",
                            rule.signal, from
                        ),
                    });
                }
            }
        }

        let json_bytes = serde_json::to_vec(&rules)?;
        let checksum = format!("{:08x}", crc32c::crc32c(&json_bytes));

        Ok(Self {
            rules,
            index,
            checksum,
        })
    }

    /// Parses rules from a JSON array.
    pub fn from_json(json: &serde_json::Value) -> Result<Self, CoreError> {
        let rules: Vec<TransitionRule> = serde_json::from_value(json.clone())?;
        Self::new(rules)
    }

    /// Returns the rules as JSON.
    pub fn to_json(&self) -> Result<serde_json::Value, CoreError> {
        Ok(serde_json::to_value(&self.rules)?)
    }

    /// All declared rules, in declaration order.
    pub fn rules(&self) -> &[TransitionRule] {
        &self.rules
    }

    /// Rules registered for `signal`.
    pub fn rules_for(&self, signal: Signal) -> Vec<&TransitionRule> {
        self.rules.iter().filter(|r| r.signal == signal).collect()
    }

    /// The rule that applies to `signal` fired in `state`, if any.
    pub fn target_for(&self, state: State, signal: Signal) -> Option<&TransitionRule> {
        self.index.get(&(state, signal)).map(|&pos| &self.rules[pos])
    }

    pub(crate) fn position_for(&self, state: State, signal: Signal) -> Option<usize> {
        self.index.get(&(state, signal)).copied()
    }

    /// Signals with a rule whose source set contains `state`.
    pub fn events_available_from(&self, state: State) -> Vec<Signal> {
        Signal::ALL
            .into_iter()
            .filter(|signal| self.index.contains_key(&(state, *signal)))
            .collect()
    }

    /// Returns true if no rule leaves `state`.
    pub fn is_terminal(&self, state: State) -> bool {
        self.events_available_from(state).is_empty()
    }

    pub fn states(&self) -> &'static [State] {
        &State::ALL
    }

    pub fn signals(&self) -> &'static [Signal] {
        &Signal::ALL
    }

    /// Hook kinds referenced by any rule.
    pub fn hook_kinds(&self) -> Vec<HookKind> {
        let mut kinds = Vec::new();
        for kind in self.rules.iter().filter_map(|r| r.hook) {
            if !kinds.contains(&kind) {
                kinds.push(kind);
            }
        }
        kinds
    }

    /// crc32c of the canonical rule JSON.
    pub fn checksum(&self) -> &str {
        &self.checksum
    }
}
