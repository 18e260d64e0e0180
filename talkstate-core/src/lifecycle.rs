//! Talk records and the per-talk lifecycle facade.

use crate::engine::TransitionEngine;
use crate::error::CoreError;
use crate::hook::HookContext;
use crate::table::{Signal, State};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// A submitted talk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Talk {
    /// Opaque identity.
    pub id: String,

    pub title: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub abstract_text: Option<String>,

    /// Current review state.
    pub state: State,

    /// Bumped on every committed transition.
    pub version: u64,

    /// Creation timestamp (Unix millis).
    pub created_at: i64,

    /// Last transition timestamp (Unix millis).
    pub updated_at: i64,
}

impl Talk {
    /// Creates a talk in the initial state.
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        let now = now_millis();
        Self {
            id: id.into(),
            title: title.into(),
            abstract_text: None,
            state: State::INITIAL,
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_abstract(mut self, text: impl Into<String>) -> Self {
        self.abstract_text = Some(text.into());
        self
    }

    /// Number of whitespace-separated words in the abstract.
    pub fn abstract_word_count(&self) -> usize {
        self.abstract_text
            .as_deref()
            .map(|text| text.split_whitespace().count())
            .unwrap_or(0)
    }

    pub fn public_state_label(&self) -> &'static str {
        public_label(self.state)
    }

    /// Returns the record as it looks after moving to `to`.
    fn advanced(&self, to: State) -> Talk {
        Talk {
            state: to,
            version: self.version + 1,
            updated_at: now_millis(),
            ..self.clone()
        }
    }
}

/// Display label for a state.
///
/// `canceled` has no label of its own and falls through to "Submitted".
pub fn public_label(state: State) -> &'static str {
    match state {
        State::Withdrawn => "Withdrawn",
        State::New | State::Review => "Review Pending",
        State::Accepted | State::Unconfirmed => "Accepted (confirmation pending)",
        State::Confirmed => "Confirmed",
        State::Rejected => "Rejected",
        _ => "Submitted",
    }
}

/// Display label for a raw stored state string.
///
/// Legacy records spelled the cancellation state `cancelled`; that literal
/// keeps its own label. Other unknown values render as "Submitted".
pub fn public_label_for_raw(raw: &str) -> &'static str {
    if raw == "cancelled" {
        return "Cancelled";
    }
    raw.parse::<State>()
        .map(public_label)
        .unwrap_or("Submitted")
}

/// What the caller last observed, for optimistic concurrency.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Expectation {
    pub state: Option<State>,
    pub version: Option<u64>,
}

impl Expectation {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn state(state: State) -> Self {
        Self {
            state: Some(state),
            version: None,
        }
    }

    pub fn version(version: u64) -> Self {
        Self {
            state: None,
            version: Some(version),
        }
    }

    fn check(&self, talk: &Talk) -> Result<(), CoreError> {
        if let Some(expected) = self.state {
            if talk.state != expected {
                return Err(CoreError::StateConflict {
                    expected,
                    actual: talk.state,
                });
            }
        }
        if let Some(expected) = self.version {
            if talk.version != expected {
                return Err(CoreError::VersionConflict {
                    expected,
                    actual: talk.version,
                });
            }
        }
        Ok(())
    }
}

/// Result of a committed transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionOutcome {
    pub talk_id: String,
    pub signal: Signal,
    pub from: State,
    pub to: State,
    pub version: u64,
}

/// Binds the shared engine to one talk.
///
/// `fire` holds the talk's write lock across read, hook and write-back, so
/// concurrent organizers cannot both act on the same source state.
pub struct Lifecycle {
    engine: Arc<TransitionEngine>,
    talk: RwLock<Talk>,
}

impl Lifecycle {
    pub fn new(engine: Arc<TransitionEngine>, talk: Talk) -> Self {
        Self {
            engine,
            talk: RwLock::new(talk),
        }
    }

    pub fn current_state(&self) -> State {
        self.talk.read().state
    }

    /// Copy of the current record.
    pub fn snapshot(&self) -> Talk {
        self.talk.read().clone()
    }

    pub fn can_fire(&self, signal: Signal) -> bool {
        self.engine.can_fire(self.current_state(), signal)
    }

    pub fn available_signals(&self) -> Vec<Signal> {
        self.engine.available_signals(self.current_state())
    }

    pub fn public_state_label(&self) -> &'static str {
        public_label(self.current_state())
    }

    /// Fires `signal` against the current state.
    pub fn fire(&self, signal: Signal, ctx: HookContext) -> Result<(), CoreError> {
        self.fire_expecting(signal, ctx, Expectation::none(), |_| {
            Ok::<(), CoreError>(())
        })?;
        Ok(())
    }

    /// Fires `signal` if the talk still matches `expectation`.
    ///
    /// `persist` sees the advanced record before it becomes visible; if it
    /// fails the talk is left untouched, the hook's post-commit work is
    /// dropped and the persist error is returned.
    pub fn fire_expecting<E, F>(
        &self,
        signal: Signal,
        ctx: HookContext,
        expectation: Expectation,
        persist: F,
    ) -> Result<TransitionOutcome, E>
    where
        E: From<CoreError>,
        F: FnOnce(&Talk) -> Result<(), E>,
    {
        let mut talk = self.talk.write();
        expectation.check(&talk)?;

        let from = talk.state;
        let ctx = ctx.with_talk_id(talk.id.clone());
        let pending = self.engine.begin(from, signal, &ctx).map_err(|e| {
            tracing::warn!(talk = %talk.id, %signal, %from, error = %e, "transition refused");
            e
        })?;

        let next = talk.advanced(pending.target());
        persist(&next)?;
        *talk = next;
        let to = pending.commit(&ctx);

        tracing::debug!(talk = %talk.id, %signal, %from, %to, version = talk.version, "transition committed");

        Ok(TransitionOutcome {
            talk_id: talk.id.clone(),
            signal,
            from,
            to,
            version: talk.version,
        })
    }
}

impl std::fmt::Debug for Lifecycle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Lifecycle")
            .field("talk", &*self.talk.read())
            .finish()
    }
}
