//! # talkstate-core
//!
//! Review lifecycle for submitted conference talks.
//!
//! This crate provides:
//! - The transition table (states, signals, rules, hook bindings)
//! - The stateless transition engine
//! - Transition hooks and out-of-band notices
//! - The per-talk lifecycle facade and public status labels

pub mod engine;
pub mod error;
pub mod hook;
pub mod lifecycle;
pub mod notify;
pub mod table;

pub use engine::{PendingTransition, TransitionEngine};
pub use error::{CoreError, HookError};
pub use hook::{HookContext, HookInvocation, HookKind, HookRegistry, NoticeHook, TransitionHook};
pub use lifecycle::{
    public_label, public_label_for_raw, Expectation, Lifecycle, Talk, TransitionOutcome,
};
pub use notify::{BroadcastNotifier, NoticeFilter, Notifier, TransitionNotice};
pub use table::{Signal, State, TransitionRule, TransitionTable};
