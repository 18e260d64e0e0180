//! Transition hooks.
//!
//! Rules name their side effect with a [`HookKind`]. The engine resolves every
//! kind to a [`TransitionHook`] when it is built, so a missing hook is a
//! construction error rather than a failure halfway through a transition.

use crate::error::HookError;
use crate::notify::{Notifier, TransitionNotice};
use crate::table::{Signal, State};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Side effect bound to a rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HookKind {
    ProcessAcceptance,
    ProcessRejection,
}

impl HookKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            HookKind::ProcessAcceptance => "process_acceptance",
            HookKind::ProcessRejection => "process_rejection",
        }
    }
}

impl fmt::Display for HookKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Caller-supplied data passed through to hooks.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HookContext {
    /// Talk the transition applies to, filled in by the lifecycle.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub talk_id: Option<String>,

    /// Free-form options, e.g. `{"send_mail": true}`.
    #[serde(default)]
    pub data: Value,
}

impl HookContext {
    pub fn new(data: Value) -> Self {
        Self {
            talk_id: None,
            data,
        }
    }

    pub fn with_talk_id(mut self, talk_id: impl Into<String>) -> Self {
        self.talk_id = Some(talk_id.into());
        self
    }

    /// Returns true if `data[name]` is boolean `true`.
    pub fn flag(&self, name: &str) -> bool {
        self.data.get(name).and_then(Value::as_bool).unwrap_or(false)
    }

    /// Whether the caller asked for mail to go out.
    pub fn send_mail(&self) -> bool {
        self.flag("send_mail")
    }

    /// Sets `data[name]` only when the caller left it unset.
    pub fn set_default(&mut self, name: &str, value: Value) {
        if self.data.is_null() {
            self.data = Value::Object(Default::default());
        }
        if let Value::Object(map) = &mut self.data {
            map.entry(name.to_string()).or_insert(value);
        }
    }
}

/// The transition a hook is running for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HookInvocation {
    pub signal: Signal,
    pub from: State,
    pub to: State,
}

/// A side effect bound to a transition.
///
/// `call` runs before the transition is committed; returning an error aborts
/// it. `committed` runs only once the new state is persisted and visible, so
/// anything observable outside the process belongs there.
pub trait TransitionHook: Send + Sync {
    fn call(&self, invocation: &HookInvocation, ctx: &HookContext) -> Result<(), HookError>;

    fn committed(&self, _invocation: &HookInvocation, _ctx: &HookContext) {}
}

impl<F> TransitionHook for F
where
    F: Fn(&HookInvocation, &HookContext) -> Result<(), HookError> + Send + Sync,
{
    fn call(&self, invocation: &HookInvocation, ctx: &HookContext) -> Result<(), HookError> {
        self(invocation, ctx)
    }
}

/// Acceptance/rejection processing.
///
/// Does nothing unless a notifier is attached and the context sets
/// `send_mail`, in which case a notice is handed off without blocking once
/// the transition has committed.
pub struct NoticeHook {
    kind: HookKind,
    notifier: Option<Arc<dyn Notifier>>,
}

impl NoticeHook {
    pub fn new(kind: HookKind) -> Self {
        Self {
            kind,
            notifier: None,
        }
    }

    pub fn with_notifier(kind: HookKind, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            kind,
            notifier: Some(notifier),
        }
    }
}

impl TransitionHook for NoticeHook {
    fn call(&self, _invocation: &HookInvocation, _ctx: &HookContext) -> Result<(), HookError> {
        Ok(())
    }

    fn committed(&self, invocation: &HookInvocation, ctx: &HookContext) {
        let Some(notifier) = &self.notifier else {
            return;
        };
        if !ctx.send_mail() {
            return;
        }

        tracing::debug!(
            hook = %self.kind,
            talk = ctx.talk_id.as_deref().unwrap_or("-"),
            "queueing transition notice"
        );
        let notice = TransitionNotice {
            talk_id: ctx.talk_id.clone().unwrap_or_default(),
            hook: self.kind,
            signal: invocation.signal,
            from: invocation.from,
            to: invocation.to,
            data: ctx.data.clone(),
        };
        if let Err(e) = notifier.notify(notice) {
            tracing::warn!(hook = %self.kind, error = %e, "transition notice not delivered");
        }
    }
}

/// Maps hook kinds to implementations.
#[derive(Clone)]
pub struct HookRegistry {
    hooks: HashMap<HookKind, Arc<dyn TransitionHook>>,
}

impl HookRegistry {
    /// A registry with no hooks at all.
    pub fn empty() -> Self {
        Self {
            hooks: HashMap::new(),
        }
    }

    /// Placeholder acceptance/rejection hooks with no notifier.
    pub fn placeholders() -> Self {
        Self::empty()
            .with_hook(
                HookKind::ProcessAcceptance,
                NoticeHook::new(HookKind::ProcessAcceptance),
            )
            .with_hook(
                HookKind::ProcessRejection,
                NoticeHook::new(HookKind::ProcessRejection),
            )
    }

    /// Acceptance/rejection hooks that publish through `notifier`.
    pub fn notifying(notifier: Arc<dyn Notifier>) -> Self {
        Self::empty()
            .with_hook(
                HookKind::ProcessAcceptance,
                NoticeHook::with_notifier(HookKind::ProcessAcceptance, notifier.clone()),
            )
            .with_hook(
                HookKind::ProcessRejection,
                NoticeHook::with_notifier(HookKind::ProcessRejection, notifier),
            )
    }

    /// Registers (or replaces) the hook for `kind`.
    pub fn with_hook(mut self, kind: HookKind, hook: impl TransitionHook + 'static) -> Self {
        self.hooks.insert(kind, Arc::new(hook));
        self
    }

    pub fn get(&self, kind: HookKind) -> Option<&Arc<dyn TransitionHook>> {
        self.hooks.get(&kind)
    }
}

impl Default for HookRegistry {
    fn default() -> Self {
        Self::placeholders()
    }
}

impl fmt::Debug for HookRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HookRegistry")
            .field("kinds", &self.hooks.keys().collect::<Vec<_>>())
            .finish()
    }
}
