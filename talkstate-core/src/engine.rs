//! Transition engine - legality checks and hook dispatch over a shared table.

use crate::error::CoreError;
use crate::hook::{HookContext, HookInvocation, HookRegistry, TransitionHook};
use crate::table::{Signal, State, TransitionRule, TransitionTable};
use std::fmt;
use std::sync::Arc;

/// Stateless transition engine.
///
/// Holds the table and the hook bound to each rule. Safe to share across
/// threads; it never mutates anything.
pub struct TransitionEngine {
    table: Arc<TransitionTable>,

    /// Hook per rule, parallel to `table.rules()`.
    bound: Vec<Option<Arc<dyn TransitionHook>>>,
}

impl TransitionEngine {
    /// Binds `hooks` to `table`. Fails if a rule names a hook kind the
    /// registry does not provide.
    pub fn new(table: Arc<TransitionTable>, hooks: &HookRegistry) -> Result<Self, CoreError> {
        if let Some(kind) = table
            .hook_kinds()
            .into_iter()
            .find(|kind| hooks.get(*kind).is_none())
        {
            return Err(CoreError::MissingHook { kind });
        }

        let bound = table
            .rules()
            .iter()
            .map(|rule| rule.hook.and_then(|kind| hooks.get(kind).cloned()))
            .collect();

        tracing::debug!(
            rules = table.rules().len(),
            checksum = table.checksum(),
            "transition engine ready"
        );

        Ok(Self { table, bound })
    }

    /// The conference table with placeholder hooks.
    pub fn conference() -> Result<Self, CoreError> {
        Self::new(
            Arc::new(TransitionTable::conference()?),
            &HookRegistry::placeholders(),
        )
    }

    pub fn table(&self) -> &TransitionTable {
        &self.table
    }

    /// Returns true if `signal` is legal in `state`.
    pub fn can_fire(&self, state: State, signal: Signal) -> bool {
        self.table.target_for(state, signal).is_some()
    }

    /// Signals that are legal in `state`.
    pub fn available_signals(&self, state: State) -> Vec<Signal> {
        self.table.events_available_from(state)
    }

    /// The rule `signal` would follow from `state`, without running its hook.
    pub fn describe(&self, state: State, signal: Signal) -> Result<&TransitionRule, CoreError> {
        self.table
            .target_for(state, signal)
            .ok_or(CoreError::IllegalTransition {
                from: state,
                signal,
            })
    }

    /// Computes the state reached by firing `signal` in `state`, running the
    /// rule's hook in full.
    ///
    /// A hook error aborts with `HookFailed`. Callers that persist the result
    /// should use [`TransitionEngine::begin`] instead.
    pub fn fire(
        &self,
        state: State,
        signal: Signal,
        ctx: &HookContext,
    ) -> Result<State, CoreError> {
        Ok(self.begin(state, signal, ctx)?.commit(ctx))
    }

    /// Checks legality and runs the rule's hook, leaving its post-commit
    /// work pending. Dropping the result without committing discards it.
    pub fn begin(
        &self,
        state: State,
        signal: Signal,
        ctx: &HookContext,
    ) -> Result<PendingTransition, CoreError> {
        let pos = self
            .table
            .position_for(state, signal)
            .ok_or(CoreError::IllegalTransition {
                from: state,
                signal,
            })?;
        let invocation = HookInvocation {
            signal,
            from: state,
            to: self.table.rules()[pos].to,
        };

        let hook = self.bound[pos].clone();
        if let Some(hook) = &hook {
            hook.call(&invocation, ctx).map_err(|cause| {
                tracing::warn!(%signal, from = %state, error = %cause, "transition hook failed");
                CoreError::HookFailed { signal, cause }
            })?;
        }

        Ok(PendingTransition { invocation, hook })
    }
}

/// A legal transition whose hook has run but not yet been told of the commit.
#[must_use = "a pending transition does nothing until committed"]
pub struct PendingTransition {
    invocation: HookInvocation,
    hook: Option<Arc<dyn TransitionHook>>,
}

impl PendingTransition {
    /// State the transition leads to.
    pub fn target(&self) -> State {
        self.invocation.to
    }

    /// Runs the hook's post-commit work and returns the target state.
    pub fn commit(self, ctx: &HookContext) -> State {
        if let Some(hook) = &self.hook {
            hook.committed(&self.invocation, ctx);
        }
        self.invocation.to
    }
}

impl fmt::Debug for PendingTransition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingTransition")
            .field("invocation", &self.invocation)
            .field("hooked", &self.hook.is_some())
            .finish()
    }
}

impl fmt::Debug for TransitionEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransitionEngine")
            .field("rules", &self.table.rules().len())
            .field("checksum", &self.table.checksum())
            .finish()
    }
}
