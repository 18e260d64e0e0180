//! Core error types.

use crate::hook::HookKind;
use crate::table::{Signal, State};
use thiserror::Error;

/// Boxed cause carried by a failed hook.
pub type HookError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors from the lifecycle engine.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("illegal transition: cannot '{signal}' a talk in state '{from}'")]
    IllegalTransition { from: State, signal: Signal },

    #[error("hook for '{signal}' failed: {cause}")]
    HookFailed {
        signal: Signal,
        #[source]
        cause: HookError,
    },

    #[error("state conflict: expected '{expected}', actual '{actual}'")]
    StateConflict { expected: State, actual: State },

    #[error("version conflict: expected {expected}, actual {actual}")]
    VersionConflict { expected: u64, actual: u64 },

    #[error("unknown state: {0}")]
    UnknownState(String),

    #[error("unknown signal: {0}")]
    UnknownSignal(String),

    #[error("invalid transition table: {reason}")]
    InvalidTable { reason: String },

    #[error("no hook registered for {kind}")]
    MissingHook { kind: HookKind },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CoreError {
    /// Returns whether the caller may retry after re-fetching the talk.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            CoreError::StateConflict { .. } | CoreError::VersionConflict { .. }
        )
    }

    /// Returns a stable error code for presentation layers.
    pub fn error_code(&self) -> &'static str {
        match self {
            CoreError::IllegalTransition { .. } => "ILLEGAL_TRANSITION",
            CoreError::HookFailed { .. } => "HOOK_FAILED",
            CoreError::StateConflict { .. } => "CONFLICT",
            CoreError::VersionConflict { .. } => "CONFLICT",
            CoreError::UnknownState(_) => "BAD_REQUEST",
            CoreError::UnknownSignal(_) => "BAD_REQUEST",
            CoreError::InvalidTable { .. } => "INVALID_TABLE",
            CoreError::MissingHook { .. } => "INVALID_TABLE",
            CoreError::Json(_) => "BAD_REQUEST",
        }
    }
}
