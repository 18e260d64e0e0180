//! Transition notices for mailers and other out-of-band consumers.
//!
//! Hooks run inside a talk's critical section, so they only hand notices to a
//! channel. Whoever consumes the channel does the slow work.

use crate::error::HookError;
use crate::hook::HookKind;
use crate::table::{Signal, State};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::broadcast;

/// A committed-or-pending transition worth telling someone about.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitionNotice {
    pub talk_id: String,
    pub hook: HookKind,
    pub signal: Signal,
    pub from: State,
    pub to: State,
    pub data: Value,
}

/// Receives notices from hooks. Must not block.
pub trait Notifier: Send + Sync {
    fn notify(&self, notice: TransitionNotice) -> Result<(), HookError>;
}

/// Subscription filter. Empty lists match everything.
#[derive(Debug, Clone, Default)]
pub struct NoticeFilter {
    pub talks: Vec<String>,
    pub signals: Vec<Signal>,
    pub to_states: Vec<State>,
}

impl NoticeFilter {
    /// Returns true if the notice matches this filter.
    pub fn matches(&self, notice: &TransitionNotice) -> bool {
        (self.talks.is_empty() || self.talks.contains(&notice.talk_id))
            && (self.signals.is_empty() || self.signals.contains(&notice.signal))
            && (self.to_states.is_empty() || self.to_states.contains(&notice.to))
    }
}

/// Fans notices out over a tokio broadcast channel.
pub struct BroadcastNotifier {
    sender: broadcast::Sender<TransitionNotice>,

    /// Subscription id -> filter.
    subscriptions: DashMap<String, NoticeFilter>,
}

impl BroadcastNotifier {
    pub fn new(channel_capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(channel_capacity.max(1));
        Self {
            sender,
            subscriptions: DashMap::new(),
        }
    }

    /// Subscribes to notices.
    ///
    /// The filter is recorded under the returned id; receivers apply it with
    /// [`BroadcastNotifier::accepts`].
    pub fn subscribe(
        &self,
        filter: NoticeFilter,
    ) -> (String, broadcast::Receiver<TransitionNotice>) {
        let subscription_id = format!("sub-{}", uuid::Uuid::new_v4());
        let receiver = self.sender.subscribe();
        self.subscriptions.insert(subscription_id.clone(), filter);
        (subscription_id, receiver)
    }

    /// Returns true if the notice passes the subscription's filter.
    /// Unknown subscriptions accept nothing.
    pub fn accepts(&self, subscription_id: &str, notice: &TransitionNotice) -> bool {
        self.subscriptions
            .get(subscription_id)
            .map(|f| f.matches(notice))
            .unwrap_or(false)
    }

    /// Returns true if the subscription was found and removed.
    pub fn unsubscribe(&self, subscription_id: &str) -> bool {
        self.subscriptions.remove(subscription_id).is_some()
    }

    pub fn subscription_count(&self) -> usize {
        self.subscriptions.len()
    }
}

impl Default for BroadcastNotifier {
    fn default() -> Self {
        Self::new(256)
    }
}

impl Notifier for BroadcastNotifier {
    fn notify(&self, notice: TransitionNotice) -> Result<(), HookError> {
        // No receivers is not an error: nobody is listening for mail today.
        if self.sender.send(notice).is_err() {
            tracing::debug!("transition notice dropped, no subscribers");
        }
        Ok(())
    }
}

/// Creates a shared notifier.
pub fn create_notifier(channel_capacity: usize) -> Arc<BroadcastNotifier> {
    Arc::new(BroadcastNotifier::new(channel_capacity))
}
