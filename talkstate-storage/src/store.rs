//! Talk registry.
//!
//! Talks live in memory, one [`Lifecycle`] each, and are written through to a
//! [`SnapshotStore`] when the store is opened on a directory. A transition
//! becomes visible only after its snapshot is on disk.

use crate::error::StorageError;
use crate::snapshot::SnapshotStore;
use dashmap::DashMap;
use std::path::Path;
use std::sync::Arc;
use talkstate_core::{
    Expectation, HookContext, Lifecycle, Signal, Talk, TransitionEngine, TransitionOutcome,
};

/// Allocates identities for new talks.
pub trait IdGenerator: Send + Sync {
    fn next_id(&self) -> String;
}

/// Random v4 UUIDs.
#[derive(Debug, Clone, Copy, Default)]
pub struct UuidGenerator;

impl IdGenerator for UuidGenerator {
    fn next_id(&self) -> String {
        uuid::Uuid::new_v4().to_string()
    }
}

/// Concurrent talk registry.
pub struct TalkStore {
    engine: Arc<TransitionEngine>,

    /// Talks indexed by ID.
    talks: DashMap<String, Arc<Lifecycle>>,

    /// Write-through persistence, if any.
    snapshots: Option<SnapshotStore>,

    ids: Box<dyn IdGenerator>,
}

impl TalkStore {
    /// Creates a store that keeps talks in memory only.
    pub fn in_memory(engine: Arc<TransitionEngine>) -> Self {
        Self {
            engine,
            talks: DashMap::new(),
            snapshots: None,
            ids: Box::new(UuidGenerator),
        }
    }

    /// Opens a store persisted under `dir`, loading every saved talk.
    pub fn open(engine: Arc<TransitionEngine>, dir: impl AsRef<Path>) -> Result<Self, StorageError> {
        let snapshots = SnapshotStore::open(dir)?;
        let talks = DashMap::new();
        for talk in snapshots.load_all()? {
            talks.insert(
                talk.id.clone(),
                Arc::new(Lifecycle::new(engine.clone(), talk)),
            );
        }

        tracing::info!("Talk store recovered {} talks", talks.len());

        Ok(Self {
            engine,
            talks,
            snapshots: Some(snapshots),
            ids: Box::new(UuidGenerator),
        })
    }

    /// Replaces the identity generator.
    pub fn with_id_generator(mut self, ids: impl IdGenerator + 'static) -> Self {
        self.ids = Box::new(ids);
        self
    }

    pub fn engine(&self) -> &Arc<TransitionEngine> {
        &self.engine
    }

    /// Creates a new talk in the initial state.
    pub fn submit(
        &self,
        title: impl Into<String>,
        abstract_text: Option<String>,
    ) -> Result<Talk, StorageError> {
        let mut talk = Talk::new(self.ids.next_id(), title);
        talk.abstract_text = abstract_text;
        self.insert(talk.clone())?;
        Ok(talk)
    }

    /// Adds an existing talk record.
    pub fn insert(&self, talk: Talk) -> Result<(), StorageError> {
        use dashmap::mapref::entry::Entry;

        match self.talks.entry(talk.id.clone()) {
            Entry::Occupied(_) => Err(StorageError::TalkExists(talk.id)),
            Entry::Vacant(slot) => {
                if let Some(snapshots) = &self.snapshots {
                    snapshots.write_talk(&talk)?;
                }
                tracing::debug!("Stored talk {} in state {}", talk.id, talk.state);
                slot.insert(Arc::new(Lifecycle::new(self.engine.clone(), talk)));
                Ok(())
            }
        }
    }

    /// Returns the lifecycle for a talk.
    pub fn lifecycle(&self, talk_id: &str) -> Result<Arc<Lifecycle>, StorageError> {
        self.talks
            .get(talk_id)
            .map(|r| r.value().clone())
            .ok_or_else(|| StorageError::TalkNotFound(talk_id.to_string()))
    }

    /// Returns a copy of a talk.
    pub fn get(&self, talk_id: &str) -> Result<Talk, StorageError> {
        Ok(self.lifecycle(talk_id)?.snapshot())
    }

    /// All talks, oldest first.
    pub fn list(&self) -> Vec<Talk> {
        let mut talks: Vec<Talk> = self.talks.iter().map(|r| r.value().snapshot()).collect();
        talks.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.id.cmp(&b.id))
        });
        talks
    }

    pub fn can_fire(&self, talk_id: &str, signal: Signal) -> Result<bool, StorageError> {
        Ok(self.lifecycle(talk_id)?.can_fire(signal))
    }

    /// Fires `signal` on a talk, persisting the result before it is visible.
    pub fn fire(
        &self,
        talk_id: &str,
        signal: Signal,
        ctx: HookContext,
        expectation: Expectation,
    ) -> Result<TransitionOutcome, StorageError> {
        // Clone the Arc out so the map shard is not locked while firing.
        let lifecycle = self.lifecycle(talk_id)?;
        lifecycle.fire_expecting(signal, ctx, expectation, |next| {
            if let Some(snapshots) = &self.snapshots {
                snapshots.write_talk(next)?;
            }
            Ok::<(), StorageError>(())
        })
    }

    pub fn len(&self) -> usize {
        self.talks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.talks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};
    use talkstate_core::{BroadcastNotifier, CoreError, HookRegistry, State, TransitionTable};
    use tempfile::TempDir;

    struct Sequential(AtomicU64);

    impl IdGenerator for Sequential {
        fn next_id(&self) -> String {
            format!("talk-{}", self.0.fetch_add(1, Ordering::SeqCst))
        }
    }

    fn engine() -> Arc<TransitionEngine> {
        Arc::new(TransitionEngine::conference().unwrap())
    }

    fn memory_store() -> TalkStore {
        TalkStore::in_memory(engine()).with_id_generator(Sequential(AtomicU64::new(1)))
    }

    #[test]
    fn test_submit_and_get() {
        let store = memory_store();
        let talk = store
            .submit("Pin projections", Some("one two three".to_string()))
            .unwrap();

        assert_eq!(talk.id, "talk-1");
        assert_eq!(talk.state, State::New);
        assert_eq!(talk.abstract_word_count(), 3);
        assert_eq!(store.get("talk-1").unwrap(), talk);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_default_ids_are_uuids() {
        let store = TalkStore::in_memory(engine());
        let talk = store.submit("x", None).unwrap();
        assert!(uuid::Uuid::parse_str(&talk.id).is_ok());
    }

    #[test]
    fn test_duplicate_insert() {
        let store = memory_store();
        store.insert(Talk::new("t-1", "a")).unwrap();
        assert!(matches!(
            store.insert(Talk::new("t-1", "b")),
            Err(StorageError::TalkExists(_))
        ));
    }

    #[test]
    fn test_fire_lifecycle() {
        let store = memory_store();
        let talk = store.submit("x", None).unwrap();

        let outcome = store
            .fire(&talk.id, Signal::Accept, HookContext::default(), Expectation::none())
            .unwrap();
        assert_eq!(outcome.from, State::New);
        assert_eq!(outcome.to, State::Unconfirmed);
        assert_eq!(outcome.version, 1);

        assert!(store.can_fire(&talk.id, Signal::Confirm).unwrap());
        assert!(!store.can_fire(&talk.id, Signal::Accept).unwrap());
    }

    #[test]
    fn test_fire_unknown_talk() {
        let store = memory_store();
        let result = store.fire(
            "missing",
            Signal::Accept,
            HookContext::default(),
            Expectation::none(),
        );
        assert!(matches!(result, Err(StorageError::TalkNotFound(_))));
    }

    #[test]
    fn test_stale_version_rejected() {
        let store = memory_store();
        let talk = store.submit("x", None).unwrap();

        store
            .fire(&talk.id, Signal::StartReview, HookContext::default(), Expectation::version(0))
            .unwrap();

        // A second organizer still holding version 0.
        let err = store
            .fire(&talk.id, Signal::Reject, HookContext::default(), Expectation::version(0))
            .unwrap_err();
        assert!(err.is_retryable());
        assert!(matches!(
            err,
            StorageError::Core(CoreError::VersionConflict { .. })
        ));
        assert_eq!(store.get(&talk.id).unwrap().state, State::Review);
    }

    #[test]
    fn test_illegal_transition_surfaces() {
        let store = memory_store();
        let talk = store.submit("x", None).unwrap();
        let err = store
            .fire(&talk.id, Signal::Confirm, HookContext::default(), Expectation::none())
            .unwrap_err();
        assert_eq!(err.error_code(), "ILLEGAL_TRANSITION");
        assert_eq!(store.get(&talk.id).unwrap().state, State::New);
    }

    #[test]
    fn test_persisted_transitions_survive_reopen() {
        let dir = TempDir::new().unwrap();
        let id = {
            let store = TalkStore::open(engine(), dir.path()).unwrap();
            let talk = store.submit("Durable", None).unwrap();
            store
                .fire(&talk.id, Signal::Reject, HookContext::default(), Expectation::none())
                .unwrap();
            store
                .fire(&talk.id, Signal::StartReview, HookContext::default(), Expectation::none())
                .unwrap();
            talk.id
        };

        let store = TalkStore::open(engine(), dir.path()).unwrap();
        let talk = store.get(&id).unwrap();
        assert_eq!(talk.state, State::Review);
        assert_eq!(talk.version, 2);
        assert_eq!(talk.title, "Durable");
    }

    #[test]
    fn test_failed_persist_keeps_memory_state() {
        let dir = TempDir::new().unwrap();
        let store = TalkStore::open(engine(), dir.path())
            .unwrap()
            .with_id_generator(Sequential(AtomicU64::new(1)));
        let talk = store.submit("x", None).unwrap();

        // Block the talk's temp file path with a directory so the write fails.
        std::fs::create_dir(dir.path().join(format!("{}.json.tmp", talk.id))).unwrap();

        let result = store.fire(&talk.id, Signal::Accept, HookContext::default(), Expectation::none());
        assert!(matches!(result, Err(StorageError::Io(_))));
        assert_eq!(store.get(&talk.id).unwrap().state, State::New);
    }

    #[test]
    fn test_failed_index_save_survives_reopen() {
        let dir = TempDir::new().unwrap();
        let notifier = Arc::new(BroadcastNotifier::new(8));
        let (_, mut rx) = notifier.subscribe(Default::default());
        let engine = Arc::new(
            TransitionEngine::new(
                Arc::new(TransitionTable::conference().unwrap()),
                &HookRegistry::notifying(notifier.clone()),
            )
            .unwrap(),
        );
        let store = TalkStore::open(engine.clone(), dir.path())
            .unwrap()
            .with_id_generator(Sequential(AtomicU64::new(1)));
        let talk = store.submit("x", None).unwrap();

        std::fs::create_dir(dir.path().join("index.json.tmp")).unwrap();

        let ctx = HookContext::new(serde_json::json!({"send_mail": true}));
        let result = store.fire(&talk.id, Signal::Accept, ctx, Expectation::none());
        assert!(matches!(result, Err(StorageError::Io(_))));
        assert_eq!(store.get(&talk.id).unwrap().state, State::New);
        assert!(rx.try_recv().is_err());

        std::fs::remove_dir(dir.path().join("index.json.tmp")).unwrap();
        let reopened = TalkStore::open(engine, dir.path()).unwrap();
        assert_eq!(reopened.get(&talk.id).unwrap().state, State::New);
    }

    #[test]
    fn test_list_is_ordered() {
        let store = memory_store();
        let mut a = Talk::new("b-talk", "first");
        a.created_at = 1;
        let mut b = Talk::new("a-talk", "second");
        b.created_at = 2;
        store.insert(b).unwrap();
        store.insert(a).unwrap();

        let ids: Vec<String> = store.list().into_iter().map(|t| t.id).collect();
        assert_eq!(ids, vec!["b-talk", "a-talk"]);
    }

    #[test]
    fn test_concurrent_fires_on_one_talk() {
        let store = Arc::new(memory_store());
        let talk = store.submit("x", None).unwrap();

        let handles: Vec<_> = [Signal::Accept, Signal::Reject, Signal::Withdraw]
            .into_iter()
            .cycle()
            .take(12)
            .map(|signal| {
                let store = store.clone();
                let id = talk.id.clone();
                std::thread::spawn(move || {
                    store
                        .fire(&id, signal, HookContext::default(), Expectation::version(0))
                        .is_ok()
                })
            })
            .collect();

        let successes = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|ok| *ok)
            .count();
        assert_eq!(successes, 1);
        assert_eq!(store.get(&talk.id).unwrap().version, 1);
    }
}
