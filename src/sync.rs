//! Learning-profile synchronizer.
//!
//! Owns the canonical in-memory document and the only write path to it.
//! Mutations apply synchronously so callers in the same tick read their own
//! writes; persistence is debounced behind a single deadline that every
//! mutation re-arms, so a burst of rapid mutations becomes one store write
//! carrying all of them. The persist loop awaits each write inline, which
//! keeps at most one write in flight per document — a deadline that fires
//! while a write is outstanding queues behind it instead of racing it.

use crate::notify::Notifier;
use crate::store::{FetchOutcome, ProfileStore, StoreError};
use crate::types::LearningProfile;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum SyncError {
    /// No document loaded: either `initialize` has not succeeded yet or the
    /// session ended. Callers must not read profile fields in this state.
    #[error("learning profile is not ready")]
    NotReady,

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("persist loop is gone")]
    Closed,
}

enum PersistCommand {
    /// A mutation happened: (re)arm the debounce deadline.
    Rearm,
    /// Session ended: drop any pending deadline.
    Cancel,
    /// Persist the current document now, bypassing the debounce.
    Immediate {
        ack: oneshot::Sender<Result<(), StoreError>>,
    },
}

type SharedDocument = Arc<RwLock<Option<LearningProfile>>>;

/// Handle to the synchronizer. Clones share one document and one persist loop.
#[derive(Clone)]
pub struct ProfileSync {
    document: SharedDocument,
    identity: Arc<RwLock<Option<Uuid>>>,
    store: Arc<dyn ProfileStore>,
    notifier: Notifier,
    persist_tx: mpsc::UnboundedSender<PersistCommand>,
}

// A panicking mutation closure poisons the lock; the document itself is
// still structurally valid (closures mutate it in place), so recover the
// guard rather than wedging every later caller.
fn write_guard(lock: &RwLock<Option<LearningProfile>>) -> RwLockWriteGuard<'_, Option<LearningProfile>> {
    lock.write().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn read_guard(lock: &RwLock<Option<LearningProfile>>) -> RwLockReadGuard<'_, Option<LearningProfile>> {
    lock.read().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl ProfileSync {
    pub fn new(store: Arc<dyn ProfileStore>, notifier: Notifier, debounce: Duration) -> Self {
        let document: SharedDocument = Arc::new(RwLock::new(None));
        let identity = Arc::new(RwLock::new(None));
        let (persist_tx, persist_rx) = mpsc::unbounded_channel();

        tokio::spawn(persist_loop(
            Arc::clone(&document),
            Arc::clone(&identity),
            Arc::clone(&store),
            notifier.clone(),
            debounce,
            persist_rx,
        ));

        Self {
            document,
            identity,
            store,
            notifier,
            persist_tx,
        }
    }

    /// Fetch the document for `identity`, once per authenticated session.
    ///
    /// A missing row installs the zero-state defaults without persisting
    /// them; the first real mutation will. Any other fetch failure surfaces
    /// a notification and leaves the synchronizer not-ready.
    pub async fn initialize(&self, identity: Uuid) -> Result<(), SyncError> {
        let outcome = match self.store.fetch(identity).await {
            Ok(outcome) => outcome,
            Err(error) => {
                tracing::error!(%identity, %error, "profile fetch failed");
                self.notifier
                    .error("Could not load your profile. Please try signing in again.");
                return Err(error.into());
            }
        };

        match outcome {
            FetchOutcome::Found(mut document) => {
                document.identity.get_or_insert(identity);
                document.touch_login(chrono::Utc::now());
                *self.identity.write().unwrap_or_else(|p| p.into_inner()) = Some(identity);
                *write_guard(&self.document) = Some(document);
                // The login touch is a mutation like any other.
                self.send(PersistCommand::Rearm)?;
                tracing::info!(%identity, "profile loaded");
            }
            FetchOutcome::NotFound => {
                *self.identity.write().unwrap_or_else(|p| p.into_inner()) = Some(identity);
                *write_guard(&self.document) = Some(LearningProfile::default_for(identity));
                tracing::info!(%identity, "no profile row yet, starting from defaults");
            }
        }
        Ok(())
    }

    pub fn is_ready(&self) -> bool {
        read_guard(&self.document).is_some()
    }

    /// Apply `updater` to the in-memory document and schedule a debounced
    /// persist. The update is visible to every read issued after this call
    /// returns.
    pub fn mutate(&self, updater: impl FnOnce(&mut LearningProfile)) -> Result<(), SyncError> {
        {
            let mut guard = write_guard(&self.document);
            let document = guard.as_mut().ok_or(SyncError::NotReady)?;
            updater(document);
        }
        self.send(PersistCommand::Rearm)
    }

    /// Read through a borrowing closure without cloning the document.
    pub fn read<R>(&self, f: impl FnOnce(&LearningProfile) -> R) -> Result<R, SyncError> {
        let guard = read_guard(&self.document);
        let document = guard.as_ref().ok_or(SyncError::NotReady)?;
        Ok(f(document))
    }

    /// Cloned copy of the current document.
    pub fn snapshot(&self) -> Result<LearningProfile, SyncError> {
        self.read(Clone::clone)
    }

    /// Persist the current document immediately, bypassing the debounce but
    /// still sequenced behind any in-flight write.
    pub async fn flush(&self) -> Result<(), SyncError> {
        let (ack, done) = oneshot::channel();
        self.send(PersistCommand::Immediate { ack })?;
        done.await.map_err(|_| SyncError::Closed)??;
        Ok(())
    }

    /// Replace the document with the zero-state defaults and persist right
    /// away. If the write fails the optimistic reset is rolled back: the
    /// remote document is re-fetched, falling back to the pre-reset copy
    /// when the re-fetch fails too.
    pub async fn reset(&self) -> Result<(), SyncError> {
        let previous = self.snapshot()?;
        let identity = previous.identity.ok_or(SyncError::NotReady)?;

        *write_guard(&self.document) = Some(LearningProfile::default_for(identity));

        if let Err(error) = self.flush().await {
            tracing::warn!(%identity, %error, "reset persist failed, rolling back");
            self.notifier
                .error("Could not reset your data. Your previous progress was kept.");
            let restored = match self.store.fetch(identity).await {
                Ok(FetchOutcome::Found(remote)) => remote,
                Ok(FetchOutcome::NotFound) | Err(_) => previous,
            };
            *write_guard(&self.document) = Some(restored);
            return Err(error);
        }
        Ok(())
    }

    /// Identity became absent: drop the document and any pending persist.
    pub fn teardown(&self) {
        *write_guard(&self.document) = None;
        *self.identity.write().unwrap_or_else(|p| p.into_inner()) = None;
        let _ = self.send(PersistCommand::Cancel);
    }

    fn send(&self, command: PersistCommand) -> Result<(), SyncError> {
        self.persist_tx.send(command).map_err(|_| SyncError::Closed)
    }
}

impl std::fmt::Debug for ProfileSync {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProfileSync")
            .field("ready", &self.is_ready())
            .finish_non_exhaustive()
    }
}

/// Snapshot the current document and write it to the store.
///
/// Returns Ok(None) when there is nothing to persist (session tore down
/// between the deadline arming and firing).
async fn persist_snapshot(
    document: &SharedDocument,
    identity: &RwLock<Option<Uuid>>,
    store: &Arc<dyn ProfileStore>,
) -> Result<Option<()>, StoreError> {
    let snapshot = {
        let id = *identity.read().unwrap_or_else(|p| p.into_inner());
        let guard = read_guard(document);
        match (id, guard.as_ref()) {
            (Some(id), Some(doc)) => Some((id, doc.clone())),
            _ => None,
        }
    };
    match snapshot {
        Some((id, doc)) => {
            store.write(id, &doc).await?;
            Ok(Some(()))
        }
        None => Ok(None),
    }
}

async fn persist_loop(
    document: SharedDocument,
    identity: Arc<RwLock<Option<Uuid>>>,
    store: Arc<dyn ProfileStore>,
    notifier: Notifier,
    debounce: Duration,
    mut rx: mpsc::UnboundedReceiver<PersistCommand>,
) {
    let mut deadline: Option<tokio::time::Instant> = None;
    loop {
        let sleep_until = deadline
            .unwrap_or_else(|| tokio::time::Instant::now() + Duration::from_secs(3600));
        tokio::select! {
            command = rx.recv() => match command {
                Some(PersistCommand::Rearm) => {
                    deadline = Some(tokio::time::Instant::now() + debounce);
                }
                Some(PersistCommand::Cancel) => {
                    deadline = None;
                }
                Some(PersistCommand::Immediate { ack }) => {
                    deadline = None;
                    let result = persist_snapshot(&document, &identity, &store)
                        .await
                        .map(|_| ());
                    let _ = ack.send(result);
                }
                // Every handle dropped; nothing left to persist for.
                None => break,
            },
            _ = tokio::time::sleep_until(sleep_until), if deadline.is_some() => {
                deadline = None;
                match persist_snapshot(&document, &identity, &store).await {
                    Ok(Some(())) => tracing::debug!("profile persisted"),
                    Ok(None) => {}
                    Err(error) => {
                        // Local state stays authoritative; the next
                        // mutation's debounce cycle retries the full
                        // accumulated document.
                        tracing::warn!(%error, "debounced persist failed");
                        notifier.error("Could not save your progress. Retrying on your next change.");
                    }
                }
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::types::QuizRecord;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[derive(Default)]
    struct MemoryState {
        rows: HashMap<Uuid, LearningProfile>,
        writes: Vec<LearningProfile>,
        fail_writes: bool,
        fail_fetch: bool,
        in_flight: u32,
        max_in_flight: u32,
        write_delay: Option<Duration>,
    }

    /// In-memory store double with failure injection and concurrency
    /// accounting.
    #[derive(Default)]
    pub(crate) struct MemoryStore {
        state: Mutex<MemoryState>,
    }

    impl MemoryStore {
        fn with<R>(&self, f: impl FnOnce(&mut MemoryState) -> R) -> R {
            f(&mut self.state.lock().unwrap())
        }

        pub(crate) fn seed(&self, identity: Uuid, document: LearningProfile) {
            self.with(|s| s.rows.insert(identity, document));
        }

        pub(crate) fn fail_writes(&self, fail: bool) {
            self.with(|s| s.fail_writes = fail);
        }

        pub(crate) fn fail_fetch(&self, fail: bool) {
            self.with(|s| s.fail_fetch = fail);
        }

        pub(crate) fn slow_writes(&self, delay: Duration) {
            self.with(|s| s.write_delay = Some(delay));
        }

        pub(crate) fn writes(&self) -> Vec<LearningProfile> {
            self.with(|s| s.writes.clone())
        }

        pub(crate) fn max_in_flight(&self) -> u32 {
            self.with(|s| s.max_in_flight)
        }
    }

    fn transport_error() -> StoreError {
        StoreError::Status {
            status: 503,
            body: "injected".into(),
        }
    }

    #[async_trait]
    impl ProfileStore for MemoryStore {
        async fn fetch(&self, identity: Uuid) -> Result<FetchOutcome, StoreError> {
            self.with(|s| {
                if s.fail_fetch {
                    return Err(transport_error());
                }
                Ok(match s.rows.get(&identity) {
                    Some(document) => FetchOutcome::Found(document.clone()),
                    None => FetchOutcome::NotFound,
                })
            })
        }

        async fn write(&self, identity: Uuid, document: &LearningProfile) -> Result<(), StoreError> {
            let delay = self.with(|s| {
                s.in_flight += 1;
                s.max_in_flight = s.max_in_flight.max(s.in_flight);
                s.write_delay
            });
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            self.with(|s| {
                s.in_flight -= 1;
                if s.fail_writes {
                    return Err(transport_error());
                }
                s.writes.push(document.clone());
                s.rows.insert(identity, document.clone());
                Ok(())
            })
        }
    }

    pub(crate) fn harness() -> (ProfileSync, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::default());
        let sync = ProfileSync::new(
            Arc::clone(&store) as Arc<dyn ProfileStore>,
            Notifier::disconnected(),
            Duration::from_secs(1),
        );
        (sync, store)
    }

    pub(crate) async fn ready_sync() -> ProfileSync {
        let (sync, _store) = harness();
        sync.initialize(Uuid::new_v4()).await.unwrap();
        sync
    }

    async fn settle() {
        // Let the persist loop observe queued commands.
        for _ in 0..8 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn burst_of_mutations_coalesces_into_one_ordered_write() {
        let (sync, store) = harness();
        sync.initialize(Uuid::new_v4()).await.unwrap();

        for topic in ["alpha", "beta", "gamma"] {
            sync.mutate(|doc| {
                doc.quiz_history.push(QuizRecord {
                    topic: topic.into(),
                    score: 1,
                    total: 5,
                    timestamp: 0,
                });
            })
            .unwrap();
        }
        settle().await;
        tokio::time::advance(Duration::from_millis(1100)).await;
        settle().await;

        let writes = store.writes();
        assert_eq!(writes.len(), 1);
        let topics: Vec<_> = writes[0].quiz_history.iter().map(|q| q.topic.as_str()).collect();
        assert_eq!(topics, ["alpha", "beta", "gamma"]);
    }

    #[tokio::test(start_paused = true)]
    async fn each_mutation_rearms_the_deadline() {
        let (sync, store) = harness();
        sync.initialize(Uuid::new_v4()).await.unwrap();

        sync.mutate(|doc| doc.stats.words_learned += 1).unwrap();
        settle().await;
        tokio::time::advance(Duration::from_millis(600)).await;
        sync.mutate(|doc| doc.stats.words_learned += 1).unwrap();
        settle().await;
        tokio::time::advance(Duration::from_millis(600)).await;
        settle().await;

        // 1.2s after the first mutation but only 0.6s after the second.
        assert!(store.writes().is_empty());

        tokio::time::advance(Duration::from_millis(500)).await;
        settle().await;
        assert_eq!(store.writes().len(), 1);
        assert_eq!(store.writes()[0].stats.words_learned, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn missing_row_installs_defaults_without_persisting() {
        let (sync, store) = harness();
        sync.initialize(Uuid::new_v4()).await.unwrap();

        assert!(sync.is_ready());
        tokio::time::advance(Duration::from_secs(5)).await;
        settle().await;
        assert!(store.writes().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn fetch_failure_leaves_synchronizer_not_ready() {
        let (sync, store) = harness();
        store.fail_fetch(true);

        assert!(sync.initialize(Uuid::new_v4()).await.is_err());
        assert!(!sync.is_ready());
        assert!(matches!(
            sync.mutate(|_| {}),
            Err(SyncError::NotReady)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn mutations_are_visible_before_persist() {
        let sync = ready_sync().await;
        sync.mutate(|doc| doc.stats.words_learned = 7).unwrap();
        let seen = sync.read(|doc| doc.stats.words_learned).unwrap();
        assert_eq!(seen, 7);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_persist_keeps_local_state_and_retries_next_cycle() {
        let (sync, store) = harness();
        sync.initialize(Uuid::new_v4()).await.unwrap();

        store.fail_writes(true);
        sync.mutate(|doc| doc.stats.words_learned = 1).unwrap();
        settle().await;
        tokio::time::advance(Duration::from_millis(1100)).await;
        settle().await;

        assert!(store.writes().is_empty());
        assert_eq!(sync.read(|doc| doc.stats.words_learned).unwrap(), 1);

        // The next mutation's cycle carries the full accumulated state.
        store.fail_writes(false);
        sync.mutate(|doc| doc.stats.quizzes_completed = 2).unwrap();
        settle().await;
        tokio::time::advance(Duration::from_millis(1100)).await;
        settle().await;

        let writes = store.writes();
        assert_eq!(writes.len(), 1);
        assert_eq!(writes[0].stats.words_learned, 1);
        assert_eq!(writes[0].stats.quizzes_completed, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn writes_never_overlap_even_when_slow() {
        let (sync, store) = harness();
        sync.initialize(Uuid::new_v4()).await.unwrap();
        store.slow_writes(Duration::from_secs(2));

        sync.mutate(|doc| doc.stats.words_learned = 1).unwrap();
        settle().await;
        tokio::time::advance(Duration::from_millis(1100)).await;
        settle().await;

        // First write is in flight; this mutation queues behind it.
        sync.mutate(|doc| doc.stats.words_learned = 2).unwrap();
        settle().await;
        tokio::time::advance(Duration::from_secs(2)).await;
        settle().await;
        tokio::time::advance(Duration::from_secs(4)).await;
        settle().await;
        // The queued re-arm was processed only after the first write
        // finished, so the second write's slow-store sleep was registered
        // after the jump above; give it its own window to complete.
        tokio::time::advance(Duration::from_secs(2)).await;
        settle().await;

        assert_eq!(store.writes().len(), 2);
        assert_eq!(store.max_in_flight(), 1);
        assert_eq!(store.writes()[1].stats.words_learned, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn reset_persists_immediately() {
        let (sync, store) = harness();
        let identity = Uuid::new_v4();
        let mut existing = LearningProfile::default_for(identity);
        existing.stats.words_learned = 40;
        store.seed(identity, existing);
        sync.initialize(identity).await.unwrap();

        sync.reset().await.unwrap();

        // No debounce wait: the write already happened.
        assert!(store.writes().iter().any(|w| w.stats.words_learned == 0));
        assert_eq!(sync.read(|doc| doc.stats.words_learned).unwrap(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_reset_restores_remote_document() {
        let (sync, store) = harness();
        let identity = Uuid::new_v4();
        let mut existing = LearningProfile::default_for(identity);
        existing.stats.words_learned = 40;
        store.seed(identity, existing);
        sync.initialize(identity).await.unwrap();

        store.fail_writes(true);
        assert!(sync.reset().await.is_err());
        assert_eq!(sync.read(|doc| doc.stats.words_learned).unwrap(), 40);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_reset_with_failed_refetch_restores_local_copy() {
        let (sync, store) = harness();
        let identity = Uuid::new_v4();
        sync.initialize(identity).await.unwrap();
        sync.mutate(|doc| doc.stats.words_learned = 13).unwrap();

        store.fail_writes(true);
        store.fail_fetch(true);
        assert!(sync.reset().await.is_err());
        assert_eq!(sync.read(|doc| doc.stats.words_learned).unwrap(), 13);
    }

    #[tokio::test(start_paused = true)]
    async fn teardown_cancels_pending_persist() {
        let (sync, store) = harness();
        sync.initialize(Uuid::new_v4()).await.unwrap();

        sync.mutate(|doc| doc.stats.words_learned = 1).unwrap();
        sync.teardown();
        settle().await;
        tokio::time::advance(Duration::from_secs(3)).await;
        settle().await;

        assert!(store.writes().is_empty());
        assert!(matches!(sync.mutate(|_| {}), Err(SyncError::NotReady)));
    }
}
