//! Mutation coordinator for create/update/delete intents.
//!
//! # Responsibility
//! - Validate drafts before any remote call.
//! - Execute one remote mutation per intent and refresh the collection cache
//!   after every success.
//! - Track a lifecycle status per intent key that callers can poll.
//!
//! # Invariants
//! - A validation failure never reaches the remote service and never
//!   changes intent status.
//! - While an intent key is pending, a second intent with the same key is a
//!   no-op (`MutationOutcome::AlreadyPending`), not a second remote call.
//! - Intents with different keys never block each other.
//! - Only the success path calls `CollectionCache::invalidate_and_refresh`.
//! - A mutation is never cancelled once sent. Abandoning the caller's
//!   future only drops interest in the result; the key stays `Pending`
//!   until the remote call and its refresh have finished.

use crate::cache::CollectionCache;
use crate::model::note::{NoteDraft, NoteId, NotePayload, NoteRecord, ValidationError};
use crate::remote::{RemoteError, RemoteNoteService, RemoteResult};
use log::{error, info, warn};
use std::collections::HashMap;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

/// Identity of one mutation intent for pending/idempotency tracking.
///
/// There is a single `Create` key: only one add dialog exists, so at most
/// one create is in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IntentKey {
    Create,
    Update(NoteId),
    Delete(NoteId),
}

impl IntentKey {
    fn op(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update(_) => "update",
            Self::Delete(_) => "delete",
        }
    }

    fn note_id(self) -> i64 {
        match self {
            Self::Create => 0,
            Self::Update(id) | Self::Delete(id) => id.0,
        }
    }
}

/// Lifecycle of one intent key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IntentStatus {
    /// Never issued.
    Idle,
    Pending,
    /// Last attempt succeeded.
    Settled,
    /// Last attempt failed with the given message.
    Failed(String),
}

/// Result of a mutation that passed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MutationOutcome<T> {
    /// The remote call succeeded and the cache was refreshed.
    Applied(T),
    /// An identical intent was already pending; nothing was sent.
    AlreadyPending,
}

impl<T> MutationOutcome<T> {
    pub fn applied(self) -> Option<T> {
        match self {
            Self::Applied(value) => Some(value),
            Self::AlreadyPending => None,
        }
    }

    pub fn is_applied(&self) -> bool {
        matches!(self, Self::Applied(_))
    }
}

/// Mutation failure reported to the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MutationError {
    /// Draft rejected locally; nothing was sent.
    Validation(ValidationError),
    /// Remote call failed; dialog and cache are left untouched.
    Remote(RemoteError),
    /// Delete target is absent from the last loaded snapshot.
    UnknownNote(NoteId),
    /// Submit was called with no add/edit dialog open. Caller contract
    /// violation, not a user-facing failure.
    NoActiveDraft,
    /// The mutation task stopped before reporting back (panic or runtime
    /// shutdown). The remote effect is unknown.
    Interrupted(String),
}

impl Display for MutationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(err) => write!(f, "{err}"),
            Self::Remote(err) => write!(f, "{err}"),
            Self::UnknownNote(id) => write!(f, "note {id} is not in the current list"),
            Self::NoActiveDraft => write!(f, "no add or edit dialog is open"),
            Self::Interrupted(message) => write!(f, "mutation interrupted: {message}"),
        }
    }
}

impl Error for MutationError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::Remote(err) => Some(err),
            _ => None,
        }
    }
}

impl From<ValidationError> for MutationError {
    fn from(value: ValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<RemoteError> for MutationError {
    fn from(value: RemoteError) -> Self {
        Self::Remote(value)
    }
}

pub type MutationResult<T> = Result<MutationOutcome<T>, MutationError>;

type IntentTable = Arc<Mutex<HashMap<IntentKey, IntentStatus>>>;

/// Executes note mutations against the remote service.
pub struct MutationCoordinator {
    remote: Arc<dyn RemoteNoteService>,
    cache: Arc<CollectionCache>,
    intents: IntentTable,
}

impl MutationCoordinator {
    pub fn new(remote: Arc<dyn RemoteNoteService>, cache: Arc<CollectionCache>) -> Self {
        Self {
            remote,
            cache,
            intents: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Current lifecycle status of one intent key.
    pub fn status(&self, key: IntentKey) -> IntentStatus {
        lock(&self.intents)
            .get(&key)
            .cloned()
            .unwrap_or(IntentStatus::Idle)
    }

    pub fn is_pending(&self, key: IntentKey) -> bool {
        self.status(key) == IntentStatus::Pending
    }

    /// Creates a note from `title` and `content`.
    ///
    /// # Errors
    /// - `MutationError::Validation` when the trimmed title is empty.
    /// - `MutationError::Remote` when the service rejects the request.
    pub async fn create(&self, title: &str, content: &str) -> MutationResult<NoteRecord> {
        let payload = validate(IntentKey::Create, title, content)?;
        let Some(pending) = self.begin(IntentKey::Create) else {
            return Ok(MutationOutcome::AlreadyPending);
        };

        let remote = Arc::clone(&self.remote);
        let call = async move { remote.create_note(&payload).await };
        self.execute(pending, call, |record: &NoteRecord| record.id)
            .await
    }

    /// Replaces title and content of note `id`.
    ///
    /// # Errors
    /// - `MutationError::Validation` when the trimmed title is empty.
    /// - `MutationError::Remote` when the service rejects the request.
    pub async fn update(&self, id: NoteId, title: &str, content: &str) -> MutationResult<NoteRecord> {
        let key = IntentKey::Update(id);
        let payload = validate(key, title, content)?;
        let Some(pending) = self.begin(key) else {
            return Ok(MutationOutcome::AlreadyPending);
        };

        let remote = Arc::clone(&self.remote);
        let call = async move { remote.update_note(id, &payload).await };
        self.execute(pending, call, |record: &NoteRecord| record.id)
            .await
    }

    /// Deletes note `id`. Unconditional once called; confirmation is the
    /// caller's job.
    ///
    /// # Errors
    /// - `MutationError::UnknownNote` when a loaded snapshot lacks `id`.
    /// - `MutationError::Remote` when the service rejects the request.
    pub async fn delete(&self, id: NoteId) -> MutationResult<()> {
        let key = IntentKey::Delete(id);
        if self.cache.has_loaded() && !self.cache.contains(id) {
            info!(
                "event=mutation module=mutation op=delete status=skipped note_id={} error_code=unknown_note",
                id
            );
            return Err(MutationError::UnknownNote(id));
        }
        let Some(pending) = self.begin(key) else {
            return Ok(MutationOutcome::AlreadyPending);
        };

        let remote = Arc::clone(&self.remote);
        let call = async move { remote.delete_note(id).await };
        self.execute(pending, call, move |_: &()| id).await
    }

    fn begin(&self, key: IntentKey) -> Option<PendingIntent> {
        let mut intents = lock(&self.intents);
        if intents.get(&key) == Some(&IntentStatus::Pending) {
            info!(
                "event=mutation module=mutation op={} status=skipped note_id={} reason=already_pending",
                key.op(),
                key.note_id()
            );
            return None;
        }
        intents.insert(key, IntentStatus::Pending);
        info!(
            "event=mutation module=mutation op={} status=start note_id={}",
            key.op(),
            key.note_id()
        );
        Some(PendingIntent {
            intents: Arc::clone(&self.intents),
            key,
            settled: false,
        })
    }

    /// Runs the remote call and the follow-up refresh on their own task.
    ///
    /// The caller only waits for the task; dropping the caller's future
    /// leaves the task running until the intent settles.
    async fn execute<T, F, N>(&self, pending: PendingIntent, call: F, note_id: N) -> MutationResult<T>
    where
        T: Send + 'static,
        F: Future<Output = RemoteResult<T>> + Send + 'static,
        N: FnOnce(&T) -> NoteId + Send + 'static,
    {
        let key = pending.key;
        let cache = Arc::clone(&self.cache);
        let task = tokio::spawn(async move {
            let started_at = Instant::now();
            match call.await {
                Ok(value) => {
                    log_success(key, started_at, note_id(&value));
                    refresh_after(&cache, key).await;
                    pending.settle(IntentStatus::Settled);
                    Ok(MutationOutcome::Applied(value))
                }
                Err(err) => Err(pending.fail(started_at, err)),
            }
        });

        match task.await {
            Ok(result) => result,
            Err(err) => {
                error!(
                    "event=mutation module=mutation op={} status=error note_id={} error_code=interrupted",
                    key.op(),
                    key.note_id()
                );
                Err(MutationError::Interrupted(err.to_string()))
            }
        }
    }
}

// A refresh failure does not undo a successful mutation; the cache carries
// the error.
async fn refresh_after(cache: &CollectionCache, key: IntentKey) {
    if let Err(err) = cache.invalidate_and_refresh().await {
        warn!(
            "event=mutation_refresh module=mutation op={} status=error note_id={} error_code={}",
            key.op(),
            key.note_id(),
            err.code()
        );
    }
}

/// Pending marker for one intent key. Dropped unsettled only when the
/// mutation task itself dies, which records the key as failed.
struct PendingIntent {
    intents: IntentTable,
    key: IntentKey,
    settled: bool,
}

impl PendingIntent {
    fn settle(mut self, status: IntentStatus) {
        lock(&self.intents).insert(self.key, status);
        self.settled = true;
    }

    fn fail(self, started_at: Instant, err: RemoteError) -> MutationError {
        warn!(
            "event=mutation module=mutation op={} status=error note_id={} duration_ms={} error_code={}",
            self.key.op(),
            self.key.note_id(),
            started_at.elapsed().as_millis(),
            err.code()
        );
        self.settle(IntentStatus::Failed(err.to_string()));
        MutationError::Remote(err)
    }
}

impl Drop for PendingIntent {
    fn drop(&mut self) {
        if !self.settled {
            lock(&self.intents).insert(
                self.key,
                IntentStatus::Failed("mutation task stopped before settling".to_string()),
            );
        }
    }
}

fn validate(
    key: IntentKey,
    title: &str,
    content: &str,
) -> Result<NotePayload, MutationError> {
    NoteDraft::new(title, content).validated().map_err(|err| {
        info!(
            "event=mutation module=mutation op={} status=skipped note_id={} error_code=validation",
            key.op(),
            key.note_id()
        );
        MutationError::Validation(err)
    })
}

fn log_success(key: IntentKey, started_at: Instant, id: NoteId) {
    info!(
        "event=mutation module=mutation op={} status=ok note_id={} duration_ms={}",
        key.op(),
        id,
        started_at.elapsed().as_millis()
    );
}

fn lock(
    intents: &Mutex<HashMap<IntentKey, IntentStatus>>,
) -> MutexGuard<'_, HashMap<IntentKey, IntentStatus>> {
    intents.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::{IntentKey, IntentStatus, MutationCoordinator, MutationError, MutationOutcome};
    use crate::cache::{CollectionCache, Freshness};
    use crate::model::note::{NoteId, ValidationError};
    use crate::remote::InMemoryNoteService;
    use std::sync::Arc;
    use std::time::Duration;

    fn coordinator() -> (Arc<InMemoryNoteService>, MutationCoordinator) {
        let remote = Arc::new(InMemoryNoteService::new());
        let cache = Arc::new(CollectionCache::new(remote.clone(), None));
        (remote.clone(), MutationCoordinator::new(remote, cache))
    }

    #[tokio::test]
    async fn validation_failure_leaves_status_idle() {
        let (remote, coordinator) = coordinator();
        let err = coordinator.create("   ", "body").await.unwrap_err();
        assert_eq!(err, MutationError::Validation(ValidationError::EmptyTitle));
        assert_eq!(coordinator.status(IntentKey::Create), IntentStatus::Idle);
        assert_eq!(remote.call_counts().create, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn abandoned_create_still_settles_and_refreshes() {
        let remote = Arc::new(InMemoryNoteService::new().with_latency(Duration::from_millis(20)));
        let cache = Arc::new(CollectionCache::new(remote.clone(), None));
        let coordinator = MutationCoordinator::new(remote.clone(), Arc::clone(&cache));
        {
            let future = coordinator.create("once", "");
            futures::pin_mut!(future);
            assert!(futures::poll!(future.as_mut()).is_pending());
            assert!(futures::poll!(future.as_mut()).is_pending());
        }
        assert!(coordinator.is_pending(IntentKey::Create));

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(coordinator.status(IntentKey::Create), IntentStatus::Settled);
        assert_eq!(remote.snapshot().len(), 1);
        let snapshot = cache.get();
        assert_eq!(snapshot.freshness, Freshness::Fresh);
        assert_eq!(snapshot.records.len(), 1);
        assert_eq!(remote.call_counts().create, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn retry_while_abandoned_create_is_in_flight_is_a_no_op() {
        let remote = Arc::new(InMemoryNoteService::new().with_latency(Duration::from_millis(20)));
        let cache = Arc::new(CollectionCache::new(remote.clone(), None));
        let coordinator = MutationCoordinator::new(remote.clone(), cache);
        {
            let future = coordinator.create("once", "");
            futures::pin_mut!(future);
            assert!(futures::poll!(future.as_mut()).is_pending());
        }

        let retry = coordinator.create("once", "").await.unwrap();
        assert_eq!(retry, MutationOutcome::AlreadyPending);
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(remote.snapshot().len(), 1);
    }

    #[tokio::test]
    async fn settled_status_is_recorded_per_key() {
        let (_remote, coordinator) = coordinator();
        let created = coordinator.create("a", "").await.unwrap().applied().unwrap();
        assert_eq!(coordinator.status(IntentKey::Create), IntentStatus::Settled);
        assert_eq!(
            coordinator.status(IntentKey::Delete(created.id)),
            IntentStatus::Idle
        );
        assert_eq!(coordinator.status(IntentKey::Update(NoteId(42))), IntentStatus::Idle);
    }
}
