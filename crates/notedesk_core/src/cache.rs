//! Collection cache for the full note list.
//!
//! # Responsibility
//! - Hold the local view of "all notes" plus its freshness.
//! - Collapse concurrent refresh triggers into one remote `list_notes` call.
//!
//! # Invariants
//! - At most one fetch is in flight at any time; later triggers await it.
//! - A refresh replaces the record sequence wholesale, in service order.
//!   Records are never patched client-side.
//! - A failed refresh keeps the last known-good records and records the
//!   cause in `last_error`.
//! - Applied generations only increase; a result older than the applied
//!   generation is discarded whether it succeeded or failed. Single-flight
//!   keeps fetches from overlapping, so this only fires if they ever do.
//! - The fetch runs on its own task; dropping every waiter does not stop it,
//!   and `Loading` always resolves to `Fresh` or `Failed`.

use crate::model::note::{NoteId, NoteRecord};
use crate::remote::{RemoteError, RemoteNoteService, RemoteResult};
use futures::future::{BoxFuture, FutureExt, Shared};
use log::{debug, info, warn};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::Instant;

/// Freshness of the cached note list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    /// Never loaded, explicitly invalidated, or older than `stale_after`.
    Stale,
    /// A refresh is in flight.
    Loading,
    /// Last refresh succeeded and has not aged out.
    Fresh,
    /// Last refresh failed; see `CacheSnapshot::last_error`.
    Failed,
}

impl Freshness {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Stale => "stale",
            Self::Loading => "loading",
            Self::Fresh => "fresh",
            Self::Failed => "failed",
        }
    }
}

/// Point-in-time view of the cache.
///
/// `records` is shared, so snapshots taken between two refreshes point at
/// the same allocation.
#[derive(Debug, Clone)]
pub struct CacheSnapshot {
    pub records: Arc<Vec<NoteRecord>>,
    pub freshness: Freshness,
    pub last_error: Option<RemoteError>,
    /// Generation of the fetch that produced `records`; 0 before first load.
    pub generation: u64,
}

impl CacheSnapshot {
    pub fn find(&self, id: NoteId) -> Option<&NoteRecord> {
        self.records.iter().find(|note| note.id == id)
    }
}

type RefreshFuture = Shared<BoxFuture<'static, RemoteResult<CacheSnapshot>>>;

struct CacheState {
    records: Arc<Vec<NoteRecord>>,
    freshness: Freshness,
    last_error: Option<RemoteError>,
    applied_generation: u64,
    issued_generation: u64,
    fetched_at: Option<Instant>,
    stale_after: Option<Duration>,
    in_flight: Option<RefreshFuture>,
}

impl CacheState {
    fn effective_freshness(&self) -> Freshness {
        match (self.freshness, self.stale_after, self.fetched_at) {
            (Freshness::Fresh, Some(max_age), Some(fetched_at))
                if fetched_at.elapsed() >= max_age =>
            {
                Freshness::Stale
            }
            (freshness, _, _) => freshness,
        }
    }

    fn snapshot(&self) -> CacheSnapshot {
        CacheSnapshot {
            records: Arc::clone(&self.records),
            freshness: self.effective_freshness(),
            last_error: self.last_error.clone(),
            generation: self.applied_generation,
        }
    }
}

/// Single-flight cache over `RemoteNoteService::list_notes`.
pub struct CollectionCache {
    remote: Arc<dyn RemoteNoteService>,
    state: Arc<Mutex<CacheState>>,
}

impl CollectionCache {
    /// Creates an empty, stale cache.
    ///
    /// `stale_after` is the maximum age of a fresh snapshot; `None` keeps
    /// snapshots fresh until the next explicit invalidation.
    pub fn new(remote: Arc<dyn RemoteNoteService>, stale_after: Option<Duration>) -> Self {
        Self {
            remote,
            state: Arc::new(Mutex::new(CacheState {
                records: Arc::new(Vec::new()),
                freshness: Freshness::Stale,
                last_error: None,
                applied_generation: 0,
                issued_generation: 0,
                fetched_at: None,
                stale_after,
                in_flight: None,
            })),
        }
    }

    /// Returns the current records and freshness without fetching.
    pub fn get(&self) -> CacheSnapshot {
        lock(&self.state).snapshot()
    }

    /// Looks up one note in the current snapshot.
    pub fn find(&self, id: NoteId) -> Option<NoteRecord> {
        lock(&self.state)
            .records
            .iter()
            .find(|note| note.id == id)
            .cloned()
    }

    pub fn contains(&self, id: NoteId) -> bool {
        lock(&self.state).records.iter().any(|note| note.id == id)
    }

    /// Whether at least one refresh has succeeded.
    pub fn has_loaded(&self) -> bool {
        lock(&self.state).applied_generation > 0
    }

    /// Marks a fresh snapshot stale without fetching.
    pub fn mark_stale(&self) {
        let mut state = lock(&self.state);
        if state.freshness == Freshness::Fresh {
            state.freshness = Freshness::Stale;
        }
    }

    /// Refetches the full list, or joins the refresh already in flight.
    ///
    /// Every caller that joins the same flight observes the same result.
    ///
    /// # Errors
    /// - The `RemoteError` of the underlying fetch. The cache keeps its
    ///   previous records and reports `Freshness::Failed`.
    pub async fn invalidate_and_refresh(&self) -> RemoteResult<CacheSnapshot> {
        let flight = {
            let mut state = lock(&self.state);
            if let Some(flight) = state.in_flight.clone() {
                debug!(
                    "event=cache_refresh module=cache status=joined generation={}",
                    state.issued_generation
                );
                flight
            } else {
                state.issued_generation += 1;
                state.freshness = Freshness::Loading;
                let flight = spawn_flight(
                    Arc::clone(&self.remote),
                    Arc::clone(&self.state),
                    state.issued_generation,
                );
                state.in_flight = Some(flight.clone());
                flight
            }
        };
        flight.await
    }
}

// The fetch runs on its own task so a waiter that gives up never leaves the
// flight half-polled; the shared future only waits for that task.
fn spawn_flight(
    remote: Arc<dyn RemoteNoteService>,
    shared_state: Arc<Mutex<CacheState>>,
    generation: u64,
) -> RefreshFuture {
    let task = tokio::spawn(fetch_and_apply(
        remote,
        Arc::clone(&shared_state),
        generation,
    ));
    async move {
        match task.await {
            Ok(result) => result,
            Err(err) => {
                let err = RemoteError::Transport(format!("refresh task stopped: {err}"));
                let mut state = lock(&shared_state);
                state.in_flight = None;
                state.freshness = Freshness::Failed;
                state.last_error = Some(err.clone());
                warn!(
                    "event=cache_refresh module=cache status=error generation={} error_code=interrupted",
                    generation
                );
                Err(err)
            }
        }
    }
    .boxed()
    .shared()
}

async fn fetch_and_apply(
    remote: Arc<dyn RemoteNoteService>,
    shared_state: Arc<Mutex<CacheState>>,
    generation: u64,
) -> RemoteResult<CacheSnapshot> {
    let started_at = Instant::now();
    info!("event=cache_refresh module=cache status=start generation={generation}");

    let result = remote.list_notes().await;

    let mut state = lock(&shared_state);
    state.in_flight = None;
    state.apply(generation, result, started_at)
}

impl CacheState {
    fn apply(
        &mut self,
        generation: u64,
        result: RemoteResult<Vec<NoteRecord>>,
        started_at: Instant,
    ) -> RemoteResult<CacheSnapshot> {
        if generation < self.applied_generation {
            debug!(
                "event=cache_refresh module=cache status=skipped generation={} applied_generation={}",
                generation, self.applied_generation
            );
            return Ok(self.snapshot());
        }
        match result {
            Ok(records) => {
                info!(
                    "event=cache_refresh module=cache status=ok generation={} count={} duration_ms={}",
                    generation,
                    records.len(),
                    started_at.elapsed().as_millis()
                );
                self.records = Arc::new(records);
                self.freshness = Freshness::Fresh;
                self.last_error = None;
                self.applied_generation = generation;
                self.fetched_at = Some(Instant::now());
                Ok(self.snapshot())
            }
            Err(err) => {
                warn!(
                    "event=cache_refresh module=cache status=error generation={} duration_ms={} error_code={} kept_count={}",
                    generation,
                    started_at.elapsed().as_millis(),
                    err.code(),
                    self.records.len()
                );
                self.freshness = Freshness::Failed;
                self.last_error = Some(err.clone());
                Err(err)
            }
        }
    }
}

fn lock(state: &Mutex<CacheState>) -> MutexGuard<'_, CacheState> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
