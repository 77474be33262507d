//! In-process note service.
//!
//! # Responsibility
//! - Implement `RemoteNoteService` without a network, for tests and local runs.
//! - Count calls per operation and allow scripted failures.
//!
//! # Invariants
//! - Ids are assigned sequentially starting at 1 and never reused.
//! - A created note has `updated_at == created_at`.
//! - Every update strictly advances `updated_at`.
//! - Every call yields to the scheduler once before touching state, so
//!   concurrent callers interleave the way network calls do.

use super::{RemoteError, RemoteNoteService, RemoteResult};
use crate::model::note::{NoteDraft, NoteId, NotePayload, NoteRecord};
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// Operation selector for counters and failure injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RemoteOp {
    List,
    Create,
    Update,
    Delete,
}

/// Number of calls received per operation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RemoteCallCounts {
    pub list: usize,
    pub create: usize,
    pub update: usize,
    pub delete: usize,
}

#[derive(Default)]
struct Store {
    notes: Vec<NoteRecord>,
    last_id: i64,
}

/// Note store kept in process memory.
#[derive(Default)]
pub struct InMemoryNoteService {
    store: Mutex<Store>,
    failures: Mutex<HashMap<RemoteOp, VecDeque<String>>>,
    latency: Option<Duration>,
    list_calls: AtomicUsize,
    create_calls: AtomicUsize,
    update_calls: AtomicUsize,
    delete_calls: AtomicUsize,
}

impl InMemoryNoteService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a fixed delay to every call.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Inserts a note directly, bypassing counters and scripted failures.
    pub fn seed(&self, draft: NoteDraft) -> NoteRecord {
        let mut store = lock(&self.store);
        let now = Utc::now();
        insert_note(&mut store, draft.title, draft.content, now)
    }

    /// Makes the next call of `op` fail with `RemoteError::Injected(message)`.
    ///
    /// Multiple scripted failures for the same op are consumed in order.
    pub fn fail_next(&self, op: RemoteOp, message: impl Into<String>) {
        lock(&self.failures)
            .entry(op)
            .or_default()
            .push_back(message.into());
    }

    /// Returns a copy of the stored notes without counting a call.
    pub fn snapshot(&self) -> Vec<NoteRecord> {
        lock(&self.store).notes.clone()
    }

    pub fn call_counts(&self) -> RemoteCallCounts {
        RemoteCallCounts {
            list: self.list_calls.load(Ordering::SeqCst),
            create: self.create_calls.load(Ordering::SeqCst),
            update: self.update_calls.load(Ordering::SeqCst),
            delete: self.delete_calls.load(Ordering::SeqCst),
        }
    }

    async fn enter(&self, op: RemoteOp) -> RemoteResult<()> {
        self.counter(op).fetch_add(1, Ordering::SeqCst);
        match self.latency {
            Some(latency) => tokio::time::sleep(latency).await,
            None => tokio::task::yield_now().await,
        }
        match lock(&self.failures).get_mut(&op).and_then(VecDeque::pop_front) {
            Some(message) => Err(RemoteError::Injected(message)),
            None => Ok(()),
        }
    }

    fn counter(&self, op: RemoteOp) -> &AtomicUsize {
        match op {
            RemoteOp::List => &self.list_calls,
            RemoteOp::Create => &self.create_calls,
            RemoteOp::Update => &self.update_calls,
            RemoteOp::Delete => &self.delete_calls,
        }
    }
}

#[async_trait]
impl RemoteNoteService for InMemoryNoteService {
    async fn list_notes(&self) -> RemoteResult<Vec<NoteRecord>> {
        self.enter(RemoteOp::List).await?;
        Ok(self.snapshot())
    }

    async fn create_note(&self, payload: &NotePayload) -> RemoteResult<NoteRecord> {
        self.enter(RemoteOp::Create).await?;
        let mut store = lock(&self.store);
        Ok(insert_note(
            &mut store,
            payload.title.clone(),
            payload.content.clone(),
            Utc::now(),
        ))
    }

    async fn update_note(&self, id: NoteId, payload: &NotePayload) -> RemoteResult<NoteRecord> {
        self.enter(RemoteOp::Update).await?;
        let mut store = lock(&self.store);
        let note = store
            .notes
            .iter_mut()
            .find(|note| note.id == id)
            .ok_or(RemoteError::NotFound(id))?;
        note.title = payload.title.clone();
        note.content = payload.content.clone();
        note.updated_at = next_update_time(note.updated_at, Utc::now());
        Ok(note.clone())
    }

    async fn delete_note(&self, id: NoteId) -> RemoteResult<()> {
        self.enter(RemoteOp::Delete).await?;
        let mut store = lock(&self.store);
        let before = store.notes.len();
        store.notes.retain(|note| note.id != id);
        if store.notes.len() == before {
            return Err(RemoteError::NotFound(id));
        }
        Ok(())
    }
}

fn insert_note(store: &mut Store, title: String, content: String, now: DateTime<Utc>) -> NoteRecord {
    store.last_id += 1;
    let record = NoteRecord {
        id: NoteId(store.last_id),
        title,
        content,
        created_at: now,
        updated_at: now,
    };
    store.notes.push(record.clone());
    record
}

fn next_update_time(previous: DateTime<Utc>, now: DateTime<Utc>) -> DateTime<Utc> {
    let floor = previous + ChronoDuration::milliseconds(1);
    if now > floor {
        now
    } else {
        floor
    }
}

// Poisoning only happens if a holder panicked; the data is still usable.
fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
