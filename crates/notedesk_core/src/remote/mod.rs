//! Remote note service contract.
//!
//! # Responsibility
//! - Define the async CRUD surface the cache and coordinator consume.
//! - Define the error shape every backend maps its failures into.
//!
//! # Invariants
//! - The remote service is the source of truth for ids and timestamps.
//! - `RemoteError` is `Clone` so one fetch result can be handed to every
//!   waiter of a single-flight refresh.

use crate::model::note::{NoteId, NotePayload, NoteRecord};
use async_trait::async_trait;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod http;
pub mod memory;

pub use http::HttpNoteService;
pub use memory::{InMemoryNoteService, RemoteCallCounts, RemoteOp};

pub type RemoteResult<T> = Result<T, RemoteError>;

/// CRUD surface of the note store.
///
/// Mirrors `GET /notes`, `POST /notes`, `PUT /notes/{id}` and
/// `DELETE /notes/{id}`.
#[async_trait]
pub trait RemoteNoteService: Send + Sync {
    /// Lists every note in service response order.
    async fn list_notes(&self) -> RemoteResult<Vec<NoteRecord>>;
    /// Creates one note; the service assigns id and timestamps.
    async fn create_note(&self, payload: &NotePayload) -> RemoteResult<NoteRecord>;
    /// Replaces title and content of one note.
    async fn update_note(&self, id: NoteId, payload: &NotePayload) -> RemoteResult<NoteRecord>;
    /// Deletes one note permanently.
    async fn delete_note(&self, id: NoteId) -> RemoteResult<()>;
}

/// Failure of a remote call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteError {
    /// Request could not be sent or no response arrived.
    Transport(String),
    /// Service answered with a non-success status.
    Status { code: u16, message: String },
    /// Response body could not be decoded into the expected shape.
    Decode(String),
    /// Target note does not exist on the service.
    NotFound(NoteId),
    /// Failure scripted on an in-memory backend.
    Injected(String),
}

impl RemoteError {
    /// Stable short code used in log events.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Transport(_) => "transport",
            Self::Status { .. } => "status",
            Self::Decode(_) => "decode",
            Self::NotFound(_) => "not_found",
            Self::Injected(_) => "injected",
        }
    }
}

impl Display for RemoteError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Transport(message) => write!(f, "note service unreachable: {message}"),
            Self::Status { code, message } if message.is_empty() => {
                write!(f, "note service returned HTTP {code}")
            }
            Self::Status { code, message } => {
                write!(f, "note service returned HTTP {code}: {message}")
            }
            Self::Decode(message) => write!(f, "invalid note service response: {message}"),
            Self::NotFound(id) => write!(f, "note not found: {id}"),
            Self::Injected(message) => write!(f, "{message}"),
        }
    }
}

impl Error for RemoteError {}
