//! Note domain model.
//!
//! # Responsibility
//! - Define the note record exchanged with the remote note service.
//! - Validate user drafts before any mutation leaves the process.
//!
//! # Invariants
//! - Every persisted note is identified by a positive, server-assigned `NoteId`.
//! - `updated_at >= created_at` for every record accepted from the wire.

pub mod note;
