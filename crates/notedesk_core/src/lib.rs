//! Core domain logic for NoteDesk.
//! This crate owns the cache consistency and export invariants; callers
//! only render what it reports.

pub mod cache;
pub mod config;
pub mod dialog;
pub mod export;
pub mod logging;
pub mod model;
pub mod mutation;
pub mod remote;
pub mod session;

pub use cache::{CacheSnapshot, CollectionCache, Freshness};
pub use config::{ConfigError, NotesConfig};
pub use dialog::{DialogError, DialogEvent, DialogState};
pub use export::{
    export, export_file_stem, slugify, DocumentRenderer, ExportArtifact, ExportError,
    ExportOptions, ExportPipeline, PdfRenderer, RenderError, RenderOptions, Theme,
};
pub use logging::{default_log_level, init_logging, logging_status, LoggingConfig, LoggingError};
pub use model::note::{NoteDraft, NoteId, NotePayload, NoteRecord, ValidationError};
pub use mutation::{
    IntentKey, IntentStatus, MutationCoordinator, MutationError, MutationOutcome, MutationResult,
};
pub use remote::{
    HttpNoteService, InMemoryNoteService, RemoteError, RemoteNoteService, RemoteOp, RemoteResult,
};
pub use session::{NotesSession, SessionError, SessionResult};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::core_version;

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }
}
