//! Notes session driver.
//!
//! # Responsibility
//! - Wire dialog state, mutation coordinator, collection cache and export
//!   pipeline along the user-facing control flow.
//! - Translate mutation outcomes into dialog transitions.
//!
//! # Invariants
//! - The dialog only closes after a submit whose mutation was applied.
//! - A failed submit keeps the draft for retry.
//! - Export reads the current cache snapshot and never mutates it.
//! - The dialog lock is never held across an await point.

use crate::cache::{CacheSnapshot, CollectionCache};
use crate::config::NotesConfig;
use crate::dialog::{DialogError, DialogEvent, DialogState};
use crate::export::{
    DocumentRenderer, ExportArtifact, ExportError, ExportOptions, ExportPipeline,
};
use crate::export::pdf::PdfRenderer;
use crate::model::note::{NoteDraft, NoteId, NoteRecord};
use crate::mutation::{
    IntentKey, IntentStatus, MutationCoordinator, MutationError, MutationOutcome,
};
use crate::remote::{HttpNoteService, RemoteError, RemoteNoteService};
use log::{error, info};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

/// Session-level failure.
#[derive(Debug)]
pub enum SessionError {
    Dialog(DialogError),
    Mutation(MutationError),
    Export(ExportError),
    Remote(RemoteError),
    /// The note is not part of the current cache snapshot.
    NoteNotLoaded(NoteId),
}

impl Display for SessionError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Dialog(err) => write!(f, "{err}"),
            Self::Mutation(err) => write!(f, "{err}"),
            Self::Export(err) => write!(f, "{err}"),
            Self::Remote(err) => write!(f, "{err}"),
            Self::NoteNotLoaded(id) => write!(f, "note {id} is not in the loaded list"),
        }
    }
}

impl Error for SessionError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Dialog(err) => Some(err),
            Self::Mutation(err) => Some(err),
            Self::Export(err) => Some(err),
            Self::Remote(err) => Some(err),
            Self::NoteNotLoaded(_) => None,
        }
    }
}

impl From<DialogError> for SessionError {
    fn from(value: DialogError) -> Self {
        Self::Dialog(value)
    }
}

impl From<MutationError> for SessionError {
    fn from(value: MutationError) -> Self {
        Self::Mutation(value)
    }
}

impl From<ExportError> for SessionError {
    fn from(value: ExportError) -> Self {
        Self::Export(value)
    }
}

impl From<RemoteError> for SessionError {
    fn from(value: RemoteError) -> Self {
        Self::Remote(value)
    }
}

pub type SessionResult<T> = Result<T, SessionError>;

/// One user's view of the notes collection.
pub struct NotesSession<R: DocumentRenderer = PdfRenderer> {
    dialog: Mutex<DialogState>,
    cache: Arc<CollectionCache>,
    mutations: MutationCoordinator,
    exporter: ExportPipeline<R>,
}

impl NotesSession<PdfRenderer> {
    pub fn new(remote: Arc<dyn RemoteNoteService>, stale_after: Option<Duration>) -> Self {
        Self::with_renderer(remote, stale_after, PdfRenderer)
    }

    /// Builds a session against the HTTP service named by `config`.
    ///
    /// # Errors
    /// - `SessionError::Remote` when the HTTP client cannot be built.
    pub fn from_config(config: &NotesConfig) -> SessionResult<Self> {
        let remote = HttpNoteService::new(&config.base_url, config.request_timeout)?;
        Ok(Self::new(Arc::new(remote), config.stale_after))
    }
}

impl<R: DocumentRenderer> NotesSession<R> {
    pub fn with_renderer(
        remote: Arc<dyn RemoteNoteService>,
        stale_after: Option<Duration>,
        renderer: R,
    ) -> Self {
        let cache = Arc::new(CollectionCache::new(Arc::clone(&remote), stale_after));
        Self {
            dialog: Mutex::new(DialogState::Closed),
            mutations: MutationCoordinator::new(remote, Arc::clone(&cache)),
            cache,
            exporter: ExportPipeline::new(renderer),
        }
    }

    /// Current dialog state.
    pub fn dialog(&self) -> DialogState {
        lock(&self.dialog).clone()
    }

    /// Current cache snapshot, without fetching.
    pub fn snapshot(&self) -> CacheSnapshot {
        self.cache.get()
    }

    pub fn cache(&self) -> &CollectionCache {
        &self.cache
    }

    pub fn intent_status(&self, key: IntentKey) -> IntentStatus {
        self.mutations.status(key)
    }

    /// Refetches the list, joining any refresh already in flight.
    pub async fn refresh(&self) -> SessionResult<CacheSnapshot> {
        Ok(self.cache.invalidate_and_refresh().await?)
    }

    pub fn open_add(&self) -> SessionResult<()> {
        self.dispatch(DialogEvent::OpenAdd)
    }

    pub fn open_edit(&self, id: NoteId) -> SessionResult<()> {
        let note = self.loaded(id)?;
        self.dispatch(DialogEvent::OpenEdit(note))
    }

    pub fn open_view(&self, id: NoteId) -> SessionResult<()> {
        let note = self.loaded(id)?;
        self.dispatch(DialogEvent::OpenView(note))
    }

    /// Switches the open view dialog to editing the viewed note.
    pub fn edit_viewed(&self) -> SessionResult<()> {
        let state = self.dialog();
        let id = match state {
            DialogState::Viewing { target } => target,
            other => {
                return Err(DialogError::InvalidTransition {
                    from: other.name(),
                    event: "edit",
                }
                .into())
            }
        };
        let note = self.loaded(id)?;
        self.dispatch(DialogEvent::Edit(note))
    }

    pub fn edit_draft(&self, title: impl Into<String>, content: impl Into<String>) -> SessionResult<()> {
        self.dispatch(DialogEvent::EditDraft(NoteDraft::new(title, content)))
    }

    pub fn cancel(&self) -> SessionResult<()> {
        self.dispatch(DialogEvent::Cancel)
    }

    pub fn close(&self) -> SessionResult<()> {
        self.dispatch(DialogEvent::Close)
    }

    /// Submits the open add/edit dialog.
    ///
    /// Applied mutations close the dialog; failures keep the draft. An
    /// `AlreadyPending` outcome leaves the dialog untouched.
    ///
    /// # Errors
    /// - `MutationError::NoActiveDraft` when no add/edit dialog is open.
    /// - `MutationError::Validation` / `Remote` from the coordinator.
    pub async fn submit(&self) -> SessionResult<MutationOutcome<NoteRecord>> {
        let state = self.dialog();
        let result = match &state {
            DialogState::Adding { draft } => {
                self.mutations.create(&draft.title, &draft.content).await
            }
            DialogState::Editing { target, draft } => {
                self.mutations
                    .update(*target, &draft.title, &draft.content)
                    .await
            }
            DialogState::Closed | DialogState::Viewing { .. } => {
                error!(
                    "event=dialog_submit module=session status=error dialog={} error_code=no_active_draft",
                    state.name()
                );
                return Err(MutationError::NoActiveDraft.into());
            }
        };

        match result {
            Ok(MutationOutcome::Applied(record)) => {
                self.settle_submit(&state, DialogEvent::SubmitSucceeded)?;
                Ok(MutationOutcome::Applied(record))
            }
            Ok(MutationOutcome::AlreadyPending) => Ok(MutationOutcome::AlreadyPending),
            Err(err) => {
                self.settle_submit(&state, DialogEvent::SubmitFailed)?;
                Err(err.into())
            }
        }
    }

    /// Deletes note `id`. The caller has already confirmed with the user.
    pub async fn delete(&self, id: NoteId) -> SessionResult<MutationOutcome<()>> {
        let outcome = self.mutations.delete(id).await?;
        if outcome.is_applied() {
            self.close_if_targeting(id);
        }
        Ok(outcome)
    }

    /// Exports note `id` from the current snapshot.
    ///
    /// # Errors
    /// - `ExportError::NoteNotFound` when the snapshot lacks `id`.
    /// - Any `ExportError` raised by the pipeline.
    pub fn export(&self, id: NoteId, options: &ExportOptions) -> SessionResult<ExportArtifact> {
        let snapshot = self.cache.get();
        let note = snapshot.find(id).ok_or(ExportError::NoteNotFound(id))?;
        Ok(self.exporter.export(note, options)?)
    }

    fn loaded(&self, id: NoteId) -> SessionResult<NoteRecord> {
        self.cache.find(id).ok_or(SessionError::NoteNotLoaded(id))
    }

    fn dispatch(&self, event: DialogEvent) -> SessionResult<()> {
        let mut dialog = lock(&self.dialog);
        let from = dialog.name();
        let event_name = event.name();
        dialog.apply(event)?;
        info!(
            "event=dialog_transition module=session status=ok from={} event={} to={} note_id={}",
            from,
            event_name,
            dialog.name(),
            dialog.target().map_or(0, |id| id.0)
        );
        Ok(())
    }

    // The dialog may have moved on while the mutation was in flight (for
    // example a cancel). Draft edits made meanwhile do not count as a
    // different dialog; the kind and target do.
    fn settle_submit(&self, submitted: &DialogState, event: DialogEvent) -> SessionResult<()> {
        if !same_dialog(&lock(&self.dialog), submitted) {
            info!(
                "event=dialog_submit module=session status=skipped event={} reason=dialog_changed",
                event.name()
            );
            return Ok(());
        }
        self.dispatch(event)
    }

    fn close_if_targeting(&self, id: NoteId) {
        let mut dialog = lock(&self.dialog);
        if dialog.target() == Some(id) {
            *dialog = DialogState::Closed;
            info!(
                "event=dialog_transition module=session status=ok event=target_deleted to=closed note_id={}",
                id
            );
        }
    }
}

fn same_dialog(current: &DialogState, submitted: &DialogState) -> bool {
    current.name() == submitted.name() && current.target() == submitted.target()
}

fn lock(state: &Mutex<DialogState>) -> MutexGuard<'_, DialogState> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::{same_dialog, NotesSession, SessionError};
    use crate::dialog::{DialogError, DialogState};
    use crate::model::note::{NoteDraft, NoteId};
    use crate::mutation::MutationError;
    use crate::remote::InMemoryNoteService;
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn submit_without_open_dialog_is_rejected() {
        let session = NotesSession::new(Arc::new(InMemoryNoteService::new()), None);
        let err = session.submit().await.unwrap_err();
        assert!(matches!(
            err,
            SessionError::Mutation(MutationError::NoActiveDraft)
        ));
    }

    #[test]
    fn edit_viewed_without_view_dialog_is_invalid() {
        let session = NotesSession::new(Arc::new(InMemoryNoteService::new()), None);
        let err = session.edit_viewed().unwrap_err();
        assert!(matches!(
            err,
            SessionError::Dialog(DialogError::InvalidTransition { .. })
        ));
        assert_eq!(session.dialog(), DialogState::Closed);
    }

    #[tokio::test]
    async fn opening_unloaded_note_fails() {
        let remote = Arc::new(InMemoryNoteService::new());
        let seeded = remote.seed(NoteDraft::new("later", ""));
        let session = NotesSession::new(remote, None);

        assert!(matches!(
            session.open_view(seeded.id).unwrap_err(),
            SessionError::NoteNotLoaded(id) if id == seeded.id
        ));

        session.refresh().await.unwrap();
        session.open_view(seeded.id).unwrap();
        assert_eq!(session.dialog().target(), Some(seeded.id));
        assert!(session.open_view(NoteId(404)).is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn submit_closes_dialog_despite_draft_edits_in_flight() {
        let remote = Arc::new(InMemoryNoteService::new().with_latency(Duration::from_millis(20)));
        let session = NotesSession::new(remote.clone(), None);
        session.open_add().unwrap();
        session.edit_draft("first", "").unwrap();

        let edit_meanwhile = async {
            tokio::time::sleep(Duration::from_millis(5)).await;
            session.edit_draft("first!", "").unwrap();
        };
        let (outcome, ()) = tokio::join!(session.submit(), edit_meanwhile);

        assert!(outcome.unwrap().is_applied());
        assert_eq!(session.dialog(), DialogState::Closed);
        assert_eq!(remote.snapshot().len(), 1);
    }

    #[test]
    fn same_dialog_ignores_draft_but_not_target() {
        let draft = |title: &str| NoteDraft::new(title, "");
        assert!(same_dialog(
            &DialogState::Adding { draft: draft("a") },
            &DialogState::Adding { draft: draft("b") },
        ));
        assert!(same_dialog(
            &DialogState::Editing { target: NoteId(1), draft: draft("a") },
            &DialogState::Editing { target: NoteId(1), draft: draft("b") },
        ));
        assert!(!same_dialog(
            &DialogState::Editing { target: NoteId(1), draft: draft("a") },
            &DialogState::Editing { target: NoteId(2), draft: draft("a") },
        ));
        assert!(!same_dialog(
            &DialogState::Adding { draft: draft("a") },
            &DialogState::Closed,
        ));
    }
}
