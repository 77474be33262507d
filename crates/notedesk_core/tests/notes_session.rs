use notedesk_core::{
    DialogState, ExportError, ExportOptions, InMemoryNoteService, IntentKey, IntentStatus,
    MutationError, MutationOutcome, NoteDraft, NoteId, NotesSession, RemoteOp, SessionError,
    ValidationError,
};
use std::sync::Arc;

async fn loaded_session(titles: &[&str]) -> (Arc<InMemoryNoteService>, NotesSession) {
    let remote = Arc::new(InMemoryNoteService::new());
    for title in titles {
        remote.seed(NoteDraft::new(*title, format!("{title} body")));
    }
    let session = NotesSession::new(remote.clone(), None);
    session.refresh().await.unwrap();
    (remote, session)
}

#[tokio::test]
async fn add_dialog_submit_creates_note_and_closes() {
    let (remote, session) = loaded_session(&[]).await;

    session.open_add().unwrap();
    session.edit_draft("Shopping", "| item | qty |\n|---|---|\n| tea | 1 |").unwrap();
    let created = session.submit().await.unwrap().applied().unwrap();

    assert_eq!(session.dialog(), DialogState::Closed);
    assert_eq!(remote.call_counts().create, 1);
    let snapshot = session.snapshot();
    assert_eq!(snapshot.records.len(), 1);
    assert_eq!(snapshot.records[0].id, created.id);
}

#[tokio::test]
async fn invalid_draft_keeps_dialog_open_with_draft() {
    let (remote, session) = loaded_session(&[]).await;

    session.open_add().unwrap();
    session.edit_draft("   ", "content kept").unwrap();
    let err = session.submit().await.unwrap_err();

    assert!(matches!(
        err,
        SessionError::Mutation(MutationError::Validation(ValidationError::EmptyTitle))
    ));
    assert_eq!(
        session.dialog(),
        DialogState::Adding {
            draft: NoteDraft::new("   ", "content kept")
        }
    );
    assert_eq!(remote.call_counts().create, 0);
}

#[tokio::test]
async fn remote_failure_keeps_edit_dialog_for_retry() {
    let (remote, session) = loaded_session(&["original"]).await;
    let id = session.snapshot().records[0].id;

    session.open_edit(id).unwrap();
    session.edit_draft("renamed", "new body").unwrap();
    remote.fail_next(RemoteOp::Update, "timeout");

    assert!(session.submit().await.is_err());
    assert_eq!(
        session.dialog(),
        DialogState::Editing {
            target: id,
            draft: NoteDraft::new("renamed", "new body"),
        }
    );
    assert!(matches!(
        session.intent_status(IntentKey::Update(id)),
        IntentStatus::Failed(_)
    ));

    let updated = session.submit().await.unwrap().applied().unwrap();
    assert_eq!(updated.title, "renamed");
    assert_eq!(session.dialog(), DialogState::Closed);
    assert_eq!(session.cache().find(id).unwrap().content, "new body");
}

#[tokio::test]
async fn view_then_edit_then_cancel() {
    let (_remote, session) = loaded_session(&["viewed"]).await;
    let id = session.snapshot().records[0].id;

    session.open_view(id).unwrap();
    assert_eq!(session.dialog(), DialogState::Viewing { target: id });

    session.edit_viewed().unwrap();
    assert_eq!(
        session.dialog().draft(),
        Some(&NoteDraft::new("viewed", "viewed body"))
    );

    session.cancel().unwrap();
    assert_eq!(session.dialog(), DialogState::Closed);
}

#[tokio::test]
async fn submit_with_viewing_dialog_is_a_contract_violation() {
    let (remote, session) = loaded_session(&["only"]).await;
    let id = session.snapshot().records[0].id;
    session.open_view(id).unwrap();

    let err = session.submit().await.unwrap_err();
    assert!(matches!(err, SessionError::Mutation(MutationError::NoActiveDraft)));
    assert_eq!(session.dialog(), DialogState::Viewing { target: id });
    assert_eq!(remote.call_counts().update, 0);
}

#[tokio::test]
async fn deleting_viewed_note_closes_the_dialog() {
    let (_remote, session) = loaded_session(&["doomed", "other"]).await;
    let doomed = session.snapshot().records[0].id;
    session.open_view(doomed).unwrap();

    let outcome = session.delete(doomed).await.unwrap();

    assert_eq!(outcome, MutationOutcome::Applied(()));
    assert_eq!(session.dialog(), DialogState::Closed);
    assert!(session.snapshot().find(doomed).is_none());
}

#[tokio::test]
async fn double_submit_sends_one_create() {
    let (remote, session) = loaded_session(&[]).await;
    session.open_add().unwrap();
    session.edit_draft("once", "").unwrap();

    let (first, second) = tokio::join!(session.submit(), session.submit());

    assert!(first.unwrap().is_applied());
    assert_eq!(second.unwrap(), MutationOutcome::AlreadyPending);
    assert_eq!(remote.call_counts().create, 1);
    assert_eq!(session.dialog(), DialogState::Closed);
}

#[tokio::test]
async fn export_reads_from_current_snapshot() {
    let (remote, session) = loaded_session(&["Export Me"]).await;
    let id = session.snapshot().records[0].id;

    let artifact = session.export(id, &ExportOptions::default()).unwrap();
    assert_eq!(artifact.file_name, format!("note-{id}-export-me.pdf"));
    assert!(!artifact.bytes.is_empty());

    let err = session.export(NoteId(404), &ExportOptions::default()).unwrap_err();
    assert!(matches!(
        err,
        SessionError::Export(ExportError::NoteNotFound(NoteId(404)))
    ));
    assert_eq!(remote.call_counts().list, 1);
}
