//! Dialog state machine for the add/edit/view surfaces.
//!
//! # Responsibility
//! - Track which single editing surface is open and which note it targets.
//! - Own draft title/content while an add or edit dialog is open.
//!
//! # Invariants
//! - Exactly one variant is active; at most one note is targeted.
//! - Drafts exist only in `Adding`/`Editing` and are reset (empty or seeded
//!   from the target note) on every entry, never carried across targets.
//! - Transitions are pure: no I/O, no logging.

use crate::model::note::{NoteDraft, NoteId, NoteRecord};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Active dialog surface.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum DialogState {
    #[default]
    Closed,
    Adding {
        draft: NoteDraft,
    },
    Editing {
        target: NoteId,
        draft: NoteDraft,
    },
    Viewing {
        target: NoteId,
    },
}

/// User or coordinator signal driving a transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DialogEvent {
    OpenAdd,
    /// Open the edit dialog seeded from `note`. Valid from `Closed` and
    /// `Viewing`.
    OpenEdit(NoteRecord),
    OpenView(NoteRecord),
    /// Switch the open view dialog to editing the same note.
    Edit(NoteRecord),
    /// Replace the draft of the open add/edit dialog.
    EditDraft(NoteDraft),
    Cancel,
    Close,
    SubmitSucceeded,
    SubmitFailed,
}

impl DialogEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::OpenAdd => "open_add",
            Self::OpenEdit(_) => "open_edit",
            Self::OpenView(_) => "open_view",
            Self::Edit(_) => "edit",
            Self::EditDraft(_) => "edit_draft",
            Self::Cancel => "cancel",
            Self::Close => "close",
            Self::SubmitSucceeded => "submit_succeeded",
            Self::SubmitFailed => "submit_failed",
        }
    }
}

/// Rejected transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DialogError {
    /// `event` has no transition out of `from`.
    InvalidTransition {
        from: &'static str,
        event: &'static str,
    },
    /// `Edit` carried a note other than the one being viewed.
    TargetMismatch { viewing: NoteId, requested: NoteId },
}

impl Display for DialogError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidTransition { from, event } => {
                write!(f, "dialog cannot handle `{event}` while {from}")
            }
            Self::TargetMismatch { viewing, requested } => write!(
                f,
                "cannot edit note {requested} while viewing note {viewing}"
            ),
        }
    }
}

impl Error for DialogError {}

impl DialogState {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Closed => "closed",
            Self::Adding { .. } => "adding",
            Self::Editing { .. } => "editing",
            Self::Viewing { .. } => "viewing",
        }
    }

    pub fn is_open(&self) -> bool {
        !matches!(self, Self::Closed)
    }

    /// Note targeted by an edit or view dialog.
    pub fn target(&self) -> Option<NoteId> {
        match self {
            Self::Editing { target, .. } | Self::Viewing { target } => Some(*target),
            Self::Closed | Self::Adding { .. } => None,
        }
    }

    pub fn draft(&self) -> Option<&NoteDraft> {
        match self {
            Self::Adding { draft } | Self::Editing { draft, .. } => Some(draft),
            Self::Closed | Self::Viewing { .. } => None,
        }
    }

    /// Computes the next state for `event`.
    ///
    /// # Errors
    /// - `DialogError::InvalidTransition` for events the current state does
    ///   not accept.
    /// - `DialogError::TargetMismatch` when `Edit` names another note.
    pub fn transition(&self, event: DialogEvent) -> Result<DialogState, DialogError> {
        match (self, event) {
            (Self::Closed, DialogEvent::OpenAdd) => Ok(Self::Adding {
                draft: NoteDraft::default(),
            }),
            (Self::Closed | Self::Viewing { .. }, DialogEvent::OpenEdit(note)) => {
                Ok(editing_from(&note))
            }
            (Self::Closed, DialogEvent::OpenView(note)) => Ok(Self::Viewing { target: note.id }),
            (Self::Viewing { target }, DialogEvent::Edit(note)) => {
                if note.id != *target {
                    return Err(DialogError::TargetMismatch {
                        viewing: *target,
                        requested: note.id,
                    });
                }
                Ok(editing_from(&note))
            }
            (Self::Adding { .. }, DialogEvent::EditDraft(draft)) => Ok(Self::Adding { draft }),
            (Self::Editing { target, .. }, DialogEvent::EditDraft(draft)) => Ok(Self::Editing {
                target: *target,
                draft,
            }),
            (
                Self::Adding { .. } | Self::Editing { .. },
                DialogEvent::Cancel | DialogEvent::Close | DialogEvent::SubmitSucceeded,
            ) => Ok(Self::Closed),
            (Self::Adding { .. } | Self::Editing { .. }, DialogEvent::SubmitFailed) => {
                Ok(self.clone())
            }
            (Self::Viewing { .. }, DialogEvent::Cancel | DialogEvent::Close) => Ok(Self::Closed),
            (state, event) => Err(DialogError::InvalidTransition {
                from: state.name(),
                event: event.name(),
            }),
        }
    }

    /// Applies `event` in place; the state is unchanged on error.
    pub fn apply(&mut self, event: DialogEvent) -> Result<(), DialogError> {
        *self = self.transition(event)?;
        Ok(())
    }
}

fn editing_from(note: &NoteRecord) -> DialogState {
    DialogState::Editing {
        target: note.id,
        draft: note.to_draft(),
    }
}

#[cfg(test)]
mod tests {
    use super::{DialogError, DialogEvent, DialogState};

    #[test]
    fn closed_rejects_submit_and_cancel() {
        let state = DialogState::Closed;
        assert_eq!(
            state.transition(DialogEvent::SubmitSucceeded).unwrap_err(),
            DialogError::InvalidTransition {
                from: "closed",
                event: "submit_succeeded",
            }
        );
        assert!(state.transition(DialogEvent::Cancel).is_err());
    }

    #[test]
    fn apply_keeps_state_on_error() {
        let mut state = DialogState::Closed;
        state.apply(DialogEvent::OpenAdd).unwrap();
        assert!(state.apply(DialogEvent::OpenAdd).is_err());
        assert_eq!(state.name(), "adding");
    }
}
