//! Note record and draft types.
//!
//! # Responsibility
//! - Define the canonical `NoteRecord` read model and its wire shape.
//! - Provide draft validation shared by create/update intents.
//! - Derive short plain-text previews for list rows.
//!
//! # Invariants
//! - `id` is assigned by the remote service and never changes.
//! - `created_at` never changes; `updated_at` advances on every update.
//! - `updated_at >= created_at`; wire payloads violating this are rejected.

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};

const PREVIEW_MAX_CHARS: usize = 100;

static MARKDOWN_IMAGE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"!\[[^\]]*]\([^)]*\)").expect("valid image regex"));
static MARKDOWN_LINK_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[([^\]]+)\]\(([^)]+)\)").expect("valid link regex"));
static MARKDOWN_SYMBOL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"[\*_`#>~|\-\[\]\(\)!]+"#).expect("valid markdown symbol regex"));
static WHITESPACE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid ws regex"));

/// Server-assigned note identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NoteId(pub i64);

impl NoteId {
    /// Returns whether this id can belong to a persisted note.
    pub fn is_valid(self) -> bool {
        self.0 > 0
    }
}

impl Display for NoteId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for NoteId {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

/// Canonical note read model, as returned by the remote service.
///
/// Serialized with camelCase keys (`createdAt`, `updatedAt`) and RFC 3339
/// timestamps to match the REST contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "NoteRecordWire")]
pub struct NoteRecord {
    pub id: NoteId,
    pub title: String,
    /// Raw markdown; may be empty.
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct NoteRecordWire {
    id: NoteId,
    title: String,
    #[serde(default)]
    content: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<NoteRecordWire> for NoteRecord {
    type Error = NoteRecordError;

    fn try_from(wire: NoteRecordWire) -> Result<Self, Self::Error> {
        let record = NoteRecord {
            id: wire.id,
            title: wire.title,
            content: wire.content,
            created_at: wire.created_at,
            updated_at: wire.updated_at,
        };
        record.validate()?;
        Ok(record)
    }
}

/// Structural problems found in a note record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NoteRecordError {
    /// `id` is zero or negative.
    NonPositiveId(i64),
    /// `updated_at` precedes `created_at`.
    UpdatedBeforeCreated {
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    },
}

impl Display for NoteRecordError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NonPositiveId(id) => write!(f, "note id must be positive, got {id}"),
            Self::UpdatedBeforeCreated {
                created_at,
                updated_at,
            } => write!(
                f,
                "updatedAt ({}) must be >= createdAt ({})",
                updated_at.to_rfc3339(),
                created_at.to_rfc3339()
            ),
        }
    }
}

impl Error for NoteRecordError {}

impl NoteRecord {
    /// Checks record-level invariants.
    pub fn validate(&self) -> Result<(), NoteRecordError> {
        if !self.id.is_valid() {
            return Err(NoteRecordError::NonPositiveId(self.id.0));
        }
        if self.updated_at < self.created_at {
            return Err(NoteRecordError::UpdatedBeforeCreated {
                created_at: self.created_at,
                updated_at: self.updated_at,
            });
        }
        Ok(())
    }

    /// Returns a draft seeded from this record's current title and content.
    pub fn to_draft(&self) -> NoteDraft {
        NoteDraft {
            title: self.title.clone(),
            content: self.content.clone(),
        }
    }

    /// Short plain-text summary of the markdown body for list rows.
    ///
    /// Images are dropped, links keep their label, markdown symbols are
    /// removed and whitespace collapsed; at most 100 chars are kept.
    pub fn preview(&self) -> Option<String> {
        derive_plain_preview(self.content.as_str())
    }
}

/// Derives a plain-text preview from markdown. Returns `None` when nothing
/// readable remains.
pub fn derive_plain_preview(content: &str) -> Option<String> {
    let without_images = MARKDOWN_IMAGE_RE.replace_all(content, " ");
    let without_links = MARKDOWN_LINK_RE.replace_all(&without_images, "$1");
    let without_symbols = MARKDOWN_SYMBOL_RE.replace_all(&without_links, " ");
    let normalized = WHITESPACE_RE.replace_all(&without_symbols, " ");
    let trimmed = normalized.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.chars().take(PREVIEW_MAX_CHARS).collect())
    }
}

/// User-editable title/content pair held by the add/edit dialogs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoteDraft {
    pub title: String,
    pub content: String,
}

impl NoteDraft {
    pub fn new(title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            content: content.into(),
        }
    }

    /// Validates the draft and returns the payload to send.
    ///
    /// The title is trimmed; content is passed through untouched.
    ///
    /// # Errors
    /// - `ValidationError::EmptyTitle` when the trimmed title is empty.
    pub fn validated(&self) -> Result<NotePayload, ValidationError> {
        let title = self.title.trim();
        if title.is_empty() {
            return Err(ValidationError::EmptyTitle);
        }
        Ok(NotePayload {
            title: title.to_string(),
            content: self.content.clone(),
        })
    }
}

/// Validated request body for `POST /notes` and `PUT /notes/{id}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NotePayload {
    pub title: String,
    pub content: String,
}

/// Draft rejected before contacting the remote service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationError {
    /// Title is empty after trimming.
    EmptyTitle,
}

impl Display for ValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyTitle => write!(f, "title must not be empty"),
        }
    }
}

impl Error for ValidationError {}
