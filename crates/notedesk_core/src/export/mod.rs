//! Note export pipeline.
//!
//! # Responsibility
//! - Synthesize one document source (heading, optional timestamp line, raw
//!   markdown body) from a note.
//! - Render it through a `DocumentRenderer` backend.
//! - Derive the deterministic artifact name `note-{id}-{slug}.{ext}`.
//!
//! # Invariants
//! - Note content is passed to the renderer unmodified.
//! - Export never mutates the note or any cache.
//! - Every failure, including a renderer panic, is reported as
//!   `ExportError`; no partial artifact is produced.

use crate::model::note::{NoteId, NoteRecord};
use chrono::SecondsFormat;
use log::{error, info};
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Instant;

pub mod markdown;
pub mod pdf;

pub use pdf::PdfRenderer;

/// Rendering style. Has no effect on document content.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    #[default]
    Light,
    Dark,
}

impl Theme {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Light => "light",
            Self::Dark => "dark",
        }
    }
}

impl FromStr for Theme {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "light" => Ok(Self::Light),
            "dark" => Ok(Self::Dark),
            other => Err(format!("unsupported theme `{other}`; expected light|dark")),
        }
    }
}

/// Caller-facing export configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportOptions {
    /// Document heading override; defaults to the note title.
    pub title: Option<String>,
    /// Render the note's `updatedAt` under the heading.
    pub include_timestamp: bool,
    pub theme: Theme,
}

/// Options forwarded to the rendering backend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RenderOptions {
    pub theme: Theme,
}

/// Document unit handed to the renderer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentSource {
    pub title: String,
    /// Markdown: heading, optional timestamp line, then the raw note body.
    pub body: String,
}

/// Document rendering backend.
pub trait DocumentRenderer {
    /// Renders `body` (markdown) into document bytes.
    fn render(&self, title: &str, body: &str, options: &RenderOptions) -> Result<Vec<u8>, RenderError>;

    /// Extension of produced artifacts, without the dot.
    fn file_extension(&self) -> &'static str {
        "pdf"
    }
}

/// Failure reported by a rendering backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderError {
    /// Backend produced no bytes.
    EmptyOutput,
    /// Backend-specific failure.
    Backend(String),
}

impl Display for RenderError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyOutput => write!(f, "renderer produced an empty document"),
            Self::Backend(message) => write!(f, "{message}"),
        }
    }
}

impl Error for RenderError {}

/// Export failure.
#[derive(Debug)]
pub enum ExportError {
    /// Note lacks a field the document needs (`id`, `title`).
    MissingField(&'static str),
    /// Note is not in the current collection snapshot.
    NoteNotFound(NoteId),
    Render(RenderError),
    /// Renderer panicked; payload summary attached.
    RendererPanicked(String),
    /// Artifact could not be written.
    Io { path: PathBuf, source: std::io::Error },
}

impl ExportError {
    fn code(&self) -> &'static str {
        match self {
            Self::MissingField(_) => "missing_field",
            Self::NoteNotFound(_) => "note_not_found",
            Self::Render(_) => "render_failed",
            Self::RendererPanicked(_) => "renderer_panicked",
            Self::Io { .. } => "io",
        }
    }
}

impl Display for ExportError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingField(field) => write!(f, "note cannot be exported: missing {field}"),
            Self::NoteNotFound(id) => write!(f, "note {id} is not in the current list"),
            Self::Render(err) => write!(f, "document rendering failed: {err}"),
            Self::RendererPanicked(payload) => write!(f, "document renderer crashed: {payload}"),
            Self::Io { path, source } => {
                write!(f, "failed to write `{}`: {source}", path.display())
            }
        }
    }
}

impl Error for ExportError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Render(err) => Some(err),
            Self::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<RenderError> for ExportError {
    fn from(value: RenderError) -> Self {
        Self::Render(value)
    }
}

/// Rendered document plus its download name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportArtifact {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

impl ExportArtifact {
    /// Writes the artifact into `dir` and returns its path.
    ///
    /// Bytes go to a hidden `.part` file first and are renamed into place,
    /// so a failed write never leaves a truncated artifact under the final
    /// name.
    pub fn write_to_dir(&self, dir: impl AsRef<Path>) -> Result<PathBuf, ExportError> {
        let dir = dir.as_ref();
        let target = dir.join(&self.file_name);
        let partial = dir.join(format!(".{}.part", self.file_name));
        std::fs::create_dir_all(dir).map_err(io_error(dir))?;
        std::fs::write(&partial, &self.bytes).map_err(io_error(&partial))?;
        if let Err(source) = std::fs::rename(&partial, &target) {
            let _ = std::fs::remove_file(&partial);
            return Err(ExportError::Io {
                path: target,
                source,
            });
        }
        Ok(target)
    }
}

/// Lowercases `title` and replaces every char outside `[a-z0-9]` with `-`.
///
/// Runs of disallowed chars are not merged: `"My Note! #1"` becomes
/// `"my-note---1"`.
pub fn slugify(title: &str) -> String {
    title
        .chars()
        .flat_map(char::to_lowercase)
        .map(|ch| {
            if ch.is_ascii_lowercase() || ch.is_ascii_digit() {
                ch
            } else {
                '-'
            }
        })
        .collect()
}

/// Artifact name without extension: `note-{id}-{slug}`.
pub fn export_file_stem(note: &NoteRecord) -> String {
    format!("note-{}-{}", note.id, slugify(&note.title))
}

/// Builds the document source for `note`.
///
/// # Errors
/// - `ExportError::MissingField` when the note has no valid id or a blank
///   title.
pub fn synthesize_document(
    note: &NoteRecord,
    options: &ExportOptions,
) -> Result<DocumentSource, ExportError> {
    if !note.id.is_valid() {
        return Err(ExportError::MissingField("id"));
    }
    if note.title.trim().is_empty() {
        return Err(ExportError::MissingField("title"));
    }

    let title = options
        .title
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| note.title.trim());
    let heading = title.replace(['\n', '\r'], " ");

    let mut body = format!("# {heading}\n\n");
    if options.include_timestamp {
        body.push_str(&format!(
            "_Last updated: {}_\n\n",
            note.updated_at.to_rfc3339_opts(SecondsFormat::Secs, true)
        ));
    }
    body.push_str(&note.content);

    Ok(DocumentSource {
        title: heading,
        body,
    })
}

/// Export pipeline over a rendering backend.
pub struct ExportPipeline<R: DocumentRenderer = PdfRenderer> {
    renderer: R,
}

impl Default for ExportPipeline<PdfRenderer> {
    fn default() -> Self {
        Self::new(PdfRenderer)
    }
}

impl<R: DocumentRenderer> ExportPipeline<R> {
    pub fn new(renderer: R) -> Self {
        Self { renderer }
    }

    /// Renders `note` into a named artifact.
    ///
    /// # Errors
    /// - `ExportError::MissingField` for notes without id or title.
    /// - `ExportError::Render` / `RendererPanicked` for backend failures.
    pub fn export(
        &self,
        note: &NoteRecord,
        options: &ExportOptions,
    ) -> Result<ExportArtifact, ExportError> {
        let started_at = Instant::now();
        info!(
            "event=export module=export status=start note_id={} theme={} include_timestamp={}",
            note.id,
            options.theme.as_str(),
            options.include_timestamp
        );

        match self.render_artifact(note, options) {
            Ok(artifact) => {
                info!(
                    "event=export module=export status=ok note_id={} bytes={} duration_ms={}",
                    note.id,
                    artifact.bytes.len(),
                    started_at.elapsed().as_millis()
                );
                Ok(artifact)
            }
            Err(err) => {
                error!(
                    "event=export module=export status=error note_id={} duration_ms={} error_code={}",
                    note.id,
                    started_at.elapsed().as_millis(),
                    err.code()
                );
                Err(err)
            }
        }
    }

    fn render_artifact(
        &self,
        note: &NoteRecord,
        options: &ExportOptions,
    ) -> Result<ExportArtifact, ExportError> {
        let source = synthesize_document(note, options)?;
        let render_options = RenderOptions {
            theme: options.theme,
        };
        let rendered = catch_unwind(AssertUnwindSafe(|| {
            self.renderer
                .render(&source.title, &source.body, &render_options)
        }))
        .map_err(|payload| ExportError::RendererPanicked(panic_message(payload.as_ref())))??;

        if rendered.is_empty() {
            return Err(ExportError::Render(RenderError::EmptyOutput));
        }
        Ok(ExportArtifact {
            file_name: format!(
                "{}.{}",
                export_file_stem(note),
                self.renderer.file_extension()
            ),
            bytes: rendered,
        })
    }
}

/// Exports `note` with the built-in PDF renderer.
pub fn export(note: &NoteRecord, options: &ExportOptions) -> Result<ExportArtifact, ExportError> {
    ExportPipeline::<PdfRenderer>::default().export(note, options)
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> ExportError {
    let path = path.to_path_buf();
    move |source| ExportError::Io { path, source }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
