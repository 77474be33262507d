//! Typed HTTP client for the note REST service.
//!
//! # Responsibility
//! - Map `RemoteNoteService` calls onto `GET/POST /notes` and
//!   `PUT/DELETE /notes/{id}` with JSON bodies.
//! - Translate transport, status and decoding failures into `RemoteError`.
//!
//! # Invariants
//! - A 404 on a note-scoped request becomes `RemoteError::NotFound(id)`.
//! - Error bodies are flattened to one line and capped at
//!   `MAX_ERROR_BODY_CHARS` characters before they reach a message.
//! - Every request is bounded by the client timeout given to `new`.

use super::{RemoteError, RemoteNoteService, RemoteResult};
use crate::model::note::{NoteId, NotePayload, NoteRecord};
use async_trait::async_trait;
use log::{debug, warn};
use reqwest::{Response, StatusCode};
use serde::de::DeserializeOwned;
use std::time::Duration;

const MAX_ERROR_BODY_CHARS: usize = 200;

/// `RemoteNoteService` backed by `reqwest`.
pub struct HttpNoteService {
    base_url: String,
    client: reqwest::Client,
}

impl HttpNoteService {
    /// Creates a client rooted at `base_url` (trailing `/` is ignored).
    ///
    /// # Errors
    /// - `RemoteError::Transport` when the HTTP client cannot be built.
    pub fn new(base_url: &str, timeout: Duration) -> RemoteResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| RemoteError::Transport(format!("http client init failed: {err}")))?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn notes_url(&self) -> String {
        format!("{}/notes", self.base_url)
    }

    fn note_url(&self, id: NoteId) -> String {
        format!("{}/notes/{}", self.base_url, id)
    }
}

#[async_trait]
impl RemoteNoteService for HttpNoteService {
    async fn list_notes(&self) -> RemoteResult<Vec<NoteRecord>> {
        let resp = self
            .client
            .get(self.notes_url())
            .send()
            .await
            .map_err(transport_error)?;
        decode_json(ensure_success(resp, None).await?).await
    }

    async fn create_note(&self, payload: &NotePayload) -> RemoteResult<NoteRecord> {
        let resp = self
            .client
            .post(self.notes_url())
            .json(payload)
            .send()
            .await
            .map_err(transport_error)?;
        decode_json(ensure_success(resp, None).await?).await
    }

    async fn update_note(&self, id: NoteId, payload: &NotePayload) -> RemoteResult<NoteRecord> {
        let resp = self
            .client
            .put(self.note_url(id))
            .json(payload)
            .send()
            .await
            .map_err(transport_error)?;
        decode_json(ensure_success(resp, Some(id)).await?).await
    }

    async fn delete_note(&self, id: NoteId) -> RemoteResult<()> {
        let resp = self
            .client
            .delete(self.note_url(id))
            .send()
            .await
            .map_err(transport_error)?;
        ensure_success(resp, Some(id)).await?;
        Ok(())
    }
}

fn transport_error(err: reqwest::Error) -> RemoteError {
    warn!(
        "event=remote_call module=remote status=error error_code=transport timeout={}",
        err.is_timeout()
    );
    RemoteError::Transport(err.to_string())
}

async fn ensure_success(resp: Response, target: Option<NoteId>) -> RemoteResult<Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    if status == StatusCode::NOT_FOUND {
        if let Some(id) = target {
            return Err(RemoteError::NotFound(id));
        }
    }

    let body = resp.text().await.unwrap_or_default();
    let message = body
        .trim()
        .replace(['\n', '\r'], " ")
        .chars()
        .take(MAX_ERROR_BODY_CHARS)
        .collect::<String>();
    debug!(
        "event=remote_call module=remote status=error error_code=status http_status={}",
        status.as_u16()
    );
    Err(RemoteError::Status {
        code: status.as_u16(),
        message,
    })
}

async fn decode_json<T: DeserializeOwned>(resp: Response) -> RemoteResult<T> {
    let bytes = resp.bytes().await.map_err(transport_error)?;
    serde_json::from_slice(&bytes).map_err(|err| RemoteError::Decode(err.to_string()))
}
