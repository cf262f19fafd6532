use std::sync::Arc;

use strum::{AsRefStr, Display};
use thiserror::Error;
use tokio::sync::watch;
use tokio::time::Instant;

use super::autosave::AutosaveScheduler;
use crate::api::{ApiError, Note, NoteStore, UpdateNote};

pub const SAVE_ERROR_MESSAGE: &str = "Can't save, something wrong";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Display, AsRefStr)]
pub enum SaveStatus {
    #[default]
    Idle,
    Saving,
    Saved,
    Error,
}

impl SaveStatus {
    /// Text shown next to the editor for this status.
    pub fn message(&self) -> &'static str {
        match self {
            SaveStatus::Idle => "",
            SaveStatus::Saving => "Saving",
            SaveStatus::Saved => "Saved",
            SaveStatus::Error => SAVE_ERROR_MESSAGE,
        }
    }
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("note not found")]
    NotFound,
    #[error("You do not have permission to edit this note")]
    PermissionDenied,
    #[error("could not load note: {0}")]
    Unavailable(#[source] ApiError),
}

impl From<ApiError> for LoadError {
    fn from(err: ApiError) -> Self {
        match err {
            ApiError::NotFound => LoadError::NotFound,
            ApiError::Unauthorized | ApiError::Forbidden | ApiError::MissingToken => {
                LoadError::PermissionDenied
            }
            other => LoadError::Unavailable(other),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Draft {
    pub id: String,
    pub title: String,
    pub body: String,
    pub privacy: bool,
}

impl Draft {
    fn from_note(note: &Note) -> Self {
        Self {
            id: note.id.clone(),
            title: note.title.clone(),
            body: note.body.clone(),
            privacy: note.privacy,
        }
    }

    pub fn contents(&self) -> UpdateNote {
        UpdateNote {
            title: self.title.clone(),
            body: self.body.clone(),
            privacy: self.privacy,
        }
    }
}

/// A save that has been started and must be handed back to
/// [`EditSession::finish_save`] once the store answers.
#[derive(Debug, Clone)]
pub struct SaveRequest {
    pub id: String,
    pub payload: UpdateNote,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    /// Nothing differed from the last confirmed copy.
    Clean,
    /// Another save is still running; one more will follow it.
    Deferred,
    Saved,
    Failed,
}

pub struct EditSession {
    store: Arc<dyn NoteStore>,
    draft: Draft,
    confirmed: UpdateNote,
    scheduler: AutosaveScheduler,
    status: watch::Sender<SaveStatus>,
    in_flight: bool,
    trailing: bool,
}

impl std::fmt::Debug for EditSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EditSession")
            .field("draft", &self.draft)
            .field("confirmed", &self.confirmed)
            .field("status", &*self.status.borrow())
            .field("in_flight", &self.in_flight)
            .finish()
    }
}

impl EditSession {
    pub async fn load(store: Arc<dyn NoteStore>, id: &str) -> Result<Self, LoadError> {
        match store.get_my_note(id).await {
            Ok(note) => Ok(Self::from_note(store, &note)),
            Err(err) => {
                tracing::warn!(note_id = id, ?err, "failed to load note for editing");
                Err(err.into())
            }
        }
    }

    pub fn from_note(store: Arc<dyn NoteStore>, note: &Note) -> Self {
        let (status, _) = watch::channel(SaveStatus::Idle);
        Self {
            store,
            draft: Draft::from_note(note),
            confirmed: note.contents(),
            scheduler: AutosaveScheduler::new(),
            status,
            in_flight: false,
            trailing: false,
        }
    }

    pub fn id(&self) -> &str {
        &self.draft.id
    }

    pub fn draft(&self) -> &Draft {
        &self.draft
    }

    pub fn confirmed(&self) -> &UpdateNote {
        &self.confirmed
    }

    pub fn status(&self) -> SaveStatus {
        *self.status.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<SaveStatus> {
        self.status.subscribe()
    }

    pub fn scheduler(&self) -> &AutosaveScheduler {
        &self.scheduler
    }

    pub(crate) fn store(&self) -> Arc<dyn NoteStore> {
        Arc::clone(&self.store)
    }

    pub fn set_title(&mut self, title: impl Into<String>) {
        self.draft.title = title.into();
        self.scheduler.trigger(Instant::now());
    }

    pub fn set_body(&mut self, body: impl Into<String>) {
        self.draft.body = body.into();
        self.scheduler.trigger(Instant::now());
    }

    pub fn set_privacy(&mut self, privacy: bool) {
        self.draft.privacy = privacy;
        self.scheduler.trigger(Instant::now());
    }

    pub fn is_dirty(&self) -> bool {
        let title_changed = self.draft.title != self.confirmed.title;
        let body_changed = self.draft.body != self.confirmed.body;
        let privacy_changed = self.draft.privacy != self.confirmed.privacy;
        title_changed || body_changed || privacy_changed
    }

    /// Drops the pending autosave, e.g. when the editor goes away.
    pub fn cancel_autosave(&mut self) -> bool {
        self.scheduler.cancel()
    }

    pub fn is_saving(&self) -> bool {
        self.in_flight
    }

    /// Starts a save of the current draft. Returns `None` when the draft is
    /// clean, or when a save is already running, in which case a trailing
    /// save is queued for [`EditSession::take_trailing`].
    pub fn begin_save(&mut self) -> Option<SaveRequest> {
        if !self.is_dirty() {
            return None;
        }
        if self.in_flight {
            self.trailing = true;
            return None;
        }
        self.in_flight = true;
        self.set_status(SaveStatus::Saving);
        tracing::debug!(note_id = %self.draft.id, "saving note");
        Some(SaveRequest {
            id: self.draft.id.clone(),
            payload: self.draft.contents(),
        })
    }

    pub fn finish_save(
        &mut self,
        request: SaveRequest,
        result: Result<Note, ApiError>,
    ) -> SaveOutcome {
        self.in_flight = false;
        match result {
            Ok(_) => {
                self.confirmed = request.payload;
                self.set_status(SaveStatus::Saved);
                tracing::info!(note_id = %request.id, "note saved");
                SaveOutcome::Saved
            }
            Err(err) => {
                self.set_status(SaveStatus::Error);
                tracing::warn!(note_id = %request.id, ?err, "note save failed");
                SaveOutcome::Failed
            }
        }
    }

    /// Whether a save was requested while the previous one was running.
    pub fn take_trailing(&mut self) -> bool {
        std::mem::take(&mut self.trailing)
    }

    pub async fn save(&mut self) -> SaveOutcome {
        let was_in_flight = self.in_flight;
        let Some(request) = self.begin_save() else {
            return if was_in_flight && self.trailing {
                SaveOutcome::Deferred
            } else {
                SaveOutcome::Clean
            };
        };
        let result = self.store.update_note(&request.id, &request.payload).await;
        self.finish_save(request, result)
    }

    /// Saves right away, dropping any pending autosave deadline.
    pub async fn flush(&mut self) -> SaveOutcome {
        self.cancel_autosave();
        self.save().await
    }

    /// Saves inline if the autosave deadline has passed.
    #[cfg(test)]
    pub(crate) async fn poll(&mut self) -> Option<SaveOutcome> {
        if !self.take_autosave_due() {
            return None;
        }
        Some(self.save().await)
    }

    pub(crate) fn take_autosave_due(&mut self) -> bool {
        self.scheduler.take_due(Instant::now())
    }

    fn set_status(&self, status: SaveStatus) {
        self.status.send_replace(status);
    }
}
