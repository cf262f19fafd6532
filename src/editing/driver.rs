use std::future::{self, Future};
use std::pin::Pin;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;

use super::session::{EditSession, SaveOutcome, SaveRequest, SaveStatus};
use super::timer::sleep_until_armed;
use crate::api::{ApiError, Note, NoteStore};

type PendingSave = Pin<Box<dyn Future<Output = (SaveRequest, Result<Note, ApiError>)> + Send>>;

#[derive(Debug, Error)]
#[error("editor is no longer running")]
pub struct EditorClosed;

enum EditorCommand {
    SetTitle(String),
    SetBody(String),
    SetPrivacy(bool),
    SaveNow(oneshot::Sender<SaveOutcome>),
    Close {
        flush: bool,
        reply: oneshot::Sender<EditSession>,
    },
}

/// Handle to an edit session running on its own task.
///
/// Edits are applied in order, autosave fires after the quiet period, and
/// at most one update request is outstanding at a time. Dropping the handle
/// (or calling [`EditorHandle::abort`]) cancels any pending autosave without
/// flushing it.
pub struct EditorHandle {
    commands: mpsc::UnboundedSender<EditorCommand>,
    status: watch::Receiver<SaveStatus>,
    task: JoinHandle<()>,
}

pub fn spawn_editor(session: EditSession) -> EditorHandle {
    let (commands, rx) = mpsc::unbounded_channel();
    let status = session.subscribe();
    let task = tokio::spawn(run(session, rx));
    EditorHandle {
        commands,
        status,
        task,
    }
}

impl EditorHandle {
    pub fn set_title(&self, title: impl Into<String>) -> Result<(), EditorClosed> {
        self.send(EditorCommand::SetTitle(title.into()))
    }

    pub fn set_body(&self, body: impl Into<String>) -> Result<(), EditorClosed> {
        self.send(EditorCommand::SetBody(body.into()))
    }

    pub fn set_privacy(&self, privacy: bool) -> Result<(), EditorClosed> {
        self.send(EditorCommand::SetPrivacy(privacy))
    }

    pub fn status(&self) -> watch::Receiver<SaveStatus> {
        self.status.clone()
    }

    /// Skips the quiet period and saves the draft once any running save settles.
    pub async fn save_now(&self) -> Result<SaveOutcome, EditorClosed> {
        let (reply, rx) = oneshot::channel();
        self.send(EditorCommand::SaveNow(reply))?;
        rx.await.map_err(|_| EditorClosed)
    }

    /// Stops the editor and hands back the session. With `flush` the draft is
    /// saved first if it is dirty; otherwise pending edits are dropped.
    pub async fn close(self, flush: bool) -> Result<EditSession, EditorClosed> {
        let (reply, rx) = oneshot::channel();
        self.send(EditorCommand::Close { flush, reply })?;
        let session = rx.await.map_err(|_| EditorClosed)?;
        if let Err(err) = self.task.await {
            tracing::debug!(?err, "editor task did not exit cleanly");
        }
        Ok(session)
    }

    pub fn abort(self) {
        drop(self.commands);
    }

    fn send(&self, command: EditorCommand) -> Result<(), EditorClosed> {
        self.commands.send(command).map_err(|_| EditorClosed)
    }
}

fn persist(store: Arc<dyn NoteStore>, request: SaveRequest) -> PendingSave {
    Box::pin(async move {
        let result = store.update_note(&request.id, &request.payload).await;
        (request, result)
    })
}

async fn settle(pending: &mut Option<PendingSave>) -> (SaveRequest, Result<Note, ApiError>) {
    match pending.as_mut() {
        Some(save) => save.await,
        None => future::pending().await,
    }
}

fn start_save(session: &mut EditSession, pending: &mut Option<PendingSave>) {
    if let Some(request) = session.begin_save() {
        *pending = Some(persist(session.store(), request));
    }
}

/// Waits for the running save, if any, and records its result.
async fn drain(session: &mut EditSession, pending: &mut Option<PendingSave>) {
    if let Some(save) = pending.take() {
        let (request, result) = save.await;
        session.finish_save(request, result);
    }
}

async fn run(mut session: EditSession, mut commands: mpsc::UnboundedReceiver<EditorCommand>) {
    let mut pending: Option<PendingSave> = None;
    loop {
        let deadline = session.scheduler().deadline();
        tokio::select! {
            command = commands.recv() => match command {
                Some(EditorCommand::SetTitle(title)) => session.set_title(title),
                Some(EditorCommand::SetBody(body)) => session.set_body(body),
                Some(EditorCommand::SetPrivacy(privacy)) => session.set_privacy(privacy),
                Some(EditorCommand::SaveNow(reply)) => {
                    session.cancel_autosave();
                    drain(&mut session, &mut pending).await;
                    session.take_trailing();
                    let _ = reply.send(session.flush().await);
                }
                Some(EditorCommand::Close { flush, reply }) => {
                    session.cancel_autosave();
                    drain(&mut session, &mut pending).await;
                    session.take_trailing();
                    if flush {
                        session.flush().await;
                    }
                    tracing::debug!(note_id = %session.id(), flush, "editor closed");
                    let _ = reply.send(session);
                    return;
                }
                None => {
                    session.cancel_autosave();
                    tracing::debug!(note_id = %session.id(), "editor dropped, pending edits discarded");
                    return;
                }
            },
            () = sleep_until_armed(deadline) => {
                if session.take_autosave_due() {
                    start_save(&mut session, &mut pending);
                }
            }
            (request, result) = settle(&mut pending) => {
                pending = None;
                session.finish_save(request, result);
                if session.take_trailing() {
                    start_save(&mut session, &mut pending);
                }
            }
        }
    }
}
