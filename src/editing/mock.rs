use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use time::macros::datetime;
use tokio::time::{sleep, Duration};

use crate::api::{ApiError, Note, NoteStore, UpdateNote};

pub(crate) fn sample_note() -> Note {
    Note {
        id: "n1".into(),
        title: "A".into(),
        body: "<p>x</p>".into(),
        privacy: true,
        created_at: datetime!(2024-03-01 10:00 UTC),
        updated_at: datetime!(2024-03-01 10:00 UTC),
    }
}

/// In-memory store that records every update it receives.
pub(crate) struct MockNoteStore {
    note: Mutex<Note>,
    updates: Mutex<Vec<UpdateNote>>,
    load_error: Mutex<Option<ApiError>>,
    fail_updates: AtomicBool,
    latency: Mutex<Duration>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl MockNoteStore {
    pub(crate) fn new(note: Note) -> Self {
        Self {
            note: Mutex::new(note),
            updates: Mutex::new(Vec::new()),
            load_error: Mutex::new(None),
            fail_updates: AtomicBool::new(false),
            latency: Mutex::new(Duration::ZERO),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    pub(crate) fn fail_loads_with(&self, err: ApiError) {
        *self.load_error.lock() = Some(err);
    }

    pub(crate) fn fail_updates(&self, fail: bool) {
        self.fail_updates.store(fail, Ordering::SeqCst);
    }

    pub(crate) fn set_latency(&self, latency: Duration) {
        *self.latency.lock() = latency;
    }

    pub(crate) fn updates(&self) -> Vec<UpdateNote> {
        self.updates.lock().clone()
    }

    pub(crate) fn update_count(&self) -> usize {
        self.updates.lock().len()
    }

    pub(crate) fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl NoteStore for MockNoteStore {
    async fn get_my_note(&self, id: &str) -> Result<Note, ApiError> {
        if let Some(err) = self.load_error.lock().take() {
            return Err(err);
        }
        let note = self.note.lock().clone();
        if note.id == id {
            Ok(note)
        } else {
            Err(ApiError::NotFound)
        }
    }

    async fn update_note(&self, _id: &str, update: &UpdateNote) -> Result<Note, ApiError> {
        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(running, Ordering::SeqCst);
        let latency = *self.latency.lock();
        if !latency.is_zero() {
            sleep(latency).await;
        }
        self.updates.lock().push(update.clone());
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.fail_updates.load(Ordering::SeqCst) {
            return Err(ApiError::Status {
                status: 500,
                message: "boom".into(),
            });
        }
        let mut note = self.note.lock();
        note.title = update.title.clone();
        note.body = update.body.clone();
        note.privacy = update.privacy;
        Ok(note.clone())
    }

    async fn delete_note(&self, _id: &str, _password: &str) -> Result<(), ApiError> {
        Ok(())
    }
}
