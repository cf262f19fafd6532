use tokio::time::{Duration, Instant};

use crate::api::Note;
use crate::editing::DebounceTimer;

/// Quiet period after the last keystroke before the list is refiltered.
pub const SEARCH_QUIET_PERIOD: Duration = Duration::from_millis(500);

/// Notes whose title contains `query`, ignoring case, in list order.
pub fn filter_by_title<'a>(notes: &'a [Note], query: &str) -> Vec<&'a Note> {
    let needle = query.to_lowercase();
    notes.iter().filter(|note| title_matches(note, &needle)).collect()
}

fn title_matches(note: &Note, needle: &str) -> bool {
    note.title.to_lowercase().contains(needle)
}

/// Debounced title filter over an already loaded list of notes.
#[derive(Debug, Clone)]
pub struct SearchFilter {
    notes: Vec<Note>,
    query: String,
    applied: String,
    matches: Vec<usize>,
    timer: DebounceTimer,
}

impl SearchFilter {
    pub fn new(notes: Vec<Note>) -> Self {
        Self {
            notes,
            query: String::new(),
            applied: String::new(),
            matches: Vec::new(),
            timer: DebounceTimer::new(SEARCH_QUIET_PERIOD),
        }
    }

    pub fn applied_query(&self) -> &str {
        &self.applied
    }

    pub fn set_query(&mut self, query: impl Into<String>, now: Instant) {
        self.query = query.into();
        self.timer.cancel();
        self.timer.arm(now);
    }

    /// Applies the typed query once the quiet period has passed. Returns
    /// whether the visible list was recomputed.
    pub fn poll(&mut self, now: Instant) -> bool {
        if !self.timer.fire_if_due(now) {
            return false;
        }
        self.apply();
        true
    }

    pub fn apply_now(&mut self) {
        self.timer.cancel();
        self.apply();
    }

    pub fn visible(&self) -> Vec<&Note> {
        if self.applied.is_empty() {
            return self.notes.iter().collect();
        }
        self.matches.iter().map(|&idx| &self.notes[idx]).collect()
    }

    pub fn summary(&self) -> String {
        if self.applied.is_empty() {
            return format!("You have {} notes", self.notes.len());
        }
        let found = self.matches.len();
        format!("{found} {} found", if found == 1 { "note" } else { "notes" })
    }

    fn apply(&mut self) {
        self.applied = self.query.clone();
        self.refilter();
        tracing::debug!(query = %self.applied, matches = self.matches.len(), "search applied");
    }

    fn refilter(&mut self) {
        let needle = self.applied.to_lowercase();
        self.matches = self
            .notes
            .iter()
            .enumerate()
            .filter(|(_, note)| title_matches(note, &needle))
            .map(|(idx, _)| idx)
            .collect();
    }
}
