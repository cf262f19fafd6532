pub mod autosave;
mod driver;
pub mod session;
pub mod timer;

#[cfg(test)]
pub(crate) mod mock;

pub use autosave::{AutosaveScheduler, AUTOSAVE_QUIET_PERIOD};
pub use driver::{spawn_editor, EditorClosed, EditorHandle};
pub use session::{
    Draft, EditSession, LoadError, SaveOutcome, SaveRequest, SaveStatus, SAVE_ERROR_MESSAGE,
};
pub use timer::DebounceTimer;
