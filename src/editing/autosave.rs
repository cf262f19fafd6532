use tokio::time::{Duration, Instant};

use super::timer::DebounceTimer;

/// Quiet period after the last edit before the draft is persisted.
pub const AUTOSAVE_QUIET_PERIOD: Duration = Duration::from_millis(1000);

/// Turns a burst of edits into a single save once input pauses.
///
/// There is no maximum wait: edits arriving less than a quiet period apart
/// keep postponing the save.
#[derive(Debug, Clone)]
pub struct AutosaveScheduler {
    timer: DebounceTimer,
}

impl Default for AutosaveScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl AutosaveScheduler {
    pub fn new() -> Self {
        Self {
            timer: DebounceTimer::new(AUTOSAVE_QUIET_PERIOD),
        }
    }

    /// Drops any pending save and schedules a new one a quiet period from `now`.
    pub fn trigger(&mut self, now: Instant) {
        self.timer.cancel();
        self.timer.arm(now);
    }

    pub fn cancel(&mut self) -> bool {
        let cancelled = self.timer.cancel();
        if cancelled {
            tracing::debug!("pending autosave cancelled");
        }
        cancelled
    }

    pub fn is_pending(&self) -> bool {
        self.timer.is_armed()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.timer.deadline()
    }

    pub fn take_due(&mut self, now: Instant) -> bool {
        self.timer.fire_if_due(now)
    }
}
