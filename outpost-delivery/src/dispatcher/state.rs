use std::time::SystemTime;

use tokio::time::Instant;

/// What the change-driven loop should do with a change notification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeAction {
    /// Nothing changed (e.g. an access-time-only update)
    Ignore,
    /// Start a cooldown window and run a cycle now
    Process,
    /// A cooldown is running; the change was counted for its expiry
    Defer,
}

/// Bookkeeping for the change-driven policy
///
/// Only ever touched from the dispatcher's own task, so it needs no locking.
#[derive(Debug, Clone, Default)]
pub struct DispatchState {
    pub last_cycle: Option<Instant>,
    pub cooldown_active: bool,
    pub pending_change_count: u64,
    pub last_observed_mtime: Option<SystemTime>,
}

impl DispatchState {
    #[must_use]
    pub fn observing(mtime: Option<SystemTime>) -> Self {
        Self {
            last_observed_mtime: mtime,
            ..Self::default()
        }
    }

    /// Record a change notification carrying the directory's mtime
    ///
    /// An unreadable mtime (`None`) always counts as a change.
    pub fn on_change(&mut self, mtime: Option<SystemTime>) -> ChangeAction {
        if mtime.is_some() && mtime == self.last_observed_mtime {
            return ChangeAction::Ignore;
        }
        self.last_observed_mtime = mtime;

        if self.cooldown_active {
            self.pending_change_count += 1;
            ChangeAction::Defer
        } else {
            self.cooldown_active = true;
            ChangeAction::Process
        }
    }

    /// Record the end of a cooldown window
    ///
    /// Returns `true` if changes arrived during the window, in which case a
    /// new window has been started and a cycle should run now.
    pub fn on_cooldown_expired(&mut self) -> bool {
        if self.pending_change_count > 0 {
            self.pending_change_count = 0;
            self.cooldown_active = true;
            true
        } else {
            self.cooldown_active = false;
            false
        }
    }
}
