//! Status ledger
//!
//! Process-wide version counters and two-valued status for the running and
//! startup configurations. One mutex guards both entries; readers only ever
//! wait out the critical section, never a write operation in progress.

use parking_lot::Mutex;

use crate::types::{ConfigState, ConfigTarget};

#[derive(Debug, Clone, Copy)]
struct Entry {
    version: u64,
    state: ConfigState,
}

impl Entry {
    fn new(version: u64) -> Self {
        Self {
            version,
            state: ConfigState::Confirmed,
        }
    }
}

struct Inner {
    running: Entry,
    startup: Entry,
}

/// Versioned CONFIRMED/UPDATING record for both configurations.
///
/// The UPDATING window is opened immediately before a write operation's
/// phase messages and closed immediately after they complete, whether or
/// not they succeeded: status records "write attempt completed", not
/// "write succeeded", so a reader never observes a permanently-stuck
/// UPDATING flag.
pub struct StatusLedger {
    inner: Mutex<Inner>,
}

impl StatusLedger {
    /// Seed the ledger, normally from the persisted recovery table.
    pub fn new(running_version: u64, startup_version: u64) -> Self {
        Self {
            inner: Mutex::new(Inner {
                running: Entry::new(running_version),
                startup: Entry::new(startup_version),
            }),
        }
    }

    /// Open the UPDATING window for `target`.
    pub fn set_status(&self, target: ConfigTarget) {
        let mut inner = self.inner.lock();
        entry_mut(&mut inner, target).state = ConfigState::Updating;
    }

    /// Close the UPDATING window and advance the version by exactly one.
    pub fn set_status_incr(&self, target: ConfigTarget) {
        let mut inner = self.inner.lock();
        let entry = entry_mut(&mut inner, target);
        entry.state = ConfigState::Confirmed;
        entry.version += 1;
    }

    /// Current `(version, state)` for `target`.
    pub fn get_status(&self, target: ConfigTarget) -> (u64, ConfigState) {
        let inner = self.inner.lock();
        let entry = match target {
            ConfigTarget::Running => inner.running,
            ConfigTarget::Startup => inner.startup,
        };
        (entry.version, entry.state)
    }
}

fn entry_mut(inner: &mut Inner, target: ConfigTarget) -> &mut Entry {
    match target {
        ConfigTarget::Running => &mut inner.running,
        ConfigTarget::Startup => &mut inner.startup,
    }
}
