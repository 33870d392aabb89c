//! Session lock arbitration
//!
//! Grants and releases the coordinator's three kinds of exclusion tokens:
//! the configuration-session grant, the single system-wide write-operation
//! token, and ad-hoc named locks. Callers never block on contention; a
//! BUSY result tells them to retry later.

use std::collections::HashMap;

use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::types::{ConfigId, OperStatus, SessionId};

/// Named lock resources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LockName {
    ConfigSession,
    WriteSession,
    AutosaveGet,
    AutosaveEnable,
    AutosaveDisable,
    SaveStartupConfig,
    ClearStartupConfig,
    ConfigAcquire,
    ConfigRelease,
}

/// Outcome of a lock table call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockResult {
    Acquired,
    Released,
    /// Held by another session; retry later.
    Busy,
    /// The daemon lifecycle forbids the acquisition (shutdown in progress).
    InvalidState,
    InvalidSessionId,
    InvalidConfigId,
    /// Nothing to release.
    NotPresent,
}

/// Map a lock result onto the coordinator-level status.
///
/// Every lock failure converges here; no partial state is left behind on
/// any of these paths.
pub fn handle_lock_ret(ret: LockResult) -> OperStatus {
    match ret {
        LockResult::Acquired | LockResult::Released => OperStatus::Success,
        LockResult::Busy => OperStatus::SystemBusy,
        LockResult::InvalidState => OperStatus::InvalidState,
        LockResult::InvalidSessionId => OperStatus::InvalidSessionId,
        LockResult::InvalidConfigId => OperStatus::InvalidConfigId,
        LockResult::NotPresent => OperStatus::ConfigNotPresent,
    }
}

#[derive(Default)]
struct Inner {
    /// Currently held named locks and their owners.
    held: HashMap<LockName, SessionId>,
    /// The single write-class token; at most one HELD system-wide.
    write_owner: Option<(LockName, SessionId)>,
    /// Current configuration-session grant.
    config_owner: Option<(SessionId, ConfigId)>,
    next_config_id: ConfigId,
    shutting_down: bool,
}

/// Process-wide lock table.
///
/// One coarse mutex guards the whole table; critical sections only mutate
/// the maps, never perform I/O.
pub struct LockTable {
    inner: Mutex<Inner>,
    write_released: Notify,
}

impl Default for LockTable {
    fn default() -> Self {
        Self::new()
    }
}

impl LockTable {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                next_config_id: 1,
                ..Inner::default()
            }),
            write_released: Notify::new(),
        }
    }

    /// Acquire the named lock for `session`.
    ///
    /// Write-class names are grouped: while any write-class token is held,
    /// every other write-class acquisition observes BUSY regardless of name.
    pub fn get_lock(&self, session: SessionId, name: LockName, write_class: bool) -> LockResult {
        let mut inner = self.inner.lock();

        if write_class && inner.shutting_down {
            return LockResult::InvalidState;
        }
        if write_class && inner.write_owner.is_some() {
            return LockResult::Busy;
        }
        if inner.held.contains_key(&name) {
            return LockResult::Busy;
        }

        inner.held.insert(name, session);
        if write_class {
            inner.write_owner = Some((name, session));
        }
        LockResult::Acquired
    }

    /// Release the named lock.
    ///
    /// Only the holder may release; for write-class releases a nonzero
    /// `config_id` must match the current configuration-session grant.
    /// Releasing a write-class token fires an advisory wake for waiting
    /// candidate operations; finding no waiter is not an error.
    pub fn release_lock(
        &self,
        session: SessionId,
        config_id: ConfigId,
        name: LockName,
        write_class: bool,
    ) -> LockResult {
        let mut inner = self.inner.lock();

        match inner.held.get(&name) {
            None => return LockResult::NotPresent,
            Some(&owner) if owner != session => return LockResult::InvalidSessionId,
            Some(_) => {}
        }

        if write_class && config_id != 0 {
            match inner.config_owner {
                Some((_, current)) if current == config_id => {}
                _ => return LockResult::InvalidConfigId,
            }
        }

        inner.held.remove(&name);
        if matches!(inner.write_owner, Some((n, _)) if n == name) {
            inner.write_owner = None;
            drop(inner);
            self.write_released.notify_waiters();
            return LockResult::Released;
        }
        LockResult::Released
    }

    /// Grant the exclusive configuration session to `session`.
    ///
    /// Re-acquire by the current holder is idempotent and returns the
    /// existing config id.
    pub fn acquire_config_session(&self, session: SessionId) -> Result<ConfigId, LockResult> {
        let mut inner = self.inner.lock();

        if inner.shutting_down {
            return Err(LockResult::InvalidState);
        }
        if let Some((owner, config_id)) = inner.config_owner {
            if owner == session {
                return Ok(config_id);
            }
            return Err(LockResult::Busy);
        }

        let config_id = inner.next_config_id;
        inner.next_config_id = inner.next_config_id.wrapping_add(1).max(1);
        inner.config_owner = Some((session, config_id));
        inner.held.insert(LockName::ConfigSession, session);
        Ok(config_id)
    }

    /// Release the configuration session.
    ///
    /// Rejected while a write-class token is held: a transaction is still
    /// using the grant.
    pub fn release_config_session(&self, session: SessionId, config_id: ConfigId) -> LockResult {
        let mut inner = self.inner.lock();

        let (owner, current) = match inner.config_owner {
            None => return LockResult::NotPresent,
            Some(pair) => pair,
        };
        if owner != session {
            return LockResult::InvalidSessionId;
        }
        if current != config_id {
            return LockResult::InvalidConfigId;
        }
        if inner.write_owner.is_some() {
            return LockResult::Busy;
        }

        inner.config_owner = None;
        inner.held.remove(&LockName::ConfigSession);
        LockResult::Released
    }

    /// Snapshot of the current configuration-session grant.
    pub fn config_owner(&self) -> Option<(SessionId, ConfigId)> {
        self.inner.lock().config_owner
    }

    /// Completes the next time a write-class token is released.
    pub async fn wait_write_released(&self) {
        self.write_released.notified().await;
    }

    pub fn set_shutting_down(&self) {
        self.inner.lock().shutting_down = true;
    }

    pub fn is_shutting_down(&self) -> bool {
        self.inner.lock().shutting_down
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exclusive_per_name() {
        let table = LockTable::new();

        assert_eq!(
            table.get_lock(1, LockName::AutosaveGet, false),
            LockResult::Acquired
        );
        assert_eq!(
            table.get_lock(2, LockName::AutosaveGet, false),
            LockResult::Busy
        );

        assert_eq!(
            table.release_lock(1, 0, LockName::AutosaveGet, false),
            LockResult::Released
        );
        assert_eq!(
            table.get_lock(2, LockName::AutosaveGet, false),
            LockResult::Acquired
        );
    }

    #[test]
    fn write_class_grouping_excludes_across_names() {
        let table = LockTable::new();

        assert_eq!(
            table.get_lock(1, LockName::WriteSession, true),
            LockResult::Acquired
        );
        // A different write-class name still contends on the write token.
        assert_eq!(
            table.get_lock(2, LockName::SaveStartupConfig, true),
            LockResult::Busy
        );

        assert_eq!(
            table.release_lock(1, 0, LockName::WriteSession, true),
            LockResult::Released
        );
        assert_eq!(
            table.get_lock(2, LockName::SaveStartupConfig, true),
            LockResult::Acquired
        );
    }

    #[test]
    fn release_by_non_holder_rejected() {
        let table = LockTable::new();

        table.get_lock(1, LockName::SaveStartupConfig, true);
        assert_eq!(
            table.release_lock(2, 0, LockName::SaveStartupConfig, true),
            LockResult::InvalidSessionId
        );
        assert_eq!(
            table.release_lock(1, 0, LockName::ClearStartupConfig, true),
            LockResult::NotPresent
        );
    }

    #[test]
    fn config_session_binding() {
        let table = LockTable::new();

        let config_id = table.acquire_config_session(7).unwrap();
        assert_eq!(table.config_owner(), Some((7, config_id)));

        // Idempotent re-acquire by the holder.
        assert_eq!(table.acquire_config_session(7).unwrap(), config_id);
        // Another session contends.
        assert_eq!(table.acquire_config_session(8), Err(LockResult::Busy));

        // Stale config id rejected even from the holder.
        assert_eq!(
            table.release_config_session(7, config_id + 1),
            LockResult::InvalidConfigId
        );
        assert_eq!(
            table.release_config_session(8, config_id),
            LockResult::InvalidSessionId
        );
        assert_eq!(
            table.release_config_session(7, config_id),
            LockResult::Released
        );
        assert_eq!(table.release_config_session(7, config_id), LockResult::NotPresent);
    }

    #[test]
    fn config_release_blocked_while_write_in_progress() {
        let table = LockTable::new();

        let config_id = table.acquire_config_session(3).unwrap();
        table.get_lock(3, LockName::WriteSession, true);

        assert_eq!(
            table.release_config_session(3, config_id),
            LockResult::Busy
        );

        table.release_lock(3, config_id, LockName::WriteSession, true);
        assert_eq!(
            table.release_config_session(3, config_id),
            LockResult::Released
        );
    }

    #[test]
    fn write_release_validates_config_id() {
        let table = LockTable::new();

        let config_id = table.acquire_config_session(5).unwrap();
        table.get_lock(5, LockName::WriteSession, true);

        assert_eq!(
            table.release_lock(5, config_id + 9, LockName::WriteSession, true),
            LockResult::InvalidConfigId
        );
        assert_eq!(
            table.release_lock(5, config_id, LockName::WriteSession, true),
            LockResult::Released
        );
    }

    #[test]
    fn shutdown_blocks_write_acquisition() {
        let table = LockTable::new();

        table.set_shutting_down();
        assert_eq!(
            table.get_lock(1, LockName::WriteSession, true),
            LockResult::InvalidState
        );
        // Non-write locks still work during shutdown.
        assert_eq!(
            table.get_lock(1, LockName::AutosaveGet, false),
            LockResult::Acquired
        );
    }

    #[tokio::test]
    async fn write_release_wakes_waiter() {
        use std::sync::Arc;

        let table = Arc::new(LockTable::new());
        table.get_lock(1, LockName::WriteSession, true);

        let waiter = {
            let table = table.clone();
            tokio::spawn(async move {
                table.wait_write_released().await;
            })
        };

        // Give the waiter time to park before releasing.
        tokio::task::yield_now().await;
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;

        table.release_lock(1, 0, LockName::WriteSession, true);
        tokio::time::timeout(std::time::Duration::from_secs(1), waiter)
            .await
            .expect("waiter should be woken")
            .unwrap();
    }

    #[test]
    fn lock_ret_mapping_is_total() {
        assert_eq!(handle_lock_ret(LockResult::Acquired), OperStatus::Success);
        assert_eq!(handle_lock_ret(LockResult::Busy), OperStatus::SystemBusy);
        assert_eq!(
            handle_lock_ret(LockResult::InvalidState),
            OperStatus::InvalidState
        );
        assert_eq!(
            handle_lock_ret(LockResult::InvalidSessionId),
            OperStatus::InvalidSessionId
        );
        assert_eq!(
            handle_lock_ret(LockResult::InvalidConfigId),
            OperStatus::InvalidConfigId
        );
        assert_eq!(
            handle_lock_ret(LockResult::NotPresent),
            OperStatus::ConfigNotPresent
        );
    }
}
