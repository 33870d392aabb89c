//! Transaction coordinator core
//!
//! Owns the lock table, the status ledger, the channel directory, and the
//! conf store; every per-request operation borrows this one instance. The
//! daemon constructs exactly one coordinator at startup and hands it to
//! the request handler.

pub mod directory;
pub mod dispatch;
pub mod ledger;
pub mod lock;
pub mod ops;
pub mod phase;
pub mod session;

pub use directory::{ChannelDirectory, ChannelMap, DirectoryError, Launcher, SocketLauncher};
pub use dispatch::{dispatch, Operation};
pub use ledger::StatusLedger;
pub use lock::{handle_lock_ret, LockName, LockResult, LockTable};
pub use phase::{handle_msg_ret, PhaseMessenger, PhaseStep, PhaseTarget, SocketMessenger};
pub use session::{Session, TimeoutSetting};

use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::warn;

use crate::daemon::metrics::CoordinatorMetrics;
use crate::store::ConfStore;

/// The coordinator service: one instance per daemon process.
pub struct Coordinator {
    locks: LockTable,
    ledger: StatusLedger,
    store: ConfStore,
    directory: ChannelDirectory,
    messenger: Arc<dyn PhaseMessenger>,
    metrics: Arc<CoordinatorMetrics>,
    /// Cancel flag of the audit in flight, if any.
    audit_cancel: Mutex<Option<Arc<AtomicBool>>>,
}

impl Coordinator {
    /// Build the coordinator, seeding the status ledger from the persisted
    /// recovery table. An operation left in flight by a crash is logged and
    /// cleared; participant-side rollback happened (or will happen) through
    /// the protocol's own end phases, not here.
    pub fn new(
        store: ConfStore,
        messenger: Arc<dyn PhaseMessenger>,
        metrics: Arc<CoordinatorMetrics>,
    ) -> Self {
        if let Some(entry) = store.recovery_entry() {
            warn!(
                target_config = %entry.target,
                oper = ?entry.oper,
                "previous run left a write operation in flight; clearing marker"
            );
            if let Err(e) = store.clear_recovery_table() {
                warn!(error = %e, "failed to clear stale recovery marker");
            }
        }

        let ledger = StatusLedger::new(
            store.recovery_commit_version(),
            store.recovery_save_version(),
        );

        Self {
            locks: LockTable::new(),
            ledger,
            store,
            directory: ChannelDirectory::new(),
            messenger,
            metrics,
            audit_cancel: Mutex::new(None),
        }
    }

    pub fn locks(&self) -> &LockTable {
        &self.locks
    }

    pub fn ledger(&self) -> &StatusLedger {
        &self.ledger
    }

    pub fn store(&self) -> &ConfStore {
        &self.store
    }

    pub fn directory(&self) -> &ChannelDirectory {
        &self.directory
    }

    pub fn messenger(&self) -> &dyn PhaseMessenger {
        self.messenger.as_ref()
    }

    pub fn metrics(&self) -> &CoordinatorMetrics {
        &self.metrics
    }

    /// Enter shutdown: write-class acquisitions are refused from here on.
    pub fn set_shutting_down(&self) {
        self.locks.set_shutting_down();
    }

    /// Register the cancel flag for an audit that is about to run.
    pub fn begin_audit(&self) -> Arc<AtomicBool> {
        let flag = Arc::new(AtomicBool::new(false));
        *self.audit_cancel.lock() = Some(flag.clone());
        flag
    }

    /// Deregister the audit cancel flag after the audit terminates.
    pub fn end_audit(&self) {
        *self.audit_cancel.lock() = None;
    }

    /// Request cancellation of the audit in flight.
    ///
    /// Advisory like the write-release wake: returns whether an audit was
    /// there to cancel; finding none is not an error.
    pub fn cancel_audit(&self) -> bool {
        match self.audit_cancel.lock().as_ref() {
            Some(flag) => {
                flag.store(true, std::sync::atomic::Ordering::SeqCst);
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Shared fixtures for operation and dispatcher tests: a recording
    //! messenger with scriptable per-phase verdicts and a coordinator
    //! wired to a temp-dir store and a fake launcher.

    use super::*;
    use crate::participant::{
        Introspection, PhaseMessage, PhaseResult, ProcKind,
    };
    use crate::types::{ControllerKind, OperType};
    use async_trait::async_trait;
    use std::collections::HashMap;
    use tempfile::TempDir;

    type SendHook = Box<dyn Fn(&PhaseMessage) + Send + Sync>;

    pub(crate) struct RecordingMessenger {
        pub sent: Mutex<Vec<(String, PhaseMessage)>>,
        pub verdicts: Mutex<HashMap<OperType, PhaseResult>>,
        pub kinds: HashMap<String, ControllerKind>,
        /// Invoked after each recorded send; lets tests act mid-protocol.
        pub on_send: Mutex<Option<SendHook>>,
    }

    impl RecordingMessenger {
        pub fn new() -> Self {
            Self {
                sent: Mutex::new(Vec::new()),
                verdicts: Mutex::new(HashMap::new()),
                kinds: [
                    ("driver/of.sock".to_string(), ControllerKind::Openflow),
                    ("driver/ov.sock".to_string(), ControllerKind::Overlay),
                ]
                .into_iter()
                .collect(),
                on_send: Mutex::new(None),
            }
        }

        /// Make every send of `oper` return `result` instead of success.
        pub fn script(&self, oper: OperType, result: PhaseResult) {
            self.verdicts.lock().insert(oper, result);
        }

        pub fn sent_opers(&self) -> Vec<OperType> {
            self.sent.lock().iter().map(|(_, m)| m.oper).collect()
        }

        pub fn sent_count(&self) -> usize {
            self.sent.lock().len()
        }
    }

    #[async_trait]
    impl PhaseMessenger for RecordingMessenger {
        async fn send(
            &self,
            channel: &str,
            message: &PhaseMessage,
            _timeout: TimeoutSetting,
        ) -> PhaseResult {
            self.sent
                .lock()
                .push((channel.to_string(), message.clone()));
            if let Some(hook) = self.on_send.lock().as_ref() {
                hook(message);
            }
            self.verdicts
                .lock()
                .get(&message.oper)
                .copied()
                .unwrap_or(PhaseResult::Success)
        }

        async fn introspect(
            &self,
            channel: &str,
        ) -> Result<Introspection, phase::PhaseError> {
            Ok(Introspection {
                role: ProcKind::Driver,
                controller: self.kinds.get(channel).copied(),
            })
        }
    }

    pub(crate) struct FakeLauncher;

    #[async_trait]
    impl Launcher for FakeLauncher {
        async fn list_daemons(
            &self,
            kind: ProcKind,
        ) -> Result<Vec<String>, DirectoryError> {
            Ok(match kind {
                ProcKind::Logical => vec!["logical/lgc.sock".to_string()],
                ProcKind::Physical => vec!["physical/phy.sock".to_string()],
                ProcKind::Driver => vec![
                    "driver/of.sock".to_string(),
                    "driver/ov.sock".to_string(),
                ],
            })
        }
    }

    /// Coordinator over a temp store with two drivers discovered.
    pub(crate) async fn coordinator(dir: &TempDir) -> (Arc<Coordinator>, Arc<RecordingMessenger>) {
        let store = ConfStore::open(dir.path()).unwrap();
        let messenger = Arc::new(RecordingMessenger::new());
        let coordinator = Arc::new(Coordinator::new(
            store,
            messenger.clone(),
            CoordinatorMetrics::shared(),
        ));
        coordinator
            .directory()
            .discover(&FakeLauncher, messenger.as_ref())
            .await
            .unwrap();
        (coordinator, messenger)
    }
}
