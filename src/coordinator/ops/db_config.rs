//! Startup-config save and clear
//!
//! Copies the running configuration into the startup configuration, or
//! clears the startup configuration. With autosave enabled the startup
//! config tracks the running config continuously, so a manual save is a
//! no-op success and a clear is a forbidden operation.

use async_trait::async_trait;
use tracing::warn;

use crate::coordinator::dispatch::{run_phase_steps, Operation};
use crate::coordinator::lock::{LockName, LockResult};
use crate::coordinator::phase::{PhaseStep, PhaseTarget};
use crate::coordinator::session::Session;
use crate::coordinator::Coordinator;
use crate::participant::{PhaseMessage, PhasePayload};
use crate::types::{ConfigTarget, OperCode, OperStatus, OperType, SessionId};

pub struct DbConfigOp {
    code: OperCode,
    session_id: SessionId,
    /// Set when autosave turns this request into a local no-op.
    autosave_noop: bool,
    lock_name: LockName,
}

impl DbConfigOp {
    pub fn new(code: OperCode) -> Self {
        let lock_name = match code {
            OperCode::ClearStartup => LockName::ClearStartupConfig,
            _ => LockName::SaveStartupConfig,
        };
        Self {
            code,
            session_id: 0,
            autosave_noop: false,
            lock_name,
        }
    }
}

#[async_trait]
impl Operation for DbConfigOp {
    fn code(&self) -> OperCode {
        self.code
    }

    fn min_arg_count(&self) -> usize {
        2
    }

    fn validate_oper_type(&mut self, _session: &mut Session) -> OperStatus {
        match self.code {
            OperCode::RunningSave | OperCode::ClearStartup => OperStatus::Success,
            _ => OperStatus::InvalidInput,
        }
    }

    fn validate_params(&mut self, coordinator: &Coordinator, session: &Session) -> OperStatus {
        let Some(session_id) = session.u32_arg(1) else {
            return OperStatus::InvalidInput;
        };
        if session_id == 0 {
            return OperStatus::InvalidSessionId;
        }
        self.session_id = session_id;

        if coordinator.store().get_conf_table() {
            match self.code {
                // Startup already tracks running; nothing to do.
                OperCode::RunningSave => self.autosave_noop = true,
                // Clearing the tracked startup config would be undone by
                // the next autosave cycle; reject outright.
                _ => return OperStatus::Forbidden,
            }
        }
        OperStatus::Success
    }

    fn get_exclusion(&mut self, coordinator: &Coordinator, _session: &Session) -> LockResult {
        if self.autosave_noop {
            return LockResult::Acquired;
        }
        coordinator
            .locks()
            .get_lock(self.session_id, self.lock_name, true)
    }

    fn release_exclusion(&mut self, coordinator: &Coordinator, _session: &Session) -> LockResult {
        if self.autosave_noop {
            return LockResult::Released;
        }
        coordinator
            .locks()
            .release_lock(self.session_id, 0, self.lock_name, true)
    }

    fn create_msg_list(
        &mut self,
        coordinator: &Coordinator,
        _session: &Session,
    ) -> Result<Vec<PhaseStep>, OperStatus> {
        if self.autosave_noop {
            return Ok(Vec::new());
        }

        let (oper, payload) = match self.code {
            OperCode::ClearStartup => (OperType::ClearConfig, PhasePayload::None),
            _ => (
                OperType::SaveConfig,
                PhasePayload::Save {
                    version: coordinator.store().recovery_save_version() + 1,
                },
            ),
        };
        Ok(vec![PhaseStep {
            message: PhaseMessage {
                oper,
                session_id: self.session_id,
                config_id: 0,
                payload,
            },
            target: PhaseTarget::Engines,
        }])
    }

    async fn execute(
        &mut self,
        coordinator: &Coordinator,
        session: &Session,
        steps: Vec<PhaseStep>,
    ) -> OperStatus {
        if self.autosave_noop {
            return OperStatus::Success;
        }

        let store = coordinator.store();
        if store
            .update_recovery_table(ConfigTarget::Startup, self.code)
            .is_err()
        {
            return OperStatus::OperFailure;
        }
        // Persist the advanced save version before the phase goes out: a
        // crash in between skips a version but never reuses one.
        if store
            .update_recovery_save_version(store.recovery_save_version() + 1)
            .is_err()
        {
            return OperStatus::OperFailure;
        }

        coordinator.ledger().set_status(ConfigTarget::Startup);
        let status = run_phase_steps(coordinator, session, &steps).await;
        coordinator.ledger().set_status_incr(ConfigTarget::Startup);

        if let Err(e) = store.clear_recovery_table() {
            warn!(error = %e, "failed to clear recovery marker after db operation");
        }
        status
    }
}
