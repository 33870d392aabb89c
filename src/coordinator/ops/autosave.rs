//! Autosave flag operations
//!
//! Reads and toggles the autosave flag in the conf table. Toggles notify
//! the engines so they start or stop mirroring the running configuration;
//! the flag is only persisted once every participant has acknowledged.

use async_trait::async_trait;

use crate::coordinator::dispatch::{run_phase_steps, Operation};
use crate::coordinator::lock::{LockName, LockResult};
use crate::coordinator::phase::{PhaseStep, PhaseTarget};
use crate::coordinator::session::Session;
use crate::coordinator::Coordinator;
use crate::participant::{PhaseMessage, PhasePayload};
use crate::types::{OperCode, OperStatus, OperType, SessionId};

pub struct AutosaveOp {
    code: OperCode,
    session_id: SessionId,
    lock_name: LockName,
    /// Flag value read for the get response.
    flag: bool,
}

impl AutosaveOp {
    pub fn new(code: OperCode) -> Self {
        let lock_name = match code {
            OperCode::AutosaveEnable => LockName::AutosaveEnable,
            OperCode::AutosaveDisable => LockName::AutosaveDisable,
            _ => LockName::AutosaveGet,
        };
        Self {
            code,
            session_id: 0,
            lock_name,
            flag: false,
        }
    }
}

#[async_trait]
impl Operation for AutosaveOp {
    fn code(&self) -> OperCode {
        self.code
    }

    fn min_arg_count(&self) -> usize {
        // Autosave operations take no parameters beyond the session id.
        2
    }

    fn validate_oper_type(&mut self, _session: &mut Session) -> OperStatus {
        match self.code {
            OperCode::AutosaveGet | OperCode::AutosaveEnable | OperCode::AutosaveDisable => {
                OperStatus::Success
            }
            _ => OperStatus::InvalidInput,
        }
    }

    fn validate_params(&mut self, _coordinator: &Coordinator, session: &Session) -> OperStatus {
        let Some(session_id) = session.u32_arg(1) else {
            return OperStatus::InvalidInput;
        };
        if session_id == 0 {
            return OperStatus::InvalidSessionId;
        }
        self.session_id = session_id;
        OperStatus::Success
    }

    fn get_exclusion(&mut self, coordinator: &Coordinator, _session: &Session) -> LockResult {
        coordinator
            .locks()
            .get_lock(self.session_id, self.lock_name, false)
    }

    fn release_exclusion(&mut self, coordinator: &Coordinator, _session: &Session) -> LockResult {
        coordinator
            .locks()
            .release_lock(self.session_id, 0, self.lock_name, false)
    }

    fn create_msg_list(
        &mut self,
        _coordinator: &Coordinator,
        _session: &Session,
    ) -> Result<Vec<PhaseStep>, OperStatus> {
        let (oper, enabled) = match self.code {
            OperCode::AutosaveEnable => (OperType::AutosaveEnable, true),
            OperCode::AutosaveDisable => (OperType::AutosaveDisable, false),
            _ => return Ok(Vec::new()),
        };
        Ok(vec![PhaseStep {
            message: PhaseMessage {
                oper,
                session_id: self.session_id,
                config_id: 0,
                payload: PhasePayload::Autosave { enabled },
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
        if self.code == OperCode::AutosaveGet {
            self.flag = coordinator.store().get_conf_table();
            return OperStatus::Success;
        }

        let status = run_phase_steps(coordinator, session, &steps).await;
        if !status.is_success() {
            return status;
        }

        let enabled = self.code == OperCode::AutosaveEnable;
        if coordinator.store().update_conf_table(enabled).is_err() {
            return OperStatus::OperFailure;
        }
        OperStatus::Success
    }

    fn send_additional_response(
        &mut self,
        _coordinator: &Coordinator,
        session: &mut Session,
        status: OperStatus,
    ) {
        if status.is_success() && self.code == OperCode::AutosaveGet {
            session.add_output(u8::from(self.flag));
        }
    }
}
