//! Configuration-session acquire and release
//!
//! Grants one client exclusive candidate-configuration access and tears
//! that grant down again. Both operations notify the engines of the
//! current holder through a NOTIFY_CONFIGID phase; zero means released.

use async_trait::async_trait;

use crate::coordinator::dispatch::{run_phase_steps, Operation};
use crate::coordinator::lock::{LockName, LockResult};
use crate::coordinator::phase::{PhaseStep, PhaseTarget};
use crate::coordinator::session::Session;
use crate::coordinator::Coordinator;
use crate::participant::{PhaseMessage, PhasePayload};
use crate::types::{ConfigId, OperCode, OperStatus, OperType, SessionId};

pub struct ConfigSessionOp {
    code: OperCode,
    session_id: SessionId,
    /// Config id presented by a release, or granted by an acquire.
    config_id: ConfigId,
    /// Whether the acquire found the grant already held by this session.
    reacquired: bool,
    exec_status: OperStatus,
}

impl ConfigSessionOp {
    pub fn new(code: OperCode) -> Self {
        Self {
            code,
            session_id: 0,
            config_id: 0,
            reacquired: false,
            exec_status: OperStatus::OperFailure,
        }
    }

    fn notify_step(&self, config_id: ConfigId) -> PhaseStep {
        PhaseStep {
            message: PhaseMessage {
                oper: OperType::NotifyConfigId,
                session_id: self.session_id,
                config_id,
                payload: PhasePayload::NotifyConfigId { config_id },
            },
            target: PhaseTarget::Engines,
        }
    }
}

#[async_trait]
impl Operation for ConfigSessionOp {
    fn code(&self) -> OperCode {
        self.code
    }

    fn min_arg_count(&self) -> usize {
        match self.code {
            OperCode::ConfigRelease => 3,
            _ => 2,
        }
    }

    fn validate_oper_type(&mut self, _session: &mut Session) -> OperStatus {
        match self.code {
            OperCode::ConfigAcquire | OperCode::ConfigRelease => OperStatus::Success,
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

        if self.code == OperCode::ConfigRelease {
            let Some(config_id) = session.u32_arg(2) else {
                return OperStatus::InvalidInput;
            };
            // Prove ownership against the current grant before mutating.
            match coordinator.locks().config_owner() {
                None => return OperStatus::ConfigNotPresent,
                Some((owner, _)) if owner != session_id => {
                    return OperStatus::InvalidSessionId;
                }
                Some((_, current)) if current != config_id => {
                    return OperStatus::InvalidConfigId;
                }
                Some(_) => {}
            }
            self.config_id = config_id;
        }
        OperStatus::Success
    }

    fn get_exclusion(&mut self, coordinator: &Coordinator, _session: &Session) -> LockResult {
        let locks = coordinator.locks();
        match self.code {
            OperCode::ConfigAcquire => {
                let ret = locks.get_lock(self.session_id, LockName::ConfigAcquire, false);
                if ret != LockResult::Acquired {
                    return ret;
                }
                self.reacquired = matches!(
                    locks.config_owner(),
                    Some((owner, _)) if owner == self.session_id
                );
                match locks.acquire_config_session(self.session_id) {
                    Ok(config_id) => {
                        self.config_id = config_id;
                        LockResult::Acquired
                    }
                    Err(ret) => {
                        locks.release_lock(self.session_id, 0, LockName::ConfigAcquire, false);
                        ret
                    }
                }
            }
            _ => locks.get_lock(self.session_id, LockName::ConfigRelease, false),
        }
    }

    fn release_exclusion(&mut self, coordinator: &Coordinator, _session: &Session) -> LockResult {
        let locks = coordinator.locks();
        match self.code {
            OperCode::ConfigAcquire => {
                locks.release_lock(self.session_id, 0, LockName::ConfigAcquire, false);
                // A fresh grant whose notify failed is rolled back so no
                // orphan holder survives the failure; a re-acquired grant
                // stays with its session.
                if !self.exec_status.is_success() && !self.reacquired {
                    locks.release_config_session(self.session_id, self.config_id);
                }
                LockResult::Released
            }
            _ => {
                locks.release_lock(self.session_id, 0, LockName::ConfigRelease, false);
                if self.exec_status.is_success() {
                    locks.release_config_session(self.session_id, self.config_id)
                } else {
                    LockResult::Released
                }
            }
        }
    }

    fn create_msg_list(
        &mut self,
        _coordinator: &Coordinator,
        _session: &Session,
    ) -> Result<Vec<PhaseStep>, OperStatus> {
        let announced = match self.code {
            OperCode::ConfigAcquire => self.config_id,
            _ => 0,
        };
        Ok(vec![self.notify_step(announced)])
    }

    async fn execute(
        &mut self,
        coordinator: &Coordinator,
        session: &Session,
        steps: Vec<PhaseStep>,
    ) -> OperStatus {
        let status = run_phase_steps(coordinator, session, &steps).await;
        self.exec_status = status;
        status
    }

    fn send_additional_response(
        &mut self,
        _coordinator: &Coordinator,
        session: &mut Session,
        status: OperStatus,
    ) {
        if status.is_success() && self.code == OperCode::ConfigAcquire {
            session.add_output(self.config_id);
        }
    }
}
