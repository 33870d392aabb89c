//! Audit transaction and its cancellation
//!
//! Reconciles one controller's reported state with the engines' local
//! state. The protocol mirrors a commit but is read-oriented: it never
//! touches the status ledger or the recovery table. A distinct cancel
//! operation stops an audit between phases; the phase already in flight
//! is not recalled.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::coordinator::dispatch::{run_phase_steps, Operation};
use crate::coordinator::lock::{LockName, LockResult};
use crate::coordinator::phase::{handle_msg_ret, PhaseStep, PhaseTarget};
use crate::coordinator::session::Session;
use crate::coordinator::Coordinator;
use crate::participant::{PhaseMessage, PhasePayload, PhaseResult};
use crate::types::{ControllerKind, OperCode, OperStatus, OperType, SessionId};

pub struct AuditOp {
    session_id: SessionId,
    controller: Option<ControllerKind>,
}

impl AuditOp {
    pub fn new() -> Self {
        Self {
            session_id: 0,
            controller: None,
        }
    }

    fn step(&self, controller: ControllerKind, oper: OperType, target: PhaseTarget) -> PhaseStep {
        PhaseStep {
            message: PhaseMessage {
                oper,
                session_id: self.session_id,
                config_id: 0,
                payload: PhasePayload::Audit { controller },
            },
            target,
        }
    }

    async fn run_audit_phases(
        &self,
        coordinator: &Coordinator,
        session: &Session,
        steps: &[PhaseStep],
        cancel: &AtomicBool,
    ) -> OperStatus {
        let snapshot = coordinator.directory().snapshot();

        for step in steps {
            // Cooperative cancellation: stop issuing phases, leave the
            // one already answered alone.
            if cancel.load(Ordering::SeqCst) {
                info!(controller = ?self.controller, "audit canceled before {:?}", step.message.oper);
                return OperStatus::Canceled;
            }

            let Some(targets) = snapshot.resolve(step.target) else {
                return OperStatus::SystemFailure;
            };
            for (daemon, channel) in targets {
                let result = coordinator
                    .messenger()
                    .send(&channel, &step.message, session.timeout())
                    .await;
                coordinator.metrics().phases_sent.inc();

                if result != PhaseResult::Success {
                    warn!(%daemon, oper = ?step.message.oper, ?result, "audit phase failed");
                    return handle_msg_ret(result);
                }
            }
        }
        OperStatus::Success
    }
}

impl Default for AuditOp {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Operation for AuditOp {
    fn code(&self) -> OperCode {
        OperCode::AuditTrans
    }

    fn min_arg_count(&self) -> usize {
        3
    }

    fn validate_oper_type(&mut self, session: &mut Session) -> OperStatus {
        // Walking a whole controller's state has no useful deadline.
        session.set_infinite_timeout();
        OperStatus::Success
    }

    fn validate_params(&mut self, coordinator: &Coordinator, session: &Session) -> OperStatus {
        let Some(session_id) = session.u32_arg(1) else {
            return OperStatus::InvalidInput;
        };
        if session_id == 0 {
            return OperStatus::InvalidSessionId;
        }
        let Some(controller) = session.str_arg(2).and_then(|s| s.parse().ok()) else {
            return OperStatus::InvalidInput;
        };

        if !coordinator.directory().snapshot().has_driver(controller) {
            warn!(%controller, "audit requested for unattached controller");
            return OperStatus::OperFailure;
        }

        self.session_id = session_id;
        self.controller = Some(controller);
        OperStatus::Success
    }

    fn get_exclusion(&mut self, coordinator: &Coordinator, _session: &Session) -> LockResult {
        coordinator
            .locks()
            .get_lock(self.session_id, LockName::WriteSession, true)
    }

    fn release_exclusion(&mut self, coordinator: &Coordinator, _session: &Session) -> LockResult {
        coordinator
            .locks()
            .release_lock(self.session_id, 0, LockName::WriteSession, true)
    }

    fn create_msg_list(
        &mut self,
        _coordinator: &Coordinator,
        _session: &Session,
    ) -> Result<Vec<PhaseStep>, OperStatus> {
        let Some(controller) = self.controller else {
            return Err(OperStatus::OperFailure);
        };
        let driver = PhaseTarget::Driver(controller);
        Ok(vec![
            self.step(controller, OperType::AuditStart, driver),
            self.step(controller, OperType::AuditTransStart, PhaseTarget::Engines),
            self.step(controller, OperType::AuditVote, PhaseTarget::Engines),
            self.step(controller, OperType::AuditDriverVote, driver),
            self.step(controller, OperType::AuditGlobal, PhaseTarget::Engines),
            self.step(controller, OperType::AuditDriverGlobal, driver),
            self.step(controller, OperType::AuditTransEnd, PhaseTarget::Engines),
            self.step(controller, OperType::AuditEnd, driver),
        ])
    }

    async fn execute(
        &mut self,
        coordinator: &Coordinator,
        session: &Session,
        steps: Vec<PhaseStep>,
    ) -> OperStatus {
        let cancel = coordinator.begin_audit();
        let status = self
            .run_audit_phases(coordinator, session, &steps, &cancel)
            .await;
        coordinator.end_audit();
        status
    }
}

/// Cancels the audit in flight, if any, and tells every participant to
/// stand down. Takes no lock: the audit itself holds the write token.
pub struct AuditCancelOp {
    session_id: SessionId,
}

impl AuditCancelOp {
    pub fn new() -> Self {
        Self { session_id: 0 }
    }
}

impl Default for AuditCancelOp {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Operation for AuditCancelOp {
    fn code(&self) -> OperCode {
        OperCode::AuditCancel
    }

    fn min_arg_count(&self) -> usize {
        2
    }

    fn validate_oper_type(&mut self, _session: &mut Session) -> OperStatus {
        OperStatus::Success
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

    fn get_exclusion(&mut self, _coordinator: &Coordinator, _session: &Session) -> LockResult {
        LockResult::Acquired
    }

    fn release_exclusion(&mut self, _coordinator: &Coordinator, _session: &Session) -> LockResult {
        LockResult::Released
    }

    fn create_msg_list(
        &mut self,
        _coordinator: &Coordinator,
        _session: &Session,
    ) -> Result<Vec<PhaseStep>, OperStatus> {
        Ok(vec![PhaseStep {
            message: PhaseMessage {
                oper: OperType::AuditCancel,
                session_id: self.session_id,
                config_id: 0,
                payload: PhasePayload::None,
            },
            target: PhaseTarget::All,
        }])
    }

    async fn execute(
        &mut self,
        coordinator: &Coordinator,
        session: &Session,
        steps: Vec<PhaseStep>,
    ) -> OperStatus {
        // Advisory, like the write-release wake: nothing in flight is a
        // quiet success, not an error.
        if !coordinator.cancel_audit() {
            return OperStatus::Success;
        }
        run_phase_steps(coordinator, session, &steps).await
    }
}
