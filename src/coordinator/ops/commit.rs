//! Commit transaction
//!
//! Drives a candidate-configuration commit through the phased protocol:
//! trans-start and vote to the engines, driver votes, global commit, and
//! trans-end. A veto during any vote phase aborts the transaction and the
//! participants roll back through the abort-flagged end phase; the
//! coordinator never reverses local state itself.

use async_trait::async_trait;
use tracing::{info, warn};

use crate::coordinator::dispatch::Operation;
use crate::coordinator::lock::{LockName, LockResult};
use crate::coordinator::phase::{handle_msg_ret, PhaseStep, PhaseTarget};
use crate::coordinator::session::Session;
use crate::coordinator::Coordinator;
use crate::participant::{PhaseMessage, PhasePayload, PhaseResult};
use crate::types::{ConfigId, ConfigTarget, OperCode, OperStatus, OperType, SessionId};

pub struct CommitOp {
    session_id: SessionId,
    config_id: ConfigId,
    version: u64,
}

impl CommitOp {
    pub fn new() -> Self {
        Self {
            session_id: 0,
            config_id: 0,
            version: 0,
        }
    }

    fn step(&self, oper: OperType, target: PhaseTarget) -> PhaseStep {
        let payload = match oper {
            OperType::CommitTransEnd => PhasePayload::TransEnd { aborted: false },
            _ => PhasePayload::Commit {
                version: self.version,
            },
        };
        PhaseStep {
            message: PhaseMessage {
                oper,
                session_id: self.session_id,
                config_id: self.config_id,
                payload,
            },
            target,
        }
    }

    /// Best-effort abort notification after a veto: every participant that
    /// saw trans-start learns the transaction is abandoned and rolls back.
    async fn send_abort_end(&self, coordinator: &Coordinator, session: &Session) {
        let snapshot = coordinator.directory().snapshot();
        let Some(targets) = snapshot.resolve(PhaseTarget::All) else {
            return;
        };
        let message = PhaseMessage {
            oper: OperType::CommitTransEnd,
            session_id: self.session_id,
            config_id: self.config_id,
            payload: PhasePayload::TransEnd { aborted: true },
        };
        for (daemon, channel) in targets {
            let result = coordinator
                .messenger()
                .send(&channel, &message, session.timeout())
                .await;
            coordinator.metrics().phases_sent.inc();
            if result != PhaseResult::Success {
                warn!(%daemon, ?result, "abort notification not acknowledged");
            }
        }
    }

    async fn run_commit_phases(
        &self,
        coordinator: &Coordinator,
        session: &Session,
        steps: &[PhaseStep],
    ) -> OperStatus {
        let snapshot = coordinator.directory().snapshot();
        let mut started = false;

        for step in steps {
            let Some(targets) = snapshot.resolve(step.target) else {
                return OperStatus::SystemFailure;
            };
            for (daemon, channel) in targets {
                let result = coordinator
                    .messenger()
                    .send(&channel, &step.message, session.timeout())
                    .await;
                coordinator.metrics().phases_sent.inc();

                match result {
                    PhaseResult::Success => {}
                    PhaseResult::Abort => {
                        info!(%daemon, oper = ?step.message.oper, "participant vetoed commit");
                        if started {
                            self.send_abort_end(coordinator, session).await;
                        }
                        return OperStatus::OperAbort;
                    }
                    other => {
                        warn!(%daemon, oper = ?step.message.oper, ?other, "commit phase failed");
                        return handle_msg_ret(other);
                    }
                }
            }
            if step.message.oper == OperType::CommitTransStart {
                started = true;
            }
        }
        OperStatus::Success
    }
}

impl Default for CommitOp {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Operation for CommitOp {
    fn code(&self) -> OperCode {
        OperCode::CommitTrans
    }

    fn min_arg_count(&self) -> usize {
        3
    }

    fn validate_oper_type(&mut self, session: &mut Session) -> OperStatus {
        // A commit may outlive the default phase deadline when a driver
        // has a large backlog to push down; run unbounded.
        session.set_infinite_timeout();
        OperStatus::Success
    }

    fn validate_params(&mut self, coordinator: &Coordinator, session: &Session) -> OperStatus {
        let (Some(session_id), Some(config_id)) = (session.u32_arg(1), session.u32_arg(2)) else {
            return OperStatus::InvalidInput;
        };
        if session_id == 0 {
            return OperStatus::InvalidSessionId;
        }

        // Only the configuration-session holder may commit, and only with
        // its current config id; a stale id is rejected even from the
        // holder itself.
        match coordinator.locks().config_owner() {
            None => return OperStatus::ConfigNotPresent,
            Some((owner, _)) if owner != session_id => return OperStatus::InvalidSessionId,
            Some((_, current)) if current != config_id => return OperStatus::InvalidConfigId,
            Some(_) => {}
        }

        self.session_id = session_id;
        self.config_id = config_id;
        OperStatus::Success
    }

    fn get_exclusion(&mut self, coordinator: &Coordinator, _session: &Session) -> LockResult {
        coordinator
            .locks()
            .get_lock(self.session_id, LockName::WriteSession, true)
    }

    fn release_exclusion(&mut self, coordinator: &Coordinator, _session: &Session) -> LockResult {
        coordinator.locks().release_lock(
            self.session_id,
            self.config_id,
            LockName::WriteSession,
            true,
        )
    }

    fn create_msg_list(
        &mut self,
        coordinator: &Coordinator,
        _session: &Session,
    ) -> Result<Vec<PhaseStep>, OperStatus> {
        self.version = coordinator.store().recovery_commit_version() + 1;
        Ok(vec![
            self.step(OperType::CommitTransStart, PhaseTarget::Engines),
            self.step(OperType::CommitVote, PhaseTarget::Engines),
            self.step(OperType::CommitDriverVote, PhaseTarget::Drivers),
            self.step(OperType::CommitGlobal, PhaseTarget::Engines),
            self.step(OperType::CommitDriverGlobal, PhaseTarget::Drivers),
            self.step(OperType::CommitTransEnd, PhaseTarget::Engines),
        ])
    }

    async fn execute(
        &mut self,
        coordinator: &Coordinator,
        session: &Session,
        steps: Vec<PhaseStep>,
    ) -> OperStatus {
        let store = coordinator.store();
        if store
            .update_recovery_table(ConfigTarget::Running, OperCode::CommitTrans)
            .is_err()
        {
            return OperStatus::OperFailure;
        }
        if store.update_recovery_commit_version(self.version).is_err() {
            let _ = store.clear_recovery_table();
            return OperStatus::OperFailure;
        }

        coordinator.ledger().set_status(ConfigTarget::Running);
        let status = self.run_commit_phases(coordinator, session, &steps).await;
        coordinator.ledger().set_status_incr(ConfigTarget::Running);

        if let Err(e) = store.clear_recovery_table() {
            warn!(error = %e, "failed to clear recovery marker after commit");
        }
        status
    }
}
