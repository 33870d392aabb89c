//! Operation dispatcher
//!
//! Drives every inbound operation through the same strict state sequence:
//! input validation, exclusion acquisition, message-list construction,
//! execution, exclusion release, response emission. A failure at any state
//! short-circuits to response emission; exclusion, once acquired, is
//! released on every exit path without exception.

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::types::{OperCode, OperStatus};

use super::lock::{handle_lock_ret, LockResult};
use super::phase::{handle_msg_ret, PhaseStep};
use super::session::Session;
use super::Coordinator;

/// One operation family's behaviors, selected per request from the
/// dispatch table in [`super::ops`]. One instance serves one request.
#[async_trait]
pub trait Operation: Send {
    /// The operation code this instance was built for.
    fn code(&self) -> OperCode;

    /// Positional arguments the transport must have decoded before
    /// dispatch proceeds. Checked before anything else; a short list is
    /// rejected before any lock is touched.
    fn min_arg_count(&self) -> usize;

    /// Reject codes outside this family's legal range; may widen the
    /// session's phase timeout for long-running operations.
    fn validate_oper_type(&mut self, session: &mut Session) -> OperStatus;

    /// Family-specific argument decoding and sanity checks.
    fn validate_params(&mut self, coordinator: &Coordinator, session: &Session) -> OperStatus;

    /// Acquire the lock tokens this operation needs.
    fn get_exclusion(&mut self, coordinator: &Coordinator, session: &Session) -> LockResult;

    /// Release whatever `get_exclusion` acquired. Called on every exit
    /// path once acquisition succeeded.
    fn release_exclusion(&mut self, coordinator: &Coordinator, session: &Session) -> LockResult;

    /// Produce the ordered phase-message list to execute.
    fn create_msg_list(
        &mut self,
        coordinator: &Coordinator,
        session: &Session,
    ) -> Result<Vec<PhaseStep>, OperStatus>;

    /// Send the queued phase messages in list order, stopping at the first
    /// non-success result. The default walks the list against the current
    /// channel snapshot; transaction families override to wrap the walk in
    /// ledger windows and recovery-table bookkeeping.
    async fn execute(
        &mut self,
        coordinator: &Coordinator,
        session: &Session,
        steps: Vec<PhaseStep>,
    ) -> OperStatus {
        run_phase_steps(coordinator, session, &steps).await
    }

    /// Write operation-specific output onto the response. Runs after the
    /// overall status is determined; must not mutate protocol state.
    fn send_additional_response(
        &mut self,
        coordinator: &Coordinator,
        session: &mut Session,
        status: OperStatus,
    ) {
        let _ = (coordinator, session, status);
    }
}

/// Walk the steps in order, resolving each target against the snapshot
/// taken at call time and stopping at the first non-success verdict.
pub(crate) async fn run_phase_steps(
    coordinator: &Coordinator,
    session: &Session,
    steps: &[PhaseStep],
) -> OperStatus {
    let snapshot = coordinator.directory().snapshot();

    for step in steps {
        let targets = match snapshot.resolve(step.target) {
            Some(targets) => targets,
            None => {
                warn!(oper = ?step.message.oper, to = ?step.target, "phase target not in channel map");
                return OperStatus::SystemFailure;
            }
        };

        for (daemon, channel) in targets {
            let result = coordinator
                .messenger()
                .send(&channel, &step.message, session.timeout())
                .await;
            coordinator.metrics().phases_sent.inc();

            if result != crate::participant::PhaseResult::Success {
                debug!(%daemon, oper = ?step.message.oper, ?result, "phase returned non-success");
                return handle_msg_ret(result);
            }
        }
    }

    OperStatus::Success
}

/// Run one operation through the dispatcher states and return its final
/// status. The caller emits the response.
pub async fn dispatch(
    operation: &mut dyn Operation,
    coordinator: &Coordinator,
    session: &mut Session,
) -> OperStatus {
    coordinator.metrics().ops_total.inc();
    let code = operation.code();

    let status = run_states(operation, coordinator, session).await;

    if status.is_success() {
        debug!(?code, "operation complete");
    } else {
        coordinator.metrics().ops_failed.inc();
        if status == OperStatus::SystemBusy {
            coordinator.metrics().busy_rejections.inc();
        }
        debug!(?code, %status, "operation revoked");
    }
    status
}

async fn run_states(
    operation: &mut dyn Operation,
    coordinator: &Coordinator,
    session: &mut Session,
) -> OperStatus {
    if session.arg_count() < operation.min_arg_count() {
        return OperStatus::InvalidInput;
    }

    let status = operation.validate_oper_type(session);
    if !status.is_success() {
        return status;
    }

    let status = operation.validate_params(coordinator, session);
    if !status.is_success() {
        return status;
    }

    let lock_ret = operation.get_exclusion(coordinator, session);
    if lock_ret != LockResult::Acquired {
        return handle_lock_ret(lock_ret);
    }

    let mut status = match operation.create_msg_list(coordinator, session) {
        Ok(steps) => operation.execute(coordinator, session, steps).await,
        Err(status) => status,
    };

    let release_ret = operation.release_exclusion(coordinator, session);
    if release_ret != LockResult::Released {
        warn!(code = ?operation.code(), ?release_ret, "exclusion release failed");
        if status.is_success() {
            status = handle_lock_ret(release_ret);
        }
    }

    operation.send_additional_response(coordinator, session, status);
    status
}
