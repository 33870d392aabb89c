//! Status-query operations
//!
//! Reads the version counter and CONFIRMED/UPDATING flag of one ledger
//! entry. Queries take no exclusion token; the ledger's own mutex is the
//! only synchronization they need.

use async_trait::async_trait;

use crate::coordinator::dispatch::Operation;
use crate::coordinator::lock::LockResult;
use crate::coordinator::phase::PhaseStep;
use crate::coordinator::session::Session;
use crate::coordinator::Coordinator;
use crate::types::{ConfigState, ConfigTarget, OperCode, OperStatus};

pub struct ReadStatusOp {
    code: OperCode,
    version: u64,
    state: ConfigState,
}

impl ReadStatusOp {
    pub fn new(code: OperCode) -> Self {
        Self {
            code,
            version: 0,
            state: ConfigState::Confirmed,
        }
    }

    fn target(&self) -> ConfigTarget {
        match self.code {
            OperCode::ReadStartupStatus => ConfigTarget::Startup,
            _ => ConfigTarget::Running,
        }
    }
}

#[async_trait]
impl Operation for ReadStatusOp {
    fn code(&self) -> OperCode {
        self.code
    }

    fn min_arg_count(&self) -> usize {
        2
    }

    fn validate_oper_type(&mut self, _session: &mut Session) -> OperStatus {
        match self.code {
            OperCode::ReadRunningStatus | OperCode::ReadStartupStatus => OperStatus::Success,
            _ => OperStatus::InvalidInput,
        }
    }

    fn validate_params(&mut self, _coordinator: &Coordinator, session: &Session) -> OperStatus {
        match session.u32_arg(1) {
            Some(0) => OperStatus::InvalidSessionId,
            Some(_) => OperStatus::Success,
            None => OperStatus::InvalidInput,
        }
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
        Ok(Vec::new())
    }

    async fn execute(
        &mut self,
        coordinator: &Coordinator,
        _session: &Session,
        _steps: Vec<PhaseStep>,
    ) -> OperStatus {
        let (version, state) = coordinator.ledger().get_status(self.target());
        self.version = version;
        self.state = state;
        OperStatus::Success
    }

    fn send_additional_response(
        &mut self,
        _coordinator: &Coordinator,
        session: &mut Session,
        status: OperStatus,
    ) {
        if status.is_success() {
            session.add_output(self.version);
            session.add_output(u8::from(self.state == ConfigState::Updating));
        }
    }
}
