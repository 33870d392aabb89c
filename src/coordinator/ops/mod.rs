//! Operation families
//!
//! One module per family; `operation_for` is the single dispatch table
//! mapping an operation code to the family that serves it.

pub mod audit;
pub mod autosave;
pub mod commit;
pub mod config_session;
pub mod db_config;
pub mod read_status;

use crate::types::OperCode;

use super::dispatch::Operation;

/// Select the operation implementation for a request's operation code.
pub fn operation_for(code: OperCode) -> Box<dyn Operation> {
    match code {
        OperCode::ConfigAcquire | OperCode::ConfigRelease => {
            Box::new(config_session::ConfigSessionOp::new(code))
        }
        OperCode::RunningSave | OperCode::ClearStartup => {
            Box::new(db_config::DbConfigOp::new(code))
        }
        OperCode::AutosaveGet | OperCode::AutosaveEnable | OperCode::AutosaveDisable => {
            Box::new(autosave::AutosaveOp::new(code))
        }
        OperCode::ReadRunningStatus | OperCode::ReadStartupStatus => {
            Box::new(read_status::ReadStatusOp::new(code))
        }
        OperCode::CommitTrans => Box::new(commit::CommitOp::new()),
        OperCode::AuditTrans => Box::new(audit::AuditOp::new()),
        OperCode::AuditCancel => Box::new(audit::AuditCancelOp::new()),
    }
}
