//! Participant channel protocol
//!
//! What the coordinator sends to a participant daemon (logical engine,
//! physical engine, or device driver) and what it expects back. Each
//! participant serves these requests on its registered unix socket using
//! the shared frame format from [`crate::wire`].

use serde::{Deserialize, Serialize};

use crate::types::{ConfigId, ControllerKind, OperType, SessionId};

/// Roles a participant process can register under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProcKind {
    Logical,
    Physical,
    Driver,
}

/// One step of the commit/audit protocol, typed by operation code.
///
/// Built per phase, sent, then discarded; never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseMessage {
    pub oper: OperType,
    pub session_id: SessionId,
    pub config_id: ConfigId,
    pub payload: PhasePayload,
}

/// Operation-specific payload of a phase message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PhasePayload {
    None,
    /// Save-version counter accompanying a startup-config save.
    Save { version: u64 },
    /// Commit-version counter accompanying a commit transaction.
    Commit { version: u64 },
    /// Transaction end, flagged when the transaction was abandoned and the
    /// participant must roll back what earlier phases staged.
    TransEnd { aborted: bool },
    /// Controller being audited.
    Audit { controller: ControllerKind },
    /// Current configuration-session holder; zero means released.
    NotifyConfigId { config_id: ConfigId },
    /// New autosave flag value.
    Autosave { enabled: bool },
}

/// Participant verdict on a single phase.
///
/// This four-value taxonomy is the complete failure surface a dispatcher
/// ever sees from a phase send.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PhaseResult {
    Success,
    /// Recoverable or logical failure.
    Failure,
    /// The participant explicitly vetoed the phase.
    Abort,
    /// Unrecoverable, including an unreachable channel.
    Fatal,
}

/// Controller-level result a driver may attach to a vote or global ack.
///
/// Consumed only to decide success/failure, never interpreted further.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CtrlResult {
    pub controller_id: String,
    pub error_count: u32,
    pub affected_keys: Vec<String>,
}

/// Acknowledgment of one phase message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseAck {
    pub result: PhaseResult,
    pub ctrl_result: Option<CtrlResult>,
}

impl PhaseAck {
    pub fn success() -> Self {
        Self {
            result: PhaseResult::Success,
            ctrl_result: None,
        }
    }
}

/// Answer to an introspection request, used by channel discovery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Introspection {
    pub role: ProcKind,
    /// Present iff `role` is `Driver`.
    pub controller: Option<ControllerKind>,
}

/// Requests the coordinator issues on a participant channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ParticipantRequest {
    Phase(PhaseMessage),
    Introspect,
}

/// Responses a participant writes back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ParticipantResponse {
    Ack(PhaseAck),
    Identity(Introspection),
}
