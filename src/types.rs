//! Core identity, operation, and status types shared across the coordinator.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Identifies a connected client session.
pub type SessionId = u32;

/// Identifies the currently-held configuration-session grant.
///
/// Generated when a client acquires exclusive configuration access; a value
/// of zero never names a live grant.
pub type ConfigId = u32;

/// Operation codes accepted on the coordinator's client socket.
///
/// Each code selects one operation family in the dispatch table. Codes are
/// stable wire values; additions go at the end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OperCode {
    ConfigAcquire,
    ConfigRelease,
    RunningSave,
    ClearStartup,
    AutosaveGet,
    AutosaveEnable,
    AutosaveDisable,
    ReadRunningStatus,
    ReadStartupStatus,
    CommitTrans,
    AuditTrans,
    AuditCancel,
}

impl OperCode {
    pub fn as_u32(self) -> u32 {
        match self {
            Self::ConfigAcquire => 1,
            Self::ConfigRelease => 2,
            Self::RunningSave => 3,
            Self::ClearStartup => 4,
            Self::AutosaveGet => 5,
            Self::AutosaveEnable => 6,
            Self::AutosaveDisable => 7,
            Self::ReadRunningStatus => 8,
            Self::ReadStartupStatus => 9,
            Self::CommitTrans => 10,
            Self::AuditTrans => 11,
            Self::AuditCancel => 12,
        }
    }
}

impl TryFrom<u32> for OperCode {
    type Error = u32;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        Ok(match value {
            1 => Self::ConfigAcquire,
            2 => Self::ConfigRelease,
            3 => Self::RunningSave,
            4 => Self::ClearStartup,
            5 => Self::AutosaveGet,
            6 => Self::AutosaveEnable,
            7 => Self::AutosaveDisable,
            8 => Self::ReadRunningStatus,
            9 => Self::ReadStartupStatus,
            10 => Self::CommitTrans,
            11 => Self::AuditTrans,
            12 => Self::AuditCancel,
            other => return Err(other),
        })
    }
}

/// Phase message types of the commit/audit protocol.
///
/// One value per protocol step; the phase ordering rules live with the
/// operations that build message lists, not here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OperType {
    CommitTransStart,
    CommitVote,
    CommitDriverVote,
    CommitGlobal,
    CommitDriverGlobal,
    CommitTransEnd,
    AuditStart,
    AuditTransStart,
    AuditVote,
    AuditDriverVote,
    AuditGlobal,
    AuditDriverGlobal,
    AuditTransEnd,
    AuditEnd,
    AuditCancel,
    SaveConfig,
    ClearConfig,
    NotifyConfigId,
    AutosaveEnable,
    AutosaveDisable,
}

/// Coordinator-level operation status, returned to the client unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OperStatus {
    Success,
    InvalidInput,
    InvalidSessionId,
    InvalidConfigId,
    SystemBusy,
    InvalidState,
    OperAbort,
    SystemFailure,
    Forbidden,
    ConfigNotPresent,
    OperFailure,
    Canceled,
}

impl OperStatus {
    pub fn is_success(self) -> bool {
        self == Self::Success
    }
}

impl fmt::Display for OperStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Success => "success",
            Self::InvalidInput => "invalid input",
            Self::InvalidSessionId => "invalid session id",
            Self::InvalidConfigId => "invalid config id",
            Self::SystemBusy => "system busy",
            Self::InvalidState => "invalid state",
            Self::OperAbort => "operation aborted",
            Self::SystemFailure => "system failure",
            Self::Forbidden => "forbidden operation",
            Self::ConfigNotPresent => "config not present",
            Self::OperFailure => "operation failure",
            Self::Canceled => "operation canceled",
        };
        f.write_str(s)
    }
}

/// The two configurations tracked by the status ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfigTarget {
    Running,
    Startup,
}

impl fmt::Display for ConfigTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Running => f.write_str("running"),
            Self::Startup => f.write_str("startup"),
        }
    }
}

/// Two-valued status of a configuration in the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfigState {
    Confirmed,
    Updating,
}

/// Southbound controller families a driver daemon may serve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ControllerKind {
    Openflow,
    Overlay,
    Legacy,
}

impl ControllerKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Openflow => "openflow",
            Self::Overlay => "overlay",
            Self::Legacy => "legacy",
        }
    }
}

impl fmt::Display for ControllerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ControllerKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "openflow" => Ok(Self::Openflow),
            "overlay" => Ok(Self::Overlay),
            "legacy" => Ok(Self::Legacy),
            other => Err(format!("unknown controller kind: {other}")),
        }
    }
}

/// Logical identity of a protocol participant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DaemonId {
    Logical,
    Physical,
    Driver(ControllerKind),
}

impl fmt::Display for DaemonId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Logical => f.write_str("logical"),
            Self::Physical => f.write_str("physical"),
            Self::Driver(kind) => write!(f, "driver/{kind}"),
        }
    }
}

/// Positional argument value carried in an operation request.
///
/// The transport layer decodes these before dispatch; operations read them
/// by index through the session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ArgValue {
    U8(u8),
    U32(u32),
    U64(u64),
    Str(String),
}

impl From<u8> for ArgValue {
    fn from(v: u8) -> Self {
        Self::U8(v)
    }
}

impl From<u32> for ArgValue {
    fn from(v: u32) -> Self {
        Self::U32(v)
    }
}

impl From<u64> for ArgValue {
    fn from(v: u64) -> Self {
        Self::U64(v)
    }
}

impl From<String> for ArgValue {
    fn from(v: String) -> Self {
        Self::Str(v)
    }
}

impl From<&str> for ArgValue {
    fn from(v: &str) -> Self {
        Self::Str(v.to_string())
    }
}
