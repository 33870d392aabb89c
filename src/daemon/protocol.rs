//! Client IPC protocol
//!
//! Request/response types for the coordinator's client socket, carried as
//! length-prefixed bincode frames. Operation requests hold positional
//! typed arguments: index 0 is the operation code, index 1 the session id,
//! and the rest are operation-specific.

use serde::{Deserialize, Serialize};

pub use crate::wire::{decode_message, encode_message, MAX_MESSAGE_SIZE};

use crate::daemon::metrics::MetricsSnapshot;
use crate::types::{ArgValue, ConfigId, OperStatus, SessionId};

/// Requests sent from client to daemon.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Request {
    /// Run one coordinator operation.
    Operate { args: Vec<ArgValue> },

    /// Check if the daemon is responsive.
    Ping,

    /// Get daemon status.
    Status,

    /// Rebuild the participant channel map.
    Rediscover,

    /// Graceful shutdown.
    Shutdown,
}

/// Current daemon status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonStatus {
    pub uptime_seconds: u64,
    pub shutting_down: bool,
    /// Current configuration-session holder, if any.
    pub config_owner: Option<(SessionId, ConfigId)>,
    /// Drivers in the published channel map.
    pub driver_count: usize,
    pub metrics: MetricsSnapshot,
}

/// Responses sent from daemon to client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Response {
    /// Outcome of an operation plus its positional outputs.
    Operate {
        status: OperStatus,
        outputs: Vec<ArgValue>,
    },

    Pong,

    Status(DaemonStatus),

    /// Discovery pass completed with this many drivers.
    Rediscovered { drivers: usize },

    /// Request-level failure (decode error, discovery failure).
    Error { message: String },

    /// Acknowledged.
    Ok,
}

impl Response {
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn operate_request_round_trip() {
        let req = Request::Operate {
            args: vec![ArgValue::U32(10), ArgValue::U32(3), ArgValue::U32(7)],
        };

        let encoded = encode_message(&req).unwrap();
        assert!(encoded.len() > 4);

        let decoded: Request = decode_message(&encoded[4..]).unwrap();
        match decoded {
            Request::Operate { args } => {
                assert_eq!(args.len(), 3);
                assert_eq!(args[0], ArgValue::U32(10));
            }
            _ => panic!("wrong request type"),
        }
    }

    #[test]
    fn response_round_trip() {
        let resp = Response::Operate {
            status: OperStatus::SystemBusy,
            outputs: Vec::new(),
        };
        let encoded = encode_message(&resp).unwrap();
        let decoded: Response = decode_message(&encoded[4..]).unwrap();
        assert!(matches!(
            decoded,
            Response::Operate {
                status: OperStatus::SystemBusy,
                ..
            }
        ));
    }
}
