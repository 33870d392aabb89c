//! Phase messaging
//!
//! Builds nothing and retries nothing: one synchronous round trip per
//! phase message, classified into the four-value result taxonomy. Phase
//! sequencing and retry policy belong entirely to the calling operation.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::net::UnixStream;
use tracing::{debug, warn};

use crate::participant::{
    Introspection, ParticipantRequest, ParticipantResponse, PhaseMessage, PhaseResult,
};
use crate::types::{ControllerKind, OperStatus};
use crate::wire::{decode_message, encode_message, read_frame, write_frame};

use super::session::TimeoutSetting;

/// Errors from the channel transport, distinct from a participant verdict.
#[derive(Debug, Error)]
pub enum PhaseError {
    #[error("channel {channel} unreachable: {source}")]
    Unreachable {
        channel: String,
        #[source]
        source: std::io::Error,
    },

    #[error("channel {channel} protocol error: {detail}")]
    Protocol { channel: String, detail: String },

    #[error("channel {channel} timed out")]
    Timeout { channel: String },
}

/// Map a phase result onto the coordinator-level status.
pub fn handle_msg_ret(ret: PhaseResult) -> OperStatus {
    match ret {
        PhaseResult::Success => OperStatus::Success,
        PhaseResult::Abort => OperStatus::OperAbort,
        PhaseResult::Failure | PhaseResult::Fatal => OperStatus::SystemFailure,
    }
}

/// Who a phase step is addressed to, resolved against the channel snapshot
/// at execution time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseTarget {
    /// Logical engine then physical engine.
    Engines,
    /// Every attached driver.
    Drivers,
    /// One specific driver.
    Driver(ControllerKind),
    /// Engines first, then every driver.
    All,
}

/// One entry of an operation's ordered phase-message list.
#[derive(Debug, Clone)]
pub struct PhaseStep {
    pub message: PhaseMessage,
    pub target: PhaseTarget,
}

/// Sends one typed phase message to one named channel.
#[async_trait]
pub trait PhaseMessenger: Send + Sync {
    /// One round trip; transport failures classify as FATAL.
    async fn send(
        &self,
        channel: &str,
        message: &PhaseMessage,
        timeout: TimeoutSetting,
    ) -> PhaseResult;

    /// Ask a channel for its role and controller kind (discovery only).
    async fn introspect(&self, channel: &str) -> Result<Introspection, PhaseError>;
}

/// Messenger over the participants' registered unix sockets.
///
/// Channel names are paths relative to the run directory; each send opens
/// a fresh connection, which keeps the coordinator free of pooling state
/// at the cost of a connect per phase.
pub struct SocketMessenger {
    run_dir: PathBuf,
    default_timeout: Duration,
}

impl SocketMessenger {
    pub fn new(run_dir: PathBuf, default_timeout: Duration) -> Self {
        Self {
            run_dir,
            default_timeout,
        }
    }

    async fn round_trip(
        &self,
        channel: &str,
        request: &ParticipantRequest,
        timeout: TimeoutSetting,
    ) -> Result<ParticipantResponse, PhaseError> {
        let exchange = self.exchange(channel, request);
        match timeout {
            TimeoutSetting::Infinite => exchange.await,
            TimeoutSetting::Default => tokio::time::timeout(self.default_timeout, exchange)
                .await
                .map_err(|_| PhaseError::Timeout {
                    channel: channel.to_string(),
                })?,
        }
    }

    async fn exchange(
        &self,
        channel: &str,
        request: &ParticipantRequest,
    ) -> Result<ParticipantResponse, PhaseError> {
        let path = self.run_dir.join(channel);
        let unreachable = |source| PhaseError::Unreachable {
            channel: channel.to_string(),
            source,
        };

        let mut stream = UnixStream::connect(&path).await.map_err(unreachable)?;

        let frame = encode_message(request).map_err(|e| PhaseError::Protocol {
            channel: channel.to_string(),
            detail: e.to_string(),
        })?;
        write_frame(&mut stream, &frame).await.map_err(unreachable)?;

        let payload = read_frame(&mut stream)
            .await
            .map_err(unreachable)?
            .ok_or_else(|| PhaseError::Protocol {
                channel: channel.to_string(),
                detail: "connection closed before response".to_string(),
            })?;

        decode_message(&payload).map_err(|e| PhaseError::Protocol {
            channel: channel.to_string(),
            detail: e.to_string(),
        })
    }
}

#[async_trait]
impl PhaseMessenger for SocketMessenger {
    async fn send(
        &self,
        channel: &str,
        message: &PhaseMessage,
        timeout: TimeoutSetting,
    ) -> PhaseResult {
        let request = ParticipantRequest::Phase(message.clone());
        match self.round_trip(channel, &request, timeout).await {
            Ok(ParticipantResponse::Ack(ack)) => {
                debug!(%channel, oper = ?message.oper, result = ?ack.result, "phase ack");
                ack.result
            }
            Ok(ParticipantResponse::Identity(_)) => {
                warn!(%channel, oper = ?message.oper, "unexpected identity response to phase");
                PhaseResult::Fatal
            }
            Err(e) => {
                warn!(%channel, oper = ?message.oper, error = %e, "phase send failed");
                PhaseResult::Fatal
            }
        }
    }

    async fn introspect(&self, channel: &str) -> Result<Introspection, PhaseError> {
        match self
            .round_trip(channel, &ParticipantRequest::Introspect, TimeoutSetting::Default)
            .await?
        {
            ParticipantResponse::Identity(identity) => Ok(identity),
            ParticipantResponse::Ack(_) => Err(PhaseError::Protocol {
                channel: channel.to_string(),
                detail: "unexpected ack response to introspect".to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::participant::{PhaseAck, PhasePayload, ProcKind};
    use crate::types::OperType;
    use tempfile::TempDir;
    use tokio::net::UnixListener;

    fn message(oper: OperType) -> PhaseMessage {
        PhaseMessage {
            oper,
            session_id: 1,
            config_id: 0,
            payload: PhasePayload::None,
        }
    }

    /// One-shot participant answering every request with a fixed response.
    async fn serve_once(listener: UnixListener, response: ParticipantResponse) {
        let (mut stream, _) = listener.accept().await.unwrap();
        let _ = read_frame(&mut stream).await.unwrap();
        let frame = encode_message(&response).unwrap();
        write_frame(&mut stream, &frame).await.unwrap();
    }

    #[tokio::test]
    async fn send_classifies_ack() {
        let dir = TempDir::new().unwrap();
        let listener = UnixListener::bind(dir.path().join("driver.sock")).unwrap();
        tokio::spawn(serve_once(
            listener,
            ParticipantResponse::Ack(PhaseAck {
                result: PhaseResult::Abort,
                ctrl_result: None,
            }),
        ));

        let messenger =
            SocketMessenger::new(dir.path().to_path_buf(), Duration::from_secs(1));
        let result = messenger
            .send(
                "driver.sock",
                &message(OperType::CommitVote),
                TimeoutSetting::Default,
            )
            .await;
        assert_eq!(result, PhaseResult::Abort);
    }

    #[tokio::test]
    async fn unreachable_channel_is_fatal() {
        let dir = TempDir::new().unwrap();
        let messenger =
            SocketMessenger::new(dir.path().to_path_buf(), Duration::from_secs(1));

        let result = messenger
            .send(
                "missing.sock",
                &message(OperType::CommitTransStart),
                TimeoutSetting::Default,
            )
            .await;
        assert_eq!(result, PhaseResult::Fatal);
    }

    #[tokio::test]
    async fn introspect_returns_identity() {
        let dir = TempDir::new().unwrap();
        let listener = UnixListener::bind(dir.path().join("ofdrv.sock")).unwrap();
        tokio::spawn(serve_once(
            listener,
            ParticipantResponse::Identity(Introspection {
                role: ProcKind::Driver,
                controller: Some(ControllerKind::Openflow),
            }),
        ));

        let messenger =
            SocketMessenger::new(dir.path().to_path_buf(), Duration::from_secs(1));
        let identity = messenger.introspect("ofdrv.sock").await.unwrap();
        assert_eq!(identity.controller, Some(ControllerKind::Openflow));
    }

    #[test]
    fn msg_ret_mapping() {
        assert_eq!(handle_msg_ret(PhaseResult::Success), OperStatus::Success);
        assert_eq!(handle_msg_ret(PhaseResult::Abort), OperStatus::OperAbort);
        assert_eq!(handle_msg_ret(PhaseResult::Failure), OperStatus::SystemFailure);
        assert_eq!(handle_msg_ret(PhaseResult::Fatal), OperStatus::SystemFailure);
    }
}
