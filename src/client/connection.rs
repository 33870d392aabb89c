//! Client connection
//!
//! Framed request/response exchange with the daemon over its unix socket.

use std::path::PathBuf;

use tokio::net::UnixStream;
use tracing::debug;

use crate::daemon::protocol::{Request, Response};
use crate::daemon::server::IpcServer;
use crate::wire::{decode_message, encode_message, read_frame, write_frame};

use super::ClientError;

/// Client connection to the daemon
pub struct CoordinatorClient {
    stream: UnixStream,
}

impl CoordinatorClient {
    /// Connect to the daemon at the default socket path.
    pub async fn connect() -> Result<Self, ClientError> {
        Self::connect_to(IpcServer::default_socket_path()).await
    }

    /// Connect to the daemon at a specific socket path.
    pub async fn connect_to(socket_path: PathBuf) -> Result<Self, ClientError> {
        debug!("connecting to daemon at: {}", socket_path.display());

        let stream = UnixStream::connect(&socket_path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound
                || e.kind() == std::io::ErrorKind::ConnectionRefused
            {
                ClientError::DaemonNotRunning
            } else {
                ClientError::ConnectionFailed(e.to_string())
            }
        })?;

        Ok(Self { stream })
    }

    /// Send a request and receive a response.
    pub async fn send(&mut self, request: Request) -> Result<Response, ClientError> {
        let encoded = encode_message(&request)
            .map_err(|e| ClientError::RequestFailed(format!("failed to encode request: {e}")))?;

        write_frame(&mut self.stream, &encoded)
            .await
            .map_err(|e| ClientError::RequestFailed(format!("failed to send request: {e}")))?;

        let payload = read_frame(&mut self.stream)
            .await
            .map_err(|e| ClientError::RequestFailed(format!("failed to read response: {e}")))?
            .ok_or_else(|| {
                ClientError::RequestFailed("daemon closed the connection".to_string())
            })?;

        decode_message(&payload)
            .map_err(|e| ClientError::RequestFailed(format!("failed to decode response: {e}")))
    }
}
