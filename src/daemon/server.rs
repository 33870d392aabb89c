//! IPC server
//!
//! Unix domain socket server for client-daemon communication. One task per
//! connection; each connection serves any number of framed requests.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use crate::wire::{decode_message, encode_message, read_frame, write_frame};

use super::handler::RequestHandler;
use super::protocol::{Request, Response};

/// IPC server listening on a unix domain socket.
pub struct IpcServer {
    socket_path: PathBuf,
    handler: Arc<RequestHandler>,
}

impl IpcServer {
    pub fn new(socket_path: PathBuf, handler: Arc<RequestHandler>) -> Self {
        Self {
            socket_path,
            handler,
        }
    }

    /// Get the default socket path.
    pub fn default_socket_path() -> PathBuf {
        if let Ok(runtime_dir) = std::env::var("XDG_RUNTIME_DIR") {
            return PathBuf::from(runtime_dir)
                .join("fabricd")
                .join("fabricd.sock");
        }
        PathBuf::from("/tmp/fabricd.sock")
    }

    /// Run the IPC server until the shutdown channel fires.
    pub async fn run(&self, mut shutdown: broadcast::Receiver<()>) -> Result<()> {
        if let Some(parent) = self.socket_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        // Remove a socket file left behind by a previous run.
        if self.socket_path.exists() {
            std::fs::remove_file(&self.socket_path)
                .context("Failed to remove existing socket file")?;
        }

        let listener =
            UnixListener::bind(&self.socket_path).context("Failed to bind to unix socket")?;

        info!("IPC server listening on: {}", self.socket_path.display());

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&self.socket_path, std::fs::Permissions::from_mode(0o660))?;
        }

        loop {
            tokio::select! {
                accept_result = listener.accept() => {
                    match accept_result {
                        Ok((stream, _addr)) => {
                            debug!("new client connection");
                            let handler = self.handler.clone();
                            tokio::spawn(async move {
                                if let Err(e) = handle_connection(stream, handler).await {
                                    warn!("connection error: {}", e);
                                }
                            });
                        }
                        Err(e) => {
                            error!("accept error: {}", e);
                        }
                    }
                }
                _ = shutdown.recv() => {
                    info!("IPC server shutting down");
                    break;
                }
            }
        }

        if self.socket_path.exists() {
            let _ = std::fs::remove_file(&self.socket_path);
        }

        Ok(())
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }
}

/// Serve one client connection until it disconnects.
async fn handle_connection(mut stream: UnixStream, handler: Arc<RequestHandler>) -> Result<()> {
    loop {
        let payload = match read_frame(&mut stream).await? {
            Some(payload) => payload,
            None => {
                debug!("client disconnected");
                return Ok(());
            }
        };

        let response = match decode_message::<Request>(&payload) {
            Ok(request) => handler.handle(request).await,
            Err(e) => {
                error!("failed to decode request: {}", e);
                Response::error(format!("failed to decode request: {e}"))
            }
        };

        let frame = encode_message(&response)?;
        write_frame(&mut stream, &frame).await?;
    }
}
