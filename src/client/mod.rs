//! Client module
//!
//! Typed client-side API over the daemon's IPC protocol: one function per
//! coordinator operation, each building the positional argument list and
//! decoding the positional outputs. CLI commands call these.

pub mod connection;

pub use connection::CoordinatorClient;

use std::path::PathBuf;

use thiserror::Error;

use crate::daemon::protocol::{DaemonStatus, Request, Response};
use crate::types::{ArgValue, ConfigId, ConfigTarget, ControllerKind, OperCode, OperStatus, SessionId};

/// Errors that can occur when talking to the daemon
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Daemon is not running. Start it with: fabricd daemon start")]
    DaemonNotRunning,

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Request failed: {0}")]
    RequestFailed(String),

    #[error("Unexpected response from daemon")]
    UnexpectedResponse,

    #[error("Operation rejected: {0}")]
    Rejected(OperStatus),

    #[error("Daemon error: {0}")]
    DaemonError(String),
}

/// Where to reach the daemon; `None` means the default socket path.
pub type SocketPath = Option<PathBuf>;

async fn connect(socket: &SocketPath) -> Result<CoordinatorClient, ClientError> {
    match socket {
        Some(path) => CoordinatorClient::connect_to(path.clone()).await,
        None => CoordinatorClient::connect().await,
    }
}

/// Run one operation and return its outputs on success.
async fn operate(
    socket: &SocketPath,
    code: OperCode,
    mut rest: Vec<ArgValue>,
    session_id: SessionId,
) -> Result<Vec<ArgValue>, ClientError> {
    let mut args = vec![ArgValue::U32(code.as_u32()), ArgValue::U32(session_id)];
    args.append(&mut rest);

    let mut client = connect(socket).await?;
    match client.send(Request::Operate { args }).await? {
        Response::Operate { status, outputs } => {
            if status.is_success() {
                Ok(outputs)
            } else {
                Err(ClientError::Rejected(status))
            }
        }
        Response::Error { message } => Err(ClientError::DaemonError(message)),
        _ => Err(ClientError::UnexpectedResponse),
    }
}

/// Acquire the exclusive configuration session; returns the config id.
pub async fn acquire_config(
    socket: &SocketPath,
    session_id: SessionId,
) -> Result<ConfigId, ClientError> {
    let outputs = operate(socket, OperCode::ConfigAcquire, Vec::new(), session_id).await?;
    match outputs.first() {
        Some(ArgValue::U32(config_id)) => Ok(*config_id),
        _ => Err(ClientError::UnexpectedResponse),
    }
}

/// Release the configuration session.
pub async fn release_config(
    socket: &SocketPath,
    session_id: SessionId,
    config_id: ConfigId,
) -> Result<(), ClientError> {
    operate(
        socket,
        OperCode::ConfigRelease,
        vec![ArgValue::U32(config_id)],
        session_id,
    )
    .await
    .map(|_| ())
}

/// Save the running configuration into the startup configuration.
pub async fn save_running(socket: &SocketPath, session_id: SessionId) -> Result<(), ClientError> {
    operate(socket, OperCode::RunningSave, Vec::new(), session_id)
        .await
        .map(|_| ())
}

/// Clear the startup configuration.
pub async fn clear_startup(socket: &SocketPath, session_id: SessionId) -> Result<(), ClientError> {
    operate(socket, OperCode::ClearStartup, Vec::new(), session_id)
        .await
        .map(|_| ())
}

/// Read the autosave flag.
pub async fn autosave_get(socket: &SocketPath, session_id: SessionId) -> Result<bool, ClientError> {
    let outputs = operate(socket, OperCode::AutosaveGet, Vec::new(), session_id).await?;
    match outputs.first() {
        Some(ArgValue::U8(flag)) => Ok(*flag != 0),
        _ => Err(ClientError::UnexpectedResponse),
    }
}

/// Toggle the autosave flag.
pub async fn autosave_set(
    socket: &SocketPath,
    session_id: SessionId,
    enabled: bool,
) -> Result<(), ClientError> {
    let code = if enabled {
        OperCode::AutosaveEnable
    } else {
        OperCode::AutosaveDisable
    };
    operate(socket, code, Vec::new(), session_id)
        .await
        .map(|_| ())
}

/// Read `(version, updating)` for one configuration.
pub async fn read_status(
    socket: &SocketPath,
    session_id: SessionId,
    target: ConfigTarget,
) -> Result<(u64, bool), ClientError> {
    let code = match target {
        ConfigTarget::Running => OperCode::ReadRunningStatus,
        ConfigTarget::Startup => OperCode::ReadStartupStatus,
    };
    let outputs = operate(socket, code, Vec::new(), session_id).await?;
    match (outputs.first(), outputs.get(1)) {
        (Some(ArgValue::U64(version)), Some(ArgValue::U8(updating))) => {
            Ok((*version, *updating != 0))
        }
        _ => Err(ClientError::UnexpectedResponse),
    }
}

/// Drive a commit transaction through its phases.
pub async fn commit(
    socket: &SocketPath,
    session_id: SessionId,
    config_id: ConfigId,
) -> Result<(), ClientError> {
    operate(
        socket,
        OperCode::CommitTrans,
        vec![ArgValue::U32(config_id)],
        session_id,
    )
    .await
    .map(|_| ())
}

/// Drive an audit of one controller through its phases.
pub async fn audit(
    socket: &SocketPath,
    session_id: SessionId,
    controller: ControllerKind,
) -> Result<(), ClientError> {
    operate(
        socket,
        OperCode::AuditTrans,
        vec![ArgValue::Str(controller.as_str().to_string())],
        session_id,
    )
    .await
    .map(|_| ())
}

/// Cancel the audit in flight, if any.
pub async fn audit_cancel(socket: &SocketPath, session_id: SessionId) -> Result<(), ClientError> {
    operate(socket, OperCode::AuditCancel, Vec::new(), session_id)
        .await
        .map(|_| ())
}

/// Ping the daemon.
pub async fn ping(socket: &SocketPath) -> Result<bool, ClientError> {
    let mut client = connect(socket).await?;
    let response = client.send(Request::Ping).await?;
    Ok(matches!(response, Response::Pong))
}

/// Get daemon status.
pub async fn status(socket: &SocketPath) -> Result<DaemonStatus, ClientError> {
    let mut client = connect(socket).await?;
    match client.send(Request::Status).await? {
        Response::Status(status) => Ok(status),
        Response::Error { message } => Err(ClientError::DaemonError(message)),
        _ => Err(ClientError::UnexpectedResponse),
    }
}

/// Rebuild the participant channel map; returns the driver count.
pub async fn rediscover(socket: &SocketPath) -> Result<usize, ClientError> {
    let mut client = connect(socket).await?;
    match client.send(Request::Rediscover).await? {
        Response::Rediscovered { drivers } => Ok(drivers),
        Response::Error { message } => Err(ClientError::DaemonError(message)),
        _ => Err(ClientError::UnexpectedResponse),
    }
}

/// Request daemon shutdown.
pub async fn shutdown(socket: &SocketPath) -> Result<(), ClientError> {
    let mut client = connect(socket).await?;
    match client.send(Request::Shutdown).await? {
        Response::Ok => Ok(()),
        Response::Error { message } => Err(ClientError::DaemonError(message)),
        _ => Err(ClientError::UnexpectedResponse),
    }
}
