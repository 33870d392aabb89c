//! Daemon lifecycle management
//!
//! Handles daemon startup, shutdown, and single-instance guarantees.

use std::fs::File;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::signal;
use tokio::sync::broadcast;
use tracing::{info, warn};

use crate::config::Config;
use crate::coordinator::{Coordinator, SocketLauncher, SocketMessenger};
use crate::store::ConfStore;

use super::handler::RequestHandler;
use super::metrics::CoordinatorMetrics;
use super::server::IpcServer;

/// PID file for single-instance guarantee
const PID_FILE_NAME: &str = "fabricd.pid";

/// Daemon instance managing all components
pub struct Daemon {
    handler: Arc<RequestHandler>,
    server: IpcServer,
    shutdown_tx: broadcast::Sender<()>,
    pid_file_path: PathBuf,
}

impl Daemon {
    /// Start the daemon: acquire the instance lock, open the conf store,
    /// run the initial discovery pass, and bind the coordinator stack.
    ///
    /// Discovery failure is fatal here: starting with a partial participant
    /// view would let transactions silently skip daemons.
    pub async fn start(config: Config) -> Result<Self> {
        info!("starting fabricd");

        std::fs::create_dir_all(&config.node.data_dir)
            .context("Failed to create data directory")?;
        let pid_file_path = config.node.data_dir.join(PID_FILE_NAME);
        Self::acquire_lock(&pid_file_path)?;

        let store = ConfStore::open(&config.node.data_dir).context("Failed to open conf store")?;

        let messenger = Arc::new(SocketMessenger::new(
            config.channels.run_dir.clone(),
            Duration::from_secs(config.daemon.phase_timeout_secs),
        ));
        let launcher = Arc::new(SocketLauncher::new(config.channels.run_dir.clone()));
        let metrics = CoordinatorMetrics::shared();

        let coordinator = Arc::new(Coordinator::new(store, messenger, metrics));

        let map = coordinator
            .directory()
            .discover(launcher.as_ref(), coordinator.messenger())
            .await
            .context("Initial participant discovery failed")?;
        info!(drivers = map.driver_count(), "participant discovery complete");

        let socket_path = config
            .node
            .socket_path
            .clone()
            .unwrap_or_else(IpcServer::default_socket_path);

        let (shutdown_tx, _) = broadcast::channel(16);
        let handler = Arc::new(RequestHandler::new(
            coordinator,
            launcher,
            config.clone(),
            shutdown_tx.clone(),
        ));
        let server = IpcServer::new(socket_path, handler.clone());

        info!("data directory: {}", config.node.data_dir.display());
        info!("socket path: {}", server.socket_path().display());

        Ok(Self {
            handler,
            server,
            shutdown_tx,
            pid_file_path,
        })
    }

    /// Run the daemon until a shutdown signal arrives.
    pub async fn run(&self) -> Result<()> {
        info!("daemon running");

        let shutdown_rx = self.shutdown_tx.subscribe();
        let server_rx = self.shutdown_tx.subscribe();

        let socket_path = self.server.socket_path().to_path_buf();
        let server = IpcServer::new(socket_path, self.handler.clone());
        let server_handle = tokio::spawn(async move {
            match server.run(server_rx).await {
                Ok(()) => info!("IPC server shut down cleanly"),
                Err(e) => tracing::error!("IPC server failed: {}", e),
            }
        });

        tokio::select! {
            _ = signal::ctrl_c() => {
                info!("received Ctrl+C, shutting down");
            }
            _ = Self::wait_for_sigterm() => {
                info!("received SIGTERM, shutting down");
            }
            _ = Self::wait_for_shutdown(shutdown_rx) => {
                info!("shutdown requested via IPC");
            }
        }

        self.handler.coordinator().set_shutting_down();
        let _ = self.shutdown_tx.send(());

        let server_abort = server_handle.abort_handle();
        if tokio::time::timeout(Duration::from_secs(5), server_handle)
            .await
            .is_err()
        {
            warn!("IPC server did not shut down within 5s, aborting");
            server_abort.abort();
        }

        self.shutdown()?;
        Ok(())
    }

    /// Final cleanup after the servers have stopped.
    fn shutdown(&self) -> Result<()> {
        Self::release_lock(&self.pid_file_path)?;
        info!("daemon shutdown complete");
        Ok(())
    }

    pub fn request_handler(&self) -> Arc<RequestHandler> {
        self.handler.clone()
    }

    /// Acquire single-instance lock via PID file.
    ///
    /// Uses `create_new(true)` for atomic creation to avoid TOCTOU races
    /// where two processes could interleave exists/read/remove/create.
    fn acquire_lock(pid_file_path: &Path) -> Result<()> {
        use std::fs::OpenOptions;

        match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(pid_file_path)
        {
            Ok(mut file) => {
                writeln!(file, "{}", std::process::id())?;
                return Ok(());
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                // File exists; check below whether it's stale.
            }
            Err(e) => {
                return Err(e).context("Failed to create PID file");
            }
        }

        let mut file = File::open(pid_file_path)?;
        let mut contents = String::new();
        file.read_to_string(&mut contents)?;

        if let Ok(pid) = contents.trim().parse::<u32>() {
            if Self::process_exists(pid) {
                anyhow::bail!(
                    "Daemon is already running (PID {}). Stop it first or remove {}",
                    pid,
                    pid_file_path.display()
                );
            }
        }

        // Stale PID file; remove and retry once.
        std::fs::remove_file(pid_file_path)?;

        match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(pid_file_path)
        {
            Ok(mut file) => {
                writeln!(file, "{}", std::process::id())?;
                Ok(())
            }
            Err(e) => Err(e).context("Failed to create PID file after removing stale lock"),
        }
    }

    /// Release single-instance lock
    fn release_lock(pid_file_path: &Path) -> Result<()> {
        if pid_file_path.exists() {
            std::fs::remove_file(pid_file_path)?;
        }
        Ok(())
    }

    /// Check if a process with the given PID exists
    fn process_exists(pid: u32) -> bool {
        #[cfg(unix)]
        {
            // Signal 0 checks existence without sending anything.
            unsafe { libc::kill(pid as i32, 0) == 0 }
        }

        #[cfg(not(unix))]
        {
            let _ = pid;
            true
        }
    }

    /// Wait for SIGTERM signal
    #[cfg(unix)]
    async fn wait_for_sigterm() {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("failed to register SIGTERM handler: {}. Falling back to pending future.", e);
                std::future::pending::<()>().await;
            }
        }
    }

    #[cfg(not(unix))]
    async fn wait_for_sigterm() {
        std::future::pending::<()>().await
    }

    async fn wait_for_shutdown(mut rx: broadcast::Receiver<()>) {
        let _ = rx.recv().await;
    }
}

/// Check if the daemon is running
pub fn is_daemon_running(data_dir: &Path) -> bool {
    get_daemon_pid(data_dir).is_some()
}

/// Get the PID of the running daemon, if any
pub fn get_daemon_pid(data_dir: &Path) -> Option<u32> {
    let pid_file_path = data_dir.join(PID_FILE_NAME);

    if !pid_file_path.exists() {
        return None;
    }

    File::open(&pid_file_path)
        .ok()
        .and_then(|mut file| {
            let mut contents = String::new();
            file.read_to_string(&mut contents).ok()?;
            contents.trim().parse().ok()
        })
        .filter(|&pid| Daemon::process_exists(pid))
}
