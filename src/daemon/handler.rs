//! Request handler
//!
//! Turns each decoded request into a coordinator operation: builds the
//! per-request session, resolves the operation family from the dispatch
//! table, runs the dispatcher, and shapes the response. Management
//! requests (ping, status, rediscover, shutdown) are handled directly.

use std::sync::Arc;
use std::time::Instant;

use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::coordinator::{dispatch, ops, Coordinator, Launcher, Session};
use crate::types::{ArgValue, OperCode, OperStatus};

use super::protocol::{DaemonStatus, Request, Response};

/// Request handler that processes incoming IPC requests.
pub struct RequestHandler {
    coordinator: Arc<Coordinator>,
    launcher: Arc<dyn Launcher>,
    config: Config,
    start_time: Instant,
    shutdown_tx: broadcast::Sender<()>,
}

impl RequestHandler {
    pub fn new(
        coordinator: Arc<Coordinator>,
        launcher: Arc<dyn Launcher>,
        config: Config,
        shutdown_tx: broadcast::Sender<()>,
    ) -> Self {
        Self {
            coordinator,
            launcher,
            config,
            start_time: Instant::now(),
            shutdown_tx,
        }
    }

    pub fn coordinator(&self) -> Arc<Coordinator> {
        self.coordinator.clone()
    }

    /// Handle an incoming request and return a response.
    pub async fn handle(&self, request: Request) -> Response {
        match request {
            Request::Operate { args } => self.handle_operate(args).await,
            Request::Ping => Response::Pong,
            Request::Status => self.handle_status(),
            Request::Rediscover => self.handle_rediscover().await,
            Request::Shutdown => self.handle_shutdown(),
        }
    }

    async fn handle_operate(&self, args: Vec<ArgValue>) -> Response {
        self.coordinator.metrics().active_requests.inc();
        let response = self.run_operation(args).await;
        self.coordinator.metrics().active_requests.dec();
        response
    }

    async fn run_operation(&self, args: Vec<ArgValue>) -> Response {
        let mut session = Session::new(args);

        let code = match session.u32_arg(0).map(OperCode::try_from) {
            Some(Ok(code)) => code,
            _ => {
                debug!("request carries an unknown operation code");
                return Response::Operate {
                    status: OperStatus::InvalidInput,
                    outputs: Vec::new(),
                };
            }
        };

        if matches!(code, OperCode::CommitTrans | OperCode::AuditTrans) {
            self.refresh_channels_if_stale().await;
        }

        let mut operation = ops::operation_for(code);
        let status = dispatch(operation.as_mut(), &self.coordinator, &mut session).await;

        Response::Operate {
            status,
            outputs: session.take_outputs(),
        }
    }

    /// Rebuild the channel map before a transaction when it has outlived
    /// the configured refresh window. A failed rebuild keeps the previous
    /// map; the transaction then runs against the older snapshot.
    async fn refresh_channels_if_stale(&self) {
        let max_age = self.config.daemon.rediscover_after_secs;
        if max_age == 0 {
            return;
        }
        let stale = match self.coordinator.directory().age() {
            Some(age) => age.as_secs() >= max_age,
            None => true,
        };
        if !stale {
            return;
        }
        if let Err(e) = self
            .coordinator
            .directory()
            .discover(self.launcher.as_ref(), self.coordinator.messenger())
            .await
        {
            warn!(error = %e, "stale channel map refresh failed; keeping previous map");
        }
    }

    fn handle_status(&self) -> Response {
        let snapshot = self.coordinator.directory().snapshot();
        Response::Status(DaemonStatus {
            uptime_seconds: self.start_time.elapsed().as_secs(),
            shutting_down: self.coordinator.locks().is_shutting_down(),
            config_owner: self.coordinator.locks().config_owner(),
            driver_count: snapshot.driver_count(),
            metrics: self.coordinator.metrics().snapshot(),
        })
    }

    async fn handle_rediscover(&self) -> Response {
        match self
            .coordinator
            .directory()
            .discover(self.launcher.as_ref(), self.coordinator.messenger())
            .await
        {
            Ok(map) => Response::Rediscovered {
                drivers: map.driver_count(),
            },
            Err(e) => {
                warn!(error = %e, "rediscovery failed; previous channel map kept");
                Response::error(e.to_string())
            }
        }
    }

    fn handle_shutdown(&self) -> Response {
        info!("shutdown requested");
        // Refuse new write operations first, then stop the servers.
        self.coordinator.set_shutting_down();
        let _ = self.shutdown_tx.send(());
        Response::Ok
    }
}
