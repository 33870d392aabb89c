//! Coordinator daemon
//!
//! The daemon owns the coordinator core and serves clients over a unix
//! socket. One handler instance dispatches every request; participants
//! are reached through their own registered channels.
//!
//! ```text
//! client ──IPC──▶ IpcServer ──▶ RequestHandler ──▶ dispatch()
//!                                     │                │
//!                                     │          lock table / ledger
//!                                     │                │
//!                                     ▼                ▼
//!                              ChannelDirectory ◀─ PhaseMessenger ──▶ participants
//! ```

pub mod handler;
pub mod lifecycle;
pub mod metrics;
pub mod protocol;
pub mod server;

pub use handler::RequestHandler;
pub use lifecycle::{get_daemon_pid, is_daemon_running, Daemon};
pub use metrics::{CoordinatorMetrics, MetricsSnapshot};
pub use protocol::{DaemonStatus, Request, Response};
pub use server::IpcServer;
