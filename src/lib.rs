//! fabricd: transaction coordinator for an SDN control fabric
//!
//! Serializes configuration changes across the control plane's backend
//! daemons, driving each change through a phased commit or audit protocol:
//! - Exclusive session locking (config session, write token, named locks)
//! - Phased commit: trans-start, vote, driver vote, global, trans-end
//! - Driver audit with cooperative cancellation
//! - Durable save/commit version counters with CONFIRMED/UPDATING status
//! - Runtime discovery of engine and driver channels

pub mod client;
pub mod config;
pub mod coordinator;
pub mod daemon;
pub mod participant;
pub mod store;
pub mod types;
pub mod wire;

pub use config::Config;
pub use types::*;
