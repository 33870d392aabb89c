//! Coordinator daemon and participant-channel configuration

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Daemon configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Default timeout for a single phase-message round trip, in seconds.
    /// Long-running operations (commit, audit) request an infinite timeout
    /// on their session instead.
    #[serde(default = "default_phase_timeout")]
    pub phase_timeout_secs: u64,
    /// Re-run participant discovery if the channel map is older than this
    /// many seconds when a transaction starts. Zero disables refresh.
    #[serde(default)]
    pub rediscover_after_secs: u64,
}

fn default_phase_timeout() -> u64 {
    30
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            phase_timeout_secs: 30,
            rediscover_after_secs: 0,
        }
    }
}

/// Participant channel configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelConfig {
    /// Run directory where participants register their sockets, with one
    /// subdirectory per role: `logical/`, `physical/`, `driver/`.
    pub run_dir: PathBuf,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            run_dir: PathBuf::from("/var/run/fabric"),
        }
    }
}
