//! Node-level paths and identity

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Node configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Data directory for the conf/recovery store and the PID file
    pub data_dir: PathBuf,
    /// Client socket path override (defaults to XDG_RUNTIME_DIR/fabricd/fabricd.sock)
    pub socket_path: Option<PathBuf>,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(".fabricd"),
            socket_path: None,
        }
    }
}
