//! Configuration for fabricd

mod daemon;
mod logging;
mod node;

pub use daemon::{ChannelConfig, DaemonConfig};
pub use logging::{LogFormat, LogLevel, LoggingConfig};
pub use node::NodeConfig;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Main configuration for the coordinator daemon
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Node paths
    #[serde(default)]
    pub node: NodeConfig,
    /// Daemon behavior
    #[serde(default)]
    pub daemon: DaemonConfig,
    /// Participant channel discovery
    #[serde(default)]
    pub channels: ChannelConfig,
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a TOML file and validate it.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            anyhow::anyhow!("Failed to read config file '{}': {}", path.display(), e)
        })?;
        let config: Config = toml::from_str(&content).map_err(|e| {
            anyhow::anyhow!("Failed to parse config file '{}': {}", path.display(), e)
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Validate all configuration fields.
    ///
    /// Collects all validation errors and reports them together so the user
    /// can fix everything in one pass.
    pub fn validate(&self) -> Result<()> {
        let mut errors: Vec<String> = Vec::new();

        if self.daemon.phase_timeout_secs == 0 {
            errors.push("phase_timeout_secs must be positive".to_string());
        }
        if self.daemon.phase_timeout_secs > 3600 {
            errors.push("phase_timeout_secs must be <= 3600".to_string());
        }
        if self.node.data_dir.as_os_str().is_empty() {
            errors.push("data_dir must not be empty".to_string());
        }
        if self.channels.run_dir.as_os_str().is_empty() {
            errors.push("run_dir must not be empty".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            anyhow::bail!("Invalid configuration:\n  - {}", errors.join("\n  - "))
        }
    }
}
