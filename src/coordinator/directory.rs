//! Channel discovery
//!
//! Names the live protocol participants by querying the process launcher,
//! introspecting each driver channel for its controller kind, and indexing
//! the result by daemon identity. The published map is an immutable
//! snapshot swapped wholesale; a partial map is never published, since
//! phase messages silently skipping participants is worse than a failed
//! discovery pass.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use thiserror::Error;
use tracing::{debug, info};

use crate::participant::ProcKind;
use crate::types::{ControllerKind, DaemonId};

use super::phase::{PhaseError, PhaseMessenger, PhaseTarget};

#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error("listing {kind:?} daemons failed: {detail}")]
    Launcher { kind: ProcKind, detail: String },

    #[error("expected exactly one {kind:?} engine, found {found}")]
    EngineCount { kind: ProcKind, found: usize },

    #[error("introspecting driver channel failed")]
    Introspection(#[from] PhaseError),

    #[error("channel {channel} identifies as {role:?}, not a driver")]
    RoleMismatch { channel: String, role: ProcKind },

    #[error("channels {first} and {second} both serve {kind} controllers")]
    DuplicateDriver {
        kind: ControllerKind,
        first: String,
        second: String,
    },
}

/// Lists live daemon channels by role.
#[async_trait]
pub trait Launcher: Send + Sync {
    async fn list_daemons(&self, kind: ProcKind) -> Result<Vec<String>, DirectoryError>;
}

/// Launcher over the participants' run directory.
///
/// Participants register one socket per process under a role subdirectory
/// (`logical/`, `physical/`, `driver/`); the channel name is the path
/// relative to the run directory.
pub struct SocketLauncher {
    run_dir: PathBuf,
}

impl SocketLauncher {
    pub fn new(run_dir: PathBuf) -> Self {
        Self { run_dir }
    }

    fn subdir(kind: ProcKind) -> &'static str {
        match kind {
            ProcKind::Logical => "logical",
            ProcKind::Physical => "physical",
            ProcKind::Driver => "driver",
        }
    }
}

#[async_trait]
impl Launcher for SocketLauncher {
    async fn list_daemons(&self, kind: ProcKind) -> Result<Vec<String>, DirectoryError> {
        let sub = Self::subdir(kind);
        let dir = self.run_dir.join(sub);

        let entries = std::fs::read_dir(&dir).map_err(|e| DirectoryError::Launcher {
            kind,
            detail: format!("{}: {}", dir.display(), e),
        })?;

        let mut channels = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| DirectoryError::Launcher {
                kind,
                detail: e.to_string(),
            })?;
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if name.ends_with(".sock") {
                channels.push(format!("{sub}/{name}"));
            }
        }
        channels.sort();
        Ok(channels)
    }
}

/// Immutable participant snapshot used for one operation's duration.
#[derive(Debug, Clone, Default)]
pub struct ChannelMap {
    logical: String,
    physical: String,
    drivers: BTreeMap<ControllerKind, String>,
}

impl ChannelMap {
    pub fn channel(&self, id: DaemonId) -> Option<&str> {
        match id {
            DaemonId::Logical => Some(self.logical.as_str()),
            DaemonId::Physical => Some(self.physical.as_str()),
            DaemonId::Driver(kind) => self.drivers.get(&kind).map(String::as_str),
        }
    }

    pub fn driver_count(&self) -> usize {
        self.drivers.len()
    }

    pub fn has_driver(&self, kind: ControllerKind) -> bool {
        self.drivers.contains_key(&kind)
    }

    /// Resolve a phase target to ordered `(daemon, channel)` pairs.
    ///
    /// Engines always precede drivers; a named driver absent from the
    /// snapshot yields `None`.
    pub fn resolve(&self, target: PhaseTarget) -> Option<Vec<(DaemonId, String)>> {
        let engines = || {
            vec![
                (DaemonId::Logical, self.logical.clone()),
                (DaemonId::Physical, self.physical.clone()),
            ]
        };
        let drivers = || {
            self.drivers
                .iter()
                .map(|(&kind, chan)| (DaemonId::Driver(kind), chan.clone()))
                .collect::<Vec<_>>()
        };

        match target {
            PhaseTarget::Engines => Some(engines()),
            PhaseTarget::Drivers => Some(drivers()),
            PhaseTarget::Driver(kind) => {
                let chan = self.drivers.get(&kind)?;
                Some(vec![(DaemonId::Driver(kind), chan.clone())])
            }
            PhaseTarget::All => {
                let mut all = engines();
                all.extend(drivers());
                Some(all)
            }
        }
    }
}

/// Holder of the current channel snapshot.
pub struct ChannelDirectory {
    map: RwLock<Arc<ChannelMap>>,
    published_at: parking_lot::Mutex<Option<std::time::Instant>>,
}

impl Default for ChannelDirectory {
    fn default() -> Self {
        Self::new()
    }
}

impl ChannelDirectory {
    pub fn new() -> Self {
        Self {
            map: RwLock::new(Arc::new(ChannelMap::default())),
            published_at: parking_lot::Mutex::new(None),
        }
    }

    /// Current snapshot; immutable for the caller's lifetime.
    pub fn snapshot(&self) -> Arc<ChannelMap> {
        self.map.read().clone()
    }

    /// Age of the published snapshot; `None` before the first discovery.
    pub fn age(&self) -> Option<std::time::Duration> {
        self.published_at.lock().map(|at| at.elapsed())
    }

    /// Run one discovery pass and publish the result.
    ///
    /// Any category failing to enumerate fails the whole pass and leaves
    /// the previously published snapshot in place.
    pub async fn discover(
        &self,
        launcher: &dyn Launcher,
        messenger: &dyn PhaseMessenger,
    ) -> Result<Arc<ChannelMap>, DirectoryError> {
        let logical = single_engine(launcher, ProcKind::Logical).await?;
        let physical = single_engine(launcher, ProcKind::Physical).await?;

        let mut drivers: BTreeMap<ControllerKind, String> = BTreeMap::new();
        for channel in launcher.list_daemons(ProcKind::Driver).await? {
            let identity = messenger.introspect(&channel).await?;
            let kind = match (identity.role, identity.controller) {
                (ProcKind::Driver, Some(kind)) => kind,
                (role, _) => {
                    return Err(DirectoryError::RoleMismatch { channel, role });
                }
            };
            if let Some(first) = drivers.get(&kind) {
                return Err(DirectoryError::DuplicateDriver {
                    kind,
                    first: first.clone(),
                    second: channel,
                });
            }
            debug!(%channel, controller = %kind, "discovered driver channel");
            drivers.insert(kind, channel);
        }

        let map = Arc::new(ChannelMap {
            logical,
            physical,
            drivers,
        });
        info!(
            logical = %map.logical,
            physical = %map.physical,
            drivers = map.drivers.len(),
            "published channel map"
        );
        *self.map.write() = map.clone();
        *self.published_at.lock() = Some(std::time::Instant::now());
        Ok(map)
    }
}

async fn single_engine(launcher: &dyn Launcher, kind: ProcKind) -> Result<String, DirectoryError> {
    let mut channels = launcher.list_daemons(kind).await?;
    if channels.len() != 1 {
        return Err(DirectoryError::EngineCount {
            kind,
            found: channels.len(),
        });
    }
    Ok(channels.remove(0))
}
