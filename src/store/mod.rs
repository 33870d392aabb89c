//! Durable conf/recovery store
//!
//! Backs the coordinator's persistence boundary: the conf table (autosave
//! flag) and the recovery table (save/commit version counters and the
//! operation in flight, if any). The coordinator treats each call as an
//! opaque atomic operation and never retries on failure.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use crate::types::{ConfigTarget, OperCode};

/// Store file name inside the data directory.
const STORE_FILE: &str = "fabricd_conf.bin";

/// Errors surfaced by the conf store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("store record corrupt: {0}")]
    Corrupt(#[from] bincode::Error),
}

/// A write operation that was in flight when the record was last saved.
///
/// Present after a crash between the recovery-table update and the
/// operation's completion; startup logs and clears it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecoveryEntry {
    pub target: ConfigTarget,
    pub oper: OperCode,
}

/// On-disk record: conf table plus recovery table.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ConfRecord {
    version: u32,
    autosave: bool,
    save_version: u64,
    commit_version: u64,
    in_flight: Option<RecoveryEntry>,
}

impl ConfRecord {
    const CURRENT_VERSION: u32 = 1;
}

impl Default for ConfRecord {
    fn default() -> Self {
        Self {
            version: Self::CURRENT_VERSION,
            autosave: false,
            save_version: 0,
            commit_version: 0,
            in_flight: None,
        }
    }
}

/// Durable conf/recovery store, one record per coordinator instance.
///
/// All mutators persist synchronously before returning; the file is
/// replaced via temp-file rename so a crash never leaves a torn record.
pub struct ConfStore {
    path: PathBuf,
    record: parking_lot::Mutex<ConfRecord>,
}

impl ConfStore {
    /// Open the store in `data_dir`, creating a default record if absent.
    pub fn open(data_dir: &Path) -> Result<Self, StoreError> {
        let path = data_dir.join(STORE_FILE);

        let record = if path.exists() {
            let contents = fs::read(&path)?;
            let record: ConfRecord = bincode::deserialize(&contents)?;
            if record.version > ConfRecord::CURRENT_VERSION {
                warn!(
                    "conf store version {} is newer than supported {}",
                    record.version,
                    ConfRecord::CURRENT_VERSION
                );
            }
            record
        } else {
            ConfRecord::default()
        };

        Ok(Self {
            path,
            record: parking_lot::Mutex::new(record),
        })
    }

    /// Read the autosave flag from the conf table.
    pub fn get_conf_table(&self) -> bool {
        self.record.lock().autosave
    }

    /// Persist a new autosave flag.
    pub fn update_conf_table(&self, autosave: bool) -> Result<(), StoreError> {
        let mut record = self.record.lock();
        record.autosave = autosave;
        self.save(&record)
    }

    /// Record the write operation about to run against `target`.
    pub fn update_recovery_table(
        &self,
        target: ConfigTarget,
        oper: OperCode,
    ) -> Result<(), StoreError> {
        let mut record = self.record.lock();
        record.in_flight = Some(RecoveryEntry { target, oper });
        self.save(&record)
    }

    /// Clear the in-flight marker after a write operation completes.
    pub fn clear_recovery_table(&self) -> Result<(), StoreError> {
        let mut record = self.record.lock();
        record.in_flight = None;
        self.save(&record)
    }

    /// The operation that was in flight when the record was last saved.
    pub fn recovery_entry(&self) -> Option<RecoveryEntry> {
        self.record.lock().in_flight
    }

    pub fn recovery_save_version(&self) -> u64 {
        self.record.lock().save_version
    }

    pub fn update_recovery_save_version(&self, version: u64) -> Result<(), StoreError> {
        let mut record = self.record.lock();
        record.save_version = version;
        self.save(&record)
    }

    pub fn recovery_commit_version(&self) -> u64 {
        self.record.lock().commit_version
    }

    pub fn update_recovery_commit_version(&self, version: u64) -> Result<(), StoreError> {
        let mut record = self.record.lock();
        record.commit_version = version;
        self.save(&record)
    }

    /// Write atomically using a temp file.
    fn save(&self, record: &ConfRecord) -> Result<(), StoreError> {
        let encoded = bincode::serialize(&ConfRecord {
            version: ConfRecord::CURRENT_VERSION,
            ..record.clone()
        })?;

        let temp_path = self.path.with_extension("tmp");
        let mut file = File::create(&temp_path)?;
        file.write_all(&encoded)?;
        file.sync_all()?;

        fs::rename(&temp_path, &self.path)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn fresh_store_defaults() {
        let dir = TempDir::new().unwrap();
        let store = ConfStore::open(dir.path()).unwrap();

        assert!(!store.get_conf_table());
        assert_eq!(store.recovery_save_version(), 0);
        assert_eq!(store.recovery_commit_version(), 0);
        assert!(store.recovery_entry().is_none());
    }

    #[test]
    fn record_survives_reopen() {
        let dir = TempDir::new().unwrap();

        {
            let store = ConfStore::open(dir.path()).unwrap();
            store.update_conf_table(true).unwrap();
            store.update_recovery_save_version(7).unwrap();
            store.update_recovery_commit_version(41).unwrap();
        }

        let store = ConfStore::open(dir.path()).unwrap();
        assert!(store.get_conf_table());
        assert_eq!(store.recovery_save_version(), 7);
        assert_eq!(store.recovery_commit_version(), 41);
    }

    #[test]
    fn in_flight_marker_round_trip() {
        let dir = TempDir::new().unwrap();

        {
            let store = ConfStore::open(dir.path()).unwrap();
            store
                .update_recovery_table(ConfigTarget::Startup, OperCode::RunningSave)
                .unwrap();
        }

        let store = ConfStore::open(dir.path()).unwrap();
        let entry = store.recovery_entry().unwrap();
        assert_eq!(entry.target, ConfigTarget::Startup);
        assert_eq!(entry.oper, OperCode::RunningSave);

        store.clear_recovery_table().unwrap();
        assert!(store.recovery_entry().is_none());
    }
}
