//! Environment snapshots written before every change.
//!
//! Each snapshot is one JSON file in `backup_env/`:
//!
//! ```json
//! {
//!   "timestamp": "20240801_101200_042",
//!   "install_root": "C:\\Go",
//!   "architecture": "amd64",
//!   "search_path": "C:\\Go\\bin;C:\\Windows\\system32",
//!   "backup_file": "C:\\gvs\\data\\backup_env\\env_backup_20240801_101200_042.json"
//! }
//! ```
//!
//! Timestamps are UTC `YYYYMMDD_HHMMSS_mmm`, so string order is time order.
//! Snapshots are never modified or deleted. A snapshot with any empty value
//! is kept on disk but ignored when picking the latest one.

use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::PathBuf;
use time::OffsetDateTime;
use time::macros::format_description;
use tracing::{debug, warn};

use super::store::EnvValues;
use crate::errors::{GvsError, GvsResult};

const FILE_PREFIX: &str = "env_backup_";
const FILE_SUFFIX: &str = ".json";

/// Saved values of the three managed variables.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvSnapshot {
    #[serde(default)]
    pub timestamp: String,
    #[serde(default)]
    pub install_root: String,
    #[serde(default)]
    pub architecture: String,
    #[serde(default)]
    pub search_path: String,
    #[serde(default)]
    pub backup_file: PathBuf,
}

impl EnvSnapshot {
    /// A snapshot can be restored only when every value was recorded.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        !self.timestamp.is_empty()
            && !self.install_root.is_empty()
            && !self.architecture.is_empty()
            && !self.search_path.is_empty()
    }

    /// Values to write back on restore.
    #[must_use]
    pub fn values(&self) -> EnvValues {
        EnvValues {
            install_root: Some(self.install_root.clone()),
            architecture: Some(self.architecture.clone()),
            search_path: Some(self.search_path.clone()),
        }
    }
}

/// Directory of snapshot files.
#[derive(Debug, Clone)]
pub struct BackupStore {
    dir: PathBuf,
}

impl BackupStore {
    #[must_use]
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    /// Durably writes a new snapshot of `values`.
    ///
    /// The file is created with create-new semantics; if the name is taken
    /// the timestamp moves forward one millisecond at a time.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory or file cannot be written. No
    /// partial file is left behind.
    pub fn write(&self, values: &EnvValues) -> GvsResult<EnvSnapshot> {
        std::fs::create_dir_all(&self.dir).map_err(|e| {
            GvsError::io(format!("Failed to create directory: {}", self.dir.display()), e)
        })?;

        let mut at = OffsetDateTime::now_utc();
        loop {
            let timestamp = format_timestamp(at)?;
            let path = self.dir.join(format!("{FILE_PREFIX}{timestamp}{FILE_SUFFIX}"));
            let file = std::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path);
            let mut file = match file {
                Ok(file) => file,
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    at += time::Duration::milliseconds(1);
                    continue;
                }
                Err(e) => {
                    return Err(GvsError::io(format!("Failed to create {}", path.display()), e));
                }
            };

            let snapshot = EnvSnapshot {
                timestamp,
                install_root: values.install_root.clone().unwrap_or_default(),
                architecture: values.architecture.clone().unwrap_or_default(),
                search_path: values.search_path.clone().unwrap_or_default(),
                backup_file: path.clone(),
            };
            let written = serde_json::to_vec_pretty(&snapshot)
                .map_err(|e| GvsError::serialization("Failed to serialize snapshot", e))
                .and_then(|content| {
                    file.write_all(&content)
                        .and_then(|()| file.sync_all())
                        .map_err(|e| GvsError::io(format!("Failed to write {}", path.display()), e))
                });
            if let Err(e) = written {
                drop(file);
                let _ = std::fs::remove_file(&path);
                return Err(e);
            }

            debug!(path = %path.display(), "environment snapshot written");
            return Ok(snapshot);
        }
    }

    /// Every readable snapshot, oldest first. Unparsable files are skipped.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory exists but cannot be listed.
    pub fn list(&self) -> GvsResult<Vec<EnvSnapshot>> {
        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(GvsError::io(format!("Failed to read {}", self.dir.display()), e));
            }
        };

        let mut snapshots = Vec::new();
        for entry in entries.flatten() {
            let path = entry.path();
            let name = entry.file_name().to_string_lossy().into_owned();
            if !name.starts_with(FILE_PREFIX) || !name.ends_with(FILE_SUFFIX) {
                continue;
            }
            let parsed = std::fs::read_to_string(&path)
                .map_err(|e| e.to_string())
                .and_then(|content| {
                    serde_json::from_str::<EnvSnapshot>(&content).map_err(|e| e.to_string())
                });
            match parsed {
                Ok(snapshot) => snapshots.push(snapshot),
                Err(error) => warn!(path = %path.display(), %error, "skipping unreadable snapshot"),
            }
        }
        snapshots.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));
        Ok(snapshots)
    }

    /// The newest valid snapshot.
    ///
    /// # Errors
    ///
    /// Returns `NoBackupAvailable` when there is none.
    pub fn latest(&self) -> GvsResult<EnvSnapshot> {
        self.list()?
            .into_iter()
            .filter(EnvSnapshot::is_valid)
            .max_by(|a, b| a.timestamp.cmp(&b.timestamp))
            .ok_or_else(|| GvsError::NoBackupAvailable {
                dir: self.dir.clone(),
            })
    }
}

fn format_timestamp(at: OffsetDateTime) -> GvsResult<String> {
    let format = format_description!("[year][month][day]_[hour][minute][second]_[subsecond digits:3]");
    at.format(&format)
        .map_err(|e| GvsError::store(format!("Failed to format snapshot timestamp: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use crate::test_support::temp_test_dir;

    fn values(root: &str) -> EnvValues {
        EnvValues {
            install_root: Some(root.to_string()),
            architecture: Some("amd64".to_string()),
            search_path: Some(format!(r"{root}\bin;C:\Windows")),
        }
    }

    fn write_raw(dir: &Path, timestamp: &str, body: &str) {
        std::fs::create_dir_all(dir).unwrap();
        std::fs::write(dir.join(format!("{FILE_PREFIX}{timestamp}{FILE_SUFFIX}")), body).unwrap();
    }

    #[test]
    fn timestamp_is_fixed_width_and_sortable() {
        let at = time::macros::datetime!(2024-08-01 09:05:03.042 UTC);
        assert_eq!(format_timestamp(at).unwrap(), "20240801_090503_042");
        let later = at + time::Duration::milliseconds(1);
        assert!(format_timestamp(later).unwrap() > format_timestamp(at).unwrap());
    }

    #[test]
    fn write_records_values_and_self_path() {
        let dir = temp_test_dir("backup_write");
        let store = BackupStore::new(dir.join("backup_env"));

        let snapshot = store.write(&values(r"C:\Go")).unwrap();

        assert!(snapshot.is_valid());
        assert_eq!(snapshot.install_root, r"C:\Go");
        assert!(snapshot.backup_file.is_file());
        let on_disk: EnvSnapshot =
            serde_json::from_str(&std::fs::read_to_string(&snapshot.backup_file).unwrap()).unwrap();
        assert_eq!(on_disk, snapshot);
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn rapid_writes_get_distinct_increasing_names() {
        let dir = temp_test_dir("backup_rapid");
        let store = BackupStore::new(dir.clone());

        let first = store.write(&values(r"C:\Go")).unwrap();
        let second = store.write(&values(r"C:\Go2")).unwrap();
        let third = store.write(&values(r"C:\Go3")).unwrap();

        assert!(first.timestamp < second.timestamp);
        assert!(second.timestamp < third.timestamp);
        assert_eq!(store.latest().unwrap().install_root, r"C:\Go3");
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn latest_skips_invalid_and_unparsable_snapshots() {
        let dir = temp_test_dir("backup_latest");
        let store = BackupStore::new(dir.clone());
        write_raw(
            &dir,
            "20240101_000000_000",
            r#"{"timestamp":"20240101_000000_000","install_root":"C:\\Old","architecture":"386","search_path":"C:\\Old\\bin"}"#,
        );
        write_raw(
            &dir,
            "20240301_000000_000",
            r#"{"timestamp":"20240301_000000_000","install_root":"","architecture":"amd64","search_path":"C:\\x"}"#,
        );
        write_raw(&dir, "20240401_000000_000", "{ not json");
        std::fs::write(dir.join("notes.txt"), "ignored").unwrap();

        let latest = store.latest().unwrap();
        assert_eq!(latest.install_root, r"C:\Old");
        assert_eq!(store.list().unwrap().len(), 2);
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn missing_directory_has_no_backup() {
        let dir = temp_test_dir("backup_none");
        let store = BackupStore::new(dir.join("absent"));
        let err = store.latest().unwrap_err();
        assert!(matches!(err, GvsError::NoBackupAvailable { .. }));
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn unset_values_make_a_snapshot_invalid() {
        let dir = temp_test_dir("backup_unset");
        let store = BackupStore::new(dir.clone());
        let snapshot = store
            .write(&EnvValues {
                install_root: None,
                architecture: None,
                search_path: Some(r"C:\Windows".to_string()),
            })
            .unwrap();

        assert!(!snapshot.is_valid());
        assert!(matches!(store.latest(), Err(GvsError::NoBackupAvailable { .. })));
        std::fs::remove_dir_all(&dir).ok();
    }
}
