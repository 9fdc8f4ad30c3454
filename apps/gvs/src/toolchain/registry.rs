//! Version registry: which toolchains are installed and which one is current.
//!
//! The registry is a single JSON document at `config/config.json`:
//!
//! ```json
//! {
//!   "current": "1.21.0-x64",
//!   "versions": {
//!     "1.21.0-x64": {
//!       "version": "1.21.0",
//!       "arch": "x64",
//!       "path": "C:\\gvs\\data\\go-version\\1.21.0-x64",
//!       "installed_at": "2024-08-01T10:12:00Z"
//!     }
//!   }
//! }
//! ```
//!
//! The architecture is stored explicitly at install time so activation never
//! has to infer it from a directory name.
//!
//! Writes are last-writer-wins. Two gvs processes editing the registry at the
//! same time are not coordinated.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::warn;

use super::install::check_integrity;
use super::paths::{GvsPaths, path_starts_with_ignore_case, write_atomic};
use super::platform::Architecture;
use super::version::GoVersion;
use crate::errors::{GvsError, GvsResult};

/// A registered toolchain install.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstalledVersion {
    pub version: GoVersion,
    pub arch: Architecture,
    pub path: PathBuf,
    pub installed_at: String,
}

impl InstalledVersion {
    /// Registry key, e.g. `1.21.0-x64`.
    #[must_use]
    pub fn key(&self) -> String {
        GvsPaths::install_dir_name(&self.version, self.arch)
    }

    /// The toolchain's `bin` directory.
    #[must_use]
    pub fn bin_dir(&self) -> PathBuf {
        self.path.join("bin")
    }

    /// Whether the install directory still passes the integrity check.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        check_integrity(&self.path).is_ok()
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct RegistryDocument {
    #[serde(default)]
    current: Option<String>,
    #[serde(default)]
    versions: BTreeMap<String, InstalledVersion>,
}

/// In-memory view of the registry document.
///
/// Mutators change memory only; call [`VersionRegistry::save`] to persist.
#[derive(Debug)]
pub struct VersionRegistry {
    path: PathBuf,
    doc: RegistryDocument,
}

impl VersionRegistry {
    /// Loads the registry, treating a missing file as empty.
    ///
    /// A current pointer that names an unregistered key is cleared.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load(path: impl Into<PathBuf>) -> GvsResult<Self> {
        let path = path.into();
        let mut doc: RegistryDocument = match std::fs::read_to_string(&path) {
            Ok(content) => serde_json::from_str(&content).map_err(|e| {
                GvsError::serialization(format!("Failed to parse {}", path.display()), e)
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => RegistryDocument::default(),
            Err(e) => {
                return Err(GvsError::io(format!("Failed to read {}", path.display()), e));
            }
        };

        if let Some(current) = &doc.current
            && !doc.versions.contains_key(current)
        {
            warn!(%current, "current version is not registered, clearing it");
            doc.current = None;
        }

        Ok(Self { path, doc })
    }

    /// Writes the registry back to disk.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the atomic write fails.
    pub fn save(&self) -> GvsResult<()> {
        let content = serde_json::to_vec_pretty(&self.doc)
            .map_err(|e| GvsError::serialization("Failed to serialize registry", e))?;
        write_atomic(&self.path, &content)
    }

    /// Registers an install, replacing any entry for the same version and arch.
    ///
    /// Re-registering the same path keeps the original `installed_at`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInstallName` if the directory is not named
    /// `<version>-<arch>`.
    pub fn add_version(
        &mut self,
        version: &GoVersion,
        arch: Architecture,
        path: &Path,
    ) -> GvsResult<&InstalledVersion> {
        let expected = GvsPaths::install_dir_name(version, arch);
        let actual = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        if !actual.eq_ignore_ascii_case(&expected) {
            return Err(GvsError::InvalidInstallName {
                path: path.to_path_buf(),
                expected,
            });
        }

        let installed_at = match self.doc.versions.get(&expected) {
            Some(existing) if existing.path == path => existing.installed_at.clone(),
            _ => now_rfc3339(),
        };
        let entry = InstalledVersion {
            version: version.clone(),
            arch,
            path: path.to_path_buf(),
            installed_at,
        };
        self.doc.versions.insert(expected.clone(), entry);
        Ok(&self.doc.versions[&expected])
    }

    /// Unregisters an install. Clears the current pointer if it pointed there.
    pub fn remove_version(
        &mut self,
        version: &GoVersion,
        arch: Architecture,
    ) -> Option<InstalledVersion> {
        let key = GvsPaths::install_dir_name(version, arch);
        let removed = self.doc.versions.remove(&key)?;
        if self.doc.current.as_deref() == Some(key.as_str()) {
            self.doc.current = None;
        }
        Some(removed)
    }

    /// Marks a registered install as current.
    ///
    /// # Errors
    ///
    /// Returns `NotInstalled` if the pair is not registered.
    pub fn set_current(&mut self, version: &GoVersion, arch: Architecture) -> GvsResult<()> {
        let key = GvsPaths::install_dir_name(version, arch);
        if !self.doc.versions.contains_key(&key) {
            return Err(GvsError::not_installed(key));
        }
        self.doc.current = Some(key);
        Ok(())
    }

    #[must_use]
    pub fn get(&self, version: &GoVersion, arch: Architecture) -> Option<&InstalledVersion> {
        self.doc
            .versions
            .get(&GvsPaths::install_dir_name(version, arch))
    }

    /// All installs, newest version first, then by architecture.
    #[must_use]
    pub fn list(&self) -> Vec<&InstalledVersion> {
        let mut entries: Vec<&InstalledVersion> = self.doc.versions.values().collect();
        entries.sort_by(|a, b| b.version.cmp(&a.version).then(a.arch.cmp(&b.arch)));
        entries
    }

    /// Every registered architecture of one version.
    #[must_use]
    pub fn architectures_of(&self, version: &GoVersion) -> Vec<&InstalledVersion> {
        self.list()
            .into_iter()
            .filter(|entry| &entry.version == version)
            .collect()
    }

    #[must_use]
    pub fn current(&self) -> Option<&InstalledVersion> {
        self.doc
            .current
            .as_ref()
            .and_then(|key| self.doc.versions.get(key))
    }

    /// The install whose directory is `path`, compared case-insensitively.
    #[must_use]
    pub fn find_by_path(&self, path: &Path) -> Option<&InstalledVersion> {
        self.doc.versions.values().find(|entry| {
            path_starts_with_ignore_case(path, &entry.path)
                && path.components().count() == entry.path.components().count()
        })
    }

    /// Points `current` at the install living at `path`, or clears it.
    pub fn repoint_current(&mut self, path: &Path) {
        self.doc.current = self.find_by_path(path).map(InstalledVersion::key);
    }
}

fn now_rfc3339() -> String {
    time::OffsetDateTime::now_utc()
        .format(&time::format_description::well_known::Rfc3339)
        .unwrap_or_else(|_| "<unknown>".to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::temp_test_dir;

    fn v(s: &str) -> GoVersion {
        s.parse().unwrap()
    }

    fn registry_in(dir: &Path) -> VersionRegistry {
        VersionRegistry::load(dir.join("config").join("config.json")).unwrap()
    }

    #[test]
    fn missing_document_is_empty() {
        let dir = temp_test_dir("registry_empty");
        let registry = registry_in(&dir);
        assert!(registry.list().is_empty());
        assert!(registry.current().is_none());
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn add_version_round_trips_through_disk() {
        let dir = temp_test_dir("registry_add");
        let install = dir.join("go-version").join("1.21.0-x64");

        let mut registry = registry_in(&dir);
        registry.add_version(&v("1.21.0"), Architecture::X64, &install).unwrap();
        registry.set_current(&v("1.21.0"), Architecture::X64).unwrap();
        registry.save().unwrap();

        let reloaded = registry_in(&dir);
        let current = reloaded.current().unwrap();
        assert_eq!(current.version, v("1.21.0"));
        assert_eq!(current.arch, Architecture::X64);
        assert_eq!(current.path, install);
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn add_version_is_idempotent() {
        let dir = temp_test_dir("registry_idem");
        let install = dir.join("go-version").join("1.21.0-x64");
        let mut registry = registry_in(&dir);

        let first = registry
            .add_version(&v("1.21.0"), Architecture::X64, &install)
            .unwrap()
            .clone();
        let second = registry
            .add_version(&v("1.21.0"), Architecture::X64, &install)
            .unwrap()
            .clone();

        assert_eq!(first, second);
        assert_eq!(registry.list().len(), 1);
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn add_version_rejects_foreign_directory_names() {
        let dir = temp_test_dir("registry_name");
        let mut registry = registry_in(&dir);

        let err = registry
            .add_version(&v("1.21.0"), Architecture::X64, &dir.join("Windows"))
            .unwrap_err();
        assert!(matches!(err, GvsError::InvalidInstallName { ref expected, .. } if expected == "1.21.0-x64"));

        let err = registry
            .add_version(&v("1.21.0"), Architecture::X64, &dir.join("1.21.0-x86"))
            .unwrap_err();
        assert!(matches!(err, GvsError::InvalidInstallName { .. }));
        assert!(registry.list().is_empty());
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn set_current_requires_registration() {
        let dir = temp_test_dir("registry_current");
        let mut registry = registry_in(&dir);

        let err = registry.set_current(&v("1.20.1"), Architecture::X64).unwrap_err();
        assert!(matches!(err, GvsError::NotInstalled { .. }));
        assert!(registry.current().is_none());
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn remove_version_clears_current_pointer() {
        let dir = temp_test_dir("registry_remove");
        let mut registry = registry_in(&dir);
        let install = dir.join("1.21.0-x64");
        registry.add_version(&v("1.21.0"), Architecture::X64, &install).unwrap();
        registry.set_current(&v("1.21.0"), Architecture::X64).unwrap();

        let removed = registry.remove_version(&v("1.21.0"), Architecture::X64);

        assert!(removed.is_some());
        assert!(registry.current().is_none());
        assert!(registry.remove_version(&v("1.21.0"), Architecture::X64).is_none());
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn load_clears_dangling_current_pointer() {
        let dir = temp_test_dir("registry_dangling");
        let file = dir.join("config.json");
        std::fs::write(&file, r#"{"current": "1.19.0-x64", "versions": {}}"#).unwrap();

        let registry = VersionRegistry::load(&file).unwrap();
        assert!(registry.current().is_none());
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn list_is_sorted_numerically_newest_first() {
        let dir = temp_test_dir("registry_list");
        let mut registry = registry_in(&dir);
        for (version, arch) in [
            ("1.9.10", Architecture::X64),
            ("1.10.1", Architecture::X86),
            ("1.10.1", Architecture::X64),
            ("1.2.0", Architecture::X64),
        ] {
            let path = dir.join(GvsPaths::install_dir_name(&v(version), arch));
            registry.add_version(&v(version), arch, &path).unwrap();
        }

        let keys: Vec<String> = registry.list().iter().map(|e| e.key()).collect();
        assert_eq!(keys, ["1.10.1-x86", "1.10.1-x64", "1.9.10-x64", "1.2.0-x64"]);
        assert_eq!(registry.architectures_of(&v("1.10.1")).len(), 2);
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn repoint_current_matches_path_ignoring_case() {
        let dir = temp_test_dir("registry_repoint");
        let mut registry = registry_in(&dir);
        let install = PathBuf::from("C").join("gvs").join("1.21.0-x64");
        registry.add_version(&v("1.21.0"), Architecture::X64, &install).unwrap();

        registry.repoint_current(&PathBuf::from("c").join("GVS").join("1.21.0-X64"));
        assert_eq!(registry.current().map(InstalledVersion::key).as_deref(), Some("1.21.0-x64"));

        registry.repoint_current(&PathBuf::from("elsewhere"));
        assert!(registry.current().is_none());
        std::fs::remove_dir_all(&dir).ok();
    }
}
