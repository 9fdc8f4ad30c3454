//! Path management for gvs.
//!
//! Everything gvs owns lives under one base directory. By default that is a
//! `data/` folder next to the executable, which keeps a portable install
//! self-contained. Set `GVS_HOME` to put it elsewhere.
//!
//! ## Directory Structure
//!
//! ```text
//! <base>/
//!   down/                       # Archive cache (go1.21.0.windows-amd64.zip)
//!   go-version/                 # Extracted toolchains
//!     1.21.0-x64/
//!       bin/go.exe
//!       pkg/
//!       src/
//!   config/
//!     config.json               # Version registry
//!     versions.json             # Catalog cache (mtime = last refresh)
//!     settings.toml             # Optional user settings
//!   backup_env/
//!     env_backup_<ts>.json      # Environment snapshots
//! ```

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use super::Architecture;
use super::version::GoVersion;
use crate::errors::{GvsError, GvsResult};

/// Environment variable to override the base directory.
pub const GVS_HOME_ENV: &str = "GVS_HOME";

/// Resolved locations of every gvs directory and document.
#[derive(Debug, Clone)]
pub struct GvsPaths {
    /// Base directory (`GVS_HOME` or `<exe dir>/data`).
    pub root: PathBuf,
    /// Downloaded archive cache.
    pub downloads: PathBuf,
    /// Parent of all extracted toolchains.
    pub versions: PathBuf,
    /// Registry, catalog cache and settings.
    pub config: PathBuf,
    /// Environment snapshots.
    pub backups: PathBuf,
}

impl GvsPaths {
    /// Resolves the base directory and derives the layout from it.
    ///
    /// The base directory is determined by:
    /// 1. The `GVS_HOME` environment variable if set and non-empty
    /// 2. A `data` directory next to the running executable
    /// 3. `<platform data dir>/gvs` when the executable path is unavailable
    ///
    /// # Errors
    ///
    /// Returns an error if none of the locations can be determined.
    pub fn new() -> Result<Self> {
        if let Some(home) = std::env::var_os(GVS_HOME_ENV).filter(|v| !v.is_empty()) {
            return Ok(Self::with_root(PathBuf::from(home)));
        }

        let beside_exe = std::env::current_exe()
            .ok()
            .and_then(|exe| exe.parent().map(|dir| dir.join("data")));
        let root = match beside_exe {
            Some(root) => root,
            None => dirs::data_dir()
                .context("Cannot determine a data directory. Set GVS_HOME environment variable.")?
                .join("gvs"),
        };
        Ok(Self::with_root(root))
    }

    /// Creates the layout under a known root.
    #[must_use = "returns new paths instance without side effects"]
    pub fn with_root(root: PathBuf) -> Self {
        Self {
            downloads: root.join("down"),
            versions: root.join("go-version"),
            config: root.join("config"),
            backups: root.join("backup_env"),
            root,
        }
    }

    /// Directory name for an install, e.g. `1.21.0-x64`.
    #[must_use = "returns the name without side effects"]
    pub fn install_dir_name(version: &GoVersion, arch: Architecture) -> String {
        format!("{version}-{arch}")
    }

    /// Extraction directory for a version and architecture.
    #[must_use = "returns the path without side effects"]
    pub fn install_dir(&self, version: &GoVersion, arch: Architecture) -> PathBuf {
        self.versions.join(Self::install_dir_name(version, arch))
    }

    /// Cached archive location for a file name.
    #[must_use = "returns the path without side effects"]
    pub fn archive_path(&self, filename: &str) -> PathBuf {
        self.downloads.join(filename)
    }

    /// Version registry document.
    #[must_use = "returns the path without side effects"]
    pub fn registry_file(&self) -> PathBuf {
        self.config.join("config.json")
    }

    /// Catalog cache document.
    #[must_use = "returns the path without side effects"]
    pub fn catalog_cache_file(&self) -> PathBuf {
        self.config.join("versions.json")
    }

    /// Optional settings file.
    #[must_use = "returns the path without side effects"]
    pub fn settings_file(&self) -> PathBuf {
        self.config.join("settings.toml")
    }

    /// Ensures all directories of the layout exist.
    ///
    /// # Errors
    ///
    /// Returns an error if any directory cannot be created.
    pub fn ensure_directories(&self) -> Result<()> {
        for dir in [
            &self.root,
            &self.downloads,
            &self.versions,
            &self.config,
            &self.backups,
        ] {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create directory: {}", dir.display()))?;
        }
        Ok(())
    }
}

/// Writes `contents` to a sibling temp file and renames it over `path`.
///
/// Readers see either the old document or the new one, never a torn write.
///
/// # Errors
///
/// Returns `Io` if the parent directory cannot be created or either step fails.
pub fn write_atomic(path: &Path, contents: &[u8]) -> GvsResult<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| {
            GvsError::io(format!("Failed to create directory: {}", parent.display()), e)
        })?;
    }
    let mut temp_name = path.file_name().unwrap_or_default().to_os_string();
    temp_name.push(".tmp");
    let temp_path = path.with_file_name(temp_name);

    std::fs::write(&temp_path, contents)
        .map_err(|e| GvsError::io(format!("Failed to write {}", temp_path.display()), e))?;
    std::fs::rename(&temp_path, path).map_err(|e| {
        let _ = std::fs::remove_file(&temp_path);
        GvsError::io(format!("Failed to replace {}", path.display()), e)
    })
}

/// Case-insensitive `Path::starts_with`, matching how Windows compares paths.
#[must_use]
pub fn path_starts_with_ignore_case(path: &Path, prefix: &Path) -> bool {
    let mut path_components = path.components();
    for expected in prefix.components() {
        match path_components.next() {
            Some(actual)
                if actual
                    .as_os_str()
                    .to_string_lossy()
                    .eq_ignore_ascii_case(&expected.as_os_str().to_string_lossy()) => {}
            _ => return false,
        }
    }
    true
}
