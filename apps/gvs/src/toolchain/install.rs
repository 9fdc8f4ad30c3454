//! The install pipeline.
//!
//! An install attempt walks a fixed sequence of states:
//!
//! ```text
//! NotResolved -> Resolved -> ArtifactReady -> Extracted -> Registered
//! ```
//!
//! - **Resolve**: find the catalog entry for `(version, arch)`.
//! - **Acquire**: reuse `down/<archive>` when its SHA-256 matches, otherwise
//!   download it. A fresh download that fails the checksum is retried once.
//! - **Extract**: unpack into `<target>.partial`, check the toolchain layout,
//!   then swap the staging directory into place.
//! - **Register**: record the install in the version registry.
//!
//! A failure in any step stops the attempt where it is. The registry is only
//! written by the final transition, so a failed install never shows up as
//! installed.

use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use super::archive::extract_zip;
use super::cancel::CancelToken;
use super::catalog::{ReleaseDescriptor, resolve};
use super::download::{Downloader, ProgressCallback};
use super::paths::GvsPaths;
use super::platform::Architecture;
use super::registry::{InstalledVersion, VersionRegistry};
use super::verify::verify_checksum;
use super::version::GoVersion;
use crate::errors::{GvsError, GvsResult};

/// A fresh download is attempted this many times before a checksum mismatch
/// becomes fatal.
const DOWNLOAD_ATTEMPTS: u32 = 2;

/// File name of the `go` executable inside `bin/`.
#[must_use]
pub fn go_binary_name() -> &'static str {
    if cfg!(windows) { "go.exe" } else { "go" }
}

/// Checks that `path` looks like a Go toolchain.
///
/// Required: `bin/go.exe` (`bin/go` off Windows), `pkg/` and `src/`.
///
/// # Errors
///
/// Returns `InvalidInstall` naming the first missing entry.
pub fn check_integrity(path: &Path) -> GvsResult<()> {
    let binary = Path::new("bin").join(go_binary_name());
    let required: [(PathBuf, bool); 3] = [
        (binary, false),
        (PathBuf::from("pkg"), true),
        (PathBuf::from("src"), true),
    ];

    for (relative, is_dir) in required {
        let full = path.join(&relative);
        let present = if is_dir { full.is_dir() } else { full.is_file() };
        if !present {
            return Err(GvsError::InvalidInstall {
                path: path.to_path_buf(),
                missing: relative,
            });
        }
    }
    Ok(())
}

/// Progress of a single install attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum InstallState {
    NotResolved,
    Resolved,
    ArtifactReady,
    Extracted,
    Registered,
}

impl InstallState {
    fn advance(&mut self, next: Self) {
        debug_assert!(next > *self, "install state can only move forward");
        debug!(from = ?*self, to = ?next, "install state");
        *self = next;
    }
}

/// Ensures a verified archive for `descriptor` exists in the download cache.
///
/// # Errors
///
/// Returns download and I/O errors unchanged, `Cancelled` on cancellation,
/// and `ChecksumMismatch` when two fresh downloads both fail verification.
pub async fn acquire(
    descriptor: &ReleaseDescriptor,
    paths: &GvsPaths,
    downloader: &Downloader,
    cancel: &CancelToken,
    progress: Option<&ProgressCallback>,
) -> GvsResult<PathBuf> {
    let archive = paths.archive_path(&descriptor.archive_filename());

    if archive.is_file() {
        match verify_checksum(&archive, &descriptor.sha256) {
            Ok(()) => {
                debug!(path = %archive.display(), "reusing cached archive");
                return Ok(archive);
            }
            Err(GvsError::ChecksumMismatch { actual, .. }) => {
                warn!(path = %archive.display(), %actual, "cached archive is corrupt, downloading again");
                remove_archive(&archive)?;
            }
            Err(e) => return Err(e),
        }
    }

    let mut last_digest = String::new();
    for attempt in 1..=DOWNLOAD_ATTEMPTS {
        let digest = downloader
            .download(&descriptor.download_url, &archive, cancel, progress)
            .await?;
        if digest.eq_ignore_ascii_case(&descriptor.sha256) {
            return Ok(archive);
        }
        remove_archive(&archive)?;
        warn!(attempt, expected = %descriptor.sha256, actual = %digest, "downloaded archive failed checksum");
        last_digest = digest;
    }
    Err(GvsError::checksum_mismatch(
        descriptor.sha256.to_lowercase(),
        last_digest,
    ))
}

fn remove_archive(path: &Path) -> GvsResult<()> {
    std::fs::remove_file(path)
        .map_err(|e| GvsError::io(format!("Failed to remove {}", path.display()), e))
}

/// Staging directory used while extracting into `target`.
#[must_use]
pub fn staging_path_for(target: &Path) -> PathBuf {
    let mut name = target.file_name().unwrap_or_default().to_os_string();
    name.push(".partial");
    target.with_file_name(name)
}

/// Extracts `archive` so that `target` holds exactly the archive's contents.
///
/// Extraction happens in a staging directory. Only a complete tree that passes
/// [`check_integrity`] replaces `target`; an existing `target` is deleted
/// first and never merged into.
///
/// # Errors
///
/// Returns `PathTraversal`, `InvalidInstall`, `Cancelled` or `Io`. The staging
/// directory is removed on every error and `target` is left as it was.
pub fn extract(archive: &Path, target: &Path, cancel: &CancelToken) -> GvsResult<()> {
    let staging = staging_path_for(target);
    if staging.exists() {
        remove_tree(&staging)?;
    }

    let staged = extract_zip(archive, &staging, cancel).and_then(|()| check_integrity(&staging));
    if let Err(e) = staged {
        let _ = std::fs::remove_dir_all(&staging);
        return Err(e);
    }

    if target.exists()
        && let Err(e) = remove_tree(target)
    {
        let _ = std::fs::remove_dir_all(&staging);
        return Err(e);
    }
    std::fs::rename(&staging, target).map_err(|e| {
        let _ = std::fs::remove_dir_all(&staging);
        GvsError::io(
            format!("Failed to move {} to {}", staging.display(), target.display()),
            e,
        )
    })
}

/// Runs [`extract`] on the blocking thread pool.
///
/// # Errors
///
/// Returns whatever [`extract`] returns, or `Io` if the task panicked.
pub async fn extract_in_background(
    archive: PathBuf,
    target: PathBuf,
    cancel: CancelToken,
) -> GvsResult<()> {
    tokio::task::spawn_blocking(move || extract(&archive, &target, &cancel))
        .await
        .map_err(|e| GvsError::io("Extraction task failed", std::io::Error::other(e)))?
}

fn remove_tree(path: &Path) -> GvsResult<()> {
    std::fs::remove_dir_all(path)
        .map_err(|e| GvsError::io(format!("Failed to remove {}", path.display()), e))
}

/// Result of [`Installer::install`].
#[derive(Debug, Clone)]
pub enum InstallOutcome {
    /// The toolchain was downloaded (or taken from cache), extracted and registered.
    Installed(InstalledVersion),
    /// A valid install was already registered; nothing was touched.
    AlreadyInstalled(InstalledVersion),
}

impl InstallOutcome {
    #[must_use]
    pub fn installed(&self) -> &InstalledVersion {
        match self {
            Self::Installed(v) | Self::AlreadyInstalled(v) => v,
        }
    }
}

/// Runs the install pipeline for one `(version, arch)`.
pub struct Installer<'a> {
    pub paths: &'a GvsPaths,
    pub downloader: &'a Downloader,
    pub cancel: CancelToken,
    pub progress: Option<ProgressCallback>,
}

impl Installer<'_> {
    /// Installs `version` for `arch` and registers it.
    ///
    /// The registry is saved only after the new install passed every check.
    ///
    /// # Errors
    ///
    /// Returns the error of whichever step failed; see [`acquire`] and
    /// [`extract`].
    pub async fn install(
        &self,
        releases: &[ReleaseDescriptor],
        registry: &mut VersionRegistry,
        version: &GoVersion,
        arch: Architecture,
    ) -> GvsResult<InstallOutcome> {
        if let Some(existing) = registry.get(version, arch) {
            if existing.is_valid() {
                debug!(key = %existing.key(), "already installed");
                return Ok(InstallOutcome::AlreadyInstalled(existing.clone()));
            }
            warn!(key = %existing.key(), "registered install is damaged, reinstalling");
        }

        let mut state = InstallState::NotResolved;

        let descriptor = resolve(releases, version, arch)?;
        state.advance(InstallState::Resolved);

        let archive = acquire(
            &descriptor,
            self.paths,
            self.downloader,
            &self.cancel,
            self.progress.as_ref(),
        )
        .await?;
        state.advance(InstallState::ArtifactReady);

        let target = self.paths.install_dir(version, arch);
        extract_in_background(archive, target.clone(), self.cancel.clone()).await?;
        state.advance(InstallState::Extracted);

        let installed = registry.add_version(version, arch, &target)?.clone();
        registry.save()?;
        state.advance(InstallState::Registered);

        info!(key = %installed.key(), path = %installed.path.display(), "installed");
        Ok(InstallOutcome::Installed(installed))
    }
}
