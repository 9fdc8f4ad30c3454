//! Error types for the gvs CLI.
//!
//! Core modules (install pipeline, environment mutator, registry, backups)
//! return [`GvsError`] so callers and tests can match on the failure class.
//! The command layer wraps these in `anyhow::Error` with extra context; the
//! full chain is printed by `main` before exiting with status 1.

use std::path::PathBuf;
use thiserror::Error;

/// Result alias for core operations.
pub type GvsResult<T> = std::result::Result<T, GvsError>;

/// Consolidated error type for gvs core operations.
#[derive(Debug, Error)]
pub enum GvsError {
    /// No catalog release matches the requested version and architecture.
    #[error("no release found for go {version} ({arch})")]
    NotFound {
        /// Requested version.
        version: String,
        /// Requested architecture.
        arch: String,
    },

    /// Downloaded or cached archive does not hash to the catalog digest.
    #[error("checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch {
        /// Digest recorded in the catalog.
        expected: String,
        /// Digest computed from the file.
        actual: String,
    },

    /// An archive entry would be written outside the extraction directory.
    #[error("archive entry escapes the target directory: {entry}")]
    PathTraversal {
        /// Raw entry name as stored in the archive.
        entry: String,
    },

    /// A toolchain directory is missing a required subtree.
    #[error("invalid Go installation at {}: missing {}", .path.display(), .missing.display())]
    InvalidInstall {
        /// Installation directory that failed the check.
        path: PathBuf,
        /// First required path that was not found.
        missing: PathBuf,
    },

    /// A directory does not follow the `<version>-<arch>` naming convention.
    #[error("refusing to register {}: directory name must be {expected}", .path.display())]
    InvalidInstallName {
        /// Directory that was offered for registration.
        path: PathBuf,
        /// The directory name that was expected.
        expected: String,
    },

    /// The caller may not modify the machine environment.
    #[error("permission denied: {message}")]
    PermissionDenied {
        /// What was denied.
        message: String,
    },

    /// A variable write failed after earlier writes succeeded.
    ///
    /// `restored` tells whether the compensating writes brought every earlier
    /// variable back to its previous value.
    #[error("failed to update {variable} ({})", compensation_note(.restored))]
    MutationPartialFailure {
        /// Variable whose write failed.
        variable: String,
        /// Whether compensation succeeded.
        restored: bool,
        /// The failed write.
        #[source]
        source: Box<GvsError>,
    },

    /// Rollback was requested but no valid snapshot exists.
    #[error("no valid environment backup found in {}", .dir.display())]
    NoBackupAvailable {
        /// Directory that was searched.
        dir: PathBuf,
    },

    /// The toolchain's own version check failed after activation.
    #[error("verification failed: {message}")]
    VerificationFailed {
        /// Why verification failed.
        message: String,
    },

    /// Verification failed and putting the previous values back failed too.
    ///
    /// The environment may still point at the unverified toolchain; the
    /// snapshot taken before the change is what `gvs rollback` restores.
    #[error(
        "verification failed ({reason}) and the previous environment could not be restored; \
         GOROOT may still be {}. Run 'gvs rollback' to restore it",
        .goroot.display()
    )]
    RevertFailed {
        /// Why verification failed.
        reason: String,
        /// Install root the environment was switched to.
        goroot: PathBuf,
        /// The failed revert.
        #[source]
        source: Box<GvsError>,
    },

    /// The requested version is not registered.
    #[error("go {version} is not installed")]
    NotInstalled {
        /// The version (and architecture, when known) that was requested.
        version: String,
    },

    /// Architecture string could not be normalised.
    #[error("unsupported architecture: {value} (expected x86, x64, arm or arm64)")]
    UnsupportedArchitecture {
        /// The rejected input.
        value: String,
    },

    /// Version string is not a dotted numeric version.
    #[error("invalid version: {value}")]
    InvalidVersion {
        /// The rejected input.
        value: String,
    },

    /// Catalog could not be fetched and no cache exists.
    #[error("catalog error: {message}")]
    Catalog {
        /// Description of the catalog error.
        message: String,
    },

    /// Network error during download.
    #[error("download error: {message}")]
    Download {
        /// Description of the download error.
        message: String,
        /// The underlying error.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The operation was interrupted by the user.
    #[error("operation cancelled")]
    Cancelled,

    /// Reading or writing the environment store failed.
    #[error("environment store error: {message}")]
    EnvironmentStore {
        /// Description of the failure.
        message: String,
    },

    /// Error reading or writing files.
    #[error("I/O error: {message}")]
    Io {
        /// Description of the I/O operation that failed.
        message: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A JSON document could not be read or written.
    #[error("serialization error: {message}")]
    Serialization {
        /// Which document failed.
        message: String,
        /// The underlying serde error.
        #[source]
        source: serde_json::Error,
    },
}

#[allow(clippy::trivially_copy_pass_by_ref)]
fn compensation_note(restored: &bool) -> &'static str {
    if *restored {
        "earlier changes were rolled back"
    } else {
        "rollback of earlier changes also failed"
    }
}

impl GvsError {
    /// Creates a new `NotFound` error.
    #[must_use]
    pub fn not_found(version: impl Into<String>, arch: impl Into<String>) -> Self {
        Self::NotFound {
            version: version.into(),
            arch: arch.into(),
        }
    }

    /// Creates a new `ChecksumMismatch` error.
    #[must_use]
    pub fn checksum_mismatch(expected: impl Into<String>, actual: impl Into<String>) -> Self {
        Self::ChecksumMismatch {
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    /// Creates a new `PathTraversal` error.
    #[must_use]
    pub fn path_traversal(entry: impl Into<String>) -> Self {
        Self::PathTraversal {
            entry: entry.into(),
        }
    }

    /// Creates a new `PermissionDenied` error.
    #[must_use]
    pub fn permission_denied(message: impl Into<String>) -> Self {
        Self::PermissionDenied {
            message: message.into(),
        }
    }

    /// Creates a new `VerificationFailed` error.
    #[must_use]
    pub fn verification_failed(message: impl Into<String>) -> Self {
        Self::VerificationFailed {
            message: message.into(),
        }
    }

    /// Creates a new `NotInstalled` error.
    #[must_use]
    pub fn not_installed(version: impl Into<String>) -> Self {
        Self::NotInstalled {
            version: version.into(),
        }
    }

    /// Creates a new `Catalog` error.
    #[must_use]
    pub fn catalog(message: impl Into<String>) -> Self {
        Self::Catalog {
            message: message.into(),
        }
    }

    /// Creates a new `Download` error.
    #[must_use]
    pub fn download(message: impl Into<String>) -> Self {
        Self::Download {
            message: message.into(),
            source: None,
        }
    }

    /// Creates a new `Download` error with a source error.
    #[must_use]
    pub fn download_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Download {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Creates a new `EnvironmentStore` error.
    #[must_use]
    pub fn store(message: impl Into<String>) -> Self {
        Self::EnvironmentStore {
            message: message.into(),
        }
    }

    /// Creates a new `Io` error from an I/O error with context.
    #[must_use]
    pub fn io(message: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            message: message.into(),
            source,
        }
    }

    /// Creates a new `Serialization` error.
    #[must_use]
    pub fn serialization(message: impl Into<String>, source: serde_json::Error) -> Self {
        Self::Serialization {
            message: message.into(),
            source,
        }
    }
}
