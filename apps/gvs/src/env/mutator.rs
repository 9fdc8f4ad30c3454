//! Activating a toolchain and rolling it back.
//!
//! [`Mutator::apply`] switches `GOROOT`, `GOARCH` and `Path` to an installed
//! toolchain:
//!
//! 1. Check the install layout and that the store is writable.
//! 2. Write a snapshot of the current values. No snapshot, no change.
//! 3. Derive the new values. The old toolchain's `bin` is dropped from `Path`
//!    and the new one goes first.
//! 4. Write the variables one by one. If one write fails, the ones already
//!    written are put back.
//! 5. Broadcast the change. A failed broadcast is only logged.
//! 6. Optionally run `go version`; on failure everything is put back.
//!
//! After step 2 the store ends up either fully switched or exactly as before.
//! The one exception is a failed verification whose restore also fails: the
//! error then says so, and the snapshot from step 2 is left for `gvs rollback`.
//!
//! [`Mutator::restore`] replays a snapshot verbatim through the same write
//! path. It never re-derives anything.

use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{debug, info, warn};

use super::backup::{BackupStore, EnvSnapshot};
use super::store::{EnvValues, EnvironmentStore, MANAGED_VARIABLES};
use crate::errors::{GvsError, GvsResult};
use crate::toolchain::install::{check_integrity, go_binary_name};
use crate::toolchain::registry::InstalledVersion;

/// Separator of the Windows search path.
const PATH_SEPARATOR: char = ';';

/// Unexpanded toolchain entry some installers put on `Path`.
const GOROOT_BIN_REFERENCE: &str = r"%GOROOT%\bin";

/// Whether `apply` should go ahead.
pub enum ActivationPolicy<'a> {
    Always,
    Never,
    /// Asks the caller, passing the install directory.
    Ask(&'a mut dyn FnMut(&Path) -> bool),
}

/// What `apply` did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    Applied,
    Skipped,
}

/// Post-activation check of a toolchain.
pub trait ToolchainVerifier {
    /// Confirms the toolchain runs under the new environment.
    ///
    /// # Errors
    ///
    /// Returns an error describing why the toolchain is not usable.
    fn verify(&self, install: &InstalledVersion) -> GvsResult<()>;
}

/// Runs `<install>/bin/go version` and expects `go<version>` in its output.
#[derive(Debug, Default)]
pub struct GoVersionCheck;

impl ToolchainVerifier for GoVersionCheck {
    fn verify(&self, install: &InstalledVersion) -> GvsResult<()> {
        let binary = install.bin_dir().join(go_binary_name());
        let inherited = std::env::var_os("PATH").unwrap_or_default();
        let search_path = std::env::join_paths(
            std::iter::once(install.bin_dir()).chain(std::env::split_paths(&inherited)),
        )
        .map_err(|e| GvsError::verification_failed(format!("cannot build PATH: {e}")))?;

        let output = Command::new(&binary)
            .arg("version")
            .env("GOROOT", &install.path)
            .env("GOARCH", install.arch.go_name())
            .env("PATH", search_path)
            .output()
            .map_err(|e| {
                GvsError::verification_failed(format!("cannot run {}: {e}", binary.display()))
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        if !output.status.success() {
            return Err(GvsError::verification_failed(format!(
                "`go version` exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        let expected = format!("go{}", install.version);
        if !stdout.split_whitespace().any(|word| word == expected) {
            return Err(GvsError::verification_failed(format!(
                "expected {expected}, `go version` printed: {}",
                stdout.trim()
            )));
        }
        debug!(output = %stdout.trim(), "toolchain verified");
        Ok(())
    }
}

/// The only writer of the environment store.
pub struct Mutator<'a> {
    store: &'a dyn EnvironmentStore,
    backups: &'a BackupStore,
    managed_root: PathBuf,
    verifier: Option<&'a dyn ToolchainVerifier>,
}

impl<'a> Mutator<'a> {
    /// `managed_root` is the `go-version` directory; any `Path` entry inside it
    /// is treated as a gvs toolchain entry.
    #[must_use]
    pub fn new(
        store: &'a dyn EnvironmentStore,
        backups: &'a BackupStore,
        managed_root: PathBuf,
    ) -> Self {
        Self {
            store,
            backups,
            managed_root,
            verifier: None,
        }
    }

    /// Enables the post-activation check.
    #[must_use]
    pub fn with_verifier(mut self, verifier: &'a dyn ToolchainVerifier) -> Self {
        self.verifier = Some(verifier);
        self
    }

    /// Makes `install` the active toolchain.
    ///
    /// # Errors
    ///
    /// - `InvalidInstall` or `PermissionDenied` before anything is written
    /// - snapshot write errors, also before anything is written
    /// - `MutationPartialFailure` when a write failed; earlier writes were
    ///   compensated
    /// - `VerificationFailed` after the previous values were restored
    /// - `RevertFailed` when verification failed and the restore did not
    ///   complete; the pre-change snapshot is still on disk
    pub fn apply(
        &self,
        install: &InstalledVersion,
        policy: ActivationPolicy<'_>,
    ) -> GvsResult<ApplyOutcome> {
        match policy {
            ActivationPolicy::Never => return Ok(ApplyOutcome::Skipped),
            ActivationPolicy::Ask(confirm) => {
                if !confirm(&install.path) {
                    return Ok(ApplyOutcome::Skipped);
                }
            }
            ActivationPolicy::Always => {}
        }

        check_integrity(&install.path)?;
        self.store.ensure_writable()?;

        let before = EnvValues::read_from(self.store)?;
        let snapshot = self.backups.write(&before)?;
        debug!(backup = %snapshot.backup_file.display(), "pre-change snapshot");

        let install_root = install.path.to_string_lossy().into_owned();
        let after = EnvValues {
            search_path: Some(derive_search_path(
                before.search_path.as_deref().unwrap_or_default(),
                before.install_root.as_deref(),
                &install.bin_dir(),
                &self.managed_root,
            )),
            install_root: Some(install_root),
            architecture: Some(install.arch.go_name().to_string()),
        };

        write_all_with_compensation(self.store, &before, &after)?;
        self.broadcast();

        if let Some(verifier) = self.verifier
            && let Err(e) = verifier.verify(install)
        {
            warn!(error = %e, "verification failed, restoring previous environment");
            let reason = match e {
                GvsError::VerificationFailed { message } => message,
                other => other.to_string(),
            };
            if let Err(revert) = write_all_with_compensation(self.store, &after, &before) {
                warn!(error = %revert, "could not restore previous environment");
                return Err(GvsError::RevertFailed {
                    reason,
                    goroot: install.path.clone(),
                    source: Box::new(revert),
                });
            }
            self.broadcast();
            return Err(GvsError::verification_failed(reason));
        }

        info!(goroot = %install.path.display(), goarch = install.arch.go_name(), "environment updated");
        Ok(ApplyOutcome::Applied)
    }

    /// Writes a snapshot's values back verbatim.
    ///
    /// # Errors
    ///
    /// Returns `PermissionDenied`, or `MutationPartialFailure` after the
    /// pre-restore values were put back.
    pub fn restore(&self, snapshot: &EnvSnapshot) -> GvsResult<()> {
        self.store.ensure_writable()?;
        let before = EnvValues::read_from(self.store)?;
        write_all_with_compensation(self.store, &before, &snapshot.values())?;
        self.broadcast();
        info!(backup = %snapshot.backup_file.display(), "environment restored");
        Ok(())
    }

    fn broadcast(&self) {
        if let Err(e) = self.store.broadcast() {
            warn!(error = %e, "could not notify running programs of the environment change");
        }
    }
}

/// Writes `target` variable by variable; `None` removes the variable.
///
/// When a write fails after earlier ones succeeded, those are set back to
/// their `previous` values before the error is returned.
///
/// # Errors
///
/// Returns the failing write's error directly when nothing had been written
/// yet, otherwise `MutationPartialFailure`.
pub fn write_all_with_compensation(
    store: &dyn EnvironmentStore,
    previous: &EnvValues,
    target: &EnvValues,
) -> GvsResult<()> {
    let mut written: Vec<&str> = Vec::with_capacity(MANAGED_VARIABLES.len());
    for name in MANAGED_VARIABLES {
        let result = match target.get(name) {
            Some(value) => store.write(name, value),
            None => store.remove(name),
        };
        let Err(source) = result else {
            written.push(name);
            continue;
        };
        if written.is_empty() {
            return Err(source);
        }

        let mut restored = true;
        for earlier in written.iter().rev() {
            let undo = match previous.get(earlier) {
                Some(value) => store.write(earlier, value),
                None => store.remove(earlier),
            };
            if let Err(e) = undo {
                warn!(variable = earlier, error = %e, "could not restore variable");
                restored = false;
            }
        }
        return Err(GvsError::MutationPartialFailure {
            variable: name.to_string(),
            restored,
            source: Box::new(source),
        });
    }
    Ok(())
}

/// Normalises a path entry for comparison: `\` separators, no trailing
/// separator, lowercase.
fn normalize_entry(entry: &str) -> String {
    entry
        .trim()
        .replace('/', "\\")
        .trim_end_matches('\\')
        .to_ascii_lowercase()
}

/// Builds the new search path: `new_bin` first, then every existing entry
/// that is not a toolchain `bin` directory.
///
/// Dropped entries:
/// - `<previous_root>\bin`
/// - `%GOROOT%\bin`
/// - anything under `managed_root`
#[must_use]
pub fn derive_search_path(
    existing: &str,
    previous_root: Option<&str>,
    new_bin: &Path,
    managed_root: &Path,
) -> String {
    let previous_bin = previous_root
        .filter(|root| !root.trim().is_empty())
        .map(|root| format!("{}\\bin", normalize_entry(root)));
    let goroot_reference = normalize_entry(GOROOT_BIN_REFERENCE);
    let managed_prefix = format!("{}\\", normalize_entry(&managed_root.to_string_lossy()));
    let new_bin = new_bin.to_string_lossy().into_owned();
    let new_bin_normalized = normalize_entry(&new_bin);

    let mut entries = vec![new_bin];
    for entry in existing.split(PATH_SEPARATOR) {
        let normalized = normalize_entry(entry);
        let is_toolchain_entry = normalized.is_empty()
            || normalized == new_bin_normalized
            || normalized == goroot_reference
            || previous_bin.as_deref() == Some(normalized.as_str())
            || normalized.starts_with(&managed_prefix);
        if !is_toolchain_entry {
            entries.push(entry.to_string());
        }
    }
    entries.join(&PATH_SEPARATOR.to_string())
}
