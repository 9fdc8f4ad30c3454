//! Command modules for the gvs CLI.
//!
//! ## Catalog Commands
//!
//! - [`list`] - Show available releases
//! - [`update`] - Refresh the release catalog
//!
//! ## Toolchain Commands
//!
//! - [`install`] - Install (and optionally activate) a version
//! - [`use_cmd`] - Activate an installed version
//! - [`installed`] - Show installed versions
//! - [`rollback`] - Restore the environment from the latest snapshot
//! - [`version`] - Display version information

pub mod install;
pub mod installed;
pub mod list;
pub mod rollback;
pub mod update;
pub mod use_cmd;
pub mod version;

use anyhow::{Context, Result};

use crate::config::Settings;
use crate::env::{ActivationPolicy, ApplyOutcome, BackupStore, GoVersionCheck, Mutator, open_store};
use crate::toolchain::{
    Architecture, CatalogCache, GvsPaths, HttpCatalog, InstalledVersion, VersionRegistry,
};

/// Resolved layout and settings shared by every command.
pub struct Workspace {
    pub paths: GvsPaths,
    pub settings: Settings,
}

impl Workspace {
    /// Resolves the base directory, creates its layout and loads settings.
    ///
    /// # Errors
    ///
    /// Returns an error if the layout cannot be created or settings are invalid.
    pub fn open() -> Result<Self> {
        let paths = GvsPaths::new()?;
        paths.ensure_directories()?;
        let settings = Settings::load(&paths)?;
        Ok(Self { paths, settings })
    }

    /// Loads the version registry.
    ///
    /// # Errors
    ///
    /// Returns an error if `config.json` exists but is unreadable.
    pub fn registry(&self) -> Result<VersionRegistry> {
        let file = self.paths.registry_file();
        VersionRegistry::load(&file)
            .with_context(|| format!("Failed to load version registry {}", file.display()))
    }

    #[must_use]
    pub fn catalog_cache(&self) -> CatalogCache {
        CatalogCache::new(
            self.paths.catalog_cache_file(),
            self.settings.refresh_interval(),
        )
    }

    /// HTTP catalog for the configured server.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn http_catalog(&self) -> Result<HttpCatalog> {
        Ok(HttpCatalog::new(
            self.settings.dist_server(),
            self.settings.catalog_timeout(),
        )?)
    }

    #[must_use]
    pub fn backups(&self) -> BackupStore {
        BackupStore::new(self.paths.backups.clone())
    }
}

/// Normalises `--arch`, defaulting to the host.
///
/// # Errors
///
/// Returns `UnsupportedArchitecture` for unknown names.
pub fn parse_arch(value: Option<&str>) -> Result<Architecture> {
    Ok(match value {
        Some(value) => value.parse()?,
        None => Architecture::host()?,
    })
}

/// Applies `install` to the machine environment and updates the current pointer.
///
/// # Errors
///
/// Returns an error if the store cannot be opened or activation fails.
pub fn activate(
    workspace: &Workspace,
    registry: &mut VersionRegistry,
    install: &InstalledVersion,
    policy: ActivationPolicy<'_>,
    verify: bool,
) -> Result<ApplyOutcome> {
    if matches!(policy, ActivationPolicy::Never) {
        return Ok(ApplyOutcome::Skipped);
    }

    let store = open_store(workspace.settings.store)?;
    let backups = workspace.backups();
    let checker = GoVersionCheck;
    let mut mutator = Mutator::new(store.as_ref(), &backups, workspace.paths.versions.clone());
    if verify {
        mutator = mutator.with_verifier(&checker);
    }

    let outcome = mutator
        .apply(install, policy)
        .with_context(|| format!("Failed to activate go {} ({})", install.version, install.arch))?;

    if outcome == ApplyOutcome::Applied {
        registry.set_current(&install.version, install.arch)?;
        registry.save()?;
        println!("go {} ({}) is now active.", install.version, install.arch);
        println!("  GOROOT = {}", install.path.display());
        println!("  GOARCH = {}", install.arch.go_name());
        println!();
        println!("Restart open terminals and editors to pick up the new environment.");
    }
    Ok(outcome)
}
