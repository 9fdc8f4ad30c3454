//! Rollback command for the gvs CLI.
//!
//! Writes the newest valid environment snapshot back to the machine
//! environment and points the registry's current version at whichever
//! install the restored `GOROOT` names.

use anyhow::{Context, Result};
use clap::Args;
use std::path::Path;

use super::Workspace;
use crate::env::{Mutator, open_store};

/// Arguments for the rollback command.
#[derive(Args)]
pub struct RollbackArgs {}

/// Executes the rollback command.
///
/// # Errors
///
/// Returns an error if there is no valid snapshot, the environment cannot be
/// written, or the registry cannot be saved.
pub fn execute(_args: &RollbackArgs) -> Result<()> {
    let workspace = Workspace::open()?;
    let backups = workspace.backups();
    let snapshot = backups.latest()?;
    println!("Restoring environment from {}", snapshot.backup_file.display());

    let store = open_store(workspace.settings.store)?;
    let mutator = Mutator::new(store.as_ref(), &backups, workspace.paths.versions.clone());
    mutator
        .restore(&snapshot)
        .context("Failed to restore the environment")?;

    let mut registry = workspace.registry()?;
    registry.repoint_current(Path::new(&snapshot.install_root));
    registry.save()?;

    println!("  GOROOT = {}", snapshot.install_root);
    println!("  GOARCH = {}", snapshot.architecture);
    match registry.current() {
        Some(current) => println!("Active version: go {} ({})", current.version, current.arch),
        None => println!("The restored GOROOT is not managed by gvs."),
    }
    println!();
    println!("Restart open terminals and editors to pick up the new environment.");
    Ok(())
}
