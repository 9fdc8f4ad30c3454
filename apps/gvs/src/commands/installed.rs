//! Installed command for the gvs CLI.
//!
//! Lists registered installs. `--prune` unregisters the ones whose directory
//! no longer passes the integrity check; nothing is deleted from disk.
//!
//! When the machine environment can be read, `GOROOT` and `GOARCH` are shown
//! as well, with a warning if `GOROOT` is not the current install.
//!
//! ## Output Format
//!
//! ```text
//! Installed Go versions:
//!
//! * 1.22.1  x64    C:\gvs\data\go-version\1.22.1-x64
//!   1.21.0  x86    C:\gvs\data\go-version\1.21.0-x86  (damaged)
//!
//! Machine environment:
//!   GOROOT = C:\gvs\data\go-version\1.22.1-x64
//!   GOARCH = amd64
//! ```

use anyhow::Result;
use clap::Args;
use std::path::Path;
use tracing::debug;

use super::Workspace;
use crate::env::open_store;
use crate::env::store::{GOROOT, PATH, managed_listing};
use crate::toolchain::paths::path_starts_with_ignore_case;
use crate::toolchain::{Architecture, GoVersion, InstalledVersion, VersionRegistry};

/// Arguments for the installed command.
#[derive(Args)]
pub struct InstalledArgs {
    /// Unregister damaged installs.
    #[clap(long)]
    pub prune: bool,
}

/// Executes the installed command.
///
/// # Errors
///
/// Returns an error if the registry cannot be read or, with `--prune`, saved.
pub fn execute(args: &InstalledArgs) -> Result<()> {
    let workspace = Workspace::open()?;
    let mut registry = workspace.registry()?;

    if args.prune {
        let pruned = prune_damaged(&mut registry);
        if !pruned.is_empty() {
            registry.save()?;
        }
        for entry in &pruned {
            println!("Unregistered damaged install {} ({})", entry.key(), entry.path.display());
        }
    }

    let entries = registry.list();
    if entries.is_empty() {
        println!("No Go versions installed.");
        println!();
        println!("Run 'gvs list' to see available versions and 'gvs install <version>' to install one.");
        return Ok(());
    }

    println!("Installed Go versions:");
    println!();
    for entry in entries {
        println!("{}", format_entry(entry, &registry));
    }

    if registry.current().is_none() {
        println!();
        println!("No version is active. Run 'gvs use <version>' to activate one.");
    }

    if let Some(variables) = machine_environment(&workspace) {
        println!();
        println!("Machine environment:");
        for line in format_environment(&variables, registry.current()) {
            println!("{line}");
        }
    }
    Ok(())
}

/// Reads the managed variables, or `None` where no store is available.
fn machine_environment(workspace: &Workspace) -> Option<Vec<(String, String)>> {
    let listing = open_store(workspace.settings.store)
        .and_then(|store| managed_listing(store.as_ref()));
    match listing {
        Ok(variables) if !variables.is_empty() => Some(variables),
        Ok(_) => None,
        Err(e) => {
            debug!(error = %e, "machine environment unavailable");
            None
        }
    }
}

/// `Path` is left out; it is too long to be useful here.
fn format_environment(
    variables: &[(String, String)],
    current: Option<&InstalledVersion>,
) -> Vec<String> {
    let mut lines: Vec<String> = variables
        .iter()
        .filter(|(name, _)| !name.eq_ignore_ascii_case(PATH))
        .map(|(name, value)| format!("  {} = {value}", name.to_ascii_uppercase()))
        .collect();

    let goroot = variables
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(GOROOT))
        .map(|(_, value)| value.as_str());
    if let (Some(goroot), Some(current)) = (goroot, current)
        && !same_location(Path::new(goroot), &current.path)
    {
        lines.push(format!(
            "  GOROOT is not the current install ({}). Run 'gvs rollback' or 'gvs use {} --arch {}'.",
            current.key(),
            current.version,
            current.arch
        ));
    }
    lines
}

fn same_location(a: &Path, b: &Path) -> bool {
    path_starts_with_ignore_case(a, b) && path_starts_with_ignore_case(b, a)
}

/// Removes every install that fails the integrity check and returns them.
fn prune_damaged(registry: &mut VersionRegistry) -> Vec<InstalledVersion> {
    let damaged: Vec<(GoVersion, Architecture)> = registry
        .list()
        .into_iter()
        .filter(|entry| !entry.is_valid())
        .map(|entry| (entry.version.clone(), entry.arch))
        .collect();
    damaged
        .iter()
        .filter_map(|(version, arch)| registry.remove_version(version, *arch))
        .collect()
}

fn format_entry(entry: &InstalledVersion, registry: &VersionRegistry) -> String {
    let is_current = registry.current().is_some_and(|c| c.key() == entry.key());
    let marker = if is_current { "*" } else { " " };
    let damaged = if entry.is_valid() { "" } else { "  (damaged)" };
    format!(
        "{marker} {:<8} {:<6} {}{damaged}",
        entry.version.to_string(),
        entry.arch.as_str(),
        entry.path.display()
    )
}
