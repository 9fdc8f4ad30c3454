//! List command for the gvs CLI.
//!
//! Shows every Windows release in the catalog, newest first, and marks the
//! ones that are installed or active. The catalog is refreshed when the cache
//! is stale, or always with `--update`.
//!
//! ## Usage
//!
//! ```bash
//! gvs list
//! gvs list --update
//! ```
//!
//! ## Output Format
//!
//! ```text
//! go 1.22.1
//!     x64      70.12 MB   installed, current
//!     x86      62.40 MB
//! go 1.21.8
//!     x64      68.90 MB   installed
//! ```

use anyhow::{Context, Result};
use clap::Args;
use std::time::SystemTime;
use time::OffsetDateTime;
use time::macros::format_description;

use super::Workspace;
use crate::toolchain::catalog::sort_releases;
use crate::toolchain::{ReleaseDescriptor, VersionRegistry};

/// Arguments for the list command.
#[derive(Args)]
pub struct ListArgs {
    /// Refresh the catalog even if the cache is still fresh.
    #[clap(long)]
    pub update: bool,
}

/// Executes the list command.
///
/// # Errors
///
/// Returns an error if the catalog cannot be fetched and no cache exists, or
/// the registry cannot be read.
pub async fn execute(args: &ListArgs) -> Result<()> {
    let workspace = Workspace::open()?;
    let registry = workspace.registry()?;
    let cache = workspace.catalog_cache();
    let provider = workspace.http_catalog()?;

    let mut releases = cache
        .get(&provider, args.update)
        .await
        .context("Failed to load the release catalog")?
        .releases;
    sort_releases(&mut releases);

    if releases.is_empty() {
        println!("The catalog has no Windows releases.");
    }

    let mut last_version = None;
    for release in &releases {
        if last_version != Some(&release.version) {
            println!("go {}", release.version);
            last_version = Some(&release.version);
        }
        println!("{}", format_row(release, &registry));
    }

    let mut versions: Vec<_> = releases.iter().map(|r| &r.version).collect();
    versions.dedup();
    println!();
    println!(
        "Catalog updated: {}",
        cache
            .last_updated()
            .map_or_else(|| "never".to_string(), format_system_time)
    );
    println!(
        "{} versions available, {} installed.",
        versions.len(),
        registry.list().len()
    );
    Ok(())
}

/// One architecture row under a version heading.
fn format_row(release: &ReleaseDescriptor, registry: &VersionRegistry) -> String {
    let mut marks = Vec::new();
    if registry.get(&release.version, release.arch).is_some() {
        marks.push("installed");
    }
    if registry
        .current()
        .is_some_and(|c| c.version == release.version && c.arch == release.arch)
    {
        marks.push("current");
    }
    format!(
        "    {:<8} {:>10}   {}",
        release.arch.as_str(),
        release.display_size,
        marks.join(", ")
    )
    .trim_end()
    .to_string()
}

fn format_system_time(at: SystemTime) -> String {
    let format = format_description!("[year]-[month]-[day] [hour]:[minute]:[second] UTC");
    OffsetDateTime::from(at)
        .format(&format)
        .unwrap_or_else(|_| "<unknown>".to_owned())
}
