//! Update command for the gvs CLI.
//!
//! Forces a catalog refresh from the distribution server.

use anyhow::{Context, Result};
use clap::Args;

use super::Workspace;

/// Arguments for the update command.
#[derive(Args)]
pub struct UpdateArgs {}

/// Executes the update command.
///
/// A failed refresh that falls back to the cached copy still succeeds; the
/// fallback is logged at warn level.
///
/// # Errors
///
/// Returns an error if the refresh fails and there is no cache.
pub async fn execute(_args: &UpdateArgs) -> Result<()> {
    let workspace = Workspace::open()?;
    let cache = workspace.catalog_cache();
    let provider = workspace.http_catalog()?;

    println!("Refreshing release catalog from {}...", workspace.settings.dist_server());
    let releases = cache
        .get(&provider, true)
        .await
        .context("Failed to refresh the release catalog")?
        .releases;

    println!(
        "{} Windows releases cached in {}",
        releases.len(),
        cache.path().display()
    );
    Ok(())
}
