#![warn(clippy::pedantic)]

//! # gvs: Go version switcher for Windows
//!
//! `gvs` installs official Go toolchains side by side and switches the
//! machine-wide `GOROOT`, `GOARCH` and `Path` between them. Every change is
//! preceded by a snapshot of the previous values, so it can be rolled back.
//!
//! ## Subcommands
//!
//! - `list` - Show available releases
//! - `update` - Refresh the release catalog
//! - `install` - Install a version and optionally activate it
//! - `use` - Activate an installed version
//! - `rollback` - Restore the environment from the latest snapshot
//! - `installed` - Show installed versions
//! - `version` - Display version information
//!
//! ## Examples
//!
//! Install and activate a version:
//! ```bash
//! gvs install 1.22.1 --activate always
//! ```
//!
//! Switch back to an older install:
//! ```bash
//! gvs use 1.21.0
//! ```
//!
//! Undo the last switch:
//! ```bash
//! gvs rollback
//! ```

mod commands;
mod config;
mod env;
mod errors;
mod logging;
#[cfg(test)]
mod test_support;
mod toolchain;

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::{install, installed, list, rollback, update, use_cmd, version};
use errors::GvsError;

/// Go toolchain installer and version switcher.
#[derive(Parser)]
#[command(
    name = "gvs",
    author,
    version,
    about = "Install Go toolchains side by side and switch between them",
    long_about = "The 'gvs' command downloads official Go releases for Windows, keeps several \
    of them installed at once, and switches the machine-wide GOROOT, GOARCH and Path between \
    them. Changing the environment requires an elevated (administrator) prompt.",
    after_help = "\
ENVIRONMENT VARIABLES:
    GVS_HOME                Base directory (default: <gvs executable dir>/data)
    GVS_DIST_SERVER         Release server URL (default: https://go.dev)
    GVS_DOWNLOAD_TIMEOUT    Download timeout in seconds (default: 300)
    GVS_STORE               Environment store: native or shell (default: native)
    GVS_LOG_JSON            Emit diagnostics as JSON lines
    RUST_LOG                Diagnostic filter (overrides --verbose)"
)]
pub struct Cli {
    /// Show diagnostic output.
    #[clap(short = 'v', long = "verbose", global = true, action = clap::ArgAction::SetTrue)]
    pub verbose: bool,

    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands for the gvs CLI.
#[derive(Subcommand)]
pub enum Commands {
    /// List available Go releases.
    ///
    /// Reads the cached catalog, refreshing it when it is older than the
    /// refresh interval, and marks installed and active versions.
    List(list::ListArgs),

    /// Refresh the release catalog.
    Update(update::UpdateArgs),

    /// Install a Go version.
    ///
    /// Downloads the Windows archive, verifies its SHA-256 digest, unpacks it
    /// into go-version/<version>-<arch> and registers it.
    Install(install::InstallArgs),

    /// Activate an installed Go version.
    ///
    /// Snapshots the current environment, then rewrites GOROOT, GOARCH and
    /// Path. Verification runs `go version` and undoes the change on failure.
    Use(use_cmd::UseArgs),

    /// Restore the environment from the latest snapshot.
    Rollback(rollback::RollbackArgs),

    /// List installed Go versions.
    Installed(installed::InstalledArgs),

    /// Display version information.
    ///
    /// Use -v or --verbose for the commit and platform.
    Version(version::VersionArgs),
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        let exit_code = handle_error(&e);
        std::process::exit(exit_code);
    }
}

/// Prints an error and returns the exit code.
///
/// Permission problems get a hint about elevation.
fn handle_error(e: &anyhow::Error) -> i32 {
    eprintln!("Error: {e:?}");
    if e.chain()
        .any(|cause| matches!(cause.downcast_ref::<GvsError>(), Some(GvsError::PermissionDenied { .. })))
    {
        eprintln!();
        eprintln!("Run gvs from an administrator prompt to change machine environment variables.");
    }
    1
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    match cli.command {
        Commands::List(args) => list::execute(&args).await,
        Commands::Update(args) => update::execute(&args).await,
        Commands::Install(args) => install::execute(&args).await,
        Commands::Use(args) => use_cmd::execute(&args),
        Commands::Rollback(args) => rollback::execute(&args),
        Commands::Installed(args) => installed::execute(&args),
        Commands::Version(args) => version::execute(&args, cli.verbose),
    }
}
