//! Install command for the gvs CLI.
//!
//! Downloads, verifies and unpacks one Go release into
//! `go-version/<version>-<arch>`, registers it, then activates it according
//! to `--activate`.
//!
//! ## Usage
//!
//! ```bash
//! gvs install 1.22.1                     # host architecture, asks before activating
//! gvs install 1.22.1 --arch x86 --activate never
//! gvs install 1.21.0 --activate always --no-verify
//! ```
//!
//! Ctrl-C cancels an in-flight download or extraction. The target directory
//! and the registry are left as they were.

use anyhow::{Context, Result};
use clap::{Args, ValueEnum};
use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use super::{Workspace, activate, parse_arch};
use crate::env::{ActivationPolicy, ApplyOutcome};
use crate::toolchain::cancel::cancel_pair;
use crate::toolchain::catalog::find;
use crate::toolchain::download::{format_bytes, format_speed};
use crate::toolchain::{
    Architecture, Downloader, GoVersion, InstallOutcome, Installer, ProgressCallback,
    ProgressEvent, VersionRegistry,
};

/// When to activate the installed version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ActivateMode {
    /// Activate without asking.
    Always,
    /// Only install.
    Never,
    /// Ask on the terminal.
    Ask,
}

/// Arguments for the install command.
#[derive(Args)]
pub struct InstallArgs {
    /// Version to install (e.g., "1.22.1").
    pub version: String,

    /// Target architecture: x86, x64, arm or arm64. Defaults to the host.
    #[clap(long)]
    pub arch: Option<String>,

    /// Whether to activate the version after installing it.
    #[clap(long, value_enum, default_value_t = ActivateMode::Ask)]
    pub activate: ActivateMode,

    /// Skip running `go version` after activation.
    #[clap(long)]
    pub no_verify: bool,
}

/// Executes the install command.
///
/// # Process
///
/// 1. Parse the version and architecture
/// 2. Reuse a registered, intact install if there is one
/// 3. Otherwise load the catalog and run the install pipeline
/// 4. Activate according to `--activate`
///
/// # Errors
///
/// Returns an error if:
/// - The version or architecture is invalid
/// - The catalog cannot be loaded or has no matching release
/// - Download, checksum or extraction fails, or the user cancelled
/// - Activation fails
pub async fn execute(args: &InstallArgs) -> Result<()> {
    let version: GoVersion = args.version.parse()?;
    let arch = parse_arch(args.arch.as_deref())?;
    let workspace = Workspace::open()?;
    let mut registry = workspace.registry()?;

    let existing = registry.get(&version, arch).filter(|v| v.is_valid()).cloned();
    let outcome = match existing {
        Some(existing) => InstallOutcome::AlreadyInstalled(existing),
        None => run_pipeline(&workspace, &mut registry, &version, arch).await?,
    };

    let installed = outcome.installed().clone();
    match outcome {
        InstallOutcome::Installed(_) => println!(
            "Installed go {version} ({arch}) to {}",
            installed.path.display()
        ),
        InstallOutcome::AlreadyInstalled(_) => println!(
            "go {version} ({arch}) is already installed at {}",
            installed.path.display()
        ),
    }

    let mut confirm = |path: &Path| prompt_activation(&version, path);
    let policy = match args.activate {
        ActivateMode::Always => ActivationPolicy::Always,
        ActivateMode::Never => ActivationPolicy::Never,
        ActivateMode::Ask => ActivationPolicy::Ask(&mut confirm),
    };
    let verify = workspace.settings.verify_after_apply && !args.no_verify;

    if activate(&workspace, &mut registry, &installed, policy, verify)? == ApplyOutcome::Skipped {
        println!("Run 'gvs use {version} --arch {arch}' to activate it later.");
    }
    Ok(())
}

async fn run_pipeline(
    workspace: &Workspace,
    registry: &mut VersionRegistry,
    version: &GoVersion,
    arch: Architecture,
) -> Result<InstallOutcome> {
    let cache = workspace.catalog_cache();
    let provider = workspace.http_catalog()?;

    println!("Loading release catalog...");
    let releases = cache
        .get_for(&provider, version, arch)
        .await
        .context("Failed to load the release catalog")?;
    if let Some(release) = find(&releases, version, arch) {
        println!(
            "Installing go {version} ({arch}, {})...",
            release.display_size
        );
    }

    let downloader = Downloader::new(workspace.settings.download_timeout())?;
    let (handle, token) = cancel_pair();
    let watcher = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            handle.cancel();
        }
    });

    let installer = Installer {
        paths: &workspace.paths,
        downloader: &downloader,
        cancel: token,
        progress: Some(progress_printer()),
    };
    let result = installer.install(&releases, registry, version, arch).await;
    watcher.abort();

    result.with_context(|| format!("Failed to install go {version} ({arch})"))
}

fn progress_printer() -> ProgressCallback {
    Arc::new(|event: ProgressEvent| match event {
        ProgressEvent::Started { total } => {
            let size = total.map_or_else(|| "unknown size".to_string(), format_bytes);
            println!("Downloading ({size})...");
        }
        ProgressEvent::Progress {
            downloaded,
            total,
            speed,
        } => {
            let total = total.map_or_else(|| "?".to_string(), format_bytes);
            print!(
                "\r  {} / {total}  {}        ",
                format_bytes(downloaded),
                format_speed(speed)
            );
            std::io::stdout().flush().ok();
        }
        ProgressEvent::Completed { bytes } => {
            println!("\r  {} downloaded.                    ", format_bytes(bytes));
        }
    })
}

fn prompt_activation(version: &GoVersion, path: &Path) -> bool {
    print!("Activate go {version} from {}? [y/N] ", path.display());
    std::io::stdout().flush().ok();
    let mut answer = String::new();
    if std::io::stdin().read_line(&mut answer).is_err() {
        return false;
    }
    is_yes(&answer)
}

fn is_yes(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}
