//! Use command for the gvs CLI.
//!
//! Activates an installed version by rewriting `GOROOT`, `GOARCH` and `Path`.
//!
//! ## Usage
//!
//! ```bash
//! gvs use 1.22.1
//! gvs use 1.22.1 --arch x86
//! ```

use anyhow::{Result, bail};
use clap::Args;

use super::{Workspace, activate, parse_arch};
use crate::env::ActivationPolicy;
use crate::errors::GvsError;
use crate::toolchain::{Architecture, GoVersion, InstalledVersion, VersionRegistry};

/// Arguments for the use command.
#[derive(Args)]
pub struct UseArgs {
    /// Installed version to activate (e.g., "1.22.1").
    pub version: String,

    /// Architecture of the install. Needed only when several are installed.
    #[clap(long)]
    pub arch: Option<String>,

    /// Skip running `go version` after activation.
    #[clap(long)]
    pub no_verify: bool,
}

/// Executes the use command.
///
/// # Errors
///
/// Returns an error if the version is not installed, the architecture is
/// ambiguous, or activation fails.
pub fn execute(args: &UseArgs) -> Result<()> {
    let version: GoVersion = args.version.parse()?;
    let arch = args
        .arch
        .as_deref()
        .map(|a| parse_arch(Some(a)))
        .transpose()?;

    let workspace = Workspace::open()?;
    let mut registry = workspace.registry()?;
    let install = select_install(&registry, &version, arch)?.clone();

    let verify = workspace.settings.verify_after_apply && !args.no_verify;
    activate(
        &workspace,
        &mut registry,
        &install,
        ActivationPolicy::Always,
        verify,
    )?;
    Ok(())
}

/// Picks the registered install to activate.
///
/// Without an explicit architecture a single install is taken as is; with
/// several, the host architecture wins.
///
/// # Errors
///
/// Returns `NotInstalled` when nothing matches, or an error listing the
/// candidates when the choice is ambiguous.
pub fn select_install<'r>(
    registry: &'r VersionRegistry,
    version: &GoVersion,
    arch: Option<Architecture>,
) -> Result<&'r InstalledVersion> {
    if let Some(arch) = arch {
        return registry
            .get(version, arch)
            .ok_or_else(|| GvsError::not_installed(format!("{version} ({arch})")).into());
    }

    let candidates = registry.architectures_of(version);
    match candidates.as_slice() {
        [] => Err(GvsError::not_installed(version.to_string()).into()),
        [only] => Ok(*only),
        several => {
            if let Ok(host) = Architecture::host()
                && let Some(found) = several.iter().find(|c| c.arch == host)
            {
                return Ok(*found);
            }
            let names: Vec<&str> = several.iter().map(|c| c.arch.as_str()).collect();
            bail!(
                "go {version} is installed for several architectures ({}); choose one with --arch",
                names.join(", ")
            )
        }
    }
}
