//! Version command for the gvs CLI.
//!
//! Prints the gvs version. With the global `--verbose` flag it also shows
//! the commit it was built from and the host it runs on.

use anyhow::Result;
use clap::Args;

use crate::toolchain::Architecture;

/// Arguments for the version command.
#[derive(Args)]
pub struct VersionArgs {}

/// Executes the version command.
#[allow(clippy::unnecessary_wraps)]
pub fn execute(_args: &VersionArgs, verbose: bool) -> Result<()> {
    println!("gvs {}", env!("CARGO_PKG_VERSION"));
    if verbose {
        println!();
        println!("Build Information:");
        println!("  Commit:    {}", env!("GVS_GIT_COMMIT"));
        println!("  Platform:  {}", platform_string());
        println!("  Go arch:   {}", host_go_arch());
    }
    Ok(())
}

fn platform_string() -> String {
    format!("{}-{}", std::env::consts::OS, std::env::consts::ARCH)
}

fn host_go_arch() -> &'static str {
    Architecture::host().map_or("unsupported", Architecture::go_name)
}
