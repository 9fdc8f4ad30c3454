//! Build script for the gvs CLI.
//!
//! Embeds the short git commit so `gvs version --verbose` can report it.

use std::process::Command;

fn main() {
    println!("cargo:rustc-env=GVS_GIT_COMMIT={}", short_commit());

    if let Some(top) = git(&["rev-parse", "--show-toplevel"]) {
        println!("cargo:rerun-if-changed={top}/.git/HEAD");
    }
}

fn short_commit() -> String {
    git(&["rev-parse", "--short", "HEAD"]).unwrap_or_else(|| "unknown".to_string())
}

/// Runs a git subcommand and returns its trimmed stdout when it succeeds.
fn git(args: &[&str]) -> Option<String> {
    let output = Command::new("git").args(args).output().ok()?;
    if !output.status.success() {
        return None;
    }
    let text = String::from_utf8_lossy(&output.stdout).trim().to_string();
    (!text.is_empty()).then_some(text)
}
