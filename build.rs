// SPDX-License-Identifier: GPL-3.0-only

use std::process::Command;

fn main() {
    println!("cargo::rerun-if-changed=.git/HEAD");
    println!("cargo::rerun-if-changed=.git/refs/tags");
    println!("cargo::rerun-if-env-changed=VP8_CAPTURE_VERSION");

    // Packagers building from a tarball set the version explicitly
    let version = match std::env::var("VP8_CAPTURE_VERSION") {
        Ok(v) if !v.is_empty() => v,
        _ => git_version().unwrap_or_else(|| env!("CARGO_PKG_VERSION").to_string()),
    };

    println!("cargo::rustc-env=GIT_VERSION={}", version);
}

/// `git describe` output without the leading `v`:
/// - "0.1.0" when HEAD is exactly at a tag
/// - "0.1.0+5.abcdef1" when HEAD is 5 commits after it
/// - "abcdef1" when there are no tags at all
fn git_version() -> Option<String> {
    let described = run_git(&["describe", "--tags", "--always", "--match", "v*"])?;
    let described = described.strip_prefix('v').unwrap_or(&described);

    let parts: Vec<&str> = described.rsplitn(3, '-').collect();
    match parts.as_slice() {
        [hash, commits, base] if hash.starts_with('g') => {
            Some(format!("{}+{}.{}", base, commits, &hash[1..]))
        }
        _ => Some(described.to_string()),
    }
}

fn run_git(args: &[&str]) -> Option<String> {
    let output = Command::new("git").args(args).output().ok()?;
    if output.status.success() {
        Some(String::from_utf8_lossy(&output.stdout).trim().to_string())
    } else {
        None
    }
}
