//! Pre-flight checks for podscope
//!
//! Validates system requirements before attempting to load the kernel
//! programs, with actionable messages when they aren't met.

#![allow(unsafe_code)] // geteuid() requires unsafe

use anyhow::{bail, Context, Result};
use std::path::Path;

/// Perf event arrays and kretprobes on the instrumented symbols need 4.9+
const MIN_KERNEL_VERSION: (u32, u32) = (4, 9);

/// Run all pre-flight checks before loading
pub fn run_preflight_checks() -> Result<()> {
    check_privileges()?;
    check_kernel_version()?;
    Ok(())
}

fn check_privileges() -> Result<()> {
    // SAFETY: geteuid has no preconditions and cannot fail.
    if unsafe { libc::geteuid() } == 0 {
        return Ok(());
    }

    bail!(
        "Permission denied: podscope requires root privileges to attach kernel probes.\n\n\
         Run with: sudo podscope ..."
    );
}

fn check_kernel_version() -> Result<()> {
    let version_str = std::fs::read_to_string("/proc/version")
        .context("Failed to read kernel version from /proc/version")?;

    // "Linux version 5.15.0-generic ..."
    let release = version_str.split_whitespace().nth(2).unwrap_or("unknown");

    let Some((major, minor)) = parse_release(release) else {
        // Can't parse, assume it's fine
        return Ok(());
    };

    if (major, minor) < MIN_KERNEL_VERSION {
        bail!(
            "Kernel version {major}.{minor} is too old.\n\n\
             podscope requires Linux {}.{} or newer for kprobes and perf event arrays.\n\
             Current kernel: {release}",
            MIN_KERNEL_VERSION.0,
            MIN_KERNEL_VERSION.1,
        );
    }

    Ok(())
}

/// `(major, minor)` of a release string such as `6.1.0-arch1-1`
fn parse_release(release: &str) -> Option<(u32, u32)> {
    let mut parts = release.split('.');
    let major = parts.next()?.parse().ok()?;
    let minor = parts
        .next()?
        .chars()
        .take_while(char::is_ascii_digit)
        .collect::<String>()
        .parse()
        .ok()?;
    Some((major, minor))
}

/// Check that an explicitly given cgroup scope exists
pub fn check_cgroup_path(path: &Path) -> Result<()> {
    let absolute = if path.starts_with("/sys/fs/cgroup") {
        path.to_path_buf()
    } else {
        Path::new("/sys/fs/cgroup").join(path.strip_prefix("/").unwrap_or(path))
    };
    if !absolute.is_dir() {
        bail!(
            "Cgroup not found: {}\n\n\
             Check the path with: ls /sys/fs/cgroup",
            absolute.display()
        );
    }
    Ok(())
}
