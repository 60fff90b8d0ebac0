//! Process resource preparation before loading eBPF
//!
//! Both steps are best-effort: every failure is logged and loading proceeds.
//! The kernel rejects the load later if the limits really are insufficient.

#![allow(unsafe_code)] // prctl/getrlimit/setrlimit require unsafe

use log::{info, warn};
use std::io;

/// Locked-memory budget requested for maps and perf buffers
pub const MEMLOCK_TARGET: u64 = 512 * 1024 * 1024;

/// Mark the process dumpable so `/proc/<pid>` entries stay readable.
pub fn relax_dumpable() {
    // SAFETY: PR_SET_DUMPABLE takes plain integer arguments.
    let rc = unsafe { libc::prctl(libc::PR_SET_DUMPABLE, 1, 0, 0, 0) };
    if rc != 0 {
        warn!("failed to set dumpable flag: {}", io::Error::last_os_error());
    }
}

/// Interface over `RLIMIT_MEMLOCK` so the fallback chain can be tested.
pub trait MemlockLimit {
    fn get(&self) -> io::Result<(u64, u64)>;
    fn set(&mut self, soft: u64, hard: u64) -> io::Result<()>;
}

/// Which step of the chain ended up applying
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemlockOutcome {
    AlreadySufficient,
    Raised,
    RaisedToHardCap,
    Unlimited,
    Failed,
}

/// Negotiate `RLIMIT_MEMLOCK` up to [`MEMLOCK_TARGET`].
///
/// 1. Raise soft (and hard, if below) to the target.
/// 2. If rejected, raise soft to the existing hard cap.
/// 3. If that is rejected too, remove the limit entirely.
pub fn negotiate_memlock(limit: &mut impl MemlockLimit) -> MemlockOutcome {
    let (soft, hard) = match limit.get() {
        Ok(current) => current,
        Err(e) => {
            warn!("failed to read memlock limit: {e}");
            return remove_memlock(limit);
        }
    };

    if soft >= MEMLOCK_TARGET {
        return MemlockOutcome::AlreadySufficient;
    }

    match limit.set(MEMLOCK_TARGET, hard.max(MEMLOCK_TARGET)) {
        Ok(()) => {
            info!("memlock limit raised to {} MiB", MEMLOCK_TARGET >> 20);
            return MemlockOutcome::Raised;
        }
        Err(e) => warn!("failed to raise memlock limit to target: {e}"),
    }

    match limit.set(hard, hard) {
        Ok(()) if hard >= MEMLOCK_TARGET => return MemlockOutcome::RaisedToHardCap,
        Ok(()) => warn!("memlock hard cap {hard} is below target"),
        Err(e) => warn!("failed to raise memlock soft limit to hard cap: {e}"),
    }

    remove_memlock(limit)
}

fn remove_memlock(limit: &mut impl MemlockLimit) -> MemlockOutcome {
    match limit.set(libc::RLIM_INFINITY, libc::RLIM_INFINITY) {
        Ok(()) => MemlockOutcome::Unlimited,
        Err(e) => {
            warn!("failed to remove memlock limit: {e}");
            MemlockOutcome::Failed
        }
    }
}

/// The real process limit
pub struct ProcessMemlock;

impl MemlockLimit for ProcessMemlock {
    fn get(&self) -> io::Result<(u64, u64)> {
        let mut rlim = libc::rlimit { rlim_cur: 0, rlim_max: 0 };
        // SAFETY: rlim is a valid, writable rlimit struct.
        if unsafe { libc::getrlimit(libc::RLIMIT_MEMLOCK, &mut rlim) } != 0 {
            return Err(io::Error::last_os_error());
        }
        Ok((rlim.rlim_cur, rlim.rlim_max))
    }

    fn set(&mut self, soft: u64, hard: u64) -> io::Result<()> {
        let rlim = libc::rlimit { rlim_cur: soft, rlim_max: hard };
        // SAFETY: rlim is a valid rlimit struct that outlives the call.
        if unsafe { libc::setrlimit(libc::RLIMIT_MEMLOCK, &rlim) } != 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }
}
