//! # Shared Wire Contract (kernel ↔ userspace)
//!
//! Layout constants for the records the pre-built instrumentation artifact
//! writes into its `events` perf buffer, plus the fixed table of probe
//! programs it exposes.
//!
//! ## Record Layout
//!
//! All fields are little-endian and packed back to back:
//!
//! ```text
//! offset  size  field
//!      0     8  timestamp_ns   (bpf_ktime_get_ns, CLOCK_MONOTONIC)
//!      8     4  pid            (TGID)
//!     12     4  category tag   (see CATEGORY_* below)
//!     16     8  latency_ns
//!     24     4  error          (signed, 0 = success, -errno otherwise)
//!     28    64  target         (NUL padded)
//!     92    64  details        (NUL padded)
//! ```
//!
//! The kernel-side struct may carry trailing alignment padding; anything past
//! [`RECORD_LEN`] is ignored by userspace.

#![no_std]

// ============================================================================
// Category Tags
// ============================================================================

/// DNS lookup latency (target = queried host)
pub const CATEGORY_DNS: u32 = 0;

/// `tcp_v4_connect` latency (target = `ip:port`)
pub const CATEGORY_CONNECT: u32 = 1;

/// `tcp_sendmsg` latency
pub const CATEGORY_TCP_SEND: u32 = 2;

/// `tcp_recvmsg` latency, used as an RTT estimate
pub const CATEGORY_TCP_RECV: u32 = 3;

/// `vfs_write` latency (target = file name)
pub const CATEGORY_WRITE: u32 = 4;

/// `vfs_fsync` latency (target = file name)
pub const CATEGORY_FSYNC: u32 = 5;

/// Scheduler block time
pub const CATEGORY_SCHED_SWITCH: u32 = 6;

/// `vfs_read` latency (target = file name)
pub const CATEGORY_READ: u32 = 7;

// ============================================================================
// Record Layout
// ============================================================================

pub const OFFSET_TIMESTAMP: usize = 0;
pub const OFFSET_PID: usize = 8;
pub const OFFSET_CATEGORY: usize = 12;
pub const OFFSET_LATENCY: usize = 16;
pub const OFFSET_ERROR: usize = 24;
pub const OFFSET_TARGET: usize = 28;
pub const OFFSET_DETAILS: usize = OFFSET_TARGET + TARGET_LEN;

/// Size of the NUL padded `target` field
pub const TARGET_LEN: usize = 64;

/// Size of the NUL padded `details` field
pub const DETAILS_LEN: usize = 64;

/// Minimum number of bytes a sample must carry to be decodable
pub const RECORD_LEN: usize = OFFSET_DETAILS + DETAILS_LEN;

// ============================================================================
// Artifact Contract
// ============================================================================

/// Name of the shared perf event array inside the artifact
pub const EVENTS_MAP: &str = "events";

/// Entry/return probe pairs: (program name, kernel symbol).
///
/// Order matters: attachment happens in this order and rollback runs in
/// reverse.
pub const PROBES: [(&str, &str); 10] = [
    ("kprobe_tcp_connect", "tcp_v4_connect"),
    ("kretprobe_tcp_connect", "tcp_v4_connect"),
    ("kprobe_tcp_sendmsg", "tcp_sendmsg"),
    ("kretprobe_tcp_sendmsg", "tcp_sendmsg"),
    ("kprobe_tcp_recvmsg", "tcp_recvmsg"),
    ("kretprobe_tcp_recvmsg", "tcp_recvmsg"),
    ("kprobe_vfs_write", "vfs_write"),
    ("kretprobe_vfs_write", "vfs_write"),
    ("kprobe_vfs_fsync", "vfs_fsync"),
    ("kretprobe_vfs_fsync", "vfs_fsync"),
];
