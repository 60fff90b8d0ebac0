//! # podscope - kernel-level diagnostics for a single container
//!
//! podscope attaches kprobes to a handful of networking and file-system
//! kernel functions, keeps only the events raised by processes inside one
//! container's cgroup, and turns them into a latency/error report.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │          Kernel programs (prebuilt podtrace.bpf.o)           │
//! │  kprobe/kretprobe: tcp_v4_connect, tcp_sendmsg, tcp_recvmsg, │
//! │                    vfs_write, vfs_fsync                      │
//! └──────────────────────────┬───────────────────────────────────┘
//!                            │ perf event array "events"
//!                            ▼
//! ┌──────────────────────────────────────────────────────────────┐
//! │  capture thread (EventPipeline)                              │
//! │   decode → process name → cgroup filter → bounded queue(s)   │
//! └──────────────────────────┬───────────────────────────────────┘
//!                            │ tokio mpsc (capacity 100)
//!                            ▼
//! ┌──────────────────────────────────────────────────────────────┐
//! │  session loop (tokio::select!)                               │
//! │   events → Diagnostician, tick/deadline → report, signal     │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Structure
//!
//! - [`capture`]: artifact loading, transactional probe attachment, perf
//!   buffer reading, record decoding and the capture pipeline
//! - [`process_names`]: cached PID → process name lookup
//! - [`cgroup`]: cgroup membership filter
//! - [`workload`]: resolving a target to its container cgroup
//! - [`analysis`]: the diagnostician, statistics, patterns and report model
//! - [`session`]: live and batch control loops
//! - [`cli`], [`preflight`]: argument parsing and startup checks
//! - [`domain`]: core types (`Event`, `Category`, `Pid`) and errors
//!
//! ## Operational Modes
//!
//! 1. **Live** (default): the run-to-date report is re-rendered every
//!    `--interval`; Ctrl+C prints a final report.
//! 2. **Batch** (`--diagnose 30s`): one report after the given duration.

pub mod analysis;
pub mod capture;
pub mod cgroup;
pub mod cli;
pub mod domain;
pub mod preflight;
pub mod process_names;
pub mod session;
pub mod workload;
