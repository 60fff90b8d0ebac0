//! Structured error types for podscope
//!
//! Using thiserror for automatic Display implementation and error chaining.

use std::path::PathBuf;
use thiserror::Error;

/// Fatal instrumentation setup failures. None of these are retried.
#[derive(Error, Debug)]
pub enum TracerError {
    #[error(
        "failed to load eBPF program: none of {searched:?} could be read \
         (make sure to run 'make build' first)"
    )]
    ArtifactNotFound { searched: Vec<PathBuf> },

    #[error("failed to create eBPF collection: {0}")]
    CollectionFailed(#[from] aya::EbpfError),

    #[error("failed to attach {program} to {symbol}: {reason}")]
    ProbeAttachFailed { program: String, symbol: String, reason: String },

    #[error("{0} map not found in eBPF collection")]
    MapNotFound(&'static str),

    #[error("failed to open perf event reader: {0}")]
    ReaderOpenFailed(String),
}

/// Errors surfaced by a record source while capturing.
#[derive(Error, Debug)]
pub enum ReadError {
    /// The reader was closed; the capture loop exits quietly.
    #[error("perf reader closed")]
    Closed,

    #[error("error reading perf buffer: {0}")]
    Buffer(String),
}

/// Workload to container resolution failures.
#[derive(Error, Debug)]
pub enum ResolveError {
    #[error("workload {namespace}/{name} has no containers")]
    NoContainers { namespace: String, name: String },

    #[error("invalid container ID format: {0}")]
    MalformedContainerId(String),

    #[error("cgroup path not found for container {0}")]
    CgroupNotFound(String),
}
