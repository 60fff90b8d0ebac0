//! Kernel event capture
//!
//! - Record decoding ([`codec`])
//! - Resource limit preparation ([`limits`])
//! - Artifact loading and transactional probe attachment ([`probes`])
//! - Perf buffer reading ([`reader`])
//! - The decode → name → filter → fan-out stage ([`pipeline`])
//! - Ownership and teardown order of all of the above ([`tracer`])

pub mod codec;
pub mod limits;
pub mod pipeline;
pub mod probes;
pub mod reader;
pub mod tracer;

pub use pipeline::{EventPipeline, PipelineStats, QUEUE_CAPACITY};
pub use probes::{attach_all, AttachmentBuilder, ProbeAttachments, ProbeTarget};
pub use reader::{CloseHandle, PerfReader, RawRecord, RecordSource};
pub use tracer::Tracer;
