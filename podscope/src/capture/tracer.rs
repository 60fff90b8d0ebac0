//! # Tracer Lifecycle
//!
//! Owns every kernel resource for one run and enforces the setup and
//! teardown order:
//!
//! ```text
//! setup:    dumpable → memlock → artifact → collection → probes → reader
//! teardown: reader → probes → collection
//! ```
//!
//! The reader goes first so the capture thread stops touching the buffer
//! before any probe that could still write into it is detached.

use aya::programs::kprobe::KProbeLinkId;
use aya::Ebpf;
use log::{info, warn};
use podscope_common::{EVENTS_MAP, PROBES};
use std::path::Path;
use std::sync::Arc;
use std::thread::JoinHandle;
use tokio::sync::mpsc;

use super::limits::{negotiate_memlock, relax_dumpable, ProcessMemlock};
use super::pipeline::{EventPipeline, PipelineStats};
use super::probes::{attach_all, load_collection, locate_artifact, ProbeAttachments};
use super::reader::{CloseHandle, PerfReader};
use crate::cgroup::CgroupFilter;
use crate::domain::{Event, TracerError};
use crate::process_names::ProcessNameResolver;

/// Kernel instrumentation for one run
pub struct Tracer {
    reader: Option<PerfReader>,
    close: CloseHandle,
    capture: Option<JoinHandle<PipelineStats>>,
    attachments: Option<ProbeAttachments<KProbeLinkId>>,
    ebpf: Option<Ebpf>,
    filter: CgroupFilter,
}

impl Tracer {
    /// Load the artifact and attach every probe.
    ///
    /// # Errors
    /// Any failure after the limit negotiation is fatal; resources acquired
    /// before the failure are released before returning.
    pub fn new(artifact: Option<&Path>) -> Result<Self, TracerError> {
        relax_dumpable();
        negotiate_memlock(&mut ProcessMemlock);

        let (_, bytes) = locate_artifact(artifact)?;
        let mut ebpf = load_collection(&bytes)?;

        let attachments = attach_all(&mut ebpf, &PROBES)?;

        let reader = match PerfReader::open(&mut ebpf, EVENTS_MAP) {
            Ok(reader) => reader,
            Err(e) => {
                attachments.release(&mut ebpf);
                drop(ebpf);
                return Err(e);
            }
        };

        Ok(Self {
            close: reader.close_handle(),
            reader: Some(reader),
            capture: None,
            attachments: Some(attachments),
            ebpf: Some(ebpf),
            filter: CgroupFilter::new(),
        })
    }

    /// Restrict delivered events to a cgroup subtree. Events already
    /// delivered are unaffected; a running capture thread applies the new
    /// scope from its next event.
    pub fn attach_cgroup_scope(&self, path: &str) {
        self.filter.set_scope(Some(path));
        info!("Filtering events to cgroup {path}");
    }

    /// Spawn the capture thread and return the diagnostics queue plus any
    /// extra fan-out queues requested.
    ///
    /// # Errors
    /// Fails if the tracer was already started or the thread cannot spawn.
    pub fn start(
        &mut self,
        names: Arc<ProcessNameResolver>,
        extra_subscribers: usize,
    ) -> Result<(mpsc::Receiver<Event>, Vec<mpsc::Receiver<Event>>), TracerError> {
        let reader = self
            .reader
            .take()
            .ok_or_else(|| TracerError::ReaderOpenFailed("tracer already started".to_string()))?;

        let mut pipeline = EventPipeline::new(reader, names, self.filter.clone());
        let primary = pipeline.subscribe();
        let extra = (0..extra_subscribers).map(|_| pipeline.subscribe()).collect();

        let handle = std::thread::Builder::new()
            .name("podscope-capture".to_string())
            .spawn(move || pipeline.run())
            .map_err(|e| TracerError::ReaderOpenFailed(e.to_string()))?;
        self.capture = Some(handle);

        Ok((primary, extra))
    }

    /// Ordered teardown. Safe to call more than once.
    ///
    /// Every receiver returned by [`Tracer::start`] should be dropped first
    /// so a capture thread blocked on a full queue can observe shutdown.
    pub fn stop(&mut self) -> Option<PipelineStats> {
        self.close.close();
        let stats = self.capture.take().and_then(|handle| match handle.join() {
            Ok(stats) => Some(stats),
            Err(_) => {
                warn!("capture thread panicked");
                None
            }
        });
        drop(self.reader.take());

        if let (Some(attachments), Some(ebpf)) = (self.attachments.take(), self.ebpf.as_mut()) {
            attachments.release(ebpf);
        }
        drop(self.ebpf.take());

        stats
    }
}

impl Drop for Tracer {
    fn drop(&mut self) {
        self.stop();
    }
}
