//! # Event Pipeline
//!
//! Drains a [`RecordSource`], decodes each sample, attaches the process name,
//! applies the cgroup filter and publishes accepted events to every
//! subscriber queue.
//!
//! ## Flow Control
//!
//! Subscriber queues are bounded. A full queue blocks the pipeline rather
//! than dropping: sustained overload shows up as kernel-side lost samples.

use log::{debug, info, trace, warn};
use std::sync::Arc;
use tokio::sync::mpsc;

use super::codec;
use super::reader::{RawRecord, RecordSource};
use crate::cgroup::CgroupFilter;
use crate::domain::{Event, ReadError};
use crate::process_names::ProcessNameResolver;

/// Capacity of each subscriber queue
pub const QUEUE_CAPACITY: usize = 100;

/// Counters reported when the pipeline stops
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PipelineStats {
    pub decoded: u64,
    pub malformed: u64,
    pub filtered: u64,
    pub lost: u64,
    pub read_errors: u64,
    pub delivered: u64,
}

/// Background capture stage between the kernel buffer and the consumers
pub struct EventPipeline<S> {
    source: S,
    names: Arc<ProcessNameResolver>,
    filter: CgroupFilter,
    subscribers: Vec<mpsc::Sender<Event>>,
    stats: PipelineStats,
}

impl<S: RecordSource> EventPipeline<S> {
    #[must_use]
    pub fn new(source: S, names: Arc<ProcessNameResolver>, filter: CgroupFilter) -> Self {
        Self { source, names, filter, subscribers: Vec::new(), stats: PipelineStats::default() }
    }

    /// Register a consumer and get its receiving end.
    pub fn subscribe(&mut self) -> mpsc::Receiver<Event> {
        let (tx, rx) = mpsc::channel(QUEUE_CAPACITY);
        self.subscribers.push(tx);
        rx
    }

    /// Run until the source closes or every subscriber has gone away.
    ///
    /// Must run on a thread that may block (not inside an async task).
    pub fn run(mut self) -> PipelineStats {
        loop {
            match self.source.read() {
                Ok(RawRecord::Sample(bytes)) => {
                    if let Some(event) = self.accept(&bytes) {
                        if !self.publish(event) {
                            debug!("all event consumers gone, stopping capture");
                            break;
                        }
                    }
                }
                Ok(RawRecord::Lost(count)) => {
                    self.stats.lost += count;
                    warn!("Lost {count} samples");
                }
                Err(ReadError::Closed) => break,
                Err(e) => {
                    self.stats.read_errors += 1;
                    warn!("{e}");
                }
            }
        }

        info!(
            "capture stopped: {} decoded, {} malformed, {} filtered, {} lost, {} delivered",
            self.stats.decoded,
            self.stats.malformed,
            self.stats.filtered,
            self.stats.lost,
            self.stats.delivered
        );
        self.stats
    }

    fn accept(&mut self, bytes: &[u8]) -> Option<Event> {
        let Some(mut event) = codec::decode(bytes) else {
            self.stats.malformed += 1;
            return None;
        };
        self.stats.decoded += 1;

        event.process_name = self.names.resolve(event.pid);

        if !self.filter.contains(event.pid) {
            self.stats.filtered += 1;
            return None;
        }

        if let Some(message) = event.message() {
            trace!("{} {message}", event.pid);
        }
        Some(event)
    }

    /// Blocking fan-out. Subscribers whose queue has closed are dropped;
    /// returns `false` once none is left.
    fn publish(&mut self, event: Event) -> bool {
        let mut sent = false;
        self.subscribers.retain(|tx| {
            let ok = tx.blocking_send(event.clone()).is_ok();
            sent |= ok;
            ok
        });
        if sent {
            self.stats.delivered += 1;
        }
        !self.subscribers.is_empty()
    }
}
