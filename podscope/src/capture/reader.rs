//! Perf buffer reader
//!
//! Wraps the per-CPU buffers of the `events` perf event array behind the
//! [`RecordSource`] trait. `read()` blocks until a record is available, the
//! reader is closed, or the kernel reports an error.

use aya::maps::perf::{PerfEventArray, PerfEventArrayBuffer};
use aya::maps::MapData;
use aya::util::online_cpus;
use aya::Ebpf;
use bytes::BytesMut;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::domain::{ReadError, TracerError};

/// Reader capacity per CPU, in bytes
pub const READER_CAPACITY: usize = 64 * 1024;

/// Back-off between polls when every buffer is empty
const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Records drained per buffer per poll
const BATCH: usize = 16;

/// One item produced by a record source
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawRecord {
    Sample(Vec<u8>),
    /// The kernel overwrote this many samples before they were read
    Lost(u64),
}

/// A blocking, ordered source of raw records.
pub trait RecordSource: Send {
    /// # Errors
    /// [`ReadError::Closed`] once the source has been closed; any other
    /// error is transient.
    fn read(&mut self) -> Result<RawRecord, ReadError>;
}

/// Cloneable handle that closes a reader from another thread.
#[derive(Debug, Clone, Default)]
pub struct CloseHandle(Arc<AtomicBool>);

impl CloseHandle {
    pub fn close(&self) {
        self.0.store(true, Ordering::Release);
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Buffered reader over every online CPU's perf buffer
pub struct PerfReader {
    buffers: Vec<PerfEventArrayBuffer<MapData>>,
    scratch: Vec<BytesMut>,
    pending: VecDeque<RawRecord>,
    closed: CloseHandle,
}

impl PerfReader {
    /// Take the `events` map out of the collection and open one buffer per
    /// online CPU.
    ///
    /// # Errors
    /// Returns an error if the map is missing or any buffer cannot be opened.
    pub fn open(ebpf: &mut Ebpf, map_name: &'static str) -> Result<Self, TracerError> {
        let map = ebpf.take_map(map_name).ok_or(TracerError::MapNotFound(map_name))?;
        let mut array = PerfEventArray::try_from(map)
            .map_err(|e| TracerError::ReaderOpenFailed(e.to_string()))?;

        let page_size = page_size();
        let pages = (READER_CAPACITY / page_size).max(1).next_power_of_two();

        let cpus = online_cpus().map_err(|(_, e)| TracerError::ReaderOpenFailed(e.to_string()))?;
        let mut buffers = Vec::with_capacity(cpus.len());
        for cpu in cpus {
            let buffer = array
                .open(cpu, Some(pages))
                .map_err(|e| TracerError::ReaderOpenFailed(format!("cpu {cpu}: {e}")))?;
            buffers.push(buffer);
        }

        let scratch = (0..BATCH).map(|_| BytesMut::with_capacity(256)).collect();
        log::info!("Opened perf reader on {} CPUs ({pages} pages each)", buffers.len());

        Ok(Self { buffers, scratch, pending: VecDeque::new(), closed: CloseHandle::default() })
    }

    #[must_use]
    pub fn close_handle(&self) -> CloseHandle {
        self.closed.clone()
    }

    fn fill(&mut self) -> Result<(), ReadError> {
        for buffer in &mut self.buffers {
            if !buffer.readable() {
                continue;
            }
            let events = buffer
                .read_events(&mut self.scratch)
                .map_err(|e| ReadError::Buffer(e.to_string()))?;
            if events.lost > 0 {
                self.pending.push_back(RawRecord::Lost(events.lost as u64));
            }
            for buf in self.scratch.iter_mut().take(events.read) {
                self.pending.push_back(RawRecord::Sample(buf.to_vec()));
                buf.clear();
            }
        }
        Ok(())
    }
}

impl RecordSource for PerfReader {
    fn read(&mut self) -> Result<RawRecord, ReadError> {
        loop {
            if self.closed.is_closed() {
                return Err(ReadError::Closed);
            }
            if let Some(record) = self.pending.pop_front() {
                return Ok(record);
            }
            self.fill()?;
            if self.pending.is_empty() {
                std::thread::sleep(POLL_INTERVAL);
            }
        }
    }
}

#[allow(unsafe_code)]
fn page_size() -> usize {
    // SAFETY: sysconf has no memory-safety preconditions.
    let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    usize::try_from(size).ok().filter(|&s| s > 0).unwrap_or(4096)
}
