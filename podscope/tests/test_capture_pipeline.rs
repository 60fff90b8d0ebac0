//! Capture pipeline against a fake /proc tree: decoding, naming, cgroup
//! scoping and fan-out without touching the kernel.

use std::collections::VecDeque;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use podscope::capture::{codec, EventPipeline, RawRecord, RecordSource};
use podscope::cgroup::CgroupFilter;
use podscope::domain::{Category, Event, Pid, ReadError};
use podscope::process_names::ProcessNameResolver;
use tempfile::TempDir;

struct Replay(VecDeque<Result<RawRecord, ReadError>>);

impl RecordSource for Replay {
    fn read(&mut self) -> Result<RawRecord, ReadError> {
        self.0.pop_front().unwrap_or(Err(ReadError::Closed))
    }
}

fn fake_process(root: &Path, pid: u32, cmdline: &[u8], cgroup: &str) {
    let dir = root.join(pid.to_string());
    fs::create_dir_all(&dir).unwrap();
    fs::write(dir.join("cmdline"), cmdline).unwrap();
    fs::write(dir.join("cgroup"), cgroup).unwrap();
}

fn sample(pid: u32, category: Category, target: &str) -> Result<RawRecord, ReadError> {
    Ok(RawRecord::Sample(codec::encode(&Event {
        timestamp_ns: 1,
        pid: Pid(pid),
        process_name: String::new(),
        category,
        latency_ns: 1_000,
        error: 0,
        target: target.to_string(),
        details: String::new(),
    })))
}

#[test]
fn test_only_in_scope_events_reach_consumers() {
    let proc_root = TempDir::new().unwrap();
    // Inside the container, in a nested sub-scope
    fake_process(
        proc_root.path(),
        100,
        b"/usr/local/bin/api-server\0--port\08080\0",
        "0::/kubepods.slice/podA/containerX/app\n",
    );
    // Sibling pod
    fake_process(proc_root.path(), 200, b"/bin/sidecar\0", "0::/kubepods.slice/podB/containerY\n");
    // PID 300 has no /proc entry at all

    let names = Arc::new(ProcessNameResolver::with_proc_root(proc_root.path()));
    let filter = CgroupFilter::with_proc_root(proc_root.path());
    filter.set_scope(Some("/sys/fs/cgroup/kubepods.slice/podA/containerX/"));

    let script = VecDeque::from(vec![
        sample(100, Category::Connect, "10.0.0.1:443"),
        sample(200, Category::Connect, "10.0.0.2:443"),
        Ok(RawRecord::Sample(vec![0u8; 12])),
        Ok(RawRecord::Lost(3)),
        Err(ReadError::Buffer("transient".into())),
        sample(300, Category::Write, "/tmp/x"),
        sample(100, Category::TcpSend, "10.0.0.1:443"),
    ]);

    let mut pipeline = EventPipeline::new(Replay(script), Arc::clone(&names), filter);
    let mut diagnostics = pipeline.subscribe();
    let mut metrics = pipeline.subscribe();

    let stats = std::thread::spawn(move || pipeline.run()).join().unwrap();

    let mut delivered = Vec::new();
    while let Ok(event) = diagnostics.try_recv() {
        delivered.push(event);
    }
    assert_eq!(delivered.len(), 2);
    assert!(delivered.iter().all(|e| e.pid == Pid(100) && e.process_name == "api-server"));
    assert_eq!(delivered[0].category, Category::Connect);
    assert_eq!(delivered[1].category, Category::TcpSend);

    // Every consumer sees the same stream
    assert_eq!(metrics.try_recv().unwrap(), delivered[0]);
    assert_eq!(metrics.try_recv().unwrap(), delivered[1]);

    assert_eq!(stats.decoded, 4);
    assert_eq!(stats.malformed, 1);
    assert_eq!(stats.filtered, 2);
    assert_eq!(stats.lost, 3);
    assert_eq!(stats.read_errors, 1);
    assert_eq!(stats.delivered, 2);

    // Names are cached, including the empty result for the missing PID
    assert_eq!(names.cached(), 3);
}

#[test]
fn test_unscoped_pipeline_passes_everything() {
    let proc_root = TempDir::new().unwrap();
    let names = Arc::new(ProcessNameResolver::with_proc_root(proc_root.path()));
    let filter = CgroupFilter::with_proc_root(proc_root.path());

    let script = VecDeque::from(vec![
        sample(1, Category::Dns, "a"),
        sample(2, Category::Unknown(42), ""),
    ]);
    let mut pipeline = EventPipeline::new(Replay(script), names, filter);
    let mut rx = pipeline.subscribe();
    let stats = pipeline.run();

    assert_eq!(stats.delivered, 2);
    assert_eq!(rx.try_recv().unwrap().process_name, "");
    assert_eq!(rx.try_recv().unwrap().category, Category::Unknown(42));
}
