//! Report model and its renderers
//!
//! The diagnostician produces a [`Report`]; rendering is a separate, pure
//! step so the same report can be printed as text or serialized as JSON.

use serde::Serialize;
use std::fmt::{self, Write as _};
use std::time::Duration;

use super::patterns::{as_secs, BurstReport, ConnectionPattern, IoPattern, TimelineBucket};
use super::stats::LatencySummary;
use crate::domain::Pid;

pub const NO_EVENTS: &str = "No events collected during the diagnostic period.\n";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Report {
    #[serde(serialize_with = "as_secs")]
    pub duration: Duration,
    pub total_events: usize,
    pub events_per_sec: f64,
    pub sections: Vec<Section>,
}

/// One report block; rendered in the order stored
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "section", rename_all = "snake_case")]
pub enum Section {
    Dns(DnsStats),
    Tcp(TcpStats),
    Connection(ConnectionStats),
    FileSystem(FsStats),
    Cpu(CpuStats),
    Processes(ProcessActivity),
    Timeline { buckets: Vec<TimelineBucket> },
    Bursts(BurstReport),
    ConnectionPattern(ConnectionPattern),
    IoPattern(IoPattern),
    Issues { issues: Vec<Issue> },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Ranked {
    pub name: String,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DnsStats {
    pub lookups: usize,
    pub rate: f64,
    pub latency: LatencySummary,
    pub errors: usize,
    pub error_pct: f64,
    pub top_targets: Vec<Ranked>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TcpStats {
    pub sends: usize,
    pub send_rate: f64,
    pub recvs: usize,
    pub recv_rate: f64,
    pub rtt: LatencySummary,
    pub rtt_spikes: usize,
    pub errors: usize,
    pub error_pct: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ErrorCount {
    pub code: i32,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConnectionStats {
    pub attempts: usize,
    pub rate: f64,
    pub latency: LatencySummary,
    pub failed: usize,
    pub failed_pct: f64,
    /// Sorted by error code
    pub error_breakdown: Vec<ErrorCount>,
    pub top_targets: Vec<Ranked>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FsStats {
    pub writes: usize,
    pub write_rate: f64,
    pub reads: usize,
    pub read_rate: f64,
    pub fsyncs: usize,
    pub fsync_rate: f64,
    pub latency: LatencySummary,
    pub slow_ops: usize,
    pub top_files: Vec<Ranked>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CpuStats {
    pub switches: usize,
    pub rate: f64,
    pub block_time: LatencySummary,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcessShare {
    pub pid: Pid,
    pub name: String,
    pub count: usize,
    pub percentage: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcessActivity {
    pub active: usize,
    pub top: Vec<ProcessShare>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Issue {
    ConnectionFailures { pct: f64, failed: usize, total: usize },
    RttSpikes { pct: f64, spikes: usize, total: usize },
}

impl fmt::Display for Issue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::ConnectionFailures { pct, failed, total } => {
                write!(f, "High connection failure rate: {pct:.1}% ({failed}/{total})")
            }
            Self::RttSpikes { pct, spikes, total } => {
                write!(f, "High TCP RTT spike rate: {pct:.1}% ({spikes}/{total})")
            }
        }
    }
}

/// Report output flavour
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Format {
    #[default]
    Text,
    Json,
}

impl Report {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.total_events == 0
    }

    /// Render in the requested format
    ///
    /// # Errors
    /// Only JSON serialization can fail.
    pub fn render(&self, format: Format) -> serde_json::Result<String> {
        match format {
            Format::Text => Ok(self.to_text()),
            Format::Json => serde_json::to_string_pretty(self),
        }
    }

    #[must_use]
    pub fn to_text(&self) -> String {
        if self.is_empty() {
            return NO_EVENTS.to_string();
        }

        let mut out = String::new();
        let _ = writeln!(
            out,
            "=== Diagnostic Report (collected over {}) ===\n",
            humantime::format_duration(round_ms(self.duration))
        );
        let _ = writeln!(out, "Summary:");
        let _ = writeln!(out, "  Total events: {}", self.total_events);
        let _ = writeln!(out, "  Events per second: {:.1}", self.events_per_sec);
        let _ = writeln!(out, "  Collection duration: {:.1}s\n", self.duration.as_secs_f64());

        for section in &self.sections {
            render_section(&mut out, section);
            out.push('\n');
        }
        out
    }
}

fn round_ms(duration: Duration) -> Duration {
    Duration::from_millis(u64::try_from(duration.as_millis()).unwrap_or(u64::MAX))
}

fn render_section(out: &mut String, section: &Section) {
    match section {
        Section::Dns(stats) => render_dns(out, stats),
        Section::Tcp(stats) => render_tcp(out, stats),
        Section::Connection(stats) => render_connection(out, stats),
        Section::FileSystem(stats) => render_fs(out, stats),
        Section::Cpu(stats) => render_cpu(out, stats),
        Section::Processes(activity) => render_processes(out, activity),
        Section::Timeline { buckets } => render_timeline(out, buckets),
        Section::Bursts(bursts) => render_bursts(out, bursts),
        Section::ConnectionPattern(pattern) => render_connection_pattern(out, pattern),
        Section::IoPattern(io) => render_io(out, io),
        Section::Issues { issues } => render_issues(out, issues),
    }
}

fn percentiles(out: &mut String, summary: &LatencySummary) {
    let _ = writeln!(
        out,
        "  Percentiles: P50={:.2}ms, P95={:.2}ms, P99={:.2}ms",
        summary.p50_ms, summary.p95_ms, summary.p99_ms
    );
}

fn ranking(out: &mut String, title: &str, unit: &str, entries: &[Ranked]) {
    if entries.is_empty() {
        return;
    }
    let _ = writeln!(out, "  {title}:");
    for entry in entries {
        let _ = writeln!(out, "    - {} ({} {unit})", entry.name, entry.count);
    }
}

fn render_dns(out: &mut String, s: &DnsStats) {
    let _ = writeln!(out, "DNS Statistics:");
    let _ = writeln!(out, "  Total lookups: {} ({:.1}/sec)", s.lookups, s.rate);
    let _ = writeln!(out, "  Average latency: {:.2}ms", s.latency.avg_ms);
    let _ = writeln!(out, "  Max latency: {:.2}ms", s.latency.max_ms);
    percentiles(out, &s.latency);
    let _ = writeln!(out, "  Errors: {} ({:.1}%)", s.errors, s.error_pct);
    ranking(out, "Top targets", "lookups", &s.top_targets);
}

fn render_tcp(out: &mut String, s: &TcpStats) {
    let _ = writeln!(out, "TCP Statistics:");
    let _ = writeln!(out, "  Send operations: {} ({:.1}/sec)", s.sends, s.send_rate);
    let _ = writeln!(out, "  Receive operations: {} ({:.1}/sec)", s.recvs, s.recv_rate);
    let _ = writeln!(out, "  Average RTT: {:.2}ms", s.rtt.avg_ms);
    let _ = writeln!(out, "  Max RTT: {:.2}ms", s.rtt.max_ms);
    percentiles(out, &s.rtt);
    let _ = writeln!(out, "  RTT spikes (>100ms): {}", s.rtt_spikes);
    let _ = writeln!(out, "  Errors: {} ({:.1}%)", s.errors, s.error_pct);
}

fn render_connection(out: &mut String, s: &ConnectionStats) {
    let _ = writeln!(out, "Connection Statistics:");
    let _ = writeln!(out, "  Total connections: {} ({:.1}/sec)", s.attempts, s.rate);
    let _ = writeln!(out, "  Average latency: {:.2}ms", s.latency.avg_ms);
    let _ = writeln!(out, "  Max latency: {:.2}ms", s.latency.max_ms);
    percentiles(out, &s.latency);
    let _ = writeln!(out, "  Failed connections: {} ({:.1}%)", s.failed, s.failed_pct);
    if !s.error_breakdown.is_empty() {
        let _ = writeln!(out, "  Error breakdown:");
        for entry in &s.error_breakdown {
            let _ = writeln!(out, "    - Error {}: {} occurrences", entry.code, entry.count);
        }
    }
    ranking(out, "Top connection targets", "connections", &s.top_targets);
}

fn render_fs(out: &mut String, s: &FsStats) {
    let _ = writeln!(out, "File System Statistics:");
    let _ = writeln!(out, "  Write operations: {} ({:.1}/sec)", s.writes, s.write_rate);
    let _ = writeln!(out, "  Read operations: {} ({:.1}/sec)", s.reads, s.read_rate);
    let _ = writeln!(out, "  Fsync operations: {} ({:.1}/sec)", s.fsyncs, s.fsync_rate);
    let _ = writeln!(out, "  Average latency: {:.2}ms", s.latency.avg_ms);
    let _ = writeln!(out, "  Max latency: {:.2}ms", s.latency.max_ms);
    percentiles(out, &s.latency);
    let _ = writeln!(out, "  Slow operations (>10ms): {}", s.slow_ops);
    ranking(out, "Top accessed files", "operations", &s.top_files);
}

fn render_cpu(out: &mut String, s: &CpuStats) {
    let _ = writeln!(out, "CPU Statistics:");
    let _ = writeln!(out, "  Thread switches: {} ({:.1}/sec)", s.switches, s.rate);
    let _ = writeln!(out, "  Average block time: {:.2}ms", s.block_time.avg_ms);
    let _ = writeln!(out, "  Max block time: {:.2}ms", s.block_time.max_ms);
    percentiles(out, &s.block_time);
}

fn render_processes(out: &mut String, activity: &ProcessActivity) {
    let _ = writeln!(out, "Process Activity:");
    let _ = writeln!(out, "  Active processes: {}", activity.active);
    let _ = writeln!(out, "  Top active processes:");
    for p in &activity.top {
        let _ = writeln!(
            out,
            "    - {} ({}): {} events ({:.1}%)",
            p.pid, p.name, p.count, p.percentage
        );
    }
}

fn render_timeline(out: &mut String, buckets: &[TimelineBucket]) {
    let _ = writeln!(out, "Activity Timeline:");
    let _ = writeln!(out, "  Activity distribution:");
    for b in buckets {
        let _ = writeln!(
            out,
            "    - {:.1}s-{:.1}s: {} events ({:.1}%)",
            b.from.as_secs_f64(),
            b.to.as_secs_f64(),
            b.count,
            b.percentage
        );
    }
}

fn render_bursts(out: &mut String, report: &BurstReport) {
    let _ = writeln!(out, "Activity Bursts:");
    let _ = writeln!(out, "  Detected {} burst period(s):", report.detected);
    for burst in &report.bursts {
        let _ = writeln!(
            out,
            "    - +{:.1}s: {:.1} events/sec ({:.1}x normal rate)",
            burst.offset.as_secs_f64(),
            burst.rate,
            burst.multiplier
        );
    }
}

fn render_connection_pattern(out: &mut String, p: &ConnectionPattern) {
    let _ = writeln!(out, "Connection Patterns:");
    let _ = writeln!(out, "  Pattern: {}", p.pattern);
    let _ = writeln!(out, "  Average rate: {:.1} connections/sec", p.avg_rate);
    if p.peak_rate > 0.0 {
        let _ = writeln!(out, "  Peak rate: {:.1} connections/sec", p.peak_rate);
    }
    if p.unique_targets > 0 {
        let _ = writeln!(out, "  Unique targets: {}", p.unique_targets);
    }
}

fn render_io(out: &mut String, io: &IoPattern) {
    let _ = writeln!(out, "Network I/O Pattern:");
    let _ = writeln!(out, "  Send/Receive ratio: {:.2}:1", io.send_recv_ratio);
    let _ = writeln!(out, "  Average throughput: {:.1} ops/sec", io.avg_throughput);
    if io.peak_throughput > 0.0 {
        let _ = writeln!(out, "  Peak throughput: {:.1} ops/sec", io.peak_throughput);
    }
}

fn render_issues(out: &mut String, issues: &[Issue]) {
    let _ = writeln!(out, "Potential Issues Detected:");
    for issue in issues {
        let _ = writeln!(out, "  {issue}");
    }
}
