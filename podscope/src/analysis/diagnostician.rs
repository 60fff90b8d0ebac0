//! Run-history accumulator and report builder
//!
//! The diagnostician is owned by the control loop alone: events are appended
//! as they arrive and the report is recomputed from the full history on every
//! call, so live reports always cover the whole run.

#![allow(clippy::cast_precision_loss)]

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use super::patterns::{self, Span};
use super::policy::{Policy, POLICY};
use super::report::{
    ConnectionStats, CpuStats, DnsStats, ErrorCount, FsStats, Issue, ProcessActivity,
    ProcessShare, Ranked, Report, Section, TcpStats,
};
use super::stats::{pct, top_n, LatencySummary};
use crate::domain::{Category, Event, Pid};
use crate::process_names::ProcessNameResolver;

/// Current `CLOCK_MONOTONIC` time, the clock kernel event timestamps use
#[must_use]
#[allow(unsafe_code, clippy::cast_sign_loss)]
pub fn monotonic_now_ns() -> u64 {
    let mut ts = libc::timespec { tv_sec: 0, tv_nsec: 0 };
    // SAFETY: ts is a valid, writable timespec; CLOCK_MONOTONIC is always available.
    unsafe { libc::clock_gettime(libc::CLOCK_MONOTONIC, &mut ts) };
    (ts.tv_sec as u64)
        .saturating_mul(1_000_000_000)
        .saturating_add(ts.tv_nsec as u64)
}

/// Start and (once finished) end of the collection period
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CollectionWindow {
    pub start_ns: u64,
    pub end_ns: Option<u64>,
}

impl CollectionWindow {
    /// Span used for rate math; an unfinished window has zero length
    #[must_use]
    pub fn span(&self) -> Span {
        Span {
            start_ns: self.start_ns,
            end_ns: self.end_ns.unwrap_or(self.start_ns),
        }
    }
}

pub struct Diagnostician {
    events: Vec<Event>,
    window: CollectionWindow,
    policy: Policy,
    names: Arc<ProcessNameResolver>,
}

impl Diagnostician {
    /// Start a window now. `names` labels PIDs that arrived without a name.
    #[must_use]
    pub fn new(names: Arc<ProcessNameResolver>) -> Self {
        Self::starting_at(monotonic_now_ns(), names)
    }

    #[must_use]
    pub fn starting_at(start_ns: u64, names: Arc<ProcessNameResolver>) -> Self {
        Self {
            events: Vec::new(),
            window: CollectionWindow { start_ns, end_ns: None },
            policy: POLICY,
            names,
        }
    }

    pub fn add_event(&mut self, event: Event) {
        self.events.push(event);
    }

    /// Stamp the window end with the current time. May be called repeatedly.
    pub fn finish(&mut self) {
        self.finish_at(monotonic_now_ns());
    }

    pub fn finish_at(&mut self, end_ns: u64) {
        self.window.end_ns = Some(end_ns.max(self.window.start_ns));
    }

    #[must_use]
    pub fn window(&self) -> CollectionWindow {
        self.window
    }

    #[must_use]
    pub fn events(&self) -> &[Event] {
        &self.events
    }

    /// Text rendering of [`Self::report`]
    #[must_use]
    pub fn generate_report(&self) -> String {
        self.report().to_text()
    }

    #[must_use]
    pub fn report(&self) -> Report {
        let span = self.window.span();
        let mut report = Report {
            duration: span.duration(),
            total_events: self.events.len(),
            events_per_sec: span.rate(self.events.len()),
            sections: Vec::new(),
        };
        if self.events.is_empty() {
            return report;
        }

        let dns = self.select(|c| c == Category::Dns);
        let connects = self.select(|c| c == Category::Connect);
        let tcp = self.select(Category::is_tcp);
        let fs = self.select(Category::is_filesystem);
        let sched = self.select(|c| c == Category::SchedSwitch);

        let sections = &mut report.sections;
        if !dns.is_empty() {
            sections.push(Section::Dns(self.dns_stats(&dns, span)));
        }
        if !tcp.is_empty() {
            sections.push(Section::Tcp(self.tcp_stats(&tcp, span)));
        }
        if !connects.is_empty() {
            sections.push(Section::Connection(self.connection_stats(&connects, span)));
        }
        if !fs.is_empty() {
            sections.push(Section::FileSystem(self.fs_stats(&fs, span)));
        }
        if !sched.is_empty() {
            sections.push(Section::Cpu(CpuStats {
                switches: sched.len(),
                rate: span.rate(sched.len()),
                block_time: LatencySummary::from_events(sched.iter().copied()),
            }));
        }

        sections.push(Section::Processes(self.process_activity()));

        let timestamps: Vec<u64> = self.events.iter().map(|e| e.timestamp_ns).collect();
        sections.push(Section::Timeline {
            buckets: patterns::timeline(&timestamps, span, &self.policy),
        });

        let bursts = patterns::detect_bursts(&timestamps, span, &self.policy);
        if bursts.detected > 0 {
            sections.push(Section::Bursts(bursts));
        }

        if !connects.is_empty() {
            let stamps: Vec<u64> = connects.iter().map(|e| e.timestamp_ns).collect();
            let unique = self.targets(&connects).collect::<HashSet<_>>().len();
            sections.push(Section::ConnectionPattern(patterns::connection_pattern(
                &stamps,
                unique,
                span,
                &self.policy,
            )));
        }

        if !tcp.is_empty() {
            let sends = tcp.iter().filter(|e| e.category == Category::TcpSend).count();
            let stamps: Vec<u64> = tcp.iter().map(|e| e.timestamp_ns).collect();
            sections.push(Section::IoPattern(patterns::io_pattern(
                sends,
                tcp.len() - sends,
                &stamps,
                span,
                &self.policy,
            )));
        }

        let issues = self.detect_issues(&connects, &tcp);
        if !issues.is_empty() {
            sections.push(Section::Issues { issues });
        }

        report
    }

    fn select(&self, wanted: impl Fn(Category) -> bool) -> Vec<&Event> {
        self.events.iter().filter(|e| wanted(e.category)).collect()
    }

    /// Non-sentinel targets of `events`
    fn targets<'a>(&'a self, events: &'a [&'a Event]) -> impl Iterator<Item = &'a str> + 'a {
        events
            .iter()
            .map(|e| e.target.as_str())
            .filter(|t| !self.policy.is_sentinel(t))
    }

    fn ranked<'a>(&self, keys: impl IntoIterator<Item = &'a str>) -> Vec<Ranked> {
        top_n(keys, self.policy.top_n)
            .into_iter()
            .map(|(name, count)| Ranked { name: name.to_string(), count })
            .collect()
    }

    fn dns_stats(&self, dns: &[&Event], span: Span) -> DnsStats {
        let errors = dns.iter().filter(|e| e.is_error()).count();
        DnsStats {
            lookups: dns.len(),
            rate: span.rate(dns.len()),
            latency: LatencySummary::from_events(dns.iter().copied()),
            errors,
            error_pct: pct(errors, dns.len()),
            top_targets: self.ranked(self.targets(dns)),
        }
    }

    fn tcp_stats(&self, tcp: &[&Event], span: Span) -> TcpStats {
        let sends = tcp.iter().filter(|e| e.category == Category::TcpSend).count();
        let recvs = tcp.len() - sends;
        let errors = tcp.iter().filter(|e| e.is_error()).count();
        TcpStats {
            sends,
            send_rate: span.rate(sends),
            recvs,
            recv_rate: span.rate(recvs),
            rtt: LatencySummary::from_events(tcp.iter().copied()),
            rtt_spikes: self.rtt_spikes(tcp),
            errors,
            error_pct: pct(errors, tcp.len()),
        }
    }

    fn rtt_spikes(&self, tcp: &[&Event]) -> usize {
        tcp.iter()
            .filter(|e| e.latency_ms() > self.policy.rtt_spike_ms)
            .count()
    }

    fn connection_stats(&self, connects: &[&Event], span: Span) -> ConnectionStats {
        let mut breakdown: BTreeMap<i32, usize> = BTreeMap::new();
        for e in connects.iter().filter(|e| e.is_error()) {
            *breakdown.entry(e.error).or_insert(0) += 1;
        }
        let failed = breakdown.values().sum();

        ConnectionStats {
            attempts: connects.len(),
            rate: span.rate(connects.len()),
            latency: LatencySummary::from_events(connects.iter().copied()),
            failed,
            failed_pct: pct(failed, connects.len()),
            error_breakdown: breakdown
                .into_iter()
                .map(|(code, count)| ErrorCount { code, count })
                .collect(),
            top_targets: self.ranked(self.targets(connects)),
        }
    }

    fn fs_stats(&self, fs: &[&Event], span: Span) -> FsStats {
        let count = |category| fs.iter().filter(|e| e.category == category).count();
        let (writes, reads, fsyncs) = (
            count(Category::Write),
            count(Category::Read),
            count(Category::Fsync),
        );
        FsStats {
            writes,
            write_rate: span.rate(writes),
            reads,
            read_rate: span.rate(reads),
            fsyncs,
            fsync_rate: span.rate(fsyncs),
            latency: LatencySummary::from_events(fs.iter().copied()),
            slow_ops: fs
                .iter()
                .filter(|e| e.latency_ms() > self.policy.slow_fs_ms)
                .count(),
            top_files: self.ranked(self.targets(fs)),
        }
    }

    fn process_activity(&self) -> ProcessActivity {
        // First non-empty name seen per PID
        let mut names: HashMap<Pid, &str> = HashMap::new();
        for e in &self.events {
            if !e.process_name.is_empty() {
                names.entry(e.pid).or_insert(e.process_name.as_str());
            }
        }

        let ranked = top_n(self.events.iter().map(|e| e.pid), usize::MAX);
        let active = ranked.len();
        let top = ranked
            .into_iter()
            .take(self.policy.top_n)
            .map(|(pid, count)| {
                let name = match names.get(&pid) {
                    Some(name) => (*name).to_string(),
                    None => self.names.resolve_for_report(pid),
                };
                ProcessShare {
                    pid,
                    name: if name.is_empty() { "unknown".to_string() } else { name },
                    count,
                    percentage: pct(count, self.events.len()),
                }
            })
            .collect();

        ProcessActivity { active, top }
    }

    fn detect_issues(&self, connects: &[&Event], tcp: &[&Event]) -> Vec<Issue> {
        let mut issues = Vec::new();

        if !connects.is_empty() {
            let failed = connects.iter().filter(|e| e.is_error()).count();
            let rate = pct(failed, connects.len());
            if rate > self.policy.connect_failure_pct {
                issues.push(Issue::ConnectionFailures { pct: rate, failed, total: connects.len() });
            }
        }

        if !tcp.is_empty() {
            let spikes = self.rtt_spikes(tcp);
            let rate = pct(spikes, tcp.len());
            if rate > self.policy.rtt_spike_pct {
                issues.push(Issue::RttSpikes { pct: rate, spikes, total: tcp.len() });
            }
        }

        issues
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SEC: u64 = 1_000_000_000;
    const START: u64 = 50 * SEC;

    fn event(offset_ms: u64, category: Category, latency_ms: u64, error: i32, target: &str) -> Event {
        Event {
            timestamp_ns: START + offset_ms * 1_000_000,
            pid: Pid(42),
            process_name: "app".into(),
            category,
            latency_ns: latency_ms * 1_000_000,
            error,
            target: target.into(),
            details: String::new(),
        }
    }

    fn no_proc() -> Arc<ProcessNameResolver> {
        Arc::new(ProcessNameResolver::with_proc_root("/nonexistent/proc"))
    }

    fn finished(events: Vec<Event>, secs: u64) -> Diagnostician {
        let mut diag = Diagnostician::starting_at(START, no_proc());
        for e in events {
            diag.add_event(e);
        }
        diag.finish_at(START + secs * SEC);
        diag
    }

    fn section<'a, T>(report: &'a Report, pick: impl Fn(&'a Section) -> Option<T>) -> T {
        report.sections.iter().find_map(pick).expect("section present")
    }

    #[test]
    fn test_empty_history() {
        let diag = finished(Vec::new(), 5);
        assert_eq!(diag.generate_report(), "No events collected during the diagnostic period.\n");
    }

    #[test]
    fn test_unfinished_window_has_zero_rates() {
        let mut diag = Diagnostician::starting_at(START, no_proc());
        diag.add_event(event(0, Category::Dns, 1, 0, "a"));
        let report = diag.report();
        assert_eq!(report.events_per_sec, 0.0);
        assert!(report.duration.is_zero());
    }

    #[test]
    fn test_finish_is_repeatable_and_keeps_history() {
        let mut diag = finished(vec![event(100, Category::Dns, 1, 0, "a")], 1);
        assert_eq!(diag.report().events_per_sec, 1.0);
        diag.add_event(event(1_500, Category::Dns, 1, 0, "a"));
        diag.finish_at(START + 2 * SEC);
        let report = diag.report();
        assert_eq!(report.total_events, 2);
        assert_eq!(report.events_per_sec, 1.0);
    }

    #[test]
    fn test_tcp_eagain_is_not_an_error() {
        let diag = finished(
            vec![
                event(0, Category::TcpSend, 1, -11, "x"),
                event(10, Category::TcpRecv, 1, -104, "x"),
                event(20, Category::TcpSend, 150, 0, "x"),
                event(30, Category::TcpSend, 1, 5, "x"),
            ],
            1,
        );
        let report = diag.report();
        let tcp = section(&report, |s| match s {
            Section::Tcp(t) => Some(t),
            _ => None,
        });
        assert_eq!(tcp.errors, 1);
        assert_eq!((tcp.sends, tcp.recvs), (3, 1));
        assert_eq!(tcp.rtt_spikes, 1);
    }

    #[test]
    fn test_connection_breakdown_and_issue() {
        let diag = finished(
            vec![
                event(0, Category::Connect, 1, -111, "10.0.0.1:80"),
                event(10, Category::Connect, 1, -111, "10.0.0.1:80"),
                event(20, Category::Connect, 1, -110, "10.0.0.2:80"),
                event(30, Category::Connect, 1, 0, "unknown"),
            ],
            1,
        );
        let report = diag.report();
        let conn = section(&report, |s| match s {
            Section::Connection(c) => Some(c),
            _ => None,
        });
        assert_eq!(conn.failed, 3);
        assert_eq!(
            conn.error_breakdown,
            vec![ErrorCount { code: -111, count: 2 }, ErrorCount { code: -110, count: 1 }]
        );
        assert_eq!(conn.top_targets[0], Ranked { name: "10.0.0.1:80".into(), count: 2 });
        assert_eq!(conn.top_targets.len(), 2);

        let issues = section(&report, |s| match s {
            Section::Issues { issues } => Some(issues),
            _ => None,
        });
        assert_eq!(issues, &vec![Issue::ConnectionFailures { pct: 75.0, failed: 3, total: 4 }]);
    }

    #[test]
    fn test_fs_counts_reads_and_ranks_files() {
        let diag = finished(
            vec![
                event(0, Category::Write, 20, 0, "/data/a"),
                event(10, Category::Read, 1, 0, "/data/a"),
                event(20, Category::Fsync, 1, 0, "/data/b"),
                event(30, Category::Write, 1, 0, "file"),
            ],
            2,
        );
        let report = diag.report();
        let fs = section(&report, |s| match s {
            Section::FileSystem(f) => Some(f),
            _ => None,
        });
        assert_eq!((fs.writes, fs.reads, fs.fsyncs), (2, 1, 1));
        assert_eq!(fs.slow_ops, 1);
        assert_eq!(
            fs.top_files,
            vec![Ranked { name: "/data/a".into(), count: 2 }, Ranked { name: "/data/b".into(), count: 1 }]
        );
    }

    #[test]
    fn test_process_activity_falls_back_to_unknown() {
        let mut anonymous = event(0, Category::SchedSwitch, 1, 0, "");
        anonymous.pid = Pid(7);
        anonymous.process_name.clear();
        let diag = finished(
            vec![anonymous, event(1, Category::SchedSwitch, 1, 0, ""), event(2, Category::Dns, 1, 0, "")],
            1,
        );
        let report = diag.report();
        let procs = section(&report, |s| match s {
            Section::Processes(p) => Some(p),
            _ => None,
        });
        assert_eq!(procs.active, 2);
        assert_eq!(procs.top[0].name, "app");
        assert_eq!(procs.top[1].pid, Pid(7));
        assert_eq!(procs.top[1].name, "unknown");
    }

    #[test]
    fn test_process_activity_resolves_unnamed_pids_from_proc() {
        let proc_root = tempfile::tempdir().unwrap();
        let dir = proc_root.path().join("7");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("status"), "Name:\tmemcached\nState:\tS (sleeping)\n").unwrap();

        let mut anonymous = event(0, Category::SchedSwitch, 1, 0, "");
        anonymous.pid = Pid(7);
        anonymous.process_name.clear();
        let mut diag = Diagnostician::starting_at(
            START,
            Arc::new(ProcessNameResolver::with_proc_root(proc_root.path())),
        );
        diag.add_event(anonymous);
        diag.finish_at(START + SEC);

        let report = diag.report();
        let procs = section(&report, |s| match s {
            Section::Processes(p) => Some(p),
            _ => None,
        });
        assert_eq!(procs.top[0].name, "memcached");
    }

    #[test]
    fn test_unknown_categories_only_count_globally() {
        let diag = finished(vec![event(0, Category::Unknown(99), 1, 0, "")], 1);
        let report = diag.report();
        assert_eq!(report.total_events, 1);
        assert!(!report.sections.iter().any(|s| matches!(s, Section::Dns(_) | Section::Cpu(_))));
    }
}
