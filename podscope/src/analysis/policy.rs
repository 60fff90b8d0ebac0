//! Thresholds and classification rules used by the diagnostician.
//!
//! Kept in one table so report logic never carries inline magic numbers.

use std::time::Duration;

use crate::domain::Category;

/// `-EAGAIN`: a retry signal on non-blocking sockets
pub const EAGAIN: i32 = -11;

#[derive(Debug, Clone, Copy)]
pub struct Policy {
    /// Entries kept in every top-N ranking
    pub top_n: usize,
    /// Targets excluded from rankings and unique-target counts
    pub sentinel_targets: &'static [&'static str],

    /// TCP latency above this counts as an RTT spike
    pub rtt_spike_ms: f64,
    /// File-system latency above this counts as a slow operation
    pub slow_fs_ms: f64,

    /// Issue: connection failure rate (percent) above this
    pub connect_failure_pct: f64,
    /// Issue: TCP RTT spike rate (percent) above this
    pub rtt_spike_pct: f64,

    pub timeline_buckets: u32,

    /// Burst detection needs at least this many events
    pub burst_min_events: usize,
    pub burst_window: Duration,
    /// A window is a burst when its rate exceeds this multiple of the average
    pub burst_factor: f64,
    pub max_bursts: usize,

    pub pattern_windows: u32,
    pub min_pattern_window: Duration,
    /// Variance above `bursty_factor * mean` → bursty
    pub bursty_factor: f64,
    /// Variance below `steady_factor * mean` → steady
    pub steady_factor: f64,
}

pub const POLICY: Policy = Policy {
    top_n: 5,
    sentinel_targets: &["", "?", "unknown", "file"],
    rtt_spike_ms: 100.0,
    slow_fs_ms: 10.0,
    connect_failure_pct: 10.0,
    rtt_spike_pct: 5.0,
    timeline_buckets: 5,
    burst_min_events: 10,
    burst_window: Duration::from_secs(1),
    burst_factor: 2.0,
    max_bursts: 3,
    pattern_windows: 10,
    min_pattern_window: Duration::from_millis(100),
    bursty_factor: 0.5,
    steady_factor: 0.1,
};

/// Negative codes that are not failures for `category`.
#[must_use]
pub fn benign_errors(category: Category) -> &'static [i32] {
    match category {
        Category::TcpSend | Category::TcpRecv => &[EAGAIN],
        _ => &[],
    }
}

impl Policy {
    #[must_use]
    pub fn is_sentinel(&self, target: &str) -> bool {
        self.sentinel_targets.contains(&target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exemption_is_scoped_to_tcp() {
        assert_eq!(benign_errors(Category::TcpSend), &[EAGAIN]);
        assert!(benign_errors(Category::Connect).is_empty());
        assert!(benign_errors(Category::Write).is_empty());
    }

    #[test]
    fn test_sentinels() {
        for target in ["", "?", "unknown", "file"] {
            assert!(POLICY.is_sentinel(target));
        }
        assert!(!POLICY.is_sentinel("10.0.0.1:80"));
    }
}
