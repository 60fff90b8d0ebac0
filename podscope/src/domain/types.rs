//! Domain types providing compile-time safety and self-documentation
//!
//! `Event` is the unit flowing from the capture pipeline to every consumer.
//! It is a plain value: created once by the record codec, never mutated.

// Latency conversions intentionally lose precision for display
#![allow(clippy::cast_precision_loss)]

use podscope_common::{
    CATEGORY_CONNECT, CATEGORY_DNS, CATEGORY_FSYNC, CATEGORY_READ, CATEGORY_SCHED_SWITCH,
    CATEGORY_TCP_RECV, CATEGORY_TCP_SEND, CATEGORY_WRITE,
};
use serde::Serialize;
use std::fmt;

use crate::analysis::policy::benign_errors;

/// Process ID (TGID in kernel terms)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct Pid(pub u32);

impl fmt::Display for Pid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PID {}", self.0)
    }
}

/// Event category as tagged by the kernel side.
///
/// Unknown tags are kept verbatim so nothing is lost at decode time; they only
/// turn into an "unknown" label when formatted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    Dns,
    Connect,
    TcpSend,
    TcpRecv,
    Write,
    Fsync,
    SchedSwitch,
    Read,
    Unknown(u32),
}

impl Category {
    #[must_use]
    pub fn from_tag(tag: u32) -> Self {
        match tag {
            CATEGORY_DNS => Self::Dns,
            CATEGORY_CONNECT => Self::Connect,
            CATEGORY_TCP_SEND => Self::TcpSend,
            CATEGORY_TCP_RECV => Self::TcpRecv,
            CATEGORY_WRITE => Self::Write,
            CATEGORY_FSYNC => Self::Fsync,
            CATEGORY_SCHED_SWITCH => Self::SchedSwitch,
            CATEGORY_READ => Self::Read,
            other => Self::Unknown(other),
        }
    }

    #[must_use]
    pub fn tag(self) -> u32 {
        match self {
            Self::Dns => CATEGORY_DNS,
            Self::Connect => CATEGORY_CONNECT,
            Self::TcpSend => CATEGORY_TCP_SEND,
            Self::TcpRecv => CATEGORY_TCP_RECV,
            Self::Write => CATEGORY_WRITE,
            Self::Fsync => CATEGORY_FSYNC,
            Self::SchedSwitch => CATEGORY_SCHED_SWITCH,
            Self::Read => CATEGORY_READ,
            Self::Unknown(tag) => tag,
        }
    }

    /// Subsystem label used in one-line event messages
    #[must_use]
    pub fn subsystem(self) -> &'static str {
        match self {
            Self::Dns => "DNS",
            Self::Connect | Self::TcpSend | Self::TcpRecv => "NET",
            Self::Write | Self::Fsync | Self::Read => "FS",
            Self::SchedSwitch => "CPU",
            Self::Unknown(_) => "UNKNOWN",
        }
    }

    #[must_use]
    pub fn is_tcp(self) -> bool {
        matches!(self, Self::TcpSend | Self::TcpRecv)
    }

    #[must_use]
    pub fn is_filesystem(self) -> bool {
        matches!(self, Self::Write | Self::Fsync | Self::Read)
    }
}

/// A decoded, annotated kernel event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    /// Monotonic timestamp in nanoseconds (`CLOCK_MONOTONIC`)
    pub timestamp_ns: u64,
    pub pid: Pid,
    /// Best-effort process name, empty when it could not be resolved
    pub process_name: String,
    pub category: Category,
    /// Operation latency, RTT estimate or block time depending on category
    pub latency_ns: u64,
    /// 0 on success, negative errno otherwise
    pub error: i32,
    pub target: String,
    pub details: String,
}

impl Event {
    #[must_use]
    pub fn latency_ms(&self) -> f64 {
        self.latency_ns as f64 / 1_000_000.0
    }

    /// Whether this event counts as a failure for its category.
    ///
    /// TCP categories only count negative codes outside their benign list;
    /// every other category counts any non-zero code.
    #[must_use]
    pub fn is_error(&self) -> bool {
        if self.category.is_tcp() {
            self.error < 0 && !benign_errors(self.category).contains(&self.error)
        } else {
            self.error != 0
        }
    }

    /// One-line human readable description, `None` for unremarkable events
    #[must_use]
    pub fn message(&self) -> Option<String> {
        let latency_ms = self.latency_ms();
        let body = match self.category {
            Category::Dns if self.error != 0 => {
                format!("lookup {} failed: error {}", self.target, self.error)
            }
            Category::Dns => format!("lookup {} took {latency_ms:.2}ms", self.target),
            Category::Connect => {
                let target = match self.target.as_str() {
                    "" | "?" => "unknown",
                    other => other,
                };
                if self.error != 0 {
                    format!("connect to {target} failed: error {}", self.error)
                } else if latency_ms > 1.0 {
                    format!("connect to {target} took {latency_ms:.2}ms")
                } else {
                    return None;
                }
            }
            Category::TcpSend | Category::TcpRecv => {
                let (verb, spike) =
                    if self.category == Category::TcpSend { ("send", "latency") } else { ("recv", "RTT") };
                if self.is_error() {
                    format!("TCP {verb} error: {}", self.error)
                } else if latency_ms > crate::analysis::policy::POLICY.rtt_spike_ms {
                    format!("TCP {verb} {spike} spike: {latency_ms:.2}ms")
                } else {
                    return None;
                }
            }
            Category::Write => format!("write() to {} took {latency_ms:.2}ms", self.target),
            Category::Read => format!("read() from {} took {latency_ms:.2}ms", self.target),
            Category::Fsync => format!("fsync() to {} took {latency_ms:.2}ms", self.target),
            Category::SchedSwitch => format!("thread blocked {latency_ms:.2}ms"),
            Category::Unknown(tag) => format!("event type {tag}"),
        };
        Some(format!("[{}] {body}", self.category.subsystem()))
    }
}
