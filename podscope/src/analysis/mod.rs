//! Diagnostic analysis of captured events
//!
//! This module contains pure logic: statistics, temporal patterns and the
//! report model, separated from capture and from terminal presentation.

pub mod diagnostician;
pub mod patterns;
pub mod policy;
pub mod report;
pub mod stats;

pub use diagnostician::{monotonic_now_ns, CollectionWindow, Diagnostician};
pub use policy::{Policy, POLICY};
pub use report::{Format, Report, Section};
