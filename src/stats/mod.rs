//! Statistics and metrics
//!
//! Cumulative transport counters and point-in-time session snapshots.

pub mod metrics;

pub use metrics::{ByteCounters, SessionStats};
