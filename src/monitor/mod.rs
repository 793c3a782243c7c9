//! Latency instrumentation and decision history.

pub mod perf;
pub mod trace;

pub use perf::{LatencyStats, PerformanceMonitor};
pub use trace::{DecisionPatterns, DecisionTrace, TraceStore};
