//! # monitor::perf
//!
//! **PerformanceMonitor** — rolling latency window per operation
//!
//! ```text
//! record("decision", 4.2ms)
//!     │
//!     ▼
//! ┌──────────── "decision" ─────────────┐
//! │ [oldest] … … … … … … … … … [newest] │  ≤ 100 samples, oldest evicted
//! └─────────────────────────────────────┘
//!     │
//!     └─ stats() → count / avg / p50 / p95 / p99 / max
//!        check_sla() → p95 ≤ SLA ?
//! ```
//!
//! The lock only covers append/trim and a copy of the window; sorting for
//! percentiles happens outside it so writers on the decision path never wait
//! on a reader doing math.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;

/// Samples kept per operation
pub const WINDOW_SIZE: usize = 100;

pub const OP_DECISION:    &str = "decision";
pub const OP_EXIT:        &str = "exit_decision";
pub const OP_PREDICTOR:   &str = "predictor";
pub const OP_ARBITRATION: &str = "arbitration";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LatencyStats {
    pub count:  usize,
    pub avg_ms: f64,
    pub p50_ms: f64,
    pub p95_ms: f64,
    pub p99_ms: f64,
    pub max_ms: f64,
}

#[derive(Debug, Default)]
pub struct PerformanceMonitor {
    windows: Mutex<HashMap<String, VecDeque<f64>>>,
}

impl PerformanceMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, operation: &str, duration: Duration) {
        self.record_ms(operation, duration.as_secs_f64() * 1000.0);
    }

    pub fn record_ms(&self, operation: &str, ms: f64) {
        if !ms.is_finite() || ms < 0.0 {
            return;
        }
        let mut windows = self.windows.lock();
        if !windows.contains_key(operation) {
            windows.insert(operation.to_string(), VecDeque::with_capacity(WINDOW_SIZE + 1));
        }
        let Some(window) = windows.get_mut(operation) else {
            return;
        };
        if window.len() >= WINDOW_SIZE {
            window.pop_front();
        }
        window.push_back(ms);
    }

    /// None = no samples yet.
    pub fn stats(&self, operation: &str) -> Option<LatencyStats> {
        let samples: Vec<f64> = {
            let windows = self.windows.lock();
            windows.get(operation)?.iter().copied().collect()
        };
        summarize(samples)
    }

    pub fn all_stats(&self) -> BTreeMap<String, LatencyStats> {
        let copies: Vec<(String, Vec<f64>)> = {
            let windows = self.windows.lock();
            windows
                .iter()
                .map(|(op, w)| (op.clone(), w.iter().copied().collect()))
                .collect()
        };
        copies
            .into_iter()
            .filter_map(|(op, samples)| summarize(samples).map(|s| (op, s)))
            .collect()
    }

    /// true when p95 ≤ `sla_ms`, or when there is nothing to judge yet.
    pub fn check_sla(&self, operation: &str, sla_ms: u64) -> bool {
        self.stats(operation)
            .map(|s| s.p95_ms <= sla_ms as f64)
            .unwrap_or(true)
    }
}

fn summarize(mut samples: Vec<f64>) -> Option<LatencyStats> {
    if samples.is_empty() {
        return None;
    }
    samples.sort_by(f64::total_cmp);
    let count = samples.len();
    let sum: f64 = samples.iter().sum();

    Some(LatencyStats {
        count,
        avg_ms: sum / count as f64,
        p50_ms: percentile(&samples, 50.0),
        p95_ms: percentile(&samples, 95.0),
        p99_ms: percentile(&samples, 99.0),
        max_ms: samples[count - 1],
    })
}

/// Linear interpolation between closest ranks; `sorted` must be non-empty.
fn percentile(sorted: &[f64], pct: f64) -> f64 {
    let rank = (pct / 100.0) * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    let frac = rank - lo as f64;
    sorted[lo] + (sorted[hi] - sorted[lo]) * frac
}
