//! # monitor::trace
//!
//! **TraceStore** — เก็บประวัติ entry decision ล่าสุดไว้ดู pattern
//!
//! ```text
//! record(trace) ──▶ [ … ≤ 1000 traces, oldest evicted … ]
//!                         │
//!                         └─ patterns(100) → approval rate, avg runtime,
//!                                            pass rate per gate
//! ```

use std::collections::{BTreeMap, VecDeque};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use uuid::Uuid;

use crate::engine::gates::{GateKind, GateReport};
use crate::models::{EntryDecision, EntryRequest, Side};

pub const TRACE_CAPACITY: usize = 1000;
pub const PATTERN_WINDOW: usize = 100;

#[derive(Debug, Clone, Serialize)]
pub struct GateOutcome {
    pub gate:   GateKind,
    pub passed: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct DecisionTrace {
    pub request_id:  Uuid,
    pub symbol:      String,
    pub side_hint:   Option<Side>,
    pub allow:       bool,
    pub side:        Option<Side>,
    /// Empty when the deadline expired before the gates ran
    pub gates:       Vec<GateOutcome>,
    pub runtime_ms:  f64,
    pub recorded_at: DateTime<Utc>,
}

impl DecisionTrace {
    pub fn new(request: &EntryRequest, decision: &EntryDecision, gates: Option<&GateReport>) -> Self {
        Self {
            request_id:  Uuid::new_v4(),
            symbol:      request.symbol.clone(),
            side_hint:   request.side_hint,
            allow:       decision.allow,
            side:        decision.side,
            gates:       gates
                .map(|report| {
                    report
                        .results
                        .iter()
                        .map(|r| GateOutcome { gate: r.gate, passed: r.passed })
                        .collect()
                })
                .unwrap_or_default(),
            runtime_ms:  decision.runtime_ms,
            recorded_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DecisionPatterns {
    pub total_decisions:        usize,
    pub approval_rate:          f64,
    pub avg_processing_time_ms: f64,
    pub gate_pass_rates:        BTreeMap<GateKind, f64>,
}

#[derive(Debug)]
pub struct TraceStore {
    traces:   Mutex<VecDeque<DecisionTrace>>,
    capacity: usize,
}

impl Default for TraceStore {
    fn default() -> Self {
        Self::with_capacity(TRACE_CAPACITY)
    }
}

impl TraceStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            traces: Mutex::new(VecDeque::with_capacity(capacity.min(TRACE_CAPACITY))),
            capacity: capacity.max(1),
        }
    }

    pub fn record(&self, trace: DecisionTrace) {
        let mut traces = self.traces.lock();
        if traces.len() == self.capacity {
            traces.pop_front();
        }
        traces.push_back(trace);
    }

    pub fn len(&self) -> usize {
        self.traces.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Newest first.
    pub fn recent(&self, limit: usize) -> Vec<DecisionTrace> {
        self.traces.lock().iter().rev().take(limit).cloned().collect()
    }

    /// `None` when nothing has been recorded.
    pub fn patterns(&self, window: usize) -> Option<DecisionPatterns> {
        let recent = self.recent(window);
        if recent.is_empty() {
            return None;
        }

        let total = recent.len();
        let approved = recent.iter().filter(|t| t.allow).count();
        let runtime: f64 = recent.iter().map(|t| t.runtime_ms).sum();

        let mut tally: BTreeMap<GateKind, (usize, usize)> = BTreeMap::new();
        for outcome in recent.iter().flat_map(|t| &t.gates) {
            let entry = tally.entry(outcome.gate).or_default();
            entry.0 += 1;
            if outcome.passed {
                entry.1 += 1;
            }
        }

        Some(DecisionPatterns {
            total_decisions:        total,
            approval_rate:          approved as f64 / total as f64,
            avg_processing_time_ms: runtime / total as f64,
            gate_pass_rates:        tally
                .into_iter()
                .map(|(gate, (seen, passed))| (gate, passed as f64 / seen as f64))
                .collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DecisionConfig;
    use crate::engine::gates::GateEvaluator;
    use crate::models::examples;
    use crate::monitor::perf::PerformanceMonitor;

    fn trace_for(request: &EntryRequest, allow: bool, runtime_ms: f64) -> DecisionTrace {
        let config = DecisionConfig::default();
        let perf = PerformanceMonitor::new();
        let report = GateEvaluator::new(&config, &perf).evaluate(request, request.ts);
        let mut decision = EntryDecision::denied(vec!["x".into()], runtime_ms);
        decision.allow = allow;
        DecisionTrace::new(request, &decision, Some(&report))
    }

    #[test]
    fn test_empty_store_has_no_patterns() {
        assert!(TraceStore::new().patterns(PATTERN_WINDOW).is_none());
    }

    #[test]
    fn test_capacity_evicts_oldest() {
        let store = TraceStore::with_capacity(3);
        for ms in [1.0, 2.0, 3.0, 4.0] {
            store.record(trace_for(&examples::bull_entry_request(), true, ms));
        }
        assert_eq!(store.len(), 3);
        let recent = store.recent(10);
        assert_eq!(recent[0].runtime_ms, 4.0);
        assert_eq!(recent[2].runtime_ms, 2.0);
    }

    #[test]
    fn test_patterns_rates() {
        let store = TraceStore::new();
        store.record(trace_for(&examples::bull_entry_request(), true, 4.0));
        store.record(trace_for(&examples::vol_reject_entry_request(), false, 2.0));

        let patterns = store.patterns(PATTERN_WINDOW).unwrap();
        assert_eq!(patterns.total_decisions, 2);
        assert_eq!(patterns.approval_rate, 0.5);
        assert_eq!(patterns.avg_processing_time_ms, 3.0);
        assert_eq!(patterns.gate_pass_rates[&GateKind::Volatility], 0.5);
        assert_eq!(patterns.gate_pass_rates[&GateKind::Consensus], 1.0);
    }

    #[test]
    fn test_patterns_window_limits_to_recent() {
        let store = TraceStore::new();
        store.record(trace_for(&examples::vol_reject_entry_request(), false, 1.0));
        store.record(trace_for(&examples::bull_entry_request(), true, 1.0));
        let patterns = store.patterns(1).unwrap();
        assert_eq!(patterns.total_decisions, 1);
        assert_eq!(patterns.approval_rate, 1.0);
    }
}
