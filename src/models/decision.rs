//! # models::decision
//!
//! Response bodies of the two decision endpoints.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::ExecutionDefaults;
use crate::models::Side;

// ─── Entry ────────────────────────────────────────────────────────────────────

/// Execution-mode descriptor handed to the broker adapter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionMode {
    #[serde(rename = "type")]
    pub mode: String,
    pub reduce_only_fallback: bool,
}

impl From<&ExecutionDefaults> for ExecutionMode {
    fn from(defaults: &ExecutionDefaults) -> Self {
        Self {
            mode:                 defaults.mode.clone(),
            reduce_only_fallback: defaults.reduce_only_fallback,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskMetrics {
    /// |mark − liq| / mark, recomputed per decision
    pub liq_buffer_pct: f64,
    /// Risk budget: mae_q999 + slip_q95 + ε
    pub lhs_pct: f64,
}

/// ผลการตัดสินใจเข้า Position
///
/// On deny every optional field is `None`; `reason_chain` is never empty.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntryDecision {
    pub allow:            bool,
    pub side:             Option<Side>,
    pub alloc_equity_pct: Option<f64>,
    pub exec:             Option<ExecutionMode>,
    pub risk:             Option<RiskMetrics>,
    pub reason_chain:     Vec<String>,
    pub runtime_ms:       f64,
    pub timestamp:        DateTime<Utc>,
}

impl EntryDecision {
    pub fn denied(reason_chain: Vec<String>, runtime_ms: f64) -> Self {
        Self {
            allow:            false,
            side:             None,
            alloc_equity_pct: None,
            exec:             None,
            risk:             None,
            reason_chain,
            runtime_ms,
            timestamp:        Utc::now(),
        }
    }
}

// ─── Exit ─────────────────────────────────────────────────────────────────────

/// Declaration order is action strength: hold < trail < reduce < close.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExitAction {
    Hold,
    Trail,
    Reduce,
    Close,
}

impl ExitAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExitAction::Hold   => "hold",
            ExitAction::Trail  => "trail",
            ExitAction::Reduce => "reduce",
            ExitAction::Close  => "close",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExitDecision {
    pub action: ExitAction,
    /// None for hold, exactly 1.0 for close
    pub reduce_pct: Option<f64>,
    pub reason: Vec<String>,
    pub runtime_ms: f64,
    pub timestamp: DateTime<Utc>,
}
