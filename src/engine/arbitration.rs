//! # engine::arbitration
//!
//! **BorderlineArbiter** — จ่าย latency เพิ่มเพื่อขอความเห็นจาก LLM เฉพาะเคสก้ำกึ่ง
//!
//! ```text
//! p_hit ∉ [band_low, band_high] ──▶ NotBorderline   (no annotation)
//! p_hit ∈ [band_low, band_high]
//!     │
//!     ├─ no generator / budget gone ──▶ Skipped
//!     └─ timeout(min(timeout_ms, remaining SLA), arbitrate(ctx))
//!            ├─ Ok(valid)        ──▶ Used      → "LLM_arb: tag=…, c_llm=…"
//!            ├─ Err / invalid    ──▶ Skipped   → "Arbitration skipped: …"
//!            └─ Elapsed          ──▶ Skipped
//! ```
//!
//! Arbitration only annotates the reason chain.  It never flips allow/deny.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::ArbitrationConfig;
use crate::models::{FeatureSnapshot, RiskEstimate, TemporalContext, Timeframe};
use crate::monitor::perf::{PerformanceMonitor, OP_ARBITRATION};

// ─── Contract ─────────────────────────────────────────────────────────────────

/// What the rationale generator sees.
#[derive(Debug, Clone, Serialize)]
pub struct ArbitrationContext<'a> {
    pub symbol:   &'a str,
    pub tf:       Timeframe,
    pub features: &'a FeatureSnapshot,
    pub estimate: &'a RiskEstimate,
    pub temporal: Option<&'a TemporalContext>,
}

/// `{rationale, confidence, tag}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Arbitration {
    pub rationale: String,
    #[serde(alias = "c_llm")]
    pub confidence: f64,
    #[serde(alias = "meta_tag")]
    pub tag: String,
}

#[derive(Debug, Error)]
pub enum ArbitrationError {
    #[error("rationale transport failed: {0}")]
    Transport(String),

    #[error("invalid rationale response: {0}")]
    InvalidResponse(String),
}

#[async_trait]
pub trait RationaleGenerator: Send + Sync {
    fn name(&self) -> &str;

    async fn arbitrate(&self, ctx: &ArbitrationContext<'_>) -> Result<Arbitration, ArbitrationError>;
}

// ─── Outcome ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum ArbitrationOutcome {
    NotBorderline,
    Used(Arbitration),
    Skipped(String),
}

impl ArbitrationOutcome {
    /// Lines appended to the reason chain (empty when not borderline).
    pub fn annotations(&self) -> Vec<String> {
        match self {
            ArbitrationOutcome::NotBorderline => Vec::new(),
            ArbitrationOutcome::Used(arb) => vec![
                format!("LLM_arb: tag={}, c_llm={:.2}", arb.tag, arb.confidence),
                format!("LLM_rationale: {}", arb.rationale),
            ],
            ArbitrationOutcome::Skipped(reason) => vec![format!("Arbitration skipped: {reason}")],
        }
    }
}

// ─── Arbiter ──────────────────────────────────────────────────────────────────

pub struct BorderlineArbiter<'a> {
    config:    &'a ArbitrationConfig,
    generator: Option<&'a dyn RationaleGenerator>,
    perf:      &'a PerformanceMonitor,
}

impl<'a> BorderlineArbiter<'a> {
    pub fn new(
        config:    &'a ArbitrationConfig,
        generator: Option<&'a dyn RationaleGenerator>,
        perf:      &'a PerformanceMonitor,
    ) -> Self {
        Self { config, generator, perf }
    }

    /// Inclusive on both ends.
    pub fn is_borderline(&self, p_hit: f64) -> bool {
        self.config.band_low <= p_hit && p_hit <= self.config.band_high
    }

    /// `budget` = time left before the decision SLA.
    pub async fn review(&self, ctx: &ArbitrationContext<'_>, budget: Duration) -> ArbitrationOutcome {
        if !self.is_borderline(ctx.estimate.p_hit) {
            return ArbitrationOutcome::NotBorderline;
        }
        if !self.config.enabled {
            return ArbitrationOutcome::Skipped("disabled by config".to_string());
        }
        let Some(generator) = self.generator else {
            return ArbitrationOutcome::Skipped("no rationale generator configured".to_string());
        };

        let limit = Duration::from_millis(self.config.timeout_ms).min(budget);
        if limit.is_zero() {
            return ArbitrationOutcome::Skipped("latency budget exhausted".to_string());
        }

        debug!(
            generator = generator.name(),
            p_hit     = ctx.estimate.p_hit,
            limit_ms  = limit.as_millis() as u64,
            "🧠 Borderline p_hit — requesting arbitration"
        );

        let started = Instant::now();
        let result  = tokio::time::timeout(limit, generator.arbitrate(ctx)).await;
        self.perf.record(OP_ARBITRATION, started.elapsed());

        match result {
            Ok(Ok(arb)) if (0.0..=1.0).contains(&arb.confidence) => ArbitrationOutcome::Used(arb),
            Ok(Ok(arb)) => {
                warn!(confidence = arb.confidence, "⚠️ Arbitration confidence out of range — ignored");
                ArbitrationOutcome::Skipped(format!("invalid confidence {}", arb.confidence))
            }
            Ok(Err(e)) => {
                warn!(generator = generator.name(), error = %e, "⚠️ Arbitration failed — proceeding numerically");
                ArbitrationOutcome::Skipped(e.to_string())
            }
            Err(_) => {
                warn!(generator = generator.name(), limit_ms = limit.as_millis() as u64, "⏱️ Arbitration timed out");
                ArbitrationOutcome::Skipped(format!("timeout after {}ms", limit.as_millis()))
            }
        }
    }
}
