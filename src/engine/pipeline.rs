//! # engine::pipeline
//!
//! **DecisionPipeline** — entry decision ภายใต้งบเวลา ~70ms
//!
//! ```text
//! EntryRequest
//!     │
//!     ├─ [1] deadline check ─────────────────────────────▶ deny "Latency budget exceeded"
//!     ├─ [2] GateEvaluator (4 gates, fixed order) ───────▶ deny "Gate FAILURE"
//!     ├─ [3] deadline check (≥ 2ms left for predictor) ──▶ deny "Latency budget exceeded"
//!     ├─ [4] PredictorPort   timeout(min(25ms, left)) ───▶ deny "Prediction unavailable"   (fail-closed)
//!     ├─ [5] FragilityAnalyzer ──────────────────────────▶ deny "FRAGILITY FAIL"
//!     │        └─ Err → annotate, continue                                              (fail-open)
//!     ├─ [6] BorderlineArbiter  timeout(min(15ms, left))  → annotate only               (fail-open)
//!     ├─ [7] AllocationPolicy   side vote + clamp(0.6 + 2(p − 0.75))
//!     └─ [8] ReasonChainBuilder → EntryDecision
//! ```
//!
//! Every path records its runtime under `decision` and returns a non-empty
//! reason chain.  The pipeline holds one config snapshot for its whole life.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::config::DecisionConfig;
use crate::engine::allocation::allocate;
use crate::engine::arbitration::{ArbitrationContext, BorderlineArbiter, RationaleGenerator};
use crate::engine::fragility::{FragilityAnalyzer, FragilityVerdict};
use crate::engine::gates::{GateEvaluator, GateReport, RiskDetail};
use crate::engine::reason_chain::ReasonChainBuilder;
use crate::models::{EntryDecision, EntryRequest, ExecutionMode, RiskEstimate, RiskMetrics};
use crate::monitor::perf::{PerformanceMonitor, OP_DECISION, OP_PREDICTOR};
use crate::predictor::{PredictorError, PredictorPort};

/// Less than this left after the gates and the predictor call is not worth starting.
const MIN_PREDICTOR_WINDOW: Duration = Duration::from_millis(2);

/// Decision plus the gate report it was built from (absent when the
/// deadline expired before the gates ran).
#[derive(Debug, Clone)]
pub struct DecisionOutcome {
    pub decision: EntryDecision,
    pub gates:    Option<GateReport>,
}

pub struct DecisionPipeline {
    config:    Arc<DecisionConfig>,
    perf:      Arc<PerformanceMonitor>,
    predictor: Arc<dyn PredictorPort>,
    rationale: Option<Arc<dyn RationaleGenerator>>,
}

impl DecisionPipeline {
    pub fn new(
        config:    Arc<DecisionConfig>,
        perf:      Arc<PerformanceMonitor>,
        predictor: Arc<dyn PredictorPort>,
        rationale: Option<Arc<dyn RationaleGenerator>>,
    ) -> Self {
        Self { config, perf, predictor, rationale }
    }

    pub async fn decide(&self, request: &EntryRequest) -> DecisionOutcome {
        self.decide_at(request, Instant::now(), Utc::now()).await
    }

    /// `started` anchors the latency budget, `now` is the wall clock used for
    /// blacklist windows.
    pub async fn decide_at(&self, request: &EntryRequest, started: Instant, now: DateTime<Utc>) -> DecisionOutcome {
        let outcome = self.run(request, started, now).await;

        let runtime_ms = started.elapsed().as_secs_f64() * 1000.0;
        self.perf.record_ms(OP_DECISION, runtime_ms);

        let mut decision = outcome.decision;
        decision.runtime_ms = runtime_ms;
        decision.timestamp  = now;

        if decision.allow {
            info!(
                symbol     = %request.symbol,
                side       = ?decision.side,
                alloc      = ?decision.alloc_equity_pct,
                runtime_ms = %format!("{runtime_ms:.2}"),
                "✅ Entry APPROVED"
            );
        } else {
            info!(
                symbol     = %request.symbol,
                reason     = decision.reason_chain.first().map(String::as_str).unwrap_or(""),
                runtime_ms = %format!("{runtime_ms:.2}"),
                "❌ Entry REJECTED"
            );
        }

        DecisionOutcome { decision, gates: outcome.gates }
    }

    async fn run(&self, request: &EntryRequest, started: Instant, now: DateTime<Utc>) -> DecisionOutcome {
        let config = &*self.config;
        let budget = Duration::from_millis(config.latency_slo_ms);
        let remaining = || budget.saturating_sub(started.elapsed());

        // ── [1] Deadline before any work ──────────────────────────────────────
        if remaining().is_zero() {
            let chain = vec![self.budget_exceeded("gate evaluation", started)];
            return deny(chain, None);
        }

        // ── [2] Gates ─────────────────────────────────────────────────────────
        let report = GateEvaluator::new(config, &self.perf).evaluate(request, now);
        let mut chain = ReasonChainBuilder::new();
        chain.gates(&report);

        if !report.all_passed() {
            return deny(chain.build(), Some(report));
        }

        // ── [3] Deadline before the predictor ─────────────────────────────────
        if remaining() < MIN_PREDICTOR_WINDOW {
            chain.push(self.budget_exceeded("prediction", started));
            return deny(chain.build(), Some(report));
        }

        // ── [4] Predictor (fail-closed) ───────────────────────────────────────
        let estimate = match self.predict(request, remaining()).await {
            Ok(estimate) => estimate,
            Err(e) => {
                warn!(symbol = %request.symbol, predictor = self.predictor.name(), error = %e, "⚠️ Prediction unavailable");
                chain.push(format!("✗ Prediction unavailable: {e}"));
                return deny(chain.build(), Some(report));
            }
        };

        let features = &request.features;
        let risk = RiskDetail::compute(&features.market, &estimate, config.gates.epsilon);
        chain.model_metrics(features, &estimate, &risk).top_factors(&estimate);

        // ── [5] Fragility (fail-open on error) ────────────────────────────────
        let has_arbiter = self.rationale.is_some() && config.arbitration.enabled;
        match FragilityAnalyzer::new(config, has_arbiter).analyze(features, request.side_hint, &estimate, &risk) {
            Ok(verdict @ FragilityVerdict::Fragile(_)) => {
                chain.push(verdict.message());
                return deny(chain.build(), Some(report));
            }
            Ok(verdict) => {
                chain.push(verdict.message());
            }
            Err(e) => {
                warn!(symbol = %request.symbol, error = %e, "⚠️ Fragility analysis failed — check skipped");
                chain.push(format!("Fragility test skipped due to error: {e}"));
            }
        }

        chain.temporal(request.temporal.as_ref());

        // ── [6] Borderline arbitration (annotation only) ──────────────────────
        let ctx = ArbitrationContext {
            symbol:   &request.symbol,
            tf:       request.tf,
            features,
            estimate: &estimate,
            temporal: request.temporal.as_ref(),
        };
        let arbiter = BorderlineArbiter::new(&config.arbitration, self.rationale.as_deref(), &self.perf);
        let arbitration = arbiter.review(&ctx, remaining()).await;
        chain.extend(arbitration.annotations());

        // ── [7] Side + allocation ─────────────────────────────────────────────
        let allocation = allocate(features, request.side_hint, estimate.p_hit);
        chain
            .push(format!(
                "Side {} (votes long={}, short={})",
                allocation.side, allocation.votes.long, allocation.votes.short
            ))
            .push(format!("Allocation {:.1}% of equity", allocation.fraction * 100.0));

        // ── [8] Assemble ──────────────────────────────────────────────────────
        let decision = EntryDecision {
            allow:            true,
            side:             Some(allocation.side),
            alloc_equity_pct: Some(allocation.fraction),
            exec:             Some(ExecutionMode::from(&config.exec)),
            risk:             Some(RiskMetrics {
                liq_buffer_pct: risk.liq_buffer_pct,
                lhs_pct:        risk.risk_budget,
            }),
            reason_chain:     chain.build(),
            runtime_ms:       0.0,
            timestamp:        Utc::now(),
        };
        DecisionOutcome { decision, gates: Some(report) }
    }

    async fn predict(&self, request: &EntryRequest, remaining: Duration) -> Result<RiskEstimate, PredictorError> {
        let limit = Duration::from_millis(self.config.predictor.timeout_ms).min(remaining);
        let started = Instant::now();
        let result = tokio::time::timeout(limit, self.predictor.predict(request)).await;
        self.perf.record(OP_PREDICTOR, started.elapsed());

        let estimate = result.map_err(|_| PredictorError::Timeout(limit.as_millis() as u64))??;
        estimate
            .validate()
            .map_err(|e| PredictorError::InvalidEstimate(e.to_string()))?;
        Ok(estimate)
    }

    fn budget_exceeded(&self, stage: &str, started: Instant) -> String {
        format!(
            "✗ Latency budget exceeded before {stage} ({:.1}ms of {}ms used)",
            started.elapsed().as_secs_f64() * 1000.0,
            self.config.latency_slo_ms
        )
    }
}

fn deny(reason_chain: Vec<String>, gates: Option<GateReport>) -> DecisionOutcome {
    DecisionOutcome {
        decision: EntryDecision::denied(reason_chain, 0.0),
        gates,
    }
}
