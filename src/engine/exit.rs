//! # engine::exit
//!
//! **ExitSignalFusion + ExitPipeline** — ตัดสินใจออกจาก Position ที่เปิดอยู่
//!
//! ```text
//! Position + ExitUpdate
//!     │
//!     ├─ hazard strength    h_t / hazard_thresh                  × 0.35
//!     ├─ p_hit decay        max(0, (floor − p_hit) / floor)      × 0.25
//!     ├─ order-flow flip    max(0, adverse dCVD / 2)             × 0.20
//!     ├─ replenish decline  max(0, (0.6 − replenish) / 0.6)      × 0.10
//!     └─ timing pressure    max(0, (T50 − 10) / 20)              × 0.10
//!                                                         Σ → urgency ∈ [0,1]
//!
//! Action = first matching rule (thresholds pick the action, urgency only
//! scales the reduce size of the hazard rule):
//!   [1] h_t > 1.5·thr            → close 100%
//!   [2] p_hit < 0.6·floor        → close 100%
//!   [3] h_t > thr                → reduce min(R·(1+urgency), 0.8)
//!   [4] p_hit < floor            → reduce R
//!   [5] adverse |dCVD| > 1.5     → reduce 0.7·R
//!   [6] T50 > 3·grace            → reduce 0.5·R
//!   [7] upl > 0.5% & h_t > 0.7·thr → trail 0.3·R
//!   [8] otherwise                → hold
//! ```
//!
//! A fusion error never reaches the caller: the pipeline answers with a
//! conservative `reduce 50%` instead.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use serde::Serialize;
use thiserror::Error;
use tracing::{error, info};

use crate::config::{DecisionConfig, ExitThresholds};
use crate::models::{ExitAction, ExitDecision, ExitRequest, ExitUpdate, Position, Side};
use crate::monitor::perf::{PerformanceMonitor, OP_EXIT};

// ─── Constants ────────────────────────────────────────────────────────────────

const W_HAZARD:    f64 = 0.35;
const W_DECAY:     f64 = 0.25;
const W_FLIP:      f64 = 0.20;
const W_REPLENISH: f64 = 0.10;
const W_TIMING:    f64 = 0.10;

pub const URGENCY_WEIGHTS: [(&str, f64); 5] = [
    ("hazard_strength", W_HAZARD),
    ("phit_decay", W_DECAY),
    ("orderflow_flip", W_FLIP),
    ("replenish_decline", W_REPLENISH),
    ("timing_pressure", W_TIMING),
];

const TIMING_BASE_BARS:  f64 = 10.0;
const TIMING_SPAN_BARS:  f64 = 20.0;
const FLIP_SCALE:        f64 = 2.0;
const REPLENISH_HEALTHY: f64 = 0.6;

const CRITICAL_HAZARD_MULT: f64 = 1.5;
const CRITICAL_PHIT_MULT:   f64 = 0.6;
const HAZARD_REDUCE_CAP:    f64 = 0.8;
const OF_FLIP_DCVD:         f64 = 1.5;
const OF_FLIP_MULT:         f64 = 0.7;
const TIMEOUT_GRACE_MULT:   u32 = 3;
const TIMEOUT_MULT:         f64 = 0.5;
const TRAIL_HAZARD_MULT:    f64 = 0.7;
const TRAIL_MULT:           f64 = 0.3;

const FALLBACK_REDUCE: f64 = 0.5;

// ─── Signals ──────────────────────────────────────────────────────────────────

#[derive(Debug, Error, PartialEq)]
pub enum FusionError {
    #[error("non-finite exit input `{0}`")]
    NonFinite(&'static str),

    #[error("exit threshold `{name}` = {value} is unusable")]
    InvalidThreshold { name: &'static str, value: f64 },
}

/// Normalized signal strengths, each ≥ 0.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExitSignals {
    pub hazard_strength:   f64,
    pub phit_decay:        f64,
    pub timing_pressure:   f64,
    pub orderflow_flip:    f64,
    pub replenish_decline: f64,
}

impl ExitSignals {
    /// Weighted sum clamped to [0, 1].
    pub fn urgency(&self) -> f64 {
        let raw = W_HAZARD * self.hazard_strength
            + W_DECAY * self.phit_decay
            + W_FLIP * self.orderflow_flip
            + W_REPLENISH * self.replenish_decline
            + W_TIMING * self.timing_pressure;
        raw.clamp(0.0, 1.0)
    }
}

/// Bars past which T50 counts as timeout risk.  Saturates for absurd grace values.
pub fn timeout_bars(cfg: &ExitThresholds) -> u32 {
    TIMEOUT_GRACE_MULT.saturating_mul(cfg.t_hit_grace_bars)
}

/// dCVD moving against the position, positive when adverse.
fn adverse_cvd(side: Side, d_cvd: f64) -> f64 {
    -side.sign() * d_cvd
}

pub fn fuse(position: &Position, updates: &ExitUpdate, cfg: &ExitThresholds) -> Result<ExitSignals, FusionError> {
    for (name, value) in [
        ("h_t", updates.h_t),
        ("p_hit", updates.p_hit),
        ("dCVD", updates.d_cvd),
        ("replenish", updates.replenish),
        ("upl_pct", position.upl_pct),
    ] {
        if !value.is_finite() {
            return Err(FusionError::NonFinite(name));
        }
    }
    if !(cfg.hazard_thresh > 0.0) {
        return Err(FusionError::InvalidThreshold { name: "hazard_thresh", value: cfg.hazard_thresh });
    }
    if !(cfg.phit_floor > 0.0) {
        return Err(FusionError::InvalidThreshold { name: "phit_floor", value: cfg.phit_floor });
    }

    Ok(ExitSignals {
        hazard_strength:   updates.h_t / cfg.hazard_thresh,
        phit_decay:        ((cfg.phit_floor - updates.p_hit) / cfg.phit_floor).max(0.0),
        timing_pressure:   ((updates.t_hit_q50_bars as f64 - TIMING_BASE_BARS) / TIMING_SPAN_BARS).max(0.0),
        orderflow_flip:    (adverse_cvd(position.side, updates.d_cvd) / FLIP_SCALE).max(0.0),
        replenish_decline: ((REPLENISH_HEALTHY - updates.replenish) / REPLENISH_HEALTHY).max(0.0),
    })
}

// ─── Action Selection ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct ExitVerdict {
    pub action:     ExitAction,
    pub reduce_pct: Option<f64>,
    pub reasons:    Vec<String>,
}

impl ExitVerdict {
    fn new(action: ExitAction, reduce_pct: Option<f64>, reason: String) -> Self {
        Self { action, reduce_pct, reasons: vec![reason] }
    }
}

pub fn determine_action(
    position: &Position,
    updates:  &ExitUpdate,
    signals:  &ExitSignals,
    cfg:      &ExitThresholds,
) -> ExitVerdict {
    let urgency = signals.urgency();
    let h       = updates.h_t;
    let p       = updates.p_hit;
    let thr     = cfg.hazard_thresh;
    let floor   = cfg.phit_floor;
    let r       = cfg.reduce_pct;

    let mut verdict = if h > CRITICAL_HAZARD_MULT * thr {
        ExitVerdict::new(
            ExitAction::Close,
            Some(1.0),
            format!("Critical hazard {h:.3} > {:.3}", CRITICAL_HAZARD_MULT * thr),
        )
    } else if p < CRITICAL_PHIT_MULT * floor {
        ExitVerdict::new(
            ExitAction::Close,
            Some(1.0),
            format!("Critical p_hit {p:.3} < {:.3}", CRITICAL_PHIT_MULT * floor),
        )
    } else if h > thr {
        ExitVerdict::new(
            ExitAction::Reduce,
            Some((r * (1.0 + urgency)).min(HAZARD_REDUCE_CAP)),
            format!("hazard {h:.3} > thr {thr:.3}"),
        )
    } else if p < floor {
        ExitVerdict::new(ExitAction::Reduce, Some(r), format!("p_hit {p:.3} < floor {floor:.3}"))
    } else if adverse_cvd(position.side, updates.d_cvd) > OF_FLIP_DCVD {
        let bias = match position.side {
            Side::Long  => "bearish for long",
            Side::Short => "bullish for short",
        };
        ExitVerdict::new(
            ExitAction::Reduce,
            Some(OF_FLIP_MULT * r),
            format!("of_flip: dCVD {:.2} ({bias})", updates.d_cvd),
        )
    } else if updates.t_hit_q50_bars > timeout_bars(cfg) {
        ExitVerdict::new(
            ExitAction::Reduce,
            Some(TIMEOUT_MULT * r),
            format!(
                "timeout_risk: T50 {} bars > {} bars",
                updates.t_hit_q50_bars,
                timeout_bars(cfg)
            ),
        )
    } else if position.upl_pct > cfg.trail_min_upl_pct && h > TRAIL_HAZARD_MULT * thr {
        ExitVerdict::new(
            ExitAction::Trail,
            Some(TRAIL_MULT * r),
            format!("profit_protection: UPL {:.2}% with hazard {h:.3} rising", position.upl_pct),
        )
    } else {
        ExitVerdict::new(ExitAction::Hold, None, "All signals within acceptable range".to_string())
    };

    verdict.reasons.push(format!(
        "urgency={urgency:.2} (hazard={:.2}, decay={:.2}, flip={:.2}, replenish={:.2}, timing={:.2})",
        signals.hazard_strength,
        signals.phit_decay,
        signals.orderflow_flip,
        signals.replenish_decline,
        signals.timing_pressure,
    ));
    verdict
}

// ─── Pipeline ─────────────────────────────────────────────────────────────────

pub struct ExitPipeline {
    config: Arc<DecisionConfig>,
    perf:   Arc<PerformanceMonitor>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScenarioResult {
    pub scenario:   &'static str,
    pub h_t:        f64,
    pub p_hit:      f64,
    #[serde(rename = "dCVD")]
    pub d_cvd:      f64,
    pub action:     ExitAction,
    pub reduce_pct: Option<f64>,
    pub reasons:    Vec<String>,
    pub runtime_ms: f64,
}

impl ExitPipeline {
    pub fn new(config: Arc<DecisionConfig>, perf: Arc<PerformanceMonitor>) -> Self {
        Self { config, perf }
    }

    pub fn decide(&self, request: &ExitRequest) -> ExitDecision {
        let started = Instant::now();
        let cfg = &self.config.exit;

        let verdict = match fuse(&request.position, &request.updates, cfg) {
            Ok(signals) => determine_action(&request.position, &request.updates, &signals, cfg),
            Err(e) => {
                error!(error = %e, "❌ Exit fusion failed — conservative reduce");
                ExitVerdict {
                    action:     ExitAction::Reduce,
                    reduce_pct: Some(FALLBACK_REDUCE),
                    reasons:    vec![
                        format!("Error in exit logic: {e}"),
                        "Conservative reduce as fallback".to_string(),
                    ],
                }
            }
        };

        let elapsed = started.elapsed();
        self.perf.record(OP_EXIT, elapsed);

        info!(
            side       = %request.position.side,
            h_t        = request.updates.h_t,
            p_hit      = request.updates.p_hit,
            action     = verdict.action.as_str(),
            reduce_pct = ?verdict.reduce_pct,
            "🚪 Exit decision"
        );

        ExitDecision {
            action:     verdict.action,
            reduce_pct: verdict.reduce_pct,
            reason:     verdict.reasons,
            runtime_ms: elapsed.as_secs_f64() * 1000.0,
            timestamp:  Utc::now(),
        }
    }

    /// Run the canned stress scenarios against one position.  Scenario runs
    /// go to a scratch monitor so they never show up in live latency stats.
    pub fn simulate_scenarios(&self, position: &Position) -> Vec<ScenarioResult> {
        let sandbox = ExitPipeline::new(Arc::clone(&self.config), Arc::new(PerformanceMonitor::new()));
        // OF Flip ใช้ dCVD ฝั่งที่สวนทาง position เสมอ
        let adverse = -2.0 * position.side.sign();
        let scenarios: [(&'static str, f64, f64, f64); 5] = [
            ("Normal", 0.15, 0.70, 0.2 * position.side.sign()),
            ("High Hazard", 0.35, 0.65, 0.1 * position.side.sign()),
            ("Low P_hit", 0.20, 0.45, 0.1 * position.side.sign()),
            ("OF Flip", 0.15, 0.70, adverse),
            ("Critical", 0.50, 0.30, -1.5 * position.side.sign()),
        ];

        scenarios
            .into_iter()
            .map(|(scenario, h_t, p_hit, d_cvd)| {
                let request = ExitRequest {
                    position: position.clone(),
                    updates:  ExitUpdate {
                        p_hit,
                        mae_q90:        0.003,
                        t_hit_q50_bars: 8,
                        h_t,
                        d_cvd,
                        replenish:      0.65,
                    },
                };
                let decision = sandbox.decide(&request);
                ScenarioResult {
                    scenario,
                    h_t,
                    p_hit,
                    d_cvd,
                    action:     decision.action,
                    reduce_pct: decision.reduce_pct,
                    reasons:    decision.reason,
                    runtime_ms: decision.runtime_ms,
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::examples;

    fn pipeline() -> ExitPipeline {
        ExitPipeline::new(Arc::new(DecisionConfig::default()), Arc::new(PerformanceMonitor::new()))
    }

    fn decide_with(edit: impl FnOnce(&mut ExitRequest)) -> ExitDecision {
        let mut request = examples::exit_request();
        edit(&mut request);
        pipeline().decide(&request)
    }

    /// Quiet short position: nothing fires.
    fn calm(request: &mut ExitRequest) {
        request.updates.h_t = 0.10;
        request.updates.p_hit = 0.70;
        request.updates.d_cvd = -0.5;
        request.updates.replenish = 0.70;
        request.updates.t_hit_q50_bars = 4;
        request.position.upl_pct = 0.2;
    }

    #[test]
    fn test_example_reduces_scaled_by_urgency() {
        let request = examples::exit_request();
        let cfg = ExitThresholds::default();
        let signals = fuse(&request.position, &request.updates, &cfg).unwrap();
        assert!((signals.urgency() - 0.6).abs() < 0.01, "{}", signals.urgency());

        let decision = pipeline().decide(&request);
        assert_eq!(decision.action, ExitAction::Reduce);
        assert!((decision.reduce_pct.unwrap() - 0.8).abs() < 1e-4);
        assert!(decision.reason[0].starts_with("hazard 0.370 > thr 0.300"));
    }

    #[test]
    fn test_critical_hazard_closes_regardless() {
        let decision = decide_with(|r| {
            calm(r);
            r.updates.h_t = 0.50;
        });
        assert_eq!(decision.action, ExitAction::Close);
        assert_eq!(decision.reduce_pct, Some(1.0));
        assert!(decision.reason[0].starts_with("Critical hazard"));
    }

    #[test]
    fn test_critical_p_hit_closes() {
        let decision = decide_with(|r| {
            calm(r);
            r.updates.p_hit = 0.25;
        });
        assert_eq!(decision.action, ExitAction::Close);
        assert_eq!(decision.reduce_pct, Some(1.0));
    }

    #[test]
    fn test_p_hit_below_floor_reduces_default() {
        let decision = decide_with(|r| {
            calm(r);
            r.updates.p_hit = 0.45;
        });
        assert_eq!(decision.action, ExitAction::Reduce);
        assert_eq!(decision.reduce_pct, Some(0.5));
    }

    #[test]
    fn test_orderflow_flip_is_side_aware() {
        // short + strongly positive dCVD = adverse
        let decision = decide_with(|r| {
            calm(r);
            r.updates.d_cvd = 2.0;
        });
        assert_eq!(decision.action, ExitAction::Reduce);
        assert!((decision.reduce_pct.unwrap() - 0.35).abs() < 1e-12);
        assert!(decision.reason[0].contains("bullish for short"));

        // same dCVD on a long is favourable
        let decision = decide_with(|r| {
            calm(r);
            r.position.side = Side::Long;
            r.updates.d_cvd = 2.0;
        });
        assert_eq!(decision.action, ExitAction::Hold);
    }

    #[test]
    fn test_timeout_risk() {
        let decision = decide_with(|r| {
            calm(r);
            r.updates.t_hit_q50_bars = 10;
        });
        assert_eq!(decision.action, ExitAction::Reduce);
        assert_eq!(decision.reduce_pct, Some(0.25));
        assert!(decision.reason[0].starts_with("timeout_risk"));
    }

    #[test]
    fn test_profit_protection_trails() {
        let decision = decide_with(|r| {
            calm(r);
            r.position.upl_pct = 1.2;
            r.updates.h_t = 0.25;
        });
        assert_eq!(decision.action, ExitAction::Trail);
        assert!((decision.reduce_pct.unwrap() - 0.15).abs() < 1e-12);
    }

    #[test]
    fn test_calm_position_holds() {
        let decision = decide_with(calm);
        assert_eq!(decision.action, ExitAction::Hold);
        assert_eq!(decision.reduce_pct, None);
        assert_eq!(decision.reason[0], "All signals within acceptable range");
        assert!(decision.reason[1].starts_with("urgency="));
    }

    #[test]
    fn test_hazard_monotonicity() {
        let cfg = ExitThresholds::default();
        for upl in [0.2, 1.2] {
            let mut last_urgency = -1.0;
            let mut last_action = ExitAction::Hold;
            for step in 0..=100 {
                let mut request = examples::exit_request();
                calm(&mut request);
                request.position.upl_pct = upl;
                request.updates.h_t = step as f64 / 100.0;

                let signals = fuse(&request.position, &request.updates, &cfg).unwrap();
                let urgency = signals.urgency();
                let action = determine_action(&request.position, &request.updates, &signals, &cfg).action;

                assert!(urgency >= last_urgency, "urgency fell at h_t={}", request.updates.h_t);
                assert!(action >= last_action, "action fell at h_t={}", request.updates.h_t);
                last_urgency = urgency;
                last_action = action;
            }
            assert_eq!(last_action, ExitAction::Close);
        }
    }

    #[test]
    fn test_urgency_clamped() {
        let signals = ExitSignals {
            hazard_strength:   3.0,
            phit_decay:        1.0,
            timing_pressure:   2.0,
            orderflow_flip:    4.0,
            replenish_decline: 1.0,
        };
        assert_eq!(signals.urgency(), 1.0);
    }

    #[test]
    fn test_fusion_error_degrades_to_conservative_reduce() {
        let decision = decide_with(|r| r.updates.h_t = f64::NAN);
        assert_eq!(decision.action, ExitAction::Reduce);
        assert_eq!(decision.reduce_pct, Some(0.5));
        assert!(decision.reason[0].starts_with("Error in exit logic"));
        assert_eq!(decision.reason[1], "Conservative reduce as fallback");
    }

    #[test]
    fn test_zero_threshold_is_fusion_error() {
        let request = examples::exit_request();
        let cfg = ExitThresholds { hazard_thresh: 0.0, ..ExitThresholds::default() };
        assert!(matches!(
            fuse(&request.position, &request.updates, &cfg),
            Err(FusionError::InvalidThreshold { name: "hazard_thresh", .. })
        ));
    }

    #[test]
    fn test_scenarios() {
        let pipeline = pipeline();
        let results = pipeline.simulate_scenarios(&examples::exit_request().position);
        let actions: Vec<(&str, ExitAction)> = results.iter().map(|r| (r.scenario, r.action)).collect();
        assert_eq!(
            actions,
            vec![
                ("Normal", ExitAction::Hold),
                ("High Hazard", ExitAction::Reduce),
                ("Low P_hit", ExitAction::Reduce),
                ("OF Flip", ExitAction::Reduce),
                ("Critical", ExitAction::Close),
            ]
        );
        assert!(pipeline.perf.stats(OP_EXIT).is_none());
    }

    #[test]
    fn test_huge_grace_bars_saturate() {
        let mut config = DecisionConfig::default();
        config.exit.t_hit_grace_bars = 2_000_000_000;
        assert!(config.validate().is_ok());
        assert_eq!(timeout_bars(&config.exit), u32::MAX);

        let pipeline = ExitPipeline::new(Arc::new(config), Arc::new(PerformanceMonitor::new()));
        let mut request = examples::exit_request();
        calm(&mut request);
        request.updates.t_hit_q50_bars = 500;
        let decision = pipeline.decide(&request);
        assert_eq!(decision.action, ExitAction::Hold);
        assert_eq!(pipeline.perf.stats(OP_EXIT).unwrap().count, 1);
    }
}
