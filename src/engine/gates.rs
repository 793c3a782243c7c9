//! # engine::gates
//!
//! **GateEvaluator** — 4 ด่านตรวจก่อนอนุญาตให้เข้า Position
//!
//! ```text
//! FeatureSnapshot + pgm quote
//!     │
//!     ├─ [1] Event & Latency  → blacklist window? p95 latency > SLA?
//!     ├─ [2] Volatility       → activity limits, |skew| > 0.3, regime band
//!     ├─ [3] Consensus        → C_align / C_of / C_vision / pine_match
//!     └─ [4] Liq-Buffer       → MAE + slip + ε ≤ |mark − liq| / mark, depth, spread
//!
//! ALL four are evaluated, never short-circuited, so the reason chain can
//! report every check in the same order on every request.
//! ```

use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, warn};

use crate::config::{DecisionConfig, RegimeBand, VolSweetSpot};
use crate::models::{EntryRequest, FeatureSnapshot, MarketMicro, RiskEstimate, Side};
use crate::monitor::perf::{PerformanceMonitor, OP_DECISION};

// ─── Gate Kind ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GateKind {
    EventLatency,
    Volatility,
    Consensus,
    LiqBuffer,
}

impl GateKind {
    /// Report order; never changes.
    pub const ORDER: [GateKind; 4] = [
        GateKind::EventLatency,
        GateKind::Volatility,
        GateKind::Consensus,
        GateKind::LiqBuffer,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            GateKind::EventLatency => "event_latency",
            GateKind::Volatility   => "volatility",
            GateKind::Consensus    => "consensus",
            GateKind::LiqBuffer    => "liq_buffer",
        }
    }

    /// Prefix used in gate messages
    pub fn label(&self) -> &'static str {
        match self {
            GateKind::EventLatency => "Event & Latency Gate",
            GateKind::Volatility   => "Vol Gate",
            GateKind::Consensus    => "Consensus Gate",
            GateKind::LiqBuffer    => "Liq-Buffer Gate",
        }
    }
}

impl fmt::Display for GateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ─── Results ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GateResult {
    pub gate:    GateKind,
    pub passed:  bool,
    pub message: String,
}

/// One sub-check inside a gate.
struct Check {
    passed:  bool,
    message: String,
}

impl Check {
    fn new(passed: bool, message: String) -> Self {
        Self { passed, message }
    }
}

/// PASS lists every sub-check, FAIL lists only the failing ones.
fn compose(gate: GateKind, checks: Vec<Check>) -> GateResult {
    let passed = checks.iter().all(|c| c.passed);
    let message = if passed {
        let parts: Vec<&str> = checks.iter().map(|c| c.message.as_str()).collect();
        format!("{} PASS: {}", gate.label(), parts.join(", "))
    } else {
        let parts: Vec<&str> = checks
            .iter()
            .filter(|c| !c.passed)
            .map(|c| c.message.as_str())
            .collect();
        format!("{} FAIL: {}", gate.label(), parts.join("; "))
    };
    GateResult { gate, passed, message }
}

/// Liquidation distance + risk budget, kept for fragility and audit.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RiskDetail {
    pub liq_buffer_pct:  f64,
    pub mae_q999:        f64,
    pub slip_q95:        f64,
    pub epsilon:         f64,
    pub risk_budget:     f64,
    /// buffer − budget
    pub safety_margin:   f64,
    /// budget / buffer × 100
    pub utilization_pct: f64,
}

impl RiskDetail {
    /// Always derived from the live mark/liq pair, never cached.
    pub fn compute(market: &MarketMicro, estimate: &RiskEstimate, epsilon: f64) -> Self {
        let buffer = liquidation_buffer(market.mark, market.liq_price);
        let budget = estimate.mae_q999 + estimate.slip_q95 + epsilon;
        let utilization_pct = if buffer > 0.0 { budget / buffer * 100.0 } else { 100.0 };

        Self {
            liq_buffer_pct:  buffer,
            mae_q999:        estimate.mae_q999,
            slip_q95:        estimate.slip_q95,
            epsilon,
            risk_budget:     budget,
            safety_margin:   buffer - budget,
            utilization_pct,
        }
    }
}

/// `|mark − liq| / mark`; 0 when mark ≤ 0 or either price is not finite.
pub fn liquidation_buffer(mark: f64, liq_price: f64) -> f64 {
    if !(mark > 0.0) || !mark.is_finite() || !liq_price.is_finite() {
        return 0.0;
    }
    (mark - liq_price).abs() / mark
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GateReport {
    pub results: [GateResult; 4],
    pub risk:    RiskDetail,
}

impl GateReport {
    pub fn all_passed(&self) -> bool {
        self.results.iter().all(|r| r.passed)
    }

    pub fn failed_count(&self) -> usize {
        self.results.iter().filter(|r| !r.passed).count()
    }

    pub fn messages(&self) -> impl Iterator<Item = &str> {
        self.results.iter().map(|r| r.message.as_str())
    }
}

// ─── Regime ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Regime {
    Bull,
    Bear,
}

impl Regime {
    /// Side hint wins; otherwise the sign of skew (0 → bull).
    pub fn resolve(side_hint: Option<Side>, skew: f64) -> Self {
        match side_hint {
            Some(Side::Long)  => Regime::Bull,
            Some(Side::Short) => Regime::Bear,
            None if skew < 0.0 => Regime::Bear,
            None => Regime::Bull,
        }
    }

    pub fn band<'a>(&self, spots: &'a VolSweetSpot) -> &'a RegimeBand {
        match self {
            Regime::Bull => &spots.bull,
            Regime::Bear => &spots.bear,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Regime::Bull => "bull",
            Regime::Bear => "bear",
        }
    }
}

// ─── Evaluator ────────────────────────────────────────────────────────────────

pub struct GateEvaluator<'a> {
    config: &'a DecisionConfig,
    perf:   &'a PerformanceMonitor,
}

impl<'a> GateEvaluator<'a> {
    pub fn new(config: &'a DecisionConfig, perf: &'a PerformanceMonitor) -> Self {
        Self { config, perf }
    }

    /// Run all four gates in fixed order.
    pub fn evaluate(&self, request: &EntryRequest, now: DateTime<Utc>) -> GateReport {
        let features = &request.features;

        let event       = self.event_latency_gate(now);
        let volatility  = self.volatility_gate(features, request.side_hint);
        let consensus   = self.consensus_gate(features);
        let (liq, risk) = self.liquidation_gate(&features.market, &request.pgm);

        let report = GateReport { results: [event, volatility, consensus, liq], risk };

        for result in &report.results {
            debug!(gate = %result.gate, passed = result.passed, "{}", result.message);
        }
        report
    }

    // ── [1] Event & Latency ───────────────────────────────────────────────────

    pub fn event_latency_gate(&self, now: DateTime<Utc>) -> GateResult {
        let mut checks = Vec::with_capacity(2);

        let mut active = Vec::new();
        for window in &self.config.blacklist_events {
            match window.bounds() {
                Ok((start, end)) if start <= now && now < end => active.push(format!(
                    "In blacklist event window: {} ({} to {})",
                    window.name, window.start_time, window.end_time
                )),
                Ok(_) => {}
                // ไม่ block การเทรดเพราะ config พัง: log แล้วข้าม
                Err(e) => warn!(window = %window.name, error = %e, "⚠️ Skipping unparsable blacklist window"),
            }
        }
        if active.is_empty() {
            checks.push(Check::new(true, "Blacklist events: CLEAR".to_string()));
        } else {
            checks.extend(active.into_iter().map(|msg| Check::new(false, msg)));
        }

        let sla_ms = self.config.latency_slo_ms;
        match self.perf.stats(OP_DECISION) {
            None => checks.push(Check::new(true, "Latency: no samples yet".to_string())),
            Some(stats) if stats.p95_ms > sla_ms as f64 => checks.push(Check::new(
                false,
                format!("P95 latency {:.1}ms > SLA {sla_ms}ms", stats.p95_ms),
            )),
            Some(stats) => checks.push(Check::new(
                true,
                format!("P95 latency {:.1}ms <= SLA {sla_ms}ms", stats.p95_ms),
            )),
        }

        compose(GateKind::EventLatency, checks)
    }

    // ── [2] Volatility ────────────────────────────────────────────────────────

    pub fn volatility_gate(&self, features: &FeatureSnapshot, side_hint: Option<Side>) -> GateResult {
        let g     = &self.config.gates;
        let sigma = features.sigma_1m;
        let skew  = features.skew_1m;
        let mut checks = Vec::with_capacity(4);

        // Regime-independent activity limits
        if sigma < g.sigma_floor {
            checks.push(Check::new(false, format!(
                "Volatility too low (sigma {sigma:.4} < {:.4}), market likely stalled", g.sigma_floor
            )));
        } else if sigma > g.sigma_ceiling {
            checks.push(Check::new(false, format!(
                "Volatility too high (sigma {sigma:.4} > {:.4}), extreme market conditions", g.sigma_ceiling
            )));
        } else {
            checks.push(Check::new(
                sigma.is_finite(),
                format!("Sigma {sigma:.4} within activity limits [{:.4}, {:.4}]", g.sigma_floor, g.sigma_ceiling),
            ));
        }

        // ต้อง > 0.3 แบบ strict, เท่ากับ 0.3 ถือว่า neutral
        if skew.abs() > g.skew_neutral_abs {
            checks.push(Check::new(true, format!("|Skew| {:.2} > {:.2}", skew.abs(), g.skew_neutral_abs)));
        } else {
            checks.push(Check::new(false, format!(
                "|Skew| {:.2} <= {:.2}, too neutral", skew.abs(), g.skew_neutral_abs
            )));
        }

        let regime = Regime::resolve(side_hint, skew);
        let band   = regime.band(&self.config.vol_sweet_spot);
        let name   = regime.as_str();

        let in_band = band.sigma_min <= sigma && sigma <= band.sigma_max;
        checks.push(Check::new(in_band, format!(
            "Sigma {sigma:.4} {} {name} range [{:.4}, {:.4}]",
            if in_band { "in" } else { "not in" },
            band.sigma_min,
            band.sigma_max,
        )));

        let skew_check = match regime {
            Regime::Bull if skew >= band.skew_bound => Check::new(true, format!("Skew {skew:.2} >= bull min {:.2}", band.skew_bound)),
            Regime::Bull => Check::new(false, format!("Skew {skew:.2} < bull min {:.2}", band.skew_bound)),
            Regime::Bear if skew <= band.skew_bound => Check::new(true, format!("Skew {skew:.2} <= bear max {:.2}", band.skew_bound)),
            Regime::Bear => Check::new(false, format!("Skew {skew:.2} > bear max {:.2}", band.skew_bound)),
        };
        checks.push(skew_check);

        compose(GateKind::Volatility, checks)
    }

    // ── [3] Consensus ─────────────────────────────────────────────────────────

    pub fn consensus_gate(&self, features: &FeatureSnapshot) -> GateResult {
        let g = &self.config.gates;
        let score = |name: &str, value: f64, min: f64| {
            if value >= min {
                Check::new(true, format!("{name}={value:.2} >= {min:.2}"))
            } else {
                Check::new(false, format!("{name}={value:.2} < {min:.2}"))
            }
        };

        let checks = vec![
            score("C_align", features.c_align, g.c_align_min),
            score("C_of", features.c_of, g.c_of_min),
            score("C_vision", features.c_vision, g.c_vision_min),
            Check::new(features.pine_match, format!("Pine_match={}", features.pine_match)),
        ];

        compose(GateKind::Consensus, checks)
    }

    // ── [4] Liquidation Buffer ────────────────────────────────────────────────

    pub fn liquidation_gate(&self, market: &MarketMicro, quote: &RiskEstimate) -> (GateResult, RiskDetail) {
        let g    = &self.config.gates;
        let risk = RiskDetail::compute(market, quote, g.epsilon);
        let mut checks = Vec::with_capacity(3);

        if !(market.mark > 0.0) {
            checks.push(Check::new(false, format!(
                "Invalid mark price {} (<= 0), liquidation buffer undefined", market.mark
            )));
        } else if !(risk.liq_buffer_pct > 0.0) {
            checks.push(Check::new(false, "Invalid liquidation buffer (<= 0)".to_string()));
        } else if risk.risk_budget <= risk.liq_buffer_pct {
            checks.push(Check::new(true, format!(
                "Risk budget {:.4} <= LiqBuffer {:.4}", risk.risk_budget, risk.liq_buffer_pct
            )));
        } else {
            checks.push(Check::new(false, format!(
                "Risk budget {:.4} > LiqBuffer {:.4}", risk.risk_budget, risk.liq_buffer_pct
            )));
        }

        checks.push(if market.depth_px >= g.min_depth_px {
            Check::new(true, format!("Depth {:.0} >= min {:.0}", market.depth_px, g.min_depth_px))
        } else {
            Check::new(false, format!("Depth {:.0} < min {:.0}", market.depth_px, g.min_depth_px))
        });

        checks.push(if market.spread_bp <= g.spread_bp_max {
            Check::new(true, format!("Spread {:.1}bp <= max {:.1}bp", market.spread_bp, g.spread_bp_max))
        } else {
            Check::new(false, format!("Spread {:.1}bp > max {:.1}bp", market.spread_bp, g.spread_bp_max))
        });

        (compose(GateKind::LiqBuffer, checks), risk)
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BlacklistWindow;
    use crate::models::examples;

    fn now() -> DateTime<Utc> {
        DateTime::from_timestamp(1_757_844_000, 0).unwrap()
    }

    fn evaluate(config: &DecisionConfig, request: &EntryRequest) -> GateReport {
        let perf = PerformanceMonitor::new();
        GateEvaluator::new(config, &perf).evaluate(request, now())
    }

    #[test]
    fn test_bull_example_passes_all_gates() {
        let report = evaluate(&DecisionConfig::default(), &examples::bull_entry_request());
        assert!(report.all_passed(), "{:?}", report.results);
        assert!((report.risk.liq_buffer_pct - 1450.5 / 43250.5).abs() < 1e-12);
        assert!((report.risk.risk_budget - 0.0053).abs() < 1e-12);
    }

    #[test]
    fn test_bear_example_passes_all_gates() {
        let report = evaluate(&DecisionConfig::default(), &examples::bear_entry_request());
        assert!(report.all_passed(), "{:?}", report.results);
    }

    #[test]
    fn test_report_order_is_fixed() {
        for request in [
            examples::bull_entry_request(),
            examples::bear_entry_request(),
            examples::vol_reject_entry_request(),
        ] {
            let report = evaluate(&DecisionConfig::default(), &request);
            let kinds: Vec<GateKind> = report.results.iter().map(|r| r.gate).collect();
            assert_eq!(kinds, GateKind::ORDER.to_vec());
            assert_eq!(report.messages().count(), 4);
        }
    }

    #[test]
    fn test_vol_reject_reports_both_sub_checks() {
        let report = evaluate(&DecisionConfig::default(), &examples::vol_reject_entry_request());
        let vol = &report.results[1];
        assert!(!vol.passed);
        assert!(vol.message.starts_with("Vol Gate FAIL"));
        assert!(vol.message.contains("too neutral"), "{}", vol.message);
        assert!(vol.message.contains("not in bear range"), "{}", vol.message);
    }

    #[test]
    fn test_skew_exactly_at_neutral_bound_rejected() {
        let config = DecisionConfig::default();
        let perf = PerformanceMonitor::new();
        let gates = GateEvaluator::new(&config, &perf);

        let mut features = examples::bull_entry_request().features;
        features.skew_1m = 0.3;
        let result = gates.volatility_gate(&features, None);
        assert!(!result.passed);
        assert!(result.message.contains("too neutral"));

        features.skew_1m = -0.3;
        assert!(gates.volatility_gate(&features, None).message.contains("too neutral"));
    }

    #[test]
    fn test_regime_from_skew_sign_without_hint() {
        assert_eq!(Regime::resolve(None, -0.4), Regime::Bear);
        assert_eq!(Regime::resolve(None, 0.4), Regime::Bull);
        assert_eq!(Regime::resolve(Some(Side::Short), 0.4), Regime::Bear);
    }

    #[test]
    fn test_activity_limits() {
        let config = DecisionConfig::default();
        let perf = PerformanceMonitor::new();
        let gates = GateEvaluator::new(&config, &perf);
        let mut features = examples::bull_entry_request().features;

        features.sigma_1m = 0.0002;
        assert!(gates.volatility_gate(&features, Some(Side::Long)).message.contains("market likely stalled"));

        features.sigma_1m = 0.02;
        assert!(gates.volatility_gate(&features, Some(Side::Long)).message.contains("extreme market conditions"));
    }

    #[test]
    fn test_consensus_reports_every_failure() {
        let mut request = examples::bull_entry_request();
        request.features.c_align    = 0.60;
        request.features.c_vision   = 0.50;
        request.features.pine_match = false;

        let report = evaluate(&DecisionConfig::default(), &request);
        let consensus = &report.results[2];
        assert!(!consensus.passed);
        assert!(consensus.message.contains("C_align=0.60 < 0.85"));
        assert!(consensus.message.contains("C_vision=0.50 < 0.75"));
        assert!(consensus.message.contains("Pine_match=false"));
        assert!(!consensus.message.contains("C_of"));
    }

    #[test]
    fn test_liq_gate_budget_exceeds_buffer() {
        let mut request = examples::bull_entry_request();
        request.features.market.liq_price = 43100.0; // buffer ≈ 0.0035
        let report = evaluate(&DecisionConfig::default(), &request);
        assert!(!report.results[3].passed);
        assert!(report.results[3].message.contains("> LiqBuffer"));
    }

    #[test]
    fn test_liq_gate_fails_closed_on_bad_mark() {
        let config = DecisionConfig::default();
        let perf = PerformanceMonitor::new();
        let gates = GateEvaluator::new(&config, &perf);
        let request = examples::bull_entry_request();

        let mut market = request.features.market.clone();
        market.mark = 0.0;
        let (result, risk) = gates.liquidation_gate(&market, &request.pgm);
        assert!(!result.passed);
        assert_eq!(risk.liq_buffer_pct, 0.0);
        assert!(result.message.contains("Invalid mark price"));
    }

    #[test]
    fn test_liq_gate_depth_and_spread() {
        let mut request = examples::bull_entry_request();
        request.features.market.depth_px  = 500_000.0;
        request.features.market.spread_bp = 7.5;
        let report = evaluate(&DecisionConfig::default(), &request);
        let msg = &report.results[3].message;
        assert!(msg.contains("Depth 500000 < min 1000000"), "{msg}");
        assert!(msg.contains("Spread 7.5bp > max 5.0bp"), "{msg}");
    }

    #[test]
    fn test_blacklist_window_half_open() {
        let mut config = DecisionConfig::default();
        config.blacklist_events.push(BlacklistWindow {
            name:       "FOMC".into(),
            start_time: "2025-09-14T09:00:00Z".into(),
            end_time:   "2025-09-14T10:00:00Z".into(),
        });
        let perf = PerformanceMonitor::new();
        let gates = GateEvaluator::new(&config, &perf);

        // now() == end → outside
        assert!(gates.event_latency_gate(now()).passed);

        let inside = now() - chrono::Duration::minutes(1);
        let result = gates.event_latency_gate(inside);
        assert!(!result.passed);
        assert!(result.message.contains("In blacklist event window: FOMC"));

        let start = now() - chrono::Duration::hours(1);
        assert!(!gates.event_latency_gate(start).passed);
    }

    #[test]
    fn test_unparsable_blacklist_window_skipped() {
        let mut config = DecisionConfig::default();
        config.blacklist_events.push(BlacklistWindow {
            name:       "broken".into(),
            start_time: "not-a-date".into(),
            end_time:   "2025-09-14T11:00:00Z".into(),
        });
        let perf = PerformanceMonitor::new();
        let result = GateEvaluator::new(&config, &perf).event_latency_gate(now());
        assert!(result.passed);
        assert!(result.message.contains("Blacklist events: CLEAR"));
    }

    #[test]
    fn test_latency_sla_violation_fails_gate() {
        let config = DecisionConfig::default();
        let perf = PerformanceMonitor::new();
        for _ in 0..20 {
            perf.record_ms(OP_DECISION, 150.0);
        }
        let result = GateEvaluator::new(&config, &perf).event_latency_gate(now());
        assert!(!result.passed);
        assert!(result.message.contains("P95 latency 150.0ms > SLA 70ms"));
    }
}
