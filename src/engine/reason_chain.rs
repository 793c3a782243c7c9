//! # engine::reason_chain
//!
//! **ReasonChainBuilder** — เหตุผลของทุกการตัดสินใจ เรียงลำดับแน่นอน
//!
//! ```text
//! ✓ All Gates PASSED / ✗ Gate FAILURE …   ← headline
//! [1..4] gate messages in fixed order
//! model metrics, top factors              ← allowed path only
//! fragility verdict
//! temporal context / arbitration notes
//! side + allocation
//! ```

use std::fmt::Write as _;

use crate::engine::gates::{GateReport, RiskDetail};
use crate::models::{EntryDecision, EntryRequest, FeatureSnapshot, RiskEstimate, TemporalContext};

const TOP_FACTORS: usize = 3;

#[derive(Debug, Default)]
pub struct ReasonChainBuilder {
    reasons: Vec<String>,
}

impl ReasonChainBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, reason: impl Into<String>) -> &mut Self {
        self.reasons.push(reason.into());
        self
    }

    pub fn extend<I, S>(&mut self, reasons: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.reasons.extend(reasons.into_iter().map(Into::into));
        self
    }

    /// Headline + all four gate messages.
    pub fn gates(&mut self, report: &GateReport) -> &mut Self {
        if report.all_passed() {
            self.push("✓ All Gates PASSED");
        } else {
            self.push(format!("✗ Gate FAILURE: {}/4 gates failed", report.failed_count()));
        }
        self.extend(report.messages())
    }

    pub fn model_metrics(&mut self, features: &FeatureSnapshot, estimate: &RiskEstimate, risk: &RiskDetail) -> &mut Self {
        self.push(format!("C_align={:.2}", features.c_align))
            .push(format!("C_of={:.2}", features.c_of))
            .push(format!("C_vision={:.2}", features.c_vision))
            .push(format!("p_hit={:.2}/T50={}", estimate.p_hit, estimate.t_hit_q50_bars))
            .push(format!(
                "MAE+Slip+ε ≤ LiqBuffer ({:.4} ≤ {:.4})",
                risk.risk_budget, risk.liq_buffer_pct
            ))
    }

    pub fn top_factors(&mut self, estimate: &RiskEstimate) -> &mut Self {
        let top = estimate.top_factors(TOP_FACTORS);
        if top.is_empty() {
            return self;
        }
        let rendered: Vec<String> = top.iter().map(|(name, w)| format!("{name}({w:+.2})")).collect();
        self.push(format!("Top factors: {}", rendered.join(", ")))
    }

    pub fn temporal(&mut self, temporal: Option<&TemporalContext>) -> &mut Self {
        if let Some(t) = temporal {
            self.push(format!(
                "Temporal: p_up_1pct={:.2}/p_dn_1pct={:.2}/t50={}",
                t.p_up_1pct, t.p_dn_1pct, t.t_hit50
            ));
        }
        self
    }

    /// Never empty.
    pub fn build(self) -> Vec<String> {
        if self.reasons.is_empty() {
            return vec!["✗ No decision reasons recorded".to_string()];
        }
        self.reasons
    }
}

// ─── Audit Rendering ──────────────────────────────────────────────────────────

/// Multi-line human-readable account of one entry decision.
pub fn render_audit(request: &EntryRequest, decision: &EntryDecision) -> String {
    let f = &request.features;
    let mut out = String::new();

    let hint = request.side_hint.map(|s| s.as_str().to_uppercase()).unwrap_or_else(|| "NONE".into());
    let _ = writeln!(out, "🤖 Trading Decision for {} ({hint})", request.symbol);
    let _ = writeln!(out, "📅 {} | ⚡ {:.2}ms", request.ts.format("%Y-%m-%d %H:%M:%S UTC"), decision.runtime_ms);

    match (decision.allow, decision.side, decision.alloc_equity_pct) {
        (true, Some(side), Some(alloc)) => {
            let _ = writeln!(out, "✅ APPROVED - {} position, {:.1}% of equity", side.as_str().to_uppercase(), alloc * 100.0);
            if let Some(exec) = &decision.exec {
                let _ = writeln!(out, "🎯 Execution: {}", exec.mode);
            }
        }
        _ => {
            let _ = writeln!(out, "❌ REJECTED");
        }
    }

    let _ = writeln!(out, "📊 Market Conditions:");
    let _ = writeln!(out, "  • Volatility: σ={:.4}, skew={:.2}", f.sigma_1m, f.skew_1m);
    let _ = writeln!(out, "  • Multi-timeframe: Z4H={:.2}, Z1H={:.2}, Z15m={:.2}", f.z_4h, f.z_1h, f.z_15m);
    let _ = writeln!(out, "  • Consensus: C_align={:.2}, C_of={:.2}, C_vision={:.2}", f.c_align, f.c_of, f.c_vision);
    let _ = writeln!(
        out,
        "  • Orderflow: OBI={:.2}, dCVD={:.2}, replenish={:.2}",
        f.order_flow.obi, f.order_flow.d_cvd, f.order_flow.replenish
    );
    let _ = writeln!(out, "  • Market: spread={:.1}bp, depth={:.0}", f.market.spread_bp, f.market.depth_px);

    let _ = writeln!(out, "🧠 Reasoning Chain:");
    for (i, reason) in decision.reason_chain.iter().enumerate() {
        let _ = writeln!(out, "  {}. {reason}", i + 1);
    }

    if let Some(risk) = &decision.risk {
        let _ = writeln!(out, "⚠️ Risk Assessment:");
        let _ = writeln!(out, "  • Liquidation Buffer: {:.2}%", risk.liq_buffer_pct * 100.0);
        let _ = writeln!(out, "  • Risk Budget: {:.2}%", risk.lhs_pct * 100.0);
        let _ = writeln!(out, "  • Safety Margin: {:.2}%", (risk.liq_buffer_pct - risk.lhs_pct) * 100.0);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DecisionConfig;
    use crate::engine::gates::GateEvaluator;
    use crate::models::examples;
    use crate::monitor::perf::PerformanceMonitor;

    fn report_for(request: &EntryRequest) -> GateReport {
        let config = DecisionConfig::default();
        let perf = PerformanceMonitor::new();
        GateEvaluator::new(&config, &perf).evaluate(request, request.ts)
    }

    #[test]
    fn test_empty_builder_is_never_empty() {
        assert_eq!(ReasonChainBuilder::new().build().len(), 1);
    }

    #[test]
    fn test_failed_gates_headline_and_messages() {
        let request = examples::vol_reject_entry_request();
        let mut chain = ReasonChainBuilder::new();
        chain.gates(&report_for(&request));
        let chain = chain.build();
        assert!(chain[0].starts_with("✗ Gate FAILURE"));
        assert_eq!(chain.len(), 5);
        assert!(chain[1].starts_with("Event & Latency Gate"));
        assert!(chain[4].starts_with("Liq-Buffer Gate"));
    }

    #[test]
    fn test_metrics_and_top_factors() {
        let request = examples::bull_entry_request();
        let report = report_for(&request);
        let mut chain = ReasonChainBuilder::new();
        chain.model_metrics(&request.features, &request.pgm, &report.risk).top_factors(&request.pgm);
        let chain = chain.build();
        assert_eq!(chain[0], "C_align=0.89");
        assert_eq!(chain[3], "p_hit=0.82/T50=4");
        assert_eq!(chain[4], "MAE+Slip+ε ≤ LiqBuffer (0.0053 ≤ 0.0335)");
        assert_eq!(chain[5], "Top factors: ofi_34(+0.25), z_4h(+0.18), vpin(-0.12)");
    }

    #[test]
    fn test_render_audit_lists_every_reason() {
        let request = examples::bull_entry_request();
        let decision = EntryDecision::denied(vec!["a".into(), "b".into()], 1.0);
        let text = render_audit(&request, &decision);
        assert!(text.contains("❌ REJECTED"));
        assert!(text.contains("  2. b"));
    }
}
