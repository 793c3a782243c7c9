//! # engine::fragility
//!
//! **FragilityAnalyzer** — ผ่านทุก Gate แล้ว แต่ผ่านแบบ "เฉียดฉิว" หรือเปล่า?
//!
//! ```text
//! C_align  headroom  (v − thr) / (1 − thr)  < 5%      → fragile
//! C_of     headroom                         < 5%      → fragile
//! p_hit    headroom                         < 5%      → fragile  (deferred to a live arbiter inside its band)
//! LiqBuffer − RiskBudget                    < 0.005   → fragile
//! sigma distance to regime band edge        < 0.0002  → fragile
//! ```
//!
//! A fragile verdict denies the entry.  An `Err` means the analysis itself
//! could not run; the pipeline logs it and lets the decision continue.

use thiserror::Error;

use crate::config::DecisionConfig;
use crate::engine::gates::{Regime, RiskDetail};
use crate::models::{FeatureSnapshot, RiskEstimate, Side};

#[derive(Debug, Error, PartialEq)]
pub enum FragilityError {
    #[error("non-finite input `{0}`")]
    NonFinite(&'static str),

    #[error("{regime} sigma band [{min}, {max}] is degenerate")]
    DegenerateBand { regime: &'static str, min: f64, max: f64 },

    #[error("threshold `{name}` = {value} leaves no headroom")]
    NoHeadroom { name: &'static str, value: f64 },
}

#[derive(Debug, Clone, PartialEq)]
pub enum FragilityVerdict {
    /// `deferred_p_hit`: p_hit sits in the arbitration band, its margin is left to the arbiter
    Robust { deferred_p_hit: bool },
    Fragile(Vec<String>),
}

impl FragilityVerdict {
    pub fn is_fragile(&self) -> bool {
        matches!(self, FragilityVerdict::Fragile(_))
    }

    pub fn message(&self) -> String {
        match self {
            FragilityVerdict::Robust { deferred_p_hit: false } => "Fragility test PASSED".to_string(),
            FragilityVerdict::Robust { deferred_p_hit: true } => {
                "Fragility test PASSED (p_hit margin deferred to borderline arbitration)".to_string()
            }
            FragilityVerdict::Fragile(issues) => format!("FRAGILITY FAIL: {}", issues.join("; ")),
        }
    }
}

pub struct FragilityAnalyzer<'a> {
    config: &'a DecisionConfig,
    /// A rationale generator is wired in and will review borderline p_hit
    has_arbiter: bool,
}

impl<'a> FragilityAnalyzer<'a> {
    pub fn new(config: &'a DecisionConfig, has_arbiter: bool) -> Self {
        Self { config, has_arbiter }
    }

    pub fn analyze(
        &self,
        features:  &FeatureSnapshot,
        side_hint: Option<Side>,
        estimate:  &RiskEstimate,
        risk:      &RiskDetail,
    ) -> Result<FragilityVerdict, FragilityError> {
        let g   = &self.config.gates;
        let tol = &self.config.fragility;

        finite("C_align", features.c_align)?;
        finite("C_of", features.c_of)?;
        finite("sigma_1m", features.sigma_1m)?;
        finite("p_hit", estimate.p_hit)?;
        finite("safety_margin", risk.safety_margin)?;

        let mut issues = Vec::new();

        // ── Consensus margins ──────────────────────────────────────────────────
        for (name, value, threshold) in [
            ("C_align", features.c_align, g.c_align_min),
            ("C_of", features.c_of, g.c_of_min),
        ] {
            let room = headroom(name, value, threshold)?;
            if room < tol.relative_margin {
                issues.push(format!(
                    "{name} margin only {:.3} ({:.1}% of headroom)",
                    value - threshold,
                    room * 100.0
                ));
            }
        }

        // ── Hit-probability margin ─────────────────────────────────────────────
        // ไม่มี arbiter จริง = ตัดสินด้วยตัวเลขอย่างเดียว
        let arb = &self.config.arbitration;
        let deferred_p_hit = self.has_arbiter
            && arb.enabled
            && arb.band_low <= estimate.p_hit
            && estimate.p_hit <= arb.band_high;
        if !deferred_p_hit {
            let room = headroom("p_hit_min", estimate.p_hit, g.p_hit_min)?;
            if room < tol.relative_margin {
                issues.push(format!(
                    "p_hit margin only {:.3} ({:.1}% of headroom)",
                    estimate.p_hit - g.p_hit_min,
                    room * 100.0
                ));
            }
        }

        // ── Liquidation safety margin ──────────────────────────────────────────
        if risk.safety_margin < tol.liq_safety_margin {
            issues.push(format!(
                "LiqBuffer safety margin only {:.4} (< {:.4})",
                risk.safety_margin, tol.liq_safety_margin
            ));
        }

        // ── Sigma proximity to the regime band edges ───────────────────────────
        let regime = Regime::resolve(side_hint, features.skew_1m);
        let band   = regime.band(&self.config.vol_sweet_spot);
        if !(band.sigma_min < band.sigma_max) {
            return Err(FragilityError::DegenerateBand {
                regime: regime.as_str(),
                min:    band.sigma_min,
                max:    band.sigma_max,
            });
        }
        let sigma = features.sigma_1m;
        if (sigma - band.sigma_min).abs() < tol.sigma_edge {
            issues.push(format!("Sigma {sigma:.5} close to lower bound {:.5}", band.sigma_min));
        }
        if (band.sigma_max - sigma).abs() < tol.sigma_edge {
            issues.push(format!("Sigma {sigma:.5} close to upper bound {:.5}", band.sigma_max));
        }

        if issues.is_empty() {
            Ok(FragilityVerdict::Robust { deferred_p_hit })
        } else {
            Ok(FragilityVerdict::Fragile(issues))
        }
    }
}

fn finite(name: &'static str, value: f64) -> Result<(), FragilityError> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(FragilityError::NonFinite(name))
    }
}

/// Share of the room above `threshold` (up to 1.0) that `value` uses.
fn headroom(name: &'static str, value: f64, threshold: f64) -> Result<f64, FragilityError> {
    if !(threshold < 1.0) {
        return Err(FragilityError::NoHeadroom { name, value: threshold });
    }
    Ok((value - threshold) / (1.0 - threshold))
}
