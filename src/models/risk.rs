//! # models::risk
//!
//! [`RiskEstimate`] is the narrow contract between the pipeline and whatever
//! predictor sits behind `PredictorPort`.  The pipeline never looks inside the
//! model, only at these numbers.

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::models::features::{require_finite, require_non_negative, require_unit};

/// `(factor name, signed weight)`
pub type Factor = (String, f64);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskEstimate {
    /// Probability of reaching target before stop ∈ [0,1]
    pub p_hit: f64,
    /// 99.9th percentile adverse excursion (fraction of price)
    pub mae_q999: f64,
    /// 95th percentile slippage (fraction of price)
    pub slip_q95: f64,
    /// Median bars to target, ≥ 1
    pub t_hit_q50_bars: u32,
    #[serde(default)]
    pub factors: Vec<Factor>,
}

impl RiskEstimate {
    pub fn validate(&self) -> Result<(), ValidationError> {
        require_unit("pgm.p_hit", self.p_hit)?;
        require_non_negative("pgm.mae_q999", self.mae_q999)?;
        require_non_negative("pgm.slip_q95", self.slip_q95)?;
        if self.t_hit_q50_bars < 1 {
            return Err(ValidationError::field("pgm.t_hit_q50_bars", "must be >= 1"));
        }
        for (_, weight) in &self.factors {
            require_finite("pgm.factors", *weight)?;
        }
        Ok(())
    }

    /// The `n` strongest factors by |weight|, ties keep input order.
    pub fn top_factors(&self, n: usize) -> Vec<&Factor> {
        let mut ranked: Vec<&Factor> = self.factors.iter().collect();
        ranked.sort_by(|a, b| b.1.abs().total_cmp(&a.1.abs()));
        ranked.truncate(n);
        ranked
    }
}

/// Output of the long-range sequence model, when the caller has one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemporalContext {
    pub p_up_1pct: f64,
    pub p_dn_1pct: f64,
    pub t_hit50:   u32,
    pub mae_q995:  f64,
}

impl TemporalContext {
    pub fn validate(&self) -> Result<(), ValidationError> {
        require_unit("temporal.p_up_1pct", self.p_up_1pct)?;
        require_unit("temporal.p_dn_1pct", self.p_dn_1pct)?;
        require_non_negative("temporal.mae_q995", self.mae_q995)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn estimate(factors: Vec<Factor>) -> RiskEstimate {
        RiskEstimate {
            p_hit:          0.8,
            mae_q999:       0.004,
            slip_q95:       0.0003,
            t_hit_q50_bars: 4,
            factors,
        }
    }

    #[test]
    fn test_top_factors_by_absolute_weight() {
        let e = estimate(vec![
            ("a".into(), 0.10),
            ("b".into(), -0.40),
            ("c".into(), 0.25),
            ("d".into(), 0.05),
        ]);
        let names: Vec<&str> = e.top_factors(3).iter().map(|f| f.0.as_str()).collect();
        assert_eq!(names, vec!["b", "c", "a"]);
    }

    #[test]
    fn test_factors_deserialize_from_pairs() {
        let e: RiskEstimate = serde_json::from_str(
            r#"{"p_hit":0.8,"mae_q999":0.004,"slip_q95":0.0003,"t_hit_q50_bars":4,
                "factors":[["ofi_34",0.2],["vpin",-0.1]]}"#,
        ).unwrap();
        assert_eq!(e.factors[1], ("vpin".to_string(), -0.1));
    }

    #[test]
    fn test_zero_bars_rejected() {
        let mut e = estimate(vec![]);
        e.t_hit_q50_bars = 0;
        assert!(e.validate().is_err());
    }

    #[test]
    fn test_p_hit_outside_unit_rejected() {
        let mut e = estimate(vec![]);
        e.p_hit = 1.01;
        assert!(e.validate().is_err());
    }
}
