//! # engine::allocation
//!
//! **AllocationPolicy** — เลือกฝั่ง (long/short) และขนาด allocation
//!
//! ```text
//! votes:  mean(Z_4H, Z_1H, Z_15m) vs ±0.5
//!         skew_1m                  vs ±0.5
//!         dCVD                     vs ±1.0
//! side  = majority, tie → side hint → sign of skew
//! alloc = clamp(0.6 + 2·(p_hit − 0.75), 0.1, 0.9)
//! ```

use serde::Serialize;

use crate::models::{FeatureSnapshot, Side};

const Z_VOTE:    f64 = 0.5;
const SKEW_VOTE: f64 = 0.5;
const CVD_VOTE:  f64 = 1.0;

const ALLOC_BASE:  f64 = 0.6;
const ALLOC_SLOPE: f64 = 2.0;
const ALLOC_PIVOT: f64 = 0.75;
pub const ALLOC_MIN: f64 = 0.1;
pub const ALLOC_MAX: f64 = 0.9;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SideVotes {
    pub long:  u8,
    pub short: u8,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Allocation {
    pub side:     Side,
    pub fraction: f64,
    pub votes:    SideVotes,
}

pub fn tally_votes(features: &FeatureSnapshot) -> SideVotes {
    let mut votes = SideVotes::default();
    let mut cast = |value: f64, threshold: f64| {
        if value > threshold {
            votes.long += 1;
        } else if value < -threshold {
            votes.short += 1;
        }
    };
    cast(features.mean_z(), Z_VOTE);
    cast(features.skew_1m, SKEW_VOTE);
    cast(features.order_flow.d_cvd, CVD_VOTE);
    votes
}

pub fn select_side(votes: SideVotes, side_hint: Option<Side>, skew: f64) -> Side {
    if votes.long > votes.short {
        Side::Long
    } else if votes.short > votes.long {
        Side::Short
    } else {
        side_hint.unwrap_or(if skew < 0.0 { Side::Short } else { Side::Long })
    }
}

/// Never leaves [0.1, 0.9], including for NaN or out-of-range input.
pub fn allocation_fraction(p_hit: f64) -> f64 {
    if !p_hit.is_finite() {
        return ALLOC_MIN;
    }
    (ALLOC_BASE + ALLOC_SLOPE * (p_hit - ALLOC_PIVOT)).clamp(ALLOC_MIN, ALLOC_MAX)
}

pub fn allocate(features: &FeatureSnapshot, side_hint: Option<Side>, p_hit: f64) -> Allocation {
    let votes = tally_votes(features);
    Allocation {
        side:     select_side(votes, side_hint, features.skew_1m),
        fraction: allocation_fraction(p_hit),
        votes,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::examples;

    #[test]
    fn test_bull_example_unanimous_long() {
        let request = examples::bull_entry_request();
        let alloc = allocate(&request.features, request.side_hint, request.pgm.p_hit);
        assert_eq!(alloc.votes, SideVotes { long: 3, short: 0 });
        assert_eq!(alloc.side, Side::Long);
        assert!((alloc.fraction - 0.74).abs() < 1e-9);
    }

    #[test]
    fn test_majority_overrides_hint() {
        let request = examples::bear_entry_request();
        let alloc = allocate(&request.features, Some(Side::Long), 0.8);
        assert_eq!(alloc.side, Side::Short);
    }

    #[test]
    fn test_tie_falls_back_to_hint() {
        let mut features = examples::bull_entry_request().features;
        features.z_4h = 0.0;
        features.z_1h = 0.0;
        features.z_15m = 0.0;
        features.skew_1m = 0.4;
        features.order_flow.d_cvd = 0.2;
        let votes = tally_votes(&features);
        assert_eq!(votes, SideVotes::default());
        assert_eq!(select_side(votes, Some(Side::Short), 0.4), Side::Short);
        assert_eq!(select_side(votes, None, 0.4), Side::Long);
        assert_eq!(select_side(votes, None, -0.4), Side::Short);
    }

    #[test]
    fn test_split_vote_is_a_tie() {
        let votes = SideVotes { long: 1, short: 1 };
        assert_eq!(select_side(votes, Some(Side::Short), 0.9), Side::Short);
    }

    #[test]
    fn test_fraction_always_clamped() {
        for p in [-5.0, -1.0, 0.0, 0.3, 0.75, 0.9, 1.0, 2.0, 100.0, f64::NAN, f64::INFINITY] {
            let f = allocation_fraction(p);
            assert!((ALLOC_MIN..=ALLOC_MAX).contains(&f), "p={p} → {f}");
        }
        assert!((allocation_fraction(0.75) - 0.6).abs() < 1e-12);
        assert_eq!(allocation_fraction(1.0), ALLOC_MAX);
        assert_eq!(allocation_fraction(0.0), ALLOC_MIN);
    }
}
