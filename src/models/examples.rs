//! # models::examples
//!
//! Canned request payloads served by `GET /decide/enter/examples` and
//! `GET /decide/exit/examples`.  Tests build on the same fixtures.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use crate::models::{
    EntryRequest, ExitRequest, ExitUpdate, FeatureSnapshot, MarketMicro, OnChain, OrderFlow,
    Position, RiskEstimate, Side, Timeframe, VisionTokens,
};

/// 2025-09-14T10:00:00Z
fn example_ts() -> DateTime<Utc> {
    DateTime::from_timestamp(1_757_844_000, 0).unwrap_or_default()
}

fn tokens(pairs: &[(&str, f64)]) -> VisionTokens {
    VisionTokens {
        tokens: pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect::<BTreeMap<_, _>>(),
    }
}

/// BTC long: every gate passes, allocation 0.74.
pub fn bull_entry_request() -> EntryRequest {
    EntryRequest {
        symbol:    "BTCUSDT".to_string(),
        side_hint: Some(Side::Long),
        ts:        example_ts(),
        tf:        Timeframe::M15,
        features:  FeatureSnapshot {
            sigma_1m:   0.0015,
            skew_1m:    0.65,
            z_4h:       0.8,
            z_1h:       0.7,
            z_15m:      0.6,
            c_align:    0.89,
            c_of:       0.85,
            c_vision:   0.82,
            pine_match: true,
            onchain:    OnChain { oi_roc: 0.023, gas_z: 0.8 },
            order_flow: OrderFlow { obi: 0.18, d_cvd: 2.1, replenish: 0.72 },
            vision_tokens: tokens(&[("bull_flag", 0.78), ("volume_spike", 0.64)]),
            market: MarketMicro {
                mark:      43250.5,
                liq_price: 41800.0,
                spread_bp: 2.0,
                depth_px:  2_500_000.0,
            },
        },
        pgm: RiskEstimate {
            p_hit:          0.82,
            mae_q999:       0.0045,
            slip_q95:       0.0003,
            t_hit_q50_bars: 4,
            factors: vec![
                ("ofi_34".to_string(), 0.25),
                ("z_4h".to_string(), 0.18),
                ("vpin".to_string(), -0.12),
                ("gas_z".to_string(), 0.05),
            ],
        },
        temporal: None,
    }
}

/// ETH short: every gate passes in the bear regime.
pub fn bear_entry_request() -> EntryRequest {
    EntryRequest {
        symbol:    "ETHUSDT".to_string(),
        side_hint: Some(Side::Short),
        ts:        example_ts(),
        tf:        Timeframe::M5,
        features:  FeatureSnapshot {
            sigma_1m:   0.0018,
            skew_1m:    -0.72,
            z_4h:       -0.6,
            z_1h:       -0.8,
            z_15m:      -0.5,
            c_align:    0.91,
            c_of:       0.87,
            c_vision:   0.79,
            pine_match: true,
            onchain:    OnChain { oi_roc: -0.015, gas_z: -0.3 },
            order_flow: OrderFlow { obi: -0.22, d_cvd: -1.8, replenish: 0.65 },
            vision_tokens: tokens(&[("bear_flag", 0.71)]),
            market: MarketMicro {
                mark:      2415.3,
                liq_price: 2458.8,
                spread_bp: 3.0,
                depth_px:  1_800_000.0,
            },
        },
        pgm: RiskEstimate {
            p_hit:          0.79,
            mae_q999:       0.0058,
            slip_q95:       0.0004,
            t_hit_q50_bars: 6,
            factors: vec![
                ("cvd_div".to_string(), -0.22),
                ("z_1h".to_string(), -0.19),
                ("spread".to_string(), 0.04),
            ],
        },
        temporal: None,
    }
}

/// Sigma above the bear band and skew too neutral: the volatility gate fails twice over.
pub fn vol_reject_entry_request() -> EntryRequest {
    let mut request = bear_entry_request();
    request.features.sigma_1m = 0.0045;
    request.features.skew_1m  = -0.15;
    request
}

/// Short ETH position with an elevated hazard rate.
pub fn exit_request() -> ExitRequest {
    ExitRequest {
        position: Position {
            avg_entry: 2415.3,
            side:      Side::Short,
            qty:       120.0,
            upl_pct:   0.42,
        },
        updates: ExitUpdate {
            p_hit:          0.46,
            mae_q90:        0.0032,
            t_hit_q50_bars: 7,
            h_t:            0.37,
            d_cvd:          0.9,
            replenish:      0.25,
        },
    }
}
