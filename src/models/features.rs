//! # models::features
//!
//! Defines [`FeatureSnapshot`], the per-request market picture produced by the
//! upstream feature-aggregation service, and [`EntryRequest`], the payload
//! posted to `/decide/enter`.
//!
//! Wire names follow the upstream feature service (`Z_4H`, `C_align`, `OF`,
//! `dCVD`, ...), Rust field names are snake_case.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::models::risk::{RiskEstimate, TemporalContext};

// ─── Side ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Long,
    Short,
}

impl Side {
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Long  => "long",
            Side::Short => "short",
        }
    }

    /// +1 for long, −1 for short.
    #[inline]
    pub fn sign(&self) -> f64 {
        match self {
            Side::Long  => 1.0,
            Side::Short => -1.0,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ─── Timeframe ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Timeframe {
    #[serde(rename = "1m")]  M1,
    #[serde(rename = "5m")]  M5,
    #[serde(rename = "15m")] M15,
    #[serde(rename = "1h")]  H1,
    #[serde(rename = "4h")]  H4,
    #[serde(rename = "1d")]  D1,
}

impl Timeframe {
    pub fn as_str(&self) -> &'static str {
        match self {
            Timeframe::M1  => "1m",
            Timeframe::M5  => "5m",
            Timeframe::M15 => "15m",
            Timeframe::H1  => "1h",
            Timeframe::H4  => "4h",
            Timeframe::D1  => "1d",
        }
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ─── Snapshot Parts ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OnChain {
    /// Open-interest rate of change
    pub oi_roc: f64,
    pub gas_z:  f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderFlow {
    /// Order-book imbalance
    pub obi: f64,
    /// Delta cumulative volume (signed)
    #[serde(rename = "dCVD")]
    pub d_cvd: f64,
    /// Replenishment rate ∈ [0,1]
    pub replenish: f64,
}

/// Pattern tokens from the vision service. Informational only, no gate reads them.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VisionTokens {
    #[serde(default)]
    pub tokens: BTreeMap<String, f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketMicro {
    pub mark:      f64,
    pub liq_price: f64,
    pub spread_bp: f64,
    pub depth_px:  f64,
}

// ─── FeatureSnapshot ──────────────────────────────────────────────────────────

/// One immutable market picture, built per request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureSnapshot {
    pub sigma_1m: f64,
    pub skew_1m:  f64,

    #[serde(rename = "Z_4H")]
    pub z_4h:  f64,
    #[serde(rename = "Z_1H")]
    pub z_1h:  f64,
    #[serde(rename = "Z_15m")]
    pub z_15m: f64,

    #[serde(rename = "C_align")]
    pub c_align:  f64,
    #[serde(rename = "C_of")]
    pub c_of:     f64,
    #[serde(rename = "C_vision")]
    pub c_vision: f64,

    /// Technical (Pine script) signal agrees with the requested direction
    pub pine_match: bool,

    #[serde(default)]
    pub onchain: OnChain,

    #[serde(rename = "OF")]
    pub order_flow: OrderFlow,

    #[serde(default)]
    pub vision_tokens: VisionTokens,

    pub market: MarketMicro,
}

impl FeatureSnapshot {
    /// Mean of the three timeframe Z-scores.
    pub fn mean_z(&self) -> f64 {
        (self.z_4h + self.z_1h + self.z_15m) / 3.0
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        require_finite("features.sigma_1m", self.sigma_1m)?;
        require_non_negative("features.sigma_1m", self.sigma_1m)?;
        require_finite("features.skew_1m", self.skew_1m)?;
        require_finite("features.Z_4H", self.z_4h)?;
        require_finite("features.Z_1H", self.z_1h)?;
        require_finite("features.Z_15m", self.z_15m)?;
        require_unit("features.C_align", self.c_align)?;
        require_unit("features.C_of", self.c_of)?;
        require_unit("features.C_vision", self.c_vision)?;
        require_finite("features.OF.obi", self.order_flow.obi)?;
        require_finite("features.OF.dCVD", self.order_flow.d_cvd)?;
        require_unit("features.OF.replenish", self.order_flow.replenish)?;
        require_finite("features.onchain.oi_roc", self.onchain.oi_roc)?;
        require_finite("features.onchain.gas_z", self.onchain.gas_z)?;
        require_positive("features.market.mark", self.market.mark)?;
        require_positive("features.market.liq_price", self.market.liq_price)?;
        require_non_negative("features.market.spread_bp", self.market.spread_bp)?;
        require_non_negative("features.market.depth_px", self.market.depth_px)?;
        Ok(())
    }
}

// ─── EntryRequest ─────────────────────────────────────────────────────────────

/// Payload of `POST /decide/enter`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntryRequest {
    /// e.g. `"BTCUSDT"`
    pub symbol: String,

    /// Caller's preferred direction; None = let skew decide the regime
    #[serde(default)]
    pub side_hint: Option<Side>,

    #[serde(default = "Utc::now")]
    pub ts: DateTime<Utc>,

    pub tf: Timeframe,

    pub features: FeatureSnapshot,

    /// Upstream risk quote the liquidation gate budgets against.
    pub pgm: RiskEstimate,

    /// Auxiliary sequence-model context, forwarded to arbitration when present
    #[serde(default)]
    pub temporal: Option<TemporalContext>,
}

impl EntryRequest {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if !is_usdt_symbol(&self.symbol) {
            return Err(ValidationError::Symbol(self.symbol.clone()));
        }
        self.features.validate()?;
        self.pgm.validate()?;
        if let Some(temporal) = &self.temporal {
            temporal.validate()?;
        }
        Ok(())
    }
}

/// `^[A-Z]+USDT$`
fn is_usdt_symbol(symbol: &str) -> bool {
    symbol
        .strip_suffix("USDT")
        .map(|base| !base.is_empty() && base.bytes().all(|b| b.is_ascii_uppercase()))
        .unwrap_or(false)
}

// ─── Field Checks ─────────────────────────────────────────────────────────────

pub(crate) fn require_finite(field: &'static str, value: f64) -> Result<(), ValidationError> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(ValidationError::field(field, format!("must be finite, got {value}")))
    }
}

pub(crate) fn require_unit(field: &'static str, value: f64) -> Result<(), ValidationError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(ValidationError::field(field, format!("must be in [0, 1], got {value}")))
    }
}

pub(crate) fn require_positive(field: &'static str, value: f64) -> Result<(), ValidationError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ValidationError::field(field, format!("must be > 0, got {value}")))
    }
}

pub(crate) fn require_non_negative(field: &'static str, value: f64) -> Result<(), ValidationError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(ValidationError::field(field, format!("must be >= 0, got {value}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::examples;

    #[test]
    fn test_symbol_pattern() {
        assert!(is_usdt_symbol("BTCUSDT"));
        assert!(is_usdt_symbol("ETHUSDT"));
        assert!(!is_usdt_symbol("USDT"));
        assert!(!is_usdt_symbol("btcUSDT"));
        assert!(!is_usdt_symbol("BTCUSD"));
        assert!(!is_usdt_symbol("BTC1USDT"));
    }

    #[test]
    fn test_bull_example_is_valid() {
        assert_eq!(examples::bull_entry_request().validate(), Ok(()));
    }

    #[test]
    fn test_consensus_out_of_range_rejected() {
        let mut request = examples::bull_entry_request();
        request.features.c_align = 1.2;
        let err = request.validate().unwrap_err();
        assert!(err.to_string().contains("C_align"));
    }

    #[test]
    fn test_non_positive_mark_rejected() {
        let mut request = examples::bull_entry_request();
        request.features.market.mark = 0.0;
        assert!(request.validate().is_err());
    }

    #[test]
    fn test_wire_names() {
        let json = serde_json::to_value(examples::bull_entry_request()).unwrap();
        assert_eq!(json["side_hint"], "long");
        assert_eq!(json["tf"], "15m");
        assert!(json["features"]["Z_4H"].is_number());
        assert!(json["features"]["OF"]["dCVD"].is_number());
    }

    #[test]
    fn test_mean_z() {
        let request = examples::bull_entry_request();
        assert!((request.features.mean_z() - 0.7).abs() < 1e-9);
    }
}
