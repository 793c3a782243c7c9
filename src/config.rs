//! # config — Typed Decision Configuration
//!
//! ```text
//!  config/default.toml ──┐
//!                        ├─▶ DecisionConfig ──validate()──▶ ConfigStore (ArcSwap)
//!  env overrides ────────┘                                     │
//!                                                              ├─ snapshot() per decision
//!  POST /config/reload ─────────────── reload() ──────────────┘  (old snapshot stays alive
//!                                                                 for in-flight requests)
//! ```
//!
//! ค่า Config ทุกตัวมี default ในโค้ด ไฟล์ TOML ใส่เฉพาะค่าที่ต้องการ override
//! A reload that fails validation is rejected and the previous snapshot stays active.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use arc_swap::ArcSwap;
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::ConfigError;

pub const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

// ─── Sections ─────────────────────────────────────────────────────────────────

/// Admission thresholds used by the four gates (and by fragility as reference).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GateThresholds {
    #[serde(alias = "C_align_min")]
    pub c_align_min:  f64,
    #[serde(alias = "C_of_min")]
    pub c_of_min:     f64,
    #[serde(alias = "C_vision_min")]
    pub c_vision_min: f64,
    /// Hit-probability floor; fragility measures p_hit headroom against it
    pub p_hit_min:    f64,
    /// Fixed cushion added to the risk budget
    pub epsilon:      f64,
    pub spread_bp_max: f64,
    pub min_depth_px: f64,
    /// ต่ำกว่านี้ = ตลาดนิ่ง (regime-independent)
    pub sigma_floor:  f64,
    /// สูงกว่านี้ = ตลาดผันผวนรุนแรง (regime-independent)
    pub sigma_ceiling: f64,
    /// |skew| must be strictly greater than this to imply a direction
    pub skew_neutral_abs: f64,
}

impl Default for GateThresholds {
    fn default() -> Self {
        Self {
            c_align_min:      0.85,
            c_of_min:         0.80,
            c_vision_min:     0.75,
            p_hit_min:        0.75,
            epsilon:          0.0005,
            spread_bp_max:    5.0,
            min_depth_px:     1_000_000.0,
            sigma_floor:      0.0005,
            sigma_ceiling:    0.01,
            skew_neutral_abs: 0.3,
        }
    }
}

/// Sigma band plus one-sided skew bound for one market regime.
///
/// bull: `skew >= skew_bound` / bear: `skew <= skew_bound`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegimeBand {
    pub sigma_min: f64,
    pub sigma_max: f64,
    #[serde(alias = "skew_min", alias = "skew_max")]
    pub skew_bound: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VolSweetSpot {
    pub bull: RegimeBand,
    pub bear: RegimeBand,
}

impl Default for VolSweetSpot {
    fn default() -> Self {
        Self {
            bull: RegimeBand { sigma_min: 0.0012, sigma_max: 0.0022, skew_bound: 0.5 },
            bear: RegimeBand { sigma_min: 0.0015, sigma_max: 0.0028, skew_bound: -0.5 },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FragilityTolerances {
    /// Minimum headroom above a [0,1] gate threshold, as a fraction of (1 − threshold)
    pub relative_margin:   f64,
    /// Minimum (liquidation buffer − risk budget), absolute
    pub liq_safety_margin: f64,
    /// Sigma closer than this to a regime band edge is fragile
    pub sigma_edge:        f64,
}

impl Default for FragilityTolerances {
    fn default() -> Self {
        Self {
            relative_margin:   0.05,
            liq_safety_margin: 0.005,
            sigma_edge:        0.0002,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArbitrationConfig {
    pub enabled:    bool,
    /// Inclusive ambiguous band for p_hit
    pub band_low:   f64,
    pub band_high:  f64,
    /// Hard cap on the rationale call; must stay below the latency SLA
    pub timeout_ms: u64,
}

impl Default for ArbitrationConfig {
    fn default() -> Self {
        Self {
            enabled:    true,
            band_low:   0.72,
            band_high:  0.78,
            timeout_ms: 15,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PredictorConfig {
    pub timeout_ms: u64,
}

impl Default for PredictorConfig {
    fn default() -> Self {
        Self { timeout_ms: 25 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExitThresholds {
    pub hazard_thresh:     f64,
    pub phit_floor:        f64,
    pub t_hit_grace_bars:  u32,
    /// Default reduce fraction; rules scale it
    pub reduce_pct:        f64,
    /// Trail only once unrealized P&L exceeds this many percent points
    pub trail_min_upl_pct: f64,
}

impl Default for ExitThresholds {
    fn default() -> Self {
        Self {
            hazard_thresh:     0.30,
            phit_floor:        0.50,
            t_hit_grace_bars:  3,
            reduce_pct:        0.5,
            trail_min_upl_pct: 0.5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionDefaults {
    pub mode: String,
    pub reduce_only_fallback: bool,
}

impl Default for ExecutionDefaults {
    fn default() -> Self {
        Self {
            mode:                 "post_only_limit_or_mpo".to_string(),
            reduce_only_fallback: true,
        }
    }
}

/// Trading is blocked inside `[start_time, end_time)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlacklistWindow {
    pub name:       String,
    pub start_time: String,
    pub end_time:   String,
}

impl BlacklistWindow {
    pub fn bounds(&self) -> Result<(DateTime<Utc>, DateTime<Utc>), ConfigError> {
        let parse = |value: &str| {
            parse_timestamp(value).ok_or_else(|| ConfigError::InvalidWindow {
                name:  self.name.clone(),
                value: value.to_string(),
            })
        };
        Ok((parse(&self.start_time)?, parse(&self.end_time)?))
    }
}

/// RFC 3339, or a naive ISO timestamp read as UTC.
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
        .map(|naive| naive.and_utc())
}

// ─── DecisionConfig ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecisionConfig {
    pub gates:            GateThresholds,
    pub vol_sweet_spot:   VolSweetSpot,
    pub fragility:        FragilityTolerances,
    pub arbitration:      ArbitrationConfig,
    pub predictor:        PredictorConfig,
    pub exit:             ExitThresholds,
    pub exec:             ExecutionDefaults,
    pub blacklist_events: Vec<BlacklistWindow>,
    /// End-to-end decision SLA
    pub latency_slo_ms:   u64,
}

impl Default for DecisionConfig {
    fn default() -> Self {
        Self {
            gates:            GateThresholds::default(),
            vol_sweet_spot:   VolSweetSpot::default(),
            fragility:        FragilityTolerances::default(),
            arbitration:      ArbitrationConfig::default(),
            predictor:        PredictorConfig::default(),
            exit:             ExitThresholds::default(),
            exec:             ExecutionDefaults::default(),
            blacklist_events: Vec::new(),
            latency_slo_ms:   70,
        }
    }
}

impl DecisionConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(raw)?)
    }

    /// อ่านไฟล์ TOML: ไฟล์ต้องมีอยู่จริง
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&raw)
    }

    /// Missing file = built-in defaults (logged), any other read/parse error propagates.
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            warn!(path = %path.display(), "⚠️ Config file not found — using built-in defaults");
            return Ok(Self::default());
        }
        Self::load(path)
    }

    /// Env vars win over the file.
    pub fn apply_env_overrides(&mut self) {
        self.latency_slo_ms         = env_u64("LATENCY_SLO_MS", self.latency_slo_ms);
        self.arbitration.timeout_ms = env_u64("ARBITRATION_TIMEOUT_MS", self.arbitration.timeout_ms);
        self.predictor.timeout_ms   = env_u64("PREDICTOR_TIMEOUT_MS", self.predictor.timeout_ms);
        self.arbitration.enabled    = std::env::var("ARBITRATION_ENABLED")
            .map(|v| v != "false" && v != "0")
            .unwrap_or(self.arbitration.enabled);
    }

    /// Collects every problem instead of stopping at the first one.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut problems = Vec::new();
        let mut check = |ok: bool, msg: String| {
            if !ok {
                problems.push(msg);
            }
        };

        let g = &self.gates;
        for (name, value) in [
            ("gates.c_align_min", g.c_align_min),
            ("gates.c_of_min", g.c_of_min),
            ("gates.c_vision_min", g.c_vision_min),
            ("gates.p_hit_min", g.p_hit_min),
        ] {
            check((0.0..1.0).contains(&value), format!("{name} must be in [0, 1), got {value}"));
        }
        check(g.epsilon >= 0.0, format!("gates.epsilon must be >= 0, got {}", g.epsilon));
        check(g.spread_bp_max >= 0.0, format!("gates.spread_bp_max must be >= 0, got {}", g.spread_bp_max));
        check(g.min_depth_px >= 0.0, format!("gates.min_depth_px must be >= 0, got {}", g.min_depth_px));
        check(
            g.sigma_floor >= 0.0 && g.sigma_floor < g.sigma_ceiling,
            format!("gates.sigma_floor {} must be >= 0 and below sigma_ceiling {}", g.sigma_floor, g.sigma_ceiling),
        );
        check(g.skew_neutral_abs >= 0.0, format!("gates.skew_neutral_abs must be >= 0, got {}", g.skew_neutral_abs));

        let (bull, bear) = (&self.vol_sweet_spot.bull, &self.vol_sweet_spot.bear);
        check(
            bull.sigma_min < bull.sigma_max,
            format!("vol_sweet_spot.bull sigma band [{}, {}] is empty", bull.sigma_min, bull.sigma_max),
        );
        check(
            bear.sigma_min < bear.sigma_max,
            format!("vol_sweet_spot.bear sigma band [{}, {}] is empty", bear.sigma_min, bear.sigma_max),
        );
        check(bull.skew_bound >= 0.0, format!("vol_sweet_spot.bull.skew_min must be >= 0, got {}", bull.skew_bound));
        check(bear.skew_bound <= 0.0, format!("vol_sweet_spot.bear.skew_max must be <= 0, got {}", bear.skew_bound));

        let f = &self.fragility;
        check(
            (0.0..1.0).contains(&f.relative_margin),
            format!("fragility.relative_margin must be in [0, 1), got {}", f.relative_margin),
        );
        check(f.liq_safety_margin >= 0.0, format!("fragility.liq_safety_margin must be >= 0, got {}", f.liq_safety_margin));
        check(f.sigma_edge >= 0.0, format!("fragility.sigma_edge must be >= 0, got {}", f.sigma_edge));

        let a = &self.arbitration;
        check(
            0.0 <= a.band_low && a.band_low <= a.band_high && a.band_high <= 1.0,
            format!("arbitration band [{}, {}] must satisfy 0 <= low <= high <= 1", a.band_low, a.band_high),
        );
        if a.enabled {
            check(
                a.timeout_ms > 0 && a.timeout_ms < self.latency_slo_ms,
                format!("arbitration.timeout_ms {} must be in (0, latency_slo_ms {})", a.timeout_ms, self.latency_slo_ms),
            );
        }
        check(
            self.predictor.timeout_ms > 0 && self.predictor.timeout_ms <= self.latency_slo_ms,
            format!("predictor.timeout_ms {} must be in (0, latency_slo_ms {}]", self.predictor.timeout_ms, self.latency_slo_ms),
        );

        let e = &self.exit;
        check(
            e.hazard_thresh > 0.0 && e.hazard_thresh <= 1.0,
            format!("exit.hazard_thresh must be in (0, 1], got {}", e.hazard_thresh),
        );
        check(
            e.phit_floor > 0.0 && e.phit_floor < 1.0,
            format!("exit.phit_floor must be in (0, 1), got {}", e.phit_floor),
        );
        check(
            e.reduce_pct > 0.0 && e.reduce_pct <= 1.0,
            format!("exit.reduce_pct must be in (0, 1], got {}", e.reduce_pct),
        );
        check(e.t_hit_grace_bars >= 1, "exit.t_hit_grace_bars must be >= 1".to_string());

        check(!self.exec.mode.trim().is_empty(), "exec.mode must not be empty".to_string());
        check(self.latency_slo_ms > 0, "latency_slo_ms must be > 0".to_string());

        if problems.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Invalid(problems))
        }
    }

    /// Unparsable windows are reported here but never fail the load;
    /// the event gate skips them.
    fn warn_unparsable_windows(&self) {
        for window in &self.blacklist_events {
            if let Err(e) = window.bounds() {
                warn!(window = %window.name, error = %e, "⚠️ Blacklist window will be ignored");
            }
        }
    }
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

// ─── ConfigStore ──────────────────────────────────────────────────────────────

/// Holds the active snapshot.  Readers get an `Arc` they keep for the whole
/// decision; a reload swaps the pointer and never mutates a live snapshot.
pub struct ConfigStore {
    current: ArcSwap<DecisionConfig>,
    source:  Option<PathBuf>,
}

impl ConfigStore {
    pub fn new(config: DecisionConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        config.warn_unparsable_windows();
        Ok(Self {
            current: ArcSwap::from_pointee(config),
            source:  None,
        })
    }

    /// Load file (or defaults) + env overrides, then validate.
    pub fn from_path(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        let mut config = DecisionConfig::load_or_default(&path)?;
        config.apply_env_overrides();

        let mut store = Self::new(config)?;
        store.source = Some(path);
        Ok(store)
    }

    pub fn snapshot(&self) -> Arc<DecisionConfig> {
        self.current.load_full()
    }

    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    /// Validate then swap.  Returns the previous snapshot.
    pub fn replace(&self, config: DecisionConfig) -> Result<Arc<DecisionConfig>, ConfigError> {
        config.validate()?;
        config.warn_unparsable_windows();
        Ok(self.current.swap(Arc::new(config)))
    }

    /// Re-read the source file.  On any error the active snapshot is untouched.
    pub fn reload(&self) -> Result<Arc<DecisionConfig>, ConfigError> {
        let path = self.source.as_deref().ok_or(ConfigError::NoSource)?;
        let mut config = DecisionConfig::load(path)?;
        config.apply_env_overrides();
        self.replace(config)?;

        let active = self.snapshot();
        info!(
            path           = %path.display(),
            latency_slo_ms = active.latency_slo_ms,
            blacklist      = active.blacklist_events.len(),
            "🔄 Config reloaded"
        );
        Ok(active)
    }
}
