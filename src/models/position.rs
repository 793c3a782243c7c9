//! # models::position
//!
//! An open position plus the live model updates the exit pipeline fuses.
//!
//! `Position` = what we hold now
//! `ExitUpdate` = what the models think about it right now

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::models::features::{require_finite, require_positive, require_unit};
use crate::models::Side;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub avg_entry: f64,
    pub side:      Side,
    pub qty:       f64,
    /// Unrealized P&L in percent points (0.42 = +0.42%)
    pub upl_pct:   f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExitUpdate {
    pub p_hit: f64,
    pub mae_q90: f64,
    pub t_hit_q50_bars: u32,
    /// Hazard rate ∈ [0,1]
    pub h_t: f64,
    #[serde(rename = "dCVD")]
    pub d_cvd: f64,
    pub replenish: f64,
}

/// Payload of `POST /decide/exit`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExitRequest {
    pub position: Position,
    pub updates:  ExitUpdate,
}

impl ExitRequest {
    pub fn validate(&self) -> Result<(), ValidationError> {
        require_positive("position.avg_entry", self.position.avg_entry)?;
        require_positive("position.qty", self.position.qty)?;
        require_finite("position.upl_pct", self.position.upl_pct)?;
        require_unit("updates.p_hit", self.updates.p_hit)?;
        require_finite("updates.mae_q90", self.updates.mae_q90)?;
        require_unit("updates.h_t", self.updates.h_t)?;
        require_finite("updates.dCVD", self.updates.d_cvd)?;
        require_unit("updates.replenish", self.updates.replenish)?;
        Ok(())
    }
}
