//! # routes::exit
//!
//! | Method | Path                      | Description                              |
//! |--------|---------------------------|------------------------------------------|
//! | POST   | `/decide/exit`            | Exit decision for one open position      |
//! | GET    | `/decide/exit/examples`   | Sample exit request                      |
//! | POST   | `/decide/exit/test`       | Run the five canned stress scenarios     |
//! | GET    | `/decide/exit/strategies` | Exit rules, weights and thresholds       |

use std::collections::BTreeMap;
use std::sync::atomic::Ordering;

use axum::{extract::State, response::IntoResponse, Json};
use serde_json::json;
use tracing::info;

use crate::{
    engine::exit::{timeout_bars, URGENCY_WEIGHTS},
    error::AppError,
    models::{examples, ExitDecision, ExitRequest, Position},
    state::SharedState,
};

// ─── POST /decide/exit ────────────────────────────────────────────────────────

pub async fn decide_exit(
    State(state): State<SharedState>,
    Json(request): Json<ExitRequest>,
) -> Result<Json<ExitDecision>, AppError> {
    request.validate()?;
    state.exit_count.fetch_add(1, Ordering::Relaxed);

    info!(
        side      = %request.position.side,
        qty       = request.position.qty,
        avg_entry = request.position.avg_entry,
        upl_pct   = request.position.upl_pct,
        "📥 Exit decision request"
    );

    Ok(Json(state.exit_pipeline().decide(&request)))
}

// ─── GET /decide/exit/examples ────────────────────────────────────────────────

pub async fn exit_examples() -> impl IntoResponse {
    Json(json!({
        "ok":           true,
        "example_exit": examples::exit_request(),
        "description":  "short position under rising hazard; expected action reduce",
    }))
}

// ─── POST /decide/exit/test ───────────────────────────────────────────────────

/// Body is optional; without one the example position is used.
pub async fn test_exit_scenarios(
    State(state): State<SharedState>,
    body: Option<Json<Position>>,
) -> Result<impl IntoResponse, AppError> {
    let position = match body {
        Some(Json(position)) => position,
        None => examples::exit_request().position,
    };
    if !(position.qty > 0.0) || !(position.avg_entry > 0.0) {
        return Err(AppError::BadRequest("position qty and avg_entry must be > 0".into()));
    }

    let results = state.exit_pipeline().simulate_scenarios(&position);

    Ok(Json(json!({
        "ok":               true,
        "test_completed":   true,
        "scenarios_tested": results.len(),
        "results":          results,
    })))
}

// ─── GET /decide/exit/strategies ──────────────────────────────────────────────

pub async fn exit_strategies(State(state): State<SharedState>) -> impl IntoResponse {
    let cfg = state.config.snapshot();
    let exit = &cfg.exit;
    let weights: BTreeMap<&str, f64> = URGENCY_WEIGHTS.iter().copied().collect();

    Json(json!({
        "ok": true,
        "strategies": {
            "hold":   { "description": "All signals within acceptable range" },
            "trail":  {
                "description": "Protect profit while hazard is elevated",
                "conditions":  [format!("upl_pct > {}", exit.trail_min_upl_pct), format!("h_t > {:.3}", 0.7 * exit.hazard_thresh)],
                "reduce_pct":  0.3 * exit.reduce_pct,
            },
            "reduce": {
                "description": "Partial reduction of exposure",
                "conditions":  [
                    format!("h_t > {:.3} (size scaled by urgency, max 0.8)", exit.hazard_thresh),
                    format!("p_hit < {:.3}", exit.phit_floor),
                    "adverse dCVD beyond ±1.5".to_string(),
                    format!("T50 > {} bars", timeout_bars(exit)),
                ],
                "default_reduce_pct": exit.reduce_pct,
            },
            "close":  {
                "description": "Full exit, risk too high",
                "conditions":  [format!("h_t > {:.3}", 1.5 * exit.hazard_thresh), format!("p_hit < {:.3}", 0.6 * exit.phit_floor)],
                "reduce_pct":  1.0,
            },
        },
        "urgency_weights": weights,
    }))
}
