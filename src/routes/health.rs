//! # routes::health
//!
//! | Method | Path             | Description                                    |
//! |--------|------------------|------------------------------------------------|
//! | GET    | `/health`        | Liveness (no auth)                             |
//! | GET    | `/version`       | Build version (no auth)                        |
//! | GET    | `/status`        | Latency vs SLA, decision patterns, config view |
//! | GET    | `/metrics`       | Counters, latency seconds, gate pass rates     |
//! | GET    | `/config`        | Active config snapshot                         |
//! | POST   | `/config/reload` | Re-read the TOML file, swap atomically         |

use std::sync::atomic::Ordering;

use axum::{extract::State, response::IntoResponse, Json};
use serde_json::json;
use tracing::{error, info};

use crate::{
    error::AppError,
    monitor::{
        perf::{OP_DECISION, OP_EXIT},
        trace::PATTERN_WINDOW,
    },
    state::SharedState,
};

pub async fn health() -> impl IntoResponse {
    Json(json!({
        "ok":      true,
        "status":  "healthy",
        "service": env!("CARGO_PKG_NAME"),
    }))
}

pub async fn version() -> impl IntoResponse {
    Json(json!({
        "ok":      true,
        "name":    env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

// ─── GET /status ──────────────────────────────────────────────────────────────

pub async fn status(State(state): State<SharedState>) -> impl IntoResponse {
    let cfg    = state.config.snapshot();
    let sla_ms = cfg.latency_slo_ms;
    let sla_ok = state.perf.check_sla(OP_DECISION, sla_ms);
    let health = if sla_ok { "healthy" } else { "degraded" };

    Json(json!({
        "ok":              true,
        "status":          health,
        "uptime_secs":     state.started_at.elapsed().as_secs(),
        "entry_decisions": state.entry_count.load(Ordering::Relaxed),
        "exit_decisions":  state.exit_count.load(Ordering::Relaxed),
        "latency": {
            "sla_ms":   sla_ms,
            "sla_ok":   sla_ok,
            "decision": state.perf.stats(OP_DECISION),
            "exit":     state.perf.stats(OP_EXIT),
        },
        "patterns": state.traces.patterns(PATTERN_WINDOW),
        "components": {
            "predictor":   state.predictor.name(),
            "rationale":   state.rationale.as_ref().map(|r| r.name().to_string()),
            "arbitration": cfg.arbitration.enabled,
        },
        "config": {
            "source":           state.config.source().map(|p| p.display().to_string()),
            "blacklist_events": cfg.blacklist_events.len(),
            "vol_sweet_spot":   &cfg.vol_sweet_spot,
        },
    }))
}

// ─── GET /metrics ─────────────────────────────────────────────────────────────

pub async fn metrics(State(state): State<SharedState>) -> impl IntoResponse {
    let cfg = state.config.snapshot();
    let patterns = state.traces.patterns(PATTERN_WINDOW);

    let latency_seconds: serde_json::Map<String, serde_json::Value> = state
        .perf
        .all_stats()
        .into_iter()
        .map(|(op, s)| {
            (op, json!({
                "count": s.count,
                "avg":   s.avg_ms / 1000.0,
                "p50":   s.p50_ms / 1000.0,
                "p95":   s.p95_ms / 1000.0,
                "p99":   s.p99_ms / 1000.0,
                "max":   s.max_ms / 1000.0,
            }))
        })
        .collect();

    Json(json!({
        "ok":                     true,
        "entry_requests_total":   state.entry_count.load(Ordering::Relaxed),
        "exit_requests_total":    state.exit_count.load(Ordering::Relaxed),
        "entry_approvals_total":  state.approval_count.load(Ordering::Relaxed),
        "latency_seconds":        latency_seconds,
        "sla_violation":          !state.perf.check_sla(OP_DECISION, cfg.latency_slo_ms),
        "gate_pass_rates":        patterns.map(|p| p.gate_pass_rates),
    }))
}

// ─── Config ───────────────────────────────────────────────────────────────────

pub async fn get_config(State(state): State<SharedState>) -> impl IntoResponse {
    Json(json!({
        "ok":     true,
        "source": state.config.source().map(|p| p.display().to_string()),
        "config": &*state.config.snapshot(),
    }))
}

/// A reload that fails to read, parse or validate leaves the active config
/// in place and answers 422 with every problem found.
pub async fn reload_config(State(state): State<SharedState>) -> Result<impl IntoResponse, AppError> {
    match state.config.reload() {
        Ok(active) => {
            info!(latency_slo_ms = active.latency_slo_ms, "✅ Config reload applied");
            Ok(Json(json!({
                "ok":             true,
                "latency_slo_ms": active.latency_slo_ms,
                "blacklist":      active.blacklist_events.len(),
            })))
        }
        Err(e) => {
            error!(error = %e, "❌ Config reload rejected — keeping previous snapshot");
            Err(e.into())
        }
    }
}
