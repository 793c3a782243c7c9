//! # routes::decide
//!
//! | Method | Path                     | Description                              |
//! |--------|--------------------------|------------------------------------------|
//! | POST   | `/decide/enter`          | Entry decision (gates → … → allocation)  |
//! | GET    | `/decide/enter/examples` | Sample requests: bull, bear, vol reject  |
//! | POST   | `/decide/enter/test`     | Run the three samples, summarize results |

use std::sync::atomic::Ordering;

use axum::{extract::State, response::IntoResponse, Json};
use serde_json::json;
use tracing::debug;

use crate::{
    engine::reason_chain::render_audit,
    error::AppError,
    models::{examples, EntryDecision, EntryRequest},
    monitor::DecisionTrace,
    state::SharedState,
};

// ─── POST /decide/enter ───────────────────────────────────────────────────────

/// Invalid input → 400 before the pipeline runs.  Every valid request gets
/// a decision; denies are a normal 200 response with `allow = false`.
pub async fn decide_enter(
    State(state): State<SharedState>,
    Json(request): Json<EntryRequest>,
) -> Result<Json<EntryDecision>, AppError> {
    request.validate()?;
    state.entry_count.fetch_add(1, Ordering::Relaxed);

    let outcome = state.entry_pipeline().decide(&request).await;
    if outcome.decision.allow {
        state.approval_count.fetch_add(1, Ordering::Relaxed);
    }

    state
        .traces
        .record(DecisionTrace::new(&request, &outcome.decision, outcome.gates.as_ref()));
    debug!("\n{}", render_audit(&request, &outcome.decision));

    Ok(Json(outcome.decision))
}

// ─── GET /decide/enter/examples ───────────────────────────────────────────────

pub async fn enter_examples() -> impl IntoResponse {
    Json(json!({
        "ok":          true,
        "bull":        examples::bull_entry_request(),
        "bear":        examples::bear_entry_request(),
        "vol_reject":  examples::vol_reject_entry_request(),
        "description": "bull/bear pass every gate; vol_reject fails the volatility gate on sigma and skew",
    }))
}

// ─── POST /decide/enter/test ──────────────────────────────────────────────────

/// Nothing here touches counters, traces or the live latency window.
pub async fn test_enter_scenarios(State(state): State<SharedState>) -> impl IntoResponse {
    let pipeline = state.scenario_pipeline();
    let scenarios = [
        ("Bull Scenario", examples::bull_entry_request()),
        ("Bear Scenario", examples::bear_entry_request()),
        ("Vol Reject Scenario", examples::vol_reject_entry_request()),
    ];

    let mut results = Vec::with_capacity(scenarios.len());
    for (scenario, request) in &scenarios {
        let decision = pipeline.decide(request).await.decision;
        results.push(json!({
            "scenario": scenario,
            "success":  true,
            "result": {
                "allow":        decision.allow,
                "side":         decision.side,
                "allocation":   decision.alloc_equity_pct,
                "runtime_ms":   decision.runtime_ms,
                "reason_count": decision.reason_chain.len(),
            },
        }));
    }

    Json(json!({
        "ok":               true,
        "test_completed":   true,
        "scenarios_tested": results.len(),
        "results":          results,
    }))
}
