//! HTTP surface.  Handlers stay thin: validate, delegate to the engine,
//! serialize.

pub mod decide;
pub mod exit;
pub mod health;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::{auth::require_api_key, state::SharedState};

pub fn router(state: SharedState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // ── Entry ─────────────────────────────────────────────────────────────
        .route("/decide/enter",           post(decide::decide_enter))
        .route("/decide/enter/examples",  get(decide::enter_examples))
        .route("/decide/enter/test",      post(decide::test_enter_scenarios))
        // ── Exit ──────────────────────────────────────────────────────────────
        .route("/decide/exit",            post(exit::decide_exit))
        .route("/decide/exit/examples",   get(exit::exit_examples))
        .route("/decide/exit/test",       post(exit::test_exit_scenarios))
        .route("/decide/exit/strategies", get(exit::exit_strategies))
        // ── Ops ───────────────────────────────────────────────────────────────
        .route("/health",                 get(health::health))
        .route("/version",                get(health::version))
        .route("/status",                 get(health::status))
        .route("/metrics",                get(health::metrics))
        .route("/config",                 get(health::get_config))
        .route("/config/reload",          post(health::reload_config))
        // ── Middleware ────────────────────────────────────────────────────────
        .layer(axum::middleware::from_fn_with_state(state.clone(), require_api_key))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
