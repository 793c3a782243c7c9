//! # Decision Engine — entry/exit arbitration under a latency SLA
//!
//! ```text
//!  ┌──────────────┐  POST /decide/enter   ┌──────────────────────────────┐
//!  │  Strategy    │ ─────────────────────▶│  gates → predictor →         │
//!  │  runner      │                       │  fragility → arbitration →   │──▶ allow / side / alloc
//!  │  (freqtrade, │  POST /decide/exit    │  allocation → reason chain   │
//!  │   bots, …)   │ ─────────────────────▶│  exit signal fusion          │──▶ hold / trail / reduce / close
//!  └──────────────┘                       └──────────────────────────────┘
//!                                                   │
//!                           PREDICTOR_URL ◀─────────┤ (optional)
//!                           Claude / OpenAI ◀───────┘ borderline p_hit only
//! ```
//!
//! ## Environment Variables
//!
//! | Variable           | Default                 | Description                          |
//! |--------------------|-------------------------|--------------------------------------|
//! | `BIND_ADDR`        | `0.0.0.0:8000`          | Address Axum listens on              |
//! | `DECISION_CONFIG`  | `config/default.toml`   | Threshold file (hot-reloadable)      |
//! | `API_KEY`          | —                       | Enables `X-API-Key` auth when set    |
//! | `PREDICTOR_URL`    | —                       | Remote predictor; unset = use `pgm`  |
//! | `LLM_PROVIDER`     | `heuristic`             | `heuristic` / `claude` / `openai` / `none` |
//! | `LLM_API_KEY`      | —                       | Required for `claude` / `openai`     |
//! | `RUST_LOG`         | `decision_engine=debug` | Tracing filter                       |

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use decision_engine::{
    config::{ConfigStore, DEFAULT_CONFIG_PATH},
    predictor::{HttpPredictor, PredictorPort, QuotedPredictor},
    rationale,
    routes::router,
    state::build_state,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── 1. Load .env ──────────────────────────────────────────────────────────
    dotenvy::dotenv().ok();

    // ── 2. Logging ────────────────────────────────────────────────────────────
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(
            EnvFilter::from_default_env()
                .add_directive("decision_engine=debug".parse()?)
                .add_directive("tower_http=info".parse()?),
        )
        .init();

    info!(r#"

  ╔═══════════════════════════════════════════════════════╗
  ║            DECISION ENGINE — Entry / Exit             ║
  ║  Gates · Fragility · Arbitration · Exit Fusion · SLA  ║
  ╚═══════════════════════════════════════════════════════╝"#);

    // ── 3. Config ─────────────────────────────────────────────────────────────
    let config_path = std::env::var("DECISION_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
    let store = ConfigStore::from_path(&config_path)?;
    let snapshot = store.snapshot();
    info!(
        path           = %config_path,
        latency_slo_ms = snapshot.latency_slo_ms,
        arbitration    = snapshot.arbitration.enabled,
        "⚙️ Config loaded"
    );

    // ── 4. Collaborators ──────────────────────────────────────────────────────
    let predictor: Arc<dyn PredictorPort> = match std::env::var("PREDICTOR_URL") {
        Ok(url) if !url.trim().is_empty() => {
            info!(%url, "📡 Using remote predictor");
            Arc::new(HttpPredictor::new(url, Duration::from_millis(snapshot.predictor.timeout_ms))?)
        }
        _ => Arc::new(QuotedPredictor),
    };
    let rationale = rationale::from_env()?;
    info!(
        predictor = predictor.name(),
        rationale = rationale.as_ref().map(|r| r.name()).unwrap_or("none"),
        "🧠 Collaborators ready"
    );

    // ── 5. State + Router ─────────────────────────────────────────────────────
    let state = build_state(store, predictor, rationale);
    info!(enabled = state.api_key.is_enabled(), "🔐 X-API-Key guard");
    let app = router(state);

    // ── 6. Bind & Serve ───────────────────────────────────────────────────────
    let addr: SocketAddr = std::env::var("BIND_ADDR")
        .unwrap_or_else(|_| "0.0.0.0:8000".to_string())
        .parse()?;

    info!(?addr, "🚀 Decision engine starting");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
