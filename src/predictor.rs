//! # predictor — PredictorPort
//!
//! The entry pipeline never talks to a model directly.  It asks a
//! `PredictorPort` for a `RiskEstimate` and treats anything other than a
//! valid estimate inside the time limit as "prediction unavailable".
//!
//! ```text
//! QuotedPredictor  → echoes the `pgm` block the caller already sent
//! HttpPredictor    → POST {PREDICTOR_URL}/predict  (EntryRequest → RiskEstimate)
//! ```

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tracing::debug;

use crate::models::{EntryRequest, RiskEstimate};

#[derive(Debug, Error)]
pub enum PredictorError {
    #[error("predictor timed out after {0}ms")]
    Timeout(u64),

    #[error("predictor unreachable: {0}")]
    Unreachable(String),

    #[error("predictor returned {status}: {body}")]
    Http { status: u16, body: String },

    #[error("predictor returned an invalid estimate: {0}")]
    InvalidEstimate(String),
}

#[async_trait]
pub trait PredictorPort: Send + Sync {
    fn name(&self) -> &str;

    async fn predict(&self, request: &EntryRequest) -> Result<RiskEstimate, PredictorError>;
}

// ─── Quoted ───────────────────────────────────────────────────────────────────

/// Uses the estimate embedded in the request (`pgm`).
#[derive(Debug, Default, Clone, Copy)]
pub struct QuotedPredictor;

#[async_trait]
impl PredictorPort for QuotedPredictor {
    fn name(&self) -> &str {
        "quoted"
    }

    async fn predict(&self, request: &EntryRequest) -> Result<RiskEstimate, PredictorError> {
        Ok(request.pgm.clone())
    }
}

// ─── HTTP ─────────────────────────────────────────────────────────────────────

/// Remote model service.  The pipeline applies its own deadline on top of
/// the client timeout.
pub struct HttpPredictor {
    client:   reqwest::Client,
    base_url: String,
}

impl HttpPredictor {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, PredictorError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| PredictorError::Unreachable(e.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl PredictorPort for HttpPredictor {
    fn name(&self) -> &str {
        "http"
    }

    async fn predict(&self, request: &EntryRequest) -> Result<RiskEstimate, PredictorError> {
        let url = format!("{}/predict", self.base_url);
        debug!(%url, symbol = %request.symbol, "📡 Requesting risk estimate");

        let resp = self
            .client
            .post(&url)
            .json(request)
            .send()
            .await
            .map_err(|e| PredictorError::Unreachable(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(PredictorError::Http { status, body });
        }

        resp.json::<RiskEstimate>()
            .await
            .map_err(|e| PredictorError::InvalidEstimate(e.to_string()))
    }
}
