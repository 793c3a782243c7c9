//! # error
//!
//! Centralised error types.
//!
//! Every handler returns `Result<_, AppError>`.  Axum's `IntoResponse` impl
//! converts these into structured JSON error bodies so callers always get a
//! machine-readable response even on failure.
//!
//! Pipeline stages do NOT use `AppError`: each seam (predictor, arbitration,
//! fragility, exit fusion) has its own error enum and the call site decides
//! fail-open vs fail-closed.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    /// The request payload was syntactically correct but semantically invalid.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// A config reload was rejected; the previous snapshot stays active.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Missing or wrong `X-API-Key`.
    #[error("Unauthorized: invalid or missing X-API-Key header")]
    Unauthorized,
}

impl From<ValidationError> for AppError {
    fn from(err: ValidationError) -> Self {
        AppError::BadRequest(err.to_string())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::Config(err) => (StatusCode::UNPROCESSABLE_ENTITY, err.to_string()),
            AppError::Unauthorized => (StatusCode::UNAUTHORIZED, self.to_string()),
        };

        let body = Json(json!({
            "ok":    false,
            "error": message,
        }));

        (status, body).into_response()
    }
}

// ─── Validation ───────────────────────────────────────────────────────────────

/// Malformed input, rejected before the pipeline runs.
#[derive(Debug, Error, PartialEq)]
pub enum ValidationError {
    #[error("field `{field}` {reason}")]
    Field { field: &'static str, reason: String },

    #[error("symbol `{0}` must match ^[A-Z]+USDT$")]
    Symbol(String),
}

impl ValidationError {
    pub fn field(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Field { field, reason: reason.into() }
    }
}

// ─── Configuration ────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config file {path}: {source}")]
    Read {
        path:   String,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// Every problem found by `DecisionConfig::validate`, not only the first.
    #[error("invalid config: {}", .0.join("; "))]
    Invalid(Vec<String>),

    #[error("blacklist window `{name}` has unparsable timestamp `{value}`")]
    InvalidWindow { name: String, value: String },

    #[error("no config file path to reload from")]
    NoSource,
}
