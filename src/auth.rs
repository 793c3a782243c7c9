//! # auth — X-API-Key guard for the decision endpoints
//!
//! ```text
//! request ─▶ open path? (/health, /version) ──yes──▶ handler
//!               │ no
//!               ▼
//!          ApiKey disabled? ─────────────yes──▶ handler   (dev mode)
//!               │ no
//!               ▼
//!          X-API-Key matches? ───────────yes──▶ handler
//!               │ no
//!               └─▶ 401 {"ok": false, "error": "Unauthorized: …"}
//! ```
//!
//! Key อ่านครั้งเดียวตอนสร้าง `AppState` ไม่อ่าน env ทุก request
//!
//! ```bash
//! curl -H "X-API-Key: $API_KEY" -d @bull.json http://localhost:8000/decide/enter
//! ```

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use tracing::warn;

use crate::{error::AppError, state::SharedState};

pub const API_KEY_HEADER: &str = "X-API-Key";

const OPEN_PATHS: [&str; 2] = ["/health", "/version"];

/// Configured API key.  Empty or unset = auth disabled.
#[derive(Clone, Default)]
pub struct ApiKey(Option<String>);

impl ApiKey {
    pub fn new(key: impl Into<String>) -> Self {
        let key = key.into();
        if key.trim().is_empty() {
            Self(None)
        } else {
            Self(Some(key))
        }
    }

    pub fn disabled() -> Self {
        Self(None)
    }

    pub fn from_env() -> Self {
        Self::new(std::env::var("API_KEY").unwrap_or_default())
    }

    pub fn is_enabled(&self) -> bool {
        self.0.is_some()
    }

    pub fn verify(&self, provided: Option<&str>) -> bool {
        match (&self.0, provided) {
            (None, _) => true,
            (Some(expected), Some(provided)) => constant_time_eq(expected.as_bytes(), provided.as_bytes()),
            (Some(_), None) => false,
        }
    }
}

impl std::fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(if self.is_enabled() { "ApiKey(set)" } else { "ApiKey(disabled)" })
    }
}

/// Compares every byte regardless of where the first mismatch is.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

pub async fn require_api_key(
    State(state): State<SharedState>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let path = request.uri().path();
    if !state.api_key.is_enabled() || OPEN_PATHS.contains(&path) {
        return Ok(next.run(request).await);
    }

    let provided = request
        .headers()
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok());

    if state.api_key.verify(provided) {
        Ok(next.run(request).await)
    } else {
        warn!(path, "❌ Unauthorized request — invalid or missing X-API-Key");
        Err(AppError::Unauthorized)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_key_disables_auth() {
        assert!(!ApiKey::new("  ").is_enabled());
        assert!(ApiKey::disabled().verify(None));
    }

    #[test]
    fn test_verify() {
        let key = ApiKey::new("s3cret");
        assert!(key.verify(Some("s3cret")));
        assert!(!key.verify(Some("s3cre")));
        assert!(!key.verify(Some("s3creT")));
        assert!(!key.verify(None));
    }

    #[test]
    fn test_debug_hides_key() {
        assert_eq!(format!("{:?}", ApiKey::new("s3cret")), "ApiKey(set)");
    }
}
