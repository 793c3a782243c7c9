//! # rationale — RationaleGenerator implementations
//!
//! ```text
//! LLM_PROVIDER=heuristic  → HeuristicRationale  (local, deterministic, default)
//! LLM_PROVIDER=claude     → LlmRationale(Claude)  needs LLM_API_KEY
//! LLM_PROVIDER=openai     → LlmRationale(OpenAI)  needs LLM_API_KEY
//! LLM_PROVIDER=none       → no generator, borderline cases annotated "skipped"
//! ```
//!
//! The arbiter wraps every call in its own timeout; nothing here retries.

use std::fmt;
use std::sync::Arc;

use anyhow::{bail, Context};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::engine::arbitration::{Arbitration, ArbitrationContext, ArbitrationError, RationaleGenerator};

// ─── Provider ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmProvider {
    Claude,
    OpenAi,
}

impl fmt::Display for LlmProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LlmProvider::Claude => write!(f, "claude"),
            LlmProvider::OpenAi => write!(f, "openai"),
        }
    }
}

/// Build the generator selected by `LLM_PROVIDER`.
pub fn from_env() -> anyhow::Result<Option<Arc<dyn RationaleGenerator>>> {
    let provider = std::env::var("LLM_PROVIDER")
        .unwrap_or_else(|_| "heuristic".to_string())
        .to_lowercase();

    let provider = match provider.as_str() {
        "heuristic" => return Ok(Some(Arc::new(HeuristicRationale))),
        "none" | "off" => return Ok(None),
        "claude" => LlmProvider::Claude,
        "openai" => LlmProvider::OpenAi,
        other => bail!("Unknown LLM_PROVIDER: '{other}'. Use 'heuristic', 'claude', 'openai' or 'none'"),
    };

    let api_key = std::env::var("LLM_API_KEY")
        .context("LLM_API_KEY environment variable is required for remote LLM providers")?;

    info!(%provider, "🧠 Remote LLM arbitration enabled");
    Ok(Some(Arc::new(LlmRationale::new(provider, api_key))))
}

// ─── Heuristic ────────────────────────────────────────────────────────────────

const VISION_CONFIRM: f64 = 0.75;

/// Looks for order-flow / vision / technical-signal convergence.  No I/O.
#[derive(Debug, Default, Clone, Copy)]
pub struct HeuristicRationale;

#[async_trait]
impl RationaleGenerator for HeuristicRationale {
    fn name(&self) -> &str {
        "heuristic"
    }

    async fn arbitrate(&self, ctx: &ArbitrationContext<'_>) -> Result<Arbitration, ArbitrationError> {
        let of = &ctx.features.order_flow;
        let flow_agrees = of.obi * of.d_cvd > 0.0 && of.replenish >= 0.5;
        let converged = flow_agrees && ctx.features.pine_match && ctx.features.c_vision >= VISION_CONFIRM;

        let (rationale, confidence) = if converged {
            ("borderline arbitration based on OF/TV convergence", 0.60)
        } else if flow_agrees {
            ("order flow supports the move, technical signal does not confirm", 0.50)
        } else {
            ("order flow diverges from the hit estimate", 0.40)
        };

        Ok(Arbitration {
            rationale:  rationale.to_string(),
            confidence,
            tag:        "borderline-arb".to_string(),
        })
    }
}

// ─── Remote LLM ───────────────────────────────────────────────────────────────

pub struct LlmRationale {
    client:   reqwest::Client,
    provider: LlmProvider,
    api_key:  String,
}

impl LlmRationale {
    pub fn new(provider: LlmProvider, api_key: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            provider,
            api_key,
        }
    }

    async fn call(&self, prompt: &str) -> anyhow::Result<String> {
        match self.provider {
            LlmProvider::Claude => call_claude(&self.client, &self.api_key, prompt).await,
            LlmProvider::OpenAi => call_openai(&self.client, &self.api_key, prompt).await,
        }
    }
}

#[async_trait]
impl RationaleGenerator for LlmRationale {
    fn name(&self) -> &str {
        match self.provider {
            LlmProvider::Claude => "claude",
            LlmProvider::OpenAi => "openai",
        }
    }

    async fn arbitrate(&self, ctx: &ArbitrationContext<'_>) -> Result<Arbitration, ArbitrationError> {
        let prompt = build_prompt(ctx).map_err(|e| ArbitrationError::InvalidResponse(e.to_string()))?;
        let raw = self
            .call(&prompt)
            .await
            .map_err(|e| ArbitrationError::Transport(format!("{e:#}")))?;
        parse_arbitration(&raw)
    }
}

const SYSTEM_PROMPT: &str = "You are a crypto futures risk reviewer. Respond with valid JSON only.";

fn build_prompt(ctx: &ArbitrationContext<'_>) -> anyhow::Result<String> {
    let snapshot = serde_json::to_string(ctx).context("serialize arbitration context")?;
    Ok(format!(
        "A {tf} {symbol} entry has a borderline hit probability of {p:.2}.\n\
         Review the snapshot and judge whether order flow and technicals support it.\n\n\
         Snapshot:\n{snapshot}\n\n\
         Reply with exactly this JSON shape:\n\
         {{\"rationale\": \"<one sentence>\", \"confidence\": <0..1>, \"tag\": \"borderline-arb\"}}",
        tf = ctx.tf,
        symbol = ctx.symbol,
        p = ctx.estimate.p_hit,
    ))
}

/// Accepts `{rationale, confidence, tag}` or the `{c_llm, meta_tag}` spelling,
/// optionally wrapped in a markdown code fence.
pub fn parse_arbitration(text: &str) -> Result<Arbitration, ArbitrationError> {
    let cleaned = strip_markdown(text);
    serde_json::from_str(&cleaned)
        .map_err(|e| ArbitrationError::InvalidResponse(format!("{e}: {cleaned}")))
}

fn strip_markdown(text: &str) -> String {
    let text = text.trim();
    if let Some(inner) = text.strip_prefix("```json") {
        inner.trim_end_matches("```").trim().to_string()
    } else if let Some(inner) = text.strip_prefix("```") {
        inner.trim_end_matches("```").trim().to_string()
    } else {
        text.to_string()
    }
}

// ── Anthropic ─────────────────────────────────────────────────────────────────

#[derive(Serialize)]
struct ClaudeRequest<'a> {
    model:      &'a str,
    max_tokens: u32,
    system:     &'a str,
    messages:   Vec<ChatMessage<'a>>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role:    &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ClaudeResponse {
    content: Vec<ClaudeContent>,
}

#[derive(Deserialize)]
struct ClaudeContent {
    text: String,
}

async fn call_claude(client: &reqwest::Client, api_key: &str, prompt: &str) -> anyhow::Result<String> {
    let body = ClaudeRequest {
        model:      "claude-3-5-haiku-20241022",
        max_tokens: 200,
        system:     SYSTEM_PROMPT,
        messages:   vec![ChatMessage { role: "user", content: prompt }],
    };

    debug!("Calling Claude API for arbitration...");

    let resp = client
        .post("https://api.anthropic.com/v1/messages")
        .header("x-api-key", api_key)
        .header("anthropic-version", "2023-06-01")
        .json(&body)
        .send()
        .await
        .context("Claude API request failed")?;

    if !resp.status().is_success() {
        let status = resp.status();
        let text = resp.text().await.unwrap_or_default();
        bail!("Claude API error {status}: {text}");
    }

    let data: ClaudeResponse = resp.json().await.context("Claude response parse error")?;
    data.content
        .into_iter()
        .next()
        .map(|c| c.text)
        .context("Claude returned empty content")
}

// ── OpenAI ────────────────────────────────────────────────────────────────────

#[derive(Serialize)]
struct OpenAiRequest<'a> {
    model:    &'a str,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Deserialize)]
struct OpenAiResponse {
    choices: Vec<OpenAiChoice>,
}

#[derive(Deserialize)]
struct OpenAiChoice {
    message: OpenAiChoiceMsg,
}

#[derive(Deserialize)]
struct OpenAiChoiceMsg {
    content: Option<String>,
}

async fn call_openai(client: &reqwest::Client, api_key: &str, prompt: &str) -> anyhow::Result<String> {
    let body = OpenAiRequest {
        model:    "gpt-4o-mini",
        messages: vec![
            ChatMessage { role: "system", content: SYSTEM_PROMPT },
            ChatMessage { role: "user",   content: prompt },
        ],
    };

    debug!("Calling OpenAI API for arbitration...");

    let resp = client
        .post("https://api.openai.com/v1/chat/completions")
        .bearer_auth(api_key)
        .json(&body)
        .send()
        .await
        .context("OpenAI API request failed")?;

    if !resp.status().is_success() {
        let status = resp.status();
        let text = resp.text().await.unwrap_or_default();
        bail!("OpenAI API error {status}: {text}");
    }

    let data: OpenAiResponse = resp.json().await.context("OpenAI response parse error")?;
    data.choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .context("OpenAI returned empty content")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::examples;

    #[test]
    fn test_parse_plain_and_fenced() {
        let plain = r#"{"rationale":"OF/TV agree","confidence":0.6,"tag":"borderline-arb"}"#;
        assert_eq!(parse_arbitration(plain).unwrap().confidence, 0.6);

        let fenced = "```json\n{\"rationale\":\"x\",\"c_llm\":0.55,\"meta_tag\":\"borderline-arb\"}\n```";
        let arb = parse_arbitration(fenced).unwrap();
        assert_eq!(arb.confidence, 0.55);
        assert_eq!(arb.tag, "borderline-arb");
    }

    #[test]
    fn test_parse_garbage_is_invalid_response() {
        assert!(matches!(
            parse_arbitration("I think you should buy"),
            Err(ArbitrationError::InvalidResponse(_))
        ));
    }

    #[test]
    fn test_prompt_carries_snapshot() {
        let request = examples::bull_entry_request();
        let ctx = ArbitrationContext {
            symbol:   &request.symbol,
            tf:       request.tf,
            features: &request.features,
            estimate: &request.pgm,
            temporal: None,
        };
        let prompt = build_prompt(&ctx).unwrap();
        assert!(prompt.contains("15m BTCUSDT"));
        assert!(prompt.contains("\"C_align\":0.89"));
    }

    #[tokio::test]
    async fn test_heuristic_is_deterministic() {
        let request = examples::bull_entry_request();
        let ctx = ArbitrationContext {
            symbol:   &request.symbol,
            tf:       request.tf,
            features: &request.features,
            estimate: &request.pgm,
            temporal: None,
        };
        let a = HeuristicRationale.arbitrate(&ctx).await.unwrap();
        let b = HeuristicRationale.arbitrate(&ctx).await.unwrap();
        assert_eq!(a, b);
        assert_eq!(a.confidence, 0.60);
        assert_eq!(a.tag, "borderline-arb");
    }
}
