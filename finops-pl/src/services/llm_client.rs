//! Language-model validation client
//!
//! Submits pattern candidates, with a sample of matched transactions and the
//! tenant's business context, to an OpenAI-compatible chat-completions
//! endpoint and parses a structured verdict. Verdict parsing is strict:
//! missing or wrong-typed fields are a `MalformedVerdict` error, never
//! silently defaulted.

use crate::db::transactions::LedgerTransaction;
use crate::models::{LlmVerdict, PatternCandidate};
use finops_common::config::LlmConfig;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::Mutex;

const REQUEST_TIMEOUT_SECS: u64 = 60;
const SAMPLE_LIMIT: usize = 5;

/// LLM client errors
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("API error {0}: {1}")]
    ApiError(u16, String),

    #[error("Empty completion response")]
    EmptyResponse,

    #[error("Malformed verdict: {0}")]
    MalformedVerdict(String),
}

/// Tenant business context included in every validation prompt
#[derive(Debug, Clone, Default)]
pub struct TenantContext {
    /// Business entity names for this tenant
    pub entity_names: Vec<String>,
    /// Counterparties already seen in this tenant's ledger
    pub known_counterparties: Vec<String>,
}

impl TenantContext {
    /// No entities and no counterparties; validation proceeds degraded
    pub fn is_empty(&self) -> bool {
        self.entity_names.is_empty() && self.known_counterparties.is_empty()
    }
}

/// Verdict source for the validation pass driver.
///
/// The driver takes the client as a generic parameter so tests can inject a
/// scripted implementation.
#[allow(async_fn_in_trait)]
pub trait VerdictClient {
    /// Identifier of the model answering, recorded on each validated pattern
    fn model(&self) -> &str;

    /// Submit one pattern for validation; exactly one model call per pattern
    /// per pass
    async fn validate_pattern(
        &self,
        pattern: &PatternCandidate,
        sample: &[LedgerTransaction],
        context: &TenantContext,
    ) -> Result<LlmVerdict, LlmError>;
}

/// Minimum-interval rate limiter for the completion endpoint
struct RateLimiter {
    last_request: Mutex<Option<Instant>>,
    min_interval: Duration,
}

impl RateLimiter {
    fn new(min_interval_ms: u64) -> Self {
        Self {
            last_request: Mutex::new(None),
            min_interval: Duration::from_millis(min_interval_ms),
        }
    }

    async fn wait(&self) {
        let mut last = self.last_request.lock().await;

        if let Some(last_time) = *last {
            let elapsed = last_time.elapsed();
            if elapsed < self.min_interval {
                let wait_time = self.min_interval - elapsed;
                tracing::debug!("LLM rate limiting: waiting {:?}", wait_time);
                tokio::time::sleep(wait_time).await;
            }
        }

        *last = Some(Instant::now());
    }
}

// Chat completions wire types (request)
#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: String,
}

// Chat completions wire types (response)
#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    content: Option<String>,
}

const SYSTEM_PROMPT: &str = "You are a financial operations assistant reviewing recurring \
transaction description patterns before they become automatic classification rules. \
Answer with a single JSON object: {\"is_valid\": bool, \"reasoning\": string, \
\"risk_assessment\": string}. The risk_assessment must state a risk level: low, medium, or high.";

/// Chat-completions LLM client
pub struct ChatLlmClient {
    http_client: reqwest::Client,
    config: LlmConfig,
    rate_limiter: RateLimiter,
}

impl ChatLlmClient {
    /// Create a new client from configuration
    pub fn new(config: LlmConfig) -> Result<Self, LlmError> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| LlmError::NetworkError(e.to_string()))?;

        let rate_limiter = RateLimiter::new(config.request_interval_ms);

        Ok(Self {
            http_client,
            config,
            rate_limiter,
        })
    }

    async fn complete(&self, prompt: String) -> Result<String, LlmError> {
        self.rate_limiter.wait().await;

        let url = format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'));
        let request = ChatRequest {
            model: &self.config.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT.to_string(),
                },
                ChatMessage {
                    role: "user",
                    content: prompt,
                },
            ],
            temperature: 0.0,
        };

        let response = self
            .http_client
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| LlmError::NetworkError(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::ApiError(status.as_u16(), body));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| LlmError::MalformedVerdict(format!("Invalid completion body: {}", e)))?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|content| !content.is_empty())
            .ok_or(LlmError::EmptyResponse)
    }
}

impl VerdictClient for ChatLlmClient {
    fn model(&self) -> &str {
        &self.config.model
    }

    async fn validate_pattern(
        &self,
        pattern: &PatternCandidate,
        sample: &[LedgerTransaction],
        context: &TenantContext,
    ) -> Result<LlmVerdict, LlmError> {
        let prompt = build_prompt(pattern, sample, context);
        let content = self.complete(prompt).await?;
        parse_verdict(&content)
    }
}

/// Build the user prompt for one pattern
pub fn build_prompt(
    pattern: &PatternCandidate,
    sample: &[LedgerTransaction],
    context: &TenantContext,
) -> String {
    let mut prompt = String::new();

    prompt.push_str(&format!(
        "Pattern signature: \"{}\"\n",
        pattern.description_pattern
    ));
    if let Some(counterparty) = &pattern.counterparty {
        prompt.push_str(&format!("Counterparty constraint: \"{}\"\n", counterparty));
    }
    prompt.push_str(&format!(
        "Observed {} times, uniformity confidence {:.2}.\n",
        pattern.occurrence_count, pattern.confidence_score
    ));

    prompt.push_str("\nSample matched transactions:\n");
    if sample.is_empty() {
        prompt.push_str("(none available)\n");
    }
    for txn in sample.iter().take(SAMPLE_LIMIT) {
        prompt.push_str(&format!(
            "- \"{}\" amount {:.2}{}\n",
            txn.description,
            txn.amount,
            txn.counterparty
                .as_deref()
                .map(|c| format!(" counterparty \"{}\"", c))
                .unwrap_or_default()
        ));
    }

    prompt.push_str("\nTenant business context:\n");
    if context.is_empty() {
        prompt.push_str("(no business entities on file)\n");
    } else {
        if !context.entity_names.is_empty() {
            prompt.push_str(&format!("Entities: {}\n", context.entity_names.join(", ")));
        }
        if !context.known_counterparties.is_empty() {
            prompt.push_str(&format!(
                "Known counterparties: {}\n",
                context.known_counterparties.join(", ")
            ));
        }
    }

    prompt.push_str(
        "\nIs this a semantically valid recurring pattern worth promoting to an automatic \
classification rule for this tenant? Respond with the JSON object only.",
    );

    prompt
}

/// Parse a completion body into a verdict.
///
/// Tolerates a fenced ```json code block around the object, nothing else.
pub fn parse_verdict(content: &str) -> Result<LlmVerdict, LlmError> {
    let trimmed = content.trim();
    let inner = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|rest| rest.strip_suffix("```"))
        .unwrap_or(trimmed)
        .trim();

    serde_json::from_str::<LlmVerdict>(inner).map_err(|e| LlmError::MalformedVerdict(e.to_string()))
}
