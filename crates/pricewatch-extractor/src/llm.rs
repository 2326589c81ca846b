//! Language-model clients for the two AI tiers.
//!
//! The partial tier sends a cheap model a slice of the page (title, JSON-LD,
//! and text windows around currency amounts); the full tier sends an
//! expensive model the whole visible text.

use std::str::FromStr;
use std::sync::LazyLock;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::dom::PageDocument;
use crate::error::ModelError;
use crate::parse::{currency_for_symbol, parse_number, NumericPriceParser};
use crate::retry::retry_with_backoff;

static JSONLD_SCRIPT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)<script[^>]*type\s*=\s*["']application/ld\+json["'][^>]*>(.*?)</script>"#)
        .expect("valid regex")
});

const PARTIAL_WINDOW_CHARS: usize = 160;
const PARTIAL_MAX_CHARS: usize = 6_000;
const FULL_MAX_CHARS: usize = 40_000;
const JSONLD_MAX_CHARS: usize = 2_000;

#[derive(Debug, Clone, PartialEq)]
pub struct LlmPriceRequest {
    pub item_name: String,
    pub url: String,
    pub content: String,
    pub previous_price: Option<Decimal>,
    pub variant_token: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LlmPriceAnswer {
    pub price: Option<Decimal>,
    pub currency: Option<String>,
    /// The model's own confidence in `[0, 1]`.
    pub confidence: f64,
    pub rationale: String,
    /// What the call cost in USD.
    pub cost: Decimal,
}

#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn extract_price(&self, request: &LlmPriceRequest) -> Result<LlmPriceAnswer, ModelError>;

    fn model_name(&self) -> &str;

    /// Upper bound on what one call may cost; used for the budget check.
    fn estimated_cost(&self, content_chars: usize) -> Decimal;
}

/// USD per 1 000 tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModelPricing {
    pub input_per_1k: Decimal,
    pub output_per_1k: Decimal,
}

impl ModelPricing {
    /// Published list prices for the default models; unknown models are
    /// priced like the expensive default so budgets stay conservative.
    #[must_use]
    pub fn for_model(model: &str) -> Self {
        if model.contains("mini") {
            Self {
                input_per_1k: Decimal::new(15, 5),
                output_per_1k: Decimal::new(60, 5),
            }
        } else {
            Self {
                input_per_1k: Decimal::new(250, 5),
                output_per_1k: Decimal::new(1000, 5),
            }
        }
    }

    #[must_use]
    pub fn cost(&self, prompt_tokens: u64, completion_tokens: u64) -> Decimal {
        let thousand = Decimal::from(1000);
        (Decimal::from(prompt_tokens) * self.input_per_1k
            + Decimal::from(completion_tokens) * self.output_per_1k)
            / thousand
    }
}

#[derive(Debug, Clone)]
pub struct ChatCompletionsConfig {
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    pub pricing: ModelPricing,
    pub timeout_secs: u64,
    pub max_retries: u32,
    pub backoff_base_ms: u64,
}

/// [`LanguageModel`] over an OpenAI-compatible chat-completions endpoint in
/// JSON mode.
pub struct ChatCompletionsModel {
    client: Client,
    config: ChatCompletionsConfig,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatUsage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
}

const SYSTEM_PROMPT: &str = "You read e-commerce product pages and report the current purchase price \
of one specific item. Ignore bundle, kit, accessory, financing and related-product prices. \
Return JSON with keys: price (number or null), currency (ISO code or null), \
confidence (0..1), rationale (one sentence).";

impl ChatCompletionsModel {
    /// # Errors
    ///
    /// Returns [`ModelError::Http`] if the `reqwest::Client` cannot be built.
    pub fn new(config: ChatCompletionsConfig) -> Result<Self, ModelError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self { client, config })
    }

    fn request_body(&self, request: &LlmPriceRequest) -> Value {
        let mut prompt = format!(
            "Item: {}\nURL: {}\n",
            request.item_name, request.url
        );
        if let Some(token) = &request.variant_token {
            prompt.push_str(&format!("Variant: {token} (report this variant's price only)\n"));
        }
        if let Some(previous) = request.previous_price {
            prompt.push_str(&format!("Last known price: {previous}\n"));
        }
        prompt.push_str("\nPage content:\n");
        prompt.push_str(&request.content);

        json!({
            "model": self.config.model,
            "response_format": { "type": "json_object" },
            "messages": [
                { "role": "system", "content": SYSTEM_PROMPT },
                { "role": "user", "content": prompt }
            ],
            "temperature": 0.0
        })
    }
}

#[async_trait]
impl LanguageModel for ChatCompletionsModel {
    async fn extract_price(&self, request: &LlmPriceRequest) -> Result<LlmPriceAnswer, ModelError> {
        let url = format!(
            "{}/chat/completions",
            self.config.base_url.trim_end_matches('/')
        );
        let body = self.request_body(request);

        let response: ChatResponse =
            retry_with_backoff(self.config.max_retries, self.config.backoff_base_ms, || {
                let url = url.clone();
                let body = &body;
                async move {
                    let response = self
                        .client
                        .post(&url)
                        .bearer_auth(&self.config.api_key)
                        .json(body)
                        .send()
                        .await?;
                    let status = response.status();
                    let text = response.text().await?;
                    if !status.is_success() {
                        return Err(ModelError::Status {
                            status: status.as_u16(),
                            body: text.chars().take(500).collect(),
                        });
                    }
                    serde_json::from_str(&text).map_err(|e| ModelError::Deserialize {
                        context: "chat completion".to_string(),
                        source: e,
                    })
                }
            })
            .await?;

        let cost = response
            .usage
            .as_ref()
            .map_or(Decimal::ZERO, |u| {
                self.config.pricing.cost(u.prompt_tokens, u.completion_tokens)
            });
        let content = response
            .choices
            .first()
            .and_then(|c| c.message.content.as_deref())
            .ok_or_else(|| ModelError::InvalidAnswer("empty completion".to_string()))?;

        let mut answer = parse_answer(content)?;
        answer.cost = cost;
        tracing::debug!(
            model = %self.config.model,
            price = ?answer.price,
            confidence = answer.confidence,
            %cost,
            "model answered"
        );
        Ok(answer)
    }

    fn model_name(&self) -> &str {
        &self.config.model
    }

    fn estimated_cost(&self, content_chars: usize) -> Decimal {
        // Roughly four characters per token, plus prompt overhead and a short answer.
        let prompt_tokens = u64::try_from(content_chars / 4).unwrap_or(u64::MAX) + 300;
        self.config.pricing.cost(prompt_tokens, 150)
    }
}

/// Parses the model's JSON answer. `price` may be a number or a string.
///
/// # Errors
///
/// Returns [`ModelError::Deserialize`] if `content` is not JSON.
pub fn parse_answer(content: &str) -> Result<LlmPriceAnswer, ModelError> {
    let parsed: Value = serde_json::from_str(content).map_err(|e| ModelError::Deserialize {
        context: "model answer".to_string(),
        source: e,
    })?;

    let currency = parsed
        .get("currency")
        .and_then(Value::as_str)
        .and_then(|c| currency_for_symbol(c).or_else(|| Some(c.trim().to_uppercase())))
        .filter(|c| c.len() == 3);

    let price = match parsed.get("price") {
        Some(Value::Number(n)) => Decimal::from_str(&n.to_string()).ok(),
        Some(Value::String(s)) => NumericPriceParser::default()
            .parse_amount(s)
            .or_else(|| parse_number(s, currency.as_deref())),
        _ => None,
    }
    .filter(|p| *p > Decimal::ZERO);

    let confidence = parsed
        .get("confidence")
        .and_then(Value::as_f64)
        .unwrap_or(0.5)
        .clamp(0.0, 1.0);
    let rationale = parsed
        .get("rationale")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .trim()
        .to_string();

    Ok(LlmPriceAnswer {
        price,
        currency,
        confidence,
        rationale,
        cost: Decimal::ZERO,
    })
}

/// Title, JSON-LD blocks, and text windows around currency amounts.
#[must_use]
pub fn partial_content(html: &str) -> String {
    let mut out = String::new();
    let doc = PageDocument::parse(html);
    if let Some(title) = doc.title() {
        out.push_str("Title: ");
        out.push_str(&title);
        out.push('\n');
    }

    for cap in JSONLD_SCRIPT_RE.captures_iter(html) {
        if let Some(block) = cap.get(1) {
            let compact: String = block
                .as_str()
                .split_whitespace()
                .collect::<Vec<_>>()
                .join(" ")
                .chars()
                .take(JSONLD_MAX_CHARS)
                .collect();
            out.push_str("JSON-LD: ");
            out.push_str(&compact);
            out.push('\n');
        }
    }

    let text = doc.visible_text();
    let parser = NumericPriceParser::default();
    let mut windows: Vec<(usize, usize)> = Vec::new();
    for amount in parser.find_amounts(&text, true, None) {
        let start = floor_char_boundary(&text, amount.start.saturating_sub(PARTIAL_WINDOW_CHARS));
        let end = ceil_char_boundary(&text, (amount.end + PARTIAL_WINDOW_CHARS).min(text.len()));
        match windows.last_mut() {
            Some(last) if start <= last.1 => last.1 = last.1.max(end),
            _ => windows.push((start, end)),
        }
    }
    for (start, end) in windows {
        out.push_str("… ");
        out.push_str(&text[start..end]);
        out.push_str(" …\n");
    }

    out.chars().take(PARTIAL_MAX_CHARS).collect()
}

/// Title plus all visible text, capped.
#[must_use]
pub fn full_content(html: &str) -> String {
    let doc = PageDocument::parse(html);
    let mut out = doc.title().map(|t| format!("Title: {t}\n")).unwrap_or_default();
    out.push_str(&doc.visible_text());
    out.chars().take(FULL_MAX_CHARS).collect()
}

fn floor_char_boundary(s: &str, mut idx: usize) -> usize {
    while idx > 0 && !s.is_char_boundary(idx) {
        idx -= 1;
    }
    idx
}

fn ceil_char_boundary(s: &str, mut idx: usize) -> usize {
    while idx < s.len() && !s.is_char_boundary(idx) {
        idx += 1;
    }
    idx
}
