//! Page fetching: direct HTTP for plain pages, a rendering service for
//! script execution and anti-bot access.

use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use rust_decimal::Decimal;

use crate::error::FetchError;
use crate::retry::retry_with_backoff;

/// Header the rendering service uses to report what a call cost, in USD.
pub const RENDER_COST_HEADER: &str = "x-render-cost";

/// How much work the fetcher must do to obtain the page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    Static,
    Script,
    ScriptAntiBot,
}

impl Capability {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Capability::Static => "static",
            Capability::Script => "script",
            Capability::ScriptAntiBot => "script+anti-bot",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedPage {
    pub html: String,
    /// What the call cost; zero for direct fetches.
    pub cost: Decimal,
}

#[async_trait]
pub trait PageFetcher: Send + Sync {
    /// Fetches `url` with the given capability, spending at most `max_cost`.
    async fn fetch(
        &self,
        url: &str,
        capability: Capability,
        max_cost: Decimal,
    ) -> Result<FetchedPage, FetchError>;

    /// Whether `capability` can be served at all.
    fn supports(&self, capability: Capability) -> bool;
}

#[derive(Debug, Clone)]
pub struct FetchConfig {
    pub timeout_secs: u64,
    pub user_agent: String,
    pub max_retries: u32,
    pub backoff_base_ms: u64,
}

impl FetchConfig {
    #[must_use]
    pub fn from_app_config(config: &pricewatch_core::AppConfig) -> Self {
        Self {
            timeout_secs: config.request_timeout_secs,
            user_agent: config.user_agent.clone(),
            max_retries: config.max_retries,
            backoff_base_ms: config.retry_backoff_base_ms,
        }
    }
}

#[derive(Clone)]
pub struct RenderServiceEndpoint {
    pub base_url: String,
    pub api_key: String,
}

impl std::fmt::Debug for RenderServiceEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderServiceEndpoint")
            .field("base_url", &self.base_url)
            .field("api_key", &"[redacted]")
            .finish()
    }
}

/// [`PageFetcher`] over a ScrapingBee-style rendering service.
///
/// Without a configured endpoint only [`Capability::Static`] works, and it
/// fetches the page directly.
pub struct HttpRenderService {
    client: Client,
    endpoint: Option<RenderServiceEndpoint>,
    max_retries: u32,
    backoff_base_ms: u64,
}

impl HttpRenderService {
    /// # Errors
    ///
    /// Returns [`FetchError::Transport`] if the `reqwest::Client` cannot be
    /// built.
    pub fn new(
        config: &FetchConfig,
        endpoint: Option<RenderServiceEndpoint>,
    ) -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .connect_timeout(Duration::from_secs(10))
            .user_agent(config.user_agent.as_str())
            .build()?;
        Ok(Self {
            client,
            endpoint,
            max_retries: config.max_retries,
            backoff_base_ms: config.backoff_base_ms,
        })
    }

    fn classify(status: reqwest::StatusCode, url: &str) -> Result<(), FetchError> {
        if status.is_success() {
            return Ok(());
        }
        let status_code = status.as_u16();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
            return Err(FetchError::Upstream {
                status: status_code,
                url: url.to_string(),
            });
        }
        Err(FetchError::Client {
            status: status_code,
            url: url.to_string(),
        })
    }

    async fn fetch_direct(&self, url: &str) -> Result<FetchedPage, FetchError> {
        retry_with_backoff(self.max_retries, self.backoff_base_ms, || async move {
            let response = self
                .client
                .get(url)
                .header(
                    reqwest::header::ACCEPT,
                    "text/html,application/xhtml+xml;q=0.9,*/*;q=0.8",
                )
                .header(reqwest::header::ACCEPT_LANGUAGE, "en-US,en;q=0.9")
                .send()
                .await?;
            Self::classify(response.status(), url)?;
            let html = response.text().await?;
            Ok(FetchedPage {
                html,
                cost: Decimal::ZERO,
            })
        })
        .await
    }

    async fn fetch_via_service(
        &self,
        endpoint: &RenderServiceEndpoint,
        url: &str,
        capability: Capability,
        max_cost: Decimal,
    ) -> Result<FetchedPage, FetchError> {
        let service_url = format!("{}/", endpoint.base_url.trim_end_matches('/'));
        let render_js = if capability == Capability::Static {
            "false"
        } else {
            "true"
        };
        let premium = if capability == Capability::ScriptAntiBot {
            "true"
        } else {
            "false"
        };
        let max_cost = max_cost.to_string();

        retry_with_backoff(self.max_retries, self.backoff_base_ms, || {
            let service_url = service_url.clone();
            let max_cost = max_cost.clone();
            async move {
                let response = self
                    .client
                    .get(&service_url)
                    .query(&[
                        ("api_key", endpoint.api_key.as_str()),
                        ("url", url),
                        ("render_js", render_js),
                        ("premium_proxy", premium),
                        ("max_cost", max_cost.as_str()),
                    ])
                    .send()
                    .await?;
                Self::classify(response.status(), url)?;
                let cost = response
                    .headers()
                    .get(RENDER_COST_HEADER)
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| Decimal::from_str(v.trim()).ok())
                    .unwrap_or(Decimal::ZERO);
                let html = response.text().await?;
                Ok(FetchedPage { html, cost })
            }
        })
        .await
    }
}

#[async_trait]
impl PageFetcher for HttpRenderService {
    async fn fetch(
        &self,
        url: &str,
        capability: Capability,
        max_cost: Decimal,
    ) -> Result<FetchedPage, FetchError> {
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(FetchError::InvalidUrl {
                url: url.to_string(),
                reason: "expected an http(s) URL".to_string(),
            });
        }
        match (&self.endpoint, capability) {
            (Some(endpoint), _) => {
                self.fetch_via_service(endpoint, url, capability, max_cost)
                    .await
            }
            (None, Capability::Static) => self.fetch_direct(url).await,
            (None, _) => Err(FetchError::Unavailable {
                capability: capability.as_str(),
                reason: "no rendering service configured".to_string(),
            }),
        }
    }

    fn supports(&self, capability: Capability) -> bool {
        capability == Capability::Static || self.endpoint.is_some()
    }
}
