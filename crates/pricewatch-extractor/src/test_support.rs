//! In-process fakes for the browser, fetcher and model capabilities.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::error::{FetchError, ModelError, RenderError};
use crate::fetch::{Capability, FetchedPage, PageFetcher};
use crate::llm::{LanguageModel, LlmPriceAnswer, LlmPriceRequest};
use crate::render_pool::{BrowserHandle, BrowserLauncher, BrowserSession};

/// Scripted page: initial HTML plus the HTML shown after an interaction.
#[derive(Debug, Clone, Default)]
pub(crate) struct FakePage {
    html: String,
    /// `(css, value, html_after)`; an empty value means a click.
    transitions: Vec<(String, String, String)>,
}

impl FakePage {
    pub(crate) fn static_html(html: &str) -> Self {
        Self {
            html: html.to_string(),
            transitions: Vec::new(),
        }
    }

    pub(crate) fn on_select(mut self, css: &str, value: &str, html_after: &str) -> Self {
        self.transitions
            .push((css.to_string(), value.to_string(), html_after.to_string()));
        self
    }

    pub(crate) fn on_click(self, css: &str, html_after: &str) -> Self {
        self.on_select(css, "", html_after)
    }
}

pub(crate) struct FakeSession {
    page: FakePage,
    current: String,
    log: Arc<Mutex<Vec<String>>>,
}

impl FakeSession {
    pub(crate) fn new(page: FakePage) -> Self {
        Self {
            current: page.html.clone(),
            page,
            log: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub(crate) fn log(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }

    fn transition(&mut self, css: &str, value: &str) -> Result<(), RenderError> {
        let next = self
            .page
            .transitions
            .iter()
            .find(|(c, v, _)| c == css && v == value)
            .map(|(_, _, html)| html.clone())
            .ok_or_else(|| RenderError::Interaction {
                locator: css.to_string(),
                reason: format!("no scripted transition for value '{value}'"),
            })?;
        self.current = next;
        Ok(())
    }
}

#[async_trait]
impl BrowserSession for FakeSession {
    async fn navigate(&mut self, url: &str, _timeout: Duration) -> Result<(), RenderError> {
        self.log.lock().unwrap().push(format!("navigate {url}"));
        self.current = self.page.html.clone();
        Ok(())
    }

    async fn content(&mut self) -> Result<String, RenderError> {
        Ok(self.current.clone())
    }

    async fn select_option(&mut self, css: &str, value: &str) -> Result<(), RenderError> {
        self.log.lock().unwrap().push(format!("select {css}={value}"));
        self.transition(css, value)
    }

    async fn click(&mut self, css: &str) -> Result<(), RenderError> {
        self.log.lock().unwrap().push(format!("click {css}"));
        self.transition(css, "")
    }
}

struct FakeHandle {
    page: FakePage,
    connected: Arc<AtomicBool>,
    sessions: Arc<AtomicUsize>,
    closes: Arc<AtomicUsize>,
}

#[async_trait]
impl BrowserHandle for FakeHandle {
    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn new_session(&self) -> Result<Box<dyn BrowserSession>, RenderError> {
        self.sessions.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeSession::new(self.page.clone())))
    }

    async fn close(&self) {
        self.closes.fetch_add(1, Ordering::SeqCst);
    }
}

pub(crate) struct FakeLauncher {
    page: FakePage,
    launches: AtomicUsize,
    sessions: Arc<AtomicUsize>,
    closes: Arc<AtomicUsize>,
    connected: Mutex<Vec<Arc<AtomicBool>>>,
}

impl FakeLauncher {
    pub(crate) fn new(page: FakePage) -> Self {
        Self {
            page,
            launches: AtomicUsize::new(0),
            sessions: Arc::new(AtomicUsize::new(0)),
            closes: Arc::new(AtomicUsize::new(0)),
            connected: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn closed(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    pub(crate) fn launches(&self) -> usize {
        self.launches.load(Ordering::SeqCst)
    }

    pub(crate) fn sessions_opened(&self) -> usize {
        self.sessions.load(Ordering::SeqCst)
    }

    pub(crate) fn disconnect_all(&self) {
        for flag in self.connected.lock().unwrap().iter() {
            flag.store(false, Ordering::SeqCst);
        }
    }
}

#[async_trait]
impl BrowserLauncher for FakeLauncher {
    async fn launch(&self) -> Result<Box<dyn BrowserHandle>, RenderError> {
        self.launches.fetch_add(1, Ordering::SeqCst);
        let connected = Arc::new(AtomicBool::new(true));
        self.connected.lock().unwrap().push(Arc::clone(&connected));
        Ok(Box::new(FakeHandle {
            page: self.page.clone(),
            connected,
            sessions: Arc::clone(&self.sessions),
            closes: Arc::clone(&self.closes),
        }))
    }
}

#[derive(Debug, Clone)]
pub(crate) enum FakeResponse {
    Page { html: String, cost: Decimal },
    Status(u16),
}

/// Serves one scripted response per capability and records the calls.
#[derive(Default)]
pub(crate) struct FakeFetcher {
    responses: Mutex<HashMap<Capability, FakeResponse>>,
    calls: Mutex<Vec<Capability>>,
}

impl FakeFetcher {
    pub(crate) fn with_page(self, capability: Capability, html: &str, cost: Decimal) -> Self {
        self.responses.lock().unwrap().insert(
            capability,
            FakeResponse::Page {
                html: html.to_string(),
                cost,
            },
        );
        self
    }

    pub(crate) fn with_status(self, capability: Capability, status: u16) -> Self {
        self.responses
            .lock()
            .unwrap()
            .insert(capability, FakeResponse::Status(status));
        self
    }

    pub(crate) fn calls(&self) -> Vec<Capability> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl PageFetcher for FakeFetcher {
    async fn fetch(
        &self,
        url: &str,
        capability: Capability,
        _max_cost: Decimal,
    ) -> Result<FetchedPage, FetchError> {
        self.calls.lock().unwrap().push(capability);
        let response = self.responses.lock().unwrap().get(&capability).cloned();
        match response {
            Some(FakeResponse::Page { html, cost }) => Ok(FetchedPage { html, cost }),
            Some(FakeResponse::Status(status)) if status >= 500 => Err(FetchError::Upstream {
                status,
                url: url.to_string(),
            }),
            Some(FakeResponse::Status(status)) => Err(FetchError::Client {
                status,
                url: url.to_string(),
            }),
            None => Err(FetchError::Unavailable {
                capability: capability.as_str(),
                reason: "not scripted".to_string(),
            }),
        }
    }

    fn supports(&self, capability: Capability) -> bool {
        self.responses.lock().unwrap().contains_key(&capability)
    }
}

/// Returns a fixed answer and counts calls.
pub(crate) struct FakeModel {
    name: String,
    answer: Option<LlmPriceAnswer>,
    calls: AtomicUsize,
    estimate: Decimal,
}

impl FakeModel {
    pub(crate) fn answering(name: &str, price: Option<Decimal>, confidence: f64, cost: Decimal) -> Self {
        Self {
            name: name.to_string(),
            answer: Some(LlmPriceAnswer {
                price,
                currency: Some("USD".to_string()),
                confidence,
                rationale: "scripted".to_string(),
                cost,
            }),
            calls: AtomicUsize::new(0),
            estimate: cost,
        }
    }

    pub(crate) fn failing(name: &str) -> Self {
        Self {
            name: name.to_string(),
            answer: None,
            calls: AtomicUsize::new(0),
            estimate: Decimal::ZERO,
        }
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LanguageModel for FakeModel {
    async fn extract_price(&self, _request: &LlmPriceRequest) -> Result<LlmPriceAnswer, ModelError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.answer
            .clone()
            .ok_or_else(|| ModelError::InvalidAnswer("scripted failure".to_string()))
    }

    fn model_name(&self) -> &str {
        &self.name
    }

    fn estimated_cost(&self, _content_chars: usize) -> Decimal {
        self.estimate
    }
}
