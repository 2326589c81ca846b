//! Headless Chromium behind the render pool's browser traits.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::page::Page;
use futures::StreamExt;
use pricewatch_extractor::{BrowserHandle, BrowserLauncher, BrowserSession, RenderError};
use tokio::sync::Mutex;

pub(crate) struct ChromiumLauncher {
    executable: Option<PathBuf>,
}

impl ChromiumLauncher {
    /// `PRICEWATCH_CHROMIUM_PATH` pins the binary; otherwise chromiumoxide
    /// searches the usual install locations.
    pub(crate) fn from_env() -> Self {
        Self {
            executable: std::env::var_os("PRICEWATCH_CHROMIUM_PATH").map(PathBuf::from),
        }
    }
}

#[async_trait]
impl BrowserLauncher for ChromiumLauncher {
    async fn launch(&self) -> Result<Box<dyn BrowserHandle>, RenderError> {
        let mut builder = BrowserConfig::builder()
            .arg("--disable-gpu")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-extensions")
            .arg("--disable-background-networking")
            .no_sandbox();
        if let Some(path) = &self.executable {
            builder = builder.chrome_executable(path);
        }
        let config = builder.build().map_err(RenderError::Launch)?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| RenderError::Launch(e.to_string()))?;

        let connected = Arc::new(AtomicBool::new(true));
        let flag = Arc::clone(&connected);
        tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    tracing::debug!(error = %e, "chromium handler event error");
                }
            }
            flag.store(false, Ordering::SeqCst);
        });

        Ok(Box::new(ChromiumHandle {
            browser: Mutex::new(browser),
            connected,
        }))
    }
}

struct ChromiumHandle {
    browser: Mutex<Browser>,
    connected: Arc<AtomicBool>,
}

#[async_trait]
impl BrowserHandle for ChromiumHandle {
    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn new_session(&self) -> Result<Box<dyn BrowserSession>, RenderError> {
        let page = self
            .browser
            .lock()
            .await
            .new_page("about:blank")
            .await
            .map_err(|e| RenderError::Session(e.to_string()))?;
        Ok(Box::new(ChromiumSession { page }))
    }

    async fn close(&self) {
        let mut browser = self.browser.lock().await;
        if let Err(e) = browser.close().await {
            tracing::debug!(error = %e, "chromium close failed");
        }
    }
}

struct ChromiumSession {
    page: Page,
}

/// Sets a `<select>` value and fires the events frameworks listen for.
fn select_script(css: &str, value: &str) -> Result<String, RenderError> {
    let encode = |s: &str| {
        serde_json::to_string(s).map_err(|e| RenderError::Interaction {
            locator: css.to_string(),
            reason: e.to_string(),
        })
    };
    Ok(format!(
        "(() => {{ const el = document.querySelector({sel}); if (!el) return false; \
         el.value = {val}; \
         el.dispatchEvent(new Event('input', {{ bubbles: true }})); \
         el.dispatchEvent(new Event('change', {{ bubbles: true }})); \
         return true; }})()",
        sel = encode(css)?,
        val = encode(value)?,
    ))
}

#[async_trait]
impl BrowserSession for ChromiumSession {
    async fn navigate(&mut self, url: &str, timeout: Duration) -> Result<(), RenderError> {
        let navigation = async {
            self.page.goto(url).await?;
            self.page.wait_for_navigation().await?;
            Ok::<(), chromiumoxide::error::CdpError>(())
        };
        match tokio::time::timeout(timeout, navigation).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(RenderError::Navigation {
                url: url.to_string(),
                reason: e.to_string(),
            }),
            Err(_) => Err(RenderError::NavigationTimeout {
                url: url.to_string(),
                timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
            }),
        }
    }

    async fn content(&mut self) -> Result<String, RenderError> {
        self.page
            .content()
            .await
            .map_err(|e| RenderError::Session(e.to_string()))
    }

    async fn select_option(&mut self, css: &str, value: &str) -> Result<(), RenderError> {
        let interaction = |reason: String| RenderError::Interaction {
            locator: css.to_string(),
            reason,
        };
        let found: bool = self
            .page
            .evaluate(select_script(css, value)?)
            .await
            .map_err(|e| interaction(e.to_string()))?
            .into_value()
            .map_err(|e| interaction(e.to_string()))?;
        if found {
            Ok(())
        } else {
            Err(interaction("no element matches".to_string()))
        }
    }

    async fn click(&mut self, css: &str) -> Result<(), RenderError> {
        let interaction = |reason: String| RenderError::Interaction {
            locator: css.to_string(),
            reason,
        };
        let element = self
            .page
            .find_element(css)
            .await
            .map_err(|e| interaction(e.to_string()))?;
        element
            .click()
            .await
            .map_err(|e| interaction(e.to_string()))?;
        Ok(())
    }

    async fn close(self: Box<Self>) {
        if let Err(e) = self.page.close().await {
            tracing::debug!(error = %e, "chromium page close failed");
        }
    }
}
