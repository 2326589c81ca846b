//! Bounded pool of headless-browser instances.
//!
//! The pool is engine-independent: it only knows the [`BrowserLauncher`],
//! [`BrowserHandle`] and [`BrowserSession`] capabilities. Leased slots never
//! exceed the pool size; a [`RenderLease`] returns its browser on every exit
//! path, including drop.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::error::RenderError;

#[async_trait]
pub trait BrowserLauncher: Send + Sync {
    async fn launch(&self) -> Result<Box<dyn BrowserHandle>, RenderError>;
}

/// One running browser process.
#[async_trait]
pub trait BrowserHandle: Send + Sync {
    fn is_connected(&self) -> bool;

    /// Opens an isolated session (fresh tab/context) on this browser.
    async fn new_session(&self) -> Result<Box<dyn BrowserSession>, RenderError>;

    async fn close(&self) {}
}

/// One isolated tab. Dropped sessions must not leak state into the next lease.
#[async_trait]
pub trait BrowserSession: Send {
    async fn navigate(&mut self, url: &str, timeout: Duration) -> Result<(), RenderError>;

    /// Current serialized DOM.
    async fn content(&mut self) -> Result<String, RenderError>;

    /// Chooses the `<option>` whose value is `value` in the `<select>` at `css`.
    async fn select_option(&mut self, css: &str, value: &str) -> Result<(), RenderError>;

    async fn click(&mut self, css: &str) -> Result<(), RenderError>;

    async fn close(self: Box<Self>) {}
}

#[derive(Debug, Clone, Copy)]
pub struct RenderPoolConfig {
    pub size: usize,
    pub lease_timeout: Duration,
}

impl Default for RenderPoolConfig {
    fn default() -> Self {
        Self {
            size: 2,
            lease_timeout: Duration::from_secs(30),
        }
    }
}

type Idle = Arc<Mutex<Vec<Box<dyn BrowserHandle>>>>;

pub struct RenderPool {
    launcher: Arc<dyn BrowserLauncher>,
    semaphore: Arc<Semaphore>,
    idle: Idle,
    in_use: Arc<AtomicUsize>,
    config: RenderPoolConfig,
}

impl RenderPool {
    /// Launches all `size` browsers up front.
    ///
    /// # Errors
    ///
    /// Returns [`RenderError::Launch`] if any browser fails to start.
    pub async fn new(
        launcher: Arc<dyn BrowserLauncher>,
        config: RenderPoolConfig,
    ) -> Result<Self, RenderError> {
        let size = config.size.max(1);
        let mut handles = Vec::with_capacity(size);
        for _ in 0..size {
            handles.push(launcher.launch().await?);
        }
        tracing::info!(size, "render pool ready");
        Ok(Self {
            launcher,
            semaphore: Arc::new(Semaphore::new(size)),
            idle: Arc::new(Mutex::new(handles)),
            in_use: Arc::new(AtomicUsize::new(0)),
            config: RenderPoolConfig { size, ..config },
        })
    }

    #[must_use]
    pub fn size(&self) -> usize {
        self.config.size
    }

    #[must_use]
    pub fn in_use(&self) -> usize {
        self.in_use.load(Ordering::SeqCst)
    }

    /// Leases a slot, waiting at most the configured lease timeout.
    ///
    /// # Errors
    ///
    /// See [`RenderPool::lease_with_timeout`].
    pub async fn lease(&self) -> Result<RenderLease, RenderError> {
        self.lease_with_timeout(self.config.lease_timeout).await
    }

    /// Leases a slot and opens a fresh session on it.
    ///
    /// # Errors
    ///
    /// - [`RenderError::LeaseTimeout`] if no slot frees up within `timeout`.
    /// - [`RenderError::PoolClosed`] after [`RenderPool::shutdown`].
    /// - [`RenderError::Launch`] / [`RenderError::Session`] if a respawn or
    ///   the session open fails; the slot is returned either way.
    pub async fn lease_with_timeout(&self, timeout: Duration) -> Result<RenderLease, RenderError> {
        let started = Instant::now();
        let permit = tokio::time::timeout(timeout, Arc::clone(&self.semaphore).acquire_owned())
            .await
            .map_err(|_| RenderError::LeaseTimeout {
                waited_ms: elapsed_ms(started),
            })?
            .map_err(|_| RenderError::PoolClosed)?;

        let pooled = self
            .idle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop();
        let handle = match pooled {
            Some(handle) if handle.is_connected() => handle,
            stale => {
                if stale.is_some() {
                    tracing::warn!("render slot disconnected, respawning browser");
                }
                self.launcher.launch().await?
            }
        };

        let session = match handle.new_session().await {
            Ok(session) => session,
            Err(e) => {
                // The handle is suspect; the next lease of this slot relaunches.
                tracing::warn!(error = %e, "failed to open browser session");
                return Err(e);
            }
        };

        self.in_use.fetch_add(1, Ordering::SeqCst);
        Ok(RenderLease {
            handle: Some(handle),
            session: Some(session),
            idle: Arc::clone(&self.idle),
            in_use: Arc::clone(&self.in_use),
            _permit: permit,
        })
    }

    /// Stops handing out leases and closes idle browsers.
    pub async fn shutdown(&self) {
        self.semaphore.close();
        let handles: Vec<_> = self
            .idle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect();
        for handle in handles {
            handle.close().await;
        }
        tracing::info!("render pool shut down");
    }
}

/// A leased browser slot with an open session.
pub struct RenderLease {
    handle: Option<Box<dyn BrowserHandle>>,
    session: Option<Box<dyn BrowserSession>>,
    idle: Idle,
    in_use: Arc<AtomicUsize>,
    _permit: OwnedSemaphorePermit,
}

impl std::fmt::Debug for RenderLease {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderLease")
            .field("has_session", &self.session.is_some())
            .finish_non_exhaustive()
    }
}

impl RenderLease {
    /// The lease's session.
    ///
    /// # Errors
    ///
    /// Returns [`RenderError::Session`] if the session was already closed.
    pub fn session(&mut self) -> Result<&mut (dyn BrowserSession + 'static), RenderError> {
        self.session
            .as_deref_mut()
            .ok_or_else(|| RenderError::Session("session already closed".to_string()))
    }

    /// Closes the session cleanly and returns the slot.
    pub async fn release(mut self) {
        if let Some(session) = self.session.take() {
            session.close().await;
        }
    }
}

impl Drop for RenderLease {
    fn drop(&mut self) {
        // Any session still open is dropped here without a graceful close.
        self.session.take();
        if let Some(handle) = self.handle.take() {
            self.idle
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(handle);
        }
        self.in_use.fetch_sub(1, Ordering::SeqCst);
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}
