use pricewatch_core::TierOutcome;
use thiserror::Error;

/// Errors from the rendering service or a direct page fetch.
#[derive(Debug, Error)]
pub enum FetchError {
    /// 4xx other than 429: the site or service refused the request.
    #[error("request for {url} refused with HTTP {status}")]
    Client { status: u16, url: String },

    /// 5xx or 429 from the service or origin.
    #[error("upstream error HTTP {status} for {url}")]
    Upstream { status: u16, url: String },

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("capability {capability} unavailable: {reason}")]
    Unavailable {
        capability: &'static str,
        reason: String,
    },

    #[error("invalid URL \"{url}\": {reason}")]
    InvalidUrl { url: String, reason: String },
}

impl FetchError {
    /// The page looks blocked: worth a retry through the anti-bot capability.
    #[must_use]
    pub fn is_blocked(&self) -> bool {
        matches!(self, FetchError::Client { status, .. } if matches!(status, 401 | 403 | 406 | 451))
    }
}

/// Errors from a language-model call.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("model endpoint returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("JSON deserialization error for {context}: {source}")]
    Deserialize {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("model answer unusable: {0}")]
    InvalidAnswer(String),
}

/// Errors surfaced by a [`crate::store::PriceStore`] implementation.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store backend error: {0}")]
    Backend(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("stored value for {field} is invalid: {reason}")]
    Corrupt { field: String, reason: String },
}

impl StoreError {
    pub fn backend<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        StoreError::Backend(Box::new(err))
    }
}

/// Errors from the render pool and browser sessions.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("no render slot free after {waited_ms}ms")]
    LeaseTimeout { waited_ms: u64 },

    #[error("render pool is shut down")]
    PoolClosed,

    #[error("browser launch failed: {0}")]
    Launch(String),

    #[error("browser session error: {0}")]
    Session(String),

    #[error("navigation to {url} timed out after {timeout_ms}ms")]
    NavigationTimeout { url: String, timeout_ms: u64 },

    #[error("navigation to {url} failed: {reason}")]
    Navigation { url: String, reason: String },

    #[error("interaction with {locator} failed: {reason}")]
    Interaction { locator: String, reason: String },
}

/// Everything a tier attempt can fail with.
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Render(#[from] RenderError),

    #[error(transparent)]
    Model(#[from] ModelError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("invalid locator \"{0}\"")]
    InvalidLocator(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl ExtractError {
    /// Audit classification of this failure.
    #[must_use]
    pub fn outcome(&self) -> TierOutcome {
        match self {
            ExtractError::Render(RenderError::LeaseTimeout { .. } | RenderError::PoolClosed) => {
                TierOutcome::PoolExhausted
            }
            ExtractError::Render(RenderError::NavigationTimeout { .. }) => TierOutcome::Timeout,
            ExtractError::Fetch(FetchError::Transport(e)) | ExtractError::Model(ModelError::Http(e))
                if e.is_timeout() =>
            {
                TierOutcome::Timeout
            }
            ExtractError::Fetch(FetchError::Unavailable { .. }) => TierOutcome::Skipped,
            ExtractError::InvalidLocator(_) | ExtractError::InvalidRequest(_) => {
                TierOutcome::NoCandidate
            }
            _ => TierOutcome::Transport,
        }
    }
}
