//! Retry with exponential back-off and jitter for outbound HTTP calls.
//!
//! Used by the rendering-service client and the chat-completions client.
//! Only transient failures are retried; a refused request or an unusable
//! answer is returned on the first attempt.

use std::future::Future;
use std::time::Duration;

use crate::error::{FetchError, ModelError};

const MAX_DELAY_MS: u64 = 30_000;

/// Errors that know whether another attempt could succeed.
pub(crate) trait Retriable: std::fmt::Display {
    fn is_retriable(&self) -> bool;
}

/// **Retriable:** transport failures (timeouts, resets) and upstream 5xx/429.
/// **Not retriable:** client refusals, unavailable capabilities, bad URLs.
impl Retriable for FetchError {
    fn is_retriable(&self) -> bool {
        match self {
            FetchError::Transport(_) | FetchError::Upstream { .. } => true,
            FetchError::Client { .. }
            | FetchError::Unavailable { .. }
            | FetchError::InvalidUrl { .. } => false,
        }
    }
}

impl Retriable for ModelError {
    fn is_retriable(&self) -> bool {
        match self {
            ModelError::Http(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            ModelError::Status { status, .. } => *status == 429 || *status >= 500,
            ModelError::Deserialize { .. } | ModelError::InvalidAnswer(_) => false,
        }
    }
}

/// Runs `operation` with up to `max_retries` additional attempts on transient
/// errors.
///
/// The n-th retry sleeps `backoff_base_ms × 2^(n-1)` (capped at 30 s) with
/// ±25 % jitter. With `max_retries = 2` the operation runs at most 3 times.
pub(crate) async fn retry_with_backoff<T, E, F, Fut>(
    max_retries: u32,
    backoff_base_ms: u64,
    mut operation: F,
) -> Result<T, E>
where
    E: Retriable,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut attempt = 0u32;
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                if !err.is_retriable() || attempt >= max_retries {
                    return Err(err);
                }
                attempt += 1;
                let computed = backoff_base_ms.saturating_mul(1u64 << (attempt - 1).min(10));
                let capped = computed.min(MAX_DELAY_MS);
                #[allow(
                    clippy::cast_possible_truncation,
                    clippy::cast_sign_loss,
                    clippy::cast_precision_loss
                )]
                let delay_ms = (capped as f64 * (rand::random::<f64>() * 0.5 + 0.75)) as u64;
                tracing::warn!(
                    attempt,
                    max_retries,
                    delay_ms,
                    error = %err,
                    "transient error, retrying after back-off"
                );
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            }
        }
    }
}
