use std::num::NonZeroU32;

use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RateLimitError {
    #[error("wait cancelled")]
    Cancelled,
}

/// Process-wide token bucket gating task creation during imports.
///
/// Independent of the per-import concurrency semaphore: this bounds attempts
/// per second, the semaphore bounds attempts in flight.
pub struct ImportRateLimiter {
    limiter: DefaultDirectRateLimiter,
}

impl ImportRateLimiter {
    /// `per_second` tokens are refilled each second, up to `burst` banked.
    pub fn new(per_second: NonZeroU32, burst: NonZeroU32) -> Self {
        Self {
            limiter: RateLimiter::direct(Quota::per_second(per_second).allow_burst(burst)),
        }
    }

    /// Wait for a token, giving up as soon as `cancel` fires.
    pub async fn acquire(&self, cancel: &CancellationToken) -> Result<(), RateLimitError> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(RateLimitError::Cancelled),
            _ = self.limiter.until_ready() => Ok(()),
        }
    }
}
