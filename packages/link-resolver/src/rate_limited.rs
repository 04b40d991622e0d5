//! Rate-limited fetcher wrapper.
//!
//! Wraps any `PageFetcher` with a single governor limiter. The limiter is
//! shared by every concurrent resolution that goes through the same wrapper,
//! so it caps total outbound requests rather than per-call pacing.

use async_trait::async_trait;
use governor::{Quota, RateLimiter};
use std::num::NonZeroU32;
use std::sync::Arc;

use crate::fetcher::{LivenessCheck, PageFetcher};

type DefaultRateLimiter = RateLimiter<
    governor::state::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

/// A fetcher wrapper that enforces a global request rate.
///
/// Clones share the same limiter.
#[derive(Clone)]
pub struct RateLimitedFetcher<F: PageFetcher> {
    inner: F,
    limiter: Arc<DefaultRateLimiter>,
}

impl<F: PageFetcher> RateLimitedFetcher<F> {
    /// Zero is treated as one request per second.
    pub fn new(fetcher: F, requests_per_second: u32) -> Self {
        let rps = NonZeroU32::new(requests_per_second).unwrap_or(NonZeroU32::MIN);
        Self::with_quota(fetcher, Quota::per_second(rps))
    }

    pub fn with_quota(fetcher: F, quota: Quota) -> Self {
        Self {
            inner: fetcher,
            limiter: Arc::new(RateLimiter::direct(quota)),
        }
    }

    pub fn inner(&self) -> &F {
        &self.inner
    }

    async fn wait_for_permit(&self) {
        self.limiter.until_ready().await;
    }
}

#[async_trait]
impl<F: PageFetcher> PageFetcher for RateLimitedFetcher<F> {
    async fn fetch(&self, url: &str) -> Option<String> {
        self.wait_for_permit().await;
        self.inner.fetch(url).await
    }

    async fn final_url(&self, url: &str) -> Option<String> {
        self.wait_for_permit().await;
        self.inner.final_url(url).await
    }

    async fn is_live(&self, url: &str) -> bool {
        self.wait_for_permit().await;
        self.inner.is_live(url).await
    }
}

#[async_trait]
impl<F: PageFetcher> LivenessCheck for RateLimitedFetcher<F> {
    async fn is_live(&self, url: &str) -> bool {
        PageFetcher::is_live(self, url).await
    }
}

/// Wraps any fetcher in a [`RateLimitedFetcher`].
pub trait FetcherExt: PageFetcher + Sized {
    fn rate_limited(self, requests_per_second: u32) -> RateLimitedFetcher<Self> {
        RateLimitedFetcher::new(self, requests_per_second)
    }
}

impl<F: PageFetcher + Sized> FetcherExt for F {}
