//! Testing utilities including a scripted fetcher.
//!
//! Lets applications exercise resolution logic without network calls.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use crate::fetcher::{LivenessCheck, PageFetcher};

/// Record of a call made to the mock fetcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockFetchCall {
    Fetch { url: String },
    FinalUrl { url: String },
    IsLive { url: String },
}

/// A fetcher whose pages, redirects and live links are scripted up front.
///
/// - `fetch` returns the scripted page body, `None` otherwise.
/// - `final_url` follows scripted redirects (one hop); a URL with no redirect
///   answers with itself if it is a known page or live link, `None` otherwise.
/// - `is_live` is true only for URLs registered with `with_live`.
#[derive(Default, Clone)]
pub struct MockFetcher {
    pages: Arc<RwLock<HashMap<String, String>>>,
    redirects: Arc<RwLock<HashMap<String, String>>>,
    live: Arc<RwLock<HashSet<String>>>,
    latency: Option<Duration>,
    stalls: Arc<RwLock<HashMap<String, Duration>>>,
    calls: Arc<RwLock<Vec<MockFetchCall>>>,
}

impl MockFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_page(self, url: impl Into<String>, html: impl Into<String>) -> Self {
        self.pages.write().unwrap().insert(url.into(), html.into());
        self
    }

    pub fn with_redirect(self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.redirects.write().unwrap().insert(from.into(), to.into());
        self
    }

    pub fn with_live(self, url: impl Into<String>) -> Self {
        self.live.write().unwrap().insert(url.into());
        self
    }

    /// Delay every call, for exercising timeouts.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Delay only the calls that touch `url`.
    pub fn with_stall(self, url: impl Into<String>, delay: Duration) -> Self {
        self.stalls.write().unwrap().insert(url.into(), delay);
        self
    }

    /// Get all calls made to this mock.
    pub fn calls(&self) -> Vec<MockFetchCall> {
        self.calls.read().unwrap().clone()
    }

    pub fn fetch_count(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, MockFetchCall::Fetch { .. }))
            .count()
    }

    async fn record(&self, call: MockFetchCall) {
        let url = match &call {
            MockFetchCall::Fetch { url }
            | MockFetchCall::FinalUrl { url }
            | MockFetchCall::IsLive { url } => url.clone(),
        };
        self.calls.write().unwrap().push(call);

        let stall = self.stalls.read().unwrap().get(&url).copied();
        if let Some(delay) = self.latency.into_iter().chain(stall).max() {
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait]
impl PageFetcher for MockFetcher {
    async fn fetch(&self, url: &str) -> Option<String> {
        self.record(MockFetchCall::Fetch {
            url: url.to_string(),
        })
        .await;
        self.pages.read().unwrap().get(url).cloned()
    }

    async fn final_url(&self, url: &str) -> Option<String> {
        self.record(MockFetchCall::FinalUrl {
            url: url.to_string(),
        })
        .await;

        if let Some(target) = self.redirects.read().unwrap().get(url) {
            return Some(target.clone());
        }
        let known =
            self.pages.read().unwrap().contains_key(url) || self.live.read().unwrap().contains(url);
        known.then(|| url.to_string())
    }

    async fn is_live(&self, url: &str) -> bool {
        self.record(MockFetchCall::IsLive {
            url: url.to_string(),
        })
        .await;
        self.live.read().unwrap().contains(url)
    }
}

#[async_trait]
impl LivenessCheck for MockFetcher {
    async fn is_live(&self, url: &str) -> bool {
        PageFetcher::is_live(self, url).await
    }
}
