//! Network access for link resolution.
//!
//! Every operation here is total: timeouts, non-success statuses and
//! transport errors are logged and reported as `None`/`false`. Each call is
//! a bounded fallback chain (HEAD, then a streamed GET) so a single hung
//! host costs at most two request timeouts.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::config::ResolverConfig;
use crate::error::{FetchError, FetchResult};

/// Fetches pages, follows redirects and checks liveness.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    /// GET the page body. `None` on timeout, non-2xx or transport failure.
    async fn fetch(&self, url: &str) -> Option<String>;

    /// The URL reached after following redirects, if the host answered.
    async fn final_url(&self, url: &str) -> Option<String>;

    /// Live iff the final status is below 400. Unreachable means dead.
    async fn is_live(&self, url: &str) -> bool;
}

/// Link liveness as an injectable capability.
///
/// Implementations must never panic and must report `false` for anything
/// unreachable or ambiguous.
#[async_trait]
pub trait LivenessCheck: Send + Sync {
    async fn is_live(&self, url: &str) -> bool;
}

/// Adapts a plain function into a [`LivenessCheck`].
pub struct LivenessFn<F>(pub F);

#[async_trait]
impl<F> LivenessCheck for LivenessFn<F>
where
    F: Fn(&str) -> bool + Send + Sync,
{
    async fn is_live(&self, url: &str) -> bool {
        (self.0)(url)
    }
}

#[async_trait]
impl<T: LivenessCheck + ?Sized> LivenessCheck for Arc<T> {
    async fn is_live(&self, url: &str) -> bool {
        (**self).is_live(url).await
    }
}

/// reqwest-backed fetcher with a browser-like identity.
#[derive(Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(config: &ResolverConfig) -> FetchResult<Self> {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            reqwest::header::ACCEPT,
            reqwest::header::HeaderValue::from_static(
                "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
            ),
        );
        headers.insert(
            reqwest::header::ACCEPT_LANGUAGE,
            reqwest::header::HeaderValue::from_static("en-US,en;q=0.5"),
        );

        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .user_agent(config.user_agent.clone())
            .default_headers(headers)
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .build()
            .map_err(FetchError::Client)?;

        Ok(Self { client })
    }

    async fn try_get_body(&self, url: &str) -> FetchResult<String> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| FetchError::from_reqwest(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        response
            .text()
            .await
            .map_err(|e| FetchError::from_reqwest(url, e))
    }

    async fn try_head(&self, url: &str) -> FetchResult<reqwest::Response> {
        self.client
            .head(url)
            .send()
            .await
            .map_err(|e| FetchError::from_reqwest(url, e))
    }

    /// GET that only waits for the headers; the body is dropped unread.
    async fn try_streamed_get(&self, url: &str) -> FetchResult<reqwest::Response> {
        self.client
            .get(url)
            .send()
            .await
            .map_err(|e| FetchError::from_reqwest(url, e))
    }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Option<String> {
        debug!(url = %url, "HTTP fetch starting");
        match self.try_get_body(url).await {
            Ok(body) => {
                debug!(url = %url, content_length = body.len(), "Page fetched");
                Some(body)
            }
            Err(e) => {
                warn!(url = %url, error = %e, "Failed to fetch page");
                None
            }
        }
    }

    async fn final_url(&self, url: &str) -> Option<String> {
        match self.try_head(url).await {
            Ok(response) => return Some(response.url().to_string()),
            Err(e) => debug!(url = %url, error = %e, "HEAD failed, falling back to GET"),
        }

        match self.try_streamed_get(url).await {
            Ok(response) => Some(response.url().to_string()),
            Err(e) => {
                warn!(url = %url, error = %e, "Failed to follow redirects");
                None
            }
        }
    }

    async fn is_live(&self, url: &str) -> bool {
        match self.try_head(url).await {
            Ok(response) if response.status().as_u16() < 400 => return true,
            Ok(response) => {
                debug!(url = %url, status = %response.status(), "HEAD rejected, retrying with GET")
            }
            Err(e) => debug!(url = %url, error = %e, "HEAD failed, retrying with GET"),
        }

        match self.try_streamed_get(url).await {
            Ok(response) => {
                let live = response.status().as_u16() < 400;
                if !live {
                    debug!(url = %url, status = %response.status(), "Link is dead");
                }
                live
            }
            Err(e) => {
                debug!(url = %url, error = %e, "Link unreachable");
                false
            }
        }
    }
}

#[async_trait]
impl LivenessCheck for HttpFetcher {
    async fn is_live(&self, url: &str) -> bool {
        PageFetcher::is_live(self, url).await
    }
}
