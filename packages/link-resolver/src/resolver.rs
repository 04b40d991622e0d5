//! The link resolution engine.
//!
//! Steps run in order and stop at the first success:
//!
//! 1. Canonical source: live means `already_direct`, dead means
//!    `direct_but_inactive` (terminal, no extraction fallback).
//! 2. Redirects of the source land on a canonical URL: `redirect`.
//! 3. Fetch the page body, or `fetch_failed`.
//! 4. Extract ranked candidates, or `no_apply_links`.
//! 5. First candidate whose redirect target is canonical and live:
//!    `extracted_<source>`.
//! 6. Otherwise `no_valid_direct_found`.
//!
//! Each resolution issues its requests sequentially. Batches run several
//! resolutions at once, sharing the fetcher's limiter.

use futures::stream::{self, Stream, StreamExt};
use serde::Serialize;
use std::fmt;
use tracing::{debug, info, warn};

use crate::classifier::UrlClassifier;
use crate::config::ResolverConfig;
use crate::extractor::{CandidateSource, LinkExtractor};
use crate::fetcher::PageFetcher;

/// Why a resolution ended the way it did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ResolveReason {
    AlreadyDirect,
    DirectButInactive,
    Redirect,
    FetchFailed,
    NoApplyLinks,
    Extracted(CandidateSource),
    NoValidDirectFound,
}

impl ResolveReason {
    pub fn is_resolved(&self) -> bool {
        matches!(
            self,
            ResolveReason::AlreadyDirect | ResolveReason::Redirect | ResolveReason::Extracted(_)
        )
    }
}

impl fmt::Display for ResolveReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResolveReason::AlreadyDirect => f.write_str("already_direct"),
            ResolveReason::DirectButInactive => f.write_str("direct_but_inactive"),
            ResolveReason::Redirect => f.write_str("redirect"),
            ResolveReason::FetchFailed => f.write_str("fetch_failed"),
            ResolveReason::NoApplyLinks => f.write_str("no_apply_links"),
            ResolveReason::Extracted(source) => write!(f, "extracted_{}", source),
            ResolveReason::NoValidDirectFound => f.write_str("no_valid_direct_found"),
        }
    }
}

/// Outcome of resolving one source URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Resolution {
    pub url: Option<String>,
    pub reason: ResolveReason,
}

impl Resolution {
    fn found(url: impl Into<String>, reason: ResolveReason) -> Self {
        Self {
            url: Some(url.into()),
            reason,
        }
    }

    fn failed(reason: ResolveReason) -> Self {
        Self { url: None, reason }
    }
}

pub struct LinkResolver<F: PageFetcher> {
    fetcher: F,
    classifier: UrlClassifier,
    extractor: LinkExtractor,
    config: ResolverConfig,
}

impl<F: PageFetcher> LinkResolver<F> {
    pub fn new(fetcher: F, config: ResolverConfig) -> Self {
        let classifier = UrlClassifier::from_config(&config);
        Self {
            fetcher,
            extractor: LinkExtractor::new(classifier.clone()),
            classifier,
            config,
        }
    }

    pub fn fetcher(&self) -> &F {
        &self.fetcher
    }

    pub fn classifier(&self) -> &UrlClassifier {
        &self.classifier
    }

    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    /// Resolve a discovered URL to a canonical, live application URL.
    pub async fn resolve(&self, source_url: &str) -> Resolution {
        info!(url = %source_url, "Resolving link");

        if self.classifier.is_canonical(source_url) {
            return if self.fetcher.is_live(source_url).await {
                info!(url = %source_url, "Already a live direct link");
                Resolution::found(source_url, ResolveReason::AlreadyDirect)
            } else {
                warn!(url = %source_url, "Direct link is inactive");
                Resolution::failed(ResolveReason::DirectButInactive)
            };
        }

        if let Some(final_url) = self.fetcher.final_url(source_url).await {
            if self.classifier.is_canonical(&final_url) {
                info!(url = %source_url, resolved = %final_url, "Redirects to a direct link");
                return Resolution::found(final_url, ResolveReason::Redirect);
            }
        }

        let Some(html) = self.fetcher.fetch(source_url).await else {
            return Resolution::failed(ResolveReason::FetchFailed);
        };

        let candidates = self.extractor.extract_candidates(&html, source_url);
        if candidates.is_empty() {
            warn!(url = %source_url, "No application links found");
            return Resolution::failed(ResolveReason::NoApplyLinks);
        }
        debug!(url = %source_url, candidates = candidates.len(), "Extracted candidates");

        let last = candidates.len() - 1;
        for (i, candidate) in candidates.iter().enumerate() {
            debug!(
                candidate = %candidate.url,
                source = %candidate.source,
                score = candidate.score,
                "Trying candidate"
            );

            if let Some(final_url) = self.fetcher.final_url(&candidate.url).await {
                if self.classifier.is_canonical(&final_url) && self.fetcher.is_live(&final_url).await {
                    info!(url = %source_url, resolved = %final_url, source = %candidate.source, "Direct link extracted");
                    return Resolution::found(final_url, ResolveReason::Extracted(candidate.source));
                }
            }

            if i < last && !self.config.candidate_delay.is_zero() {
                tokio::time::sleep(self.config.candidate_delay).await;
            }
        }

        warn!(url = %source_url, "Could not resolve to a direct link");
        Resolution::failed(ResolveReason::NoValidDirectFound)
    }

    /// [`resolve`](Self::resolve) bounded by the configured deadline; an
    /// attempt that overruns is abandoned as `fetch_failed`.
    pub async fn resolve_with_timeout(&self, source_url: &str) -> Resolution {
        match tokio::time::timeout(self.config.resolve_timeout, self.resolve(source_url)).await {
            Ok(resolution) => resolution,
            Err(_) => {
                warn!(
                    url = %source_url,
                    timeout_ms = self.config.resolve_timeout.as_millis() as u64,
                    "Resolution timed out"
                );
                Resolution::failed(ResolveReason::FetchFailed)
            }
        }
    }

    /// Resolve many URLs with at most `config.concurrency` in flight.
    ///
    /// Results come back in input order, keyed by the caller's identifiers.
    pub async fn resolve_batch<K>(&self, items: Vec<(K, String)>) -> Vec<(K, Resolution)> {
        let total = items.len();

        let results: Vec<(K, Resolution)> = stream::iter(items)
            .map(move |(key, url)| async move {
                let resolution = self.resolve_with_timeout(&url).await;
                (key, resolution)
            })
            .buffered(self.config.concurrency.max(1))
            .collect()
            .await;

        let resolved = results.iter().filter(|(_, r)| r.url.is_some()).count();
        info!(total, resolved, failed = total - resolved, "Batch resolution complete");
        results
    }

    /// Like [`resolve_batch`](Self::resolve_batch), but yields each result
    /// as soon as it completes. Dropping the stream cancels whatever is
    /// still in flight; everything already yielded stays with the caller.
    pub fn resolve_stream<'a, K: 'a>(
        &'a self,
        items: Vec<(K, String)>,
    ) -> impl Stream<Item = (K, Resolution)> + 'a {
        stream::iter(items)
            .map(move |(key, url)| async move {
                let resolution = self.resolve_with_timeout(&url).await;
                (key, resolution)
            })
            .buffer_unordered(self.config.concurrency.max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extractor::AtsVendor;

    #[test]
    fn test_reason_codes() {
        assert_eq!(ResolveReason::AlreadyDirect.to_string(), "already_direct");
        assert_eq!(ResolveReason::DirectButInactive.to_string(), "direct_but_inactive");
        assert_eq!(ResolveReason::Redirect.to_string(), "redirect");
        assert_eq!(ResolveReason::FetchFailed.to_string(), "fetch_failed");
        assert_eq!(ResolveReason::NoApplyLinks.to_string(), "no_apply_links");
        assert_eq!(
            ResolveReason::NoValidDirectFound.to_string(),
            "no_valid_direct_found"
        );
        assert_eq!(
            ResolveReason::Extracted(CandidateSource::ApplyButton).to_string(),
            "extracted_apply_button"
        );
        assert_eq!(
            ResolveReason::Extracted(CandidateSource::Regex(AtsVendor::Lever)).to_string(),
            "extracted_regex_lever"
        );
    }

    #[test]
    fn test_only_success_reasons_are_resolved() {
        assert!(ResolveReason::Redirect.is_resolved());
        assert!(ResolveReason::Extracted(CandidateSource::Iframe).is_resolved());
        assert!(!ResolveReason::DirectButInactive.is_resolved());
        assert!(!ResolveReason::NoValidDirectFound.is_resolved());
    }
}
