//! Link Resolution Library
//!
//! Turns an arbitrary discovered job URL (often an aggregator listing or a
//! search result page) into a canonical, live URL that leads straight into
//! the employer's own application flow.
//!
//! # Usage
//!
//! ```rust,ignore
//! use link_resolver::{FetcherExt, HttpFetcher, LinkResolver, ResolverConfig};
//!
//! let config = ResolverConfig::default();
//! let fetcher = HttpFetcher::new(&config)?.rate_limited(config.requests_per_second);
//! let resolver = LinkResolver::new(fetcher, config);
//!
//! let resolution = resolver.resolve("https://remoteok.com/remote-jobs/123").await;
//! println!("{:?} ({})", resolution.url, resolution.reason);
//! ```
//!
//! # Modules
//!
//! - [`classifier`] - Canonical vs aggregator URL classification
//! - [`fetcher`] - Network access (`PageFetcher`, `LivenessCheck`, `HttpFetcher`)
//! - [`extractor`] - Ranked candidate extraction from aggregator markup
//! - [`resolver`] - The resolution engine and bounded batch resolution
//! - [`rate_limited`] - Shared outbound rate limiting
//! - [`testing`] - Scripted fetcher for tests

pub mod classifier;
pub mod config;
pub mod error;
pub mod extractor;
pub mod fetcher;
pub mod rate_limited;
pub mod resolver;
pub mod testing;

pub use classifier::UrlClassifier;
pub use config::ResolverConfig;
pub use error::{FetchError, FetchResult};
pub use extractor::{AtsVendor, Candidate, CandidateSource, LinkExtractor};
pub use fetcher::{HttpFetcher, LivenessCheck, LivenessFn, PageFetcher};
pub use rate_limited::{FetcherExt, RateLimitedFetcher};
pub use resolver::{LinkResolver, ResolveReason, Resolution};
