//! Candidate extraction from aggregator pages.
//!
//! Produces a best-effort ranked list of URLs that may lead to the employer's
//! application flow. Scores:
//!
//! | source | score |
//! |---|---|
//! | anchor pointing at a canonical URL | 10 |
//! | canonical `<iframe src>` | 9 |
//! | vendor URL shape found in the raw markup | 9 |
//! | "apply" anchor pointing outside known aggregators | 8 |

use indexmap::IndexMap;
use lazy_static::lazy_static;
use regex::Regex;
use scraper::{Html, Selector};
use serde::Serialize;
use std::fmt;
use url::Url;

use crate::classifier::UrlClassifier;

lazy_static! {
    static ref APPLY_TEXT: Regex =
        Regex::new(r"(?i)apply|candidatar|inscrever|submit.*application|job.*application").unwrap();
    static ref VENDOR_PATTERNS: Vec<(AtsVendor, Regex)> = vec![
        (
            AtsVendor::Greenhouse,
            Regex::new(r#"(?i)https?://boards\.greenhouse\.io/[^\s"'<>]+"#).unwrap()
        ),
        (
            AtsVendor::Lever,
            Regex::new(r#"(?i)https?://jobs\.lever\.co/[^\s"'<>]+"#).unwrap()
        ),
        (
            AtsVendor::Workday,
            Regex::new(r#"(?i)https?://[a-z0-9-]+\.workday\.com/[^\s"'<>]+"#).unwrap()
        ),
        (
            AtsVendor::Ashby,
            Regex::new(r#"(?i)https?://jobs\.ashbyhq\.com/[^\s"'<>]+"#).unwrap()
        ),
        (
            AtsVendor::BambooHr,
            Regex::new(r#"(?i)https?://[a-z0-9-]+\.bamboohr\.com/[^\s"'<>]+"#).unwrap()
        ),
    ];
}

/// Application systems recognised by raw-markup URL shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum AtsVendor {
    Greenhouse,
    Lever,
    Workday,
    Ashby,
    BambooHr,
}

impl AtsVendor {
    pub fn as_str(&self) -> &'static str {
        match self {
            AtsVendor::Greenhouse => "greenhouse",
            AtsVendor::Lever => "lever",
            AtsVendor::Workday => "workday",
            AtsVendor::Ashby => "ashby",
            AtsVendor::BambooHr => "bamboo",
        }
    }
}

/// Where in the page a candidate was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum CandidateSource {
    DirectDomain,
    ApplyButton,
    Iframe,
    Regex(AtsVendor),
}

impl CandidateSource {
    pub fn score(&self) -> u8 {
        match self {
            CandidateSource::DirectDomain => 10,
            CandidateSource::Iframe | CandidateSource::Regex(_) => 9,
            CandidateSource::ApplyButton => 8,
        }
    }
}

impl fmt::Display for CandidateSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CandidateSource::DirectDomain => f.write_str("direct_domain"),
            CandidateSource::ApplyButton => f.write_str("apply_button"),
            CandidateSource::Iframe => f.write_str("iframe"),
            CandidateSource::Regex(vendor) => write!(f, "regex_{}", vendor.as_str()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Candidate {
    pub url: String,
    pub source: CandidateSource,
    pub score: u8,
}

/// Ranks application-link candidates found in a page.
#[derive(Debug, Clone, Default)]
pub struct LinkExtractor {
    classifier: UrlClassifier,
}

impl LinkExtractor {
    pub fn new(classifier: UrlClassifier) -> Self {
        Self { classifier }
    }

    /// Unique candidates, highest score first; ties keep discovery order.
    pub fn extract_candidates(&self, html: &str, base_url: &str) -> Vec<Candidate> {
        let base = Url::parse(base_url).ok();
        let document = Html::parse_document(html);
        let mut found: Vec<(String, CandidateSource)> = Vec::new();

        if let Ok(anchor_selector) = Selector::parse("a[href]") {
            for anchor in document.select(&anchor_selector) {
                let Some(url) = anchor
                    .value()
                    .attr("href")
                    .and_then(|href| resolve_href(base.as_ref(), href))
                else {
                    continue;
                };

                let text = anchor.text().collect::<String>().to_lowercase();
                let classes = anchor.value().attr("class").unwrap_or("").to_lowercase();
                let is_apply_text =
                    APPLY_TEXT.is_match(text.trim()) || APPLY_TEXT.is_match(&classes);

                if self.classifier.is_canonical(&url) {
                    found.push((url, CandidateSource::DirectDomain));
                } else if is_apply_text && !self.classifier.is_aggregator_domain(&url) {
                    found.push((url, CandidateSource::ApplyButton));
                }
            }
        }

        if let Ok(iframe_selector) = Selector::parse("iframe[src]") {
            for iframe in document.select(&iframe_selector) {
                let Some(url) = iframe
                    .value()
                    .attr("src")
                    .and_then(|src| resolve_href(base.as_ref(), src))
                else {
                    continue;
                };
                if self.classifier.is_canonical(&url) {
                    found.push((url, CandidateSource::Iframe));
                }
            }
        }

        for (vendor, pattern) in VENDOR_PATTERNS.iter() {
            for m in pattern.find_iter(html) {
                found.push((m.as_str().to_string(), CandidateSource::Regex(*vendor)));
            }
        }

        rank(found)
    }
}

/// Absolute http(s) URL for an href, or `None` for empty, fragment-only and
/// pseudo-scheme links.
fn resolve_href(base: Option<&Url>, href: &str) -> Option<String> {
    let href = href.trim();
    let lower = href.to_lowercase();
    if href.is_empty()
        || href.starts_with('#')
        || lower.starts_with("javascript:")
        || lower.starts_with("mailto:")
        || lower.starts_with("tel:")
    {
        return None;
    }

    let resolved = match base {
        Some(base) => base.join(href).ok()?,
        None => Url::parse(href).ok()?,
    };

    match resolved.scheme() {
        "http" | "https" => Some(resolved.to_string()),
        _ => None,
    }
}

fn rank(found: Vec<(String, CandidateSource)>) -> Vec<Candidate> {
    let mut best: IndexMap<String, CandidateSource> = IndexMap::new();
    for (url, source) in found {
        match best.get_mut(&url) {
            Some(existing) if existing.score() >= source.score() => {}
            Some(existing) => *existing = source,
            None => {
                best.insert(url, source);
            }
        }
    }

    let mut candidates: Vec<Candidate> = best
        .into_iter()
        .map(|(url, source)| Candidate {
            url,
            score: source.score(),
            source,
        })
        .collect();
    // sort_by is stable
    candidates.sort_by(|a, b| b.score.cmp(&a.score));
    candidates
}
