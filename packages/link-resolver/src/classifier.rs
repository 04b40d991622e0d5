//! URL classification.
//!
//! Pure and total: malformed URLs classify as neither canonical nor
//! aggregator. Precedence is direct-system domain > aggregator domain >
//! application-path heuristic.

use url::Url;

use crate::config::ResolverConfig;

/// Path fragments that mark an employer-hosted application page.
const APPLICATION_PATH_MARKERS: &[&str] = &["/careers/", "/jobs/", "/job/", "/position/", "/vacancy/"];

/// Decides whether a URL points straight at an application flow.
#[derive(Debug, Clone)]
pub struct UrlClassifier {
    direct_domains: Vec<String>,
    aggregator_domains: Vec<String>,
}

impl Default for UrlClassifier {
    fn default() -> Self {
        Self::from_config(&ResolverConfig::default())
    }
}

impl UrlClassifier {
    pub fn new<D, A>(direct_domains: D, aggregator_domains: A) -> Self
    where
        D: IntoIterator,
        D::Item: Into<String>,
        A: IntoIterator,
        A::Item: Into<String>,
    {
        Self {
            direct_domains: normalize_domains(direct_domains),
            aggregator_domains: normalize_domains(aggregator_domains),
        }
    }

    pub fn from_config(config: &ResolverConfig) -> Self {
        Self::new(
            config.direct_domains.iter().cloned(),
            config.aggregator_domains.iter().cloned(),
        )
    }

    /// True if the URL leads directly to an employer's application flow.
    pub fn is_canonical(&self, url: &str) -> bool {
        let Some((host, path)) = host_and_path(url) else {
            return false;
        };

        if matches_any(&host, &self.direct_domains) {
            return true;
        }
        if matches_any(&host, &self.aggregator_domains) {
            return false;
        }

        APPLICATION_PATH_MARKERS
            .iter()
            .any(|marker| path.contains(marker))
    }

    /// True if the URL's host is a known aggregator, regardless of path.
    ///
    /// A direct-system domain is never an aggregator, even when a configured
    /// aggregator entry is a suffix of it.
    pub fn is_aggregator_domain(&self, url: &str) -> bool {
        let Some((host, _)) = host_and_path(url) else {
            return false;
        };

        !matches_any(&host, &self.direct_domains) && matches_any(&host, &self.aggregator_domains)
    }
}

fn normalize_domains<I>(domains: I) -> Vec<String>
where
    I: IntoIterator,
    I::Item: Into<String>,
{
    domains
        .into_iter()
        .map(|d| d.into().trim().trim_start_matches('.').to_lowercase())
        .filter(|d| !d.is_empty())
        .collect()
}

/// Lowercased host and path of an http(s) URL.
fn host_and_path(url: &str) -> Option<(String, String)> {
    let parsed = Url::parse(url.trim()).ok()?;
    if parsed.scheme() != "http" && parsed.scheme() != "https" {
        return None;
    }
    let host = parsed.host_str()?.trim_end_matches('.').to_lowercase();
    if host.is_empty() {
        return None;
    }
    Some((host, parsed.path().to_lowercase()))
}

/// Exact host or any subdomain of it.
fn host_matches(host: &str, domain: &str) -> bool {
    host == domain
        || (host.len() > domain.len()
            && host.ends_with(domain)
            && host.as_bytes()[host.len() - domain.len() - 1] == b'.')
}

fn matches_any(host: &str, domains: &[String]) -> bool {
    domains.iter().any(|d| host_matches(host, d))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classifier() -> UrlClassifier {
        UrlClassifier::default()
    }

    #[test]
    fn test_ats_domains_are_canonical() {
        let c = classifier();
        assert!(c.is_canonical("https://boards.greenhouse.io/acme/jobs/12345"));
        assert!(c.is_canonical("https://jobs.lever.co/acme/abc-def"));
        assert!(c.is_canonical("https://acme.wd5.myworkdayjobs.com/en-US/External"));
        assert!(c.is_canonical("https://JOBS.ASHBYHQ.COM/acme"));
    }

    #[test]
    fn test_aggregators_are_never_canonical() {
        let c = classifier();
        assert!(!c.is_canonical("https://www.linkedin.com/jobs/view/123"));
        assert!(!c.is_canonical("https://remoteok.com/remote-jobs/123-engineer"));
        assert!(c.is_aggregator_domain("https://www.linkedin.com/jobs/view/123"));
        assert!(c.is_aggregator_domain("https://remoteok.com/"));
    }

    #[test]
    fn test_employer_career_paths_are_canonical() {
        let c = classifier();
        assert!(c.is_canonical("https://acme.com/careers/backend-engineer"));
        assert!(c.is_canonical("https://acme.com/job/42"));
        assert!(c.is_canonical("https://acme.com/en/vacancy/7"));
        assert!(!c.is_canonical("https://acme.com/about"));
        assert!(!c.is_aggregator_domain("https://acme.com/careers/backend-engineer"));
    }

    #[test]
    fn test_direct_domain_wins_over_aggregator() {
        let c = UrlClassifier::new(["jobs.example.com"], ["example.com"]);
        assert!(c.is_canonical("https://jobs.example.com/anything"));
        assert!(!c.is_aggregator_domain("https://jobs.example.com/anything"));
        assert!(c.is_aggregator_domain("https://www.example.com/jobs/1"));
        assert!(!c.is_canonical("https://www.example.com/jobs/1"));
    }

    #[test]
    fn test_suffix_match_requires_label_boundary() {
        let c = classifier();
        assert!(!c.is_canonical("https://notlever.co/some/page"));
        assert!(!c.is_aggregator_domain("https://myindeed.com/"));
    }

    #[test]
    fn test_malformed_urls_are_neither() {
        let c = classifier();
        for url in ["", "not a url", "javascript:void(0)", "mailto:jobs@acme.com", "/jobs/1"] {
            assert!(!c.is_canonical(url), "{url}");
            assert!(!c.is_aggregator_domain(url), "{url}");
        }
    }
}
