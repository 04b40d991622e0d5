use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Hosted application-intake systems whose URLs count as canonical.
pub const DEFAULT_DIRECT_DOMAINS: &[&str] = &[
    "greenhouse.io",
    "lever.co",
    "ashbyhq.com",
    "smartrecruiters.com",
    "workable.com",
    "myworkdayjobs.com",
    "myworkdaysite.com",
    "workday.com",
    "jobvite.com",
    "icims.com",
    "recruitee.com",
    "breezy.hr",
    "applytojob.com",
    "bamboohr.com",
    "ultipro.com",
    "paylocity.com",
    "jazz.co",
    "teamtailor.com",
    "personio.de",
    "pinpointhq.com",
];

/// Hosts that re-publish postings rather than hosting the application.
pub const DEFAULT_AGGREGATOR_DOMAINS: &[&str] = &[
    "linkedin.com",
    "indeed.com",
    "glassdoor.com",
    "ziprecruiter.com",
    "monster.com",
    "simplyhired.com",
    "remoteok.com",
    "remoteok.io",
    "weworkremotely.com",
    "himalayas.app",
    "remotive.com",
    "remotive.io",
    "jooble.org",
    "talent.com",
    "adzuna.com",
    "wellfound.com",
    "builtin.com",
    "jobgether.com",
    "workingnomads.com",
    "google.com",
];

const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Configuration for link resolution and the HTTP fetcher behind it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolverConfig {
    pub direct_domains: Vec<String>,
    pub aggregator_domains: Vec<String>,
    pub user_agent: String,
    pub request_timeout: Duration,
    pub max_redirects: usize,
    pub requests_per_second: u32,
    pub concurrency: usize,
    pub resolve_timeout: Duration,
    pub candidate_delay: Duration,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            direct_domains: DEFAULT_DIRECT_DOMAINS.iter().map(|d| d.to_string()).collect(),
            aggregator_domains: DEFAULT_AGGREGATOR_DOMAINS
                .iter()
                .map(|d| d.to_string())
                .collect(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            request_timeout: Duration::from_secs(15),
            max_redirects: 10,
            requests_per_second: 2,
            concurrency: 4,
            resolve_timeout: Duration::from_secs(60),
            candidate_delay: Duration::from_millis(500),
        }
    }
}

impl ResolverConfig {
    pub fn with_direct_domain(mut self, domain: impl Into<String>) -> Self {
        self.direct_domains.push(domain.into().to_lowercase());
        self
    }

    pub fn with_aggregator_domain(mut self, domain: impl Into<String>) -> Self {
        self.aggregator_domains.push(domain.into().to_lowercase());
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_requests_per_second(mut self, rps: u32) -> Self {
        self.requests_per_second = rps.max(1);
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn with_resolve_timeout(mut self, timeout: Duration) -> Self {
        self.resolve_timeout = timeout;
        self
    }

    /// Delay between failed candidate attempts. Zero disables it.
    pub fn with_candidate_delay(mut self, delay: Duration) -> Self {
        self.candidate_delay = delay;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_clamps_zero_values() {
        let config = ResolverConfig::default()
            .with_requests_per_second(0)
            .with_concurrency(0);

        assert_eq!(config.requests_per_second, 1);
        assert_eq!(config.concurrency, 1);
    }

    #[test]
    fn test_custom_domains_are_lowercased() {
        let config = ResolverConfig::default()
            .with_direct_domain("Careers.Example.COM")
            .with_aggregator_domain("JobsHub.net");

        assert!(config.direct_domains.contains(&"careers.example.com".to_string()));
        assert!(config.aggregator_domains.contains(&"jobshub.net".to_string()));
    }
}
