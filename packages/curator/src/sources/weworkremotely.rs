//! We Work Remotely category RSS feeds.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rss::{Channel, Item};
use scraper::Html;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::http_client;
use crate::models::Job;
use crate::traits::BaseJobSource;

const FEEDS: &[&str] = &[
    "https://weworkremotely.com/categories/remote-programming-jobs.rss",
    "https://weworkremotely.com/categories/remote-design-jobs.rss",
    "https://weworkremotely.com/categories/remote-sales-and-marketing-jobs.rss",
    "https://weworkremotely.com/categories/remote-customer-support-jobs.rss",
    "https://weworkremotely.com/categories/remote-devops-sysadmin-jobs.rss",
    "https://weworkremotely.com/categories/remote-finance-and-legal-jobs.rss",
    "https://weworkremotely.com/categories/remote-product-jobs.rss",
    "https://weworkremotely.com/categories/remote-data-jobs.rss",
    "https://weworkremotely.com/categories/remote-executive-jobs.rss",
    "https://weworkremotely.com/categories/remote-all-other-jobs.rss",
];

/// Fewest items taken from each feed, however small the limit.
const MIN_PER_FEED: usize = 5;

pub struct WeWorkRemotelySource {
    client: reqwest::Client,
    feeds: Vec<String>,
    feed_delay: Duration,
}

impl WeWorkRemotelySource {
    pub const NAME: &'static str = "weworkremotely";

    pub fn new(user_agent: &str, timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: http_client(Self::NAME, user_agent, timeout)?,
            feeds: FEEDS.iter().map(|f| f.to_string()).collect(),
            feed_delay: Duration::from_secs(1),
        })
    }

    pub fn with_feeds(mut self, feeds: Vec<String>) -> Self {
        self.feeds = feeds;
        self
    }

    /// Pause between consecutive feed requests.
    pub fn with_feed_delay(mut self, delay: Duration) -> Self {
        self.feed_delay = delay;
        self
    }

    /// Parse one RSS document into at most `limit` jobs.
    pub fn parse_feed(
        &self,
        xml: &[u8],
        feed_url: &str,
        limit: usize,
        now: DateTime<Utc>,
    ) -> Result<Vec<Job>> {
        let channel = Channel::read_from(xml).context("Invalid RSS document")?;
        let category = category_for_feed(feed_url);

        Ok(channel
            .items()
            .iter()
            .take(limit)
            .filter_map(|item| normalize(item, category, now))
            .collect())
    }

    async fn fetch_feed(&self, feed_url: &str, limit: usize) -> Result<Vec<Job>> {
        let body = self
            .client
            .get(feed_url)
            .send()
            .await
            .context("Feed request failed")?
            .error_for_status()
            .context("Feed returned an error status")?
            .bytes()
            .await
            .context("Feed body could not be read")?;

        self.parse_feed(&body, feed_url, limit, Utc::now())
    }
}

fn normalize(item: &Item, category: &str, now: DateTime<Utc>) -> Option<Job> {
    let link = item.link().filter(|l| !l.is_empty())?;

    // titles read "Company: Role"
    let raw_title = item.title().unwrap_or_default();
    let (company, title) = match raw_title.split_once(':') {
        Some((company, title)) => (company.trim(), title.trim()),
        None => ("N/A", raw_title.trim()),
    };

    let description = item.description().map(html_to_text).unwrap_or_default();

    Some(
        Job::new(WeWorkRemotelySource::NAME, link, title, company, link, now)
            .with_description(description)
            .with_location("Remote")
            .with_tags(vec![category.to_string()]),
    )
}

fn category_for_feed(feed_url: &str) -> &'static str {
    let has = |word: &str| feed_url.contains(word);
    if has("programming") {
        "Technology"
    } else if has("design") {
        "Design"
    } else if has("marketing") || has("sales") {
        "Marketing"
    } else if has("support") || has("finance") || has("legal") || has("executive") {
        "Operations"
    } else if has("data") {
        "AI/ML"
    } else {
        "Other"
    }
}

fn html_to_text(html: &str) -> String {
    Html::parse_fragment(html)
        .root_element()
        .text()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

#[async_trait]
impl BaseJobSource for WeWorkRemotelySource {
    fn name(&self) -> &str {
        Self::NAME
    }

    /// Walks the feeds in order until `limit` jobs are collected. A failing
    /// feed is skipped; the source fails only if every feed does.
    async fn fetch_jobs(&self, limit: usize) -> Result<Vec<Job>> {
        let per_feed = (limit / self.feeds.len().max(1)).max(MIN_PER_FEED);
        let mut jobs = Vec::new();
        let mut failures = 0;

        for (i, feed_url) in self.feeds.iter().enumerate() {
            if i > 0 && !self.feed_delay.is_zero() {
                tokio::time::sleep(self.feed_delay).await;
            }

            match self.fetch_feed(feed_url, per_feed).await {
                Ok(batch) => {
                    debug!(source = Self::NAME, feed = %feed_url, count = batch.len(), "Feed parsed");
                    jobs.extend(batch);
                }
                Err(e) => {
                    warn!(source = Self::NAME, feed = %feed_url, error = %e, "Feed failed");
                    failures += 1;
                }
            }

            if jobs.len() >= limit {
                break;
            }
        }

        if failures > 0 && failures == self.feeds.len() {
            bail!("All {} We Work Remotely feeds failed", failures);
        }

        jobs.truncate(limit);
        info!(source = Self::NAME, count = jobs.len(), "Fetched jobs");
        Ok(jobs)
    }
}
