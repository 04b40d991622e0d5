//! RemoteOK public JSON feed.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use tracing::{info, warn};

use super::http_client;
use crate::models::Job;
use crate::traits::BaseJobSource;

#[derive(Debug, Deserialize)]
struct RemoteOkPosting {
    #[serde(default)]
    id: Option<Value>,
    #[serde(default)]
    slug: Option<String>,
    #[serde(default)]
    position: Option<String>,
    #[serde(default)]
    company: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    location: Option<String>,
    #[serde(default)]
    salary_min: Option<Value>,
    #[serde(default)]
    salary_max: Option<Value>,
    #[serde(default)]
    tags: Option<Value>,
}

pub struct RemoteOkSource {
    client: reqwest::Client,
    api_url: String,
    base_url: String,
}

impl RemoteOkSource {
    pub const NAME: &'static str = "remoteok";

    pub fn new(user_agent: &str, timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: http_client(Self::NAME, user_agent, timeout)?,
            api_url: "https://remoteok.com/api".to_string(),
            base_url: "https://remoteok.com".to_string(),
        })
    }

    pub fn with_api_url(mut self, api_url: impl Into<String>) -> Self {
        self.api_url = api_url.into();
        self
    }

    /// Turn the feed payload into jobs. The first array element is the
    /// feed's legal notice and is skipped; malformed postings are dropped.
    pub fn parse_feed(&self, feed: &Value, limit: usize, now: DateTime<Utc>) -> Vec<Job> {
        let Some(items) = feed.as_array() else {
            warn!(source = Self::NAME, "Feed is not a JSON array");
            return Vec::new();
        };

        items
            .iter()
            .skip(1)
            .take(limit)
            .filter_map(|item| match serde_json::from_value::<RemoteOkPosting>(item.clone()) {
                Ok(posting) => self.normalize(posting, now),
                Err(e) => {
                    warn!(source = Self::NAME, error = %e, "Skipping malformed posting");
                    None
                }
            })
            .collect()
    }

    fn normalize(&self, posting: RemoteOkPosting, now: DateTime<Utc>) -> Option<Job> {
        let id = posting.id.as_ref().and_then(scalar_to_string);
        let key = id.clone().or_else(|| posting.slug.clone())?;
        let slug = posting.slug.clone().or(id)?;

        let tags = match posting.tags {
            Some(Value::Array(values)) => values
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect(),
            Some(Value::String(tag)) => vec![tag],
            _ => Vec::new(),
        };

        Some(
            Job::new(
                Self::NAME,
                &key,
                posting.position.unwrap_or_else(|| "N/A".to_string()),
                posting.company.unwrap_or_else(|| "N/A".to_string()),
                format!("{}/remote-jobs/{}", self.base_url, slug),
                now,
            )
            .with_description(posting.description.unwrap_or_default())
            .with_location(posting.location.unwrap_or_else(|| "Remote".to_string()))
            .with_salary(
                posting.salary_min.as_ref().and_then(salary),
                posting.salary_max.as_ref().and_then(salary),
            )
            .with_tags(tags),
        )
    }
}

pub(super) fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Positive whole-dollar amount from a number or numeric string; zero means
/// unknown.
pub(super) fn salary(value: &Value) -> Option<i64> {
    let amount = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    (amount >= 1.0).then(|| amount as i64)
}

#[async_trait]
impl BaseJobSource for RemoteOkSource {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn fetch_jobs(&self, limit: usize) -> Result<Vec<Job>> {
        let feed: Value = self
            .client
            .get(&self.api_url)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
            .context("RemoteOK request failed")?
            .error_for_status()
            .context("RemoteOK returned an error status")?
            .json()
            .await
            .context("RemoteOK returned invalid JSON")?;

        let jobs = self.parse_feed(&feed, limit, Utc::now());
        info!(source = Self::NAME, count = jobs.len(), "Fetched jobs");
        Ok(jobs)
    }
}
