//! Himalayas public jobs API.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use tracing::{info, warn};

use super::http_client;
use super::remoteok::{salary, scalar_to_string};
use crate::models::Job;
use crate::traits::BaseJobSource;

/// The API refuses pages larger than this.
const MAX_PAGE: usize = 100;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HimalayasPosting {
    #[serde(default)]
    id: Option<Value>,
    #[serde(default)]
    slug: Option<String>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    company_name: Option<String>,
    #[serde(default)]
    company_slug: Option<String>,
    /// Either a `{ name, slug }` object or a bare name
    #[serde(default)]
    company: Option<Value>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    excerpt: Option<String>,
    #[serde(default)]
    location_restrictions: Option<Value>,
    #[serde(default)]
    location: Option<String>,
    #[serde(default)]
    salary: Option<Value>,
    #[serde(default)]
    min_salary: Option<Value>,
    #[serde(default)]
    max_salary: Option<Value>,
    #[serde(default)]
    category: Option<Value>,
    #[serde(default)]
    department: Option<Value>,
    #[serde(default)]
    tags: Option<Value>,
}

pub struct HimalayasSource {
    client: reqwest::Client,
    api_url: String,
    base_url: String,
}

impl HimalayasSource {
    pub const NAME: &'static str = "himalayas";

    pub fn new(user_agent: &str, timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: http_client(Self::NAME, user_agent, timeout)?,
            api_url: "https://himalayas.app/jobs/api".to_string(),
            base_url: "https://himalayas.app".to_string(),
        })
    }

    pub fn with_api_url(mut self, api_url: impl Into<String>) -> Self {
        self.api_url = api_url.into();
        self
    }

    /// Accepts `{ "jobs": [...] }` or a bare array.
    pub fn parse_response(&self, body: &Value, limit: usize, now: DateTime<Utc>) -> Vec<Job> {
        let items = match body {
            Value::Array(items) => items,
            Value::Object(map) => match map.get("jobs") {
                Some(Value::Array(items)) => items,
                _ => {
                    warn!(source = Self::NAME, "Response has no jobs array");
                    return Vec::new();
                }
            },
            _ => {
                warn!(source = Self::NAME, "Unexpected response shape");
                return Vec::new();
            }
        };

        items
            .iter()
            .take(limit)
            .filter_map(|item| match serde_json::from_value::<HimalayasPosting>(item.clone()) {
                Ok(posting) => self.normalize(posting, now),
                Err(e) => {
                    warn!(source = Self::NAME, error = %e, "Skipping malformed posting");
                    None
                }
            })
            .collect()
    }

    fn normalize(&self, posting: HimalayasPosting, now: DateTime<Utc>) -> Option<Job> {
        let id = posting.id.as_ref().and_then(scalar_to_string);
        let key = id.clone().or_else(|| posting.slug.clone())?;
        let slug = posting.slug.clone().or(id)?;

        let company_field = |field: &str| {
            posting
                .company
                .as_ref()
                .and_then(|c| c.get(field))
                .and_then(Value::as_str)
                .map(str::to_string)
        };
        let company_slug = posting.company_slug.clone().or_else(|| company_field("slug"));
        let company = posting
            .company_name
            .clone()
            .or_else(|| company_field("name"))
            .or_else(|| posting.company.as_ref().and_then(Value::as_str).map(str::to_string))
            .unwrap_or_else(|| "N/A".to_string());

        let source_url = match company_slug.filter(|s| !s.is_empty()) {
            Some(company_slug) => format!("{}/companies/{}/jobs/{}", self.base_url, company_slug, slug),
            None => format!("{}/jobs/{}", self.base_url, slug),
        };

        let location = match posting.location_restrictions {
            Some(Value::Array(values)) => {
                let places: Vec<&str> = values.iter().filter_map(Value::as_str).collect();
                (!places.is_empty()).then(|| places.join(", "))
            }
            Some(Value::String(place)) if !place.is_empty() => Some(place),
            _ => None,
        }
        .or(posting.location.filter(|l| !l.is_empty()))
        .unwrap_or_else(|| "Worldwide".to_string());

        let (salary_min, salary_max) = match &posting.salary {
            Some(Value::Object(range)) => (
                range.get("min").and_then(salary),
                range.get("max").and_then(salary),
            ),
            _ => (
                posting.min_salary.as_ref().and_then(salary),
                posting.max_salary.as_ref().and_then(salary),
            ),
        };

        let category = [&posting.category, &posting.department]
            .into_iter()
            .flatten()
            .find_map(|v| v.as_str().filter(|s| !s.is_empty()))
            .unwrap_or("Other")
            .to_string();
        let mut tags: Vec<String> = match posting.tags {
            Some(Value::Array(values)) => values
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect(),
            Some(Value::String(tag)) if !tag.is_empty() => vec![tag],
            _ => Vec::new(),
        };
        tags.push(category);

        Some(
            Job::new(
                Self::NAME,
                &key,
                posting.title.unwrap_or_else(|| "N/A".to_string()),
                company,
                source_url,
                now,
            )
            .with_description(posting.description.or(posting.excerpt).unwrap_or_default())
            .with_location(location)
            .with_salary(salary_min, salary_max)
            .with_tags(tags),
        )
    }
}

#[async_trait]
impl BaseJobSource for HimalayasSource {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn fetch_jobs(&self, limit: usize) -> Result<Vec<Job>> {
        let body: Value = self
            .client
            .get(&self.api_url)
            .query(&[("limit", limit.min(MAX_PAGE)), ("offset", 0)])
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
            .context("Himalayas request failed")?
            .error_for_status()
            .context("Himalayas returned an error status")?
            .json()
            .await
            .context("Himalayas returned invalid JSON")?;

        let jobs = self.parse_response(&body, limit, Utc::now());
        info!(source = Self::NAME, count = jobs.len(), "Fetched jobs");
        Ok(jobs)
    }
}
