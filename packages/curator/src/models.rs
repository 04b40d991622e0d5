//! Core data model: jobs, queue entries, postings and channels.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

/// Stable job identity derived from where and how a posting was discovered.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobFingerprint(String);

impl JobFingerprint {
    /// First 16 hex chars of SHA-256 over `"<source>:<unique_key>"`.
    pub fn from_source(source: &str, unique_key: &str) -> Self {
        let digest = Sha256::digest(format!("{}:{}", source, unique_key).as_bytes());
        let mut hex = hex::encode(digest);
        hex.truncate(16);
        Self(hex)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for JobFingerprint {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for JobFingerprint {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for JobFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Approved,
    Rejected,
    LinkFailed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Approved => "approved",
            JobStatus::Rejected => "rejected",
            JobStatus::LinkFailed => "link_failed",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(JobStatus::Pending),
            "approved" => Ok(JobStatus::Approved),
            "rejected" => Ok(JobStatus::Rejected),
            "link_failed" => Ok(JobStatus::LinkFailed),
            other => Err(format!("unknown job status: {}", other)),
        }
    }
}

/// A discovered posting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobFingerprint,
    pub source: String,
    pub title: String,
    pub company: String,
    pub description: String,
    pub location: String,
    pub source_url: String,
    pub canonical_url: Option<String>,
    /// Annual USD
    pub salary_min: Option<i64>,
    /// Annual USD
    pub salary_max: Option<i64>,
    pub tags: Vec<String>,
    pub discovered_at: DateTime<Utc>,
    pub status: JobStatus,
    pub status_reason: Option<String>,
    pub high_priority: bool,
}

impl Job {
    pub fn new(
        source: impl Into<String>,
        unique_key: &str,
        title: impl Into<String>,
        company: impl Into<String>,
        source_url: impl Into<String>,
        discovered_at: DateTime<Utc>,
    ) -> Self {
        let source = source.into();
        Self {
            id: JobFingerprint::from_source(&source, unique_key),
            source,
            title: title.into(),
            company: company.into(),
            description: String::new(),
            location: String::new(),
            source_url: source_url.into(),
            canonical_url: None,
            salary_min: None,
            salary_max: None,
            tags: Vec::new(),
            discovered_at,
            status: JobStatus::Pending,
            status_reason: None,
            high_priority: false,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = location.into();
        self
    }

    pub fn with_salary(mut self, min: Option<i64>, max: Option<i64>) -> Self {
        self.salary_min = min;
        self.salary_max = max;
        self
    }

    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = tags;
        self
    }

    /// Best link to hand to readers: canonical once resolved, else as discovered.
    pub fn apply_url(&self) -> &str {
        self.canonical_url.as_deref().unwrap_or(&self.source_url)
    }
}

/// Admission priority class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriorityTier {
    High,
    Low,
}

impl PriorityTier {
    pub fn from_high_priority(high: bool) -> Self {
        if high {
            PriorityTier::High
        } else {
            PriorityTier::Low
        }
    }

    /// Ordering weight; larger is served first.
    pub fn weight(&self) -> i64 {
        match self {
            PriorityTier::High => 10,
            PriorityTier::Low => 5,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PriorityTier::High => "high",
            PriorityTier::Low => "low",
        }
    }
}

impl fmt::Display for PriorityTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PriorityTier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "high" => Ok(PriorityTier::High),
            "low" => Ok(PriorityTier::Low),
            other => Err(format!("unknown priority tier: {}", other)),
        }
    }
}

/// The live admission record for one approved job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueEntry {
    pub job_id: JobFingerprint,
    pub tier: PriorityTier,
    pub enqueued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    /// Arrival order; breaks ties between equal enqueue times.
    pub seq: i64,
}

impl QueueEntry {
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.expires_at > now
    }
}

/// A queue entry together with its job.
#[derive(Debug, Clone, PartialEq)]
pub struct QueuedJob {
    pub entry: QueueEntry,
    pub job: Job,
}

/// Immutable proof a job was delivered to a channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostingRecord {
    pub job_id: JobFingerprint,
    pub channel: String,
    pub message_ref: String,
    pub posted_at: DateTime<Utc>,
}

/// A delivery target with its daily quota.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Channel {
    pub name: String,
    pub daily_limit: u32,
    pub high_ratio: f64,
}

impl Channel {
    pub const DEFAULT_HIGH_RATIO: f64 = 0.75;

    pub fn new(name: impl Into<String>, daily_limit: u32) -> Self {
        Self {
            name: name.into(),
            daily_limit,
            high_ratio: Self::DEFAULT_HIGH_RATIO,
        }
    }

    pub fn with_high_ratio(mut self, ratio: f64) -> Self {
        self.high_ratio = ratio;
        self
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QueueStats {
    pub queue_total: u64,
    pub queue_high: u64,
    pub queue_low: u64,
    pub jobs_pending: u64,
    pub jobs_approved: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReclaimOutcome {
    pub reused: u64,
    pub removed_dead_links: u64,
}
