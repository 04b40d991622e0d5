// Collaborator traits for the curation cycle
//
// These are INFRASTRUCTURE seams only - sources, judges, renderers and
// transports plug in here. Admission policy stays in the queue.
//
// Naming convention: Base* for trait names (e.g., BaseJobSource, BaseDelivery)

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::models::Job;

// =============================================================================
// Discovery
// =============================================================================

#[async_trait]
pub trait BaseJobSource: Send + Sync {
    /// Short stable name, also the fingerprint namespace
    fn name(&self) -> &str;

    /// Fetch up to `limit` postings as freshly discovered jobs
    async fn fetch_jobs(&self, limit: usize) -> Result<Vec<Job>>;
}

// =============================================================================
// Judging
// =============================================================================

/// A judge's verdict. Only `approved` and `high_priority` drive the queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Judgement {
    pub approved: bool,
    pub high_priority: bool,
    pub reason: Option<String>,
}

impl Judgement {
    pub fn approve(high_priority: bool) -> Self {
        Self {
            approved: true,
            high_priority,
            reason: None,
        }
    }

    pub fn reject(reason: impl Into<String>) -> Self {
        Self {
            approved: false,
            high_priority: false,
            reason: Some(reason.into()),
        }
    }
}

#[async_trait]
pub trait BaseJudge: Send + Sync {
    async fn judge(&self, job: &Job) -> Result<Judgement>;
}

// =============================================================================
// Rendering & delivery
// =============================================================================

pub trait BaseRenderer: Send + Sync {
    fn render(&self, job: &Job) -> String;
}

#[async_trait]
pub trait BaseDelivery: Send + Sync {
    /// Send rendered content to a channel; returns the channel-assigned
    /// message reference. An `Err` means nothing was observably delivered.
    async fn deliver(&self, channel: &str, content: &str) -> Result<String>;
}
