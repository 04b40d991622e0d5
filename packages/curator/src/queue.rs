//! Admission & delivery queue.
//!
//! Per queue entry: `absent -> queued -> {expired | removed_dead_link |
//! delivered(channel)...}`. An entry can be delivered to many channels, at
//! most once each; the posting ledger is the only thing that makes a job
//! ineligible on a channel.
//!
//! Mutations are applied one at a time by the single cycle that owns the
//! run lock. Store failures are returned to the caller, never swallowed.

use chrono::Duration;
use link_resolver::LivenessCheck;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::error::{StoreError, StoreResult};
use crate::models::{
    Channel, JobFingerprint, JobStatus, PostingRecord, PriorityTier, QueueEntry, QueueStats,
    QueuedJob, ReclaimOutcome,
};
use crate::store::QueueStore;
use crate::time::TimeProvider;

/// Reason recorded on jobs evicted by reverification.
pub const DEAD_LINK_REASON: &str = "dead_link";

/// Split a daily limit into `(high, low)` slots.
///
/// `high = floor(limit * ratio)` with the ratio clamped to `[0, 1]`; the low
/// tier gets the remainder. Slots are never borrowed between tiers.
pub fn tier_quota(daily_limit: u32, high_ratio: f64) -> (u32, u32) {
    let ratio = if high_ratio.is_nan() {
        Channel::DEFAULT_HIGH_RATIO
    } else {
        high_ratio.clamp(0.0, 1.0)
    };
    // products like 100 * 0.29 land just below the integer
    let high = ((daily_limit as f64) * ratio + 1e-9).floor() as u32;
    let high = high.min(daily_limit);
    (high, daily_limit - high)
}

pub struct AdmissionQueue {
    store: Arc<dyn QueueStore>,
    clock: Arc<dyn TimeProvider>,
    ttl: Duration,
}

impl AdmissionQueue {
    pub const DEFAULT_TTL_HOURS: i64 = 72;

    pub fn new(store: Arc<dyn QueueStore>, clock: Arc<dyn TimeProvider>) -> Self {
        Self {
            store,
            clock,
            ttl: Duration::hours(Self::DEFAULT_TTL_HOURS),
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn store(&self) -> &Arc<dyn QueueStore> {
        &self.store
    }

    /// Create or replace the job's live entry, resetting its position and
    /// expiry. Only approved jobs with a canonical URL are admissible.
    pub async fn enqueue(&self, job_id: &JobFingerprint, high_priority: bool) -> StoreResult<QueueEntry> {
        let job = self
            .store
            .get_job(job_id)
            .await?
            .ok_or_else(|| StoreError::JobNotFound {
                id: job_id.to_string(),
            })?;

        if job.status != JobStatus::Approved {
            return Err(StoreError::NotAdmissible {
                id: job_id.to_string(),
                reason: format!("status is {}", job.status),
            });
        }
        if job.canonical_url.is_none() {
            return Err(StoreError::NotAdmissible {
                id: job_id.to_string(),
                reason: "no canonical url".to_string(),
            });
        }

        let now = self.clock.now();
        let tier = PriorityTier::from_high_priority(high_priority);
        let entry = self
            .store
            .upsert_entry(job_id, tier, now, now + self.ttl)
            .await?;

        debug!(job_id = %job_id, tier = %tier, expires_at = %entry.expires_at, "Job enqueued");
        Ok(entry)
    }

    /// Delete every entry whose expiry has passed.
    pub async fn expire_stale(&self) -> StoreResult<u64> {
        let removed = self.store.delete_expired(self.clock.now()).await?;
        info!(removed, "Expired stale queue entries");
        Ok(removed)
    }

    /// Ratio-constrained selection for one channel: the high-tier block
    /// first, then the low-tier block, FIFO within each.
    pub async fn select_for_channel(&self, channel: &Channel) -> StoreResult<Vec<QueuedJob>> {
        let (high_slots, low_slots) = tier_quota(channel.daily_limit, channel.high_ratio);
        let now = self.clock.now();

        let mut selected = Vec::with_capacity((high_slots + low_slots) as usize);
        if high_slots > 0 {
            selected.extend(
                self.store
                    .eligible_for_channel(&channel.name, PriorityTier::High, now, high_slots as usize)
                    .await?,
            );
        }
        let high_found = selected.len();
        if low_slots > 0 {
            selected.extend(
                self.store
                    .eligible_for_channel(&channel.name, PriorityTier::Low, now, low_slots as usize)
                    .await?,
            );
        }

        info!(
            channel = %channel.name,
            high_slots,
            low_slots,
            high = high_found,
            low = selected.len() - high_found,
            "Selected jobs for channel"
        );
        Ok(selected)
    }

    /// Append the posting record. Call only after the delivery succeeded.
    pub async fn record_delivery(
        &self,
        job_id: &JobFingerprint,
        channel: &str,
        message_ref: &str,
    ) -> StoreResult<PostingRecord> {
        let record = PostingRecord {
            job_id: job_id.clone(),
            channel: channel.to_string(),
            message_ref: message_ref.to_string(),
            posted_at: self.clock.now(),
        };
        self.store.insert_posting(&record).await?;

        debug!(job_id = %job_id, channel = %channel, message_ref = %message_ref, "Delivery recorded");
        Ok(record)
    }

    /// Reverify entries that were not posted anywhere today.
    ///
    /// Dead canonical links evict the entry and mark the job `link_failed`.
    /// Everything else is re-enqueued at now with a fresh TTL, keeping its
    /// tier and relative order.
    pub async fn reclaim_unused(&self, liveness: &dyn LivenessCheck) -> StoreResult<ReclaimOutcome> {
        let now = self.clock.now();
        let idle = self
            .store
            .idle_entries(now, self.clock.start_of_today())
            .await?;

        let mut outcome = ReclaimOutcome::default();
        for queued in idle {
            let job_id = &queued.job.id;

            if let Some(url) = queued.job.canonical_url.as_deref() {
                if !liveness.is_live(url).await {
                    warn!(job_id = %job_id, url = %url, "Queued link is dead, evicting");
                    self.remove_failed_link(job_id, DEAD_LINK_REASON).await?;
                    outcome.removed_dead_links += 1;
                    continue;
                }
            }

            self.store
                .upsert_entry(job_id, queued.entry.tier, now, now + self.ttl)
                .await?;
            outcome.reused += 1;
        }

        info!(
            reused = outcome.reused,
            removed_dead_links = outcome.removed_dead_links,
            "Reclaimed unused queue entries"
        );
        Ok(outcome)
    }

    /// Drop the job's entry and mark it `link_failed` with `reason`.
    pub async fn remove_failed_link(&self, job_id: &JobFingerprint, reason: &str) -> StoreResult<()> {
        self.store.remove_entry(job_id).await?;
        self.store
            .set_status(job_id, JobStatus::LinkFailed, Some(reason))
            .await
    }

    pub async fn stats(&self) -> StoreResult<QueueStats> {
        self.store.queue_stats(self.clock.now()).await
    }
}
