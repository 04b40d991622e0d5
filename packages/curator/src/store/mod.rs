//! Durable state for the curator: jobs, the admission queue and the
//! append-only posting ledger.
//!
//! Backends:
//! - [`MemoryQueueStore`] for tests and dry runs
//! - [`SqliteQueueStore`] for deployments
//!
//! The store exposes primitive reads and writes; admission policy (quotas,
//! TTL, reverification) lives in [`crate::queue::AdmissionQueue`].

pub mod memory;
pub mod sqlite;

pub use memory::MemoryQueueStore;
pub use sqlite::SqliteQueueStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::StoreResult;
use crate::models::{
    Job, JobFingerprint, JobStatus, PostingRecord, PriorityTier, QueueEntry, QueueStats, QueuedJob,
};

#[async_trait]
pub trait QueueStore: Send + Sync {
    // Jobs

    /// Insert a newly discovered job. Returns `false` if the fingerprint is
    /// already known; the stored job is left untouched.
    async fn insert_job(&self, job: &Job) -> StoreResult<bool>;

    async fn get_job(&self, id: &JobFingerprint) -> StoreResult<Option<Job>>;

    /// Oldest pending jobs first.
    async fn pending_jobs(&self, limit: usize) -> StoreResult<Vec<Job>>;

    /// Approved jobs still waiting for link resolution, oldest first.
    async fn approved_jobs_without_canonical(&self, limit: usize) -> StoreResult<Vec<Job>>;

    async fn set_status(
        &self,
        id: &JobFingerprint,
        status: JobStatus,
        reason: Option<&str>,
    ) -> StoreResult<()>;

    async fn set_canonical_url(&self, id: &JobFingerprint, url: &str) -> StoreResult<()>;

    /// Apply a judge verdict: status becomes `approved` or `rejected`.
    async fn record_judgement(
        &self,
        id: &JobFingerprint,
        approved: bool,
        high_priority: bool,
        reason: Option<&str>,
    ) -> StoreResult<()>;

    // Queue

    /// Create or replace the job's single queue entry. A replaced entry
    /// takes a fresh arrival sequence.
    async fn upsert_entry(
        &self,
        job_id: &JobFingerprint,
        tier: PriorityTier,
        enqueued_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> StoreResult<QueueEntry>;

    async fn get_entry(&self, job_id: &JobFingerprint) -> StoreResult<Option<QueueEntry>>;

    /// Returns whether an entry existed.
    async fn remove_entry(&self, job_id: &JobFingerprint) -> StoreResult<bool>;

    /// Delete entries with `expires_at <= now`; returns how many went.
    async fn delete_expired(&self, now: DateTime<Utc>) -> StoreResult<u64>;

    /// Live entries of one tier whose approved job has a canonical URL and
    /// no posting on `channel`, in (enqueue time, arrival) order.
    async fn eligible_for_channel(
        &self,
        channel: &str,
        tier: PriorityTier,
        now: DateTime<Utc>,
        limit: usize,
    ) -> StoreResult<Vec<QueuedJob>>;

    /// Live entries whose job has no posting at or after `since` on any
    /// channel, in (tier weight desc, enqueue time, arrival) order.
    async fn idle_entries(
        &self,
        now: DateTime<Utc>,
        since: DateTime<Utc>,
    ) -> StoreResult<Vec<QueuedJob>>;

    // Posting ledger

    /// Append a posting. A second record for the same (job, channel) is an
    /// invariant violation.
    async fn insert_posting(&self, record: &PostingRecord) -> StoreResult<()>;

    async fn postings_for_job(&self, job_id: &JobFingerprint) -> StoreResult<Vec<PostingRecord>>;

    /// Counts over entries still live at `now`; expired but unswept entries
    /// are left out.
    async fn queue_stats(&self, now: DateTime<Utc>) -> StoreResult<QueueStats>;
}
