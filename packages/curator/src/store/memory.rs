//! In-memory queue store for testing and development.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use super::QueueStore;
use crate::error::{StoreError, StoreResult};
use crate::models::{
    Job, JobFingerprint, JobStatus, PostingRecord, PriorityTier, QueueEntry, QueueStats, QueuedJob,
};

#[derive(Default)]
struct State {
    jobs: HashMap<JobFingerprint, Job>,
    entries: HashMap<JobFingerprint, QueueEntry>,
    postings: Vec<PostingRecord>,
    next_seq: i64,
}

impl State {
    fn job_mut(&mut self, id: &JobFingerprint) -> StoreResult<&mut Job> {
        self.jobs
            .get_mut(id)
            .ok_or_else(|| StoreError::JobNotFound { id: id.to_string() })
    }

    fn has_posting(&self, job_id: &JobFingerprint, pred: impl Fn(&PostingRecord) -> bool) -> bool {
        self.postings
            .iter()
            .any(|p| &p.job_id == job_id && pred(p))
    }

    fn joined(&self, entry: &QueueEntry) -> Option<QueuedJob> {
        self.jobs.get(&entry.job_id).map(|job| QueuedJob {
            entry: entry.clone(),
            job: job.clone(),
        })
    }
}

/// Queue store held entirely in memory.
///
/// A single lock guards all tables, so each operation sees a consistent
/// snapshot. Data is lost on drop.
#[derive(Default)]
pub struct MemoryQueueStore {
    state: RwLock<State>,
}

impl MemoryQueueStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn job_count(&self) -> usize {
        self.read().jobs.len()
    }

    pub fn posting_count(&self) -> usize {
        self.read().postings.len()
    }

    fn read(&self) -> RwLockReadGuard<'_, State> {
        self.state.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, State> {
        self.state.write().unwrap_or_else(|e| e.into_inner())
    }
}

fn queue_order(a: &QueueEntry, b: &QueueEntry) -> std::cmp::Ordering {
    b.tier
        .weight()
        .cmp(&a.tier.weight())
        .then(a.enqueued_at.cmp(&b.enqueued_at))
        .then(a.seq.cmp(&b.seq))
}

fn oldest_first(mut jobs: Vec<Job>, limit: usize) -> Vec<Job> {
    jobs.sort_by(|a, b| a.discovered_at.cmp(&b.discovered_at).then(a.id.cmp(&b.id)));
    jobs.truncate(limit);
    jobs
}

#[async_trait]
impl QueueStore for MemoryQueueStore {
    async fn insert_job(&self, job: &Job) -> StoreResult<bool> {
        let mut state = self.write();
        if state.jobs.contains_key(&job.id) {
            return Ok(false);
        }
        state.jobs.insert(job.id.clone(), job.clone());
        Ok(true)
    }

    async fn get_job(&self, id: &JobFingerprint) -> StoreResult<Option<Job>> {
        Ok(self.read().jobs.get(id).cloned())
    }

    async fn pending_jobs(&self, limit: usize) -> StoreResult<Vec<Job>> {
        let jobs = self
            .read()
            .jobs
            .values()
            .filter(|j| j.status == JobStatus::Pending)
            .cloned()
            .collect();
        Ok(oldest_first(jobs, limit))
    }

    async fn approved_jobs_without_canonical(&self, limit: usize) -> StoreResult<Vec<Job>> {
        let jobs = self
            .read()
            .jobs
            .values()
            .filter(|j| j.status == JobStatus::Approved && j.canonical_url.is_none())
            .cloned()
            .collect();
        Ok(oldest_first(jobs, limit))
    }

    async fn set_status(
        &self,
        id: &JobFingerprint,
        status: JobStatus,
        reason: Option<&str>,
    ) -> StoreResult<()> {
        let mut state = self.write();
        let job = state.job_mut(id)?;
        job.status = status;
        job.status_reason = reason.map(str::to_string);
        Ok(())
    }

    async fn set_canonical_url(&self, id: &JobFingerprint, url: &str) -> StoreResult<()> {
        let mut state = self.write();
        state.job_mut(id)?.canonical_url = Some(url.to_string());
        Ok(())
    }

    async fn record_judgement(
        &self,
        id: &JobFingerprint,
        approved: bool,
        high_priority: bool,
        reason: Option<&str>,
    ) -> StoreResult<()> {
        let mut state = self.write();
        let job = state.job_mut(id)?;
        job.status = if approved {
            JobStatus::Approved
        } else {
            JobStatus::Rejected
        };
        job.high_priority = high_priority;
        job.status_reason = reason.map(str::to_string);
        Ok(())
    }

    async fn upsert_entry(
        &self,
        job_id: &JobFingerprint,
        tier: PriorityTier,
        enqueued_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> StoreResult<QueueEntry> {
        let mut state = self.write();
        if !state.jobs.contains_key(job_id) {
            return Err(StoreError::JobNotFound {
                id: job_id.to_string(),
            });
        }

        state.next_seq += 1;
        let entry = QueueEntry {
            job_id: job_id.clone(),
            tier,
            enqueued_at,
            expires_at,
            seq: state.next_seq,
        };
        state.entries.insert(job_id.clone(), entry.clone());
        Ok(entry)
    }

    async fn get_entry(&self, job_id: &JobFingerprint) -> StoreResult<Option<QueueEntry>> {
        Ok(self.read().entries.get(job_id).cloned())
    }

    async fn remove_entry(&self, job_id: &JobFingerprint) -> StoreResult<bool> {
        Ok(self.write().entries.remove(job_id).is_some())
    }

    async fn delete_expired(&self, now: DateTime<Utc>) -> StoreResult<u64> {
        let mut state = self.write();
        let before = state.entries.len();
        state.entries.retain(|_, entry| entry.is_live(now));
        Ok((before - state.entries.len()) as u64)
    }

    async fn eligible_for_channel(
        &self,
        channel: &str,
        tier: PriorityTier,
        now: DateTime<Utc>,
        limit: usize,
    ) -> StoreResult<Vec<QueuedJob>> {
        let state = self.read();
        let mut entries: Vec<&QueueEntry> = state
            .entries
            .values()
            .filter(|e| e.tier == tier && e.is_live(now))
            .filter(|e| !state.has_posting(&e.job_id, |p| p.channel == channel))
            .collect();
        entries.sort_by(|a, b| queue_order(a, b));

        Ok(entries
            .into_iter()
            .filter_map(|e| state.joined(e))
            .filter(|q| q.job.status == JobStatus::Approved && q.job.canonical_url.is_some())
            .take(limit)
            .collect())
    }

    async fn idle_entries(
        &self,
        now: DateTime<Utc>,
        since: DateTime<Utc>,
    ) -> StoreResult<Vec<QueuedJob>> {
        let state = self.read();
        let mut entries: Vec<&QueueEntry> = state
            .entries
            .values()
            .filter(|e| e.is_live(now))
            .filter(|e| !state.has_posting(&e.job_id, |p| p.posted_at >= since))
            .collect();
        entries.sort_by(|a, b| queue_order(a, b));

        Ok(entries.into_iter().filter_map(|e| state.joined(e)).collect())
    }

    async fn insert_posting(&self, record: &PostingRecord) -> StoreResult<()> {
        let mut state = self.write();
        if !state.jobs.contains_key(&record.job_id) {
            return Err(StoreError::JobNotFound {
                id: record.job_id.to_string(),
            });
        }
        if state.has_posting(&record.job_id, |p| p.channel == record.channel) {
            return Err(StoreError::Invariant(format!(
                "job {} already posted to {}",
                record.job_id, record.channel
            )));
        }
        state.postings.push(record.clone());
        Ok(())
    }

    async fn postings_for_job(&self, job_id: &JobFingerprint) -> StoreResult<Vec<PostingRecord>> {
        Ok(self
            .read()
            .postings
            .iter()
            .filter(|p| &p.job_id == job_id)
            .cloned()
            .collect())
    }

    async fn queue_stats(&self, now: DateTime<Utc>) -> StoreResult<QueueStats> {
        let state = self.read();
        let live: Vec<_> = state.entries.values().filter(|e| e.is_live(now)).collect();
        let count_tier = |tier| live.iter().filter(|e| e.tier == tier).count() as u64;
        let count_status =
            |status| state.jobs.values().filter(|j| j.status == status).count() as u64;

        Ok(QueueStats {
            queue_total: live.len() as u64,
            queue_high: count_tier(PriorityTier::High),
            queue_low: count_tier(PriorityTier::Low),
            jobs_pending: count_status(JobStatus::Pending),
            jobs_approved: count_status(JobStatus::Approved),
        })
    }
}
