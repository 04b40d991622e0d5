//! One curation cycle.
//!
//! Ingestion (discover -> prefilter -> judge -> resolve -> enqueue) runs
//! under the cycle deadline; each resolved link is enqueued as soon as it
//! resolves. Delivery (expire -> reclaim -> select -> deliver -> record)
//! always runs afterwards, so a slow source cannot starve the channels.
//!
//! Failures of a single source, job or delivery are logged and counted.
//! Queue store failures abort the cycle.

use futures::StreamExt;
use link_resolver::{LinkResolver, LivenessCheck, PageFetcher};
use serde::Serialize;
use std::collections::BTreeMap;
use std::pin::pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{info, warn};

use crate::error::{CycleError, StoreResult};
use crate::judge::Prefilter;
use crate::models::{Channel, Job, JobStatus, QueueStats};
use crate::queue::AdmissionQueue;
use crate::store::QueueStore;
use crate::traits::{BaseDelivery, BaseJobSource, BaseJudge, BaseRenderer};

#[derive(Debug, Clone)]
pub struct CycleSettings {
    /// Postings requested from each source
    pub discovery_limit: usize,
    /// Pending jobs screened per cycle
    pub judge_batch_limit: usize,
    /// Approved jobs resolved per cycle
    pub resolve_batch_limit: usize,
    /// Budget for the ingestion phases
    pub deadline: Duration,
    /// Pause between consecutive deliveries to one channel
    pub delivery_delay: Duration,
}

impl Default for CycleSettings {
    fn default() -> Self {
        Self {
            discovery_limit: 30,
            judge_batch_limit: 100,
            resolve_batch_limit: 20,
            deadline: Duration::from_secs(1800),
            delivery_delay: Duration::from_secs(1),
        }
    }
}

/// Aggregate counts for one cycle.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CycleStats {
    pub discovered: u64,
    pub new_jobs: u64,
    pub source_failures: u64,
    pub prefiltered: u64,
    pub approved: u64,
    pub rejected: u64,
    pub judge_failures: u64,
    pub links_resolved: u64,
    pub links_failed: u64,
    pub expired: u64,
    pub reused: u64,
    pub removed_dead_links: u64,
    pub delivered: BTreeMap<String, u64>,
    pub delivery_failures: u64,
    pub timed_out: bool,
    pub queue: QueueStats,
}

pub struct Cycle<F: PageFetcher> {
    queue: AdmissionQueue,
    resolver: LinkResolver<F>,
    liveness: Arc<dyn LivenessCheck>,
    judge: Arc<dyn BaseJudge>,
    renderer: Arc<dyn BaseRenderer>,
    delivery: Arc<dyn BaseDelivery>,
    prefilter: Prefilter,
    sources: Vec<Arc<dyn BaseJobSource>>,
    channels: Vec<Channel>,
    settings: CycleSettings,
}

impl<F: PageFetcher> Cycle<F> {
    pub fn new(
        queue: AdmissionQueue,
        resolver: LinkResolver<F>,
        liveness: Arc<dyn LivenessCheck>,
        judge: Arc<dyn BaseJudge>,
        renderer: Arc<dyn BaseRenderer>,
        delivery: Arc<dyn BaseDelivery>,
    ) -> Self {
        Self {
            queue,
            resolver,
            liveness,
            judge,
            renderer,
            delivery,
            prefilter: Prefilter::default(),
            sources: Vec::new(),
            channels: Vec::new(),
            settings: CycleSettings::default(),
        }
    }

    pub fn with_source(mut self, source: Arc<dyn BaseJobSource>) -> Self {
        self.sources.push(source);
        self
    }

    pub fn with_channel(mut self, channel: Channel) -> Self {
        self.channels.push(channel);
        self
    }

    pub fn with_prefilter(mut self, prefilter: Prefilter) -> Self {
        self.prefilter = prefilter;
        self
    }

    pub fn with_settings(mut self, settings: CycleSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn queue(&self) -> &AdmissionQueue {
        &self.queue
    }

    fn store(&self) -> &Arc<dyn QueueStore> {
        self.queue.store()
    }

    pub async fn run(&self) -> Result<CycleStats, CycleError> {
        let mut stats = CycleStats::default();
        let deadline = Instant::now() + self.settings.deadline;

        let intake = tokio::time::timeout_at(deadline, self.intake(&mut stats)).await;
        match intake {
            Ok(result) => result?,
            Err(_) => stats.timed_out = true,
        }
        if !stats.timed_out {
            self.resolve(&mut stats, deadline).await?;
        }
        if stats.timed_out {
            warn!(
                deadline_secs = self.settings.deadline.as_secs(),
                "Ingestion hit the cycle deadline, moving on to delivery"
            );
        }

        self.deliver(&mut stats).await?;
        stats.queue = self.queue.stats().await?;

        info!(
            new_jobs = stats.new_jobs,
            approved = stats.approved,
            links_resolved = stats.links_resolved,
            links_failed = stats.links_failed,
            delivered = stats.delivered.values().sum::<u64>(),
            delivery_failures = stats.delivery_failures,
            queue_total = stats.queue.queue_total,
            queue_high = stats.queue.queue_high,
            queue_low = stats.queue.queue_low,
            timed_out = stats.timed_out,
            "Cycle complete"
        );
        Ok(stats)
    }

    async fn intake(&self, stats: &mut CycleStats) -> StoreResult<()> {
        self.discover(stats).await?;
        self.screen(stats).await
    }

    async fn discover(&self, stats: &mut CycleStats) -> StoreResult<()> {
        for source in &self.sources {
            let jobs = match source.fetch_jobs(self.settings.discovery_limit).await {
                Ok(jobs) => jobs,
                Err(e) => {
                    warn!(source = source.name(), error = %e, "Source failed");
                    stats.source_failures += 1;
                    continue;
                }
            };

            for job in jobs {
                stats.discovered += 1;
                if self.store().insert_job(&job).await? {
                    stats.new_jobs += 1;
                }
            }
        }

        info!(
            discovered = stats.discovered,
            new_jobs = stats.new_jobs,
            source_failures = stats.source_failures,
            "Discovery complete"
        );
        Ok(())
    }

    async fn screen(&self, stats: &mut CycleStats) -> StoreResult<()> {
        let pending = self.store().pending_jobs(self.settings.judge_batch_limit).await?;

        for job in pending {
            if let Some(term) = self.prefilter.check(&job) {
                let reason = format!("prefilter: {}", term);
                self.store()
                    .set_status(&job.id, JobStatus::Rejected, Some(&reason))
                    .await?;
                stats.prefiltered += 1;
                continue;
            }

            match self.judge.judge(&job).await {
                Ok(verdict) => {
                    self.store()
                        .record_judgement(
                            &job.id,
                            verdict.approved,
                            verdict.high_priority,
                            verdict.reason.as_deref(),
                        )
                        .await?;
                    if verdict.approved {
                        stats.approved += 1;
                    } else {
                        stats.rejected += 1;
                    }
                }
                // left pending for the next cycle
                Err(e) => {
                    warn!(job_id = %job.id, error = %e, "Judge failed");
                    stats.judge_failures += 1;
                }
            }
        }

        info!(
            prefiltered = stats.prefiltered,
            approved = stats.approved,
            rejected = stats.rejected,
            judge_failures = stats.judge_failures,
            "Screening complete"
        );
        Ok(())
    }

    /// Resolve approved jobs, persisting each outcome as it arrives. Hitting
    /// the deadline drops the resolutions still in flight; those jobs stay
    /// approved without a canonical URL and are picked up next cycle.
    async fn resolve(&self, stats: &mut CycleStats, deadline: Instant) -> StoreResult<()> {
        let jobs = self
            .store()
            .approved_jobs_without_canonical(self.settings.resolve_batch_limit)
            .await?;
        if jobs.is_empty() {
            return Ok(());
        }

        let items: Vec<(Job, String)> = jobs
            .into_iter()
            .map(|job| {
                let url = job.source_url.clone();
                (job, url)
            })
            .collect();

        let mut resolutions = pin!(self.resolver.resolve_stream(items));
        loop {
            let next = tokio::time::timeout_at(deadline, resolutions.next()).await;
            let (job, resolution) = match next {
                Ok(Some(next)) => next,
                Ok(None) => break,
                Err(_) => {
                    stats.timed_out = true;
                    break;
                }
            };

            match resolution.url {
                Some(url) => {
                    self.store().set_canonical_url(&job.id, &url).await?;
                    self.queue.enqueue(&job.id, job.high_priority).await?;
                    stats.links_resolved += 1;
                }
                None => {
                    self.queue
                        .remove_failed_link(&job.id, &resolution.reason.to_string())
                        .await?;
                    stats.links_failed += 1;
                }
            }
        }

        info!(
            links_resolved = stats.links_resolved,
            links_failed = stats.links_failed,
            "Link resolution complete"
        );
        Ok(())
    }

    async fn deliver(&self, stats: &mut CycleStats) -> StoreResult<()> {
        stats.expired = self.queue.expire_stale().await?;

        let reclaimed = self.queue.reclaim_unused(self.liveness.as_ref()).await?;
        stats.reused = reclaimed.reused;
        stats.removed_dead_links = reclaimed.removed_dead_links;

        for channel in &self.channels {
            let selected = self.queue.select_for_channel(channel).await?;
            let mut sent = 0u64;

            for (i, queued) in selected.iter().enumerate() {
                if i > 0 && !self.settings.delivery_delay.is_zero() {
                    tokio::time::sleep(self.settings.delivery_delay).await;
                }

                let content = self.renderer.render(&queued.job);
                match self.delivery.deliver(&channel.name, &content).await {
                    Ok(message_ref) => {
                        self.queue
                            .record_delivery(&queued.job.id, &channel.name, &message_ref)
                            .await?;
                        sent += 1;
                    }
                    Err(e) => {
                        warn!(
                            channel = %channel.name,
                            job_id = %queued.job.id,
                            error = %e,
                            "Delivery failed"
                        );
                        stats.delivery_failures += 1;
                    }
                }
            }

            info!(channel = %channel.name, sent, selected = selected.len(), "Channel delivery complete");
            stats.delivered.insert(channel.name.clone(), sent);
        }

        Ok(())
    }
}
