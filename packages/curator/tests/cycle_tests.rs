//! End-to-end cycles over the memory store with scripted collaborators.

use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use curator_core::judge::HeuristicJudge;
use curator_core::render::PlainRenderer;
use curator_core::traits::{BaseDelivery, BaseJobSource};
use curator_core::{
    AdmissionQueue, Channel, Cycle, CycleSettings, FixedTimeProvider, Job, JobStatus,
    MemoryQueueStore, QueueStore,
};
use link_resolver::testing::MockFetcher;
use link_resolver::{LinkResolver, LivenessFn, ResolverConfig};

const SENIOR_URL: &str = "https://jobs.lever.co/acme/senior";
const LISTING_URL: &str = "https://remoteok.com/remote-jobs/backend-2";
const APPLY_URL: &str = "https://acme.com/apply/2";
const BACKEND_URL: &str = "https://jobs.lever.co/acme/backend";
const MISSING_URL: &str = "https://remoteok.com/remote-jobs/frontend-3";
const STALLED_URL: &str = "https://jobs.lever.co/acme/stalled";

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 6, 9, 0, 0).unwrap()
}

struct StaticSource {
    jobs: Vec<Job>,
    delay: Option<Duration>,
}

#[async_trait]
impl BaseJobSource for StaticSource {
    fn name(&self) -> &str {
        "static"
    }

    async fn fetch_jobs(&self, limit: usize) -> Result<Vec<Job>> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        Ok(self.jobs.iter().take(limit).cloned().collect())
    }
}

struct FailingSource;

#[async_trait]
impl BaseJobSource for FailingSource {
    fn name(&self) -> &str {
        "failing"
    }

    async fn fetch_jobs(&self, _limit: usize) -> Result<Vec<Job>> {
        bail!("upstream returned 503")
    }
}

#[derive(Default)]
struct RecordingDelivery {
    sent: Mutex<Vec<(String, String)>>,
    failing: Mutex<HashSet<String>>,
}

impl RecordingDelivery {
    fn fail_channel(&self, channel: &str) {
        self.failing.lock().unwrap().insert(channel.to_string());
    }

    fn heal(&self) {
        self.failing.lock().unwrap().clear();
    }

    fn sent_to(&self, channel: &str) -> Vec<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter(|(c, _)| c == channel)
            .map(|(_, content)| content.clone())
            .collect()
    }
}

#[async_trait]
impl BaseDelivery for RecordingDelivery {
    async fn deliver(&self, channel: &str, content: &str) -> Result<String> {
        if self.failing.lock().unwrap().contains(channel) {
            bail!("chat not found");
        }
        let mut sent = self.sent.lock().unwrap();
        sent.push((channel.to_string(), content.to_string()));
        Ok(format!("{}-{}", channel, sent.len()))
    }
}

fn jobs() -> Vec<Job> {
    vec![
        Job::new("static", "1", "Senior Rust Engineer", "Acme", SENIOR_URL, t0())
            .with_salary(Some(150_000), Some(180_000)),
        Job::new("static", "2", "Backend Engineer", "Acme", LISTING_URL, t0()),
        Job::new("static", "3", "Frontend Engineer", "Acme", MISSING_URL, t0()),
        Job::new("static", "4", "Support Engineer", "Acme", LISTING_URL, t0())
            .with_description("Applicants must be US citizens only."),
    ]
}

fn fetcher() -> MockFetcher {
    MockFetcher::new()
        .with_live(SENIOR_URL)
        .with_page(
            LISTING_URL,
            format!(r#"<html><body><a href="{APPLY_URL}">Apply Now</a></body></html>"#),
        )
        .with_redirect(APPLY_URL, BACKEND_URL)
        .with_live(BACKEND_URL)
}

struct Fixture {
    store: Arc<MemoryQueueStore>,
    clock: Arc<FixedTimeProvider>,
    delivery: Arc<RecordingDelivery>,
}

impl Fixture {
    fn new() -> Self {
        Self {
            store: Arc::new(MemoryQueueStore::new()),
            clock: Arc::new(FixedTimeProvider::new(t0())),
            delivery: Arc::new(RecordingDelivery::default()),
        }
    }

    fn queue(&self) -> AdmissionQueue {
        AdmissionQueue::new(self.store.clone(), self.clock.clone())
    }

    fn cycle(&self, source: Arc<dyn BaseJobSource>) -> Cycle<MockFetcher> {
        self.cycle_with(source, fetcher())
    }

    fn cycle_with(&self, source: Arc<dyn BaseJobSource>, fetcher: MockFetcher) -> Cycle<MockFetcher> {
        let resolver = LinkResolver::new(
            fetcher,
            ResolverConfig::default()
                .with_candidate_delay(Duration::ZERO)
                .with_concurrency(4),
        );

        Cycle::new(
            self.queue(),
            resolver,
            Arc::new(LivenessFn(|_: &str| true)),
            Arc::new(HeuristicJudge::default()),
            Arc::new(PlainRenderer::default()),
            self.delivery.clone(),
        )
        .with_source(source)
        .with_channel(Channel::new("free", 4))
        .with_channel(Channel::new("paid", 2))
        .with_settings(CycleSettings {
            delivery_delay: Duration::ZERO,
            ..CycleSettings::default()
        })
    }
}

fn static_source() -> Arc<dyn BaseJobSource> {
    Arc::new(StaticSource {
        jobs: jobs(),
        delay: None,
    })
}

#[tokio::test]
async fn test_full_cycle_screens_resolves_and_delivers() {
    let fx = Fixture::new();
    let cycle = fx.cycle(static_source());

    let stats = cycle.run().await.unwrap();

    assert_eq!(stats.discovered, 4);
    assert_eq!(stats.new_jobs, 4);
    assert_eq!(stats.prefiltered, 1);
    assert_eq!(stats.approved, 3);
    assert_eq!(stats.links_resolved, 2);
    assert_eq!(stats.links_failed, 1);
    assert_eq!(stats.delivered.get("free"), Some(&2));
    assert_eq!(stats.delivered.get("paid"), Some(&2));
    assert_eq!(stats.delivery_failures, 0);
    assert!(!stats.timed_out);
    assert_eq!(stats.queue.queue_total, 2);
    assert_eq!(stats.queue.queue_high, 1);

    // high tier goes first
    let free = fx.delivery.sent_to("free");
    assert!(free[0].contains("Senior Rust Engineer"));
    assert!(free[0].contains(SENIOR_URL));
    assert!(free[1].contains(BACKEND_URL));

    let failed = Job::new("static", "3", "", "", MISSING_URL, t0());
    let failed = fx.store.get_job(&failed.id).await.unwrap().unwrap();
    assert_eq!(failed.status, JobStatus::LinkFailed);
    assert_eq!(failed.status_reason.as_deref(), Some("fetch_failed"));

    let rejected = Job::new("static", "4", "", "", LISTING_URL, t0());
    let rejected = fx.store.get_job(&rejected.id).await.unwrap().unwrap();
    assert_eq!(rejected.status, JobStatus::Rejected);
    assert_eq!(fx.store.posting_count(), 4);
}

#[tokio::test]
async fn test_second_cycle_never_repeats_a_job() {
    let fx = Fixture::new();
    let cycle = fx.cycle(static_source());

    cycle.run().await.unwrap();
    let stats = cycle.run().await.unwrap();

    assert_eq!(stats.new_jobs, 0);
    assert_eq!(stats.links_resolved, 0);
    assert_eq!(stats.delivered.get("free"), Some(&0));
    assert_eq!(stats.delivered.get("paid"), Some(&0));
    assert_eq!(fx.delivery.sent_to("free").len(), 2);
    assert_eq!(fx.store.posting_count(), 4);
}

#[tokio::test]
async fn test_failed_delivery_leaves_no_posting_and_retries() {
    let fx = Fixture::new();
    fx.delivery.fail_channel("paid");
    let cycle = fx.cycle(static_source());

    let stats = cycle.run().await.unwrap();

    assert_eq!(stats.delivered.get("free"), Some(&2));
    assert_eq!(stats.delivered.get("paid"), Some(&0));
    assert_eq!(stats.delivery_failures, 2);
    assert_eq!(fx.store.posting_count(), 2);

    fx.delivery.heal();
    let stats = cycle.run().await.unwrap();

    assert_eq!(stats.delivered.get("free"), Some(&0));
    assert_eq!(stats.delivered.get("paid"), Some(&2));
    assert_eq!(fx.store.posting_count(), 4);
}

#[tokio::test]
async fn test_source_failure_is_isolated() {
    let fx = Fixture::new();
    let cycle = fx.cycle(Arc::new(FailingSource)).with_source(static_source());

    let stats = cycle.run().await.unwrap();

    assert_eq!(stats.source_failures, 1);
    assert_eq!(stats.new_jobs, 4);
    assert_eq!(stats.delivered.get("free"), Some(&2));
}

#[tokio::test]
async fn test_deadline_cuts_ingestion_but_delivery_runs() {
    let fx = Fixture::new();

    // already queued before the cycle starts
    let ready = Job::new("static", "ready", "Staff Engineer", "Acme", SENIOR_URL, t0());
    fx.store.insert_job(&ready).await.unwrap();
    fx.store
        .record_judgement(&ready.id, true, true, None)
        .await
        .unwrap();
    fx.store.set_canonical_url(&ready.id, SENIOR_URL).await.unwrap();
    fx.queue().enqueue(&ready.id, true).await.unwrap();

    let slow = Arc::new(StaticSource {
        jobs: jobs(),
        delay: Some(Duration::from_secs(30)),
    });
    let cycle = fx.cycle(slow).with_settings(CycleSettings {
        deadline: Duration::from_millis(50),
        delivery_delay: Duration::ZERO,
        ..CycleSettings::default()
    });

    let stats = cycle.run().await.unwrap();

    assert!(stats.timed_out);
    assert_eq!(stats.new_jobs, 0);
    assert_eq!(stats.delivered.get("free"), Some(&1));
    assert_eq!(stats.delivered.get("paid"), Some(&1));
    assert!(fx.delivery.sent_to("free")[0].contains("Staff Engineer"));
}

#[tokio::test]
async fn test_deadline_keeps_resolutions_that_already_finished() {
    let fx = Fixture::new();
    let source = Arc::new(StaticSource {
        jobs: vec![
            Job::new("static", "stalled", "Backend Engineer", "Acme", STALLED_URL, t0()),
            Job::new("static", "fast", "Senior Rust Engineer", "Acme", SENIOR_URL, t0()),
        ],
        delay: None,
    });
    let fetcher = fetcher()
        .with_live(STALLED_URL)
        .with_stall(STALLED_URL, Duration::from_secs(60));
    let cycle = fx.cycle_with(source, fetcher).with_settings(CycleSettings {
        deadline: Duration::from_millis(300),
        delivery_delay: Duration::ZERO,
        ..CycleSettings::default()
    });

    let stats = cycle.run().await.unwrap();

    assert!(stats.timed_out);
    assert_eq!(stats.approved, 2);
    assert_eq!(stats.links_resolved, 1);
    assert_eq!(stats.links_failed, 0);

    let fast = Job::new("static", "fast", "", "", SENIOR_URL, t0());
    let fast = fx.store.get_job(&fast.id).await.unwrap().unwrap();
    assert_eq!(fast.canonical_url.as_deref(), Some(SENIOR_URL));
    assert_eq!(stats.delivered.get("free"), Some(&1));
    assert!(fx.delivery.sent_to("free")[0].contains("Senior Rust Engineer"));

    // left for the next cycle
    let stalled = Job::new("static", "stalled", "", "", STALLED_URL, t0());
    let stalled = fx.store.get_job(&stalled.id).await.unwrap().unwrap();
    assert_eq!(stalled.status, JobStatus::Approved);
    assert!(stalled.canonical_url.is_none());
    assert!(fx.store.get_entry(&stalled.id).await.unwrap().is_none());
}
