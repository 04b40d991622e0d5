//! Admission queue behaviour, run against every store backend.

use chrono::{DateTime, Duration, TimeZone, Utc};
use std::sync::Arc;

use curator_core::queue::DEAD_LINK_REASON;
use curator_core::{
    AdmissionQueue, Channel, FixedTimeProvider, Job, JobFingerprint, JobStatus, MemoryQueueStore,
    PriorityTier, QueueStore, SqliteQueueStore, StoreError, TimeProvider,
};
use link_resolver::LivenessFn;

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 6, 9, 0, 0).unwrap()
}

struct Harness {
    name: &'static str,
    store: Arc<dyn QueueStore>,
    clock: Arc<FixedTimeProvider>,
    queue: AdmissionQueue,
}

impl Harness {
    fn new(name: &'static str, store: Arc<dyn QueueStore>) -> Self {
        let clock = Arc::new(FixedTimeProvider::new(t0()));
        let queue = AdmissionQueue::new(store.clone(), clock.clone());
        Self {
            name,
            store,
            clock,
            queue,
        }
    }

    /// Insert an approved job with a canonical URL.
    async fn approved(&self, key: &str, high: bool) -> JobFingerprint {
        let job = Job::new(
            "test",
            key,
            format!("Engineer {key}"),
            "Acme",
            format!("https://remoteok.com/remote-jobs/{key}"),
            t0(),
        );
        let id = job.id.clone();
        self.store.insert_job(&job).await.unwrap();
        self.store
            .record_judgement(&id, true, high, None)
            .await
            .unwrap();
        self.store
            .set_canonical_url(&id, &format!("https://jobs.lever.co/acme/{key}"))
            .await
            .unwrap();
        id
    }

    /// Insert and enqueue, one minute after the previous enqueue.
    async fn queued(&self, key: &str, high: bool) -> JobFingerprint {
        let id = self.approved(key, high).await;
        self.clock.advance(Duration::minutes(1));
        self.queue.enqueue(&id, high).await.unwrap();
        id
    }
}

async fn harnesses() -> Vec<Harness> {
    vec![
        Harness::new("memory", Arc::new(MemoryQueueStore::new())),
        Harness::new(
            "sqlite",
            Arc::new(SqliteQueueStore::in_memory().await.unwrap()),
        ),
    ]
}

#[tokio::test]
async fn test_selection_honours_ratio() {
    for h in harnesses().await {
        let mut high = Vec::new();
        for i in 0..8 {
            high.push(h.queued(&format!("h{i}"), true).await);
            h.queued(&format!("l{i}"), false).await;
        }

        let selected = h.queue.select_for_channel(&Channel::new("free", 10)).await.unwrap();

        assert_eq!(selected.len(), 10, "{}", h.name);
        let tiers: Vec<_> = selected.iter().map(|q| q.entry.tier).collect();
        assert_eq!(tiers[..7], [PriorityTier::High; 7], "{}", h.name);
        assert_eq!(tiers[7..], [PriorityTier::Low; 3], "{}", h.name);

        // FIFO within the high tier
        let ids: Vec<_> = selected[..7].iter().map(|q| q.job.id.clone()).collect();
        assert_eq!(ids, high[..7].to_vec(), "{}", h.name);
    }
}

#[tokio::test]
async fn test_no_borrowing_between_tiers() {
    for h in harnesses().await {
        h.queued("h0", true).await;
        for i in 0..5 {
            h.queued(&format!("l{i}"), false).await;
        }

        let selected = h.queue.select_for_channel(&Channel::new("free", 4)).await.unwrap();

        assert_eq!(selected.len(), 2, "{}", h.name);
        assert_eq!(selected[0].entry.tier, PriorityTier::High);
        assert_eq!(selected[1].entry.tier, PriorityTier::Low);
    }
}

#[tokio::test]
async fn test_posted_job_never_reselected_on_same_channel() {
    for h in harnesses().await {
        let a = h.queued("a", true).await;
        let b = h.queued("b", true).await;
        let channel = Channel::new("free", 4);

        h.queue.record_delivery(&a, "free", "msg-1").await.unwrap();
        // re-enqueue must not make it eligible again
        h.clock.advance(Duration::minutes(5));
        h.queue.enqueue(&a, true).await.unwrap();

        let selected = h.queue.select_for_channel(&channel).await.unwrap();
        let ids: Vec<_> = selected.iter().map(|q| q.job.id.clone()).collect();
        assert_eq!(ids, vec![b.clone()], "{}", h.name);

        // other channels are unaffected
        let paid = h.queue.select_for_channel(&Channel::new("paid", 4)).await.unwrap();
        assert_eq!(paid.len(), 2, "{}", h.name);
    }
}

#[tokio::test]
async fn test_recording_same_delivery_twice_is_invariant_violation() {
    for h in harnesses().await {
        let a = h.queued("a", false).await;
        h.queue.record_delivery(&a, "free", "1").await.unwrap();

        let err = h.queue.record_delivery(&a, "free", "2").await.unwrap_err();
        assert!(matches!(err, StoreError::Invariant(_)), "{}: {err}", h.name);

        let postings = h.store.postings_for_job(&a).await.unwrap();
        assert_eq!(postings.len(), 1);
        assert_eq!(postings[0].message_ref, "1");
    }
}

#[tokio::test]
async fn test_expire_stale_removes_only_past_entries() {
    for h in harnesses().await {
        let old = h.queued("old", false).await;
        h.clock.advance(Duration::hours(71));
        let fresh = h.queued("fresh", false).await;
        h.clock.advance(Duration::hours(2));

        let removed = h.queue.expire_stale().await.unwrap();

        assert_eq!(removed, 1, "{}", h.name);
        assert!(h.store.get_entry(&old).await.unwrap().is_none());
        assert!(h.store.get_entry(&fresh).await.unwrap().is_some());
    }
}

#[tokio::test]
async fn test_expired_entries_are_not_selected_before_cleanup() {
    for h in harnesses().await {
        h.queued("a", true).await;
        h.clock.advance(Duration::hours(73));

        let selected = h.queue.select_for_channel(&Channel::new("free", 4)).await.unwrap();
        assert!(selected.is_empty(), "{}", h.name);
    }
}

#[tokio::test]
async fn test_enqueue_twice_keeps_one_entry_with_latest_times() {
    for h in harnesses().await {
        let id = h.approved("a", false).await;

        h.queue.enqueue(&id, false).await.unwrap();
        h.clock.advance(Duration::hours(5));
        h.queue.enqueue(&id, true).await.unwrap();

        let entry = h.store.get_entry(&id).await.unwrap().unwrap();
        assert_eq!(entry.enqueued_at, h.clock.now(), "{}", h.name);
        assert_eq!(entry.expires_at, h.clock.now() + Duration::hours(72));
        assert_eq!(entry.tier, PriorityTier::High);
        assert_eq!(h.queue.stats().await.unwrap().queue_total, 1);
    }
}

#[tokio::test]
async fn test_enqueue_requires_approved_job_with_canonical_url() {
    for h in harnesses().await {
        let pending = Job::new("test", "p", "Engineer", "Acme", "https://remoteok.com/p", t0());
        h.store.insert_job(&pending).await.unwrap();
        let err = h.queue.enqueue(&pending.id, true).await.unwrap_err();
        assert!(matches!(err, StoreError::NotAdmissible { .. }), "{}", h.name);

        h.store
            .record_judgement(&pending.id, true, true, None)
            .await
            .unwrap();
        let err = h.queue.enqueue(&pending.id, true).await.unwrap_err();
        assert!(matches!(err, StoreError::NotAdmissible { .. }), "{}", h.name);

        let err = h
            .queue
            .enqueue(&JobFingerprint::from("missing"), true)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::JobNotFound { .. }), "{}", h.name);
    }
}

#[tokio::test]
async fn test_fifo_ties_break_by_arrival() {
    for h in harnesses().await {
        let first = h.approved("first", false).await;
        let second = h.approved("second", false).await;
        // same clock instant for both
        h.queue.enqueue(&second, false).await.unwrap();
        h.queue.enqueue(&first, false).await.unwrap();

        let selected = h
            .queue
            .select_for_channel(&Channel::new("free", 2).with_high_ratio(0.0))
            .await
            .unwrap();
        let ids: Vec<_> = selected.iter().map(|q| q.job.id.clone()).collect();
        assert_eq!(ids, vec![second, first], "{}", h.name);
    }
}

#[tokio::test]
async fn test_reclaim_evicts_dead_links() {
    for h in harnesses().await {
        let dead = h.queued("dead", true).await;
        let live = h.queued("live", false).await;
        h.clock.advance(Duration::hours(1));

        let liveness = LivenessFn(|url: &str| !url.ends_with("/dead"));
        let outcome = h.queue.reclaim_unused(&liveness).await.unwrap();

        assert_eq!(outcome.removed_dead_links, 1, "{}", h.name);
        assert_eq!(outcome.reused, 1, "{}", h.name);

        assert!(h.store.get_entry(&dead).await.unwrap().is_none());
        let job = h.store.get_job(&dead).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::LinkFailed);
        assert_eq!(job.status_reason.as_deref(), Some(DEAD_LINK_REASON));

        let entry = h.store.get_entry(&live).await.unwrap().unwrap();
        assert_eq!(entry.enqueued_at, h.clock.now(), "{}", h.name);
        assert_eq!(entry.expires_at, h.clock.now() + Duration::hours(72));
        assert_eq!(entry.tier, PriorityTier::Low);
    }
}

#[tokio::test]
async fn test_reclaim_skips_jobs_posted_today() {
    for h in harnesses().await {
        let posted_today = h.queued("today", true).await;
        let posted_yesterday = h.queued("yesterday", true).await;
        let never_posted = h.queued("never", true).await;

        // yesterday's delivery, then move into the next day
        h.queue
            .record_delivery(&posted_yesterday, "free", "1")
            .await
            .unwrap();
        h.clock.advance(Duration::days(1));
        h.queue.record_delivery(&posted_today, "paid", "2").await.unwrap();
        let before = h.store.get_entry(&posted_today).await.unwrap().unwrap();

        let outcome = h.queue.reclaim_unused(&LivenessFn(|_: &str| true)).await.unwrap();

        assert_eq!(outcome.reused, 2, "{}", h.name);
        assert_eq!(outcome.removed_dead_links, 0);
        assert_eq!(h.store.get_entry(&posted_today).await.unwrap().unwrap(), before);
        for id in [&posted_yesterday, &never_posted] {
            let entry = h.store.get_entry(id).await.unwrap().unwrap();
            assert_eq!(entry.enqueued_at, h.clock.now(), "{}", h.name);
        }
    }
}

#[tokio::test]
async fn test_reclaim_keeps_relative_order() {
    for h in harnesses().await {
        let a = h.queued("a", false).await;
        let b = h.queued("b", false).await;
        let c = h.queued("c", false).await;
        h.clock.advance(Duration::hours(2));

        h.queue.reclaim_unused(&LivenessFn(|_: &str| true)).await.unwrap();

        let selected = h
            .queue
            .select_for_channel(&Channel::new("free", 3).with_high_ratio(0.0))
            .await
            .unwrap();
        let ids: Vec<_> = selected.iter().map(|q| q.job.id.clone()).collect();
        assert_eq!(ids, vec![a, b, c], "{}", h.name);
    }
}

#[tokio::test]
async fn test_queue_stats_counts_tiers_and_statuses() {
    for h in harnesses().await {
        h.queued("h", true).await;
        h.queued("l1", false).await;
        h.queued("l2", false).await;
        let pending = Job::new("test", "p", "Engineer", "Acme", "https://remoteok.com/p", t0());
        h.store.insert_job(&pending).await.unwrap();

        let stats = h.queue.stats().await.unwrap();

        assert_eq!(stats.queue_total, 3, "{}", h.name);
        assert_eq!(stats.queue_high, 1);
        assert_eq!(stats.queue_low, 2);
        assert_eq!(stats.jobs_pending, 1);
        assert_eq!(stats.jobs_approved, 3);
    }
}

#[tokio::test]
async fn test_queue_stats_ignore_expired_entries_before_cleanup() {
    for h in harnesses().await {
        h.queued("stale", true).await;
        h.clock.advance(Duration::hours(71));
        h.queued("fresh", false).await;
        h.clock.advance(Duration::hours(2));

        let stats = h.queue.stats().await.unwrap();

        assert_eq!(stats.queue_total, 1, "{}", h.name);
        assert_eq!(stats.queue_high, 0, "{}", h.name);
        assert_eq!(stats.queue_low, 1, "{}", h.name);
        // still stored until the sweep runs
        assert_eq!(h.queue.expire_stale().await.unwrap(), 1, "{}", h.name);
    }
}
