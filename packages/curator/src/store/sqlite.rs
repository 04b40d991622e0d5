//! SQLite queue store.
//!
//! Timestamps are stored as RFC 3339 UTC text with fixed microsecond
//! precision, so lexical order is chronological order and range filters run
//! in SQL.

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteQueryResult};
use sqlx::FromRow;
use std::str::FromStr;

use super::QueueStore;
use crate::error::{StoreError, StoreResult};
use crate::models::{
    Job, JobFingerprint, JobStatus, PostingRecord, PriorityTier, QueueEntry, QueueStats, QueuedJob,
};

const JOB_COLUMNS: &str = "id, source, title, company, description, location, source_url, \
     canonical_url, salary_min, salary_max, tags, discovered_at, status, status_reason, high_priority";

const QUEUED_SELECT: &str = r#"
    SELECT q.job_id AS job_id, q.tier AS tier, q.enqueued_at AS enqueued_at,
           q.expires_at AS expires_at, q.seq AS seq,
           j.id AS id, j.source AS source, j.title AS title, j.company AS company,
           j.description AS description, j.location AS location, j.source_url AS source_url,
           j.canonical_url AS canonical_url, j.salary_min AS salary_min, j.salary_max AS salary_max,
           j.tags AS tags, j.discovered_at AS discovered_at, j.status AS status,
           j.status_reason AS status_reason, j.high_priority AS high_priority
    FROM queue_entries q
    JOIN jobs j ON j.id = q.job_id
"#;

/// SQLite-backed queue store.
pub struct SqliteQueueStore {
    pool: SqlitePool,
}

impl SqliteQueueStore {
    /// Connect and apply migrations.
    ///
    /// # Example URLs
    /// - `sqlite://data/jobs.db?mode=rwc` - file database, created if missing
    /// - `sqlite::memory:` - use [`in_memory`](Self::in_memory) instead
    pub async fn new(database_url: &str) -> StoreResult<Self> {
        let options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;
        Self::with_pool(pool).await
    }

    /// Ephemeral database for tests. Pinned to one connection, since every
    /// in-memory connection is its own database.
    pub async fn in_memory() -> StoreResult<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;
        Self::with_pool(pool).await
    }

    pub async fn with_pool(pool: SqlitePool) -> StoreResult<Self> {
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn ensure_updated(id: &JobFingerprint, result: SqliteQueryResult) -> StoreResult<()> {
    if result.rows_affected() == 0 {
        return Err(StoreError::JobNotFound { id: id.to_string() });
    }
    Ok(())
}

fn timestamp(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(value: &str) -> StoreResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StoreError::Decode(format!("invalid timestamp {:?}: {}", value, e)))
}

// Row types for sqlx queries
#[derive(Debug, FromRow)]
struct JobRow {
    id: String,
    source: String,
    title: String,
    company: String,
    description: String,
    location: String,
    source_url: String,
    canonical_url: Option<String>,
    salary_min: Option<i64>,
    salary_max: Option<i64>,
    tags: String,
    discovered_at: String,
    status: String,
    status_reason: Option<String>,
    high_priority: bool,
}

impl JobRow {
    fn into_job(self) -> StoreResult<Job> {
        let tags: Vec<String> = serde_json::from_str(&self.tags)
            .map_err(|e| StoreError::Decode(format!("invalid tags JSON: {}", e)))?;
        let status = JobStatus::from_str(&self.status).map_err(StoreError::Decode)?;

        Ok(Job {
            id: JobFingerprint::from(self.id),
            source: self.source,
            title: self.title,
            company: self.company,
            description: self.description,
            location: self.location,
            source_url: self.source_url,
            canonical_url: self.canonical_url,
            salary_min: self.salary_min,
            salary_max: self.salary_max,
            tags,
            discovered_at: parse_timestamp(&self.discovered_at)?,
            status,
            status_reason: self.status_reason,
            high_priority: self.high_priority,
        })
    }
}

#[derive(Debug, FromRow)]
struct EntryRow {
    job_id: String,
    tier: String,
    enqueued_at: String,
    expires_at: String,
    seq: i64,
}

impl EntryRow {
    fn into_entry(self) -> StoreResult<QueueEntry> {
        Ok(QueueEntry {
            job_id: JobFingerprint::from(self.job_id),
            tier: PriorityTier::from_str(&self.tier).map_err(StoreError::Decode)?,
            enqueued_at: parse_timestamp(&self.enqueued_at)?,
            expires_at: parse_timestamp(&self.expires_at)?,
            seq: self.seq,
        })
    }
}

#[derive(Debug, FromRow)]
struct QueuedRow {
    #[sqlx(flatten)]
    entry: EntryRow,
    #[sqlx(flatten)]
    job: JobRow,
}

impl QueuedRow {
    fn into_queued(self) -> StoreResult<QueuedJob> {
        Ok(QueuedJob {
            entry: self.entry.into_entry()?,
            job: self.job.into_job()?,
        })
    }
}

#[derive(Debug, FromRow)]
struct PostingRow {
    job_id: String,
    channel: String,
    message_ref: String,
    posted_at: String,
}

impl PostingRow {
    fn into_record(self) -> StoreResult<PostingRecord> {
        Ok(PostingRecord {
            job_id: JobFingerprint::from(self.job_id),
            channel: self.channel,
            message_ref: self.message_ref,
            posted_at: parse_timestamp(&self.posted_at)?,
        })
    }
}

fn map_queued(rows: Vec<QueuedRow>) -> StoreResult<Vec<QueuedJob>> {
    rows.into_iter().map(QueuedRow::into_queued).collect()
}

fn map_jobs(rows: Vec<JobRow>) -> StoreResult<Vec<Job>> {
    rows.into_iter().map(JobRow::into_job).collect()
}

#[async_trait]
impl QueueStore for SqliteQueueStore {
    async fn insert_job(&self, job: &Job) -> StoreResult<bool> {
        let tags = serde_json::to_string(&job.tags)
            .map_err(|e| StoreError::Decode(format!("unserializable tags: {}", e)))?;

        let result = sqlx::query(
            r#"
            INSERT INTO jobs (id, source, title, company, description, location, source_url,
                              canonical_url, salary_min, salary_max, tags, discovered_at,
                              status, status_reason, high_priority)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO NOTHING
            "#,
        )
        .bind(job.id.as_str())
        .bind(&job.source)
        .bind(&job.title)
        .bind(&job.company)
        .bind(&job.description)
        .bind(&job.location)
        .bind(&job.source_url)
        .bind(&job.canonical_url)
        .bind(job.salary_min)
        .bind(job.salary_max)
        .bind(&tags)
        .bind(timestamp(job.discovered_at))
        .bind(job.status.as_str())
        .bind(&job.status_reason)
        .bind(job.high_priority)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn get_job(&self, id: &JobFingerprint) -> StoreResult<Option<Job>> {
        let row = sqlx::query_as::<_, JobRow>(&format!("SELECT {} FROM jobs WHERE id = ?", JOB_COLUMNS))
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await?;

        row.map(JobRow::into_job).transpose()
    }

    async fn pending_jobs(&self, limit: usize) -> StoreResult<Vec<Job>> {
        let rows = sqlx::query_as::<_, JobRow>(&format!(
            "SELECT {} FROM jobs WHERE status = 'pending' ORDER BY discovered_at, id LIMIT ?",
            JOB_COLUMNS
        ))
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        map_jobs(rows)
    }

    async fn approved_jobs_without_canonical(&self, limit: usize) -> StoreResult<Vec<Job>> {
        let rows = sqlx::query_as::<_, JobRow>(&format!(
            "SELECT {} FROM jobs WHERE status = 'approved' AND canonical_url IS NULL \
             ORDER BY discovered_at, id LIMIT ?",
            JOB_COLUMNS
        ))
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        map_jobs(rows)
    }

    async fn set_status(
        &self,
        id: &JobFingerprint,
        status: JobStatus,
        reason: Option<&str>,
    ) -> StoreResult<()> {
        let result = sqlx::query("UPDATE jobs SET status = ?, status_reason = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(reason)
            .bind(id.as_str())
            .execute(&self.pool)
            .await?;

        ensure_updated(id, result)
    }

    async fn set_canonical_url(&self, id: &JobFingerprint, url: &str) -> StoreResult<()> {
        let result = sqlx::query("UPDATE jobs SET canonical_url = ? WHERE id = ?")
            .bind(url)
            .bind(id.as_str())
            .execute(&self.pool)
            .await?;

        ensure_updated(id, result)
    }

    async fn record_judgement(
        &self,
        id: &JobFingerprint,
        approved: bool,
        high_priority: bool,
        reason: Option<&str>,
    ) -> StoreResult<()> {
        let status = if approved {
            JobStatus::Approved
        } else {
            JobStatus::Rejected
        };

        let result = sqlx::query(
            "UPDATE jobs SET status = ?, high_priority = ?, status_reason = ? WHERE id = ?",
        )
        .bind(status.as_str())
        .bind(high_priority)
        .bind(reason)
        .bind(id.as_str())
        .execute(&self.pool)
        .await?;

        ensure_updated(id, result)
    }

    async fn upsert_entry(
        &self,
        job_id: &JobFingerprint,
        tier: PriorityTier,
        enqueued_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> StoreResult<QueueEntry> {
        let row = sqlx::query_as::<_, EntryRow>(
            r#"
            INSERT INTO queue_entries (job_id, tier, weight, enqueued_at, expires_at, seq)
            VALUES (?, ?, ?, ?, ?, (SELECT COALESCE(MAX(seq), 0) + 1 FROM queue_entries))
            ON CONFLICT(job_id) DO UPDATE SET
                tier = excluded.tier,
                weight = excluded.weight,
                enqueued_at = excluded.enqueued_at,
                expires_at = excluded.expires_at,
                seq = excluded.seq
            RETURNING job_id, tier, enqueued_at, expires_at, seq
            "#,
        )
        .bind(job_id.as_str())
        .bind(tier.as_str())
        .bind(tier.weight())
        .bind(timestamp(enqueued_at))
        .bind(timestamp(expires_at))
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(db) if db.is_foreign_key_violation() => StoreError::JobNotFound {
                id: job_id.to_string(),
            },
            other => StoreError::Database(other),
        })?;

        row.into_entry()
    }

    async fn get_entry(&self, job_id: &JobFingerprint) -> StoreResult<Option<QueueEntry>> {
        let row = sqlx::query_as::<_, EntryRow>(
            "SELECT job_id, tier, enqueued_at, expires_at, seq FROM queue_entries WHERE job_id = ?",
        )
        .bind(job_id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(EntryRow::into_entry).transpose()
    }

    async fn remove_entry(&self, job_id: &JobFingerprint) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM queue_entries WHERE job_id = ?")
            .bind(job_id.as_str())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn delete_expired(&self, now: DateTime<Utc>) -> StoreResult<u64> {
        let result = sqlx::query("DELETE FROM queue_entries WHERE expires_at <= ?")
            .bind(timestamp(now))
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }

    async fn eligible_for_channel(
        &self,
        channel: &str,
        tier: PriorityTier,
        now: DateTime<Utc>,
        limit: usize,
    ) -> StoreResult<Vec<QueuedJob>> {
        let sql = format!(
            r#"{}
            WHERE q.tier = ?
              AND q.expires_at > ?
              AND j.status = 'approved'
              AND j.canonical_url IS NOT NULL
              AND NOT EXISTS (
                  SELECT 1 FROM posting_records p
                  WHERE p.job_id = q.job_id AND p.channel = ?
              )
            ORDER BY q.weight DESC, q.enqueued_at ASC, q.seq ASC
            LIMIT ?
            "#,
            QUEUED_SELECT
        );

        let rows = sqlx::query_as::<_, QueuedRow>(&sql)
            .bind(tier.as_str())
            .bind(timestamp(now))
            .bind(channel)
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await?;

        map_queued(rows)
    }

    async fn idle_entries(
        &self,
        now: DateTime<Utc>,
        since: DateTime<Utc>,
    ) -> StoreResult<Vec<QueuedJob>> {
        let sql = format!(
            r#"{}
            WHERE q.expires_at > ?
              AND NOT EXISTS (
                  SELECT 1 FROM posting_records p
                  WHERE p.job_id = q.job_id AND p.posted_at >= ?
              )
            ORDER BY q.weight DESC, q.enqueued_at ASC, q.seq ASC
            "#,
            QUEUED_SELECT
        );

        let rows = sqlx::query_as::<_, QueuedRow>(&sql)
            .bind(timestamp(now))
            .bind(timestamp(since))
            .fetch_all(&self.pool)
            .await?;

        map_queued(rows)
    }

    async fn insert_posting(&self, record: &PostingRecord) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO posting_records (job_id, channel, message_ref, posted_at) VALUES (?, ?, ?, ?)",
        )
        .bind(record.job_id.as_str())
        .bind(&record.channel)
        .bind(&record.message_ref)
        .bind(timestamp(record.posted_at))
        .execute(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(db) if db.is_unique_violation() => StoreError::Invariant(format!(
                "job {} already posted to {}",
                record.job_id, record.channel
            )),
            sqlx::Error::Database(db) if db.is_foreign_key_violation() => StoreError::JobNotFound {
                id: record.job_id.to_string(),
            },
            other => StoreError::Database(other),
        })?;

        Ok(())
    }

    async fn postings_for_job(&self, job_id: &JobFingerprint) -> StoreResult<Vec<PostingRecord>> {
        let rows = sqlx::query_as::<_, PostingRow>(
            "SELECT job_id, channel, message_ref, posted_at FROM posting_records \
             WHERE job_id = ? ORDER BY posted_at, id",
        )
        .bind(job_id.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(PostingRow::into_record).collect()
    }

    async fn queue_stats(&self, now: DateTime<Utc>) -> StoreResult<QueueStats> {
        let (queue_total, queue_high, queue_low): (i64, i64, i64) = sqlx::query_as(
            r#"
            SELECT COUNT(*),
                   COALESCE(SUM(CASE WHEN tier = 'high' THEN 1 ELSE 0 END), 0),
                   COALESCE(SUM(CASE WHEN tier = 'low' THEN 1 ELSE 0 END), 0)
            FROM queue_entries
            WHERE expires_at > ?
            "#,
        )
        .bind(timestamp(now))
        .fetch_one(&self.pool)
        .await?;

        let (jobs_pending, jobs_approved): (i64, i64) = sqlx::query_as(
            r#"
            SELECT COALESCE(SUM(CASE WHEN status = 'pending' THEN 1 ELSE 0 END), 0),
                   COALESCE(SUM(CASE WHEN status = 'approved' THEN 1 ELSE 0 END), 0)
            FROM jobs
            "#,
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(QueueStats {
            queue_total: queue_total as u64,
            queue_high: queue_high as u64,
            queue_low: queue_low as u64,
            jobs_pending: jobs_pending as u64,
            jobs_approved: jobs_approved as u64,
        })
    }
}
