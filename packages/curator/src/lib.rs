//! Job curation core.
//!
//! Discovers postings, screens them, resolves each to a live employer
//! application link and delivers a ratio-constrained daily selection to every
//! channel, never repeating a job on the same channel.
//!
//! # Modules
//!
//! - [`models`] - Jobs, queue entries, postings, channels
//! - [`store`] - Queue Store trait with memory and SQLite backends
//! - [`queue`] - Admission & delivery queue
//! - [`traits`] - Collaborator seams (sources, judge, renderer, delivery)
//! - [`cycle`] - The periodic cycle orchestrator

pub mod config;
pub mod cycle;
pub mod delivery;
pub mod error;
pub mod judge;
pub mod models;
pub mod queue;
pub mod render;
pub mod run_lock;
pub mod sources;
pub mod store;
pub mod time;
pub mod traits;

pub use config::Config;
pub use cycle::{Cycle, CycleSettings, CycleStats};
pub use error::{CycleError, RunLockError, StoreError, StoreResult};
pub use models::{
    Channel, Job, JobFingerprint, JobStatus, PostingRecord, PriorityTier, QueueEntry, QueueStats,
    QueuedJob, ReclaimOutcome,
};
pub use queue::{tier_quota, AdmissionQueue};
pub use store::{MemoryQueueStore, QueueStore, SqliteQueueStore};
pub use time::{FixedTimeProvider, SystemTimeProvider, TimeProvider};
