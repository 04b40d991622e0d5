//! Typed errors for the curator core.
//!
//! Queue and store failures are fatal to the step that hit them and are
//! propagated to the cycle. Collaborator failures (sources, judge, delivery)
//! are `anyhow` errors handled per unit of work and never reach here.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by the Queue Store and the admission queue.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Database operation failed
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Schema migration failed
    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A stored row could not be decoded
    #[error("invalid stored value: {0}")]
    Decode(String),

    /// Referenced job does not exist
    #[error("job not found: {id}")]
    JobNotFound { id: String },

    /// Job is not eligible for the queue
    #[error("job {id} is not admissible: {reason}")]
    NotAdmissible { id: String, reason: String },

    /// Stored state violates a queue invariant
    #[error("store invariant violated: {0}")]
    Invariant(String),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Errors that abort a curation cycle.
#[derive(Debug, Error)]
pub enum CycleError {
    #[error("queue store failure: {0}")]
    Store(#[from] StoreError),
}

/// Errors taking the single-run lock.
#[derive(Debug, Error)]
pub enum RunLockError {
    #[error("another run (pid {pid}) holds the lock at {}", path.display())]
    Held { path: PathBuf, pid: u32 },

    #[error("lock file I/O error: {0}")]
    Io(#[from] std::io::Error),
}
