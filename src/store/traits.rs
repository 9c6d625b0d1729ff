//! Narrow persistence interfaces used by the conversation engine.
//!
//! The libSQL backend implements all three; tests substitute in-memory
//! fakes for whichever seam they exercise.

use async_trait::async_trait;

use crate::error::{DatabaseError, SinkError};
use crate::intake::model::{CandidateRecord, JobPosting, NewJobPosting, StoredCandidate};
use crate::intake::state::Session;

/// Persistence boundary for completed applications.
#[async_trait]
pub trait RecordSink: Send + Sync {
    /// Insert a candidate. Returns the new row id.
    ///
    /// Emails are unique (case-insensitive); a second insert with the same
    /// email fails with [`SinkError::DuplicateKey`] and writes nothing.
    async fn insert_candidate(&self, candidate: &CandidateRecord) -> Result<i64, SinkError>;
}

/// Read path over open positions, plus a write path for seeding.
#[async_trait]
pub trait JobBoard: Send + Sync {
    /// All postings currently marked active.
    async fn list_active_job_postings(&self) -> Result<Vec<JobPosting>, DatabaseError>;

    /// Insert a posting, or update the existing one with the same title and
    /// location. Returns the row id.
    async fn upsert_job_posting(&self, posting: &NewJobPosting) -> Result<i64, DatabaseError>;
}

/// Durable session snapshots so conversations survive restarts.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn load_session(&self, session_id: &str) -> Result<Option<Session>, DatabaseError>;

    async fn save_session(&self, session: &Session) -> Result<(), DatabaseError>;

    async fn delete_session(&self, session_id: &str) -> Result<(), DatabaseError>;
}

/// Admin/read access to stored candidates.
#[async_trait]
pub trait CandidateDirectory: Send + Sync {
    async fn get_candidate_by_email(
        &self,
        email: &str,
    ) -> Result<Option<StoredCandidate>, DatabaseError>;

    async fn count_candidates(&self) -> Result<usize, DatabaseError>;
}
