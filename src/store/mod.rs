//! Persistence layer: libSQL-backed storage for candidates, job postings
//! and session snapshots.

pub mod libsql_backend;
pub mod migrations;
pub mod seed;
pub mod traits;

pub use libsql_backend::LibSqlBackend;
pub use seed::seed_job_postings;
pub use traits::{CandidateDirectory, JobBoard, RecordSink, SessionStore};
