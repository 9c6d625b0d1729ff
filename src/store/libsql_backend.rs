//! libSQL backend for candidates, job postings and session snapshots.
//!
//! Supports local file and in-memory databases. A single connection is
//! reused for all operations; candidate inserts run in an explicit
//! transaction so the duplicate check and the insert cannot interleave.
//! Every write holds `write_lock`, so no statement can land inside that
//! transaction and be undone by its rollback.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::{Connection, Database as LibSqlDatabase, params};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::{DatabaseError, SinkError};
use crate::intake::model::{CandidateRecord, JobPosting, NewJobPosting, StoredCandidate};
use crate::intake::state::Session;
use crate::store::migrations;
use crate::store::traits::{CandidateDirectory, JobBoard, RecordSink, SessionStore};

/// libSQL database backend.
pub struct LibSqlBackend {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
    write_lock: Mutex<()>,
}

impl LibSqlBackend {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::Pool(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DatabaseError::Pool(format!("Failed to open libSQL database: {e}")))?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;

        let backend = Self {
            db: Arc::new(db),
            conn,
            write_lock: Mutex::new(()),
        };
        backend.init_schema().await?;
        info!(path = %path.display(), "Database opened");
        Ok(backend)
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                DatabaseError::Pool(format!("Failed to create in-memory database: {e}"))
            })?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;

        let backend = Self {
            db: Arc::new(db),
            conn,
            write_lock: Mutex::new(()),
        };
        backend.init_schema().await?;
        Ok(backend)
    }

    pub async fn init_schema(&self) -> Result<(), DatabaseError> {
        migrations::run_migrations(self.conn()).await
    }

    fn conn(&self) -> &Connection {
        &self.conn
    }
}

// ── Helper functions ────────────────────────────────────────────────

/// Parse an RFC 3339 or SQLite datetime string into DateTime<Utc>.
fn parse_datetime(s: &str) -> DateTime<Utc> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return dt.with_timezone(&Utc);
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") {
        return ndt.and_utc();
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return ndt.and_utc();
    }
    DateTime::<Utc>::MIN_UTC
}

fn opt_text_owned(s: Option<String>) -> libsql::Value {
    match s {
        Some(s) => libsql::Value::Text(s),
        None => libsql::Value::Null,
    }
}

const CANDIDATE_COLUMNS: &str =
    "id, name, email, phone, experience_years, skills, current_role, created_at";

fn row_to_candidate(row: &libsql::Row) -> Result<StoredCandidate, libsql::Error> {
    let experience_years: i64 = row.get(4)?;
    let created_at: String = row.get(7)?;
    Ok(StoredCandidate {
        id: row.get(0)?,
        record: CandidateRecord {
            name: row.get(1)?,
            email: row.get(2)?,
            phone: row.get(3)?,
            experience_years: u32::try_from(experience_years).unwrap_or(0),
            skills: row.get(5)?,
            current_role: row.get(6)?,
        },
        created_at: parse_datetime(&created_at),
    })
}

const POSTING_COLUMNS: &str = "id, title, description, requirements, location, salary_range";

fn row_to_posting(row: &libsql::Row) -> Result<JobPosting, libsql::Error> {
    Ok(JobPosting {
        id: row.get(0)?,
        title: row.get(1)?,
        description: row.get::<String>(2).unwrap_or_default(),
        requirements: row.get::<String>(3).unwrap_or_default(),
        location: row.get::<String>(4).unwrap_or_default(),
        salary_range: row.get::<String>(5).ok(),
    })
}

fn is_unique_violation(e: &libsql::Error) -> bool {
    e.to_string().contains("UNIQUE constraint failed")
}

/// Duplicate check and insert, run inside the caller's transaction.
async fn insert_candidate_row(
    conn: &Connection,
    email: &str,
    candidate: &CandidateRecord,
) -> Result<i64, SinkError> {
    let mut existing = conn
        .query(
            "SELECT 1 FROM candidates WHERE email = ?1 COLLATE NOCASE LIMIT 1",
            params![email],
        )
        .await
        .map_err(|e| DatabaseError::Query(format!("insert_candidate lookup: {e}")))?;
    let found = existing
        .next()
        .await
        .map_err(|e| DatabaseError::Query(format!("insert_candidate lookup: {e}")))?;
    if found.is_some() {
        return Err(SinkError::DuplicateKey {
            email: email.to_string(),
        });
    }

    let mut rows = conn
        .query(
            "INSERT INTO candidates (name, email, phone, experience_years, skills, current_role, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             RETURNING id",
            params![
                candidate.name.as_str(),
                email,
                candidate.phone.as_str(),
                i64::from(candidate.experience_years),
                candidate.skills.as_str(),
                candidate.current_role.as_str(),
                Utc::now().to_rfc3339(),
            ],
        )
        .await
        .map_err(|e| insert_error(email, e))?;

    match rows.next().await {
        Ok(Some(row)) => Ok(row
            .get::<i64>(0)
            .map_err(|e| DatabaseError::Query(format!("insert_candidate id: {e}")))?),
        Ok(None) => Err(DatabaseError::Query("insert_candidate: no id returned".into()).into()),
        Err(e) => Err(insert_error(email, e)),
    }
}

fn insert_error(email: &str, e: libsql::Error) -> SinkError {
    if is_unique_violation(&e) {
        SinkError::DuplicateKey {
            email: email.to_string(),
        }
    } else {
        DatabaseError::Query(format!("insert_candidate: {e}")).into()
    }
}

// ── Trait implementations ───────────────────────────────────────────

#[async_trait]
impl RecordSink for LibSqlBackend {
    async fn insert_candidate(&self, candidate: &CandidateRecord) -> Result<i64, SinkError> {
        let email = candidate.email.trim().to_lowercase();

        // One write transaction at a time on the shared connection.
        let _guard = self.write_lock.lock().await;
        let tx = self
            .conn()
            .transaction()
            .await
            .map_err(|e| DatabaseError::Query(format!("insert_candidate begin: {e}")))?;

        match insert_candidate_row(&tx, &email, candidate).await {
            Ok(id) => {
                tx.commit()
                    .await
                    .map_err(|e| DatabaseError::Query(format!("insert_candidate commit: {e}")))?;
                info!(candidate_id = id, email = %email, "Candidate stored");
                Ok(id)
            }
            Err(err) => {
                if let Err(e) = tx.rollback().await {
                    tracing::warn!("insert_candidate rollback failed: {e}");
                }
                if matches!(err, SinkError::DuplicateKey { .. }) {
                    debug!(email = %email, "Duplicate candidate rejected");
                }
                Err(err)
            }
        }
    }
}

#[async_trait]
impl CandidateDirectory for LibSqlBackend {
    async fn get_candidate_by_email(
        &self,
        email: &str,
    ) -> Result<Option<StoredCandidate>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {CANDIDATE_COLUMNS} FROM candidates WHERE email = ?1 COLLATE NOCASE"
                ),
                params![email.trim()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_candidate_by_email: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let candidate = row_to_candidate(&row).map_err(|e| {
                    DatabaseError::Query(format!("get_candidate_by_email row parse: {e}"))
                })?;
                Ok(Some(candidate))
            }
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("get_candidate_by_email: {e}"))),
        }
    }

    async fn count_candidates(&self) -> Result<usize, DatabaseError> {
        let mut rows = self
            .conn()
            .query("SELECT COUNT(*) FROM candidates", ())
            .await
            .map_err(|e| DatabaseError::Query(format!("count_candidates: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(row.get::<i64>(0).unwrap_or(0) as usize),
            Ok(None) => Ok(0),
            Err(e) => Err(DatabaseError::Query(format!("count_candidates: {e}"))),
        }
    }
}

#[async_trait]
impl JobBoard for LibSqlBackend {
    async fn list_active_job_postings(&self) -> Result<Vec<JobPosting>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {POSTING_COLUMNS} FROM job_postings WHERE is_active = 1 ORDER BY id ASC"
                ),
                (),
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("list_active_job_postings: {e}")))?;

        let mut postings = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            match row_to_posting(&row) {
                Ok(posting) => postings.push(posting),
                Err(e) => tracing::warn!("Skipping malformed job posting row: {e}"),
            }
        }
        Ok(postings)
    }

    async fn upsert_job_posting(&self, posting: &NewJobPosting) -> Result<i64, DatabaseError> {
        let _guard = self.write_lock.lock().await;
        let mut rows = self
            .conn()
            .query(
                "INSERT INTO job_postings (title, description, requirements, location, salary_range, is_active)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(title, location) DO UPDATE SET
                    description = excluded.description,
                    requirements = excluded.requirements,
                    salary_range = excluded.salary_range,
                    is_active = excluded.is_active
                 RETURNING id",
                params![
                    posting.title.trim(),
                    posting.description.as_str(),
                    posting.requirements.as_str(),
                    posting.location.trim(),
                    opt_text_owned(posting.salary_range.clone()),
                    i64::from(posting.is_active),
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("upsert_job_posting: {e}")))?;

        let id = match rows.next().await {
            Ok(Some(row)) => row
                .get::<i64>(0)
                .map_err(|e| DatabaseError::Query(format!("upsert_job_posting id: {e}")))?,
            Ok(None) => return Err(DatabaseError::Query("upsert_job_posting: no id".into())),
            Err(e) => return Err(DatabaseError::Query(format!("upsert_job_posting: {e}"))),
        };

        debug!(posting_id = id, title = %posting.title, "Job posting upserted");
        Ok(id)
    }
}

#[async_trait]
impl SessionStore for LibSqlBackend {
    async fn load_session(&self, session_id: &str) -> Result<Option<Session>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT state FROM sessions WHERE session_id = ?1",
                params![session_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("load_session: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let state: String = row
                    .get(0)
                    .map_err(|e| DatabaseError::Query(format!("load_session row parse: {e}")))?;
                let session = serde_json::from_str(&state)
                    .map_err(|e| DatabaseError::Serialization(format!("load_session: {e}")))?;
                Ok(Some(session))
            }
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("load_session: {e}"))),
        }
    }

    async fn save_session(&self, session: &Session) -> Result<(), DatabaseError> {
        let state = serde_json::to_string(session)
            .map_err(|e| DatabaseError::Serialization(format!("save_session: {e}")))?;

        let _guard = self.write_lock.lock().await;
        self.conn()
            .execute(
                "INSERT INTO sessions (session_id, stage, state, updated_at) VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(session_id) DO UPDATE SET
                    stage = excluded.stage,
                    state = excluded.state,
                    updated_at = excluded.updated_at",
                params![
                    session.session_id.as_str(),
                    session.stage.to_string(),
                    state,
                    session.updated_at.to_rfc3339(),
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("save_session: {e}")))?;

        debug!(session_id = %session.session_id, stage = %session.stage, "Session saved");
        Ok(())
    }

    async fn delete_session(&self, session_id: &str) -> Result<(), DatabaseError> {
        let _guard = self.write_lock.lock().await;
        self.conn()
            .execute(
                "DELETE FROM sessions WHERE session_id = ?1",
                params![session_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("delete_session: {e}")))?;
        Ok(())
    }
}
