//! Load job postings from a JSON seed file.
//!
//! The file holds an array of postings:
//!
//! ```json
//! [{"title": "UX Designer", "location": "Austin, TX", "salary_range": "$90k-$110k"}]
//! ```
//!
//! Seeding is an upsert keyed on title and location, so re-running it with
//! an edited file updates postings in place.

use std::path::Path;

use crate::error::{ConfigError, Error};
use crate::intake::model::NewJobPosting;
use crate::store::JobBoard;

/// Parse a seed file without touching the database.
pub fn read_seed_file(path: &Path) -> Result<Vec<NewJobPosting>, ConfigError> {
    let raw = std::fs::read_to_string(path)?;
    let postings: Vec<NewJobPosting> = serde_json::from_str(&raw)
        .map_err(|e| ConfigError::ParseError(format!("{}: {e}", path.display())))?;

    if let Some(blank) = postings.iter().position(|p| p.title.trim().is_empty()) {
        return Err(ConfigError::ParseError(format!(
            "{}: posting #{} has an empty title",
            path.display(),
            blank + 1
        )));
    }
    Ok(postings)
}

/// Upsert every posting in `path`. Returns how many were written.
pub async fn seed_job_postings(board: &dyn JobBoard, path: &Path) -> Result<usize, Error> {
    let postings = read_seed_file(path)?;
    for posting in &postings {
        board.upsert_job_posting(posting).await?;
    }
    tracing::info!(count = postings.len(), path = %path.display(), "Job postings seeded");
    Ok(postings.len())
}
