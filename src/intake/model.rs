//! Candidate and job posting data models.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::schema::FieldKey;

/// A validated slot value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SlotValue {
    Number(u32),
    Text(String),
}

impl SlotValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            Self::Number(_) => None,
        }
    }

    pub fn as_number(&self) -> Option<u32> {
        match self {
            Self::Number(n) => Some(*n),
            Self::Text(_) => None,
        }
    }
}

impl std::fmt::Display for SlotValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::Text(s) => write!(f, "{s}"),
        }
    }
}

/// A completed application, as handed to the record sink.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateRecord {
    pub name: String,
    pub email: String,
    pub phone: String,
    pub experience_years: u32,
    pub skills: String,
    pub current_role: String,
}

impl CandidateRecord {
    /// Build a record from collected slots.
    ///
    /// Returns `None` if any field is missing, empty, or has the wrong shape.
    pub fn from_collected(collected: &BTreeMap<FieldKey, SlotValue>) -> Option<Self> {
        let text = |key: FieldKey| -> Option<String> {
            collected
                .get(&key)
                .and_then(SlotValue::as_text)
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
        };

        Some(Self {
            name: text(FieldKey::Name)?,
            email: text(FieldKey::Email)?,
            phone: text(FieldKey::Phone)?,
            experience_years: collected.get(&FieldKey::ExperienceYears)?.as_number()?,
            skills: text(FieldKey::Skills)?,
            current_role: text(FieldKey::CurrentRole)?,
        })
    }
}

/// A persisted candidate row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredCandidate {
    pub id: i64,
    pub record: CandidateRecord,
    pub created_at: DateTime<Utc>,
}

/// An open position, read-only from the conversation's point of view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobPosting {
    pub id: i64,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub requirements: String,
    #[serde(default)]
    pub location: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub salary_range: Option<String>,
}

/// A posting to insert or update, e.g. from a seed file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewJobPosting {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub requirements: String,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub salary_range: Option<String>,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

fn default_active() -> bool {
    true
}
