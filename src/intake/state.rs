//! Per-session conversation state.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::llm::Role;

use super::model::SlotValue;
use super::schema::FieldKey;

/// Where a session is in the conversation.
///
/// The active field only exists while collecting, so a session can never
/// point at a field outside the form flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "stage", rename_all = "snake_case")]
pub enum Stage {
    Idle,
    Routing,
    Collecting { active_field: FieldKey },
    Inquiry,
    Complete,
    Failed,
}

impl Stage {
    /// Whether the session just finished (successfully or not).
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete | Self::Failed)
    }

    pub fn active_field(&self) -> Option<FieldKey> {
        match self {
            Self::Collecting { active_field } => Some(*active_field),
            _ => None,
        }
    }
}

impl Default for Stage {
    fn default() -> Self {
        Self::Idle
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::Routing => "routing",
            Self::Collecting { .. } => "collecting",
            Self::Inquiry => "inquiry",
            Self::Complete => "complete",
            Self::Failed => "failed",
        };
        write!(f, "{s}")
    }
}

/// One entry of the conversation log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub text: String,
    pub at: DateTime<Utc>,
}

/// Conversation state for one external identity.
///
/// Persisted as JSON in the `sessions` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub session_id: String,
    #[serde(flatten)]
    pub stage: Stage,
    #[serde(default)]
    pub collected: BTreeMap<FieldKey, SlotValue>,
    #[serde(default)]
    pub history: Vec<Turn>,
    /// Failed attempts on the active field.
    #[serde(default)]
    pub retries: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Session {
    pub fn new(session_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            session_id: session_id.into(),
            stage: Stage::Idle,
            collected: BTreeMap::new(),
            history: Vec::new(),
            retries: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn active_field(&self) -> Option<FieldKey> {
        self.stage.active_field()
    }

    /// Append a turn to the history.
    pub fn record(&mut self, role: Role, text: impl Into<String>) {
        let now = Utc::now();
        self.history.push(Turn {
            role,
            text: text.into(),
            at: now,
        });
        self.updated_at = now;
    }

    /// Point collection at `field`, discarding any partial answers.
    pub fn restart_collection(&mut self, field: FieldKey) {
        self.stage = Stage::Collecting {
            active_field: field,
        };
        self.collected.clear();
        self.retries = 0;
    }

    /// Store an accepted value and move on to `next` (or leave the stage
    /// untouched when the form is exhausted).
    pub fn accept(&mut self, field: FieldKey, value: SlotValue, next: Option<FieldKey>) {
        self.collected.insert(field, value);
        self.retries = 0;
        if let Some(next) = next {
            self.stage = Stage::Collecting { active_field: next };
        }
    }

    /// Enter a terminal stage, dropping collected data so the identity can
    /// start a fresh application later.
    pub fn finish(&mut self, stage: Stage) {
        debug_assert!(stage.is_terminal());
        self.stage = stage;
        self.collected.clear();
        self.retries = 0;
    }

    /// Return to idle. History is kept as conversational context.
    pub fn reset(&mut self) {
        self.stage = Stage::Idle;
        self.collected.clear();
        self.retries = 0;
    }

    /// The last `n` turns, oldest first.
    pub fn recent_history(&self, n: usize) -> &[Turn] {
        let start = self.history.len().saturating_sub(n);
        &self.history[start..]
    }
}
