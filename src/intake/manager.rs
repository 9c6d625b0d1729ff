//! Session manager: one serialized conversation per external identity.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, RwLock};

use crate::store::SessionStore;

use super::machine::ConversationMachine;
use super::state::Session;

/// Routes inbound text to the right session and runs one machine step
/// under that session's lock.
pub struct SessionManager {
    machine: Arc<ConversationMachine>,
    store: Option<Arc<dyn SessionStore>>,
    sessions: RwLock<HashMap<String, Arc<Mutex<Session>>>>,
}

impl SessionManager {
    /// Create a manager with in-memory sessions only.
    pub fn new(machine: Arc<ConversationMachine>) -> Self {
        Self {
            machine,
            store: None,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Persist every session version and hydrate unknown ids from `store`.
    pub fn with_store(mut self, store: Arc<dyn SessionStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn machine(&self) -> &ConversationMachine {
        &self.machine
    }

    /// Process one inbound message and return the reply.
    ///
    /// Concurrent calls for the same id queue on that session's mutex;
    /// different ids proceed in parallel.
    pub async fn handle(&self, session_id: &str, text: &str) -> String {
        let cell = self.get_or_create(session_id).await;
        let mut session = cell.lock().await;

        let input = Some(text).filter(|t| !t.trim().is_empty());
        let outcome = self.machine.step(&session, input).await;

        if let Some(ref store) = self.store {
            if let Err(e) = store.save_session(&outcome.session).await {
                tracing::warn!(session_id, "Failed to persist session: {e}");
            }
        }

        *session = outcome.session;
        outcome.reply
    }

    /// Current in-memory copy of a session, if loaded.
    pub async fn snapshot(&self, session_id: &str) -> Option<Session> {
        let cell = {
            let sessions = self.sessions.read().await;
            sessions.get(session_id).cloned()?
        };
        let session = cell.lock().await;
        Some(session.clone())
    }

    /// Discard a session both in memory and in the store.
    ///
    /// Returns whether an in-memory session existed.
    pub async fn reset(&self, session_id: &str) -> bool {
        let removed = self.sessions.write().await.remove(session_id).is_some();
        if let Some(ref store) = self.store {
            if let Err(e) = store.delete_session(session_id).await {
                tracing::warn!(session_id, "Failed to delete persisted session: {e}");
            }
        }
        tracing::info!(session_id, removed, "Session reset");
        removed
    }

    /// Number of sessions currently held in memory.
    pub async fn active_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Evict in-memory sessions idle longer than `max_idle`.
    ///
    /// Persisted copies are kept and re-hydrated on the next message.
    /// Returns the number of sessions evicted.
    pub async fn prune_idle(&self, max_idle: Duration) -> usize {
        let cutoff = chrono::Utc::now() - chrono::TimeDelta::seconds(max_idle.as_secs() as i64);

        let stale: Vec<String> = {
            let sessions = self.sessions.read().await;
            sessions
                .iter()
                .filter_map(|(id, cell)| {
                    // Skip sessions that are mid-turn
                    let session = cell.try_lock().ok()?;
                    (session.updated_at < cutoff).then(|| id.clone())
                })
                .collect()
        };

        if stale.is_empty() {
            return 0;
        }

        let count = {
            let mut sessions = self.sessions.write().await;
            let before = sessions.len();
            for id in &stale {
                sessions.remove(id);
            }
            before - sessions.len()
        };

        if count > 0 {
            tracing::info!(
                "Pruned {} idle session(s) (idle > {}s)",
                count,
                max_idle.as_secs()
            );
        }
        count
    }

    async fn get_or_create(&self, session_id: &str) -> Arc<Mutex<Session>> {
        // Fast path: session already loaded
        {
            let sessions = self.sessions.read().await;
            if let Some(cell) = sessions.get(session_id) {
                return Arc::clone(cell);
            }
        }

        let session = self.hydrate(session_id).await;

        let mut sessions = self.sessions.write().await;
        // Double-check after acquiring write lock
        if let Some(cell) = sessions.get(session_id) {
            return Arc::clone(cell);
        }
        let cell = Arc::new(Mutex::new(session));
        sessions.insert(session_id.to_string(), Arc::clone(&cell));
        cell
    }

    async fn hydrate(&self, session_id: &str) -> Session {
        let Some(ref store) = self.store else {
            return Session::new(session_id);
        };
        match store.load_session(session_id).await {
            Ok(Some(session)) => {
                tracing::debug!(session_id, stage = %session.stage, "Session restored");
                session
            }
            Ok(None) => Session::new(session_id),
            Err(e) => {
                tracing::warn!(session_id, "Failed to load session, starting fresh: {e}");
                Session::new(session_id)
            }
        }
    }
}
