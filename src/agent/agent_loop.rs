//! Main agent loop.
//!
//! Reads the channel's message stream and hands each message to a worker
//! task owned by the sender's session. A worker drains its queue in order,
//! so one session never has two turns in flight while different sessions
//! run concurrently. Every inbound message gets exactly one reply.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::agent::submission::{help_text, reset_confirmation, Submission, SubmissionParser};
use crate::channels::{Channel, IncomingMessage, OutgoingResponse};
use crate::error::Error;
use crate::intake::SessionManager;

/// How often idle sessions are pruned.
const PRUNE_INTERVAL: Duration = Duration::from_secs(600);

/// Queue and task for one session.
struct Worker {
    tx: mpsc::UnboundedSender<IncomingMessage>,
    task: JoinHandle<()>,
}

/// Coordinates a channel with the session manager.
pub struct Agent {
    channel: Arc<dyn Channel>,
    sessions: Arc<SessionManager>,
    idle_timeout: Duration,
}

impl Agent {
    pub fn new(
        channel: Arc<dyn Channel>,
        sessions: Arc<SessionManager>,
        idle_timeout: Duration,
    ) -> Self {
        Self {
            channel,
            sessions,
            idle_timeout,
        }
    }

    /// Run until the channel stream ends, `/quit` arrives, or Ctrl+C.
    ///
    /// Messages already queued for a session are still answered before
    /// this returns.
    pub async fn run(self) -> Result<(), Error> {
        if let Err(e) = self.channel.health_check().await {
            tracing::warn!(channel = self.channel.name(), "Channel health check failed: {e}");
        }
        let mut message_stream = self.channel.start().await?;

        let mut prune = tokio::time::interval(PRUNE_INTERVAL);
        prune.tick().await; // Skip immediate first tick

        let mut workers: HashMap<String, Worker> = HashMap::new();

        tracing::info!(channel = self.channel.name(), "Recruiting assistant ready and listening");

        loop {
            let message = tokio::select! {
                biased;
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("Ctrl+C received, shutting down...");
                    break;
                }
                _ = prune.tick() => {
                    self.sessions.prune_idle(self.idle_timeout).await;
                    workers.retain(|_, w| !w.task.is_finished());
                    continue;
                }
                msg = message_stream.next() => {
                    match msg {
                        Some(m) => m,
                        None => {
                            tracing::info!("Channel stream ended, shutting down...");
                            break;
                        }
                    }
                }
            };

            if SubmissionParser::parse(&message.content) == Submission::Quit {
                tracing::info!("Shutdown command received, exiting...");
                let _ = self
                    .channel
                    .respond(&message, OutgoingResponse::text("Goodbye!"))
                    .await;
                break;
            }

            self.dispatch(&mut workers, message);
        }

        // Close every queue and let workers finish what they hold.
        tracing::info!("Agent shutting down...");
        let tasks: Vec<JoinHandle<()>> = workers.into_values().map(|w| w.task).collect();
        for task in tasks {
            if let Err(e) = task.await {
                tracing::error!("Session worker failed: {e}");
            }
        }
        self.channel.shutdown().await?;

        Ok(())
    }

    /// Queue a message on its session's worker, spawning one if needed.
    fn dispatch(&self, workers: &mut HashMap<String, Worker>, message: IncomingMessage) {
        let key = message.session_key();

        let message = match workers.get(&key) {
            Some(worker) => match worker.tx.send(message) {
                Ok(()) => return,
                // Worker retired after idling; hand the message to a new one.
                Err(mpsc::error::SendError(message)) => message,
            },
            None => message,
        };

        let previous = workers.remove(&key).map(|w| w.task);
        let (tx, rx) = mpsc::unbounded_channel();
        if tx.send(message).is_err() {
            tracing::error!(session = %key, "Failed to queue message for new worker");
            return;
        }

        let task = tokio::spawn(run_worker(
            Arc::clone(&self.channel),
            Arc::clone(&self.sessions),
            rx,
            previous,
            self.idle_timeout,
        ));
        tracing::debug!(session = %key, "Session worker started");
        workers.insert(key, Worker { tx, task });
    }
}

/// Drain one session's queue in arrival order.
///
/// Waits for the session's previous worker (if any) so a retiring worker's
/// last messages are answered first. Retires after `idle_timeout` without
/// input.
async fn run_worker(
    channel: Arc<dyn Channel>,
    sessions: Arc<SessionManager>,
    mut rx: mpsc::UnboundedReceiver<IncomingMessage>,
    previous: Option<JoinHandle<()>>,
    idle_timeout: Duration,
) {
    if let Some(previous) = previous {
        let _ = previous.await;
    }

    loop {
        let message = match tokio::time::timeout(idle_timeout, rx.recv()).await {
            Ok(Some(message)) => message,
            Ok(None) => break,
            Err(_) => {
                rx.close();
                while let Ok(message) = rx.try_recv() {
                    answer(channel.as_ref(), &sessions, &message).await;
                }
                break;
            }
        };
        answer(channel.as_ref(), &sessions, &message).await;
    }
}

async fn answer(channel: &dyn Channel, sessions: &SessionManager, message: &IncomingMessage) {
    let reply = process(sessions, message).await;
    if let Err(e) = channel.respond(message, OutgoingResponse::text(reply)).await {
        tracing::error!(user = %message.user_id, "Failed to send reply: {e}");
    }
}

/// Produce the reply for one message.
pub async fn process(sessions: &SessionManager, message: &IncomingMessage) -> String {
    let key = message.session_key();
    tracing::debug!(
        "Received message from {} on {} ({} chars)",
        message.user_id,
        message.channel,
        message.content.len()
    );

    match SubmissionParser::parse(&message.content) {
        Submission::UserInput { content } => sessions.handle(&key, &content).await,
        Submission::Reset => {
            sessions.reset(&key).await;
            reset_confirmation().to_string()
        }
        Submission::Help => help_text().to_string(),
        Submission::Quit => "Goodbye!".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use futures::stream;

    use super::*;
    use crate::channels::MessageStream;
    use crate::config::{DEFAULT_REJECT_VALUES, IntakeConfig};
    use crate::error::{ChannelError, DatabaseError, LlmError, SinkError};
    use crate::intake::{
        CandidateRecord, ConversationMachine, Extraction, FieldSchema, FieldSpec,
        InquiryResponder, Intent, IntentClassifier, JobPosting, NewJobPosting, SlotExtractor,
        Turn,
    };
    use crate::store::{JobBoard, RecordSink};

    /// Replays a fixed script and records every reply.
    struct ScriptedChannel {
        script: Mutex<Vec<IncomingMessage>>,
        replies: Mutex<Vec<(String, String)>>,
    }

    impl ScriptedChannel {
        fn new(script: &[(&str, &str)]) -> Self {
            Self {
                script: Mutex::new(
                    script
                        .iter()
                        .map(|(user, text)| IncomingMessage::new("test", *user, *text))
                        .collect(),
                ),
                replies: Mutex::new(Vec::new()),
            }
        }

        fn replies_for(&self, user: &str) -> Vec<String> {
            self.replies
                .lock()
                .unwrap()
                .iter()
                .filter(|(u, _)| u == user)
                .map(|(_, r)| r.clone())
                .collect()
        }

        fn reply_count(&self) -> usize {
            self.replies.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl Channel for ScriptedChannel {
        fn name(&self) -> &str {
            "test"
        }

        async fn start(&self) -> Result<MessageStream, ChannelError> {
            let script = std::mem::take(&mut *self.script.lock().unwrap());
            Ok(Box::pin(stream::iter(script)))
        }

        async fn respond(
            &self,
            msg: &IncomingMessage,
            response: OutgoingResponse,
        ) -> Result<(), ChannelError> {
            self.replies
                .lock()
                .unwrap()
                .push((msg.user_id.clone(), response.content));
            Ok(())
        }

        async fn health_check(&self) -> Result<(), ChannelError> {
            Ok(())
        }
    }

    struct ApplyClassifier;

    #[async_trait]
    impl IntentClassifier for ApplyClassifier {
        async fn classify(&self, text: &str) -> Result<Intent, LlmError> {
            Ok(if text.contains("apply") {
                Intent::JobForm
            } else {
                Intent::JobInquiry
            })
        }
    }

    /// Echoes the text after a short delay so turns overlap.
    struct SlowEchoExtractor;

    #[async_trait]
    impl SlotExtractor for SlowEchoExtractor {
        async fn extract(&self, _: &FieldSpec, text: &str, _: &[Turn]) -> Result<Extraction, LlmError> {
            tokio::time::sleep(Duration::from_millis(5)).await;
            Ok(Extraction::Value(text.to_string()))
        }
    }

    struct NullSink;

    #[async_trait]
    impl RecordSink for NullSink {
        async fn insert_candidate(&self, _: &CandidateRecord) -> Result<i64, SinkError> {
            Ok(1)
        }
    }

    struct EmptyBoard;

    #[async_trait]
    impl JobBoard for EmptyBoard {
        async fn list_active_job_postings(&self) -> Result<Vec<JobPosting>, DatabaseError> {
            Ok(vec![])
        }

        async fn upsert_job_posting(&self, _: &NewJobPosting) -> Result<i64, DatabaseError> {
            Ok(0)
        }
    }

    fn sessions() -> Arc<SessionManager> {
        let machine = ConversationMachine::new(
            FieldSchema::recruiting(DEFAULT_REJECT_VALUES.iter().map(|s| s.to_string()).collect()),
            Arc::new(ApplyClassifier),
            Arc::new(SlowEchoExtractor),
            Arc::new(NullSink),
            InquiryResponder::without_llm(Arc::new(EmptyBoard)),
            IntakeConfig::default(),
        );
        Arc::new(SessionManager::new(Arc::new(machine)))
    }

    async fn run_script(script: &[(&str, &str)]) -> (Arc<ScriptedChannel>, Arc<SessionManager>) {
        let channel = Arc::new(ScriptedChannel::new(script));
        let sessions = sessions();
        let agent = Agent::new(channel.clone(), Arc::clone(&sessions), Duration::from_secs(60));
        agent.run().await.unwrap();
        (channel, sessions)
    }

    #[tokio::test]
    async fn replies_once_per_message_in_session_order() {
        let (channel, _) = run_script(&[
            ("alice", "I want to apply"),
            ("bob", "I want to apply"),
            ("alice", "Alice Smith"),
            ("bob", "Bob Jones"),
            ("alice", "alice@example.com"),
        ])
        .await;

        assert_eq!(channel.reply_count(), 5);
        let alice = channel.replies_for("alice");
        assert!(alice[0].starts_with("I'll help you apply for a job."));
        assert_eq!(alice[1], "Great! What's your email address?");
        assert_eq!(alice[2], "Great! What's your phone number?");

        let bob = channel.replies_for("bob");
        assert_eq!(bob.len(), 2);
        assert_eq!(bob[1], "Great! What's your email address?");
    }

    #[tokio::test]
    async fn reset_and_help_commands() {
        let (channel, sessions) = run_script(&[
            ("carol", "I want to apply"),
            ("carol", "/help"),
            ("carol", "/reset"),
        ])
        .await;

        let replies = channel.replies_for("carol");
        assert_eq!(replies.len(), 3);
        assert_eq!(replies[1], help_text());
        assert_eq!(replies[2], reset_confirmation());
        assert!(sessions.snapshot("test:carol").await.is_none());
    }

    #[tokio::test]
    async fn quit_stops_the_loop() {
        let (channel, _) = run_script(&[
            ("dave", "/quit"),
            ("dave", "I want to apply"),
        ])
        .await;

        assert_eq!(channel.replies_for("dave"), vec!["Goodbye!".to_string()]);
    }
}
