//! The conversation state machine.
//!
//! Each call to [`ConversationMachine::step`] takes the current session and
//! one inbound message and returns the next session version plus the reply.
//! The input session is never mutated, so a failed external call can always
//! fall back to "previous state + history".

use std::future::Future;
use std::sync::Arc;

use crate::config::IntakeConfig;
use crate::error::{IntakeError, SinkError};
use crate::llm::Role;
use crate::store::RecordSink;

use super::classifier::{Intent, IntentClassifier};
use super::extractor::{Extraction, SlotExtractor};
use super::inquiry::InquiryResponder;
use super::model::{CandidateRecord, SlotValue};
use super::prompts;
use super::schema::{FieldKey, FieldSchema, FieldSpec, Rejection};
use super::state::{Session, Stage, Turn};

/// Recorded in history when a turn arrives with no text.
pub const NO_INPUT: &str = "<no input>";

/// What a turn did, for logging and tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnEvent {
    Greeted,
    FormStarted,
    FieldAccepted { field: FieldKey },
    FieldRejected { field: FieldKey, attempts: u32 },
    Reprompted { field: FieldKey },
    Submitted { candidate_id: i64 },
    DuplicateRejected,
    SubmitFailed,
    Restarted,
    RetriesExceeded { field: FieldKey },
    InquiryAnswered,
    ServiceUnavailable,
}

/// Result of one transition.
#[derive(Debug, Clone)]
pub struct TurnOutcome {
    pub session: Session,
    pub reply: String,
    pub event: TurnEvent,
}

/// Drives sessions through idle → routing → collecting/inquiry → complete.
pub struct ConversationMachine {
    schema: FieldSchema,
    classifier: Arc<dyn IntentClassifier>,
    extractor: Arc<dyn SlotExtractor>,
    sink: Arc<dyn RecordSink>,
    responder: InquiryResponder,
    config: IntakeConfig,
}

impl ConversationMachine {
    pub fn new(
        schema: FieldSchema,
        classifier: Arc<dyn IntentClassifier>,
        extractor: Arc<dyn SlotExtractor>,
        sink: Arc<dyn RecordSink>,
        responder: InquiryResponder,
        config: IntakeConfig,
    ) -> Self {
        Self {
            schema,
            classifier,
            extractor,
            sink,
            responder,
            config,
        }
    }

    pub fn schema(&self) -> &FieldSchema {
        &self.schema
    }

    pub fn config(&self) -> &IntakeConfig {
        &self.config
    }

    /// Advance `session` by one inbound message.
    pub async fn step(&self, session: &Session, input: Option<&str>) -> TurnOutcome {
        let mut next = session.clone();
        if next.stage.is_terminal() {
            tracing::debug!(session_id = %next.session_id, stage = %next.stage, "Resetting finished session");
            next.reset();
        }

        let text = input.map(str::trim).filter(|t| !t.is_empty());
        let context = next
            .recent_history(self.config.extractor_context_turns)
            .to_vec();
        next.record(Role::User, text.unwrap_or(NO_INPUT));

        let (reply, event) = match (next.active_field(), text) {
            (Some(field), Some(text)) => self.collect(&mut next, field, text, &context).await,
            (Some(field), None) => self.still_need(&mut next, field),
            (None, None) => {
                next.stage = Stage::Idle;
                (prompts::greeting().to_string(), TurnEvent::Greeted)
            }
            (None, Some(text)) => self.route(&mut next, text).await,
        };

        next.record(Role::Assistant, reply.as_str());
        tracing::info!(
            session_id = %next.session_id,
            from = %session.stage,
            to = %next.stage,
            event = ?event,
            "Turn processed"
        );

        TurnOutcome {
            session: next,
            reply,
            event,
        }
    }

    // ── Routing ─────────────────────────────────────────────────────

    async fn route(&self, session: &mut Session, text: &str) -> (String, TurnEvent) {
        session.stage = Stage::Routing;

        let intent = match self.guarded("classify", self.classifier.classify(text)).await {
            Ok(intent) => intent,
            Err(e) => {
                tracing::warn!(session_id = %session.session_id, "Intent classification failed: {e}");
                session.stage = Stage::Idle;
                return unavailable();
            }
        };
        tracing::debug!(session_id = %session.session_id, %intent, "Classified message");

        match intent {
            Intent::JobForm => {
                let first = self.schema.first();
                session.restart_collection(first.key);
                (prompts::form_started(first), TurnEvent::FormStarted)
            }
            Intent::JobInquiry | Intent::Unknown => {
                session.stage = Stage::Inquiry;
                let answer =
                    tokio::time::timeout(self.config.call_timeout, self.responder.answer(text))
                        .await;
                session.stage = Stage::Idle;
                match answer {
                    Ok(reply) => (reply, TurnEvent::InquiryAnswered),
                    Err(_) => {
                        tracing::warn!(
                            session_id = %session.session_id,
                            timeout = ?self.config.call_timeout,
                            "Inquiry responder timed out"
                        );
                        unavailable()
                    }
                }
            }
        }
    }

    // ── Collection ──────────────────────────────────────────────────

    fn still_need(&self, session: &mut Session, field: FieldKey) -> (String, TurnEvent) {
        match self.schema.get(field) {
            Some(spec) => (prompts::still_need(spec), TurnEvent::Reprompted { field }),
            None => self.restart(session),
        }
    }

    async fn collect(
        &self,
        session: &mut Session,
        field: FieldKey,
        text: &str,
        context: &[Turn],
    ) -> (String, TurnEvent) {
        let Some(spec) = self.schema.get(field) else {
            return self.restart(session);
        };

        let value = if self.schema.is_rejected(text) {
            Err(Rejection::NonAnswer)
        } else {
            match self
                .guarded("extract", self.extractor.extract(spec, text, context))
                .await
            {
                Ok(Extraction::Value(raw)) => self.schema.validate(field, &raw),
                Ok(Extraction::NoMatch) => Err(Rejection::NonAnswer),
                Err(e) => {
                    tracing::warn!(session_id = %session.session_id, %field, "Slot extraction failed: {e}");
                    return unavailable();
                }
            }
        };

        match value {
            Ok(value) => self.advance(session, spec, value).await,
            Err(rejection) => self.reject(session, spec, rejection),
        }
    }

    fn reject(
        &self,
        session: &mut Session,
        spec: &FieldSpec,
        rejection: Rejection,
    ) -> (String, TurnEvent) {
        let field = spec.key;
        session.retries += 1;
        let err = IntakeError::Validation {
            field: field.to_string(),
            reason: rejection.to_string(),
        };
        tracing::debug!(session_id = %session.session_id, attempts = session.retries, "{err}");

        if session.retries >= self.config.max_field_retries {
            let err = IntakeError::ExceededRetries {
                field: field.to_string(),
                max: self.config.max_field_retries,
            };
            tracing::warn!(session_id = %session.session_id, "{err}");
            session.finish(Stage::Failed);
            return (
                prompts::retries_exceeded(field),
                TurnEvent::RetriesExceeded { field },
            );
        }

        (
            prompts::reprompt(spec),
            TurnEvent::FieldRejected {
                field,
                attempts: session.retries,
            },
        )
    }

    async fn advance(
        &self,
        session: &mut Session,
        spec: &FieldSpec,
        value: SlotValue,
    ) -> (String, TurnEvent) {
        let next = self.schema.next_after(spec.key);
        session.accept(spec.key, value, next.map(|s| s.key));

        match next {
            Some(next) => (
                prompts::next_field(next),
                TurnEvent::FieldAccepted { field: spec.key },
            ),
            None => self.submit(session, spec).await,
        }
    }

    async fn submit(&self, session: &mut Session, last: &FieldSpec) -> (String, TurnEvent) {
        let complete = self
            .schema
            .fields()
            .iter()
            .all(|s| session.collected.contains_key(&s.key));
        let record = match CandidateRecord::from_collected(&session.collected) {
            Some(record) if complete => record,
            _ => {
                tracing::warn!(session_id = %session.session_id, "Form exhausted with missing fields");
                return self.restart(session);
            }
        };

        match self
            .guarded("insert_candidate", self.sink.insert_candidate(&record))
            .await
        {
            Ok(candidate_id) => {
                tracing::info!(session_id = %session.session_id, candidate_id, "Application submitted");
                session.finish(Stage::Complete);
                (
                    prompts::thank_you().to_string(),
                    TurnEvent::Submitted { candidate_id },
                )
            }
            Err(IntakeError::Sink(SinkError::DuplicateKey { email })) => {
                tracing::info!(session_id = %session.session_id, %email, "Duplicate application");
                let first = self.schema.first();
                session.restart_collection(first.key);
                (
                    prompts::duplicate_email(&email, first),
                    TurnEvent::DuplicateRejected,
                )
            }
            Err(e) => {
                // Values stay collected at the last field so a resend retries.
                tracing::error!(session_id = %session.session_id, "Failed to store application: {e}");
                (prompts::submit_failed(last), TurnEvent::SubmitFailed)
            }
        }
    }

    fn restart(&self, session: &mut Session) -> (String, TurnEvent) {
        let first = self.schema.first();
        session.restart_collection(first.key);
        (prompts::missing_information(first), TurnEvent::Restarted)
    }

    /// Await an external call under the configured timeout.
    async fn guarded<T, E>(
        &self,
        operation: &str,
        call: impl Future<Output = Result<T, E>>,
    ) -> Result<T, IntakeError>
    where
        E: Into<IntakeError>,
    {
        match tokio::time::timeout(self.config.call_timeout, call).await {
            Ok(result) => result.map_err(Into::into),
            Err(_) => Err(IntakeError::ExternalService {
                operation: operation.to_string(),
                reason: format!("timed out after {:?}", self.config.call_timeout),
            }),
        }
    }
}

fn unavailable() -> (String, TurnEvent) {
    (
        prompts::service_unavailable().to_string(),
        TurnEvent::ServiceUnavailable,
    )
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::time::Duration;

    use async_trait::async_trait;

    use super::*;
    use crate::config::DEFAULT_REJECT_VALUES;
    use crate::error::{DatabaseError, LlmError};
    use crate::intake::model::{JobPosting, NewJobPosting};
    use crate::intake::schema::FieldSpec;
    use crate::store::JobBoard;

    // ── Fakes ───────────────────────────────────────────────────────

    /// Keyword classifier standing in for the LLM.
    struct KeywordClassifier {
        fail: bool,
    }

    #[async_trait]
    impl IntentClassifier for KeywordClassifier {
        async fn classify(&self, text: &str) -> Result<Intent, LlmError> {
            if self.fail {
                return Err(LlmError::RequestFailed {
                    provider: "test".into(),
                    reason: "offline".into(),
                });
            }
            let lower = text.to_lowercase();
            Ok(if lower.contains("apply") {
                Intent::JobForm
            } else if lower.contains("job") {
                Intent::JobInquiry
            } else {
                Intent::Unknown
            })
        }
    }

    /// Returns the trimmed input as the value.
    struct EchoExtractor {
        fail: bool,
    }

    #[async_trait]
    impl SlotExtractor for EchoExtractor {
        async fn extract(
            &self,
            _field: &FieldSpec,
            text: &str,
            _context: &[Turn],
        ) -> Result<Extraction, LlmError> {
            if self.fail {
                return Err(LlmError::Timeout {
                    operation: "extract".into(),
                    timeout: Duration::from_secs(1),
                });
            }
            Ok(Extraction::Value(text.trim().to_string()))
        }
    }

    struct SlowExtractor;

    #[async_trait]
    impl SlotExtractor for SlowExtractor {
        async fn extract(&self, _: &FieldSpec, _: &str, _: &[Turn]) -> Result<Extraction, LlmError> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(Extraction::NoMatch)
        }
    }

    #[derive(Clone, Copy, PartialEq)]
    enum SinkMode {
        Accept,
        Unavailable,
    }

    /// In-memory sink with case-insensitive email uniqueness.
    struct MemorySink {
        records: Mutex<Vec<CandidateRecord>>,
        calls: Mutex<usize>,
        mode: Mutex<SinkMode>,
    }

    impl MemorySink {
        fn new(mode: SinkMode) -> Self {
            Self {
                records: Mutex::new(Vec::new()),
                calls: Mutex::new(0),
                mode: Mutex::new(mode),
            }
        }

        fn set_mode(&self, mode: SinkMode) {
            *self.mode.lock().unwrap() = mode;
        }

        fn records(&self) -> Vec<CandidateRecord> {
            self.records.lock().unwrap().clone()
        }

        fn calls(&self) -> usize {
            *self.calls.lock().unwrap()
        }
    }

    #[async_trait]
    impl RecordSink for MemorySink {
        async fn insert_candidate(&self, candidate: &CandidateRecord) -> Result<i64, SinkError> {
            *self.calls.lock().unwrap() += 1;
            if *self.mode.lock().unwrap() == SinkMode::Unavailable {
                return Err(SinkError::Other("database is locked".into()));
            }
            let mut records = self.records.lock().unwrap();
            if records
                .iter()
                .any(|r| r.email.eq_ignore_ascii_case(&candidate.email))
            {
                return Err(SinkError::DuplicateKey {
                    email: candidate.email.clone(),
                });
            }
            records.push(candidate.clone());
            Ok(records.len() as i64)
        }
    }

    struct StaticBoard(Vec<JobPosting>);

    #[async_trait]
    impl JobBoard for StaticBoard {
        async fn list_active_job_postings(&self) -> Result<Vec<JobPosting>, DatabaseError> {
            Ok(self.0.clone())
        }

        async fn upsert_job_posting(&self, _: &NewJobPosting) -> Result<i64, DatabaseError> {
            Ok(0)
        }
    }

    fn austin_board() -> Vec<JobPosting> {
        vec![
            JobPosting {
                id: 1,
                title: "UX Designer".into(),
                description: "Design user interfaces".into(),
                requirements: "Figma".into(),
                location: "Austin, TX".into(),
                salary_range: Some("$90k-$110k".into()),
            },
            JobPosting {
                id: 2,
                title: "Backend Engineer".into(),
                description: "Build APIs".into(),
                requirements: "Rust".into(),
                location: "Remote".into(),
                salary_range: None,
            },
        ]
    }

    struct Harness {
        machine: ConversationMachine,
        sink: Arc<MemorySink>,
    }

    fn harness_with(
        classifier: KeywordClassifier,
        extractor: Arc<dyn SlotExtractor>,
        sink_mode: SinkMode,
        config: IntakeConfig,
    ) -> Harness {
        let sink = Arc::new(MemorySink::new(sink_mode));
        let machine = ConversationMachine::new(
            FieldSchema::recruiting(DEFAULT_REJECT_VALUES.iter().map(|s| s.to_string()).collect()),
            Arc::new(classifier),
            extractor,
            sink.clone(),
            InquiryResponder::without_llm(Arc::new(StaticBoard(austin_board()))),
            config,
        );
        Harness { machine, sink }
    }

    fn harness() -> Harness {
        harness_with(
            KeywordClassifier { fail: false },
            Arc::new(EchoExtractor { fail: false }),
            SinkMode::Accept,
            IntakeConfig::default(),
        )
    }

    const ANSWERS: [&str; 6] = [
        "John Doe",
        "john@example.com",
        "555-123-4567",
        "5 years",
        "Data Analyst",
        "Python, SQL",
    ];

    /// Start the form and answer every field but the last.
    async fn fill_until_last(machine: &ConversationMachine, email: &str) -> Session {
        let mut session = machine
            .step(&Session::new("s1"), Some("I want to apply for a job"))
            .await
            .session;
        for (i, answer) in ANSWERS[..5].iter().enumerate() {
            let answer: &str = if i == 1 { email } else { answer };
            session = machine.step(&session, Some(answer)).await.session;
        }
        session
    }

    // ── Routing ─────────────────────────────────────────────────────

    #[tokio::test]
    async fn apply_starts_collecting_at_name() {
        let h = harness();
        let out = h
            .machine
            .step(&Session::new("s1"), Some("I want to apply for a job"))
            .await;
        assert_eq!(out.event, TurnEvent::FormStarted);
        assert_eq!(out.session.active_field(), Some(FieldKey::Name));
        assert!(out.reply.contains("full name"));
        assert!(out.session.collected.is_empty());
    }

    #[tokio::test]
    async fn name_answer_moves_to_email() {
        let h = harness();
        let session = h
            .machine
            .step(&Session::new("s1"), Some("I want to apply for a job"))
            .await
            .session;
        let out = h.machine.step(&session, Some("John Doe")).await;

        assert_eq!(
            out.session.collected.get(&FieldKey::Name),
            Some(&SlotValue::Text("John Doe".into()))
        );
        assert_eq!(out.session.active_field(), Some(FieldKey::Email));
        assert_eq!(out.reply, "Great! What's your email address?");
        assert_eq!(out.event, TurnEvent::FieldAccepted { field: FieldKey::Name });
    }

    #[tokio::test]
    async fn inquiry_mentions_matching_posting() {
        let h = harness();
        let out = h
            .machine
            .step(&Session::new("s1"), Some("What jobs are open in Austin?"))
            .await;
        assert_eq!(out.event, TurnEvent::InquiryAnswered);
        assert!(out.reply.contains("UX Designer"));
        assert!(out.reply.contains("Austin, TX"));
        assert_eq!(out.session.stage, Stage::Idle);
    }

    #[tokio::test]
    async fn unknown_intent_falls_back_to_inquiry() {
        let h = harness();
        let out = h.machine.step(&Session::new("s1"), Some("hello there")).await;
        assert_eq!(out.event, TurnEvent::InquiryAnswered);
        assert_eq!(out.session.stage, Stage::Idle);
    }

    #[tokio::test]
    async fn empty_input_while_idle_greets() {
        let h = harness_with(
            KeywordClassifier { fail: true },
            Arc::new(EchoExtractor { fail: false }),
            SinkMode::Accept,
            IntakeConfig::default(),
        );
        let out = h.machine.step(&Session::new("s1"), Some("   ")).await;
        assert_eq!(out.event, TurnEvent::Greeted);
        assert_eq!(out.session.stage, Stage::Idle);
        assert_eq!(out.session.history[0].text, NO_INPUT);
    }

    #[tokio::test]
    async fn classifier_failure_only_appends_history() {
        let h = harness_with(
            KeywordClassifier { fail: true },
            Arc::new(EchoExtractor { fail: false }),
            SinkMode::Accept,
            IntakeConfig::default(),
        );
        let before = Session::new("s1");
        let out = h.machine.step(&before, Some("I want to apply")).await;
        assert_eq!(out.event, TurnEvent::ServiceUnavailable);
        assert_eq!(out.session.stage, Stage::Idle);
        assert!(out.session.collected.is_empty());
        assert_eq!(out.session.history.len(), 2);
        assert!(before.history.is_empty());
    }

    // ── Collection ──────────────────────────────────────────────────

    #[tokio::test]
    async fn six_answers_complete_with_one_insert() {
        let h = harness();
        let session = fill_until_last(&h.machine, ANSWERS[1]).await;
        let out = h.machine.step(&session, Some(ANSWERS[5])).await;

        assert!(matches!(out.event, TurnEvent::Submitted { .. }));
        assert_eq!(out.reply, prompts::thank_you());
        assert_eq!(out.session.stage, Stage::Complete);
        assert!(out.session.collected.is_empty());
        assert!(out.session.active_field().is_none());

        assert_eq!(h.sink.calls(), 1);
        let stored = h.sink.records();
        assert_eq!(
            stored[0],
            CandidateRecord {
                name: "John Doe".into(),
                email: "john@example.com".into(),
                phone: "555-123-4567".into(),
                experience_years: 5,
                skills: "Python, SQL".into(),
                current_role: "Data Analyst".into(),
            }
        );
    }

    #[tokio::test]
    async fn non_answer_at_phone_reprompts() {
        let h = harness();
        let mut session = h
            .machine
            .step(&Session::new("s1"), Some("apply"))
            .await
            .session;
        session = h.machine.step(&session, Some("John Doe")).await.session;
        session = h.machine.step(&session, Some("john@example.com")).await.session;
        assert_eq!(session.active_field(), Some(FieldKey::Phone));
        let collected_before = session.collected.clone();

        let out = h.machine.step(&session, Some("n/a")).await;
        assert_eq!(out.session.active_field(), Some(FieldKey::Phone));
        assert_eq!(out.session.collected, collected_before);
        assert!(out.reply.contains("phone number"));
        assert_eq!(
            out.event,
            TurnEvent::FieldRejected {
                field: FieldKey::Phone,
                attempts: 1
            }
        );
    }

    #[tokio::test]
    async fn empty_input_while_collecting_costs_no_retry() {
        let h = harness();
        let session = h
            .machine
            .step(&Session::new("s1"), Some("apply"))
            .await
            .session;
        let out = h.machine.step(&session, None).await;
        assert_eq!(out.event, TurnEvent::Reprompted { field: FieldKey::Name });
        assert_eq!(out.session.retries, 0);
        assert!(out.reply.starts_with("I still need your full name"));
    }

    #[tokio::test]
    async fn invalid_value_is_rejected_by_schema() {
        let h = harness();
        let mut session = h
            .machine
            .step(&Session::new("s1"), Some("apply"))
            .await
            .session;
        session = h.machine.step(&session, Some("John Doe")).await.session;
        let out = h.machine.step(&session, Some("not an email")).await;
        assert_eq!(out.session.active_field(), Some(FieldKey::Email));
        assert!(!out.session.collected.contains_key(&FieldKey::Email));
    }

    #[tokio::test]
    async fn repeated_failures_end_in_failed() {
        let h = harness();
        let mut session = h
            .machine
            .step(&Session::new("s1"), Some("apply"))
            .await
            .session;
        session = h.machine.step(&session, Some("John Doe")).await.session;

        for _ in 0..2 {
            session = h.machine.step(&session, Some("unknown")).await.session;
            assert_eq!(session.active_field(), Some(FieldKey::Email));
        }
        let out = h.machine.step(&session, Some("idk")).await;
        assert_eq!(
            out.event,
            TurnEvent::RetriesExceeded {
                field: FieldKey::Email
            }
        );
        assert_eq!(out.session.stage, Stage::Failed);
        assert!(out.session.collected.is_empty());
        assert!(out.session.active_field().is_none());
    }

    #[tokio::test]
    async fn finished_session_can_apply_again() {
        let h = harness();
        let session = fill_until_last(&h.machine, ANSWERS[1]).await;
        let done = h.machine.step(&session, Some(ANSWERS[5])).await.session;
        assert_eq!(done.stage, Stage::Complete);

        let out = h.machine.step(&done, Some("I want to apply again")).await;
        assert_eq!(out.event, TurnEvent::FormStarted);
        assert_eq!(out.session.active_field(), Some(FieldKey::Name));
    }

    #[tokio::test]
    async fn duplicate_email_restarts_form() {
        let h = harness();
        let session = fill_until_last(&h.machine, "dup@example.com").await;
        h.machine.step(&session, Some(ANSWERS[5])).await;

        let session = fill_until_last(&h.machine, "DUP@example.com").await;
        let out = h.machine.step(&session, Some(ANSWERS[5])).await;

        assert_eq!(out.event, TurnEvent::DuplicateRejected);
        assert!(out.reply.contains("dup@example.com"));
        assert_eq!(out.session.active_field(), Some(FieldKey::Name));
        assert!(out.session.collected.is_empty());
        assert_eq!(h.sink.records().len(), 1);
    }

    #[tokio::test]
    async fn restored_session_with_gaps_restarts_without_submitting() {
        let h = harness();
        // A persisted snapshot at the last field that lost earlier answers
        let mut session = Session::new("s1");
        session.restart_collection(FieldKey::Skills);
        session.accept(FieldKey::Name, SlotValue::Text("John Doe".into()), None);
        assert_eq!(session.active_field(), Some(FieldKey::Skills));

        let out = h.machine.step(&session, Some(ANSWERS[5])).await;

        assert_eq!(out.event, TurnEvent::Restarted);
        assert_eq!(out.session.active_field(), Some(FieldKey::Name));
        assert!(out.session.collected.is_empty());
        assert!(out.reply.starts_with("Some required information is missing"));
        assert_eq!(h.sink.calls(), 0);
    }

    #[tokio::test]
    async fn sink_outage_keeps_answers_and_retries() {
        let h = harness_with(
            KeywordClassifier { fail: false },
            Arc::new(EchoExtractor { fail: false }),
            SinkMode::Unavailable,
            IntakeConfig::default(),
        );
        let session = fill_until_last(&h.machine, ANSWERS[1]).await;
        let out = h.machine.step(&session, Some(ANSWERS[5])).await;

        assert_eq!(out.event, TurnEvent::SubmitFailed);
        assert_eq!(out.session.active_field(), Some(FieldKey::Skills));
        assert_eq!(out.session.collected.len(), 6);

        h.sink.set_mode(SinkMode::Accept);
        let retry = h.machine.step(&out.session, Some(ANSWERS[5])).await;
        assert!(matches!(retry.event, TurnEvent::Submitted { .. }));
        assert_eq!(h.sink.records().len(), 1);
        assert_eq!(h.sink.calls(), 2);
    }

    #[tokio::test]
    async fn extractor_failure_leaves_state_untouched() {
        let h = harness_with(
            KeywordClassifier { fail: false },
            Arc::new(EchoExtractor { fail: true }),
            SinkMode::Accept,
            IntakeConfig::default(),
        );
        let session = h
            .machine
            .step(&Session::new("s1"), Some("apply"))
            .await
            .session;
        let out = h.machine.step(&session, Some("John Doe")).await;

        assert_eq!(out.event, TurnEvent::ServiceUnavailable);
        assert_eq!(out.session.stage, session.stage);
        assert_eq!(out.session.collected, session.collected);
        assert_eq!(out.session.retries, session.retries);
        assert_eq!(out.session.history.len(), session.history.len() + 2);
    }

    #[tokio::test]
    async fn slow_extractor_times_out() {
        let config = IntakeConfig {
            call_timeout: Duration::from_millis(20),
            ..IntakeConfig::default()
        };
        let h = harness_with(
            KeywordClassifier { fail: false },
            Arc::new(SlowExtractor),
            SinkMode::Accept,
            config,
        );
        let session = h
            .machine
            .step(&Session::new("s1"), Some("apply"))
            .await
            .session;
        let out = h.machine.step(&session, Some("John Doe")).await;
        assert_eq!(out.event, TurnEvent::ServiceUnavailable);
        assert_eq!(out.session.active_field(), Some(FieldKey::Name));
    }

    #[tokio::test]
    async fn history_records_both_sides() {
        let h = harness();
        let out = h
            .machine
            .step(&Session::new("s1"), Some("I want to apply for a job"))
            .await;
        let history = &out.session.history;
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].role, Role::User);
        assert_eq!(history[0].text, "I want to apply for a job");
        assert_eq!(history[1].role, Role::Assistant);
        assert_eq!(history[1].text, out.reply);
    }
}
