//! Candidate intake: the conversational flow that routes a message to either
//! a job application or a job inquiry.
//!
//! Applications are collected one field at a time through an ordered form.
//! Each turn runs the state machine against the session's current version
//! and produces the next version plus a reply. Completed applications are
//! handed to a record sink; inquiries are answered from the job board.

pub mod classifier;
pub mod extractor;
pub mod inquiry;
pub mod machine;
pub mod manager;
pub mod model;
pub mod prompts;
pub mod schema;
pub mod state;

pub use classifier::{Intent, IntentClassifier, LlmIntentClassifier};
pub use extractor::{Extraction, LlmSlotExtractor, SlotExtractor};
pub use inquiry::InquiryResponder;
pub use machine::{ConversationMachine, TurnEvent, TurnOutcome};
pub use manager::SessionManager;
pub use model::{CandidateRecord, JobPosting, NewJobPosting, SlotValue, StoredCandidate};
pub use schema::{FieldKey, FieldKind, FieldSchema, FieldSpec};
pub use state::{Session, Stage, Turn};
