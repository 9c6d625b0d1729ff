//! Recruit Assist: a conversational recruiting intake assistant.
//!
//! Candidates either apply for a job, answering one question per turn, or
//! ask about open positions. Completed applications are stored in libSQL.

pub mod agent;
pub mod channels;
pub mod config;
pub mod error;
pub mod intake;
pub mod llm;
pub mod store;
