//! Agent module: command parsing and the per-session dispatch loop.

pub mod agent_loop;
pub mod submission;

pub use agent_loop::Agent;
pub use submission::{Submission, SubmissionParser};
