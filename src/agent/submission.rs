//! Submission types: how raw inbound text is interpreted before it reaches
//! the conversation engine.

/// Parses user input into Submission types.
pub struct SubmissionParser;

impl SubmissionParser {
    /// Parse message content into a Submission.
    pub fn parse(content: &str) -> Submission {
        let trimmed = content.trim();
        let lower = trimmed.to_lowercase();

        match lower.as_str() {
            "/reset" | "/restart" | "/clear" => Submission::Reset,
            "/help" | "/?" => Submission::Help,
            "/quit" | "/exit" | "/shutdown" => Submission::Quit,
            _ => Submission::UserInput {
                content: trimmed.to_string(),
            },
        }
    }
}

/// A submission to the agent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Submission {
    /// Conversational text (possibly empty) for the state machine.
    UserInput { content: String },

    /// Discard the sender's session and start over.
    Reset,

    /// Show the available commands.
    Help,

    /// Stop the agent.
    Quit,
}

impl Submission {
    /// Whether this submission is handled without the state machine.
    pub fn is_control(&self) -> bool {
        !matches!(self, Self::UserInput { .. })
    }
}

pub fn help_text() -> &'static str {
    "\
I can help you apply for a job or tell you about our open positions.
  - Say \"I want to apply for a job\" to start an application.
  - Ask \"What jobs are available in Austin?\" to browse openings.
Commands:
  /reset  start over and discard your current answers
  /help   show this message
  /quit   leave the conversation"
}

pub fn reset_confirmation() -> &'static str {
    "Okay, I've cleared our conversation. How can I help you?"
}
