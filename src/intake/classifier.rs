//! Intent classification: does the user want to apply, or ask about jobs?

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::LlmError;
use crate::llm::{ChatMessage, CompletionRequest, LlmProvider};

use super::prompts::classification_system_prompt;

const CLASSIFY_MAX_TOKENS: u32 = 16;
const CLASSIFY_TEMPERATURE: f32 = 0.0;

/// Classified purpose of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    JobForm,
    JobInquiry,
    Unknown,
}

impl std::fmt::Display for Intent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::JobForm => "job_form",
            Self::JobInquiry => "job_inquiry",
            Self::Unknown => "unknown",
        };
        write!(f, "{s}")
    }
}

/// Maps free text to an [`Intent`]. Stateless.
#[async_trait]
pub trait IntentClassifier: Send + Sync {
    async fn classify(&self, text: &str) -> Result<Intent, LlmError>;
}

/// Parse a raw classifier answer.
///
/// Tolerates case, whitespace, quotes, code fences and chatty wrappers
/// ("The intent is: job_form."). Anything else is `Unknown`.
pub fn parse_intent(raw: &str) -> Intent {
    let normalized: String = raw
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '_' { c } else { ' ' })
        .collect();
    let words: Vec<&str> = normalized.split_whitespace().collect();

    let form = words
        .iter()
        .any(|w| matches!(*w, "job_form" | "jobform" | "form" | "apply" | "application"));
    let inquiry = words
        .iter()
        .any(|w| matches!(*w, "job_inquiry" | "jobinquiry" | "inquiry" | "enquiry"));

    match (form, inquiry) {
        (true, false) => Intent::JobForm,
        (false, true) => Intent::JobInquiry,
        _ => Intent::Unknown,
    }
}

/// LLM-backed classifier.
pub struct LlmIntentClassifier {
    llm: Arc<dyn LlmProvider>,
}

impl LlmIntentClassifier {
    pub fn new(llm: Arc<dyn LlmProvider>) -> Self {
        Self { llm }
    }
}

#[async_trait]
impl IntentClassifier for LlmIntentClassifier {
    async fn classify(&self, text: &str) -> Result<Intent, LlmError> {
        let request = CompletionRequest::new(vec![
            ChatMessage::system(classification_system_prompt()),
            ChatMessage::user(text.trim()),
        ])
        .with_max_tokens(CLASSIFY_MAX_TOKENS)
        .with_temperature(CLASSIFY_TEMPERATURE);

        let response = self.llm.complete(request).await?;
        let intent = parse_intent(&response.content);
        if intent == Intent::Unknown {
            tracing::warn!(raw = %response.content, "Unrecognized classifier output");
        }
        Ok(intent)
    }
}
