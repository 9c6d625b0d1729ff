//! Slot extraction: pull one field's value out of a free-text answer.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::LlmError;
use crate::llm::{ChatMessage, CompletionRequest, LlmProvider};

use super::prompts::{extraction_system_prompt, format_context, NO_MATCH};
use super::schema::FieldSpec;
use super::state::Turn;

const EXTRACT_MAX_TOKENS: u32 = 128;
const EXTRACT_TEMPERATURE: f32 = 0.0;

/// Result of an extraction attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Extraction {
    Value(String),
    NoMatch,
}

/// Extracts a candidate value for a single field.
///
/// Advisory only: the state machine still validates whatever comes back.
#[async_trait]
pub trait SlotExtractor: Send + Sync {
    async fn extract(
        &self,
        field: &FieldSpec,
        text: &str,
        context: &[Turn],
    ) -> Result<Extraction, LlmError>;
}

/// Clean a raw extractor answer and apply the denylist.
pub fn parse_extraction(raw: &str, field: &FieldSpec, reject_values: &[String]) -> Extraction {
    let Some(line) = raw
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty() && !l.starts_with("```"))
    else {
        return Extraction::NoMatch;
    };

    // "email: jd@example.com" / "Name - John"
    let key = field.key.to_string();
    let mut value = line;
    for prefix in [key.as_str(), field.key.label()] {
        if let Some(rest) = strip_field_label(value, prefix) {
            value = rest;
            break;
        }
    }

    let value = value
        .trim()
        .trim_matches(|c| matches!(c, '"' | '\'' | '`' | '*'))
        .trim();

    let lowered = value.to_lowercase();
    if value.is_empty()
        || value.eq_ignore_ascii_case(NO_MATCH)
        || reject_values.iter().any(|r| *r == lowered)
    {
        Extraction::NoMatch
    } else {
        Extraction::Value(value.to_string())
    }
}

/// Strip a leading `prefix:` or `prefix - ` label. A dash only counts as a
/// separator with whitespace on both sides, so `email-me@example.com` is
/// left intact.
fn strip_field_label<'a>(value: &'a str, prefix: &str) -> Option<&'a str> {
    if value.len() <= prefix.len()
        || !value.is_char_boundary(prefix.len())
        || !value[..prefix.len()].eq_ignore_ascii_case(prefix)
    {
        return None;
    }
    let rest = &value[prefix.len()..];
    let trimmed = rest.trim_start();
    if let Some(after) = trimmed.strip_prefix(':') {
        return Some(after);
    }
    let spaced = trimmed.len() < rest.len();
    match trimmed.strip_prefix('-') {
        Some(after) if spaced && after.starts_with(char::is_whitespace) => Some(after),
        _ => None,
    }
}

/// LLM-backed extractor.
pub struct LlmSlotExtractor {
    llm: Arc<dyn LlmProvider>,
    reject_values: Vec<String>,
}

impl LlmSlotExtractor {
    pub fn new(llm: Arc<dyn LlmProvider>, reject_values: Vec<String>) -> Self {
        Self {
            llm,
            reject_values: reject_values.into_iter().map(|v| v.to_lowercase()).collect(),
        }
    }
}

#[async_trait]
impl SlotExtractor for LlmSlotExtractor {
    async fn extract(
        &self,
        field: &FieldSpec,
        text: &str,
        context: &[Turn],
    ) -> Result<Extraction, LlmError> {
        let text = text.trim();
        let lowered = text.to_lowercase();
        if text.is_empty() || self.reject_values.iter().any(|r| *r == lowered) {
            return Ok(Extraction::NoMatch);
        }

        let mut messages = vec![ChatMessage::system(extraction_system_prompt(field))];
        if !context.is_empty() {
            messages.push(ChatMessage::system(format!(
                "Recent conversation:\n{}",
                format_context(context)
            )));
        }
        messages.push(ChatMessage::user(text));

        let request = CompletionRequest::new(messages)
            .with_max_tokens(EXTRACT_MAX_TOKENS)
            .with_temperature(EXTRACT_TEMPERATURE);

        let response = self.llm.complete(request).await?;
        let extraction = parse_extraction(&response.content, field, &self.reject_values);
        tracing::debug!(field = %field.key, ?extraction, "Slot extraction");
        Ok(extraction)
    }
}
