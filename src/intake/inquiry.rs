//! Answers questions about open positions from the job board.
//!
//! Postings are narrowed with a simple keyword and location filter; when
//! nothing matches, every active posting is offered instead. The LLM only
//! phrases the answer. If it fails, a plain listing is returned, so an
//! inquiry never dead-ends on a model outage.

use std::sync::Arc;

use crate::error::LlmError;
use crate::llm::{ChatMessage, CompletionRequest, LlmProvider};
use crate::store::JobBoard;

use super::model::JobPosting;
use super::prompts;

const INQUIRY_MAX_TOKENS: u32 = 600;
const INQUIRY_TEMPERATURE: f32 = 0.3;

/// Words that carry no filtering signal in a job question.
const STOP_WORDS: &[&str] = &[
    "a", "about", "an", "and", "any", "are", "available", "can", "do", "for", "give", "have",
    "hiring", "i", "in", "is", "job", "jobs", "list", "looking", "me", "my", "of", "on", "open",
    "opening", "openings", "or", "position", "positions", "role", "roles", "show", "tell", "the",
    "there", "to", "vacancies", "vacancy", "want", "what", "which", "with", "work", "you", "your",
    "hi", "hello", "please", "some", "all", "get", "know", "like", "would", "could", "currently",
    "at", "near", "around",
];

/// Lowercased content words of a query.
pub fn query_terms(query: &str) -> Vec<String> {
    query
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric() && c != '+' && c != '#')
        .filter(|w| w.len() > 1 && !STOP_WORDS.contains(w))
        .map(String::from)
        .collect()
}

/// Postings whose title, location, description or requirements mention any
/// query term. Falls back to all postings when nothing matches.
pub fn filter_postings(query: &str, postings: &[JobPosting]) -> Vec<JobPosting> {
    let terms = query_terms(query);
    if terms.is_empty() {
        return postings.to_vec();
    }

    let matched: Vec<JobPosting> = postings
        .iter()
        .filter(|job| {
            let haystack = format!(
                "{} {} {} {}",
                job.title, job.location, job.description, job.requirements
            )
            .to_lowercase();
            terms.iter().any(|t| haystack.contains(t.as_str()))
        })
        .cloned()
        .collect();

    if matched.is_empty() {
        postings.to_vec()
    } else {
        matched
    }
}

/// Builds conversational answers about open positions.
pub struct InquiryResponder {
    board: Arc<dyn JobBoard>,
    llm: Option<Arc<dyn LlmProvider>>,
}

impl InquiryResponder {
    pub fn new(board: Arc<dyn JobBoard>, llm: Arc<dyn LlmProvider>) -> Self {
        Self {
            board,
            llm: Some(llm),
        }
    }

    /// Responder that always uses the plain listing.
    pub fn without_llm(board: Arc<dyn JobBoard>) -> Self {
        Self { board, llm: None }
    }

    /// Answer a free-text job question.
    pub async fn answer(&self, query: &str) -> String {
        match self.board.list_active_job_postings().await {
            Ok(postings) => self.respond(query, &postings).await,
            Err(e) => {
                tracing::warn!("Failed to load job postings: {e}");
                prompts::job_board_unavailable().to_string()
            }
        }
    }

    /// Answer against an already-loaded set of postings.
    pub async fn respond(&self, query: &str, postings: &[JobPosting]) -> String {
        if postings.is_empty() {
            return prompts::no_open_positions().to_string();
        }

        let relevant = filter_postings(query, postings);
        tracing::debug!(
            total = postings.len(),
            relevant = relevant.len(),
            "Answering job inquiry"
        );

        let Some(llm) = &self.llm else {
            return prompts::format_postings(&relevant);
        };

        match render(llm.as_ref(), query, &relevant).await {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!("Inquiry rendering failed, using plain listing: {e}");
                prompts::format_postings(&relevant)
            }
        }
    }
}

async fn render(
    llm: &dyn LlmProvider,
    query: &str,
    postings: &[JobPosting],
) -> Result<String, LlmError> {
    let request = CompletionRequest::new(vec![
        ChatMessage::system(prompts::inquiry_system_prompt(postings)),
        ChatMessage::user(query.trim()),
    ])
    .with_max_tokens(INQUIRY_MAX_TOKENS)
    .with_temperature(INQUIRY_TEMPERATURE);

    let response = llm.complete(request).await?;
    let text = response.content.trim();
    if text.is_empty() {
        return Err(LlmError::InvalidResponse {
            provider: llm.model_name().to_string(),
            reason: "empty inquiry response".into(),
        });
    }
    Ok(text.to_string())
}
