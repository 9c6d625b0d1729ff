//! LLM prompts and user-facing reply text for the intake flow.

use crate::llm::Role;

use super::model::JobPosting;
use super::schema::{FieldKey, FieldSpec};
use super::state::Turn;

/// Sentinel the extractor must answer with when the message has no value.
pub const NO_MATCH: &str = "NO_MATCH";

pub fn classification_system_prompt() -> &'static str {
    "\
You are a recruiting assistant. Determine if the user wants to:
1. Apply for a job (fill out a job application form)
2. Inquire about available jobs
Respond with exactly one word: either 'job_form' or 'job_inquiry'."
}

/// System prompt for pulling one field's value out of a message.
pub fn extraction_system_prompt(field: &FieldSpec) -> String {
    let hint = match field.key {
        FieldKey::Name => "the person's full name",
        FieldKey::Email => "the email address",
        FieldKey::Phone => "the phone number, digits and separators only",
        FieldKey::ExperienceYears => "the number of years of professional experience, as a number",
        FieldKey::CurrentRole => "the person's current job title or role",
        FieldKey::Skills => "the list of skills and technologies, comma separated",
    };
    format!(
        "\
You are a recruiting assistant collecting the {key}.
The assistant asked: \"{prompt}\"
Extract only {hint} from the user's message.
Respond with only the extracted value, nothing else.
If the message does not contain it, respond with {NO_MATCH}.",
        key = field.key,
        prompt = field.prompt,
    )
}

/// Render recent turns as plain text context for the extractor.
pub fn format_context(turns: &[Turn]) -> String {
    turns
        .iter()
        .map(|t| {
            let who = match t.role {
                Role::User => "User",
                Role::Assistant => "Assistant",
                Role::System => "System",
            };
            format!("{who}: {}", t.text)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// System prompt for turning postings into a conversational answer.
pub fn inquiry_system_prompt(postings: &[JobPosting]) -> String {
    let jobs = serde_json::to_string_pretty(postings).unwrap_or_else(|_| "[]".to_string());
    format!(
        "\
You are a recruiting assistant. Create a natural response about available jobs.
Format each job in a clear, conversational way and always mention its title and location.
Only describe the jobs listed below; never invent positions.
Here are the jobs:
{jobs}"
    )
}

// ── Replies ─────────────────────────────────────────────────────────

pub fn greeting() -> &'static str {
    "Hi! I'm the recruiting assistant. You can apply for a job by saying something like \
\"I want to apply for a job\", or ask about open positions with \"What jobs are available?\""
}

pub fn form_started(first: &FieldSpec) -> String {
    format!("I'll help you apply for a job. {}", first.prompt)
}

pub fn next_field(next: &FieldSpec) -> String {
    format!("Great! {}", next.prompt)
}

pub fn still_need(field: &FieldSpec) -> String {
    format!(
        "I still need your {}. Could you please provide it? {}",
        field.key.label(),
        field.prompt
    )
}

pub fn reprompt(field: &FieldSpec) -> String {
    format!(
        "I didn't quite get your {}. Could you please provide it again? {}",
        field.key.label(),
        field.prompt
    )
}

pub fn retries_exceeded(field: FieldKey) -> String {
    format!(
        "Sorry, I couldn't get a usable {} after several tries, so I've cancelled this \
application. Just tell me whenever you'd like to start again.",
        field.label()
    )
}

pub fn thank_you() -> &'static str {
    "Thank you for submitting your application! We'll review it and get back to you soon."
}

pub fn duplicate_email(email: &str, first: &FieldSpec) -> String {
    format!(
        "It looks like an application with the email {email} is already on file, so I \
couldn't submit this one. Let's start over with different details. {}",
        first.prompt
    )
}

pub fn submit_failed(last: &FieldSpec) -> String {
    format!(
        "There was an error saving your application, but I've kept your answers. \
Please send your {} again in a moment to retry the submission.",
        last.key.label()
    )
}

pub fn missing_information(first: &FieldSpec) -> String {
    format!(
        "Some required information is missing. Let's start again. {}",
        first.prompt
    )
}

pub fn service_unavailable() -> &'static str {
    "I'm sorry, I'm having trouble processing that right now. Please try again in a moment."
}

pub fn no_open_positions() -> &'static str {
    "There are no open positions right now. Please check back later, or say \"apply\" to \
leave your details with us."
}

pub fn job_board_unavailable() -> &'static str {
    "I'm sorry, I couldn't look up our open positions right now. Please try again shortly."
}

/// Plain listing used when the LLM cannot render the postings.
pub fn format_postings(postings: &[JobPosting]) -> String {
    let mut out = String::from("Here are the open positions matching your query:\n");
    for job in postings {
        out.push_str(&format!("\n• {}", job.title));
        if !job.location.is_empty() {
            out.push_str(&format!(" ({})", job.location));
        }
        if let Some(ref salary) = job.salary_range {
            out.push_str(&format!(", {salary}"));
        }
        if !job.description.is_empty() {
            out.push_str(&format!("\n  {}", job.description));
        }
        if !job.requirements.is_empty() {
            out.push_str(&format!("\n  Requirements: {}", job.requirements));
        }
        out.push('\n');
    }
    out.trim_end().to_string()
}
