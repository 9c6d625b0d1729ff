//! The ordered intake form: which fields are collected, how each is asked
//! for, and what counts as a usable answer.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use super::model::SlotValue;

static EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9._%+\-]+@[A-Za-z0-9\-]+(\.[A-Za-z0-9\-]+)*\.[A-Za-z]{2,}$")
        .expect("email pattern is valid")
});

static FIRST_INTEGER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d+").expect("integer pattern is valid"));

const MAX_TEXT_LEN: usize = 500;
const MAX_EXPERIENCE_YEARS: u32 = 70;

/// Identity of an intake field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKey {
    Name,
    Email,
    Phone,
    ExperienceYears,
    CurrentRole,
    Skills,
}

impl FieldKey {
    /// Human wording used in re-prompts ("I still need your ...").
    pub fn label(&self) -> &'static str {
        match self {
            Self::Name => "full name",
            Self::Email => "email address",
            Self::Phone => "phone number",
            Self::ExperienceYears => "years of experience",
            Self::CurrentRole => "current role",
            Self::Skills => "key skills",
        }
    }
}

impl std::fmt::Display for FieldKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Name => "name",
            Self::Email => "email",
            Self::Phone => "phone",
            Self::ExperienceYears => "experience_years",
            Self::CurrentRole => "current_role",
            Self::Skills => "skills",
        };
        write!(f, "{s}")
    }
}

/// Shape check applied after the generic non-empty/denylist check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    Email,
    Phone,
    Years,
}

/// One entry of the form.
#[derive(Debug, Clone)]
pub struct FieldSpec {
    pub key: FieldKey,
    pub prompt: String,
    pub kind: FieldKind,
}

impl FieldSpec {
    pub fn new(key: FieldKey, kind: FieldKind, prompt: impl Into<String>) -> Self {
        Self {
            key,
            prompt: prompt.into(),
            kind,
        }
    }
}

/// Why a value was not accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    Empty,
    NonAnswer,
    Malformed(&'static str),
}

impl std::fmt::Display for Rejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Empty => write!(f, "empty value"),
            Self::NonAnswer => write!(f, "value is in the rejection set"),
            Self::Malformed(why) => write!(f, "{why}"),
        }
    }
}

/// Ordered, immutable list of required fields.
#[derive(Debug, Clone)]
pub struct FieldSchema {
    fields: Vec<FieldSpec>,
    reject_values: Vec<String>,
}

impl FieldSchema {
    /// Build a schema. Panics if `fields` is empty or repeats a key, since
    /// both are programming errors fixed at startup.
    pub fn new(fields: Vec<FieldSpec>, reject_values: Vec<String>) -> Self {
        assert!(!fields.is_empty(), "field schema must not be empty");
        for (i, spec) in fields.iter().enumerate() {
            assert!(
                !fields[..i].iter().any(|s| s.key == spec.key),
                "duplicate field {} in schema",
                spec.key
            );
        }
        let reject_values = reject_values
            .into_iter()
            .map(|v| v.trim().to_lowercase())
            .collect();
        Self {
            fields,
            reject_values,
        }
    }

    /// The candidate application form.
    pub fn recruiting(reject_values: Vec<String>) -> Self {
        use FieldKey::*;
        Self::new(
            vec![
                FieldSpec::new(Name, FieldKind::Text, "Could you please tell me your full name?"),
                FieldSpec::new(Email, FieldKind::Email, "What's your email address?"),
                FieldSpec::new(Phone, FieldKind::Phone, "What's your phone number?"),
                FieldSpec::new(
                    ExperienceYears,
                    FieldKind::Years,
                    "How many years of experience do you have?",
                ),
                FieldSpec::new(CurrentRole, FieldKind::Text, "What is your current role?"),
                FieldSpec::new(
                    Skills,
                    FieldKind::Text,
                    "What are your key skills and technologies you're proficient in?",
                ),
            ],
            reject_values,
        )
    }

    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    pub fn first(&self) -> &FieldSpec {
        &self.fields[0]
    }

    pub fn get(&self, key: FieldKey) -> Option<&FieldSpec> {
        self.fields.iter().find(|s| s.key == key)
    }

    /// The field after `key` in schema order, or `None` when exhausted.
    pub fn next_after(&self, key: FieldKey) -> Option<&FieldSpec> {
        let idx = self.fields.iter().position(|s| s.key == key)?;
        self.fields.get(idx + 1)
    }

    /// Whether `value` is a non-answer ("n/a", "unknown", ...).
    pub fn is_rejected(&self, value: &str) -> bool {
        let normalized = value.trim().to_lowercase();
        normalized.is_empty() || self.reject_values.iter().any(|r| *r == normalized)
    }

    /// Validate and normalize a raw value for `key`.
    pub fn validate(&self, key: FieldKey, raw: &str) -> Result<SlotValue, Rejection> {
        let value = raw.trim();
        if value.is_empty() {
            return Err(Rejection::Empty);
        }
        if self.is_rejected(value) {
            return Err(Rejection::NonAnswer);
        }
        let kind = self.get(key).map(|s| s.kind).unwrap_or(FieldKind::Text);

        match kind {
            FieldKind::Text => {
                if !value.chars().any(char::is_alphanumeric) {
                    return Err(Rejection::Malformed("no letters or digits"));
                }
                if value.chars().count() > MAX_TEXT_LEN {
                    return Err(Rejection::Malformed("too long"));
                }
                Ok(SlotValue::Text(value.to_string()))
            }
            FieldKind::Email => {
                if EMAIL_RE.is_match(value) {
                    Ok(SlotValue::Text(value.to_lowercase()))
                } else {
                    Err(Rejection::Malformed("not an email address"))
                }
            }
            FieldKind::Phone => {
                let allowed = |c: char| c.is_ascii_digit() || "+-(). ".contains(c);
                if !value.chars().all(allowed) {
                    return Err(Rejection::Malformed("unexpected characters in phone number"));
                }
                let digits = value.chars().filter(char::is_ascii_digit).count();
                if (7..=15).contains(&digits) {
                    Ok(SlotValue::Text(value.to_string()))
                } else {
                    Err(Rejection::Malformed("phone number needs 7 to 15 digits"))
                }
            }
            FieldKind::Years => {
                let years = FIRST_INTEGER_RE
                    .find(value)
                    .and_then(|m| m.as_str().parse::<u32>().ok())
                    .ok_or(Rejection::Malformed("no number of years"))?;
                if years > MAX_EXPERIENCE_YEARS {
                    return Err(Rejection::Malformed("implausible number of years"));
                }
                Ok(SlotValue::Number(years))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_REJECT_VALUES;

    fn schema() -> FieldSchema {
        FieldSchema::recruiting(DEFAULT_REJECT_VALUES.iter().map(|s| s.to_string()).collect())
    }

    #[test]
    fn order_walks_all_fields() {
        use FieldKey::*;
        let schema = schema();
        let expected = [Email, Phone, ExperienceYears, CurrentRole, Skills];
        let mut current = schema.first().key;
        assert_eq!(current, Name);
        for expected_next in expected {
            let next = schema.next_after(current).unwrap().key;
            assert_eq!(next, expected_next);
            current = next;
        }
        assert!(schema.next_after(current).is_none());
    }

    #[test]
    fn rejection_set_is_case_insensitive() {
        let schema = schema();
        assert_eq!(schema.validate(FieldKey::Phone, "N/A"), Err(Rejection::NonAnswer));
        assert_eq!(schema.validate(FieldKey::Name, " Unknown "), Err(Rejection::NonAnswer));
        assert_eq!(schema.validate(FieldKey::Name, "   "), Err(Rejection::Empty));
    }

    #[test]
    fn email_is_checked_and_lowercased() {
        let schema = schema();
        assert_eq!(
            schema.validate(FieldKey::Email, "John.Doe@Example.com"),
            Ok(SlotValue::Text("john.doe@example.com".into()))
        );
        assert!(schema.validate(FieldKey::Email, "john at example").is_err());
        assert!(schema.validate(FieldKey::Email, "john@localhost").is_err());
    }

    #[test]
    fn phone_needs_enough_digits() {
        let schema = schema();
        assert!(schema.validate(FieldKey::Phone, "+1 (555) 123-4567").is_ok());
        assert!(schema.validate(FieldKey::Phone, "555-12").is_err());
        assert!(schema.validate(FieldKey::Phone, "call me maybe").is_err());
    }

    #[test]
    fn years_take_first_integer() {
        let schema = schema();
        assert_eq!(
            schema.validate(FieldKey::ExperienceYears, "about 5 years"),
            Ok(SlotValue::Number(5))
        );
        assert_eq!(schema.validate(FieldKey::ExperienceYears, "0"), Ok(SlotValue::Number(0)));
        assert!(schema.validate(FieldKey::ExperienceYears, "a few").is_err());
        assert!(schema.validate(FieldKey::ExperienceYears, "250").is_err());
    }

    #[test]
    fn text_requires_alphanumerics() {
        let schema = schema();
        assert!(schema.validate(FieldKey::Skills, "Rust, Go").is_ok());
        assert!(schema.validate(FieldKey::Skills, "???").is_err());
    }

    #[test]
    fn display_matches_serde() {
        use FieldKey::*;
        for key in [Name, Email, Phone, ExperienceYears, CurrentRole, Skills] {
            let json = serde_json::to_string(&key).unwrap();
            assert_eq!(format!("\"{key}\""), json, "Display and serde should match for {key:?}");
        }
    }

    #[test]
    #[should_panic(expected = "duplicate field")]
    fn duplicate_fields_are_rejected() {
        FieldSchema::new(
            vec![
                FieldSpec::new(FieldKey::Name, FieldKind::Text, "a"),
                FieldSpec::new(FieldKey::Name, FieldKind::Text, "b"),
            ],
            vec![],
        );
    }
}
