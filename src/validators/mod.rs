//! Response validators and the refiner
//!
//! Each validator is an independent judge scoring one quality dimension
//! of a candidate response. Safety is pure pattern matching with a
//! deterministic sanitizer; value alignment and consistency consult the
//! LLM and return structured verdicts. The refiner applies one corrective
//! rewrite pass when validators fail.

mod alignment;
mod consistency;
mod refiner;
mod safety;

pub use alignment::ValueAlignmentValidator;
pub use consistency::ConsistencyValidator;
pub use refiner::{Refiner, RefinerConfig};
pub use safety::{default_safety_rules, SafetyRule, SafetyValidator};

use crate::config::Thresholds;
use crate::error::Result;
use crate::persona::PersonaProfile;
use crate::pipeline::types::Mode;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// One problem a validator found
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Issue {
    /// What is wrong
    pub description: String,
    /// Suggested fix, when the judge offers one
    #[serde(default)]
    pub suggestion: Option<String>,
}

impl Issue {
    /// Issue with no suggestion.
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            suggestion: None,
        }
    }

    /// Attach a suggested fix.
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }
}

/// A single validator's verdict on a response
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationVerdict {
    /// Whether the response met this validator's threshold
    pub pass: bool,
    /// Quality score in [0, 1]
    pub score: f32,
    /// Problems found
    #[serde(default)]
    pub issues: Vec<Issue>,
    /// Deterministically sanitized text (safety validator only)
    #[serde(default)]
    pub sanitized: Option<String>,
}

impl ValidationVerdict {
    /// Clean pass with a perfect score.
    pub fn clean() -> Self {
        Self {
            pass: true,
            score: 1.0,
            issues: Vec::new(),
            sanitized: None,
        }
    }

    /// Fail-open neutral verdict used when a judge was inconclusive
    /// (errored or timed out): treated as a benign pass, never blocking
    /// delivery.
    pub fn inconclusive(reason: impl Into<String>) -> Self {
        Self {
            pass: true,
            score: 0.5,
            issues: vec![Issue::new(format!("validator inconclusive: {}", reason.into()))],
            sanitized: None,
        }
    }
}

/// Ambient data validators judge against
#[derive(Clone)]
pub struct ValidationContext {
    /// Persona whose values/identity the response must match
    pub persona: PersonaProfile,
    /// The user message that prompted the response
    pub user_message: String,
    /// Operating mode
    pub mode: Mode,
    /// Per-validator score thresholds
    pub thresholds: Thresholds,
}

/// A pure scoring judge for one quality dimension
#[async_trait]
pub trait Validator: Send + Sync {
    /// Validator name, used in records and audit entries.
    fn name(&self) -> &'static str;

    /// Judge a candidate response.
    async fn validate(&self, response: &str, ctx: &ValidationContext)
        -> Result<ValidationVerdict>;
}

/// Outcome of a corrective rewrite pass
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefinementResult {
    /// Whether the text actually changed
    pub changed: bool,
    /// The rewritten text
    pub refined_text: String,
    /// Human-readable notes on what was addressed
    #[serde(default)]
    pub changes: Vec<String>,
    /// Whether the rewrite was constrained to preserve meaning
    pub meaning_preserved: bool,
}

/// Judge reply shape expected from LLM-backed validators
#[derive(Debug, Deserialize)]
pub(crate) struct JudgeReply {
    pub score: f32,
    #[serde(default)]
    pub issues: Vec<JudgeIssue>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct JudgeIssue {
    pub description: String,
    #[serde(default)]
    pub suggestion: Option<String>,
}

/// Extract and parse the first JSON object embedded in a judge's reply.
/// Judges are prompted to answer with bare JSON, but models wrap it in
/// prose often enough that we tolerate surrounding text.
pub(crate) fn parse_judge_reply(text: &str) -> Result<JudgeReply> {
    let start = text.find('{').ok_or_else(|| {
        crate::error::Error::Validation("judge reply contains no JSON object".to_string())
    })?;
    let end = text.rfind('}').ok_or_else(|| {
        crate::error::Error::Validation("judge reply contains no JSON object".to_string())
    })?;
    if end < start {
        return Err(crate::error::Error::Validation(
            "judge reply contains no JSON object".to_string(),
        ));
    }
    let reply: JudgeReply = serde_json::from_str(&text[start..=end])
        .map_err(|e| crate::error::Error::Validation(format!("malformed judge reply: {}", e)))?;
    Ok(JudgeReply {
        score: reply.score.clamp(0.0, 1.0),
        issues: reply.issues,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inconclusive_is_neutral_pass() {
        let verdict = ValidationVerdict::inconclusive("judge timed out");
        assert!(verdict.pass);
        assert_eq!(verdict.score, 0.5);
        assert_eq!(verdict.issues.len(), 1);
    }

    #[test]
    fn test_parse_judge_reply_bare_json() {
        let reply = parse_judge_reply(r#"{"score":0.4,"issues":[{"description":"too harsh"}]}"#)
            .unwrap();
        assert_eq!(reply.score, 0.4);
        assert_eq!(reply.issues.len(), 1);
        assert_eq!(reply.issues[0].description, "too harsh");
    }

    #[test]
    fn test_parse_judge_reply_wrapped_in_prose() {
        let reply = parse_judge_reply("Here is my verdict:\n{\"score\": 1.5}\nThanks!").unwrap();
        // Out-of-range scores are clamped
        assert_eq!(reply.score, 1.0);
        assert!(reply.issues.is_empty());
    }

    #[test]
    fn test_parse_judge_reply_garbage_rejected() {
        assert!(parse_judge_reply("no json here").is_err());
        assert!(parse_judge_reply("{not json}").is_err());
    }
}
