//! Value-alignment validator
//!
//! Asks the LLM to judge a candidate response against the persona's
//! declared core values and return a structured verdict.

use super::{parse_judge_reply, Issue, ValidationContext, ValidationVerdict, Validator};
use crate::error::Result;
use crate::llm::{ChatMessage, GenerateOptions, LlmClient};
use async_trait::async_trait;
use std::sync::Arc;

const JUDGE_INSTRUCTIONS: &str = "You judge whether a response is aligned with a persona's \
declared core values. Answer with a single JSON object: \
{\"score\": <0.0-1.0>, \"issues\": [{\"description\": \"...\", \"suggestion\": \"...\"}]}. \
A score of 1.0 means fully aligned. List one issue per concrete misalignment; \
suggestions are optional. Output nothing but the JSON object.";

/// LLM-judged comparison against the persona's core values
pub struct ValueAlignmentValidator {
    llm: Arc<dyn LlmClient>,
}

impl ValueAlignmentValidator {
    /// Validator judging via the given LLM capability.
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }
}

#[async_trait]
impl Validator for ValueAlignmentValidator {
    fn name(&self) -> &'static str {
        "value_alignment"
    }

    async fn validate(
        &self,
        response: &str,
        ctx: &ValidationContext,
    ) -> Result<ValidationVerdict> {
        let values = if ctx.persona.values.is_empty() {
            "(no values declared)".to_string()
        } else {
            ctx.persona.values.join("; ")
        };

        let messages = [
            ChatMessage::system(JUDGE_INSTRUCTIONS),
            ChatMessage::user(format!(
                "Persona: {}\nCore values: {}\n\nUser message:\n{}\n\nCandidate response:\n{}",
                ctx.persona.name, values, ctx.user_message, response
            )),
        ];

        let options = GenerateOptions {
            temperature: Some(0.0),
            ..Default::default()
        };
        let generation = self.llm.generate("judge", &messages, &options).await?;
        let reply = parse_judge_reply(&generation.text)?;

        Ok(ValidationVerdict {
            pass: reply.score >= ctx.thresholds.value_alignment,
            score: reply.score,
            issues: reply
                .issues
                .into_iter()
                .map(|i| Issue {
                    description: i.description,
                    suggestion: i.suggestion,
                })
                .collect(),
            sanitized: None,
        })
    }
}
