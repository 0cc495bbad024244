//! Consistency validator
//!
//! Asks the LLM to judge a candidate response against the persona's
//! established identity, tone and style, flagging contradictions.

use super::{parse_judge_reply, Issue, ValidationContext, ValidationVerdict, Validator};
use crate::error::Result;
use crate::llm::{ChatMessage, GenerateOptions, LlmClient};
use async_trait::async_trait;
use std::sync::Arc;

const JUDGE_INSTRUCTIONS: &str = "You judge whether a response is consistent with a persona's \
established identity, tone and communication style. Flag contradictions of stated traits, \
goals or style. Answer with a single JSON object: \
{\"score\": <0.0-1.0>, \"issues\": [{\"description\": \"...\", \"suggestion\": \"...\"}]}. \
Output nothing but the JSON object.";

/// LLM-judged comparison against established identity/tone/style
pub struct ConsistencyValidator {
    llm: Arc<dyn LlmClient>,
}

impl ConsistencyValidator {
    /// Validator judging via the given LLM capability.
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }
}

#[async_trait]
impl Validator for ConsistencyValidator {
    fn name(&self) -> &'static str {
        "consistency"
    }

    async fn validate(
        &self,
        response: &str,
        ctx: &ValidationContext,
    ) -> Result<ValidationVerdict> {
        let persona = &ctx.persona;
        let identity = format!(
            "Persona: {}\nTraits: {}\nGoals: {}\nCommunication style: {}",
            persona.name,
            persona.traits.join(", "),
            persona.goals.join(", "),
            persona.communication_style
        );

        let messages = [
            ChatMessage::system(JUDGE_INSTRUCTIONS),
            ChatMessage::user(format!(
                "{}\n\nUser message:\n{}\n\nCandidate response:\n{}",
                identity, ctx.user_message, response
            )),
        ];

        let options = GenerateOptions {
            temperature: Some(0.0),
            ..Default::default()
        };
        let generation = self.llm.generate("judge", &messages, &options).await?;
        let reply = parse_judge_reply(&generation.text)?;

        Ok(ValidationVerdict {
            pass: reply.score >= ctx.thresholds.consistency,
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
