//! Refiner: corrective rewrite pass
//!
//! Given the original text and the aggregated issues from failing
//! validators, asks the LLM for a minimal rewrite. When safety issues
//! exist the caller applies the deterministic sanitizer first; the
//! refiner then addresses remaining alignment/consistency issues on the
//! already-sanitized text.

use super::{Issue, RefinementResult};
use crate::error::Result;
use crate::llm::{ChatMessage, GenerateOptions, LlmClient};
use std::sync::Arc;

/// Refiner tuning
#[derive(Debug, Clone)]
pub struct RefinerConfig {
    /// Constrain the rewrite to preserve the original meaning
    pub preserve_meaning: bool,
    /// Sampling temperature for the rewrite
    pub temperature: f32,
}

impl Default for RefinerConfig {
    fn default() -> Self {
        Self {
            preserve_meaning: true,
            temperature: 0.3,
        }
    }
}

/// LLM-backed corrective rewriter
pub struct Refiner {
    llm: Arc<dyn LlmClient>,
    config: RefinerConfig,
}

impl Refiner {
    /// Refiner with default tuning.
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self::with_config(llm, RefinerConfig::default())
    }

    /// Refiner with explicit tuning.
    pub fn with_config(llm: Arc<dyn LlmClient>, config: RefinerConfig) -> Self {
        Self { llm, config }
    }

    /// Rewrite `text` to address `issues`, minimally.
    pub async fn refine(&self, text: &str, issues: &[Issue]) -> Result<RefinementResult> {
        if issues.is_empty() {
            return Ok(RefinementResult {
                changed: false,
                refined_text: text.to_string(),
                changes: Vec::new(),
                meaning_preserved: self.config.preserve_meaning,
            });
        }

        let mut issue_list = String::new();
        for issue in issues {
            issue_list.push_str(&format!("- {}", issue.description));
            if let Some(suggestion) = &issue.suggestion {
                issue_list.push_str(&format!(" (suggested fix: {})", suggestion));
            }
            issue_list.push('\n');
        }

        let constraint = if self.config.preserve_meaning {
            "Change as little as possible and preserve the original meaning exactly."
        } else {
            "Change as little as possible."
        };

        let messages = [
            ChatMessage::system(format!(
                "You rewrite a response to fix the listed problems. {} \
                 Output only the rewritten text, nothing else.",
                constraint
            )),
            ChatMessage::user(format!(
                "Problems to fix:\n{}\nOriginal response:\n{}",
                issue_list, text
            )),
        ];

        let options = GenerateOptions {
            temperature: Some(self.config.temperature),
            ..Default::default()
        };
        let generation = self.llm.generate("refiner", &messages, &options).await?;
        let refined = generation.text.trim().to_string();

        Ok(RefinementResult {
            changed: refined != text,
            refined_text: refined,
            changes: issues.iter().map(|i| i.description.clone()).collect(),
            meaning_preserved: self.config.preserve_meaning,
        })
    }
}
