//! LLM invocation capability
//!
//! Signature of the external generation transport the pipeline consumes.
//! Implementations must honor the adapter override and the cooperative
//! cancellation token; the pipeline itself never talks to a provider
//! directly.

use crate::adapters::DualPaths;
use crate::error::Result;
use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;

/// One prompt message
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    /// Message role ("system", "user", "assistant")
    pub role: String,
    /// Message content
    pub content: String,
}

impl ChatMessage {
    /// System-role message.
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    /// User-role message.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// Resolved reference to a fine-tuned adapter applied atop the base model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdapterRef {
    /// Adapter name
    pub name: String,
    /// Training date of the snapshot
    pub trained_on: NaiveDate,
    /// Storage path of the adapter weights
    pub path: PathBuf,
    /// History/recent pair, when the adapter is dual-paired
    pub dual: Option<DualPaths>,
}

/// Options for one generation call
#[derive(Debug, Clone, Default)]
pub struct GenerateOptions {
    /// Adapter to apply; `None` runs the base model
    pub adapter: Option<AdapterRef>,
    /// Sampling temperature override
    pub temperature: Option<f32>,
    /// Cooperative cancellation signal
    pub cancel: CancellationToken,
}

/// Result of one generation call
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Generation {
    /// Generated text
    pub text: String,
    /// Tokens consumed, when the provider reports it
    pub tokens_used: Option<u32>,
    /// Model id that served the call, when the provider reports it
    pub model: Option<String>,
}

/// External LLM invocation capability
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Generate a completion for the given role and messages.
    async fn generate(
        &self,
        role: &str,
        messages: &[ChatMessage],
        options: &GenerateOptions,
    ) -> Result<Generation>;
}
