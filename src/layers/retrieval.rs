//! Retrieval layer
//!
//! Queries the external context-retrieval capability with mode-tuned
//! search options and packages the hits for the generation layer. Intent
//! detection widens introspective queries to include inner dialogue and
//! reflections at a lower similarity threshold.

use crate::error::{Error, Result};
use crate::memory::{ContextRetrieval, SearchDepth, SearchOptions};
use crate::pipeline::layer::Layer;
use crate::pipeline::types::{DataKind, LayerContext, LayerData, Mode, RetrievalOutput};
use async_trait::async_trait;
use regex::Regex;
use std::sync::Arc;

const INTROSPECTIVE_PATTERN: &str = r"(?i)\b(reflect(?:ed|ing|ion|ions)?|inner\s+(?:voice|dialogue|monologue|thoughts)|journal(?:ed|ing)?|dream(?:s|ed|t)?|been\s+thinking|thought\s+about|remember\s+when|how\s+do\s+you\s+feel|what\s+do\s+you\s+think\s+about\s+yourself)\b";

/// Context retrieval with mode-tuned depth and filtering
pub struct RetrievalLayer {
    retrieval: Arc<dyn ContextRetrieval>,
    introspective: Regex,
}

impl RetrievalLayer {
    /// Layer backed by the given retrieval capability.
    pub fn new(retrieval: Arc<dyn ContextRetrieval>) -> Result<Self> {
        let introspective = Regex::new(INTROSPECTIVE_PATTERN)
            .map_err(|e| Error::Retrieval(format!("introspective pattern: {}", e)))?;
        Ok(Self {
            retrieval,
            introspective,
        })
    }

    /// Whether the message asks about the persona's inner life.
    pub fn is_introspective(&self, message: &str) -> bool {
        self.introspective.is_match(message)
    }

    /// Search options for this mode and message.
    pub fn options_for(&self, mode: Mode, message: &str) -> SearchOptions {
        let mut options = match mode {
            Mode::Dual => SearchOptions {
                search_depth: SearchDepth::Deep,
                similarity_threshold: 0.35,
                max_memories: 20,
                ..Default::default()
            },
            Mode::Agent => SearchOptions::default(),
            Mode::Emulation => SearchOptions {
                search_depth: SearchDepth::Shallow,
                similarity_threshold: 0.55,
                max_memories: 5,
                ..Default::default()
            },
        };

        if self.is_introspective(message) {
            options.similarity_threshold = (options.similarity_threshold - 0.1).max(0.0);
            options.filter_inner_dialogue = true;
            options.filter_reflections = true;
            options.force_semantic_search = true;
        }

        options
    }
}

#[async_trait]
impl Layer for RetrievalLayer {
    fn name(&self) -> &str {
        "retrieval"
    }

    fn input_kind(&self) -> DataKind {
        DataKind::Message
    }

    fn output_kind(&self) -> DataKind {
        DataKind::Context
    }

    fn validate(&self, _input: &LayerData, ctx: &LayerContext) -> Result<()> {
        if ctx.user_message.trim().is_empty() {
            return Err(Error::InvalidInput {
                layer: "retrieval".to_string(),
                reason: "empty user message".to_string(),
            });
        }
        Ok(())
    }

    async fn process(&self, _input: LayerData, ctx: &LayerContext) -> Result<LayerData> {
        if ctx.cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let options = self.options_for(ctx.mode, &ctx.user_message);
        tracing::debug!(
            mode = %ctx.mode,
            depth = ?options.search_depth,
            threshold = options.similarity_threshold,
            "searching context"
        );

        let package = self
            .retrieval
            .search(&ctx.user_message, ctx.mode, &options)
            .await
            .map_err(|e| Error::Retrieval(e.to_string()))?;

        let mut memories = package.memories;
        memories.sort_by(|a, b| b.score.total_cmp(&a.score));
        memories.truncate(options.max_memories);

        Ok(LayerData::Context(RetrievalOutput {
            memory_count: memories.len(),
            memories,
            index_status: package.index_status,
        }))
    }
}
