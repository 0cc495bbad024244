//! Generation layer
//!
//! Resolves the persona, selects a LoRA adapter under the mode policy,
//! assembles the prompt and calls the LLM capability. The only fatal
//! layer in the default pipeline: with no draft there is nothing for the
//! rest of the chain to work on. An adapter-loaded generation failure is
//! retried once against the base model before giving up.

use crate::adapters::AdapterRegistry;
use crate::audit::{AuditEntry, AuditLevel, AuditLogger};
use crate::error::{Error, Result};
use crate::layers::prompt::PromptBuilder;
use crate::llm::{GenerateOptions, LlmClient};
use crate::memory::MemoryItem;
use crate::pipeline::layer::Layer;
use crate::pipeline::types::{
    DataKind, GenerationOutput, LayerContext, LayerData, Mode, PromptMetadata,
};
use crate::persona::PersonaProvider;
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;

/// Persona-voiced draft generation
pub struct GenerationLayer {
    registry: Arc<AdapterRegistry>,
    llm: Arc<dyn LlmClient>,
    personas: Arc<dyn PersonaProvider>,
    prompts: PromptBuilder,
    audit: AuditLogger,
}

impl GenerationLayer {
    /// Layer wired to the given capabilities.
    pub fn new(
        registry: Arc<AdapterRegistry>,
        llm: Arc<dyn LlmClient>,
        personas: Arc<dyn PersonaProvider>,
        audit: AuditLogger,
    ) -> Self {
        Self {
            registry,
            llm,
            personas,
            prompts: PromptBuilder::new(),
            audit,
        }
    }
}

#[async_trait]
impl Layer for GenerationLayer {
    fn name(&self) -> &str {
        "generation"
    }

    fn input_kind(&self) -> DataKind {
        DataKind::Context
    }

    fn output_kind(&self) -> DataKind {
        DataKind::Draft
    }

    // Accepts the raw message too, so a degraded run without retrieval
    // still generates (with an empty context).
    fn accepts(&self, kind: DataKind) -> bool {
        kind == DataKind::Context || kind == DataKind::Message
    }

    // Retrieval checks this too, but retrieval is non-fatal and may be
    // skipped or disabled. Generation is where a blank message must
    // actually stop the run.
    fn validate(&self, _input: &LayerData, ctx: &LayerContext) -> Result<()> {
        if ctx.user_message.trim().is_empty() {
            return Err(Error::InvalidInput {
                layer: "generation".to_string(),
                reason: "empty user message".to_string(),
            });
        }
        Ok(())
    }

    async fn process(&self, input: LayerData, ctx: &LayerContext) -> Result<LayerData> {
        if ctx.cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let memories: Vec<MemoryItem> = match input {
            LayerData::Context(context) => context.memories,
            _ => Vec::new(),
        };

        let persona = self
            .personas
            .profile(None)
            .await
            .map_err(|e| Error::Persona(e.to_string()))?;

        let requested = match ctx.mode {
            Mode::Emulation => ctx.snapshot_date,
            _ => None,
        };
        let selection = self.registry.select(ctx.mode, requested, &self.audit).await;
        let adapter = selection.adapter.as_ref().map(|a| a.to_ref());

        let messages = self.prompts.build(&persona, &memories, ctx);
        let options = GenerateOptions {
            adapter: adapter.clone(),
            temperature: None,
            cancel: ctx.cancel.clone(),
        };

        let (generation, used_adapter) =
            match self.llm.generate("persona", &messages, &options).await {
                Ok(generation) => (generation, adapter),
                Err(e) if adapter.is_some() => {
                    tracing::warn!(
                        adapter = %adapter.as_ref().map(|a| a.name.as_str()).unwrap_or(""),
                        "adapter-loaded generation failed, retrying with base model: {}",
                        e
                    );
                    self.audit.record(
                        AuditEntry::new(AuditLevel::Warn, "generation", "base_model_retry")
                            .actor("generation")
                            .detail("mode", ctx.mode.to_string())
                            .detail("error", e.to_string()),
                    );
                    let base_options = GenerateOptions {
                        adapter: None,
                        temperature: None,
                        cancel: ctx.cancel.clone(),
                    };
                    let generation = self
                        .llm
                        .generate("persona", &messages, &base_options)
                        .await
                        .map_err(|e| Error::Generation(e.to_string()))?;
                    (generation, None)
                }
                Err(e) => return Err(Error::Generation(e.to_string())),
            };

        let metadata = PromptMetadata {
            adapter_name: used_adapter.as_ref().map(|a| a.name.clone()),
            adapter_date: used_adapter.as_ref().map(|a| a.trained_on),
            model: generation.model.clone(),
            response_length: generation.text.len(),
            memory_count: memories.len(),
            generated_at: Utc::now(),
        };

        Ok(LayerData::Draft(GenerationOutput {
            response: generation.text,
            lora_adapter: used_adapter,
            prompt_metadata: metadata,
        }))
    }

    async fn finalize(&self, output: &LayerData, ctx: &LayerContext) -> Result<()> {
        if let LayerData::Draft(draft) = output {
            self.audit.record(
                AuditEntry::new(AuditLevel::Info, "generation", "draft_produced")
                    .actor("generation")
                    .detail("mode", ctx.mode.to_string())
                    .detail(
                        "adapter",
                        draft
                            .lora_adapter
                            .as_ref()
                            .map(|a| a.name.clone())
                            .unwrap_or_else(|| "base".to_string()),
                    )
                    .detail("responseLength", draft.prompt_metadata.response_length as u64)
                    .detail("memoryCount", draft.prompt_metadata.memory_count as u64),
            );
        }
        Ok(())
    }
}
