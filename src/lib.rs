//! MetaHuman - Cognitive Layer Pipeline for a Digital Personality
//!
//! MetaHuman turns a user message into a persona-voiced, validated
//! response through a mode-aware chain of processing layers. The persona,
//! the LLM, and the memory engine are external capabilities injected at
//! assembly time; this crate owns the orchestration.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                      Cognitive Pipeline                          │
//! │                                                                  │
//! │  PipelineInput (message)                                         │
//! │        │                                                         │
//! │  ┌─────▼──────────┐  mode-tuned depth, introspection widening    │
//! │  │   Retrieval    │  → RetrievalOutput (context)                 │
//! │  └─────┬──────────┘                                              │
//! │  ┌─────▼──────────┐  persona + adapter selection + prompt        │
//! │  │   Generation   │  → GenerationOutput (draft)        [fatal]   │
//! │  └─────┬──────────┘                                              │
//! │  ┌─────▼──────────┐  full / safety-only / none, per mode         │
//! │  │   Validation   │  → ValidatedOutput (final)                   │
//! │  └─────┬──────────┘                                              │
//! │        ▼                                                         │
//! │  PipelineResult (output + per-layer records)                     │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Three operating modes share one set of layer implementations:
//!
//! - **dual**: deep retrieval, paired LoRA adapters, full validation
//!   with one-shot refinement
//! - **agent**: default retrieval, latest adapter, safety-only screening
//! - **emulation**: shallow retrieval against a historical adapter
//!   snapshot, no validation, strictly read-only
//!
//! Configuration is an immutable snapshot swapped atomically on reload;
//! an execution in flight never observes a torn config. Every layer
//! outcome is recorded and audited.
//!
//! ## Example
//!
//! ```no_run
//! use metahuman::adapters::AdapterRegistry;
//! use metahuman::audit::AuditLogger;
//! use metahuman::config::ConfigLoader;
//! use metahuman::layers::{GenerationLayer, RetrievalLayer, ValidationLayer};
//! use metahuman::pipeline::{Mode, PipelineBuilder, PipelineInput};
//! use std::sync::Arc;
//!
//! # async fn build(
//! #     llm: Arc<dyn metahuman::llm::LlmClient>,
//! #     engine: Arc<dyn metahuman::memory::ContextRetrieval>,
//! #     personas: Arc<dyn metahuman::persona::PersonaProvider>,
//! # ) -> metahuman::Result<()> {
//! let config = Arc::new(ConfigLoader::new());
//! let audit = AuditLogger::to_tracing();
//! let registry = Arc::new(AdapterRegistry::new(vec![AdapterRegistry::default_root()]));
//!
//! let pipeline = PipelineBuilder::new(config)
//!     .audit(audit.clone())
//!     .layer(Arc::new(RetrievalLayer::new(engine)?))?
//!     .layer(Arc::new(GenerationLayer::new(
//!         registry, llm.clone(), personas.clone(), audit.clone(),
//!     )))?
//!     .layer(Arc::new(ValidationLayer::new(llm, personas, audit)?))?
//!     .build()?;
//!
//! let result = pipeline
//!     .execute(Mode::Dual, PipelineInput::from_message("how was your week?"))
//!     .await?;
//! println!("{}", result.response().unwrap_or(""));
//! # Ok(())
//! # }
//! ```

pub mod adapters;
pub mod audit;
pub mod config;
pub mod error;
pub mod layers;
pub mod llm;
pub mod memory;
pub mod persona;
pub mod pipeline;
pub mod validators;

pub use error::{Error, Result};
pub use pipeline::{Mode, PipelineInput, PipelineResult};
