//! Shared pipeline types
//!
//! Defines the operating mode, the per-request `LayerContext`, the typed
//! inter-layer value (`LayerData`), and the execution records the executor
//! accumulates into a `PipelineResult`. All wire types use camelCase JSON
//! serialization.

use crate::config::ConfigSnapshot;
use crate::llm::AdapterRef;
use crate::memory::{IndexStatus, MemoryItem};
use crate::validators::{RefinementResult, ValidationVerdict};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Operating mode, controlling autonomy, validation and learning depth
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    /// Full-depth mode: deep retrieval, paired adapters, full validation
    Dual,
    /// Cheap task mode: latest adapter, safety-only validation
    Agent,
    /// Read-only historical replay: snapshot adapters, no validation
    Emulation,
}

impl Mode {
    /// All modes, in a stable order
    pub fn all() -> [Mode; 3] {
        [Mode::Dual, Mode::Agent, Mode::Emulation]
    }
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Dual => write!(f, "dual"),
            Self::Agent => write!(f, "agent"),
            Self::Emulation => write!(f, "emulation"),
        }
    }
}

impl std::str::FromStr for Mode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "dual" => Ok(Self::Dual),
            "agent" => Ok(Self::Agent),
            "emulation" => Ok(Self::Emulation),
            other => Err(format!("unknown mode: {}", other)),
        }
    }
}

/// Input to a pipeline execution
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineInput {
    /// The user's message
    pub user_message: String,
    /// Session identifier, if the caller tracks one
    #[serde(default)]
    pub session_id: Option<String>,
    /// Message being replied to, for threaded context
    #[serde(default)]
    pub reply_to: Option<String>,
    /// Prior tool/operator results to fold into the prompt
    #[serde(default)]
    pub operator_result: Option<serde_json::Value>,
    /// Requested adapter snapshot date (emulation mode only)
    #[serde(default)]
    pub snapshot_date: Option<NaiveDate>,
}

impl PipelineInput {
    /// Convenience constructor from a bare user message.
    pub fn from_message(message: impl Into<String>) -> Self {
        Self {
            user_message: message.into(),
            ..Default::default()
        }
    }
}

/// Per-request ambient data shared with every layer.
///
/// Created once per pipeline call and discarded after completion. Carries
/// the cancellation signal every layer must check before expensive work.
#[derive(Clone)]
pub struct LayerContext {
    /// Operating mode for this request
    pub mode: Mode,
    /// Unique id for this pipeline execution
    pub request_id: Uuid,
    /// Caller session id, if any
    pub session_id: Option<String>,
    /// The original user message
    pub user_message: String,
    /// Reply-to context, if any
    pub reply_to: Option<String>,
    /// Prior operator/tool results, if any
    pub operator_result: Option<serde_json::Value>,
    /// Requested adapter snapshot date (emulation)
    pub snapshot_date: Option<NaiveDate>,
    /// Cooperative cancellation signal
    pub cancel: CancellationToken,
    /// Configuration snapshot pinned for this execution; a reload landing
    /// mid-run never changes what this context resolves
    pub config: Arc<ConfigSnapshot>,
}

impl LayerContext {
    /// Build a context for one execution of the pipeline.
    pub fn new(
        mode: Mode,
        input: &PipelineInput,
        config: Arc<ConfigSnapshot>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            mode,
            request_id: Uuid::new_v4(),
            session_id: input.session_id.clone(),
            user_message: input.user_message.clone(),
            reply_to: input.reply_to.clone(),
            operator_result: input.operator_result.clone(),
            snapshot_date: input.snapshot_date,
            cancel,
            config,
        }
    }
}

/// Kind tag for the inter-layer value contract.
///
/// Layer N's output kind must be accepted by layer N+1; the chain is
/// checked when the pipeline is built, not per call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataKind {
    /// Raw pipeline input
    Message,
    /// Retrieved memory context
    Context,
    /// Generated draft response
    Draft,
    /// Validated (final) response
    Validated,
}

impl std::fmt::Display for DataKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Message => write!(f, "message"),
            Self::Context => write!(f, "context"),
            Self::Draft => write!(f, "draft"),
            Self::Validated => write!(f, "validated"),
        }
    }
}

/// Output of the retrieval layer
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetrievalOutput {
    /// Retrieved memories, highest score first
    pub memories: Vec<MemoryItem>,
    /// Number of memories retrieved
    pub memory_count: usize,
    /// State of the backing memory index
    pub index_status: IndexStatus,
}

/// Voice-consistency metadata recorded by the generation layer.
///
/// Consumed by later analysis, not enforced here.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptMetadata {
    /// Name of the adapter used, if any
    pub adapter_name: Option<String>,
    /// Training date of the adapter used, if any
    pub adapter_date: Option<NaiveDate>,
    /// Model id reported by the LLM capability
    pub model: Option<String>,
    /// Length of the generated response in characters
    pub response_length: usize,
    /// Number of memories folded into the prompt
    pub memory_count: usize,
    /// Generation timestamp
    pub generated_at: DateTime<Utc>,
}

/// Output of the generation layer
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationOutput {
    /// The generated draft response
    pub response: String,
    /// Adapter applied during generation, if any
    pub lora_adapter: Option<AdapterRef>,
    /// Voice-consistency metadata
    pub prompt_metadata: PromptMetadata,
}

/// Output of the validation layer (the pipeline's final shape)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidatedOutput {
    /// Final response text
    pub response: String,
    /// Whether any validation ran
    pub validated: bool,
    /// Whether the response passed validation (post-refinement)
    pub passed_validation: bool,
    /// Safety verdict, when the safety validator ran
    pub safety: Option<ValidationVerdict>,
    /// Value-alignment verdict, when that validator ran
    pub value_alignment: Option<ValidationVerdict>,
    /// Consistency verdict, when that validator ran
    pub consistency: Option<ValidationVerdict>,
    /// Refinement outcome, when the refiner ran
    pub refinement: Option<RefinementResult>,
}

/// The typed value handed from one layer to the next
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "kind", content = "data")]
pub enum LayerData {
    /// Raw pipeline input
    Message(PipelineInput),
    /// Retrieved memory context
    Context(RetrievalOutput),
    /// Generated draft
    Draft(GenerationOutput),
    /// Validated final output
    Validated(ValidatedOutput),
}

impl LayerData {
    /// Kind tag of this value
    pub fn kind(&self) -> DataKind {
        match self {
            Self::Message(_) => DataKind::Message,
            Self::Context(_) => DataKind::Context,
            Self::Draft(_) => DataKind::Draft,
            Self::Validated(_) => DataKind::Validated,
        }
    }

    /// The response text carried by this value, if it carries one.
    pub fn response_text(&self) -> Option<&str> {
        match self {
            Self::Draft(d) => Some(&d.response),
            Self::Validated(v) => Some(&v.response),
            _ => None,
        }
    }
}

/// Status of a single layer execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LayerStatus {
    /// Layer processed its input and produced output
    Success,
    /// Layer returned an error
    Failed,
    /// Layer was skipped (precondition unmet on a non-fatal layer)
    Skipped,
    /// Layer exceeded its configured timeout
    Timeout,
    /// Cancellation tripped before the layer ran
    Cancelled,
}

/// Record of one layer's execution within a pipeline run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayerExecutionRecord {
    /// Layer name
    pub layer: String,
    /// Layer version
    pub version: String,
    /// Outcome
    pub status: LayerStatus,
    /// Wall time spent in this layer, milliseconds
    pub elapsed_ms: u64,
    /// Error detail for failed/timeout records
    pub error: Option<String>,
    /// Arbitrary per-layer metadata
    #[serde(default)]
    pub metadata: serde_json::Value,
}

/// Overall status of a pipeline run that returned a result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStatus {
    /// Every enabled layer succeeded
    Completed,
    /// One or more non-fatal layers failed, timed out or were skipped
    Degraded,
    /// Cancellation stopped the run partway through
    Cancelled,
}

/// Final output of a pipeline execution. Immutable once returned.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineResult {
    /// Output of the last layer that produced one
    pub output: LayerData,
    /// Ordered per-layer execution records
    pub layers: Vec<LayerExecutionRecord>,
    /// Total elapsed time, milliseconds
    pub elapsed_ms: u64,
    /// Overall status
    pub status: PipelineStatus,
}

impl PipelineResult {
    /// Final response text, if the run got far enough to produce one.
    pub fn response(&self) -> Option<&str> {
        self.output.response_text()
    }

    /// The record for a named layer, if it ran.
    pub fn record(&self, layer: &str) -> Option<&LayerExecutionRecord> {
        self.layers.iter().find(|r| r.layer == layer)
    }
}
