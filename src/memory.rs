//! Context retrieval capability
//!
//! Signature of the external memory/vector-search engine the retrieval
//! layer delegates to. The engine itself (indexing, embeddings, storage)
//! is an external collaborator; this module only fixes the contract.

use crate::error::Result;
use crate::pipeline::types::Mode;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// How deep the search engine should look
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchDepth {
    /// Cheap top-level lookup
    Shallow,
    /// Default search
    Normal,
    /// Exhaustive multi-index search
    Deep,
}

/// Options for one context search
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchOptions {
    /// Search depth
    pub search_depth: SearchDepth,
    /// Minimum similarity for a hit, in [0, 1]
    pub similarity_threshold: f32,
    /// Hard cap on returned memories
    pub max_memories: usize,
    /// Include inner-dialogue memories
    pub filter_inner_dialogue: bool,
    /// Include reflection memories
    pub filter_reflections: bool,
    /// Bypass keyword shortcuts and force semantic search
    pub force_semantic_search: bool,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            search_depth: SearchDepth::Normal,
            similarity_threshold: 0.45,
            max_memories: 10,
            filter_inner_dialogue: false,
            filter_reflections: false,
            force_semantic_search: false,
        }
    }
}

/// Kind of a stored memory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryKind {
    /// Past conversation turn
    Conversation,
    /// Internal monologue the assistant produced on its own
    InnerDialogue,
    /// Periodic self-reflection
    Reflection,
    /// Extracted fact
    Fact,
}

/// One retrieved memory
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryItem {
    /// Memory kind
    #[serde(rename = "type")]
    pub kind: MemoryKind,
    /// Stable memory id
    pub id: String,
    /// Memory content
    pub content: String,
    /// Similarity score, in [0, 1]
    pub score: f32,
}

/// State of the backing memory index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexStatus {
    /// Index is current and served the query
    Ready,
    /// Index is rebuilding; results may be partial
    Building,
    /// Index was unreachable; results are empty or keyword-only
    Unavailable,
}

/// A retrieved context bundle
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextPackage {
    /// Retrieved memories, highest score first
    pub memories: Vec<MemoryItem>,
    /// Index state at query time
    pub index_status: IndexStatus,
}

/// External context-retrieval capability
#[async_trait]
pub trait ContextRetrieval: Send + Sync {
    /// Search memories relevant to `query` under the given mode and options.
    async fn search(&self, query: &str, mode: Mode, options: &SearchOptions)
        -> Result<ContextPackage>;
}
