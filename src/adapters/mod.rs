//! Fine-tuned adapter discovery and selection
//!
//! Adapters are parameter deltas applied atop the base model to express
//! the learned voice. The offline training pipeline (an external
//! collaborator) drops them into date-named snapshot directories
//! (`YYYY-MM-DD`), optionally split into a `history`/`recent` dual pair
//! loaded together. This module discovers those snapshots and selects one
//! per operating mode.

mod registry;

pub use registry::{AdapterRegistry, AdapterSelection};

use crate::llm::AdapterRef;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// History/recent component paths of a dual-paired adapter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DualPaths {
    /// Long-horizon component
    pub history: PathBuf,
    /// Recent-experience component
    pub recent: PathBuf,
}

/// Metadata for one discovered adapter snapshot. Read-only once
/// discovered; re-discovery replaces the whole listing atomically.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdapterMetadata {
    /// Adapter name
    pub name: String,
    /// Training date (the snapshot directory name)
    pub trained_on: NaiveDate,
    /// Snapshot directory
    pub path: PathBuf,
    /// Dual pair, when both components are present
    pub dual: Option<DualPaths>,
    /// Whether the snapshot passed validity checks
    pub valid: bool,
}

impl AdapterMetadata {
    /// Whether this snapshot carries a history/recent pair.
    pub fn is_paired(&self) -> bool {
        self.dual.is_some()
    }

    /// Resolved reference handed to the LLM capability.
    pub fn to_ref(&self) -> AdapterRef {
        AdapterRef {
            name: self.name.clone(),
            trained_on: self.trained_on,
            path: self.path.clone(),
            dual: self.dual.clone(),
        }
    }
}

/// Optional `metadata.json` inside a snapshot directory
#[derive(Debug, Clone, Default, Deserialize)]
struct SnapshotManifest {
    name: Option<String>,
    #[serde(default = "default_valid")]
    valid: bool,
}

fn default_valid() -> bool {
    true
}
