//! The cognitive pipeline
//!
//! A pipeline is an ordered chain of [`layer::Layer`] stages with a typed
//! inter-layer contract, executed per request under mode-specific
//! configuration. See [`executor::PipelineBuilder`] for assembly and
//! [`executor::Pipeline`] for execution semantics.

pub mod executor;
pub mod layer;
pub mod types;

pub use executor::{Pipeline, PipelineBuilder};
pub use layer::Layer;
pub use types::{
    DataKind, LayerContext, LayerData, LayerExecutionRecord, LayerStatus, Mode, PipelineInput,
    PipelineResult, PipelineStatus,
};
