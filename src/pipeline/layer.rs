//! The `Layer` contract
//!
//! One stage of the cognitive pipeline with a fixed input/output contract.
//! Stages are registered on the builder as trait objects in execution
//! order; mode differences live entirely in configuration data, not in
//! per-mode layer implementations.

use crate::error::Result;
use crate::pipeline::types::{DataKind, LayerContext, LayerData};
use async_trait::async_trait;

/// A single stage of the cognitive pipeline.
///
/// Implementations must be stateless across requests apart from
/// read-mostly caches; all per-request data arrives via the input value
/// and the [`LayerContext`].
#[async_trait]
pub trait Layer: Send + Sync {
    /// Stable layer name, used for configuration lookup and records.
    fn name(&self) -> &str;

    /// Layer version, recorded for auditability.
    fn version(&self) -> &str {
        "1.0"
    }

    /// Kind of value this layer consumes.
    fn input_kind(&self) -> DataKind;

    /// Kind of value this layer produces.
    fn output_kind(&self) -> DataKind;

    /// Whether this layer can consume the given kind.
    ///
    /// The default only accepts [`Self::input_kind`]. Layers that can
    /// degrade (e.g. generation running without retrieved context after an
    /// upstream failure) override this to accept more.
    fn accepts(&self, kind: DataKind) -> bool {
        kind == self.input_kind()
    }

    /// Optional precondition check, run before [`Self::process`].
    ///
    /// A failure on a fatal layer aborts the run as invalid input; on a
    /// non-fatal layer the stage is skipped and the prior output carried
    /// forward.
    fn validate(&self, _input: &LayerData, _ctx: &LayerContext) -> Result<()> {
        Ok(())
    }

    /// Transform the input value into this layer's output.
    async fn process(&self, input: LayerData, ctx: &LayerContext) -> Result<LayerData>;

    /// Optional post-success side effects (e.g. audit breadcrumbs).
    ///
    /// Errors here are logged by the executor and never fail the run.
    async fn finalize(&self, _output: &LayerData, _ctx: &LayerContext) -> Result<()> {
        Ok(())
    }
}
