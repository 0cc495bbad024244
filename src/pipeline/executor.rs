//! Pipeline assembly and execution
//!
//! `PipelineBuilder` checks the inter-layer kind contract when layers are
//! registered; `Pipeline::execute` walks the enabled layers in order,
//! applying per-layer timeouts, the fatal/non-fatal policy and cooperative
//! cancellation, and returns the accumulated `PipelineResult`.

use crate::audit::{AuditEntry, AuditLevel, AuditLogger};
use crate::config::ConfigLoader;
use crate::error::{Error, Result};
use crate::pipeline::layer::Layer;
use crate::pipeline::types::{
    DataKind, LayerContext, LayerData, LayerExecutionRecord, LayerStatus, Mode, PipelineInput,
    PipelineResult, PipelineStatus,
};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

/// Builds a [`Pipeline`], checking the layer contract at registration time
pub struct PipelineBuilder {
    layers: Vec<Arc<dyn Layer>>,
    config: Arc<ConfigLoader>,
    audit: AuditLogger,
}

impl PipelineBuilder {
    /// Builder over the given configuration, auditing to tracing.
    pub fn new(config: Arc<ConfigLoader>) -> Self {
        Self {
            layers: Vec::new(),
            config,
            audit: AuditLogger::to_tracing(),
        }
    }

    /// Replace the audit destination.
    pub fn audit(mut self, audit: AuditLogger) -> Self {
        self.audit = audit;
        self
    }

    /// Register the next layer in execution order.
    ///
    /// Fails if the previous layer's output kind is not accepted by the
    /// new layer; the chain is checked here, never per call.
    pub fn layer(mut self, layer: Arc<dyn Layer>) -> Result<Self> {
        let produced = match self.layers.last() {
            Some(prev) => prev.output_kind(),
            None => DataKind::Message,
        };
        if !layer.accepts(produced) {
            return Err(Error::Config(format!(
                "layer '{}' cannot consume '{}' produced upstream",
                layer.name(),
                produced
            )));
        }
        self.layers.push(layer);
        Ok(self)
    }

    /// Finish the build.
    pub fn build(self) -> Result<Pipeline> {
        if self.layers.is_empty() {
            return Err(Error::Config("pipeline has no layers".to_string()));
        }
        Ok(Pipeline {
            layers: self.layers,
            config: self.config,
            audit: self.audit,
        })
    }
}

/// The assembled cognitive pipeline
pub struct Pipeline {
    layers: Vec<Arc<dyn Layer>>,
    config: Arc<ConfigLoader>,
    audit: AuditLogger,
}

impl Pipeline {
    /// Run the pipeline to completion.
    pub async fn execute(&self, mode: Mode, input: PipelineInput) -> Result<PipelineResult> {
        self.execute_with_cancel(mode, input, CancellationToken::new())
            .await
    }

    /// Run the pipeline under a caller-held cancellation token.
    pub async fn execute_with_cancel(
        &self,
        mode: Mode,
        input: PipelineInput,
        cancel: CancellationToken,
    ) -> Result<PipelineResult> {
        let started = Instant::now();
        // Pin one snapshot for the whole run: a reload or override change
        // landing mid-run must not alter this execution.
        let config = self.config.effective_snapshot().await;
        let ctx = LayerContext::new(mode, &input, config.clone(), cancel);
        tracing::info!(mode = %mode, request_id = %ctx.request_id, "pipeline started");

        let mut current = LayerData::Message(input);
        let mut records: Vec<LayerExecutionRecord> = Vec::new();
        let mut degraded = false;
        let mut cancelled = false;

        for layer in &self.layers {
            let name = layer.name().to_string();

            let cfg = config.layer_config(mode, &name);

            // Disabled layers leave no trace in the result
            if !cfg.enabled {
                tracing::debug!(layer = %name, mode = %mode, "layer disabled");
                continue;
            }

            if ctx.cancel.is_cancelled() {
                records.push(self.record(layer, LayerStatus::Cancelled, 0, None));
                cancelled = true;
                break;
            }
            let layer_started = Instant::now();

            if let Err(e) = layer.validate(&current, &ctx) {
                if cfg.fatal {
                    self.audit_layer(&ctx, &name, LayerStatus::Failed, &Some(e.to_string()));
                    return Err(e);
                }
                tracing::warn!(layer = %name, "precondition unmet, skipping: {}", e);
                records.push(self.record(
                    layer,
                    LayerStatus::Skipped,
                    elapsed_ms(layer_started),
                    Some(e.to_string()),
                ));
                degraded = true;
                continue;
            }

            if !layer.accepts(current.kind()) {
                let reason = format!("cannot consume '{}' after upstream degradation", current.kind());
                if cfg.fatal {
                    return Err(Error::InvalidInput {
                        layer: name,
                        reason,
                    });
                }
                records.push(self.record(
                    layer,
                    LayerStatus::Skipped,
                    elapsed_ms(layer_started),
                    Some(reason),
                ));
                degraded = true;
                continue;
            }

            let outcome = tokio::time::timeout(
                Duration::from_millis(cfg.timeout_ms),
                layer.process(current.clone(), &ctx),
            )
            .await;

            match outcome {
                Err(_) => {
                    let err = Error::Timeout {
                        layer: name.clone(),
                        timeout_ms: cfg.timeout_ms,
                    };
                    tracing::warn!(layer = %name, timeout_ms = cfg.timeout_ms, "layer timed out");
                    self.audit_layer(&ctx, &name, LayerStatus::Timeout, &Some(err.to_string()));
                    if cfg.fatal {
                        return Err(err);
                    }
                    records.push(self.record(
                        layer,
                        LayerStatus::Timeout,
                        elapsed_ms(layer_started),
                        Some(err.to_string()),
                    ));
                    degraded = true;
                }
                Ok(Err(Error::Cancelled)) => {
                    records.push(self.record(
                        layer,
                        LayerStatus::Cancelled,
                        elapsed_ms(layer_started),
                        None,
                    ));
                    cancelled = true;
                    break;
                }
                Ok(Err(e)) => {
                    self.audit_layer(&ctx, &name, LayerStatus::Failed, &Some(e.to_string()));
                    if cfg.fatal {
                        return Err(Error::in_layer(name, e));
                    }
                    tracing::warn!(layer = %name, "layer failed, continuing degraded: {}", e);
                    records.push(self.record(
                        layer,
                        LayerStatus::Failed,
                        elapsed_ms(layer_started),
                        Some(e.to_string()),
                    ));
                    degraded = true;
                }
                Ok(Ok(output)) => {
                    if let Err(e) = layer.finalize(&output, &ctx).await {
                        tracing::warn!(layer = %name, "finalize failed: {}", e);
                    }
                    self.audit_layer(&ctx, &name, LayerStatus::Success, &None);
                    let mut record = self.record(
                        layer,
                        LayerStatus::Success,
                        elapsed_ms(layer_started),
                        None,
                    );
                    record.metadata = serde_json::json!({ "outputKind": output.kind() });
                    records.push(record);
                    current = output;
                }
            }
        }

        let status = if cancelled {
            PipelineStatus::Cancelled
        } else if degraded {
            PipelineStatus::Degraded
        } else {
            PipelineStatus::Completed
        };

        let result = PipelineResult {
            output: current,
            layers: records,
            elapsed_ms: elapsed_ms(started),
            status,
        };
        tracing::info!(
            mode = %mode,
            request_id = %ctx.request_id,
            status = ?status,
            elapsed_ms = result.elapsed_ms,
            "pipeline finished"
        );
        Ok(result)
    }

    /// Human-readable description of the effective pipeline for a mode.
    pub async fn summary(&self, mode: Mode) -> String {
        let config = self.config.effective_snapshot().await;
        let mut out = format!("pipeline[{}]", mode);
        for layer in &self.layers {
            let name = layer.name();
            let cfg = config.layer_config(mode, name);
            out.push_str(&format!(
                "\n  {} v{} {} timeout={}ms fatal={}",
                name,
                layer.version(),
                if cfg.enabled { "enabled" } else { "disabled" },
                cfg.timeout_ms,
                cfg.fatal,
            ));
            if let Some(level) = cfg.validation_level {
                out.push_str(&format!(" level={:?}", level));
            }
        }
        out
    }

    fn record(
        &self,
        layer: &Arc<dyn Layer>,
        status: LayerStatus,
        elapsed_ms: u64,
        error: Option<String>,
    ) -> LayerExecutionRecord {
        LayerExecutionRecord {
            layer: layer.name().to_string(),
            version: layer.version().to_string(),
            status,
            elapsed_ms,
            error,
            metadata: serde_json::Value::Null,
        }
    }

    fn audit_layer(
        &self,
        ctx: &LayerContext,
        layer: &str,
        status: LayerStatus,
        error: &Option<String>,
    ) {
        let level = match status {
            LayerStatus::Success => AuditLevel::Info,
            _ => AuditLevel::Warn,
        };
        let mut entry = AuditEntry::new(level, "pipeline", "layer_completed")
            .actor("executor")
            .detail("requestId", ctx.request_id.to_string())
            .detail("mode", ctx.mode.to_string())
            .detail("layer", layer)
            .detail("status", format!("{:?}", status));
        if let Some(error) = error {
            entry = entry.detail("error", error.clone());
        }
        self.audit.record(entry);
    }
}

fn elapsed_ms(since: Instant) -> u64 {
    since.elapsed().as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::types::{GenerationOutput, PromptMetadata, ValidatedOutput};
    use async_trait::async_trait;

    struct StubLayer {
        name: &'static str,
        input: DataKind,
        output: DataKind,
        delay_ms: u64,
        fail: bool,
    }

    impl StubLayer {
        fn new(name: &'static str, input: DataKind, output: DataKind) -> Self {
            Self {
                name,
                input,
                output,
                delay_ms: 0,
                fail: false,
            }
        }

        fn output_data(&self) -> LayerData {
            match self.output {
                DataKind::Message => LayerData::Message(PipelineInput::from_message("stub")),
                DataKind::Context => LayerData::Context(crate::pipeline::types::RetrievalOutput {
                    memories: Vec::new(),
                    memory_count: 0,
                    index_status: crate::memory::IndexStatus::Ready,
                }),
                DataKind::Draft => LayerData::Draft(GenerationOutput {
                    response: "draft".to_string(),
                    lora_adapter: None,
                    prompt_metadata: PromptMetadata {
                        adapter_name: None,
                        adapter_date: None,
                        model: None,
                        response_length: 5,
                        memory_count: 0,
                        generated_at: chrono::Utc::now(),
                    },
                }),
                DataKind::Validated => LayerData::Validated(ValidatedOutput {
                    response: "final".to_string(),
                    validated: true,
                    passed_validation: true,
                    safety: None,
                    value_alignment: None,
                    consistency: None,
                    refinement: None,
                }),
            }
        }
    }

    #[async_trait]
    impl Layer for StubLayer {
        fn name(&self) -> &str {
            self.name
        }

        fn input_kind(&self) -> DataKind {
            self.input
        }

        fn output_kind(&self) -> DataKind {
            self.output
        }

        async fn process(&self, _input: LayerData, _ctx: &LayerContext) -> Result<LayerData> {
            if self.delay_ms > 0 {
                tokio::time::sleep(Duration::from_millis(self.delay_ms)).await;
            }
            if self.fail {
                return Err(Error::Retrieval("stub failure".to_string()));
            }
            Ok(self.output_data())
        }
    }

    fn loader() -> Arc<ConfigLoader> {
        Arc::new(ConfigLoader::new())
    }

    // Rewrites its own config file and reloads it while the pipeline is
    // mid-run, then reports success as a normal retrieval stub would.
    struct ReloadingStub {
        loader: Arc<ConfigLoader>,
        path: std::path::PathBuf,
    }

    #[async_trait]
    impl Layer for ReloadingStub {
        fn name(&self) -> &str {
            "retrieval"
        }

        fn input_kind(&self) -> DataKind {
            DataKind::Message
        }

        fn output_kind(&self) -> DataKind {
            DataKind::Context
        }

        async fn process(&self, _input: LayerData, _ctx: &LayerContext) -> Result<LayerData> {
            tokio::fs::write(
                &self.path,
                "[modes.dual.layers.generation]\nenabled = false\n",
            )
            .await
            .unwrap();
            self.loader.reload().await.unwrap();
            Ok(LayerData::Context(crate::pipeline::types::RetrievalOutput {
                memories: Vec::new(),
                memory_count: 0,
                index_status: crate::memory::IndexStatus::Ready,
            }))
        }
    }

    #[tokio::test]
    async fn test_midrun_reload_does_not_change_layer_set() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "").unwrap();
        let loader = Arc::new(ConfigLoader::from_file(&path).await.unwrap());

        let pipeline = PipelineBuilder::new(loader.clone())
            .audit(AuditLogger::disabled())
            .layer(Arc::new(ReloadingStub {
                loader: loader.clone(),
                path,
            }))
            .unwrap()
            .layer(Arc::new(StubLayer::new(
                "generation",
                DataKind::Context,
                DataKind::Draft,
            )))
            .unwrap()
            .build()
            .unwrap();

        let result = pipeline
            .execute(Mode::Dual, PipelineInput::from_message("hello"))
            .await
            .unwrap();

        // this run pinned its config before retrieval fired the reload, so
        // generation still executes and leaves a record
        assert_eq!(
            result.record("generation").unwrap().status,
            LayerStatus::Success
        );
        assert_eq!(result.status, PipelineStatus::Completed);

        // a fresh run observes the reloaded config
        assert!(!loader.is_layer_enabled(Mode::Dual, "generation").await);
    }

    #[tokio::test]
    async fn test_kind_mismatch_rejected_at_registration() {
        let result = PipelineBuilder::new(loader())
            .audit(AuditLogger::disabled())
            .layer(Arc::new(StubLayer::new(
                "retrieval",
                DataKind::Message,
                DataKind::Context,
            )))
            .unwrap()
            .layer(Arc::new(StubLayer::new(
                "validation",
                DataKind::Draft,
                DataKind::Validated,
            )));
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[tokio::test]
    async fn test_empty_pipeline_rejected() {
        assert!(matches!(
            PipelineBuilder::new(loader())
                .audit(AuditLogger::disabled())
                .build(),
            Err(Error::Config(_))
        ));
    }

    #[tokio::test]
    async fn test_happy_path_records_every_layer() {
        let pipeline = PipelineBuilder::new(loader())
            .audit(AuditLogger::disabled())
            .layer(Arc::new(StubLayer::new(
                "retrieval",
                DataKind::Message,
                DataKind::Context,
            )))
            .unwrap()
            .layer(Arc::new(StubLayer::new(
                "generation",
                DataKind::Context,
                DataKind::Draft,
            )))
            .unwrap()
            .layer(Arc::new(StubLayer::new(
                "validation",
                DataKind::Draft,
                DataKind::Validated,
            )))
            .unwrap()
            .build()
            .unwrap();

        let result = pipeline
            .execute(Mode::Dual, PipelineInput::from_message("hello"))
            .await
            .unwrap();
        assert_eq!(result.status, PipelineStatus::Completed);
        assert_eq!(result.layers.len(), 3);
        assert!(result
            .layers
            .iter()
            .all(|r| r.status == LayerStatus::Success));
        assert_eq!(result.response(), Some("final"));
    }

    #[tokio::test]
    async fn test_disabled_layer_leaves_no_record() {
        let config = loader();
        config.set_override("retrieval", false).await;
        let pipeline = PipelineBuilder::new(config)
            .audit(AuditLogger::disabled())
            .layer(Arc::new(StubLayer::new(
                "retrieval",
                DataKind::Message,
                DataKind::Context,
            )))
            .unwrap()
            .layer(Arc::new(StubLayer {
                name: "generation",
                input: DataKind::Context,
                output: DataKind::Draft,
                delay_ms: 0,
                fail: false,
            }))
            .unwrap()
            .build()
            .unwrap();

        // generation's stub only accepts Context; with retrieval disabled
        // the raw message reaches it and it is skipped, not failed
        let result = pipeline
            .execute(Mode::Dual, PipelineInput::from_message("hello"))
            .await
            .unwrap();
        assert!(result.record("retrieval").is_none());
        assert_eq!(
            result.record("generation").unwrap().status,
            LayerStatus::Skipped
        );
        assert_eq!(result.status, PipelineStatus::Degraded);
    }

    #[tokio::test]
    async fn test_non_fatal_failure_degrades() {
        let pipeline = PipelineBuilder::new(loader())
            .audit(AuditLogger::disabled())
            .layer(Arc::new(StubLayer {
                name: "retrieval",
                input: DataKind::Message,
                output: DataKind::Context,
                delay_ms: 0,
                fail: true,
            }))
            .unwrap()
            .build()
            .unwrap();

        let result = pipeline
            .execute(Mode::Dual, PipelineInput::from_message("hello"))
            .await
            .unwrap();
        assert_eq!(result.status, PipelineStatus::Degraded);
        let record = result.record("retrieval").unwrap();
        assert_eq!(record.status, LayerStatus::Failed);
        assert!(record.error.as_deref().unwrap().contains("stub failure"));
        // last good output is the original message
        assert_eq!(result.output.kind(), DataKind::Message);
    }

    #[tokio::test]
    async fn test_fatal_failure_aborts() {
        let pipeline = PipelineBuilder::new(loader())
            .audit(AuditLogger::disabled())
            .layer(Arc::new(StubLayer {
                name: "generation",
                input: DataKind::Message,
                output: DataKind::Draft,
                delay_ms: 0,
                fail: true,
            }))
            .unwrap()
            .build()
            .unwrap();

        let err = pipeline
            .execute(Mode::Dual, PipelineInput::from_message("hello"))
            .await
            .unwrap_err();
        assert_eq!(err.fatal_layer(), Some("generation"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_fatal_timeout_records_and_continues() {
        let config = loader();
        let pipeline = PipelineBuilder::new(config)
            .audit(AuditLogger::disabled())
            .layer(Arc::new(StubLayer {
                name: "retrieval",
                input: DataKind::Message,
                output: DataKind::Context,
                delay_ms: 60_000,
                fail: false,
            }))
            .unwrap()
            .build()
            .unwrap();

        let result = pipeline
            .execute(Mode::Dual, PipelineInput::from_message("hello"))
            .await
            .unwrap();
        assert_eq!(
            result.record("retrieval").unwrap().status,
            LayerStatus::Timeout
        );
        assert_eq!(result.status, PipelineStatus::Degraded);
    }

    #[tokio::test]
    async fn test_cancellation_stops_the_run() {
        let pipeline = PipelineBuilder::new(loader())
            .audit(AuditLogger::disabled())
            .layer(Arc::new(StubLayer::new(
                "retrieval",
                DataKind::Message,
                DataKind::Context,
            )))
            .unwrap()
            .build()
            .unwrap();

        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = pipeline
            .execute_with_cancel(Mode::Dual, PipelineInput::from_message("hello"), cancel)
            .await
            .unwrap();
        assert_eq!(result.status, PipelineStatus::Cancelled);
        assert_eq!(
            result.record("retrieval").unwrap().status,
            LayerStatus::Cancelled
        );
    }

    #[tokio::test]
    async fn test_summary_lists_layers() {
        let pipeline = PipelineBuilder::new(loader())
            .audit(AuditLogger::disabled())
            .layer(Arc::new(StubLayer::new(
                "retrieval",
                DataKind::Message,
                DataKind::Context,
            )))
            .unwrap()
            .build()
            .unwrap();

        let summary = pipeline.summary(Mode::Agent).await;
        assert!(summary.contains("pipeline[agent]"));
        assert!(summary.contains("retrieval"));
        assert!(summary.contains("enabled"));
    }
}
