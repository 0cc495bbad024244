//! Cognitive pipeline layers
//!
//! One concrete implementation per layer; all mode differences live in
//! configuration data read at call time.

pub mod generation;
pub mod prompt;
pub mod retrieval;
pub mod validation;

pub use generation::GenerationLayer;
pub use prompt::PromptBuilder;
pub use retrieval::RetrievalLayer;
pub use validation::ValidationLayer;

// End-to-end runs of the assembled three-layer pipeline with mocked
// external capabilities.
#[cfg(test)]
mod pipeline_tests {
    use super::*;
    use crate::adapters::AdapterRegistry;
    use crate::audit::{AuditLogger, MemorySink};
    use crate::config::ConfigLoader;
    use crate::error::{Error, Result};
    use crate::llm::{ChatMessage, GenerateOptions, Generation, LlmClient};
    use crate::memory::{
        ContextPackage, ContextRetrieval, IndexStatus, MemoryItem, MemoryKind, SearchOptions,
    };
    use crate::persona::{PersonaProfile, PersonaProvider, StaticPersonaProvider};
    use crate::pipeline::types::{
        LayerData, LayerStatus, Mode, PipelineInput, PipelineStatus,
    };
    use crate::pipeline::{Pipeline, PipelineBuilder};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use tempfile::TempDir;

    struct ScriptedLlm {
        draft: String,
        judge_replies: Mutex<Vec<String>>,
        refiner_reply: String,
        persona_calls: AtomicUsize,
        judge_calls: AtomicUsize,
        refiner_calls: AtomicUsize,
    }

    impl ScriptedLlm {
        fn new(draft: &str) -> Arc<Self> {
            Arc::new(Self {
                draft: draft.to_string(),
                judge_replies: Mutex::new(Vec::new()),
                refiner_reply: "refined".to_string(),
                persona_calls: AtomicUsize::new(0),
                judge_calls: AtomicUsize::new(0),
                refiner_calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl LlmClient for ScriptedLlm {
        async fn generate(
            &self,
            role: &str,
            _messages: &[ChatMessage],
            _options: &GenerateOptions,
        ) -> Result<Generation> {
            let text = match role {
                "persona" => {
                    self.persona_calls.fetch_add(1, Ordering::SeqCst);
                    self.draft.clone()
                }
                "judge" => {
                    self.judge_calls.fetch_add(1, Ordering::SeqCst);
                    self.judge_replies
                        .lock()
                        .unwrap()
                        .pop()
                        .unwrap_or_else(|| r#"{"score":1.0}"#.to_string())
                }
                "refiner" => {
                    self.refiner_calls.fetch_add(1, Ordering::SeqCst);
                    self.refiner_reply.clone()
                }
                other => panic!("unexpected role {}", other),
            };
            Ok(Generation {
                text,
                tokens_used: None,
                model: Some("base-7b".to_string()),
            })
        }
    }

    struct StaticEngine {
        hits: Vec<MemoryItem>,
    }

    #[async_trait]
    impl ContextRetrieval for StaticEngine {
        async fn search(
            &self,
            _query: &str,
            _mode: Mode,
            _options: &SearchOptions,
        ) -> Result<ContextPackage> {
            Ok(ContextPackage {
                memories: self.hits.clone(),
                index_status: IndexStatus::Ready,
            })
        }
    }

    fn engine() -> Arc<StaticEngine> {
        Arc::new(StaticEngine {
            hits: vec![MemoryItem {
                kind: MemoryKind::Conversation,
                id: "m1".to_string(),
                content: "we planted tomatoes".to_string(),
                score: 0.8,
            }],
        })
    }

    fn personas() -> Arc<dyn PersonaProvider> {
        let mut profile = PersonaProfile::named("Ada");
        profile.values = vec!["honesty".to_string()];
        Arc::new(StaticPersonaProvider::new(profile))
    }

    fn build_pipeline(
        llm: Arc<ScriptedLlm>,
        adapter_root: &TempDir,
        config: Arc<ConfigLoader>,
        audit: AuditLogger,
    ) -> Pipeline {
        let registry = Arc::new(AdapterRegistry::new(vec![adapter_root
            .path()
            .to_path_buf()]));
        PipelineBuilder::new(config)
            .audit(audit.clone())
            .layer(Arc::new(RetrievalLayer::new(engine()).unwrap()))
            .unwrap()
            .layer(Arc::new(GenerationLayer::new(
                registry,
                llm.clone(),
                personas(),
                audit.clone(),
            )))
            .unwrap()
            .layer(Arc::new(
                ValidationLayer::new(llm, personas(), audit).unwrap(),
            ))
            .unwrap()
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_agent_run_is_safety_only() {
        let llm = ScriptedLlm::new("The report is done.");
        let dir = TempDir::new().unwrap();
        let pipeline = build_pipeline(
            llm.clone(),
            &dir,
            Arc::new(ConfigLoader::new()),
            AuditLogger::disabled(),
        );

        let result = pipeline
            .execute(Mode::Agent, PipelineInput::from_message("status?"))
            .await
            .unwrap();

        assert_eq!(result.status, PipelineStatus::Completed);
        assert_eq!(result.layers.len(), 3);
        let LayerData::Validated(validated) = &result.output else {
            panic!("expected validated output");
        };
        assert_eq!(validated.response, "The report is done.");
        assert!(validated.passed_validation);
        assert!(validated.value_alignment.is_none());
        // safety-only screening never consults the judges or the refiner
        assert_eq!(llm.judge_calls.load(Ordering::SeqCst), 0);
        assert_eq!(llm.refiner_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_dual_run_sanitizes_leaked_path() {
        let llm = ScriptedLlm::new("check /home/user/.ssh/id_rsa for the key");
        let dir = TempDir::new().unwrap();
        let pipeline = build_pipeline(
            llm.clone(),
            &dir,
            Arc::new(ConfigLoader::new()),
            AuditLogger::disabled(),
        );

        let result = pipeline
            .execute(Mode::Dual, PipelineInput::from_message("where's the key?"))
            .await
            .unwrap();

        let LayerData::Validated(validated) = &result.output else {
            panic!("expected validated output");
        };
        assert!(!validated.response.contains("/home/user/.ssh/id_rsa"));
        assert!(validated.response.contains("[REDACTED_PATH]"));
        let safety = validated.safety.as_ref().unwrap();
        assert!(!safety.pass);
        assert!(validated.refinement.as_ref().unwrap().changed);
        assert!(validated.passed_validation);
    }

    #[tokio::test]
    async fn test_emulation_run_passes_draft_through() {
        let llm = ScriptedLlm::new("back then I was still learning the violin");
        let dir = TempDir::new().unwrap();
        let pipeline = build_pipeline(
            llm.clone(),
            &dir,
            Arc::new(ConfigLoader::new()),
            AuditLogger::disabled(),
        );

        let result = pipeline
            .execute(
                Mode::Emulation,
                PipelineInput::from_message("what were you doing in june?"),
            )
            .await
            .unwrap();

        let LayerData::Validated(validated) = &result.output else {
            panic!("expected validated output");
        };
        // the draft reaches the caller byte-for-byte
        assert_eq!(validated.response, "back then I was still learning the violin");
        assert!(validated.validated);
        assert!(validated.passed_validation);
        assert!(validated.safety.is_none());
        assert_eq!(llm.judge_calls.load(Ordering::SeqCst), 0);
        assert_eq!(llm.refiner_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_blank_message_aborts_before_generation() {
        let llm = ScriptedLlm::new("this draft must never exist");
        let dir = TempDir::new().unwrap();
        let pipeline = build_pipeline(
            llm.clone(),
            &dir,
            Arc::new(ConfigLoader::new()),
            AuditLogger::disabled(),
        );

        let err = pipeline
            .execute(Mode::Agent, PipelineInput::from_message("   "))
            .await
            .unwrap_err();

        // retrieval skips the blank message non-fatally; generation is the
        // fatal gate that stops the run before the model is consulted
        assert!(matches!(err, Error::InvalidInput { ref layer, .. } if layer == "generation"));
        assert_eq!(llm.persona_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_emulation_reruns_are_identical() {
        let llm = ScriptedLlm::new("back then I kept a garden journal");
        let dir = TempDir::new().unwrap();
        let snapshot = dir.path().join("2025-06-01");
        tokio::fs::create_dir_all(snapshot.join("weights")).await.unwrap();
        tokio::fs::write(
            snapshot.join("metadata.json"),
            r#"{"name":"june","valid":true}"#,
        )
        .await
        .unwrap();

        let sink = Arc::new(MemorySink::new());
        let audit = AuditLogger::new(sink.clone());
        let pipeline = build_pipeline(llm, &dir, Arc::new(ConfigLoader::new()), audit.clone());

        let input = PipelineInput {
            user_message: "what were you doing in june?".to_string(),
            snapshot_date: Some(chrono::NaiveDate::from_ymd_opt(2025, 6, 1).unwrap()),
            ..Default::default()
        };

        let first = pipeline
            .execute(Mode::Emulation, input.clone())
            .await
            .unwrap();
        let second = pipeline.execute(Mode::Emulation, input).await.unwrap();
        audit.flush().await;

        // same snapshot, same input: the replay is byte-identical and both
        // runs resolve the same historical adapter
        assert_eq!(first.response(), second.response());
        let drafts = sink.with_event("draft_produced");
        assert_eq!(drafts.len(), 2);
        assert_eq!(drafts[0].details["adapter"], "june");
        assert_eq!(drafts[0].details["adapter"], drafts[1].details["adapter"]);
    }

    #[tokio::test]
    async fn test_record_count_tracks_enabled_layers() {
        let llm = ScriptedLlm::new("fine");
        let dir = TempDir::new().unwrap();
        let config = Arc::new(ConfigLoader::new());
        config.set_override("retrieval", false).await;
        let pipeline = build_pipeline(llm, &dir, config, AuditLogger::disabled());

        let result = pipeline
            .execute(Mode::Dual, PipelineInput::from_message("hello"))
            .await
            .unwrap();

        // disabled retrieval leaves no record; generation degrades to the
        // raw message and still produces a draft
        assert!(result.record("retrieval").is_none());
        assert_eq!(result.layers.len(), 2);
        assert_eq!(
            result.record("generation").unwrap().status,
            LayerStatus::Success
        );
        assert_eq!(result.status, PipelineStatus::Completed);
    }

    #[tokio::test]
    async fn test_layer_outcomes_are_audited() {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();
        let llm = ScriptedLlm::new("fine");
        let dir = TempDir::new().unwrap();
        let sink = Arc::new(MemorySink::new());
        let audit = AuditLogger::new(sink.clone());
        let pipeline = build_pipeline(
            llm,
            &dir,
            Arc::new(ConfigLoader::new()),
            audit.clone(),
        );

        pipeline
            .execute(Mode::Dual, PipelineInput::from_message("hello"))
            .await
            .unwrap();
        audit.flush().await;

        let completions = sink.with_event("layer_completed");
        assert_eq!(completions.len(), 3);
        // full validation audits one verdict per validator
        assert_eq!(sink.with_event("verdict").len(), 3);
    }
}
