//! Validation layer
//!
//! Runs the configured validators over the generated draft and refines it
//! once when any of them fail. The level comes from configuration per
//! mode: full (safety + value alignment + consistency, concurrently),
//! safety-only (deterministic sanitizer, no LLM refiner), or none
//! (pass-through). Judge failures are treated as inconclusive passes so a
//! broken judge never blocks delivery.

use crate::audit::{AuditEntry, AuditLevel, AuditLogger};
use crate::config::{Thresholds, ValidationLevel};
use crate::error::{Error, Result};
use crate::llm::LlmClient;
use crate::pipeline::layer::Layer;
use crate::pipeline::types::{
    DataKind, LayerContext, LayerData, Mode, ValidatedOutput,
};
use crate::persona::PersonaProvider;
use crate::validators::{
    ConsistencyValidator, Refiner, RefinementResult, SafetyValidator, ValidationContext,
    ValidationVerdict, Validator, ValueAlignmentValidator,
};
use async_trait::async_trait;
use std::sync::Arc;

/// Multi-validator gate with one-shot refinement
pub struct ValidationLayer {
    safety: SafetyValidator,
    alignment: Arc<dyn Validator>,
    consistency: Arc<dyn Validator>,
    refiner: Refiner,
    personas: Arc<dyn PersonaProvider>,
    audit: AuditLogger,
}

impl ValidationLayer {
    /// Layer with the default validator set judged by `llm`.
    pub fn new(
        llm: Arc<dyn LlmClient>,
        personas: Arc<dyn PersonaProvider>,
        audit: AuditLogger,
    ) -> Result<Self> {
        Ok(Self {
            safety: SafetyValidator::with_defaults()?,
            alignment: Arc::new(ValueAlignmentValidator::new(llm.clone())),
            consistency: Arc::new(ConsistencyValidator::new(llm.clone())),
            refiner: Refiner::new(llm),
            personas,
            audit,
        })
    }

    /// Layer with explicit validator implementations.
    pub fn with_validators(
        safety: SafetyValidator,
        alignment: Arc<dyn Validator>,
        consistency: Arc<dyn Validator>,
        refiner: Refiner,
        personas: Arc<dyn PersonaProvider>,
        audit: AuditLogger,
    ) -> Self {
        Self {
            safety,
            alignment,
            consistency,
            refiner,
            personas,
            audit,
        }
    }

    /// Effective level for this mode when configuration does not pin one.
    fn default_level(mode: Mode) -> ValidationLevel {
        match mode {
            Mode::Dual => ValidationLevel::Full,
            Mode::Agent => ValidationLevel::SafetyOnly,
            Mode::Emulation => ValidationLevel::None,
        }
    }

    fn audit_verdict(&self, ctx: &LayerContext, validator: &str, verdict: &ValidationVerdict) {
        let level = if verdict.pass {
            AuditLevel::Info
        } else {
            AuditLevel::Warn
        };
        self.audit.record(
            AuditEntry::new(level, "validation", "verdict")
                .actor("validation")
                .detail("mode", ctx.mode.to_string())
                .detail("validator", validator)
                .detail("pass", verdict.pass)
                .detail("score", verdict.score as f64)
                .detail("issueCount", verdict.issues.len() as u64),
        );
    }

    /// A judge error is an inconclusive pass, never a block.
    fn settle(
        &self,
        ctx: &LayerContext,
        validator: &str,
        result: Result<ValidationVerdict>,
    ) -> ValidationVerdict {
        let verdict = match result {
            Ok(verdict) => verdict,
            Err(e) => {
                tracing::warn!(validator = %validator, "validator failed, treating as inconclusive: {}", e);
                ValidationVerdict::inconclusive(e.to_string())
            }
        };
        self.audit_verdict(ctx, validator, &verdict);
        verdict
    }

    async fn run_full(
        &self,
        response: String,
        ctx: &LayerContext,
        thresholds: Thresholds,
    ) -> Result<ValidatedOutput> {
        let persona = self
            .personas
            .profile(None)
            .await
            .map_err(|e| Error::Persona(e.to_string()))?;
        let vctx = ValidationContext {
            persona,
            user_message: ctx.user_message.clone(),
            mode: ctx.mode,
            thresholds,
        };

        let (safety_result, alignment_result, consistency_result) = tokio::join!(
            self.safety.validate(&response, &vctx),
            self.alignment.validate(&response, &vctx),
            self.consistency.validate(&response, &vctx),
        );
        let safety = self.settle(ctx, self.safety.name(), safety_result);
        let alignment = self.settle(ctx, self.alignment.name(), alignment_result);
        let consistency = self.settle(ctx, self.consistency.name(), consistency_result);

        if safety.pass && alignment.pass && consistency.pass {
            return Ok(ValidatedOutput {
                response,
                validated: true,
                passed_validation: true,
                safety: Some(safety),
                value_alignment: Some(alignment),
                consistency: Some(consistency),
                refinement: None,
            });
        }

        // One refinement attempt: sanitizer first, then the LLM rewrite
        // for whatever the judges flagged.
        let mut refined = response.clone();
        let mut changes = Vec::new();
        if !safety.pass {
            if let Some(sanitized) = &safety.sanitized {
                refined = sanitized.clone();
                changes.push("applied safety sanitizer".to_string());
            }
        }

        let mut judge_issues = Vec::new();
        if !alignment.pass {
            judge_issues.extend(alignment.issues.iter().cloned());
        }
        if !consistency.pass {
            judge_issues.extend(consistency.issues.iter().cloned());
        }

        let refinement = match self.refiner.refine(&refined, &judge_issues).await {
            Ok(mut result) => {
                refined = result.refined_text.clone();
                result.changed = result.changed || !changes.is_empty();
                changes.extend(result.changes);
                result.changes = changes;
                result
            }
            Err(e) => {
                tracing::warn!("refiner failed, keeping sanitized draft: {}", e);
                self.audit.record(
                    AuditEntry::new(AuditLevel::Warn, "validation", "refiner_failed")
                        .actor("validation")
                        .detail("error", e.to_string()),
                );
                RefinementResult {
                    changed: !changes.is_empty(),
                    refined_text: refined.clone(),
                    changes,
                    meaning_preserved: true,
                }
            }
        };

        // Only safety is re-checked after refinement; a residual judge
        // shortfall degrades but never blocks.
        if self.safety.contains_sensitive(&refined) {
            refined = self.safety.sanitize(&refined);
        }

        Ok(ValidatedOutput {
            response: refined,
            validated: true,
            passed_validation: true,
            safety: Some(safety),
            value_alignment: Some(alignment),
            consistency: Some(consistency),
            refinement: Some(refinement),
        })
    }

    async fn run_safety_only(
        &self,
        response: String,
        ctx: &LayerContext,
        thresholds: Thresholds,
    ) -> Result<ValidatedOutput> {
        // The pattern validator never reads the persona
        let vctx = ValidationContext {
            persona: crate::persona::PersonaProfile::named(""),
            user_message: ctx.user_message.clone(),
            mode: ctx.mode,
            thresholds,
        };
        let safety = self.settle(ctx, self.safety.name(), self.safety.validate(&response, &vctx).await);

        let response = if !safety.pass {
            // Deterministic sanitizer output, no refiner in this level
            safety.sanitized.clone().unwrap_or(response)
        } else {
            response
        };

        Ok(ValidatedOutput {
            passed_validation: !self.safety.contains_sensitive(&response),
            response,
            validated: true,
            safety: Some(safety),
            value_alignment: None,
            consistency: None,
            refinement: None,
        })
    }
}

#[async_trait]
impl Layer for ValidationLayer {
    fn name(&self) -> &str {
        "validation"
    }

    fn input_kind(&self) -> DataKind {
        DataKind::Draft
    }

    fn output_kind(&self) -> DataKind {
        DataKind::Validated
    }

    async fn process(&self, input: LayerData, ctx: &LayerContext) -> Result<LayerData> {
        if ctx.cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let draft = match input {
            LayerData::Draft(draft) => draft,
            other => {
                return Err(Error::InvalidInput {
                    layer: "validation".to_string(),
                    reason: format!("expected a draft, got {}", other.kind()),
                })
            }
        };

        let cfg = ctx.config.layer_config(ctx.mode, "validation");
        let level = cfg
            .validation_level
            .unwrap_or_else(|| Self::default_level(ctx.mode));
        let thresholds = cfg.thresholds.unwrap_or_default();

        tracing::debug!(mode = %ctx.mode, level = ?level, "validating draft");

        let output = match level {
            ValidationLevel::None => ValidatedOutput {
                response: draft.response,
                validated: true,
                passed_validation: true,
                safety: None,
                value_alignment: None,
                consistency: None,
                refinement: None,
            },
            ValidationLevel::SafetyOnly => {
                self.run_safety_only(draft.response, ctx, thresholds).await?
            }
            ValidationLevel::Full => self.run_full(draft.response, ctx, thresholds).await?,
        };

        Ok(LayerData::Validated(output))
    }
}
