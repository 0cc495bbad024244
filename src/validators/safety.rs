//! Safety validator: pattern-based sensitive-data screening
//!
//! Pure regex detection with a deterministic sanitizer. No LLM
//! dependency, so it runs in every validating mode and re-runs cheaply
//! on refined text. Categories cover filesystem paths, key/credential
//! material, PII-like markers and harmful-content markers.

use super::{Issue, ValidationContext, ValidationVerdict, Validator};
use crate::error::{Error, Result};
use async_trait::async_trait;
use regex::Regex;

/// One detection rule
#[derive(Debug, Clone)]
pub struct SafetyRule {
    /// Rule/category name
    pub name: String,
    /// Detection pattern
    pub pattern: String,
    /// Replacement written by the sanitizer
    pub replacement: String,
}

impl SafetyRule {
    /// New rule.
    pub fn new(
        name: impl Into<String>,
        pattern: impl Into<String>,
        replacement: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            pattern: pattern.into(),
            replacement: replacement.into(),
        }
    }
}

/// Built-in detection rules
pub fn default_safety_rules() -> Vec<SafetyRule> {
    vec![
        SafetyRule::new(
            "private_key",
            r"-----BEGIN [A-Z ]*PRIVATE KEY-----",
            "[REDACTED_KEY]",
        ),
        SafetyRule::new(
            "credential",
            r#"(?i)\b(?:password|passwd|secret|token|api[_-]?key)\s*[:=]\s*\S+"#,
            "[REDACTED_CREDENTIAL]",
        ),
        SafetyRule::new(
            "api_key",
            r"\b(?:sk|pk|rk)-[A-Za-z0-9]{16,}\b|\bAKIA[0-9A-Z]{16}\b",
            "[REDACTED_API_KEY]",
        ),
        SafetyRule::new(
            "file_path",
            r"(?:/(?:home|Users|root|etc|var|opt|srv)(?:/[\w.@-]+)+)",
            "[REDACTED_PATH]",
        ),
        SafetyRule::new(
            "email",
            r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b",
            "[REDACTED_EMAIL]",
        ),
        SafetyRule::new("ssn", r"\b\d{3}-\d{2}-\d{4}\b", "***-**-****"),
        SafetyRule::new(
            "credit_card",
            r"\b\d{4}[- ]\d{4}[- ]\d{4}[- ]\d{4}\b",
            "****-****-****-****",
        ),
        SafetyRule::new(
            "phone",
            r"\b\(\d{3}\)\s?\d{3}-\d{4}\b|\b\d{3}-\d{3}-\d{4}\b",
            "***-***-****",
        ),
        SafetyRule::new(
            "harmful_marker",
            r"(?i)\b(?:kill yourself|kys|how to make (?:a bomb|explosives)|hurt (?:yourself|himself|herself))\b",
            "[REMOVED]",
        ),
    ]
}

struct CompiledRule {
    name: String,
    pattern: Regex,
    replacement: String,
}

/// A single detection within a response
#[derive(Debug, Clone)]
struct SafetyMatch {
    rule_name: String,
    start: usize,
    end: usize,
    replacement: String,
}

/// Pattern-based safety judge with deterministic sanitization
pub struct SafetyValidator {
    rules: Vec<CompiledRule>,
}

impl SafetyValidator {
    /// Validator with the given rules.
    pub fn new(rules: Vec<SafetyRule>) -> Result<Self> {
        let compiled = rules
            .into_iter()
            .map(|rule| {
                let pattern = Regex::new(&rule.pattern).map_err(|e| {
                    Error::Validation(format!(
                        "invalid safety pattern for rule '{}': {}",
                        rule.name, e
                    ))
                })?;
                Ok(CompiledRule {
                    name: rule.name,
                    pattern,
                    replacement: rule.replacement,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { rules: compiled })
    }

    /// Validator with the built-in rules.
    pub fn with_defaults() -> Result<Self> {
        Self::new(default_safety_rules())
    }

    /// Non-overlapping matches, earliest first. When two rules match the
    /// same span the earlier (more specific) rule in the list wins.
    fn matches(&self, text: &str) -> Vec<SafetyMatch> {
        let mut all = Vec::new();
        for rule in &self.rules {
            for mat in rule.pattern.find_iter(text) {
                all.push(SafetyMatch {
                    rule_name: rule.name.clone(),
                    start: mat.start(),
                    end: mat.end(),
                    replacement: rule.replacement.clone(),
                });
            }
        }
        all.sort_by_key(|m| (m.start, m.end));

        let mut kept: Vec<SafetyMatch> = Vec::new();
        for mat in all {
            if kept.last().map(|prev| mat.start < prev.end).unwrap_or(false) {
                continue;
            }
            kept.push(mat);
        }
        kept
    }

    /// Deterministically sanitized variant of `text`.
    pub fn sanitize(&self, text: &str) -> String {
        let mut result = text.to_string();
        // Replace back-to-front so byte offsets stay valid
        for mat in self.matches(text).into_iter().rev() {
            result.replace_range(mat.start..mat.end, &mat.replacement);
        }
        result
    }

    /// Whether the text trips any rule.
    pub fn contains_sensitive(&self, text: &str) -> bool {
        self.rules.iter().any(|rule| rule.pattern.is_match(text))
    }
}

#[async_trait]
impl Validator for SafetyValidator {
    fn name(&self) -> &'static str {
        "safety"
    }

    async fn validate(
        &self,
        response: &str,
        ctx: &ValidationContext,
    ) -> Result<ValidationVerdict> {
        let matches = self.matches(response);
        let score = (1.0 - 0.4 * matches.len() as f32).max(0.0);

        let issues = matches
            .iter()
            .map(|m| {
                Issue::new(format!(
                    "{} pattern detected at bytes {}..{}",
                    m.rule_name, m.start, m.end
                ))
                .with_suggestion(format!("redact the {} reference", m.rule_name))
            })
            .collect();

        Ok(ValidationVerdict {
            pass: score >= ctx.thresholds.safety,
            score,
            issues,
            sanitized: Some(self.sanitize(response)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Thresholds;
    use crate::persona::PersonaProfile;
    use crate::pipeline::types::Mode;

    fn ctx() -> ValidationContext {
        ValidationContext {
            persona: PersonaProfile::named("Ada"),
            user_message: "test".to_string(),
            mode: Mode::Dual,
            thresholds: Thresholds::default(),
        }
    }

    fn validator() -> SafetyValidator {
        SafetyValidator::with_defaults().unwrap()
    }

    #[tokio::test]
    async fn test_clean_text_passes() {
        let verdict = validator()
            .validate("The garden is doing well this spring.", &ctx())
            .await
            .unwrap();
        assert!(verdict.pass);
        assert_eq!(verdict.score, 1.0);
        assert!(verdict.issues.is_empty());
        assert_eq!(
            verdict.sanitized.as_deref(),
            Some("The garden is doing well this spring.")
        );
    }

    #[tokio::test]
    async fn test_ssh_key_path_detected_and_sanitized() {
        let text = "my ssh key is at /home/user/.ssh/id_rsa";
        let verdict = validator().validate(text, &ctx()).await.unwrap();
        assert!(!verdict.pass);
        assert!(verdict
            .issues
            .iter()
            .any(|i| i.description.contains("file_path")));

        let sanitized = verdict.sanitized.unwrap();
        assert!(!sanitized.contains("/home/user/.ssh/id_rsa"));
        assert!(sanitized.contains("[REDACTED_PATH]"));
    }

    #[tokio::test]
    async fn test_credential_assignment_detected() {
        let verdict = validator()
            .validate("the password: hunter2 worked", &ctx())
            .await
            .unwrap();
        assert!(!verdict.pass);
        let sanitized = verdict.sanitized.unwrap();
        assert!(!sanitized.contains("hunter2"));
        assert!(sanitized.contains("[REDACTED_CREDENTIAL]"));
    }

    #[tokio::test]
    async fn test_api_key_detected() {
        let verdict = validator()
            .validate("use sk-abcdef1234567890abcdef for the call", &ctx())
            .await
            .unwrap();
        assert!(!verdict.pass);
        assert!(verdict.sanitized.unwrap().contains("[REDACTED_API_KEY]"));
    }

    #[test]
    fn test_sanitize_multiple_categories() {
        let validator = validator();
        let text = "SSN 123-45-6789, card 4111-1111-1111-1111, mail a@b.example";
        let sanitized = validator.sanitize(text);
        assert!(sanitized.contains("***-**-****"));
        assert!(sanitized.contains("****-****-****-****"));
        assert!(sanitized.contains("[REDACTED_EMAIL]"));
        assert!(!sanitized.contains("123-45-6789"));
    }

    #[test]
    fn test_overlapping_matches_do_not_corrupt_text() {
        // "token=/home/user/x" trips both credential and file_path
        let validator = validator();
        let sanitized = validator.sanitize("token=/home/user/x is set");
        assert!(!sanitized.contains("/home/user/x"));
        assert!(sanitized.ends_with("is set"));
    }

    #[tokio::test]
    async fn test_score_degrades_per_match() {
        let verdict = validator()
            .validate("mail a@b.example or c@d.example", &ctx())
            .await
            .unwrap();
        assert_eq!(verdict.issues.len(), 2);
        assert!((verdict.score - 0.2).abs() < 1e-6);
    }

    #[test]
    fn test_invalid_rule_rejected() {
        let result = SafetyValidator::new(vec![SafetyRule::new("bad", "(unclosed", "x")]);
        assert!(matches!(result, Err(Error::Validation(_))));
    }

    #[test]
    fn test_harmful_marker_removed() {
        let validator = validator();
        assert!(validator.contains_sensitive("just kys already"));
        assert!(!validator.sanitize("just kys already").contains("kys"));
    }
}
