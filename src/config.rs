//! Mode and layer configuration management
//!
//! All mode-specific behavior differences live here as data: one
//! `LayerConfig` per (mode, layer) pair, resolved at call time. The loader
//! starts from built-in defaults, applies an optional TOML file as a
//! patch, and exposes hot reload by swapping an immutable snapshot
//! pointer so in-flight executions are unaffected. Process-level
//! overrides (e.g. force-disable a layer) always win over file config.

use crate::error::{Error, Result};
use crate::pipeline::types::Mode;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;

/// How much validation the validation layer performs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationLevel {
    /// Safety + value-alignment + consistency, with refinement
    Full,
    /// Pattern-based safety only, deterministic sanitization
    SafetyOnly,
    /// Pass-through, no validation at all
    None,
}

/// Per-validator score thresholds (a score below its threshold fails)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Thresholds {
    /// Safety validator threshold
    #[serde(default = "default_threshold")]
    pub safety: f32,
    /// Value-alignment validator threshold
    #[serde(default = "default_threshold")]
    pub value_alignment: f32,
    /// Consistency validator threshold
    #[serde(default = "default_threshold")]
    pub consistency: f32,
}

fn default_threshold() -> f32 {
    0.7
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            safety: default_threshold(),
            value_alignment: default_threshold(),
            consistency: default_threshold(),
        }
    }
}

/// Settings for one layer under one mode
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerConfig {
    /// Whether the layer runs at all
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Validation level (meaningful for the validation layer only)
    #[serde(default)]
    pub validation_level: Option<ValidationLevel>,

    /// Validator thresholds (meaningful for the validation layer only)
    #[serde(default)]
    pub thresholds: Option<Thresholds>,

    /// Per-call timeout for this layer, milliseconds
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Whether a failure/timeout of this layer aborts the run
    #[serde(default)]
    pub fatal: bool,
}

fn default_enabled() -> bool {
    true
}

fn default_timeout_ms() -> u64 {
    30_000
}

impl Default for LayerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            validation_level: None,
            thresholds: None,
            timeout_ms: default_timeout_ms(),
            fatal: false,
        }
    }
}

/// Layer-name → settings map for one mode
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModeConfig {
    /// Settings keyed by layer name
    #[serde(default)]
    pub layers: HashMap<String, LayerConfig>,
}

impl ModeConfig {
    /// Settings for a layer. A layer absent from the map defaults to
    /// enabled with per-layer defaults.
    pub fn layer(&self, name: &str) -> LayerConfig {
        self.layers.get(name).cloned().unwrap_or_default()
    }
}

/// Immutable configuration snapshot, replaced wholesale on reload
#[derive(Debug, Clone)]
pub struct ConfigSnapshot {
    modes: HashMap<Mode, ModeConfig>,
}

impl ConfigSnapshot {
    /// Built-in defaults for all three modes.
    pub fn defaults() -> Self {
        let mut modes = HashMap::new();
        for mode in Mode::all() {
            let mut layers = HashMap::new();
            layers.insert(
                "retrieval".to_string(),
                LayerConfig {
                    timeout_ms: 10_000,
                    ..Default::default()
                },
            );
            layers.insert(
                "generation".to_string(),
                LayerConfig {
                    timeout_ms: 60_000,
                    fatal: true,
                    ..Default::default()
                },
            );
            layers.insert(
                "validation".to_string(),
                LayerConfig {
                    validation_level: Some(match mode {
                        Mode::Dual => ValidationLevel::Full,
                        Mode::Agent => ValidationLevel::SafetyOnly,
                        Mode::Emulation => ValidationLevel::None,
                    }),
                    thresholds: Some(Thresholds::default()),
                    ..Default::default()
                },
            );
            modes.insert(mode, ModeConfig { layers });
        }
        Self { modes }
    }

    /// The mode's full configuration.
    pub fn mode(&self, mode: Mode) -> &ModeConfig {
        // defaults() seeds every mode, so the entry always exists
        &self.modes[&mode]
    }

    /// Resolved settings for one (mode, layer) pair.
    pub fn layer_config(&self, mode: Mode, layer: &str) -> LayerConfig {
        self.mode(mode).layer(layer)
    }
}

// =============================================================================
// File format (applied as a patch over the built-in defaults)
// =============================================================================

/// Partial layer settings from the config file; unset fields keep the
/// built-in default for that (mode, layer) pair.
#[derive(Debug, Clone, Default, Deserialize)]
struct LayerPatch {
    enabled: Option<bool>,
    validation_level: Option<ValidationLevel>,
    thresholds: Option<Thresholds>,
    timeout_ms: Option<u64>,
    fatal: Option<bool>,
}

impl LayerPatch {
    fn apply(&self, base: &mut LayerConfig) {
        if let Some(enabled) = self.enabled {
            base.enabled = enabled;
        }
        if let Some(level) = self.validation_level {
            base.validation_level = Some(level);
        }
        if let Some(thresholds) = self.thresholds {
            base.thresholds = Some(thresholds);
        }
        if let Some(timeout_ms) = self.timeout_ms {
            base.timeout_ms = timeout_ms;
        }
        if let Some(fatal) = self.fatal {
            base.fatal = fatal;
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
struct ModePatch {
    #[serde(default)]
    layers: HashMap<String, LayerPatch>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    modes: HashMap<String, ModePatch>,
}

fn parse_file(text: &str) -> Result<ConfigSnapshot> {
    let file: ConfigFile = toml::from_str(text)
        .map_err(|e| Error::Config(format!("failed to parse config: {}", e)))?;

    let mut snapshot = ConfigSnapshot::defaults();
    for (mode_name, mode_patch) in file.modes {
        let mode: Mode = mode_name
            .parse()
            .map_err(|e| Error::Config(format!("invalid mode in config: {}", e)))?;
        let mode_config = snapshot
            .modes
            .get_mut(&mode)
            .ok_or_else(|| Error::Config(format!("unseeded mode: {}", mode)))?;
        for (layer_name, layer_patch) in mode_patch.layers {
            let entry = mode_config.layers.entry(layer_name).or_default();
            layer_patch.apply(entry);
        }
    }
    Ok(snapshot)
}

// =============================================================================
// Loader
// =============================================================================

/// Configuration loader with hot reload and process-level overrides.
pub struct ConfigLoader {
    path: Option<PathBuf>,
    snapshot: RwLock<Arc<ConfigSnapshot>>,
    overrides: RwLock<HashMap<String, bool>>,
}

impl ConfigLoader {
    /// Loader with built-in defaults and no backing file.
    pub fn new() -> Self {
        Self {
            path: None,
            snapshot: RwLock::new(Arc::new(ConfigSnapshot::defaults())),
            overrides: RwLock::new(HashMap::new()),
        }
    }

    /// Loader backed by a TOML file, parsed immediately.
    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let text = tokio::fs::read_to_string(&path).await.map_err(|e| {
            Error::Config(format!("cannot read config {}: {}", path.display(), e))
        })?;
        let snapshot = parse_file(&text)?;
        Ok(Self {
            path: Some(path),
            snapshot: RwLock::new(Arc::new(snapshot)),
            overrides: RwLock::new(HashMap::new()),
        })
    }

    /// Default config path (~/.metahuman/config.toml)
    pub fn default_path() -> PathBuf {
        dirs_next::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".metahuman")
            .join("config.toml")
    }

    /// Current immutable snapshot. Callers doing multi-step decisions
    /// should take one snapshot and resolve everything against it.
    pub async fn snapshot(&self) -> Arc<ConfigSnapshot> {
        self.snapshot.read().await.clone()
    }

    /// Current snapshot with process-level overrides folded in.
    ///
    /// The executor pins one of these per pipeline call and resolves every
    /// per-layer decision against it, so a `reload()` or override change
    /// landing mid-run cannot alter which layers execute or with what
    /// settings.
    pub async fn effective_snapshot(&self) -> Arc<ConfigSnapshot> {
        let overrides = self.overrides.read().await;
        let snapshot = self.snapshot.read().await;
        if overrides.is_empty() {
            return snapshot.clone();
        }
        let mut merged = (**snapshot).clone();
        for (layer, &enabled) in overrides.iter() {
            for mode_config in merged.modes.values_mut() {
                mode_config.layers.entry(layer.clone()).or_default().enabled = enabled;
            }
        }
        Arc::new(merged)
    }

    /// Re-parse the backing file and swap the snapshot pointer. Without a
    /// backing file this resets to the built-in defaults. In-flight
    /// executions holding the previous snapshot are unaffected.
    pub async fn reload(&self) -> Result<()> {
        let fresh = match &self.path {
            Some(path) => {
                let text = tokio::fs::read_to_string(path).await.map_err(|e| {
                    Error::Config(format!("cannot read config {}: {}", path.display(), e))
                })?;
                parse_file(&text)?
            }
            None => ConfigSnapshot::defaults(),
        };
        *self.snapshot.write().await = Arc::new(fresh);
        tracing::info!("configuration reloaded");
        Ok(())
    }

    /// Force a layer on or off process-wide, across all modes. Overrides
    /// always win over file config.
    pub async fn set_override(&self, layer: impl Into<String>, enabled: bool) {
        let layer = layer.into();
        tracing::info!(layer = %layer, enabled, "layer override set");
        self.overrides.write().await.insert(layer, enabled);
    }

    /// Remove a process-level override.
    pub async fn clear_override(&self, layer: &str) {
        self.overrides.write().await.remove(layer);
    }

    /// Resolved settings for one (mode, layer) pair, overrides applied.
    pub async fn layer_config(&self, mode: Mode, layer: &str) -> LayerConfig {
        let mut config = self.snapshot.read().await.layer_config(mode, layer);
        if let Some(&enabled) = self.overrides.read().await.get(layer) {
            config.enabled = enabled;
        }
        config
    }

    /// Whether a layer runs under a mode, overrides applied.
    pub async fn is_layer_enabled(&self, mode: Mode, layer: &str) -> bool {
        self.layer_config(mode, layer).await.enabled
    }

    /// Human-readable diagnostics dump. Not a stable machine contract.
    pub async fn summary(&self) -> String {
        let snapshot = self.snapshot.read().await.clone();
        let overrides = self.overrides.read().await.clone();

        let mut out = String::new();
        for mode in Mode::all() {
            out.push_str(&format!("mode {}:\n", mode));
            let mut names: Vec<&String> = snapshot.mode(mode).layers.keys().collect();
            names.sort();
            for name in names {
                let mut config = snapshot.layer_config(mode, name);
                if let Some(&enabled) = overrides.get(name.as_str()) {
                    config.enabled = enabled;
                }
                out.push_str(&format!(
                    "  {}: enabled={} timeout_ms={} fatal={}",
                    name, config.enabled, config.timeout_ms, config.fatal
                ));
                if let Some(level) = config.validation_level {
                    out.push_str(&format!(" level={:?}", level));
                }
                out.push('\n');
            }
        }
        if !overrides.is_empty() {
            let mut names: Vec<&String> = overrides.keys().collect();
            names.sort();
            out.push_str(&format!(
                "overrides: {}\n",
                names
                    .iter()
                    .map(|n| format!("{}={}", n, overrides[n.as_str()]))
                    .collect::<Vec<_>>()
                    .join(", ")
            ));
        }
        out
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}
