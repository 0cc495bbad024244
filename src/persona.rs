//! Persona profiles
//!
//! The pipeline consumes a persona store; it never edits one. Profiles
//! describe the identity the generation layer speaks as and the values
//! the alignment validator judges against. `FilePersonaProvider` reads
//! JSON profiles from a directory (one `<username>.json` per profile);
//! `StaticPersonaProvider` serves a fixed profile.

use crate::error::{Error, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Declared identity of the digital personality
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersonaProfile {
    /// Display name
    pub name: String,
    /// Personality traits (e.g. "curious", "direct")
    #[serde(default)]
    pub traits: Vec<String>,
    /// Core values the persona holds
    #[serde(default)]
    pub values: Vec<String>,
    /// Current goals
    #[serde(default)]
    pub goals: Vec<String>,
    /// Established tone and style
    #[serde(default)]
    pub communication_style: String,
}

impl PersonaProfile {
    /// Minimal profile with just a name.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            traits: Vec::new(),
            values: Vec::new(),
            goals: Vec::new(),
            communication_style: String::new(),
        }
    }
}

/// External persona store capability
#[async_trait]
pub trait PersonaProvider: Send + Sync {
    /// Resolve a profile. `username = None` resolves the default profile.
    async fn profile(&self, username: Option<&str>) -> Result<PersonaProfile>;
}

/// Provider serving one fixed profile (tests, single-user deployments)
pub struct StaticPersonaProvider {
    profile: PersonaProfile,
}

impl StaticPersonaProvider {
    /// Provider that always returns the given profile.
    pub fn new(profile: PersonaProfile) -> Self {
        Self { profile }
    }
}

#[async_trait]
impl PersonaProvider for StaticPersonaProvider {
    async fn profile(&self, _username: Option<&str>) -> Result<PersonaProfile> {
        Ok(self.profile.clone())
    }
}

/// Provider reading `<username>.json` profiles from a directory
pub struct FilePersonaProvider {
    dir: PathBuf,
    default_username: String,
}

impl FilePersonaProvider {
    /// Provider rooted at `dir`; `default_username` names the profile used
    /// when the caller does not supply one.
    pub fn new(dir: PathBuf, default_username: impl Into<String>) -> Self {
        Self {
            dir,
            default_username: default_username.into(),
        }
    }

    /// Default profile directory (~/.metahuman/personas/)
    pub fn default_dir() -> PathBuf {
        dirs_next::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".metahuman")
            .join("personas")
    }
}

#[async_trait]
impl PersonaProvider for FilePersonaProvider {
    async fn profile(&self, username: Option<&str>) -> Result<PersonaProfile> {
        let username = username.unwrap_or(&self.default_username);
        let path = self.dir.join(format!("{}.json", username));
        let data = tokio::fs::read_to_string(&path).await.map_err(|e| {
            Error::Persona(format!("cannot read profile {}: {}", path.display(), e))
        })?;
        serde_json::from_str(&data).map_err(|e| {
            Error::Persona(format!("cannot parse profile {}: {}", path.display(), e))
        })
    }
}
