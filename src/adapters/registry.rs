//! Adapter registry: storage scan, cached listing, per-mode selection
//!
//! The cached listing is an `Arc<Vec<_>>` swapped wholesale on
//! re-discovery, so concurrent pipeline runs never observe a half-updated
//! set. Selection never blocks generation: a missing requested snapshot
//! degrades to latest-valid, then to no adapter (base model), each
//! transition logged and audited.

use super::{AdapterMetadata, DualPaths, SnapshotManifest};
use crate::audit::{AuditEntry, AuditLevel, AuditLogger};
use crate::error::{Error, Result};
use crate::pipeline::types::Mode;
use chrono::NaiveDate;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Outcome of adapter selection for one generation call
#[derive(Debug, Clone)]
pub struct AdapterSelection {
    /// Chosen adapter; `None` means base model
    pub adapter: Option<AdapterMetadata>,
    /// Degradation note, when the first-choice policy target was missing
    pub fallback: Option<String>,
}

/// Discovers and selects fine-tuned adapter snapshots.
pub struct AdapterRegistry {
    roots: Vec<PathBuf>,
    listing: RwLock<Option<Arc<Vec<AdapterMetadata>>>>,
}

impl AdapterRegistry {
    /// Registry scanning the given storage roots.
    pub fn new(roots: Vec<PathBuf>) -> Self {
        Self {
            roots,
            listing: RwLock::new(None),
        }
    }

    /// Default adapter storage root (~/.metahuman/adapters/)
    pub fn default_root() -> PathBuf {
        dirs_next::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".metahuman")
            .join("adapters")
    }

    /// Scan all roots and atomically replace the cached listing.
    /// Returns the number of valid snapshots found.
    pub async fn discover(&self) -> Result<usize> {
        let mut found = Vec::new();
        for root in &self.roots {
            scan_root(root, &mut found).await?;
        }
        found.sort_by_key(|a| a.trained_on);
        let count = found.iter().filter(|a| a.valid).count();
        tracing::debug!(
            snapshots = found.len(),
            valid = count,
            "adapter discovery complete"
        );
        *self.listing.write().await = Some(Arc::new(found));
        Ok(count)
    }

    /// Current listing, scanning lazily on first use.
    pub async fn listing(&self) -> Arc<Vec<AdapterMetadata>> {
        if let Some(listing) = self.listing.read().await.clone() {
            return listing;
        }
        if let Err(e) = self.discover().await {
            tracing::warn!("adapter discovery failed: {}", e);
            let empty = Arc::new(Vec::new());
            *self.listing.write().await = Some(empty.clone());
            return empty;
        }
        self.listing
            .read()
            .await
            .clone()
            .unwrap_or_else(|| Arc::new(Vec::new()))
    }

    /// Latest valid snapshot, paired or not.
    pub async fn find_latest(&self) -> Option<AdapterMetadata> {
        self.listing()
            .await
            .iter()
            .filter(|a| a.valid)
            .max_by_key(|a| a.trained_on)
            .cloned()
    }

    /// Latest valid dual-paired snapshot.
    pub async fn latest_paired(&self) -> Option<AdapterMetadata> {
        self.listing()
            .await
            .iter()
            .filter(|a| a.valid && a.is_paired())
            .max_by_key(|a| a.trained_on)
            .cloned()
    }

    /// Valid snapshot trained on an exact date.
    pub async fn find_by_date(&self, date: NaiveDate) -> Option<AdapterMetadata> {
        self.listing()
            .await
            .iter()
            .find(|a| a.valid && a.trained_on == date)
            .cloned()
    }

    /// Select an adapter under the mode policy.
    ///
    /// dual prefers the latest paired snapshot, then the latest single;
    /// agent always takes the latest regardless of pairing; emulation
    /// loads the requested date snapshot when given, else the latest, and
    /// never triggers any write side effect. Every degradation is logged
    /// and audited; selection itself is always non-fatal.
    pub async fn select(
        &self,
        mode: Mode,
        requested: Option<NaiveDate>,
        audit: &AuditLogger,
    ) -> AdapterSelection {
        let (adapter, fallback) = match mode {
            Mode::Dual => match self.latest_paired().await {
                Some(paired) => (Some(paired), None),
                None => match self.find_latest().await {
                    Some(single) => (
                        Some(single),
                        Some("no paired adapter, using latest single".to_string()),
                    ),
                    None => (None, Some("no adapter available, using base model".to_string())),
                },
            },
            Mode::Agent => match self.find_latest().await {
                Some(latest) => (Some(latest), None),
                None => (None, Some("no adapter available, using base model".to_string())),
            },
            Mode::Emulation => match requested {
                Some(date) => match self.find_by_date(date).await {
                    Some(exact) => (Some(exact), None),
                    None => match self.find_latest().await {
                        Some(latest) => (
                            Some(latest),
                            Some(format!("snapshot {} not found, using latest", date)),
                        ),
                        None => (
                            None,
                            Some(format!(
                                "snapshot {} not found and no adapter available, using base model",
                                date
                            )),
                        ),
                    },
                },
                None => match self.find_latest().await {
                    Some(latest) => (Some(latest), None),
                    None => (None, Some("no adapter available, using base model".to_string())),
                },
            },
        };

        if let Some(note) = &fallback {
            tracing::warn!(mode = %mode, "adapter selection degraded: {}", note);
            let mut entry = AuditEntry::new(AuditLevel::Warn, "adapters", "adapter_fallback")
                .actor("registry")
                .detail("mode", mode.to_string())
                .detail("note", note.clone());
            if let Some(date) = requested {
                entry = entry.detail("requested", date.to_string());
            }
            if let Some(adapter) = &adapter {
                entry = entry.detail("selected", adapter.trained_on.to_string());
            }
            audit.record(entry);
        }

        AdapterSelection { adapter, fallback }
    }
}

/// Scan one storage root for date-named snapshot directories.
async fn scan_root(root: &Path, out: &mut Vec<AdapterMetadata>) -> Result<()> {
    let mut entries = match tokio::fs::read_dir(root).await {
        Ok(entries) => entries,
        Err(e) => {
            // A missing root is an empty root, not an error
            tracing::debug!(root = %root.display(), "adapter root unreadable: {}", e);
            return Ok(());
        }
    };

    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| Error::Adapter(format!("scan of {} failed: {}", root.display(), e)))?
    {
        let path = entry.path();
        if !path.is_dir() {
            continue;
        }
        let Some(dir_name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        let Ok(trained_on) = NaiveDate::parse_from_str(dir_name, "%Y-%m-%d") else {
            tracing::debug!(dir = %dir_name, "skipping non-snapshot directory");
            continue;
        };

        match read_snapshot(&path, trained_on).await {
            Ok(Some(metadata)) => out.push(metadata),
            Ok(None) => {}
            Err(e) => tracing::warn!(
                snapshot = %path.display(),
                "discarding snapshot: {}",
                e
            ),
        }
    }
    Ok(())
}

/// Validate one snapshot directory, returning `None` for empty shells.
async fn read_snapshot(path: &Path, trained_on: NaiveDate) -> Result<Option<AdapterMetadata>> {
    let manifest = read_manifest(path).await?;

    let history = path.join("history");
    let recent = path.join("recent");
    let dual = if history.is_dir() && recent.is_dir() {
        Some(DualPaths { history, recent })
    } else {
        None
    };

    // A snapshot with neither a pair nor any content is a leftover shell
    if dual.is_none() && dir_is_empty(path).await? {
        tracing::debug!(snapshot = %path.display(), "skipping empty snapshot");
        return Ok(None);
    }

    let name = manifest
        .name
        .unwrap_or_else(|| format!("adapter-{}", trained_on));

    Ok(Some(AdapterMetadata {
        name,
        trained_on,
        path: path.to_path_buf(),
        dual,
        valid: manifest.valid,
    }))
}

async fn read_manifest(path: &Path) -> Result<SnapshotManifest> {
    let manifest_path = path.join("metadata.json");
    match tokio::fs::read_to_string(&manifest_path).await {
        Ok(text) => serde_json::from_str(&text).map_err(|e| {
            Error::Adapter(format!("malformed {}: {}", manifest_path.display(), e))
        }),
        Err(_) => Ok(SnapshotManifest::default()),
    }
}

async fn dir_is_empty(path: &Path) -> Result<bool> {
    let mut entries = tokio::fs::read_dir(path)
        .await
        .map_err(|e| Error::Adapter(format!("cannot read {}: {}", path.display(), e)))?;
    Ok(entries
        .next_entry()
        .await
        .map_err(|e| Error::Adapter(format!("cannot read {}: {}", path.display(), e)))?
        .is_none())
}
