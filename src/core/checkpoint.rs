use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use super::models::StageName;
use crate::utils::fs::atomic_write;

pub const CHECKPOINT_FILE: &str = ".checkpoint.json";
pub const CHECKPOINT_VERSION: u32 = 1;

fn legacy_version() -> u32 {
    // Files without a version field predate versioning and share the v1 layout.
    1
}

/// Per-run metadata persisted with each checkpoint.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CheckpointData {
    #[serde(default)]
    pub completed_stages: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failed_stages: Vec<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl CheckpointData {
    pub fn new(completed: &[StageName], failed: &[StageName]) -> Self {
        Self {
            completed_stages: completed.iter().map(|s| s.to_string()).collect(),
            failed_stages: failed.iter().map(|s| s.to_string()).collect(),
            extra: Map::new(),
        }
    }

    /// Known stage names among `completed_stages`; unknown entries are dropped.
    pub fn completed_set(&self) -> BTreeSet<StageName> {
        self.completed_stages
            .iter()
            .filter_map(|name| match name.parse::<StageName>() {
                Ok(stage) => Some(stage),
                Err(_) => {
                    tracing::warn!("Ignoring unknown stage in checkpoint: {}", name);
                    None
                }
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    #[serde(default = "legacy_version")]
    pub version: u32,
    pub timestamp: String,
    pub stage: String,
    pub data: CheckpointData,
}

/// Resume state for one run directory. Every operation is fail-open:
/// errors are logged and never surface to the caller.
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    dir: PathBuf,
    file: PathBuf,
}

impl CheckpointStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        let file = dir.join(CHECKPOINT_FILE);
        Self { dir, file }
    }

    pub fn path(&self) -> &Path {
        &self.file
    }

    pub fn save(&self, stage: StageName, data: &CheckpointData) {
        match self.try_save(stage, data) {
            Ok(()) => tracing::debug!("Checkpoint saved: {}", stage),
            Err(e) => tracing::error!("Failed to save checkpoint: {:#}", e),
        }
    }

    fn try_save(&self, stage: StageName, data: &CheckpointData) -> Result<()> {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("Failed to create checkpoint directory: {:?}", self.dir))?;

        let checkpoint = Checkpoint {
            version: CHECKPOINT_VERSION,
            timestamp: chrono::Local::now().to_rfc3339(),
            stage: stage.to_string(),
            data: data.clone(),
        };
        let json = serde_json::to_string_pretty(&checkpoint)?;
        atomic_write(&self.file, json.as_bytes())
    }

    pub fn load(&self) -> Option<Checkpoint> {
        if !self.file.exists() {
            return None;
        }

        match self.try_load() {
            Ok(checkpoint) if checkpoint.version > CHECKPOINT_VERSION => {
                tracing::error!(
                    "Checkpoint version {} is newer than supported version {}, ignoring it",
                    checkpoint.version,
                    CHECKPOINT_VERSION
                );
                None
            }
            Ok(checkpoint) => {
                tracing::info!("Found checkpoint from: {}", checkpoint.timestamp);
                tracing::info!("Last completed stage: {}", checkpoint.stage);
                Some(checkpoint)
            }
            Err(e) => {
                tracing::error!("Failed to load checkpoint: {:#}", e);
                None
            }
        }
    }

    fn try_load(&self) -> Result<Checkpoint> {
        let content = fs::read_to_string(&self.file)
            .with_context(|| format!("Failed to read checkpoint: {:?}", self.file))?;
        let checkpoint = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse checkpoint: {:?}", self.file))?;
        Ok(checkpoint)
    }

    pub fn clear(&self) {
        if !self.file.exists() {
            return;
        }
        match fs::remove_file(&self.file) {
            Ok(()) => tracing::debug!("Checkpoint cleared"),
            Err(e) => tracing::error!("Failed to clear checkpoint {:?}: {}", self.file, e),
        }
    }

    pub fn completed_stages(&self) -> BTreeSet<StageName> {
        self.load()
            .map(|checkpoint| checkpoint.data.completed_set())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn test_round_trip() {
        let dir = TempDir::new().unwrap();
        let store = CheckpointStore::new(dir.path());

        let mut data = CheckpointData::new(&[StageName::Discovery, StageName::Scanning], &[StageName::Scanning]);
        data.extra.insert("hosts".to_string(), json!(42));
        store.save(StageName::Scanning, &data);

        let loaded = store.load().unwrap();
        assert_eq!(loaded.stage, "scanning");
        assert_eq!(loaded.version, CHECKPOINT_VERSION);
        assert_eq!(loaded.data, data);
    }

    #[test]
    fn test_absent_checkpoint() {
        let dir = TempDir::new().unwrap();
        let store = CheckpointStore::new(dir.path());
        assert!(store.load().is_none());
        assert!(store.completed_stages().is_empty());
    }

    #[test]
    fn test_save_creates_missing_directory() {
        let dir = TempDir::new().unwrap();
        let store = CheckpointStore::new(dir.path().join("a/b"));
        store.save(StageName::Web, &CheckpointData::new(&[StageName::Web], &[]));
        assert!(store.path().exists());
    }

    #[test]
    fn test_save_overwrites() {
        let dir = TempDir::new().unwrap();
        let store = CheckpointStore::new(dir.path());
        store.save(StageName::Discovery, &CheckpointData::new(&[StageName::Discovery], &[]));
        store.save(
            StageName::Scanning,
            &CheckpointData::new(&[StageName::Discovery, StageName::Scanning], &[]),
        );
        let loaded = store.load().unwrap();
        assert_eq!(loaded.stage, "scanning");
        assert_eq!(
            store.completed_stages(),
            [StageName::Discovery, StageName::Scanning].into_iter().collect()
        );
    }

    #[test]
    fn test_corrupt_checkpoint_is_absent() {
        let dir = TempDir::new().unwrap();
        let store = CheckpointStore::new(dir.path());
        fs::write(store.path(), "{ not json").unwrap();
        assert!(store.load().is_none());
        assert!(store.completed_stages().is_empty());
    }

    #[test]
    fn test_clear_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let store = CheckpointStore::new(dir.path());
        store.save(StageName::Content, &CheckpointData::new(&[StageName::Content], &[]));
        store.clear();
        store.clear();
        assert!(!store.path().exists());
    }

    #[test]
    fn test_unversioned_checkpoint_loads() {
        let dir = TempDir::new().unwrap();
        let store = CheckpointStore::new(dir.path());
        fs::write(
            store.path(),
            r#"{"timestamp": "2024-05-01T10:00:00.123456", "stage": "discovery",
                "data": {"completed_stages": ["discovery", "bogus"]}}"#,
        )
        .unwrap();

        let loaded = store.load().unwrap();
        assert_eq!(loaded.version, 1);
        assert_eq!(store.completed_stages(), [StageName::Discovery].into_iter().collect());
    }

    #[test]
    fn test_newer_version_is_ignored() {
        let dir = TempDir::new().unwrap();
        let store = CheckpointStore::new(dir.path());
        fs::write(
            store.path(),
            r#"{"version": 99, "timestamp": "t", "stage": "web", "data": {"completed_stages": ["web"]}}"#,
        )
        .unwrap();
        assert!(store.load().is_none());
    }
}
