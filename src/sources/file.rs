//! File-backed source readers rooted at a project directory

use super::models::{ActivityData, CheckpointEntry, CheckpointMetadata, ProjectState};
use super::{ActivityReader, CheckpointReader, StateReader};
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, trace};

/// Reads `.doplan/state.json`, falling back to the legacy `.cursor` location
#[derive(Debug, Clone)]
pub struct FileStateReader {
    project_root: PathBuf,
}

impl FileStateReader {
    pub fn new(project_root: impl Into<PathBuf>) -> Self {
        Self {
            project_root: project_root.into(),
        }
    }

    fn candidates(&self) -> [PathBuf; 2] {
        [
            self.project_root.join(".doplan").join("state.json"),
            self.project_root
                .join(".cursor")
                .join("config")
                .join("doplan-state.json"),
        ]
    }
}

#[async_trait]
impl StateReader for FileStateReader {
    async fn load_state(&self) -> Result<ProjectState> {
        for path in self.candidates() {
            match read_optional(&path).await? {
                Some(content) => {
                    debug!("Loading project state from {:?}", path);
                    return serde_json::from_str(&content)
                        .with_context(|| format!("Failed to parse project state {:?}", path));
                }
                None => trace!("No project state at {:?}", path),
            }
        }

        debug!("No project state found, using empty state");
        Ok(ProjectState::default())
    }
}

/// Reads the activity snapshot written by the version-control sync
#[derive(Debug, Clone)]
pub struct FileActivityReader {
    data_path: PathBuf,
}

impl FileActivityReader {
    pub fn new(project_root: impl AsRef<Path>) -> Self {
        Self {
            data_path: project_root.as_ref().join("doplan").join("github-data.json"),
        }
    }
}

#[async_trait]
impl ActivityReader for FileActivityReader {
    async fn load_activity(&self) -> Result<ActivityData> {
        match read_optional(&self.data_path).await? {
            Some(content) => serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse activity data {:?}", self.data_path)),
            None => Ok(ActivityData::default()),
        }
    }
}

/// Lists checkpoint directories under `.doplan/checkpoints`
#[derive(Debug, Clone)]
pub struct FileCheckpointReader {
    checkpoint_dir: PathBuf,
}

impl FileCheckpointReader {
    pub fn new(project_root: impl AsRef<Path>) -> Self {
        Self {
            checkpoint_dir: project_root.as_ref().join(".doplan").join("checkpoints"),
        }
    }

    async fn read_metadata(dir: &Path) -> Option<CheckpointMetadata> {
        let path = dir.join("metadata.json");
        let content = fs::read_to_string(&path).await.ok()?;
        match serde_json::from_str(&content) {
            Ok(metadata) => Some(metadata),
            Err(e) => {
                debug!("Ignoring unreadable checkpoint metadata {:?}: {}", path, e);
                None
            }
        }
    }
}

#[async_trait]
impl CheckpointReader for FileCheckpointReader {
    async fn list_checkpoints(&self) -> Result<Vec<CheckpointEntry>> {
        let mut entries = match fs::read_dir(&self.checkpoint_dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(e).with_context(|| {
                    format!("Failed to read checkpoint dir {:?}", self.checkpoint_dir)
                })
            }
        };

        let mut checkpoints = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .context("Failed to iterate checkpoint dir")?
        {
            let is_dir = entry
                .file_type()
                .await
                .map(|t| t.is_dir())
                .unwrap_or(false);
            let metadata = if is_dir {
                Self::read_metadata(&entry.path()).await
            } else {
                None
            };

            checkpoints.push(CheckpointEntry {
                id: entry.file_name().to_string_lossy().into_owned(),
                metadata,
            });
        }

        Ok(checkpoints)
    }
}

/// Read a file, mapping "not found" to `None`
async fn read_optional(path: &Path) -> Result<Option<String>> {
    match fs::read_to_string(path).await {
        Ok(content) => Ok(Some(content)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e).with_context(|| format!("Failed to read {:?}", path)),
    }
}
