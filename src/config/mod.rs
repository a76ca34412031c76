//! Engine configuration
//!
//! Defaults cover the conventional project layout. A project may override them in
//! `.doplan/stats.toml`:
//!
//! ```toml
//! retention = 50
//! source_timeout = "10s"
//! coverage_paths = ["target/coverage.out"]
//! ```

use crate::statistics::coverage::DEFAULT_PROFILE_PATHS;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

pub mod project;

pub use project::{load_install_date, ProjectConfig};

/// Maximum number of snapshots kept in the history log
pub const DEFAULT_RETENTION: usize = 100;

/// Configuration for one project's statistics engine
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StatsConfig {
    /// Project directory the sources are read from
    pub project_root: PathBuf,

    /// History log location; relative paths resolve against `project_root`
    pub history_path: PathBuf,

    /// Snapshots kept in the history log
    pub retention: usize,

    /// Deadline for each source during collection
    #[serde(with = "humantime_serde")]
    pub source_timeout: Duration,

    /// How long a save waits for the history writer lock
    #[serde(with = "humantime_serde")]
    pub lock_timeout: Duration,

    /// Coverage profile candidates, relative to `project_root`, probed in order
    pub coverage_paths: Vec<PathBuf>,

    /// Overrides the start date read from the project config
    pub project_start: Option<DateTime<Utc>>,
}

impl Default for StatsConfig {
    fn default() -> Self {
        Self {
            project_root: PathBuf::from("."),
            history_path: default_history_path(),
            retention: DEFAULT_RETENTION,
            source_timeout: Duration::from_secs(30),
            lock_timeout: Duration::from_secs(10),
            coverage_paths: DEFAULT_PROFILE_PATHS.iter().map(PathBuf::from).collect(),
            project_start: None,
        }
    }
}

fn default_history_path() -> PathBuf {
    Path::new(".doplan").join("stats").join("statistics.json")
}

impl StatsConfig {
    /// Default configuration rooted at `project_root`
    pub fn new(project_root: impl Into<PathBuf>) -> Self {
        Self {
            project_root: project_root.into(),
            ..Self::default()
        }
    }

    /// Load configuration for a project, applying `.doplan/stats.toml` when present
    pub fn load(project_root: impl Into<PathBuf>) -> Result<Self> {
        let project_root = project_root.into();
        let override_path = project_root.join(".doplan").join("stats.toml");

        let mut config = if override_path.is_file() {
            let content = std::fs::read_to_string(&override_path)
                .with_context(|| format!("Failed to read {:?}", override_path))?;
            let parsed: StatsConfig = toml::from_str(&content)
                .with_context(|| format!("Failed to parse {:?}", override_path))?;
            debug!("Loaded statistics config from {:?}", override_path);
            parsed
        } else {
            Self::default()
        };

        config.project_root = project_root;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the engine cannot work with
    pub fn validate(&self) -> Result<()> {
        if self.retention == 0 {
            anyhow::bail!("retention must keep at least one snapshot");
        }
        if self.source_timeout.is_zero() {
            anyhow::bail!("source_timeout must be greater than zero");
        }
        Ok(())
    }

    pub fn with_history_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.history_path = path.into();
        self
    }

    pub fn with_retention(mut self, retention: usize) -> Self {
        self.retention = retention;
        self
    }

    pub fn with_source_timeout(mut self, timeout: Duration) -> Self {
        self.source_timeout = timeout;
        self
    }

    pub fn with_project_start(mut self, start: DateTime<Utc>) -> Self {
        self.project_start = Some(start);
        self
    }

    /// Absolute location of the history log
    pub fn resolved_history_path(&self) -> PathBuf {
        if self.history_path.is_absolute() {
            self.history_path.clone()
        } else {
            self.project_root.join(&self.history_path)
        }
    }

    /// Project start date: explicit override, then the project's install date
    ///
    /// `None` means no start date is known; the calculator then treats the project as
    /// starting today.
    pub fn resolve_project_start(&self) -> Option<DateTime<Utc>> {
        self.project_start
            .or_else(|| load_install_date(&self.project_root))
    }
}
