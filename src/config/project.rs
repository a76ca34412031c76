//! Narrow accessor for the project configuration file
//!
//! Only the install date is consumed; it serves as the project start date.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::path::Path;
use tracing::debug;

/// The subset of the project configuration the engine reads
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProjectConfig {
    pub installed_at: Option<DateTime<Utc>>,
}

/// Read the project's install date
///
/// Looks at `.doplan/config.yaml`, then the legacy `.cursor/config/doplan-config.json`.
/// Unreadable or unparsable files count as "no date".
pub fn load_install_date(project_root: &Path) -> Option<DateTime<Utc>> {
    let yaml_path = project_root.join(".doplan").join("config.yaml");
    let json_path = project_root
        .join(".cursor")
        .join("config")
        .join("doplan-config.json");

    let config = if let Ok(content) = std::fs::read_to_string(&yaml_path) {
        serde_yaml::from_str::<ProjectConfig>(&content)
            .map_err(|e| debug!("Ignoring unparsable {:?}: {}", yaml_path, e))
            .ok()
    } else if let Ok(content) = std::fs::read_to_string(&json_path) {
        serde_json::from_str::<ProjectConfig>(&content)
            .map_err(|e| debug!("Ignoring unparsable {:?}: {}", json_path, e))
            .ok()
    } else {
        None
    };

    config.and_then(|c| c.installed_at)
}
