use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use archiver_core::{PageOrder, Timestamp};
use archiver_engine::LinkArchiveConfig;
use chrono::DateTime;
use serde::{Deserialize, Serialize};

/// Contents of the RON configuration file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    /// Project name; also the name of the snapshot file in the repository.
    pub project: String,
    /// Directory holding downloaded `<timestamp>.json` snapshots.
    pub snapshot_directory: PathBuf,
    /// RFC 3339 time; older snapshots are never committed.
    #[serde(default)]
    pub start_date: Option<String>,
    /// Appends log output to this file in addition to the terminal.
    #[serde(default)]
    pub log_file: Option<PathBuf>,
    pub git: GitConfig,
    #[serde(default)]
    pub external_link: LinkArchiveConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GitConfig {
    /// Working tree of the history repository.
    pub path: PathBuf,
    #[serde(default)]
    pub executable: Option<PathBuf>,
    #[serde(default)]
    pub branch: Option<String>,
    #[serde(default)]
    pub page_order: PageOrder,
    #[serde(default)]
    pub user_name: Option<String>,
    #[serde(default)]
    pub user_email: Option<String>,
    /// Paths passed to one `git add` invocation.
    #[serde(default = "default_staging_step_size")]
    pub staging_step_size: usize,
}

fn default_staging_step_size() -> usize {
    100
}

impl AppConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("invalid config {}", path.display()))
    }

    pub fn parse(text: &str) -> Result<Self> {
        let config: AppConfig = ron::from_str(text)?;
        config.start_timestamp()?;
        Ok(config)
    }

    pub fn start_timestamp(&self) -> Result<Option<Timestamp>> {
        self.start_date
            .as_deref()
            .map(|date| {
                DateTime::parse_from_rfc3339(date)
                    .map(|time| time.timestamp())
                    .with_context(|| format!("start_date {date:?} is not RFC 3339"))
            })
            .transpose()
    }
}
