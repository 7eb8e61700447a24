use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use archiver_core::{LinkRecord, Timestamp};
use archiver_logging::{archiver_debug, archiver_info};
use serde::{Deserialize, Serialize};

use crate::persist::{load_json, save_json, PersistError};

const LOG_PREFIX: &str = "external_link_";
const LOG_SUFFIX: &str = ".json";

/// How many per-snapshot link logs survive a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "KeepLogsRepr", into = "KeepLogsRepr")]
pub enum KeepLogs {
    #[default]
    All,
    Latest(usize),
}

#[derive(Clone, Copy, Serialize, Deserialize)]
#[serde(untagged)]
enum KeepLogsRepr {
    Count(usize),
    Keyword(AllTag),
}

#[derive(Clone, Copy, Serialize, Deserialize)]
enum AllTag {
    #[serde(rename = "all")]
    All,
}

impl From<KeepLogsRepr> for KeepLogs {
    fn from(repr: KeepLogsRepr) -> Self {
        match repr {
            KeepLogsRepr::Count(count) => KeepLogs::Latest(count),
            KeepLogsRepr::Keyword(AllTag::All) => KeepLogs::All,
        }
    }
}

impl From<KeepLogs> for KeepLogsRepr {
    fn from(keep: KeepLogs) -> Self {
        match keep {
            KeepLogs::All => KeepLogsRepr::Keyword(AllTag::All),
            KeepLogs::Latest(count) => KeepLogsRepr::Count(count),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogFile {
    pub path: PathBuf,
    pub timestamp: Timestamp,
}

/// Directory of `external_link_<timestamp>.json` files, one per archived snapshot.
#[derive(Debug, Clone)]
pub struct LogDirectory {
    dir: PathBuf,
}

impl LogDirectory {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    pub fn file_path(&self, timestamp: Timestamp) -> PathBuf {
        self.dir.join(format!("{LOG_PREFIX}{timestamp}{LOG_SUFFIX}"))
    }

    pub fn find(&self, timestamp: Timestamp) -> Option<LogFile> {
        let path = self.file_path(timestamp);
        path.is_file().then_some(LogFile { path, timestamp })
    }

    /// Every log file, oldest first. A missing directory has no logs.
    pub fn find_all(&self) -> Result<Vec<LogFile>, PersistError> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };
        let mut files = Vec::new();
        for entry in entries {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            if let Some(timestamp) = parse_timestamp(&entry.file_name().to_string_lossy()) {
                files.push(LogFile {
                    path: entry.path(),
                    timestamp,
                });
            }
        }
        files.sort_by_key(|file| file.timestamp);
        Ok(files)
    }

    /// Newest log strictly older than `timestamp`.
    pub fn find_latest_before(&self, timestamp: Timestamp) -> Result<Option<LogFile>, PersistError> {
        Ok(self
            .find_all()?
            .into_iter()
            .rev()
            .find(|file| file.timestamp < timestamp))
    }

    pub fn load(&self, timestamp: Timestamp) -> Result<Option<Vec<LinkRecord>>, PersistError> {
        match self.find(timestamp) {
            Some(file) => {
                archiver_info!("load link log from {:?}", file.path);
                load_json(&file.path)
            }
            None => Ok(None),
        }
    }

    pub fn load_latest_before(
        &self,
        timestamp: Timestamp,
    ) -> Result<Option<Vec<LinkRecord>>, PersistError> {
        match self.find_latest_before(timestamp)? {
            Some(file) => {
                archiver_info!("load previous link log from {:?}", file.path);
                load_json(&file.path)
            }
            None => Ok(None),
        }
    }

    pub fn save(&self, timestamp: Timestamp, records: &[LinkRecord]) -> Result<PathBuf, PersistError> {
        let path = self.file_path(timestamp);
        archiver_info!("save {} link records to {:?}", records.len(), path);
        save_json(&path, records)?;
        Ok(path)
    }

    /// Applies retention and returns the removed files.
    pub fn clean(&self, keep: KeepLogs) -> Result<Vec<PathBuf>, PersistError> {
        let KeepLogs::Latest(keep) = keep else {
            return Ok(Vec::new());
        };
        let mut files = self.find_all()?;
        files.reverse();
        let stale: Vec<PathBuf> = files.into_iter().skip(keep).map(|file| file.path).collect();
        archiver_info!("clean {} link log files", stale.len());
        for path in &stale {
            archiver_debug!("delete link log {:?}", path);
            fs::remove_file(path)?;
        }
        Ok(stale)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

fn parse_timestamp(file_name: &str) -> Option<Timestamp> {
    let digits = file_name.strip_prefix(LOG_PREFIX)?.strip_suffix(LOG_SUFFIX)?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_only_log_file_names() {
        assert_eq!(parse_timestamp("external_link_1700.json"), Some(1700));
        assert_eq!(parse_timestamp("external_link_.json"), None);
        assert_eq!(parse_timestamp("external_link_-1.json"), None);
        assert_eq!(parse_timestamp("list.json"), None);
    }

    #[test]
    fn keep_logs_reads_keyword_or_count() {
        let all: KeepLogs = serde_json::from_str("\"all\"").unwrap();
        assert_eq!(all, KeepLogs::All);
        let three: KeepLogs = serde_json::from_str("3").unwrap();
        assert_eq!(three, KeepLogs::Latest(3));
        assert_eq!(serde_json::to_string(&KeepLogs::All).unwrap(), "\"all\"");
    }
}
