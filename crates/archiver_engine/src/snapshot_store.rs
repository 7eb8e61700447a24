use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use archiver_core::{Snapshot, Timestamp};
use archiver_logging::archiver_debug;

use crate::persist::{load_json, PersistError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotFile {
    pub timestamp: Timestamp,
    pub path: PathBuf,
}

impl SnapshotFile {
    pub fn load(&self) -> Result<Option<Snapshot>, PersistError> {
        archiver_debug!("load snapshot {:?}", self.path);
        load_json(&self.path)
    }
}

/// Directory of downloaded snapshots named `<timestamp>.json`.
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    dir: PathBuf,
}

impl SnapshotStore {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// All snapshots, oldest first.
    pub fn snapshots(&self) -> Result<Vec<SnapshotFile>, PersistError> {
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
            let name = entry.file_name();
            let Some(timestamp) = name
                .to_str()
                .and_then(|name| name.strip_suffix(".json"))
                .filter(|stem| !stem.is_empty() && stem.bytes().all(|b| b.is_ascii_digit()))
                .and_then(|stem| stem.parse().ok())
            else {
                continue;
            };
            files.push(SnapshotFile {
                timestamp,
                path: entry.path(),
            });
        }
        files.sort_by_key(|file| file.timestamp);
        Ok(files)
    }

    /// Snapshots strictly newer than both the latest commit and the start date.
    pub fn pending(
        &self,
        latest_commit: Option<Timestamp>,
        start: Option<Timestamp>,
    ) -> Result<Vec<SnapshotFile>, PersistError> {
        let threshold = latest_commit.into_iter().chain(start).max();
        Ok(self
            .snapshots()?
            .into_iter()
            .filter(|file| threshold.is_none_or(|threshold| threshold < file.timestamp))
            .collect())
    }
}
