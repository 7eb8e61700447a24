use std::io;
use std::path::PathBuf;

use archiver_core::{CommitTarget, CommitTargetError, LinkExtractor, Snapshot, Timestamp};
use archiver_logging::{archiver_info, archiver_warn};
use chrono::{DateTime, SecondsFormat};
use thiserror::Error;

use crate::persist::PersistError;
use crate::reconcile::{ArchiveError, Archiver};
use crate::repository::{SnapshotRepository, StagingError};
use crate::snapshot_store::{SnapshotFile, SnapshotStore};

#[derive(Debug, Error)]
pub enum VcsError {
    #[error("failed to run {command}: {source}")]
    Spawn {
        command: String,
        #[source]
        source: io::Error,
    },
    #[error("{command} failed ({status}): {stderr}")]
    Failed {
        command: String,
        status: String,
        stderr: String,
    },
}

/// Version-control collaborator: stages a [`CommitTarget`] and records it.
pub trait VersionControl {
    /// Commit time of the current head, `None` for an empty history.
    fn latest_commit_timestamp(&self) -> Result<Option<Timestamp>, VcsError>;

    /// Stages every path of `target` and commits it dated `timestamp`. An
    /// empty target still yields a commit.
    fn commit(
        &self,
        target: &CommitTarget,
        message: &str,
        timestamp: Timestamp,
    ) -> Result<(), VcsError>;
}

#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Persist(#[from] PersistError),
    #[error(transparent)]
    Staging(#[from] StagingError),
    #[error(transparent)]
    Archive(#[from] ArchiveError),
    #[error(transparent)]
    Structural(#[from] CommitTargetError),
    #[error(transparent)]
    Vcs(#[from] VcsError),
    #[error("snapshot file disappeared: {0:?}")]
    MissingSnapshot(PathBuf),
}

/// `"<project> <RFC 3339 UTC time>"`.
pub fn commit_message(project: &str, timestamp: Timestamp) -> String {
    let time = DateTime::from_timestamp(timestamp, 0)
        .map(|time| time.to_rfc3339_opts(SecondsFormat::Secs, true))
        .unwrap_or_else(|| timestamp.to_string());
    format!("{project} {time}")
}

/// Commits pending snapshots one by one, oldest first.
pub struct Synchronizer<V> {
    project: String,
    repository: SnapshotRepository,
    archiver: Option<Archiver>,
    extractor: Box<dyn LinkExtractor>,
    vcs: V,
}

impl<V: VersionControl> Synchronizer<V> {
    /// `archiver` is `None` when link archival is disabled.
    pub fn new(
        project: &str,
        repository: SnapshotRepository,
        archiver: Option<Archiver>,
        extractor: Box<dyn LinkExtractor>,
        vcs: V,
    ) -> Self {
        Self {
            project: project.to_string(),
            repository,
            archiver,
            extractor,
            vcs,
        }
    }

    pub fn vcs(&self) -> &V {
        &self.vcs
    }

    pub fn repository(&self) -> &SnapshotRepository {
        &self.repository
    }

    /// Writes one snapshot into the working tree and archives its links.
    pub async fn stage(&mut self, snapshot: Snapshot) -> Result<CommitTarget, SyncError> {
        let timestamp = snapshot.timestamp;
        let links = self
            .archiver
            .as_ref()
            .map(|_| self.extractor.external_links(&snapshot));
        let mut target = self.repository.update(snapshot)?;
        if let (Some(archiver), Some(links)) = (&self.archiver, links) {
            target.merge(archiver.run(timestamp, links).await?)?;
        }
        Ok(target)
    }

    pub async fn commit_snapshot(&mut self, file: &SnapshotFile) -> Result<CommitTarget, SyncError> {
        let snapshot = file
            .load()?
            .ok_or_else(|| SyncError::MissingSnapshot(file.path.clone()))?;
        let timestamp = snapshot.timestamp;
        if timestamp != file.timestamp {
            archiver_warn!(
                "{:?} exported at {timestamp}, committing under its exported time",
                file.path
            );
        }
        let target = self.stage(snapshot).await?;
        let message = commit_message(&self.project, timestamp);
        archiver_info!("commit {message:?} ({} paths)", target.len());
        self.vcs.commit(&target, &message, timestamp)?;
        Ok(target)
    }

    /// Commits every snapshot newer than the latest commit and `start`.
    /// Returns the committed timestamps.
    pub async fn commit_snapshots(
        &mut self,
        store: &SnapshotStore,
        start: Option<Timestamp>,
    ) -> Result<Vec<Timestamp>, SyncError> {
        let latest = self.vcs.latest_commit_timestamp()?;
        match latest {
            Some(latest) => archiver_info!("latest commit: {}", commit_message(&self.project, latest)),
            None => archiver_info!("no commit yet"),
        }
        let pending = store.pending(latest, start)?;
        archiver_info!("{} snapshots to commit", pending.len());
        let mut committed = Vec::with_capacity(pending.len());
        for file in &pending {
            self.commit_snapshot(file).await?;
            committed.push(file.timestamp);
        }
        Ok(committed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_uses_utc_rfc3339() {
        assert_eq!(commit_message("proj", 0), "proj 1970-01-01T00:00:00Z");
        assert_eq!(commit_message("proj", 1_700_000_000), "proj 2023-11-14T22:13:20Z");
    }
}
