use std::path::{Path, PathBuf};

use archiver_core::{
    diff, escape_filename, key_documents, CommitTarget, CommitTargetError, PageOrder, Snapshot,
};
use archiver_logging::{archiver_debug, archiver_info};
use thiserror::Error;

use crate::persist::{load_json, remove_file_if_exists, save_json, PersistError};

const PAGES_DIR: &str = "pages";

#[derive(Debug, Error)]
pub enum StagingError {
    #[error(transparent)]
    Persist(#[from] PersistError),
    #[error(transparent)]
    Structural(#[from] CommitTargetError),
}

/// Working-tree view of the last committed snapshot.
///
/// Layout: `<dir>/<escaped project>.json` holds the whole snapshot and
/// `<dir>/pages/<key>.json` one file per document.
#[derive(Debug)]
pub struct SnapshotRepository {
    project: String,
    dir: PathBuf,
    page_order: PageOrder,
    current: Option<Snapshot>,
}

impl SnapshotRepository {
    /// Opens the repository and loads the stored snapshot, if any.
    pub fn open(project: &str, dir: &Path, page_order: PageOrder) -> Result<Self, PersistError> {
        let mut repository = Self {
            project: project.to_string(),
            dir: dir.to_path_buf(),
            page_order,
            current: None,
        };
        repository.current = load_json::<Snapshot>(&repository.project_path())?.map(|mut stored| {
            page_order.apply(&mut stored.documents);
            stored
        });
        Ok(repository)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn snapshot(&self) -> Option<&Snapshot> {
        self.current.as_ref()
    }

    pub fn project_path(&self) -> PathBuf {
        self.dir.join(format!("{}.json", escape_filename(&self.project)))
    }

    pub fn page_path(&self, key: &str) -> PathBuf {
        self.dir.join(PAGES_DIR).join(format!("{key}.json"))
    }

    /// Writes `snapshot` over the stored one and returns the touched files.
    pub fn update(&mut self, mut snapshot: Snapshot) -> Result<CommitTarget, StagingError> {
        self.page_order.apply(&mut snapshot.documents);
        let mut added = Vec::new();
        let mut updated = Vec::new();
        let mut deleted = Vec::new();

        let project_path = self.project_path();
        match &self.current {
            Some(current) if *current == snapshot => {}
            current => {
                archiver_debug!("write {:?}", project_path);
                save_json(&project_path, &snapshot)?;
                if current.is_some() {
                    updated.push(project_path);
                } else {
                    added.push(project_path);
                }
            }
        }

        let previous = self
            .current
            .as_ref()
            .map(|current| current.documents.as_slice())
            .unwrap_or_default();
        let changes = diff(&snapshot.documents, previous);
        let keyed = key_documents(&snapshot.documents);
        for (written, bucket) in [(&changes.added, &mut added), (&changes.updated, &mut updated)] {
            for change in written {
                let Some(document) = keyed.get(&change.key) else {
                    continue;
                };
                let path = self.page_path(&change.key);
                archiver_debug!("write page {:?} to {:?}", change.title, path);
                save_json(&path, *document)?;
                bucket.push(path);
            }
        }
        for change in &changes.deleted {
            let path = self.page_path(&change.key);
            archiver_debug!("remove page {:?} at {:?}", change.title, path);
            remove_file_if_exists(&path)?;
            deleted.push(path);
        }
        archiver_info!(
            "pages: {} added, {} updated, {} deleted",
            changes.added.len(),
            changes.updated.len(),
            changes.deleted.len()
        );

        self.current = Some(snapshot);
        Ok(CommitTarget::new(added, updated, deleted)?)
    }
}
