use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use archiver_core::{url_path_components, SavedLinksIndex};
use archiver_logging::archiver_debug;

use crate::persist::{
    load_json, remove_file_if_exists, save_json, to_json_text, AtomicFileWriter, PersistError,
};

const INDEX_FILE: &str = "list.json";
const GITATTRIBUTES_FILE: &str = ".gitattributes";
const BODY_FILE: &str = "%body";
const LFS_ATTRIBUTES: &str = "**/* filter=lfs diff=lfs merge=lfs -text\n\
.gitattributes !filter !diff !merge text\n\
list.json !filter !diff !merge text\n";

/// On-disk store of archived response bodies plus the saved-links index.
///
/// A body lives at `<root>/<url components>/%body`. The components are
/// distinct per url and never equal `%body`, so no body path is a prefix of
/// another and concurrent writers in one run never collide.
#[derive(Debug, Clone)]
pub struct LinkStore {
    writer: AtomicFileWriter,
}

impl LinkStore {
    pub fn new(root: PathBuf) -> Self {
        Self {
            writer: AtomicFileWriter::new(root),
        }
    }

    pub fn root(&self) -> &Path {
        self.writer.root()
    }

    /// Body path relative to the root; `None` when the url would land on
    /// the index or attributes file.
    pub fn relative_path(url: &str) -> Option<PathBuf> {
        let components = url_path_components(url);
        match components.first().map(String::as_str) {
            None | Some(INDEX_FILE | GITATTRIBUTES_FILE) => None,
            Some(_) => Some(
                components
                    .iter()
                    .map(String::as_str)
                    .chain([BODY_FILE])
                    .collect(),
            ),
        }
    }

    pub fn file_path(&self, url: &str) -> Option<PathBuf> {
        Self::relative_path(url).map(|relative| self.root().join(relative))
    }

    pub fn write_body(&self, url: &str, body: &[u8]) -> Result<PathBuf, PersistError> {
        let relative =
            Self::relative_path(url).ok_or_else(|| PersistError::UnmappableUrl(url.to_string()))?;
        self.writer.write(&relative, body)
    }

    pub fn index_path(&self) -> PathBuf {
        self.root().join(INDEX_FILE)
    }

    pub fn load_index(&self) -> Result<Option<SavedLinksIndex>, PersistError> {
        let path = self.index_path();
        archiver_debug!("load saved link index from {:?}", path);
        load_json(&path)
    }

    /// Writes the index when its content changed; returns whether it did.
    pub fn save_index(&self, index: &SavedLinksIndex) -> Result<bool, PersistError> {
        let path = self.index_path();
        let text = to_json_text(&path, index)?;
        match fs::read_to_string(&path) {
            Ok(existing) if existing == text => return Ok(false),
            Ok(_) => {}
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => return Err(err.into()),
        }
        archiver_debug!("save saved link index to {:?}", path);
        save_json(&path, index)?;
        Ok(true)
    }

    pub fn gitattributes_path(&self) -> PathBuf {
        self.root().join(GITATTRIBUTES_FILE)
    }

    /// Creates the LFS attributes file if missing; returns whether it did.
    pub fn ensure_gitattributes(&self) -> Result<bool, PersistError> {
        if self.gitattributes_path().exists() {
            return Ok(false);
        }
        self.writer
            .write(Path::new(GITATTRIBUTES_FILE), LFS_ATTRIBUTES.as_bytes())?;
        Ok(true)
    }

    pub fn remove(&self, path: &Path) -> Result<bool, PersistError> {
        let removed = remove_file_if_exists(path)?;
        if removed {
            archiver_debug!("delete archived link {:?}", path);
        }
        Ok(removed)
    }

    /// Removes empty directories below the root, deepest first. The root
    /// itself is kept.
    pub fn prune_empty_dirs(&self) -> Result<usize, PersistError> {
        if !self.root().is_dir() {
            return Ok(0);
        }
        let mut removed = 0;
        for entry in fs::read_dir(self.root())? {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                removed += prune(&entry.path())?;
            }
        }
        Ok(removed)
    }
}

fn prune(dir: &Path) -> Result<usize, PersistError> {
    let mut removed = 0;
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            removed += prune(&entry.path())?;
        }
    }
    if fs::read_dir(dir)?.next().is_none() {
        archiver_debug!("delete empty directory {:?}", dir);
        fs::remove_dir(dir)?;
        removed += 1;
    }
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relative_path_drops_scheme() {
        assert_eq!(
            LinkStore::relative_path("https://example.com/a/b.png"),
            Some(
                PathBuf::from("example.com")
                    .join("a")
                    .join("b.png")
                    .join(BODY_FILE)
            )
        );
    }

    #[test]
    fn urls_over_reserved_files_have_no_path() {
        assert_eq!(LinkStore::relative_path("https://list.json/x"), None);
        assert_eq!(LinkStore::relative_path("https://.gitattributes"), None);
    }
}
