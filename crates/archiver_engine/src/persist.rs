use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;
use tempfile::NamedTempFile;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PersistError {
    #[error("output directory missing or not writable: {0}")]
    OutputDir(String),
    #[error("url {0:?} has no archive path")]
    UnmappableUrl(String),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("json error in {path:?}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Ensure output directory exists; create if missing.
pub fn ensure_output_dir(dir: &Path) -> Result<(), PersistError> {
    if dir.exists() {
        let meta = fs::metadata(dir).map_err(|e| PersistError::OutputDir(e.to_string()))?;
        if !meta.is_dir() {
            return Err(PersistError::OutputDir(format!(
                "{} is not a directory",
                dir.display()
            )));
        }
    } else {
        fs::create_dir_all(dir).map_err(|e| PersistError::OutputDir(e.to_string()))?;
    }
    Ok(())
}

/// Atomically writes files below a root by writing a sibling temp file and
/// renaming it over the target. Parent directories are created on demand.
#[derive(Debug, Clone)]
pub struct AtomicFileWriter {
    root: PathBuf,
}

impl AtomicFileWriter {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn write(&self, relative: &Path, content: &[u8]) -> Result<PathBuf, PersistError> {
        let target = self.root.join(relative);
        let parent = target.parent().unwrap_or(&self.root).to_path_buf();
        ensure_output_dir(&parent)?;

        let mut tmp = NamedTempFile::new_in(&parent)?;
        tmp.write_all(content)?;
        tmp.flush()?;
        tmp.as_file_mut().sync_all()?;

        // Replace existing file if present to keep determinism.
        if target.is_file() {
            fs::remove_file(&target)?;
        }
        tmp.persist(&target).map_err(|e| PersistError::Io(e.error))?;
        Ok(target)
    }
}

/// Reads a JSON file; a missing file is `Ok(None)`.
pub fn load_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, PersistError> {
    let text = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(err.into()),
    };
    serde_json::from_str(&text)
        .map(Some)
        .map_err(|source| PersistError::Json {
            path: path.to_path_buf(),
            source,
        })
}

/// Two-space indented JSON with a trailing newline, written atomically.
pub fn save_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), PersistError> {
    let text = to_json_text(path, value)?;
    let (dir, name) = match (path.parent(), path.file_name()) {
        (Some(dir), Some(name)) => (dir, name),
        _ => {
            return Err(PersistError::OutputDir(format!(
                "{} has no parent directory",
                path.display()
            )))
        }
    };
    AtomicFileWriter::new(dir.to_path_buf()).write(Path::new(name), text.as_bytes())?;
    Ok(())
}

/// Serialized form [`save_json`] would write, for change detection.
pub fn to_json_text<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<String, PersistError> {
    let mut text = serde_json::to_string_pretty(value).map_err(|source| PersistError::Json {
        path: path.to_path_buf(),
        source,
    })?;
    text.push('\n');
    Ok(text)
}

/// Deletes a file; an already missing file is not an error.
pub fn remove_file_if_exists(path: &Path) -> Result<bool, PersistError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(err) => Err(err.into()),
    }
}
