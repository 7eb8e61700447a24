use std::collections::BTreeSet;
use std::fmt;
use std::io;
use std::path::{Component, Path, PathBuf};

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Category {
    Added,
    Updated,
    Deleted,
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Category::Added => write!(f, "added"),
            Category::Updated => write!(f, "updated"),
            Category::Deleted => write!(f, "deleted"),
        }
    }
}

/// A path claimed by two categories at once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Overlap {
    pub path: PathBuf,
    pub first: Category,
    pub second: Category,
}

impl fmt::Display for Overlap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "\"{}\" exists in both \"{}\" and \"{}\"",
            self.path.display(),
            self.first,
            self.second
        )
    }
}

#[derive(Debug, Error)]
pub enum CommitTargetError {
    #[error("commit target categories overlap: {}", format_overlaps(.0))]
    Overlap(Vec<Overlap>),
    #[error("cannot make {path:?} absolute: {source}")]
    Normalize {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

fn format_overlaps(overlaps: &[Overlap]) -> String {
    overlaps
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Paths staged for one version-control commit, split into pairwise
/// disjoint added / updated / deleted sets of absolute paths.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommitTarget {
    added: BTreeSet<PathBuf>,
    updated: BTreeSet<PathBuf>,
    deleted: BTreeSet<PathBuf>,
}

impl CommitTarget {
    /// Normalizes every path and rejects any path present in two categories.
    pub fn new<A, U, D>(added: A, updated: U, deleted: D) -> Result<Self, CommitTargetError>
    where
        A: IntoIterator<Item = PathBuf>,
        U: IntoIterator<Item = PathBuf>,
        D: IntoIterator<Item = PathBuf>,
    {
        let target = Self {
            added: normalize_all(added)?,
            updated: normalize_all(updated)?,
            deleted: normalize_all(deleted)?,
        };
        target.validate()?;
        Ok(target)
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn added(&self) -> &BTreeSet<PathBuf> {
        &self.added
    }

    pub fn updated(&self) -> &BTreeSet<PathBuf> {
        &self.updated
    }

    pub fn deleted(&self) -> &BTreeSet<PathBuf> {
        &self.deleted
    }

    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.updated.is_empty() && self.deleted.is_empty()
    }

    pub fn len(&self) -> usize {
        self.added.len() + self.updated.len() + self.deleted.len()
    }

    /// Every staged path in category order: added, updated, deleted.
    pub fn paths(&self) -> impl Iterator<Item = &Path> {
        self.added
            .iter()
            .chain(self.updated.iter())
            .chain(self.deleted.iter())
            .map(PathBuf::as_path)
    }

    /// Unions `other` into `self`. On overlap `self` is left untouched.
    pub fn merge(&mut self, other: CommitTarget) -> Result<(), CommitTargetError> {
        let merged = Self {
            added: self.added.union(&other.added).cloned().collect(),
            updated: self.updated.union(&other.updated).cloned().collect(),
            deleted: self.deleted.union(&other.deleted).cloned().collect(),
        };
        merged.validate()?;
        *self = merged;
        Ok(())
    }

    fn validate(&self) -> Result<(), CommitTargetError> {
        let pairs = [
            (Category::Added, &self.added, Category::Updated, &self.updated),
            (Category::Added, &self.added, Category::Deleted, &self.deleted),
            (Category::Updated, &self.updated, Category::Deleted, &self.deleted),
        ];
        let overlaps: Vec<Overlap> = pairs
            .into_iter()
            .flat_map(|(first, a, second, b)| {
                a.intersection(b).map(move |path| Overlap {
                    path: path.clone(),
                    first,
                    second,
                })
            })
            .collect();
        if overlaps.is_empty() {
            Ok(())
        } else {
            Err(CommitTargetError::Overlap(overlaps))
        }
    }
}

fn normalize_all<I>(paths: I) -> Result<BTreeSet<PathBuf>, CommitTargetError>
where
    I: IntoIterator<Item = PathBuf>,
{
    paths.into_iter().map(|path| normalize(&path)).collect()
}

/// Canonical absolute form. Symlinks are resolved for the longest existing
/// prefix (the file itself, else its parent); the rest is resolved lexically so
/// paths of already deleted files normalize the same way as live ones.
fn normalize(path: &Path) -> Result<PathBuf, CommitTargetError> {
    let absolute = std::path::absolute(path).map_err(|source| CommitTargetError::Normalize {
        path: path.to_path_buf(),
        source,
    })?;
    let lexical = lexical_clean(&absolute);
    if let Ok(canonical) = lexical.canonicalize() {
        return Ok(canonical);
    }
    if let (Some(parent), Some(name)) = (lexical.parent(), lexical.file_name()) {
        if let Ok(parent) = parent.canonicalize() {
            return Ok(parent.join(name));
        }
    }
    Ok(lexical)
}

fn lexical_clean(path: &Path) -> PathBuf {
    let mut cleaned = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                cleaned.pop();
            }
            other => cleaned.push(other.as_os_str()),
        }
    }
    cleaned
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lexical_clean_drops_dot_segments() {
        assert_eq!(
            lexical_clean(Path::new("/a/./b/../c")),
            PathBuf::from("/a/c")
        );
    }

    #[test]
    fn relative_and_absolute_forms_collide() {
        let cwd = std::env::current_dir().unwrap();
        let err = CommitTarget::new(
            vec![PathBuf::from("some-file.json")],
            vec![cwd.join("some-file.json")],
            Vec::new(),
        )
        .unwrap_err();
        assert!(matches!(err, CommitTargetError::Overlap(ref o) if o.len() == 1));
    }
}
