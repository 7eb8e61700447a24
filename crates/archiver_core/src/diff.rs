use crate::escape::key_documents;
use crate::model::Document;

/// One side of a document change: the storage key and the raw title.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentChange {
    pub key: String,
    pub title: String,
}

/// Result of comparing two document lists by storage key. Every list is
/// sorted by key.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DocumentDiff {
    pub added: Vec<DocumentChange>,
    pub updated: Vec<DocumentChange>,
    pub deleted: Vec<DocumentChange>,
}

impl DocumentDiff {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.updated.is_empty() && self.deleted.is_empty()
    }
}

/// Compares `current` against `previous`.
///
/// Documents are matched by escaped title; a matched pair counts as updated
/// whenever any field differs, even if `updated` was not bumped.
pub fn diff(current: &[Document], previous: &[Document]) -> DocumentDiff {
    let current = key_documents(current);
    let mut previous = key_documents(previous);
    let mut result = DocumentDiff::default();

    for (key, document) in current {
        let change = || DocumentChange {
            key: key.clone(),
            title: document.title.clone(),
        };
        match previous.remove(&key) {
            None => result.added.push(change()),
            Some(old) if old != document => result.updated.push(change()),
            Some(_) => {}
        }
    }
    result.deleted = previous
        .into_iter()
        .map(|(key, document)| DocumentChange {
            key,
            title: document.title.clone(),
        })
        .collect();
    result
}
