//! Archiver core: snapshot model, diffing, commit targets and link classification.
//!
//! Nothing in this crate touches the network; the only filesystem access is
//! path normalization inside [`CommitTarget`].
mod classify;
mod commit_target;
mod diff;
mod escape;
mod extract;
mod model;
mod policy;
mod record;

pub use classify::{classify, re_request_targets, ClassifiedLinks};
pub use commit_target::{Category, CommitTarget, CommitTargetError, Overlap};
pub use diff::{diff, DocumentChange, DocumentDiff};
pub use escape::{escape_filename, escape_url_segment, key_documents, url_path_components};
pub use extract::{LineScanExtractor, LinkExtractor};
pub use model::{
    DetailedLine, Document, ExternalLink, Line, Location, PageOrder, Snapshot, Timestamp, User,
};
pub use policy::{ArchivePolicy, PolicyError};
pub use record::{LinkRecord, LinkResponse, SavedLinksIndex};
