//! Archiver engine: link fetching, on-disk stores and the commit pass.
mod fetch;
mod link_store;
mod log_store;
mod persist;
mod pipeline;
mod reconcile;
mod repository;
mod snapshot_store;
mod sync;
mod types;

pub use fetch::{ClientBuildError, FetchSettings, Fetcher, ReqwestFetcher};
pub use link_store::LinkStore;
pub use log_store::{KeepLogs, LogDirectory, LogFile};
pub use persist::{ensure_output_dir, load_json, save_json, AtomicFileWriter, PersistError};
pub use pipeline::{FetchPipeline, PipelineSettings};
pub use reconcile::{ArchiveError, Archiver, LinkArchiveConfig, LinkSessionConfig};
pub use repository::{SnapshotRepository, StagingError};
pub use snapshot_store::{SnapshotFile, SnapshotStore};
pub use sync::{commit_message, SyncError, Synchronizer, VcsError, VersionControl};
pub use types::{system_clock, Clock, FailureKind, FetchError, FetchOutput};
