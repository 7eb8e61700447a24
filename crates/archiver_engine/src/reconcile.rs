use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use archiver_core::{
    classify, re_request_targets, ArchivePolicy, CommitTarget, CommitTargetError, ExternalLink,
    LinkRecord, PolicyError, SavedLinksIndex, Timestamp,
};
use archiver_logging::{archiver_debug, archiver_info};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::fetch::{ClientBuildError, FetchSettings, Fetcher, ReqwestFetcher};
use crate::link_store::LinkStore;
use crate::log_store::{KeepLogs, LogDirectory};
use crate::persist::PersistError;
use crate::pipeline::{FetchPipeline, PipelineSettings};
use crate::types::{system_clock, Clock};

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error(transparent)]
    Persist(#[from] PersistError),
    #[error(transparent)]
    Structural(#[from] CommitTargetError),
    #[error(transparent)]
    Policy(#[from] PolicyError),
    #[error(transparent)]
    Client(#[from] ClientBuildError),
}

/// HTTP session settings for link archival.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LinkSessionConfig {
    /// Whole-request timeout in seconds.
    pub timeout: f64,
    /// `0` means no per-host ceiling.
    pub parallel_limit_per_host: usize,
    pub user_agent: Option<String>,
    pub request_headers: BTreeMap<String, String>,
    pub redirect_limit: usize,
}

impl Default for LinkSessionConfig {
    fn default() -> Self {
        Self {
            timeout: 30.0,
            parallel_limit_per_host: 0,
            user_agent: None,
            request_headers: BTreeMap::new(),
            redirect_limit: 10,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LinkArchiveConfig {
    pub enabled: bool,
    pub use_git_lfs: bool,
    /// Per-snapshot link logs; relative paths resolve against the working directory.
    pub log_directory: PathBuf,
    /// Archived bodies, relative to the repository root.
    pub save_directory: PathBuf,
    pub session: LinkSessionConfig,
    pub parallel_limit: usize,
    /// Pause after each request, in seconds.
    pub request_interval: f64,
    pub content_types: Vec<String>,
    pub excluded_urls: Vec<String>,
    pub always_request_all_links: bool,
    pub keep_logs: KeepLogs,
    pub keep_deleted_links: bool,
}

impl Default for LinkArchiveConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            use_git_lfs: false,
            log_directory: PathBuf::from("log"),
            save_directory: PathBuf::from("links"),
            session: LinkSessionConfig::default(),
            parallel_limit: 5,
            request_interval: 1.0,
            content_types: Vec::new(),
            excluded_urls: Vec::new(),
            always_request_all_links: false,
            keep_logs: KeepLogs::All,
            keep_deleted_links: false,
        }
    }
}

impl LinkArchiveConfig {
    pub fn fetch_settings(&self) -> FetchSettings {
        FetchSettings {
            request_timeout: seconds(self.session.timeout),
            redirect_limit: self.session.redirect_limit,
            user_agent: self.session.user_agent.clone(),
            request_headers: self.session.request_headers.clone(),
            ..FetchSettings::default()
        }
    }

    pub fn pipeline_settings(&self) -> PipelineSettings {
        PipelineSettings {
            parallel_limit: self.parallel_limit,
            parallel_limit_per_host: self.session.parallel_limit_per_host,
            request_interval: seconds(self.request_interval),
            shuffle_seed: None,
        }
    }

    pub fn policy(&self) -> Result<ArchivePolicy, PolicyError> {
        ArchivePolicy::new(self.content_types.iter().cloned(), self.excluded_urls.iter().cloned())
    }
}

fn seconds(value: f64) -> Duration {
    Duration::try_from_secs_f64(value).unwrap_or_default()
}

/// Runs one archival pass per snapshot timestamp and reports the files to stage.
pub struct Archiver {
    config: LinkArchiveConfig,
    policy: ArchivePolicy,
    logs: LogDirectory,
    store: LinkStore,
    pipeline: FetchPipeline,
}

impl Archiver {
    /// Archiver backed by a real HTTP client; bodies go below `repository`.
    pub fn new(config: LinkArchiveConfig, repository: &Path) -> Result<Self, ArchiveError> {
        let fetcher = ReqwestFetcher::new(&config.fetch_settings())?;
        Self::with_fetcher(config, repository, Arc::new(fetcher), system_clock())
    }

    pub fn with_fetcher(
        config: LinkArchiveConfig,
        repository: &Path,
        fetcher: Arc<dyn Fetcher>,
        clock: Clock,
    ) -> Result<Self, ArchiveError> {
        let policy = config.policy()?;
        let logs = LogDirectory::new(config.log_directory.clone());
        let store = LinkStore::new(repository.join(&config.save_directory));
        let pipeline = FetchPipeline::new(
            fetcher,
            store.clone(),
            policy.clone(),
            config.pipeline_settings(),
            clock,
        );
        Ok(Self {
            config,
            policy,
            logs,
            store,
            pipeline,
        })
    }

    pub fn store(&self) -> &LinkStore {
        &self.store
    }

    pub fn logs(&self) -> &LogDirectory {
        &self.logs
    }

    /// Archives the links of the snapshot taken at `timestamp`.
    ///
    /// A second call for the same timestamp only retries urls that were not
    /// archived yet but whose recorded content type now matches; with nothing
    /// changed it sends no request and returns an empty target.
    pub async fn run(
        &self,
        timestamp: Timestamp,
        links: Vec<ExternalLink>,
    ) -> Result<CommitTarget, ArchiveError> {
        archiver_info!("archive external links of snapshot {timestamp}");
        let prior_index = self.store.load_index()?;
        let patterns = self.policy.content_type_patterns();
        let patterns_changed = prior_index
            .as_ref()
            .is_some_and(|index| index.content_types != patterns);
        if patterns_changed {
            archiver_info!("content type patterns changed, request all links again");
        }
        let request_all = self.config.always_request_all_links || patterns_changed;

        let existing = if request_all {
            None
        } else {
            self.logs.load(timestamp)?
        };
        let (records, fetched) = match existing {
            Some(existing) => {
                let targets = re_request_targets(&existing, prior_index.as_ref(), &self.policy);
                archiver_info!("re-request {} links of an existing log", targets.len());
                let fetched = self.pipeline.fetch_all(targets).await?;
                (replace_records(existing, &fetched), fetched)
            }
            None => {
                let previous = if request_all {
                    Vec::new()
                } else {
                    self.logs.load_latest_before(timestamp)?.unwrap_or_default()
                };
                let mut classified = classify(links, previous);
                if !request_all {
                    classified.requeue_unsaved(prior_index.as_ref(), &self.policy);
                }
                archiver_info!(
                    "links: {} new, {} carried, {} deleted",
                    classified.new_links.len(),
                    classified.carried.len(),
                    classified.deleted.len()
                );
                let fetched = self.pipeline.fetch_all(classified.new_links).await?;
                let mut records = classified.carried;
                records.extend(fetched.iter().cloned());
                records.sort_by(|a, b| a.url.cmp(&b.url));
                (records, fetched)
            }
        };
        self.logs.save(timestamp, &records)?;

        let index = SavedLinksIndex::from_records(patterns, &records);
        let index_changed = self.store.save_index(&index)?;

        let target = self.commit_target(prior_index.as_ref(), &index, &fetched, index_changed)?;
        self.remove_deleted(&target)?;
        let removed_logs = self.logs.clean(self.config.keep_logs)?;
        archiver_debug!("removed {} old link logs", removed_logs.len());
        archiver_info!(
            "external links: {} added, {} updated, {} deleted",
            target.added().len(),
            target.updated().len(),
            target.deleted().len()
        );
        Ok(target)
    }

    fn commit_target(
        &self,
        prior_index: Option<&SavedLinksIndex>,
        index: &SavedLinksIndex,
        fetched: &[LinkRecord],
        index_changed: bool,
    ) -> Result<CommitTarget, ArchiveError> {
        let prior: BTreeSet<&str> = prior_index
            .map(|index| index.urls.iter().map(String::as_str).collect())
            .unwrap_or_default();
        let saved: BTreeSet<&str> = index.urls.iter().map(String::as_str).collect();
        let written: BTreeSet<&str> = fetched
            .iter()
            .filter(|record| record.is_saved)
            .map(|record| record.url.as_str())
            .collect();

        let mut added: Vec<PathBuf> = saved
            .difference(&prior)
            .filter_map(|url| self.store.file_path(url))
            .collect();
        let mut updated: Vec<PathBuf> = written
            .intersection(&prior)
            .filter_map(|url| self.store.file_path(url))
            .collect();
        let deleted: Vec<PathBuf> = if self.config.keep_deleted_links {
            Vec::new()
        } else {
            prior
                .difference(&saved)
                .filter_map(|url| self.store.file_path(url))
                .collect()
        };

        if index_changed {
            if prior_index.is_some() {
                updated.push(self.store.index_path());
            } else {
                added.push(self.store.index_path());
            }
        }
        if self.config.use_git_lfs && self.store.ensure_gitattributes()? {
            added.push(self.store.gitattributes_path());
        }

        Ok(CommitTarget::new(added, updated, deleted)?)
    }

    fn remove_deleted(&self, target: &CommitTarget) -> Result<(), ArchiveError> {
        for path in target.deleted() {
            self.store.remove(path)?;
        }
        if !target.deleted().is_empty() {
            let pruned = self.store.prune_empty_dirs()?;
            archiver_debug!("removed {pruned} empty directories");
        }
        Ok(())
    }
}

/// Swaps in the fresh record for every re-requested url, keeping url order.
fn replace_records(existing: Vec<LinkRecord>, fetched: &[LinkRecord]) -> Vec<LinkRecord> {
    let mut by_url: BTreeMap<String, LinkRecord> = existing
        .into_iter()
        .map(|record| (record.url.clone(), record))
        .collect();
    for record in fetched {
        by_url.insert(record.url.clone(), record.clone());
    }
    by_url.into_values().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_defaults_match_documented_values() {
        let config = LinkArchiveConfig::default();
        assert_eq!(config.parallel_limit, 5);
        assert_eq!(config.session.parallel_limit_per_host, 0);
        assert_eq!(config.log_directory, PathBuf::from("log"));
        assert_eq!(config.save_directory, PathBuf::from("links"));
        assert_eq!(config.keep_logs, KeepLogs::All);
        assert_eq!(config.fetch_settings().request_timeout, Duration::from_secs(30));
    }

    #[test]
    fn negative_interval_becomes_zero() {
        assert_eq!(seconds(-1.0), Duration::ZERO);
        assert_eq!(seconds(0.5), Duration::from_millis(500));
    }
}
