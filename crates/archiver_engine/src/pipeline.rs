use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use archiver_core::{ArchivePolicy, ExternalLink, LinkRecord, LinkResponse};
use archiver_logging::{archiver_debug, archiver_info, archiver_trace, archiver_warn};
use futures_util::future::join_all;
use tokio::sync::{Mutex, OwnedSemaphorePermit, Semaphore};

use crate::fetch::Fetcher;
use crate::link_store::LinkStore;
use crate::persist::PersistError;
use crate::types::Clock;

#[derive(Debug, Clone)]
pub struct PipelineSettings {
    /// Requests in flight across all hosts.
    pub parallel_limit: usize,
    /// Requests in flight per host; `0` means no per-host ceiling.
    pub parallel_limit_per_host: usize,
    /// Pause after each completed request before the slot takes new work.
    pub request_interval: Duration,
    /// Fixed dispatch order seed; `None` derives one from the clock.
    pub shuffle_seed: Option<u64>,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            parallel_limit: 5,
            parallel_limit_per_host: 0,
            request_interval: Duration::from_secs(1),
            shuffle_seed: None,
        }
    }
}

/// Bounded, paced fetch of a batch of links.
///
/// Per-link failures become [`LinkResponse::Error`] records. A body whose
/// url has no archive path is left unsaved; any other failed disk write
/// aborts the batch.
pub struct FetchPipeline {
    fetcher: Arc<dyn Fetcher>,
    store: LinkStore,
    policy: ArchivePolicy,
    settings: PipelineSettings,
    clock: Clock,
}

impl FetchPipeline {
    pub fn new(
        fetcher: Arc<dyn Fetcher>,
        store: LinkStore,
        policy: ArchivePolicy,
        settings: PipelineSettings,
        clock: Clock,
    ) -> Self {
        Self {
            fetcher,
            store,
            policy,
            settings,
            clock,
        }
    }

    /// Fetches every distinct url once and returns the records sorted by url.
    pub async fn fetch_all(&self, links: Vec<ExternalLink>) -> Result<Vec<LinkRecord>, PersistError> {
        let mut unique: BTreeMap<String, ExternalLink> = BTreeMap::new();
        for link in links {
            unique.entry(link.url.clone()).or_insert(link);
        }
        let mut links: Vec<ExternalLink> = unique.into_values().collect();
        let seed = self
            .settings
            .shuffle_seed
            .unwrap_or_else(|| clock_seed(&self.clock));
        shuffle(&mut links, seed);

        archiver_info!("request {} links", links.len());

        let gate = Semaphore::new(self.settings.parallel_limit.max(1));
        let hosts = HostLimiter::new(self.settings.parallel_limit_per_host);
        let tasks = links
            .into_iter()
            .enumerate()
            .map(|(index, link)| self.fetch_one(index, link, &gate, &hosts));

        let mut records = join_all(tasks)
            .await
            .into_iter()
            .collect::<Result<Vec<_>, _>>()?;
        records.sort_by(|a, b| a.url.cmp(&b.url));
        Ok(records)
    }

    async fn fetch_one(
        &self,
        index: usize,
        link: ExternalLink,
        gate: &Semaphore,
        hosts: &HostLimiter,
    ) -> Result<LinkRecord, PersistError> {
        archiver_debug!("request({index}): url={}", link.url);
        if self.policy.is_excluded(&link.url) {
            archiver_debug!("request({index}): excluded url");
            return Ok(LinkRecord::excluded(link));
        }

        let _host_permit = hosts.acquire(&link.url).await;
        // The gate is never closed, so acquire cannot fail.
        let _permit = gate.acquire().await.ok();

        let access_timestamp = (self.clock)();
        let record = match self.fetcher.fetch(&link.url, &self.policy).await {
            Ok(output) => {
                archiver_debug!(
                    "request({index}): status={} content_type={:?}",
                    output.status_code,
                    output.content_type
                );
                let archive = self.policy.should_archive(output.content_type.as_deref());
                let is_saved = match output.body {
                    Some(body) if archive => match self.store.write_body(&link.url, &body) {
                        Ok(path) => {
                            archiver_debug!("request({index}): saved to {:?}", path);
                            true
                        }
                        Err(err @ PersistError::UnmappableUrl(_)) => {
                            archiver_warn!("request({index}): {err}; body not saved");
                            false
                        }
                        Err(err) => return Err(err),
                    },
                    _ => false,
                };
                LinkRecord {
                    url: link.url,
                    locations: link.locations,
                    access_timestamp,
                    response: LinkResponse::Success {
                        status_code: output.status_code,
                        content_type: output.content_type,
                    },
                    is_saved,
                }
            }
            Err(err) => {
                archiver_debug!("request({index}): error={err}");
                LinkRecord {
                    url: link.url,
                    locations: link.locations,
                    access_timestamp,
                    response: LinkResponse::Error {
                        kind: err.kind.name().to_string(),
                        message: err.message,
                    },
                    is_saved: false,
                }
            }
        };

        tokio::time::sleep(self.settings.request_interval).await;
        Ok(record)
    }
}

/// One semaphore per remote host, created lazily.
struct HostLimiter {
    limit: usize,
    hosts: Mutex<HashMap<String, Arc<Semaphore>>>,
}

impl HostLimiter {
    fn new(limit: usize) -> Self {
        Self {
            limit,
            hosts: Mutex::new(HashMap::new()),
        }
    }

    async fn acquire(&self, url: &str) -> Option<OwnedSemaphorePermit> {
        if self.limit == 0 {
            return None;
        }
        let host = url::Url::parse(url)
            .ok()
            .and_then(|parsed| parsed.host_str().map(str::to_ascii_lowercase))
            .unwrap_or_default();
        archiver_trace!("per-host slot for {host:?}");
        let semaphore = {
            let mut hosts = self.hosts.lock().await;
            hosts
                .entry(host)
                .or_insert_with(|| Arc::new(Semaphore::new(self.limit)))
                .clone()
        };
        semaphore.acquire_owned().await.ok()
    }
}

fn clock_seed(clock: &Clock) -> u64 {
    let nanos = chrono::Utc::now().timestamp_subsec_nanos();
    (clock)().unsigned_abs() ^ (u64::from(nanos) << 17)
}

/// Fisher-Yates driven by a 64-bit LCG; dispatch fairness only.
fn shuffle<T>(items: &mut [T], seed: u64) {
    let mut state = seed;
    for i in (1..items.len()).rev() {
        state = state
            .wrapping_mul(6_364_136_223_846_793_005)
            .wrapping_add(1_442_695_040_888_963_407);
        let j = ((state >> 33) % (i as u64 + 1)) as usize;
        items.swap(i, j);
    }
}
