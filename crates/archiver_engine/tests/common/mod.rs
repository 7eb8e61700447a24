#![allow(dead_code)]

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use archiver_core::{ArchivePolicy, ExternalLink, Location};
use archiver_engine::{Clock, FailureKind, FetchError, FetchOutput, Fetcher, LinkArchiveConfig};

/// Canned responses keyed by url, with call accounting.
#[derive(Default)]
pub struct FakeFetcher {
    responses: Mutex<HashMap<String, Result<(u16, String, Vec<u8>), FailureKind>>>,
    calls: Mutex<Vec<String>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    delay: Duration,
}

impl FakeFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::default()
        }
    }

    pub fn respond(&self, url: &str, status: u16, content_type: &str, body: &str) {
        self.responses.lock().unwrap().insert(
            url.to_string(),
            Ok((status, content_type.to_string(), body.as_bytes().to_vec())),
        );
    }

    pub fn fail(&self, url: &str, kind: FailureKind) {
        self.responses
            .lock()
            .unwrap()
            .insert(url.to_string(), Err(kind));
    }

    pub fn calls(&self) -> Vec<String> {
        let mut calls = self.calls.lock().unwrap().clone();
        calls.sort();
        calls
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn reset_calls(&self) {
        self.calls.lock().unwrap().clear();
    }
}

#[async_trait::async_trait]
impl Fetcher for FakeFetcher {
    async fn fetch(&self, url: &str, policy: &ArchivePolicy) -> Result<FetchOutput, FetchError> {
        self.calls.lock().unwrap().push(url.to_string());
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let response = self.responses.lock().unwrap().get(url).cloned();
        match response {
            Some(Ok((status_code, content_type, body))) => {
                let archive = policy.should_archive(Some(&content_type));
                Ok(FetchOutput {
                    status_code,
                    content_type: Some(content_type),
                    body: archive.then_some(body),
                })
            }
            Some(Err(kind)) => Err(FetchError {
                kind,
                message: format!("{kind} for {url}"),
            }),
            None => Ok(FetchOutput {
                status_code: 404,
                content_type: None,
                body: None,
            }),
        }
    }
}

pub fn fixed_clock(timestamp: i64) -> Clock {
    Arc::new(move || timestamp)
}

pub fn link(url: &str, title: &str, line: usize) -> ExternalLink {
    ExternalLink {
        url: url.to_string(),
        locations: vec![Location {
            title: title.to_string(),
            line,
        }],
    }
}

/// Config writing logs to `<root>/log` with no pacing delay.
pub fn config(root: &Path, content_types: &[&str]) -> LinkArchiveConfig {
    LinkArchiveConfig {
        enabled: true,
        log_directory: root.join("log"),
        request_interval: 0.0,
        content_types: content_types.iter().map(|s| s.to_string()).collect(),
        ..LinkArchiveConfig::default()
    }
}
