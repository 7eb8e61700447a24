use std::collections::BTreeMap;
use std::time::Duration;

use archiver_core::ArchivePolicy;
use futures_util::StreamExt;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use thiserror::Error;

use crate::{FailureKind, FetchError, FetchOutput};

#[derive(Debug, Clone)]
pub struct FetchSettings {
    pub connect_timeout: Duration,
    /// Whole-request budget: connect, headers and body.
    pub request_timeout: Duration,
    pub redirect_limit: usize,
    /// Idle connections kept per host in the shared pool.
    pub pool_max_idle_per_host: usize,
    pub user_agent: Option<String>,
    pub request_headers: BTreeMap<String, String>,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(30),
            redirect_limit: 10,
            pool_max_idle_per_host: 4,
            user_agent: None,
            request_headers: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ClientBuildError {
    #[error("invalid request header {name:?}: {message}")]
    InvalidHeader { name: String, message: String },
    #[error("http client: {0}")]
    Client(#[from] reqwest::Error),
}

/// Issues one GET for a url and reads the body only when `policy` archives the
/// response's content type.
#[async_trait::async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, url: &str, policy: &ArchivePolicy) -> Result<FetchOutput, FetchError>;
}

/// [`Fetcher`] over one shared `reqwest::Client`, so every request of a run
/// draws from the same connection pool.
#[derive(Debug, Clone)]
pub struct ReqwestFetcher {
    client: reqwest::Client,
}

impl ReqwestFetcher {
    pub fn new(settings: &FetchSettings) -> Result<Self, ClientBuildError> {
        let mut builder = reqwest::Client::builder()
            .connect_timeout(settings.connect_timeout)
            .timeout(settings.request_timeout)
            .redirect(reqwest::redirect::Policy::limited(settings.redirect_limit))
            .pool_max_idle_per_host(settings.pool_max_idle_per_host)
            .default_headers(header_map(&settings.request_headers)?);
        if let Some(agent) = &settings.user_agent {
            builder = builder.user_agent(agent.clone());
        }
        Ok(Self {
            client: builder.build()?,
        })
    }
}

fn header_map(headers: &BTreeMap<String, String>) -> Result<HeaderMap, ClientBuildError> {
    let mut map = HeaderMap::new();
    for (name, value) in headers {
        let invalid = |message: String| ClientBuildError::InvalidHeader {
            name: name.clone(),
            message,
        };
        let header_name =
            HeaderName::from_bytes(name.as_bytes()).map_err(|err| invalid(err.to_string()))?;
        let header_value = HeaderValue::from_str(value).map_err(|err| invalid(err.to_string()))?;
        map.insert(header_name, header_value);
    }
    Ok(map)
}

#[async_trait::async_trait]
impl Fetcher for ReqwestFetcher {
    async fn fetch(&self, url: &str, policy: &ArchivePolicy) -> Result<FetchOutput, FetchError> {
        let parsed = reqwest::Url::parse(url)
            .map_err(|err| FetchError::new(FailureKind::InvalidUrl, err.to_string()))?;

        let response = self
            .client
            .get(parsed)
            .send()
            .await
            .map_err(map_reqwest_error)?;

        let status_code = response.status().as_u16();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);

        if !policy.should_archive(content_type.as_deref()) {
            return Ok(FetchOutput {
                status_code,
                content_type,
                body: None,
            });
        }

        let mut body = Vec::new();
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(map_reqwest_error)?;
            body.extend_from_slice(&chunk);
        }

        Ok(FetchOutput {
            status_code,
            content_type,
            body: Some(body),
        })
    }
}

fn map_reqwest_error(err: reqwest::Error) -> FetchError {
    let kind = if err.is_timeout() {
        FailureKind::Timeout
    } else if err.is_redirect() {
        FailureKind::RedirectLimitExceeded
    } else if err.is_connect() {
        FailureKind::Connect
    } else if err.is_body() || err.is_decode() {
        FailureKind::Body
    } else if err.is_builder() {
        FailureKind::InvalidUrl
    } else {
        FailureKind::Network
    };
    FetchError::new(kind, err.to_string())
}
