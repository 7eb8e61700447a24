use serde::{Deserialize, Serialize};

use crate::model::{ExternalLink, Location, Timestamp};

/// Outcome of one archival attempt for a url.
///
/// Persisted as `{"status_code", "content_type"}`, `{"error_type", "message"}`
/// or the string `"excluded"`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "ResponseRepr", into = "ResponseRepr")]
pub enum LinkResponse {
    Success {
        status_code: u16,
        content_type: Option<String>,
    },
    Error {
        kind: String,
        message: String,
    },
    Excluded,
}

impl LinkResponse {
    pub fn content_type(&self) -> Option<&str> {
        match self {
            LinkResponse::Success { content_type, .. } => content_type.as_deref(),
            _ => None,
        }
    }
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum ResponseRepr {
    Success {
        status_code: u16,
        content_type: Option<String>,
    },
    Error {
        error_type: String,
        message: String,
    },
    Excluded(ExcludedTag),
}

#[derive(Serialize, Deserialize)]
enum ExcludedTag {
    #[serde(rename = "excluded")]
    Excluded,
}

impl From<ResponseRepr> for LinkResponse {
    fn from(repr: ResponseRepr) -> Self {
        match repr {
            ResponseRepr::Success {
                status_code,
                content_type,
            } => LinkResponse::Success {
                status_code,
                content_type,
            },
            ResponseRepr::Error {
                error_type,
                message,
            } => LinkResponse::Error {
                kind: error_type,
                message,
            },
            ResponseRepr::Excluded(ExcludedTag::Excluded) => LinkResponse::Excluded,
        }
    }
}

impl From<LinkResponse> for ResponseRepr {
    fn from(response: LinkResponse) -> Self {
        match response {
            LinkResponse::Success {
                status_code,
                content_type,
            } => ResponseRepr::Success {
                status_code,
                content_type,
            },
            LinkResponse::Error { kind, message } => ResponseRepr::Error {
                error_type: kind,
                message,
            },
            LinkResponse::Excluded => ResponseRepr::Excluded(ExcludedTag::Excluded),
        }
    }
}

/// Persisted outcome of fetching or carrying one url in one archival run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkRecord {
    pub url: String,
    pub locations: Vec<Location>,
    pub access_timestamp: Timestamp,
    pub response: LinkResponse,
    pub is_saved: bool,
}

impl LinkRecord {
    pub fn excluded(link: ExternalLink) -> Self {
        Self {
            url: link.url,
            locations: link.locations,
            access_timestamp: 0,
            response: LinkResponse::Excluded,
            is_saved: false,
        }
    }

    pub fn link(&self) -> ExternalLink {
        ExternalLink {
            url: self.url.clone(),
            locations: self.locations.clone(),
        }
    }
}

/// Manifest of the urls currently archived under one link root.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavedLinksIndex {
    pub content_types: Vec<String>,
    pub urls: Vec<String>,
}

impl SavedLinksIndex {
    /// Builds an index with both lists sorted and deduplicated.
    pub fn new<C, U>(content_types: C, urls: U) -> Self
    where
        C: IntoIterator<Item = String>,
        U: IntoIterator<Item = String>,
    {
        let mut content_types: Vec<String> = content_types.into_iter().collect();
        content_types.sort();
        content_types.dedup();
        let mut urls: Vec<String> = urls.into_iter().collect();
        urls.sort();
        urls.dedup();
        Self {
            content_types,
            urls,
        }
    }

    /// Index of the saved urls in `records`.
    pub fn from_records<C>(content_types: C, records: &[LinkRecord]) -> Self
    where
        C: IntoIterator<Item = String>,
    {
        Self::new(
            content_types,
            records
                .iter()
                .filter(|record| record.is_saved)
                .map(|record| record.url.clone()),
        )
    }

    pub fn contains(&self, url: &str) -> bool {
        self.urls.iter().any(|saved| saved == url)
    }
}
