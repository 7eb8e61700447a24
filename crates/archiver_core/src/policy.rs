use regex::Regex;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PolicyError {
    #[error("invalid {field} pattern {pattern:?}: {source}")]
    InvalidPattern {
        field: &'static str,
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

/// Which responses get archived and which urls are never requested.
///
/// Patterns match at the start of the subject, so `text/html` also matches
/// `text/html; charset=utf-8`.
#[derive(Debug, Clone)]
pub struct ArchivePolicy {
    content_type_sources: Vec<String>,
    content_types: Vec<Regex>,
    excluded_urls: Vec<Regex>,
}

impl ArchivePolicy {
    pub fn new<C, E>(content_types: C, excluded_urls: E) -> Result<Self, PolicyError>
    where
        C: IntoIterator,
        C::Item: Into<String>,
        E: IntoIterator,
        E::Item: Into<String>,
    {
        let content_type_sources: Vec<String> =
            content_types.into_iter().map(Into::into).collect();
        let content_types = compile_all("content_types", &content_type_sources)?;
        let excluded_sources: Vec<String> = excluded_urls.into_iter().map(Into::into).collect();
        let excluded_urls = compile_all("excluded_urls", &excluded_sources)?;
        Ok(Self {
            content_type_sources,
            content_types,
            excluded_urls,
        })
    }

    /// The configured content-type patterns, sorted and deduplicated, as stored
    /// in the saved-links index.
    pub fn content_type_patterns(&self) -> Vec<String> {
        let mut patterns = self.content_type_sources.clone();
        patterns.sort();
        patterns.dedup();
        patterns
    }

    pub fn should_archive(&self, content_type: Option<&str>) -> bool {
        content_type.is_some_and(|ct| self.content_types.iter().any(|re| re.is_match(ct)))
    }

    pub fn is_excluded(&self, url: &str) -> bool {
        self.excluded_urls.iter().any(|re| re.is_match(url))
    }
}

fn compile_all(field: &'static str, patterns: &[String]) -> Result<Vec<Regex>, PolicyError> {
    patterns
        .iter()
        .map(|pattern| {
            Regex::new(&format!("^(?:{pattern})")).map_err(|source| PolicyError::InvalidPattern {
                field,
                pattern: pattern.clone(),
                source,
            })
        })
        .collect()
}
