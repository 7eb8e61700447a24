use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;

use crate::model::{Document, ExternalLink, Location, Snapshot};

static CODE_BLOCK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?P<indent>[\t ]*)code:.+").expect("valid regex"));
static CLI_NOTATION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[\t ]*[$%] .+").expect("valid regex"));
static CODE_SPAN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"`.*?`").expect("valid regex"));
static INDENT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[\t ]*").expect("valid regex"));
static URL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"https?://[^\s\]]+").expect("valid regex"));

/// Yields the deduplicated external urls referenced by a snapshot.
pub trait LinkExtractor: Send + Sync {
    fn external_links(&self, snapshot: &Snapshot) -> Vec<ExternalLink>;
}

/// Line-based scanner for `http(s)://` urls.
///
/// Skips indented `code:` blocks, `$ `/`% ` command transcripts and inline
/// code spans. Output is sorted by url, each location list sorted.
#[derive(Debug, Default, Clone, Copy)]
pub struct LineScanExtractor;

impl LinkExtractor for LineScanExtractor {
    fn external_links(&self, snapshot: &Snapshot) -> Vec<ExternalLink> {
        let mut found: BTreeMap<String, Vec<Location>> = BTreeMap::new();
        for document in &snapshot.documents {
            for (line, location) in prose_lines(document) {
                for url in URL.find_iter(&line) {
                    found
                        .entry(url.as_str().to_string())
                        .or_default()
                        .push(location.clone());
                }
            }
        }
        found
            .into_iter()
            .map(|(url, mut locations)| {
                locations.sort();
                locations.dedup();
                ExternalLink { url, locations }
            })
            .collect()
    }
}

/// Lines outside code, with inline code spans blanked out.
fn prose_lines(document: &Document) -> Vec<(String, Location)> {
    let mut lines = Vec::new();
    let mut code_block_indent: Option<usize> = None;
    for (index, text) in document.line_texts().enumerate() {
        if let Some(block_indent) = code_block_indent {
            let indent = INDENT.find(text).map_or(0, |m| m.len());
            if indent > block_indent {
                continue;
            }
            code_block_indent = None;
        }
        if let Some(captures) = CODE_BLOCK.captures(text) {
            code_block_indent = captures.name("indent").map(|m| m.len());
            continue;
        }
        if CLI_NOTATION.is_match(text) {
            continue;
        }
        lines.push((
            CODE_SPAN.replace_all(text, " ").into_owned(),
            Location {
                title: document.title.clone(),
                line: index,
            },
        ));
    }
    lines
}
