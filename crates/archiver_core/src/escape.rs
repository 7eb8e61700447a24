use std::collections::BTreeMap;
use std::fmt::Write;

use archiver_logging::archiver_warn;
use sha2::{Digest, Sha256};

use crate::model::Document;

/// Filename-safe form of a title or url path component.
///
/// Fixed substitution: space -> `_`, `#` -> `%23`, `%` -> `%25`, `/` -> `%2F`.
/// Because `%` itself is escaped, the only non-injective rule is space vs `_`;
/// [`key_documents`] resolves that case.
pub fn escape_filename(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            ' ' => escaped.push('_'),
            '#' => escaped.push_str("%23"),
            '%' => escaped.push_str("%25"),
            '/' => escaped.push_str("%2F"),
            _ => escaped.push(c),
        }
    }
    escaped
}

/// Relative path components for an archived url.
///
/// `https://` is dropped; any other scheme is kept as a leading
/// `%<scheme>` component so `http` and `https` forms stay apart, and a
/// string without a scheme starts with `%-`. Each
/// remaining `/`-separated segment goes through [`escape_url_segment`].
/// Distinct urls always give distinct component lists.
pub fn url_path_components(url: &str) -> Vec<String> {
    let mut components = Vec::new();
    let rest = match url.split_once("://") {
        Some(("https", rest)) => rest,
        Some((scheme, rest)) => {
            components.push(format!("%{}", escape_url_segment(scheme)));
            rest
        }
        None => {
            components.push("%-".to_string());
            url
        }
    };
    components.extend(rest.split('/').map(escape_url_segment));
    components
}

/// Injective, path-safe form of one url segment.
///
/// Uses the [`escape_filename`] table except that a space becomes `%20`.
/// Empty, `.` and `..` segments become `%`, `%2E` and `%2E%2E`, and a
/// segment too long for a file name is cut and tagged `%~<hash>`. None of
/// these markers can come out of the plain escape.
pub fn escape_url_segment(segment: &str) -> String {
    let escaped = match segment {
        "" => return "%".to_string(),
        "." => return "%2E".to_string(),
        ".." => return "%2E%2E".to_string(),
        _ => {
            let mut escaped = String::with_capacity(segment.len());
            for c in segment.chars() {
                match c {
                    ' ' => escaped.push_str("%20"),
                    _ => escaped.push_str(&escape_filename(c.encode_utf8(&mut [0; 4]))),
                }
            }
            escaped
        }
    };
    if escaped.len() <= MAX_SEGMENT_LEN {
        return escaped;
    }
    let mut cut = MAX_SEGMENT_LEN - LONG_SEGMENT_TAG_LEN;
    while !escaped.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}%~{}", &escaped[..cut], hex_digest(segment, 8))
}

const MAX_SEGMENT_LEN: usize = 200;
// "%~" plus 16 hex digits.
const LONG_SEGMENT_TAG_LEN: usize = 18;

/// Maps every document to its storage key.
///
/// Titles whose escaped forms coincide (e.g. `a b` and `a_b`) share one
/// plain key. A title without spaces always owns it; otherwise the smallest
/// raw title does. The others get a `--{hash}` suffix derived from the raw
/// title. Keys are deterministic for a given snapshot, and a title without
/// spaces keeps its key when a colliding title shows up later.
pub fn key_documents(documents: &[Document]) -> BTreeMap<String, &Document> {
    let mut groups: BTreeMap<String, Vec<&Document>> = BTreeMap::new();
    for doc in documents {
        groups
            .entry(escape_filename(&doc.title))
            .or_default()
            .push(doc);
    }

    let mut keyed = BTreeMap::new();
    for (key, mut docs) in groups {
        docs.sort_by(|a, b| {
            (a.title.contains(' '), &a.title).cmp(&(b.title.contains(' '), &b.title))
        });
        let mut docs = docs.into_iter();
        if let Some(first) = docs.next() {
            keyed.insert(key.clone(), first);
        }
        for doc in docs {
            let disambiguated = format!("{key}--{}", hex_digest(&doc.title, 4));
            if keyed.insert(disambiguated.clone(), doc).is_some() {
                archiver_warn!(
                    "duplicate document title {:?}; keeping the last occurrence under {}",
                    doc.title,
                    disambiguated
                );
            }
        }
    }
    keyed
}

fn hex_digest(input: &str, bytes: usize) -> String {
    let digest = Sha256::digest(input.as_bytes());
    let mut hex = String::with_capacity(bytes * 2);
    for byte in digest.iter().take(bytes) {
        let _ = write!(&mut hex, "{byte:02x}");
    }
    hex
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(title: &str) -> Document {
        Document {
            title: title.into(),
            created: 0,
            updated: 0,
            id: None,
            views: None,
            lines: Vec::new(),
            links_lc: Vec::new(),
        }
    }

    #[test]
    fn escapes_fixed_table() {
        assert_eq!(escape_filename("a b#c%d/e"), "a_b%23c%25d%2Fe");
        // A literal "%23" cannot collide with an escaped '#'.
        assert_ne!(escape_filename("%23"), escape_filename("#"));
    }

    #[test]
    fn url_components_strip_https_and_mark_odd_segments() {
        assert_eq!(
            url_path_components("https://example.com/a/../b c/#x"),
            vec!["example.com", "a", "%2E%2E", "b%20c", "%23x"]
        );
        assert_eq!(url_path_components("https://example.com/"), vec!["example.com", "%"]);
        assert_eq!(
            url_path_components("http://example.com"),
            vec!["%http", "example.com"]
        );
    }

    #[test]
    fn url_components_are_distinct_for_lookalike_urls() {
        let urls = [
            "https://x.example/a",
            "https://x.example/a/",
            "https://x.example//a",
            "https://x.example/./a",
            "https://x.example/a b",
            "https://x.example/a_b",
            "https://x.example/a%20b",
            "http://x.example/a",
            "x.example/a",
        ];
        let mapped: std::collections::BTreeSet<Vec<String>> =
            urls.iter().map(|url| url_path_components(url)).collect();
        assert_eq!(mapped.len(), urls.len());
    }

    #[test]
    fn long_segments_are_cut_and_tagged() {
        let long_a = format!("{}a", "q".repeat(300));
        let long_b = format!("{}b", "q".repeat(300));
        let a = escape_url_segment(&long_a);
        let b = escape_url_segment(&long_b);
        assert_eq!(a.len(), MAX_SEGMENT_LEN);
        assert!(a.contains("%~"));
        assert_ne!(a, b);
    }

    #[test]
    fn colliding_titles_get_distinct_keys() {
        let docs = vec![doc("a b"), doc("a_b"), doc("c")];
        let keyed = key_documents(&docs);
        assert_eq!(keyed.len(), 3);
        assert_eq!(keyed["a_b"].title, "a_b");
        let suffixed = keyed
            .keys()
            .find(|k| k.starts_with("a_b--"))
            .expect("suffixed key");
        assert_eq!(keyed[suffixed].title, "a b");
        assert_eq!(suffixed.len(), "a_b--".len() + 8);
    }

    #[test]
    fn title_without_spaces_keeps_its_key_when_a_lookalike_arrives() {
        let before = vec![doc("a_b")];
        let after = vec![doc("a_b"), doc("a b")];
        assert_eq!(key_documents(&before)["a_b"].title, "a_b");
        assert_eq!(key_documents(&after)["a_b"].title, "a_b");
    }
}
