use serde::{Deserialize, Serialize};

/// Seconds since the Unix epoch, as exported by the snapshot source.
pub type Timestamp = i64;

/// One timestamped export of the whole document collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub name: String,
    pub display_name: String,
    #[serde(rename = "exported")]
    pub timestamp: Timestamp,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub users: Vec<User>,
    #[serde(rename = "pages")]
    pub documents: Vec<Document>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub name: String,
    pub display_name: String,
    pub email: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    pub title: String,
    pub created: Timestamp,
    pub updated: Timestamp,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub views: Option<u64>,
    pub lines: Vec<Line>,
    #[serde(default)]
    pub links_lc: Vec<String>,
}

impl Document {
    /// Iterates the text of every body line regardless of its stored shape.
    pub fn line_texts(&self) -> impl Iterator<Item = &str> {
        self.lines.iter().map(Line::text)
    }
}

/// A body line: either bare text or text with per-line metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Line {
    Text(String),
    Detailed(DetailedLine),
}

impl Line {
    pub fn text(&self) -> &str {
        match self {
            Line::Text(text) => text,
            Line::Detailed(line) => &line.text,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetailedLine {
    pub text: String,
    pub created: Timestamp,
    pub updated: Timestamp,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
}

/// Where an external url was found: document title and zero-based line index.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Location {
    pub title: String,
    pub line: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalLink {
    pub url: String,
    pub locations: Vec<Location>,
}

/// Order applied to a snapshot's documents before it is diffed or written.
///
/// Stored as `"as-is"`, `"created-asc"` or `"created-desc"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "&'static str")]
pub enum PageOrder {
    #[default]
    AsIs,
    CreatedAsc,
    CreatedDesc,
}

impl PageOrder {
    pub fn name(self) -> &'static str {
        match self {
            PageOrder::AsIs => "as-is",
            PageOrder::CreatedAsc => "created-asc",
            PageOrder::CreatedDesc => "created-desc",
        }
    }

    pub fn apply(self, documents: &mut [Document]) {
        match self {
            PageOrder::AsIs => {}
            PageOrder::CreatedAsc => documents.sort_by_key(|doc| doc.created),
            PageOrder::CreatedDesc => {
                documents.sort_by_key(|doc| std::cmp::Reverse(doc.created))
            }
        }
    }
}

impl From<PageOrder> for &'static str {
    fn from(order: PageOrder) -> Self {
        order.name()
    }
}

impl TryFrom<String> for PageOrder {
    type Error = String;

    fn try_from(name: String) -> Result<Self, Self::Error> {
        [PageOrder::AsIs, PageOrder::CreatedAsc, PageOrder::CreatedDesc]
            .into_iter()
            .find(|order| order.name() == name)
            .ok_or_else(|| format!("unknown page order {name:?}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lines_accept_both_shapes() {
        let json = r#"{
            "title": "T",
            "created": 1,
            "updated": 2,
            "lines": ["plain", {"text": "rich", "created": 1, "updated": 2, "userId": "u"}]
        }"#;
        let doc: Document = serde_json::from_str(json).unwrap();
        assert_eq!(doc.line_texts().collect::<Vec<_>>(), vec!["plain", "rich"]);
        assert!(doc.links_lc.is_empty());
    }

    #[test]
    fn created_desc_is_stable_for_equal_timestamps() {
        let doc = |title: &str, created| Document {
            title: title.into(),
            created,
            updated: created,
            id: None,
            views: None,
            lines: Vec::new(),
            links_lc: Vec::new(),
        };
        let mut docs = vec![doc("a", 1), doc("b", 3), doc("c", 1)];
        PageOrder::CreatedDesc.apply(&mut docs);
        let titles: Vec<_> = docs.iter().map(|d| d.title.as_str()).collect();
        assert_eq!(titles, vec!["b", "a", "c"]);
    }

    #[test]
    fn page_order_uses_kebab_names() {
        let order: PageOrder = serde_json::from_str("\"created-desc\"").unwrap();
        assert_eq!(order, PageOrder::CreatedDesc);
        assert_eq!(serde_json::to_string(&PageOrder::AsIs).unwrap(), "\"as-is\"");
        assert!(serde_json::from_str::<PageOrder>("\"newest\"").is_err());
    }
}
