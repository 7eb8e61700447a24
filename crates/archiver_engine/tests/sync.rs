mod common;

use std::cell::RefCell;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use archiver_core::{
    CommitTarget, Document, Line, LineScanExtractor, PageOrder, Snapshot, Timestamp,
};
use archiver_engine::{
    save_json, Archiver, SnapshotRepository, SnapshotStore, Synchronizer, VcsError, VersionControl,
};
use common::{config, fixed_clock, FakeFetcher};
use pretty_assertions::assert_eq;
use tempfile::TempDir;

#[derive(Default)]
struct RecordingVcs {
    latest: Option<Timestamp>,
    commits: RefCell<Vec<(String, Timestamp, usize)>>,
}

impl VersionControl for RecordingVcs {
    fn latest_commit_timestamp(&self) -> Result<Option<Timestamp>, VcsError> {
        Ok(self.latest)
    }

    fn commit(
        &self,
        target: &CommitTarget,
        message: &str,
        timestamp: Timestamp,
    ) -> Result<(), VcsError> {
        self.commits
            .borrow_mut()
            .push((message.to_string(), timestamp, target.len()));
        Ok(())
    }
}

fn document(title: &str, created: Timestamp, lines: &[&str]) -> Document {
    Document {
        title: title.to_string(),
        created,
        updated: created,
        id: None,
        views: None,
        lines: lines.iter().map(|line| Line::Text(line.to_string())).collect(),
        links_lc: Vec::new(),
    }
}

fn snapshot(timestamp: Timestamp, documents: Vec<Document>) -> Snapshot {
    Snapshot {
        name: "proj".to_string(),
        display_name: "Project".to_string(),
        timestamp,
        users: Vec::new(),
        documents,
    }
}

fn repository(dir: &Path) -> SnapshotRepository {
    SnapshotRepository::open("proj", dir, PageOrder::CreatedAsc).unwrap()
}

#[test]
fn repository_stages_page_changes() {
    let temp = TempDir::new().unwrap();
    let mut repo = repository(temp.path());
    assert!(repo.snapshot().is_none());

    let first = repo
        .update(snapshot(
            100,
            vec![document("b page", 2, &["b"]), document("a#1", 1, &["a"])],
        ))
        .unwrap();
    assert_eq!(first.added().len(), 3);
    assert!(temp.path().join("proj.json").is_file());
    assert!(temp.path().join("pages/b_page.json").is_file());
    assert!(temp.path().join("pages/a%231.json").is_file());
    let titles: Vec<&str> = repo
        .snapshot()
        .unwrap()
        .documents
        .iter()
        .map(|d| d.title.as_str())
        .collect();
    assert_eq!(titles, vec!["a#1", "b page"]);

    let mut reopened = repository(temp.path());
    let second = reopened
        .update(snapshot(
            200,
            vec![document("a#1", 1, &["a", "more"]), document("c", 3, &[])],
        ))
        .unwrap();
    assert!(second.added().iter().any(|p| p.ends_with("pages/c.json")));
    assert!(second.updated().iter().any(|p| p.ends_with("pages/a%231.json")));
    assert!(second.updated().iter().any(|p| p.ends_with("proj.json")));
    assert!(second.deleted().iter().any(|p| p.ends_with("pages/b_page.json")));
    assert!(!temp.path().join("pages/b_page.json").exists());
}

#[test]
fn unchanged_snapshot_stages_nothing() {
    let temp = TempDir::new().unwrap();
    let mut repo = repository(temp.path());
    let data = snapshot(100, vec![document("a", 1, &["x"])]);
    repo.update(data.clone()).unwrap();
    assert!(repo.update(data).unwrap().is_empty());
}

#[test]
fn colliding_titles_get_distinct_pages() {
    let temp = TempDir::new().unwrap();
    let mut repo = repository(temp.path());
    let target = repo
        .update(snapshot(
            100,
            vec![document("a b", 1, &[]), document("a_b", 2, &[])],
        ))
        .unwrap();
    assert_eq!(target.added().len(), 3);
    let pages = fs::read_dir(temp.path().join("pages")).unwrap().count();
    assert_eq!(pages, 2);
}

#[test]
fn lookalike_title_does_not_move_an_existing_page() {
    let temp = TempDir::new().unwrap();
    let mut repo = repository(temp.path());
    repo.update(snapshot(100, vec![document("a_b", 1, &[])]))
        .unwrap();

    let target = repo
        .update(snapshot(
            200,
            vec![document("a_b", 1, &[]), document("a b", 2, &[])],
        ))
        .unwrap();

    assert!(target.deleted().is_empty());
    assert!(!target.paths().any(|p| p.ends_with("pages/a_b.json")));
    let added: Vec<String> = target
        .added()
        .iter()
        .filter_map(|p| p.file_name())
        .map(|name| name.to_string_lossy().into_owned())
        .collect();
    assert!(added.iter().any(|name| name.starts_with("a_b--")));
}

#[tokio::test]
async fn commits_pending_snapshots_oldest_first() {
    let temp = TempDir::new().unwrap();
    let store_dir = temp.path().join("snapshots");
    for (timestamp, body) in [(300, "three"), (100, "one"), (200, "two")] {
        save_json(
            &store_dir.join(format!("{timestamp}.json")),
            &snapshot(timestamp, vec![document("page", 1, &[body])]),
        )
        .unwrap();
    }
    fs::write(store_dir.join("notes.txt"), "ignored").unwrap();

    let vcs = RecordingVcs {
        latest: Some(100),
        ..RecordingVcs::default()
    };
    let mut sync = Synchronizer::new(
        "proj",
        repository(&temp.path().join("repo")),
        None,
        Box::new(LineScanExtractor),
        vcs,
    );
    let committed = sync
        .commit_snapshots(&SnapshotStore::new(store_dir), None)
        .await
        .unwrap();

    assert_eq!(committed, vec![200, 300]);
    let commits = sync.vcs().commits.borrow().clone();
    assert_eq!(
        commits,
        vec![
            ("proj 1970-01-01T00:03:20Z".to_string(), 200, 2),
            ("proj 1970-01-01T00:05:00Z".to_string(), 300, 2),
        ]
    );
}

#[tokio::test]
async fn link_archival_merges_into_the_snapshot_commit() {
    let temp = TempDir::new().unwrap();
    let repo_dir = temp.path().join("repo");
    let fetcher = Arc::new(FakeFetcher::new());
    fetcher.respond("https://example.com/doc", 200, "text/html", "<p>doc</p>");
    let archiver = Archiver::with_fetcher(
        config(temp.path(), &["text/html"]),
        &repo_dir,
        fetcher.clone(),
        fixed_clock(1),
    )
    .unwrap();

    let mut sync = Synchronizer::new(
        "proj",
        repository(&repo_dir),
        Some(archiver),
        Box::new(LineScanExtractor),
        RecordingVcs::default(),
    );
    let target = sync
        .stage(snapshot(
            100,
            vec![document("page", 1, &["see https://example.com/doc"])],
        ))
        .await
        .unwrap();

    assert_eq!(fetcher.call_count(), 1);
    assert!(target
        .added()
        .iter()
        .any(|p| p.ends_with("links/example.com/doc/%body")));
    assert!(target.added().iter().any(|p| p.ends_with("pages/page.json")));
    assert_eq!(target.added().len(), 4);
}
