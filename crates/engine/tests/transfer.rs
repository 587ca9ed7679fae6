//! End-to-end transfer runs across the endpoint combinations.

use std::path::Path;
use std::sync::{Arc, Mutex};

use engine::{Orchestrator, TransferOptions};
use fs::{FsCursor, FsSink, FsSinkConfig};
use model::{RepoPath, TransferState, WriteAction};
use repo::{MemoryRepository, RepoCursor, RepoSink, RepoSinkConfig};
use tokio_util::sync::CancellationToken;

/// One recorded progress emission: action, writer path, fixup flag.
type Event = (WriteAction, String, bool);
type Events = Arc<Mutex<Vec<Event>>>;

fn recorder() -> (Events, impl FnMut(&TransferState)) {
    let events: Events = Arc::default();
    let sink = Arc::clone(&events);
    let observer = move |state: &TransferState| {
        sink.lock().expect("events lock").push((
            state.outcome.action,
            state.outcome.writer_path.as_str().to_string(),
            state.updating_references,
        ));
    };
    (events, observer)
}

fn taken(events: &Events) -> Vec<Event> {
    events.lock().expect("events lock").clone()
}

fn options() -> TransferOptions {
    TransferOptions {
        source_root_name: "Root".to_string(),
    }
}

/// Source tree `Root/F1/File1` on disk.
fn three_item_tree(dir: &Path) -> std::path::PathBuf {
    let root = dir.join("Root");
    std::fs::create_dir_all(root.join("F1")).expect("dirs");
    std::fs::write(root.join("F1/File1"), b"payload").expect("file");
    root
}

fn target_repo() -> MemoryRepository {
    let mut repo = MemoryRepository::new();
    repo.seed_folders("Root/Target");
    repo
}

#[tokio::test]
async fn three_item_create_run() {
    let temp = tempfile::tempdir().expect("tempdir");
    let root = three_item_tree(temp.path());

    let cursor = FsCursor::open(&root).await.expect("cursor");
    let sink = RepoSink::new(target_repo(), RepoSinkConfig::new(RepoPath::new("Root/Target")));
    let (events, observer) = recorder();
    let mut orchestrator = Orchestrator::new(cursor, sink, observer, options());

    let summary = orchestrator.run().await.expect("run");
    assert_eq!(summary.processed, 3);
    assert_eq!(summary.created, 3);
    assert_eq!(summary.error_count, 0);
    assert!(!summary.cancelled);

    assert_eq!(
        taken(&events),
        vec![
            (WriteAction::Created, "Root".to_string(), false),
            (WriteAction::Created, "Root/F1".to_string(), false),
            (WriteAction::Created, "Root/F1/File1".to_string(), false),
        ]
    );

    let repo = orchestrator.into_sink().into_service();
    assert!(repo.item(&RepoPath::new("Root/Target/Root/F1")).is_some());
    assert_eq!(
        repo.blob(&RepoPath::new("Root/Target/Root/F1/File1"), "Binary"),
        Some(b"payload".as_slice())
    );
}

#[tokio::test]
async fn failed_container_cuts_off_its_subtree_only() {
    let temp = tempfile::tempdir().expect("tempdir");
    let root = three_item_tree(temp.path());
    std::fs::create_dir(root.join("F2")).expect("sibling");

    let mut repo = target_repo();
    repo.reject_imports("Root/Target/Root/F1");

    let cursor = FsCursor::open(&root).await.expect("cursor");
    let sink = RepoSink::new(repo, RepoSinkConfig::new(RepoPath::new("Root/Target")));
    let (events, observer) = recorder();
    let mut orchestrator = Orchestrator::new(cursor, sink, observer, options());

    let summary = orchestrator.run().await.expect("run");
    assert_eq!(summary.error_count, 1);
    assert_eq!(summary.failed, 1);

    // The failed container's child never surfaces; the sibling proceeds.
    assert_eq!(
        taken(&events),
        vec![
            (WriteAction::Created, "Root".to_string(), false),
            (WriteAction::Failed, "Root/F1".to_string(), false),
            (WriteAction::Created, "Root/F2".to_string(), false),
        ]
    );

    let repo = orchestrator.into_sink().into_service();
    assert!(repo.item(&RepoPath::new("Root/Target/Root/F1/File1")).is_none());
    assert!(repo.item(&RepoPath::new("Root/Target/Root/F2")).is_some());
}

#[tokio::test]
async fn broken_references_are_fixed_in_a_second_pass() {
    let temp = tempfile::tempdir().expect("tempdir");
    let root = temp.path().join("Root");
    std::fs::create_dir(&root).expect("root");
    std::fs::write(
        root.join("a-user.Content"),
        r#"{ "ContentType": "User",
             "Fields": { "Manager": "/Root/Target/Root/z-boss" } }"#,
    )
    .expect("a-user");
    std::fs::write(root.join("z-boss.Content"), r#"{ "ContentType": "User" }"#)
        .expect("z-boss");

    let cursor = FsCursor::open(&root).await.expect("cursor");
    let sink = RepoSink::new(target_repo(), RepoSinkConfig::new(RepoPath::new("Root/Target")));
    let (events, observer) = recorder();
    let mut orchestrator = Orchestrator::new(cursor, sink, observer, options());

    let summary = orchestrator.run().await.expect("run");
    assert_eq!(summary.tasks_recorded, 1);
    assert_eq!(summary.creating, 1);
    assert_eq!(summary.error_count, 0);

    assert_eq!(
        taken(&events),
        vec![
            (WriteAction::Created, "Root".to_string(), false),
            (WriteAction::Creating, "Root/a-user".to_string(), false),
            (WriteAction::Created, "Root/z-boss".to_string(), false),
            (WriteAction::Updated, "Root/a-user".to_string(), true),
        ]
    );

    let repo = orchestrator.into_sink().into_service();
    let fixed = repo
        .item(&RepoPath::new("Root/Target/Root/a-user"))
        .expect("a-user");
    assert_eq!(
        fixed.fields.get("Manager"),
        Some(&model::FieldValue::String(
            "/Root/Target/Root/z-boss".to_string()
        ))
    );
}

#[tokio::test]
async fn rerun_updates_without_duplicating_siblings() {
    let temp = tempfile::tempdir().expect("tempdir");
    let root = three_item_tree(temp.path());

    let cursor = FsCursor::open(&root).await.expect("cursor");
    let sink = RepoSink::new(target_repo(), RepoSinkConfig::new(RepoPath::new("Root/Target")));
    let (_, observer) = recorder();
    let mut first = Orchestrator::new(cursor, sink, observer, options());
    first.run().await.expect("first run");
    let repo = first.into_sink().into_service();
    let after_first = repo.len();

    let cursor = FsCursor::open(&root).await.expect("cursor again");
    let sink = RepoSink::new(repo, RepoSinkConfig::new(RepoPath::new("Root/Target")));
    let (events, observer) = recorder();
    let mut second = Orchestrator::new(cursor, sink, observer, options());
    let summary = second.run().await.expect("second run");

    assert_eq!(summary.updated, 3);
    assert_eq!(summary.created, 0);
    assert!(taken(&events)
        .iter()
        .all(|(action, _, _)| *action == WriteAction::Updated));
    assert_eq!(second.into_sink().into_service().len(), after_first);
}

#[tokio::test]
async fn repository_source_pages_through_any_page_size() {
    let mut source = MemoryRepository::new();
    source.seed_folders("Root/Content/Docs");
    for name in ["a.txt", "b.txt", "c.txt", "d.txt"] {
        source.seed(
            format!("Root/Content/Docs/{name}"),
            model::ContentItem {
                name: name.to_string(),
                type_name: "File".to_string(),
                ..model::ContentItem::default()
            },
        );
    }

    for page_size in [1, 2, 3, 7] {
        let out = tempfile::tempdir().expect("out dir");
        let cursor = RepoCursor::open(source_clone(&source), RepoPath::new("Root/Content"), page_size)
            .await
            .expect("cursor");
        let sink = FsSink::open(FsSinkConfig::new(out.path())).await.expect("sink");
        let (events, observer) = recorder();
        let mut orchestrator = Orchestrator::new(
            cursor,
            sink,
            observer,
            TransferOptions {
                source_root_name: "Content".to_string(),
            },
        );

        let summary = orchestrator.run().await.expect("run");
        assert_eq!(summary.processed, 6, "page size {page_size}");
        assert_eq!(summary.error_count, 0);
        let writers: Vec<_> = taken(&events)
            .into_iter()
            .map(|(_, writer, _)| writer)
            .collect();
        assert_eq!(
            writers,
            vec![
                "Content",
                "Content/Docs",
                "Content/Docs/a.txt",
                "Content/Docs/b.txt",
                "Content/Docs/c.txt",
                "Content/Docs/d.txt"
            ]
        );
        assert!(out.path().join("Content/Docs").is_dir());
    }
}

/// The in-memory backend is not `Clone`; rebuild it from its seeds.
fn source_clone(_template: &MemoryRepository) -> MemoryRepository {
    let mut repo = MemoryRepository::new();
    repo.seed_folders("Root/Content/Docs");
    for name in ["a.txt", "b.txt", "c.txt", "d.txt"] {
        repo.seed(
            format!("Root/Content/Docs/{name}"),
            model::ContentItem {
                name: name.to_string(),
                type_name: "File".to_string(),
                ..model::ContentItem::default()
            },
        );
    }
    repo
}

#[tokio::test]
async fn schema_subtree_is_written_first_and_exactly_once() {
    let temp = tempfile::tempdir().expect("tempdir");
    let root = temp.path().join("Root");
    std::fs::create_dir_all(root.join("System/Schema/ContentTypes")).expect("schema");
    std::fs::create_dir_all(root.join("Docs")).expect("docs");
    std::fs::write(
        root.join("System/Schema/ContentTypes/MyType.Content"),
        r#"{ "ContentType": "ContentType" }"#,
    )
    .expect("type def");

    let cursor = FsCursor::open(&root).await.expect("cursor");
    let sink = RepoSink::new(MemoryRepository::new(), RepoSinkConfig::new(RepoPath::root()));
    let (events, observer) = recorder();
    let mut orchestrator = Orchestrator::new(cursor, sink, observer, options());

    let summary = orchestrator.run().await.expect("run");
    assert_eq!(summary.error_count, 0);

    let events = taken(&events);
    let type_position = events
        .iter()
        .position(|(_, writer, _)| writer == "Root/System/Schema/ContentTypes/MyType")
        .expect("type definition written");
    let docs_position = events
        .iter()
        .position(|(_, writer, _)| writer == "Root/Docs")
        .expect("general content written");
    assert!(type_position < docs_position, "schema phase runs first");

    let repo = orchestrator.into_sink().into_service();
    let type_imports = repo
        .import_log()
        .iter()
        .filter(|path| path.as_str() == "Root/System/Schema/ContentTypes/MyType")
        .count();
    assert_eq!(type_imports, 1, "written in its phase only, never twice");

    // The synthesized chain is rewritten with real metadata later.
    let root_imports = repo
        .import_log()
        .iter()
        .filter(|path| path.as_str() == "Root")
        .count();
    assert_eq!(root_imports, 2);
}

#[tokio::test]
async fn missing_parent_on_the_first_item_aborts_the_general_phase() {
    let temp = tempfile::tempdir().expect("tempdir");
    let root = three_item_tree(temp.path());

    let cursor = FsCursor::open(&root).await.expect("cursor");
    // The container itself was never created.
    let sink = RepoSink::new(
        MemoryRepository::new(),
        RepoSinkConfig::new(RepoPath::new("Root/Missing")),
    );
    let (events, observer) = recorder();
    let mut orchestrator = Orchestrator::new(cursor, sink, observer, options());

    let summary = orchestrator.run().await.expect("run");
    assert_eq!(summary.processed, 1);
    assert_eq!(summary.missing_parent, 1);
    assert_eq!(summary.error_count, 1);
    assert_eq!(
        taken(&events),
        vec![(WriteAction::MissingParent, "Root".to_string(), false)]
    );
}

#[tokio::test]
async fn root_rename_applies_to_name_and_path_segment() {
    let temp = tempfile::tempdir().expect("tempdir");
    let root = three_item_tree(temp.path());

    let cursor = FsCursor::open(&root).await.expect("cursor");
    let mut config = RepoSinkConfig::new(RepoPath::new("Root/Target"));
    config.root_name = Some("Renamed".to_string());
    let sink = RepoSink::new(target_repo(), config);
    let (events, observer) = recorder();
    let mut orchestrator = Orchestrator::new(cursor, sink, observer, options());

    orchestrator.run().await.expect("run");
    let writers: Vec<_> = taken(&events).into_iter().map(|(_, writer, _)| writer).collect();
    assert_eq!(writers, vec!["Renamed", "Renamed/F1", "Renamed/F1/File1"]);

    let repo = orchestrator.into_sink().into_service();
    let renamed = repo.item(&RepoPath::new("Root/Target/Renamed")).expect("root");
    assert_eq!(renamed.name, "Renamed");
}

#[tokio::test]
async fn cancellation_returns_a_partial_summary() {
    let temp = tempfile::tempdir().expect("tempdir");
    let root = three_item_tree(temp.path());

    let token = CancellationToken::new();
    let cancel_after_first = token.clone();
    let events: Events = Arc::default();
    let sink_events = Arc::clone(&events);
    let observer = move |state: &TransferState| {
        sink_events.lock().expect("events lock").push((
            state.outcome.action,
            state.outcome.writer_path.as_str().to_string(),
            state.updating_references,
        ));
        cancel_after_first.cancel();
    };

    let cursor = FsCursor::open(&root).await.expect("cursor");
    let sink = RepoSink::new(target_repo(), RepoSinkConfig::new(RepoPath::new("Root/Target")));
    let mut orchestrator =
        Orchestrator::new(cursor, sink, observer, options()).with_cancellation(token);

    let summary = orchestrator.run().await.expect("run");
    assert!(summary.cancelled);
    assert_eq!(summary.processed, 1);
    assert_eq!(taken(&events).len(), 1);
}

#[tokio::test]
async fn filesystem_to_filesystem_round_trip() {
    let temp = tempfile::tempdir().expect("tempdir");
    let root = temp.path().join("Root");
    std::fs::create_dir_all(root.join("Docs")).expect("dirs");
    std::fs::write(
        root.join("Docs.Content"),
        r#"{ "ContentType": "DocumentLibrary", "Fields": { "Index": 1 } }"#,
    )
    .expect("meta");
    std::fs::write(root.join("Docs/logo.png"), b"png-bytes").expect("raw");

    let out = tempfile::tempdir().expect("out dir");
    let cursor = FsCursor::open(&root).await.expect("cursor");
    let sink = FsSink::open(FsSinkConfig::new(out.path())).await.expect("sink");
    let (_, observer) = recorder();
    let mut orchestrator = Orchestrator::new(cursor, sink, observer, options());

    let summary = orchestrator.run().await.expect("run");
    assert_eq!(summary.error_count, 0);
    assert_eq!(summary.created, 3);

    assert!(out.path().join("Root/Docs").is_dir());
    let meta = std::fs::read_to_string(out.path().join("Root/Docs.Content")).expect("meta");
    assert!(meta.contains("DocumentLibrary"));
    let bytes = std::fs::read(out.path().join("Root/Docs/logo.png")).expect("raw");
    assert_eq!(bytes, b"png-bytes");
}
