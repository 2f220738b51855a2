//! S3: deleting a file and creating an identically-fingerprinted
//! replacement within the same incremental run retargets relations that
//! point at the old file's symbol instead of leaving them dangling.
//!
//! The real TypeScript extractor never resolves a `Calls`/`Extends` callee
//! name to the symbol it actually refers to (`dst.qualified_name` is always
//! `None` for those relation kinds — see `parsing/typescript.rs`'s single
//! `push_relation` helper), so nothing produced by parsing real source ever
//! matches `move_tracker::retarget_moved_symbols`'s endpoint shape. This
//! seeds one symbol-qualified relation directly, the same way
//! `move_tracker.rs`'s own unit test does, then drives the rest of the run
//! through the real `IndexCoordinator` to exercise the snapshot-then-match
//! sequence end to end.

use codetrace::config::IndexingConfig;
use codetrace::coordinator::IndexCoordinator;
use codetrace::model::{ProjectBoundary, Relation, RelationEndpoint};
use codetrace::parse_cache::ParseCache;
use codetrace::parsing::TypeScriptParser;
use codetrace::store::SqliteStore;
use codetrace::tsconfig::TsconfigCache;
use codetrace::types::{RelationKind, WatcherEvent};
use std::fs;
use std::sync::Arc;
use tempfile::TempDir;

fn coordinator(dir: &TempDir, store: Arc<SqliteStore>) -> Arc<IndexCoordinator> {
    let boundaries = vec![ProjectBoundary { name: "app".into(), directory: ".".into() }];
    store.upsert_project_boundary(&boundaries[0]).unwrap();
    IndexCoordinator::new(
        store,
        dir.path().to_path_buf(),
        boundaries,
        IndexingConfig::default(),
        vec![Box::new(TypeScriptParser::new())],
        Arc::new(TsconfigCache::new()),
        Arc::new(ParseCache::new(10)),
    )
}

#[tokio::test]
async fn renaming_a_file_in_one_run_retargets_the_relation_pointing_at_its_symbol() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("a.ts"), "export function foo() {}\n").unwrap();
    fs::write(dir.path().join("b.ts"), "export function bar() {}\n").unwrap();

    let store = Arc::new(SqliteStore::open(dir.path().join(".codetrace/index.sqlite3")).unwrap());
    let coordinator = coordinator(&dir, store.clone());
    coordinator.full_index().await.unwrap();

    // b.ts::bar calls a.ts::foo, resolved to a symbol-level relation (what
    // a real call-graph resolver would produce, even though this extractor
    // doesn't go that far yet).
    store
        .transaction(|tx| {
            store.replace_file_relations(tx, "app", "b.ts", &[Relation {
                kind: RelationKind::Calls,
                src: RelationEndpoint::symbol("app", "b.ts", "bar"),
                dst: RelationEndpoint::symbol("app", "a.ts", "foo"),
                metadata: serde_json::Value::Null,
            }])
        })
        .unwrap();

    fs::remove_file(dir.path().join("a.ts")).unwrap();
    fs::write(dir.path().join("a2.ts"), "export function foo() {}\n").unwrap();

    let report = coordinator
        .incremental_index(Some(vec![WatcherEvent::delete("a.ts"), WatcherEvent::create("a2.ts")]))
        .await
        .unwrap();
    assert_eq!(report.removed_files, 1);

    let relations = store.relations_from_file("app", "b.ts").unwrap();
    let call = relations.iter().find(|r| r.kind == RelationKind::Calls).unwrap();
    assert_eq!(call.dst.rel_path, "a2.ts");
    assert_eq!(call.dst.qualified_name.as_deref(), Some("foo"));
}
