//! S5: two rapid watcher events for different files within the debounce
//! window coalesce into exactly one index run whose report lists both.

use codetrace::config::IndexingConfig;
use codetrace::coordinator::IndexCoordinator;
use codetrace::model::ProjectBoundary;
use codetrace::parse_cache::ParseCache;
use codetrace::parsing::TypeScriptParser;
use codetrace::store::SqliteStore;
use codetrace::tsconfig::TsconfigCache;
use codetrace::types::WatcherEvent;
use std::fs;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

fn coordinator(dir: &TempDir, debounce_ms: u64) -> Arc<IndexCoordinator> {
    let store = Arc::new(SqliteStore::open(dir.path().join(".codetrace/index.sqlite3")).unwrap());
    let boundaries = vec![ProjectBoundary { name: "app".into(), directory: ".".into() }];
    store.upsert_project_boundary(&boundaries[0]).unwrap();
    let mut indexing = IndexingConfig::default();
    indexing.debounce_ms = debounce_ms;
    IndexCoordinator::new(
        store,
        dir.path().to_path_buf(),
        boundaries,
        indexing,
        vec![Box::new(TypeScriptParser::new())],
        Arc::new(TsconfigCache::new()),
        Arc::new(ParseCache::new(10)),
    )
}

#[tokio::test]
async fn two_watcher_events_within_the_debounce_window_produce_one_run() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("x.ts"), "export const x = 1;\n").unwrap();
    fs::write(dir.path().join("y.ts"), "export const y = 2;\n").unwrap();

    let coordinator = coordinator(&dir, 50);

    let runs = Arc::new(AtomicU64::new(0));
    let runs2 = runs.clone();
    let seen_files = Arc::new(parking_lot::Mutex::new(Vec::new()));
    let seen2 = seen_files.clone();
    coordinator.on_indexed(move |report| {
        runs2.fetch_add(1, Ordering::SeqCst);
        *seen2.lock() = report.changed_files.clone();
    });

    coordinator.handle_watcher_event(WatcherEvent::create("x.ts"));
    coordinator.handle_watcher_event(WatcherEvent::create("y.ts"));

    // Debounce window is 50ms; give both the debounce wait and the run
    // itself generous headroom before asserting.
    tokio::time::sleep(Duration::from_millis(500)).await;

    assert_eq!(runs.load(Ordering::SeqCst), 1);
    let mut files = seen_files.lock().clone();
    files.sort();
    assert_eq!(files, vec!["x.ts".to_string(), "y.ts".to_string()]);
}
