//! The index's central state machine: owns the single "is a run in
//! progress" lock, coalesces concurrent callers onto the in-flight run,
//! queues a full reindex behind it, drains buffered watcher events once it
//! finishes, and runs the move tracker and changed-symbols diff around
//! every run. `Arc<Self>`-based so background tasks can hold a handle
//! without holding a borrow.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;
use rayon::prelude::*;
use tokio::sync::{Mutex, oneshot, watch};

use crate::boundaries;
use crate::bus::{CallbackBus, Unsubscribe};
use crate::config::IndexingConfig;
use crate::error::{IndexError, IndexResult};
use crate::model::ProjectBoundary;
use crate::move_tracker::{self, DeletedFileSnapshot};
use crate::parse_cache::ParseCache;
use crate::parsing::LanguageParser;
use crate::processor::FileProcessor;
use crate::report::{ChangedSymbol, IndexReport, SymbolDiff};
use crate::scanner::{FileChange, FileScanner};
use crate::store::SqliteStore;
use crate::types::{WatcherEvent, WatcherEventKind};
use crate::writer::RepositoryWriter;

type RunOutcome = Result<Arc<IndexReport>, Arc<IndexError>>;

struct CoordinatorState {
    indexing_lock: bool,
    pending_events: Vec<WatcherEvent>,
    debounce_active: bool,
    pending_full_index: bool,
    full_index_waiters: Vec<oneshot::Sender<RunOutcome>>,
    current_run_tx: Option<watch::Sender<Option<RunOutcome>>>,
    current_run_rx: Option<watch::Receiver<Option<RunOutcome>>>,
    shutting_down: bool,
}

impl Default for CoordinatorState {
    fn default() -> Self {
        Self {
            indexing_lock: false,
            pending_events: Vec::new(),
            debounce_active: false,
            pending_full_index: false,
            full_index_waiters: Vec::new(),
            current_run_tx: None,
            current_run_rx: None,
            shutting_down: false,
        }
    }
}

/// Drives one workspace's indexing runs. Constructed behind an `Arc` since
/// it spawns tasks (debounce ticks, queue drains) that reference itself.
pub struct IndexCoordinator {
    store: Arc<SqliteStore>,
    workspace_root: PathBuf,
    boundaries: RwLock<Vec<ProjectBoundary>>,
    indexing: IndexingConfig,
    scanner: FileScanner,
    processor: FileProcessor,
    parse_cache: Arc<ParseCache>,
    bus: CallbackBus,
    state: Mutex<CoordinatorState>,
    next_run_id: AtomicU64,
}

impl IndexCoordinator {
    pub fn new(
        store: Arc<SqliteStore>,
        workspace_root: PathBuf,
        boundaries: Vec<ProjectBoundary>,
        indexing: IndexingConfig,
        parsers: Vec<Box<dyn LanguageParser>>,
        tsconfig: Arc<crate::tsconfig::TsconfigCache>,
        parse_cache: Arc<ParseCache>,
    ) -> Arc<Self> {
        let scanner = FileScanner::new(indexing.extensions.clone(), indexing.ignore_patterns.clone());
        let processor = FileProcessor::new(parsers, tsconfig);
        Arc::new(Self {
            store,
            workspace_root,
            boundaries: RwLock::new(boundaries),
            indexing,
            scanner,
            processor,
            parse_cache,
            bus: CallbackBus::new(),
            state: Mutex::new(CoordinatorState::default()),
            next_run_id: AtomicU64::new(1),
        })
    }

    pub fn boundaries(&self) -> Vec<ProjectBoundary> {
        self.boundaries.read().clone()
    }

    pub fn set_boundaries(&self, boundaries: Vec<ProjectBoundary>) {
        *self.boundaries.write() = boundaries;
    }

    pub fn on_indexed(&self, callback: impl Fn(&IndexReport) + Send + Sync + 'static) -> Unsubscribe {
        self.bus.subscribe(callback)
    }

    /// Rebuilds the whole index from disk. Transactional: concurrent callers
    /// either queue behind it (if they too are full reindexes) or observe
    /// the run this call starts (if they're incremental).
    pub async fn full_index(self: &Arc<Self>) -> IndexResult<IndexReport> {
        self.start_index(None, true).await
    }

    /// Indexes `events` (or, if `None`, a fresh scan of every boundary)
    /// without the full-rebuild transaction. Non-transactional: a
    /// concurrent full reindex takes priority and this caller observes its
    /// result instead of starting a second run.
    pub async fn incremental_index(self: &Arc<Self>, events: Option<Vec<WatcherEvent>>) -> IndexResult<IndexReport> {
        self.start_index(events, false).await
    }

    /// Non-blocking entry point for the filesystem watcher: buffers the
    /// event and, on a 100ms-by-default debounce window with no reset on
    /// subsequent events, kicks off (or queues) an incremental run.
    pub fn handle_watcher_event(self: &Arc<Self>, event: WatcherEvent) {
        let basename = event.rel_path.rsplit('/').next().unwrap_or(&event.rel_path).to_string();

        if basename == "tsconfig.json" {
            let coordinator = self.clone();
            tokio::spawn(async move {
                if let Some((project, _)) = boundaries::resolve_workspace_path(&coordinator.boundaries(), &event.rel_path) {
                    if let Some(boundary) = coordinator.boundaries().iter().find(|b| b.name == project) {
                        let directory = boundaries::directory_for(&coordinator.workspace_root, boundary);
                        coordinator.processor.tsconfig_cache().clear(&directory);
                    }
                }
                if let Err(err) = coordinator.full_index().await {
                    tracing::error!(error = %err, "tsconfig change triggered full reindex, which failed");
                }
            });
            return;
        }

        if basename == "package.json" {
            let coordinator = self.clone();
            tokio::spawn(async move {
                match boundaries::discover(&coordinator.workspace_root) {
                    Ok(discovered) => {
                        coordinator.set_boundaries(discovered);
                        if let Err(err) = coordinator.full_index().await {
                            tracing::error!(error = %err, "boundary refresh triggered full reindex, which failed");
                        }
                    }
                    Err(err) => tracing::error!(error = %err, "failed to refresh project boundaries"),
                }
            });
            return;
        }

        let coordinator = self.clone();
        tokio::spawn(async move {
            let should_schedule = {
                let mut guard = coordinator.state.lock().await;
                if guard.shutting_down {
                    return;
                }
                guard.pending_events.push(event);
                let should_schedule = !guard.debounce_active;
                if should_schedule {
                    guard.debounce_active = true;
                }
                should_schedule
            };

            if should_schedule {
                tokio::time::sleep(std::time::Duration::from_millis(coordinator.indexing.debounce_ms)).await;
                coordinator.on_debounce_tick().await;
            }
        });
    }

    async fn on_debounce_tick(self: &Arc<Self>) {
        let events = {
            let mut guard = self.state.lock().await;
            guard.debounce_active = false;
            if guard.shutting_down || guard.indexing_lock || guard.pending_events.is_empty() {
                return;
            }
            std::mem::take(&mut guard.pending_events)
        };

        if let Err(err) = self.incremental_index(Some(events)).await {
            tracing::error!(error = %err, "debounced incremental index failed");
        }
    }

    /// Blocks until any in-flight run (and every run it chains into via
    /// queued work) has finished, then refuses further runs.
    pub async fn shutdown(self: &Arc<Self>) {
        {
            let mut guard = self.state.lock().await;
            guard.shutting_down = true;
        }
        loop {
            let (locked, rx) = {
                let guard = self.state.lock().await;
                (guard.indexing_lock, guard.current_run_rx.clone())
            };
            if !locked {
                return;
            }
            match rx {
                Some(mut rx) => {
                    let _ = rx.changed().await;
                }
                None => return,
            }
        }
    }

    async fn start_index(self: &Arc<Self>, events: Option<Vec<WatcherEvent>>, transactional: bool) -> IndexResult<IndexReport> {
        {
            let mut guard = self.state.lock().await;
            if guard.indexing_lock {
                if transactional {
                    let (tx, rx) = oneshot::channel();
                    guard.pending_full_index = true;
                    guard.full_index_waiters.push(tx);
                    drop(guard);
                    return match rx.await {
                        Ok(outcome) => Self::to_public_result(outcome),
                        Err(_) => Err(IndexError::SessionClosed),
                    };
                }

                let rx = guard.current_run_rx.clone();
                drop(guard);
                if let Some(mut rx) = rx {
                    loop {
                        if let Some(outcome) = rx.borrow().clone() {
                            return Self::to_public_result(outcome);
                        }
                        if rx.changed().await.is_err() {
                            return Err(IndexError::IndexFailed("index run ended with no result".into()));
                        }
                    }
                }
                return Err(IndexError::IndexBusy);
            }

            guard.indexing_lock = true;
            let (tx, rx) = watch::channel(None);
            guard.current_run_tx = Some(tx);
            guard.current_run_rx = Some(rx);
        }

        let outcome = self.run_one(events, transactional).await;
        self.publish(&outcome).await;

        let coordinator = self.clone();
        tokio::spawn(async move { coordinator.drain_queue().await });

        Self::to_public_result(outcome)
    }

    /// Runs the post-hook queue: a queued full reindex takes priority over
    /// buffered incremental events; each drained run's failure is logged,
    /// never propagated (nobody is left awaiting it).
    async fn drain_queue(self: Arc<Self>) {
        loop {
            let (events, transactional, waiters) = {
                let mut guard = self.state.lock().await;
                if guard.pending_full_index {
                    guard.pending_full_index = false;
                    let waiters = std::mem::take(&mut guard.full_index_waiters);
                    (None, true, waiters)
                } else if !guard.pending_events.is_empty() {
                    let drained = std::mem::take(&mut guard.pending_events);
                    (Some(drained), false, Vec::new())
                } else {
                    guard.indexing_lock = false;
                    guard.current_run_tx = None;
                    guard.current_run_rx = None;
                    return;
                }
            };

            {
                let mut guard = self.state.lock().await;
                let (tx, rx) = watch::channel(None);
                guard.current_run_tx = Some(tx);
                guard.current_run_rx = Some(rx);
            }

            let outcome = self.run_one(events, transactional).await;
            self.publish(&outcome).await;

            if !transactional {
                if let Err(err) = &outcome {
                    tracing::error!(error = %err, "queued incremental index failed");
                }
            }

            for waiter in waiters {
                let _ = waiter.send(outcome.clone());
            }
        }
    }

    async fn publish(&self, outcome: &RunOutcome) {
        let guard = self.state.lock().await;
        if let Some(tx) = &guard.current_run_tx {
            let _ = tx.send(Some(outcome.clone()));
        }
        drop(guard);
        if let Ok(report) = outcome {
            self.bus.emit(report);
        }
    }

    async fn run_one(&self, events: Option<Vec<WatcherEvent>>, transactional: bool) -> RunOutcome {
        match self.do_index(events, transactional).await {
            Ok(report) => Ok(Arc::new(report)),
            Err(err) => Err(Arc::new(err)),
        }
    }

    fn to_public_result(outcome: RunOutcome) -> IndexResult<IndexReport> {
        match outcome {
            Ok(report) => Ok((*report).clone()),
            Err(err) => Err(IndexError::IndexFailed(err.to_string())),
        }
    }

    /// The run algorithm shared by both paths: classify inputs, snapshot
    /// about-to-be-deleted files for the move tracker, process and write
    /// (per-file for incremental, one transaction for full), retarget moved
    /// symbols, and assemble the report.
    #[tracing::instrument(skip(self, events), fields(run_id = tracing::field::Empty))]
    async fn do_index(&self, events: Option<Vec<WatcherEvent>>, transactional: bool) -> IndexResult<IndexReport> {
        let run_id = self.next_run_id.fetch_add(1, Ordering::SeqCst);
        tracing::Span::current().record("run_id", run_id);
        tracing::info!(run_id, transactional, "starting index run");

        let start = std::time::Instant::now();
        let boundaries = self.boundaries();

        let (changed, deleted) = self.classify_inputs(events, &boundaries)?;
        tracing::debug!(run_id, changed = changed.len(), deleted = deleted.len(), "classified inputs");

        let mut deleted_snapshots = Vec::with_capacity(deleted.len());
        for (project, rel_path) in &deleted {
            let symbols = self.store.symbols_for_file(project, rel_path)?;
            deleted_snapshots.push(DeletedFileSnapshot {
                project: project.clone(),
                rel_path: rel_path.clone(),
                symbols,
            });
        }

        let mut report = IndexReport {
            deleted_files: deleted.iter().map(|(_, p)| p.clone()).collect(),
            ..Default::default()
        };
        let mut failed_files = Vec::new();
        let mut before_symbols = Vec::new();
        let mut after_symbols = Vec::new();

        for snapshot in &deleted_snapshots {
            before_symbols.extend(snapshot.symbols.clone());
        }

        if transactional {
            before_symbols = self.store.all_symbols()?;
            self.run_full(&boundaries, &changed, &mut report, &mut failed_files)?;
            after_symbols = self.store.all_symbols()?;
        } else {
            let writer = RepositoryWriter::new(&self.store);
            for (project, rel_path) in &deleted {
                writer.delete(project, rel_path)?;
            }
            report.removed_files = deleted.len() as u64;

            self.run_incremental(&boundaries, &changed, &mut report, &mut failed_files, &mut before_symbols, &mut after_symbols)?;
        }

        // MoveTracker's contract (spec.md §4.5) runs only on incremental
        // runs; a full reindex wholesale-replaces every file's rows in one
        // transaction and has no move-tracking step of its own (§4.6 step 6).
        if !transactional && !deleted_snapshots.is_empty() {
            self.store.transaction(|tx| {
                move_tracker::retarget_moved_symbols(&self.store, tx, &deleted_snapshots).map(|_| ())
            })?;
        }

        report.failed_files = failed_files;
        report.changed_symbols = diff_symbols(&before_symbols, &after_symbols);
        report.duration_ms = start.elapsed().as_millis() as u64;

        tracing::info!(
            run_id,
            indexed_files = report.indexed_files,
            removed_files = report.removed_files,
            failed_files = report.failed_files.len(),
            duration_ms = report.duration_ms,
            "index run finished"
        );

        Ok(report)
    }

    fn classify_inputs(
        &self,
        events: Option<Vec<WatcherEvent>>,
        boundaries: &[ProjectBoundary],
    ) -> IndexResult<(Vec<(String, String)>, Vec<(String, String)>)> {
        let mut changed = Vec::new();
        let mut deleted = Vec::new();

        match events {
            Some(events) => {
                for event in events {
                    let Some((project, rel_path)) = boundaries::resolve_workspace_path(boundaries, &event.rel_path) else {
                        continue;
                    };
                    match event.kind {
                        WatcherEventKind::Create | WatcherEventKind::Change => changed.push((project.to_string(), rel_path)),
                        WatcherEventKind::Delete => deleted.push((project.to_string(), rel_path)),
                    }
                }
            }
            None => {
                for boundary in boundaries {
                    let directory = boundaries::directory_for(&self.workspace_root, boundary);
                    let known = self.store.list_files(Some(&boundary.name))?;
                    for classified in self.scanner.classify(&directory, &known)? {
                        match classified {
                            FileChange::Changed { rel_path } => changed.push((boundary.name.clone(), rel_path)),
                            FileChange::Deleted { rel_path } => deleted.push((boundary.name.clone(), rel_path)),
                            FileChange::Unchanged { .. } => {}
                        }
                    }
                }
            }
        }

        Ok((changed, deleted))
    }

    // Processed and written per file rather than buffered like `run_full`:
    // incremental runs need each file's before-symbols snapshot read right
    // before that file's own write, so there's no batch parse step to fan
    // out over rayon here.
    fn run_incremental(
        &self,
        boundaries: &[ProjectBoundary],
        changed: &[(String, String)],
        report: &mut IndexReport,
        failed_files: &mut Vec<String>,
        before_symbols: &mut Vec<crate::model::Symbol>,
        after_symbols: &mut Vec<crate::model::Symbol>,
    ) -> IndexResult<()> {
        let writer = RepositoryWriter::new(&self.store);
        for (project, rel_path) in changed {
            let Some(boundary) = boundaries.iter().find(|b| &b.name == project) else {
                continue;
            };
            let directory = boundaries::directory_for(&self.workspace_root, boundary);

            // Captured before `writer.apply` replaces this file's rows, so
            // the changed-symbols diff can tell added/modified/unchanged
            // apart for reprocessed files, not just deleted ones.
            before_symbols.extend(self.store.symbols_for_file(project, rel_path)?);

            let processed = match self.processor.process(project, &directory, rel_path, None) {
                Ok(processed) => processed,
                Err(err) => {
                    tracing::warn!(file = %rel_path, error = %err, "skipping file during incremental index");
                    failed_files.push(rel_path.clone());
                    continue;
                }
            };

            writer.apply(&processed)?;
            self.parse_cache.put(
                project,
                rel_path,
                crate::parsing::ExtractedFile {
                    symbols: processed.symbols.clone(),
                    relations: processed.relations.clone(),
                },
            );

            report.total_symbols += processed.symbols.len() as u64;
            report.total_relations += processed.relations.len() as u64;
            after_symbols.extend(processed.symbols.clone());
            report.changed_files.push(processed.file.rel_path.clone());
            report.indexed_files += 1;
        }
        Ok(())
    }

    fn run_full(
        &self,
        boundaries: &[ProjectBoundary],
        changed: &[(String, String)],
        report: &mut IndexReport,
        failed_files: &mut Vec<String>,
    ) -> IndexResult<()> {
        let known_files: HashSet<String> = changed
            .iter()
            .map(|(project, rel_path)| format!("{project}::{rel_path}"))
            .collect();

        // Parsing is pure CPU work with no shared mutable state (the writer
        // transaction below is sequential), so it fans out over a rayon pool
        // sized from `self.indexing.parallel_threads`; 0 asks rayon to pick
        // automatically. tree-sitter parsers are reused per-thread via the
        // thread-local in parsing::typescript.
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.indexing.parallel_threads)
            .build()
            .map_err(|err| IndexError::Config(format!("indexing.parallel_threads: {err}")))?;

        let outcomes: Vec<Result<crate::processor::ProcessedFile, String>> = pool.install(|| {
            changed
                .par_iter()
                .filter_map(|(project, rel_path)| {
                    let boundary = boundaries.iter().find(|b| &b.name == project)?;
                    let directory = boundaries::directory_for(&self.workspace_root, boundary);
                    match self.processor.process(project, &directory, rel_path, Some(&known_files)) {
                        Ok(processed) => Some(Ok(processed)),
                        Err(err) => {
                            tracing::warn!(file = %rel_path, error = %err, "skipping file during full reindex");
                            Some(Err(rel_path.clone()))
                        }
                    }
                })
                .collect()
        });

        let mut buffered = Vec::with_capacity(outcomes.len());
        for outcome in outcomes {
            match outcome {
                Ok(processed) => buffered.push(processed),
                Err(rel_path) => failed_files.push(rel_path),
            }
        }

        self.store.transaction(|tx| {
            for boundary in boundaries {
                for file in self.store.list_files(Some(&boundary.name))? {
                    self.store.delete_file(tx, &boundary.name, &file.rel_path)?;
                }
            }
            for processed in &buffered {
                self.store.upsert_file(tx, &processed.file)?;
                self.store.replace_file_symbols(tx, &processed.file.project, &processed.file.rel_path, &processed.symbols)?;
                self.store.replace_file_relations(tx, &processed.file.project, &processed.file.rel_path, &processed.relations)?;
            }
            Ok(())
        })?;

        for processed in &buffered {
            self.parse_cache.put(
                &processed.file.project,
                &processed.file.rel_path,
                crate::parsing::ExtractedFile {
                    symbols: processed.symbols.clone(),
                    relations: processed.relations.clone(),
                },
            );
        }

        report.indexed_files = buffered.len() as u64;
        report.total_symbols = buffered.iter().map(|p| p.symbols.len() as u64).sum();
        report.total_relations = buffered.iter().map(|p| p.relations.len() as u64).sum();
        report.changed_files = buffered.iter().map(|p| p.file.rel_path.clone()).collect();
        Ok(())
    }
}

fn diff_symbols(before: &[crate::model::Symbol], after: &[crate::model::Symbol]) -> SymbolDiff {
    let before_map: HashMap<(String, String, crate::types::SymbolKind), &crate::model::Symbol> =
        before.iter().map(|s| ((s.rel_path.clone(), s.qualified_name.clone(), s.kind), s)).collect();
    let after_map: HashMap<(String, String, crate::types::SymbolKind), &crate::model::Symbol> =
        after.iter().map(|s| ((s.rel_path.clone(), s.qualified_name.clone(), s.kind), s)).collect();

    let mut diff = SymbolDiff::default();
    for (key, symbol) in &after_map {
        match before_map.get(key) {
            None => diff.added.push(ChangedSymbol {
                name: symbol.qualified_name.clone(),
                file_path: symbol.rel_path.clone(),
                kind: symbol.kind,
            }),
            Some(old) if old.fingerprint != symbol.fingerprint => diff.modified.push(ChangedSymbol {
                name: symbol.qualified_name.clone(),
                file_path: symbol.rel_path.clone(),
                kind: symbol.kind,
            }),
            _ => {}
        }
    }
    for (key, symbol) in &before_map {
        if !after_map.contains_key(key) {
            diff.removed.push(ChangedSymbol {
                name: symbol.qualified_name.clone(),
                file_path: symbol.rel_path.clone(),
                kind: symbol.kind,
            });
        }
    }
    diff
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn coordinator(dir: &TempDir) -> Arc<IndexCoordinator> {
        let store = Arc::new(SqliteStore::open(dir.path().join(".codetrace/index.sqlite3")).unwrap());
        let boundaries = vec![ProjectBoundary { name: "app".into(), directory: ".".into() }];
        store.upsert_project_boundary(&boundaries[0]).unwrap();
        IndexCoordinator::new(
            store,
            dir.path().to_path_buf(),
            boundaries,
            IndexingConfig::default(),
            vec![Box::new(crate::parsing::TypeScriptParser::new())],
            Arc::new(crate::tsconfig::TsconfigCache::new()),
            Arc::new(ParseCache::new(10)),
        )
    }

    #[tokio::test]
    async fn full_index_discovers_symbols_on_a_fresh_tree() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.ts"), "export function a() {}\n").unwrap();

        let coordinator = coordinator(&dir);
        let report = coordinator.full_index().await.unwrap();

        assert_eq!(report.indexed_files, 1);
        assert_eq!(report.total_symbols, 1);
        assert_eq!(report.changed_symbols.added.len(), 1);
    }

    #[tokio::test]
    async fn incremental_index_handles_explicit_events() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.ts"), "export function a() {}\n").unwrap();

        let coordinator = coordinator(&dir);
        let report = coordinator
            .incremental_index(Some(vec![WatcherEvent::create("a.ts")]))
            .await
            .unwrap();

        assert_eq!(report.indexed_files, 1);
        assert_eq!(report.total_symbols, 1);
    }

    #[tokio::test]
    async fn on_indexed_subscriber_receives_the_report() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.ts"), "export function a() {}\n").unwrap();

        let coordinator = coordinator(&dir);
        let seen = Arc::new(std::sync::Mutex::new(0u64));
        let seen2 = seen.clone();
        coordinator.on_indexed(move |report| *seen2.lock().unwrap() = report.indexed_files);

        coordinator.full_index().await.unwrap();
        assert_eq!(*seen.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn deleting_a_file_removes_its_symbols() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.ts"), "export function a() {}\n").unwrap();

        let coordinator = coordinator(&dir);
        coordinator.full_index().await.unwrap();

        fs::remove_file(dir.path().join("a.ts")).unwrap();
        let report = coordinator
            .incremental_index(Some(vec![WatcherEvent::delete("a.ts")]))
            .await
            .unwrap();

        assert_eq!(report.removed_files, 1);
        assert!(coordinator.store.symbols_for_file("app", "a.ts").unwrap().is_empty());
    }
}
