//! The public handle: validates configuration, composes every other
//! component, decides owner vs. reader, and exposes the query/lifecycle
//! surface. One facade type wraps the query and mutation components,
//! validates inputs at the boundary, and guards a closed/open state; it
//! also owns graceful shutdown on `SIGINT`/`SIGTERM`.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::{Mutex as SyncMutex, RwLock};
use tokio::sync::Mutex as AsyncMutex;

use crate::boundaries;
use crate::bus::Unsubscribe;
use crate::config::Settings;
use crate::coordinator::IndexCoordinator;
use crate::error::{IndexError, IndexResult};
use crate::graph::{DependencyGraph, GraphScope};
use crate::graph_cache::GraphCache;
use crate::health::HealthMonitor;
use crate::model::{ProjectBoundary, Relation, Symbol};
use crate::parse_cache::ParseCache;
use crate::parsing::{ExtractedFile, LanguageParser, TypeScriptParser};
use crate::report::IndexReport;
use crate::store::{OwnershipArbiter, SqliteStore, StoreStats};
use crate::tsconfig::TsconfigCache;
use crate::types::WatcherEvent;
use crate::watcher::FileWatcher;

pub(crate) fn now_ms() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

fn default_parsers() -> Vec<Box<dyn LanguageParser>> {
    vec![Box::new(TypeScriptParser::new())]
}

/// Which side of the owner/reader election this session landed on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Owner,
    Reader,
}

/// Handle returned by [`Session::on_indexed`]. Unlike [`Unsubscribe`], this
/// also survives a reader-to-owner promotion: the underlying callback stays
/// registered with `SessionInner` and is re-attached to whatever coordinator
/// is current, so a caller only ever deals with one handle regardless of
/// how many times the session's coordinator is rebuilt.
pub struct CallbackHandle {
    id: u64,
    inner: Arc<SessionInner>,
}

impl CallbackHandle {
    pub fn call(self) {
        let mut callbacks = self.inner.registered_callbacks.lock();
        if let Some(pos) = callbacks.iter().position(|c| c.id == self.id) {
            let removed = callbacks.remove(pos);
            if let Some(active) = removed.active {
                active.call();
            }
        }
    }
}

struct RegisteredCallback {
    id: u64,
    callback: Arc<dyn Fn(&IndexReport) + Send + Sync>,
    active: Option<Unsubscribe>,
}

/// The shared state behind every clone-free `Session` method. Split out
/// from `Session` itself so background tasks (heartbeat, healthcheck,
/// signal handlers) can hold an `Arc<SessionInner>` without holding a
/// `Session` (which has no meaningful "extra" state beyond this).
pub(crate) struct SessionInner {
    pub(crate) store: Arc<SqliteStore>,
    pub(crate) workspace_root: PathBuf,
    pub(crate) settings: Settings,
    pub(crate) pid: u32,
    default_project: String,
    boundaries: RwLock<Vec<ProjectBoundary>>,
    role: RwLock<Role>,
    coordinator: RwLock<Option<Arc<IndexCoordinator>>>,
    watcher: AsyncMutex<Option<FileWatcher>>,
    pub(crate) parse_cache: Arc<ParseCache>,
    pub(crate) tsconfig: Arc<TsconfigCache>,
    graph_cache: Arc<GraphCache>,
    heartbeat_task: AsyncMutex<Option<tokio::task::JoinHandle<()>>>,
    health_monitor: AsyncMutex<Option<HealthMonitor>>,
    signal_tasks: AsyncMutex<Vec<tokio::task::JoinHandle<()>>>,
    registered_callbacks: SyncMutex<Vec<RegisteredCallback>>,
    next_callback_id: AtomicU64,
    pub(crate) closed: AtomicBool,
}

impl SessionInner {
    pub(crate) fn staleness_threshold_ms(&self) -> i64 {
        self.settings.ownership.staleness_threshold_ms
    }

    pub(crate) fn healthcheck_interval_ms(&self) -> u64 {
        self.settings.ownership.healthcheck_interval_ms
    }

    pub(crate) fn max_healthcheck_retries(&self) -> u32 {
        self.settings.ownership.max_healthcheck_retries
    }

    /// Attempts the promotion sequence: build a fresh
    /// coordinator + watcher, re-subscribe every registered callback, start
    /// the owner's heartbeat, then run an initial full index. Returns
    /// `true` if promotion succeeded (the session is now the owner and the
    /// caller's healthcheck loop should stop); `false` if it was rolled
    /// back (the session remains a reader and healthchecking continues).
    pub(crate) async fn promote(self: Arc<Self>) -> bool {
        match self.try_promote().await {
            Ok(()) => {
                *self.role.write() = Role::Owner;
                true
            }
            Err(err) => {
                tracing::error!(error = %err, "promotion to owner failed; session remains a reader");
                false
            }
        }
    }

    async fn try_promote(&self) -> IndexResult<()> {
        let boundaries = boundaries::discover(&self.workspace_root)?;
        for boundary in &boundaries {
            self.store.upsert_project_boundary(boundary)?;
        }

        let coordinator = IndexCoordinator::new(
            self.store.clone(),
            self.workspace_root.clone(),
            boundaries.clone(),
            self.settings.indexing.clone(),
            default_parsers(),
            self.tsconfig.clone(),
            self.parse_cache.clone(),
        );

        let graph_cache = self.graph_cache.clone();
        coordinator.on_indexed(move |_| graph_cache.invalidate());
        {
            let mut callbacks = self.registered_callbacks.lock();
            for registered in callbacks.iter_mut() {
                let callback = registered.callback.clone();
                registered.active = Some(coordinator.on_indexed(move |report| callback(report)));
            }
        }

        let watcher = FileWatcher::start(&self.workspace_root, &boundaries, coordinator.clone())?;

        let heartbeat_task = spawn_heartbeat(self.store.clone(), self.pid, self.settings.ownership.heartbeat_interval_ms);

        *self.heartbeat_task.lock().await = Some(heartbeat_task);
        *self.watcher.lock().await = Some(watcher);
        *self.boundaries.write() = boundaries;
        *self.coordinator.write() = Some(coordinator.clone());

        if let Err(err) = coordinator.full_index().await {
            if let Some(task) = self.heartbeat_task.lock().await.take() {
                task.abort();
            }
            if let Some(watcher) = self.watcher.lock().await.take() {
                watcher.close().await;
            }
            *self.coordinator.write() = None;
            return Err(err);
        }

        Ok(())
    }

    /// Idempotent graceful shutdown, in order: signal handlers,
    /// coordinator, watcher, timers, ownership, store.
    pub(crate) async fn close(&self) -> IndexResult<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        for task in self.signal_tasks.lock().await.drain(..) {
            task.abort();
        }

        if let Some(coordinator) = self.coordinator.write().take() {
            coordinator.shutdown().await;
        }

        if let Some(watcher) = self.watcher.lock().await.take() {
            watcher.close().await;
        }

        if let Some(task) = self.heartbeat_task.lock().await.take() {
            task.abort();
        }
        if let Some(monitor) = self.health_monitor.lock().await.take() {
            monitor.stop();
        }

        let mut errors = Vec::new();
        if let Err(err) = OwnershipArbiter::new(&self.store).release(self.pid) {
            errors.push(format!("ownership release: {err}"));
        }
        if let Err(err) = self.store.close() {
            errors.push(format!("store close: {err}"));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(IndexError::CloseFailed(errors.join("; ")))
        }
    }
}

fn spawn_heartbeat(store: Arc<SqliteStore>, pid: u32, interval_ms: u64) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(Duration::from_millis(interval_ms)).await;
            if let Err(err) = OwnershipArbiter::new(&store).heartbeat(pid, now_ms()) {
                tracing::error!(error = %err, "failed to refresh ownership heartbeat");
            }
        }
    })
}

fn spawn_signal_handlers(inner: Arc<SessionInner>) -> Vec<tokio::task::JoinHandle<()>> {
    let mut handles = Vec::new();

    let interrupt_inner = inner.clone();
    handles.push(tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            if let Err(err) = interrupt_inner.close().await {
                tracing::error!(error = %err, "close on interrupt signal failed");
            }
        }
    }));

    #[cfg(unix)]
    {
        let terminate_inner = inner.clone();
        handles.push(tokio::spawn(async move {
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(mut stream) => {
                    if stream.recv().await.is_some() {
                        if let Err(err) = terminate_inner.close().await {
                            tracing::error!(error = %err, "close on terminate signal failed");
                        }
                    }
                }
                Err(err) => tracing::error!(error = %err, "failed to register terminate signal handler"),
            }
        }));
    }

    handles
}

/// Public entry point: `Session::open` validates a [`Settings`], elects
/// owner or reader, and returns a handle whose queries are safe to call
/// from anywhere until [`Session::close`].
pub struct Session {
    inner: Arc<SessionInner>,
}

impl Session {
    /// Opens (or joins) the index for `settings.project_root`: validates
    /// the root, opens the store, discovers boundaries, attempts
    /// ownership, and branches into the owner
    /// (coordinator + watcher + heartbeat + initial full index) or reader
    /// (healthcheck loop only) setup. `watch_mode = false` skips ownership,
    /// heartbeat, watcher, and signal handlers entirely (one-shot scan).
    pub async fn open(settings: Settings) -> IndexResult<Session> {
        let project_root = settings.project_root.clone();
        if !project_root.is_absolute() {
            return Err(IndexError::InvalidProjectRoot {
                path: project_root,
                reason: "project root must be an absolute path".into(),
            });
        }
        if !project_root.exists() {
            return Err(IndexError::InvalidProjectRoot {
                path: project_root,
                reason: "project root does not exist".into(),
            });
        }

        let store = Arc::new(SqliteStore::open(settings.index_path())?);

        let boundaries = match boundaries::discover(&project_root) {
            Ok(boundaries) => boundaries,
            Err(err) => {
                let _ = store.close();
                return Err(err);
            }
        };
        for boundary in &boundaries {
            if let Err(err) = store.upsert_project_boundary(boundary) {
                let _ = store.close();
                return Err(err);
            }
        }

        let default_project = boundaries
            .first()
            .map(|b| b.name.clone())
            .unwrap_or_else(|| basename(&project_root));

        let pid = std::process::id();
        let parse_cache = Arc::new(ParseCache::new(settings.indexing.parse_cache_capacity));
        let tsconfig = Arc::new(TsconfigCache::new());
        let graph_cache = Arc::new(GraphCache::new());

        let inner = Arc::new(SessionInner {
            store,
            workspace_root: project_root.clone(),
            settings: settings.clone(),
            pid,
            default_project,
            boundaries: RwLock::new(boundaries.clone()),
            role: RwLock::new(Role::Reader),
            coordinator: RwLock::new(None),
            watcher: AsyncMutex::new(None),
            parse_cache,
            tsconfig,
            graph_cache,
            heartbeat_task: AsyncMutex::new(None),
            health_monitor: AsyncMutex::new(None),
            signal_tasks: AsyncMutex::new(Vec::new()),
            registered_callbacks: SyncMutex::new(Vec::new()),
            next_callback_id: AtomicU64::new(0),
            closed: AtomicBool::new(false),
        });

        if !settings.indexing.watch_mode {
            let coordinator = new_coordinator(&inner, boundaries.clone());
            let graph_cache = inner.graph_cache.clone();
            coordinator.on_indexed(move |_| graph_cache.invalidate());
            *inner.coordinator.write() = Some(coordinator.clone());
            *inner.role.write() = Role::Owner;
            coordinator.full_index().await?;
            return Ok(Session { inner });
        }

        let became_owner =
            OwnershipArbiter::new(&inner.store).try_acquire(pid, now_ms(), inner.staleness_threshold_ms())?;

        if became_owner {
            *inner.role.write() = Role::Owner;
            let coordinator = new_coordinator(&inner, boundaries.clone());
            let graph_cache = inner.graph_cache.clone();
            coordinator.on_indexed(move |_| graph_cache.invalidate());

            let watcher = FileWatcher::start(&project_root, &boundaries, coordinator.clone())?;
            *inner.watcher.lock().await = Some(watcher);
            *inner.coordinator.write() = Some(coordinator.clone());

            let heartbeat_task =
                spawn_heartbeat(inner.store.clone(), pid, inner.settings.ownership.heartbeat_interval_ms);
            *inner.heartbeat_task.lock().await = Some(heartbeat_task);

            coordinator.full_index().await?;
        } else {
            *inner.role.write() = Role::Reader;
            let monitor = HealthMonitor::start(inner.clone());
            *inner.health_monitor.lock().await = Some(monitor);
        }

        let signal_tasks = spawn_signal_handlers(inner.clone());
        *inner.signal_tasks.lock().await = signal_tasks;

        Ok(Session { inner })
    }

    pub async fn close(&self) -> IndexResult<()> {
        self.inner.close().await
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    pub fn role(&self) -> Role {
        *self.inner.role.read()
    }

    /// A defensive copy of the boundary list; callers cannot mutate
    /// internal state through it.
    pub fn projects(&self) -> Vec<ProjectBoundary> {
        self.inner.boundaries.read().clone()
    }

    pub fn default_project(&self) -> &str {
        &self.inner.default_project
    }

    fn guard_open(&self) -> IndexResult<()> {
        if self.is_closed() {
            return Err(IndexError::SessionClosed);
        }
        Ok(())
    }

    fn resolve_project(&self, project: Option<&str>) -> IndexResult<String> {
        self.guard_open()?;
        let name = project.unwrap_or(&self.inner.default_project);
        let boundaries = self.inner.boundaries.read();
        if boundaries.iter().any(|b| b.name == name) {
            Ok(name.to_string())
        } else {
            Err(IndexError::UnknownProject(name.to_string()))
        }
    }

    fn coordinator(&self, op: &str) -> IndexResult<Arc<IndexCoordinator>> {
        self.guard_open()?;
        self.inner
            .coordinator
            .read()
            .clone()
            .ok_or_else(|| IndexError::ReaderOnly(op.to_string()))
    }

    /// Requests a full transactional reindex. Owner-only: a reader that
    /// hasn't promoted yet fails with `kind=closed` (spec.md §7).
    pub async fn reindex(&self) -> IndexResult<IndexReport> {
        self.coordinator("reindex")?.full_index().await
    }

    /// Incremental reindex, either of `events` or (if `None`) a fresh scan.
    pub async fn incremental_reindex(&self, events: Option<Vec<WatcherEvent>>) -> IndexResult<IndexReport> {
        self.coordinator("incremental reindex")?.incremental_index(events).await
    }

    /// Registers a completion callback. Survives a reader-to-owner
    /// promotion: see [`CallbackHandle`].
    pub fn on_indexed(&self, callback: impl Fn(&IndexReport) + Send + Sync + 'static) -> IndexResult<CallbackHandle> {
        self.guard_open()?;
        let id = self.inner.next_callback_id.fetch_add(1, Ordering::SeqCst);
        let callback: Arc<dyn Fn(&IndexReport) + Send + Sync> = Arc::new(callback);
        let active = self.inner.coordinator.read().clone().map(|coordinator| {
            let callback = callback.clone();
            coordinator.on_indexed(move |report| callback(report))
        });
        self.inner
            .registered_callbacks
            .lock()
            .push(RegisteredCallback { id, callback, active });
        Ok(CallbackHandle { id, inner: self.inner.clone() })
    }

    fn graph(&self, project: Option<&str>) -> IndexResult<Arc<DependencyGraph>> {
        let project = self.resolve_project(project)?;
        self.inner
            .graph_cache
            .get_or_build(&self.inner.store, GraphScope::Project(project))
    }

    /// Dependency graph spanning every boundary at once; cross-project
    /// imports share one scope rather than one per project.
    pub fn cross_project_graph(&self) -> IndexResult<Arc<DependencyGraph>> {
        self.guard_open()?;
        self.inner.graph_cache.get_or_build(&self.inner.store, GraphScope::Cross)
    }

    pub fn get_dependencies(&self, project: Option<&str>, file: &str) -> IndexResult<Vec<String>> {
        Ok(self.graph(project)?.get_dependencies(file))
    }

    pub fn get_dependents(&self, project: Option<&str>, file: &str) -> IndexResult<Vec<String>> {
        Ok(self.graph(project)?.get_dependents(file))
    }

    pub fn get_transitive_dependencies(&self, project: Option<&str>, file: &str) -> IndexResult<Vec<String>> {
        Ok(self.graph(project)?.get_transitive_dependencies(file))
    }

    pub fn get_affected_by_change(&self, project: Option<&str>, files: &[String]) -> IndexResult<Vec<String>> {
        Ok(self.graph(project)?.get_affected_by_change(files))
    }

    pub fn has_cycle(&self, project: Option<&str>) -> IndexResult<bool> {
        Ok(self.graph(project)?.has_cycle())
    }

    pub fn get_cycle_paths(&self, project: Option<&str>, max_cycles: Option<usize>) -> IndexResult<Vec<Vec<String>>> {
        Ok(self.graph(project)?.get_cycle_paths(max_cycles))
    }

    pub fn stats(&self, project: Option<&str>) -> IndexResult<StoreStats> {
        let project = self.resolve_project(project)?;
        self.inner.store.stats_for_project(&project)
    }

    pub fn find_symbol(&self, project: Option<&str>, qualified_name: &str) -> IndexResult<Option<Symbol>> {
        let project = self.resolve_project(project)?;
        self.inner.store.find_symbol(&project, qualified_name)
    }

    pub fn file_symbols(&self, project: Option<&str>, rel_path: &str) -> IndexResult<Vec<Symbol>> {
        let project = self.resolve_project(project)?;
        self.inner.store.symbols_for_file(&project, rel_path)
    }

    pub fn outgoing_relations(&self, project: Option<&str>, rel_path: &str) -> IndexResult<Vec<Relation>> {
        let project = self.resolve_project(project)?;
        self.inner.store.relations_from_file(&project, rel_path)
    }

    pub fn incoming_relations(&self, project: Option<&str>, rel_path: &str) -> IndexResult<Vec<Relation>> {
        let project = self.resolve_project(project)?;
        self.inner.store.relations_to_file(&project, rel_path)
    }

    /// Parses `source` ad hoc (no write to the store) and caches the
    /// result, as if it had come from the on-disk file at `rel_path`.
    pub fn parse_source(&self, project: Option<&str>, rel_path: &str, source: &str) -> IndexResult<Arc<ExtractedFile>> {
        let project = self.resolve_project(project)?;
        let parser = TypeScriptParser::new();
        let extracted = parser.parse_file(&project, rel_path, source)?;
        self.inner.parse_cache.put(&project, rel_path, extracted.clone());
        Ok(Arc::new(extracted))
    }

    pub fn get_parsed_ast(&self, project: Option<&str>, rel_path: &str) -> IndexResult<Option<Arc<ExtractedFile>>> {
        let project = self.resolve_project(project)?;
        Ok(self.inner.parse_cache.get(&project, rel_path))
    }
}

fn new_coordinator(inner: &Arc<SessionInner>, boundaries: Vec<ProjectBoundary>) -> Arc<IndexCoordinator> {
    IndexCoordinator::new(
        inner.store.clone(),
        inner.workspace_root.clone(),
        boundaries,
        inner.settings.indexing.clone(),
        default_parsers(),
        inner.tsconfig.clone(),
        inner.parse_cache.clone(),
    )
}

fn basename(path: &std::path::Path) -> String {
    path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_else(|| "root".into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn settings_for(dir: &TempDir, watch_mode: bool) -> Settings {
        let mut settings = Settings::default();
        settings.project_root = dir.path().to_path_buf();
        settings.indexing.watch_mode = watch_mode;
        settings
    }

    #[tokio::test]
    async fn one_shot_open_indexes_and_resolves_dependencies() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("package.json"), r#"{"name":"p"}"#).unwrap();
        fs::write(dir.path().join("a.ts"), "export const x = 1;\n").unwrap();
        fs::write(dir.path().join("b.ts"), "import { x } from './a';\nconsole.log(x);\n").unwrap();

        let session = Session::open(settings_for(&dir, false)).await.unwrap();
        assert_eq!(session.role(), Role::Owner);
        assert_eq!(session.get_dependencies(None, "b.ts").unwrap(), vec!["a.ts".to_string()]);
        assert_eq!(session.get_dependents(None, "a.ts").unwrap(), vec!["b.ts".to_string()]);
        assert!(!session.has_cycle(None).unwrap());

        session.close().await.unwrap();
    }

    #[tokio::test]
    async fn open_rejects_relative_project_root() {
        let mut settings = Settings::default();
        settings.project_root = PathBuf::from("relative/path");
        let err = Session::open(settings).await.unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Validation);
    }

    #[tokio::test]
    async fn queries_fail_closed_after_close() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("package.json"), r#"{"name":"p"}"#).unwrap();
        fs::write(dir.path().join("a.ts"), "export const x = 1;\n").unwrap();

        let session = Session::open(settings_for(&dir, false)).await.unwrap();
        session.close().await.unwrap();

        let err = session.get_dependencies(None, "a.ts").unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Closed);

        // Idempotent: a second close is a no-op success.
        session.close().await.unwrap();
    }

    #[tokio::test]
    async fn two_opens_on_the_same_root_elect_one_owner() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("package.json"), r#"{"name":"p"}"#).unwrap();
        fs::write(dir.path().join("a.ts"), "export const x = 1;\n").unwrap();

        let first = Session::open(settings_for(&dir, true)).await.unwrap();
        assert_eq!(first.role(), Role::Owner);

        let second = Session::open(settings_for(&dir, true)).await.unwrap();
        assert_eq!(second.role(), Role::Reader);

        let err = second.reindex().await.unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Closed);

        first.close().await.unwrap();
        second.close().await.unwrap();
    }
}
