//! Wraps a `notify::RecommendedWatcher` and feeds translated
//! [`WatcherEvent`]s to an [`IndexCoordinator`]: one `notify` instance per
//! session, routed through an mpsc channel into an async task rather than
//! handled from the notify callback thread directly.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use notify::Watcher as _;

use crate::coordinator::IndexCoordinator;
use crate::error::{IndexError, IndexResult};
use crate::model::ProjectBoundary;
use crate::types::{WatcherEvent, WatcherEventKind};

pub struct FileWatcher {
    _watcher: notify::RecommendedWatcher,
    task: tokio::task::JoinHandle<()>,
}

impl FileWatcher {
    /// Registers a recursive watch on every boundary's directory and spawns
    /// a task that drains notify's events into `coordinator.handle_watcher_event`.
    pub fn start(
        workspace_root: &Path,
        boundaries: &[ProjectBoundary],
        coordinator: Arc<IndexCoordinator>,
    ) -> IndexResult<Self> {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<notify::Result<notify::Event>>();

        let mut watcher = notify::recommended_watcher(move |res| {
            let _ = tx.send(res);
        })
        .map_err(|err| IndexError::Watcher(err.to_string()))?;

        for boundary in boundaries {
            let directory = crate::boundaries::directory_for(workspace_root, boundary);
            if !directory.exists() {
                continue;
            }
            watcher
                .watch(&directory, notify::RecursiveMode::Recursive)
                .map_err(|err| IndexError::Watcher(err.to_string()))?;
        }

        let workspace_root = workspace_root.to_path_buf();
        let task = tokio::spawn(async move {
            while let Some(result) = rx.recv().await {
                match result {
                    Ok(event) => {
                        for watcher_event in to_watcher_events(&workspace_root, &event) {
                            coordinator.handle_watcher_event(watcher_event);
                        }
                    }
                    Err(err) => tracing::error!(error = %err, "filesystem watcher error"),
                }
            }
        });

        Ok(Self { _watcher: watcher, task })
    }

    /// Stops the draining task and drops the underlying `notify` watcher,
    /// which tears down its OS-level watches.
    pub async fn close(self) {
        self.task.abort();
        let _ = self.task.await;
    }
}

fn to_watcher_events(workspace_root: &Path, event: &notify::Event) -> Vec<WatcherEvent> {
    let kind = match event.kind {
        notify::EventKind::Create(_) => WatcherEventKind::Create,
        notify::EventKind::Modify(_) => WatcherEventKind::Change,
        notify::EventKind::Remove(_) => WatcherEventKind::Delete,
        _ => return Vec::new(),
    };

    event
        .paths
        .iter()
        .filter_map(|path| relative_to(workspace_root, path))
        .map(|rel_path| match kind {
            WatcherEventKind::Create => WatcherEvent::create(rel_path),
            WatcherEventKind::Change => WatcherEvent::change(rel_path),
            WatcherEventKind::Delete => WatcherEvent::delete(rel_path),
        })
        .collect()
}

fn relative_to(workspace_root: &Path, path: &Path) -> Option<String> {
    path.strip_prefix(workspace_root).ok().map(|rel| rel.to_string_lossy().replace('\\', "/"))
}
