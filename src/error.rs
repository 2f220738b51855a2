//! Error taxonomy for the index. Every fallible path in the crate resolves
//! to an [`IndexError`], whose [`ErrorKind`] lets callers branch on category
//! without matching every variant.

use std::path::PathBuf;
use thiserror::Error;

/// Coarse category of an [`IndexError`], mirroring the kinds a caller of the
/// public `Session` API needs to distinguish.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    Store,
    Parse,
    Index,
    Search,
    Closed,
    Close,
}

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("invalid project root {path}: {reason}")]
    InvalidProjectRoot { path: PathBuf, reason: String },

    #[error("unknown project {0:?}")]
    UnknownProject(String),

    #[error("ambiguous default project: {0} projects registered, none marked default")]
    AmbiguousDefaultProject(usize),

    #[error("config error: {0}")]
    Config(String),

    #[error("store error: {0}")]
    Store(#[from] rusqlite::Error),

    #[error("store is locked by another owner (pid {pid}, last heartbeat {age_secs}s ago)")]
    StoreLocked { pid: u32, age_secs: u64 },

    #[error("io error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("parse error in {path}: {reason}")]
    Parse { path: PathBuf, reason: String },

    #[error("unsupported file extension: {0}")]
    UnsupportedExtension(String),

    #[error("index is already running a full reindex")]
    IndexBusy,

    #[error("symbol not found: {0}")]
    SymbolNotFound(String),

    #[error("file not found in index: {0}")]
    FileNotFound(PathBuf),

    #[error("search error: {0}")]
    Search(String),

    #[error("session is closed")]
    SessionClosed,

    #[error("this session is a reader; only the owner can {0}")]
    ReaderOnly(String),

    #[error("error while closing session: {0}")]
    CloseFailed(String),

    #[error("watcher error: {0}")]
    Watcher(String),

    #[error("mutex poisoned: {0}")]
    Poisoned(String),

    #[error("{0}")]
    IndexFailed(String),
}

impl IndexError {
    /// Actionable next steps for a human looking at this error, in the
    /// teacher's `error.rs` texture: short, imperative, empty when nothing
    /// better than the error message itself applies.
    pub fn recovery_suggestions(&self) -> Vec<&'static str> {
        match self {
            Self::InvalidProjectRoot { .. } => vec![
                "Pass an absolute path that exists as the project root",
            ],
            Self::Store(_) | Self::StoreLocked { .. } => vec![
                "Check that .codetrace/index.sqlite3 is writable and not held by a crashed process",
                "Delete .codetrace/ and run `codetrace index` to rebuild from scratch",
            ],
            Self::Poisoned(_) => vec!["Restart the session; a poisoned lock cannot be recovered in place"],
            Self::Io { .. } => vec!["Check that the file exists and you have read permissions"],
            Self::Parse { .. } => vec![
                "The file was skipped for this run; fix the syntax error and it will be reprocessed",
            ],
            Self::UnsupportedExtension(_) => vec!["Only TypeScript-family extensions (.ts, .tsx, .mts, .cts) are indexed"],
            Self::IndexBusy => vec!["Wait for the in-flight reindex to finish, or call it again to queue behind it"],
            Self::SessionClosed => vec!["Open a new Session; this one has already released its resources"],
            Self::ReaderOnly(_) => vec!["Only the owner session can index; wait for promotion or open with watch_mode disabled"],
            Self::CloseFailed(_) => vec!["Some subsystems failed to close cleanly; check the aggregated error for which"],
            Self::Watcher(_) => vec!["Check the platform's filesystem watch limits (e.g. inotify max_user_watches)"],
            _ => vec![],
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            IndexError::InvalidProjectRoot { .. }
            | IndexError::UnknownProject(_)
            | IndexError::AmbiguousDefaultProject(_)
            | IndexError::Config(_)
            | IndexError::UnsupportedExtension(_) => ErrorKind::Validation,

            IndexError::Store(_) | IndexError::StoreLocked { .. } | IndexError::Poisoned(_) => {
                ErrorKind::Store
            }

            IndexError::Io { .. } | IndexError::Parse { .. } => ErrorKind::Parse,

            IndexError::IndexBusy | IndexError::Watcher(_) | IndexError::IndexFailed(_) => ErrorKind::Index,

            IndexError::SymbolNotFound(_) | IndexError::FileNotFound(_) | IndexError::Search(_) => {
                ErrorKind::Search
            }

            IndexError::SessionClosed | IndexError::ReaderOnly(_) => ErrorKind::Closed,

            IndexError::CloseFailed(_) => ErrorKind::Close,
        }
    }
}

pub type IndexResult<T> = Result<T, IndexError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn closed_errors_carry_a_recovery_suggestion() {
        assert!(!IndexError::SessionClosed.recovery_suggestions().is_empty());
        assert!(!IndexError::ReaderOnly("reindex".into()).recovery_suggestions().is_empty());
    }

    #[test]
    fn unit_variants_with_no_advice_return_empty() {
        assert!(IndexError::SymbolNotFound("foo".into()).recovery_suggestions().is_empty());
    }
}
