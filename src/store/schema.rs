//! DDL applied on every `SqliteStore::open`. Idempotent: every statement
//! uses `IF NOT EXISTS`, so opening an already-initialized database is a
//! no-op beyond the `PRAGMA`s `SqliteStore::open` issues first.

pub const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS project_boundary (
    name        TEXT PRIMARY KEY,
    directory   TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS file (
    project             TEXT NOT NULL,
    rel_path            TEXT NOT NULL,
    content_hash        TEXT NOT NULL,
    mtime_ms            INTEGER NOT NULL,
    size_bytes          INTEGER NOT NULL,
    last_indexed_at_ms  INTEGER NOT NULL,
    PRIMARY KEY (project, rel_path)
);

CREATE TABLE IF NOT EXISTS symbol (
    id                  INTEGER PRIMARY KEY AUTOINCREMENT,
    project             TEXT NOT NULL,
    rel_path            TEXT NOT NULL,
    qualified_name      TEXT NOT NULL,
    kind                TEXT NOT NULL,
    start_line          INTEGER NOT NULL,
    start_column        INTEGER NOT NULL,
    end_line            INTEGER NOT NULL,
    end_column          INTEGER NOT NULL,
    exported            INTEGER NOT NULL,
    signature           TEXT NOT NULL,
    signature_summary   TEXT NOT NULL,
    fingerprint         TEXT NOT NULL,
    detail              TEXT NOT NULL,
    FOREIGN KEY (project, rel_path) REFERENCES file (project, rel_path) ON DELETE CASCADE,
    UNIQUE (project, rel_path, qualified_name, kind)
);

CREATE INDEX IF NOT EXISTS idx_symbol_fingerprint ON symbol (fingerprint);
CREATE INDEX IF NOT EXISTS idx_symbol_project_file ON symbol (project, rel_path);
CREATE INDEX IF NOT EXISTS idx_symbol_qualified_name ON symbol (project, qualified_name);

CREATE TABLE IF NOT EXISTS relation (
    id                  INTEGER PRIMARY KEY AUTOINCREMENT,
    kind                TEXT NOT NULL,
    src_project         TEXT NOT NULL,
    src_rel_path        TEXT NOT NULL,
    src_qualified_name  TEXT,
    dst_project         TEXT NOT NULL,
    dst_rel_path        TEXT NOT NULL,
    dst_qualified_name  TEXT,
    metadata            TEXT NOT NULL,
    FOREIGN KEY (src_project, src_rel_path) REFERENCES file (project, rel_path) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_relation_src ON relation (src_project, src_rel_path);
CREATE INDEX IF NOT EXISTS idx_relation_dst ON relation (dst_project, dst_rel_path);

CREATE TABLE IF NOT EXISTS owner (
    id              INTEGER PRIMARY KEY CHECK (id = 1),
    pid             INTEGER NOT NULL,
    heartbeat_at_ms INTEGER NOT NULL
);
"#;
