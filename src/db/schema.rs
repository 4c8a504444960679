//! SQL schemas. Each component runs only its own schema on its own connection.

/// Key-value slots used by the note store.
pub const KV_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS kv_store (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL,
    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
);
"#;

/// Versioned cache buckets used by the offline cache controller.
pub const CACHE_SCHEMA: &str = r#"
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS cache_buckets (
    name TEXT PRIMARY KEY,
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- One row per cached request, keyed by a hash of method + url
CREATE TABLE IF NOT EXISTS cache_entries (
    bucket TEXT NOT NULL,
    request_key TEXT NOT NULL,
    method TEXT NOT NULL,
    url TEXT NOT NULL,
    status INTEGER NOT NULL,
    response_type TEXT NOT NULL,
    headers TEXT NOT NULL,
    body BLOB NOT NULL,
    cached_at TEXT NOT NULL DEFAULT (datetime('now')),
    PRIMARY KEY (bucket, request_key),
    FOREIGN KEY (bucket) REFERENCES cache_buckets(name) ON DELETE CASCADE
);

-- Single-row lifecycle record of the controller
CREATE TABLE IF NOT EXISTS controller_state (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    active_version TEXT,
    waiting_version TEXT
);
"#;
