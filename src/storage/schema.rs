//! Database schema definitions
//!
//! This module contains the SQL schema for the run ledger.

/// SQL schema for the database
pub const SCHEMA_SQL: &str = r#"
-- Track harvest runs
CREATE TABLE IF NOT EXISTS runs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    started_at TEXT NOT NULL,
    finished_at TEXT,
    config_hash TEXT NOT NULL,
    status TEXT NOT NULL,
    rate_limit_waits INTEGER NOT NULL DEFAULT 0
);

-- Records written and dropped per type
CREATE TABLE IF NOT EXISTS record_counts (
    run_id INTEGER NOT NULL REFERENCES runs(id),
    record_type TEXT NOT NULL,
    emitted INTEGER NOT NULL DEFAULT 0,
    dropped INTEGER NOT NULL DEFAULT 0,
    PRIMARY KEY (run_id, record_type)
);

-- Partition files, in the order they were opened
CREATE TABLE IF NOT EXISTS partitions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    run_id INTEGER NOT NULL REFERENCES runs(id),
    record_type TEXT NOT NULL,
    path TEXT NOT NULL,
    rows INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_partitions_run ON partitions(run_id);

-- Fetches that failed after retries
CREATE TABLE IF NOT EXISTS fetch_failures (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    run_id INTEGER NOT NULL REFERENCES runs(id),
    tier TEXT NOT NULL,
    resource TEXT NOT NULL,
    kind TEXT NOT NULL,
    message TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_fetch_failures_run ON fetch_failures(run_id);
"#;

/// Initializes the database schema
///
/// # Arguments
///
/// * `conn` - The database connection
///
/// # Returns
///
/// * `Ok(())` - Schema initialized successfully
/// * `Err(rusqlite::Error)` - Failed to initialize schema
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}
