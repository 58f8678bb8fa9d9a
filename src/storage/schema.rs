//! Database schema definitions
//!
//! This module contains all SQL schema definitions for the Relay-Atlas checkpoint.

/// SQL schema for the database
pub const SCHEMA_SQL: &str = r#"
-- Track crawl runs
CREATE TABLE IF NOT EXISTS runs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    started_at TEXT NOT NULL,
    finished_at TEXT,
    config_hash TEXT NOT NULL,
    status TEXT NOT NULL
);

-- One row per discovered relay
CREATE TABLE IF NOT EXISTS relays (
    url TEXT PRIMARY KEY,
    discovery_count INTEGER NOT NULL DEFAULT 1,
    discovered_by TEXT NOT NULL,
    category TEXT NOT NULL,
    crawl_state TEXT NOT NULL,
    depth INTEGER NOT NULL DEFAULT 0,
    attempts INTEGER NOT NULL DEFAULT 0,
    first_seen_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_relays_category ON relays(category);
CREATE INDEX IF NOT EXISTS idx_relays_state ON relays(crawl_state);
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
