//! SQLite storage implementation
//!
//! This module provides a SQLite-based implementation of the Storage trait.

use crate::registry::{DiscoveredBy, RelayRecord};
use crate::state::CrawlState;
use crate::storage::schema::initialize_schema;
use crate::storage::traits::{Storage, StorageError, StorageResult};
use crate::storage::{RunRecord, RunStatus};
use crate::url::{Category, RelayUrl};
use crate::AtlasError;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::collections::BTreeMap;
use std::path::Path;

const RELAY_COLUMNS: &str = "url, discovery_count, discovered_by, category, crawl_state, depth, \
                             attempts, first_seen_at, updated_at";

/// SQLite storage backend
pub struct SqliteStorage {
    conn: Connection,
}

impl SqliteStorage {
    /// Creates a new SqliteStorage instance
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    ///
    /// # Returns
    ///
    /// * `Ok(SqliteStorage)` - Successfully opened/created database
    /// * `Err(AtlasError)` - Failed to open database
    pub fn new(path: &Path) -> Result<Self, AtlasError> {
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA temp_store = MEMORY;
        ",
        )?;

        initialize_schema(&conn)?;

        Ok(Self { conn })
    }

    /// Creates an in-memory database (for testing)
    #[cfg(test)]
    pub fn new_in_memory() -> Result<Self, AtlasError> {
        let conn = Connection::open_in_memory()?;
        initialize_schema(&conn)?;
        Ok(Self { conn })
    }

    #[cfg(test)]
    pub(crate) fn run_by_id(&self, run_id: i64) -> StorageResult<Option<RunRecord>> {
        let run = self
            .conn
            .query_row(
                "SELECT id, started_at, finished_at, config_hash, status FROM runs WHERE id = ?1",
                params![run_id],
                run_from_row,
            )
            .optional()?;
        Ok(run)
    }
}

/// A relays row as stored, before its enums are parsed
struct RelayRow {
    url: String,
    discovery_count: i64,
    discovered_by: String,
    category: String,
    crawl_state: String,
    depth: u32,
    attempts: u32,
    first_seen_at: String,
    updated_at: String,
}

impl RelayRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            url: row.get(0)?,
            discovery_count: row.get(1)?,
            discovered_by: row.get(2)?,
            category: row.get(3)?,
            crawl_state: row.get(4)?,
            depth: row.get(5)?,
            attempts: row.get(6)?,
            first_seen_at: row.get(7)?,
            updated_at: row.get(8)?,
        })
    }

    fn into_record(self) -> StorageResult<RelayRecord> {
        let corrupt = |reason: String| StorageError::CorruptRow {
            url: self.url.clone(),
            reason,
        };

        let category = Category::from_db_string(&self.category)
            .ok_or_else(|| corrupt(format!("unknown category '{}'", self.category)))?;
        let state = CrawlState::from_db_string(&self.crawl_state)
            .ok_or_else(|| corrupt(format!("unknown crawl state '{}'", self.crawl_state)))?;
        let first_seen_at = parse_timestamp(&self.first_seen_at).map_err(&corrupt)?;
        let updated_at = parse_timestamp(&self.updated_at).map_err(&corrupt)?;

        Ok(RelayRecord {
            url: RelayUrl::new(&self.url),
            discovery_count: self.discovery_count.max(1) as u64,
            discovered_by: DiscoveredBy::from_db_string(&self.discovered_by),
            category,
            state,
            depth: self.depth,
            attempts: self.attempts,
            first_seen_at,
            updated_at,
        })
    }
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(value)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| format!("bad timestamp '{}': {}", value, e))
}

fn run_from_row(row: &Row<'_>) -> rusqlite::Result<RunRecord> {
    Ok(RunRecord {
        id: row.get(0)?,
        started_at: row.get(1)?,
        finished_at: row.get(2)?,
        config_hash: row.get(3)?,
        status: RunStatus::from_db_string(&row.get::<_, String>(4)?)
            .unwrap_or(RunStatus::Interrupted),
    })
}

impl Storage for SqliteStorage {
    // ===== Run Management =====

    fn create_run(&mut self, config_hash: &str) -> StorageResult<i64> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO runs (started_at, config_hash, status) VALUES (?1, ?2, ?3)",
            params![now, config_hash, RunStatus::Running.to_db_string()],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn get_latest_run(&self) -> StorageResult<Option<RunRecord>> {
        let run = self
            .conn
            .query_row(
                "SELECT id, started_at, finished_at, config_hash, status
                 FROM runs ORDER BY id DESC LIMIT 1",
                [],
                run_from_row,
            )
            .optional()?;

        Ok(run)
    }

    fn update_run_status(&mut self, run_id: i64, status: RunStatus) -> StorageResult<()> {
        let updated = self.conn.execute(
            "UPDATE runs SET status = ?1 WHERE id = ?2",
            params![status.to_db_string(), run_id],
        )?;
        if updated == 0 {
            return Err(StorageError::RunNotFound(run_id));
        }
        Ok(())
    }

    fn finish_run(&mut self, run_id: i64, status: RunStatus) -> StorageResult<()> {
        let now = Utc::now().to_rfc3339();
        let updated = self.conn.execute(
            "UPDATE runs SET status = ?1, finished_at = ?2 WHERE id = ?3",
            params![status.to_db_string(), now, run_id],
        )?;
        if updated == 0 {
            return Err(StorageError::RunNotFound(run_id));
        }
        Ok(())
    }

    // ===== Relay Snapshot =====

    fn save_relays(&mut self, records: &[RelayRecord]) -> StorageResult<usize> {
        let tx = self.conn.transaction()?;
        {
            let mut stmt = tx.prepare_cached(
                "INSERT INTO relays (url, discovery_count, discovered_by, category, crawl_state,
                                     depth, attempts, first_seen_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                 ON CONFLICT(url) DO UPDATE SET
                     discovery_count = excluded.discovery_count,
                     discovered_by = excluded.discovered_by,
                     category = excluded.category,
                     crawl_state = excluded.crawl_state,
                     depth = excluded.depth,
                     attempts = excluded.attempts,
                     updated_at = excluded.updated_at",
            )?;

            for record in records {
                stmt.execute(params![
                    record.url.as_str(),
                    record.discovery_count as i64,
                    record.discovered_by.to_db_string(),
                    record.category.to_db_string(),
                    record.state.to_db_string(),
                    record.depth,
                    record.attempts,
                    record.first_seen_at.to_rfc3339(),
                    record.updated_at.to_rfc3339(),
                ])?;
            }
        }
        tx.commit()?;

        Ok(records.len())
    }

    fn load_relays(&self) -> StorageResult<Vec<RelayRecord>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM relays ORDER BY url",
            RELAY_COLUMNS
        ))?;

        let rows = stmt
            .query_map([], RelayRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter().map(RelayRow::into_record).collect()
    }

    fn clear_relays(&mut self) -> StorageResult<()> {
        self.conn.execute("DELETE FROM relays", [])?;
        Ok(())
    }

    // ===== Statistics =====

    fn count_relays(&self) -> StorageResult<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM relays", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    fn count_by_category(&self) -> StorageResult<BTreeMap<Category, u64>> {
        let mut stmt = self
            .conn
            .prepare("SELECT category, COUNT(*) FROM relays GROUP BY category")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?;

        let mut counts = BTreeMap::new();
        for row in rows {
            let (category, count) = row?;
            if let Some(category) = Category::from_db_string(&category) {
                counts.insert(category, count as u64);
            }
        }
        Ok(counts)
    }

    fn count_by_state(&self) -> StorageResult<BTreeMap<CrawlState, u64>> {
        let mut stmt = self
            .conn
            .prepare("SELECT crawl_state, COUNT(*) FROM relays GROUP BY crawl_state")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?;

        let mut counts = BTreeMap::new();
        for row in rows {
            let (state, count) = row?;
            if let Some(state) = CrawlState::from_db_string(&state) {
                counts.insert(state, count as u64);
            }
        }
        Ok(counts)
    }
}
