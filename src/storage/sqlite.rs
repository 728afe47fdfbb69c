//! SQLite run ledger
//!
//! This module provides a SQLite-based implementation of the RunLedger trait.

use crate::output::stats::{FetchFailure, RunStatistics};
use crate::output::PartitionInfo;
use crate::records::RecordType;
use crate::storage::schema::initialize_schema;
use crate::storage::traits::{RecordCounts, RunLedger, StorageError, StorageResult};
use crate::storage::{RunRecord, RunStatus};
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::warn;

const RUN_COLUMNS: &str = "id, started_at, finished_at, config_hash, status, rate_limit_waits";

/// SQLite ledger backend
pub struct SqliteLedger {
    conn: Connection,
}

impl SqliteLedger {
    /// Creates a new SqliteLedger instance
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    ///
    /// # Returns
    ///
    /// * `Ok(SqliteLedger)` - Successfully opened/created database
    /// * `Err(StorageError)` - Failed to open database
    pub fn new(path: &Path) -> StorageResult<Self> {
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
        ",
        )?;

        initialize_schema(&conn)?;

        Ok(Self { conn })
    }

    /// Creates an in-memory ledger, for dry runs and tests
    pub fn new_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        initialize_schema(&conn)?;
        Ok(Self { conn })
    }

    fn ensure_run(&self, run_id: i64) -> StorageResult<()> {
        let exists: Option<i64> = self
            .conn
            .query_row("SELECT id FROM runs WHERE id = ?1", params![run_id], |row| {
                row.get(0)
            })
            .optional()?;

        match exists {
            Some(_) => Ok(()),
            None => Err(StorageError::RunNotFound(run_id)),
        }
    }
}

fn run_from_row(row: &Row<'_>) -> rusqlite::Result<RunRecord> {
    let status: String = row.get(4)?;
    Ok(RunRecord {
        id: row.get(0)?,
        started_at: row.get(1)?,
        finished_at: row.get(2)?,
        config_hash: row.get(3)?,
        status: RunStatus::from_db_string(&status).unwrap_or(RunStatus::Running),
        rate_limit_waits: row.get::<_, i64>(5)?.max(0) as u64,
    })
}

fn record_type_from_db(value: String) -> Option<RecordType> {
    let parsed = RecordType::from_db_string(&value);
    if parsed.is_none() {
        warn!("Ignoring unknown record type in ledger: {}", value);
    }
    parsed
}

impl RunLedger for SqliteLedger {
    // ===== Run Management =====

    fn create_run(&mut self, config_hash: &str) -> StorageResult<i64> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO runs (started_at, config_hash, status) VALUES (?1, ?2, ?3)",
            params![now, config_hash, RunStatus::Running.to_db_string()],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn get_run(&self, run_id: i64) -> StorageResult<RunRecord> {
        let sql = format!("SELECT {} FROM runs WHERE id = ?1", RUN_COLUMNS);
        self.conn
            .query_row(&sql, params![run_id], run_from_row)
            .optional()?
            .ok_or(StorageError::RunNotFound(run_id))
    }

    fn get_latest_run(&self) -> StorageResult<Option<RunRecord>> {
        let sql = format!("SELECT {} FROM runs ORDER BY id DESC LIMIT 1", RUN_COLUMNS);
        let run = self.conn.query_row(&sql, [], run_from_row).optional()?;
        Ok(run)
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

    // ===== Run Results =====

    fn record_statistics(&mut self, run_id: i64, stats: &RunStatistics) -> StorageResult<()> {
        self.ensure_run(run_id)?;
        let tx = self.conn.transaction()?;

        tx.execute(
            "UPDATE runs SET rate_limit_waits = ?1 WHERE id = ?2",
            params![stats.rate_limit_waits as i64, run_id],
        )?;

        for record_type in RecordType::ALL {
            let emitted = stats.emitted.get(&record_type).copied().unwrap_or(0);
            let dropped = stats.dropped.get(&record_type).copied().unwrap_or(0);
            if emitted == 0 && dropped == 0 {
                continue;
            }
            tx.execute(
                "INSERT INTO record_counts (run_id, record_type, emitted, dropped)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(run_id, record_type)
                 DO UPDATE SET emitted = excluded.emitted, dropped = excluded.dropped",
                params![run_id, record_type.as_str(), emitted as i64, dropped as i64],
            )?;
        }

        tx.execute(
            "DELETE FROM fetch_failures WHERE run_id = ?1",
            params![run_id],
        )?;
        for failure in &stats.failures {
            tx.execute(
                "INSERT INTO fetch_failures (run_id, tier, resource, kind, message)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    run_id,
                    failure.tier,
                    failure.resource,
                    failure.kind,
                    failure.message
                ],
            )?;
        }

        tx.commit()?;
        Ok(())
    }

    fn record_partitions(
        &mut self,
        run_id: i64,
        partitions: &[PartitionInfo],
    ) -> StorageResult<()> {
        self.ensure_run(run_id)?;
        let tx = self.conn.transaction()?;

        tx.execute("DELETE FROM partitions WHERE run_id = ?1", params![run_id])?;
        for partition in partitions {
            tx.execute(
                "INSERT INTO partitions (run_id, record_type, path, rows) VALUES (?1, ?2, ?3, ?4)",
                params![
                    run_id,
                    partition.record_type.as_str(),
                    partition.path.to_string_lossy(),
                    partition.rows as i64
                ],
            )?;
        }

        tx.commit()?;
        Ok(())
    }

    fn get_record_counts(&self, run_id: i64) -> StorageResult<RecordCounts> {
        let mut stmt = self.conn.prepare(
            "SELECT record_type, emitted, dropped FROM record_counts WHERE run_id = ?1",
        )?;

        let rows = stmt.query_map(params![run_id], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, i64>(2)?,
            ))
        })?;

        let mut emitted = BTreeMap::new();
        let mut dropped = BTreeMap::new();
        for row in rows {
            let (record_type, written, skipped) = row?;
            let Some(record_type) = record_type_from_db(record_type) else {
                continue;
            };
            if written > 0 {
                emitted.insert(record_type, written as u64);
            }
            if skipped > 0 {
                dropped.insert(record_type, skipped as u64);
            }
        }

        Ok((emitted, dropped))
    }

    fn get_fetch_failures(&self, run_id: i64) -> StorageResult<Vec<FetchFailure>> {
        let mut stmt = self.conn.prepare(
            "SELECT tier, resource, kind, message FROM fetch_failures
             WHERE run_id = ?1 ORDER BY id",
        )?;

        let failures = stmt
            .query_map(params![run_id], |row| {
                Ok(FetchFailure {
                    tier: row.get(0)?,
                    resource: row.get(1)?,
                    kind: row.get(2)?,
                    message: row.get(3)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(failures)
    }

    fn get_partitions(&self, run_id: i64) -> StorageResult<Vec<PartitionInfo>> {
        let mut stmt = self.conn.prepare(
            "SELECT record_type, path, rows FROM partitions WHERE run_id = ?1 ORDER BY id",
        )?;

        let rows = stmt
            .query_map(params![run_id], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, i64>(2)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(rows
            .into_iter()
            .filter_map(|(record_type, path, count)| {
                record_type_from_db(record_type).map(|record_type| PartitionInfo {
                    record_type,
                    path: PathBuf::from(path),
                    rows: count.max(0) as u64,
                })
            })
            .collect())
    }
}
