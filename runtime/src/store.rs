// Copyright 2026 Ratekeeper Contributors
// SPDX-License-Identifier: Apache-2.0

//! Retention-bounded rate history backed by SQLite.
//!
//! The store is the only shared mutable state in the service. All access
//! goes through one connection behind a mutex, and an insert runs together
//! with its eviction inside a single transaction, so a reader sees either
//! the state before the insert or the state after eviction, never anything
//! in between.

use crate::error::PersistenceError;
use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::debug;

/// Default number of records kept.
pub const DEFAULT_RETENTION: usize = 5;

/// A single captured rate. Immutable once written.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RateRecord {
    pub id: i64,
    pub rate: f64,
    pub source: String,
    pub captured_at: DateTime<Utc>,
}

/// Append-only rate log that keeps only the newest `retention` records.
pub struct RateStore {
    db: Mutex<Connection>,
    retention: usize,
}

impl RateStore {
    /// Open or create a store at `path`.
    pub fn open(path: &Path, retention: usize) -> Result<Self, PersistenceError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        Self::with_connection(conn, retention)
    }

    /// Open a private in-memory store.
    pub fn open_in_memory(retention: usize) -> Result<Self, PersistenceError> {
        Self::with_connection(Connection::open_in_memory()?, retention)
    }

    fn with_connection(conn: Connection, retention: usize) -> Result<Self, PersistenceError> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS rates (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                rate REAL NOT NULL,
                source TEXT NOT NULL,
                captured_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_rates_recency
                ON rates (captured_at DESC, id DESC);",
        )?;

        Ok(Self {
            db: Mutex::new(conn),
            retention: retention.max(1),
        })
    }

    /// Maximum number of records this store keeps.
    pub fn retention(&self) -> usize {
        self.retention
    }

    /// Append a record stamped with the current time, then evict everything
    /// beyond the retention window. Both happen in one transaction.
    pub fn insert(&self, rate: f64, source: &str) -> Result<RateRecord, PersistenceError> {
        self.insert_inner(rate, source, None)
    }

    #[cfg(test)]
    pub(crate) fn insert_at(
        &self,
        rate: f64,
        source: &str,
        captured_at: DateTime<Utc>,
    ) -> Result<RateRecord, PersistenceError> {
        self.insert_inner(rate, source, Some(captured_at))
    }

    fn insert_inner(
        &self,
        rate: f64,
        source: &str,
        captured_at: Option<DateTime<Utc>>,
    ) -> Result<RateRecord, PersistenceError> {
        if !rate.is_finite() || rate <= 0.0 {
            return Err(PersistenceError::InvalidRate(rate));
        }

        let mut db = self.lock();
        let tx = db.transaction()?;

        // Never stamp earlier than what is already stored, so the new record
        // is the newest even if the wall clock stepped back.
        let stamp = captured_at.unwrap_or_else(Utc::now).trunc_subsecs(6);
        let captured_at = match newest_timestamp(&tx)? {
            Some(newest) if newest > stamp => newest,
            _ => stamp,
        };

        tx.execute(
            "INSERT INTO rates (rate, source, captured_at) VALUES (?1, ?2, ?3)",
            params![rate, source, format_timestamp(&captured_at)],
        )?;
        let id = tx.last_insert_rowid();
        let evicted = evict(&tx, self.retention)?;
        tx.commit()?;

        debug!(id, rate, evicted, "rate record committed");
        Ok(RateRecord {
            id,
            rate,
            source: source.to_string(),
            captured_at,
        })
    }

    /// Delete all but the newest `retention` records. Returns rows removed.
    pub fn evict_oldest(&self) -> Result<usize, PersistenceError> {
        let db = self.lock();
        evict(&db, self.retention)
    }

    /// The most recently captured record, if any.
    pub fn latest(&self) -> Result<Option<RateRecord>, PersistenceError> {
        let db = self.lock();
        let row = db
            .query_row(
                "SELECT id, rate, source, captured_at FROM rates
                 ORDER BY captured_at DESC, id DESC LIMIT 1",
                [],
                raw_record,
            )
            .optional()?;

        row.map(into_record).transpose()
    }

    /// All retained records, newest first.
    pub fn recent(&self) -> Result<Vec<RateRecord>, PersistenceError> {
        let db = self.lock();
        let mut stmt = db.prepare(
            "SELECT id, rate, source, captured_at FROM rates
             ORDER BY captured_at DESC, id DESC",
        )?;
        let rows = stmt
            .query_map([], raw_record)?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter().map(into_record).collect()
    }

    /// Number of retained records.
    pub fn len(&self) -> Result<usize, PersistenceError> {
        let db = self.lock();
        let count: i64 = db.query_row("SELECT COUNT(*) FROM rates", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    pub fn is_empty(&self) -> Result<bool, PersistenceError> {
        Ok(self.len()? == 0)
    }

    /// Hold the connection lock for `duration`, calling `on_locked` once it
    /// is taken.
    #[cfg(test)]
    pub(crate) fn hold_lock(&self, duration: std::time::Duration, on_locked: impl FnOnce()) {
        let _db = self.lock();
        on_locked();
        std::thread::sleep(duration);
    }

    // A panic while the lock was held cannot leave a half-applied write
    // behind (the transaction rolls back on drop), so poisoning is ignored.
    fn lock(&self) -> MutexGuard<'_, Connection> {
        self.db.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn newest_timestamp(conn: &Connection) -> Result<Option<DateTime<Utc>>, PersistenceError> {
    let newest: Option<String> =
        conn.query_row("SELECT MAX(captured_at) FROM rates", [], |row| row.get(0))?;
    newest.map(|ts| parse_timestamp(&ts)).transpose()
}

fn evict(conn: &Connection, retention: usize) -> Result<usize, PersistenceError> {
    let removed = conn.execute(
        "DELETE FROM rates WHERE id NOT IN (
            SELECT id FROM rates ORDER BY captured_at DESC, id DESC LIMIT ?1
        )",
        params![retention as i64],
    )?;
    Ok(removed)
}

type RawRecord = (i64, f64, String, String);

fn raw_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawRecord> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
}

fn into_record((id, rate, source, captured_at): RawRecord) -> Result<RateRecord, PersistenceError> {
    let captured_at = parse_timestamp(&captured_at)?;

    Ok(RateRecord {
        id,
        rate,
        source,
        captured_at,
    })
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, PersistenceError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| PersistenceError::Timestamp(format!("{raw}: {e}")))
}

/// Fixed-width RFC 3339 so that text order equals time order.
fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use std::sync::Arc;

    fn rates(store: &RateStore) -> Vec<f64> {
        store.recent().unwrap().iter().map(|r| r.rate).collect()
    }

    #[test]
    fn test_latest_on_empty_store() {
        let store = RateStore::open_in_memory(DEFAULT_RETENTION).unwrap();
        assert!(store.latest().unwrap().is_none());
        assert!(store.is_empty().unwrap());
    }

    #[test]
    fn test_sixth_insert_evicts_oldest() {
        let store = RateStore::open_in_memory(5).unwrap();
        for rate in [10.0, 20.0, 30.0, 40.0, 50.0, 60.0] {
            store.insert(rate, "Rapira").unwrap();
        }

        assert_eq!(rates(&store), vec![60.0, 50.0, 40.0, 30.0, 20.0]);
        assert_eq!(store.latest().unwrap().unwrap().rate, 60.0);
    }

    #[test]
    fn test_retains_newest_n_after_many_inserts() {
        let store = RateStore::open_in_memory(3).unwrap();
        for k in 0..10 {
            store.insert(1.0 + k as f64, "Rapira").unwrap();
            assert_eq!(store.len().unwrap(), (k + 1).min(3));
        }
        assert_eq!(rates(&store), vec![10.0, 9.0, 8.0]);
    }

    #[test]
    fn test_ids_strictly_increase_and_are_not_reused() {
        let store = RateStore::open_in_memory(1).unwrap();
        let mut last = 0;
        for k in 0..5 {
            let id = store.insert(50.0 + k as f64, "Rapira").unwrap().id;
            assert!(id > last, "id {id} should exceed {last}");
            last = id;
        }
        assert_eq!(store.latest().unwrap().unwrap().id, last);
    }

    #[test]
    fn test_equal_timestamps_ordered_by_id() {
        let store = RateStore::open_in_memory(2).unwrap();
        let now = Utc::now();

        store.insert_at(1.0, "a", now).unwrap();
        store.insert_at(2.0, "b", now).unwrap();
        store.insert_at(3.0, "c", now).unwrap();
        assert_eq!(store.latest().unwrap().unwrap().rate, 3.0);
        assert_eq!(rates(&store), vec![3.0, 2.0]);
    }

    #[test]
    fn test_clock_stepping_back_keeps_newest_insert() {
        let store = RateStore::open_in_memory(1).unwrap();
        let now = Utc::now();

        let first = store.insert_at(10.0, "Rapira", now).unwrap();
        let second = store
            .insert_at(20.0, "Rapira", now - Duration::seconds(2))
            .unwrap();

        // Stamp is clamped to the newest stored capture.
        assert_eq!(second.captured_at, first.captured_at);
        let latest = store.latest().unwrap().unwrap();
        assert_eq!(latest, second);
        assert_eq!(rates(&store), vec![20.0]);

        let third = store
            .insert_at(30.0, "Rapira", now + Duration::seconds(5))
            .unwrap();
        assert!(third.captured_at > second.captured_at);
        assert_eq!(store.latest().unwrap().unwrap(), third);
    }

    #[test]
    fn test_invalid_rate_not_persisted() {
        let store = RateStore::open_in_memory(5).unwrap();
        for bad in [0.0, -3.0, f64::NAN, f64::INFINITY] {
            assert!(matches!(
                store.insert(bad, "Rapira"),
                Err(PersistenceError::InvalidRate(_))
            ));
        }
        assert!(store.is_empty().unwrap());
    }

    #[test]
    fn test_evict_oldest_after_reopen_with_smaller_window() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rates.db");

        {
            let store = RateStore::open(&path, 5).unwrap();
            for rate in [1.0, 2.0, 3.0, 4.0, 5.0] {
                store.insert(rate, "Rapira").unwrap();
            }
        }

        let store = RateStore::open(&path, 2).unwrap();
        assert_eq!(store.len().unwrap(), 5);
        assert_eq!(store.evict_oldest().unwrap(), 3);
        assert_eq!(rates(&store), vec![5.0, 4.0]);
    }

    #[test]
    fn test_record_fields_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("rates.db");
        let store = RateStore::open(&path, 5).unwrap();

        let before = Utc::now();
        let inserted = store.insert(92.5, "Rapira").unwrap();
        let record = store.latest().unwrap().unwrap();

        assert_eq!(record, inserted);
        assert_eq!(record.rate, 92.5);
        assert_eq!(record.source, "Rapira");
        assert!(record.captured_at >= before - Duration::milliseconds(1));
    }

    #[test]
    fn test_concurrent_writers_keep_window() {
        let store = Arc::new(RateStore::open_in_memory(5).unwrap());
        let handles: Vec<_> = (0..4)
            .map(|t| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    for i in 0..25 {
                        store.insert(1.0 + (t * 100 + i) as f64, "Rapira").unwrap();
                        assert!(store.len().unwrap() <= 5);
                        assert!(store.latest().unwrap().is_some());
                    }
                })
            })
            .collect();

        for h in handles {
            h.join().unwrap();
        }

        let recent = store.recent().unwrap();
        assert_eq!(recent.len(), 5);
        let max_id = recent.iter().map(|r| r.id).max().unwrap();
        assert_eq!(store.latest().unwrap().unwrap().id, max_id);
    }
}
