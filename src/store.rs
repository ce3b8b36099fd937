// File: store.rs
// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) 2023-2025
// - Volker Schwaberow <volker@schwaberow.de>

//! SQLite result table shared with the reporting layer.

use crate::error::Result;
use crate::probe::ProbeResult;
use crate::report::{DatasetSnapshot, DetectionMetrics, Snapshot, TargetSnapshot};
use log::{debug, warn};
use rusqlite::{params, Connection, OpenFlags, OptionalExtension};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const TABLE: &str = "waf_comparison";

/// How long a statement waits on a lock held by another connection.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const CREATE_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS waf_comparison (
    method TEXT,
    url TEXT,
    headers TEXT,
    data TEXT,
    machineName TEXT,
    destinationURL TEXT,
    wafName TEXT,
    dateTime TEXT,
    testName TEXT,
    dataSetType TEXT,
    responseStatusCode INTEGER,
    isBlocked INTEGER,
    responseBody TEXT
);
";

const INSERT_ROW: &str = r"
INSERT INTO waf_comparison (
    method, url, headers, data, machineName, destinationURL, wafName, dateTime,
    testName, dataSetType, responseStatusCode, isBlocked, responseBody
) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
";

const WRITER_PRAGMAS: &[(&str, &str)] = &[
    ("journal_mode", "WAL"),
    ("synchronous", "OFF"),
    ("temp_store", "MEMORY"),
];

/// Replaces NUL, which the storage encoding cannot carry.
pub fn safe_text(value: &str) -> String {
    value.replace('\0', "\u{FFFD}")
}

/// A [`ProbeResult`] converted to its persisted, text-only form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredRow {
    pub method: String,
    pub url: String,
    pub headers: String,
    pub data: String,
    pub machine_name: String,
    pub destination_url: String,
    pub waf_name: String,
    pub date_time: String,
    pub test_name: String,
    pub data_set_type: String,
    pub response_status_code: i64,
    pub is_blocked: i64,
    pub response_body: Option<String>,
}

impl From<&ProbeResult> for StoredRow {
    fn from(r: &ProbeResult) -> Self {
        Self {
            method: safe_text(&r.payload.method),
            url: safe_text(&r.payload.url),
            headers: safe_text(&r.payload.headers.to_json()),
            data: safe_text(&r.payload.body_text()),
            machine_name: safe_text(&r.machine_name),
            destination_url: safe_text(&r.destination_url),
            waf_name: safe_text(&r.target_name),
            date_time: safe_text(&r.date_time),
            test_name: safe_text(&r.test_name),
            data_set_type: safe_text(&r.dataset_label),
            response_status_code: i64::from(r.status),
            is_blocked: i64::from(r.blocked),
            response_body: (!r.body.is_empty()).then(|| safe_text(&r.body)),
        }
    }
}

pub struct ResultStore {
    conn: Connection,
    path: Option<PathBuf>,
}

impl ResultStore {
    /// Opens (creating if needed) the store at `path` and ensures the table exists.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        let store = Self {
            conn,
            path: Some(path.to_path_buf()),
        };
        store.conn.execute_batch(CREATE_TABLE)?;
        Ok(store)
    }

    /// Opens a store that must already exist. Used for snapshots and the
    /// summary command.
    pub fn open_existing(path: &Path) -> Result<Self> {
        let conn = Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_WRITE)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        Ok(Self {
            conn,
            path: Some(path.to_path_buf()),
        })
    }

    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(CREATE_TABLE)?;
        Ok(Self { conn, path: None })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Best-effort bulk-write tuning for the single writer connection.
    pub fn tune_for_writing(&self) {
        for (name, value) in WRITER_PRAGMAS {
            if let Err(e) = self.conn.pragma_update(None, name, value) {
                warn!("Could not set PRAGMA {}={}: {}", name, value, e);
            }
        }
    }

    /// Drops and recreates the result table for a fresh run.
    pub fn recreate(&self) -> Result<()> {
        self.conn
            .execute_batch(&format!("DROP TABLE IF EXISTS {};", TABLE))?;
        self.conn.execute_batch(CREATE_TABLE)?;
        debug!("Result table {} recreated", TABLE);
        Ok(())
    }

    pub fn table_exists(&self) -> Result<bool> {
        let found: Option<String> = self
            .conn
            .query_row(
                "SELECT name FROM sqlite_master WHERE type = 'table' AND name = ?1",
                [TABLE],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    /// Commits `rows` as one transaction. Nothing is written if any insert fails.
    pub fn insert_batch(&mut self, rows: &[StoredRow]) -> Result<usize> {
        if rows.is_empty() {
            return Ok(0);
        }
        let tx = self.conn.transaction()?;
        {
            let mut stmt = tx.prepare_cached(INSERT_ROW)?;
            for row in rows {
                stmt.execute(params![
                    row.method,
                    row.url,
                    row.headers,
                    row.data,
                    row.machine_name,
                    row.destination_url,
                    row.waf_name,
                    row.date_time,
                    row.test_name,
                    row.data_set_type,
                    row.response_status_code,
                    row.is_blocked,
                    row.response_body,
                ])?;
            }
        }
        tx.commit()?;
        Ok(rows.len())
    }

    pub fn count(&self) -> Result<u64> {
        let n: i64 = self
            .conn
            .query_row(&format!("SELECT COUNT(*) FROM {}", TABLE), [], |row| row.get(0))?;
        Ok(n as u64)
    }

    pub fn rows(&self) -> Result<Vec<StoredRow>> {
        let mut stmt = self.conn.prepare(
            "SELECT method, url, headers, data, machineName, destinationURL, wafName, dateTime, \
             testName, dataSetType, responseStatusCode, isBlocked, responseBody \
             FROM waf_comparison ORDER BY rowid",
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok(StoredRow {
                    method: row.get(0)?,
                    url: row.get(1)?,
                    headers: row.get(2)?,
                    data: row.get(3)?,
                    machine_name: row.get(4)?,
                    destination_url: row.get(5)?,
                    waf_name: row.get(6)?,
                    date_time: row.get(7)?,
                    test_name: row.get(8)?,
                    data_set_type: row.get(9)?,
                    response_status_code: row.get(10)?,
                    is_blocked: row.get(11)?,
                    response_body: row.get(12)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    pub fn snapshot(&self) -> Result<Snapshot> {
        let mut stmt = self.conn.prepare(
            "SELECT wafName,
                    SUM(CASE WHEN responseStatusCode != 0 THEN 1 ELSE 0 END),
                    COUNT(*),
                    SUM(CASE WHEN responseStatusCode = 403 THEN 1 ELSE 0 END),
                    SUM(CASE WHEN isBlocked = 1 THEN 1 ELSE 0 END)
             FROM waf_comparison
             GROUP BY wafName
             ORDER BY wafName",
        )?;
        let targets = stmt
            .query_map([], |row| {
                Ok(TargetSnapshot {
                    waf_name: row.get(0)?,
                    non_zero: row.get::<_, i64>(1)? as u64,
                    total: row.get::<_, i64>(2)? as u64,
                    blocks_403: row.get::<_, i64>(3)? as u64,
                    detected_blocks: row.get::<_, i64>(4)? as u64,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut stmt = self.conn.prepare(
            "SELECT wafName, dataSetType,
                    SUM(CASE WHEN responseStatusCode != 0 THEN 1 ELSE 0 END),
                    SUM(CASE WHEN isBlocked = 1 THEN 1 ELSE 0 END)
             FROM waf_comparison
             GROUP BY wafName, dataSetType
             ORDER BY wafName, dataSetType",
        )?;
        let datasets = stmt
            .query_map([], |row| {
                Ok(DatasetSnapshot {
                    waf_name: row.get(0)?,
                    data_set_type: row.get(1)?,
                    non_zero: row.get::<_, i64>(2)? as u64,
                    detected_blocks: row.get::<_, i64>(3)? as u64,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(Snapshot { targets, datasets })
    }

    /// Detection-quality rates per target, best balanced accuracy first.
    pub fn detection_metrics(&self) -> Result<Vec<DetectionMetrics>> {
        let mut stmt = self.conn.prepare(
            "WITH tnr AS (
                SELECT wafName,
                       SUM(CASE WHEN isBlocked = 0 THEN 1.0 ELSE 0.0 END) / COUNT(*) * 100 AS rate
                FROM waf_comparison
                WHERE responseStatusCode != 0 AND LOWER(dataSetType) != 'malicious'
                GROUP BY wafName
             ),
             tpr AS (
                SELECT wafName,
                       SUM(CASE WHEN isBlocked = 1 THEN 1.0 ELSE 0.0 END) / COUNT(*) * 100 AS rate
                FROM waf_comparison
                WHERE responseStatusCode != 0 AND LOWER(dataSetType) = 'malicious'
                GROUP BY wafName
             ),
             names AS (
                SELECT wafName FROM tnr UNION SELECT wafName FROM tpr
             )
             SELECT n.wafName,
                    COALESCE(tpr.rate, 0.0),
                    COALESCE(tnr.rate, 0.0)
             FROM names n
             LEFT JOIN tnr ON n.wafName = tnr.wafName
             LEFT JOIN tpr ON n.wafName = tpr.wafName",
        )?;
        let mut metrics = stmt
            .query_map([], |row| {
                let waf_name: String = row.get(0)?;
                let tpr: f64 = row.get(1)?;
                let tnr: f64 = row.get(2)?;
                Ok(DetectionMetrics {
                    waf_name,
                    false_positive_rate: round3(100.0 - tnr),
                    false_negative_rate: round3(100.0 - tpr),
                    true_positive_rate: round3(tpr),
                    true_negative_rate: round3(tnr),
                    balanced_accuracy: round3((tpr + tnr) / 2.0),
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        metrics.sort_by(|a, b| {
            b.balanced_accuracy
                .total_cmp(&a.balanced_accuracy)
                .then_with(|| a.waf_name.cmp(&b.waf_name))
        });
        Ok(metrics)
    }
}

fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(waf: &str, dataset: &str, status: i64, blocked: i64) -> StoredRow {
        StoredRow {
            method: "GET".to_string(),
            url: "/".to_string(),
            headers: "{}".to_string(),
            data: String::new(),
            machine_name: "host".to_string(),
            destination_url: format!("http://{}", waf),
            waf_name: waf.to_string(),
            date_time: "2025-01-01T00:00:00".to_string(),
            test_name: "t".to_string(),
            data_set_type: dataset.to_string(),
            response_status_code: status,
            is_blocked: blocked,
            response_body: None,
        }
    }

    #[test]
    fn safe_text_replaces_nul() {
        assert_eq!(safe_text("a\0b"), "a\u{FFFD}b");
        assert!(!safe_text("\0\0").contains('\0'));
    }

    #[test]
    fn batch_insert_and_recreate() {
        let mut store = ResultStore::in_memory().unwrap();
        assert!(store.table_exists().unwrap());
        let inserted = store
            .insert_batch(&[row("a", "Legitimate", 200, 0), row("a", "Malicious", 403, 1)])
            .unwrap();
        assert_eq!(inserted, 2);
        assert_eq!(store.count().unwrap(), 2);

        store.recreate().unwrap();
        assert_eq!(store.count().unwrap(), 0);
    }

    #[test]
    fn open_existing_requires_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("nested").join("results.db");
        assert!(ResultStore::open_existing(&db).is_err());

        ResultStore::open(&db).unwrap();
        let store = ResultStore::open_existing(&db).unwrap();
        assert!(store.table_exists().unwrap());
        assert_eq!(store.path(), Some(db.as_path()));
    }

    #[test]
    fn empty_batch_is_a_noop() {
        let mut store = ResultStore::in_memory().unwrap();
        assert_eq!(store.insert_batch(&[]).unwrap(), 0);
    }

    #[test]
    fn snapshot_groups_by_target_and_dataset() {
        let mut store = ResultStore::in_memory().unwrap();
        store
            .insert_batch(&[
                row("a", "Legitimate", 200, 0),
                row("a", "Legitimate", 0, 0),
                row("a", "Malicious", 403, 1),
                row("b", "Malicious", 200, 1),
            ])
            .unwrap();

        let snapshot = store.snapshot().unwrap();
        assert_eq!(snapshot.targets.len(), 2);
        let a = &snapshot.targets[0];
        assert_eq!((a.non_zero, a.total, a.blocks_403, a.detected_blocks), (2, 3, 1, 1));
        assert_eq!(snapshot.datasets.len(), 3);
        assert_eq!(snapshot.datasets[0].data_set_type, "Legitimate");
        assert_eq!(snapshot.datasets[0].non_zero, 1);
    }

    #[test]
    fn metrics_exclude_transport_failures() {
        let mut store = ResultStore::in_memory().unwrap();
        store
            .insert_batch(&[
                row("a", "Legitimate", 200, 0),
                row("a", "Legitimate", 403, 1),
                row("a", "Legitimate", 0, 0),
                row("a", "Malicious", 403, 1),
                row("a", "Malicious", 0, 0),
                row("b", "Malicious", 200, 0),
            ])
            .unwrap();

        let metrics = store.detection_metrics().unwrap();
        assert_eq!(metrics[0].waf_name, "a");
        assert_eq!(metrics[0].true_negative_rate, 50.0);
        assert_eq!(metrics[0].true_positive_rate, 100.0);
        assert_eq!(metrics[0].false_positive_rate, 50.0);
        assert_eq!(metrics[0].balanced_accuracy, 75.0);

        assert_eq!(metrics[1].waf_name, "b");
        assert_eq!(metrics[1].true_positive_rate, 0.0);
        assert_eq!(metrics[1].balanced_accuracy, 0.0);
    }

    #[test]
    fn metrics_follow_dispatch_classification_of_directory_names() {
        let mut store = ResultStore::in_memory().unwrap();
        store
            .insert_batch(&[
                row("a", "malicious", 403, 1),
                row("a", "MALICIOUS", 200, 0),
                row("a", "benign", 200, 0),
                row("a", "Legitimate", 200, 1),
            ])
            .unwrap();

        let metrics = store.detection_metrics().unwrap();
        assert_eq!(metrics.len(), 1);
        assert_eq!(metrics[0].true_positive_rate, 50.0);
        assert_eq!(metrics[0].true_negative_rate, 50.0);
        assert_eq!(metrics[0].balanced_accuracy, 50.0);
    }
}
