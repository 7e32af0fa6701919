use std::{
    path::Path,
    sync::{Arc, Mutex},
    time::Duration,
};

use anyhow::{Context, Result};
use rusqlite::{Connection, params};

use crate::models::{AggregateStats, CompletedRow, QueueRow, UploadRow};

/// The upload agent's state database.
///
/// The agent owns these tables and writes to them while we read; the busy
/// timeout keeps a history sweep from failing on a transient writer lock.
/// Tables are created only when absent so a fresh install renders empty
/// views instead of erroring.
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path_ref = path.as_ref();
        let conn = Connection::open(path_ref)
            .with_context(|| format!("open sqlite db: {}", path_ref.display()))?;
        conn.busy_timeout(Duration::from_secs(5))?;
        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.ensure_schema()?;
        Ok(db)
    }

    fn ensure_schema(&self) -> Result<()> {
        let conn = self.conn.lock().expect("db mutex poisoned");
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS uploads (
              drive TEXT NOT NULL,
              filedir TEXT NOT NULL,
              filebase TEXT NOT NULL,
              filesize TEXT NOT NULL DEFAULT '',
              gdsa TEXT,
              logfile TEXT
            );

            CREATE TABLE IF NOT EXISTS completed_uploads (
              drive TEXT NOT NULL,
              filedir TEXT NOT NULL,
              filebase TEXT NOT NULL,
              filesize TEXT NOT NULL DEFAULT '',
              filesize_bytes INTEGER NOT NULL DEFAULT 0,
              gdsa TEXT,
              starttime INTEGER NOT NULL,
              endtime INTEGER NOT NULL,
              status INTEGER NOT NULL DEFAULT 1
            );

            CREATE TABLE IF NOT EXISTS upload_queue (
              time INTEGER NOT NULL,
              drive TEXT NOT NULL,
              filedir TEXT NOT NULL,
              filebase TEXT NOT NULL,
              filesize TEXT NOT NULL DEFAULT '',
              metadata TEXT
            );

            CREATE INDEX IF NOT EXISTS idx_completed_endtime ON completed_uploads(endtime);
            "#,
        )?;
        Ok(())
    }

    pub fn list_inprogress(&self) -> Result<Vec<UploadRow>> {
        let conn = self.conn.lock().expect("db mutex poisoned");
        let mut stmt = conn
            .prepare("SELECT drive, filedir, filebase, filesize, gdsa, logfile FROM uploads")?;
        let rows = stmt
            .query_map([], |row| {
                Ok(UploadRow {
                    drive: row.get(0)?,
                    filedir: row.get(1)?,
                    filebase: row.get(2)?,
                    filesize: row.get(3)?,
                    gdsa: row.get(4)?,
                    logfile: row.get(5)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    pub fn count_completed(&self) -> Result<i64> {
        let conn = self.conn.lock().expect("db mutex poisoned");
        let count = conn.query_row("SELECT count(*) FROM completed_uploads", [], |r| r.get(0))?;
        Ok(count)
    }

    /// Completed uploads newest-first, optionally a single page.
    pub fn list_completed(&self, page: Option<(i64, i64)>) -> Result<Vec<CompletedRow>> {
        let conn = self.conn.lock().expect("db mutex poisoned");
        let base = "SELECT drive, filedir, filebase, filesize, gdsa, starttime, endtime, status
             FROM completed_uploads ORDER BY endtime DESC";
        let rows = if let Some((limit, offset)) = page {
            let mut stmt = conn.prepare(&format!("{base} LIMIT ?1 OFFSET ?2"))?;
            let rows = stmt
                .query_map(params![limit, offset], row_to_completed)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            rows
        } else {
            let mut stmt = conn.prepare(base)?;
            let rows = stmt
                .query_map([], row_to_completed)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            rows
        };
        Ok(rows)
    }

    /// Count and byte total of uploads that finished at or after `since_ts`.
    pub fn completed_stats_since(&self, since_ts: i64) -> Result<AggregateStats> {
        let conn = self.conn.lock().expect("db mutex poisoned");
        let (count, total_size) = conn.query_row(
            "SELECT COUNT(*), COALESCE(SUM(filesize_bytes), 0)
             FROM completed_uploads WHERE endtime >= ?1",
            params![since_ts],
            |r| Ok((r.get(0)?, r.get(1)?)),
        )?;
        Ok(AggregateStats { count, total_size })
    }

    pub fn list_queue(&self) -> Result<Vec<QueueRow>> {
        let conn = self.conn.lock().expect("db mutex poisoned");
        let mut stmt = conn.prepare(
            "SELECT time, drive, filedir, filebase, filesize, metadata
             FROM upload_queue ORDER BY time ASC",
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok(QueueRow {
                    time: row.get(0)?,
                    drive: row.get(1)?,
                    filedir: row.get(2)?,
                    filebase: row.get(3)?,
                    filesize: row.get(4)?,
                    metadata: row.get(5)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    pub fn count_queue(&self) -> Result<i64> {
        let conn = self.conn.lock().expect("db mutex poisoned");
        let count = conn.query_row("SELECT COUNT(*) FROM upload_queue", [], |r| r.get(0))?;
        Ok(count)
    }

    /// The queue stores display strings, not bytes; callers parse them.
    pub fn queue_filesizes(&self) -> Result<Vec<String>> {
        let conn = self.conn.lock().expect("db mutex poisoned");
        let mut stmt = conn.prepare("SELECT filesize FROM upload_queue")?;
        let sizes = stmt
            .query_map([], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(sizes)
    }

    /// Drop upload history; `failed_only` keeps successful rows (status 1).
    pub fn clean_history(&self, failed_only: bool) -> Result<usize> {
        let conn = self.conn.lock().expect("db mutex poisoned");
        let deleted = if failed_only {
            conn.execute("DELETE FROM completed_uploads WHERE status = 0", [])?
        } else {
            conn.execute("DELETE FROM completed_uploads", [])?
        };
        Ok(deleted)
    }
}

fn row_to_completed(row: &rusqlite::Row<'_>) -> rusqlite::Result<CompletedRow> {
    Ok(CompletedRow {
        drive: row.get(0)?,
        filedir: row.get(1)?,
        filebase: row.get(2)?,
        filesize: row.get(3)?,
        gdsa: row.get(4)?,
        starttime: row.get(5)?,
        endtime: row.get(6)?,
        status: row.get(7)?,
    })
}

#[cfg(test)]
pub(crate) mod testutil {
    use std::path::{Path, PathBuf};

    use rusqlite::{Connection, params};
    use uuid::Uuid;

    pub fn temp_db_path() -> PathBuf {
        std::env::temp_dir().join(format!("uploader-db-{}.sqlite", Uuid::new_v4()))
    }

    /// Seed rows the way the agent would, over a second connection.
    pub fn insert_upload(path: &Path, filebase: &str, filesize: &str, logfile: Option<&str>) {
        let conn = Connection::open(path).expect("open seed connection");
        conn.execute(
            "INSERT INTO uploads (drive, filedir, filebase, filesize, gdsa, logfile)
             VALUES ('gdrive', '/mnt/local/Movies', ?1, ?2, 'GDSA1', ?3)",
            params![filebase, filesize, logfile],
        )
        .expect("insert upload row");
    }

    pub fn insert_completed(
        path: &Path,
        filebase: &str,
        filesize_bytes: i64,
        starttime: i64,
        endtime: i64,
        status: i64,
    ) {
        let conn = Connection::open(path).expect("open seed connection");
        conn.execute(
            "INSERT INTO completed_uploads
               (drive, filedir, filebase, filesize, filesize_bytes, gdsa, starttime, endtime, status)
             VALUES ('gdrive', '/mnt/local/Movies', ?1, '1.00 GiB', ?2, 'GDSA1', ?3, ?4, ?5)",
            params![filebase, filesize_bytes, starttime, endtime, status],
        )
        .expect("insert completed row");
    }

    pub fn insert_queued(path: &Path, filebase: &str, filesize: &str, time: i64) {
        let conn = Connection::open(path).expect("open seed connection");
        conn.execute(
            "INSERT INTO upload_queue (time, drive, filedir, filebase, filesize, metadata)
             VALUES (?1, 'gdrive', '/mnt/local/Movies', ?2, ?3, NULL)",
            params![time, filebase, filesize],
        )
        .expect("insert queue row");
    }
}

#[cfg(test)]
mod tests {
    use super::testutil::*;
    use super::*;

    #[test]
    fn fresh_database_serves_empty_views() {
        let path = temp_db_path();
        let db = Database::open(&path).expect("open db");
        assert!(db.list_inprogress().expect("inprogress").is_empty());
        assert_eq!(db.count_completed().expect("count"), 0);
        assert!(db.list_queue().expect("queue").is_empty());
        let stats = db.completed_stats_since(0).expect("stats");
        assert_eq!(stats.count, 0);
        assert_eq!(stats.total_size, 0);
        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn completed_rows_are_newest_first_and_pageable() {
        let path = temp_db_path();
        let db = Database::open(&path).expect("open db");
        for i in 0..4 {
            insert_completed(&path, &format!("file-{i}.mkv"), 100, 1_000 + i, 2_000 + i, 1);
        }

        let all = db.list_completed(None).expect("list all");
        assert_eq!(all.len(), 4);
        assert_eq!(all[0].filebase, "file-3.mkv");
        assert_eq!(all[3].filebase, "file-0.mkv");

        let page = db.list_completed(Some((2, 2))).expect("page");
        assert_eq!(page.len(), 2);
        assert_eq!(page[0].filebase, "file-1.mkv");
        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn completed_stats_respect_cutoff() {
        let path = temp_db_path();
        let db = Database::open(&path).expect("open db");
        insert_completed(&path, "old.mkv", 500, 10, 50, 1);
        insert_completed(&path, "new-1.mkv", 1_000, 110, 150, 1);
        insert_completed(&path, "new-2.mkv", 2_000, 120, 160, 0);

        let stats = db.completed_stats_since(100).expect("stats");
        assert_eq!(stats.count, 2);
        assert_eq!(stats.total_size, 3_000);
        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn queue_rows_are_oldest_first() {
        let path = temp_db_path();
        let db = Database::open(&path).expect("open db");
        insert_queued(&path, "b.mkv", "2.00 GiB", 200);
        insert_queued(&path, "a.mkv", "1.00 GiB", 100);

        let rows = db.list_queue().expect("queue");
        assert_eq!(rows[0].filebase, "a.mkv");
        assert_eq!(rows[1].filebase, "b.mkv");
        assert_eq!(db.count_queue().expect("count"), 2);
        assert_eq!(db.queue_filesizes().expect("sizes").len(), 2);
        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn clean_history_all_and_failed_only() {
        let path = temp_db_path();
        let db = Database::open(&path).expect("open db");
        insert_completed(&path, "ok.mkv", 100, 1, 2, 1);
        insert_completed(&path, "bad.mkv", 100, 3, 4, 0);

        assert_eq!(db.clean_history(true).expect("failed only"), 1);
        assert_eq!(db.count_completed().expect("count"), 1);
        assert_eq!(db.clean_history(false).expect("all"), 1);
        assert_eq!(db.count_completed().expect("count"), 0);
        let _ = std::fs::remove_file(path);
    }
}
