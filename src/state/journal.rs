use chrono::{TimeZone, Utc};
use rusqlite::{params, Connection};
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::data::{CopyVerdict, DrainResult, ImageIndex};
use crate::error::{IoContext, Result, RotatorError};

/// The Journal keeps a SQLite record of every drain.
/// It is advisory: the rotation never depends on what it contains.
pub struct Journal {
    conn: Connection,
    db_path: Option<PathBuf>,
}

/// One row of the `drains` table
#[derive(Debug, Clone, PartialEq)]
pub struct JournalEntry {
    pub id: i64,
    pub result: DrainResult,
}

impl Journal {
    /// Open (or create) the journal database at `path`.
    ///
    /// The parent directory is created if needed.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).at_path(parent)?;
        }

        let conn = Connection::open(path)?;
        tracing::debug!(path = %path.display(), "journal opened");

        let mut journal = Journal {
            conn,
            db_path: Some(path.to_path_buf()),
        };
        journal.init_schema()?;
        Ok(journal)
    }

    /// Journal that lives only as long as the process
    pub fn open_in_memory() -> Result<Self> {
        let mut journal = Journal {
            conn: Connection::open_in_memory()?,
            db_path: None,
        };
        journal.init_schema()?;
        Ok(journal)
    }

    /// Default location: ~/.local/share/dashcam-rotator/journal.db on Linux
    pub fn default_path() -> Option<PathBuf> {
        let mut path = dirs::data_dir().or_else(dirs::home_dir)?;
        path.push("dashcam-rotator");
        path.push("journal.db");
        Some(path)
    }

    fn init_schema(&mut self) -> Result<()> {
        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS drains (
                id              INTEGER PRIMARY KEY AUTOINCREMENT,
                image_index     INTEGER NOT NULL,
                started_at      INTEGER NOT NULL,
                elapsed_ms      INTEGER NOT NULL,
                files_pending   INTEGER NOT NULL,
                files_moved     INTEGER NOT NULL,
                move_errors     INTEGER NOT NULL,
                verdict         TEXT NOT NULL
            )",
            [],
        )?;

        self.conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_drains_started_at
             ON drains(started_at DESC)",
            [],
        )?;

        Ok(())
    }

    pub fn path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }

    /// Append a drain result, returning its row id
    pub fn record(&self, result: &DrainResult) -> Result<i64> {
        self.conn.execute(
            "INSERT INTO drains
                (image_index, started_at, elapsed_ms, files_pending, files_moved, move_errors, verdict)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                result.index.as_u8(),
                result.started_at.timestamp_millis(),
                result.elapsed.as_millis() as i64,
                result.files_pending as i64,
                result.files_moved as i64,
                result.move_errors as i64,
                result.verdict.as_str(),
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn drain_count(&self) -> Result<i64> {
        let count = self
            .conn
            .query_row("SELECT COUNT(*) FROM drains", [], |row| row.get(0))?;
        Ok(count)
    }

    /// Number of drains that lost files
    pub fn short_copy_count(&self) -> Result<i64> {
        let count = self.conn.query_row(
            "SELECT COUNT(*) FROM drains WHERE verdict = ?1",
            [CopyVerdict::ShortCopy.as_str()],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// Most recent drains first
    pub fn recent(&self, limit: usize) -> Result<Vec<JournalEntry>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, image_index, started_at, elapsed_ms, files_pending, files_moved, move_errors, verdict
             FROM drains
             ORDER BY started_at DESC, id DESC
             LIMIT ?1",
        )?;

        let rows = stmt.query_map([limit as i64], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, u8>(1)?,
                row.get::<_, i64>(2)?,
                row.get::<_, i64>(3)?,
                row.get::<_, i64>(4)?,
                row.get::<_, i64>(5)?,
                row.get::<_, i64>(6)?,
                row.get::<_, String>(7)?,
            ))
        })?;

        let mut entries = Vec::new();
        for row in rows {
            let (id, index, started_at, elapsed_ms, pending, moved, errors, verdict) = row?;
            let index = ImageIndex::from_u8(index).ok_or_else(|| {
                RotatorError::Invariant(format!("journal row {} has image index {}", id, index))
            })?;
            let verdict = CopyVerdict::parse(&verdict).ok_or_else(|| {
                RotatorError::Invariant(format!("journal row {} has verdict {:?}", id, verdict))
            })?;
            let started_at = Utc
                .timestamp_millis_opt(started_at)
                .single()
                .unwrap_or_default();

            entries.push(JournalEntry {
                id,
                result: DrainResult {
                    index,
                    started_at,
                    elapsed: Duration::from_millis(elapsed_ms.max(0) as u64),
                    files_pending: pending.max(0) as usize,
                    files_moved: moved.max(0) as usize,
                    move_errors: errors.max(0) as usize,
                    verdict,
                },
            });
        }

        Ok(entries)
    }
}

// Implement Debug for better error messages
impl std::fmt::Debug for Journal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Journal")
            .field("db_path", &self.db_path)
            .finish()
    }
}
