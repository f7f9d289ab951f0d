use std::path::Path;

use lifecert_core::{
    AuditEntry, CaseId, CaseStore, CaseStoreError, ManualReviewCase, ReviewStatus,
};
use rusqlite::{params, Connection, OptionalExtension};
use thiserror::Error;

const ACTIVITY_VERIFICATION: &str = "verification_attempt";

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("rusqlite error: {0}")]
    Rusqlite(#[from] rusqlite::Error),
    #[error("cannot move review {case_id} back to {status}")]
    InvalidTransition { case_id: CaseId, status: ReviewStatus },
    #[error("database directory I/O error: {0}")]
    Io(#[source] std::io::Error),
}

/// SQLite-backed store for manual-review cases and the audit log.
///
/// The connection is not `Sync`; the store is owned by the engine thread and
/// every call is blocking.
pub struct SqliteCaseStore {
    conn: Connection,
}

impl SqliteCaseStore {
    /// Open (or create) the database at the given path and run migrations.
    pub fn open(db_path: &Path) -> Result<Self, StoreError> {
        if db_path != Path::new(":memory:") {
            if let Some(parent) = db_path.parent() {
                std::fs::create_dir_all(parent).map_err(StoreError::Io)?;
            }
        }

        let conn = Connection::open(db_path)?;
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             CREATE TABLE IF NOT EXISTS manual_reviews (
                 id INTEGER PRIMARY KEY AUTOINCREMENT,
                 subject_id TEXT NOT NULL,
                 failure_type TEXT NOT NULL,
                 details TEXT NOT NULL,
                 status TEXT NOT NULL DEFAULT 'pending',
                 created_at TEXT NOT NULL
             );
             CREATE INDEX IF NOT EXISTS idx_reviews_subject ON manual_reviews(subject_id);
             CREATE INDEX IF NOT EXISTS idx_reviews_status ON manual_reviews(status);
             CREATE TABLE IF NOT EXISTS audit_log (
                 id INTEGER PRIMARY KEY AUTOINCREMENT,
                 attempt_id TEXT NOT NULL UNIQUE,
                 subject_id TEXT NOT NULL,
                 activity_type TEXT NOT NULL,
                 verdict TEXT NOT NULL,
                 reason TEXT,
                 similarity REAL NOT NULL,
                 blink_count INTEGER,
                 frames_with_face INTEGER NOT NULL,
                 details TEXT NOT NULL,
                 status TEXT NOT NULL,
                 created_at TEXT NOT NULL
             );
             CREATE INDEX IF NOT EXISTS idx_audit_subject ON audit_log(subject_id);",
        )?;

        Ok(Self { conn })
    }

    /// All reviews still awaiting a human decision, oldest first.
    pub fn pending_reviews(&self) -> Result<Vec<ReviewRecord>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, subject_id, failure_type, details, status, created_at
             FROM manual_reviews WHERE status = 'pending' ORDER BY id",
        )?;
        let rows = stmt.query_map([], ReviewRecord::from_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Review history for one subject, oldest first.
    pub fn reviews_for_subject(&self, subject_id: &str) -> Result<Vec<ReviewRecord>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, subject_id, failure_type, details, status, created_at
             FROM manual_reviews WHERE subject_id = ?1 ORDER BY id",
        )?;
        let rows = stmt.query_map([subject_id], ReviewRecord::from_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Resolve a pending review. Returns `false` if the case does not exist
    /// or has already left `pending`.
    pub fn set_review_status(
        &self,
        case_id: CaseId,
        status: ReviewStatus,
    ) -> Result<bool, StoreError> {
        if status == ReviewStatus::Pending {
            return Err(StoreError::InvalidTransition { case_id, status });
        }
        let affected = self.conn.execute(
            "UPDATE manual_reviews SET status = ?1 WHERE id = ?2 AND status = 'pending'",
            params![status.as_str(), case_id],
        )?;
        Ok(affected > 0)
    }

    pub fn review_status(&self, case_id: CaseId) -> Result<Option<String>, StoreError> {
        Ok(self
            .conn
            .query_row(
                "SELECT status FROM manual_reviews WHERE id = ?1",
                [case_id],
                |row| row.get(0),
            )
            .optional()?)
    }

    pub fn count_pending(&self) -> Result<u64, StoreError> {
        Ok(self.conn.query_row(
            "SELECT COUNT(*) FROM manual_reviews WHERE status = 'pending'",
            [],
            |row| row.get(0),
        )?)
    }

    /// Most recent audit entries for one subject, newest first.
    pub fn audit_for_subject(
        &self,
        subject_id: &str,
        limit: u32,
    ) -> Result<Vec<AuditRecord>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT attempt_id, verdict, reason, similarity, blink_count, details, status, created_at
             FROM audit_log WHERE subject_id = ?1 ORDER BY id DESC LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![subject_id, limit], |row| {
            Ok(AuditRecord {
                attempt_id: row.get(0)?,
                verdict: row.get(1)?,
                reason: row.get(2)?,
                similarity: row.get(3)?,
                blink_count: row.get(4)?,
                details: row.get(5)?,
                status: row.get(6)?,
                created_at: row.get(7)?,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }
}

impl CaseStore for SqliteCaseStore {
    fn create_manual_review(&self, case: &ManualReviewCase) -> Result<CaseId, CaseStoreError> {
        self.conn
            .execute(
                "INSERT INTO manual_reviews (subject_id, failure_type, details, status, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    case.subject_id,
                    case.failure.as_str(),
                    case.details,
                    case.status.as_str(),
                    case.created_at.to_rfc3339(),
                ],
            )
            .map_err(CaseStoreError::new)?;
        Ok(self.conn.last_insert_rowid())
    }

    fn append_audit(&self, entry: &AuditEntry) -> Result<(), CaseStoreError> {
        self.conn
            .execute(
                "INSERT INTO audit_log (attempt_id, subject_id, activity_type, verdict, reason,
                     similarity, blink_count, frames_with_face, details, status, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                params![
                    entry.attempt_id.to_string(),
                    entry.subject_id,
                    ACTIVITY_VERIFICATION,
                    entry.verdict.as_str(),
                    entry.reason.map(|r| r.as_str()),
                    entry.similarity,
                    entry.blink_count,
                    entry.frames_with_face as i64,
                    entry.details,
                    entry.status(),
                    entry.created_at.to_rfc3339(),
                ],
            )
            .map_err(CaseStoreError::new)?;
        Ok(())
    }
}

// ── Public types ──────────────────────────────────────────────────────────────

/// A manual-review row as surfaced to administrators.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ReviewRecord {
    pub id: CaseId,
    pub subject_id: String,
    pub failure_type: String,
    pub details: String,
    pub status: String,
    pub created_at: String,
}

impl ReviewRecord {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            subject_id: row.get(1)?,
            failure_type: row.get(2)?,
            details: row.get(3)?,
            status: row.get(4)?,
            created_at: row.get(5)?,
        })
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct AuditRecord {
    pub attempt_id: String,
    pub verdict: String,
    pub reason: Option<String>,
    pub similarity: f64,
    pub blink_count: Option<u32>,
    pub details: String,
    pub status: String,
    pub created_at: String,
}

// ── Tests ─────────────────────────────────────────────────────────────────────
