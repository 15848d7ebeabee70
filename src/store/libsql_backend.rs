//! libSQL backend: async `MailStore` implementation.
//!
//! Supports local file and in-memory databases. JSON payloads are stored as
//! the exact text received and parsed back into `serde_json::Value` on read.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use libsql::{Connection, Database as LibSqlDatabase, params};
use serde_json::Value;
use serde_json::value::RawValue;
use tracing::{debug, info};

use crate::error::DatabaseError;
use crate::mail::{Mail, MailStatus};
use crate::store::migrations;
use crate::store::traits::MailStore;

/// libSQL database backend.
///
/// Stores a single connection that is reused for all operations.
/// `libsql::Connection` is `Send + Sync` and safe for concurrent async use.
pub struct LibSqlBackend {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
}

impl LibSqlBackend {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::Pool(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DatabaseError::Pool(format!("Failed to open libSQL database: {e}")))?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;

        let backend = Self {
            db: Arc::new(db),
            conn,
        };
        backend.init_schema().await?;
        info!(path = %path.display(), "Database opened");
        Ok(backend)
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                DatabaseError::Pool(format!("Failed to create in-memory database: {e}"))
            })?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;

        let backend = Self {
            db: Arc::new(db),
            conn,
        };
        backend.init_schema().await?;
        Ok(backend)
    }

    fn conn(&self) -> &Connection {
        &self.conn
    }
}

// ── Helper functions ────────────────────────────────────────────────

/// Canonical write format: fixed-width RFC 3339 so text ordering matches time ordering.
fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn now_str() -> String {
    format_datetime(&Utc::now())
}

/// Parse an RFC 3339 or SQLite datetime string into DateTime<Utc>.
fn parse_datetime(column: &str, s: &str) -> Result<DateTime<Utc>, DatabaseError> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }
    chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f")
        .map(|ndt| ndt.and_utc())
        .map_err(|e| DatabaseError::Serialization(format!("{column} '{s}' is not a timestamp: {e}")))
}

fn parse_json_column(column: &str, raw: Option<String>) -> Result<Option<Value>, DatabaseError> {
    raw.map(|s| {
        serde_json::from_str(&s)
            .map_err(|e| DatabaseError::Serialization(format!("{column} is not valid JSON: {e}")))
    })
    .transpose()
}

/// Map a libsql Row to a Mail.
///
/// Column order matches MAIL_COLUMNS.
fn row_to_mail(row: &libsql::Row) -> Result<Mail, DatabaseError> {
    let field = |e: libsql::Error| DatabaseError::Query(format!("row parse: {e}"));

    let id: String = row.get(0).map_err(field)?;
    let received_str: String = row.get(4).map_err(field)?;
    let attempts_raw: i64 = row.get(5).map_err(field)?;
    let status_str: String = row.get(6).map_err(field)?;
    let approved: i64 = row.get(10).map_err(field)?;
    let updated_str: String = row.get(12).map_err(field)?;

    let attempts = u32::try_from(attempts_raw).map_err(|_| {
        DatabaseError::Serialization(format!("mail {id} has invalid attempts {attempts_raw}"))
    })?;
    let status: MailStatus = status_str
        .parse()
        .map_err(|e: String| DatabaseError::Serialization(format!("mail {id}: {e}")))?;

    Ok(Mail {
        input: row.get(1).map_err(field)?,
        from: row.get(2).map_err(field)?,
        to: row.get(3).map_err(field)?,
        received_at: parse_datetime("received_at", &received_str)?,
        attempts,
        status,
        classification: row.get::<String>(7).ok(),
        model_answer: parse_json_column("model_answer", row.get::<String>(8).ok())?,
        assistant_response: parse_json_column("assistant_response", row.get::<String>(9).ok())?,
        approved: approved != 0,
        failed_reason: row.get::<String>(11).ok(),
        updated_at: parse_datetime("updated_at", &updated_str)?,
        id,
    })
}

fn is_unique_violation(e: &libsql::Error) -> bool {
    e.to_string().contains("UNIQUE constraint failed")
}

const MAIL_COLUMNS: &str = "id, input, from_email, to_email, received_at, attempts, status, classification, model_answer, assistant_response, is_approved, failed_reason, updated_at";

// ── Trait implementation ────────────────────────────────────────────

#[async_trait]
impl MailStore for LibSqlBackend {
    async fn init_schema(&self) -> Result<(), DatabaseError> {
        migrations::run_migrations(self.conn()).await
    }

    async fn create_mail(&self, mail: &Mail) -> Result<(), DatabaseError> {
        let now = now_str();
        self.conn()
            .execute(
                "INSERT INTO mails (id, input, from_email, to_email, received_at, attempts,
                    status, is_approved, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?9)",
                params![
                    mail.id.as_str(),
                    mail.input.as_str(),
                    mail.from.as_str(),
                    mail.to.as_str(),
                    format_datetime(&mail.received_at),
                    i64::from(mail.attempts),
                    mail.status.as_str(),
                    i64::from(mail.approved),
                    now,
                ],
            )
            .await
            .map_err(|e| {
                if is_unique_violation(&e) {
                    DatabaseError::Constraint(format!("mail {} already exists", mail.id))
                } else {
                    DatabaseError::Query(format!("create_mail: {e}"))
                }
            })?;

        debug!(id = %mail.id, "Mail inserted into DB");
        Ok(())
    }

    async fn get_mail(&self, id: &str) -> Result<Option<Mail>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT {MAIL_COLUMNS} FROM mails WHERE id = ?1"),
                params![id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_mail: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_mail(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("get_mail: {e}"))),
        }
    }

    async fn increment_attempts(&self, id: &str, expected: u32) -> Result<bool, DatabaseError> {
        let updated = self
            .conn()
            .execute(
                "UPDATE mails SET attempts = attempts + 1, updated_at = ?3
                 WHERE id = ?1 AND status = 'new' AND attempts = ?2",
                params![id, i64::from(expected), now_str()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("increment_attempts: {e}")))?;

        debug!(id = id, expected, updated, "Attempts increment");
        Ok(updated > 0)
    }

    async fn mark_failed(&self, id: &str, reason: &str) -> Result<bool, DatabaseError> {
        let updated = self
            .conn()
            .execute(
                "UPDATE mails SET status = 'failed', failed_reason = ?2, updated_at = ?3
                 WHERE id = ?1 AND status = 'new'",
                params![id, reason, now_str()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("mark_failed: {e}")))?;

        Ok(updated > 0)
    }

    async fn save_result(
        &self,
        id: &str,
        classification: &str,
        model_answer: &RawValue,
    ) -> Result<bool, DatabaseError> {
        let updated = self
            .conn()
            .execute(
                "UPDATE mails SET classification = ?2, model_answer = ?3, status = 'processed',
                    attempts = 0, failed_reason = NULL, updated_at = ?4
                 WHERE id = ?1 AND status = 'new'",
                params![id, classification, model_answer.get(), now_str()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("save_result: {e}")))?;

        Ok(updated > 0)
    }

    async fn save_assistant_response(
        &self,
        id: &str,
        response: &RawValue,
        mark_processed: bool,
    ) -> Result<(), DatabaseError> {
        // Forcing `processed` clears any failure reason so the two never coexist.
        let updated = self
            .conn()
            .execute(
                "UPDATE mails SET assistant_response = ?2,
                    status = CASE WHEN ?3 THEN 'processed' ELSE status END,
                    failed_reason = CASE WHEN ?3 THEN NULL ELSE failed_reason END,
                    updated_at = ?4
                 WHERE id = ?1",
                params![id, response.get(), i64::from(mark_processed), now_str()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("save_assistant_response: {e}")))?;

        if updated == 0 {
            return Err(DatabaseError::mail_not_found(id));
        }
        Ok(())
    }

    async fn list_processed(&self) -> Result<Vec<Mail>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {MAIL_COLUMNS} FROM mails WHERE status = 'processed'
                     ORDER BY updated_at DESC, rowid DESC"
                ),
                (),
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("list_processed: {e}")))?;

        let mut mails = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(format!("list_processed: {e}")))?
        {
            mails.push(row_to_mail(&row)?);
        }
        Ok(mails)
    }

    async fn approve_mail(&self, id: &str) -> Result<(), DatabaseError> {
        let updated = self
            .conn()
            .execute(
                "UPDATE mails SET is_approved = 1, updated_at = ?2 WHERE id = ?1",
                params![id, now_str()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("approve_mail: {e}")))?;

        if updated == 0 {
            return Err(DatabaseError::mail_not_found(id));
        }
        Ok(())
    }
}
