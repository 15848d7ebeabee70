//! `MailStore`: the narrow persistence contract the orchestrator depends on.

use async_trait::async_trait;
use serde_json::value::RawValue;

use crate::error::DatabaseError;
use crate::mail::Mail;

/// Backend-agnostic mail persistence.
///
/// The guarded mutations (`increment_attempts`, `mark_failed`, `save_result`)
/// only touch rows still in `new` status and report whether the row actually
/// transitioned. `false` means the row is missing or was already moved on by
/// a concurrent caller; callers that need to tell the two apart re-fetch.
#[async_trait]
pub trait MailStore: Send + Sync {
    /// Run all pending schema migrations.
    async fn init_schema(&self) -> Result<(), DatabaseError>;

    /// Insert a new mail. A duplicate id is a `Constraint` error.
    async fn create_mail(&self, mail: &Mail) -> Result<(), DatabaseError>;

    /// Fetch a mail by id.
    async fn get_mail(&self, id: &str) -> Result<Option<Mail>, DatabaseError>;

    /// Atomically bump `attempts` from `expected` to `expected + 1`.
    async fn increment_attempts(&self, id: &str, expected: u32) -> Result<bool, DatabaseError>;

    /// Move a `new` mail to `failed` with a reason.
    async fn mark_failed(&self, id: &str, reason: &str) -> Result<bool, DatabaseError>;

    /// Commit a worker result: `status = processed`, `attempts = 0`.
    /// The payload text is persisted exactly as given.
    async fn save_result(
        &self,
        id: &str,
        classification: &str,
        model_answer: &RawValue,
    ) -> Result<bool, DatabaseError>;

    /// Attach an operator response, optionally forcing `status = processed`.
    /// Unknown id is `NotFound`.
    async fn save_assistant_response(
        &self,
        id: &str,
        response: &RawValue,
        mark_processed: bool,
    ) -> Result<(), DatabaseError>;

    /// All processed mails, most recently updated first.
    async fn list_processed(&self) -> Result<Vec<Mail>, DatabaseError>;

    /// Set `approved = true`. Idempotent; unknown id is `NotFound`.
    async fn approve_mail(&self, id: &str) -> Result<(), DatabaseError>;
}
