//! Operator surface: approval, operator responses, and the processed listing.
//!
//! None of these touch the retry state machine or publish anything.

use tracing::{error, info};

use super::Orchestrator;
use crate::error::LifecycleError;
use crate::mail::Mail;
use crate::mail::validator;

impl Orchestrator {
    /// Mark a mail approved. Idempotent.
    pub async fn approve(&self, id: &str) -> Result<(), LifecycleError> {
        if id.trim().is_empty() {
            return Err(LifecycleError::InvalidInput("id is empty".into()));
        }
        self.store.approve_mail(id).await.map_err(|e| {
            error!(id = id, error = %e, "Failed to approve mail");
            LifecycleError::from(e)
        })?;
        info!(id = id, "Mail approved");
        Ok(())
    }

    /// Attach an operator-authored response, optionally forcing `processed`.
    pub async fn attach_assistant_response(
        &self,
        id: &str,
        response: Option<&str>,
        mark_processed: bool,
    ) -> Result<(), LifecycleError> {
        if id.trim().is_empty() {
            return Err(LifecycleError::InvalidInput("id is empty".into()));
        }
        let response = validator::validate_payload(response)?;

        self.store
            .save_assistant_response(id, &response, mark_processed)
            .await
            .map_err(|e| {
                error!(id = id, error = %e, "Failed to save assistant response");
                LifecycleError::from(e)
            })?;
        info!(id = id, mark_processed = mark_processed, "Assistant response saved");
        Ok(())
    }

    /// Processed mails, most recently updated first.
    pub async fn list_processed(&self) -> Result<Vec<Mail>, LifecycleError> {
        self.store.list_processed().await.map_err(|e| {
            error!(error = %e, "Failed to list processed mails");
            LifecycleError::from(e)
        })
    }
}
