//! Admission and the result state machine.

use chrono::{SubsecRound, Utc};
use serde::Serialize;
use serde_json::Value;
use serde_json::value::RawValue;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::{Orchestrator, ResultOutcome};
use crate::error::{LifecycleError, ValidationError};
use crate::mail::address::parse_mailbox;
use crate::mail::validator;
use crate::mail::{ClassificationTask, DeadLetterEvent, IncomingMail, Mail, ProcessedEvent};

/// Best-effort copy of a rejected worker result for the dead-letter record.
#[derive(Serialize)]
struct RejectedResult<'a> {
    id: &'a str,
    classification: &'a str,
    model_answer: Value,
}

impl Orchestrator {
    /// Admit a new mail: validate, persist as `new`, dispatch its classification task.
    ///
    /// A dispatch failure leaves the record in `new`; it is not retried here.
    pub async fn admit(&self, incoming: IncomingMail) -> Result<String, LifecycleError> {
        if incoming.input.trim().is_empty() {
            return Err(LifecycleError::InvalidInput("input is empty".into()));
        }
        if incoming.from.trim().is_empty() || incoming.to.trim().is_empty() {
            return Err(LifecycleError::InvalidInput("from/to must be set".into()));
        }
        parse_mailbox(&incoming.from)
            .map_err(|e| LifecycleError::InvalidInput(format!("invalid from address: {e}")))?;
        parse_mailbox(&incoming.to)
            .map_err(|e| LifecycleError::InvalidInput(format!("invalid to address: {e}")))?;

        let id = incoming
            .id
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        // Stored at microsecond precision; keep the dispatched task identical to the row.
        let received_at = incoming.received_at.unwrap_or_else(Utc::now).trunc_subsecs(6);

        let mail = Mail::new(id, incoming.input, incoming.from, incoming.to, received_at);

        self.store.create_mail(&mail).await.map_err(|e| {
            error!(id = %mail.id, error = %e, "Failed to save mail");
            LifecycleError::Persistence(e)
        })?;

        let topic = &self.config.input_topic;
        self.dispatch(topic, &mail.id, &ClassificationTask::from(&mail))
            .await
            .map_err(|e| {
                error!(id = %mail.id, topic = %topic, error = %e, "Failed to dispatch classification task");
                LifecycleError::Dispatch(e)
            })?;

        info!(id = %mail.id, topic = %topic, "Incoming mail queued for classification");
        Ok(mail.id)
    }

    /// Handle a worker result: commit it, requeue the task, or escalate.
    ///
    /// Validator rejections are not errors; they drive the retry path and are
    /// reported through [`ResultOutcome`].
    pub async fn validate_result(
        &self,
        id: &str,
        classification: &str,
        model_answer: Option<&str>,
    ) -> Result<ResultOutcome, LifecycleError> {
        if id.trim().is_empty() {
            return Err(LifecycleError::InvalidInput("id is empty".into()));
        }

        match validator::validate_result(classification, model_answer) {
            Ok(answer) => self.commit(id, classification, answer).await,
            Err(rejection) => {
                warn!(id = id, error = %rejection, "Worker result failed validation");
                self.retry_or_escalate(id, classification, model_answer, rejection)
                    .await
            }
        }
    }

    async fn commit(
        &self,
        id: &str,
        classification: &str,
        answer: Box<RawValue>,
    ) -> Result<ResultOutcome, LifecycleError> {
        let committed = self
            .store
            .save_result(id, classification, &answer)
            .await
            .map_err(|e| {
                error!(id = id, error = %e, "Failed to save classification result");
                LifecycleError::from(e)
            })?;

        if !committed {
            return match self.store.get_mail(id).await? {
                None => Err(LifecycleError::NotFound { id: id.to_string() }),
                Some(mail) if mail.status.is_terminal() => {
                    warn!(id = id, status = %mail.status, "Result arrived for a finished mail");
                    Err(LifecycleError::AlreadyTerminal {
                        id: id.to_string(),
                        status: mail.status.to_string(),
                    })
                }
                Some(mail) => Err(LifecycleError::ContractViolation(format!(
                    "save_result did not apply to mail {id} in status {}",
                    mail.status
                ))),
            };
        }

        let event = ProcessedEvent {
            id: id.to_string(),
            classification: classification.to_string(),
            model_answer: answer,
        };
        let topic = &self.config.output_topic;
        self.dispatch(topic, id, &event).await.map_err(|e| {
            error!(id = id, topic = %topic, error = %e, "Failed to publish processed mail");
            LifecycleError::Dispatch(e)
        })?;

        info!(id = id, classification = classification, topic = %topic, "Classification result accepted");
        Ok(ResultOutcome::Accepted)
    }

    async fn retry_or_escalate(
        &self,
        id: &str,
        classification: &str,
        model_answer: Option<&str>,
        rejection: ValidationError,
    ) -> Result<ResultOutcome, LifecycleError> {
        let mail = self
            .store
            .get_mail(id)
            .await
            .map_err(|e| {
                error!(id = id, error = %e, "Failed to load mail for rejected result");
                LifecycleError::from(e)
            })?
            .ok_or_else(|| LifecycleError::NotFound { id: id.to_string() })?;

        if mail.status.is_terminal() {
            info!(id = id, status = %mail.status, "Rejected result for a finished mail ignored");
            return Ok(ResultOutcome::Ignored {
                status: mail.status,
            });
        }

        let attempt = mail.attempts.saturating_add(1);
        if attempt >= self.config.max_attempts {
            self.escalate(&mail, attempt, classification, model_answer, &rejection)
                .await
        } else {
            self.requeue(&mail, attempt).await
        }
    }

    async fn escalate(
        &self,
        mail: &Mail,
        attempt: u32,
        classification: &str,
        model_answer: Option<&str>,
        rejection: &ValidationError,
    ) -> Result<ResultOutcome, LifecycleError> {
        let id = mail.id.as_str();
        let reason = format!(
            "max attempts reached ({attempt}/{}): {rejection}",
            self.config.max_attempts
        );

        let transitioned = self.store.mark_failed(id, &reason).await.map_err(|e| {
            error!(id = id, error = %e, "Failed to mark mail as failed");
            LifecycleError::from(e)
        })?;
        if !transitioned {
            // Someone else already moved it out of `new`; they own the dead-letter publish.
            let status = self
                .store
                .get_mail(id)
                .await?
                .ok_or_else(|| LifecycleError::NotFound { id: id.to_string() })?
                .status;
            info!(id = id, status = %status, "Escalation skipped, mail already finished");
            return Ok(ResultOutcome::Ignored { status });
        }

        let event = DeadLetterEvent {
            id: id.to_string(),
            reason,
            timestamp: Utc::now(),
            payload: rejected_payload(id, classification, model_answer),
        };
        let topic = &self.config.dead_letter_topic;
        self.dispatch(topic, id, &event).await.map_err(|e| {
            error!(id = id, topic = %topic, error = %e, "Failed to publish to dead-letter topic");
            LifecycleError::Dispatch(e)
        })?;

        info!(id = id, attempts = attempt, topic = %topic, "Mail sent to dead-letter topic");
        Ok(ResultOutcome::Escalated)
    }

    async fn requeue(&self, mail: &Mail, attempt: u32) -> Result<ResultOutcome, LifecycleError> {
        let id = mail.id.as_str();

        let incremented = self
            .store
            .increment_attempts(id, mail.attempts)
            .await
            .map_err(|e| {
                error!(id = id, error = %e, "Failed to increment attempts");
                LifecycleError::from(e)
            })?;
        if !incremented {
            info!(id = id, attempts = mail.attempts, "Retry skipped, a concurrent result moved the mail first");
            return Ok(ResultOutcome::Ignored {
                status: mail.status,
            });
        }

        // Always the stored input, never the rejected candidate.
        let task = ClassificationTask::from(mail);
        let topic = &self.config.input_topic;
        self.dispatch(topic, id, &task).await.map_err(|e| {
            error!(id = id, topic = %topic, error = %e, "Failed to requeue classification task");
            LifecycleError::Dispatch(e)
        })?;

        info!(id = id, attempts = attempt, topic = %topic, "Classification task requeued");
        Ok(ResultOutcome::Requeued { attempts: attempt })
    }
}

/// Serialize the rejected result; a failure yields no payload rather than
/// blocking escalation.
fn rejected_payload(id: &str, classification: &str, model_answer: Option<&str>) -> Option<Value> {
    let model_answer = match model_answer {
        None => Value::Null,
        Some(raw) => {
            serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
        }
    };
    let rejected = RejectedResult {
        id,
        classification,
        model_answer,
    };
    serde_json::to_value(&rejected)
        .map_err(|e| warn!(id = id, error = %e, "Could not serialize rejected result"))
        .ok()
}
