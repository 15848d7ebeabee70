//! Mail entity, queue payloads, and request bodies.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use serde_json::value::RawValue;

// ── Status ──────────────────────────────────────────────────────────

/// Lifecycle status of a mail.
///
/// There is no persisted "processing" state: a `New` mail is in flight
/// between dispatch and the worker's result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MailStatus {
    New,
    Processed,
    Failed,
}

impl MailStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Processed => "processed",
            Self::Failed => "failed",
        }
    }

    /// `Processed` and `Failed` are never left by the retry state machine.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::New)
    }
}

impl fmt::Display for MailStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MailStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "new" => Ok(Self::New),
            "processed" => Ok(Self::Processed),
            "failed" => Ok(Self::Failed),
            other => Err(format!("unknown mail status: {other}")),
        }
    }
}

// ── Entity ──────────────────────────────────────────────────────────

/// A persisted inbound mail and its classification state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mail {
    pub id: String,
    pub input: String,
    pub from: String,
    pub to: String,
    pub received_at: DateTime<Utc>,
    /// Failed validations since the last successful commit.
    pub attempts: u32,
    pub status: MailStatus,
    /// Set only when `status == Processed` through the worker path.
    pub classification: Option<String>,
    pub model_answer: Option<Value>,
    /// Operator-authored response, independent of status.
    pub assistant_response: Option<Value>,
    pub approved: bool,
    /// Set only when `status == Failed`.
    pub failed_reason: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl Mail {
    /// A freshly admitted mail: `status = new`, `attempts = 0`.
    pub fn new(
        id: impl Into<String>,
        input: impl Into<String>,
        from: impl Into<String>,
        to: impl Into<String>,
        received_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            input: input.into(),
            from: from.into(),
            to: to.into(),
            received_at,
            attempts: 0,
            status: MailStatus::New,
            classification: None,
            model_answer: None,
            assistant_response: None,
            approved: false,
            failed_reason: None,
            updated_at: Utc::now(),
        }
    }
}

// ── Queue payloads ──────────────────────────────────────────────────

/// Classification task published to the input topic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationTask {
    pub id: String,
    pub input: String,
    pub from: String,
    pub to: String,
    pub received_at: DateTime<Utc>,
}

impl From<&Mail> for ClassificationTask {
    fn from(mail: &Mail) -> Self {
        Self {
            id: mail.id.clone(),
            input: mail.input.clone(),
            from: mail.from.clone(),
            to: mail.to.clone(),
            received_at: mail.received_at,
        }
    }
}

/// Accepted result published to the output topic.
///
/// `model_answer` carries the worker's payload text verbatim.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessedEvent {
    pub id: String,
    pub classification: String,
    pub model_answer: Box<RawValue>,
}

/// Escalation record published to the dead-letter topic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeadLetterEvent {
    pub id: String,
    pub reason: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
}

// ── Request bodies ──────────────────────────────────────────────────

/// `POST /process` body.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IncomingMail {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default)]
    pub input: String,
    #[serde(default)]
    pub from: String,
    #[serde(default)]
    pub to: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub received_at: Option<DateTime<Utc>>,
}

/// `POST /validate_processed_message` body, posted by the worker.
///
/// `model_answer` is kept raw so the validator sees exactly what was sent.
#[derive(Debug, Deserialize)]
pub struct ValidateRequest {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub classification: String,
    #[serde(default)]
    pub model_answer: Option<Box<RawValue>>,
}

/// `POST /approve` body.
#[derive(Debug, Deserialize)]
pub struct ApproveRequest {
    #[serde(default)]
    pub id: String,
}

/// `POST /add-assistant-response` body.
#[derive(Debug, Deserialize)]
pub struct AssistantResponseRequest {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub assistant_response: Option<Box<RawValue>>,
    #[serde(default)]
    pub mark_processed: bool,
}
