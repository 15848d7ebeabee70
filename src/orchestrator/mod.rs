//! Message lifecycle orchestrator.
//!
//! Stateless and request-scoped: every call reads what it needs from the
//! store, decides, writes, and publishes. Store writes and queue publishes
//! are not transactional with each other; a failure between them leaves
//! partial progress that the caller sees as an error (at-least-once).
//!
//! Flow:
//! 1. `admit` → create (`new`, attempts 0) → publish task to the input topic
//! 2. `validate_result` → validator →
//!    - pass: commit (`processed`, attempts 0) → publish to the output topic
//!    - fail, budget left: CAS attempts + 1 → republish the stored task
//!    - fail, budget spent: mark `failed` → publish to the dead-letter topic

mod lifecycle;
mod operator;

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

use crate::config::{DEFAULT_MAX_ATTEMPTS, QueueConfig, ServiceConfig};
use crate::error::PublishError;
use crate::hierarchy::OrgHierarchy;
use crate::mail::MailStatus;
use crate::queue::Publisher;
use crate::store::MailStore;

/// What `validate_result` did with a worker result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResultOutcome {
    /// Committed and published to the output topic.
    Accepted,
    /// Rejected; the original task was requeued. `attempts` is the new count.
    Requeued { attempts: u32 },
    /// Rejected with the budget spent; marked failed and dead-lettered.
    Escalated,
    /// Rejected, but the mail had already left `new` (or a concurrent call
    /// handled it first). Nothing was written or published.
    Ignored { status: MailStatus },
}

/// Retry budget and topic routing.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Classification attempts permitted before escalation.
    pub max_attempts: u32,
    pub input_topic: String,
    pub output_topic: String,
    pub dead_letter_topic: String,
    /// Upper bound on a single publish.
    pub publish_timeout: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self::from_queue(&QueueConfig::default(), DEFAULT_MAX_ATTEMPTS)
    }
}

impl OrchestratorConfig {
    fn from_queue(queue: &QueueConfig, max_attempts: u32) -> Self {
        Self {
            max_attempts,
            input_topic: queue.input_topic.clone(),
            output_topic: queue.output_topic.clone(),
            dead_letter_topic: queue.dead_letter_topic.clone(),
            publish_timeout: queue.publish_timeout,
        }
    }
}

impl From<&ServiceConfig> for OrchestratorConfig {
    fn from(config: &ServiceConfig) -> Self {
        Self::from_queue(&config.queue, config.max_attempts)
    }
}

/// Owns admission, dispatch, result validation, retry and escalation.
pub struct Orchestrator {
    store: Arc<dyn MailStore>,
    publisher: Arc<dyn Publisher>,
    config: OrchestratorConfig,
    hierarchy: Arc<OrgHierarchy>,
}

impl Orchestrator {
    pub fn new(
        store: Arc<dyn MailStore>,
        publisher: Arc<dyn Publisher>,
        config: OrchestratorConfig,
        hierarchy: Arc<OrgHierarchy>,
    ) -> Self {
        Self {
            store,
            publisher,
            config,
            hierarchy,
        }
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// The organisational hierarchy loaded at startup.
    pub fn hierarchy(&self) -> &OrgHierarchy {
        &self.hierarchy
    }

    /// Serialize and publish one message, bounded by the publish timeout.
    async fn dispatch<T: Serialize>(
        &self,
        topic: &str,
        key: &str,
        message: &T,
    ) -> Result<(), PublishError> {
        let payload = serde_json::to_vec(message)?;
        let timeout = self.config.publish_timeout;
        match tokio::time::timeout(timeout, self.publisher.publish(topic, key, &payload)).await {
            Ok(result) => result,
            Err(_) => Err(PublishError::Timeout {
                topic: topic.to_string(),
                timeout,
            }),
        }
    }
}
