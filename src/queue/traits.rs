//! `Publisher`: the queue capability the orchestrator depends on.

use async_trait::async_trait;

use crate::error::PublishError;

/// At-least-once, single-attempt publish of an opaque payload to a topic.
///
/// `key` selects the partition on transports that support it, so consecutive
/// publishes for one mail id stay in order there.
#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(&self, topic: &str, key: &str, payload: &[u8]) -> Result<(), PublishError>;
}
