//! In-process publisher: records every publish and fans it out to subscribers.
//!
//! Selected only by explicit opt-in for local runs, and used as the recording
//! double in tests. The record log is bounded; the oldest records are dropped.

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use tokio::sync::{RwLock, broadcast};
use tracing::debug;

use super::traits::Publisher;
use crate::error::PublishError;

/// Default broadcast channel capacity.
const DEFAULT_BROADCAST_CAPACITY: usize = 256;

/// Default number of records retained for inspection.
pub const DEFAULT_RECORD_CAPACITY: usize = 10_000;

/// A single published record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedRecord {
    pub topic: String,
    pub key: String,
    pub payload: Vec<u8>,
}

impl PublishedRecord {
    /// Decode the payload as JSON.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_slice(&self.payload)
    }
}

/// In-memory publisher backed by a broadcast channel for live consumers.
pub struct MemoryPublisher {
    records: RwLock<VecDeque<PublishedRecord>>,
    capacity: usize,
    tx: broadcast::Sender<PublishedRecord>,
}

impl MemoryPublisher {
    pub fn new() -> Arc<Self> {
        Self::with_capacity(DEFAULT_RECORD_CAPACITY)
    }

    /// Keep at most `capacity` records (minimum 1).
    pub fn with_capacity(capacity: usize) -> Arc<Self> {
        let (tx, _rx) = broadcast::channel(DEFAULT_BROADCAST_CAPACITY);
        Arc::new(Self {
            records: RwLock::new(VecDeque::new()),
            capacity: capacity.max(1),
            tx,
        })
    }

    /// Subscribe to records published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<PublishedRecord> {
        self.tx.subscribe()
    }

    /// Retained records, oldest first.
    pub async fn records(&self) -> Vec<PublishedRecord> {
        self.records.read().await.iter().cloned().collect()
    }

    /// Records published to one topic, in order.
    pub async fn records_for(&self, topic: &str) -> Vec<PublishedRecord> {
        self.records
            .read()
            .await
            .iter()
            .filter(|r| r.topic == topic)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl Publisher for MemoryPublisher {
    async fn publish(&self, topic: &str, key: &str, payload: &[u8]) -> Result<(), PublishError> {
        if topic.is_empty() {
            return Err(PublishError::EmptyTopic);
        }

        let record = PublishedRecord {
            topic: topic.to_string(),
            key: key.to_string(),
            payload: payload.to_vec(),
        };
        {
            let mut records = self.records.write().await;
            if records.len() == self.capacity {
                records.pop_front();
            }
            records.push_back(record.clone());
        }
        debug!(topic = topic, key = key, "Record published in-process");

        // Ok if nobody is listening
        let _ = self.tx.send(record);
        Ok(())
    }
}
