//! Manual-commit Kafka consumer for the source topic.
//!
//! Auto-commit is disabled so offsets are only committed after a record's
//! fate is finalised (persisted to the store, or parked in the dead-letter
//! log), preserving at-least-once delivery.

use async_trait::async_trait;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::message::OwnedMessage;
use rdkafka::{Message, Offset, TopicPartitionList};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::consumer::error::{ConsumerError, ConsumerResult};

/// Offset commit seam; implemented by [`EventConsumer`] and by test doubles.
#[async_trait]
pub trait OffsetCommitter: Send + Sync + 'static {
    /// Record `msg`'s offset as processed.
    async fn commit(&self, msg: &OwnedMessage) -> ConsumerResult<()>;
}

/// Wrapper around an rdkafka [`StreamConsumer`] with manual commit control.
pub struct EventConsumer {
    inner: StreamConsumer,
}

impl EventConsumer {
    /// Create a consumer in `group_id` subscribed to `topic`.
    pub fn new(brokers: &str, topic: &str, group_id: &str) -> ConsumerResult<Self> {
        let inner: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", brokers)
            .set("group.id", group_id)
            .set("enable.auto.commit", "false")
            .set("auto.offset.reset", "latest")
            .set("session.timeout.ms", "30000")
            .create()?;

        inner.subscribe(&[topic])?;
        info!(brokers, topic, group_id, "kafka consumer subscribed");

        Ok(Self { inner })
    }

    /// Fetch the next record without committing its offset.
    ///
    /// Returns [`ConsumerError::Cancelled`] when shutdown fires while the
    /// fetch is blocked.
    pub async fn fetch_message(&self, cancel: &CancellationToken) -> ConsumerResult<OwnedMessage> {
        tokio::select! {
            _ = cancel.cancelled() => Err(ConsumerError::Cancelled),
            res = self.inner.recv() => Ok(res?.detach()),
        }
    }

    /// Commit the offset for a processed record.
    ///
    /// Kafka commits mark the NEXT offset to consume, hence `offset + 1`.
    /// Call this only after the record reached a terminal state.
    pub fn commit_message(&self, msg: &OwnedMessage) -> ConsumerResult<()> {
        let mut tpl = TopicPartitionList::new();
        tpl.add_partition_offset(msg.topic(), msg.partition(), Offset::Offset(msg.offset() + 1))
            .map_err(ConsumerError::Commit)?;
        self.inner
            .commit(&tpl, CommitMode::Sync)
            .map_err(ConsumerError::Commit)
    }
}

#[async_trait]
impl OffsetCommitter for EventConsumer {
    async fn commit(&self, msg: &OwnedMessage) -> ConsumerResult<()> {
        self.commit_message(msg)
    }
}
