//! Kafka producer used by the ingestion front-end.

use std::time::Duration;

use anyhow::Context;
use rdkafka::config::ClientConfig;
use rdkafka::producer::{FutureProducer, FutureRecord, Producer};
use serde::Serialize;
use tracing::debug;

/// Producer publishing accepted events to the source topic with all-ISR
/// acknowledgment.
pub struct EventProducer {
    producer: FutureProducer,
    topic: String,
    send_timeout: Duration,
}

impl EventProducer {
    /// Create a producer targeting `topic`.
    pub fn new(brokers: &str, topic: impl Into<String>) -> anyhow::Result<Self> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", brokers)
            .set("acks", "all")
            .set("linger.ms", "10")
            .set("message.timeout.ms", "30000")
            .create()
            .context("create kafka producer")?;

        Ok(Self {
            producer,
            topic: topic.into(),
            send_timeout: Duration::from_secs(30),
        })
    }

    /// Serialize `event` as JSON and publish it keyed by `key`.
    pub async fn publish<T: Serialize>(&self, key: &str, event: &T) -> anyhow::Result<()> {
        let value = serde_json::to_vec(event).context("serialize event")?;

        let record = FutureRecord::to(&self.topic).key(key).payload(&value);

        match self.producer.send(record, self.send_timeout).await {
            Ok((partition, offset)) => {
                debug!(topic = %self.topic, partition, offset, "event published");
                Ok(())
            }
            Err((e, _)) => Err(anyhow::Error::new(e))
                .with_context(|| format!("publish to topic {}", self.topic)),
        }
    }

    /// Flush pending writes; called during shutdown.
    pub fn flush(&self, timeout: Duration) -> anyhow::Result<()> {
        self.producer.flush(timeout).context("flush producer")?;
        Ok(())
    }
}
