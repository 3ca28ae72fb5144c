//! Dead-letter routing for records that cannot be persisted.
//!
//! A failed record is wrapped in a [`DlqEnvelope`] carrying everything an
//! operator needs to diagnose and replay it, then produced to the dead-letter
//! topic with acknowledgment from all in-sync replicas. Delivery is not
//! idempotent: if the envelope lands but the source offset commit fails, the
//! same envelope will be produced again after redelivery. Downstream DLQ
//! consumers key on `original_partition` + `original_offset` to deduplicate.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rdkafka::config::ClientConfig;
use rdkafka::message::{Header, OwnedHeaders, OwnedMessage};
use rdkafka::producer::{FutureProducer, FutureRecord, Producer};
use rdkafka::Message;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::consumer::error::{ConsumerError, ConsumerResult, ErrorKind};

/// Forensic wrapper around a failed record.
///
/// `original_value` is the source message's raw bytes, preserved exactly.
/// Poison pills are by definition not valid JSON, so the bytes are carried as
/// an array rather than embedded as a JSON subdocument.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DlqEnvelope {
    /// Topic the record was fetched from.
    pub original_topic: String,
    /// Source partition.
    pub original_partition: i32,
    /// Source offset.
    pub original_offset: i64,
    /// Source key, lossily decoded as UTF-8.
    pub original_key: String,
    /// Raw bytes of the source message value.
    pub original_value: Vec<u8>,
    /// Rendered error chain that condemned the record.
    pub error_message: String,
    /// `"transient"` or `"permanent"`.
    pub error_kind: String,
    /// Total store attempts made: 0 for validation failures, `n + 1` when
    /// attempt `n` (0-indexed) produced the fatal decision.
    pub retries: u32,
    /// When the terminal decision was made.
    pub failed_at: DateTime<Utc>,
}

/// Seam for dead-letter delivery, so the processing loop is testable without
/// a broker.
#[async_trait]
pub trait DeadLetterSink: Send + Sync + 'static {
    /// Wrap `original` in an envelope and deliver it to the dead-letter log.
    ///
    /// On error the caller MUST NOT commit the source offset; redelivery is
    /// the only thing standing between a DLQ outage and data loss.
    async fn send(
        &self,
        original: &OwnedMessage,
        reason: &anyhow::Error,
        kind: ErrorKind,
        retries: u32,
        cancel: &CancellationToken,
    ) -> ConsumerResult<()>;
}

/// Producer targeting the dead-letter topic.
pub struct DlqProducer {
    producer: FutureProducer,
    topic: String,
    send_timeout: Duration,
}

impl DlqProducer {
    /// Create a producer with all-ISR acknowledgment.
    pub fn new(brokers: &str, topic: impl Into<String>) -> ConsumerResult<Self> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", brokers)
            .set("acks", "all")
            .set("message.timeout.ms", "30000")
            .create()?;

        Ok(Self {
            producer,
            topic: topic.into(),
            send_timeout: Duration::from_secs(30),
        })
    }

    fn envelope(
        &self,
        original: &OwnedMessage,
        reason: &anyhow::Error,
        kind: ErrorKind,
        retries: u32,
    ) -> DlqEnvelope {
        DlqEnvelope {
            original_topic: original.topic().to_string(),
            original_partition: original.partition(),
            original_offset: original.offset(),
            original_key: String::from_utf8_lossy(original.key().unwrap_or_default()).into_owned(),
            original_value: original.payload().unwrap_or_default().to_vec(),
            error_message: format!("{reason:#}"),
            error_kind: kind.to_string(),
            retries,
            failed_at: Utc::now(),
        }
    }

    /// Flush pending writes; called during shutdown.
    pub fn flush(&self, timeout: Duration) -> ConsumerResult<()> {
        self.producer.flush(timeout)?;
        Ok(())
    }
}

#[async_trait]
impl DeadLetterSink for DlqProducer {
    async fn send(
        &self,
        original: &OwnedMessage,
        reason: &anyhow::Error,
        kind: ErrorKind,
        retries: u32,
        cancel: &CancellationToken,
    ) -> ConsumerResult<()> {
        let envelope = self.envelope(original, reason, kind, retries);
        let value = serde_json::to_vec(&envelope)
            .map_err(|e| ConsumerError::Dlq(format!("serialize envelope: {e}")))?;

        let headers = OwnedHeaders::new()
            .insert(Header {
                key: "dlq-reason",
                value: Some(kind.as_str().as_bytes()),
            })
            .insert(Header {
                key: "original-topic",
                value: Some(original.topic().as_bytes()),
            });

        let mut record = FutureRecord::to(&self.topic).payload(&value).headers(headers);
        if let Some(key) = original.key() {
            record = record.key(key);
        }

        let delivery = tokio::select! {
            _ = cancel.cancelled() => return Err(ConsumerError::Cancelled),
            res = self.producer.send(record, self.send_timeout) => res,
        };

        match delivery {
            Ok((partition, offset)) => {
                debug!(topic = %self.topic, partition, offset, "dead letter delivered");
                Ok(())
            }
            Err((e, _)) => Err(ConsumerError::Dlq(format!(
                "write to DLQ topic {}: {e}",
                self.topic
            ))),
        }
    }
}
