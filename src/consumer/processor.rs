//! The per-record state machine: decode, validate, insert with bounded
//! retries, dead-letter routing, offset commit.
//!
//! A record leaves [`RecordProcessor::handle`] in exactly one terminal state
//! ([`Outcome`]). Offsets are committed only in the two DONE states; a record
//! whose fate is undecided (shutdown, DLQ outage) stays uncommitted and will
//! be redelivered.

use std::sync::Arc;
use std::time::Duration;

use rdkafka::message::OwnedMessage;
use rdkafka::Message;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::consumer::consumer::OffsetCommitter;
use crate::consumer::dlq::DeadLetterSink;
use crate::consumer::error::{classify, ConsumerError, ErrorKind, ProcessingError};
use crate::consumer::retry::RetryPolicy;
use crate::event::Event;
use crate::storage::EventStore;

/// Terminal state of a single record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Store acknowledged the insert; offset committed.
    Persisted {
        /// Store attempts made, including the successful one.
        attempts: u32,
    },
    /// Envelope delivered to the dead-letter log; offset committed.
    DeadLettered {
        /// Classification that condemned the record.
        kind: ErrorKind,
        /// Store attempts made; 0 for decode/validation failures.
        retries: u32,
    },
    /// Dead-letter write failed; offset NOT committed, the record will be
    /// redelivered and re-attempted.
    Stuck,
    /// Shutdown interrupted processing; offset NOT committed.
    Aborted,
}

/// Drives one record from fetch to terminal state.
pub struct RecordProcessor<S, D, C> {
    store: Arc<S>,
    dlq: Arc<D>,
    committer: Arc<C>,
    retry: RetryPolicy,
    attempt_timeout: Duration,
}

impl<S, D, C> RecordProcessor<S, D, C>
where
    S: EventStore,
    D: DeadLetterSink,
    C: OffsetCommitter,
{
    /// Create a processor with the default 5 s per-attempt deadline.
    pub fn new(store: Arc<S>, dlq: Arc<D>, committer: Arc<C>, retry: RetryPolicy) -> Self {
        Self {
            store,
            dlq,
            committer,
            retry,
            attempt_timeout: Duration::from_secs(5),
        }
    }

    /// Override the per-attempt store deadline.
    pub fn with_attempt_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout = timeout;
        self
    }

    /// Process a single record to a terminal state.
    pub async fn handle(&self, msg: &OwnedMessage, cancel: &CancellationToken) -> Outcome {
        let raw = msg.payload().unwrap_or_default();

        // Poison pill: value does not decode as an event.
        let event = match Event::decode(raw) {
            Ok(event) => event,
            Err(e) => {
                error!(
                    offset = msg.offset(),
                    partition = msg.partition(),
                    raw_size = raw.len(),
                    error = %e,
                    "poison pill: invalid JSON, routing to DLQ"
                );
                return self
                    .dead_letter(msg, anyhow::Error::new(e), ErrorKind::Permanent, 0, cancel)
                    .await;
            }
        };

        // Poison pill: required fields missing.
        if let Err(e) = event.validate() {
            error!(
                offset = msg.offset(),
                partition = msg.partition(),
                "poison pill: missing event_id or event_type"
            );
            return self
                .dead_letter(msg, anyhow::Error::new(e), ErrorKind::Permanent, 0, cancel)
                .await;
        }

        let mut attempt: u32 = 0;
        loop {
            let err = match self.try_insert(&event, cancel).await {
                Ok(()) => {
                    self.commit(msg, "persisted").await;
                    info!(
                        event_id = %event.event_id,
                        event_type = %event.event_type,
                        offset = msg.offset(),
                        attempts = attempt + 1,
                        "event persisted"
                    );
                    return Outcome::Persisted {
                        attempts: attempt + 1,
                    };
                }
                Err(e) => e,
            };

            let kind = classify(&err);
            let err_text = format!("{err:#}");
            error!(
                event_id = %event.event_id,
                error = %err_text,
                error_kind = %kind,
                attempt = attempt + 1,
                max = self.retry.max_retries,
                "store insert failed"
            );

            if kind == ErrorKind::Permanent {
                return self.dead_letter(msg, err, kind, attempt + 1, cancel).await;
            }

            if !self.retry.should_retry(kind, attempt) {
                warn!(
                    event_id = %event.event_id,
                    retries = attempt + 1,
                    "retries exhausted, routing to DLQ"
                );
                return self.dead_letter(msg, err, kind, attempt + 1, cancel).await;
            }

            if self.retry.sleep(attempt, cancel).await.is_err() {
                info!(event_id = %event.event_id, "retry sleep interrupted by shutdown");
                return Outcome::Aborted;
            }
            attempt += 1;
        }
    }

    /// One store attempt under its own deadline, racing worker cancellation.
    /// Both expiries classify as transient so the retry machine handles them.
    async fn try_insert(&self, event: &Event, cancel: &CancellationToken) -> anyhow::Result<()> {
        tokio::select! {
            _ = cancel.cancelled() => Err(anyhow::Error::new(ProcessingError::transient(
                "store attempt interrupted by shutdown",
            ))),
            res = tokio::time::timeout(
                self.attempt_timeout,
                self.store.insert_event(&event.event_id, &event.event_type, event.payload.as_deref()),
            ) => match res {
                Ok(inner) => inner,
                Err(_) => Err(anyhow::Error::new(ProcessingError::transient(format!(
                    "store attempt exceeded {:?}",
                    self.attempt_timeout
                )))),
            },
        }
    }

    async fn dead_letter(
        &self,
        msg: &OwnedMessage,
        reason: anyhow::Error,
        kind: ErrorKind,
        retries: u32,
        cancel: &CancellationToken,
    ) -> Outcome {
        match self.dlq.send(msg, &reason, kind, retries, cancel).await {
            Ok(()) => {
                info!(
                    offset = msg.offset(),
                    partition = msg.partition(),
                    error_kind = %kind,
                    retries,
                    "message routed to DLQ"
                );
                self.commit(msg, "dead-letter").await;
                Outcome::DeadLettered { kind, retries }
            }
            Err(ConsumerError::Cancelled) => {
                info!(offset = msg.offset(), "DLQ publish interrupted by shutdown");
                Outcome::Aborted
            }
            Err(e) => {
                let reason_text = format!("{reason:#}");
                error!(
                    offset = msg.offset(),
                    error = %e,
                    original_error = %reason_text,
                    "CRITICAL: failed to write to DLQ"
                );
                Outcome::Stuck
            }
        }
    }

    /// Commit a terminal record's offset. A commit failure is logged but not
    /// retried: the record's effect is already durable, and a redelivery is
    /// absorbed by store idempotency or by a duplicate DLQ envelope.
    async fn commit(&self, msg: &OwnedMessage, stage: &str) {
        if let Err(e) = self.committer.commit(msg).await {
            error!(
                offset = msg.offset(),
                partition = msg.partition(),
                stage,
                error = %e,
                "offset commit failed"
            );
        }
    }
}
