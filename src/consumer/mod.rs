//! Kafka consumer engine: drains the durable event log into Postgres.
//!
//! This module provides the consumer side of the pipeline with:
//! - Manual offset management (commit only after a record's fate is final)
//! - Transient/permanent failure classification
//! - Bounded exponential back-off with jitter
//! - Dead letter queue routing with full diagnostic envelopes
//! - Cancellable suspension points for graceful shutdown
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use ingest_rs::consumer::{DlqProducer, EventConsumer, RetryPolicy, Worker};
//! use ingest_rs::storage::PgEventStore;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let store = Arc::new(PgEventStore::connect("postgres://localhost/events_db").await?);
//! let consumer = Arc::new(EventConsumer::new("localhost:9093", "events", "event-consumer-group")?);
//! let dlq = Arc::new(DlqProducer::new("localhost:9093", "events.dlq")?);
//!
//! let worker = Worker::new(consumer, store, dlq, RetryPolicy::default());
//! worker.run(&CancellationToken::new()).await?;
//! # Ok(())
//! # }
//! ```

pub mod consumer;
pub mod dlq;
pub mod error;
pub mod processor;
pub mod retry;
pub mod worker;

pub use consumer::{EventConsumer, OffsetCommitter};
pub use dlq::{DeadLetterSink, DlqEnvelope, DlqProducer};
pub use error::{classify, ConsumerError, ConsumerResult, ErrorKind, ProcessingError};
pub use processor::{Outcome, RecordProcessor};
pub use retry::RetryPolicy;
pub use worker::Worker;
