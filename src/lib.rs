//! Two-stage event ingestion pipeline: HTTP → durable log → Postgres.
//!
//! Events arrive over HTTP, are buffered on a Kafka topic, and are drained
//! into Postgres by a consumer that classifies failures, retries transient
//! ones under a bounded back-off, and parks unrecoverable records on a
//! dead-letter topic. Offsets are committed only once a record's fate is
//! final, so nothing is silently dropped.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use ingest_rs::config::Config;
//! use ingest_rs::consumer::{DlqProducer, EventConsumer, RetryPolicy, Worker};
//! use ingest_rs::storage::PgEventStore;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let cfg = Config::from_env();
//!
//! let store = Arc::new(PgEventStore::connect(&cfg.database_url).await?);
//! let consumer = Arc::new(EventConsumer::new(
//!     &cfg.kafka_brokers,
//!     &cfg.kafka_topic,
//!     &cfg.kafka_group_id,
//! )?);
//! let dlq = Arc::new(DlqProducer::new(&cfg.kafka_brokers, cfg.kafka_dlq_topic.clone())?);
//!
//! let retry = RetryPolicy {
//!     max_retries: cfg.max_retries,
//!     ..RetryPolicy::default()
//! };
//!
//! let worker = Worker::new(consumer, store, dlq, retry);
//! worker.run(&CancellationToken::new()).await?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::all)]
#![allow(clippy::module_inception)]

/// Environment-sourced configuration.
pub mod config;

/// Consumer engine: fetch, classify, retry, dead-letter, commit.
pub mod consumer;

/// Event wire format.
pub mod event;

/// Producer for the ingestion front-end.
pub mod producer;

/// HTTP ingestion API and read path.
pub mod service;

/// Signal handling for graceful shutdown.
pub mod shutdown;

/// Postgres persistence.
pub mod storage;

/// Logging initialisation.
pub mod telemetry;

pub use config::Config;
pub use consumer::{
    classify, ConsumerError, ConsumerResult, ErrorKind, Outcome, ProcessingError, RetryPolicy,
};
pub use event::Event;
pub use storage::{EventStore, PgEventStore};
