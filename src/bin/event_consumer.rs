//! Consumer-side binary: drains the source topic into Postgres.
//!
//! Exits 0 on clean cancellation, 1 when a startup dependency (store, Kafka
//! client) cannot be brought up.

use std::process;
use std::sync::Arc;
use std::time::Duration;

use ingest_rs::config::Config;
use ingest_rs::consumer::{DlqProducer, EventConsumer, RetryPolicy, Worker};
use ingest_rs::storage::PgEventStore;
use ingest_rs::{shutdown, telemetry};
use tracing::{error, info, warn};

#[tokio::main]
async fn main() {
    let mut cfg = Config::from_env();
    cfg.service_name = "event-consumer".to_string();
    telemetry::init(&cfg.service_name);

    let retry = RetryPolicy {
        max_retries: cfg.max_retries,
        ..RetryPolicy::default()
    };

    let store = match PgEventStore::connect(&cfg.database_url).await {
        Ok(store) => Arc::new(store),
        Err(e) => {
            let err_text = format!("{e:#}");
            error!(error = %err_text, "failed to connect to postgres");
            process::exit(1);
        }
    };

    let consumer = match EventConsumer::new(&cfg.kafka_brokers, &cfg.kafka_topic, &cfg.kafka_group_id) {
        Ok(consumer) => Arc::new(consumer),
        Err(e) => {
            error!(error = %e, "failed to create kafka consumer");
            process::exit(1);
        }
    };
    info!(
        brokers = %cfg.kafka_brokers,
        topic = %cfg.kafka_topic,
        group = %cfg.kafka_group_id,
        "kafka consumer started"
    );

    let dlq = match DlqProducer::new(&cfg.kafka_brokers, cfg.kafka_dlq_topic.clone()) {
        Ok(dlq) => Arc::new(dlq),
        Err(e) => {
            error!(error = %e, "failed to create DLQ producer");
            process::exit(1);
        }
    };
    info!(dlq_topic = %cfg.kafka_dlq_topic, "DLQ producer ready");

    let cancel = shutdown::install_signal_handler();

    let worker = Worker::new(consumer, store.clone(), dlq.clone(), retry);
    if let Err(e) = worker.run(&cancel).await {
        error!(error = %e, "worker exited with error");
    }

    if let Err(e) = dlq.flush(Duration::from_secs(10)) {
        warn!(error = %e, "DLQ flush incomplete during shutdown");
    }
    store.close().await;
    info!("consumer shutdown complete");
}
