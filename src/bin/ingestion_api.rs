//! HTTP front-end binary: validates events and publishes them to the source
//! topic.

use std::net::SocketAddr;
use std::process;
use std::sync::Arc;

use ingest_rs::config::Config;
use ingest_rs::producer::EventProducer;
use ingest_rs::service::{self, AppState};
use ingest_rs::storage::PgEventStore;
use ingest_rs::{shutdown, telemetry};
use tracing::{error, info};

#[tokio::main]
async fn main() {
    let cfg = Config::from_env();
    telemetry::init(&cfg.service_name);

    let store = match PgEventStore::connect(&cfg.database_url).await {
        Ok(store) => Arc::new(store),
        Err(e) => {
            let err_text = format!("{e:#}");
            error!(error = %err_text, "failed to connect to postgres");
            process::exit(1);
        }
    };

    let producer = match EventProducer::new(&cfg.kafka_brokers, cfg.kafka_topic.clone()) {
        Ok(producer) => Arc::new(producer),
        Err(e) => {
            let err_text = format!("{e:#}");
            error!(error = %err_text, "failed to create kafka producer");
            process::exit(1);
        }
    };
    info!(brokers = %cfg.kafka_brokers, topic = %cfg.kafka_topic, "kafka producer ready");

    let cancel = shutdown::install_signal_handler();
    let state = AppState { producer, store };
    let addr = SocketAddr::from(([0, 0, 0, 0], cfg.port));

    if let Err(e) = service::serve(state, addr, cancel).await {
        let err_text = format!("{e:#}");
        error!(error = %err_text, "server error");
        process::exit(1);
    }

    info!("ingestion api shutdown complete");
}
