//! Environment-sourced configuration shared by both binaries.
//!
//! The core never reads the environment directly; everything flows through
//! [`Config::from_env`] at startup.

use std::env;

/// Runtime configuration for the pipeline binaries.
#[derive(Debug, Clone)]
pub struct Config {
    /// Logical service name used in startup logs.
    pub service_name: String,
    /// HTTP listen port for the ingestion API.
    pub port: u16,
    /// Kafka bootstrap brokers, comma-separated.
    pub kafka_brokers: String,
    /// Source topic carrying raw events.
    pub kafka_topic: String,
    /// Consumer group id for the event consumer.
    pub kafka_group_id: String,
    /// Dead-letter topic for failed records.
    pub kafka_dlq_topic: String,
    /// Postgres connection string.
    pub database_url: String,
    /// Retry budget for transient store failures.
    pub max_retries: u32,
}

impl Config {
    /// Load configuration from the environment, falling back to local
    /// development defaults.
    pub fn from_env() -> Self {
        let database_url = env::var("DATABASE_URL")
            .ok()
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| {
                format!(
                    "postgres://{}:{}@{}:{}/{}?sslmode=disable",
                    env_or("DB_USER", "events_user"),
                    env_or("DB_PASSWORD", "events_password"),
                    env_or("DB_HOST", "localhost"),
                    env_or("DB_PORT", "5432"),
                    env_or("DB_NAME", "events_db"),
                )
            });

        Self {
            service_name: env_or("SERVICE_NAME", "ingestion-api"),
            port: parse_or(&env_or("PORT", "8080"), 8080),
            kafka_brokers: env_or("KAFKA_BROKERS", "localhost:9093"),
            kafka_topic: env_or("KAFKA_TOPIC", "events"),
            kafka_group_id: env_or("KAFKA_GROUP_ID", "event-consumer-group"),
            kafka_dlq_topic: env_or("KAFKA_DLQ_TOPIC", "events.dlq"),
            database_url,
            max_retries: parse_or(&env_or("MAX_RETRIES", "5"), 5),
        }
    }
}

fn env_or(key: &str, fallback: &str) -> String {
    env::var(key)
        .ok()
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| fallback.to_string())
}

fn parse_or<T: std::str::FromStr>(value: &str, fallback: T) -> T {
    value.parse().unwrap_or(fallback)
}
