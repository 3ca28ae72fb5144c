//! Structured logging for the pipeline binaries.
//!
//! Terminal decisions (`event persisted`, `message routed to DLQ`, commit
//! failures) log enough fields to reconstruct an event's lifecycle from logs
//! alone; this module wires the subscriber those entries flow through.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

/// Initialise the global tracing subscriber.
///
/// `RUST_LOG` controls the filter; `info` is the default. Call once per
/// process, before any other work.
pub fn init(service_name: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    Registry::default()
        .with(filter)
        .with(fmt::layer().with_target(true))
        .init();

    tracing::info!(service = service_name, "logging initialised");
}
