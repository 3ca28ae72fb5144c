//! Postgres persistence for events.
//!
//! The write path is a single idempotent insert keyed on `event_id`
//! (`ON CONFLICT DO NOTHING`), which is what lets the consumer promise
//! at-least-once delivery without duplicating rows. The read path backs the
//! query endpoints of the ingestion API.

use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::value::RawValue;
use sqlx::postgres::PgPoolOptions;
use sqlx::types::Json;
use sqlx::PgPool;
use tracing::info;

/// Store seam consumed by the processing loop.
#[async_trait]
pub trait EventStore: Send + Sync + 'static {
    /// Insert an event, treating a duplicate `event_id` as a silent no-op.
    async fn insert_event(
        &self,
        event_id: &str,
        event_type: &str,
        payload: Option<&RawValue>,
    ) -> anyhow::Result<()>;
}

/// Connection-pooled Postgres store.
pub struct PgEventStore {
    pool: PgPool,
}

/// A persisted event row, as returned by the read path.
#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct StoredEvent {
    /// Content address of the event.
    pub event_id: String,
    /// Producer-assigned category.
    pub event_type: String,
    /// Opaque payload as stored.
    pub payload: Option<Json<serde_json::Value>>,
    /// Server-side ingestion timestamp.
    pub received_at: DateTime<Utc>,
}

/// Count of persisted events per type.
#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct TypeCount {
    /// Event type.
    pub event_type: String,
    /// Number of events of that type.
    pub count: i64,
}

impl PgEventStore {
    /// Open a bounded connection pool and verify connectivity.
    ///
    /// The pool is deliberately small so bursty transient retries cannot
    /// stampede the backend.
    pub async fn connect(url: &str) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(25)
            .min_connections(5)
            .max_lifetime(Duration::from_secs(5 * 60))
            .acquire_timeout(Duration::from_secs(5))
            .connect(url)
            .await
            .context("open postgres pool")?;

        info!("connected to postgres");
        Ok(Self { pool })
    }

    /// List events, newest first, with optional type and time-range filters.
    /// Returns the page plus the total matching count.
    pub async fn list_events(
        &self,
        event_type: Option<&str>,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
        limit: i64,
        offset: i64,
    ) -> anyhow::Result<(Vec<StoredEvent>, i64)> {
        let events = sqlx::query_as::<_, StoredEvent>(
            r#"
            SELECT event_id, event_type, payload, received_at
            FROM events
            WHERE ($1::text IS NULL OR event_type = $1)
              AND ($2::timestamptz IS NULL OR received_at >= $2)
              AND ($3::timestamptz IS NULL OR received_at <= $3)
            ORDER BY received_at DESC
            LIMIT $4 OFFSET $5
            "#,
        )
        .bind(event_type)
        .bind(from)
        .bind(to)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .context("list events")?;

        let total: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*)
            FROM events
            WHERE ($1::text IS NULL OR event_type = $1)
              AND ($2::timestamptz IS NULL OR received_at >= $2)
              AND ($3::timestamptz IS NULL OR received_at <= $3)
            "#,
        )
        .bind(event_type)
        .bind(from)
        .bind(to)
        .fetch_one(&self.pool)
        .await
        .context("count events")?;

        Ok((events, total))
    }

    /// Fetch a single event by id.
    pub async fn get_event(&self, event_id: &str) -> anyhow::Result<Option<StoredEvent>> {
        sqlx::query_as::<_, StoredEvent>(
            r#"
            SELECT event_id, event_type, payload, received_at
            FROM events
            WHERE event_id = $1
            "#,
        )
        .bind(event_id)
        .fetch_optional(&self.pool)
        .await
        .with_context(|| format!("get event {event_id}"))
    }

    /// Event counts grouped by type, most frequent first.
    pub async fn type_counts(&self) -> anyhow::Result<Vec<TypeCount>> {
        sqlx::query_as::<_, TypeCount>(
            r#"
            SELECT event_type, COUNT(*) AS count
            FROM events
            GROUP BY event_type
            ORDER BY count DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .context("count events by type")
    }

    /// Drain the pool; called during shutdown.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl EventStore for PgEventStore {
    async fn insert_event(
        &self,
        event_id: &str,
        event_type: &str,
        payload: Option<&RawValue>,
    ) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            INSERT INTO events (event_id, event_type, payload, received_at)
            VALUES ($1, $2, $3, NOW())
            ON CONFLICT (event_id) DO NOTHING
            "#,
        )
        .bind(event_id)
        .bind(event_type)
        .bind(payload.map(Json))
        .execute(&self.pool)
        .await
        .with_context(|| format!("insert event {event_id}"))?;

        Ok(())
    }
}
