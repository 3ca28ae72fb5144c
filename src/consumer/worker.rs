//! The long-lived fetch → process loop.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::consumer::consumer::EventConsumer;
use crate::consumer::dlq::DeadLetterSink;
use crate::consumer::error::{ConsumerError, ConsumerResult};
use crate::consumer::processor::{Outcome, RecordProcessor};
use crate::consumer::retry::RetryPolicy;
use crate::storage::EventStore;

/// One cooperative worker: fetches records sequentially and processes each to
/// completion before the next fetch. Parallelism lives at the partition level
/// through the consumer-group protocol, not inside the worker.
pub struct Worker<S, D> {
    consumer: Arc<EventConsumer>,
    processor: RecordProcessor<S, D, EventConsumer>,
}

impl<S, D> Worker<S, D>
where
    S: EventStore,
    D: DeadLetterSink,
{
    /// Wire a worker over shared consumer, store, and DLQ handles.
    pub fn new(
        consumer: Arc<EventConsumer>,
        store: Arc<S>,
        dlq: Arc<D>,
        retry: RetryPolicy,
    ) -> Self {
        let processor = RecordProcessor::new(store, dlq, consumer.clone(), retry);
        Self {
            consumer,
            processor,
        }
    }

    /// Run until the cancellation token fires.
    ///
    /// Because each record reaches a terminal state before the next fetch,
    /// offsets commit in monotonically non-decreasing order per partition.
    pub async fn run(&self, cancel: &CancellationToken) -> ConsumerResult<()> {
        info!("consuming events");
        loop {
            let msg = match self.consumer.fetch_message(cancel).await {
                Ok(msg) => msg,
                Err(ConsumerError::Cancelled) => {
                    info!("consumer shutting down");
                    return Ok(());
                }
                Err(e) => {
                    error!(error = %e, "fetch failed");
                    continue;
                }
            };

            if let Outcome::Aborted = self.processor.handle(&msg, cancel).await {
                info!("worker aborted mid-record, exiting without commit");
                return Ok(());
            }
        }
    }
}
