//! Failure-injection scenarios for the record processing state machine.
//!
//! These verify the consumer's decision logic under the full set of failure
//! modes (poison pills, transient and permanent store faults, DLQ outages,
//! shutdown mid-retry) without requiring a running broker or database. The
//! commit discipline is asserted in every scenario: offsets are committed
//! exactly once for terminal records and never for abandoned or stuck ones.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use anyhow::anyhow;
use async_trait::async_trait;
use ingest_rs::consumer::{
    ConsumerError, ConsumerResult, DeadLetterSink, ErrorKind, OffsetCommitter, Outcome,
    RecordProcessor, RetryPolicy,
};
use ingest_rs::storage::EventStore;
use pretty_assertions::assert_eq;
use rdkafka::error::KafkaError;
use rdkafka::message::OwnedMessage;
use rdkafka::types::RDKafkaErrorCode;
use rdkafka::{Message, Timestamp};
use serde_json::value::RawValue;
use tokio_util::sync::CancellationToken;

// --- test doubles ---

type InsertScript = Box<dyn Fn(u32) -> anyhow::Result<()> + Send + Sync>;

/// Store whose response is scripted per call index.
struct ScriptedStore {
    calls: AtomicU32,
    script: InsertScript,
}

impl ScriptedStore {
    fn new(script: impl Fn(u32) -> anyhow::Result<()> + Send + Sync + 'static) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicU32::new(0),
            script: Box::new(script),
        })
    }

    fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EventStore for ScriptedStore {
    async fn insert_event(
        &self,
        _event_id: &str,
        _event_type: &str,
        _payload: Option<&RawValue>,
    ) -> anyhow::Result<()> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        (self.script)(call)
    }
}

#[derive(Debug, Clone, PartialEq)]
struct SentEnvelope {
    kind: ErrorKind,
    retries: u32,
    value: Vec<u8>,
    error: String,
}

/// Dead-letter sink that records what it was asked to deliver.
#[derive(Default)]
struct RecordingDlq {
    fail: bool,
    sent: Mutex<Vec<SentEnvelope>>,
}

impl RecordingDlq {
    fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn failing() -> Arc<Self> {
        Arc::new(Self {
            fail: true,
            sent: Mutex::new(Vec::new()),
        })
    }

    fn sent(&self) -> Vec<SentEnvelope> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl DeadLetterSink for RecordingDlq {
    async fn send(
        &self,
        original: &OwnedMessage,
        reason: &anyhow::Error,
        kind: ErrorKind,
        retries: u32,
        _cancel: &CancellationToken,
    ) -> ConsumerResult<()> {
        if self.fail {
            return Err(ConsumerError::Dlq("broker unavailable".to_string()));
        }
        self.sent.lock().unwrap().push(SentEnvelope {
            kind,
            retries,
            value: original.payload().unwrap_or_default().to_vec(),
            error: format!("{reason:#}"),
        });
        Ok(())
    }
}

/// Committer that records committed offsets.
#[derive(Default)]
struct RecordingCommitter {
    fail: bool,
    commits: Mutex<Vec<i64>>,
}

impl RecordingCommitter {
    fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn failing() -> Arc<Self> {
        Arc::new(Self {
            fail: true,
            commits: Mutex::new(Vec::new()),
        })
    }

    fn commits(&self) -> Vec<i64> {
        self.commits.lock().unwrap().clone()
    }
}

#[async_trait]
impl OffsetCommitter for RecordingCommitter {
    async fn commit(&self, msg: &OwnedMessage) -> ConsumerResult<()> {
        if self.fail {
            return Err(ConsumerError::Commit(KafkaError::ConsumerCommit(
                RDKafkaErrorCode::OperationTimedOut,
            )));
        }
        self.commits.lock().unwrap().push(msg.offset());
        Ok(())
    }
}

// --- helpers ---

fn record(value: &[u8]) -> OwnedMessage {
    OwnedMessage::new(
        Some(value.to_vec()),
        Some(b"user-123".to_vec()),
        "events".to_string(),
        Timestamp::CreateTime(1234567890),
        2,
        42,
        None,
    )
}

fn fast_policy(max_retries: u32) -> RetryPolicy {
    RetryPolicy {
        max_retries,
        base_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(2),
        multiplier: 2.0,
        jitter_ratio: 0.0,
    }
}

fn processor(
    store: Arc<ScriptedStore>,
    dlq: Arc<RecordingDlq>,
    committer: Arc<RecordingCommitter>,
    policy: RetryPolicy,
) -> RecordProcessor<ScriptedStore, RecordingDlq, RecordingCommitter> {
    RecordProcessor::new(store, dlq, committer, policy)
        .with_attempt_timeout(Duration::from_secs(1))
}

// --- scenarios ---

#[tokio::test]
async fn happy_path_persists_on_first_attempt() {
    let store = ScriptedStore::new(|_| Ok(()));
    let dlq = RecordingDlq::new();
    let committer = RecordingCommitter::new();
    let proc = processor(store.clone(), dlq.clone(), committer.clone(), fast_policy(5));

    let msg = record(br#"{"event_id":"e4","event_type":"purchase","payload":{"amount":99}}"#);
    let outcome = proc.handle(&msg, &CancellationToken::new()).await;

    assert_eq!(outcome, Outcome::Persisted { attempts: 1 });
    assert_eq!(store.calls(), 1);
    assert!(dlq.sent().is_empty());
    assert_eq!(committer.commits(), vec![42]);
}

#[tokio::test]
async fn poison_pill_invalid_json_goes_straight_to_dlq() {
    let store = ScriptedStore::new(|_| panic!("insert must never be called for a poison pill"));
    let dlq = RecordingDlq::new();
    let committer = RecordingCommitter::new();
    let proc = processor(store.clone(), dlq.clone(), committer.clone(), fast_policy(5));

    let raw = br#"{not-valid-json!!!}"#;
    let msg = record(raw);
    let outcome = proc.handle(&msg, &CancellationToken::new()).await;

    assert_eq!(
        outcome,
        Outcome::DeadLettered {
            kind: ErrorKind::Permanent,
            retries: 0
        }
    );
    assert_eq!(store.calls(), 0);

    let sent = dlq.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].kind, ErrorKind::Permanent);
    assert_eq!(sent[0].retries, 0);
    // The raw bytes must reach the sink untouched so operators can replay.
    assert_eq!(sent[0].value, raw.to_vec());

    assert_eq!(committer.commits(), vec![42]);
}

#[tokio::test]
async fn poison_pill_missing_fields_goes_straight_to_dlq() {
    let store = ScriptedStore::new(|_| panic!("insert must never be called for missing fields"));
    let dlq = RecordingDlq::new();
    let committer = RecordingCommitter::new();
    let proc = processor(store.clone(), dlq.clone(), committer.clone(), fast_policy(5));

    let msg = record(br#"{"event_id":"","event_type":"click","payload":{}}"#);
    let outcome = proc.handle(&msg, &CancellationToken::new()).await;

    assert_eq!(
        outcome,
        Outcome::DeadLettered {
            kind: ErrorKind::Permanent,
            retries: 0
        }
    );
    assert_eq!(store.calls(), 0);
    assert_eq!(committer.commits(), vec![42]);

    let sent = dlq.sent();
    assert_eq!(sent.len(), 1);
    assert!(sent[0].error.contains("missing required fields"));
}

#[tokio::test]
async fn transient_failure_recovers_within_budget() {
    let store = ScriptedStore::new(|call| {
        if call < 2 {
            Err(anyhow!("connection refused"))
        } else {
            Ok(())
        }
    });
    let dlq = RecordingDlq::new();
    let committer = RecordingCommitter::new();
    let proc = processor(store.clone(), dlq.clone(), committer.clone(), fast_policy(5));

    let msg = record(br#"{"event_id":"e1","event_type":"click","payload":{}}"#);
    let outcome = proc.handle(&msg, &CancellationToken::new()).await;

    // Attempts 0 and 1 failed, attempt 2 succeeded.
    assert_eq!(outcome, Outcome::Persisted { attempts: 3 });
    assert_eq!(store.calls(), 3);
    assert!(dlq.sent().is_empty());
    assert_eq!(committer.commits(), vec![42]);
}

#[tokio::test]
async fn transient_failure_exhausts_budget() {
    let store = ScriptedStore::new(|_| Err(anyhow!("connection reset by peer")));
    let dlq = RecordingDlq::new();
    let committer = RecordingCommitter::new();
    let proc = processor(store.clone(), dlq.clone(), committer.clone(), fast_policy(3));

    let msg = record(br#"{"event_id":"e2","event_type":"view","payload":{}}"#);
    let outcome = proc.handle(&msg, &CancellationToken::new()).await;

    // Initial attempt plus 3 retries, all failing.
    assert_eq!(
        outcome,
        Outcome::DeadLettered {
            kind: ErrorKind::Transient,
            retries: 4
        }
    );
    assert_eq!(store.calls(), 4);
    assert_eq!(committer.commits(), vec![42]);

    let sent = dlq.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].kind, ErrorKind::Transient);
    assert_eq!(sent[0].retries, 4);
}

#[tokio::test]
async fn permanent_failure_is_never_retried() {
    let store = ScriptedStore::new(|_| {
        Err(anyhow!(
            r#"pq: value too long violates check constraint "events_type_len""#
        ))
    });
    let dlq = RecordingDlq::new();
    let committer = RecordingCommitter::new();
    let proc = processor(store.clone(), dlq.clone(), committer.clone(), fast_policy(5));

    let msg = record(br#"{"event_id":"e3","event_type":"x","payload":{}}"#);
    let outcome = proc.handle(&msg, &CancellationToken::new()).await;

    assert_eq!(
        outcome,
        Outcome::DeadLettered {
            kind: ErrorKind::Permanent,
            retries: 1
        }
    );
    assert_eq!(store.calls(), 1);
    assert_eq!(committer.commits(), vec![42]);

    let sent = dlq.sent();
    assert_eq!(sent.len(), 1);
    assert!(sent[0].error.contains("violates check constraint"));
}

#[tokio::test]
async fn zero_retry_config_permits_one_attempt() {
    let store = ScriptedStore::new(|_| Err(anyhow!("connection timeout")));
    let dlq = RecordingDlq::new();
    let committer = RecordingCommitter::new();
    let proc = processor(store.clone(), dlq.clone(), committer.clone(), fast_policy(0));

    let msg = record(br#"{"event_id":"e6","event_type":"click","payload":{}}"#);
    let outcome = proc.handle(&msg, &CancellationToken::new()).await;

    assert_eq!(
        outcome,
        Outcome::DeadLettered {
            kind: ErrorKind::Transient,
            retries: 1
        }
    );
    assert_eq!(store.calls(), 1);
    assert_eq!(committer.commits(), vec![42]);
}

#[tokio::test]
async fn dlq_failure_leaves_offset_uncommitted() {
    let store = ScriptedStore::new(|_| {
        Err(anyhow!(
            r#"pq: duplicate key value violates unique constraint "events_pkey""#
        ))
    });
    let dlq = RecordingDlq::failing();
    let committer = RecordingCommitter::new();
    let proc = processor(store.clone(), dlq.clone(), committer.clone(), fast_policy(5));

    let msg = record(br#"{"event_id":"e7","event_type":"click","payload":{}}"#);
    let outcome = proc.handle(&msg, &CancellationToken::new()).await;

    // The record stays uncommitted so it is redelivered and the DLQ write
    // re-attempted; this is the only thing preventing data loss while the
    // dead-letter log is down.
    assert_eq!(outcome, Outcome::Stuck);
    assert_eq!(store.calls(), 1);
    assert!(committer.commits().is_empty());
}

#[tokio::test]
async fn cancellation_during_retry_sleep_abandons_record() {
    let store = ScriptedStore::new(|_| Err(anyhow!("connection refused")));
    let dlq = RecordingDlq::new();
    let committer = RecordingCommitter::new();
    let policy = RetryPolicy {
        max_retries: 5,
        base_delay: Duration::from_secs(5),
        max_delay: Duration::from_secs(5),
        multiplier: 1.0,
        jitter_ratio: 0.0,
    };
    let proc = RecordProcessor::new(store.clone(), dlq.clone(), committer.clone(), policy)
        .with_attempt_timeout(Duration::from_secs(1));

    let cancel = CancellationToken::new();
    let canceller = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        canceller.cancel();
    });

    let start = Instant::now();
    let msg = record(br#"{"event_id":"e9","event_type":"click","payload":{}}"#);
    let outcome = proc.handle(&msg, &cancel).await;

    assert_eq!(outcome, Outcome::Aborted);
    assert!(
        start.elapsed() < Duration::from_secs(2),
        "worker did not exit promptly on cancellation"
    );
    assert_eq!(store.calls(), 1);
    assert!(committer.commits().is_empty());
    assert!(dlq.sent().is_empty());
}

#[tokio::test]
async fn commit_failure_after_persistence_is_not_retried() {
    let store = ScriptedStore::new(|_| Ok(()));
    let dlq = RecordingDlq::new();
    let committer = RecordingCommitter::failing();
    let proc = processor(store.clone(), dlq.clone(), committer.clone(), fast_policy(5));

    let msg = record(br#"{"event_id":"e8","event_type":"click","payload":{}}"#);
    let outcome = proc.handle(&msg, &CancellationToken::new()).await;

    // The event is in the store; a redelivery is absorbed by idempotency.
    assert_eq!(outcome, Outcome::Persisted { attempts: 1 });
    assert_eq!(store.calls(), 1);
    assert!(dlq.sent().is_empty());
}
