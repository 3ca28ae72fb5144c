//! Failure classification: transient vs permanent.
//!
//! Every error the consumer observes is funneled through [`classify`] so the
//! processing loop can decide between another attempt (transient) and
//! dead-letter routing (permanent). Structured driver errors are inspected
//! first; substring matching on the rendered error chain is the fallback for
//! drivers that only surface strings.

use std::error::Error as StdError;
use std::fmt;

use thiserror::Error;

/// Result type for consumer operations.
pub type ConsumerResult<T> = Result<T, ConsumerError>;

/// Errors raised by the consumer machinery itself (as opposed to failures of
/// the record being processed, which are classified via [`classify`]).
#[derive(Debug, Error)]
pub enum ConsumerError {
    /// Kafka client errors (fetch, subscribe, producer construction).
    #[error("kafka error: {0}")]
    Kafka(#[from] rdkafka::error::KafkaError),

    /// Offset commit failed after a terminal decision.
    #[error("offset commit failed: {0}")]
    Commit(#[source] rdkafka::error::KafkaError),

    /// The dead-letter publish did not complete.
    #[error("dlq publish failed: {0}")]
    Dlq(String),

    /// Configuration rejected at startup.
    #[error("configuration error: {0}")]
    Config(String),

    /// Shutdown fired while an operation was suspended.
    #[error("operation cancelled by shutdown")]
    Cancelled,
}

/// The two failure classes that drive the retry decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Worth retrying: broker hiccups, connection resets, timeouts.
    Transient,
    /// Retrying cannot help: malformed input, constraint violations.
    Permanent,
}

impl ErrorKind {
    /// Stable string form used in DLQ envelopes and headers.
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Transient => "transient",
            ErrorKind::Permanent => "permanent",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An error carrying an explicit classification.
///
/// When a `ProcessingError` appears anywhere in a cause chain, [`classify`]
/// honors its declared kind instead of guessing.
#[derive(Debug)]
pub struct ProcessingError {
    /// Declared classification.
    pub kind: ErrorKind,
    /// Human-readable description.
    pub message: String,
    cause: Option<Box<dyn StdError + Send + Sync>>,
}

impl ProcessingError {
    /// A retryable error.
    pub fn transient(message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::Transient,
            message: message.into(),
            cause: None,
        }
    }

    /// A non-retryable error.
    pub fn permanent(message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::Permanent,
            message: message.into(),
            cause: None,
        }
    }

    /// Attach the underlying cause.
    pub fn with_cause(mut self, cause: impl Into<Box<dyn StdError + Send + Sync>>) -> Self {
        self.cause = Some(cause.into());
        self
    }
}

impl fmt::Display for ProcessingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.kind, self.message)?;
        if let Some(cause) = &self.cause {
            write!(f, ": {cause}")?;
        }
        Ok(())
    }
}

impl StdError for ProcessingError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.cause
            .as_ref()
            .map(|c| c.as_ref() as &(dyn StdError + 'static))
    }
}

/// Classify an error as transient or permanent.
///
/// Rules, first match wins:
/// 1. an explicit [`ProcessingError`] anywhere in the chain,
/// 2. structured driver errors (network-flavored IO, Postgres SQLSTATE),
/// 3. substring fallback over the rendered chain,
/// 4. default transient: retrying an unknown error is safer than
///    discarding data, and the retry budget bounds the cost.
pub fn classify(err: &anyhow::Error) -> ErrorKind {
    for cause in err.chain() {
        if let Some(pe) = cause.downcast_ref::<ProcessingError>() {
            return pe.kind;
        }
    }

    for cause in err.chain() {
        if let Some(io_err) = cause.downcast_ref::<std::io::Error>() {
            if is_network_io(io_err.kind()) {
                return ErrorKind::Transient;
            }
        }
        if let Some(db_err) = cause.downcast_ref::<sqlx::Error>() {
            if let Some(kind) = classify_sqlx(db_err) {
                return kind;
            }
        }
    }

    let rendered = format!("{err:#}");
    if rendered.contains("unique constraint")
        || rendered.contains("violates check constraint")
        || rendered.contains("invalid input syntax")
    {
        return ErrorKind::Permanent;
    }
    if rendered.contains("connection refused")
        || rendered.contains("connection reset")
        || rendered.contains("timeout")
        || rendered.contains("too many clients")
    {
        return ErrorKind::Transient;
    }

    ErrorKind::Transient
}

fn is_network_io(kind: std::io::ErrorKind) -> bool {
    use std::io::ErrorKind as IoKind;
    matches!(
        kind,
        IoKind::ConnectionRefused
            | IoKind::ConnectionReset
            | IoKind::ConnectionAborted
            | IoKind::NotConnected
            | IoKind::BrokenPipe
            | IoKind::TimedOut
            | IoKind::UnexpectedEof
    )
}

/// SQLSTATE-based classification; substring matching stays the fallback for
/// errors the driver does not code.
fn classify_sqlx(err: &sqlx::Error) -> Option<ErrorKind> {
    match err {
        sqlx::Error::Database(db) => match db.code().as_deref() {
            // unique_violation, check_violation, invalid_text_representation
            Some("23505") | Some("23514") | Some("22P02") => Some(ErrorKind::Permanent),
            // too_many_connections
            Some("53300") => Some(ErrorKind::Transient),
            _ => None,
        },
        sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed => {
            Some(ErrorKind::Transient)
        }
        _ => None,
    }
}
