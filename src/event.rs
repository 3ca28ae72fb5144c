//! Event wire format consumed from the source topic.

use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;

use crate::consumer::error::ProcessingError;

/// A single event as carried on the source log.
///
/// Unknown fields are ignored; the payload passes through verbatim and is
/// never inspected.
#[derive(Debug, Serialize, Deserialize)]
pub struct Event {
    /// Content address of the event; the store deduplicates on it.
    #[serde(default)]
    pub event_id: String,
    /// Producer-assigned category, e.g. `click` or `purchase`.
    #[serde(default)]
    pub event_type: String,
    /// Opaque structured blob.
    #[serde(default)]
    pub payload: Option<Box<RawValue>>,
}

impl Event {
    /// Decode a raw record value.
    pub fn decode(raw: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(raw)
    }

    /// Required-field check, evaluated before any store attempt. A failure
    /// here is a poison pill: no retry can fix it.
    pub fn validate(&self) -> Result<(), ProcessingError> {
        if self.event_id.is_empty() || self.event_type.is_empty() {
            return Err(ProcessingError::permanent("missing required fields"));
        }
        Ok(())
    }
}
