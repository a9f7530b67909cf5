use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::EnvelopeError;
use crate::kind::EventKind;
use crate::payload::UpdateEvent;

/// A single typed message exchanged over the update channel.
///
/// This is the unit written to (and read from) one text frame.
///
/// Notes:
/// - **Transient**: envelopes are never stored, retried or replayed.
/// - `sequence` is informational only; nothing reorders or deduplicates on it.
/// - `compressed` is carried as observed; it has no decoding semantics here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateEnvelope {
    #[serde(rename = "type")]
    kind: EventKind,

    #[serde(default)]
    payload: Value,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    sequence: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    compressed: Option<bool>,
}

impl UpdateEnvelope {
    /// Build an envelope from any serializable payload.
    pub fn new(kind: EventKind, payload: impl Serialize) -> Result<Self, EnvelopeError> {
        let payload = serde_json::to_value(payload).map_err(EnvelopeError::Encode)?;
        Ok(Self::from_value(kind, payload))
    }

    pub fn from_value(kind: EventKind, payload: Value) -> Self {
        Self {
            kind,
            payload,
            sequence: None,
            compressed: None,
        }
    }

    pub fn with_sequence(mut self, sequence: u64) -> Self {
        self.sequence = Some(sequence);
        self
    }

    pub fn with_compressed(mut self, compressed: bool) -> Self {
        self.compressed = Some(compressed);
        self
    }

    pub fn kind(&self) -> EventKind {
        self.kind
    }

    pub fn payload(&self) -> &Value {
        &self.payload
    }

    pub fn into_payload(self) -> Value {
        self.payload
    }

    pub fn sequence(&self) -> Option<u64> {
        self.sequence
    }

    /// `true` only when the sender explicitly flagged the payload as compressed.
    pub fn is_compressed(&self) -> bool {
        self.compressed.unwrap_or(false)
    }

    /// Interpret the payload as `T`.
    pub fn decode_payload<T: DeserializeOwned>(&self) -> Result<T, EnvelopeError> {
        T::deserialize(&self.payload).map_err(|e| EnvelopeError::payload(self.kind, e))
    }

    /// Interpret the payload according to the envelope's kind.
    pub fn decode(&self) -> Result<UpdateEvent, EnvelopeError> {
        UpdateEvent::from_envelope(self)
    }

    /// Serialize into the text of a single frame.
    ///
    /// Envelopes of kind [`EventKind::Unknown`] are rejected: writing them
    /// would replace the sender's `type` with `"unknown"`.
    pub fn to_frame(&self) -> Result<String, EnvelopeError> {
        if !self.kind.is_known() {
            return Err(EnvelopeError::UnknownKind);
        }
        serde_json::to_string(self).map_err(EnvelopeError::Encode)
    }

    /// Parse the text of a single frame.
    pub fn from_frame(frame: &str) -> Result<Self, EnvelopeError> {
        serde_json::from_str(frame).map_err(EnvelopeError::Malformed)
    }
}
