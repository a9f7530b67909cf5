//! Envelope error model.

use thiserror::Error;

use crate::kind::EventKind;

/// Failure to encode, decode or interpret an [`UpdateEnvelope`](crate::UpdateEnvelope).
///
/// Keep this focused on the envelope itself. Transport failures belong to the
/// channel crate.
#[derive(Debug, Error)]
pub enum EnvelopeError {
    /// A text frame was not a valid envelope (bad JSON or missing `type`).
    #[error("malformed frame: {0}")]
    Malformed(#[source] serde_json::Error),

    /// The envelope could not be serialized.
    #[error("failed to encode envelope: {0}")]
    Encode(#[source] serde_json::Error),

    /// The payload did not match the shape expected for its kind.
    #[error("invalid {kind} payload: {source}")]
    Payload {
        kind: EventKind,
        #[source]
        source: serde_json::Error,
    },

    /// The envelope's kind was not recognized when it was parsed; its original
    /// `type` string is not kept, so it cannot be written back out.
    #[error("cannot encode an envelope of unrecognized kind")]
    UnknownKind,

    /// An identifier was neither a string nor an integer.
    #[error("invalid identifier: {0}")]
    InvalidId(String),
}

impl EnvelopeError {
    pub fn payload(kind: EventKind, source: serde_json::Error) -> Self {
        Self::Payload { kind, source }
    }
}
