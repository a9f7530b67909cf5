//! Frame → handler dispatch.

use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use stockwatch_events::{EventKind, UpdateEnvelope};

/// Receives envelopes of the kind it was registered for.
///
/// Handlers run on the channel's driver task, one frame at a time; a handler
/// returns before the next frame of the same connection is dispatched.
pub trait EnvelopeHandler: Send + Sync + 'static {
    fn handle(&self, envelope: &UpdateEnvelope);
}

impl<F> EnvelopeHandler for F
where
    F: Fn(&UpdateEnvelope) + Send + Sync + 'static,
{
    fn handle(&self, envelope: &UpdateEnvelope) {
        self(envelope)
    }
}

/// What happened to a single frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    Handled(EventKind),
    /// Parsed, but nothing is registered for this kind.
    Unhandled(EventKind),
    /// Not an envelope; dropped.
    Malformed,
    /// The handler panicked. The frame is lost; the connection is not.
    Failed(EventKind),
}

/// Kind → handler registry. At most one handler per kind.
#[derive(Clone, Default)]
pub struct Dispatcher {
    handlers: HashMap<EventKind, Arc<dyn EnvelopeHandler>>,
}

impl core::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let mut kinds: Vec<&'static str> = self.handlers.keys().map(|k| k.as_str()).collect();
        kinds.sort_unstable();
        f.debug_struct("Dispatcher").field("kinds", &kinds).finish()
    }
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for `kind`, replacing any previous one.
    pub fn register(&mut self, kind: EventKind, handler: impl EnvelopeHandler) {
        if self.handlers.insert(kind, Arc::new(handler)).is_some() {
            tracing::debug!("Replaced handler for {}", kind);
        }
    }

    pub fn has_handler(&self, kind: EventKind) -> bool {
        kind.is_known() && self.handlers.contains_key(&kind)
    }

    /// Parse one text frame and route it.
    ///
    /// Never panics on bad input: a malformed frame is logged and dropped.
    pub fn dispatch_frame(&self, frame: &str) -> DispatchOutcome {
        match UpdateEnvelope::from_frame(frame) {
            Ok(envelope) => self.dispatch(&envelope),
            Err(e) => {
                tracing::warn!("Dropping malformed frame ({} bytes): {}", frame.len(), e);
                DispatchOutcome::Malformed
            }
        }
    }

    pub fn dispatch(&self, envelope: &UpdateEnvelope) -> DispatchOutcome {
        let kind = envelope.kind();
        // Unknown kinds never reach a handler, even one registered for `Unknown`.
        let handler = match kind {
            EventKind::Unknown => None,
            _ => self.handlers.get(&kind),
        };

        match handler {
            Some(handler) => match catch_unwind(AssertUnwindSafe(|| handler.handle(envelope))) {
                Ok(()) => DispatchOutcome::Handled(kind),
                Err(panic) => {
                    tracing::error!("Handler for {} envelope panicked: {}", kind, panic_message(&*panic));
                    DispatchOutcome::Failed(kind)
                }
            },
            None => {
                tracing::debug!("No handler for {} envelope", kind);
                DispatchOutcome::Unhandled(kind)
            }
        }
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> &str {
    if let Some(s) = panic.downcast_ref::<&'static str>() {
        *s
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.as_str()
    } else {
        "non-string panic payload"
    }
}
