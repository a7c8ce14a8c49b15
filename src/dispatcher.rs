//! Event dispatch: decode queued frames and fan out to registered handlers.
//!
//! The dispatcher lives on the consumer side of the bridge. Handlers are
//! registered during setup and the registry is treated as read-only during
//! dispatch, so no locking is involved. A failing handler is logged and
//! skipped — it never takes down the remaining handlers or the remaining
//! frames, and nothing a handler does can reach the transport layer.

use std::collections::HashMap;

use crate::protocol::{decode_line, Event, EventKind, RawFrame};

/// A registered event callback.
///
/// Returning an error is the supported way for a handler to fail; the
/// dispatcher logs it and moves on.
pub type Handler = Box<dyn FnMut(&Event) -> anyhow::Result<()> + Send>;

/// Per-kind ordered handler registry plus dispatch bookkeeping.
#[derive(Default)]
pub struct Dispatcher {
    handlers: HashMap<EventKind, Vec<Handler>>,
    frames_handled: u64,
    acks_seen: u64,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("registered_kinds", &self.handlers.len())
            .field("frames_handled", &self.frames_handled)
            .field("acks_seen", &self.acks_seen)
            .finish()
    }
}

impl Dispatcher {
    /// Create an empty dispatcher.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for an event kind.
    ///
    /// Handlers for a kind run in registration order. Registering for
    /// [`EventKind::Ack`] is accepted but acknowledgments are consumed by
    /// the bridge and never delivered.
    pub fn on(&mut self, kind: EventKind, handler: Handler) {
        self.handlers.entry(kind).or_default().push(handler);
    }

    /// Decode one frame and invoke the handlers for each resulting event.
    pub fn dispatch_frame(&mut self, frame: &RawFrame) {
        self.frames_handled += 1;
        for event in decode_line(&frame.text) {
            self.dispatch_event(&event);
        }
    }

    /// Number of frames this dispatcher has decoded.
    pub fn frames_handled(&self) -> u64 {
        self.frames_handled
    }

    /// Number of acknowledgment frames consumed without dispatch.
    pub fn acks_seen(&self) -> u64 {
        self.acks_seen
    }

    fn dispatch_event(&mut self, event: &Event) {
        // Acknowledgments are bridge-internal liveness signals.
        if matches!(event, Event::Ack) {
            self.acks_seen += 1;
            log::debug!("Brain acknowledged (total {})", self.acks_seen);
            return;
        }

        let kind = event.kind();
        let Some(handlers) = self.handlers.get_mut(&kind) else {
            log::trace!("No handlers for {kind:?}");
            return;
        };

        for (index, handler) in handlers.iter_mut().enumerate() {
            if let Err(e) = handler(event) {
                log::error!("Handler {index} for {kind:?} failed: {e:#}");
            }
        }
    }
}

// ─── Tests ─────────────────────────────────────────────────────────────────
