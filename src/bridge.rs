//! Bridge - the host-facing facade over listener, queue, and dispatcher.
//!
//! The bridge owns its tokio runtime and runs the listener as a task on it;
//! the host stays synchronous and calls [`Bridge::tick`] once per frame of
//! its own loop. Exactly two execution contexts exist per bridge: the
//! listener task (sole producer into the inbound queue) and the host tick
//! (sole consumer, drains to empty and returns promptly).
//!
//! # Usage
//!
//! ```ignore
//! let mut bridge = Bridge::new(config)?;
//! bridge.on(EventKind::Emotion, Box::new(|event| { /* ... */ Ok(()) }));
//! loop {
//!     bridge.tick();          // drain + dispatch, non-blocking
//!     // render, sleep, etc.
//! }
//! bridge.shutdown();
//! ```

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};

use crate::config::BridgeConfig;
use crate::dispatcher::{Dispatcher, Handler};
use crate::listener::{run_connection_loop, ConnectionState, ListenerContext, SharedConnectionState};
use crate::protocol::{EventKind, RawFrame};
use crate::transport::{self, Transport, TransportError};

/// Upper bound on waiting for the listener to honor the stop signal. Covers
/// one receive timeout plus one backoff sleep with room to spare.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Cloneable handle for sending chat frames to the Brain.
///
/// Usable from the consumer side (or anywhere else) concurrently with the
/// listener's receive loop — sends are queued to the connection loop, which
/// multiplexes them against the pending receive.
#[derive(Debug, Clone)]
pub struct ChatSender {
    send_tx: mpsc::UnboundedSender<String>,
}

impl ChatSender {
    /// Queue one chat frame for transmission.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Closed`] once the bridge has stopped.
    /// Frames queued during an outage are transmitted after reconnect.
    pub fn send_chat(&self, text: &str) -> Result<(), TransportError> {
        self.send_tx
            .send(text.to_string())
            .map_err(|_| TransportError::Closed)
    }
}

/// The control-plane bridge between a Brain process and this Body process.
pub struct Bridge {
    dispatcher: Dispatcher,
    frame_rx: mpsc::UnboundedReceiver<RawFrame>,
    sender: ChatSender,
    state: Arc<SharedConnectionState>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    listener: Option<tokio::task::JoinHandle<()>>,
    runtime: tokio::runtime::Runtime,
}

impl std::fmt::Debug for Bridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bridge")
            .field("state", &self.state.get())
            .field("dispatcher", &self.dispatcher)
            .finish_non_exhaustive()
    }
}

impl Bridge {
    /// Construct a bridge and start its listener for the configured
    /// transport.
    pub fn new(config: &BridgeConfig) -> anyhow::Result<Self> {
        let transport = transport::build(config.transport);
        Self::with_transport(config, transport)
    }

    /// Construct a bridge over an explicit transport.
    ///
    /// The injection seam: tests and embedders can supply their own
    /// [`Transport`] implementation.
    pub fn with_transport(
        config: &BridgeConfig,
        transport: Box<dyn Transport>,
    ) -> anyhow::Result<Self> {
        let runtime = tokio::runtime::Runtime::new()?;

        let (frame_tx, frame_rx) = mpsc::unbounded_channel();
        let (send_tx, send_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let state = SharedConnectionState::new();

        let ctx = ListenerContext {
            transport,
            transport_config: config.transport_config(),
            client_name: config.client_name.clone(),
            reconnect_delay: config.reconnect_delay(),
            heartbeat_interval: config.heartbeat_interval(),
            state: Arc::clone(&state),
            frame_tx,
            send_rx,
            shutdown_rx,
        };

        let listener = runtime.spawn(run_connection_loop(ctx));
        log::info!(
            "Bridge started: {} to {}:{}",
            config.transport,
            config.host,
            config.port
        );

        Ok(Self {
            dispatcher: Dispatcher::new(),
            frame_rx,
            sender: ChatSender { send_tx },
            state,
            shutdown_tx: Some(shutdown_tx),
            listener: Some(listener),
            runtime,
        })
    }

    /// Register a handler for an event kind. Setup-time operation on the
    /// consumer side; handlers for a kind run in registration order.
    pub fn on(&mut self, kind: EventKind, handler: Handler) {
        self.dispatcher.on(kind, handler);
    }

    /// Drain the inbound queue to empty, decoding and dispatching every
    /// queued frame. Non-blocking; call once per host tick.
    ///
    /// Draining to empty (rather than popping once) keeps the backlog
    /// bounded when the host ticks slower than frames arrive.
    pub fn tick(&mut self) -> usize {
        let mut handled = 0;
        while let Ok(frame) = self.frame_rx.try_recv() {
            self.dispatcher.dispatch_frame(&frame);
            handled += 1;
        }
        handled
    }

    /// Queue one chat frame for transmission to the Brain.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Closed`] once the bridge has stopped.
    pub fn send_chat(&self, text: &str) -> Result<(), TransportError> {
        self.sender.send_chat(text)
    }

    /// A cloneable send handle, independent of the bridge's lifetime
    /// borrows.
    pub fn sender(&self) -> ChatSender {
        self.sender.clone()
    }

    /// Current connection state as last published by the listener.
    pub fn state(&self) -> ConnectionState {
        self.state.get()
    }

    /// Whether the listener currently holds a live connection.
    pub fn is_connected(&self) -> bool {
        self.state.is_connected()
    }

    /// Total frames decoded so far.
    pub fn frames_handled(&self) -> u64 {
        self.dispatcher.frames_handled()
    }

    /// Signal the listener to stop and wait (bounded) for it to finish.
    ///
    /// Idempotent; also invoked on drop.
    pub fn shutdown(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            log::info!("Stopping bridge...");
            let _ = tx.send(());
        }
        if let Some(task) = self.listener.take() {
            let result = self
                .runtime
                .block_on(async { tokio::time::timeout(SHUTDOWN_GRACE, task).await });
            if result.is_err() {
                log::warn!("Listener did not stop within {SHUTDOWN_GRACE:?}");
            }
        }
    }
}

impl Drop for Bridge {
    fn drop(&mut self) {
        self.shutdown();
    }
}

// ─── Tests ─────────────────────────────────────────────────────────────────
