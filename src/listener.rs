//! Background listener: the connect→receive→reconnect state machine.
//!
//! The listener is the bridge's only background execution context. It owns
//! the connection exclusively, announces the client with a handshake after
//! every successful connect, and pushes each received frame into the
//! inbound queue. On any connect or receive error it closes the connection,
//! waits a fixed backoff interval, and retries — forever, until the stop
//! signal. Transport failures never escape this loop; the consumer side
//! only ever observes silence plus log output.
//!
//! # State machine
//!
//! ```text
//! Disconnected ──connect attempt──▶ Connecting ──success──▶ Connected
//!       ▲                               ▲                       │
//!       │                               │ backoff elapsed       │ receive error
//!       │                               └────── Retrying ◀──────┘
//!       │
//!   (initial)          any state ──stop signal──▶ Stopped (terminal)
//! ```
//!
//! Shutdown is cooperative: the stop signal is a select branch of both the
//! connected loop and the backoff sleep, and the transport's receive
//! timeout bounds how long a pending receive can defer it.

// Rust guideline compliant 2026-02

use std::sync::{Arc, RwLock};
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};

use crate::protocol::{handshake_frame, RawFrame};
use crate::transport::{FrameSink, FrameSource, Transport, TransportConfig, TransportError};

/// Connection state of the listener, observable from the consumer side.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ConnectionState {
    /// Not yet started connecting.
    #[default]
    Disconnected,
    /// Connection attempt in flight.
    Connecting,
    /// Link up; frames flow.
    Connected,
    /// Waiting out the backoff interval after a failure.
    Retrying {
        /// Consecutive failed attempts since the last successful connect.
        attempt: u32,
    },
    /// Stop signal honored. Terminal.
    Stopped,
}

/// Shared connection state cell — written by the listener, read anywhere.
#[derive(Debug, Default)]
pub struct SharedConnectionState {
    state: RwLock<ConnectionState>,
}

impl SharedConnectionState {
    /// Create new shared state.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Get the current state.
    pub fn get(&self) -> ConnectionState {
        self.state.read().expect("state lock poisoned").clone()
    }

    /// Check if connected.
    pub fn is_connected(&self) -> bool {
        matches!(self.get(), ConnectionState::Connected)
    }

    fn set(&self, new_state: ConnectionState) {
        *self.state.write().expect("state lock poisoned") = new_state;
    }
}

/// Everything the connection loop owns for its lifetime.
pub(crate) struct ListenerContext {
    /// Connection factory for the configured channel flavor.
    pub transport: Box<dyn Transport>,
    /// Endpoint and timeouts, fixed at startup.
    pub transport_config: TransportConfig,
    /// Name announced in the handshake frame.
    pub client_name: String,
    /// Fixed wait between reconnect attempts.
    pub reconnect_delay: Duration,
    /// Handshake resend period; zero disables the heartbeat.
    pub heartbeat_interval: Duration,
    /// State cell shared with the consumer side.
    pub state: Arc<SharedConnectionState>,
    /// Inbound queue producer. The listener is the sole producer.
    pub frame_tx: mpsc::UnboundedSender<RawFrame>,
    /// Outbound frames queued by the consumer side.
    pub send_rx: mpsc::UnboundedReceiver<String>,
    /// Stop signal from the bridge.
    pub shutdown_rx: oneshot::Receiver<()>,
}

impl std::fmt::Debug for ListenerContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenerContext")
            .field("endpoint", &self.transport_config.endpoint())
            .field("client_name", &self.client_name)
            .finish_non_exhaustive()
    }
}

/// Why the connected loop handed control back.
#[derive(Debug, PartialEq, Eq)]
enum LoopExit {
    /// Stop signal observed — leave the reconnection loop for good.
    Shutdown,
    /// Receive path failed — close and retry.
    ConnectionLost,
}

/// Run the connection loop with automatic reconnection.
///
/// Runs until the stop signal fires, then parks the state at
/// [`ConnectionState::Stopped`].
pub(crate) async fn run_connection_loop(mut ctx: ListenerContext) {
    let endpoint = ctx.transport_config.endpoint();
    let mut attempt: u32 = 0;

    loop {
        if shutdown_signaled(&mut ctx.shutdown_rx) {
            log::info!("Listener shutdown requested");
            break;
        }

        ctx.state.set(ConnectionState::Connecting);

        match ctx.transport.connect(&ctx.transport_config).await {
            Ok((mut sink, mut source)) => {
                log::info!("Connected to brain at {endpoint}");
                ctx.state.set(ConnectionState::Connected);
                attempt = 0;

                // Announce ourselves. For datagrams this is also what
                // teaches the Brain our return address.
                if let Err(e) = sink.send_frame(&handshake_frame(&ctx.client_name)).await {
                    log::warn!("Handshake send failed: {e}");
                }

                let exit = run_connected(
                    sink.as_mut(),
                    source.as_mut(),
                    &ctx.frame_tx,
                    &mut ctx.send_rx,
                    &mut ctx.shutdown_rx,
                    &ctx.client_name,
                    ctx.heartbeat_interval,
                )
                .await;

                sink.close().await;

                if exit == LoopExit::Shutdown {
                    log::info!("Shutdown requested, exiting reconnection loop");
                    break;
                }

                log::warn!("Disconnected from brain at {endpoint}");
            }
            Err(e) => {
                log::warn!("Failed to connect to brain at {endpoint}: {e}");
            }
        }

        attempt = attempt.saturating_add(1);
        ctx.state.set(ConnectionState::Retrying { attempt });
        log::info!(
            "Reconnecting to {endpoint} in {:.1}s (attempt {attempt})...",
            ctx.reconnect_delay.as_secs_f32()
        );

        tokio::select! {
            () = tokio::time::sleep(ctx.reconnect_delay) => {}
            _ = &mut ctx.shutdown_rx => {
                log::info!("Listener shutdown during reconnect backoff");
                break;
            }
        }
    }

    ctx.state.set(ConnectionState::Stopped);
    log::info!("Listener stopped");
}

/// Run the connected loop until disconnect or shutdown.
///
/// Multiplexes the receive path, the outbound send queue, the heartbeat
/// interval, and the stop signal. Receive timeouts are benign wakeups; any
/// other receive error hands control back for a reconnect.
async fn run_connected(
    sink: &mut dyn FrameSink,
    source: &mut dyn FrameSource,
    frame_tx: &mpsc::UnboundedSender<RawFrame>,
    send_rx: &mut mpsc::UnboundedReceiver<String>,
    shutdown_rx: &mut oneshot::Receiver<()>,
    client_name: &str,
    heartbeat_interval: Duration,
) -> LoopExit {
    let heartbeat_enabled = !heartbeat_interval.is_zero();
    // A dummy period keeps the select arm well-formed when disabled.
    let period = if heartbeat_enabled {
        heartbeat_interval
    } else {
        Duration::from_secs(3600)
    };
    let mut heartbeat =
        tokio::time::interval_at(tokio::time::Instant::now() + period, period);

    loop {
        tokio::select! {
            // Receive path. The transport-level timeout keeps a silent link
            // from pinning this branch forever.
            result = source.recv_frame() => match result {
                Ok(line) => {
                    log::trace!("Frame received: {line:?}");
                    if frame_tx.send(RawFrame::new(line)).is_err() {
                        log::warn!("Inbound queue closed, stopping listener");
                        return LoopExit::Shutdown;
                    }
                }
                Err(TransportError::Timeout) => {
                    // Quiet link; loop back around.
                }
                Err(e) => {
                    log::warn!("Receive failed: {e}");
                    return LoopExit::ConnectionLost;
                }
            },

            // Outbound frames queued by the consumer side.
            queued = send_rx.recv() => match queued {
                Some(line) => {
                    if let Err(e) = sink.send_frame(&line).await {
                        log::warn!("Send failed: {e}");
                    }
                }
                None => {
                    // Send queue owner dropped — the bridge is going away.
                    return LoopExit::Shutdown;
                }
            },

            // Liveness signal; also keeps datagram NAT mappings alive.
            _ = heartbeat.tick(), if heartbeat_enabled => {
                log::debug!("Heartbeat to brain");
                if let Err(e) = sink.send_frame(&handshake_frame(client_name)).await {
                    log::warn!("Heartbeat send failed: {e}");
                }
            }

            _ = &mut *shutdown_rx => {
                log::info!("Shutdown signal received");
                return LoopExit::Shutdown;
            }
        }
    }
}

/// Non-blocking check of the stop signal between connection attempts.
///
/// A dropped sender counts as a stop: the bridge that owned this listener
/// is gone.
fn shutdown_signaled(shutdown_rx: &mut oneshot::Receiver<()>) -> bool {
    !matches!(
        shutdown_rx.try_recv(),
        Err(oneshot::error::TryRecvError::Empty)
    )
}

// ─── Tests ─────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;

    /// Transport whose connects always fail, counting the attempts.
    struct FailingTransport {
        attempts: Arc<AtomicU32>,
    }

    #[async_trait]
    impl Transport for FailingTransport {
        async fn connect(
            &mut self,
            _config: &TransportConfig,
        ) -> Result<(Box<dyn FrameSink>, Box<dyn FrameSource>), TransportError> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            Err(TransportError::ConnectionFailed("refused".into()))
        }
    }

    /// Sink that records every sent frame.
    struct RecordingSink {
        sent: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl FrameSink for RecordingSink {
        async fn send_frame(&mut self, line: &str) -> Result<(), TransportError> {
            self.sent.lock().unwrap().push(line.to_string());
            Ok(())
        }

        async fn close(&mut self) {}
    }

    /// Source that yields scripted lines, then fails.
    struct ScriptedSource {
        lines: VecDeque<String>,
    }

    #[async_trait]
    impl FrameSource for ScriptedSource {
        async fn recv_frame(&mut self) -> Result<String, TransportError> {
            match self.lines.pop_front() {
                Some(line) => Ok(line),
                None => Err(TransportError::Disconnected("script exhausted".into())),
            }
        }
    }

    /// Connects successfully, serving scripted lines per connection.
    struct ScriptedTransport {
        connects: Arc<AtomicU32>,
        lines: Vec<String>,
        sent: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        async fn connect(
            &mut self,
            _config: &TransportConfig,
        ) -> Result<(Box<dyn FrameSink>, Box<dyn FrameSource>), TransportError> {
            self.connects.fetch_add(1, Ordering::SeqCst);
            Ok((
                Box::new(RecordingSink {
                    sent: Arc::clone(&self.sent),
                }),
                Box::new(ScriptedSource {
                    lines: self.lines.clone().into(),
                }),
            ))
        }
    }

    fn test_transport_config() -> TransportConfig {
        TransportConfig {
            host: "127.0.0.1".to_string(),
            port: 9,
            connect_timeout: Duration::from_millis(100),
            receive_timeout: Duration::from_millis(50),
        }
    }

    struct Harness {
        frame_rx: mpsc::UnboundedReceiver<RawFrame>,
        send_tx: mpsc::UnboundedSender<String>,
        shutdown_tx: oneshot::Sender<()>,
        state: Arc<SharedConnectionState>,
        task: tokio::task::JoinHandle<()>,
    }

    fn spawn_listener(transport: Box<dyn Transport>, reconnect_delay: Duration) -> Harness {
        let (frame_tx, frame_rx) = mpsc::unbounded_channel();
        let (send_tx, send_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let state = SharedConnectionState::new();

        let ctx = ListenerContext {
            transport,
            transport_config: test_transport_config(),
            client_name: "test-body".to_string(),
            reconnect_delay,
            heartbeat_interval: Duration::ZERO,
            state: Arc::clone(&state),
            frame_tx,
            send_rx,
            shutdown_rx,
        };

        let task = tokio::spawn(run_connection_loop(ctx));
        Harness {
            frame_rx,
            send_tx,
            shutdown_tx,
            state,
            task,
        }
    }

    #[tokio::test]
    async fn retries_forever_on_connect_failure() {
        let attempts = Arc::new(AtomicU32::new(0));
        let transport = FailingTransport {
            attempts: Arc::clone(&attempts),
        };
        let harness = spawn_listener(Box::new(transport), Duration::from_millis(20));

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert!(
            attempts.load(Ordering::SeqCst) >= 3,
            "expected repeated reconnect attempts, got {}",
            attempts.load(Ordering::SeqCst)
        );
        assert!(!harness.task.is_finished(), "listener must never exit on its own");

        let _ = harness.shutdown_tx.send(());
        tokio::time::timeout(Duration::from_secs(1), harness.task)
            .await
            .expect("listener did not stop")
            .unwrap();
        assert_eq!(harness.state.get(), ConnectionState::Stopped);
    }

    #[tokio::test]
    async fn stop_interrupts_backoff_sleep() {
        let attempts = Arc::new(AtomicU32::new(0));
        let transport = FailingTransport {
            attempts: Arc::clone(&attempts),
        };
        // Long backoff: exit latency must come from the stop signal, not
        // the sleep elapsing.
        let harness = spawn_listener(Box::new(transport), Duration::from_secs(30));

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(matches!(
            harness.state.get(),
            ConnectionState::Retrying { .. }
        ));

        let _ = harness.shutdown_tx.send(());
        tokio::time::timeout(Duration::from_millis(500), harness.task)
            .await
            .expect("stop signal did not interrupt backoff")
            .unwrap();
        assert_eq!(harness.state.get(), ConnectionState::Stopped);
    }

    #[tokio::test]
    async fn frames_flow_in_order_and_disconnect_triggers_reconnect() {
        let connects = Arc::new(AtomicU32::new(0));
        let sent = Arc::new(Mutex::new(Vec::new()));
        let transport = ScriptedTransport {
            connects: Arc::clone(&connects),
            lines: vec!["first".to_string(), "second".to_string(), "third".to_string()],
            sent: Arc::clone(&sent),
        };
        let mut harness = spawn_listener(Box::new(transport), Duration::from_millis(20));

        let mut received = Vec::new();
        while received.len() < 3 {
            let frame = tokio::time::timeout(Duration::from_secs(1), harness.frame_rx.recv())
                .await
                .expect("frames did not arrive")
                .expect("queue closed");
            received.push(frame.text);
        }
        assert_eq!(received, ["first", "second", "third"]);

        // The scripted source then disconnects; the listener must reconnect.
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(connects.load(Ordering::SeqCst) >= 2, "no reconnect after disconnect");

        // Every connection starts with the handshake.
        assert_eq!(sent.lock().unwrap()[0], "test-body Connected");

        let _ = harness.shutdown_tx.send(());
    }

    #[tokio::test]
    async fn heartbeat_resends_handshake_while_connected() {
        let sent = Arc::new(Mutex::new(Vec::new()));
        struct IdleSource;
        #[async_trait]
        impl FrameSource for IdleSource {
            async fn recv_frame(&mut self) -> Result<String, TransportError> {
                tokio::time::sleep(Duration::from_millis(10)).await;
                Err(TransportError::Timeout)
            }
        }
        struct IdleTransport {
            sent: Arc<Mutex<Vec<String>>>,
        }
        #[async_trait]
        impl Transport for IdleTransport {
            async fn connect(
                &mut self,
                _config: &TransportConfig,
            ) -> Result<(Box<dyn FrameSink>, Box<dyn FrameSource>), TransportError> {
                Ok((
                    Box::new(RecordingSink {
                        sent: Arc::clone(&self.sent),
                    }),
                    Box::new(IdleSource),
                ))
            }
        }

        let (frame_tx, _frame_rx) = mpsc::unbounded_channel();
        let (_send_tx, send_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let ctx = ListenerContext {
            transport: Box::new(IdleTransport {
                sent: Arc::clone(&sent),
            }),
            transport_config: test_transport_config(),
            client_name: "test-body".to_string(),
            reconnect_delay: Duration::from_millis(20),
            heartbeat_interval: Duration::from_millis(30),
            state: SharedConnectionState::new(),
            frame_tx,
            send_rx,
            shutdown_rx,
        };
        let task = tokio::spawn(run_connection_loop(ctx));

        tokio::time::sleep(Duration::from_millis(150)).await;
        let _ = shutdown_tx.send(());
        tokio::time::timeout(Duration::from_millis(500), task)
            .await
            .expect("listener did not stop")
            .unwrap();

        // One handshake on connect plus periodic resends.
        let sent = sent.lock().unwrap();
        assert!(
            sent.len() >= 3,
            "expected handshake plus heartbeats, got {sent:?}"
        );
        assert!(sent.iter().all(|frame| frame == "test-body Connected"));
    }

    #[tokio::test]
    async fn outbound_frames_are_sent_while_connected() {
        let sent = Arc::new(Mutex::new(Vec::new()));
        // Endless timeouts keep the connection up without traffic.
        struct QuietSource;
        #[async_trait]
        impl FrameSource for QuietSource {
            async fn recv_frame(&mut self) -> Result<String, TransportError> {
                tokio::time::sleep(Duration::from_millis(10)).await;
                Err(TransportError::Timeout)
            }
        }
        struct QuietTransport {
            sent: Arc<Mutex<Vec<String>>>,
        }
        #[async_trait]
        impl Transport for QuietTransport {
            async fn connect(
                &mut self,
                _config: &TransportConfig,
            ) -> Result<(Box<dyn FrameSink>, Box<dyn FrameSource>), TransportError> {
                Ok((
                    Box::new(RecordingSink {
                        sent: Arc::clone(&self.sent),
                    }),
                    Box::new(QuietSource),
                ))
            }
        }

        let transport = QuietTransport {
            sent: Arc::clone(&sent),
        };
        let harness = spawn_listener(Box::new(transport), Duration::from_millis(20));

        // Wait for the connection, then queue a chat frame from "outside".
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(harness.state.is_connected());
        harness.send_tx.send("hello brain".to_string()).unwrap();

        tokio::time::sleep(Duration::from_millis(50)).await;
        {
            let sent = sent.lock().unwrap();
            assert_eq!(sent[0], "test-body Connected");
            assert!(sent.contains(&"hello brain".to_string()));
        }

        let _ = harness.shutdown_tx.send(());
        tokio::time::timeout(Duration::from_millis(500), harness.task)
            .await
            .expect("listener did not stop")
            .unwrap();
    }
}
