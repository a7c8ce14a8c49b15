//! Transport abstraction for the Brain control channel.
//!
//! This module provides a unified [`Transport`] trait over the two channel
//! flavors the Brain can speak:
//!
//! ```text
//! Transport (trait)
//!     │
//!     ├── TcpTransport  — connection-oriented stream, newline-delimited frames
//!     │
//!     └── UdpTransport  — connectionless datagrams, one datagram = one frame
//! ```
//!
//! Connecting yields a split connection: a [`FrameSink`] for the send path
//! and a [`FrameSource`] for the receive path, independently usable so the
//! listener can multiplex sends against a pending receive. Receives are
//! bounded by the configured timeout so a stop signal is observed even when
//! the Brain goes quiet.

pub mod tcp;
pub mod udp;

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use tcp::TcpTransport;
pub use udp::UdpTransport;

/// Which channel flavor to use for the Brain link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// Connection-oriented stream, frames delimited by line breaks.
    Tcp,
    /// Connectionless datagrams, one frame per datagram.
    Udp,
}

impl std::fmt::Display for TransportKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Tcp => f.write_str("tcp"),
            Self::Udp => f.write_str("udp"),
        }
    }
}

/// Connection parameters, fixed at startup.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Brain host name or address.
    pub host: String,
    /// Brain port.
    pub port: u16,
    /// Upper bound on connection establishment.
    pub connect_timeout: Duration,
    /// Upper bound on a single blocking receive. Bounds how long a stop
    /// signal can go unobserved, so keep it in seconds, not minutes.
    pub receive_timeout: Duration,
}

impl TransportConfig {
    /// `host:port` form used for socket addresses and log lines.
    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Errors that can occur during transport operations.
#[derive(Debug)]
pub enum TransportError {
    /// Failed to establish the connection.
    ConnectionFailed(String),
    /// The connection dropped or the peer closed it.
    Disconnected(String),
    /// No frame arrived within the receive timeout. Benign: the caller is
    /// expected to loop, checking its stop signal.
    Timeout,
    /// Failed to send a frame.
    SendFailed(String),
    /// The bridge has been stopped; no further sends are possible.
    Closed,
}

impl std::fmt::Display for TransportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ConnectionFailed(msg) => write!(f, "Connection failed: {msg}"),
            Self::Disconnected(msg) => write!(f, "Disconnected: {msg}"),
            Self::Timeout => write!(f, "Receive timed out"),
            Self::SendFailed(msg) => write!(f, "Send failed: {msg}"),
            Self::Closed => write!(f, "Bridge stopped"),
        }
    }
}

impl std::error::Error for TransportError {}

/// Receive half of an established connection.
#[async_trait]
pub trait FrameSource: Send {
    /// Receive the next frame, waiting at most the configured receive
    /// timeout.
    ///
    /// # Errors
    ///
    /// [`TransportError::Timeout`] when no frame arrived in time (benign),
    /// [`TransportError::Disconnected`] when the channel is gone and the
    /// caller should reconnect.
    async fn recv_frame(&mut self) -> Result<String, TransportError>;
}

/// Send half of an established connection.
#[async_trait]
pub trait FrameSink: Send {
    /// Send one frame. The frame delimiter is appended by the transport.
    ///
    /// # Errors
    ///
    /// [`TransportError::SendFailed`] when the write fails; the connection
    /// should be considered suspect but the receive path decides liveness.
    async fn send_frame(&mut self, line: &str) -> Result<(), TransportError>;

    /// Close the send path. Receive teardown happens when the source drops.
    async fn close(&mut self);
}

/// A factory for connections to the Brain.
///
/// Exactly one connection is active per listener at any time; the listener
/// reconnects through the same transport after a failure.
#[async_trait]
pub trait Transport: Send {
    /// Establish a connection, returning the split send/receive halves.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::ConnectionFailed`] when the endpoint is
    /// unreachable; the listener maps this to its retry state.
    async fn connect(
        &mut self,
        config: &TransportConfig,
    ) -> Result<(Box<dyn FrameSink>, Box<dyn FrameSource>), TransportError>;
}

/// Build the transport for the configured channel flavor.
pub fn build(kind: TransportKind) -> Box<dyn Transport> {
    match kind {
        TransportKind::Tcp => Box::new(TcpTransport::new()),
        TransportKind::Udp => Box::new(UdpTransport::new()),
    }
}
