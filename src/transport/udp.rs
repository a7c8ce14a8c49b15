//! UDP datagram transport: connectionless, one datagram = one frame.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::net::UdpSocket;

use super::{FrameSink, FrameSource, Transport, TransportConfig, TransportError};

/// Receive buffer size. The Brain keeps frames well under one MTU, but a
/// generous buffer avoids silent truncation of long chat lines.
const MAX_DATAGRAM: usize = 8 * 1024;

/// Connectionless datagram transport.
///
/// "Connect" degrades to binding a local receive point and fixing the Brain
/// as the default peer — the first handshake datagram is what teaches the
/// Brain where to send replies. No ordering or loss guarantees; the decoder
/// and dispatcher are agnostic to both.
#[derive(Debug, Default)]
pub struct UdpTransport;

impl UdpTransport {
    /// Create the UDP transport factory.
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Transport for UdpTransport {
    async fn connect(
        &mut self,
        config: &TransportConfig,
    ) -> Result<(Box<dyn FrameSink>, Box<dyn FrameSource>), TransportError> {
        let endpoint = config.endpoint();
        let socket = UdpSocket::bind("0.0.0.0:0")
            .await
            .map_err(|e| TransportError::ConnectionFailed(format!("bind: {e}")))?;
        // Fixes the peer for send() and filters datagrams from anyone else.
        socket
            .connect(&endpoint)
            .await
            .map_err(|e| TransportError::ConnectionFailed(format!("set peer {endpoint}: {e}")))?;

        let socket = Arc::new(socket);
        let sink = UdpFrameSink {
            socket: Arc::clone(&socket),
        };
        let source = UdpFrameSource {
            socket,
            timeout: config.receive_timeout,
            buf: vec![0u8; MAX_DATAGRAM],
        };
        Ok((Box::new(sink), Box::new(source)))
    }
}

#[derive(Debug)]
struct UdpFrameSource {
    socket: Arc<UdpSocket>,
    timeout: Duration,
    buf: Vec<u8>,
}

#[async_trait]
impl FrameSource for UdpFrameSource {
    async fn recv_frame(&mut self) -> Result<String, TransportError> {
        match tokio::time::timeout(self.timeout, self.socket.recv(&mut self.buf)).await {
            Err(_) => Err(TransportError::Timeout),
            Ok(Err(e)) => Err(TransportError::Disconnected(e.to_string())),
            Ok(Ok(len)) => {
                // Non-UTF-8 bytes degrade lossily; the decoder stays total.
                let text = String::from_utf8_lossy(&self.buf[..len]);
                Ok(text.trim_end_matches(['\r', '\n']).to_string())
            }
        }
    }
}

#[derive(Debug)]
struct UdpFrameSink {
    socket: Arc<UdpSocket>,
}

#[async_trait]
impl FrameSink for UdpFrameSink {
    async fn send_frame(&mut self, line: &str) -> Result<(), TransportError> {
        self.socket
            .send(line.as_bytes())
            .await
            .map(|_| ())
            .map_err(|e| TransportError::SendFailed(e.to_string()))
    }

    async fn close(&mut self) {}
}
