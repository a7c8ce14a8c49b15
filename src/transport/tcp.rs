//! TCP stream transport: ordered, connection-oriented, newline-delimited.

use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio_util::codec::{FramedRead, FramedWrite, LinesCodec};

use super::{FrameSink, FrameSource, Transport, TransportConfig, TransportError};

/// Sanity cap on one frame. Control traffic is short lines; anything longer
/// is a corrupt stream.
const MAX_FRAME_LEN: usize = 8 * 1024;

/// Connection-oriented stream transport.
///
/// Frames are lines: the codec strips the delimiter on receive and appends
/// it on send. Reconnection is explicit — the listener calls
/// [`Transport::connect`] again after a failure.
#[derive(Debug, Default)]
pub struct TcpTransport;

impl TcpTransport {
    /// Create the TCP transport factory.
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Transport for TcpTransport {
    async fn connect(
        &mut self,
        config: &TransportConfig,
    ) -> Result<(Box<dyn FrameSink>, Box<dyn FrameSource>), TransportError> {
        let endpoint = config.endpoint();
        let stream = tokio::time::timeout(config.connect_timeout, TcpStream::connect(&endpoint))
            .await
            .map_err(|_| {
                TransportError::ConnectionFailed(format!(
                    "connect to {endpoint} timed out after {:?}",
                    config.connect_timeout
                ))
            })?
            .map_err(|e| TransportError::ConnectionFailed(format!("connect to {endpoint}: {e}")))?;

        // Control frames are small and latency-sensitive.
        let _ = stream.set_nodelay(true);

        let (read, write) = stream.into_split();
        let source = TcpFrameSource {
            frames: FramedRead::new(read, LinesCodec::new_with_max_length(MAX_FRAME_LEN)),
            timeout: config.receive_timeout,
        };
        let sink = TcpFrameSink {
            frames: FramedWrite::new(write, LinesCodec::new()),
        };
        Ok((Box::new(sink), Box::new(source)))
    }
}

#[derive(Debug)]
struct TcpFrameSource {
    frames: FramedRead<OwnedReadHalf, LinesCodec>,
    timeout: Duration,
}

#[async_trait]
impl FrameSource for TcpFrameSource {
    async fn recv_frame(&mut self) -> Result<String, TransportError> {
        match tokio::time::timeout(self.timeout, self.frames.next()).await {
            Err(_) => Err(TransportError::Timeout),
            Ok(None) => Err(TransportError::Disconnected("stream closed by peer".into())),
            Ok(Some(Ok(line))) => Ok(line),
            Ok(Some(Err(e))) => Err(TransportError::Disconnected(e.to_string())),
        }
    }
}

#[derive(Debug)]
struct TcpFrameSink {
    frames: FramedWrite<OwnedWriteHalf, LinesCodec>,
}

#[async_trait]
impl FrameSink for TcpFrameSink {
    async fn send_frame(&mut self, line: &str) -> Result<(), TransportError> {
        self.frames
            .send(line)
            .await
            .map_err(|e| TransportError::SendFailed(e.to_string()))
    }

    async fn close(&mut self) {
        use tokio::io::AsyncWriteExt;
        let _ = self.frames.get_mut().shutdown().await;
    }
}
