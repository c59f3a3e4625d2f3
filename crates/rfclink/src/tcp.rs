//! # TCP Transport
//!
//! Frames travel as `[Len:4 LE][Payload]` over a single TCP stream per
//! session. The first hop is derived from the connection parameters: a
//! router if one is configured, otherwise the application or message server.

use tokio::io::AsyncRead;
use tokio::io::AsyncReadExt;
use tokio::io::AsyncWrite;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tracing::debug;

use crate::config::ConnectionConfig;
use crate::transport::Connector;
use crate::transport::Result;
use crate::transport::Transport;
use crate::transport::TransportError;

/// Frames larger than this are refused in both directions.
pub const MAX_FRAME_LEN: usize = 64 * 1024 * 1024;

/// Writes one length-prefixed frame.
pub async fn write_frame<W>(io: &mut W, payload: &[u8]) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    if payload.len() > MAX_FRAME_LEN {
        return Err(TransportError::PayloadTooLarge(payload.len()));
    }
    io.write_all(&(payload.len() as u32).to_le_bytes()).await?;
    io.write_all(payload).await?;
    io.flush().await?;
    Ok(())
}

/// Reads one length-prefixed frame.
pub async fn read_frame<R>(io: &mut R) -> Result<Vec<u8>>
where
    R: AsyncRead + Unpin,
{
    let mut len = [0u8; 4];
    io.read_exact(&mut len).await?;
    let len = u32::from_le_bytes(len) as usize;
    if len > MAX_FRAME_LEN {
        return Err(TransportError::PayloadTooLarge(len));
    }
    let mut buf = vec![0u8; len];
    io.read_exact(&mut buf).await?;
    Ok(buf)
}

/// One TCP stream carrying one session.
pub struct TcpTransport {
    stream: Mutex<TcpStream>,
}

impl TcpTransport {
    pub fn new(stream: TcpStream) -> Self {
        Self { stream: Mutex::new(stream) }
    }
}

#[async_trait::async_trait]
impl Transport for TcpTransport {
    async fn call(&self, payload: &[u8]) -> Result<Vec<u8>> {
        let mut stream = self.stream.lock().await;
        write_frame(&mut *stream, payload).await?;
        read_frame(&mut *stream).await
    }
}

/// Connects to the first hop named by the connection parameters.
#[derive(Debug, Default, Clone, Copy)]
pub struct TcpConnector;

#[async_trait::async_trait]
impl Connector for TcpConnector {
    async fn connect(&self, config: &ConnectionConfig) -> Result<Box<dyn Transport>> {
        let (host, port) = config
            .endpoint()
            .and_then(|e| e.first_hop())
            .map_err(|e| TransportError::InvalidEndpoint(e.info().message.clone()))?;

        debug!("connecting to {}:{}", host, port);
        let stream = TcpStream::connect((host.as_str(), port)).await?;
        stream.set_nodelay(true)?;
        Ok(Box::new(TcpTransport::new(stream)))
    }
}
