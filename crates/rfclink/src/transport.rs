//! # Transport Abstraction
//!
//! A minimal, async interface for moving request frames to a remote system.
//!
//! ## Philosophy
//!
//! - **Byte-Oriented**: A Transport knows nothing about signatures or records.
//!   It moves opaque, already-encoded frames.
//! - **Request-Response**: One request payload in, one reply payload out. The
//!   session layer above serialises exchanges, so a transport never sees two
//!   calls at once on the same session.
//! - **Pluggable**: A `Connector` builds a Transport from resolved connection
//!   parameters. The TCP connector and the in-process mock are both just
//!   connectors.

use rfcwire::ErrorGroup;
use rfcwire::ErrorInfo;
use rfcwire::ReturnCode;

use crate::config::ConnectionConfig;

/// Errors that occur at the network/transport layer.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// The peer is unreachable or the connection was dropped.
    #[error("Connection lost: {0}")]
    ConnectionLost(String),
    /// The operation timed out before a response was received.
    #[error("Request timed out")]
    Timeout,
    /// The frame exceeds what the transport is willing to carry.
    #[error("Payload too large for transport ({0} bytes)")]
    PayloadTooLarge(usize),
    /// The connection parameters do not name a reachable endpoint.
    #[error("Invalid endpoint: {0}")]
    InvalidEndpoint(String),
    /// Generic I/O error or internal transport failure.
    #[error("I/O error: {0}")]
    Io(String),
}

impl TransportError {
    /// The diagnostic record reported to callers for this failure.
    pub fn info(&self) -> ErrorInfo {
        let code = match self {
            TransportError::Timeout => ReturnCode::Timeout,
            TransportError::InvalidEndpoint(_) => ReturnCode::InvalidParameter,
            TransportError::PayloadTooLarge(_) => ReturnCode::BufferTooSmall,
            TransportError::ConnectionLost(_) | TransportError::Io(_) => ReturnCode::CommunicationFailure,
        };
        let group = match self {
            TransportError::InvalidEndpoint(_) => ErrorGroup::ExternalRuntimeFailure,
            _ => ErrorGroup::CommunicationFailure,
        };
        ErrorInfo::new(code, group, self.to_string())
    }
}

impl From<std::io::Error> for TransportError {
    fn from(e: std::io::Error) -> Self {
        use std::io::ErrorKind;
        match e.kind() {
            ErrorKind::ConnectionRefused
            | ErrorKind::ConnectionReset
            | ErrorKind::ConnectionAborted
            | ErrorKind::BrokenPipe
            | ErrorKind::UnexpectedEof
            | ErrorKind::NotConnected => TransportError::ConnectionLost(e.to_string()),
            ErrorKind::TimedOut => TransportError::Timeout,
            _ => TransportError::Io(e.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, TransportError>;

/// A mechanism to send a request frame and receive its reply.
///
/// This trait is designed to be object-safe (`Box<dyn Transport>`).
#[async_trait::async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Sends a payload and waits for the reply.
    ///
    /// # invariants
    /// - Must return `Ok(vec)` with the raw reply bytes on success.
    /// - Must return `Err` if the network fails.
    /// - Should not interpret the payload content.
    async fn call(&self, payload: &[u8]) -> Result<Vec<u8>>;
}

/// Establishes transports from resolved connection parameters.
#[async_trait::async_trait]
pub trait Connector: Send + Sync + 'static {
    /// Opens a fresh transport. Called once per `Open`.
    async fn connect(&self, config: &ConnectionConfig) -> Result<Box<dyn Transport>>;
}
