//! # Rfclink
//!
//! An asynchronous client for calling remote function modules.
//!
//! ## Architecture
//!
//! - **Connection**: One session per Connection, opened with a flat
//!   `ConnectionConfig`. Every network exchange is serialised through the
//!   session and bounded by a timeout.
//! - **Metadata**: `Connection::lookup` resolves a procedure's `Signature`
//!   through a `MetadataCache` and binds it to a `FunctionHandle`.
//! - **Invocation**: `FunctionHandle::invoke` encodes parameters with the
//!   `rfcwire` codec, exchanges one frame pair and decodes every outbound
//!   parameter. Remote application exceptions come back as
//!   `Outcome::Exception`, not as errors.
//! - **Transports**: `Connector`/`Transport` are the seam to the network.
//!   `tcp` speaks length-prefixed frames; `mock` is an in-process system for
//!   tests and demos.
//!
//! ```no_run
//! # async fn demo() -> rfclink::Result<()> {
//! use rfclink::Connection;
//! use rfclink::ConnectionConfig;
//! use rfclink::Record;
//!
//! let config = ConnectionConfig::new()
//!     .with("ashost", "10.0.0.1")
//!     .with("sysnr", "00")
//!     .with("client", "100")
//!     .with("user", "demo")
//!     .with("passwd", "secret");
//!
//! let conn = Connection::new();
//! conn.open(&config).await?;
//! let f = conn.lookup("STFC_CONNECTION").await?;
//! let outcome = f.invoke(&Record::new().with("REQUTEXT", "hello")).await?;
//! println!("{:?}", outcome.results());
//! conn.close().await;
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod config;
pub mod connection;
pub mod error;
pub mod function;
pub mod logging;
pub mod mock;
pub mod tcp;
pub mod transport;


pub use cache::CachePolicy;
pub use cache::MetadataCache;
pub use config::ConnectionConfig;
pub use connection::Connection;
pub use connection::ConnectionBuilder;
pub use connection::State;
pub use connection::Version;
pub use error::Error;
pub use error::ErrorKind;
pub use error::Result;
pub use function::FunctionHandle;
pub use function::Outcome;
pub use function::RemoteException;
pub use logging::Level;
pub use logging::LogSink;
pub use logging::NoopSink;
pub use logging::TracingSink;
pub use rfcwire::ErrorInfo;
pub use rfcwire::Record;
pub use rfcwire::SchemaDescription;
pub use rfcwire::Signature;
pub use rfcwire::Value;
