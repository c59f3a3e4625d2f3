//! # Connection
//!
//! One session to one remote system, and the operations issued over it.
//!
//! ## Lifecycle
//!
//! ```text
//! Closed --open--> Opening --handshake ok--> Open --close/failure--> Closed
//!                     \--handshake failed--> Closed
//! ```
//!
//! ## Invariants
//! - **Serialised Exchanges**: All network exchanges of one Connection go
//!   through a single FIFO mutex, so at most one request is in flight and
//!   requests leave in submission order.
//! - **Single Handshake**: `open` claims the `Opening` state atomically; a
//!   second `open` fails with a `SequenceError` instead of racing.
//! - **No Indeterminate Sessions**: A failed, timed-out or cancelled exchange
//!   drops the transport and leaves the Connection `Closed`. A session is
//!   never reused after a reply went missing.
//! - **Encode First**: Parameters are fully encoded before the session lock is
//!   taken; a rejected value never touches the network.

use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::AtomicU8;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::time::Duration;

use parking_lot::RwLock;
use rfcpack::Encoder;
use rfcwire::ErrorGroup;
use rfcwire::ErrorInfo;
use rfcwire::Record;
use rfcwire::ReturnCode;
use rfcwire::Signature;
use rfcwire::codec::decode_results;
use rfcwire::describe::decode_signature;
use rfcwire::frame::ControlEncoder;
use rfcwire::frame::DescribeEncoder;
use rfcwire::frame::InvokeEncoder;
use rfcwire::frame::OpenEncoder;
use rfcwire::frame::ReplyDecoder;
use tokio::sync::Mutex;
use tokio::sync::MutexGuard;
use tracing::debug;
use tracing::trace;
use tracing::warn;

use crate::cache::CachePolicy;
use crate::cache::MetadataCache;
use crate::config::ConnectionConfig;
use crate::config::INI_FILE_NAME;
use crate::config::IniFile;
use crate::error::Error;
use crate::error::Result;
use crate::function::FunctionHandle;
use crate::function::Outcome;
use crate::function::RemoteException;
use crate::logging::CallMeta;
use crate::logging::LogSink;
use crate::logging::NoopSink;
use crate::tcp::TcpConnector;
use crate::transport::Connector;
use crate::transport::Transport;
use crate::transport::TransportError;

/// Bound on every exchange unless configured otherwise.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

const CLOSED: u8 = 0;
const OPENING: u8 = 1;
const OPEN: u8 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Closed,
    Opening,
    Open,
}

/// The version of this client library.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Version {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl std::fmt::Display for Version {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

const fn parse_component(s: &str) -> u32 {
    let bytes = s.as_bytes();
    let mut n = 0u32;
    let mut i = 0;
    while i < bytes.len() && bytes[i].is_ascii_digit() {
        n = n * 10 + (bytes[i] - b'0') as u32;
        i += 1;
    }
    n
}

pub const VERSION: Version = Version {
    major: parse_component(env!("CARGO_PKG_VERSION_MAJOR")),
    minor: parse_component(env!("CARGO_PKG_VERSION_MINOR")),
    patch: parse_component(env!("CARGO_PKG_VERSION_PATCH")),
};

struct Session {
    transport: Box<dyn Transport>,
    timeout: Duration,
}

struct Inner {
    state: AtomicU8,
    session: Mutex<Option<Session>>,
    seq: AtomicU64,
    connector: Arc<dyn Connector>,
    cache: Arc<MetadataCache>,
    sink: Arc<dyn LogSink>,
    timeout: Duration,
    config_path: RwLock<Option<PathBuf>>,
}

/// A client connection. Cheap to clone; clones share the same session.
#[derive(Clone)]
pub struct Connection {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("state", &self.state())
            .field("timeout", &self.inner.timeout)
            .field("cached", &self.inner.cache.len())
            .finish()
    }
}

impl Default for Connection {
    fn default() -> Self {
        Self::new()
    }
}

impl Connection {
    /// A TCP connection with default settings.
    pub fn new() -> Self {
        Self::builder().build()
    }

    pub fn builder() -> ConnectionBuilder {
        ConnectionBuilder::default()
    }

    pub fn state(&self) -> State {
        match self.inner.state.load(Ordering::SeqCst) {
            OPEN => State::Open,
            OPENING => State::Opening,
            _ => State::Closed,
        }
    }

    /// True between a completed handshake and the next close or failure.
    pub fn is_open(&self) -> bool {
        self.inner.state.load(Ordering::SeqCst) == OPEN
    }

    pub fn version(&self) -> Version {
        VERSION
    }

    pub fn metadata_cache(&self) -> &Arc<MetadataCache> {
        &self.inner.cache
    }

    /// Sets the directory searched for `sapnwrfc.ini`. Returns `false`, and
    /// keeps the previous setting, when `path` is not a directory.
    pub fn set_config_path(&self, path: impl AsRef<Path>) -> bool {
        let path = path.as_ref();
        if !path.is_dir() {
            debug!("ignoring config path {}: not a directory", path.display());
            return false;
        }
        *self.inner.config_path.write() = Some(path.to_path_buf());
        true
    }

    pub fn config_path(&self) -> Option<PathBuf> {
        self.inner.config_path.read().clone()
    }

    // ========================================================================
    //  LIFECYCLE
    // ========================================================================

    /// Connects and logs on. On failure the Connection stays `Closed` and no
    /// transport is retained.
    pub async fn open(&self, config: &ConnectionConfig) -> Result<()> {
        if let Err(current) = self.inner.state.compare_exchange(CLOSED, OPENING, Ordering::SeqCst, Ordering::SeqCst)
        {
            let err = Error::illegal_state(match current {
                OPEN => "Connection is already open",
                _ => "Connection is already being opened",
            });
            self.report(CallMeta::new("Open"), Some(err.info()));
            return Err(err);
        }

        let mut opening = OpeningGuard { state: &self.inner.state, armed: true };
        let result = self.handshake(config).await;
        if result.is_ok() {
            opening.armed = false;
        }
        self.report(CallMeta::new("Open"), result.as_ref().err().map(Error::info));
        result
    }

    async fn handshake(&self, config: &ConnectionConfig) -> Result<()> {
        let config = self.resolve_config(config).await?;
        let timeout = config.timeout()?.unwrap_or(self.inner.timeout);

        let seq = self.next_seq();
        let logon = config.logon_params();
        let client_version = VERSION.to_string();
        let frame = encode_frame(|enc| OpenEncoder::new(seq, &client_version, &logon).encode(enc))
            .map_err(|e| Error::Connection(serialization_failure(e)))?;

        let mut exchange = self.exchange().await;
        debug!("opening connection {:?}", config);
        let transport = match tokio::time::timeout(timeout, self.inner.connector.connect(&config)).await {
            Ok(Ok(transport)) => transport,
            Ok(Err(e)) => return Err(Error::Connection(e.info())),
            Err(_) => return Err(Error::Connection(TransportError::Timeout.info())),
        };
        *exchange.slot = Some(Session { transport, timeout });

        let bytes = exchange.round_trip(seq, &frame).await.map_err(Error::Connection)?;
        let reply = exchange.reply(&bytes, seq).map_err(Error::Connection)?;
        if let Err(info) = reply.status {
            exchange.teardown("logon rejected");
            return Err(Error::Connection(info));
        }

        self.inner.state.store(OPEN, Ordering::SeqCst);
        debug!("connection open");
        Ok(())
    }

    /// Applies the `sapnwrfc.ini` entry named by `dest`, then validates.
    async fn resolve_config(&self, config: &ConnectionConfig) -> Result<ConnectionConfig> {
        let config = match config.destination() {
            None => config.clone(),
            Some(dest) => {
                let dir = self.config_path().unwrap_or_else(|| PathBuf::from("."));
                let path = dir.join(INI_FILE_NAME);
                let text = tokio::fs::read_to_string(&path).await.map_err(|e| {
                    Error::invalid_parameter(format!("Cannot read {}: {}", path.display(), e))
                })?;
                let ini = IniFile::parse(&text);
                let entry = ini.get(dest).ok_or_else(|| {
                    Error::invalid_parameter(format!("Destination {} not found in {}", dest, path.display()))
                })?;
                config.merged_over(entry)
            },
        };
        config.validate()?;
        Ok(config)
    }

    /// Logs off and releases the session. Never fails; a Connection that is
    /// not open is left alone.
    pub async fn close(&self) {
        let mut exchange = self.exchange().await;
        if !exchange.is_open() {
            return;
        }

        let seq = self.next_seq();
        let failure = match encode_frame(|enc| ControlEncoder::close(seq).encode(enc)) {
            Ok(frame) => exchange.round_trip(seq, &frame).await.err(),
            Err(e) => Some(serialization_failure(e)),
        };
        exchange.release();
        debug!("connection closed");
        self.report(CallMeta::new("Close"), failure.as_ref());
    }

    /// Probes the remote system. `Ok(false)` means the probe failed and the
    /// session was dropped; a Connection that is not open is an error.
    pub async fn ping(&self) -> Result<bool> {
        let seq = self.next_seq();
        let frame = encode_frame(|enc| ControlEncoder::ping(seq).encode(enc))
            .map_err(|e| Error::Connection(serialization_failure(e)))?;

        let mut exchange = self.exchange().await;
        if !exchange.is_open() {
            let err = Error::not_open("Ping");
            self.report(CallMeta::new("Ping"), Some(err.info()));
            return Err(err);
        }

        let failure = match exchange.round_trip(seq, &frame).await {
            Ok(bytes) => match exchange.reply(&bytes, seq) {
                Ok(reply) => reply.status.err(),
                Err(info) => Some(info),
            },
            Err(info) => Some(info),
        };
        self.report(CallMeta::new("Ping"), failure.as_ref());
        Ok(failure.is_none())
    }

    // ========================================================================
    //  METADATA
    // ========================================================================

    /// Resolves `name` and binds it to a new handle.
    pub async fn lookup(&self, name: &str) -> Result<FunctionHandle> {
        let signature = self.resolve(name).await?;
        Ok(FunctionHandle::new(self.clone(), signature))
    }

    /// The signature of `name`, from the cache or from the remote system.
    pub async fn resolve(&self, name: &str) -> Result<Arc<Signature>> {
        if let Some(signature) = self.inner.cache.get(name) {
            if !self.is_open() {
                return Err(Error::not_open("Lookup"));
            }
            trace!("metadata cache hit for {}", name);
            return Ok(signature);
        }

        let result = self.describe(name).await;
        self.report(CallMeta::new("Describe").named(name), result.as_ref().err().map(Error::info));
        let signature = result?;
        self.inner.cache.insert(name, signature.clone());
        Ok(signature)
    }

    async fn describe(&self, name: &str) -> Result<Arc<Signature>> {
        let seq = self.next_seq();
        let frame = encode_frame(|enc| DescribeEncoder::new(seq, name).encode(enc))
            .map_err(|e| Error::Lookup(serialization_failure(e)))?;

        let mut exchange = self.exchange().await;
        if !exchange.is_open() {
            return Err(Error::not_open("Lookup"));
        }
        debug!("fetching metadata for {}", name);

        let bytes = exchange.round_trip(seq, &frame).await.map_err(Error::Lookup)?;
        let reply = exchange.reply(&bytes, seq).map_err(Error::Lookup)?;
        match reply.status {
            Ok(mut body) => {
                let signature = decode_signature(&mut body).map_err(|e| Error::Lookup(Error::protocol(e.to_string())))?;
                if signature.name() != name {
                    return Err(Error::Lookup(Error::protocol(format!(
                        "Requested metadata for {}, received {}",
                        name,
                        signature.name()
                    ))));
                }
                Ok(Arc::new(signature))
            },
            Err(info) if info.key == "FU_NOT_FOUND" => Err(Error::ProcedureNotFound(info)),
            Err(info) => Err(Error::Lookup(info)),
        }
    }

    // ========================================================================
    //  INVOCATION
    // ========================================================================

    pub(crate) async fn invoke(&self, signature: &Signature, params: &Record) -> Result<Outcome> {
        let result = self.call(signature, params).await;
        let meta = CallMeta::new("Invoke").named(signature.name());
        match &result {
            Ok(Outcome::Exception(exception)) => self.report(meta, Some(&exception.info)),
            Ok(Outcome::Completed(_)) => self.report(meta, None),
            Err(e) => self.report(meta, Some(e.info())),
        }
        result
    }

    async fn call(&self, signature: &Signature, params: &Record) -> Result<Outcome> {
        let seq = self.next_seq();
        let frame = encode_frame(|enc| InvokeEncoder::new(seq, signature, params).encode(enc)).map_err(|e| match e {
            rfcwire::Error::Encode(e) => Error::from(e),
            other => Error::Invocation(serialization_failure(other)),
        })?;

        let mut exchange = self.exchange().await;
        if !exchange.is_open() {
            return Err(Error::not_open("Invoke"));
        }
        debug!("invoking {} (seq {})", signature.name(), seq);

        let bytes = exchange.round_trip(seq, &frame).await.map_err(Error::Invocation)?;
        let reply = exchange.reply(&bytes, seq).map_err(Error::Invocation)?;
        match reply.status {
            Ok(mut body) => decode_results(&mut body, signature)
                .map(Outcome::Completed)
                .map_err(|e| Error::Invocation(Error::protocol(e.to_string()))),
            Err(info) if info.group == ErrorGroup::AbapApplicationFailure => {
                Ok(Outcome::Exception(RemoteException::from(info)))
            },
            Err(info) => {
                if matches!(info.code, ReturnCode::Closed | ReturnCode::InvalidHandle | ReturnCode::CommunicationFailure) {
                    exchange.teardown("remote session ended");
                }
                Err(Error::Invocation(info))
            },
        }
    }

    // ========================================================================
    //  INTERNALS
    // ========================================================================

    fn next_seq(&self) -> u64 {
        self.inner.seq.fetch_add(1, Ordering::Relaxed)
    }

    async fn exchange(&self) -> Exchange<'_> {
        Exchange { slot: self.inner.session.lock().await, state: &self.inner.state, in_flight: false }
    }

    fn report(&self, meta: CallMeta<'_>, failure: Option<&ErrorInfo>) {
        match failure {
            Some(info) => meta.failed(info).emit(self.inner.sink.as_ref()),
            None => meta.emit(self.inner.sink.as_ref()),
        }
    }
}

fn encode_frame<F>(write: F) -> rfcwire::Result<Vec<u8>>
where
    F: FnOnce(&mut Encoder) -> rfcwire::Result<()>,
{
    let mut enc = Encoder::new();
    write(&mut enc)?;
    Ok(enc.into_bytes()?)
}

fn serialization_failure(e: rfcwire::Error) -> ErrorInfo {
    ErrorInfo::new(ReturnCode::SerializationFailure, ErrorGroup::ExternalRuntimeFailure, e.to_string())
}

/// Resets `Opening` to `Closed` unless the handshake succeeded.
struct OpeningGuard<'a> {
    state: &'a AtomicU8,
    armed: bool,
}

impl Drop for OpeningGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.state.store(CLOSED, Ordering::SeqCst);
        }
    }
}

/// Exclusive use of the session for one exchange. Dropped while a request
/// is in flight, it tears the session down.
struct Exchange<'a> {
    slot: MutexGuard<'a, Option<Session>>,
    state: &'a AtomicU8,
    in_flight: bool,
}

impl Exchange<'_> {
    fn is_open(&self) -> bool {
        self.slot.is_some()
    }

    /// Sends one frame and waits for its reply within the session timeout.
    async fn round_trip(&mut self, seq: u64, frame: &[u8]) -> std::result::Result<Vec<u8>, ErrorInfo> {
        let Some(session) = self.slot.as_ref() else {
            return Err(TransportError::ConnectionLost("no session".into()).info());
        };
        self.in_flight = true;
        trace!("sending frame seq {} ({} bytes)", seq, frame.len());

        let result = tokio::time::timeout(session.timeout, session.transport.call(frame)).await;
        match result {
            Ok(Ok(bytes)) => {
                self.in_flight = false;
                trace!("received reply for seq {} ({} bytes)", seq, bytes.len());
                Ok(bytes)
            },
            Ok(Err(e)) => {
                self.teardown(&e.to_string());
                Err(e.info())
            },
            Err(_) => {
                self.teardown("request timed out");
                Err(TransportError::Timeout.info())
            },
        }
    }

    /// Decodes a reply and checks that it answers request `seq`.
    fn reply<'b>(&mut self, bytes: &'b [u8], seq: u64) -> std::result::Result<ReplyDecoder<'b>, ErrorInfo> {
        let info = match ReplyDecoder::decode(bytes) {
            Ok(reply) if reply.seq == seq => return Ok(reply),
            Ok(reply) => Error::protocol(format!("Reply seq {} does not match request seq {}", reply.seq, seq)),
            Err(e) => Error::protocol(e.to_string()),
        };
        self.teardown(&info.message);
        Err(info)
    }

    /// Drops the session after a failure.
    fn teardown(&mut self, reason: &str) {
        if self.slot.take().is_some() {
            warn!("session torn down: {}", reason);
        }
        self.in_flight = false;
        self.state.store(CLOSED, Ordering::SeqCst);
    }

    /// Drops the session after an orderly close.
    fn release(&mut self) {
        self.slot.take();
        self.in_flight = false;
        self.state.store(CLOSED, Ordering::SeqCst);
    }
}

impl Drop for Exchange<'_> {
    fn drop(&mut self) {
        if self.in_flight {
            self.teardown("request cancelled");
        }
    }
}

// ============================================================================
//  BUILDER
// ============================================================================

pub struct ConnectionBuilder {
    connector: Arc<dyn Connector>,
    cache: Option<Arc<MetadataCache>>,
    policy: CachePolicy,
    sink: Arc<dyn LogSink>,
    timeout: Duration,
}

impl Default for ConnectionBuilder {
    fn default() -> Self {
        Self {
            connector: Arc::new(TcpConnector),
            cache: None,
            policy: CachePolicy::default(),
            sink: Arc::new(NoopSink),
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl ConnectionBuilder {
    pub fn connector(mut self, connector: impl Connector) -> Self {
        self.connector = Arc::new(connector);
        self
    }

    pub fn shared_connector(mut self, connector: Arc<dyn Connector>) -> Self {
        self.connector = connector;
        self
    }

    /// Shares an existing cache, e.g. between connections to the same system.
    pub fn metadata_cache(mut self, cache: Arc<MetadataCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Policy of the cache created by `build`. Ignored when a shared cache is
    /// supplied.
    pub fn cache_policy(mut self, policy: CachePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn logger(mut self, sink: impl LogSink) -> Self {
        self.sink = Arc::new(sink);
        self
    }

    pub fn shared_logger(mut self, sink: Arc<dyn LogSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn build(self) -> Connection {
        let cache = self.cache.unwrap_or_else(|| Arc::new(MetadataCache::with_policy(self.policy)));
        Connection {
            inner: Arc::new(Inner {
                state: AtomicU8::new(CLOSED),
                session: Mutex::new(None),
                seq: AtomicU64::new(1),
                connector: self.connector,
                cache,
                sink: self.sink,
                timeout: self.timeout,
                config_path: RwLock::new(None),
            }),
        }
    }
}
