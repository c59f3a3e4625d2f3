//! # Simulated Remote System
//!
//! An in-process stand-in for a remote application server. It speaks the
//! same request/reply frames as a real peer, so a `Connection` cannot tell
//! it apart from a TCP endpoint.
//!
//! ## Features
//! - **Procedures**: Register any `Signature` with a handler closure. A set
//!   of standard test procedures is available through `MockSystem::standard`.
//! - **Logon**: Optionally checks user and password on `Open`.
//! - **Faults**: Can be made unreachable or slow at any time, affecting new
//!   and existing sessions alike.
//! - **Counters**: Records how often each procedure was described or invoked.
//!
//! Use `MockSystem::connector` for in-process sessions or `serve` to expose
//! the system on a TCP listener.

use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::time::Duration;

use dashmap::DashMap;
use parking_lot::Mutex;
use parking_lot::RwLock;
use rfcpack::Encoder;
use rfcwire::Direction;
use rfcwire::ErrorGroup;
use rfcwire::ErrorInfo;
use rfcwire::FieldDesc;
use rfcwire::FieldKind;
use rfcwire::Parameter;
use rfcwire::Record;
use rfcwire::ReturnCode;
use rfcwire::Signature;
use rfcwire::StructDesc;
use rfcwire::Value;
use rfcwire::codec::decode_params;
use rfcwire::codec::encode_results;
use rfcwire::describe::encode_signature;
use rfcwire::frame::ReplyErrEncoder;
use rfcwire::frame::ReplyOkEncoder;
use rfcwire::frame::Request;
use tokio::net::TcpListener;
use tracing::debug;
use tracing::trace;

use crate::config::ConnectionConfig;
use crate::tcp::read_frame;
use crate::tcp::write_frame;
use crate::transport;
use crate::transport::Connector;
use crate::transport::Transport;
use crate::transport::TransportError;

/// The body of a remote procedure: decoded parameters in, results out.
/// Returning `Err` reports the record to the caller as the call's failure.
pub type Handler = Arc<dyn Fn(&Record) -> Result<Record, ErrorInfo> + Send + Sync>;

struct Procedure {
    signature: Arc<Signature>,
    handler: Handler,
}

struct Credentials {
    user: String,
    passwd: String,
}

struct Inner {
    sysid: String,
    procedures: DashMap<String, Arc<Procedure>>,
    credentials: RwLock<Option<Credentials>>,
    unreachable: AtomicBool,
    latency: RwLock<Duration>,
    describes: DashMap<String, u64>,
    invocations: AtomicU64,
    sessions: AtomicUsize,
}

/// A simulated remote system. Cheap to clone; clones share all state.
#[derive(Clone)]
pub struct MockSystem {
    inner: Arc<Inner>,
}

impl Default for MockSystem {
    fn default() -> Self {
        Self::new("MCK")
    }
}

impl std::fmt::Debug for MockSystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockSystem")
            .field("sysid", &self.inner.sysid)
            .field("procedures", &self.inner.procedures.len())
            .field("sessions", &self.open_sessions())
            .finish()
    }
}

impl MockSystem {
    /// An empty system with the given system id.
    pub fn new(sysid: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(Inner {
                sysid: sysid.into(),
                procedures: DashMap::new(),
                credentials: RwLock::new(None),
                unreachable: AtomicBool::new(false),
                latency: RwLock::new(Duration::ZERO),
                describes: DashMap::new(),
                invocations: AtomicU64::new(0),
                sessions: AtomicUsize::new(0),
            }),
        }
    }

    /// A system offering the standard test procedures.
    pub fn standard() -> rfcwire::Result<Self> {
        let system = Self::default();
        system.install_standard_procedures()?;
        Ok(system)
    }

    pub fn sysid(&self) -> &str {
        &self.inner.sysid
    }

    /// Registers (or replaces) a procedure under its signature's name.
    pub fn register<F>(&self, signature: Signature, handler: F)
    where
        F: Fn(&Record) -> Result<Record, ErrorInfo> + Send + Sync + 'static,
    {
        let name = signature.name().to_string();
        let procedure = Procedure { signature: Arc::new(signature), handler: Arc::new(handler) };
        self.inner.procedures.insert(name, Arc::new(procedure));
    }

    pub fn unregister(&self, name: &str) -> bool {
        self.inner.procedures.remove(name).is_some()
    }

    /// Rejects every logon that does not present these credentials.
    pub fn require_logon(&self, user: impl Into<String>, passwd: impl Into<String>) {
        *self.inner.credentials.write() = Some(Credentials { user: user.into(), passwd: passwd.into() });
    }

    /// While set, connects are refused and every exchange fails.
    pub fn set_unreachable(&self, unreachable: bool) {
        self.inner.unreachable.store(unreachable, Ordering::SeqCst);
    }

    /// Delay applied before every reply.
    pub fn set_latency(&self, latency: Duration) {
        *self.inner.latency.write() = latency;
    }

    pub fn describe_count(&self, name: &str) -> u64 {
        self.inner.describes.get(name).map(|c| *c).unwrap_or(0)
    }

    pub fn invoke_count(&self) -> u64 {
        self.inner.invocations.load(Ordering::SeqCst)
    }

    /// Sessions that completed a logon and have not closed or dropped.
    pub fn open_sessions(&self) -> usize {
        self.inner.sessions.load(Ordering::SeqCst)
    }

    pub fn connector(&self) -> MockConnector {
        MockConnector { system: self.clone() }
    }

    fn is_unreachable(&self) -> bool {
        self.inner.unreachable.load(Ordering::SeqCst)
    }

    fn latency(&self) -> Duration {
        *self.inner.latency.read()
    }

    // ========================================================================
    //  REQUEST HANDLING
    // ========================================================================

    /// Answers one request frame on behalf of one session.
    fn handle(&self, session: &mut SessionState, frame: &[u8]) -> Vec<u8> {
        let (seq, result) = match Request::decode(frame) {
            Ok(request) => (request.seq(), self.dispatch(session, request)),
            Err(e) => (
                0,
                Err(ErrorInfo::new(ReturnCode::InvalidProtocol, ErrorGroup::CommunicationFailure, e.to_string())),
            ),
        };

        match reply(seq, &result) {
            Ok(bytes) => bytes,
            Err(e) => {
                let info = ErrorInfo::new(
                    ReturnCode::SerializationFailure,
                    ErrorGroup::ExternalRuntimeFailure,
                    e.to_string(),
                );
                reply(seq, &Err(info)).unwrap_or_default()
            },
        }
    }

    fn dispatch(&self, session: &mut SessionState, request: Request<'_>) -> Result<Body, ErrorInfo> {
        trace!("mock {} handling {:?} seq {}", self.inner.sysid, request.op(), request.seq());
        match request {
            Request::Open { params, .. } => {
                if session.logged_on {
                    return Err(ErrorInfo::new(
                        ReturnCode::IllegalState,
                        ErrorGroup::ExternalRuntimeFailure,
                        "Session is already logged on",
                    ));
                }
                self.logon(&params)?;
                session.logged_on = true;
                self.inner.sessions.fetch_add(1, Ordering::SeqCst);
                Ok(Body::Unit)
            },
            _ if !session.logged_on => Err(ErrorInfo::new(
                ReturnCode::InvalidHandle,
                ErrorGroup::ExternalRuntimeFailure,
                "Session is not logged on",
            )),
            Request::Close { .. } => {
                session.end(self);
                Ok(Body::Unit)
            },
            Request::Ping { .. } => Ok(Body::Unit),
            Request::Describe { name, .. } => {
                *self.inner.describes.entry(name.to_string()).or_insert(0) += 1;
                Ok(Body::Signature(self.procedure(name)?.signature.clone()))
            },
            Request::Invoke { name, mut params, .. } => {
                self.inner.invocations.fetch_add(1, Ordering::SeqCst);
                let procedure = self.procedure(name)?;
                let input = decode_params(&mut params, &procedure.signature).map_err(|e| {
                    ErrorInfo::new(ReturnCode::SerializationFailure, ErrorGroup::ExternalRuntimeFailure, e.to_string())
                })?;
                let output = (procedure.handler)(&input)?;
                Ok(Body::Results(procedure.signature.clone(), output))
            },
        }
    }

    fn logon(&self, params: &[(&str, &str)]) -> Result<(), ErrorInfo> {
        let param = |key: &str| {
            params
                .iter()
                .find(|(k, _)| k.eq_ignore_ascii_case(key))
                .map(|(_, v)| *v)
                .unwrap_or("")
        };

        if let Some(creds) = self.inner.credentials.read().as_ref() {
            let user_ok = param("USER").eq_ignore_ascii_case(&creds.user);
            if !user_ok || param("PASSWD") != creds.passwd {
                return Err(ErrorInfo::new(
                    ReturnCode::LogonFailure,
                    ErrorGroup::LogonFailure,
                    "Name or password is incorrect (repeat logon)",
                ));
            }
        }
        debug!("mock {} accepted logon of {}", self.inner.sysid, param("USER"));
        Ok(())
    }

    fn procedure(&self, name: &str) -> Result<Arc<Procedure>, ErrorInfo> {
        match self.inner.procedures.get(name) {
            Some(p) => Ok(p.value().clone()),
            None => Err(ErrorInfo::new(
                ReturnCode::NotFound,
                ErrorGroup::AbapRuntimeFailure,
                format!("ID:FL Type:E Number:046 {name}"),
            )
            .with_key("FU_NOT_FOUND")
            .with_abap_message("FL", "E", "046", [name, "", "", ""])),
        }
    }
}

enum Body {
    Unit,
    Signature(Arc<Signature>),
    Results(Arc<Signature>, Record),
}

fn reply(seq: u64, result: &Result<Body, ErrorInfo>) -> rfcwire::Result<Vec<u8>> {
    let mut enc = Encoder::new();
    match result {
        Ok(Body::Unit) => ReplyOkEncoder::new(seq).encode_unit(&mut enc)?,
        Ok(Body::Signature(sig)) => ReplyOkEncoder::new(seq).encode(&mut enc, |enc| encode_signature(enc, sig))?,
        Ok(Body::Results(sig, results)) => {
            ReplyOkEncoder::new(seq).encode(&mut enc, |enc| encode_results(enc, sig, results))?
        },
        Err(info) => ReplyErrEncoder::new(seq, info).encode(&mut enc)?,
    }
    Ok(enc.into_bytes()?)
}

#[derive(Default)]
struct SessionState {
    logged_on: bool,
}

impl SessionState {
    fn end(&mut self, system: &MockSystem) {
        if self.logged_on {
            self.logged_on = false;
            system.inner.sessions.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

// ============================================================================
//  TRANSPORTS
// ============================================================================

/// Connects sessions straight to a `MockSystem`, without sockets.
#[derive(Debug, Clone)]
pub struct MockConnector {
    system: MockSystem,
}

#[async_trait::async_trait]
impl Connector for MockConnector {
    async fn connect(&self, _config: &ConnectionConfig) -> transport::Result<Box<dyn Transport>> {
        if self.system.is_unreachable() {
            return Err(TransportError::ConnectionLost(format!(
                "partner {} not reached",
                self.system.sysid()
            )));
        }
        Ok(Box::new(MockTransport { system: self.system.clone(), state: Mutex::new(SessionState::default()) }))
    }
}

struct MockTransport {
    system: MockSystem,
    state: Mutex<SessionState>,
}

#[async_trait::async_trait]
impl Transport for MockTransport {
    async fn call(&self, payload: &[u8]) -> transport::Result<Vec<u8>> {
        let latency = self.system.latency();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        if self.system.is_unreachable() {
            return Err(TransportError::ConnectionLost("connection reset by partner".into()));
        }
        let mut state = self.state.lock();
        Ok(self.system.handle(&mut state, payload))
    }
}

impl Drop for MockTransport {
    fn drop(&mut self) {
        self.state.get_mut().end(&self.system);
    }
}

/// Serves the system on `listener` until the task is aborted. Each accepted
/// stream is one session.
pub async fn serve(system: MockSystem, listener: TcpListener) -> transport::Result<()> {
    loop {
        let (mut stream, peer) = listener.accept().await?;
        if system.is_unreachable() {
            drop(stream);
            continue;
        }
        debug!("mock {} accepted connection from {}", system.sysid(), peer);

        let system = system.clone();
        tokio::spawn(async move {
            let mut state = SessionState::default();
            while let Ok(frame) = read_frame(&mut stream).await {
                let latency = system.latency();
                if !latency.is_zero() {
                    tokio::time::sleep(latency).await;
                }
                if system.is_unreachable() {
                    break;
                }
                let reply = system.handle(&mut state, &frame);
                if write_frame(&mut stream, &reply).await.is_err() {
                    break;
                }
            }
            state.end(&system);
        });
    }
}

// ============================================================================
//  STANDARD PROCEDURES
// ============================================================================

impl MockSystem {
    fn install_standard_procedures(&self) -> rfcwire::Result<()> {
        self.register(Signature::new("RFC_PING", vec![])?, |_| Ok(Record::new()));

        let sysid = self.inner.sysid.clone();
        self.register(stfc_connection()?, move |input| {
            let text = input.get("REQUTEXT").and_then(Value::as_str).unwrap_or_default();
            Ok(Record::new()
                .with("ECHOTEXT", text)
                .with("RESPTEXT", format!("SAP R/3 Rel. 750 Sysid: {sysid} Mock system")))
        });

        self.register(stfc_changing()?, |input| {
            let start = input.get("START_VALUE").and_then(Value::as_int).unwrap_or(0);
            let counter = input.get("COUNTER").and_then(Value::as_int).unwrap_or(0);
            let result = i32::try_from(start + counter).map_err(|_| overflow())?;
            let counter = i32::try_from(counter + 1).map_err(|_| overflow())?;
            Ok(Record::new().with("RESULT", result).with("COUNTER", counter))
        });

        self.register(stfc_structure()?, |input| {
            let echo = input.get("IMPORTSTRUCT").cloned().unwrap_or(Value::Struct(Record::new()));
            let rows = input.get("RFCTABLE").and_then(Value::as_table).map(<[Record]>::to_vec).unwrap_or_default();
            Ok(Record::new()
                .with("ECHOSTRUCT", echo)
                .with("RESPTEXT", format!("{} rows received", rows.len()))
                .with("RFCTABLE", rows))
        });

        self.register(stfc_xstring()?, |input| {
            let bytes = input.get("INPUT").and_then(Value::as_bytes).unwrap_or_default().to_vec();
            Ok(Record::new().with("LENGTH", bytes.len() as i64).with("OUTPUT", bytes))
        });

        self.register(rfc_raise_error()?, |input| {
            let method = input.get("METHOD").and_then(Value::as_int).unwrap_or(0);
            let msg_type = match input.get("MESSAGETYPE").and_then(Value::as_str).map(str::trim) {
                Some(t) if !t.is_empty() => t.to_string(),
                _ => "E".to_string(),
            };
            match method {
                0 => Err(ErrorInfo::application("EXAMPLE", &msg_type, "Function module raised EXAMPLE")),
                1 => Err(ErrorInfo::new(
                    ReturnCode::AbapRuntimeFailure,
                    ErrorGroup::AbapRuntimeFailure,
                    "Division by zero",
                )
                .with_key("COMPUTE_INT_ZERODIVIDE")),
                _ => Ok(Record::new().with("MESSAGE", "No error raised")),
            }
        });

        Ok(())
    }
}

fn overflow() -> ErrorInfo {
    ErrorInfo::new(ReturnCode::AbapRuntimeFailure, ErrorGroup::AbapRuntimeFailure, "Overflow in arithmetic operation")
        .with_key("COMPUTE_INT_PLUS_OVERFLOW")
}

fn stfc_connection() -> rfcwire::Result<Signature> {
    Signature::new("STFC_CONNECTION", vec![
        Parameter::new("REQUTEXT", Direction::Import, FieldKind::Char(255)).describe("Text to echo"),
        Parameter::new("ECHOTEXT", Direction::Export, FieldKind::Char(255)).describe("Echoed text"),
        Parameter::new("RESPTEXT", Direction::Export, FieldKind::Char(255)).describe("System information"),
    ])
}

fn stfc_changing() -> rfcwire::Result<Signature> {
    Signature::new("STFC_CHANGING", vec![
        Parameter::new("START_VALUE", Direction::Import, FieldKind::Int4),
        Parameter::new("COUNTER", Direction::Changing, FieldKind::Int4),
        Parameter::new("RESULT", Direction::Export, FieldKind::Int4),
    ])
}

/// The `RFCTEST` row type, one field of each common scalar kind.
pub fn rfctest() -> rfcwire::Result<Arc<StructDesc>> {
    Ok(Arc::new(StructDesc::new("RFCTEST", vec![
        FieldDesc::new("RFCFLOAT", FieldKind::Float),
        FieldDesc::new("RFCCHAR1", FieldKind::Char(1)),
        FieldDesc::new("RFCINT2", FieldKind::Int2),
        FieldDesc::new("RFCINT1", FieldKind::Int1),
        FieldDesc::new("RFCICHAR4", FieldKind::Char(4)),
        FieldDesc::new("RFCINT4", FieldKind::Int4),
        FieldDesc::new("RFCHEX3", FieldKind::Byte(3)),
        FieldDesc::new("RFCCHAR2", FieldKind::Char(2)),
        FieldDesc::new("RFCTIME", FieldKind::Time),
        FieldDesc::new("RFCDATE", FieldKind::Date),
        FieldDesc::new("RFCDATA1", FieldKind::Char(50)),
        FieldDesc::new("RFCDATA2", FieldKind::Char(50)),
    ])?))
}

fn stfc_structure() -> rfcwire::Result<Signature> {
    let row = rfctest()?;
    Signature::new("STFC_STRUCTURE", vec![
        Parameter::new("IMPORTSTRUCT", Direction::Import, FieldKind::Structure(row.clone())),
        Parameter::new("ECHOSTRUCT", Direction::Export, FieldKind::Structure(row.clone())),
        Parameter::new("RESPTEXT", Direction::Export, FieldKind::Char(255)),
        Parameter::new("RFCTABLE", Direction::Tables, FieldKind::Table(row)),
    ])
}

fn stfc_xstring() -> rfcwire::Result<Signature> {
    Signature::new("STFC_XSTRING", vec![
        Parameter::new("INPUT", Direction::Import, FieldKind::XString),
        Parameter::new("OUTPUT", Direction::Export, FieldKind::XString),
        Parameter::new("LENGTH", Direction::Export, FieldKind::Int4),
    ])
}

fn rfc_raise_error() -> rfcwire::Result<Signature> {
    Signature::new("RFC_RAISE_ERROR", vec![
        Parameter::new("METHOD", Direction::Import, FieldKind::Int4).optional(),
        Parameter::new("MESSAGETYPE", Direction::Import, FieldKind::Char(1)).optional(),
        Parameter::new("MESSAGE", Direction::Export, FieldKind::Char(255)),
    ])
}
