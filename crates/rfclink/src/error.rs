//! # Error Taxonomy
//!
//! Every failure surfaced by a `Connection` or `FunctionHandle`. Each variant
//! carries the full diagnostic record (`ErrorInfo`), so callers can match on a
//! stable `kind()` and a stable `key()` without parsing messages.
//!
//! Remote application exceptions are *not* errors here: they are ordinary
//! outcomes of an invocation (see `function::Outcome`).

use rfcwire::EncodeError;
use rfcwire::ErrorGroup;
use rfcwire::ErrorInfo;
use rfcwire::ReturnCode;

/// The failure categories callers dispatch on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    ConnectionError,
    InvalidHandle,
    SequenceError,
    LookupError,
    ProcedureNotFound,
    EncodeError,
    InvocationError,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::ConnectionError => "ConnectionError",
            ErrorKind::InvalidHandle => "InvalidHandle",
            ErrorKind::SequenceError => "SequenceError",
            ErrorKind::LookupError => "LookupError",
            ErrorKind::ProcedureNotFound => "ProcedureNotFound",
            ErrorKind::EncodeError => "EncodeError",
            ErrorKind::InvocationError => "InvocationError",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Error {
    /// Open failed: bad parameters, unreachable system, rejected logon.
    #[error("Connection failed: {0}")]
    Connection(ErrorInfo),
    /// The operation needs an open connection and there is none.
    #[error("Invalid handle: {0}")]
    InvalidHandle(ErrorInfo),
    /// A lifecycle operation was issued in a state that does not allow it.
    #[error("Illegal state: {0}")]
    Sequence(ErrorInfo),
    /// Metadata could not be resolved.
    #[error("Lookup failed: {0}")]
    Lookup(ErrorInfo),
    /// The remote system does not know the requested procedure.
    #[error("Procedure not found: {0}")]
    ProcedureNotFound(ErrorInfo),
    /// A parameter was rejected before anything was sent.
    #[error("{source}")]
    Encode { source: EncodeError, info: ErrorInfo },
    /// The call failed for a reason other than an application exception.
    #[error("Invocation failed: {0}")]
    Invocation(ErrorInfo),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Connection(_) => ErrorKind::ConnectionError,
            Error::InvalidHandle(_) => ErrorKind::InvalidHandle,
            Error::Sequence(_) => ErrorKind::SequenceError,
            Error::Lookup(_) => ErrorKind::LookupError,
            Error::ProcedureNotFound(_) => ErrorKind::ProcedureNotFound,
            Error::Encode { .. } => ErrorKind::EncodeError,
            Error::Invocation(_) => ErrorKind::InvocationError,
        }
    }

    /// The stable identifier of the failure, e.g. `RFC_INVALID_HANDLE` or
    /// `FU_NOT_FOUND`.
    pub fn key(&self) -> &str {
        &self.info().key
    }

    pub fn info(&self) -> &ErrorInfo {
        match self {
            Error::Connection(info)
            | Error::InvalidHandle(info)
            | Error::Sequence(info)
            | Error::Lookup(info)
            | Error::ProcedureNotFound(info)
            | Error::Invocation(info) => info,
            Error::Encode { info, .. } => info,
        }
    }

    /// True for every failure of metadata resolution, including an unknown
    /// procedure.
    pub fn is_lookup_error(&self) -> bool {
        matches!(self, Error::Lookup(_) | Error::ProcedureNotFound(_))
    }

    pub(crate) fn not_open(what: &str) -> Self {
        Error::InvalidHandle(ErrorInfo::new(
            ReturnCode::InvalidHandle,
            ErrorGroup::ExternalRuntimeFailure,
            format!("{what} requires an open connection"),
        ))
    }

    pub(crate) fn illegal_state(message: impl Into<String>) -> Self {
        Error::Sequence(ErrorInfo::new(ReturnCode::IllegalState, ErrorGroup::ExternalRuntimeFailure, message))
    }

    pub(crate) fn invalid_parameter(message: impl Into<String>) -> Self {
        Error::Connection(ErrorInfo::new(
            ReturnCode::InvalidParameter,
            ErrorGroup::ExternalRuntimeFailure,
            message,
        ))
    }

    /// A reply that cannot be trusted: wrong shape or wrong correlation.
    pub(crate) fn protocol(message: impl Into<String>) -> ErrorInfo {
        ErrorInfo::new(ReturnCode::InvalidProtocol, ErrorGroup::CommunicationFailure, message)
    }
}

impl From<EncodeError> for Error {
    fn from(source: EncodeError) -> Self {
        let info = ErrorInfo::new(
            ReturnCode::ConversionFailure,
            ErrorGroup::ExternalApplicationFailure,
            source.to_string(),
        );
        Error::Encode { source, info }
    }
}
