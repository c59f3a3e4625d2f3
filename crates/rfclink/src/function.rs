//! # Function Handles
//!
//! A handle binds one resolved `Signature` to the `Connection` it was looked
//! up on. It survives close/open cycles of that Connection; invoking it only
//! requires the Connection to be open at the time of the call.

use std::sync::Arc;

use rfcwire::ErrorInfo;
use rfcwire::Record;
use rfcwire::SchemaDescription;
use rfcwire::Signature;

use crate::connection::Connection;
use crate::error::Result;

#[derive(Debug, Clone)]
pub struct FunctionHandle {
    connection: Connection,
    signature: Arc<Signature>,
}

impl FunctionHandle {
    pub(crate) fn new(connection: Connection, signature: Arc<Signature>) -> Self {
        Self { connection, signature }
    }

    pub fn name(&self) -> &str {
        self.signature.name()
    }

    pub fn signature(&self) -> &Arc<Signature> {
        &self.signature
    }

    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    /// Describes the bound signature for validation tooling. Pure; no
    /// network round trip.
    pub fn metadata(&self) -> SchemaDescription {
        SchemaDescription::from_signature(&self.signature)
    }

    /// Calls the procedure.
    ///
    /// `params` is keyed by parameter name. Values are checked against the
    /// signature before anything is sent. The returned record holds every
    /// export, changing and tables parameter, defaulted where the remote side
    /// left them out.
    pub async fn invoke(&self, params: &Record) -> Result<Outcome> {
        self.connection.invoke(&self.signature, params).await
    }
}

/// How a call ended when the remote procedure ran to completion.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Completed(Record),
    /// The procedure raised one of its declared exceptions.
    Exception(RemoteException),
}

impl Outcome {
    pub fn is_exception(&self) -> bool {
        matches!(self, Outcome::Exception(_))
    }

    pub fn results(&self) -> Option<&Record> {
        match self {
            Outcome::Completed(record) => Some(record),
            Outcome::Exception(_) => None,
        }
    }

    pub fn exception(&self) -> Option<&RemoteException> {
        match self {
            Outcome::Completed(_) => None,
            Outcome::Exception(e) => Some(e),
        }
    }

    pub fn into_result(self) -> std::result::Result<Record, RemoteException> {
        match self {
            Outcome::Completed(record) => Ok(record),
            Outcome::Exception(e) => Err(e),
        }
    }
}

/// An application exception declared and raised by the remote procedure.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("Remote exception {key} (type {exception_type}): {}", .info.message)]
pub struct RemoteException {
    /// Single-letter message type, e.g. `E`.
    pub exception_type: String,
    /// The exception name declared by the procedure.
    pub key: String,
    pub info: ErrorInfo,
}

impl From<ErrorInfo> for RemoteException {
    fn from(info: ErrorInfo) -> Self {
        let exception_type = match info.msg_type.trim() {
            "" => "E".to_string(),
            t => t.to_string(),
        };
        Self { exception_type, key: info.key.clone(), info }
    }
}
