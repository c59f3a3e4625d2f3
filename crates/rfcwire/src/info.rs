//! # Error Information
//!
//! The diagnostic record the remote system attaches to every failure, and the
//! closed return-code and error-group enums it is classified by.

use rfcpack::Decoder;
use rfcpack::Encoder;
use serde::Serialize;

use crate::error::Result;

/// Return codes. Numeric values are stable and travel on the wire.
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
pub enum ReturnCode {
    #[default]
    Ok = 0,
    CommunicationFailure = 1,
    LogonFailure = 2,
    AbapRuntimeFailure = 3,
    AbapMessage = 4,
    AbapException = 5,
    Closed = 6,
    Canceled = 7,
    Timeout = 8,
    MemoryInsufficient = 9,
    VersionMismatch = 10,
    InvalidProtocol = 11,
    SerializationFailure = 12,
    InvalidHandle = 13,
    Retry = 14,
    ExternalFailure = 15,
    Executed = 16,
    NotFound = 17,
    NotSupported = 18,
    IllegalState = 19,
    InvalidParameter = 20,
    CodepageConversionFailure = 21,
    ConversionFailure = 22,
    BufferTooSmall = 23,
    AbapClassException = 27,
    UnknownError = 28,
    AuthorizationFailure = 29,
}

impl ReturnCode {
    pub fn from_u32(v: u32) -> Option<Self> {
        use ReturnCode::*;
        let code = match v {
            0 => Ok,
            1 => CommunicationFailure,
            2 => LogonFailure,
            3 => AbapRuntimeFailure,
            4 => AbapMessage,
            5 => AbapException,
            6 => Closed,
            7 => Canceled,
            8 => Timeout,
            9 => MemoryInsufficient,
            10 => VersionMismatch,
            11 => InvalidProtocol,
            12 => SerializationFailure,
            13 => InvalidHandle,
            14 => Retry,
            15 => ExternalFailure,
            16 => Executed,
            17 => NotFound,
            18 => NotSupported,
            19 => IllegalState,
            20 => InvalidParameter,
            21 => CodepageConversionFailure,
            22 => ConversionFailure,
            23 => BufferTooSmall,
            27 => AbapClassException,
            28 => UnknownError,
            29 => AuthorizationFailure,
            _ => return None,
        };
        Some(code)
    }

    /// The stable key, e.g. `RFC_INVALID_HANDLE`.
    pub fn as_str(self) -> &'static str {
        use ReturnCode::*;
        match self {
            Ok => "RFC_OK",
            CommunicationFailure => "RFC_COMMUNICATION_FAILURE",
            LogonFailure => "RFC_LOGON_FAILURE",
            AbapRuntimeFailure => "RFC_ABAP_RUNTIME_FAILURE",
            AbapMessage => "RFC_ABAP_MESSAGE",
            AbapException => "RFC_ABAP_EXCEPTION",
            Closed => "RFC_CLOSED",
            Canceled => "RFC_CANCELED",
            Timeout => "RFC_TIMEOUT",
            MemoryInsufficient => "RFC_MEMORY_INSUFFICIENT",
            VersionMismatch => "RFC_VERSION_MISMATCH",
            InvalidProtocol => "RFC_INVALID_PROTOCOL",
            SerializationFailure => "RFC_SERIALIZATION_FAILURE",
            InvalidHandle => "RFC_INVALID_HANDLE",
            Retry => "RFC_RETRY",
            ExternalFailure => "RFC_EXTERNAL_FAILURE",
            Executed => "RFC_EXECUTED",
            NotFound => "RFC_NOT_FOUND",
            NotSupported => "RFC_NOT_SUPPORTED",
            IllegalState => "RFC_ILLEGAL_STATE",
            InvalidParameter => "RFC_INVALID_PARAMETER",
            CodepageConversionFailure => "RFC_CODEPAGE_CONVERSION_FAILURE",
            ConversionFailure => "RFC_CONVERSION_FAILURE",
            BufferTooSmall => "RFC_BUFFER_TOO_SMALL",
            AbapClassException => "RFC_ABAP_CLASS_EXCEPTION",
            UnknownError => "RFC_UNKNOWN_ERROR",
            AuthorizationFailure => "RFC_AUTHORIZATION_FAILURE",
        }
    }
}

/// Error groups, coarser than return codes.
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
pub enum ErrorGroup {
    #[default]
    Ok = 0,
    AbapApplicationFailure = 1,
    AbapRuntimeFailure = 2,
    LogonFailure = 3,
    AuthorizationFailure = 4,
    CommunicationFailure = 5,
    ExternalRuntimeFailure = 6,
    ExternalApplicationFailure = 7,
    ExternalAuthorizationFailure = 8,
}

impl ErrorGroup {
    pub fn from_u32(v: u32) -> Option<Self> {
        use ErrorGroup::*;
        let group = match v {
            0 => Ok,
            1 => AbapApplicationFailure,
            2 => AbapRuntimeFailure,
            3 => LogonFailure,
            4 => AuthorizationFailure,
            5 => CommunicationFailure,
            6 => ExternalRuntimeFailure,
            7 => ExternalApplicationFailure,
            8 => ExternalAuthorizationFailure,
            _ => return None,
        };
        Some(group)
    }

    pub fn as_str(self) -> &'static str {
        use ErrorGroup::*;
        match self {
            Ok => "OK",
            AbapApplicationFailure => "ABAP_APPLICATION_FAILURE",
            AbapRuntimeFailure => "ABAP_RUNTIME_FAILURE",
            LogonFailure => "LOGON_FAILURE",
            AuthorizationFailure => "AUTHORIZATION_FAILURE",
            CommunicationFailure => "COMMUNICATION_FAILURE",
            ExternalRuntimeFailure => "EXTERNAL_RUNTIME_FAILURE",
            ExternalApplicationFailure => "EXTERNAL_APPLICATION_FAILURE",
            ExternalAuthorizationFailure => "EXTERNAL_AUTHORIZATION_FAILURE",
        }
    }
}

/// The full diagnostic record of one failure.
///
/// `key` is the stable identifier callers match on. For application
/// exceptions it is the exception name declared by the remote procedure.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct ErrorInfo {
    pub code: ReturnCode,
    pub group: ErrorGroup,
    pub key: String,
    pub message: String,
    #[serde(rename = "abapMsgClass")]
    pub class: String,
    #[serde(rename = "abapMsgType")]
    pub msg_type: String,
    #[serde(rename = "abapMsgNumber")]
    pub number: String,
    #[serde(rename = "abapMsgV1")]
    pub msgv1: String,
    #[serde(rename = "abapMsgV2")]
    pub msgv2: String,
    #[serde(rename = "abapMsgV3")]
    pub msgv3: String,
    #[serde(rename = "abapMsgV4")]
    pub msgv4: String,
}

impl ErrorInfo {
    /// A record keyed by the return code's own name.
    pub fn new(code: ReturnCode, group: ErrorGroup, message: impl Into<String>) -> Self {
        Self {
            code,
            group,
            key: code.as_str().to_string(),
            message: message.into(),
            ..Default::default()
        }
    }

    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = key.into();
        self
    }

    /// Attaches the ABAP message triple and its variables.
    pub fn with_abap_message(mut self, class: &str, msg_type: &str, number: &str, vars: [&str; 4]) -> Self {
        self.class = class.to_string();
        self.msg_type = msg_type.to_string();
        self.number = number.to_string();
        let [v1, v2, v3, v4] = vars;
        self.msgv1 = v1.to_string();
        self.msgv2 = v2.to_string();
        self.msgv3 = v3.to_string();
        self.msgv4 = v4.to_string();
        self
    }

    /// An application exception raised by a remote procedure.
    pub fn application(key: impl Into<String>, msg_type: &str, message: impl Into<String>) -> Self {
        let mut info = Self::new(ReturnCode::AbapException, ErrorGroup::AbapApplicationFailure, message)
            .with_key(key);
        info.msg_type = msg_type.to_string();
        info
    }

    /// Writes the record as a wire record.
    pub fn encode(&self, enc: &mut Encoder) -> Result<()> {
        enc.record_begin()?;
        enc.entry_begin("code")?;
        enc.u32(self.code as u32)?;
        enc.entry_end()?;
        enc.entry_begin("group")?;
        enc.u32(self.group as u32)?;
        enc.entry_end()?;
        enc.entry_str("key", &self.key)?;
        enc.entry_str("message", &self.message)?;
        enc.entry_str("class", &self.class)?;
        enc.entry_str("type", &self.msg_type)?;
        enc.entry_str("number", &self.number)?;
        enc.entry_str("msgv1", &self.msgv1)?;
        enc.entry_str("msgv2", &self.msgv2)?;
        enc.entry_str("msgv3", &self.msgv3)?;
        enc.entry_str("msgv4", &self.msgv4)?;
        enc.record_end()?;
        Ok(())
    }

    /// Reads a wire record. Missing fields stay empty; unknown codes and groups
    /// degrade to `UnknownError` and `ExternalRuntimeFailure`.
    pub fn decode(dec: &mut Decoder) -> Result<Self> {
        let mut info = ErrorInfo::default();
        let mut fields = dec.record()?;
        while let Some((name, mut val)) = fields.next()? {
            match name {
                "code" => {
                    info.code = ReturnCode::from_u32(val.u32()?).unwrap_or(ReturnCode::UnknownError);
                },
                "group" => {
                    info.group = ErrorGroup::from_u32(val.u32()?).unwrap_or(ErrorGroup::ExternalRuntimeFailure);
                },
                "key" => info.key = val.str()?.to_string(),
                "message" => info.message = val.str()?.to_string(),
                "class" => info.class = val.str()?.to_string(),
                "type" => info.msg_type = val.str()?.to_string(),
                "number" => info.number = val.str()?.to_string(),
                "msgv1" => info.msgv1 = val.str()?.to_string(),
                "msgv2" => info.msgv2 = val.str()?.to_string(),
                "msgv3" => info.msgv3 = val.str()?.to_string(),
                "msgv4" => info.msgv4 = val.str()?.to_string(),
                _ => val.skip()?,
            }
        }
        Ok(info)
    }
}

impl std::fmt::Display for ErrorInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({}): {}", self.key, self.code.as_str(), self.message)
    }
}
