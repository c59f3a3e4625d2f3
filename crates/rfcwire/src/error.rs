//! # Error Definitions
//!
//! Failures of the marshalling layer. `EncodeError` is the caller's fault and is
//! always raised before a request leaves the process; everything else in `Error`
//! means the bytes on the wire did not match what the signature promised.

use rfcpack::Tag;

/// A host value does not satisfy the declared kind or width of a field.
///
/// `field` is the dotted path of the offending value, e.g. `IMPORTSTRUCT.RFCINT4`
/// or `RFCTABLE[2].RFCCHAR1`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EncodeError {
    #[error("Argument has unexpected type: {field} (expected {expected}, found {found})")]
    UnexpectedType { field: String, expected: &'static str, found: &'static str },
    #[error("Argument exceeds maximum length: {field} ({actual} > {max})")]
    ExceedsLength { field: String, max: usize, actual: usize },
    #[error("Argument out of range: {field} ({value} does not fit {kind})")]
    OutOfRange { field: String, kind: &'static str, value: String },
    #[error("Invalid date format: {field} (expected 8 digits YYYYMMDD)")]
    InvalidDate { field: String },
    #[error("Invalid time format: {field} (expected 6 digits HHMMSS)")]
    InvalidTime { field: String },
    #[error("Invalid numeric text: {field} (only digits are allowed)")]
    InvalidDigits { field: String },
    #[error("Invalid decimal: {field} ({reason})")]
    InvalidDecimal { field: String, reason: String },
    #[error("Unknown parameter or field: {field}")]
    UnknownField { field: String },
    #[error("Value nesting exceeds the limit at {field}")]
    TooDeep { field: String },
}

impl EncodeError {
    /// Path of the value that failed validation.
    pub fn field(&self) -> &str {
        match self {
            EncodeError::UnexpectedType { field, .. }
            | EncodeError::ExceedsLength { field, .. }
            | EncodeError::OutOfRange { field, .. }
            | EncodeError::InvalidDate { field }
            | EncodeError::InvalidTime { field }
            | EncodeError::InvalidDigits { field }
            | EncodeError::InvalidDecimal { field, .. }
            | EncodeError::UnknownField { field }
            | EncodeError::TooDeep { field } => field,
        }
    }
}

/// Operational failures of the marshalling layer.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// The underlying wire format failed (truncation, bad tag, scope misuse).
    #[error("wire format: {0}")]
    Wire(#[from] rfcpack::Error),
    /// A host value was rejected before encoding.
    #[error(transparent)]
    Encode(#[from] EncodeError),
    /// A decoded value carried a tag the field kind does not allow.
    #[error("type mismatch at {field}: expected {expected:?}, found {found:?}")]
    TypeMismatch { field: String, expected: Tag, found: Tag },
    /// The frame structure is malformed (missing header, unknown operation).
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),
    /// A signature description is inconsistent (duplicate names, empty names).
    #[error("invalid signature: {0}")]
    InvalidSignature(String),
    /// Nesting exceeded the safety limit while decoding.
    #[error("nesting exceeds {} levels", crate::MAX_DEPTH)]
    RecursionLimitExceeded,
}

/// A specialized Result type for marshalling operations.
pub type Result<T> = std::result::Result<T, Error>;
