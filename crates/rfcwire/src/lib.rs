//! # Rfcwire
//!
//! A strict, signature-driven marshalling layer for remote function calls over
//! `rfcpack`.
//!
//! ## Architecture
//!
//! A remote procedure is described by a `Signature`: ordered parameters, each
//! with a direction and a closed `FieldKind`. Host values (`Value`, `Record`)
//! are checked against that signature while they are encoded, and replies are
//! decoded back into fully materialized records. `frame` wraps both directions
//! in sequence-numbered request and reply envelopes.

pub mod codec;
pub mod describe;
pub mod error;
pub mod frame;
pub mod info;
pub mod schema;
pub mod types;
pub mod value;


pub use error::EncodeError;
pub use error::Error;
pub use error::Result;
pub use info::ErrorGroup;
pub use info::ErrorInfo;
pub use info::ReturnCode;
pub use schema::SchemaDescription;
pub use types::Direction;
pub use types::FieldDesc;
pub use types::FieldKind;
pub use types::Parameter;
pub use types::Signature;
pub use types::StructDesc;
pub use value::Record;
pub use value::Value;

/// The maximum nesting depth of structures and tables.
pub const MAX_DEPTH: usize = 64;

/// The widest fixed-width text or byte field a remote system may describe.
pub const MAX_FIELD_LENGTH: usize = 1 << 20;

/// The widest packed decimal, in bytes.
pub const MAX_BCD_LENGTH: usize = 16;
