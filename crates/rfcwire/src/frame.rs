//! # Protocol Frames
//!
//! Defines the structure of the request and reply envelopes.
//!
//! ```text
//! request = record { <Op>: record { seq: u64, ...op fields } }
//! reply   = record { Reply: ok  { record { seq: u64, body: any } }
//!                         | err { record { seq: u64, error: ErrorInfo } } }
//! ```
//!
//! ## Invariants
//! - **Panic Safety**: All decoding paths return `Result`, never panicking on unknown data.
//! - **Forward Compatibility**: Unknown header fields are safely skipped.
//! - **Correlation**: Every reply echoes the `seq` of its request.

use rfcpack::Decoder;
use rfcpack::Encoder;

use crate::codec::encode_params;
use crate::error::Error;
use crate::error::Result;
use crate::info::ErrorInfo;
use crate::types::Signature;
use crate::value::Record;

/// The operations a client can request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Open,
    Close,
    Ping,
    Describe,
    Invoke,
}

impl Op {
    pub fn as_str(self) -> &'static str {
        match self {
            Op::Open => "Open",
            Op::Close => "Close",
            Op::Ping => "Ping",
            Op::Describe => "Describe",
            Op::Invoke => "Invoke",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "Open" => Some(Op::Open),
            "Close" => Some(Op::Close),
            "Ping" => Some(Op::Ping),
            "Describe" => Some(Op::Describe),
            "Invoke" => Some(Op::Invoke),
            _ => None,
        }
    }
}

// ============================================================================
//  REQUEST ENCODING
// ============================================================================

/// Encodes an outbound `Open` request.
pub struct OpenEncoder<'a> {
    pub seq: u64,
    pub client_version: &'a str,
    /// Logon parameters, sent as `name => value` strings.
    pub params: &'a [(String, String)],
}

impl<'a> OpenEncoder<'a> {
    pub fn new(seq: u64, client_version: &'a str, params: &'a [(String, String)]) -> Self {
        Self { seq, client_version, params }
    }

    pub fn encode(&self, enc: &mut Encoder) -> Result<()> {
        begin_frame(enc, Op::Open.as_str())?;
        enc.record_begin()?;
        enc.entry_u64("seq", self.seq)?;
        enc.entry_str("client_version", self.client_version)?;
        enc.entry_begin("params")?;
        enc.record_begin()?;
        for (name, value) in self.params {
            enc.entry_str(name, value)?;
        }
        enc.record_end()?;
        enc.entry_end()?;
        enc.record_end()?;
        end_frame(enc)
    }
}

/// Encodes a request that carries nothing but its sequence number.
pub struct ControlEncoder {
    pub op: Op,
    pub seq: u64,
}

impl ControlEncoder {
    pub fn close(seq: u64) -> Self {
        Self { op: Op::Close, seq }
    }

    pub fn ping(seq: u64) -> Self {
        Self { op: Op::Ping, seq }
    }

    pub fn encode(&self, enc: &mut Encoder) -> Result<()> {
        begin_frame(enc, self.op.as_str())?;
        enc.record_begin()?;
        enc.entry_u64("seq", self.seq)?;
        enc.record_end()?;
        end_frame(enc)
    }
}

/// Encodes a metadata query for one procedure.
pub struct DescribeEncoder<'a> {
    pub seq: u64,
    pub name: &'a str,
}

impl<'a> DescribeEncoder<'a> {
    pub fn new(seq: u64, name: &'a str) -> Self {
        Self { seq, name }
    }

    pub fn encode(&self, enc: &mut Encoder) -> Result<()> {
        begin_frame(enc, Op::Describe.as_str())?;
        enc.record_begin()?;
        enc.entry_u64("seq", self.seq)?;
        enc.entry_str("name", self.name)?;
        enc.record_end()?;
        end_frame(enc)
    }
}

/// Encodes a procedure call. Parameters are validated against `sig` while
/// encoding, so a bad value fails here and never reaches a transport.
pub struct InvokeEncoder<'a> {
    pub seq: u64,
    pub sig: &'a Signature,
    pub params: &'a Record,
}

impl<'a> InvokeEncoder<'a> {
    pub fn new(seq: u64, sig: &'a Signature, params: &'a Record) -> Self {
        Self { seq, sig, params }
    }

    pub fn encode(&self, enc: &mut Encoder) -> Result<()> {
        begin_frame(enc, Op::Invoke.as_str())?;
        enc.record_begin()?;
        enc.entry_u64("seq", self.seq)?;
        enc.entry_str("name", self.sig.name())?;
        enc.entry_begin("params")?;
        encode_params(enc, self.sig, self.params)?;
        enc.entry_end()?;
        enc.record_end()?;
        end_frame(enc)
    }
}

/// Top-level frames are a one-entry record so the operation name travels with
/// the body.
fn begin_frame(enc: &mut Encoder, name: &str) -> Result<()> {
    enc.record_begin()?;
    enc.entry_begin(name)?;
    Ok(())
}

fn end_frame(enc: &mut Encoder) -> Result<()> {
    enc.entry_end()?;
    enc.record_end()?;
    Ok(())
}

// ============================================================================
//  REQUEST DECODING
// ============================================================================

/// A decoded inbound request.
#[derive(Debug)]
pub enum Request<'a> {
    Open { seq: u64, client_version: &'a str, params: Vec<(&'a str, &'a str)> },
    Close { seq: u64 },
    Ping { seq: u64 },
    Describe { seq: u64, name: &'a str },
    /// `params` points at the parameter record; decode it with the signature.
    Invoke { seq: u64, name: &'a str, params: Decoder<'a> },
}

impl<'a> Request<'a> {
    pub fn seq(&self) -> u64 {
        match self {
            Request::Open { seq, .. }
            | Request::Close { seq }
            | Request::Ping { seq }
            | Request::Describe { seq, .. }
            | Request::Invoke { seq, .. } => *seq,
        }
    }

    pub fn op(&self) -> Op {
        match self {
            Request::Open { .. } => Op::Open,
            Request::Close { .. } => Op::Close,
            Request::Ping { .. } => Op::Ping,
            Request::Describe { .. } => Op::Describe,
            Request::Invoke { .. } => Op::Invoke,
        }
    }

    /// Decode a request frame.
    pub fn decode(bytes: &'a [u8]) -> Result<Self> {
        let mut dec = Decoder::new(bytes);
        let mut root = dec.record()?;
        let (op_name, mut body) = root.next()?.ok_or_else(|| Error::ProtocolViolation("Empty frame".into()))?;
        let op = Op::parse(op_name)
            .ok_or_else(|| Error::ProtocolViolation(format!("Unknown operation {op_name}")))?;

        let mut fields = body.record()?;
        let mut seq = None;
        let mut name = None;
        let mut client_version = None;
        let mut params = None;

        while let Some((key, mut val)) = fields.next()? {
            match key {
                "seq" => seq = Some(val.u64()?),
                "name" => name = Some(val.str()?),
                "client_version" => client_version = Some(val.str()?),
                "params" => params = Some(val),
                _ => val.skip()?,
            }
        }

        let seq = seq.ok_or_else(|| Error::ProtocolViolation("Missing seq".into()))?;
        let request = match op {
            Op::Open => {
                let mut pairs = Vec::new();
                if let Some(mut p) = params {
                    let mut iter = p.record()?;
                    while let Some((k, mut v)) = iter.next()? {
                        pairs.push((k, v.str()?));
                    }
                }
                Request::Open { seq, client_version: client_version.unwrap_or(""), params: pairs }
            },
            Op::Close => Request::Close { seq },
            Op::Ping => Request::Ping { seq },
            Op::Describe => Request::Describe {
                seq,
                name: name.ok_or_else(|| Error::ProtocolViolation("Missing name".into()))?,
            },
            Op::Invoke => Request::Invoke {
                seq,
                name: name.ok_or_else(|| Error::ProtocolViolation("Missing name".into()))?,
                params: params.ok_or_else(|| Error::ProtocolViolation("Missing params".into()))?,
            },
        };
        Ok(request)
    }
}

// ============================================================================
//  REPLIES
// ============================================================================

/// Encodes a successful reply. The body is written by the caller's closure.
pub struct ReplyOkEncoder {
    pub seq: u64,
}

impl ReplyOkEncoder {
    pub fn new(seq: u64) -> Self {
        Self { seq }
    }

    pub fn encode<F>(&self, enc: &mut Encoder, body: F) -> Result<()>
    where
        F: FnOnce(&mut Encoder) -> Result<()>,
    {
        begin_frame(enc, "Reply")?;
        enc.ok_begin()?;
        enc.record_begin()?;
        enc.entry_u64("seq", self.seq)?;
        enc.entry_begin("body")?;
        body(enc)?;
        enc.entry_end()?;
        enc.record_end()?;
        enc.ok_end()?;
        end_frame(enc)
    }

    /// A reply whose body is unit.
    pub fn encode_unit(&self, enc: &mut Encoder) -> Result<()> {
        self.encode(enc, |enc| Ok(enc.unit()?))
    }
}

/// Encodes a failure reply carrying the remote diagnostic record.
pub struct ReplyErrEncoder<'a> {
    pub seq: u64,
    pub error: &'a ErrorInfo,
}

impl<'a> ReplyErrEncoder<'a> {
    pub fn new(seq: u64, error: &'a ErrorInfo) -> Self {
        Self { seq, error }
    }

    pub fn encode(&self, enc: &mut Encoder) -> Result<()> {
        begin_frame(enc, "Reply")?;
        enc.err_begin()?;
        enc.record_begin()?;
        enc.entry_u64("seq", self.seq)?;
        enc.entry_begin("error")?;
        self.error.encode(enc)?;
        enc.entry_end()?;
        enc.record_end()?;
        enc.err_end()?;
        end_frame(enc)
    }
}

/// Decodes an inbound Reply frame.
#[derive(Debug)]
pub struct ReplyDecoder<'a> {
    pub seq: u64,
    /// The outcome of the request.
    /// - `Ok(Decoder)`: Success. Points at the body.
    /// - `Err(ErrorInfo)`: The remote system reported a failure.
    pub status: std::result::Result<Decoder<'a>, ErrorInfo>,
}

impl<'a> ReplyDecoder<'a> {
    /// Decode a Reply frame.
    pub fn decode(bytes: &'a [u8]) -> Result<Self> {
        let mut dec = Decoder::new(bytes);
        let mut root = dec.record()?;
        let (kind, mut body) = root.next()?.ok_or_else(|| Error::ProtocolViolation("Empty frame".into()))?;
        if kind != "Reply" {
            return Err(Error::ProtocolViolation(format!("Expected Reply, found {kind}")));
        }

        match body.result()? {
            Ok(mut ok_body) => {
                let mut fields = ok_body.record()?;
                let mut seq = None;
                let mut payload = None;
                while let Some((key, mut val)) = fields.next()? {
                    match key {
                        "seq" => seq = Some(val.u64()?),
                        "body" => payload = Some(val),
                        _ => val.skip()?,
                    }
                }
                Ok(ReplyDecoder {
                    seq: seq.ok_or_else(|| Error::ProtocolViolation("Missing seq".into()))?,
                    status: Ok(payload.ok_or_else(|| Error::ProtocolViolation("Missing body".into()))?),
                })
            },
            Err(mut err_body) => {
                let mut fields = err_body.record()?;
                let mut seq = None;
                let mut info = None;
                while let Some((key, mut val)) = fields.next()? {
                    match key {
                        "seq" => seq = Some(val.u64()?),
                        "error" => info = Some(ErrorInfo::decode(&mut val)?),
                        _ => val.skip()?,
                    }
                }
                Ok(ReplyDecoder {
                    seq: seq.ok_or_else(|| Error::ProtocolViolation("Missing seq".into()))?,
                    status: Err(info.ok_or_else(|| Error::ProtocolViolation("Missing error".into()))?),
                })
            },
        }
    }
}
