//! # Signature Descriptions
//!
//! How a `Signature` travels in the body of a `Describe` reply.
//!
//! ```text
//! signature = record { name: str, params: list<param> }
//! param     = record { name: str, direction: str, kind: kind, description?: str, optional: bool }
//! kind      = record { type: str, length?: u32, decimals?: u32, struct?: struct }
//! struct    = record { name: str, fields: list<record { name: str, kind: kind }> }
//! ```
//!
//! Unknown entries are skipped so newer systems can describe more.

use std::sync::Arc;

use rfcpack::Decoder;
use rfcpack::Encoder;

use crate::error::Error;
use crate::error::Result;
use crate::types::Direction;
use crate::types::FieldDesc;
use crate::types::FieldKind;
use crate::types::Parameter;
use crate::types::Signature;
use crate::types::StructDesc;
use crate::MAX_BCD_LENGTH;
use crate::MAX_DEPTH;
use crate::MAX_FIELD_LENGTH;

// ============================================================================
//  ENCODING
// ============================================================================

pub fn encode_signature(enc: &mut Encoder, sig: &Signature) -> Result<()> {
    enc.record_begin()?;
    enc.entry_str("name", sig.name())?;
    enc.entry_begin("params")?;
    enc.list_begin()?;
    for param in sig.params() {
        enc.record_begin()?;
        enc.entry_str("name", &param.name)?;
        enc.entry_str("direction", param.direction.as_tag())?;
        enc.entry_begin("kind")?;
        encode_kind(enc, &param.kind)?;
        enc.entry_end()?;
        if let Some(text) = &param.description {
            enc.entry_str("description", text)?;
        }
        enc.entry_begin("optional")?;
        enc.bool(param.optional)?;
        enc.entry_end()?;
        enc.record_end()?;
    }
    enc.list_end()?;
    enc.entry_end()?;
    enc.record_end()?;
    Ok(())
}

fn encode_kind(enc: &mut Encoder, kind: &FieldKind) -> Result<()> {
    enc.record_begin()?;
    enc.entry_str("type", kind.name())?;
    match kind {
        FieldKind::Char(n) | FieldKind::Num(n) | FieldKind::Byte(n) => {
            enc.entry_u64("length", *n as u64)?;
        },
        FieldKind::Bcd { length, decimals } => {
            enc.entry_u64("length", *length as u64)?;
            enc.entry_u64("decimals", *decimals as u64)?;
        },
        FieldKind::Structure(desc) | FieldKind::Table(desc) => {
            enc.entry_begin("struct")?;
            encode_struct(enc, desc)?;
            enc.entry_end()?;
        },
        _ => {},
    }
    enc.record_end()?;
    Ok(())
}

fn encode_struct(enc: &mut Encoder, desc: &StructDesc) -> Result<()> {
    enc.record_begin()?;
    enc.entry_str("name", desc.name())?;
    enc.entry_begin("fields")?;
    enc.list_begin()?;
    for field in desc.fields() {
        enc.record_begin()?;
        enc.entry_str("name", &field.name)?;
        enc.entry_begin("kind")?;
        encode_kind(enc, &field.kind)?;
        enc.entry_end()?;
        enc.record_end()?;
    }
    enc.list_end()?;
    enc.entry_end()?;
    enc.record_end()?;
    Ok(())
}

// ============================================================================
//  DECODING
// ============================================================================

fn missing(what: &str) -> Error {
    Error::ProtocolViolation(format!("Missing {what}"))
}

pub fn decode_signature(dec: &mut Decoder) -> Result<Signature> {
    let mut fields = dec.record()?;
    let mut name = None;
    let mut params = Vec::new();

    while let Some((key, mut val)) = fields.next()? {
        match key {
            "name" => name = Some(val.str()?),
            "params" => {
                let mut list = val.list()?;
                while let Some(mut item) = list.next()? {
                    params.push(decode_param(&mut item)?);
                }
            },
            _ => val.skip()?,
        }
    }

    Signature::new(name.ok_or_else(|| missing("signature name"))?, params)
}

fn decode_param(dec: &mut Decoder) -> Result<Parameter> {
    let mut fields = dec.record()?;
    let mut name = None;
    let mut direction = None;
    let mut kind = None;
    let mut description = None;
    let mut optional = false;

    while let Some((key, mut val)) = fields.next()? {
        match key {
            "name" => name = Some(val.str()?),
            "direction" => {
                let tag = val.str()?;
                direction = Some(Direction::from_tag(tag)
                    .ok_or_else(|| Error::ProtocolViolation(format!("Unknown direction {tag}")))?);
            },
            "kind" => kind = Some(decode_kind(&mut val, 0)?),
            "description" => description = Some(val.str()?.to_string()),
            "optional" => optional = val.bool()?,
            _ => val.skip()?,
        }
    }

    Ok(Parameter {
        name: name.ok_or_else(|| missing("parameter name"))?.to_string(),
        kind: kind.ok_or_else(|| missing("parameter kind"))?,
        direction: direction.ok_or_else(|| missing("parameter direction"))?,
        description,
        optional,
    })
}

fn decode_kind(dec: &mut Decoder, depth: usize) -> Result<FieldKind> {
    if depth > MAX_DEPTH {
        return Err(Error::RecursionLimitExceeded);
    }

    let mut fields = dec.record()?;
    let mut ty = None;
    let mut length = 0usize;
    let mut decimals = 0usize;
    let mut desc = None;

    while let Some((key, mut val)) = fields.next()? {
        match key {
            "type" => ty = Some(val.str()?),
            "length" => length = bounded(val.u64()?, MAX_FIELD_LENGTH, "length")?,
            "decimals" => decimals = bounded(val.u64()?, MAX_FIELD_LENGTH, "decimals")?,
            "struct" => desc = Some(decode_struct(&mut val, depth + 1)?),
            _ => val.skip()?,
        }
    }

    let ty = ty.ok_or_else(|| missing("kind type"))?;
    let kind = match ty {
        "char" => FieldKind::Char(length),
        "num" => FieldKind::Num(length),
        "int1" => FieldKind::Int1,
        "int2" => FieldKind::Int2,
        "int" => FieldKind::Int4,
        "float" => FieldKind::Float,
        "bcd" => {
            if length == 0 || length > MAX_BCD_LENGTH || decimals > 2 * length - 1 {
                return Err(Error::ProtocolViolation(format!(
                    "Invalid packed decimal: length {length}, decimals {decimals}"
                )));
            }
            FieldKind::Bcd { length, decimals }
        },
        "date" => FieldKind::Date,
        "time" => FieldKind::Time,
        "byte" => FieldKind::Byte(length),
        "string" => FieldKind::String,
        "xstring" => FieldKind::XString,
        "structure" => FieldKind::Structure(Arc::new(desc.ok_or_else(|| missing("structure fields"))?)),
        "table" => FieldKind::Table(Arc::new(desc.ok_or_else(|| missing("table row type"))?)),
        other => return Err(Error::ProtocolViolation(format!("Unknown field kind {other}"))),
    };
    Ok(kind)
}

fn bounded(n: u64, max: usize, what: &str) -> Result<usize> {
    match usize::try_from(n) {
        Ok(n) if n <= max => Ok(n),
        _ => Err(Error::ProtocolViolation(format!("Field {what} {n} exceeds {max}"))),
    }
}

fn decode_struct(dec: &mut Decoder, depth: usize) -> Result<StructDesc> {
    let mut fields = dec.record()?;
    let mut name = None;
    let mut members = Vec::new();

    while let Some((key, mut val)) = fields.next()? {
        match key {
            "name" => name = Some(val.str()?),
            "fields" => {
                let mut list = val.list()?;
                while let Some(mut item) = list.next()? {
                    members.push(decode_field(&mut item, depth)?);
                }
            },
            _ => val.skip()?,
        }
    }

    StructDesc::new(name.ok_or_else(|| missing("structure name"))?, members)
}

fn decode_field(dec: &mut Decoder, depth: usize) -> Result<FieldDesc> {
    let mut fields = dec.record()?;
    let mut name = None;
    let mut kind = None;

    while let Some((key, mut val)) = fields.next()? {
        match key {
            "name" => name = Some(val.str()?),
            "kind" => kind = Some(decode_kind(&mut val, depth)?),
            _ => val.skip()?,
        }
    }

    Ok(FieldDesc::new(
        name.ok_or_else(|| missing("field name"))?,
        kind.ok_or_else(|| missing("field kind"))?,
    ))
}
