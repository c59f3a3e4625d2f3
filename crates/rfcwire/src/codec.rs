//! # Codec
//!
//! The translation layer between host `Value`s and the `rfcpack` wire format,
//! driven by field descriptors.
//!
//! ## Invariants
//! - **Strict Encode**: Every value is checked against its declared kind and
//!   width. Nothing is coerced; a mismatch is an `EncodeError`.
//! - **Total Decode**: Every declared outbound field is materialized. Fields the
//!   remote side omits take the per-kind default.
//! - **Recursion Safety**: All recursive operations are bounded by `MAX_DEPTH`.
//! - **Width in Characters**: Text widths count Unicode scalar values, so padding
//!   never splits a multi-byte character.

use rfcpack::Decoder;
use rfcpack::Encoder;
use rfcpack::Tag;

use crate::error::EncodeError;
use crate::error::Error;
use crate::error::Result;
use crate::types::FieldDesc;
use crate::types::FieldKind;
use crate::types::Signature;
use crate::types::StructDesc;
use crate::value::Record;
use crate::value::Value;
use crate::MAX_DEPTH;

pub const DATE_INITIAL: &str = "00000000";
pub const TIME_INITIAL: &str = "000000";

// ============================================================================
//  PARAMETER SETS
// ============================================================================

/// Encodes the caller's parameters as a record, in signature order.
///
/// Parameters absent from `params` are not sent. Export-only parameters are
/// ignored. A key that is not a declared parameter is rejected.
pub fn encode_params(enc: &mut Encoder, sig: &Signature, params: &Record) -> Result<()> {
    for name in params.keys() {
        if sig.param(name).is_none() {
            return Err(EncodeError::UnknownField { field: name.to_string() }.into());
        }
    }

    enc.record_begin()?;
    for param in sig.params().iter().filter(|p| p.direction.is_inbound()) {
        if let Some(value) = params.get(&param.name) {
            enc.entry_begin(&param.name)?;
            encode_value(enc, &param.kind, value, &param.name)?;
            enc.entry_end()?;
        }
    }
    enc.record_end()?;
    Ok(())
}

/// Validates parameters without producing bytes.
pub fn check_params(sig: &Signature, params: &Record) -> Result<()> {
    let mut enc = Encoder::new();
    encode_params(&mut enc, sig, params)
}

/// Decodes an invocation result: every outbound parameter of `sig`, in order.
///
/// Entries the signature does not declare as outbound are skipped.
pub fn decode_results(dec: &mut Decoder, sig: &Signature) -> Result<Record> {
    let mut wire = collect_entries(dec)?;
    let mut out = Record::new();
    for param in sig.outbound() {
        let value = match take_entry(&mut wire, &param.name) {
            Some(mut val) => decode_value(&mut val, &param.kind, &param.name, 0)?,
            None => default_value(&param.kind),
        };
        out.insert(param.name.clone(), value);
    }
    Ok(out)
}

/// Decodes an inbound parameter record, as the remote side sees it.
///
/// Every inbound parameter is materialized, absent ones with their defaults.
pub fn decode_params(dec: &mut Decoder, sig: &Signature) -> Result<Record> {
    let mut wire = collect_entries(dec)?;
    let mut out = Record::new();
    for param in sig.params() {
        let value = match take_entry(&mut wire, &param.name) {
            Some(mut val) if param.direction.is_inbound() => decode_value(&mut val, &param.kind, &param.name, 0)?,
            _ => default_value(&param.kind),
        };
        out.insert(param.name.clone(), value);
    }
    Ok(out)
}

/// Encodes an outbound result record. Values are validated exactly like
/// caller input; absent outbound parameters are written with their defaults.
pub fn encode_results(enc: &mut Encoder, sig: &Signature, results: &Record) -> Result<()> {
    enc.record_begin()?;
    for param in sig.outbound() {
        enc.entry_begin(&param.name)?;
        match results.get(&param.name) {
            Some(value) => encode_value(enc, &param.kind, value, &param.name)?,
            None => encode_value(enc, &param.kind, &default_value(&param.kind), &param.name)?,
        }
        enc.entry_end()?;
    }
    enc.record_end()?;
    Ok(())
}

fn collect_entries<'a>(dec: &mut Decoder<'a>) -> Result<Vec<(&'a str, Decoder<'a>)>> {
    let mut iter = dec.record()?;
    let mut entries = Vec::new();
    while let Some(entry) = iter.next()? {
        entries.push(entry);
    }
    Ok(entries)
}

fn take_entry<'a>(entries: &mut Vec<(&'a str, Decoder<'a>)>, name: &str) -> Option<Decoder<'a>> {
    let idx = entries.iter().position(|(k, _)| *k == name)?;
    Some(entries.swap_remove(idx).1)
}

// ============================================================================
//  DEFAULTS
// ============================================================================

/// The initial value of a kind: blanks, zeros, empty containers.
pub fn default_value(kind: &FieldKind) -> Value {
    match kind {
        FieldKind::Char(n) => Value::Str(" ".repeat(*n)),
        FieldKind::Num(n) => Value::Str("0".repeat(*n)),
        FieldKind::Int1 | FieldKind::Int2 | FieldKind::Int4 => Value::Int(0),
        FieldKind::Float | FieldKind::Bcd { .. } => Value::Float(0.0),
        FieldKind::Date => Value::Str(DATE_INITIAL.to_string()),
        FieldKind::Time => Value::Str(TIME_INITIAL.to_string()),
        FieldKind::Byte(n) => Value::Bytes(vec![0; *n]),
        FieldKind::String => Value::Str(String::new()),
        FieldKind::XString => Value::Bytes(Vec::new()),
        FieldKind::Structure(desc) => Value::Struct(default_struct(desc)),
        FieldKind::Table(_) => Value::Table(Vec::new()),
    }
}

/// A structure with every field set to its initial value.
pub fn default_struct(desc: &StructDesc) -> Record {
    desc.fields().iter().map(|f| (f.name.clone(), default_value(&f.kind))).collect()
}

// ============================================================================
//  VALUE ENCODING (Value -> Wire)
// ============================================================================

/// Encodes one value against its declared kind. `path` names the value in errors.
pub fn encode_value(enc: &mut Encoder, kind: &FieldKind, value: &Value, path: &str) -> Result<()> {
    encode_value_impl(enc, kind, value, path, 0)
}

fn unexpected(path: &str, kind: &FieldKind, value: &Value) -> Error {
    EncodeError::UnexpectedType {
        field: path.to_string(),
        expected: kind.name(),
        found: value.category(),
    }
    .into()
}

fn encode_value_impl(enc: &mut Encoder, kind: &FieldKind, value: &Value, path: &str, depth: usize) -> Result<()> {
    if depth > MAX_DEPTH {
        return Err(EncodeError::TooDeep { field: path.to_string() }.into());
    }

    match (kind, value) {
        (FieldKind::Char(n), Value::Str(s)) => enc.str(&pad_text(s, *n, ' ', path)?)?,
        (FieldKind::Num(n), Value::Str(s)) => {
            if !s.chars().all(|c| c.is_ascii_digit()) {
                return Err(EncodeError::InvalidDigits { field: path.to_string() }.into());
            }
            let len = s.chars().count();
            if len > *n {
                return Err(EncodeError::ExceedsLength { field: path.to_string(), max: *n, actual: len }.into());
            }
            let mut padded = "0".repeat(n - len);
            padded.push_str(s);
            enc.str(&padded)?;
        },
        (FieldKind::Int1, Value::Int(i)) => enc.i8(narrow(*i, path, "int1")?)?,
        (FieldKind::Int2, Value::Int(i)) => enc.i16(narrow(*i, path, "int2")?)?,
        (FieldKind::Int4, Value::Int(i)) => enc.i32(narrow(*i, path, "int")?)?,
        (FieldKind::Float, Value::Float(x)) => enc.f64(*x)?,
        (FieldKind::Float, Value::Int(i)) => enc.f64(*i as f64)?,
        (FieldKind::Bcd { length, decimals }, v @ (Value::Int(_) | Value::Float(_) | Value::Str(_))) => {
            enc.str(&bcd_text(v, *length, *decimals, path)?)?;
        },
        (FieldKind::Date, Value::Str(s)) => {
            if s.len() != 8 || !s.bytes().all(|b| b.is_ascii_digit()) {
                return Err(EncodeError::InvalidDate { field: path.to_string() }.into());
            }
            enc.str(s)?;
        },
        (FieldKind::Time, Value::Str(s)) => {
            if s.len() != 6 || !s.bytes().all(|b| b.is_ascii_digit()) {
                return Err(EncodeError::InvalidTime { field: path.to_string() }.into());
            }
            enc.str(s)?;
        },
        (FieldKind::Byte(n), Value::Bytes(b)) => {
            if b.len() > *n {
                return Err(EncodeError::ExceedsLength { field: path.to_string(), max: *n, actual: b.len() }.into());
            }
            let mut padded = b.clone();
            padded.resize(*n, 0);
            enc.bytes(&padded)?;
        },
        (FieldKind::String, Value::Str(s)) => enc.str(s)?,
        (FieldKind::XString, Value::Bytes(b)) => enc.bytes(b)?,
        (FieldKind::Structure(desc), Value::Struct(record)) => {
            encode_struct(enc, desc, record, path, depth)?;
        },
        (FieldKind::Table(desc), Value::Table(rows)) => {
            enc.list_begin()?;
            for (i, row) in rows.iter().enumerate() {
                encode_struct(enc, desc, row, &format!("{path}[{i}]"), depth)?;
            }
            enc.list_end()?;
        },
        (kind, value) => return Err(unexpected(path, kind, value)),
    }
    Ok(())
}

/// Writes every declared field; fields the caller left out take their defaults.
fn encode_struct(enc: &mut Encoder, desc: &StructDesc, record: &Record, path: &str, depth: usize) -> Result<()> {
    for name in record.keys() {
        if desc.field(name).is_none() {
            return Err(EncodeError::UnknownField { field: format!("{path}.{name}") }.into());
        }
    }

    enc.record_begin()?;
    for FieldDesc { name, kind } in desc.fields() {
        let sub = format!("{path}.{name}");
        enc.entry_begin(name)?;
        match record.get(name) {
            Some(value) => encode_value_impl(enc, kind, value, &sub, depth + 1)?,
            None => encode_value_impl(enc, kind, &default_value(kind), &sub, depth + 1)?,
        }
        enc.entry_end()?;
    }
    enc.record_end()?;
    Ok(())
}

fn pad_text(s: &str, width: usize, fill: char, path: &str) -> Result<String> {
    let len = s.chars().count();
    if len > width {
        return Err(EncodeError::ExceedsLength { field: path.to_string(), max: width, actual: len }.into());
    }
    let mut out = String::with_capacity(s.len() + (width - len));
    out.push_str(s);
    out.extend(std::iter::repeat_n(fill, width - len));
    Ok(out)
}

fn narrow<T: TryFrom<i64>>(v: i64, path: &str, kind: &'static str) -> Result<T> {
    T::try_from(v).map_err(|_| {
        EncodeError::OutOfRange { field: path.to_string(), kind, value: v.to_string() }.into()
    })
}

/// Canonical decimal text for a packed number: optional `-`, integer digits,
/// and exactly `decimals` fraction digits.
fn bcd_text(value: &Value, length: usize, decimals: usize, path: &str) -> Result<String> {
    let invalid = |reason: &str| -> Error {
        EncodeError::InvalidDecimal { field: path.to_string(), reason: reason.to_string() }.into()
    };

    let raw = match value {
        Value::Int(i) => i.to_string(),
        Value::Float(x) if x.is_finite() => format!("{x:.decimals$}"),
        Value::Float(_) => return Err(invalid("not a finite number")),
        Value::Str(s) => s.trim().to_string(),
        other => return Err(unexpected(path, &FieldKind::Bcd { length, decimals }, other)),
    };

    let (negative, unsigned) = match raw.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, raw.strip_prefix('+').unwrap_or(raw.as_str())),
    };
    let (int_part, frac_part) = unsigned.split_once('.').unwrap_or((unsigned, ""));
    if int_part.is_empty() && frac_part.is_empty() {
        return Err(invalid("no digits"));
    }
    if !int_part.bytes().chain(frac_part.bytes()).all(|b| b.is_ascii_digit()) {
        return Err(invalid("not a decimal number"));
    }
    if frac_part.len() > decimals {
        return Err(invalid(&format!("more than {decimals} decimals")));
    }

    let int_part = int_part.trim_start_matches('0');
    let digits = int_part.len() + decimals;
    let budget = (2 * length).saturating_sub(1);
    if digits > budget {
        return Err(EncodeError::OutOfRange {
            field: path.to_string(),
            kind: "bcd",
            value: raw.clone(),
        }
        .into());
    }

    let mut out = String::new();
    let is_zero = int_part.is_empty() && frac_part.bytes().all(|b| b == b'0');
    if negative && !is_zero {
        out.push('-');
    }
    out.push_str(if int_part.is_empty() { "0" } else { int_part });
    if decimals > 0 {
        out.push('.');
        out.push_str(frac_part);
        out.extend(std::iter::repeat_n('0', decimals - frac_part.len()));
    }
    Ok(out)
}

// ============================================================================
//  VALUE DECODING (Wire -> Value)
// ============================================================================

/// Decodes one value against its declared kind.
pub fn decode_value(dec: &mut Decoder, kind: &FieldKind, path: &str, depth: usize) -> Result<Value> {
    if depth > MAX_DEPTH {
        return Err(Error::RecursionLimitExceeded);
    }

    let value = match kind {
        FieldKind::Char(n) => {
            expect_tag(dec, Tag::Str, path)?;
            let s = dec.str()?;
            let len = s.chars().count();
            let mut out = s.to_string();
            out.extend(std::iter::repeat_n(' ', n.saturating_sub(len)));
            Value::Str(out)
        },
        FieldKind::Num(n) => {
            expect_tag(dec, Tag::Str, path)?;
            let s = dec.str()?.trim();
            let len = s.chars().count();
            let mut out = "0".repeat(n.saturating_sub(len));
            out.push_str(s);
            Value::Str(out)
        },
        FieldKind::Int1 => {
            expect_tag(dec, Tag::I8, path)?;
            Value::Int(dec.i8()?.into())
        },
        FieldKind::Int2 => {
            expect_tag(dec, Tag::I16, path)?;
            Value::Int(dec.i16()?.into())
        },
        FieldKind::Int4 => {
            expect_tag(dec, Tag::I32, path)?;
            Value::Int(dec.i32()?.into())
        },
        FieldKind::Float => {
            expect_tag(dec, Tag::F64, path)?;
            Value::Float(dec.f64()?)
        },
        FieldKind::Bcd { .. } => {
            expect_tag(dec, Tag::Str, path)?;
            let s = dec.str()?.trim();
            if s.is_empty() {
                Value::Float(0.0)
            } else {
                let x = s.parse::<f64>()
                    .map_err(|_| Error::ProtocolViolation(format!("{path}: malformed decimal {s:?}")))?;
                Value::Float(x)
            }
        },
        FieldKind::Date => {
            expect_tag(dec, Tag::Str, path)?;
            Value::Str(digits_or_initial(dec.str()?, DATE_INITIAL, path)?)
        },
        FieldKind::Time => {
            expect_tag(dec, Tag::Str, path)?;
            Value::Str(digits_or_initial(dec.str()?, TIME_INITIAL, path)?)
        },
        FieldKind::Byte(n) => {
            expect_tag(dec, Tag::Bytes, path)?;
            let mut b = dec.bytes()?.to_vec();
            if b.len() < *n {
                b.resize(*n, 0);
            }
            Value::Bytes(b)
        },
        FieldKind::String => {
            expect_tag(dec, Tag::Str, path)?;
            Value::Str(dec.str()?.to_string())
        },
        FieldKind::XString => {
            expect_tag(dec, Tag::Bytes, path)?;
            Value::Bytes(dec.bytes()?.to_vec())
        },
        FieldKind::Structure(desc) => Value::Struct(decode_struct(dec, desc, path, depth)?),
        FieldKind::Table(desc) => {
            expect_tag(dec, Tag::List, path)?;
            let mut rows = Vec::new();
            let mut iter = dec.list()?;
            while let Some(mut row) = iter.next()? {
                let row_path = format!("{path}[{}]", rows.len());
                rows.push(decode_struct(&mut row, desc, &row_path, depth)?);
            }
            Value::Table(rows)
        },
    };
    Ok(value)
}

fn expect_tag(dec: &Decoder, expected: Tag, path: &str) -> Result<()> {
    let found = dec.peek_tag()?;
    if found != expected {
        return Err(Error::TypeMismatch { field: path.to_string(), expected, found });
    }
    Ok(())
}

fn decode_struct(dec: &mut Decoder, desc: &StructDesc, path: &str, depth: usize) -> Result<Record> {
    expect_tag(dec, Tag::Record, path)?;
    let mut wire = collect_entries(dec)?;

    let mut out = Record::new();
    for FieldDesc { name, kind } in desc.fields() {
        let value = match take_entry(&mut wire, name) {
            Some(mut val) => decode_value(&mut val, kind, &format!("{path}.{name}"), depth + 1)?,
            None => default_value(kind),
        };
        out.insert(name.clone(), value);
    }
    Ok(out)
}

/// Empty or blank date/time text means "no value". Anything else must be
/// exactly as many digits as the initial value.
fn digits_or_initial(s: &str, initial: &str, path: &str) -> Result<String> {
    if s.trim().is_empty() {
        return Ok(initial.to_string());
    }
    if s.len() != initial.len() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return Err(Error::ProtocolViolation(format!(
            "{path}: expected {} digits, found {s:?}",
            initial.len()
        )));
    }
    Ok(s.to_string())
}
