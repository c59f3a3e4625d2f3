use crate::*;

// ============================================================================
//  SCALAR TESTS (Happy Path)
// ============================================================================

#[test]
fn test_bool_and_unit() -> Result<()> {
    let mut enc = Encoder::new();
    enc.bool(true)?;
    enc.unit()?;
    enc.bool(false)?;

    let bytes = enc.into_bytes()?;
    let mut dec = Decoder::new(&bytes);

    assert!(dec.bool()?);
    dec.unit()?;
    assert!(!dec.bool()?);
    assert_eq!(dec.remaining(), 0);
    Ok(())
}

#[test]
fn test_integer_extremes() -> Result<()> {
    let mut enc = Encoder::new();
    enc.i8(i8::MIN)?;
    enc.i16(i16::MAX)?;
    enc.i32(i32::MIN)?;
    enc.i64(i64::MAX)?;
    enc.u32(u32::MAX)?;
    enc.u64(0)?;

    let bytes = enc.into_bytes()?;
    let mut dec = Decoder::new(&bytes);

    assert_eq!(dec.i8()?, i8::MIN);
    assert_eq!(dec.i16()?, i16::MAX);
    assert_eq!(dec.i32()?, i32::MIN);
    assert_eq!(dec.i64()?, i64::MAX);
    assert_eq!(dec.u32()?, u32::MAX);
    assert_eq!(dec.u64()?, 0);
    assert!(dec.is_empty());
    Ok(())
}

#[test]
fn test_float_keeps_bits() -> Result<()> {
    let mut enc = Encoder::new();
    enc.f64(-0.0)?;
    enc.f64(123.456)?;

    let bytes = enc.into_bytes()?;
    let mut dec = Decoder::new(&bytes);

    assert_eq!(dec.f64()?.to_bits(), (-0.0f64).to_bits());
    assert_eq!(dec.f64()?, 123.456);
    Ok(())
}

// ============================================================================
//  BLOB TESTS
// ============================================================================

#[test]
fn test_strings_and_bytes() -> Result<()> {
    let mut enc = Encoder::new();
    enc.str("")?;
    enc.str("Grüße")?;
    enc.bytes(&[0xDE, 0xAD, 0xBE, 0xEF])?;

    let bytes = enc.into_bytes()?;
    let mut dec = Decoder::new(&bytes);

    assert_eq!(dec.str()?, "");
    assert_eq!(dec.str()?, "Grüße");
    assert_eq!(dec.bytes()?, &[0xDE, 0xAD, 0xBE, 0xEF]);
    Ok(())
}

// ============================================================================
//  CONTAINER TESTS
// ============================================================================

#[test]
fn test_list_of_records() -> Result<()> {
    let mut enc = Encoder::new();
    enc.list_begin()?;
    for i in 0..3 {
        enc.record_begin()?;
        enc.entry_i32("ID", i)?;
        enc.entry_str("NAME", "row")?;
        enc.record_end()?;
    }
    enc.list_end()?;

    let bytes = enc.into_bytes()?;
    let mut dec = Decoder::new(&bytes);
    let mut rows = dec.list()?;
    let mut seen = 0;
    while let Some(mut row) = rows.next()? {
        let mut fields = row.record()?;
        let (name, mut v) = fields.next()?.ok_or(Error::UnexpectedEnd)?;
        assert_eq!(name, "ID");
        assert_eq!(v.i32()?, seen);
        let (name, mut v) = fields.next()?.ok_or(Error::UnexpectedEnd)?;
        assert_eq!(name, "NAME");
        assert_eq!(v.str()?, "row");
        assert!(fields.next()?.is_none());
        seen += 1;
    }
    assert_eq!(seen, 3);
    Ok(())
}

#[test]
fn test_empty_record() -> Result<()> {
    let mut enc = Encoder::new();
    enc.record_begin()?;
    enc.record_end()?;

    let bytes = enc.into_bytes()?;
    let mut dec = Decoder::new(&bytes);
    assert!(dec.record()?.next()?.is_none());
    Ok(())
}

#[test]
fn test_result_ok_and_err() -> Result<()> {
    let mut enc = Encoder::new();
    enc.ok_begin()?;
    enc.u64(7)?;
    enc.ok_end()?;
    enc.err_begin()?;
    enc.str("boom")?;
    enc.err_end()?;

    let bytes = enc.into_bytes()?;
    let mut dec = Decoder::new(&bytes);

    match dec.result()? {
        Ok(mut inner) => assert_eq!(inner.u64()?, 7),
        Err(_) => panic!("Expected Ok"),
    }
    match dec.result()? {
        Err(mut inner) => assert_eq!(inner.str()?, "boom"),
        Ok(_) => panic!("Expected Err"),
    }
    Ok(())
}

#[test]
fn test_root_item_count() -> Result<()> {
    let mut enc = Encoder::new();
    enc.list_begin()?;
    enc.u32(1)?;
    enc.u32(2)?;
    enc.list_end()?;
    enc.unit()?;
    assert_eq!(enc.root_items(), 2);
    Ok(())
}

// ============================================================================
//  SKIPPING
// ============================================================================

#[test]
fn test_skip_unknown_entries() -> Result<()> {
    let mut enc = Encoder::new();
    enc.record_begin()?;
    enc.entry_begin("FUTURE")?;
    enc.list_begin()?;
    enc.str("nested")?;
    enc.f64(1.5)?;
    enc.list_end()?;
    enc.entry_end()?;
    enc.entry_u64("seq", 42)?;
    enc.record_end()?;

    let bytes = enc.into_bytes()?;
    let mut dec = Decoder::new(&bytes);
    let mut fields = dec.record()?;
    let mut seq = None;
    while let Some((name, mut v)) = fields.next()? {
        match name {
            "seq" => seq = Some(v.u64()?),
            _ => v.skip()?,
        }
    }
    assert_eq!(seq, Some(42));
    Ok(())
}

#[test]
fn test_skip_every_tag() -> Result<()> {
    let mut enc = Encoder::new();
    enc.unit()?;
    enc.bool(true)?;
    enc.i8(1)?;
    enc.i16(1)?;
    enc.i32(1)?;
    enc.i64(1)?;
    enc.u32(1)?;
    enc.u64(1)?;
    enc.f64(1.0)?;
    enc.str("s")?;
    enc.bytes(b"b")?;
    enc.list_begin()?;
    enc.list_end()?;
    enc.err_begin()?;
    enc.unit()?;
    enc.err_end()?;
    enc.str("last")?;

    let bytes = enc.into_bytes()?;
    let mut dec = Decoder::new(&bytes);
    for _ in 0..14 {
        dec.skip()?;
    }
    assert_eq!(dec.str()?, "last");
    Ok(())
}

// ============================================================================
//  ENCODER STRICTNESS FAILURE MODES
// ============================================================================

#[test]
fn test_strict_entry_empty() {
    let mut enc = Encoder::new();
    enc.record_begin().unwrap();
    enc.entry_begin("E").unwrap();
    // The name is metadata, not the payload item.
    match enc.entry_end() {
        Err(Error::EmptyScope(Scope::Entry)) => {},
        _ => panic!("Expected EmptyScope"),
    }
}

#[test]
fn test_strict_entry_too_many() {
    let mut enc = Encoder::new();
    enc.record_begin().unwrap();
    enc.entry_begin("E").unwrap();
    enc.u32(1).unwrap();
    match enc.u32(2) {
        Err(Error::TooManyItems(Scope::Entry)) => {},
        _ => panic!("Expected TooManyItems"),
    }
}

#[test]
fn test_strict_result_empty() {
    let mut enc = Encoder::new();
    enc.ok_begin().unwrap();
    match enc.ok_end() {
        Err(Error::EmptyScope(Scope::Result)) => {},
        _ => panic!("Expected EmptyScope"),
    }
}

#[test]
fn test_strict_record_rejects_scalar() {
    let mut enc = Encoder::new();
    enc.record_begin().unwrap();
    match enc.str("loose") {
        Err(Error::InvalidRecordItem) => {},
        _ => panic!("Expected InvalidRecordItem"),
    }
}

#[test]
fn test_strict_record_rejects_list() {
    let mut enc = Encoder::new();
    enc.record_begin().unwrap();
    match enc.list_begin() {
        Err(Error::InvalidRecordItem) => {},
        _ => panic!("Expected InvalidRecordItem"),
    }
}

// ============================================================================
//  ENCODER STATE ERRORS
// ============================================================================

#[test]
fn test_scope_mismatch() {
    let mut enc = Encoder::new();
    enc.list_begin().unwrap();
    match enc.record_end() {
        Err(Error::ScopeMismatch { expected, actual }) => {
            assert_eq!(expected, Scope::Record);
            assert_eq!(actual, Scope::List);
        },
        _ => panic!("Expected ScopeMismatch"),
    }
}

#[test]
fn test_scope_underflow() {
    let mut enc = Encoder::new();
    match enc.list_end() {
        Err(Error::ScopeUnderflow) => {},
        _ => panic!("Expected ScopeUnderflow"),
    }
}

#[test]
fn test_scope_still_open() {
    let mut enc = Encoder::new();
    enc.list_begin().unwrap();
    match enc.into_bytes() {
        Err(Error::ScopeStillOpen) => {},
        _ => panic!("Expected ScopeStillOpen"),
    }
}

// ============================================================================
//  DECODER FAILURE MODES
// ============================================================================

#[test]
fn test_fail_truncated_header() {
    let data = [0x10, 0x01]; // Str tag + 1 byte (need 4 for len)
    let mut dec = Decoder::new(&data);
    match dec.str() {
        Err(Error::UnexpectedEnd) => {},
        _ => panic!("Expected UnexpectedEnd"),
    }
}

#[test]
fn test_fail_truncated_body() {
    let mut data = vec![0x11];
    data.extend_from_slice(&100u32.to_le_bytes());
    data.push(0x01);

    let mut dec = Decoder::new(&data);
    match dec.bytes() {
        Err(Error::UnexpectedEnd) => {},
        _ => panic!("Expected UnexpectedEnd"),
    }
}

#[test]
fn test_fail_invalid_utf8() {
    let mut enc = Encoder::new();
    enc.bytes(&[0xFF, 0xFE]).unwrap();
    let mut raw = enc.into_bytes().unwrap();
    raw[0] = Tag::Str as u8;

    let mut dec = Decoder::new(&raw);
    match dec.str() {
        Err(Error::InvalidUtf8) => {},
        _ => panic!("Expected InvalidUtf8"),
    }
}

#[test]
fn test_fail_invalid_tag() {
    let data = [0xEE];
    let dec = Decoder::new(&data);
    match dec.peek_tag() {
        Err(Error::InvalidTag(0xEE)) => {},
        _ => panic!("Expected InvalidTag"),
    }
}

#[test]
fn test_fail_wrong_tag_does_not_advance() {
    let mut enc = Encoder::new();
    enc.i32(5).unwrap();
    let bytes = enc.into_bytes().unwrap();
    let mut dec = Decoder::new(&bytes);

    match dec.str() {
        Err(Error::UnexpectedTag { expected: Tag::Str, found: Tag::I32 }) => {},
        _ => panic!("Expected UnexpectedTag"),
    }
    assert_eq!(dec.i32().unwrap(), 5);
}

#[test]
fn test_fail_record_with_loose_item() {
    // Hand-built record whose body is a bare u32 rather than an entry.
    let mut data = vec![Tag::Record as u8];
    data.extend_from_slice(&5u32.to_le_bytes());
    data.push(Tag::U32 as u8);
    data.extend_from_slice(&1u32.to_le_bytes());

    let mut dec = Decoder::new(&data);
    let mut fields = dec.record().unwrap();
    match fields.next() {
        Err(Error::UnexpectedTag { expected: Tag::Entry, found: Tag::U32 }) => {},
        _ => panic!("Expected UnexpectedTag"),
    }
}
