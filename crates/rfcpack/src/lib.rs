//! # Rfcpack
//!
//! The bounded tag-length-value wire format spoken between the client and the
//! remote application server.
//!
//! ## Philosophy
//!
//! - **Explicit State**: The encoder tracks every open container on a scope stack
//!   and back-patches lengths when the container closes. No hidden buffering.
//! - **TLV Architecture**: `[Tag][Length?][Value]` lets a reader skip entries it
//!   does not understand, so newer servers can add reply fields.
//! - **Zero-Copy Reads**: Decoders are bounds-checked views over the input slice.
//!
//! ## Format
//!
//! - **Scalars**: `[Tag: 1b][Data: N]`
//! - **Blobs**: `[Tag: 1b][Len: 4b][Data: Len]`
//! - **Containers**: `[Tag: 1b][Len: 4b][Body: Len]`
//!
//! All integers are Little-Endian.

#[cfg(test)]
mod tests;

/// Wire format errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// Byte does not correspond to a valid `Tag`.
    #[error("invalid tag byte {0:#04x}")]
    InvalidTag(u8),
    /// A value of one tag was read where another was expected.
    #[error("unexpected tag: expected {expected:?}, found {found:?}")]
    UnexpectedTag { expected: Tag, found: Tag },
    /// String data is not valid UTF-8.
    #[error("string is not valid utf-8")]
    InvalidUtf8,
    /// Closing a scope that does not match the innermost open scope.
    #[error("scope mismatch: expected {expected:?}, found {actual:?}")]
    ScopeMismatch { expected: Scope, actual: Scope },
    /// Attempted to close a scope when only the root remains.
    #[error("scope underflow")]
    ScopeUnderflow,
    /// Attempted to finalize the buffer with open scopes.
    #[error("scope still open")]
    ScopeStillOpen,
    /// Buffer exhausted while reading.
    #[error("unexpected end of input")]
    UnexpectedEnd,
    /// Blob or container length exceeds `u32::MAX`.
    #[error("blob of {0} bytes is too large")]
    BlobTooLarge(usize),
    /// A strict scope (entry, result) received a second item.
    #[error("too many items in scope {0:?}; expected exactly 1")]
    TooManyItems(Scope),
    /// A strict scope (entry, result) was closed without its item.
    #[error("empty scope {0:?}; expected exactly 1 item")]
    EmptyScope(Scope),
    /// Something other than an entry was written directly into a record.
    #[error("records only accept named entries")]
    InvalidRecordItem,
}

/// Specialized `Result` for wire operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Identifies the type of the encoded value.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tag {
    Unit = 0x00,
    True = 0x01,
    False = 0x02,
    I8 = 0x03,
    I16 = 0x04,
    I32 = 0x05,
    I64 = 0x06,
    U32 = 0x07,
    U64 = 0x08,
    F64 = 0x09,

    // Blobs (Tag + u32 Len + Bytes)
    Str = 0x10,
    Bytes = 0x11,

    // Containers (Tag + u32 Len + Body)
    List = 0x20,
    Record = 0x21,
    Entry = 0x22,
    Ok = 0x30,
    Err = 0x31,
}

impl Tag {
    /// Returns the Tag for a given byte, or `None` if invalid.
    pub fn from_u8(b: u8) -> Option<Self> {
        let tag = match b {
            0x00 => Tag::Unit,
            0x01 => Tag::True,
            0x02 => Tag::False,
            0x03 => Tag::I8,
            0x04 => Tag::I16,
            0x05 => Tag::I32,
            0x06 => Tag::I64,
            0x07 => Tag::U32,
            0x08 => Tag::U64,
            0x09 => Tag::F64,
            0x10 => Tag::Str,
            0x11 => Tag::Bytes,
            0x20 => Tag::List,
            0x21 => Tag::Record,
            0x22 => Tag::Entry,
            0x30 => Tag::Ok,
            0x31 => Tag::Err,
            _ => return None,
        };
        Some(tag)
    }

    /// Size of the fixed payload following the tag, or `None` for length-prefixed tags.
    fn fixed_width(self) -> Option<usize> {
        match self {
            Tag::Unit | Tag::True | Tag::False => Some(0),
            Tag::I8 => Some(1),
            Tag::I16 => Some(2),
            Tag::I32 | Tag::U32 => Some(4),
            Tag::I64 | Tag::U64 | Tag::F64 => Some(8),
            Tag::Str | Tag::Bytes | Tag::List | Tag::Record | Tag::Entry | Tag::Ok | Tag::Err => None,
        }
    }
}

/// Container kinds tracked on the `Encoder` stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    /// The virtual root; allows any item.
    Root,
    /// Ordered sequence; allows any number of items.
    List,
    /// Ordered named fields; only entries may be written.
    Record,
    /// A name plus exactly one payload item.
    Entry,
    /// Ok/Err wrapper; exactly one item.
    Result,
}

struct Frame {
    start: usize,
    scope: Scope,
    count: usize,
}

/// A bounded, state-machine driven encoder.
///
/// # Structural Invariants
///
/// 1. **Record Scopes**: Only entries may be written.
/// 2. **Entry/Result Scopes**: Exactly one item must be written.
/// 3. **Root Scope**: The encoder must be back at the root to finalize bytes.
pub struct Encoder {
    buf: Vec<u8>,
    root: Frame,
    stack: Vec<Frame>,
}

impl Default for Encoder {
    fn default() -> Self {
        Self::new()
    }
}

impl Encoder {
    pub fn new() -> Self {
        Self {
            buf: Vec::with_capacity(512),
            root: Frame { start: 0, scope: Scope::Root, count: 0 },
            stack: Vec::with_capacity(8),
        }
    }

    /// Consumes the encoder and returns the encoded bytes.
    pub fn into_bytes(self) -> Result<Vec<u8>> {
        if !self.stack.is_empty() {
            return Err(Error::ScopeStillOpen);
        }
        Ok(self.buf)
    }

    /// Number of items written at the root so far.
    pub fn root_items(&self) -> usize {
        self.root.count
    }

    fn current(&mut self) -> &mut Frame {
        match self.stack.last_mut() {
            Some(frame) => frame,
            None => &mut self.root,
        }
    }

    fn check_write(&mut self, tag: Tag) -> Result<()> {
        let frame = self.current();
        match frame.scope {
            Scope::Root | Scope::List => Ok(()),
            Scope::Record if tag == Tag::Entry => Ok(()),
            Scope::Record => Err(Error::InvalidRecordItem),
            Scope::Entry | Scope::Result if frame.count >= 1 => Err(Error::TooManyItems(frame.scope)),
            Scope::Entry | Scope::Result => Ok(()),
        }
    }

    fn scalar(&mut self, tag: Tag, data: &[u8]) -> Result<()> {
        self.check_write(tag)?;
        self.buf.push(tag as u8);
        self.buf.extend_from_slice(data);
        self.current().count += 1;
        Ok(())
    }

    fn blob(&mut self, tag: Tag, data: &[u8]) -> Result<()> {
        let len = u32::try_from(data.len()).map_err(|_| Error::BlobTooLarge(data.len()))?;
        self.check_write(tag)?;
        self.buf.push(tag as u8);
        self.buf.extend_from_slice(&len.to_le_bytes());
        self.buf.extend_from_slice(data);
        self.current().count += 1;
        Ok(())
    }

    fn begin(&mut self, tag: Tag, scope: Scope) -> Result<()> {
        self.check_write(tag)?;
        self.buf.push(tag as u8);
        self.buf.extend_from_slice(&[0, 0, 0, 0]);
        self.stack.push(Frame { start: self.buf.len(), scope, count: 0 });
        Ok(())
    }

    fn end(&mut self, expected: Scope) -> Result<()> {
        let frame = self.stack.pop().ok_or(Error::ScopeUnderflow)?;
        if frame.scope != expected {
            let actual = frame.scope;
            self.stack.push(frame);
            return Err(Error::ScopeMismatch { expected, actual });
        }
        if matches!(frame.scope, Scope::Entry | Scope::Result) && frame.count == 0 {
            let scope = frame.scope;
            self.stack.push(frame);
            return Err(Error::EmptyScope(scope));
        }

        let body_len = self.buf.len() - frame.start;
        let len = u32::try_from(body_len).map_err(|_| Error::BlobTooLarge(body_len))?;
        self.buf[frame.start - 4..frame.start].copy_from_slice(&len.to_le_bytes());
        self.current().count += 1;
        Ok(())
    }

    pub fn unit(&mut self) -> Result<()> { self.scalar(Tag::Unit, &[]) }
    pub fn bool(&mut self, v: bool) -> Result<()> { self.scalar(if v { Tag::True } else { Tag::False }, &[]) }
    pub fn i8(&mut self, v: i8) -> Result<()> { self.scalar(Tag::I8, &v.to_le_bytes()) }
    pub fn i16(&mut self, v: i16) -> Result<()> { self.scalar(Tag::I16, &v.to_le_bytes()) }
    pub fn i32(&mut self, v: i32) -> Result<()> { self.scalar(Tag::I32, &v.to_le_bytes()) }
    pub fn i64(&mut self, v: i64) -> Result<()> { self.scalar(Tag::I64, &v.to_le_bytes()) }
    pub fn u32(&mut self, v: u32) -> Result<()> { self.scalar(Tag::U32, &v.to_le_bytes()) }
    pub fn u64(&mut self, v: u64) -> Result<()> { self.scalar(Tag::U64, &v.to_le_bytes()) }
    pub fn f64(&mut self, v: f64) -> Result<()> { self.scalar(Tag::F64, &v.to_le_bytes()) }

    /// Encodes a UTF-8 string blob.
    pub fn str(&mut self, v: &str) -> Result<()> { self.blob(Tag::Str, v.as_bytes()) }

    /// Encodes a raw byte blob.
    pub fn bytes(&mut self, v: &[u8]) -> Result<()> { self.blob(Tag::Bytes, v) }

    /// Begins a list. Any number of items.
    pub fn list_begin(&mut self) -> Result<()> { self.begin(Tag::List, Scope::List) }
    pub fn list_end(&mut self) -> Result<()> { self.end(Scope::List) }

    /// Begins a record. Only `entry_begin` may follow until `record_end`.
    pub fn record_begin(&mut self) -> Result<()> { self.begin(Tag::Record, Scope::Record) }
    pub fn record_end(&mut self) -> Result<()> { self.end(Scope::Record) }

    /// Begins a named entry. Exactly one payload item must follow.
    pub fn entry_begin(&mut self, name: &str) -> Result<()> {
        self.begin(Tag::Entry, Scope::Entry)?;
        self.str(name)?;
        // the name is metadata, not the payload
        self.current().count = 0;
        Ok(())
    }
    pub fn entry_end(&mut self) -> Result<()> { self.end(Scope::Entry) }

    pub fn ok_begin(&mut self) -> Result<()> { self.begin(Tag::Ok, Scope::Result) }
    pub fn ok_end(&mut self) -> Result<()> { self.end(Scope::Result) }
    pub fn err_begin(&mut self) -> Result<()> { self.begin(Tag::Err, Scope::Result) }
    pub fn err_end(&mut self) -> Result<()> { self.end(Scope::Result) }

    /// Writes `name => str` inside a record.
    pub fn entry_str(&mut self, name: &str, v: &str) -> Result<()> {
        self.entry_begin(name)?;
        self.str(v)?;
        self.entry_end()
    }

    /// Writes `name => u64` inside a record.
    pub fn entry_u64(&mut self, name: &str, v: u64) -> Result<()> {
        self.entry_begin(name)?;
        self.u64(v)?;
        self.entry_end()
    }

    /// Writes `name => i32` inside a record.
    pub fn entry_i32(&mut self, name: &str, v: i32) -> Result<()> {
        self.entry_begin(name)?;
        self.i32(v)?;
        self.entry_end()
    }
}

/// A zero-copy, bounds-checked cursor over a byte slice.
///
/// Container reads return new `Decoder`s restricted to the container body.
#[derive(Debug, Clone)]
pub struct Decoder<'a> {
    buf: &'a [u8],
}

impl<'a> Decoder<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf }
    }

    /// Returns the remaining bytes in the view.
    pub fn remaining(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Peeks the next Tag without advancing.
    pub fn peek_tag(&self) -> Result<Tag> {
        let b = *self.buf.first().ok_or(Error::UnexpectedEnd)?;
        Tag::from_u8(b).ok_or(Error::InvalidTag(b))
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        if n > self.buf.len() {
            return Err(Error::UnexpectedEnd);
        }
        let (head, tail) = self.buf.split_at(n);
        self.buf = tail;
        Ok(head)
    }

    fn take_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    fn take_len(&mut self) -> Result<usize> {
        Ok(u32::from_le_bytes(self.take_array()?) as usize)
    }

    fn expect(&mut self, expected: Tag) -> Result<()> {
        let found = self.peek_tag()?;
        if found != expected {
            return Err(Error::UnexpectedTag { expected, found });
        }
        self.take(1)?;
        Ok(())
    }

    /// Skips the next item including any nested children.
    pub fn skip(&mut self) -> Result<()> {
        let tag = self.peek_tag()?;
        self.take(1)?;
        match tag.fixed_width() {
            Some(n) => self.take(n)?,
            None => {
                let len = self.take_len()?;
                self.take(len)?
            }
        };
        Ok(())
    }

    pub fn unit(&mut self) -> Result<()> { self.expect(Tag::Unit) }

    pub fn bool(&mut self) -> Result<bool> {
        match self.peek_tag()? {
            Tag::True => { self.take(1)?; Ok(true) }
            Tag::False => { self.take(1)?; Ok(false) }
            found => Err(Error::UnexpectedTag { expected: Tag::True, found }),
        }
    }

    pub fn i8(&mut self) -> Result<i8> { self.expect(Tag::I8)?; Ok(i8::from_le_bytes(self.take_array()?)) }
    pub fn i16(&mut self) -> Result<i16> { self.expect(Tag::I16)?; Ok(i16::from_le_bytes(self.take_array()?)) }
    pub fn i32(&mut self) -> Result<i32> { self.expect(Tag::I32)?; Ok(i32::from_le_bytes(self.take_array()?)) }
    pub fn i64(&mut self) -> Result<i64> { self.expect(Tag::I64)?; Ok(i64::from_le_bytes(self.take_array()?)) }
    pub fn u32(&mut self) -> Result<u32> { self.expect(Tag::U32)?; Ok(u32::from_le_bytes(self.take_array()?)) }
    pub fn u64(&mut self) -> Result<u64> { self.expect(Tag::U64)?; Ok(u64::from_le_bytes(self.take_array()?)) }
    pub fn f64(&mut self) -> Result<f64> { self.expect(Tag::F64)?; Ok(f64::from_le_bytes(self.take_array()?)) }

    /// Decodes a string slice (UTF-8).
    pub fn str(&mut self) -> Result<&'a str> {
        self.expect(Tag::Str)?;
        let len = self.take_len()?;
        std::str::from_utf8(self.take(len)?).map_err(|_| Error::InvalidUtf8)
    }

    /// Decodes a byte slice.
    pub fn bytes(&mut self) -> Result<&'a [u8]> {
        self.expect(Tag::Bytes)?;
        let len = self.take_len()?;
        self.take(len)
    }

    fn enter(&mut self, expected: Tag) -> Result<Decoder<'a>> {
        self.expect(expected)?;
        let len = self.take_len()?;
        Ok(Decoder::new(self.take(len)?))
    }

    /// Decodes a list into an iterator over item decoders.
    pub fn list(&mut self) -> Result<ListIter<'a>> {
        Ok(ListIter { dec: self.enter(Tag::List)? })
    }

    /// Decodes a record into an iterator over `(name, payload)` pairs.
    pub fn record(&mut self) -> Result<RecordIter<'a>> {
        Ok(RecordIter { dec: self.enter(Tag::Record)? })
    }

    /// Decodes a single entry, returning `(name, payload)`.
    pub fn entry(&mut self) -> Result<(&'a str, Decoder<'a>)> {
        let mut inner = self.enter(Tag::Entry)?;
        let name = inner.str()?;
        Ok((name, inner))
    }

    /// Decodes an Ok/Err wrapper.
    pub fn result(&mut self) -> Result<std::result::Result<Decoder<'a>, Decoder<'a>>> {
        match self.peek_tag()? {
            Tag::Ok => Ok(Ok(self.enter(Tag::Ok)?)),
            Tag::Err => Ok(Err(self.enter(Tag::Err)?)),
            found => Err(Error::UnexpectedTag { expected: Tag::Ok, found }),
        }
    }
}

/// Iterator over the items of a list.
#[derive(Debug)]
pub struct ListIter<'a> {
    dec: Decoder<'a>,
}

impl<'a> ListIter<'a> {
    /// Returns a decoder scoped to the next item, or `None` at the end.
    pub fn next(&mut self) -> Result<Option<Decoder<'a>>> {
        if self.dec.is_empty() {
            return Ok(None);
        }
        let mut probe = self.dec.clone();
        probe.skip()?;
        let len = self.dec.remaining() - probe.remaining();
        Ok(Some(Decoder::new(self.dec.take(len)?)))
    }
}

/// Iterator over the named entries of a record.
#[derive(Debug)]
pub struct RecordIter<'a> {
    dec: Decoder<'a>,
}

impl<'a> RecordIter<'a> {
    /// Returns `(name, payload)` for the next entry, or `None` at the end.
    pub fn next(&mut self) -> Result<Option<(&'a str, Decoder<'a>)>> {
        if self.dec.is_empty() {
            return Ok(None);
        }
        self.dec.entry().map(Some)
    }
}
