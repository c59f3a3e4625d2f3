//! # Field Descriptors
//!
//! The typed contract of a remote procedure: parameters, their directions and
//! a closed `FieldKind` per field.
//!
//! ## Invariants
//! - **Unique Names**: Names are unique within one nesting level.
//! - **Tree Shaped**: Nested structures are shared through `Arc` and built bottom
//!   up, so a descriptor can never contain itself. Depth is capped at `MAX_DEPTH`.
//! - **Immutable**: Nothing here changes after construction.

use std::sync::Arc;

use crate::error::Error;
use crate::error::Result;
use crate::MAX_DEPTH;

/// Direction of a parameter as seen from the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Import,
    Export,
    Changing,
    Tables,
}

impl Direction {
    /// True if the caller may send a value for this parameter.
    pub fn is_inbound(self) -> bool {
        !matches!(self, Direction::Export)
    }

    /// True if the parameter appears in invocation results.
    pub fn is_outbound(self) -> bool {
        !matches!(self, Direction::Import)
    }

    pub fn as_sap(self) -> &'static str {
        match self {
            Direction::Import => "RFC_IMPORT",
            Direction::Export => "RFC_EXPORT",
            Direction::Changing => "RFC_CHANGING",
            Direction::Tables => "RFC_TABLES",
        }
    }

    pub(crate) fn as_tag(self) -> &'static str {
        match self {
            Direction::Import => "import",
            Direction::Export => "export",
            Direction::Changing => "changing",
            Direction::Tables => "tables",
        }
    }

    pub(crate) fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "import" => Some(Direction::Import),
            "export" => Some(Direction::Export),
            "changing" => Some(Direction::Changing),
            "tables" => Some(Direction::Tables),
            _ => None,
        }
    }
}

/// The closed set of field kinds the codec understands.
///
/// Widths of `Char` and `Num` count characters; widths of `Byte` and `Bcd`
/// count bytes.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldKind {
    Char(usize),
    Num(usize),
    Int1,
    Int2,
    Int4,
    Float,
    Bcd { length: usize, decimals: usize },
    Date,
    Time,
    Byte(usize),
    String,
    XString,
    Structure(Arc<StructDesc>),
    Table(Arc<StructDesc>),
}

impl FieldKind {
    pub fn sap_type(&self) -> &'static str {
        match self {
            FieldKind::Char(_) => "RFCTYPE_CHAR",
            FieldKind::Num(_) => "RFCTYPE_NUM",
            FieldKind::Int1 => "RFCTYPE_INT1",
            FieldKind::Int2 => "RFCTYPE_INT2",
            FieldKind::Int4 => "RFCTYPE_INT",
            FieldKind::Float => "RFCTYPE_FLOAT",
            FieldKind::Bcd { .. } => "RFCTYPE_BCD",
            FieldKind::Date => "RFCTYPE_DATE",
            FieldKind::Time => "RFCTYPE_TIME",
            FieldKind::Byte(_) => "RFCTYPE_BYTE",
            FieldKind::String => "RFCTYPE_STRING",
            FieldKind::XString => "RFCTYPE_XSTRING",
            FieldKind::Structure(_) => "RFCTYPE_STRUCTURE",
            FieldKind::Table(_) => "RFCTYPE_TABLE",
        }
    }

    /// Short lowercase name used on the wire and in diagnostics.
    pub fn name(&self) -> &'static str {
        match self {
            FieldKind::Char(_) => "char",
            FieldKind::Num(_) => "num",
            FieldKind::Int1 => "int1",
            FieldKind::Int2 => "int2",
            FieldKind::Int4 => "int",
            FieldKind::Float => "float",
            FieldKind::Bcd { .. } => "bcd",
            FieldKind::Date => "date",
            FieldKind::Time => "time",
            FieldKind::Byte(_) => "byte",
            FieldKind::String => "string",
            FieldKind::XString => "xstring",
            FieldKind::Structure(_) => "structure",
            FieldKind::Table(_) => "table",
        }
    }

    /// Declared length in the remote system's non-unicode layout.
    ///
    /// Variable length kinds and tables report zero.
    pub fn length(&self) -> usize {
        match self {
            FieldKind::Char(n) | FieldKind::Num(n) | FieldKind::Byte(n) => *n,
            FieldKind::Bcd { length, .. } => *length,
            FieldKind::Int1 => 1,
            FieldKind::Int2 => 2,
            FieldKind::Int4 => 4,
            FieldKind::Float => 8,
            FieldKind::Date => 8,
            FieldKind::Time => 6,
            FieldKind::String | FieldKind::XString | FieldKind::Table(_) => 0,
            FieldKind::Structure(desc) => desc.fields().iter().map(|f| f.kind.length()).sum(),
        }
    }

    /// Nesting depth below this kind. Scalars are zero.
    pub fn depth(&self) -> usize {
        match self {
            FieldKind::Structure(desc) | FieldKind::Table(desc) => 1 + desc.depth(),
            _ => 0,
        }
    }
}

/// A named field inside a structure.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDesc {
    pub name: String,
    pub kind: FieldKind,
}

impl FieldDesc {
    pub fn new(name: impl Into<String>, kind: FieldKind) -> Self {
        Self { name: name.into(), kind }
    }
}

/// The shape of a structure or of one table row.
#[derive(Debug, Clone, PartialEq)]
pub struct StructDesc {
    name: String,
    fields: Vec<FieldDesc>,
}

impl StructDesc {
    /// Builds a structure type, rejecting duplicate or empty field names and
    /// nesting deeper than `MAX_DEPTH`.
    ///
    /// A structure used as a field adds one level, so its own members may
    /// nest at most `MAX_DEPTH - 1` levels. The deepest leaf then sits at
    /// codec depth `MAX_DEPTH`.
    pub fn new(name: impl Into<String>, fields: Vec<FieldDesc>) -> Result<Self> {
        let name = name.into();
        check_names(&name, fields.iter().map(|f| f.name.as_str()))?;
        let desc = Self { name, fields };
        if desc.depth() >= MAX_DEPTH {
            return Err(Error::InvalidSignature(format!("{} nests deeper than {MAX_DEPTH} levels", desc.name)));
        }
        Ok(desc)
    }

    /// The remote dictionary type name.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn fields(&self) -> &[FieldDesc] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&FieldDesc> {
        self.fields.iter().find(|f| f.name == name)
    }

    fn depth(&self) -> usize {
        self.fields.iter().map(|f| f.kind.depth()).max().unwrap_or(0)
    }
}

/// A top-level parameter of a procedure.
#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    pub name: String,
    pub kind: FieldKind,
    pub direction: Direction,
    pub description: Option<String>,
    pub optional: bool,
}

impl Parameter {
    pub fn new(name: impl Into<String>, direction: Direction, kind: FieldKind) -> Self {
        Self { name: name.into(), kind, direction, description: None, optional: false }
    }

    pub fn describe(mut self, text: impl Into<String>) -> Self {
        self.description = Some(text.into());
        self
    }

    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }
}

/// The ordered parameter contract of one remote procedure.
#[derive(Debug, Clone, PartialEq)]
pub struct Signature {
    name: String,
    params: Vec<Parameter>,
}

impl Signature {
    pub fn new(name: impl Into<String>, params: Vec<Parameter>) -> Result<Self> {
        let name = name.into();
        if name.is_empty() {
            return Err(Error::InvalidSignature("procedure name is empty".into()));
        }
        check_names(&name, params.iter().map(|p| p.name.as_str()))?;
        if let Some(p) = params.iter().find(|p| p.kind.depth() > MAX_DEPTH) {
            return Err(Error::InvalidSignature(format!("{} nests deeper than {MAX_DEPTH} levels", p.name)));
        }
        Ok(Self { name, params })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Parameters in declaration order.
    pub fn params(&self) -> &[Parameter] {
        &self.params
    }

    pub fn param(&self, name: &str) -> Option<&Parameter> {
        self.params.iter().find(|p| p.name == name)
    }

    /// Parameters that appear in invocation results.
    pub fn outbound(&self) -> impl Iterator<Item = &Parameter> {
        self.params.iter().filter(|p| p.direction.is_outbound())
    }
}

fn check_names<'a>(owner: &str, names: impl Iterator<Item = &'a str>) -> Result<()> {
    let mut seen: Vec<&str> = Vec::new();
    for name in names {
        if name.is_empty() {
            return Err(Error::InvalidSignature(format!("{owner} has a field without a name")));
        }
        if seen.contains(&name) {
            return Err(Error::InvalidSignature(format!("{owner} declares {name} twice")));
        }
        seen.push(name);
    }
    Ok(())
}
