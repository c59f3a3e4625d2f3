//! # Schema Description
//!
//! A declarative, serde-serialisable projection of a `Signature` in the
//! JSON-schema-like shape external validation tooling expects. Property order
//! is the signature's declaration order.

use serde::Serialize;
use serde::ser::SerializeMap;
use serde::ser::Serializer;

use crate::types::Direction;
use crate::types::FieldKind;
use crate::types::Signature;
use crate::types::StructDesc;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SchemaDescription {
    pub title: String,
    #[serde(rename = "type")]
    pub ty: &'static str,
    pub properties: Properties,
}

impl SchemaDescription {
    pub fn from_signature(sig: &Signature) -> Self {
        let properties = sig
            .params()
            .iter()
            .map(|p| {
                let mut prop = PropertySchema::from_kind(&p.kind);
                prop.description = p.description.clone();
                prop.sap_direction = Some(p.direction);
                (p.name.clone(), prop)
            })
            .collect();

        Self {
            title: format!("Signature of SAP RFC function {}", sig.name()),
            ty: "object",
            properties: Properties(properties),
        }
    }

    pub fn property(&self, name: &str) -> Option<&PropertySchema> {
        self.properties.get(name)
    }
}

/// Ordered `name -> schema` pairs, serialised as a map.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Properties(pub Vec<(String, PropertySchema)>);

impl Properties {
    pub fn get(&self, name: &str) -> Option<&PropertySchema> {
        self.0.iter().find(|(k, _)| k == name).map(|(_, v)| v)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|(k, _)| k.as_str())
    }
}

impl Serialize for Properties {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (name, prop) in &self.0 {
            map.serialize_entry(name, prop)?;
        }
        map.end()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PropertySchema {
    #[serde(rename = "type")]
    pub ty: &'static str,
    pub length: String,
    #[serde(rename = "sapType")]
    pub sap_type: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(rename = "sapDirection", skip_serializing_if = "Option::is_none", serialize_with = "direction")]
    pub sap_direction: Option<Direction>,
    #[serde(rename = "sapTypeName", skip_serializing_if = "Option::is_none")]
    pub sap_type_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub properties: Option<Properties>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub items: Option<ItemsSchema>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ItemsSchema {
    #[serde(rename = "sapTypeName")]
    pub sap_type_name: String,
    #[serde(rename = "type")]
    pub ty: &'static str,
    pub properties: Properties,
}

impl PropertySchema {
    fn from_kind(kind: &FieldKind) -> Self {
        let mut prop = PropertySchema {
            ty: json_type(kind),
            length: kind.length().to_string(),
            sap_type: kind.sap_type(),
            description: None,
            sap_direction: None,
            sap_type_name: None,
            properties: None,
            items: None,
        };

        match kind {
            FieldKind::Structure(desc) => {
                prop.sap_type_name = Some(desc.name().to_string());
                prop.properties = Some(fields_of(desc));
            },
            FieldKind::Table(desc) => {
                prop.items = Some(ItemsSchema {
                    sap_type_name: desc.name().to_string(),
                    ty: "object",
                    properties: fields_of(desc),
                });
            },
            _ => {},
        }
        prop
    }
}

fn fields_of(desc: &StructDesc) -> Properties {
    Properties(
        desc.fields()
            .iter()
            .map(|f| (f.name.clone(), PropertySchema::from_kind(&f.kind)))
            .collect(),
    )
}

fn json_type(kind: &FieldKind) -> &'static str {
    match kind {
        FieldKind::Char(_)
        | FieldKind::Num(_)
        | FieldKind::Date
        | FieldKind::Time
        | FieldKind::Byte(_)
        | FieldKind::String
        | FieldKind::XString => "string",
        FieldKind::Int1 | FieldKind::Int2 | FieldKind::Int4 => "integer",
        FieldKind::Float | FieldKind::Bcd { .. } => "number",
        FieldKind::Structure(_) => "object",
        FieldKind::Table(_) => "array",
    }
}

fn direction<S: Serializer>(dir: &Option<Direction>, serializer: S) -> Result<S::Ok, S::Error> {
    match dir {
        Some(d) => serializer.serialize_str(d.as_sap()),
        None => serializer.serialize_none(),
    }
}
