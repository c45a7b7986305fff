//! Records and their schema descriptors.
//!
//! # Responsibilities
//! - Describe every field of a record: wire name, kind, coercion type, visibility
//! - Give the gateway a type-erased handle (`dyn Record`) over generated message types
//! - Encode records to JSON and populate them from JSON maps
//!
//! # Design Decisions
//! - Field metadata is an explicit static descriptor, not runtime reflection
//! - The descriptor is the single source of truth for sequence/scalar classification
//! - `Record` is blanket-implemented for any serde type that implements `Schema`

use serde::{de::DeserializeOwned, Serialize};
use serde_json::{Map, Value};
use std::any::Any;
use std::fmt;

/// Whether a field holds a single value or an ordered list of values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldKind {
    Scalar,
    Sequence,
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldKind::Scalar => f.write_str("scalar"),
            FieldKind::Sequence => f.write_str("sequence"),
        }
    }
}

/// Parses a text form into the JSON representation the field deserializes from.
pub type TextDecodeFn = fn(&str) -> Result<Value, String>;

/// Value type of a field (of each element, for sequence fields).
///
/// Only used to drive loose input coercion; encoding goes through serde.
#[derive(Clone, Copy)]
pub enum FieldType {
    Bool,
    Int,
    UInt,
    Float,
    String,
    /// Date/time, serialized as an RFC 3339 string.
    Timestamp,
    /// A type with its own text decoding.
    Text(TextDecodeFn),
    /// A nested record.
    Record(&'static RecordDescriptor),
    /// Passed through untouched.
    Any,
}

impl fmt::Debug for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldType::Bool => f.write_str("Bool"),
            FieldType::Int => f.write_str("Int"),
            FieldType::UInt => f.write_str("UInt"),
            FieldType::Float => f.write_str("Float"),
            FieldType::String => f.write_str("String"),
            FieldType::Timestamp => f.write_str("Timestamp"),
            FieldType::Text(_) => f.write_str("Text"),
            FieldType::Record(desc) => write!(f, "Record({})", desc.name),
            FieldType::Any => f.write_str("Any"),
        }
    }
}

/// Static description of one record field.
#[derive(Debug, Clone, Copy)]
pub struct FieldDescriptor {
    /// Declared field name.
    pub name: &'static str,
    /// Name used on the wire; `None` excludes the field from the wire.
    pub wire_name: Option<&'static str>,
    pub kind: FieldKind,
    pub ty: FieldType,
    /// Non-exported fields are invisible to the wire.
    pub exported: bool,
}

impl FieldDescriptor {
    pub const fn scalar(name: &'static str, ty: FieldType) -> Self {
        Self {
            name,
            wire_name: Some(name),
            kind: FieldKind::Scalar,
            ty,
            exported: true,
        }
    }

    pub const fn sequence(name: &'static str, ty: FieldType) -> Self {
        Self {
            name,
            wire_name: Some(name),
            kind: FieldKind::Sequence,
            ty,
            exported: true,
        }
    }

    /// Override the wire name.
    pub const fn wire(mut self, wire_name: &'static str) -> Self {
        self.wire_name = Some(wire_name);
        self
    }

    /// Exclude the field from the wire representation (the `-` wire name).
    pub const fn skip(mut self) -> Self {
        self.wire_name = None;
        self
    }

    pub const fn private(mut self) -> Self {
        self.exported = false;
        self
    }

    /// Wire name if the field takes part in the wire representation at all.
    pub fn visible_name(&self) -> Option<&'static str> {
        if self.exported {
            self.wire_name
        } else {
            None
        }
    }
}

/// Static description of a record type.
#[derive(Debug)]
pub struct RecordDescriptor {
    pub name: &'static str,
    pub fields: &'static [FieldDescriptor],
}

impl RecordDescriptor {
    /// Fields that take part in the wire representation, in declaration order.
    pub fn visible_fields(&self) -> impl Iterator<Item = (&'static str, &FieldDescriptor)> + '_ {
        self.fields
            .iter()
            .filter_map(|f| f.visible_name().map(|wire| (wire, f)))
    }

    pub fn field_by_wire_name(&self, wire_name: &str) -> Option<&FieldDescriptor> {
        self.visible_fields()
            .find(|(wire, _)| *wire == wire_name)
            .map(|(_, f)| f)
    }
}

/// Implemented by every concrete message type; usually generated.
pub trait Schema {
    fn descriptor() -> &'static RecordDescriptor;
}

/// Type-erased record exchanged with the RPC layer.
pub trait Record: Send + Sync + fmt::Debug + 'static {
    fn descriptor(&self) -> &'static RecordDescriptor;

    /// Append the JSON encoding of the whole record, fields in declaration order.
    fn encode_json(&self, out: &mut Vec<u8>) -> serde_json::Result<()>;

    /// JSON value of the whole record.
    fn to_value(&self) -> serde_json::Result<Value>;

    /// Replace the record's content with a strict decode of `body`.
    ///
    /// Every key of the body object must be the wire name of a visible field.
    fn decode_strict(&mut self, body: &[u8]) -> serde_json::Result<()>;

    /// Replace the record's content from an already-coerced wire-name map.
    fn populate(&mut self, map: Map<String, Value>) -> serde_json::Result<()>;

    fn as_any(&self) -> &dyn Any;

    fn into_any(self: Box<Self>) -> Box<dyn Any>;
}

impl<T> Record for T
where
    T: Schema + Serialize + DeserializeOwned + fmt::Debug + Send + Sync + 'static,
{
    fn descriptor(&self) -> &'static RecordDescriptor {
        T::descriptor()
    }

    fn encode_json(&self, out: &mut Vec<u8>) -> serde_json::Result<()> {
        serde_json::to_writer(out, self)
    }

    fn to_value(&self) -> serde_json::Result<Value> {
        serde_json::to_value(self)
    }

    fn decode_strict(&mut self, body: &[u8]) -> serde_json::Result<()> {
        let map: Map<String, Value> = serde_json::from_slice(body)?;
        let desc = T::descriptor();
        if let Some(key) = map.keys().find(|k| desc.field_by_wire_name(k).is_none()) {
            return Err(serde::de::Error::custom(format!(
                "unknown field `{}` for {}",
                key, desc.name
            )));
        }
        *self = T::deserialize(Value::Object(map))?;
        Ok(())
    }

    fn populate(&mut self, map: Map<String, Value>) -> serde_json::Result<()> {
        *self = T::deserialize(Value::Object(map))?;
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any> {
        self
    }
}

impl dyn Record {
    /// Downcast a boxed record to its concrete type.
    pub fn downcast<T: Record>(self: Box<Self>) -> Result<Box<T>, Box<dyn Any>> {
        self.into_any().downcast::<T>()
    }

    pub fn downcast_ref<T: Record>(&self) -> Option<&T> {
        self.as_any().downcast_ref::<T>()
    }
}
