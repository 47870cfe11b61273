//! Schema extraction.
//!
//! Turns a [`Record`]'s field descriptors into a frozen [`Schema`] (name ->
//! slot, write policy, notify policy) and the initial slot arena. The schema
//! is built once at registration and never changes; only slot values do.

mod record;
mod tags;

pub use record::{FieldDescriptor, JsonRecord, Record};
pub use tags::{FieldTag, NotifyMode};

use crate::types::{Error, Result};
use crate::value::{Type, Value};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Access mode advertised for an attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Access {
    Read,
    ReadWrite,
}

impl Access {
    pub fn as_str(&self) -> &'static str {
        match self {
            Access::Read => "read",
            Access::ReadWrite => "readwrite",
        }
    }
}

/// One exported attribute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeDescriptor {
    pub name: String,
    /// Index into the registry's slot arena.
    pub slot: usize,
    pub ty: Type,
    pub writable: bool,
    pub notify: NotifyMode,
}

impl AttributeDescriptor {
    /// Whether Set/SetBatch may change this attribute.
    pub fn is_settable(&self) -> bool {
        self.writable && self.notify != NotifyMode::Const
    }

    pub fn access(&self) -> Access {
        if self.writable {
            Access::ReadWrite
        } else {
            Access::Read
        }
    }
}

/// Storage for one attribute value.
#[derive(Debug, Clone, PartialEq)]
pub struct Slot {
    ty: Type,
    value: Option<Value>,
}

impl Slot {
    pub(crate) fn new(ty: Type, value: Option<Value>) -> Self {
        Self { ty, value }
    }

    pub fn ty(&self) -> &Type {
        &self.ty
    }

    pub fn value(&self) -> Option<&Value> {
        self.value.as_ref()
    }

    pub(crate) fn store(&mut self, value: Value) {
        self.value = Some(value);
    }

    /// Fit `value` to this slot's type.
    ///
    /// Variant slots accept anything (wrapped). Other slots accept an exact
    /// match, or a variant whose content is an exact match.
    pub fn coerce(&self, value: Value) -> Option<Value> {
        if self.ty == Type::Variant {
            return value.is_well_formed().then(|| value.into_variant());
        }
        let value = value.into_inner();
        value.conforms_to(&self.ty).then_some(value)
    }
}

/// Frozen attribute map of one registry.
#[derive(Debug, Clone)]
pub struct Schema {
    attributes: Vec<AttributeDescriptor>,
    index: HashMap<String, usize>,
}

impl Schema {
    /// Extract the schema and initial slots from a record.
    ///
    /// Fails if the record is not record-shaped, if no member is exported, or
    /// if two members export the same name.
    pub fn extract(record: &(impl Record + ?Sized)) -> Result<(Schema, Vec<Slot>)> {
        Self::from_fields(record.fields()?)
    }

    pub fn from_fields(fields: Vec<FieldDescriptor>) -> Result<(Schema, Vec<Slot>)> {
        let mut attributes = Vec::new();
        let mut index = HashMap::new();
        let mut slots = Vec::new();

        for field in fields {
            let Some(tag) = field.resolve_tag()? else {
                continue;
            };
            let name = tag.name.clone().unwrap_or_else(|| field.member().to_string());
            if name.is_empty() {
                return Err(Error::schema("member with empty name cannot be exported"));
            }
            if index.contains_key(&name) {
                return Err(Error::schema(format!(
                    "attribute {:?} exported by more than one member",
                    name
                )));
            }

            let ty = field.ty().clone();
            let value = field.into_value();
            if let Some(v) = &value {
                if !v.is_well_formed() {
                    // Kept: reads of this slot fail Unreadable until it is overwritten.
                    tracing::warn!("Attribute {} registered with a malformed {} value", name, ty);
                }
            }

            let slot = slots.len();
            slots.push(Slot::new(ty.clone(), value));
            index.insert(name.clone(), attributes.len());
            attributes.push(AttributeDescriptor {
                name,
                slot,
                ty,
                writable: tag.writable,
                notify: tag.notify,
            });
        }

        if attributes.is_empty() {
            return Err(Error::schema("record has no exportable members"));
        }

        tracing::debug!("Extracted schema with {} attributes", attributes.len());
        Ok((Schema { attributes, index }, slots))
    }

    pub fn get(&self, name: &str) -> Option<&AttributeDescriptor> {
        self.index.get(name).map(|&i| &self.attributes[i])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Attributes in declaration order.
    pub fn attributes(&self) -> &[AttributeDescriptor] {
        &self.attributes
    }

    pub fn len(&self) -> usize {
        self.attributes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn service_fields() -> Vec<FieldDescriptor> {
        vec![
            FieldDescriptor::new("ID", "2").tag("const,emit"),
            FieldDescriptor::new("Name", "lisi").tag("writeable,emit"),
            FieldDescriptor::unset("Token", Type::String).tag("writeable,emit"),
            FieldDescriptor::new("Index", 1i32).tag("writeable,emit"),
            FieldDescriptor::new("internal", 99u32),
        ]
    }

    #[test]
    fn test_extract_skips_untagged() {
        let (schema, slots) = Schema::extract(&service_fields()).unwrap();
        assert_eq!(schema.len(), 4);
        assert_eq!(slots.len(), 4);
        assert!(!schema.contains("internal"));

        let names: Vec<&str> = schema.attributes().iter().map(|a| a.name.as_str()).collect();
        assert_eq!(names, vec!["ID", "Name", "Token", "Index"]);
    }

    #[test]
    fn test_extract_policies() {
        let (schema, _) = Schema::extract(&service_fields()).unwrap();

        let id = schema.get("ID").unwrap();
        assert!(!id.writable);
        assert_eq!(id.notify, NotifyMode::Const);
        assert!(!id.is_settable());
        assert_eq!(id.access(), Access::Read);

        let name = schema.get("Name").unwrap();
        assert!(name.is_settable());
        assert_eq!(name.access(), Access::ReadWrite);
        assert_eq!(name.ty, Type::String);
    }

    #[test]
    fn test_writable_const_is_not_settable() {
        let (schema, _) =
            Schema::extract(&vec![FieldDescriptor::new("A", 1i32).tag("writeable,const")]).unwrap();
        let a = schema.get("A").unwrap();
        assert_eq!(a.access(), Access::ReadWrite);
        assert!(!a.is_settable());
    }

    #[test]
    fn test_rename() {
        let (schema, _) =
            Schema::extract(&vec![FieldDescriptor::new("display_name", "x").tag("name:DisplayName")]).unwrap();
        assert!(schema.contains("DisplayName"));
        assert!(!schema.contains("display_name"));
    }

    #[test]
    fn test_zero_exportable_members() {
        let err = Schema::extract(&vec![
            FieldDescriptor::new("a", 1i32),
            FieldDescriptor::new("b", 2i32).tag("-"),
        ])
        .unwrap_err();
        assert!(matches!(err, Error::Schema(_)));
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let err = Schema::extract(&vec![
            FieldDescriptor::new("a", 1i32).export(),
            FieldDescriptor::new("b", 2i32).rename("a"),
        ])
        .unwrap_err();
        assert!(err.to_string().contains("more than one member"));
    }

    #[test]
    fn test_unset_slot() {
        let (schema, slots) = Schema::extract(&service_fields()).unwrap();
        let token = schema.get("Token").unwrap();
        assert_eq!(slots[token.slot].value(), None);
        assert_eq!(slots[token.slot].ty(), &Type::String);
    }

    #[test]
    fn test_slot_coerce() {
        let slot = Slot::new(Type::UInt32, None);
        assert_eq!(slot.coerce(Value::from(5u32)), Some(Value::UInt32(5)));
        assert_eq!(slot.coerce(Value::from(5u32).into_variant()), Some(Value::UInt32(5)));
        assert_eq!(slot.coerce(Value::from(5i32)), None);

        let any = Slot::new(Type::Variant, None);
        assert_eq!(any.coerce(Value::from("x")), Some(Value::from("x").into_variant()));
    }
}
