//! Records and their field descriptors.

use crate::schema::tags::{FieldTag, NotifyMode};
use crate::types::{Error, Result};
use crate::value::{self, Type, Value};
use serde::Serialize;
use std::collections::BTreeMap;

/// Something that can be registered as a set of attributes.
///
/// Implementors describe their members in declaration order. Members whose
/// descriptor carries no tag are not exported.
///
/// ```
/// use propbus::schema::{FieldDescriptor, Record};
///
/// struct Service {
///     id: String,
///     name: String,
///     index: i32,
/// }
///
/// impl Record for Service {
///     fn fields(&self) -> propbus::Result<Vec<FieldDescriptor>> {
///         Ok(vec![
///             FieldDescriptor::new("ID", self.id.clone()).tag("const,emit"),
///             FieldDescriptor::new("Name", self.name.clone()).tag("writeable,emit"),
///             FieldDescriptor::new("Index", self.index).writable(),
///         ])
///     }
/// }
/// ```
pub trait Record {
    fn fields(&self) -> Result<Vec<FieldDescriptor>>;
}

impl Record for Vec<FieldDescriptor> {
    fn fields(&self) -> Result<Vec<FieldDescriptor>> {
        Ok(self.clone())
    }
}

/// Descriptor for one record member.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDescriptor {
    member: String,
    ty: Type,
    value: Option<Value>,
    /// Raw tag string, parsed at registration.
    declared: Option<String>,
    /// Tag refined through the builder methods, seeded from `declared`.
    built: Option<FieldTag>,
    /// Parse failure of a declared tag that a builder call consumed.
    invalid: Option<String>,
}

impl FieldDescriptor {
    /// Member holding `value`. Not exported until tagged.
    pub fn new(member: impl Into<String>, value: impl Into<Value>) -> Self {
        let value = value.into();
        Self {
            member: member.into(),
            ty: value.ty(),
            value: Some(value),
            declared: None,
            built: None,
            invalid: None,
        }
    }

    /// Member of type `ty` that has no value yet. Reads fail until it is set.
    pub fn unset(member: impl Into<String>, ty: Type) -> Self {
        Self {
            member: member.into(),
            ty,
            value: None,
            declared: None,
            built: None,
            invalid: None,
        }
    }

    /// Attach a declarative tag string, parsed at registration.
    ///
    /// Replaces any earlier tag. Builder calls made after this refine it.
    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.declared = Some(tag.into());
        self.built = None;
        self.invalid = None;
        self
    }

    /// Export this member.
    pub fn export(mut self) -> Self {
        self.built();
        self
    }

    pub fn writable(mut self) -> Self {
        self.built().writable = true;
        self
    }

    pub fn notify(mut self, mode: NotifyMode) -> Self {
        self.built().notify = mode;
        self
    }

    /// Export under `name` instead of the member name.
    pub fn rename(mut self, name: impl Into<String>) -> Self {
        self.built().name = Some(name.into());
        self
    }

    /// Explicitly exclude this member from export.
    pub fn ignore(mut self) -> Self {
        self.built().ignored = true;
        self
    }

    pub fn member(&self) -> &str {
        &self.member
    }

    pub(crate) fn ty(&self) -> &Type {
        &self.ty
    }

    pub(crate) fn into_value(self) -> Option<Value> {
        self.value
    }

    fn built(&mut self) -> &mut FieldTag {
        if let Some(raw) = self.declared.take() {
            match FieldTag::parse(&raw) {
                Ok(tag) => self.built = Some(tag),
                Err(e) => self.invalid = Some(e.to_string()),
            }
        }
        self.built.get_or_insert_with(FieldTag::default)
    }

    /// Resolved export settings, or `None` if the member is not exported.
    pub(crate) fn resolve_tag(&self) -> Result<Option<FieldTag>> {
        if let Some(e) = &self.invalid {
            return Err(Error::schema(format!("member {:?}: {}", self.member, e)));
        }
        let tag = match (&self.built, &self.declared) {
            (Some(tag), _) => tag.clone(),
            (None, Some(raw)) if !raw.trim().is_empty() => FieldTag::parse(raw)
                .map_err(|e| Error::schema(format!("member {:?}: {}", self.member, e)))?,
            _ => return Ok(None),
        };
        Ok((!tag.ignored).then_some(tag))
    }
}

/// A record given as a JSON object, with tags keyed by member name.
///
/// This is the registration path for any `Serialize` type: serialize it, then
/// tag the members to export. Values that serialize to anything but an object
/// are not record-shaped and fail registration.
#[derive(Debug, Clone)]
pub struct JsonRecord {
    value: serde_json::Value,
    tags: BTreeMap<String, String>,
    types: BTreeMap<String, Type>,
}

impl JsonRecord {
    pub fn new<I, K, V>(value: serde_json::Value, tags: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            value,
            tags: tags
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
            types: BTreeMap::new(),
        }
    }

    /// Serialize `record` and attach `tags`.
    ///
    /// Serialization erases integer widths: unless pinned with
    /// [`with_type`](Self::with_type), every integer member exports as `x`
    /// (`t` above `i64::MAX`) and `null` members as unset `v` slots.
    ///
    /// ```
    /// use propbus::{JsonRecord, Type};
    ///
    /// #[derive(serde::Serialize)]
    /// struct Battery {
    ///     level: u8,
    /// }
    ///
    /// let record = JsonRecord::from_serialize(&Battery { level: 80 }, [("level", "emit")])?
    ///     .with_type("level", Type::Byte);
    /// # Ok::<(), propbus::Error>(())
    /// ```
    pub fn from_serialize<T, I, K, V>(record: &T, tags: I) -> Result<Self>
    where
        T: Serialize + ?Sized,
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Ok(Self::new(serde_json::to_value(record)?, tags))
    }

    /// Declare `member` as `ty` instead of inferring it from the JSON value.
    ///
    /// Registration fails if the member's value does not fit `ty`.
    pub fn with_type(mut self, member: impl Into<String>, ty: Type) -> Self {
        self.types.insert(member.into(), ty);
        self
    }

    fn field(&self, member: &str, json: &serde_json::Value) -> Result<FieldDescriptor> {
        match (self.types.get(member), json.is_null()) {
            (Some(ty), true) => Ok(FieldDescriptor::unset(member, ty.clone())),
            (Some(ty), false) => value::from_json_as(json, ty)
                .map(|v| FieldDescriptor::new(member, v))
                .ok_or_else(|| {
                    Error::schema(format!(
                        "member {:?} does not fit declared type {}",
                        member,
                        ty.signature()
                    ))
                }),
            (None, true) => Ok(FieldDescriptor::unset(member, Type::Variant)),
            (None, false) => value::from_json(json)
                .map(|v| FieldDescriptor::new(member, v))
                .ok_or_else(|| {
                    Error::schema(format!(
                        "member {:?} contains a value with no wire representation",
                        member
                    ))
                }),
        }
    }
}

impl Record for JsonRecord {
    fn fields(&self) -> Result<Vec<FieldDescriptor>> {
        let object = self.value.as_object().ok_or_else(|| {
            Error::schema(format!(
                "registration target is not record-shaped: {}",
                json_kind(&self.value)
            ))
        })?;

        let mut fields = Vec::with_capacity(object.len());
        for (member, json) in object {
            let field = self.field(member, json)?;
            fields.push(match self.tags.get(member) {
                Some(tag) => field.tag(tag.clone()),
                None => field,
            });
        }
        Ok(fields)
    }
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "bool",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_untagged_member_not_exported() {
        let field = FieldDescriptor::new("secret", "x");
        assert_eq!(field.resolve_tag().unwrap(), None);
    }

    #[test]
    fn test_builder_tag() {
        let field = FieldDescriptor::new("name", "x")
            .writable()
            .notify(NotifyMode::Always)
            .rename("Name");
        let tag = field.resolve_tag().unwrap().unwrap();
        assert!(tag.writable);
        assert_eq!(tag.notify, NotifyMode::Always);
        assert_eq!(tag.name.as_deref(), Some("Name"));
    }

    #[test]
    fn test_builder_refines_declared_tag() {
        let tag = FieldDescriptor::new("display_name", "x")
            .tag("writeable,emit")
            .rename("Name")
            .resolve_tag()
            .unwrap()
            .unwrap();
        assert!(tag.writable);
        assert_eq!(tag.notify, NotifyMode::Always);
        assert_eq!(tag.name.as_deref(), Some("Name"));

        let tag = FieldDescriptor::new("serial", "x")
            .tag("writeable,name:Serial")
            .notify(NotifyMode::Const)
            .resolve_tag()
            .unwrap()
            .unwrap();
        assert!(tag.writable);
        assert_eq!(tag.notify, NotifyMode::Const);
        assert_eq!(tag.name.as_deref(), Some("Serial"));
    }

    #[test]
    fn test_later_tag_replaces_builder_state() {
        let field = FieldDescriptor::new("a", 1i32).writable().tag("emit");
        let tag = field.resolve_tag().unwrap().unwrap();
        assert!(!tag.writable);
        assert_eq!(tag.notify, NotifyMode::Always);
    }

    #[test]
    fn test_bad_declared_tag_survives_builder_call() {
        let err = FieldDescriptor::new("volume", 1u32)
            .tag("writeable,loud")
            .rename("Volume")
            .resolve_tag()
            .unwrap_err();
        assert!(matches!(err, Error::Schema(_)));
        assert!(err.to_string().contains("volume"));
    }

    #[test]
    fn test_ignored_member_not_exported() {
        assert_eq!(FieldDescriptor::new("a", 1i32).tag("-").resolve_tag().unwrap(), None);
        assert_eq!(FieldDescriptor::new("a", 1i32).export().ignore().resolve_tag().unwrap(), None);
    }

    #[test]
    fn test_bad_declared_tag_names_member() {
        let err = FieldDescriptor::new("volume", 1u32)
            .tag("writeable,loud")
            .resolve_tag()
            .unwrap_err();
        assert!(err.to_string().contains("volume"));
    }

    #[test]
    fn test_json_record_requires_object() {
        let record = JsonRecord::new(serde_json::json!("just a string"), Vec::<(String, String)>::new());
        let err = record.fields().unwrap_err();
        assert!(matches!(err, Error::Schema(_)));
        assert!(err.to_string().contains("string"));
    }

    #[test]
    fn test_json_record_pinned_types() {
        #[derive(Serialize)]
        struct Sensor {
            battery: u8,
            port: u16,
            owner: Option<String>,
        }

        let sensor = Sensor {
            battery: 80,
            port: 8080,
            owner: None,
        };
        let fields = JsonRecord::from_serialize(&sensor, [("battery", "emit"), ("port", "emit"), ("owner", "writeable")])
            .unwrap()
            .with_type("battery", Type::Byte)
            .with_type("owner", Type::String)
            .fields()
            .unwrap();

        let ty = |name: &str| fields.iter().find(|f| f.member() == name).unwrap().ty().clone();
        assert_eq!(ty("battery"), Type::Byte);
        assert_eq!(ty("port"), Type::Int64);
        assert_eq!(ty("owner"), Type::String);
    }

    #[test]
    fn test_json_record_pinned_type_must_fit() {
        let record = JsonRecord::new(serde_json::json!({ "level": 300 }), [("level", "emit")])
            .with_type("level", Type::Byte);
        let err = record.fields().unwrap_err();
        assert!(matches!(err, Error::Schema(_)));
        assert!(err.to_string().contains("level"));
    }

    #[test]
    fn test_json_record_from_serialize() {
        #[derive(Serialize)]
        struct Device {
            name: String,
            online: bool,
            token: Option<String>,
        }

        let device = Device {
            name: "printer".into(),
            online: true,
            token: None,
        };
        let record = JsonRecord::from_serialize(&device, [("name", "writeable,emit"), ("token", "writeable")]).unwrap();
        let fields = record.fields().unwrap();

        assert_eq!(fields.len(), 3);
        let token = fields.iter().find(|f| f.member() == "token").unwrap();
        assert_eq!(token.ty(), &Type::Variant);
        assert!(token.clone().into_value().is_none());
    }
}
