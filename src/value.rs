//! Typed wire values and their signatures.
//!
//! A [`Value`] is what travels over the bus: every value knows its [`Type`],
//! and every type renders to a D-Bus signature string (`s`, `u`, `as`,
//! `a{sv}`, ...). Arrays and dicts carry their element type so that empty
//! containers still have a signature.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

// =============================================================================
// Type
// =============================================================================

/// Wire type of a value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Type {
    Bool,
    Byte,
    Int16,
    UInt16,
    Int32,
    UInt32,
    Int64,
    UInt64,
    Double,
    String,
    ObjectPath,
    Variant,
    Array(Box<Type>),
    /// String-keyed dictionary.
    Dict(Box<Type>),
}

impl Type {
    /// D-Bus signature of this type.
    pub fn signature(&self) -> String {
        let mut out = String::new();
        self.write_signature(&mut out);
        out
    }

    fn write_signature(&self, out: &mut String) {
        match self {
            Type::Bool => out.push('b'),
            Type::Byte => out.push('y'),
            Type::Int16 => out.push('n'),
            Type::UInt16 => out.push('q'),
            Type::Int32 => out.push('i'),
            Type::UInt32 => out.push('u'),
            Type::Int64 => out.push('x'),
            Type::UInt64 => out.push('t'),
            Type::Double => out.push('d'),
            Type::String => out.push('s'),
            Type::ObjectPath => out.push('o'),
            Type::Variant => out.push('v'),
            Type::Array(elem) => {
                out.push('a');
                elem.write_signature(out);
            }
            Type::Dict(elem) => {
                out.push_str("a{s");
                elem.write_signature(out);
                out.push('}');
            }
        }
    }

    /// `as`
    pub fn string_array() -> Self {
        Type::Array(Box::new(Type::String))
    }

    /// `a{sv}`
    pub fn variant_dict() -> Self {
        Type::Dict(Box::new(Type::Variant))
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.signature())
    }
}

// =============================================================================
// Value
// =============================================================================

/// A typed value as carried on the bus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Value {
    Bool(bool),
    Byte(u8),
    Int16(i16),
    UInt16(u16),
    Int32(i32),
    UInt32(u32),
    Int64(i64),
    UInt64(u64),
    Double(f64),
    Str(String),
    ObjectPath(String),
    Array(Type, Vec<Value>),
    Dict(Type, BTreeMap<String, Value>),
    Variant(Box<Value>),
}

impl Value {
    /// Type of this value, as declared by the value itself.
    pub fn ty(&self) -> Type {
        match self {
            Value::Bool(_) => Type::Bool,
            Value::Byte(_) => Type::Byte,
            Value::Int16(_) => Type::Int16,
            Value::UInt16(_) => Type::UInt16,
            Value::Int32(_) => Type::Int32,
            Value::UInt32(_) => Type::UInt32,
            Value::Int64(_) => Type::Int64,
            Value::UInt64(_) => Type::UInt64,
            Value::Double(_) => Type::Double,
            Value::Str(_) => Type::String,
            Value::ObjectPath(_) => Type::ObjectPath,
            Value::Array(elem, _) => Type::Array(Box::new(elem.clone())),
            Value::Dict(elem, _) => Type::Dict(Box::new(elem.clone())),
            Value::Variant(_) => Type::Variant,
        }
    }

    /// Signature of this value's type.
    pub fn signature(&self) -> String {
        self.ty().signature()
    }

    /// Whether every element of every container matches the container's
    /// declared element type. A value that is not well-formed cannot be
    /// marshalled.
    pub fn is_well_formed(&self) -> bool {
        match self {
            Value::Array(elem, items) => items.iter().all(|v| v.conforms_to(elem)),
            Value::Dict(elem, entries) => entries.values().all(|v| v.conforms_to(elem)),
            Value::Variant(inner) => inner.is_well_formed(),
            Value::ObjectPath(path) => crate::types::ObjectPath::new(path.as_str()).is_ok(),
            _ => true,
        }
    }

    /// Whether this value can be stored under `ty` exactly as it is.
    pub fn conforms_to(&self, ty: &Type) -> bool {
        self.ty() == *ty && self.is_well_formed()
    }

    /// Wrap this value in a variant unless it already is one.
    pub fn into_variant(self) -> Value {
        match self {
            Value::Variant(_) => self,
            other => Value::Variant(Box::new(other)),
        }
    }

    /// Strip one layer of variant wrapping, if present.
    pub fn into_inner(self) -> Value {
        match self {
            Value::Variant(inner) => *inner,
            other => other,
        }
    }

    /// `as` from anything yielding strings.
    pub fn string_array<I, S>(items: I) -> Value
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Value::Array(
            Type::String,
            items.into_iter().map(|s| Value::Str(s.into())).collect(),
        )
    }

    /// `a{sv}` from a name -> value mapping; entries are wrapped in variants.
    pub fn variant_dict(entries: BTreeMap<String, Value>) -> Value {
        Value::Dict(
            Type::Variant,
            entries
                .into_iter()
                .map(|(k, v)| (k, v.into_variant()))
                .collect(),
        )
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) | Value::ObjectPath(s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Integer view of any integral value that fits in `i64`.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Byte(v) => Some(i64::from(*v)),
            Value::Int16(v) => Some(i64::from(*v)),
            Value::UInt16(v) => Some(i64::from(*v)),
            Value::Int32(v) => Some(i64::from(*v)),
            Value::UInt32(v) => Some(i64::from(*v)),
            Value::Int64(v) => Some(*v),
            Value::UInt64(v) => i64::try_from(*v).ok(),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Double(v) => Some(*v),
            _ => None,
        }
    }

    /// Items of a string array, if this is one.
    pub fn as_string_array(&self) -> Option<Vec<String>> {
        match self {
            Value::Array(_, items) => items
                .iter()
                .map(|v| v.as_str().map(String::from))
                .collect(),
            _ => None,
        }
    }

    /// Entries of a dict, if this is one.
    pub fn as_dict(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Value::Dict(_, entries) => Some(entries),
            _ => None,
        }
    }
}

macro_rules! impl_from_scalar {
    ($($rust:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$rust> for Value {
                fn from(v: $rust) -> Self {
                    Value::$variant(v)
                }
            }
        )*
    };
}

impl_from_scalar! {
    bool => Bool,
    u8 => Byte,
    i16 => Int16,
    u16 => UInt16,
    i32 => Int32,
    u32 => UInt32,
    i64 => Int64,
    u64 => UInt64,
    f64 => Double,
    String => Str,
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_string())
    }
}

impl From<Vec<String>> for Value {
    fn from(v: Vec<String>) -> Self {
        Value::string_array(v)
    }
}

impl From<crate::types::ObjectPath> for Value {
    fn from(v: crate::types::ObjectPath) -> Self {
        Value::ObjectPath(v.into())
    }
}

// =============================================================================
// JSON conversion
// =============================================================================

/// Best-effort typing of a JSON value.
///
/// Integers become `x` (or `t` above `i64::MAX`), floats `d`, homogeneous
/// arrays take their element type, mixed or empty arrays become `av`, objects
/// become `a{sv}`. `null` has no wire representation and yields `None`.
pub fn from_json(json: &serde_json::Value) -> Option<Value> {
    use serde_json::Value as Json;

    match json {
        Json::Null => None,
        Json::Bool(b) => Some(Value::Bool(*b)),
        Json::Number(n) => {
            if let Some(i) = n.as_i64() {
                Some(Value::Int64(i))
            } else if let Some(u) = n.as_u64() {
                Some(Value::UInt64(u))
            } else {
                n.as_f64().map(Value::Double)
            }
        }
        Json::String(s) => Some(Value::Str(s.clone())),
        Json::Array(items) => {
            let items: Vec<Value> = items.iter().map(from_json).collect::<Option<_>>()?;
            let first = items.first().map(Value::ty);
            match first {
                Some(ty) if items.iter().all(|v| v.ty() == ty) => Some(Value::Array(ty, items)),
                _ => Some(Value::Array(
                    Type::Variant,
                    items.into_iter().map(Value::into_variant).collect(),
                )),
            }
        }
        Json::Object(map) => {
            let entries = map
                .iter()
                .map(|(k, v)| from_json(v).map(|v| (k.clone(), v)))
                .collect::<Option<BTreeMap<_, _>>>()?;
            Some(Value::variant_dict(entries))
        }
    }
}

/// Conversion of a JSON value to a declared type.
///
/// Integers must fit the target width, `o` takes a string, `v` wraps the
/// best-effort typing of [`from_json`]. Returns `None` when `json` does not
/// fit `ty`, or is `null`.
pub fn from_json_as(json: &serde_json::Value, ty: &Type) -> Option<Value> {
    use serde_json::Value as Json;

    match (ty, json) {
        (_, Json::Null) => None,
        (Type::Bool, Json::Bool(b)) => Some(Value::Bool(*b)),
        (Type::Byte, Json::Number(n)) => n.as_u64().and_then(|v| u8::try_from(v).ok()).map(Value::Byte),
        (Type::Int16, Json::Number(n)) => n.as_i64().and_then(|v| i16::try_from(v).ok()).map(Value::Int16),
        (Type::UInt16, Json::Number(n)) => n.as_u64().and_then(|v| u16::try_from(v).ok()).map(Value::UInt16),
        (Type::Int32, Json::Number(n)) => n.as_i64().and_then(|v| i32::try_from(v).ok()).map(Value::Int32),
        (Type::UInt32, Json::Number(n)) => n.as_u64().and_then(|v| u32::try_from(v).ok()).map(Value::UInt32),
        (Type::Int64, Json::Number(n)) => n.as_i64().map(Value::Int64),
        (Type::UInt64, Json::Number(n)) => n.as_u64().map(Value::UInt64),
        (Type::Double, Json::Number(n)) => n.as_f64().map(Value::Double),
        (Type::String, Json::String(s)) => Some(Value::Str(s.clone())),
        (Type::ObjectPath, Json::String(s)) => Some(Value::ObjectPath(s.clone())),
        (Type::Variant, json) => from_json(json).map(Value::into_variant),
        (Type::Array(elem), Json::Array(items)) => items
            .iter()
            .map(|item| from_json_as(item, elem))
            .collect::<Option<Vec<_>>>()
            .map(|items| Value::Array((**elem).clone(), items)),
        (Type::Dict(elem), Json::Object(map)) => map
            .iter()
            .map(|(k, v)| from_json_as(v, elem).map(|v| (k.clone(), v)))
            .collect::<Option<BTreeMap<_, _>>>()
            .map(|entries| Value::Dict((**elem).clone(), entries)),
        _ => None,
    }
}
