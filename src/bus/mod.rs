//! Bus seam.
//!
//! The registry treats the bus purely as a carrier. It needs three things from
//! it: export an object at a path, stop exporting it, and broadcast a signal
//! from a path. [`Bus`] captures exactly that; [`PropertiesObject`] is what gets
//! exported and what inbound method calls are routed to.
//!
//! [`LocalBus`] is an in-process carrier implementing both directions (call
//! routing and signal fan-out) without any wire transport.

mod local;

pub use local::{BusStats, LocalBus, SignalSubscription};

use crate::introspect::ObjectInfo;
use crate::types::{ObjectPath, Result};
use crate::value::Value;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Properties interface name.
pub const PROPERTIES_INTERFACE: &str = "org.freedesktop.DBus.Properties";
/// Introspection interface name.
pub const INTROSPECTABLE_INTERFACE: &str = "org.freedesktop.DBus.Introspectable";
/// Change signal member name.
pub const PROPERTIES_CHANGED: &str = "PropertiesChanged";

// =============================================================================
// Messages
// =============================================================================

/// Body of a `PropertiesChanged` signal.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PropertiesChanged {
    pub interface: String,
    pub changed_properties: BTreeMap<String, Value>,
    pub invalidated_properties: Vec<String>,
}

impl PropertiesChanged {
    /// Signal arguments as `(s, a{sv}, as)`.
    pub fn to_args(&self) -> Vec<Value> {
        vec![
            Value::Str(self.interface.clone()),
            Value::variant_dict(self.changed_properties.clone()),
            Value::string_array(self.invalidated_properties.iter().cloned()),
        ]
    }

    pub fn is_empty(&self) -> bool {
        self.changed_properties.is_empty() && self.invalidated_properties.is_empty()
    }
}

/// A signal as delivered to subscribers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalMessage {
    pub path: ObjectPath,
    pub interface: String,
    pub member: String,
    pub body: PropertiesChanged,
    pub timestamp_ms: i64,
}

/// An inbound method call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodCall {
    pub path: ObjectPath,
    pub interface: String,
    pub member: String,
    pub args: Vec<Value>,
}

impl MethodCall {
    pub fn new(
        path: ObjectPath,
        interface: impl Into<String>,
        member: impl Into<String>,
        args: Vec<Value>,
    ) -> Self {
        Self {
            path,
            interface: interface.into(),
            member: member.into(),
            args,
        }
    }

    /// `Properties.Get(interface, name)`
    pub fn get(path: ObjectPath, interface: &str, name: &str) -> Self {
        Self::new(
            path,
            PROPERTIES_INTERFACE,
            "Get",
            vec![Value::from(interface), Value::from(name)],
        )
    }

    /// `Properties.GetAll(interface)`
    pub fn get_all(path: ObjectPath, interface: &str) -> Self {
        Self::new(path, PROPERTIES_INTERFACE, "GetAll", vec![Value::from(interface)])
    }

    /// `Properties.Set(interface, name, value)`
    pub fn set(path: ObjectPath, interface: &str, name: &str, value: Value) -> Self {
        Self::new(
            path,
            PROPERTIES_INTERFACE,
            "Set",
            vec![Value::from(interface), Value::from(name), value.into_variant()],
        )
    }

    /// `Properties.SetBatch(interface, keys, values)`
    pub fn set_batch(
        path: ObjectPath,
        interface: &str,
        keys: Vec<String>,
        values: BTreeMap<String, Value>,
    ) -> Self {
        Self::new(
            path,
            PROPERTIES_INTERFACE,
            "SetBatch",
            vec![
                Value::from(interface),
                Value::string_array(keys),
                Value::variant_dict(values),
            ],
        )
    }

    /// `Introspectable.Introspect()`
    pub fn introspect(path: ObjectPath) -> Self {
        Self::new(path, INTROSPECTABLE_INTERFACE, "Introspect", Vec::new())
    }
}

// =============================================================================
// Seams
// =============================================================================

/// An object answering the properties protocol.
#[async_trait]
pub trait PropertiesObject: Send + Sync + fmt::Debug {
    async fn get(&self, interface: &str, name: &str) -> Result<Value>;

    async fn get_all(&self, interface: &str) -> Result<BTreeMap<String, Value>>;

    async fn set(&self, interface: &str, name: &str, value: Value) -> Result<()>;

    async fn set_batch(
        &self,
        interface: &str,
        keys: Vec<String>,
        values: BTreeMap<String, Value>,
    ) -> Result<()>;

    /// Introspection metadata for everything this object exports.
    async fn describe(&self) -> ObjectInfo;
}

/// The transport as seen by the registry.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Bus: Send + Sync + fmt::Debug {
    /// Make `object` reachable at `path`.
    async fn export(&self, path: &ObjectPath, object: Arc<dyn PropertiesObject>) -> Result<()>;

    /// Stop routing calls for `path`.
    async fn unexport(&self, path: &ObjectPath) -> Result<()>;

    /// Broadcast a `PropertiesChanged` signal from `path`. Fire-and-forget.
    async fn emit(&self, path: &ObjectPath, signal: PropertiesChanged) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_properties_changed_args() {
        let mut changed = BTreeMap::new();
        changed.insert("Name".to_string(), Value::from("zhangsan"));
        let signal = PropertiesChanged {
            interface: "com.example.Service".to_string(),
            changed_properties: changed,
            invalidated_properties: vec!["Token".to_string()],
        };

        let args = signal.to_args();
        let sigs: Vec<String> = args.iter().map(Value::signature).collect();
        assert_eq!(sigs, vec!["s", "a{sv}", "as"]);
        assert!(!signal.is_empty());
    }

    #[test]
    fn test_set_call_wraps_value_in_variant() {
        let path = ObjectPath::new("/a").unwrap();
        let call = MethodCall::set(path, "com.example.A", "Name", Value::from("x"));
        assert_eq!(call.args[2].signature(), "v");
        assert_eq!(call.member, "Set");
        assert_eq!(call.interface, PROPERTIES_INTERFACE);
    }
}
