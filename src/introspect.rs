//! Introspection metadata.
//!
//! Static, machine-readable description of an exported object: its property
//! interfaces (attribute name, signature, access, notify annotation) and the
//! shape of the `org.freedesktop.DBus.Properties` interface itself. Rendered as
//! the standard introspection XML for `Introspect` calls.

use crate::bus::{INTROSPECTABLE_INTERFACE, PROPERTIES_INTERFACE};
use crate::schema::{Access, NotifyMode};
use serde::{Deserialize, Serialize};

/// Annotation carrying a property's notify mode.
pub const EMITS_CHANGED_ANNOTATION: &str = "org.freedesktop.DBus.Property.EmitsChangedSignal";

const DOCTYPE: &str = r#"<!DOCTYPE node PUBLIC "-//freedesktop//DTD D-BUS Object Introspection 1.0//EN"
 "http://www.freedesktop.org/standards/dbus/1.0/introspect.dtd">"#;

/// One exported attribute as seen by remote callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyInfo {
    pub name: String,
    /// Type signature.
    pub signature: String,
    pub access: Access,
    pub notify: NotifyMode,
}

/// Argument direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    In,
    Out,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArgInfo {
    pub name: String,
    pub signature: String,
    /// `None` for signal arguments.
    pub direction: Option<Direction>,
}

impl ArgInfo {
    fn input(name: &str, signature: &str) -> Self {
        Self {
            name: name.to_string(),
            signature: signature.to_string(),
            direction: Some(Direction::In),
        }
    }

    fn output(name: &str, signature: &str) -> Self {
        Self {
            name: name.to_string(),
            signature: signature.to_string(),
            direction: Some(Direction::Out),
        }
    }

    fn signal(name: &str, signature: &str) -> Self {
        Self {
            name: name.to_string(),
            signature: signature.to_string(),
            direction: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MethodInfo {
    pub name: String,
    pub args: Vec<ArgInfo>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignalInfo {
    pub name: String,
    pub args: Vec<ArgInfo>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct InterfaceInfo {
    pub name: String,
    pub methods: Vec<MethodInfo>,
    pub signals: Vec<SignalInfo>,
    pub properties: Vec<PropertyInfo>,
}

impl InterfaceInfo {
    /// Interface that only carries properties.
    pub fn with_properties(name: impl Into<String>, properties: Vec<PropertyInfo>) -> Self {
        Self {
            name: name.into(),
            properties,
            ..Self::default()
        }
    }
}

/// Description of the `org.freedesktop.DBus.Properties` interface, including
/// the `SetBatch` extension and the `PropertiesChanged` signal.
pub fn properties_interface() -> InterfaceInfo {
    InterfaceInfo {
        name: PROPERTIES_INTERFACE.to_string(),
        methods: vec![
            MethodInfo {
                name: "Get".to_string(),
                args: vec![
                    ArgInfo::input("interface", "s"),
                    ArgInfo::input("name", "s"),
                    ArgInfo::output("value", "v"),
                ],
            },
            MethodInfo {
                name: "GetAll".to_string(),
                args: vec![
                    ArgInfo::input("interface", "s"),
                    ArgInfo::output("properties", "a{sv}"),
                ],
            },
            MethodInfo {
                name: "Set".to_string(),
                args: vec![
                    ArgInfo::input("interface", "s"),
                    ArgInfo::input("name", "s"),
                    ArgInfo::input("value", "v"),
                ],
            },
            MethodInfo {
                name: "SetBatch".to_string(),
                args: vec![
                    ArgInfo::input("interface", "s"),
                    ArgInfo::input("keys", "as"),
                    ArgInfo::input("values", "a{sv}"),
                ],
            },
        ],
        signals: vec![SignalInfo {
            name: "PropertiesChanged".to_string(),
            args: vec![
                ArgInfo::signal("interface", "s"),
                ArgInfo::signal("changed_properties", "a{sv}"),
                ArgInfo::signal("invalidated_properties", "as"),
            ],
        }],
        properties: Vec::new(),
    }
}

fn introspectable_interface() -> InterfaceInfo {
    InterfaceInfo {
        name: INTROSPECTABLE_INTERFACE.to_string(),
        methods: vec![MethodInfo {
            name: "Introspect".to_string(),
            args: vec![ArgInfo::output("xml_data", "s")],
        }],
        ..InterfaceInfo::default()
    }
}

/// Everything exported at one object path.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ObjectInfo {
    pub interfaces: Vec<InterfaceInfo>,
}

impl ObjectInfo {
    pub fn interface(&self, name: &str) -> Option<&InterfaceInfo> {
        self.interfaces.iter().find(|i| i.name == name)
    }

    /// Render the introspection XML document for this object.
    pub fn to_xml(&self, path: &str) -> String {
        let mut out = String::new();
        out.push_str(DOCTYPE);
        out.push('\n');
        out.push_str(&format!("<node name=\"{}\">\n", escape(path)));

        let mut interfaces = self.interfaces.clone();
        for standard in [introspectable_interface(), properties_interface()] {
            if !interfaces.iter().any(|i| i.name == standard.name) {
                interfaces.push(standard);
            }
        }
        for iface in &interfaces {
            write_interface(&mut out, iface);
        }

        out.push_str("</node>\n");
        out
    }
}

fn write_interface(out: &mut String, iface: &InterfaceInfo) {
    out.push_str(&format!("  <interface name=\"{}\">\n", escape(&iface.name)));
    for method in &iface.methods {
        out.push_str(&format!("    <method name=\"{}\">\n", escape(&method.name)));
        for arg in &method.args {
            write_arg(out, arg);
        }
        out.push_str("    </method>\n");
    }
    for signal in &iface.signals {
        out.push_str(&format!("    <signal name=\"{}\">\n", escape(&signal.name)));
        for arg in &signal.args {
            write_arg(out, arg);
        }
        out.push_str("    </signal>\n");
    }
    for prop in &iface.properties {
        out.push_str(&format!(
            "    <property name=\"{}\" type=\"{}\" access=\"{}\">\n",
            escape(&prop.name),
            escape(&prop.signature),
            prop.access.as_str()
        ));
        out.push_str(&format!(
            "      <annotation name=\"{}\" value=\"{}\"/>\n",
            EMITS_CHANGED_ANNOTATION,
            prop.notify.annotation()
        ));
        out.push_str("    </property>\n");
    }
    out.push_str("  </interface>\n");
}

fn write_arg(out: &mut String, arg: &ArgInfo) {
    let direction = match arg.direction {
        Some(Direction::In) => " direction=\"in\"",
        Some(Direction::Out) => " direction=\"out\"",
        None => "",
    };
    out.push_str(&format!(
        "      <arg name=\"{}\" type=\"{}\"{}/>\n",
        escape(&arg.name),
        escape(&arg.signature),
        direction
    ));
}

fn escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ObjectInfo {
        ObjectInfo {
            interfaces: vec![InterfaceInfo::with_properties(
                "com.example.Service",
                vec![
                    PropertyInfo {
                        name: "Name".to_string(),
                        signature: "s".to_string(),
                        access: Access::ReadWrite,
                        notify: NotifyMode::Always,
                    },
                    PropertyInfo {
                        name: "Tags".to_string(),
                        signature: "a{sv}".to_string(),
                        access: Access::Read,
                        notify: NotifyMode::Const,
                    },
                ],
            )],
        }
    }

    #[test]
    fn test_properties_interface_shape() {
        let iface = properties_interface();
        let names: Vec<&str> = iface.methods.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["Get", "GetAll", "Set", "SetBatch"]);

        let signal = &iface.signals[0];
        assert_eq!(signal.name, "PropertiesChanged");
        let sigs: Vec<&str> = signal.args.iter().map(|a| a.signature.as_str()).collect();
        assert_eq!(sigs, vec!["s", "a{sv}", "as"]);
    }

    #[test]
    fn test_xml_contains_properties_and_annotations() {
        let xml = sample().to_xml("/com/example/Service");
        assert!(xml.contains("<node name=\"/com/example/Service\">"));
        assert!(xml.contains("<property name=\"Name\" type=\"s\" access=\"readwrite\">"));
        assert!(xml.contains("<property name=\"Tags\" type=\"a{sv}\" access=\"read\">"));
        assert!(xml.contains(&format!(
            "<annotation name=\"{}\" value=\"const\"/>",
            EMITS_CHANGED_ANNOTATION
        )));
        assert!(xml.contains("<interface name=\"org.freedesktop.DBus.Properties\">"));
        assert!(xml.contains("<interface name=\"org.freedesktop.DBus.Introspectable\">"));
        assert!(xml.contains("<arg name=\"keys\" type=\"as\" direction=\"in\"/>"));
        assert!(xml.ends_with("</node>\n"));
    }

    #[test]
    fn test_xml_layout() {
        let xml = sample().to_xml("/a&b");
        let lines: Vec<&str> = xml.lines().collect();
        assert!(lines[0].starts_with("<!DOCTYPE node"));
        assert!(lines.contains(&"<node name=\"/a&amp;b\">"));
        assert!(lines.contains(&"      <arg name=\"interface\" type=\"s\"/>"));
        assert!(lines.contains(&"      <arg name=\"value\" type=\"v\" direction=\"out\"/>"));
        assert!(lines.contains(&"    </property>"));
        assert_eq!(lines.last(), Some(&"</node>"));
    }

    #[test]
    fn test_standard_interfaces_not_duplicated() {
        let mut info = sample();
        info.interfaces.push(properties_interface());
        let xml = info.to_xml("/");
        assert_eq!(xml.matches("org.freedesktop.DBus.Properties\"").count(), 1);
    }
}
