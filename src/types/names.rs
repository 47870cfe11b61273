//! Validated bus names.
//!
//! Object paths and interface names are checked at construction time so the
//! registry never exports under, or emits from, a malformed name.

use crate::types::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Macro to define a validated name newtype wrapper.
///
/// Generates: struct, `new()` (validating), `as_str()`, Display, TryFrom<&str>,
/// Serialize, Deserialize.
macro_rules! define_name {
    ($name:ident, $validate:ident) => {
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(String);

        impl $name {
            pub fn new(s: impl Into<String>) -> Result<Self> {
                let s = s.into();
                $validate(&s).map_err(|reason| {
                    Error::invalid_argument(format!(
                        concat!("invalid ", stringify!($name), " {:?}: {}"),
                        s, reason
                    ))
                })?;
                Ok(Self(s))
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl TryFrom<&str> for $name {
            type Error = Error;

            fn try_from(s: &str) -> Result<Self> {
                Self::new(s)
            }
        }

        impl TryFrom<String> for $name {
            type Error = Error;

            fn try_from(s: String) -> Result<Self> {
                Self::new(s)
            }
        }

        impl From<$name> for String {
            fn from(name: $name) -> String {
                name.0
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

define_name!(ObjectPath, validate_object_path);
define_name!(InterfaceName, validate_interface_name);

/// Maximum length of an interface name.
const MAX_INTERFACE_NAME_LEN: usize = 255;

fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

fn validate_object_path(s: &str) -> std::result::Result<(), &'static str> {
    if !s.starts_with('/') {
        return Err("must start with '/'");
    }
    if s == "/" {
        return Ok(());
    }
    if s.ends_with('/') {
        return Err("trailing '/' is only allowed for the root path");
    }
    for element in s[1..].split('/') {
        if element.is_empty() {
            return Err("empty path element");
        }
        if !element.chars().all(is_name_char) {
            return Err("path elements may only contain [A-Za-z0-9_]");
        }
    }
    Ok(())
}

fn validate_interface_name(s: &str) -> std::result::Result<(), &'static str> {
    if s.len() > MAX_INTERFACE_NAME_LEN {
        return Err("longer than 255 bytes");
    }
    let elements: Vec<&str> = s.split('.').collect();
    if elements.len() < 2 {
        return Err("needs at least two '.'-separated elements");
    }
    for element in elements {
        let mut chars = element.chars();
        match chars.next() {
            None => return Err("empty element"),
            Some(c) if c.is_ascii_digit() => return Err("element starts with a digit"),
            Some(c) if !is_name_char(c) => return Err("elements may only contain [A-Za-z0-9_]"),
            Some(_) => {}
        }
        if !chars.all(is_name_char) {
            return Err("elements may only contain [A-Za-z0-9_]");
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_path_validation() {
        assert!(ObjectPath::new("/").is_ok());
        assert!(ObjectPath::new("/com/example/Service").is_ok());
        assert!(ObjectPath::new("/com/example/service_1").is_ok());

        assert!(ObjectPath::new("").is_err());
        assert!(ObjectPath::new("com/example").is_err());
        assert!(ObjectPath::new("/com/example/").is_err());
        assert!(ObjectPath::new("/com//example").is_err());
        assert!(ObjectPath::new("/com/ex-ample").is_err());
    }

    #[test]
    fn test_interface_name_validation() {
        assert!(InterfaceName::new("com.example.Service").is_ok());
        assert!(InterfaceName::new("org.freedesktop.DBus.Properties").is_ok());

        assert!(InterfaceName::new("Service").is_err());
        assert!(InterfaceName::new("com..example").is_err());
        assert!(InterfaceName::new("com.1example").is_err());
        assert!(InterfaceName::new("com.ex-ample").is_err());
        assert!(InterfaceName::new(format!("a.{}", "b".repeat(300))).is_err());
    }

    #[test]
    fn test_invalid_name_is_invalid_argument() {
        let err = ObjectPath::new("nope").unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
        assert!(err.to_string().contains("ObjectPath"));
    }

    #[test]
    fn test_serde_validates() {
        let path: ObjectPath = serde_json::from_str("\"/a/b\"").unwrap();
        assert_eq!(path.as_str(), "/a/b");
        assert!(serde_json::from_str::<ObjectPath>("\"a/b\"").is_err());
    }
}
