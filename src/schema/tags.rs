//! Declarative field tags.
//!
//! A tag is a comma-separated keyword list attached to a record member:
//!
//! ```text
//! "writeable,emit"          writable, notify with value
//! "const"                   read-only, never changes
//! "invalidates,name:Token"  notify by invalidation, exported as "Token"
//! "-"                       not exported
//! ```

use crate::types::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// How changes to an attribute are announced to subscribers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotifyMode {
    /// Changes are not announced.
    #[default]
    None,
    /// Changes are announced with the new value.
    Always,
    /// Changes are announced by name only; subscribers re-read.
    InvalidateOnly,
    /// The value never changes after registration.
    Const,
}

impl NotifyMode {
    /// Value of the `org.freedesktop.DBus.Property.EmitsChangedSignal`
    /// annotation.
    pub fn annotation(&self) -> &'static str {
        match self {
            NotifyMode::None => "false",
            NotifyMode::Always => "true",
            NotifyMode::InvalidateOnly => "invalidates",
            NotifyMode::Const => "const",
        }
    }
}

impl fmt::Display for NotifyMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.annotation())
    }
}

/// Export settings for one record member.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FieldTag {
    /// Exported name override.
    pub name: Option<String>,
    pub writable: bool,
    pub notify: NotifyMode,
    /// Member is explicitly excluded from export.
    pub ignored: bool,
}

impl FieldTag {
    /// Parse a declarative tag string.
    ///
    /// The first notify keyword wins; later ones are ignored. Unknown
    /// keywords are rejected.
    pub fn parse(tag: &str) -> Result<Self> {
        let tag = tag.trim();
        if tag == "-" {
            return Ok(Self {
                ignored: true,
                ..Self::default()
            });
        }

        let mut parsed = Self::default();
        let mut notify = None;
        for item in tag.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            match item {
                "writeable" => parsed.writable = true,
                "emit" | "emittrue" => {
                    notify.get_or_insert(NotifyMode::Always);
                }
                "invalidates" | "emitinvalidates" => {
                    notify.get_or_insert(NotifyMode::InvalidateOnly);
                }
                "const" | "emitconst" => {
                    notify.get_or_insert(NotifyMode::Const);
                }
                "emitfalse" => {
                    notify.get_or_insert(NotifyMode::None);
                }
                other => match other.strip_prefix("name:") {
                    Some(name) if !name.is_empty() => parsed.name = Some(name.to_string()),
                    Some(_) => return Err(Error::schema(format!("empty name override in tag {:?}", tag))),
                    None => {
                        return Err(Error::schema(format!(
                            "unknown tag keyword {:?} in {:?}",
                            other, tag
                        )))
                    }
                },
            }
        }
        parsed.notify = notify.unwrap_or_default();
        Ok(parsed)
    }
}
