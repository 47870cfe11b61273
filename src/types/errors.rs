//! Application error types.
//!
//! All errors use `thiserror` for automatic Error trait derivation and provide
//! clear error messages with context. Every variant that can reach a remote
//! caller maps to a named bus error via [`Error::bus_error_name`].

use thiserror::Error;

/// Application result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Bus error name for an unknown property.
pub const ERR_PROPERTY_NOT_FOUND: &str = "org.freedesktop.DBus.Properties.Error.PropertyNotFound";
/// Bus error name for a write to a read-only property.
pub const ERR_PROPERTY_READ_ONLY: &str = "org.freedesktop.DBus.Properties.Error.PropertyReadOnly";
/// Bus error name for an unknown interface.
pub const ERR_UNKNOWN_INTERFACE: &str = "org.freedesktop.DBus.Error.UnknownInterface";
/// Bus error name for an unknown object path.
pub const ERR_UNKNOWN_OBJECT: &str = "org.freedesktop.DBus.Error.UnknownObject";
/// Bus error name for an unknown method.
pub const ERR_UNKNOWN_METHOD: &str = "org.freedesktop.DBus.Error.UnknownMethod";
/// Bus error name for malformed or mismatched arguments.
pub const ERR_INVALID_ARGS: &str = "org.freedesktop.DBus.Error.InvalidArgs";
/// Bus error name for a call that exceeded its deadline.
pub const ERR_TIMEOUT: &str = "org.freedesktop.DBus.Error.Timeout";
/// Generic bus failure.
pub const ERR_FAILED: &str = "org.freedesktop.DBus.Error.Failed";

/// Main error enum for the property registry.
#[derive(Error, Debug)]
pub enum Error {
    /// Registration target is not record-shaped, exports nothing, or
    /// declares conflicting attribute names.
    #[error("schema error: {0}")]
    Schema(String),

    /// Unknown attribute name within an existing interface.
    #[error("property not found: {0}")]
    NotFound(String),

    /// Unknown interface name within a multi-registry.
    #[error("unknown interface: {0}")]
    UnknownInterface(String),

    /// Write attempted on a const or non-writable attribute.
    #[error("property is read-only: {0}")]
    ReadOnly(String),

    /// Type mismatch, mismatched batch key sets, or malformed arguments.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Stored value cannot be marshalled for a read.
    #[error("property unreadable: {0}")]
    Unreadable(String),

    /// Interface already registered in a multi-registry.
    #[error("interface already registered: {0}")]
    DuplicateInterface(String),

    /// Signal emission attempted before the registry was exported.
    #[error("registry not exported: {0}")]
    NotExported(String),

    /// No object exported at the requested path.
    #[error("unknown object: {0}")]
    UnknownObject(String),

    /// Method not implemented by the addressed interface.
    #[error("unknown method: {0}")]
    UnknownMethod(String),

    /// Transport-level call deadline exceeded.
    #[error("timeout: {0}")]
    Timeout(String),

    /// Internal errors.
    #[error("internal error: {0}")]
    Internal(String),

    /// Serialization/deserialization errors.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O errors.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Bus error name returned to remote callers.
    ///
    /// `Unreadable` is surfaced under the same name as `NotFound`.
    pub fn bus_error_name(&self) -> &'static str {
        match self {
            Error::NotFound(_) | Error::Unreadable(_) => ERR_PROPERTY_NOT_FOUND,
            Error::ReadOnly(_) => ERR_PROPERTY_READ_ONLY,
            Error::UnknownInterface(_) => ERR_UNKNOWN_INTERFACE,
            Error::UnknownObject(_) => ERR_UNKNOWN_OBJECT,
            Error::UnknownMethod(_) => ERR_UNKNOWN_METHOD,
            Error::InvalidArgument(_) => ERR_INVALID_ARGS,
            Error::Timeout(_) => ERR_TIMEOUT,
            Error::Schema(_)
            | Error::DuplicateInterface(_)
            | Error::NotExported(_)
            | Error::Internal(_)
            | Error::Serialization(_)
            | Error::Io(_) => ERR_FAILED,
        }
    }
}

// Convenience constructors
impl Error {
    pub fn schema(msg: impl Into<String>) -> Self {
        Self::Schema(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn unknown_interface(msg: impl Into<String>) -> Self {
        Self::UnknownInterface(msg.into())
    }

    pub fn read_only(msg: impl Into<String>) -> Self {
        Self::ReadOnly(msg.into())
    }

    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    pub fn unreadable(msg: impl Into<String>) -> Self {
        Self::Unreadable(msg.into())
    }

    pub fn duplicate_interface(msg: impl Into<String>) -> Self {
        Self::DuplicateInterface(msg.into())
    }

    pub fn not_exported(msg: impl Into<String>) -> Self {
        Self::NotExported(msg.into())
    }

    pub fn unknown_object(msg: impl Into<String>) -> Self {
        Self::UnknownObject(msg.into())
    }

    pub fn unknown_method(msg: impl Into<String>) -> Self {
        Self::UnknownMethod(msg.into())
    }

    pub fn timeout(msg: impl Into<String>) -> Self {
        Self::Timeout(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unreadable_surfaces_as_not_found() {
        assert_eq!(
            Error::unreadable("Token").bus_error_name(),
            Error::not_found("Token").bus_error_name()
        );
    }

    #[test]
    fn test_error_names_are_distinct_per_kind() {
        assert_eq!(Error::read_only("x").bus_error_name(), ERR_PROPERTY_READ_ONLY);
        assert_eq!(Error::unknown_interface("x").bus_error_name(), ERR_UNKNOWN_INTERFACE);
        assert_eq!(Error::invalid_argument("x").bus_error_name(), ERR_INVALID_ARGS);
        assert_eq!(Error::timeout("x").bus_error_name(), ERR_TIMEOUT);
    }

    #[test]
    fn test_display_includes_context() {
        let err = Error::read_only("ID");
        assert_eq!(err.to_string(), "property is read-only: ID");
    }
}
