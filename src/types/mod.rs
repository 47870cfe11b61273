//! Core types shared across the crate.
//!
//! This module provides foundational types used throughout the system:
//! - **Names**: Validated bus names (ObjectPath, InterfaceName)
//! - **Errors**: Application error types with thiserror derives
//! - **Config**: Configuration structures for the bus and registries

mod config;
mod errors;
mod names;

pub use config::{BusConfig, Config, DuplicateInterfacePolicy, ObservabilityConfig, RegistryConfig};
pub use errors::{
    Error, Result, ERR_FAILED, ERR_INVALID_ARGS, ERR_PROPERTY_NOT_FOUND, ERR_PROPERTY_READ_ONLY,
    ERR_TIMEOUT, ERR_UNKNOWN_INTERFACE, ERR_UNKNOWN_METHOD, ERR_UNKNOWN_OBJECT,
};
pub use names::{InterfaceName, ObjectPath};
