//! # propbus - typed attribute registries over a property bus
//!
//! Exposes the fields of in-memory records as remotely readable and writable
//! bus properties, with atomic batch updates, change signals and introspection:
//! - Schema extraction from tagged field descriptors or any `Serialize` record
//! - Per-record registries with a frozen schema and an owned slot arena
//! - Optional owner change hooks that can veto or transform remote writes
//! - Multi-interface aggregation under one exported object
//! - An in-process bus carrying `Get`/`GetAll`/`Set`/`SetBatch` calls and
//!   `PropertiesChanged` signals
//!
//! ## Architecture
//!
//! ```text
//!                    ┌──────────────────────────────────────┐
//!   method call  →   │  LocalBus ─→ dispatch                │
//!                    │                │                     │
//!                    │        ┌───────┴────────┐            │
//!                    │        │ MultiRegistry  │ (optional) │
//!                    │        └───────┬────────┘            │
//!                    │     ┌──────────┴──────────┐          │
//!                    │     │ AttributeRegistry   │          │
//!                    │     │  Schema │ Slots     │ ← hook   │
//!                    │     └──────────┬──────────┘          │
//!   signals      ←   │   PropertiesChanged via Bus::emit    │
//!                    └──────────────────────────────────────┘
//! ```

// Enforce strict safety at compile time
#![deny(unsafe_code)]
#![warn(missing_debug_implementations)]
#![warn(rust_2018_idioms)]

pub mod bus;
pub mod dispatch;
pub mod introspect;
pub mod multi;
pub mod registry;
pub mod schema;
pub mod types;
pub mod value;

// Internal utilities
pub mod observability;

pub use multi::MultiRegistry;
pub use registry::{AttributeRegistry, ChangeHook, SlotWriter};
pub use schema::{FieldDescriptor, JsonRecord, NotifyMode, Record};
pub use types::{Config, Error, InterfaceName, ObjectPath, Result};
pub use value::{Type, Value};
