//! Log output of change-hook vetoes.
//!
//! Kept in its own binary: `traced_test` only captures events while no
//! process-wide subscriber is installed, and the library's unit tests install
//! one.

use propbus::{AttributeRegistry, ChangeHook, Error, FieldDescriptor, SlotWriter, Value};
use std::collections::BTreeMap;
use std::sync::Arc;

const IFACE: &str = "com.example.Service";

/// Owner that refuses negative indexes.
struct Owner;

impl ChangeHook for Owner {
    fn change(
        &self,
        _keys: &[String],
        values: &BTreeMap<String, Value>,
        _writer: &mut SlotWriter<'_>,
    ) -> propbus::Result<()> {
        match values.get("Index") {
            Some(Value::Int32(i)) if *i < 0 => Err(Error::invalid_argument("Index must be positive")),
            _ => Ok(()),
        }
    }
}

#[tokio::test]
#[tracing_test::traced_test]
async fn test_hook_veto_is_logged() {
    let owner = Arc::new(Owner);
    let registry = AttributeRegistry::new(&vec![
        FieldDescriptor::new("Index", 1i32).tag("writeable,emit"),
    ])
    .unwrap()
    .with_change_hook(&owner);

    let err = registry
        .set(IFACE, "Index", Value::from(-5i32))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidArgument(_)));
    assert!(logs_contain("Change hook vetoed write"));
    assert!(logs_contain("Index must be positive"));
}

#[tokio::test]
#[tracing_test::traced_test]
async fn test_accepted_write_logs_no_veto() {
    let owner = Arc::new(Owner);
    let registry = AttributeRegistry::new(&vec![
        FieldDescriptor::new("Index", 1i32).tag("writeable,emit"),
    ])
    .unwrap()
    .with_change_hook(&owner);

    registry.set(IFACE, "Index", Value::from(4i32)).await.unwrap();
    assert!(!logs_contain("vetoed"));
}
