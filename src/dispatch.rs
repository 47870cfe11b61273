//! Method-call dispatch: routes by interface and member, decodes typed
//! arguments and encodes replies.
//!
//! Replies follow the properties contract: `Get` returns one variant, `GetAll`
//! an `a{sv}`, `Set`/`SetBatch` nothing, `Introspect` the XML string.

use crate::bus::{MethodCall, PropertiesObject, INTROSPECTABLE_INTERFACE, PROPERTIES_INTERFACE};
use crate::types::{Error, Result};
use crate::value::Value;
use std::collections::BTreeMap;

/// Route a method call to the appropriate handler.
pub async fn dispatch(object: &dyn PropertiesObject, call: &MethodCall) -> Result<Vec<Value>> {
    match call.interface.as_str() {
        PROPERTIES_INTERFACE => properties(object, &call.member, &call.args).await,
        INTROSPECTABLE_INTERFACE => introspectable(object, call).await,
        other => Err(Error::unknown_interface(format!(
            "Object {} does not implement {}",
            call.path, other
        ))),
    }
}

async fn properties(object: &dyn PropertiesObject, member: &str, args: &[Value]) -> Result<Vec<Value>> {
    match member {
        "Get" => {
            expect_arity(member, args, 2)?;
            let interface = str_arg(args, 0, "interface")?;
            let name = str_arg(args, 1, "name")?;
            let value = object.get(interface, name).await?;
            Ok(vec![value.into_variant()])
        }

        "GetAll" => {
            expect_arity(member, args, 1)?;
            let interface = str_arg(args, 0, "interface")?;
            let values = object.get_all(interface).await?;
            Ok(vec![Value::variant_dict(values)])
        }

        "Set" => {
            expect_arity(member, args, 3)?;
            let interface = str_arg(args, 0, "interface")?;
            let name = str_arg(args, 1, "name")?;
            let value = match &args[2] {
                Value::Variant(inner) => (**inner).clone(),
                other => {
                    return Err(Error::invalid_argument(format!(
                        "Set: value must be a variant, got {}",
                        other.signature()
                    )))
                }
            };
            object.set(interface, name, value).await?;
            Ok(Vec::new())
        }

        "SetBatch" => {
            expect_arity(member, args, 3)?;
            let interface = str_arg(args, 0, "interface")?;
            let keys = args[1].as_string_array().ok_or_else(|| {
                Error::invalid_argument(format!("SetBatch: keys must be as, got {}", args[1].signature()))
            })?;
            let values = dict_arg(&args[2], "values")?;
            object.set_batch(interface, keys, values).await?;
            Ok(Vec::new())
        }

        _ => Err(Error::unknown_method(format!(
            "Unknown {} method: {}",
            PROPERTIES_INTERFACE, member
        ))),
    }
}

async fn introspectable(object: &dyn PropertiesObject, call: &MethodCall) -> Result<Vec<Value>> {
    match call.member.as_str() {
        "Introspect" => {
            expect_arity(&call.member, &call.args, 0)?;
            let info = object.describe().await;
            Ok(vec![Value::Str(info.to_xml(call.path.as_str()))])
        }
        other => Err(Error::unknown_method(format!(
            "Unknown {} method: {}",
            INTROSPECTABLE_INTERFACE, other
        ))),
    }
}

// =============================================================================
// Argument helpers
// =============================================================================

fn expect_arity(member: &str, args: &[Value], n: usize) -> Result<()> {
    if args.len() != n {
        return Err(Error::invalid_argument(format!(
            "{} takes {} arguments, got {}",
            member,
            n,
            args.len()
        )));
    }
    Ok(())
}

fn str_arg<'a>(args: &'a [Value], index: usize, field: &str) -> Result<&'a str> {
    match args.get(index) {
        Some(Value::Str(s)) => Ok(s),
        Some(other) => Err(Error::invalid_argument(format!(
            "{} must be a string, got {}",
            field,
            other.signature()
        ))),
        None => Err(Error::invalid_argument(format!("Missing required argument: {}", field))),
    }
}

/// Decode an `a{sv}` argument, unwrapping each entry's variant.
fn dict_arg(arg: &Value, field: &str) -> Result<BTreeMap<String, Value>> {
    match arg {
        Value::Dict(_, entries) => Ok(entries
            .iter()
            .map(|(k, v)| (k.clone(), v.clone().into_inner()))
            .collect()),
        other => Err(Error::invalid_argument(format!(
            "{} must be a{{sv}}, got {}",
            field,
            other.signature()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::FieldDescriptor;
    use crate::types::ObjectPath;
    use crate::AttributeRegistry;

    fn registry() -> AttributeRegistry {
        AttributeRegistry::new(&vec![
            FieldDescriptor::new("ID", "2").tag("const,emit"),
            FieldDescriptor::new("Name", "lisi").tag("writeable,emit"),
            FieldDescriptor::new("Index", 1i32).tag("writeable,emit"),
        ])
        .unwrap()
    }

    fn path() -> ObjectPath {
        ObjectPath::new("/com/example/Service").unwrap()
    }

    #[tokio::test]
    async fn test_get_wraps_variant() {
        let reg = registry();
        let reply = dispatch(&reg, &MethodCall::get(path(), "com.example.Service", "Name"))
            .await
            .unwrap();
        assert_eq!(reply, vec![Value::from("lisi").into_variant()]);
    }

    #[tokio::test]
    async fn test_set_then_get_all() {
        let reg = registry();
        dispatch(
            &reg,
            &MethodCall::set(path(), "com.example.Service", "Index", Value::from(7i32)),
        )
        .await
        .unwrap();

        let reply = dispatch(&reg, &MethodCall::get_all(path(), "com.example.Service"))
            .await
            .unwrap();
        let all = reply[0].as_dict().unwrap();
        assert_eq!(all["Index"], Value::from(7i32).into_variant());
        assert_eq!(all.len(), 3);
    }

    #[tokio::test]
    async fn test_set_batch_decodes_dict() {
        let reg = registry();
        let mut values = BTreeMap::new();
        values.insert("Name".to_string(), Value::from("wangwu"));
        values.insert("Index".to_string(), Value::from(3i32));

        dispatch(
            &reg,
            &MethodCall::set_batch(path(), "com.example.Service", vec![], values),
        )
        .await
        .unwrap();

        assert_eq!(reg.get("", "Name").await.unwrap(), Value::from("wangwu"));
        assert_eq!(reg.get("", "Index").await.unwrap(), Value::from(3i32));
    }

    #[tokio::test]
    async fn test_set_requires_variant() {
        let reg = registry();
        let call = MethodCall::new(
            path(),
            PROPERTIES_INTERFACE,
            "Set",
            vec![Value::from("i"), Value::from("Index"), Value::from(1i32)],
        );
        let err = dispatch(&reg, &call).await.unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn test_bad_arity_and_types() {
        let reg = registry();
        let call = MethodCall::new(path(), PROPERTIES_INTERFACE, "Get", vec![Value::from("i")]);
        assert!(matches!(dispatch(&reg, &call).await, Err(Error::InvalidArgument(_))));

        let call = MethodCall::new(
            path(),
            PROPERTIES_INTERFACE,
            "Get",
            vec![Value::from("i"), Value::from(1u32)],
        );
        let err = dispatch(&reg, &call).await.unwrap_err();
        assert!(err.to_string().contains("name must be a string"));
    }

    #[tokio::test]
    async fn test_unknown_member_and_interface() {
        let reg = registry();
        let call = MethodCall::new(path(), PROPERTIES_INTERFACE, "Delete", vec![]);
        assert!(matches!(dispatch(&reg, &call).await, Err(Error::UnknownMethod(_))));

        let call = MethodCall::new(path(), "com.example.Other", "Ping", vec![]);
        assert!(matches!(dispatch(&reg, &call).await, Err(Error::UnknownInterface(_))));
    }

    #[tokio::test]
    async fn test_introspect_returns_xml() {
        let reg = registry().with_interface(crate::InterfaceName::new("com.example.Service").unwrap());
        let reply = dispatch(&reg, &MethodCall::introspect(path())).await.unwrap();
        let xml = reply[0].as_str().unwrap();
        assert!(xml.contains("<interface name=\"com.example.Service\">"));
        assert!(xml.contains("<property name=\"ID\" type=\"s\" access=\"read\">"));
    }
}
