//! Multi-registry: one exported object, many interfaces.
//!
//! Each interface gets its own [`AttributeRegistry`] with its own lock, so
//! calls on different interfaces never wait on each other. The aggregate lock
//! only guards the interface table; lookups clone the child's `Arc` and
//! release it before delegating, so a concurrent replace cannot affect a call
//! already in flight.

use crate::bus::{Bus, PropertiesObject};
use crate::introspect::{properties_interface, InterfaceInfo, ObjectInfo, PropertyInfo};
use crate::registry::{AttributeRegistry, ExportBinding};
use crate::schema::Record;
use crate::types::{DuplicateInterfacePolicy, Error, InterfaceName, ObjectPath, RegistryConfig, Result};
use crate::value::Value;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Debug, Default)]
struct Children {
    by_interface: BTreeMap<String, Arc<AttributeRegistry>>,
    export: Option<ExportBinding>,
}

/// Interface-name to registry map exported as a single object.
#[derive(Debug, Default)]
pub struct MultiRegistry {
    policy: DuplicateInterfacePolicy,
    children: RwLock<Children>,
}

impl MultiRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_policy(policy: DuplicateInterfacePolicy) -> Self {
        Self {
            policy,
            ..Self::default()
        }
    }

    pub fn from_config(config: &RegistryConfig) -> Self {
        Self::with_policy(config.duplicate_interfaces)
    }

    /// Register `record` under `interface`.
    pub async fn add(
        &self,
        interface: InterfaceName,
        record: &(impl Record + ?Sized),
    ) -> Result<Arc<AttributeRegistry>> {
        let registry = AttributeRegistry::new(record)?;
        self.insert(interface, registry).await
    }

    /// Register an already built registry (for example one with a change
    /// hook) under `interface`.
    pub async fn insert(
        &self,
        interface: InterfaceName,
        registry: AttributeRegistry,
    ) -> Result<Arc<AttributeRegistry>> {
        let child = Arc::new(registry.with_interface(interface.clone()));
        let mut children = self.children.write().await;

        let replaced = match children.by_interface.get(interface.as_str()) {
            Some(_) if self.policy == DuplicateInterfacePolicy::Reject => {
                return Err(Error::duplicate_interface(interface.to_string()));
            }
            Some(existing) => Some(existing.clone()),
            None => None,
        };

        // A child added after export emits from the aggregate's path.
        child.bind(children.export.clone()).await;
        children
            .by_interface
            .insert(interface.to_string(), child.clone());
        drop(children);

        if let Some(old) = replaced {
            old.bind(None).await;
            tracing::warn!("Replaced registry for interface {}", interface);
        } else {
            tracing::info!("Added registry for interface {}", interface);
        }
        Ok(child)
    }

    /// Replace `interface` regardless of the duplicate policy.
    pub async fn replace(
        &self,
        interface: InterfaceName,
        record: &(impl Record + ?Sized),
    ) -> Result<Arc<AttributeRegistry>> {
        let child = Arc::new(AttributeRegistry::new(record)?.with_interface(interface.clone()));
        let mut children = self.children.write().await;
        child.bind(children.export.clone()).await;
        let old = children
            .by_interface
            .insert(interface.to_string(), child.clone());
        drop(children);

        if let Some(old) = old {
            old.bind(None).await;
        }
        tracing::info!("Registry for interface {} replaced", interface);
        Ok(child)
    }

    /// Drop `interface`. The removed registry stops emitting.
    pub async fn remove(&self, interface: &str) -> Result<Arc<AttributeRegistry>> {
        let removed = self
            .children
            .write()
            .await
            .by_interface
            .remove(interface)
            .ok_or_else(|| Error::unknown_interface(interface.to_string()))?;
        removed.bind(None).await;
        tracing::info!("Removed registry for interface {}", interface);
        Ok(removed)
    }

    /// Registered interface names, sorted.
    pub async fn interfaces(&self) -> Vec<String> {
        self.children.read().await.by_interface.keys().cloned().collect()
    }

    /// The child registry answering for `interface`.
    pub async fn child(&self, interface: &str) -> Result<Arc<AttributeRegistry>> {
        self.children
            .read()
            .await
            .by_interface
            .get(interface)
            .cloned()
            .ok_or_else(|| Error::unknown_interface(interface.to_string()))
    }

    pub async fn get(&self, interface: &str, name: &str) -> Result<Value> {
        self.child(interface).await?.get(interface, name).await
    }

    pub async fn get_all(&self, interface: &str) -> Result<BTreeMap<String, Value>> {
        self.child(interface).await?.get_all(interface).await
    }

    pub async fn set(&self, interface: &str, name: &str, value: Value) -> Result<()> {
        self.child(interface).await?.set(interface, name, value).await
    }

    pub async fn set_batch(
        &self,
        interface: &str,
        keys: Vec<String>,
        values: BTreeMap<String, Value>,
    ) -> Result<()> {
        self.child(interface)
            .await?
            .set_batch(interface, keys, values)
            .await
    }

    pub async fn emit(
        &self,
        interface: &str,
        keys: Vec<String>,
        values: BTreeMap<String, Value>,
    ) -> Result<()> {
        self.child(interface).await?.emit(interface, keys, values).await
    }

    pub async fn emit_changes(&self, interface: &str, names: &[&str]) -> Result<bool> {
        self.child(interface)
            .await?
            .emit_changes(interface, names)
            .await
    }

    /// Per-interface attribute descriptions.
    pub async fn introspection(&self) -> BTreeMap<String, Vec<PropertyInfo>> {
        self.children
            .read()
            .await
            .by_interface
            .iter()
            .map(|(name, child)| (name.clone(), child.introspection()))
            .collect()
    }

    /// Publish every interface as one object at `path`.
    pub async fn export(self: &Arc<Self>, bus: Arc<dyn Bus>, path: ObjectPath) -> Result<()> {
        let binding = ExportBinding {
            bus: bus.clone(),
            path: path.clone(),
        };
        {
            let mut children = self.children.write().await;
            if let Some(existing) = &children.export {
                return Err(Error::invalid_argument(format!(
                    "Multi-registry already exported at {}",
                    existing.path
                )));
            }
            let object: Arc<dyn PropertiesObject> = self.clone();
            bus.export(&path, object).await?;

            for child in children.by_interface.values() {
                child.bind(Some(binding.clone())).await;
            }
            children.export = Some(binding);
        }
        tracing::info!("Multi-registry exported at {}", path);
        Ok(())
    }

    pub async fn unexport(&self) -> Result<()> {
        let mut children = self.children.write().await;
        let binding = children
            .export
            .take()
            .ok_or_else(|| Error::not_exported("multi-registry is not exported"))?;
        for child in children.by_interface.values() {
            child.bind(None).await;
        }
        drop(children);

        binding.bus.unexport(&binding.path).await?;
        tracing::info!("Multi-registry unexported from {}", binding.path);
        Ok(())
    }
}

#[async_trait]
impl PropertiesObject for MultiRegistry {
    async fn get(&self, interface: &str, name: &str) -> Result<Value> {
        MultiRegistry::get(self, interface, name).await
    }

    async fn get_all(&self, interface: &str) -> Result<BTreeMap<String, Value>> {
        MultiRegistry::get_all(self, interface).await
    }

    async fn set(&self, interface: &str, name: &str, value: Value) -> Result<()> {
        MultiRegistry::set(self, interface, name, value).await
    }

    async fn set_batch(
        &self,
        interface: &str,
        keys: Vec<String>,
        values: BTreeMap<String, Value>,
    ) -> Result<()> {
        MultiRegistry::set_batch(self, interface, keys, values).await
    }

    async fn describe(&self) -> ObjectInfo {
        let mut interfaces: Vec<InterfaceInfo> = self
            .introspection()
            .await
            .into_iter()
            .map(|(name, properties)| InterfaceInfo::with_properties(name, properties))
            .collect();
        interfaces.push(properties_interface());
        ObjectInfo { interfaces }
    }
}
