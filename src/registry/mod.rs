//! Attribute registry.
//!
//! An [`AttributeRegistry`] owns one frozen [`Schema`] and the slot arena
//! holding the exported values. Every read and write takes the registry lock
//! for its whole duration, so a batch is never observed half-applied. Once a
//! record is registered the registry is the only mutator of its slots: remote
//! callers go through Set/SetBatch, local code through the same methods or
//! [`AttributeRegistry::update`].

mod hook;

pub use hook::{ChangeHook, SlotWriter};

use crate::bus::{Bus, PropertiesChanged, PropertiesObject};
use crate::introspect::{properties_interface, InterfaceInfo, ObjectInfo, PropertyInfo};
use crate::schema::{AttributeDescriptor, NotifyMode, Record, Schema, Slot};
use crate::types::{Error, InterfaceName, ObjectPath, Result};
use crate::value::Value;
use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Weak};
use tokio::sync::Mutex;

/// Where a registry is published.
#[derive(Debug, Clone)]
pub(crate) struct ExportBinding {
    pub(crate) bus: Arc<dyn Bus>,
    pub(crate) path: ObjectPath,
}

#[derive(Debug)]
struct State {
    slots: Vec<Slot>,
    export: Option<ExportBinding>,
}

/// Remotely readable/writable view of one record.
#[derive(Debug)]
pub struct AttributeRegistry {
    schema: Schema,
    /// Interface this registry answers for, used for introspection.
    interface: Option<InterfaceName>,
    /// Only used to detect the change-hook capability; never owns the owner.
    hook: Option<Weak<dyn ChangeHook>>,
    state: Mutex<State>,
}

impl AttributeRegistry {
    /// Register `record`, freezing its schema.
    pub fn new(record: &(impl Record + ?Sized)) -> Result<Self> {
        let (schema, slots) = Schema::extract(record)?;
        tracing::info!("Registered record with {} attributes", schema.len());
        Ok(Self {
            schema,
            interface: None,
            hook: None,
            state: Mutex::new(State {
                slots,
                export: None,
            }),
        })
    }

    /// Name the interface this registry is published under.
    pub fn with_interface(mut self, interface: InterfaceName) -> Self {
        self.interface = Some(interface);
        self
    }

    /// Route every validated write through `hook` while it is alive.
    ///
    /// Only a weak reference is kept. Once the owner is dropped, writes fall
    /// back to direct assignment.
    pub fn with_change_hook<H: ChangeHook + 'static>(mut self, hook: &Arc<H>) -> Self {
        let hook: Arc<dyn ChangeHook> = hook.clone();
        self.hook = Some(Arc::downgrade(&hook));
        self
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn interface(&self) -> Option<&InterfaceName> {
        self.interface.as_ref()
    }

    fn live_hook(&self) -> Option<Arc<dyn ChangeHook>> {
        self.hook.as_ref().and_then(Weak::upgrade)
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Current value of `name`.
    pub async fn get(&self, interface: &str, name: &str) -> Result<Value> {
        let state = self.state.lock().await;
        let attr = self
            .schema
            .get(name)
            .ok_or_else(|| Error::not_found(format!("{} on {}", name, interface)))?;
        let value = readable(attr, &state.slots)?;
        tracing::debug!("Get {} on {:?}", name, interface);
        Ok(value)
    }

    /// Snapshot of every attribute.
    pub async fn get_all(&self, interface: &str) -> Result<BTreeMap<String, Value>> {
        let state = self.state.lock().await;
        let mut result = BTreeMap::new();
        for attr in self.schema.attributes() {
            result.insert(attr.name.clone(), readable(attr, &state.slots)?);
        }
        tracing::debug!("GetAll on {:?} ({} attributes)", interface, result.len());
        Ok(result)
    }

    // =========================================================================
    // Writes
    // =========================================================================

    /// Set one attribute.
    ///
    /// Fails `NotFound` for an unknown name, `ReadOnly` for a const or
    /// non-writable attribute and `InvalidArgument` when `value` does not fit
    /// the attribute's type. With a live change hook the write is delegated.
    pub async fn set(&self, interface: &str, name: &str, value: Value) -> Result<()> {
        let mut state = self.state.lock().await;
        let attr = self.settable(name)?;
        let value = coerce(attr, &state.slots, value)?;

        if let Some(hook) = self.live_hook() {
            let mut values = BTreeMap::new();
            values.insert(name.to_string(), value);
            return self.delegate(hook.as_ref(), &mut state, vec![name.to_string()], values);
        }

        state.slots[attr.slot].store(value);
        tracing::debug!("Set {} on {:?}", name, interface);
        Ok(())
    }

    /// Set several attributes atomically.
    ///
    /// An empty `keys` is derived from `values`. When both are non-empty they
    /// must name the same attributes. Every key is validated like
    /// [`set`](Self::set) before any slot changes.
    pub async fn set_batch(
        &self,
        interface: &str,
        keys: Vec<String>,
        values: BTreeMap<String, Value>,
    ) -> Result<()> {
        let mut state = self.state.lock().await;
        let keys = batch_keys(keys, &values)?;
        if keys.is_empty() {
            return Ok(());
        }

        let mut staged = Vec::with_capacity(keys.len());
        let mut coerced = BTreeMap::new();
        for key in &keys {
            let attr = self.settable(key)?;
            let value = values
                .get(key)
                .cloned()
                .ok_or_else(|| Error::invalid_argument(format!("No value supplied for {}", key)))?;
            let value = coerce(attr, &state.slots, value)?;
            staged.push((attr.slot, value.clone()));
            coerced.insert(key.clone(), value);
        }

        if let Some(hook) = self.live_hook() {
            return self.delegate(hook.as_ref(), &mut state, keys, coerced);
        }

        for (slot, value) in staged {
            state.slots[slot].store(value);
        }
        tracing::debug!("SetBatch {:?} on {:?}", keys, interface);
        Ok(())
    }

    /// Run `f` with a staged writer while holding the registry lock.
    ///
    /// This is the local counterpart of Set/SetBatch: writes skip the writable
    /// check but are type-checked, cannot touch const attributes, and are
    /// applied only if `f` succeeds.
    pub async fn update<T>(&self, f: impl FnOnce(&mut SlotWriter<'_>) -> Result<T>) -> Result<T> {
        let mut state = self.state.lock().await;
        let mut writer = SlotWriter::new(&self.schema, &state.slots);
        let out = f(&mut writer)?;
        let staged = writer.into_staged();
        let written = hook::commit(&mut state.slots, staged);
        tracing::debug!("Local update wrote {:?}", written);
        Ok(out)
    }

    fn settable(&self, name: &str) -> Result<&AttributeDescriptor> {
        let attr = self
            .schema
            .get(name)
            .ok_or_else(|| Error::not_found(name.to_string()))?;
        if !attr.is_settable() {
            return Err(Error::read_only(name.to_string()));
        }
        Ok(attr)
    }

    /// Hand a validated write to the owner's hook; apply what it stages.
    fn delegate(
        &self,
        hook: &dyn ChangeHook,
        state: &mut State,
        keys: Vec<String>,
        values: BTreeMap<String, Value>,
    ) -> Result<()> {
        let staged = {
            let mut writer = SlotWriter::new(&self.schema, &state.slots);
            for key in &keys {
                if let (Some(attr), Some(value)) = (self.schema.get(key), values.get(key)) {
                    writer.stage_unchecked(attr.slot, key, value.clone());
                }
            }
            // The hook sees the proposed write and may restage or veto it.
            if let Err(e) = hook.change(&keys, &values, &mut writer) {
                tracing::warn!("Change hook vetoed write of {:?}: {}", keys, e);
                return Err(e);
            }
            writer.into_staged()
        };
        let written = hook::commit(&mut state.slots, staged);
        tracing::debug!("Change hook wrote {:?}", written);
        Ok(())
    }

    // =========================================================================
    // Notification
    // =========================================================================

    /// Broadcast a change notification.
    ///
    /// `values` become the changed properties, `keys` the invalidated ones.
    /// Both empty, or both non-empty with different lengths, fails
    /// `InvalidArgument`; a name outside the schema fails `NotFound`.
    pub async fn emit(
        &self,
        interface: &str,
        keys: Vec<String>,
        values: BTreeMap<String, Value>,
    ) -> Result<()> {
        if keys.is_empty() && values.is_empty() {
            return Err(Error::invalid_argument("Emit needs keys or values"));
        }
        if !keys.is_empty() && !values.is_empty() {
            if keys.len() != values.len() {
                return Err(Error::invalid_argument(format!(
                    "Emit got {} keys but {} values",
                    keys.len(),
                    values.len()
                )));
            }
            if let Some(missing) = keys.iter().find(|k| !values.contains_key(*k)) {
                return Err(Error::not_found(format!("{} has no emitted value", missing)));
            }
        }
        if let Some(unknown) = keys
            .iter()
            .chain(values.keys())
            .find(|k| !self.schema.contains(k))
        {
            return Err(Error::not_found(unknown.clone()));
        }

        let export = self.binding(interface).await?;
        let signal = PropertiesChanged {
            interface: interface.to_string(),
            changed_properties: values,
            invalidated_properties: keys,
        };
        export.bus.emit(&export.path, signal).await
    }

    /// Announce changes to `names` according to each attribute's notify mode.
    ///
    /// `Always` attributes are sent with their current value, `InvalidateOnly`
    /// attributes (and unset ones) by name; `None` and `Const` attributes are
    /// skipped. Returns whether a signal was sent.
    pub async fn emit_changes(&self, interface: &str, names: &[&str]) -> Result<bool> {
        let state = self.state.lock().await;
        let mut signal = PropertiesChanged {
            interface: interface.to_string(),
            ..PropertiesChanged::default()
        };
        for name in names {
            let attr = self
                .schema
                .get(name)
                .ok_or_else(|| Error::not_found(name.to_string()))?;
            match attr.notify {
                NotifyMode::Always => match state.slots[attr.slot].value() {
                    Some(value) if value.is_well_formed() => {
                        signal
                            .changed_properties
                            .insert(attr.name.clone(), value.clone());
                    }
                    _ => signal.invalidated_properties.push(attr.name.clone()),
                },
                NotifyMode::InvalidateOnly => signal.invalidated_properties.push(attr.name.clone()),
                NotifyMode::None | NotifyMode::Const => {}
            }
        }
        if signal.is_empty() {
            return Ok(false);
        }

        let export = state
            .export
            .clone()
            .ok_or_else(|| Error::not_exported(format!("cannot emit {:?}", interface)))?;
        // Outbound delivery must not hold up Get and Set.
        drop(state);
        export.bus.emit(&export.path, signal).await?;
        Ok(true)
    }

    async fn binding(&self, interface: &str) -> Result<ExportBinding> {
        self.state
            .lock()
            .await
            .export
            .clone()
            .ok_or_else(|| Error::not_exported(format!("cannot emit {:?}", interface)))
    }

    // =========================================================================
    // Introspection
    // =========================================================================

    /// Static description of every exported attribute, in declaration order.
    pub fn introspection(&self) -> Vec<PropertyInfo> {
        self.schema
            .attributes()
            .iter()
            .map(|attr| PropertyInfo {
                name: attr.name.clone(),
                signature: attr.ty.signature(),
                access: attr.access(),
                notify: attr.notify,
            })
            .collect()
    }

    /// Description of the properties interface this registry implements.
    pub fn interface_info(&self) -> InterfaceInfo {
        properties_interface()
    }

    // =========================================================================
    // Export
    // =========================================================================

    /// Publish this registry at `path`.
    pub async fn export(self: &Arc<Self>, bus: Arc<dyn Bus>, path: ObjectPath) -> Result<()> {
        {
            let mut state = self.state.lock().await;
            if let Some(existing) = &state.export {
                return Err(Error::invalid_argument(format!(
                    "Registry already exported at {}",
                    existing.path
                )));
            }
            state.export = Some(ExportBinding {
                bus: bus.clone(),
                path: path.clone(),
            });
        }

        let object: Arc<dyn PropertiesObject> = self.clone();
        if let Err(e) = bus.export(&path, object).await {
            self.state.lock().await.export = None;
            return Err(e);
        }
        tracing::info!("Registry exported at {}", path);
        Ok(())
    }

    /// Withdraw this registry from the bus.
    pub async fn unexport(&self) -> Result<()> {
        let binding = self
            .state
            .lock()
            .await
            .export
            .take()
            .ok_or_else(|| Error::not_exported("registry is not exported"))?;
        binding.bus.unexport(&binding.path).await?;
        tracing::info!("Registry unexported from {}", binding.path);
        Ok(())
    }

    /// Path this registry emits from, if exported.
    pub async fn export_path(&self) -> Option<ObjectPath> {
        self.state.lock().await.export.as_ref().map(|b| b.path.clone())
    }

    /// Point signal emission at a parent's export without exporting this
    /// registry on its own.
    pub(crate) async fn bind(&self, binding: Option<ExportBinding>) {
        self.state.lock().await.export = binding;
    }
}

#[async_trait]
impl PropertiesObject for AttributeRegistry {
    async fn get(&self, interface: &str, name: &str) -> Result<Value> {
        AttributeRegistry::get(self, interface, name).await
    }

    async fn get_all(&self, interface: &str) -> Result<BTreeMap<String, Value>> {
        AttributeRegistry::get_all(self, interface).await
    }

    async fn set(&self, interface: &str, name: &str, value: Value) -> Result<()> {
        AttributeRegistry::set(self, interface, name, value).await
    }

    async fn set_batch(
        &self,
        interface: &str,
        keys: Vec<String>,
        values: BTreeMap<String, Value>,
    ) -> Result<()> {
        AttributeRegistry::set_batch(self, interface, keys, values).await
    }

    async fn describe(&self) -> ObjectInfo {
        let mut interfaces = Vec::new();
        if let Some(name) = &self.interface {
            interfaces.push(InterfaceInfo::with_properties(
                name.as_str(),
                self.introspection(),
            ));
        }
        interfaces.push(self.interface_info());
        ObjectInfo { interfaces }
    }
}

// =============================================================================
// Helpers
// =============================================================================

fn readable(attr: &AttributeDescriptor, slots: &[Slot]) -> Result<Value> {
    match slots[attr.slot].value() {
        Some(value) if value.is_well_formed() => Ok(value.clone()),
        Some(_) => Err(Error::unreadable(format!("{} holds a malformed value", attr.name))),
        None => Err(Error::unreadable(format!("{} has no value", attr.name))),
    }
}

fn coerce(attr: &AttributeDescriptor, slots: &[Slot], value: Value) -> Result<Value> {
    let signature = value.signature();
    slots[attr.slot].coerce(value).ok_or_else(|| {
        Error::invalid_argument(format!(
            "{} expects {}, got {}",
            attr.name, attr.ty, signature
        ))
    })
}

/// Resolve the key list of a batch against its value mapping.
fn batch_keys(keys: Vec<String>, values: &BTreeMap<String, Value>) -> Result<Vec<String>> {
    if keys.is_empty() {
        return Ok(values.keys().cloned().collect());
    }
    if !values.is_empty() {
        if keys.len() != values.len() {
            return Err(Error::invalid_argument(format!(
                "SetBatch got {} keys but {} values",
                keys.len(),
                values.len()
            )));
        }
        let key_set: BTreeSet<&String> = keys.iter().collect();
        if key_set.len() != keys.len() || key_set.into_iter().any(|k| !values.contains_key(k)) {
            return Err(Error::invalid_argument(
                "SetBatch keys and values name different attributes",
            ));
        }
    }
    Ok(keys)
}
