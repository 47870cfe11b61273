//! Change hooks and staged slot writes.

use crate::schema::{NotifyMode, Schema, Slot};
use crate::types::{Error, Result};
use crate::value::Value;
use std::collections::BTreeMap;

/// Owner capability to intercept remote writes.
///
/// When a registry's owner implements this, every validated Set/SetBatch is
/// handed to [`ChangeHook::change`] instead of being assigned directly. The
/// hook decides what is actually written by staging values on the
/// [`SlotWriter`]; returning an error vetoes the whole write and nothing staged
/// is applied.
///
/// Hooks run while the registry lock is held and must not call back into the
/// same registry.
pub trait ChangeHook: Send + Sync {
    fn change(
        &self,
        keys: &[String],
        values: &BTreeMap<String, Value>,
        writer: &mut SlotWriter<'_>,
    ) -> Result<()>;
}

/// Staged view over a registry's slots.
///
/// Writes are type-checked against the slot and held back until the closure
/// or hook that received the writer succeeds; then they are applied together.
/// Const attributes cannot be written.
#[derive(Debug)]
pub struct SlotWriter<'a> {
    schema: &'a Schema,
    slots: &'a [Slot],
    staged: BTreeMap<usize, (String, Value)>,
}

impl<'a> SlotWriter<'a> {
    pub(crate) fn new(schema: &'a Schema, slots: &'a [Slot]) -> Self {
        Self {
            schema,
            slots,
            staged: BTreeMap::new(),
        }
    }

    /// Current value of `name`, including anything staged on this writer.
    pub fn get(&self, name: &str) -> Option<&Value> {
        let attr = self.schema.get(name)?;
        match self.staged.get(&attr.slot) {
            Some((_, value)) => Some(value),
            None => self.slots[attr.slot].value(),
        }
    }

    /// Stage `value` for `name`.
    pub fn set(&mut self, name: &str, value: impl Into<Value>) -> Result<()> {
        let attr = self
            .schema
            .get(name)
            .ok_or_else(|| Error::not_found(name.to_string()))?;
        if attr.notify == NotifyMode::Const {
            return Err(Error::read_only(format!("{} is const", name)));
        }
        let value = value.into();
        let signature = value.signature();
        let value = self.slots[attr.slot].coerce(value).ok_or_else(|| {
            Error::invalid_argument(format!(
                "{} expects {}, got {}",
                name, attr.ty, signature
            ))
        })?;
        self.staged.insert(attr.slot, (name.to_string(), value));
        Ok(())
    }

    /// Names staged so far, in slot order.
    pub fn staged(&self) -> Vec<&str> {
        self.staged.values().map(|(name, _)| name.as_str()).collect()
    }

    pub(crate) fn stage_unchecked(&mut self, slot: usize, name: &str, value: Value) {
        self.staged.insert(slot, (name.to_string(), value));
    }

    pub(crate) fn into_staged(self) -> BTreeMap<usize, (String, Value)> {
        self.staged
    }
}

/// Apply staged writes, returning the names written.
pub(crate) fn commit(slots: &mut [Slot], staged: BTreeMap<usize, (String, Value)>) -> Vec<String> {
    staged
        .into_iter()
        .map(|(slot, (name, value))| {
            slots[slot].store(value);
            name
        })
        .collect()
}
