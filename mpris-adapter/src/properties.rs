//! Property descriptor tables.
//!
//! Each MPRIS interface is described by an immutable table built once at
//! startup: property name to getter, plus an optional setter. Getters close
//! over whatever state they need and produce a fresh `OwnedValue` per call,
//! so constants and computed values read identically from the outside.

use std::collections::HashMap;

use tracing::debug;
use zbus::zvariant::{OwnedValue, Value};

use crate::error::{AdapterError, Result};

type GetterFn = Box<dyn Fn() -> Result<OwnedValue> + Send + Sync>;
type SetterFn = Box<dyn Fn(&Value<'_>) + Send + Sync>;

/// How a property's value is produced.
pub enum PropertyGetter {
    /// Fixed at table construction
    Constant(GetterFn),
    /// Derived from adapter state on every read
    Computed(GetterFn),
}

impl PropertyGetter {
    /// A getter that always yields `value`.
    pub fn constant<T>(value: T) -> Self
    where
        T: Clone + Into<Value<'static>> + Send + Sync + 'static,
    {
        PropertyGetter::Constant(Box::new(move || {
            value.clone().into().try_to_owned().map_err(AdapterError::from)
        }))
    }

    /// A getter evaluated on every read.
    pub fn computed<F>(f: F) -> Self
    where
        F: Fn() -> Result<OwnedValue> + Send + Sync + 'static,
    {
        PropertyGetter::Computed(Box::new(f))
    }

    fn evaluate(&self) -> Result<OwnedValue> {
        match self {
            PropertyGetter::Constant(f) | PropertyGetter::Computed(f) => f(),
        }
    }
}

/// One property: how to read it, and optionally how to accept writes.
pub struct PropertyDescriptor {
    getter: PropertyGetter,
    setter: Option<SetterFn>,
}

impl PropertyDescriptor {
    pub fn read_only(getter: PropertyGetter) -> Self {
        Self {
            getter,
            setter: None,
        }
    }

    pub fn writable<F>(getter: PropertyGetter, setter: F) -> Self
    where
        F: Fn(&Value<'_>) + Send + Sync + 'static,
    {
        Self {
            getter,
            setter: Some(Box::new(setter)),
        }
    }

    pub fn get(&self) -> Result<OwnedValue> {
        self.getter.evaluate()
    }

    /// Apply a write. Returns whether a setter ran.
    pub fn set(&self, value: &Value<'_>) -> bool {
        match &self.setter {
            Some(setter) => {
                setter(value);
                true
            }
            None => false,
        }
    }
}

/// All properties of one D-Bus interface.
pub struct PropertyTable {
    interface: &'static str,
    entries: Vec<(&'static str, PropertyDescriptor)>,
}

impl PropertyTable {
    pub fn new(interface: &'static str) -> Self {
        Self {
            interface,
            entries: Vec::new(),
        }
    }

    pub fn with(mut self, name: &'static str, descriptor: PropertyDescriptor) -> Self {
        debug_assert!(self.entries.iter().all(|(n, _)| *n != name));
        self.entries.push((name, descriptor));
        self
    }

    pub fn interface(&self) -> &'static str {
        self.interface
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.entries.iter().map(|(name, _)| *name)
    }

    fn descriptor(&self, property: &str) -> Result<&PropertyDescriptor> {
        self.entries
            .iter()
            .find(|(name, _)| *name == property)
            .map(|(_, descriptor)| descriptor)
            .ok_or_else(|| AdapterError::UnknownProperty {
                interface: self.interface.to_string(),
                property: property.to_string(),
            })
    }

    pub fn get(&self, property: &str) -> Result<OwnedValue> {
        self.descriptor(property)?.get()
    }

    /// Evaluate every property eagerly.
    pub fn get_all(&self) -> Result<HashMap<String, OwnedValue>> {
        self.entries
            .iter()
            .map(|(name, descriptor)| Ok((name.to_string(), descriptor.get()?)))
            .collect()
    }

    /// Write a property.
    ///
    /// Unknown names are errors; a known property without a setter is a
    /// silent no-op (`Ok(None)`). When a setter ran, the property name comes
    /// back so the caller can re-announce it.
    pub fn set(&self, property: &str, value: &Value<'_>) -> Result<Option<&'static str>> {
        let (name, descriptor) = self
            .entries
            .iter()
            .find(|(name, _)| *name == property)
            .ok_or_else(|| AdapterError::UnknownProperty {
                interface: self.interface.to_string(),
                property: property.to_string(),
            })?;

        if descriptor.set(value) {
            Ok(Some(name))
        } else {
            debug!(interface = self.interface, property, "ignoring write to read-only property");
            Ok(None)
        }
    }
}
