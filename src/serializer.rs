//! Serializer registry: the fallback path for field types SQLite cannot bind
//! natively.
//!
//! A registry is filled once, before it is shared. [`SerializerRegistry::register`]
//! takes `&mut self`, so registration is not possible once the registry sits
//! behind an `Arc` and concurrent registration is not supported.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use crate::error::{Error, Result};
use crate::types::CustomType;
use crate::value::{CustomValue, FieldValue, Value};

/// Stored form of a serialized value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    Text(String),
    Bytes(Vec<u8>),
}

impl From<Payload> for Value {
    fn from(payload: Payload) -> Self {
        match payload {
            Payload::Text(text) => Value::Text(text),
            Payload::Bytes(bytes) => Value::Blob(bytes),
        }
    }
}

/// Converts values of one concrete type to and from a [`Payload`].
///
/// `Target` is the registry key: at most one serializer per type.
pub trait Serializer: Send + Sync + 'static {
    type Target: Any + Send + Sync;

    fn serialize(&self, value: &Self::Target) -> anyhow::Result<Payload>;

    fn deserialize(&self, payload: Payload) -> anyhow::Result<Self::Target>;
}

/// Type-erased view of a registered [`Serializer`].
pub trait DynSerializer: Send + Sync {
    fn type_info(&self) -> CustomType;

    fn serialize(&self, value: &CustomValue) -> Result<Payload>;

    fn deserialize(&self, payload: Payload) -> Result<FieldValue>;
}

struct Erased<S>(S);

impl<S: Serializer> DynSerializer for Erased<S> {
    fn type_info(&self) -> CustomType {
        CustomType::of::<S::Target>()
    }

    fn serialize(&self, value: &CustomValue) -> Result<Payload> {
        let type_name = self.type_info().name();
        let value = value
            .downcast_ref::<S::Target>()
            .ok_or(Error::UnsupportedType {
                type_name: value.type_info().name(),
            })?;
        self.0
            .serialize(value)
            .map_err(|source| Error::Serialization { type_name, source })
    }

    fn deserialize(&self, payload: Payload) -> Result<FieldValue> {
        let type_name = self.type_info().name();
        self.0
            .deserialize(payload)
            .map(FieldValue::custom)
            .map_err(|source| Error::Serialization { type_name, source })
    }
}

/// Boxes a serializer for [`SerializerRegistry::register_all`].
pub fn erase<S: Serializer>(serializer: S) -> Box<dyn DynSerializer> {
    Box::new(Erased(serializer))
}

#[derive(Default)]
pub struct SerializerRegistry {
    serializers: HashMap<TypeId, Box<dyn DynSerializer>>,
}

impl SerializerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `serializer` for its target type.
    ///
    /// Fails with [`Error::DuplicateSerializer`] if that type already has one.
    pub fn register<S: Serializer>(&mut self, serializer: S) -> Result<()> {
        self.register_dyn(erase(serializer))
    }

    pub fn register_dyn(&mut self, serializer: Box<dyn DynSerializer>) -> Result<()> {
        let type_info = serializer.type_info();
        if self.serializers.contains_key(&type_info.id()) {
            return Err(Error::DuplicateSerializer {
                type_name: type_info.name(),
            });
        }
        debug!(type_name = type_info.name(), "registered serializer");
        self.serializers.insert(type_info.id(), serializer);
        Ok(())
    }

    /// Registers each serializer in turn, stopping at the first failure.
    pub fn register_all<I>(&mut self, serializers: I) -> Result<()>
    where
        I: IntoIterator<Item = Box<dyn DynSerializer>>,
    {
        serializers
            .into_iter()
            .try_for_each(|serializer| self.register_dyn(serializer))
    }

    pub fn lookup(&self, type_info: &CustomType) -> Option<&dyn DynSerializer> {
        self.serializers.get(&type_info.id()).map(Box::as_ref)
    }

    pub fn lookup_type<T: 'static>(&self) -> Option<&dyn DynSerializer> {
        self.lookup(&CustomType::of::<T>())
    }

    pub fn contains<T: 'static>(&self) -> bool {
        self.serializers.contains_key(&TypeId::of::<T>())
    }

    pub fn len(&self) -> usize {
        self.serializers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.serializers.is_empty()
    }

    /// Serializes `value` with the serializer registered for its runtime type.
    pub fn serialize(&self, value: &CustomValue) -> Result<Payload> {
        let type_info = value.type_info();
        self.lookup(&type_info)
            .ok_or(Error::UnsupportedType {
                type_name: type_info.name(),
            })?
            .serialize(value)
    }

    /// Rebuilds a value of `type_info` from its stored payload.
    pub fn deserialize(&self, type_info: &CustomType, payload: Payload) -> Result<FieldValue> {
        self.lookup(type_info)
            .ok_or(Error::UnsupportedType {
                type_name: type_info.name(),
            })?
            .deserialize(payload)
    }
}

impl fmt::Debug for SerializerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&str> = self
            .serializers
            .values()
            .map(|serializer| serializer.type_info().name())
            .collect();
        names.sort_unstable();
        f.debug_struct("SerializerRegistry")
            .field("types", &names)
            .finish()
    }
}

/// Stores any serde type as JSON text.
pub struct JsonSerializer<T> {
    _marker: PhantomData<fn() -> T>,
}

impl<T> JsonSerializer<T> {
    pub fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<T> Default for JsonSerializer<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Serializer for JsonSerializer<T>
where
    T: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    type Target = T;

    fn serialize(&self, value: &T) -> anyhow::Result<Payload> {
        Ok(Payload::Text(serde_json::to_string(value)?))
    }

    fn deserialize(&self, payload: Payload) -> anyhow::Result<T> {
        let value = match payload {
            Payload::Text(text) => serde_json::from_str(&text)?,
            Payload::Bytes(bytes) => serde_json::from_slice(&bytes)?,
        };
        Ok(value)
    }
}
