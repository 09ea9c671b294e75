//! Caller-owned data attached to graph entities
//!
//! Entities carry no opaque pointer slot. Applications that want to hang
//! their own state off a device, channel or buffer keep a [`UserData`] table
//! next to the context and key it by [`EntityKey`].

use crate::buffer::Buffer;
use crate::graph::{Channel, Device};
use crate::types::ChannelKey;
use std::collections::HashMap;

/// Stable identity of a graph entity
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EntityKey {
    Device(String),
    Channel(ChannelKey),
    Buffer(u64),
}

impl From<&Device> for EntityKey {
    fn from(dev: &Device) -> Self {
        EntityKey::Device(dev.id().to_string())
    }
}

impl From<&Channel> for EntityKey {
    fn from(chn: &Channel) -> Self {
        EntityKey::Channel(chn.key().clone())
    }
}

impl From<&Buffer> for EntityKey {
    fn from(buf: &Buffer) -> Self {
        EntityKey::Buffer(buf.id())
    }
}

/// Side table of per-entity values
#[derive(Debug, Clone)]
pub struct UserData<T> {
    values: HashMap<EntityKey, T>,
}

impl<T> Default for UserData<T> {
    fn default() -> Self {
        Self {
            values: HashMap::new(),
        }
    }
}

impl<T> UserData<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a value, returning the one it replaces
    pub fn set(&mut self, key: impl Into<EntityKey>, value: T) -> Option<T> {
        self.values.insert(key.into(), value)
    }

    pub fn get(&self, key: impl Into<EntityKey>) -> Option<&T> {
        self.values.get(&key.into())
    }

    pub fn get_mut(&mut self, key: impl Into<EntityKey>) -> Option<&mut T> {
        self.values.get_mut(&key.into())
    }

    pub fn remove(&mut self, key: impl Into<EntityKey>) -> Option<T> {
        self.values.remove(&key.into())
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn clear(&mut self) {
        self.values.clear();
    }
}
