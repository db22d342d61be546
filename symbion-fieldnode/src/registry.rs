//! Live device registry shared by the acquisition scheduler (reader) and the
//! command dispatcher (writer).
//!
//! The map sits behind a single `RwLock`. Readers get owned copies, so a
//! descriptor handed to the scheduler can never change under it, and a reload
//! swaps a device's whole profile in one write section.

use crate::models::{DeviceDescriptor, DeviceProfile};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

pub type DevicesMap = HashMap<String, DeviceDescriptor>;

/// What `apply_reload` did to the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReloadEffect {
    Inserted,
    Updated,
    Unchanged,
}

#[derive(Debug, Clone, Default)]
pub struct DeviceRegistry {
    devices: Arc<RwLock<DevicesMap>>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of every descriptor currently registered.
    pub fn snapshot_devices(&self) -> Vec<DeviceDescriptor> {
        self.devices.read().values().cloned().collect()
    }

    /// Copy of a single descriptor, read under the same lock as reloads.
    pub fn get(&self, id: &str) -> Option<DeviceDescriptor> {
        self.devices.read().get(id).cloned()
    }

    pub fn len(&self) -> usize {
        self.devices.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.read().is_empty()
    }

    /// Replaces the profile of `id`, or registers it when unknown. Entries are
    /// never removed by a reload.
    pub fn apply_reload(&self, id: &str, profile: DeviceProfile) -> ReloadEffect {
        let mut devices = self.devices.write();
        match devices.get_mut(id) {
            Some(existing) if existing.profile == profile => ReloadEffect::Unchanged,
            Some(existing) => {
                debug!(
                    "[registry] {} updated (cycle {} -> {})",
                    id, existing.profile.acquisition_cycle, profile.acquisition_cycle
                );
                existing.profile = profile;
                ReloadEffect::Updated
            }
            None => {
                debug!("[registry] {} registered", id);
                devices.insert(id.to_string(), DeviceDescriptor::new(id, profile));
                ReloadEffect::Inserted
            }
        }
    }
}
