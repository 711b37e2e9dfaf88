//! Name-keyed set of live devices. Prevents two sessions from
//! registering the same device name concurrently (spec.md §3 invariant,
//! §4.6).
//!
//! Grounded almost verbatim in shape on
//! `rvoip-registrar-core/src/registrar/location.rs`'s `DashMap`-backed
//! `LocationService` (entry-API insert, idempotent remove, snapshot
//! via iteration).

use std::sync::Arc;

use dashmap::DashMap;

use crate::device::Device;

#[derive(Debug, PartialEq, Eq)]
pub enum AddOutcome {
    Added,
    AlreadyRegistered,
}

/// Thread-safe registry of bound devices, keyed by device name.
#[derive(Default)]
pub struct DeviceRegistry {
    devices: DashMap<String, Arc<Device>>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self { devices: DashMap::new() }
    }

    /// Insert `device` if no device of the same name is present.
    pub fn add(&self, device: Arc<Device>) -> AddOutcome {
        match self.devices.entry(device.name.clone()) {
            dashmap::mapref::entry::Entry::Occupied(_) => AddOutcome::AlreadyRegistered,
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(device);
                AddOutcome::Added
            }
        }
    }

    /// Remove a device by name. Idempotent: removing an absent name is
    /// not an error.
    pub fn remove(&self, name: &str) {
        self.devices.remove(name);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.devices.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<Arc<Device>> {
        self.devices.get(name).map(|e| e.value().clone())
    }

    /// Stable point-in-time copy of every registered device, for CLI
    /// inspection (spec.md §6.7). No ordering guarantee.
    pub fn snapshot(&self) -> Vec<Arc<Device>> {
        self.devices.iter().map(|e| e.value().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DeviceConfig, LineConfig};
    use crate::device::RegistrationState;

    fn device(name: &str) -> Arc<Device> {
        Arc::new(Device::new(
            DeviceConfig {
                name: name.to_string(),
                dateformat: "D.M.Y".into(),
                voicemail: "100".into(),
                keepalive: 30,
                authtimeout: 5,
                line: LineConfig { name: "100".into(), cid_name: "A".into(), cid_num: "100".into(), context: "default".into(), language: "en".into() },
                speeddials: vec![],
                codec_preference: vec![4],
            },
            11,
        ))
    }

    #[test]
    fn add_then_duplicate_is_rejected() {
        let registry = DeviceRegistry::new();
        assert_eq!(registry.add(device("SEPA")), AddOutcome::Added);
        assert_eq!(registry.add(device("SEPA")), AddOutcome::AlreadyRegistered);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn remove_is_idempotent() {
        let registry = DeviceRegistry::new();
        registry.remove("does-not-exist");
        assert!(registry.is_empty());
    }

    #[test]
    fn registered_invariant_matches_registry_membership() {
        let registry = DeviceRegistry::new();
        let d = device("SEPB");
        assert!(!registry.contains(&d.name));
        registry.add(d.clone());
        assert!(registry.contains(&d.name));
        assert_eq!(d.state(), RegistrationState::New);
        registry.remove(&d.name);
        assert!(!registry.contains(&d.name));
    }
}
