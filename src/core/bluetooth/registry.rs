//! Device registry for a single scan session

use indexmap::IndexMap;

use crate::core::bluetooth::device::Device;

/// Deduplicated devices in discovery order.
///
/// Uses [`IndexMap`] so iteration keeps first-seen order while lookups stay
/// keyed by address. A repeat sighting never replaces the stored entry.
#[derive(Debug, Default)]
pub struct DeviceRegistry {
    devices: IndexMap<String, Device>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a device if its address is unseen. Returns true when inserted.
    pub fn insert(&mut self, device: Device) -> bool {
        if self.devices.contains_key(&device.address) {
            return false;
        }
        self.devices.insert(device.address.clone(), device);
        true
    }

    pub fn get(&self, address: &str) -> Option<&Device> {
        self.devices.get(address)
    }

    pub fn contains(&self, address: &str) -> bool {
        self.devices.contains_key(address)
    }

    pub fn clear(&mut self) {
        self.devices.clear();
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Device> {
        self.devices.values()
    }

    pub fn to_vec(&self) -> Vec<Device> {
        self.devices.values().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::bluetooth::device::DeviceHandle;

    fn device(address: &str, name: &str) -> Device {
        Device::new(address.into(), Some(name.into()), DeviceHandle::new(address), "Unknown Device")
    }

    #[test]
    fn test_duplicate_keeps_first_seen() {
        let mut registry = DeviceRegistry::new();
        assert!(registry.insert(device("AA:BB:CC:DD:EE:01", "first")));
        assert!(registry.insert(device("AA:BB:CC:DD:EE:02", "second")));
        assert!(!registry.insert(device("AA:BB:CC:DD:EE:01", "renamed")));

        assert_eq!(registry.len(), 2);
        assert_eq!(registry.get("AA:BB:CC:DD:EE:01").unwrap().name, "first");
        let order: Vec<_> = registry.iter().map(|d| d.address.as_str()).collect();
        assert_eq!(order, ["AA:BB:CC:DD:EE:01", "AA:BB:CC:DD:EE:02"]);
    }

    #[test]
    fn test_clear() {
        let mut registry = DeviceRegistry::new();
        registry.insert(device("AA:BB:CC:DD:EE:01", "lamp"));
        registry.clear();
        assert!(registry.is_empty());
        assert!(!registry.contains("AA:BB:CC:DD:EE:01"));
    }
}
