//! Remote device identity as seen by discovery.

use core::fmt;
use std::{
   hash::{Hash, Hasher},
   sync::{Arc, OnceLock, Weak},
};

use serde_json::json;
use smol_str::SmolStr;

use crate::radio::Address;

/// Class-of-device bitmask reported with a sighting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct DeviceClass(pub u32);

impl DeviceClass {
   pub const fn major_device_class(&self) -> u32 {
      self.0 & 0x1F00
   }

   pub const fn minor_device_class(&self) -> u32 {
      self.0 & 0xFC
   }

   pub const fn service_classes(&self) -> u32 {
      self.0 & 0xFF_E000
   }
}

impl fmt::Display for DeviceClass {
   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
      write!(f, "{:#08x}", self.0)
   }
}

#[derive(Debug)]
struct RemoteDeviceInner {
   address: Address,
   /// Set once, either from the sighting or by lazy resolution.
   name: OnceLock<SmolStr>,
}

/// A device found by inquiry.
///
/// Equality and hashing use the address only. This type is cheaply
/// cloneable.
#[derive(Clone)]
pub struct RemoteDevice(Arc<RemoteDeviceInner>);

/// Non-owning reference to a [`RemoteDevice`].
#[derive(Debug, Clone)]
pub struct WeakRemoteDevice(Weak<RemoteDeviceInner>);

impl WeakRemoteDevice {
   pub fn new(device: &RemoteDevice) -> Self {
      Self(Arc::downgrade(&device.0))
   }

   pub fn upgrade(&self) -> Option<RemoteDevice> {
      self.0.upgrade().map(RemoteDevice)
   }
}

impl RemoteDevice {
   pub fn new(address: Address, name: Option<SmolStr>) -> Self {
      let cell = OnceLock::new();
      if let Some(name) = name {
         let _ = cell.set(name);
      }
      Self(Arc::new(RemoteDeviceInner {
         address,
         name: cell,
      }))
   }

   pub fn address(&self) -> Address {
      self.0.address
   }

   /// Friendly name, if known yet.
   pub fn name(&self) -> Option<&SmolStr> {
      self.0.name.get()
   }

   /// Records a resolved name. Returns `false` if one was already known.
   pub(crate) fn resolve_name(&self, name: SmolStr) -> bool {
      self.0.name.set(name).is_ok()
   }

   pub fn to_json(&self) -> serde_json::Value {
      json!({
         "address": self.address().to_string(),
         "name": self.name().map(SmolStr::as_str),
      })
   }
}

impl PartialEq for RemoteDevice {
   fn eq(&self, other: &Self) -> bool {
      self.0.address == other.0.address
   }
}

impl Eq for RemoteDevice {}

impl Hash for RemoteDevice {
   fn hash<H: Hasher>(&self, state: &mut H) {
      self.0.address.hash(state);
   }
}

impl fmt::Debug for RemoteDevice {
   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
      fmt::Debug::fmt(&self.0, f)
   }
}

impl fmt::Display for RemoteDevice {
   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
      match self.name() {
         Some(name) => write!(f, "{name} ({})", self.address()),
         None => fmt::Display::fmt(&self.address(), f),
      }
   }
}

#[cfg(test)]
mod tests {
   use super::*;

   const ADDR: Address = Address([0x00, 0x1A, 0x7D, 0xDA, 0x71, 0x13]);

   #[test]
   fn test_equality_by_address_only() {
      let a = RemoteDevice::new(ADDR, Some(SmolStr::new("phone")));
      let b = RemoteDevice::new(ADDR, None);
      let c = RemoteDevice::new(Address([1; 6]), Some(SmolStr::new("phone")));
      assert_eq!(a, b);
      assert_ne!(a, c);

      let set: std::collections::HashSet<_> = [a, b, c].into_iter().collect();
      assert_eq!(set.len(), 2);
   }

   #[test]
   fn test_name_is_set_once() {
      let dev = RemoteDevice::new(ADDR, None);
      assert!(dev.name().is_none());
      assert!(dev.resolve_name(SmolStr::new("headset")));
      assert!(!dev.resolve_name(SmolStr::new("other")));
      assert_eq!(dev.name().map(SmolStr::as_str), Some("headset"));
   }

   #[test]
   fn test_weak_reference_does_not_own() {
      let dev = RemoteDevice::new(ADDR, None);
      let weak = WeakRemoteDevice::new(&dev);
      assert_eq!(weak.upgrade(), Some(dev.clone()));
      drop(dev);
      assert!(weak.upgrade().is_none());
   }

   #[test]
   fn test_json_view() {
      let dev = RemoteDevice::new(ADDR, None);
      assert_eq!(
         dev.to_json(),
         json!({ "address": "00:1A:7D:DA:71:13", "name": null })
      );
      dev.resolve_name(SmolStr::new("headset"));
      assert_eq!(dev.to_json()["name"], "headset");
   }

   #[test]
   fn test_device_class_fields() {
      // Phone, smartphone, with networking + object transfer service bits.
      let cod = DeviceClass(0x5A020C);
      assert_eq!(cod.major_device_class(), 0x0200);
      assert_eq!(cod.minor_device_class(), 0x0C);
      assert_eq!(cod.service_classes(), 0x5A0000);
   }
}
