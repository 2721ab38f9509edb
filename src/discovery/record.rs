//! Service records returned by a service search.

use std::collections::BTreeMap;

use log::debug;
use serde_json::json;

use crate::{
   discovery::{
      device::{RemoteDevice, WeakRemoteDevice},
      sdp::{DataElement, SdpCodec},
   },
   radio::{Address, RadioStack, RecordHandle},
};

/// Attributes every record is populated with after a search:
/// record handle, class-id list, record state, service id, protocol
/// descriptor list.
pub const BASELINE_ATTRIBUTES: [u16; 5] = [0x0000, 0x0001, 0x0002, 0x0003, 0x0004];

/// One service advertised by a remote device.
#[derive(Debug, Clone)]
pub struct ServiceRecord {
   device: WeakRemoteDevice,
   host: Address,
   handle: RecordHandle,
   attributes: BTreeMap<u16, DataElement>,
}

impl ServiceRecord {
   pub fn new(device: &RemoteDevice, handle: RecordHandle) -> Self {
      Self {
         device: WeakRemoteDevice::new(device),
         host: device.address(),
         handle,
         attributes: BTreeMap::new(),
      }
   }

   /// The owning device, if it is still alive.
   pub fn host_device(&self) -> Option<RemoteDevice> {
      self.device.upgrade()
   }

   pub const fn host_address(&self) -> Address {
      self.host
   }

   pub const fn handle(&self) -> RecordHandle {
      self.handle
   }

   pub fn attribute(&self, attr_id: u16) -> Option<&DataElement> {
      self.attributes.get(&attr_id)
   }

   pub fn attribute_ids(&self) -> impl Iterator<Item = u16> + '_ {
      self.attributes.keys().copied()
   }

   /// Fetches and decodes `attr_ids` one by one.
   ///
   /// Attributes that are missing, fail to fetch or fail to decode are
   /// skipped; the record keeps whatever did decode. Returns the number of
   /// attributes stored by this call.
   pub fn populate(
      &mut self,
      stack: &dyn RadioStack,
      codec: &dyn SdpCodec,
      attr_ids: &[u16],
   ) -> usize {
      let mut stored = 0;
      for &attr_id in attr_ids {
         let raw = match stack.service_attribute(attr_id, self.handle) {
            Ok(Some(raw)) => raw,
            Ok(None) => continue,
            Err(e) => {
               debug!("Fetching attribute {attr_id:#06x} of {:?} failed: {e}", self.handle);
               continue;
            },
         };
         match codec.decode(attr_id, &raw) {
            Ok(element) => {
               self.attributes.insert(attr_id, element);
               stored += 1;
            },
            Err(e) => {
               debug!(
                  "Decoding attribute {attr_id:#06x} of {:?} failed: {e} ({})",
                  self.handle,
                  hex::encode(&raw)
               );
            },
         }
      }
      stored
   }

   pub fn to_json(&self) -> serde_json::Value {
      let attributes: BTreeMap<String, String> = self
         .attributes
         .iter()
         .map(|(id, el)| (format!("{id:#06x}"), hex::encode(el.as_bytes())))
         .collect();
      json!({
         "host": self.host.to_string(),
         "handle": self.handle.0,
         "attributes": attributes,
      })
   }
}
