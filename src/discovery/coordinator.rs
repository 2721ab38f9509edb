//! Device inquiry and service search coordination.
//!
//! The radio is a single shared resource: one inquiry and a bounded number
//! of service searches may run at a time. The registration table below is
//! the only shared mutable state, and every read or write of it (including
//! the per-listener de-duplication set) happens under one lock. The lock is
//! re-entrant so a listener may cancel its own inquiry from inside a
//! callback.

use std::{
   cell::RefCell,
   collections::{HashMap, HashSet},
   sync::{
      Arc,
      atomic::{AtomicU32, AtomicU64, Ordering},
   },
};

use log::{debug, info, warn};
use parking_lot::ReentrantMutex;
use smol_str::{SmolStr, ToSmolStr};
use uuid::Uuid;

use crate::{
   context::RadioContext,
   discovery::{
      device::{DeviceClass, RemoteDevice},
      listener::{InquiryStatus, ListenerKey, ListenerRef, SearchId, SearchStatus},
      record::{BASELINE_ATTRIBUTES, ServiceRecord},
      sdp::{RawCodec, SdpCodec},
   },
   error::{LinkError, Result},
   radio::Address,
};

/// L2CAP protocol UUID (0x0100).
pub const L2CAP_PROTOCOL_UUID: Uuid = Uuid::from_u128(0x00000100_0000_1000_8000_00805f9b34fb);
/// RFCOMM protocol UUID (0x0003).
pub const RFCOMM_PROTOCOL_UUID: Uuid = Uuid::from_u128(0x00000003_0000_1000_8000_00805f9b34fb);

/// Picks the UUID handed to the native search: the first one that is not a
/// transport protocol UUID. The native search takes a single UUID, so any
/// further entries are dropped.
pub fn select_search_uuid(uuids: &[Uuid]) -> Option<Uuid> {
   uuids
      .iter()
      .find(|u| **u != L2CAP_PROTOCOL_UUID && **u != RFCOMM_PROTOCOL_UUID)
      .copied()
}

/// Properties of the local radio.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalDevice {
   pub address: Option<Address>,
   pub name: Option<SmolStr>,
   pub powered: bool,
   pub discoverable: bool,
}

struct InquiryRegistration {
   /// Distinguishes this inquiry from a later one by the same listener.
   token: u64,
   key: ListenerKey,
   access_code: u32,
   reported: HashSet<RemoteDevice>,
}

#[derive(Default)]
struct Registry {
   inquiry: Option<InquiryRegistration>,
   searches: HashMap<SearchId, ListenerKey>,
}

struct CoordinatorInner {
   ctx: RadioContext,
   codec: Arc<dyn SdpCodec>,
   registry: ReentrantMutex<RefCell<Registry>>,
   next_search: AtomicU32,
   next_inquiry: AtomicU64,
}

/// Drives inquiries and service searches against one radio.
///
/// This type is cheaply cloneable.
#[derive(Clone)]
pub struct DiscoveryCoordinator(Arc<CoordinatorInner>);

impl DiscoveryCoordinator {
   pub fn new(ctx: RadioContext) -> Self {
      Self::with_codec(ctx, Arc::new(RawCodec))
   }

   pub fn with_codec(ctx: RadioContext, codec: Arc<dyn SdpCodec>) -> Self {
      Self(Arc::new(CoordinatorInner {
         ctx,
         codec,
         registry: ReentrantMutex::new(RefCell::new(Registry::default())),
         next_search: AtomicU32::new(1),
         next_inquiry: AtomicU64::new(1),
      }))
   }

   // === Device Inquiry ===

   /// Starts an inquiry reporting to `listener`.
   ///
   /// Returns immediately; sightings and the final status are delivered on
   /// a worker thread.
   pub fn start_device_inquiry(&self, access_code: u32, listener: ListenerRef) -> Result<()> {
      let token = {
         let guard = self.0.registry.lock();
         let mut registry = guard.borrow_mut();
         if let Some(active) = &registry.inquiry {
            debug!(
               "Rejecting inquiry, one is already running (access code {:#08x})",
               active.access_code
            );
            return Err(LinkError::AlreadyInProgress("device inquiry"));
         }
         let token = self.0.next_inquiry.fetch_add(1, Ordering::Relaxed);
         registry.inquiry = Some(InquiryRegistration {
            token,
            key: ListenerKey::of(&listener),
            access_code,
            reported: HashSet::new(),
         });
         token
      };

      info!("Starting device inquiry (access code {access_code:#08x})");
      let this = self.clone();
      self
         .0
         .ctx
         .runtime()
         .spawn_blocking(move || this.run_inquiry(token, access_code, listener));
      Ok(())
   }

   fn run_inquiry(&self, token: u64, access_code: u32, listener: ListenerRef) {
      let stack = self.0.ctx.stack().clone();
      let result = stack.run_inquiry(access_code, &mut |sighting| {
         self.forward_sighting(
            &listener,
            |r| r.token == token,
            sighting.address,
            DeviceClass(sighting.class_bits),
            sighting.name,
         );
      });

      // Only our own registration; the listener may already have canceled
      // and started a newer inquiry.
      let still_registered = {
         let guard = self.0.registry.lock();
         let mut registry = guard.borrow_mut();
         registry.inquiry.take_if(|r| r.token == token).is_some()
      };

      let status = match result {
         Err(e) => {
            warn!("Device inquiry failed: {e}");
            InquiryStatus::Error
         },
         Ok(()) if still_registered => InquiryStatus::Completed,
         Ok(()) => InquiryStatus::Terminated,
      };
      info!("Device inquiry finished: {status}");
      listener.inquiry_completed(status);
   }

   /// Handles one sighting reported for `listener`'s inquiry.
   ///
   /// Forwards the device to the listener unless it was already reported
   /// during this inquiry or the inquiry is no longer registered. Returns
   /// whether the listener was called.
   pub fn device_discovered(
      &self,
      listener: &ListenerRef,
      address: Address,
      class: DeviceClass,
      name: Option<SmolStr>,
   ) -> bool {
      let key = ListenerKey::of(listener);
      self.forward_sighting(listener, |r| r.key == key, address, class, name)
   }

   fn forward_sighting(
      &self,
      listener: &ListenerRef,
      owns: impl Fn(&InquiryRegistration) -> bool,
      address: Address,
      class: DeviceClass,
      name: Option<SmolStr>,
   ) -> bool {
      let guard = self.0.registry.lock();
      let device = {
         let mut registry = guard.borrow_mut();
         let Some(registration) = registry.inquiry.as_mut().filter(|r| owns(r)) else {
            debug!("Dropping sighting of {address}, no inquiry registered");
            return false;
         };
         let device = RemoteDevice::new(address, name);
         if !registration.reported.insert(device.clone()) {
            return false;
         }
         device
      };

      debug!("Device discovered: {device}, class {class}");
      // Delivered under the registry lock so that a concurrent cancel cannot
      // be acknowledged while this callback is still pending.
      listener.device_discovered(&device, class);
      drop(guard);
      true
   }

   /// Cancels `listener`'s inquiry.
   ///
   /// Returns `false` if the listener has no inquiry registered, otherwise
   /// the native stack's answer to the cancellation.
   pub fn cancel_inquiry(&self, listener: &ListenerRef) -> bool {
      let key = ListenerKey::of(listener);
      let removed = {
         let guard = self.0.registry.lock();
         let mut registry = guard.borrow_mut();
         registry.inquiry.take_if(|r| r.key == key)
      };

      let Some(registration) = removed else {
         debug!("Cancel requested for a listener without an inquiry");
         return false;
      };
      info!(
         "Canceling device inquiry after {} device(s)",
         registration.reported.len()
      );
      self.0.ctx.stack().cancel_inquiry()
   }

   pub fn inquiry_active(&self) -> bool {
      self.0.registry.lock().borrow().inquiry.is_some()
   }

   // === Service Search ===

   /// Starts a service search on `device`.
   ///
   /// Every found record is populated with [`BASELINE_ATTRIBUTES`] plus
   /// `attr_filter`. Records and the final status are delivered to
   /// `listener` on a worker thread.
   pub fn search_services(
      &self,
      attr_filter: Option<&[u16]>,
      uuid_filter: &[Uuid],
      device: &RemoteDevice,
      listener: ListenerRef,
   ) -> Result<SearchId> {
      let id = {
         let guard = self.0.registry.lock();
         let mut registry = guard.borrow_mut();
         if registry.searches.len() >= self.0.ctx.config().max_service_searches {
            return Err(LinkError::AlreadyInProgress("service search"));
         }
         let id = SearchId(self.0.next_search.fetch_add(1, Ordering::Relaxed));
         registry.searches.insert(id, ListenerKey::of(&listener));
         id
      };

      let this = self.clone();
      let attrs = attr_filter.map(<[u16]>::to_vec);
      let uuids = uuid_filter.to_vec();
      let device = device.clone();
      self.0.ctx.runtime().spawn_blocking(move || {
         let status = this.run_service_search(id, attrs.as_deref(), &uuids, &device, &listener);
         {
            let guard = this.0.registry.lock();
            guard.borrow_mut().searches.remove(&id);
         }
         info!("Service search {} on {device} finished: {status}", id.0);
         listener.service_search_completed(id, status);
      });
      Ok(id)
   }

   /// Runs one service search on the calling thread and delivers any
   /// records to `listener`.
   pub fn run_service_search(
      &self,
      id: SearchId,
      attr_filter: Option<&[u16]>,
      uuid_filter: &[Uuid],
      device: &RemoteDevice,
      listener: &ListenerRef,
   ) -> SearchStatus {
      let stack = self.0.ctx.stack();
      let uuid = select_search_uuid(uuid_filter);
      debug!("Searching {device} for services (uuid {uuid:?})");

      let handles = match stack.search_services(uuid.as_ref(), device.address()) {
         Ok(handles) => handles,
         Err(e) => {
            warn!("Service search on {device} failed: {e}");
            return SearchStatus::Error;
         },
      };
      if handles.is_empty() {
         return SearchStatus::NoRecords;
      }

      let records: Vec<ServiceRecord> = handles
         .into_iter()
         .map(|handle| {
            let mut record = ServiceRecord::new(device, handle);
            self.populate_record(&mut record, &BASELINE_ATTRIBUTES);
            if let Some(attrs) = attr_filter {
               self.populate_record(&mut record, attrs);
            }
            record
         })
         .collect();

      listener.services_discovered(id, &records);
      SearchStatus::Completed
   }

   /// Fetches more attributes into an existing record.
   pub fn populate_record(&self, record: &mut ServiceRecord, attr_ids: &[u16]) -> usize {
      record.populate(self.0.ctx.stack().as_ref(), self.0.codec.as_ref(), attr_ids)
   }

   pub fn service_searches_active(&self) -> usize {
      self.0.registry.lock().borrow().searches.len()
   }

   // === Local radio ===

   /// Resolves `device`'s friendly name, asking the stack at most once per
   /// device once a name is known.
   pub fn friendly_name(&self, device: &RemoteDevice) -> Option<SmolStr> {
      if let Some(name) = device.name() {
         return Some(name.clone());
      }
      match self.0.ctx.stack().remote_name(device.address()) {
         Ok(Some(name)) => {
            device.resolve_name(name);
            device.name().cloned()
         },
         Ok(None) => None,
         Err(e) => {
            debug!("Name lookup for {} failed: {e}", device.address());
            None
         },
      }
   }

   pub fn local_device(&self) -> LocalDevice {
      let stack = self.0.ctx.stack();
      LocalDevice {
         address: stack.local_address(),
         name: stack.local_name(),
         powered: stack.is_powered(),
         discoverable: stack.is_discoverable(),
      }
   }

   /// Looks up a local radio property by name.
   pub fn local_property(&self, key: &str) -> Option<SmolStr> {
      let stack = self.0.ctx.stack();
      let config = self.0.ctx.config();
      match key {
         "bluetooth.connected.devices.max" => Some(config.max_connected_devices.to_smolstr()),
         "bluetooth.sd.trans.max" => Some(config.max_service_searches.to_smolstr()),
         "bluetooth.connected.inquiry.scan"
         | "bluetooth.connected.page.scan"
         | "bluetooth.connected.inquiry" => Some(SmolStr::new_static("true")),
         "radio.version" => stack.device_version().map(|v| v.to_smolstr()),
         "radio.manufacturer" => stack.device_manufacturer().map(|v| v.to_smolstr()),
         "stack.version" => stack.stack_version(),
         _ => None,
      }
   }
}
