//! Scripted in-memory radio stack for tests.
//!
//! Blocking calls behave like the native ones: stream reads park until data,
//! end-of-stream or `close` arrives, and a held inquiry parks until it is
//! canceled.

use std::collections::{HashMap, VecDeque};

use parking_lot::{Condvar, Mutex};
use smol_str::SmolStr;
use uuid::Uuid;

use crate::radio::{
   Address, ConnectionUrl, DeviceSighting, NativeHandle, RadioError, RadioStack, RecordHandle,
   TransportMode,
};

#[derive(Debug, Clone)]
pub enum AttrScript {
   Bytes(Vec<u8>),
   Missing,
   Fail,
}

#[derive(Debug, Default)]
pub struct MockLink {
   pub mode: Option<TransportMode>,
   pub incoming: VecDeque<Vec<u8>>,
   pub eof: bool,
   pub closed: bool,
   pub close_calls: usize,
   pub written: Vec<u8>,
   pub sent: Vec<Vec<u8>>,
   pub receive_mtu: usize,
   pub fail_writes: bool,
}

#[derive(Default)]
struct MockState {
   sightings: VecDeque<DeviceSighting>,
   hold_inquiry: bool,
   inquiry_canceled: bool,
   inquiry_fail: bool,
   cancel_calls: usize,
   gate_inquiries: bool,
   inquiries_started: usize,
   inquiries_gated: usize,
   inquiries_released: usize,

   search_results: HashMap<Address, Option<Vec<RecordHandle>>>,
   searched: Vec<Option<Uuid>>,
   attributes: HashMap<(RecordHandle, u16), AttrScript>,

   open_fail: bool,
   next_handle: u64,
   prepared: VecDeque<MockLink>,
   links: HashMap<NativeHandle, MockLink>,

   remote_names: HashMap<Address, SmolStr>,
   name_lookups: usize,
}

#[derive(Default)]
pub struct MockStack {
   state: Mutex<MockState>,
   cond: Condvar,
}

impl MockStack {
   pub fn new() -> Self {
      Self::default()
   }

   pub fn push_sighting(&self, address: Address, class_bits: u32, name: Option<&str>) {
      self.state.lock().sightings.push_back(DeviceSighting {
         address,
         class_bits,
         name: name.map(SmolStr::new),
      });
      self.cond.notify_all();
   }

   /// Keeps `run_inquiry` parked after the scripted sightings until canceled.
   pub fn hold_inquiry(&self, hold: bool) {
      self.state.lock().hold_inquiry = hold;
   }

   pub fn fail_inquiry(&self) {
      self.state.lock().inquiry_fail = true;
   }

   pub fn cancel_calls(&self) -> usize {
      self.state.lock().cancel_calls
   }

   /// Makes every `run_inquiry` wait, after its scan has ended, until
   /// [`release_inquiry`](Self::release_inquiry) lets it return. Calls are
   /// released in start order.
   pub fn gate_inquiries(&self, gate: bool) {
      self.state.lock().gate_inquiries = gate;
   }

   pub fn release_inquiry(&self) {
      self.state.lock().inquiries_released += 1;
      self.cond.notify_all();
   }

   pub fn inquiries_started(&self) -> usize {
      self.state.lock().inquiries_started
   }

   /// Inquiries whose scan ended and that now wait at the gate.
   pub fn inquiries_gated(&self) -> usize {
      self.state.lock().inquiries_gated
   }

   pub fn set_search_result(&self, address: Address, handles: Option<Vec<u64>>) {
      self.state.lock().search_results.insert(
         address,
         handles.map(|h| h.into_iter().map(RecordHandle).collect()),
      );
   }

   pub fn searched_uuids(&self) -> Vec<Option<Uuid>> {
      self.state.lock().searched.clone()
   }

   pub fn set_attribute(&self, record: u64, attr_id: u16, script: AttrScript) {
      self
         .state
         .lock()
         .attributes
         .insert((RecordHandle(record), attr_id), script);
   }

   pub fn set_remote_name(&self, address: Address, name: &str) {
      self
         .state
         .lock()
         .remote_names
         .insert(address, SmolStr::new(name));
   }

   pub fn name_lookups(&self) -> usize {
      self.state.lock().name_lookups
   }

   pub fn fail_open(&self) {
      self.state.lock().open_fail = true;
   }

   /// Scripts the next opened link.
   pub fn prepare_link(&self, link: MockLink) {
      self.state.lock().prepared.push_back(link);
   }

   pub fn push_incoming(&self, handle: NativeHandle, data: &[u8]) {
      if let Some(link) = self.state.lock().links.get_mut(&handle) {
         link.incoming.push_back(data.to_vec());
      }
      self.cond.notify_all();
   }

   pub fn finish(&self, handle: NativeHandle) {
      if let Some(link) = self.state.lock().links.get_mut(&handle) {
         link.eof = true;
      }
      self.cond.notify_all();
   }

   pub fn last_handle(&self) -> NativeHandle {
      NativeHandle(self.state.lock().next_handle)
   }

   pub fn with_link<R>(&self, handle: NativeHandle, f: impl FnOnce(&MockLink) -> R) -> Option<R> {
      self.state.lock().links.get(&handle).map(f)
   }
}

impl RadioStack for MockStack {
   fn run_inquiry(
      &self,
      _access_code: u32,
      on_device: &mut dyn FnMut(DeviceSighting),
   ) -> Result<(), RadioError> {
      let mut state = self.state.lock();
      state.inquiries_started += 1;
      let call = state.inquiries_started;
      loop {
         if state.inquiry_canceled {
            state.inquiry_canceled = false;
            break;
         }
         if let Some(sighting) = state.sightings.pop_front() {
            drop(state);
            on_device(sighting);
            state = self.state.lock();
            continue;
         }
         if !state.hold_inquiry {
            break;
         }
         self.cond.wait(&mut state);
      }
      if state.gate_inquiries {
         state.inquiries_gated += 1;
         while state.inquiries_released < call {
            self.cond.wait(&mut state);
         }
      }
      if state.inquiry_fail {
         return Err(RadioError::Native {
            code: -1,
            message: SmolStr::new_static("inquiry failed"),
         });
      }
      Ok(())
   }

   fn cancel_inquiry(&self) -> bool {
      let mut state = self.state.lock();
      state.cancel_calls += 1;
      state.inquiry_canceled = true;
      self.cond.notify_all();
      true
   }

   fn search_services(
      &self,
      uuid: Option<&Uuid>,
      address: Address,
   ) -> Result<Vec<RecordHandle>, RadioError> {
      let mut state = self.state.lock();
      state.searched.push(uuid.copied());
      match state.search_results.get(&address) {
         Some(Some(handles)) => Ok(handles.clone()),
         Some(None) => Err(RadioError::Native {
            code: -2,
            message: SmolStr::new_static("search failed"),
         }),
         None => Ok(Vec::new()),
      }
   }

   fn service_attribute(
      &self,
      attr_id: u16,
      record: RecordHandle,
   ) -> Result<Option<Vec<u8>>, RadioError> {
      match self.state.lock().attributes.get(&(record, attr_id)) {
         Some(AttrScript::Bytes(bytes)) => Ok(Some(bytes.clone())),
         Some(AttrScript::Fail) => Err(RadioError::Timeout),
         Some(AttrScript::Missing) | None => Ok(None),
      }
   }

   fn open(&self, url: &ConnectionUrl) -> Result<NativeHandle, RadioError> {
      let mut state = self.state.lock();
      if state.open_fail {
         return Err(RadioError::Native {
            code: -3,
            message: SmolStr::new_static("host down"),
         });
      }
      state.next_handle += 1;
      let handle = NativeHandle(state.next_handle);
      let mut link = state.prepared.pop_front().unwrap_or_default();
      link.mode = Some(url.mode());
      if link.receive_mtu == 0 {
         link.receive_mtu = url.receive_mtu().ok().flatten().unwrap_or(672);
      }
      state.links.insert(handle, link);
      Ok(handle)
   }

   fn read_byte(&self, handle: NativeHandle) -> Result<Option<u8>, RadioError> {
      let mut state = self.state.lock();
      loop {
         let link = state.links.get_mut(&handle).ok_or(RadioError::Closed)?;
         if link.closed {
            return Err(RadioError::Closed);
         }
         if let Some(chunk) = link.incoming.front_mut() {
            let byte = chunk.remove(0);
            if chunk.is_empty() {
               link.incoming.pop_front();
            }
            return Ok(Some(byte));
         }
         if link.eof {
            return Ok(None);
         }
         self.cond.wait(&mut state);
      }
   }

   fn write(&self, handle: NativeHandle, data: &[u8]) -> Result<(), RadioError> {
      let mut state = self.state.lock();
      let link = state.links.get_mut(&handle).ok_or(RadioError::Closed)?;
      if link.closed {
         return Err(RadioError::Closed);
      }
      if link.fail_writes {
         return Err(RadioError::Io(std::io::ErrorKind::BrokenPipe.into()));
      }
      link.written.extend_from_slice(data);
      Ok(())
   }

   fn packet_ready(&self, handle: NativeHandle) -> Result<bool, RadioError> {
      let state = self.state.lock();
      let link = state.links.get(&handle).ok_or(RadioError::Closed)?;
      if link.closed {
         return Err(RadioError::Closed);
      }
      Ok(!link.incoming.is_empty())
   }

   fn receive_mtu(&self, handle: NativeHandle) -> Result<usize, RadioError> {
      let state = self.state.lock();
      let link = state.links.get(&handle).ok_or(RadioError::Closed)?;
      Ok(link.receive_mtu)
   }

   fn transmit_mtu(&self, handle: NativeHandle) -> Result<usize, RadioError> {
      self.receive_mtu(handle)
   }

   fn receive(&self, handle: NativeHandle, buf: &mut [u8]) -> Result<usize, RadioError> {
      let mut state = self.state.lock();
      loop {
         let link = state.links.get_mut(&handle).ok_or(RadioError::Closed)?;
         if link.closed {
            return Err(RadioError::Closed);
         }
         if let Some(packet) = link.incoming.pop_front() {
            let n = packet.len().min(buf.len());
            buf[..n].copy_from_slice(&packet[..n]);
            return Ok(n);
         }
         self.cond.wait(&mut state);
      }
   }

   fn send_packet(&self, handle: NativeHandle, data: &[u8]) -> Result<(), RadioError> {
      let mut state = self.state.lock();
      let link = state.links.get_mut(&handle).ok_or(RadioError::Closed)?;
      if link.closed {
         return Err(RadioError::Closed);
      }
      if link.fail_writes {
         return Err(RadioError::Io(std::io::ErrorKind::BrokenPipe.into()));
      }
      link.sent.push(data.to_vec());
      Ok(())
   }

   fn close(&self, handle: NativeHandle) -> Result<(), RadioError> {
      let mut state = self.state.lock();
      let link = state.links.get_mut(&handle).ok_or(RadioError::Closed)?;
      link.close_calls += 1;
      let already = link.closed;
      link.closed = true;
      self.cond.notify_all();
      if already {
         Err(RadioError::Closed)
      } else {
         Ok(())
      }
   }

   fn local_address(&self) -> Option<Address> {
      Some(Address([0x00, 0x02, 0x72, 0x11, 0x22, 0x33]))
   }

   fn local_name(&self) -> Option<SmolStr> {
      Some(SmolStr::new_static("mock-radio"))
   }

   fn device_version(&self) -> Option<u32> {
      Some(4)
   }

   fn stack_version(&self) -> Option<SmolStr> {
      Some(SmolStr::new_static("mock 1.0"))
   }

   fn remote_name(&self, address: Address) -> Result<Option<SmolStr>, RadioError> {
      let mut state = self.state.lock();
      state.name_lookups += 1;
      Ok(state.remote_names.get(&address).cloned())
   }
}
