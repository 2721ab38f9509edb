//! Ownership of one open native connection.

use std::sync::{
   Arc,
   atomic::{AtomicBool, Ordering},
};

use log::debug;

use crate::radio::{NativeHandle, RadioError, RadioStack, TransportMode};

/// An open native connection tagged with its transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Link {
   Stream {
      handle: NativeHandle,
   },
   Packet {
      handle: NativeHandle,
      receive_mtu: usize,
      transmit_mtu: usize,
   },
}

impl Link {
   pub const fn handle(&self) -> NativeHandle {
      match *self {
         Self::Stream { handle } | Self::Packet { handle, .. } => handle,
      }
   }

   pub const fn mode(&self) -> TransportMode {
      match self {
         Self::Stream { .. } => TransportMode::Stream,
         Self::Packet { .. } => TransportMode::Packet,
      }
   }
}

/// Exclusive owner of one native connection handle.
///
/// The handle stays valid until the first [`shutdown`](Self::shutdown);
/// every later call is a no-op and I/O after it fails with
/// [`RadioError::Closed`].
pub struct ConnectionHolder {
   stack: Arc<dyn RadioStack>,
   link: Link,
   closed: AtomicBool,
}

impl ConnectionHolder {
   pub fn new(stack: Arc<dyn RadioStack>, link: Link) -> Self {
      Self {
         stack,
         link,
         closed: AtomicBool::new(false),
      }
   }

   pub const fn link(&self) -> &Link {
      &self.link
   }

   pub const fn mode(&self) -> TransportMode {
      self.link.mode()
   }

   pub fn is_closed(&self) -> bool {
      self.closed.load(Ordering::Acquire)
   }

   /// Closes the native handle. Never fails; safe to call repeatedly and
   /// from any thread.
   pub fn shutdown(&self) {
      if self.closed.swap(true, Ordering::AcqRel) {
         return;
      }
      let handle = self.link.handle();
      match self.stack.close(handle) {
         Ok(()) => debug!("Closed {} connection {handle:?}", self.mode()),
         Err(e) => debug!("Closing {handle:?} reported: {e}"),
      }
   }

   fn open_handle(&self) -> Result<NativeHandle, RadioError> {
      if self.is_closed() {
         return Err(RadioError::Closed);
      }
      Ok(self.link.handle())
   }

   /// Reads one byte from a stream link, `None` at end of stream.
   pub fn read_byte(&self) -> Result<Option<u8>, RadioError> {
      self.stack.read_byte(self.open_handle()?)
   }

   pub fn packet_ready(&self) -> Result<bool, RadioError> {
      self.stack.packet_ready(self.open_handle()?)
   }

   /// Receive MTU negotiated at open; stream links report 1.
   pub const fn receive_mtu(&self) -> usize {
      match self.link {
         Link::Stream { .. } => 1,
         Link::Packet { receive_mtu, .. } => receive_mtu,
      }
   }

   pub fn receive(&self, buf: &mut [u8]) -> Result<usize, RadioError> {
      self.stack.receive(self.open_handle()?, buf)
   }

   /// Writes `data` as stream bytes or as one packet, depending on the link.
   pub fn send(&self, data: &[u8]) -> Result<(), RadioError> {
      let handle = self.open_handle()?;
      match self.link {
         Link::Stream { .. } => self.stack.write(handle, data),
         Link::Packet { .. } => self.stack.send_packet(handle, data),
      }
   }
}

impl Drop for ConnectionHolder {
   fn drop(&mut self) {
      self.shutdown();
   }
}
