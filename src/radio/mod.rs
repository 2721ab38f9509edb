//! Boundary to the native radio stack.
//!
//! The stack itself is an external collaborator; this module only fixes the
//! blocking call surface the discovery and connection layers drive, plus the
//! small value types (addresses, handles, connection URLs) that cross it.

use smol_str::SmolStr;
use strum::{AsRefStr, Display};
use thiserror::Error;
use uuid::Uuid;

pub mod address;
#[cfg(test)]
pub mod mock;
pub mod url;

pub use address::Address;
pub use url::ConnectionUrl;

/// General/unlimited inquiry access code.
pub const GIAC: u32 = 0x9E8B33;
/// Limited dedicated inquiry access code.
pub const LIAC: u32 = 0x9E8B00;

/// Errors reported by the native stack.
#[derive(Error, Debug)]
pub enum RadioError {
   #[error("Connection closed")]
   Closed,

   #[error("I/O error: {0}")]
   Io(#[from] std::io::Error),

   #[error("Native stack error {code}: {message}")]
   Native { code: i32, message: SmolStr },

   #[error("Operation timed out")]
   Timeout,
}

/// Opaque handle to an open native connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NativeHandle(pub u64);

/// Opaque handle to a service record held by the native stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecordHandle(pub u64);

/// Transport flavour of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, AsRefStr)]
#[strum(serialize_all = "lowercase")]
pub enum TransportMode {
   /// Reliable byte stream (RFCOMM).
   Stream,
   /// Unreliable packet channel (L2CAP).
   Packet,
}

/// One device reported by a running inquiry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceSighting {
   pub address: Address,
   pub class_bits: u32,
   pub name: Option<SmolStr>,
}

/// Blocking operations exposed by the native radio stack.
///
/// Implementations must allow any blocking call on a connection handle to be
/// interrupted by `close` on that handle from another thread, and an
/// in-flight `run_inquiry` to be ended by `cancel_inquiry`.
pub trait RadioStack: Send + Sync + 'static {
   /// Runs an inquiry to completion, invoking `on_device` for every sighting
   /// on the calling thread. Repeated sightings of the same device are
   /// allowed.
   fn run_inquiry(
      &self,
      access_code: u32,
      on_device: &mut dyn FnMut(DeviceSighting),
   ) -> Result<(), RadioError>;

   /// Asks a running inquiry to stop. Returns whether the stack accepted.
   fn cancel_inquiry(&self) -> bool;

   /// Searches `address` for service records matching `uuid` (all records
   /// when `None`).
   fn search_services(
      &self,
      uuid: Option<&Uuid>,
      address: Address,
   ) -> Result<Vec<RecordHandle>, RadioError>;

   /// Fetches the raw encoding of one attribute, `None` if absent.
   fn service_attribute(
      &self,
      attr_id: u16,
      record: RecordHandle,
   ) -> Result<Option<Vec<u8>>, RadioError>;

   fn open(&self, url: &ConnectionUrl) -> Result<NativeHandle, RadioError>;

   /// Reads one byte from a stream connection, `None` at end of stream.
   fn read_byte(&self, handle: NativeHandle) -> Result<Option<u8>, RadioError>;

   fn write(&self, handle: NativeHandle, data: &[u8]) -> Result<(), RadioError>;

   fn packet_ready(&self, handle: NativeHandle) -> Result<bool, RadioError>;

   fn receive_mtu(&self, handle: NativeHandle) -> Result<usize, RadioError>;

   fn transmit_mtu(&self, handle: NativeHandle) -> Result<usize, RadioError>;

   /// Receives one packet into `buf`, returning its length.
   fn receive(&self, handle: NativeHandle, buf: &mut [u8]) -> Result<usize, RadioError>;

   fn send_packet(&self, handle: NativeHandle, data: &[u8]) -> Result<(), RadioError>;

   fn close(&self, handle: NativeHandle) -> Result<(), RadioError>;

   fn local_address(&self) -> Option<Address> {
      None
   }

   fn local_name(&self) -> Option<SmolStr> {
      None
   }

   fn is_powered(&self) -> bool {
      true
   }

   fn is_discoverable(&self) -> bool {
      false
   }

   fn device_version(&self) -> Option<u32> {
      None
   }

   fn device_manufacturer(&self) -> Option<u32> {
      None
   }

   fn stack_version(&self) -> Option<SmolStr> {
      None
   }

   /// Resolves the friendly name of a remote device.
   fn remote_name(&self, _address: Address) -> Result<Option<SmolStr>, RadioError> {
      Ok(None)
   }
}
