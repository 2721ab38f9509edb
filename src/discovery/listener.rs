//! Callbacks delivered to discovery clients.

use std::sync::Arc;

use strum::Display;

use crate::discovery::{
   device::{DeviceClass, RemoteDevice},
   record::ServiceRecord,
};

/// Identifier of one service search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SearchId(pub u32);

/// How an inquiry ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum InquiryStatus {
   Completed,
   /// Ended by `cancel_inquiry`.
   Terminated,
   Error,
}

/// How a service search ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum SearchStatus {
   /// Records were found and delivered.
   Completed,
   NoRecords,
   Error,
}

/// Receiver of discovery results.
///
/// Callbacks run on the discovery worker threads; implementations must not
/// block indefinitely.
pub trait DiscoveryListener: Send + Sync {
   fn device_discovered(&self, device: &RemoteDevice, class: DeviceClass);

   fn inquiry_completed(&self, status: InquiryStatus);

   fn services_discovered(&self, _search: SearchId, _records: &[ServiceRecord]) {}

   fn service_search_completed(&self, _search: SearchId, _status: SearchStatus) {}
}

pub type ListenerRef = Arc<dyn DiscoveryListener>;

/// Registration key derived from the listener's allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct ListenerKey(usize);

impl ListenerKey {
   pub(crate) fn of(listener: &ListenerRef) -> Self {
      Self(Arc::as_ptr(listener).cast::<()>() as usize)
   }
}
