//! Device inquiry and service search.
//!
//! This module tracks who owns the running inquiry and which service
//! searches are outstanding, and turns native search results into
//! [`ServiceRecord`]s.

pub mod coordinator;
pub mod device;
pub mod listener;
pub mod record;
pub mod sdp;

pub use coordinator::{DiscoveryCoordinator, LocalDevice};
pub use device::{DeviceClass, RemoteDevice};
pub use listener::{DiscoveryListener, InquiryStatus, ListenerRef, SearchId, SearchStatus};
pub use record::ServiceRecord;
