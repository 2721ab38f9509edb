//! Short-range radio link core.
//!
//! Device inquiry and service search through a [`DiscoveryCoordinator`],
//! and client connections over stream (`btspp://`) and packet
//! (`btl2cap://`) transports through a [`ConnectionSession`]. The native
//! stack is reached only through the [`RadioStack`] trait, handed in via a
//! [`RadioContext`].

pub mod config;
pub mod connection;
pub mod context;
pub mod discovery;
pub mod error;
pub mod event;
pub mod radio;

pub use config::Config;
pub use connection::{ConnectionSession, DataMode, SessionId, SessionState};
pub use context::RadioContext;
pub use discovery::{DiscoveryCoordinator, DiscoveryListener, RemoteDevice, ServiceRecord};
pub use error::{LinkError, Result};
pub use event::{EventBus, EventSender, SessionEvent};
pub use radio::{Address, ConnectionUrl, RadioStack, TransportMode};
