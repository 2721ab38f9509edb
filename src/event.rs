//! Event handling for connection sessions.
//!
//! Sessions report what their receive loop observes (flushed text, packets,
//! throughput, capture and connection changes) through an [`EventBus`].

use std::{path::PathBuf, sync::Arc};

use crate::{
   connection::{classify::ThroughputReport, session::SessionId},
   radio::TransportMode,
};

/// Events that can be emitted by a connection session.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
   Connected(TransportMode),
   /// A flushed character-mode buffer (stream transport).
   Text { text: String, binary: bool },
   /// One packet rendered in character mode.
   Packet { text: String, len: usize },
   Throughput(ThroughputReport),
   CaptureStarted(PathBuf),
   CaptureStopped,
   /// The receive loop ended; `error` is set when it ended on a transport
   /// failure that was not caused by a shutdown request.
   Disconnected { error: bool },
}

/// Trait for implementing event emission.
pub trait EventBus: Send + Sync {
   /// Emits an event to all registered listeners.
   fn emit(&self, session: SessionId, event: SessionEvent);
}

/// Type alias for a thread-safe event sender.
pub type EventSender = Arc<dyn EventBus>;

/// Bus that drops every event; sessions still log what they see.
pub struct NullBus;

impl EventBus for NullBus {
   fn emit(&self, _session: SessionId, _event: SessionEvent) {}
}
