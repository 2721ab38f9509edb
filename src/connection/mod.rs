//! Client connections over stream and packet transports.
//!
//! A [`ConnectionSession`] owns a [`ConnectionHolder`] for the native handle
//! and a receive loop that classifies incoming data and optionally mirrors
//! it into a capture file.

pub mod capture;
pub mod classify;
pub mod holder;
pub mod session;
pub mod stop;

pub use classify::{DataMode, SessionStats, ThroughputReport};
pub use holder::{ConnectionHolder, Link};
pub use session::{ConnectionSession, SessionId, SessionState};
