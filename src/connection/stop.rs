use std::{
   sync::atomic::{AtomicBool, Ordering},
   time::Duration,
};

use parking_lot::{Condvar, Mutex};

/// Cooperative stop request shared between a receive loop and whoever
/// shuts it down.
#[derive(Debug, Default)]
pub struct StopSignal {
   requested: AtomicBool,
   lock: Mutex<()>,
   cond: Condvar,
}

impl StopSignal {
   pub fn new() -> Self {
      Self::default()
   }

   /// Requests a stop. Returns `true` only for the first request.
   pub fn request(&self) -> bool {
      if self.requested.swap(true, Ordering::AcqRel) {
         return false;
      }
      let _guard = self.lock.lock();
      self.cond.notify_all();
      true
   }

   pub fn is_requested(&self) -> bool {
      self.requested.load(Ordering::Acquire)
   }

   /// Sleeps for at most `timeout`, waking early on a stop request.
   /// Returns whether a stop was requested.
   pub fn wait_timeout(&self, timeout: Duration) -> bool {
      let mut guard = self.lock.lock();
      if self.is_requested() {
         return true;
      }
      self.cond.wait_for(&mut guard, timeout);
      self.is_requested()
   }
}
