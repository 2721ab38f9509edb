//! Explicit per-radio context handed to coordinators and sessions.

use std::sync::Arc;

use tokio::runtime::Handle;

use crate::{config::Config, error::Result, radio::RadioStack};

/// Radio stack, runtime and configuration shared by everything that talks
/// to one radio. Cheaply cloneable.
#[derive(Clone)]
pub struct RadioContext {
   stack: Arc<dyn RadioStack>,
   runtime: Handle,
   config: Arc<Config>,
}

impl RadioContext {
   /// Builds a context on the runtime of the calling task.
   pub fn new(stack: Arc<dyn RadioStack>, config: Config) -> Result<Self> {
      Ok(Self::with_runtime(stack, config, Handle::try_current()?))
   }

   pub fn with_runtime(stack: Arc<dyn RadioStack>, config: Config, runtime: Handle) -> Self {
      Self {
         stack,
         runtime,
         config: Arc::new(config),
      }
   }

   pub fn stack(&self) -> &Arc<dyn RadioStack> {
      &self.stack
   }

   pub const fn runtime(&self) -> &Handle {
      &self.runtime
   }

   pub fn config(&self) -> &Config {
      &self.config
   }
}
