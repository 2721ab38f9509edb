//! Raw capture of received data to disk.

use std::{
   fs::{self, OpenOptions},
   io::Write,
   path::{Path, PathBuf},
};

use chrono::Local;
use log::{debug, info, warn};
use parking_lot::Mutex;
use smol_str::SmolStr;

use crate::error::{LinkError, Result};

struct CaptureFile {
   path: PathBuf,
   out: Box<dyn Write + Send>,
}

/// Optional file mirror of everything a session receives.
///
/// One file per enable cycle. Opening, writing, flushing and closing all
/// happen under the same lock. Every received unit is flushed as it is
/// written, so a failing disk is noticed on the unit that hit it.
pub struct CaptureSink {
   label: SmolStr,
   file: Mutex<Option<CaptureFile>>,
}

impl CaptureSink {
   /// `label` goes into file names, normally the compact device address.
   pub fn new(label: SmolStr) -> Self {
      Self {
         label,
         file: Mutex::new(None),
      }
   }

   pub fn is_enabled(&self) -> bool {
      self.file.lock().is_some()
   }

   pub fn path(&self) -> Option<PathBuf> {
      self.file.lock().as_ref().map(|f| f.path.clone())
   }

   /// Opens a new timestamped capture file in `dir`.
   ///
   /// Returns the new path, or `None` if capture was already on.
   pub fn enable(&self, dir: &Path) -> Result<Option<PathBuf>> {
      let mut file = self.file.lock();
      if file.is_some() {
         return Ok(None);
      }

      let stamp = Local::now().format("%m-%d_%H-%M-%S");
      let path = dir.join(format!("data-{}-{stamp}.bin", self.label));
      fs::create_dir_all(dir).map_err(LinkError::Sink)?;
      let out = OpenOptions::new()
         .create(true)
         .append(true)
         .open(&path)
         .map_err(LinkError::Sink)?;

      info!("Saving data to file {}", path.display());
      *file = Some(CaptureFile {
         path: path.clone(),
         out: Box::new(out),
      });
      Ok(Some(path))
   }

   /// Captures into `out` instead of a new file.
   #[cfg(test)]
   pub(crate) fn attach(&self, path: PathBuf, out: Box<dyn Write + Send>) {
      *self.file.lock() = Some(CaptureFile { path, out });
   }

   /// Flushes and closes the capture file. Returns whether one was open.
   pub fn disable(&self) -> bool {
      let Some(mut capture) = self.file.lock().take() else {
         return false;
      };
      if let Err(e) = capture.out.flush() {
         warn!("Flushing {} failed: {e}", capture.path.display());
      }
      info!("Closed capture file {}", capture.path.display());
      true
   }

   /// Appends `data` if capture is on. A failed write closes the file and
   /// is returned so the caller can report it; capture stays off afterwards.
   pub fn write(&self, data: &[u8]) -> Result<()> {
      let mut file = self.file.lock();
      let Some(capture) = file.as_mut() else {
         return Ok(());
      };
      let written = capture
         .out
         .write_all(data)
         .and_then(|()| capture.out.flush());
      if let Err(e) = written {
         warn!(
            "Capture write to {} failed, capture stopped: {e}",
            capture.path.display()
         );
         if let Err(e) = capture.out.flush() {
            debug!("Final flush of {} failed: {e}", capture.path.display());
         }
         *file = None;
         return Err(LinkError::Sink(e));
      }
      Ok(())
   }
}
