//! Client connection sessions.
//!
//! A session opens one connection, then runs a dedicated receive loop on a
//! blocking worker until end of stream, a transport error or a shutdown
//! request. Outbound data goes out on short-lived detached workers so a
//! stuck send never stalls the receive loop or the caller.

use core::fmt;
use std::{
   path::{Path, PathBuf},
   sync::{
      Arc,
      atomic::{AtomicU32, AtomicU64, Ordering},
   },
   time::Instant,
};

use crossbeam::atomic::AtomicCell;
use log::{debug, error, info, warn};
use parking_lot::Mutex;
use smallvec::SmallVec;
use tokio::task::JoinHandle;

use crate::{
   connection::{
      capture::CaptureSink,
      classify::{Classifier, DataMode, SessionStats},
      holder::{ConnectionHolder, Link},
      stop::StopSignal,
   },
   context::RadioContext,
   error::{LinkError, Result},
   event::{EventSender, SessionEvent},
   radio::{ConnectionUrl, RadioError, TransportMode},
};

pub type Packet = SmallVec<[u8; 64]>;

static SESSION_COUNT: AtomicU32 = AtomicU32::new(0);

/// Process-unique session number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(pub u32);

impl fmt::Display for SessionId {
   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
      write!(f, "session#{}", self.0)
   }
}

/// Lifecycle of a session. `Stopped` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
   Connecting,
   Running,
   Stopped,
}

struct SessionInner {
   id: SessionId,
   url: ConnectionUrl,
   ctx: RadioContext,
   events: EventSender,
   state: AtomicCell<SessionState>,
   stop: StopSignal,
   holder: Mutex<Option<Arc<ConnectionHolder>>>,
   data_mode: AtomicCell<DataMode>,
   bytes: AtomicU64,
   packets: AtomicU64,
   capture: CaptureSink,
   worker: Mutex<Option<JoinHandle<()>>>,
}

/// One open client connection and its receive loop.
///
/// This type is cheaply cloneable.
#[derive(Clone)]
pub struct ConnectionSession(Arc<SessionInner>);

impl ConnectionSession {
   /// Opens `url` and starts receiving.
   ///
   /// The URL is parsed before anything touches the radio, so an unknown
   /// scheme fails here. A failed open yields no session.
   pub async fn open(ctx: RadioContext, url: &str, events: EventSender) -> Result<Self> {
      let url = ConnectionUrl::parse(url)?;
      let id = SessionId(SESSION_COUNT.fetch_add(1, Ordering::Relaxed) + 1);
      let data_mode = ctx.config().data_mode;
      let label = url.address().to_compact();

      let session = Self(Arc::new(SessionInner {
         id,
         url,
         ctx,
         events,
         state: AtomicCell::new(SessionState::Connecting),
         stop: StopSignal::new(),
         holder: Mutex::new(None),
         data_mode: AtomicCell::new(data_mode),
         bytes: AtomicU64::new(0),
         packets: AtomicU64::new(0),
         capture: CaptureSink::new(label),
         worker: Mutex::new(None),
      }));

      debug!("{id}: connecting to {} ...", session.0.url);
      let holder = match session.connect().await {
         Ok(holder) => Arc::new(holder),
         Err(e) => {
            session.0.state.store(SessionState::Stopped);
            error!("{id}: connection error: {e}");
            return Err(e);
         },
      };

      let mode = holder.mode();
      *session.0.holder.lock() = Some(holder.clone());
      session.0.state.store(SessionState::Running);
      info!("{id}: connected to {} ({mode})", session.0.url);
      session.0.emit(SessionEvent::Connected(mode));

      let inner = session.0.clone();
      let worker = session
         .0
         .ctx
         .runtime()
         .spawn_blocking(move || inner.receive_loop(holder));
      *session.0.worker.lock() = Some(worker);

      Ok(session)
   }

   async fn connect(&self) -> Result<ConnectionHolder> {
      let stack = self.0.ctx.stack().clone();
      let url = self.0.url.clone();
      self
         .0
         .ctx
         .runtime()
         .spawn_blocking(move || {
            let connect_error = |source: RadioError| LinkError::Connect {
               url: url.as_str().into(),
               source,
            };
            let handle = stack.open(&url).map_err(connect_error)?;
            let link = match url.mode() {
               TransportMode::Stream => Link::Stream { handle },
               TransportMode::Packet => {
                  let mtus = stack
                     .receive_mtu(handle)
                     .and_then(|rx| Ok((rx, stack.transmit_mtu(handle)?)));
                  match mtus {
                     Ok((receive_mtu, transmit_mtu)) => Link::Packet {
                        handle,
                        receive_mtu,
                        transmit_mtu,
                     },
                     Err(e) => {
                        let _ = stack.close(handle);
                        return Err(connect_error(e));
                     },
                  }
               },
            };
            Ok(ConnectionHolder::new(stack, link))
         })
         .await
         .map_err(LinkError::WorkerPanicked)?
   }

   pub fn id(&self) -> SessionId {
      self.0.id
   }

   pub fn url(&self) -> &ConnectionUrl {
      &self.0.url
   }

   pub fn state(&self) -> SessionState {
      self.0.state.load()
   }

   pub fn is_running(&self) -> bool {
      self.state() == SessionState::Running
   }

   pub fn stats(&self) -> SessionStats {
      SessionStats {
         bytes: self.0.bytes.load(Ordering::Relaxed),
         packets: self.0.packets.load(Ordering::Relaxed),
      }
   }

   pub fn data_mode(&self) -> DataMode {
      self.0.data_mode.load()
   }

   /// Switches data interpretation; takes effect with the next received
   /// unit.
   pub fn set_data_mode(&self, mode: DataMode) {
      self.0.data_mode.store(mode);
   }

   /// Turns raw capture on (into a new file in `dir`) or off.
   ///
   /// Returns whether capture is on afterwards. Failing to open a file is
   /// logged and leaves capture off.
   pub fn set_capture(&self, enabled: bool, dir: &Path) -> bool {
      if !enabled {
         self.0.close_capture();
         return false;
      }
      if self.0.stop.is_requested() || self.state() == SessionState::Stopped {
         warn!("{}: session stopped, not starting capture", self.0.id);
         return false;
      }
      match self.0.capture.enable(dir) {
         Ok(Some(path)) => {
            self.0.emit(SessionEvent::CaptureStarted(path));
            // Lost a race with shutdown; nothing else will close the file.
            if self.0.stop.is_requested() {
               self.0.close_capture();
               return false;
            }
            true
         },
         Ok(None) => true,
         Err(e) => {
            warn!("{}: could not start capture: {e}", self.0.id);
            false
         },
      }
   }

   /// Sets the data mode and toggles capture into the configured capture
   /// directory in one go.
   pub fn update_receive_type(&self, mode: DataMode, save_to_file: bool) -> bool {
      self.set_data_mode(mode);
      let dir = self.0.ctx.config().capture_dir();
      self.set_capture(save_to_file, &dir)
   }

   pub fn capture_path(&self) -> Option<PathBuf> {
      self.0.capture.path()
   }

   /// Sends `data` on a detached worker. Failures are logged only; the
   /// returned handle may be dropped.
   pub fn send(&self, data: &[u8]) -> JoinHandle<()> {
      let holder = self.0.holder.lock().clone();
      let packet = Packet::from_slice(data);
      let id = self.0.id;
      let address = self.0.url.address();
      self.0.ctx.runtime().spawn_blocking(move || {
         let Some(holder) = holder else {
            warn!("{id}: dropping {} byte(s), not connected", packet.len());
            return;
         };
         if let Link::Packet { transmit_mtu, .. } = *holder.link()
            && packet.len() > transmit_mtu
         {
            error!(
               "{id}: dropping {} byte packet, transmit MTU is {transmit_mtu}",
               packet.len()
            );
            return;
         }
         match holder.send(&packet) {
            Ok(()) => debug!("→ {address}: {} ({} bytes sent)", hex::encode(&packet), packet.len()),
            Err(e) => error!("{id}: communication error while sending: {e}"),
         }
      })
   }

   /// Stops the session from any thread.
   ///
   /// Closes the connection (waking a blocked read) and the capture file.
   /// Only the first call has any effect.
   pub fn shutdown(&self) {
      if !self.0.stop.request() {
         return;
      }
      info!("{}: shutting down", self.0.id);
      let holder = self.0.holder.lock().take();
      if let Some(holder) = holder {
         holder.shutdown();
      }
      self.0.close_capture();
   }

   /// Waits for the receive loop to finish.
   pub async fn join(&self) -> Result<()> {
      let worker = self.0.worker.lock().take();
      if let Some(worker) = worker {
         worker.await.map_err(LinkError::WorkerPanicked)?;
      }
      Ok(())
   }
}

impl SessionInner {
   fn emit(&self, event: SessionEvent) {
      self.events.emit(self.id, event);
   }

   fn close_capture(&self) {
      if self.capture.disable() {
         self.emit(SessionEvent::CaptureStopped);
      }
   }

   fn receive_loop(&self, holder: Arc<ConnectionHolder>) {
      let config = self.ctx.config();
      let mut classifier = Classifier::new(
         holder.mode(),
         config.text_flush_len,
         config.stats_interval(),
         Instant::now(),
      );

      let result = match holder.link() {
         Link::Stream { .. } => self.stream_loop(&holder, &mut classifier),
         Link::Packet { .. } => self.packet_loop(&holder, &mut classifier),
      };
      if let Some(event) = classifier.finish() {
         self.deliver(event);
      }

      let error = match result {
         Ok(()) => false,
         Err(e) if self.stop.is_requested() => {
            debug!("{}: receive loop ended by shutdown ({e})", self.id);
            false
         },
         Err(e) => {
            error!("{}: communication error: {e}", self.id);
            true
         },
      };

      // A loop that ended on its own stops the session just like shutdown.
      self.stop.request();
      self.state.store(SessionState::Stopped);
      self.holder.lock().take();
      holder.shutdown();
      self.close_capture();
      let stats = self.stats();
      info!(
         "{}: disconnected after {} bytes, {} packet(s)",
         self.id, stats.bytes, stats.packets
      );
      self.emit(SessionEvent::Disconnected { error });
   }

   fn stream_loop(&self, holder: &ConnectionHolder, classifier: &mut Classifier) -> Result<()> {
      while !self.stop.is_requested() {
         let Some(byte) = holder.read_byte()? else {
            debug!("{}: EOF received", self.id);
            break;
         };
         self.mirror(&[byte]);
         let totals = self.count(1, 0);
         let mode = self.data_mode.load();
         if let Some(event) = classifier.on_byte(byte, mode, totals, Instant::now()) {
            self.deliver(event);
         }
      }
      Ok(())
   }

   fn packet_loop(&self, holder: &ConnectionHolder, classifier: &mut Classifier) -> Result<()> {
      let poll = self.ctx.config().poll_interval();
      let address = self.url.address();
      let mut buf = vec![0u8; holder.receive_mtu()];

      'recv: while !self.stop.is_requested() {
         while !holder.packet_ready()? {
            if self.stop.wait_timeout(poll) {
               break 'recv;
            }
         }
         if self.stop.is_requested() {
            break;
         }

         let n = holder.receive(&mut buf)?;
         let packet = &buf[..n];
         debug!("← {address}: {}", hex::encode(packet));
         self.mirror(packet);

         let totals = self.count(n as u64, 1);
         let mode = self.data_mode.load();
         if let Some(event) = classifier.on_packet(packet, mode, totals, Instant::now()) {
            self.deliver(event);
         }
      }
      Ok(())
   }

   fn count(&self, bytes: u64, packets: u64) -> SessionStats {
      SessionStats {
         bytes: self.bytes.fetch_add(bytes, Ordering::Relaxed) + bytes,
         packets: self.packets.fetch_add(packets, Ordering::Relaxed) + packets,
      }
   }

   fn stats(&self) -> SessionStats {
      SessionStats {
         bytes: self.bytes.load(Ordering::Relaxed),
         packets: self.packets.load(Ordering::Relaxed),
      }
   }

   fn mirror(&self, data: &[u8]) {
      if self.capture.write(data).is_err() {
         self.emit(SessionEvent::CaptureStopped);
      }
   }

   fn deliver(&self, event: SessionEvent) {
      match &event {
         SessionEvent::Text { text, .. } => debug!("{}: cc:{text}", self.id),
         SessionEvent::Packet { text, len } => debug!("{}: cc:{text} ({len})", self.id),
         SessionEvent::Throughput(report) => info!("{}: {report}", self.id),
         _ => {},
      }
      self.emit(event);
   }
}
