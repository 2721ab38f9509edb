//! Interpretation of received data.
//!
//! In character mode stream bytes are collected into a short text buffer
//! that is flushed on a newline (while the buffer still looks like text) or
//! once it grows past the flush threshold; packets are rendered one by one.
//! In stats mode only periodic throughput reports are produced.

use core::fmt;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

use crate::{event::SessionEvent, radio::TransportMode};

/// Upper bound on the configurable flush threshold.
pub const MAX_TEXT_FLUSH_LEN: usize = 255;

/// How received data is interpreted. Switchable while a session runs.
#[derive(
   Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum DataMode {
   #[default]
   Chars,
   Stats,
}

/// Running receive counters of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SessionStats {
   pub bytes: u64,
   pub packets: u64,
}

/// Throughput since the previous report.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThroughputReport {
   pub mode: TransportMode,
   pub totals: SessionStats,
   pub bytes_since: u64,
   pub elapsed: Duration,
}

impl ThroughputReport {
   pub fn bytes_per_sec(&self) -> f64 {
      let secs = self.elapsed.as_secs_f64();
      if secs > 0.0 {
         self.bytes_since as f64 / secs
      } else {
         0.0
      }
   }
}

impl fmt::Display for ThroughputReport {
   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
      f.write_str("Received ")?;
      if self.mode == TransportMode::Packet {
         write!(f, "{} packet(s), ", self.totals.packets)?;
      }
      write!(f, "{} bytes {:.1} B/s", self.totals.bytes, self.bytes_per_sec())
   }
}

/// Renders bytes for logging: printable ASCII as-is, everything else
/// escaped.
pub fn render_text(bytes: &[u8]) -> String {
   let mut out = String::with_capacity(bytes.len());
   for &b in bytes {
      match b {
         b'\n' => out.push_str("\\n"),
         b'\r' => out.push_str("\\r"),
         b'\t' => out.push_str("\\t"),
         0x20..=0x7E => out.push(b as char),
         _ => out.push_str(&format!("\\x{b:02X}")),
      }
   }
   out
}

const fn is_binary(b: u8) -> bool {
   (b < b' ' && !matches!(b, b'\n' | b'\r' | b'\t')) || b == 0x7F
}

/// Per-session interpretation state. Owned by the receive loop, so units
/// are classified in arrival order.
pub struct Classifier {
   mode: TransportMode,
   flush_len: usize,
   stats_interval: Duration,
   text: heapless::Vec<u8, { MAX_TEXT_FLUSH_LEN + 1 }>,
   binary: bool,
   last_report: Instant,
   reported_bytes: u64,
}

impl Classifier {
   pub fn new(mode: TransportMode, flush_len: usize, stats_interval: Duration, now: Instant) -> Self {
      Self {
         mode,
         flush_len: flush_len.min(MAX_TEXT_FLUSH_LEN),
         stats_interval,
         text: heapless::Vec::new(),
         binary: false,
         last_report: now,
         reported_bytes: 0,
      }
   }

   /// Classifies one stream byte. `totals` already includes it.
   pub fn on_byte(
      &mut self,
      byte: u8,
      data_mode: DataMode,
      totals: SessionStats,
      now: Instant,
   ) -> Option<SessionEvent> {
      match data_mode {
         DataMode::Chars => {
            if is_binary(byte) {
               self.binary = true;
            }
            // Capacity is one past the largest threshold, so this never fails.
            let _ = self.text.push(byte);
            if !self.binary && byte == b'\n' {
               self.flush_text(true)
            } else if self.text.len() > self.flush_len {
               self.flush_text(false)
            } else {
               None
            }
         },
         DataMode::Stats => self.report(totals, now),
      }
   }

   /// Classifies one received packet. `totals` already includes it.
   pub fn on_packet(
      &mut self,
      packet: &[u8],
      data_mode: DataMode,
      totals: SessionStats,
      now: Instant,
   ) -> Option<SessionEvent> {
      match data_mode {
         DataMode::Chars => {
            let body = packet.strip_suffix(b"\n").unwrap_or(packet);
            Some(SessionEvent::Packet {
               text: render_text(body),
               len: packet.len(),
            })
         },
         DataMode::Stats => self.report(totals, now),
      }
   }

   /// Flushes whatever text is still buffered.
   pub fn finish(&mut self) -> Option<SessionEvent> {
      self.flush_text(false)
   }

   fn flush_text(&mut self, line_end: bool) -> Option<SessionEvent> {
      if self.text.is_empty() {
         return None;
      }
      let mut body: &[u8] = &self.text;
      if line_end {
         body = body.strip_suffix(b"\n").unwrap_or(body);
         body = body.strip_suffix(b"\r").unwrap_or(body);
      }
      let event = SessionEvent::Text {
         text: render_text(body),
         binary: self.binary,
      };
      self.text.clear();
      self.binary = false;
      Some(event)
   }

   fn report(&mut self, totals: SessionStats, now: Instant) -> Option<SessionEvent> {
      let elapsed = now.saturating_duration_since(self.last_report);
      if elapsed < self.stats_interval {
         return None;
      }
      let report = ThroughputReport {
         mode: self.mode,
         totals,
         bytes_since: totals.bytes - self.reported_bytes,
         elapsed,
      };
      self.reported_bytes = totals.bytes;
      self.last_report = now;
      Some(SessionEvent::Throughput(report))
   }
}

#[cfg(test)]
mod tests {
   use super::*;

   const FIVE_SECS: Duration = Duration::from_secs(5);

   fn chars(classifier: &mut Classifier, data: &[u8]) -> Vec<SessionEvent> {
      let now = Instant::now();
      data
         .iter()
         .enumerate()
         .filter_map(|(i, &b)| {
            let totals = SessionStats {
               bytes: i as u64 + 1,
               packets: 0,
            };
            classifier.on_byte(b, DataMode::Chars, totals, now)
         })
         .collect()
   }

   fn text(s: &str, binary: bool) -> SessionEvent {
      SessionEvent::Text {
         text: s.to_string(),
         binary,
      }
   }

   #[test]
   fn test_newline_flushes_line() {
      let mut c = Classifier::new(TransportMode::Stream, 32, FIVE_SECS, Instant::now());
      assert_eq!(chars(&mut c, b"abc\n"), vec![text("abc", false)]);
      assert_eq!(c.finish(), None);
   }

   #[test]
   fn test_length_threshold_flushes_at_33rd_byte() {
      let mut c = Classifier::new(TransportMode::Stream, 32, FIVE_SECS, Instant::now());
      let data = [b'x'; 40];

      let mut flushed_at = Vec::new();
      let now = Instant::now();
      for (i, &b) in data.iter().enumerate() {
         let totals = SessionStats {
            bytes: i as u64 + 1,
            packets: 0,
         };
         if let Some(event) = c.on_byte(b, DataMode::Chars, totals, now) {
            flushed_at.push((i + 1, event));
         }
      }

      assert_eq!(flushed_at, vec![(33, text(&"x".repeat(33), false))]);
      assert_eq!(c.finish(), Some(text(&"x".repeat(7), false)));
   }

   #[test]
   fn test_binary_content_suspends_newline_flush() {
      let mut c = Classifier::new(TransportMode::Stream, 32, FIVE_SECS, Instant::now());
      assert!(chars(&mut c, b"\x01a\nb").is_empty());
      assert_eq!(c.finish(), Some(text("\\x01a\\nb", true)));

      // A fresh buffer is text again.
      assert_eq!(chars(&mut c, b"ok\r\n"), vec![text("ok", false)]);
   }

   #[test]
   fn test_packet_rendering() {
      let mut c = Classifier::new(TransportMode::Packet, 32, FIVE_SECS, Instant::now());
      let totals = SessionStats::default();
      let now = Instant::now();
      assert_eq!(
         c.on_packet(b"hi\n", DataMode::Chars, totals, now),
         Some(SessionEvent::Packet {
            text: "hi".into(),
            len: 3
         })
      );
      assert_eq!(
         c.on_packet(&[0xFF, b'A'], DataMode::Chars, totals, now),
         Some(SessionEvent::Packet {
            text: "\\xFFA".into(),
            len: 2
         })
      );
   }

   #[test]
   fn test_stats_reports_are_spaced() {
      let start = Instant::now();
      let mut c = Classifier::new(TransportMode::Stream, 32, FIVE_SECS, start);

      let mut reports = Vec::new();
      for i in 1..=200u64 {
         let now = start + Duration::from_millis(100 * i);
         let totals = SessionStats {
            bytes: i * 10,
            packets: 0,
         };
         if let Some(SessionEvent::Throughput(report)) = c.on_byte(b'z', DataMode::Stats, totals, now)
         {
            reports.push((now, report));
         }
      }

      assert_eq!(reports.len(), 4);
      let mut last = start;
      for (at, report) in &reports {
         assert!(at.duration_since(last) >= FIVE_SECS);
         assert_eq!(report.elapsed, at.duration_since(last));
         assert_eq!(report.bytes_since, 500);
         assert!((report.bytes_per_sec() - 100.0).abs() < 1e-9);
         last = *at;
      }
      assert_eq!(reports[3].1.totals.bytes, 2000);
   }

   #[test]
   fn test_report_wording() {
      let report = ThroughputReport {
         mode: TransportMode::Packet,
         totals: SessionStats {
            bytes: 1200,
            packets: 3,
         },
         bytes_since: 1000,
         elapsed: Duration::from_secs(5),
      };
      assert_eq!(report.to_string(), "Received 3 packet(s), 1200 bytes 200.0 B/s");
   }

   #[test]
   fn test_render_text() {
      assert_eq!(render_text(b"a b\t\x00\x7f"), "a b\\t\\x00\\x7F");
   }
}
