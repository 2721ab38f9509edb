//! Connection address parsing.
//!
//! Two schemes are recognised:
//!
//! - `btspp://<address>:<channel>[;name=value...]` for reliable RFCOMM
//!   byte streams,
//! - `btl2cap://<address>:<psm>[;name=value...]` for L2CAP packet channels
//!   (PSM in hex).

use core::fmt;
use std::str::FromStr;

use smol_str::SmolStr;
use smallvec::SmallVec;

use crate::{
   error::{LinkError, Result},
   radio::{Address, TransportMode},
};

const SCHEME_STREAM: &str = "btspp";
const SCHEME_PACKET: &str = "btl2cap";

/// A parsed connection URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionUrl {
   raw: SmolStr,
   mode: TransportMode,
   address: Address,
   /// RFCOMM channel or L2CAP PSM.
   port: u16,
   params: SmallVec<[(SmolStr, SmolStr); 4]>,
}

impl ConnectionUrl {
   pub fn parse(url: &str) -> Result<Self> {
      let invalid = |why: &str| LinkError::InvalidUrl(format!("{url}: {why}"));

      let (scheme, rest) = url
         .split_once("://")
         .ok_or_else(|| invalid("missing scheme"))?;
      let mode = match scheme {
         SCHEME_STREAM => TransportMode::Stream,
         SCHEME_PACKET => TransportMode::Packet,
         other => return Err(LinkError::UnsupportedScheme(SmolStr::new(other))),
      };

      let mut parts = rest.split(';');
      let target = parts.next().unwrap_or_default();
      let (address, port) = target
         .split_once(':')
         .ok_or_else(|| invalid("missing channel"))?;
      let address: Address = address.parse()?;

      let port = match mode {
         TransportMode::Stream => match port.parse::<u16>() {
            Ok(channel @ 1..=30) => channel,
            _ => return Err(invalid("RFCOMM channel must be 1..=30")),
         },
         TransportMode::Packet => {
            u16::from_str_radix(port, 16).map_err(|_| invalid("PSM must be hex"))?
         },
      };

      let mut params = SmallVec::new();
      for param in parts.filter(|p| !p.is_empty()) {
         let (name, value) = param
            .split_once('=')
            .ok_or_else(|| invalid("parameter without value"))?;
         params.push((SmolStr::new(name), SmolStr::new(value)));
      }

      let parsed = Self {
         raw: SmolStr::new(url),
         mode,
         address,
         port,
         params,
      };
      // Surface malformed numeric/boolean parameters at parse time.
      parsed.receive_mtu()?;
      parsed.transmit_mtu()?;
      for flag in ["authenticate", "encrypt", "master"] {
         parsed.flag(flag)?;
      }
      Ok(parsed)
   }

   pub const fn mode(&self) -> TransportMode {
      self.mode
   }

   pub const fn address(&self) -> Address {
      self.address
   }

   /// RFCOMM channel (stream) or PSM (packet).
   pub const fn port(&self) -> u16 {
      self.port
   }

   pub fn as_str(&self) -> &str {
      &self.raw
   }

   /// Looks up a parameter, ignoring name case.
   pub fn param(&self, name: &str) -> Option<&str> {
      self
         .params
         .iter()
         .find(|(k, _)| k.eq_ignore_ascii_case(name))
         .map(|(_, v)| v.as_str())
   }

   pub fn authenticate(&self) -> bool {
      self.flag("authenticate").unwrap_or(false)
   }

   pub fn encrypt(&self) -> bool {
      self.flag("encrypt").unwrap_or(false)
   }

   pub fn master(&self) -> bool {
      self.flag("master").unwrap_or(false)
   }

   /// Requested receive MTU for packet channels.
   pub fn receive_mtu(&self) -> Result<Option<usize>> {
      self.number("ReceiveMTU")
   }

   pub fn transmit_mtu(&self) -> Result<Option<usize>> {
      self.number("TransmitMTU")
   }

   fn flag(&self, name: &str) -> Result<bool> {
      match self.param(name) {
         None => Ok(false),
         Some(v) if v.eq_ignore_ascii_case("true") => Ok(true),
         Some(v) if v.eq_ignore_ascii_case("false") => Ok(false),
         Some(v) => Err(LinkError::InvalidUrl(format!("{}: {name}={v}", self.raw))),
      }
   }

   fn number(&self, name: &str) -> Result<Option<usize>> {
      self
         .param(name)
         .map(|v| {
            v.parse()
               .map_err(|_| LinkError::InvalidUrl(format!("{}: {name}={v}", self.raw)))
         })
         .transpose()
   }
}

impl FromStr for ConnectionUrl {
   type Err = LinkError;

   fn from_str(s: &str) -> Result<Self> {
      Self::parse(s)
   }
}

impl fmt::Display for ConnectionUrl {
   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
      f.write_str(&self.raw)
   }
}
