use core::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use smol_str::{SmolStr, format_smolstr};

use crate::error::LinkError;

/// 48-bit radio device address, most significant byte first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Address(pub [u8; 6]);

impl Address {
   pub const fn new(bytes: [u8; 6]) -> Self {
      Self(bytes)
   }

   /// Builds an address from the low 48 bits of `value`.
   pub const fn from_u64(value: u64) -> Self {
      let b = value.to_be_bytes();
      Self([b[2], b[3], b[4], b[5], b[6], b[7]])
   }

   pub const fn as_u64(&self) -> u64 {
      let [a, b, c, d, e, f] = self.0;
      u64::from_be_bytes([0, 0, a, b, c, d, e, f])
   }

   /// Twelve upper-case hex digits, no separators.
   pub fn to_compact(&self) -> SmolStr {
      let [a, b, c, d, e, f] = self.0;
      format_smolstr!("{a:02X}{b:02X}{c:02X}{d:02X}{e:02X}{f:02X}")
   }
}

impl fmt::Display for Address {
   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
      let [a, b, c, d, e, g] = self.0;
      write!(f, "{a:02X}:{b:02X}:{c:02X}:{d:02X}:{e:02X}:{g:02X}")
   }
}

impl FromStr for Address {
   type Err = LinkError;

   /// Accepts `AA:BB:CC:DD:EE:FF` or `AABBCCDDEEFF`.
   fn from_str(s: &str) -> Result<Self, Self::Err> {
      let invalid = || LinkError::InvalidAddress(SmolStr::new(s));

      let digits: heapless::String<12> = if s.len() == 17 {
         let mut out = heapless::String::new();
         for (i, part) in s.split(':').enumerate() {
            if i >= 6 || part.len() != 2 {
               return Err(invalid());
            }
            out.push_str(part).map_err(|_| invalid())?;
         }
         out
      } else if s.len() == 12 {
         heapless::String::try_from(s).map_err(|_| invalid())?
      } else {
         return Err(invalid());
      };

      if digits.len() != 12 {
         return Err(invalid());
      }

      let mut bytes = [0u8; 6];
      hex::decode_to_slice(digits.as_str(), &mut bytes).map_err(|_| invalid())?;
      Ok(Self(bytes))
   }
}

impl Serialize for Address {
   fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
      serializer.collect_str(self)
   }
}

impl<'de> Deserialize<'de> for Address {
   fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
      let s = SmolStr::deserialize(deserializer)?;
      s.parse().map_err(serde::de::Error::custom)
   }
}
