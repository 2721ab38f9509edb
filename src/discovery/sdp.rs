//! Service attribute decoding seam.
//!
//! The byte layout of SDP data elements is owned by an [`SdpCodec`]; the
//! discovery layer only moves raw attribute payloads into it and stores
//! whatever comes back.

use thiserror::Error;

/// Error type for attribute decoding.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
   #[error("Empty attribute payload")]
   Empty,

   #[error("Truncated data element: expected {expected} bytes, got {actual}")]
   Truncated { expected: usize, actual: usize },

   #[error("Unsupported data element type: 0x{descriptor:02x}")]
   UnsupportedType { descriptor: u8 },

   #[error("Invalid data element: {reason}")]
   Invalid { reason: &'static str },
}

/// A decoded attribute value, kept as the codec produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataElement(Vec<u8>);

impl DataElement {
   pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
      Self(bytes.into())
   }

   pub fn as_bytes(&self) -> &[u8] {
      &self.0
   }
}

/// Decodes one raw attribute payload.
pub trait SdpCodec: Send + Sync {
   fn decode(&self, attr_id: u16, raw: &[u8]) -> Result<DataElement, DecodeError>;
}

/// Codec that checks the outer data element framing and keeps the payload
/// verbatim. Nested elements are not inspected.
#[derive(Debug, Default, Clone, Copy)]
pub struct RawCodec;

impl SdpCodec for RawCodec {
   fn decode(&self, _attr_id: u16, raw: &[u8]) -> Result<DataElement, DecodeError> {
      let expected = element_len(raw)?;
      if raw.len() < expected {
         return Err(DecodeError::Truncated {
            expected,
            actual: raw.len(),
         });
      }
      if raw.len() > expected {
         return Err(DecodeError::Invalid {
            reason: "trailing bytes after data element",
         });
      }
      Ok(DataElement::new(raw))
   }
}

/// Total encoded length (header included) announced by the element header.
fn element_len(raw: &[u8]) -> Result<usize, DecodeError> {
   let &descriptor = raw.first().ok_or(DecodeError::Empty)?;
   let kind = descriptor >> 3;
   let size_index = descriptor & 0x07;

   match (kind, size_index) {
      // nil, boolean
      (0, 0) => return Ok(1),
      (5, 0) => return Ok(2),
      (0 | 5, _) => {
         return Err(DecodeError::Invalid {
            reason: "nil and boolean elements have no size",
         });
      },
      // unsigned, signed
      (1 | 2, 0..=4) => return Ok(1 + (1 << size_index)),
      // uuid
      (3, 1 | 2 | 4) => return Ok(1 + (1 << size_index)),
      (1..=3, _) => {
         return Err(DecodeError::Invalid {
            reason: "bad size for fixed-width element",
         });
      },
      // text, sequence, alternative, url
      (4 | 6 | 7 | 8, 5..=7) => {},
      (4 | 6 | 7 | 8, _) => {
         return Err(DecodeError::Invalid {
            reason: "variable-length element without length field",
         });
      },
      _ => return Err(DecodeError::UnsupportedType { descriptor }),
   }

   let width = 1usize << (size_index - 5);
   let field = raw.get(1..1 + width).ok_or(DecodeError::Truncated {
      expected: 1 + width,
      actual: raw.len(),
   })?;
   let body = field.iter().fold(0usize, |acc, &b| (acc << 8) | usize::from(b));
   Ok(1 + width + body)
}
