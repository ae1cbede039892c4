//! Fixed-size frames and the codec contract.
//!
//! A [`Frame`] is exactly one protocol unit, copied out of a capture after the
//! link-layer header has been stripped. Its length is the codec's
//! [`FrameCodec::FRAME_SIZE`]; anything shorter never becomes a frame.
//!
//! # Example
//!
//! ```
//! use wirestage::protocol::{decode_fixed, Frame};
//!
//! // 14 bytes of link layer, 28 bytes of payload, 4 bytes of trailer
//! let raw = [0u8; 46];
//! let frame = decode_fixed(&raw, 14, 28).unwrap();
//! assert_eq!(frame.len(), 28);
//!
//! assert!(decode_fixed(&raw, 14, 40).is_err());
//! ```

use std::time::Instant;

use bytes::Bytes;

use super::Packet;
use crate::dict::Dictionary;
use crate::error::{Error, Result};

/// One fixed-size protocol unit with its receive time.
#[derive(Debug, Clone)]
pub struct Frame {
    data: Bytes,
    received: Instant,
}

impl Frame {
    /// Create a frame received now.
    pub fn new(data: Bytes) -> Self {
        Self {
            data,
            received: Instant::now(),
        }
    }

    /// Create a frame with an explicit receive time.
    pub fn with_time(data: Bytes, received: Instant) -> Self {
        Self { data, received }
    }

    /// Frame bytes.
    #[inline]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Frame bytes as `Bytes` (cheap clone).
    #[inline]
    pub fn bytes(&self) -> Bytes {
        self.data.clone()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Monotonic receive timestamp.
    #[inline]
    pub fn received(&self) -> Instant {
        self.received
    }
}

/// Codec for one fixed-size protocol.
///
/// Codecs are marker types with associated constants and static functions, so
/// the frame size is known at compile time by every transport using them.
pub trait FrameCodec: Send + Sync + 'static {
    /// Short protocol name, used in logs and transport names.
    const NAME: &'static str;

    /// Exact size of one frame.
    const FRAME_SIZE: usize;

    /// Capture filter restricting an interface to this protocol.
    const FILTER: &'static str;

    /// Cut one frame out of a raw capture, skipping `link_offset` bytes.
    ///
    /// Only the length is checked here.
    fn decode(raw: &[u8], link_offset: usize) -> Result<Frame> {
        decode_fixed(raw, link_offset, Self::FRAME_SIZE)
    }

    /// Map a frame onto dictionary attributes.
    fn parse(frame: &Frame, dict: &Dictionary) -> Result<Packet>;

    /// Serialize a reply into exactly `FRAME_SIZE` bytes.
    fn encode(reply: &Packet, dict: &Dictionary) -> Result<Bytes>;
}

/// Copy `size` bytes starting at `link_offset` out of `raw`.
pub fn decode_fixed(raw: &[u8], link_offset: usize, size: usize) -> Result<Frame> {
    let available = raw.len().saturating_sub(link_offset);
    if available < size {
        return Err(Error::Frame(format!(
            "Packet is too small ({}) for a {} byte frame",
            available, size
        )));
    }

    Ok(Frame::new(Bytes::copy_from_slice(
        &raw[link_offset..link_offset + size],
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_fixed_strips_offset_and_trailer() {
        let mut raw = vec![0xEEu8; 14];
        raw.extend((0u8..28).collect::<Vec<_>>());
        raw.extend([0xFF; 4]);

        let frame = decode_fixed(&raw, 14, 28).unwrap();
        assert_eq!(frame.len(), 28);
        assert_eq!(frame.data()[0], 0);
        assert_eq!(frame.data()[27], 27);
    }

    #[test]
    fn test_decode_fixed_exact_size() {
        let raw = [1u8; 28];
        assert_eq!(decode_fixed(&raw, 0, 28).unwrap().len(), 28);
    }

    #[test]
    fn test_decode_fixed_too_short() {
        let raw = [0u8; 10];
        let err = decode_fixed(&raw, 0, 28).unwrap_err();
        assert!(err.to_string().contains("too small (10)"));
    }

    #[test]
    fn test_decode_fixed_offset_past_end() {
        let raw = [0u8; 10];
        assert!(decode_fixed(&raw, 14, 1).is_err());
    }

    #[test]
    fn test_frame_bytes_zero_copy() {
        let data = Bytes::from_static(b"frame");
        let frame = Frame::new(data.clone());

        assert_eq!(frame.bytes().as_ptr(), data.as_ptr());
        assert!(!frame.is_empty());
    }
}
