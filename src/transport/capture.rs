//! Incremental pcap stream parser.
//!
//! Bytes arrive in arbitrary chunks (a FIFO written by a capture tool, a
//! growing file). The parser buffers them in a single `BytesMut` and walks a
//! small state machine:
//! - `GlobalHeader`: need the 24 byte file header (magic, link type)
//! - `RecordHeader`: need the next 16 byte record header
//! - `RecordData`: header parsed, need `caplen` more bytes

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use bytes::{Buf, Bytes, BytesMut};

use crate::error::{Error, Result};
use crate::protocol::LinkType;

pub const GLOBAL_HEADER_SIZE: usize = 24;
pub const RECORD_HEADER_SIZE: usize = 16;

/// Upper bound for one record when the file header gives no usable snaplen.
pub const MAX_RECORD_SIZE: u32 = 256 * 1024;

const MAGIC_MICROS: u32 = 0xA1B2_C3D4;
const MAGIC_NANOS: u32 = 0xA1B2_3C4D;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ByteOrder {
    Little,
    Big,
}

impl ByteOrder {
    fn u32(self, raw: &[u8]) -> u32 {
        let raw = [raw[0], raw[1], raw[2], raw[3]];
        match self {
            ByteOrder::Little => u32::from_le_bytes(raw),
            ByteOrder::Big => u32::from_be_bytes(raw),
        }
    }
}

/// Parsed pcap file header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamHeader {
    order: ByteOrder,
    nanos: bool,
    pub snaplen: u32,
    pub link_type: LinkType,
}

impl StreamHeader {
    fn decode(raw: &[u8]) -> Result<Self> {
        let (order, nanos) = match (
            u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]),
            u32::from_be_bytes([raw[0], raw[1], raw[2], raw[3]]),
        ) {
            (MAGIC_MICROS, _) => (ByteOrder::Little, false),
            (MAGIC_NANOS, _) => (ByteOrder::Little, true),
            (_, MAGIC_MICROS) => (ByteOrder::Big, false),
            (_, MAGIC_NANOS) => (ByteOrder::Big, true),
            (magic, _) => {
                return Err(Error::Capture(format!(
                    "Bad pcap magic 0x{:08x}",
                    magic
                )))
            }
        };

        let snaplen = order.u32(&raw[16..20]);
        let link_type = LinkType::from_linktype(order.u32(&raw[20..24]))?;

        Ok(Self {
            order,
            nanos,
            snaplen,
            link_type,
        })
    }

    /// Largest record this stream may legally carry.
    fn max_record(&self) -> u32 {
        if self.snaplen == 0 || self.snaplen > MAX_RECORD_SIZE {
            MAX_RECORD_SIZE
        } else {
            self.snaplen
        }
    }
}

/// One captured packet.
#[derive(Debug, Clone)]
pub struct Record {
    /// Capture timestamp.
    pub timestamp: SystemTime,
    /// Length on the wire (may exceed `data.len()` when truncated).
    pub orig_len: u32,
    /// Captured bytes, starting with the link-layer header.
    pub data: Bytes,
}

#[derive(Debug, Clone, Copy)]
enum State {
    GlobalHeader,
    RecordHeader,
    RecordData {
        timestamp: SystemTime,
        caplen: usize,
        orig_len: u32,
    },
}

/// Buffer accumulating a pcap stream and cutting it into records.
pub struct CaptureBuffer {
    buffer: BytesMut,
    state: State,
    header: Option<StreamHeader>,
}

impl CaptureBuffer {
    pub fn new() -> Self {
        Self {
            buffer: BytesMut::with_capacity(64 * 1024),
            state: State::GlobalHeader,
            header: None,
        }
    }

    /// Append raw stream bytes.
    pub fn extend(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// File header, once it has been seen.
    pub fn header(&self) -> Option<&StreamHeader> {
        self.header.as_ref()
    }

    /// Number of buffered, unconsumed bytes.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Consume the file header if it is complete and not yet parsed.
    ///
    /// Returns the header once known, `Ok(None)` while fewer than
    /// [`GLOBAL_HEADER_SIZE`] bytes are buffered.
    pub fn read_header(&mut self) -> Result<Option<StreamHeader>> {
        if let Some(header) = self.header {
            return Ok(Some(header));
        }
        if self.buffer.len() < GLOBAL_HEADER_SIZE {
            return Ok(None);
        }

        let header = StreamHeader::decode(&self.buffer[..GLOBAL_HEADER_SIZE])?;
        self.buffer.advance(GLOBAL_HEADER_SIZE);
        tracing::debug!(
            "pcap stream: link type {:?}, snaplen {}",
            header.link_type,
            header.snaplen
        );
        self.header = Some(header);
        self.state = State::RecordHeader;
        Ok(Some(header))
    }

    /// Cut the next complete record out of the buffer.
    ///
    /// Returns `Ok(None)` when more bytes are needed. An error means the
    /// stream is corrupt and cannot be resynchronised.
    pub fn next_record(&mut self) -> Result<Option<Record>> {
        loop {
            match self.state {
                State::GlobalHeader => {
                    if self.read_header()?.is_none() {
                        return Ok(None);
                    }
                }

                State::RecordHeader => {
                    let Some(header) = self.header else {
                        self.state = State::GlobalHeader;
                        continue;
                    };
                    if self.buffer.len() < RECORD_HEADER_SIZE {
                        return Ok(None);
                    }

                    let raw = &self.buffer[..RECORD_HEADER_SIZE];
                    let secs = header.order.u32(&raw[0..4]);
                    let frac = header.order.u32(&raw[4..8]);
                    let caplen = header.order.u32(&raw[8..12]);
                    let orig_len = header.order.u32(&raw[12..16]);

                    if caplen > header.max_record() {
                        return Err(Error::Capture(format!(
                            "Record length {} exceeds maximum {}",
                            caplen,
                            header.max_record()
                        )));
                    }

                    let frac = if header.nanos {
                        Duration::from_nanos(u64::from(frac))
                    } else {
                        Duration::from_micros(u64::from(frac))
                    };

                    self.buffer.advance(RECORD_HEADER_SIZE);
                    self.state = State::RecordData {
                        timestamp: UNIX_EPOCH + Duration::from_secs(u64::from(secs)) + frac,
                        caplen: caplen as usize,
                        orig_len,
                    };
                }

                State::RecordData {
                    timestamp,
                    caplen,
                    orig_len,
                } => {
                    if self.buffer.len() < caplen {
                        return Ok(None);
                    }
                    let data = self.buffer.split_to(caplen).freeze();
                    self.state = State::RecordHeader;
                    return Ok(Some(Record {
                        timestamp,
                        orig_len,
                        data,
                    }));
                }
            }
        }
    }
}

impl Default for CaptureBuffer {
    fn default() -> Self {
        Self::new()
    }
}

/// Serialize a little-endian microsecond pcap stream.
///
/// This is a fixture helper for tests and for tools that synthesise
/// captures, not part of the read path. Every record gets a one second
/// timestamp step starting at 1700000000, `caplen == orig_len`, and the
/// header carries a 65535 byte snaplen.
///
/// ```
/// use wirestage::protocol::LinkType;
/// use wirestage::transport::{write_stream, CaptureBuffer};
///
/// let mut buffer = CaptureBuffer::new();
/// buffer.extend(&write_stream(1, &[&[0u8; 42]]));
/// let record = buffer.next_record().unwrap().unwrap();
/// assert_eq!(record.data.len(), 42);
/// assert_eq!(buffer.header().unwrap().link_type, LinkType::Ethernet);
/// ```
pub fn write_stream(link_type: u32, records: &[&[u8]]) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&MAGIC_MICROS.to_le_bytes());
    out.extend_from_slice(&2u16.to_le_bytes());
    out.extend_from_slice(&4u16.to_le_bytes());
    out.extend_from_slice(&0i32.to_le_bytes());
    out.extend_from_slice(&0u32.to_le_bytes());
    out.extend_from_slice(&65535u32.to_le_bytes());
    out.extend_from_slice(&link_type.to_le_bytes());
    for (i, record) in records.iter().enumerate() {
        out.extend_from_slice(&(1_700_000_000u32 + i as u32).to_le_bytes());
        out.extend_from_slice(&0u32.to_le_bytes());
        out.extend_from_slice(&(record.len() as u32).to_le_bytes());
        out.extend_from_slice(&(record.len() as u32).to_le_bytes());
        out.extend_from_slice(record);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_chunk() {
        let stream = write_stream(1, &[&[1u8; 60], &[2u8; 42]]);
        let mut buffer = CaptureBuffer::new();
        buffer.extend(&stream);

        let first = buffer.next_record().unwrap().unwrap();
        assert_eq!(first.data.len(), 60);
        assert_eq!(first.orig_len, 60);
        assert_eq!(
            first.timestamp,
            UNIX_EPOCH + Duration::from_secs(1_700_000_000)
        );
        assert_eq!(buffer.header().unwrap().link_type, LinkType::Ethernet);

        let second = buffer.next_record().unwrap().unwrap();
        assert_eq!(second.data[..], [2u8; 42][..]);
        assert!(buffer.next_record().unwrap().is_none());
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_fragmented_byte_by_byte() {
        let stream = write_stream(1, &[&[7u8; 33]]);
        let mut buffer = CaptureBuffer::new();

        let mut records = Vec::new();
        for byte in &stream {
            buffer.extend(std::slice::from_ref(byte));
            if let Some(record) = buffer.next_record().unwrap() {
                records.push(record);
            }
        }

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].data.len(), 33);
    }

    #[test]
    fn test_big_endian_nanosecond_header() {
        let mut stream = Vec::new();
        stream.extend_from_slice(&MAGIC_NANOS.to_be_bytes());
        stream.extend_from_slice(&2u16.to_be_bytes());
        stream.extend_from_slice(&4u16.to_be_bytes());
        stream.extend_from_slice(&[0u8; 8]);
        stream.extend_from_slice(&0u32.to_be_bytes());
        stream.extend_from_slice(&113u32.to_be_bytes());
        stream.extend_from_slice(&5u32.to_be_bytes());
        stream.extend_from_slice(&1_500u32.to_be_bytes());
        stream.extend_from_slice(&3u32.to_be_bytes());
        stream.extend_from_slice(&3u32.to_be_bytes());
        stream.extend_from_slice(&[9, 9, 9]);

        let mut buffer = CaptureBuffer::new();
        buffer.extend(&stream);
        let record = buffer.next_record().unwrap().unwrap();

        assert_eq!(buffer.header().unwrap().link_type, LinkType::LinuxSll);
        assert_eq!(
            record.timestamp,
            UNIX_EPOCH + Duration::from_secs(5) + Duration::from_nanos(1_500)
        );
        assert_eq!(record.data.len(), 3);
    }

    #[test]
    fn test_header_before_records() {
        let stream = write_stream(1, &[&[3u8; 8]]);
        let mut buffer = CaptureBuffer::new();
        buffer.extend(&stream[..GLOBAL_HEADER_SIZE - 1]);
        assert!(buffer.read_header().unwrap().is_none());

        buffer.extend(&stream[GLOBAL_HEADER_SIZE - 1..]);
        let header = buffer.read_header().unwrap().unwrap();
        assert_eq!(header.link_type, LinkType::Ethernet);
        assert_eq!(header.snaplen, 65535);
        // Already parsed; does not consume record bytes.
        assert_eq!(buffer.read_header().unwrap(), Some(header));
        assert_eq!(buffer.next_record().unwrap().unwrap().data.len(), 8);
    }

    #[test]
    fn test_bad_magic() {
        let mut buffer = CaptureBuffer::new();
        buffer.extend(&[0u8; GLOBAL_HEADER_SIZE]);
        assert!(matches!(buffer.next_record(), Err(Error::Capture(_))));
    }

    #[test]
    fn test_unsupported_link_type() {
        let mut stream = write_stream(1, &[]);
        stream[20..24].copy_from_slice(&9999u32.to_le_bytes());
        let mut buffer = CaptureBuffer::new();
        buffer.extend(&stream);
        assert!(matches!(buffer.next_record(), Err(Error::LinkLayer(_))));
    }

    #[test]
    fn test_oversized_record() {
        let mut stream = write_stream(1, &[&[0u8; 4]]);
        // caplen of the first record
        stream[GLOBAL_HEADER_SIZE + 8..GLOBAL_HEADER_SIZE + 12]
            .copy_from_slice(&100_000u32.to_le_bytes());
        let mut buffer = CaptureBuffer::new();
        buffer.extend(&stream);
        assert!(matches!(buffer.next_record(), Err(Error::Capture(_))));
    }
}
