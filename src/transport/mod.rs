//! Transport module - where frames come from and where replies go.
//!
//! A transport is split into two capabilities:
//! - [`FrameSource`] - non-blocking pull of one fixed-size frame
//! - [`FrameSink`] - reinjection of one encoded reply
//!
//! [`Transport`] adds binding to an interface. Implementations:
//! - [`PcapTransport`] - pcap streams (files, FIFOs fed by a capture tool)
//! - [`MemoryTransport`] - in-memory queues

mod capture;
mod filter;
mod memory;
mod pcap;

use bytes::BytesMut;

use crate::error::Result;
use crate::protocol::FrameCodec;

pub use capture::{write_stream, CaptureBuffer, Record, StreamHeader};
pub use filter::CaptureFilter;
pub use memory::{MemoryHandle, MemoryTransport};
pub use pcap::{PcapTransport, PUMP_CAPACITY};

/// Non-blocking frame input.
pub trait FrameSource {
    /// Append the next frame to `buf` and return its length.
    ///
    /// `Ok(0)` means no frame is available right now, including captures
    /// that were too short or otherwise unusable. Errors are reserved for
    /// the stream itself failing.
    fn read(&mut self, buf: &mut BytesMut) -> Result<usize>;
}

/// Reply output.
pub trait FrameSink {
    /// Send one encoded reply. Returns the number of bytes accepted.
    fn write(&mut self, frame: &[u8]) -> Result<usize>;
}

/// A bindable frame transport, owned by exactly one listener.
pub trait Transport: FrameSource + FrameSink + Send + 'static {
    /// Codec whose frames this transport cuts out of captures.
    type Codec: FrameCodec;

    /// Bind to `interface` with capture filter `filter`.
    ///
    /// Fails with [`Error::Open`](crate::Error::Open) when the interface
    /// cannot be bound or the filter is invalid, and with
    /// [`Error::AlreadyOpen`](crate::Error::AlreadyOpen) on a second call.
    fn open(&mut self, interface: &str, filter: &str) -> Result<()>;

    /// Human readable identity, e.g. `proto arp on interface eth0`.
    fn name(&self) -> &str;
}
