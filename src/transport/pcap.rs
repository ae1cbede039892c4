//! Capture transport reading a pcap stream bound to an interface.
//!
//! An interface name resolves to `<capture_dir>/<interface>.pcap`; a name
//! containing a `/` is used as a path directly. Regular files are read
//! inline (a growing file just reads short until more is appended), and
//! their pcap header is checked by `open`. FIFOs and other blocking streams
//! are drained by a reader thread into a bounded channel so `read` never
//! blocks the poll loop; their header is checked at the first `read`.
//!
//! Replies cannot be reinjected into a capture, so `write` succeeds without
//! sending anything.

use std::fs::File;
use std::io::{self, Read};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use bytes::{Bytes, BytesMut};
use tokio::sync::mpsc::{self, error::TryRecvError, Receiver, Sender};

use super::capture::{CaptureBuffer, GLOBAL_HEADER_SIZE};
use super::filter::CaptureFilter;
use super::{FrameSink, FrameSource, Transport};
use crate::error::{Error, Result};
use crate::protocol::{link_layer_offset, FrameCodec};

/// Size of one pull from the underlying stream.
const CHUNK_SIZE: usize = 64 * 1024;

/// Chunks a reader thread may queue ahead of `read`.
pub const PUMP_CAPACITY: usize = 16;

/// Where stream bytes come from.
enum Source {
    /// Read directly; must not block.
    Inline(Box<dyn Read + Send>),
    /// Chunks forwarded by a reader thread.
    Pumped(Receiver<io::Result<Bytes>>),
}

impl Source {
    /// Pull whatever is available. `Ok(0)` means nothing right now.
    fn pull(&mut self, buffer: &mut CaptureBuffer) -> io::Result<usize> {
        match self {
            Source::Inline(reader) => {
                let mut chunk = [0u8; CHUNK_SIZE];
                let n = match reader.read(&mut chunk) {
                    Ok(n) => n,
                    Err(e) if e.kind() == io::ErrorKind::WouldBlock => 0,
                    Err(e) if e.kind() == io::ErrorKind::Interrupted => 0,
                    Err(e) => return Err(e),
                };
                buffer.extend(&chunk[..n]);
                Ok(n)
            }
            Source::Pumped(rx) => match rx.try_recv() {
                Ok(Ok(chunk)) => {
                    buffer.extend(&chunk);
                    Ok(chunk.len())
                }
                Ok(Err(e)) => Err(e),
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => Ok(0),
            },
        }
    }
}

/// Open stream state.
struct Bound {
    interface: String,
    filter: CaptureFilter,
    source: Source,
    buffer: CaptureBuffer,
    /// Set once the stream turned out corrupt; reads return 0 afterwards.
    broken: bool,
}

/// Transport reading frames for codec `C` from a pcap stream.
pub struct PcapTransport<C: FrameCodec> {
    capture_dir: PathBuf,
    name: String,
    bound: Option<Bound>,
    _codec: PhantomData<fn() -> C>,
}

impl<C: FrameCodec> PcapTransport<C> {
    /// Create an unbound transport resolving interfaces under `capture_dir`.
    pub fn new(capture_dir: impl Into<PathBuf>) -> Self {
        Self {
            capture_dir: capture_dir.into(),
            name: format!("proto {}", C::NAME),
            bound: None,
            _codec: PhantomData,
        }
    }

    /// Bind to an already open stream instead of resolving `interface`.
    ///
    /// The reader is polled inline, so it must not block.
    pub fn attach<R>(&mut self, interface: &str, filter: &str, reader: R) -> Result<()>
    where
        R: Read + Send + 'static,
    {
        self.bind(interface, filter, Source::Inline(Box::new(reader)))
    }

    /// Bind to a stream whose reads may block, such as stdin fed by
    /// `tcpdump -w -`.
    ///
    /// The reader is drained on its own thread, at most [`PUMP_CAPACITY`]
    /// chunks ahead of `read`.
    pub fn attach_blocking<R>(&mut self, interface: &str, filter: &str, reader: R) -> Result<()>
    where
        R: Read + Send + 'static,
    {
        if self.bound.is_some() {
            return Err(Error::AlreadyOpen(self.name.clone()));
        }
        let label = interface.to_string();
        let rx = spawn_pump(label, move || Ok(reader)).map_err(|e| Error::Open {
            interface: interface.to_string(),
            reason: e.to_string(),
        })?;
        self.bind(interface, filter, Source::Pumped(rx))
    }

    /// Path an interface name resolves to.
    pub fn capture_path(&self, interface: &str) -> PathBuf {
        if interface.contains('/') {
            PathBuf::from(interface)
        } else {
            self.capture_dir.join(format!("{}.pcap", interface))
        }
    }

    pub fn is_open(&self) -> bool {
        self.bound.is_some()
    }

    fn bind(&mut self, interface: &str, filter: &str, mut source: Source) -> Result<()> {
        if self.bound.is_some() {
            return Err(Error::AlreadyOpen(self.name.clone()));
        }

        let filter = CaptureFilter::parse(filter).map_err(|e| Error::Open {
            interface: interface.to_string(),
            reason: e.to_string(),
        })?;

        let mut buffer = CaptureBuffer::new();
        if let Source::Inline(_) = source {
            read_header(&mut source, &mut buffer).map_err(|e| Error::Open {
                interface: interface.to_string(),
                reason: e.to_string(),
            })?;
        }

        self.name = format!("proto {} on interface {}", C::NAME, interface);
        self.bound = Some(Bound {
            interface: interface.to_string(),
            filter,
            source,
            buffer,
            broken: false,
        });
        tracing::debug!("Opened {}", self.name);
        Ok(())
    }
}

/// Pull from an inline source until the file header is parsed.
fn read_header(source: &mut Source, buffer: &mut CaptureBuffer) -> Result<()> {
    while buffer.read_header()?.is_none() {
        if source.pull(buffer)? == 0 {
            return Err(Error::Capture(format!(
                "Truncated pcap header ({} of {} bytes)",
                buffer.len(),
                GLOBAL_HEADER_SIZE
            )));
        }
    }
    Ok(())
}

/// Open `path`, choosing inline reads or a reader thread.
///
/// Opening a FIFO blocks until a writer shows up, so that happens on the
/// reader thread too.
fn open_source(path: &Path) -> io::Result<Source> {
    if std::fs::metadata(path)?.is_file() {
        return Ok(Source::Inline(Box::new(File::open(path)?)));
    }

    let path = path.to_path_buf();
    let label = path.display().to_string();
    let rx = spawn_pump(label, move || File::open(&path))?;
    Ok(Source::Pumped(rx))
}

/// Run `open` on a new thread and forward what the reader yields.
fn spawn_pump<R, F>(label: String, open: F) -> io::Result<Receiver<io::Result<Bytes>>>
where
    R: Read,
    F: FnOnce() -> io::Result<R> + Send + 'static,
{
    let (tx, rx) = mpsc::channel(PUMP_CAPACITY);
    std::thread::Builder::new()
        .name("wirestage-capture".to_string())
        .spawn(move || match open() {
            Ok(reader) => pump(reader, tx, label),
            Err(e) => {
                let _ = tx.blocking_send(Err(e));
            }
        })?;
    Ok(rx)
}

/// Forward chunks until EOF, an error, or the receiver is dropped.
///
/// Blocks on a full channel, so a stalled consumer stalls the reader.
fn pump<R: Read>(mut reader: R, tx: Sender<io::Result<Bytes>>, label: String) {
    let mut chunk = vec![0u8; CHUNK_SIZE];
    loop {
        match reader.read(&mut chunk) {
            Ok(0) => {
                tracing::debug!("Capture stream {} closed", label);
                return;
            }
            Ok(n) => {
                if tx
                    .blocking_send(Ok(Bytes::copy_from_slice(&chunk[..n])))
                    .is_err()
                {
                    tracing::debug!("Capture stream {} released", label);
                    return;
                }
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => {
                let _ = tx.blocking_send(Err(e));
                return;
            }
        }
    }
}

impl<C: FrameCodec> FrameSource for PcapTransport<C> {
    fn read(&mut self, buf: &mut BytesMut) -> Result<usize> {
        let name = &self.name;
        let Some(bound) = self.bound.as_mut() else {
            return Err(Error::NotOpen(name.clone()));
        };
        if bound.broken {
            return Ok(0);
        }

        loop {
            let record = match bound.buffer.next_record() {
                Ok(Some(record)) => record,
                Ok(None) => {
                    if bound.source.pull(&mut bound.buffer)? == 0 {
                        return Ok(0);
                    }
                    continue;
                }
                Err(e) => {
                    bound.broken = true;
                    return Err(e);
                }
            };

            // next_record only yields records after the file header
            let Some(link_type) = bound.buffer.header().map(|h| h.link_type) else {
                return Ok(0);
            };

            let link = match link_layer_offset(&record.data, link_type) {
                Ok(link) => link,
                Err(e) => {
                    tracing::debug!("Dropping capture on {}: {}", bound.interface, e);
                    return Ok(0);
                }
            };

            if !bound.filter.matches(link.ethertype) {
                tracing::trace!(
                    "Capture on {} with ethertype {:?} does not match '{}'",
                    bound.interface,
                    link.ethertype,
                    bound.filter
                );
                continue;
            }

            return match C::decode(&record.data, link.offset) {
                Ok(frame) => {
                    buf.extend_from_slice(frame.data());
                    Ok(frame.len())
                }
                Err(e) => {
                    tracing::debug!("Dropping capture on {}: {}", bound.interface, e);
                    Ok(0)
                }
            };
        }
    }
}

impl<C: FrameCodec> FrameSink for PcapTransport<C> {
    fn write(&mut self, frame: &[u8]) -> Result<usize> {
        if self.bound.is_none() {
            return Err(Error::NotOpen(self.name.clone()));
        }
        tracing::debug!(
            "{} cannot send, discarding {} byte reply",
            self.name,
            frame.len()
        );
        Ok(frame.len())
    }
}

impl<C: FrameCodec> Transport for PcapTransport<C> {
    type Codec = C;

    fn open(&mut self, interface: &str, filter: &str) -> Result<()> {
        if self.bound.is_some() {
            return Err(Error::AlreadyOpen(self.name.clone()));
        }
        if interface.is_empty() {
            return Err(Error::Open {
                interface: String::new(),
                reason: "no interface name".to_string(),
            });
        }

        let path = self.capture_path(interface);
        let source = open_source(&path).map_err(|e| Error::Open {
            interface: interface.to_string(),
            reason: format!("{}: {}", path.display(), e),
        })?;
        self.bind(interface, filter, source)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;
    use crate::protocol::{ethertype, ArpCodec, ARP_PACKET_SIZE};
    use crate::transport::write_stream;

    fn ethernet(proto: u16, payload: &[u8]) -> Vec<u8> {
        let mut frame = vec![0xFF; 6];
        frame.extend_from_slice(&[0x02, 0, 0, 0, 0, 1]);
        frame.extend_from_slice(&proto.to_be_bytes());
        frame.extend_from_slice(payload);
        frame
    }

    fn arp_payload() -> Vec<u8> {
        (0..ARP_PACKET_SIZE as u8).collect()
    }

    fn attached(stream: Vec<u8>) -> PcapTransport<ArpCodec> {
        let mut transport = PcapTransport::<ArpCodec>::new("/nonexistent");
        transport
            .attach("eth0", ArpCodec::FILTER, Cursor::new(stream))
            .unwrap();
        transport
    }

    #[test]
    fn test_name() {
        let mut transport = PcapTransport::<ArpCodec>::new("/tmp");
        assert_eq!(transport.name(), "proto arp");
        transport
            .attach("eth1", "arp", Cursor::new(write_stream(1, &[])))
            .unwrap();
        assert_eq!(transport.name(), "proto arp on interface eth1");
    }

    #[test]
    fn test_reads_arp_frames_and_skips_others() {
        let arp = ethernet(ethertype::ARP, &arp_payload());
        let ip = ethernet(ethertype::IPV4, &[0x45; 40]);
        let mut transport = attached(write_stream(1, &[&ip, &arp]));

        let mut buf = BytesMut::new();
        assert_eq!(transport.read(&mut buf).unwrap(), ARP_PACKET_SIZE);
        assert_eq!(&buf[..], &arp_payload()[..]);

        buf.clear();
        assert_eq!(transport.read(&mut buf).unwrap(), 0);
        assert!(buf.is_empty());
    }

    #[test]
    fn test_vlan_tagged_frame() {
        let mut tagged = vec![0xFF; 12];
        tagged.extend_from_slice(&ethertype::VLAN.to_be_bytes());
        tagged.extend_from_slice(&[0x00, 0x64]);
        tagged.extend_from_slice(&ethertype::ARP.to_be_bytes());
        tagged.extend_from_slice(&arp_payload());
        let mut transport = attached(write_stream(1, &[&tagged]));

        let mut buf = BytesMut::new();
        assert_eq!(transport.read(&mut buf).unwrap(), ARP_PACKET_SIZE);
        assert_eq!(buf[0], 0);
    }

    #[test]
    fn test_short_capture_reads_zero() {
        let short = ethernet(ethertype::ARP, &[0u8; 10]);
        let good = ethernet(ethertype::ARP, &arp_payload());
        let mut transport = attached(write_stream(1, &[&short, &good]));

        let mut buf = BytesMut::new();
        assert_eq!(transport.read(&mut buf).unwrap(), 0);
        assert_eq!(transport.read(&mut buf).unwrap(), ARP_PACKET_SIZE);
    }

    #[test]
    fn test_corrupt_stream_errors_once() {
        let mut stream = write_stream(1, &[&[0u8; 4]]);
        // caplen of the first record
        stream[GLOBAL_HEADER_SIZE + 8..GLOBAL_HEADER_SIZE + 12]
            .copy_from_slice(&u32::MAX.to_le_bytes());
        let mut transport = attached(stream);
        let mut buf = BytesMut::new();
        assert!(matches!(transport.read(&mut buf), Err(Error::Capture(_))));
        assert_eq!(transport.read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn test_double_open_rejected() {
        let mut transport = attached(write_stream(1, &[]));
        let err = transport
            .attach("eth0", "arp", Cursor::new(write_stream(1, &[])))
            .unwrap_err();
        assert!(matches!(err, Error::AlreadyOpen(_)));
        assert!(matches!(transport.open("eth0", "arp"), Err(Error::AlreadyOpen(_))));
    }

    #[test]
    fn test_invalid_filter_is_open_error() {
        let mut transport = PcapTransport::<ArpCodec>::new("/tmp");
        let err = transport
            .attach("eth0", "tcp port 53", Cursor::new(write_stream(1, &[])))
            .unwrap_err();
        assert!(matches!(err, Error::Open { .. }));
        assert!(!transport.is_open());
    }

    #[test]
    fn test_missing_capture_is_open_error() {
        let mut transport = PcapTransport::<ArpCodec>::new("/nonexistent/wirestage");
        let err = transport.open("eth9", "arp").unwrap_err();
        match err {
            Error::Open { interface, reason } => {
                assert_eq!(interface, "eth9");
                assert!(reason.contains("eth9.pcap"));
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_open_regular_file() {
        let path = std::env::temp_dir().join(format!("wirestage-{}.pcap", std::process::id()));
        let arp = ethernet(ethertype::ARP, &arp_payload());
        std::fs::write(&path, write_stream(1, &[&arp])).unwrap();

        let mut transport = PcapTransport::<ArpCodec>::new("/unused");
        transport.open(path.to_str().unwrap(), ArpCodec::FILTER).unwrap();
        let mut buf = BytesMut::new();
        let n = transport.read(&mut buf);
        let _ = std::fs::remove_file(&path);

        assert_eq!(n.unwrap(), ARP_PACKET_SIZE);
    }

    #[test]
    fn test_bad_header_is_open_error() {
        let mut transport = PcapTransport::<ArpCodec>::new("/tmp");
        let err = transport
            .attach("eth0", "arp", Cursor::new(vec![0u8; 64]))
            .unwrap_err();
        assert!(matches!(err, Error::Open { .. }));
        assert!(!transport.is_open());
        assert_eq!(transport.name(), "proto arp");

        let mut stream = write_stream(1, &[]);
        stream[20..24].copy_from_slice(&9999u32.to_le_bytes());
        let err = transport
            .attach("eth0", "arp", Cursor::new(stream))
            .unwrap_err();
        assert!(matches!(err, Error::Open { .. }));

        let truncated = write_stream(1, &[])[..10].to_vec();
        let err = transport
            .attach("eth0", "arp", Cursor::new(truncated))
            .unwrap_err();
        match err {
            Error::Open { reason, .. } => assert!(reason.contains("Truncated")),
            other => panic!("unexpected error {:?}", other),
        }

        // Still bindable after the failures.
        transport
            .attach("eth0", "arp", Cursor::new(write_stream(1, &[])))
            .unwrap();
        assert!(transport.is_open());
    }

    #[test]
    fn test_garbage_file_fails_open() {
        let path = std::env::temp_dir().join(format!("wirestage-bad-{}.pcap", std::process::id()));
        std::fs::write(&path, b"not a capture at all, just some text").unwrap();

        let mut transport = PcapTransport::<ArpCodec>::new("/unused");
        let result = transport.open(path.to_str().unwrap(), ArpCodec::FILTER);
        let _ = std::fs::remove_file(&path);

        assert!(matches!(result, Err(Error::Open { .. })));
        assert!(!transport.is_open());
    }

    fn read_eventually(transport: &mut PcapTransport<ArpCodec>, buf: &mut BytesMut) -> usize {
        for _ in 0..200 {
            let n = transport.read(buf).unwrap();
            if n > 0 {
                return n;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        0
    }

    #[test]
    fn test_blocking_reader_is_pumped() {
        let ip = ethernet(ethertype::IPV4, &[0x45; 40]);
        let arp = ethernet(ethertype::ARP, &arp_payload());
        let mut transport = PcapTransport::<ArpCodec>::new("/unused");
        transport
            .attach_blocking("eth0", ArpCodec::FILTER, Cursor::new(write_stream(1, &[&ip, &arp])))
            .unwrap();
        assert_eq!(transport.name(), "proto arp on interface eth0");

        let mut buf = BytesMut::new();
        assert_eq!(read_eventually(&mut transport, &mut buf), ARP_PACKET_SIZE);
        assert_eq!(&buf[..], &arp_payload()[..]);
        // Reader finished; the stream just reads empty.
        assert_eq!(transport.read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn test_pumped_bad_header_errors_on_read() {
        let mut transport = PcapTransport::<ArpCodec>::new("/unused");
        transport
            .attach_blocking("eth0", "arp", Cursor::new(vec![0u8; 64]))
            .unwrap();

        let mut buf = BytesMut::new();
        let mut result = Ok(0);
        for _ in 0..200 {
            result = transport.read(&mut buf);
            if !matches!(result, Ok(0)) {
                break;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        assert!(matches!(result, Err(Error::Capture(_))));
        assert_eq!(transport.read(&mut buf).unwrap(), 0);
    }

    /// Never runs dry; counts how often it was read.
    struct Endless(Arc<AtomicUsize>);

    impl Read for Endless {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            self.0.fetch_add(1, Ordering::SeqCst);
            buf.fill(0);
            Ok(buf.len())
        }
    }

    #[test]
    fn test_pump_is_bounded() {
        let reads = Arc::new(AtomicUsize::new(0));
        let mut transport = PcapTransport::<ArpCodec>::new("/unused");
        transport
            .attach_blocking("eth0", "arp", Endless(reads.clone()))
            .unwrap();

        std::thread::sleep(Duration::from_millis(200));
        let queued = reads.load(Ordering::SeqCst);
        assert!(queued >= 1);
        assert!(queued <= PUMP_CAPACITY + 2, "reader ran ahead: {}", queued);

        std::thread::sleep(Duration::from_millis(100));
        assert_eq!(reads.load(Ordering::SeqCst), queued);
        drop(transport);
    }

    #[test]
    fn test_write_is_noop_but_requires_open() {
        let mut transport = PcapTransport::<ArpCodec>::new("/tmp");
        assert!(matches!(transport.write(&[0u8; 28]), Err(Error::NotOpen(_))));

        let mut transport = attached(write_stream(1, &[]));
        assert_eq!(transport.write(&[0u8; 28]).unwrap(), 28);
    }

    #[test]
    fn test_capture_path() {
        let transport = PcapTransport::<ArpCodec>::new("/run/wirestage");
        assert_eq!(
            transport.capture_path("eth0"),
            PathBuf::from("/run/wirestage/eth0.pcap")
        );
        assert_eq!(
            transport.capture_path("/tmp/x.pcap"),
            PathBuf::from("/tmp/x.pcap")
        );
    }
}
