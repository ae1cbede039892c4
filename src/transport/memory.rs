//! In-memory transport for tests and embedding.
//!
//! Captures are queued through a [`MemoryHandle`] and replies written by the
//! listener are collected there too. Captures are Ethernet frames unless a
//! different link type is chosen.

use std::collections::VecDeque;
use std::marker::PhantomData;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use bytes::{Bytes, BytesMut};

use super::filter::CaptureFilter;
use super::{FrameSink, FrameSource, Transport};
use crate::error::{Error, Result};
use crate::protocol::{link_layer_offset, FrameCodec, LinkType};

#[derive(Default)]
struct Shared {
    inbound: VecDeque<Bytes>,
    written: Vec<Bytes>,
    opened: Option<(String, String)>,
}

/// Cloneable handle to a [`MemoryTransport`]'s queues.
#[derive(Clone, Default)]
pub struct MemoryHandle {
    shared: Arc<Mutex<Shared>>,
}

impl MemoryHandle {
    fn lock(&self) -> MutexGuard<'_, Shared> {
        self.shared.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queue a raw capture, link-layer header included.
    pub fn inject(&self, capture: impl Into<Bytes>) {
        self.lock().inbound.push_back(capture.into());
    }

    /// Queue `payload` wrapped in a broadcast Ethernet header.
    pub fn inject_ethernet(&self, ethertype: u16, payload: &[u8]) {
        let mut capture = BytesMut::with_capacity(14 + payload.len());
        capture.extend_from_slice(&[0xFF; 6]);
        capture.extend_from_slice(&[0x02, 0x00, 0x00, 0x00, 0x00, 0x01]);
        capture.extend_from_slice(&ethertype.to_be_bytes());
        capture.extend_from_slice(payload);
        self.inject(capture.freeze());
    }

    /// Captures not yet read.
    pub fn pending(&self) -> usize {
        self.lock().inbound.len()
    }

    /// Frames written so far.
    pub fn written(&self) -> Vec<Bytes> {
        self.lock().written.clone()
    }

    /// Interface and filter of the last successful `open`.
    pub fn opened(&self) -> Option<(String, String)> {
        self.lock().opened.clone()
    }
}

/// Transport backed by in-memory queues.
pub struct MemoryTransport<C: FrameCodec> {
    handle: MemoryHandle,
    link_type: LinkType,
    filter: Option<CaptureFilter>,
    refuse: Option<String>,
    name: String,
    _codec: PhantomData<fn() -> C>,
}

impl<C: FrameCodec> MemoryTransport<C> {
    pub fn new() -> Self {
        Self {
            handle: MemoryHandle::default(),
            link_type: LinkType::Ethernet,
            filter: None,
            refuse: None,
            name: format!("proto {} in memory", C::NAME),
            _codec: PhantomData,
        }
    }

    /// Treat queued captures as `link_type` instead of Ethernet.
    pub fn with_link_type(mut self, link_type: LinkType) -> Self {
        self.link_type = link_type;
        self
    }

    /// Make `open` fail with `reason`.
    pub fn refusing(mut self, reason: &str) -> Self {
        self.refuse = Some(reason.to_string());
        self
    }

    pub fn handle(&self) -> MemoryHandle {
        self.handle.clone()
    }
}

impl<C: FrameCodec> Default for MemoryTransport<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: FrameCodec> FrameSource for MemoryTransport<C> {
    fn read(&mut self, buf: &mut BytesMut) -> Result<usize> {
        let Some(filter) = &self.filter else {
            return Err(Error::NotOpen(self.name.clone()));
        };

        loop {
            let Some(capture) = self.handle.lock().inbound.pop_front() else {
                return Ok(0);
            };

            let link = match link_layer_offset(&capture, self.link_type) {
                Ok(link) => link,
                Err(e) => {
                    tracing::debug!("Dropping capture on {}: {}", self.name, e);
                    return Ok(0);
                }
            };
            if !filter.matches(link.ethertype) {
                continue;
            }

            return match C::decode(&capture, link.offset) {
                Ok(frame) => {
                    buf.extend_from_slice(frame.data());
                    Ok(frame.len())
                }
                Err(e) => {
                    tracing::debug!("Dropping capture on {}: {}", self.name, e);
                    Ok(0)
                }
            };
        }
    }
}

impl<C: FrameCodec> FrameSink for MemoryTransport<C> {
    fn write(&mut self, frame: &[u8]) -> Result<usize> {
        if self.filter.is_none() {
            return Err(Error::NotOpen(self.name.clone()));
        }
        self.handle
            .lock()
            .written
            .push(Bytes::copy_from_slice(frame));
        Ok(frame.len())
    }
}

impl<C: FrameCodec> Transport for MemoryTransport<C> {
    type Codec = C;

    fn open(&mut self, interface: &str, filter: &str) -> Result<()> {
        if self.filter.is_some() {
            return Err(Error::AlreadyOpen(self.name.clone()));
        }
        if let Some(reason) = &self.refuse {
            return Err(Error::Open {
                interface: interface.to_string(),
                reason: reason.clone(),
            });
        }

        let compiled = CaptureFilter::parse(filter).map_err(|e| Error::Open {
            interface: interface.to_string(),
            reason: e.to_string(),
        })?;

        self.filter = Some(compiled);
        self.name = format!("proto {} on interface {}", C::NAME, interface);
        self.handle.lock().opened = Some((interface.to_string(), filter.to_string()));
        Ok(())
    }

    fn name(&self) -> &str {
        &self.name
    }
}
