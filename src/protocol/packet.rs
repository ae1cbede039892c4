//! Decoded packets.

use std::time::SystemTime;

use crate::dict::PairList;

/// A decoded packet: code, correlation id and attribute pairs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Packet {
    /// Protocol code (message type), e.g. 4 for RADIUS Accounting-Request.
    pub code: u32,
    /// Correlation identifier. Protocols without one use 0.
    pub id: u32,
    /// Attributes.
    pub pairs: PairList,
    /// Set when the packet is finalized for sending.
    pub timestamp: Option<SystemTime>,
}

impl Packet {
    /// Create a packet with no attributes.
    pub fn new(code: u32, id: u32) -> Self {
        Self {
            code,
            id,
            pairs: PairList::new(),
            timestamp: None,
        }
    }

    /// Create a packet with the given attributes.
    pub fn with_pairs(code: u32, id: u32, pairs: PairList) -> Self {
        Self {
            code,
            id,
            pairs,
            timestamp: None,
        }
    }
}
