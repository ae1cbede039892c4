//! Link-layer framing.
//!
//! Captures arrive with whatever header the capture link type carries. Before
//! a frame can be cut out we need the offset of the network-layer payload and,
//! for filtering, the ethertype it announces.

use crate::error::{Error, Result};

/// Ethertype constants.
pub mod ethertype {
    pub const IPV4: u16 = 0x0800;
    pub const ARP: u16 = 0x0806;
    pub const RARP: u16 = 0x8035;
    pub const IPV6: u16 = 0x86DD;
    pub const VLAN: u16 = 0x8100;
    pub const QINQ: u16 = 0x88A8;
    pub const QINQ_LEGACY: u16 = 0x9100;
}

/// Capture link types (pcap `LINKTYPE_*` values).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkType {
    /// BSD loopback, 4 byte address family in host byte order.
    Null,
    /// Ethernet II, optionally with 802.1Q / 802.1ad tags.
    Ethernet,
    /// Raw IPv4 or IPv6, no link header.
    Raw,
    /// OpenBSD loopback, 4 byte address family in network byte order.
    Loop,
    /// Linux cooked capture (SLL), 16 byte header.
    LinuxSll,
}

impl LinkType {
    /// Map a pcap link type number.
    pub fn from_linktype(linktype: u32) -> Result<Self> {
        match linktype {
            0 => Ok(LinkType::Null),
            1 => Ok(LinkType::Ethernet),
            12 | 14 | 101 => Ok(LinkType::Raw),
            108 => Ok(LinkType::Loop),
            113 => Ok(LinkType::LinuxSll),
            other => Err(Error::LinkLayer(format!(
                "Unsupported link type {}",
                other
            ))),
        }
    }
}

/// Result of stripping the link layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkHeader {
    /// Offset of the network-layer payload.
    pub offset: usize,
    /// Ethertype of the payload, when it can be determined.
    pub ethertype: Option<u16>,
}

/// Compute the link-layer header length of one capture.
pub fn link_layer_offset(data: &[u8], link: LinkType) -> Result<LinkHeader> {
    match link {
        LinkType::Ethernet => ethernet(data),
        LinkType::LinuxSll => {
            need(data, 16, "Linux cooked")?;
            Ok(LinkHeader {
                offset: 16,
                ethertype: Some(u16::from_be_bytes([data[14], data[15]])),
            })
        }
        LinkType::Null | LinkType::Loop => {
            need(data, 4, "loopback")?;
            let raw = [data[0], data[1], data[2], data[3]];
            let family = if link == LinkType::Null {
                u32::from_ne_bytes(raw)
            } else {
                u32::from_be_bytes(raw)
            };
            Ok(LinkHeader {
                offset: 4,
                ethertype: address_family(family),
            })
        }
        LinkType::Raw => {
            need(data, 1, "raw IP")?;
            let ethertype = match data[0] >> 4 {
                4 => Some(ethertype::IPV4),
                6 => Some(ethertype::IPV6),
                _ => None,
            };
            Ok(LinkHeader {
                offset: 0,
                ethertype,
            })
        }
    }
}

fn ethernet(data: &[u8]) -> Result<LinkHeader> {
    need(data, 14, "Ethernet")?;

    let mut offset = 12;
    let mut ethertype = u16::from_be_bytes([data[offset], data[offset + 1]]);
    offset += 2;

    // Stacked tags: each one is TPID + TCI, the real type follows.
    while matches!(
        ethertype,
        ethertype::VLAN | ethertype::QINQ | ethertype::QINQ_LEGACY
    ) {
        need(data, offset + 4, "802.1Q")?;
        ethertype = u16::from_be_bytes([data[offset + 2], data[offset + 3]]);
        offset += 4;
    }

    Ok(LinkHeader {
        offset,
        ethertype: Some(ethertype),
    })
}

fn address_family(family: u32) -> Option<u16> {
    match family {
        2 => Some(ethertype::IPV4),
        10 | 24 | 28 | 30 => Some(ethertype::IPV6),
        _ => None,
    }
}

fn need(data: &[u8], len: usize, what: &str) -> Result<()> {
    if data.len() < len {
        return Err(Error::LinkLayer(format!(
            "Capture of {} bytes is too short for a {} header",
            data.len(),
            what
        )));
    }
    Ok(())
}
