//! Protocol module - frames, link-layer framing and fixed-size codecs.
//!
//! This module implements everything that touches raw bytes:
//! - [`Frame`] and the [`FrameCodec`] contract shared with the transports
//! - link-layer offset computation for the capture link types we understand
//! - the ARP codec (28-byte fixed frame)

mod arp;
mod frame;
mod link;
mod packet;

pub use arp::{ArpCodec, ARP_PACKET_SIZE};
pub use frame::{decode_fixed, Frame, FrameCodec};
pub use link::{ethertype, link_layer_offset, LinkHeader, LinkType};
pub use packet::Packet;
