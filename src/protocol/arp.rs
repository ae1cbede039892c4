//! ARP codec.
//!
//! Implements the 28-byte Ethernet/IPv4 ARP packet:
//! ```text
//! ┌───────┬───────┬──────┬──────┬──────┬──────────┬──────────┬──────────┬──────────┐
//! │ HTYPE │ PTYPE │ HLEN │ PLEN │ OPER │ SHA      │ SPA      │ THA      │ TPA      │
//! │ 2     │ 2     │ 1    │ 1    │ 2    │ 6        │ 4        │ 6        │ 4        │
//! └───────┴───────┴──────┴──────┴──────┴──────────┴──────────┴──────────┴──────────┘
//! ```
//!
//! All multi-byte integers are Big Endian. The opcode becomes the packet code
//! (and the `Packet-Type` attribute); the remaining fields map onto the ARP
//! dictionary attributes.

use std::net::Ipv4Addr;

use bytes::Bytes;

use super::{ethertype, Frame, FrameCodec, Packet};
use crate::dict::{attrs, AttrId, Dictionary, PairList, Value, ValueType, DO_NOT_RESPOND_CODE};
use crate::error::{Error, Result};

/// Size of an Ethernet/IPv4 ARP packet.
pub const ARP_PACKET_SIZE: usize = 28;

const HTYPE_ETHERNET: u16 = 1;
const ETHER_LEN: u8 = 6;
const IPV4_LEN: u8 = 4;

/// Codec for ARP over Ethernet.
pub struct ArpCodec;

impl FrameCodec for ArpCodec {
    const NAME: &'static str = "arp";
    const FRAME_SIZE: usize = ARP_PACKET_SIZE;
    const FILTER: &'static str = "arp";

    fn parse(frame: &Frame, dict: &Dictionary) -> Result<Packet> {
        let b = frame.data();
        if b.len() != ARP_PACKET_SIZE {
            return Err(Error::Frame(format!(
                "ARP frame must be {} bytes, got {}",
                ARP_PACKET_SIZE,
                b.len()
            )));
        }

        let hlen = b[4];
        let plen = b[5];
        if hlen != ETHER_LEN || plen != IPV4_LEN {
            return Err(Error::Frame(format!(
                "Unsupported ARP address lengths (hardware {}, protocol {})",
                hlen, plen
            )));
        }

        let fields = ArpFields::resolve(dict)?;
        let op = u16::from_be_bytes([b[6], b[7]]);

        let mut pairs = PairList::new();
        pairs.push(
            fields.hardware_format,
            Value::Uint16(u16::from_be_bytes([b[0], b[1]])),
        );
        pairs.push(
            fields.protocol_format,
            Value::Uint16(u16::from_be_bytes([b[2], b[3]])),
        );
        pairs.push(fields.hardware_length, Value::Uint8(hlen));
        pairs.push(fields.protocol_length, Value::Uint8(plen));
        pairs.push(fields.packet_type, Value::Uint32(u32::from(op)));
        pairs.push(fields.sender_hw, Value::Ether(ether(&b[8..14])));
        pairs.push(fields.sender_ip, Value::Ipv4Addr(ipv4(&b[14..18])));
        pairs.push(fields.target_hw, Value::Ether(ether(&b[18..24])));
        pairs.push(fields.target_ip, Value::Ipv4Addr(ipv4(&b[24..28])));

        Ok(Packet::with_pairs(u32::from(op), 0, pairs))
    }

    fn encode(reply: &Packet, dict: &Dictionary) -> Result<Bytes> {
        if reply.code == DO_NOT_RESPOND_CODE {
            return Err(Error::Encode(
                "Refusing to encode a do-not-respond reply".to_string(),
            ));
        }
        let op = u16::try_from(reply.code).map_err(|_| {
            Error::Encode(format!("ARP opcode {} does not fit 16 bits", reply.code))
        })?;

        let fields = ArpFields::resolve(dict)?;
        let pairs = &reply.pairs;

        let mut buf = [0u8; ARP_PACKET_SIZE];
        buf[0..2].copy_from_slice(
            &u16_field(pairs, fields.hardware_format, HTYPE_ETHERNET)?.to_be_bytes(),
        );
        buf[2..4].copy_from_slice(
            &u16_field(pairs, fields.protocol_format, ethertype::IPV4)?.to_be_bytes(),
        );
        buf[4] = ETHER_LEN;
        buf[5] = IPV4_LEN;
        buf[6..8].copy_from_slice(&op.to_be_bytes());
        buf[8..14].copy_from_slice(&ether_field(pairs, fields.sender_hw)?);
        buf[14..18].copy_from_slice(&ipv4_field(pairs, fields.sender_ip)?.octets());
        buf[18..24].copy_from_slice(&ether_field(pairs, fields.target_hw)?);
        buf[24..28].copy_from_slice(&ipv4_field(pairs, fields.target_ip)?.octets());

        Ok(Bytes::copy_from_slice(&buf))
    }
}

/// Attribute handles for the ARP header fields.
struct ArpFields {
    hardware_format: AttrId,
    protocol_format: AttrId,
    hardware_length: AttrId,
    protocol_length: AttrId,
    packet_type: AttrId,
    sender_hw: AttrId,
    sender_ip: AttrId,
    target_hw: AttrId,
    target_ip: AttrId,
}

impl ArpFields {
    fn resolve(dict: &Dictionary) -> Result<Self> {
        Ok(Self {
            hardware_format: dict.require(attrs::HARDWARE_FORMAT, ValueType::Uint16)?,
            protocol_format: dict.require(attrs::PROTOCOL_FORMAT, ValueType::Uint16)?,
            hardware_length: dict.require(attrs::HARDWARE_LENGTH, ValueType::Uint8)?,
            protocol_length: dict.require(attrs::PROTOCOL_LENGTH, ValueType::Uint8)?,
            packet_type: dict.require(crate::dict::PACKET_TYPE, ValueType::Uint32)?,
            sender_hw: dict.require(attrs::SENDER_HARDWARE_ADDRESS, ValueType::Ether)?,
            sender_ip: dict.require(attrs::SENDER_PROTOCOL_ADDRESS, ValueType::Ipv4Addr)?,
            target_hw: dict.require(attrs::TARGET_HARDWARE_ADDRESS, ValueType::Ether)?,
            target_ip: dict.require(attrs::TARGET_PROTOCOL_ADDRESS, ValueType::Ipv4Addr)?,
        })
    }
}

fn ether(b: &[u8]) -> [u8; 6] {
    [b[0], b[1], b[2], b[3], b[4], b[5]]
}

fn ipv4(b: &[u8]) -> Ipv4Addr {
    Ipv4Addr::new(b[0], b[1], b[2], b[3])
}

fn u16_field(pairs: &PairList, attr: AttrId, default: u16) -> Result<u16> {
    match pairs.find(attr) {
        None => Ok(default),
        Some(Value::Uint16(v)) => Ok(*v),
        Some(other) => Err(mistyped(attr, other)),
    }
}

fn ether_field(pairs: &PairList, attr: AttrId) -> Result<[u8; 6]> {
    match pairs.find(attr) {
        None => Ok([0; 6]),
        Some(Value::Ether(mac)) => Ok(*mac),
        Some(other) => Err(mistyped(attr, other)),
    }
}

fn ipv4_field(pairs: &PairList, attr: AttrId) -> Result<Ipv4Addr> {
    match pairs.find(attr) {
        None => Ok(Ipv4Addr::UNSPECIFIED),
        Some(Value::Ipv4Addr(ip)) => Ok(*ip),
        Some(other) => Err(mistyped(attr, other)),
    }
}

fn mistyped(attr: AttrId, value: &Value) -> Error {
    Error::Encode(format!(
        "Attribute {} has unexpected type {:?}",
        attr,
        value.value_type()
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SENDER_MAC: [u8; 6] = [0x02, 0x00, 0x00, 0x00, 0x00, 0x01];

    fn request_bytes() -> Vec<u8> {
        let mut b = Vec::with_capacity(ARP_PACKET_SIZE);
        b.extend(HTYPE_ETHERNET.to_be_bytes());
        b.extend(ethertype::IPV4.to_be_bytes());
        b.extend([ETHER_LEN, IPV4_LEN]);
        b.extend(1u16.to_be_bytes());
        b.extend(SENDER_MAC);
        b.extend([192, 168, 1, 10]);
        b.extend([0u8; 6]);
        b.extend([192, 168, 1, 1]);
        b
    }

    #[test]
    fn test_parse_request() {
        let dict = Dictionary::arp();
        let frame = ArpCodec::decode(&request_bytes(), 0).unwrap();
        let packet = ArpCodec::parse(&frame, &dict).unwrap();

        assert_eq!(packet.code, 1);
        assert_eq!(packet.pairs.len(), 9);

        let spa = dict.attr_by_name(attrs::SENDER_PROTOCOL_ADDRESS).unwrap().id;
        assert_eq!(
            packet.pairs.find(spa),
            Some(&Value::Ipv4Addr(Ipv4Addr::new(192, 168, 1, 10)))
        );
        let sha = dict.attr_by_name(attrs::SENDER_HARDWARE_ADDRESS).unwrap().id;
        assert_eq!(packet.pairs.find(sha), Some(&Value::Ether(SENDER_MAC)));
    }

    #[test]
    fn test_parse_rejects_non_ethernet_lengths() {
        let dict = Dictionary::arp();
        let mut b = request_bytes();
        b[4] = 8;
        let frame = ArpCodec::decode(&b, 0).unwrap();

        assert!(ArpCodec::parse(&frame, &dict).is_err());
    }

    #[test]
    fn test_decode_short_capture() {
        assert!(ArpCodec::decode(&[0u8; 10], 0).is_err());
        assert!(ArpCodec::decode(&request_bytes(), 1).is_err());
    }

    #[test]
    fn test_encode_reply_layout() {
        let dict = Dictionary::arp();
        let sha = dict.attr_by_name(attrs::SENDER_HARDWARE_ADDRESS).unwrap().id;
        let tpa = dict.attr_by_name(attrs::TARGET_PROTOCOL_ADDRESS).unwrap().id;

        let mut reply = Packet::new(2, 0);
        reply.pairs.push(sha, Value::Ether(SENDER_MAC));
        reply.pairs.push(tpa, Value::Ipv4Addr(Ipv4Addr::new(10, 0, 0, 7)));

        let bytes = ArpCodec::encode(&reply, &dict).unwrap();
        assert_eq!(bytes.len(), ARP_PACKET_SIZE);
        assert_eq!(&bytes[0..2], &[0x00, 0x01]);
        assert_eq!(&bytes[2..4], &[0x08, 0x00]);
        assert_eq!(&bytes[4..6], &[6, 4]);
        assert_eq!(&bytes[6..8], &[0x00, 0x02]);
        assert_eq!(&bytes[8..14], &SENDER_MAC);
        assert_eq!(&bytes[14..18], &[0, 0, 0, 0]);
        assert_eq!(&bytes[24..28], &[10, 0, 0, 7]);
    }

    #[test]
    fn test_encode_is_deterministic() {
        let dict = Dictionary::arp();
        let frame = ArpCodec::decode(&request_bytes(), 0).unwrap();
        let mut packet = ArpCodec::parse(&frame, &dict).unwrap();
        packet.code = 2;

        let first = ArpCodec::encode(&packet, &dict).unwrap();
        let second = ArpCodec::encode(&packet, &dict).unwrap();
        assert_eq!(first, second);
        assert_eq!(&first[8..], &request_bytes()[8..]);
    }

    #[test]
    fn test_encode_rejects_do_not_respond() {
        let dict = Dictionary::arp();
        let reply = Packet::new(DO_NOT_RESPOND_CODE, 0);

        assert!(ArpCodec::encode(&reply, &dict).is_err());
    }

    #[test]
    fn test_encode_rejects_mistyped_attribute() {
        let dict = Dictionary::arp();
        let spa = dict.attr_by_name(attrs::SENDER_PROTOCOL_ADDRESS).unwrap().id;
        let mut reply = Packet::new(2, 0);
        reply.pairs.push(spa, Value::String("10.0.0.1".into()));

        let err = ArpCodec::encode(&reply, &dict).unwrap_err();
        assert!(err.to_string().contains("unexpected type"));
    }

    #[test]
    fn test_encode_needs_arp_dictionary() {
        let reply = Packet::new(2, 0);
        assert!(ArpCodec::encode(&reply, &Dictionary::radius()).is_err());
    }
}
