//! Built-in dictionaries.
//!
//! Only the attributes the front end itself touches are defined here, plus a
//! handful of common RADIUS accounting attributes so stages have something to
//! work with. Loading full dictionaries from disk is left to the caller, who
//! can extend a built-in table with [`Dictionary::add_attr`] and
//! [`Dictionary::add_enum`].

use super::{Dictionary, ValueType};

/// Internal attribute holding a packet's code.
pub const PACKET_TYPE: &str = "Packet-Type";

/// Alias of the "do not respond" sentinel code.
pub const DO_NOT_RESPOND: &str = "Do-Not-Respond";

/// Code value of the "do not respond" sentinel.
///
/// Outside the range of any 8 or 16 bit wire code.
pub const DO_NOT_RESPOND_CODE: u32 = 256;

/// Number of the internal `Packet-Type` attribute.
const PACKET_TYPE_NUMBER: u32 = 1000;

/// Attribute names used by the built-in tables.
pub mod attrs {
    pub const USER_NAME: &str = "User-Name";
    pub const NAS_IP_ADDRESS: &str = "NAS-IP-Address";
    pub const ACCT_STATUS_TYPE: &str = "Acct-Status-Type";
    pub const ACCT_SESSION_ID: &str = "Acct-Session-Id";
    pub const ACCT_SESSION_TIME: &str = "Acct-Session-Time";
    pub const REPLY_MESSAGE: &str = "Reply-Message";

    pub const HARDWARE_FORMAT: &str = "Hardware-Format";
    pub const PROTOCOL_FORMAT: &str = "Protocol-Format";
    pub const HARDWARE_LENGTH: &str = "Hardware-Length";
    pub const PROTOCOL_LENGTH: &str = "Protocol-Length";
    pub const SENDER_HARDWARE_ADDRESS: &str = "Sender-Hardware-Address";
    pub const SENDER_PROTOCOL_ADDRESS: &str = "Sender-Protocol-Address";
    pub const TARGET_HARDWARE_ADDRESS: &str = "Target-Hardware-Address";
    pub const TARGET_PROTOCOL_ADDRESS: &str = "Target-Protocol-Address";
}

impl Dictionary {
    /// RADIUS dictionary with the accounting subset.
    pub fn radius() -> Self {
        let mut dict = Dictionary::new("radius");

        dict.insert_attr(attrs::USER_NAME, 1, ValueType::String);
        dict.insert_attr(attrs::NAS_IP_ADDRESS, 4, ValueType::Ipv4Addr);
        dict.insert_attr(attrs::REPLY_MESSAGE, 18, ValueType::String);
        let status = dict.insert_attr(attrs::ACCT_STATUS_TYPE, 40, ValueType::Uint32);
        dict.insert_attr(attrs::ACCT_SESSION_ID, 44, ValueType::String);
        dict.insert_attr(attrs::ACCT_SESSION_TIME, 46, ValueType::Uint32);
        let packet_type = dict.insert_attr(PACKET_TYPE, PACKET_TYPE_NUMBER, ValueType::Uint32);

        for (alias, value) in [
            ("Access-Request", 1),
            ("Access-Accept", 2),
            ("Access-Reject", 3),
            ("Accounting-Request", 4),
            ("Accounting-Response", 5),
            ("Access-Challenge", 11),
            ("Status-Server", 12),
            ("Disconnect-Request", 40),
            ("Disconnect-ACK", 41),
            ("Disconnect-NAK", 42),
            ("CoA-Request", 43),
            ("CoA-ACK", 44),
            ("CoA-NAK", 45),
            ("Protocol-Error", 52),
            (DO_NOT_RESPOND, DO_NOT_RESPOND_CODE),
        ] {
            dict.insert_enum(packet_type, alias, value);
        }

        for (alias, value) in [
            ("Start", 1),
            ("Stop", 2),
            ("Interim-Update", 3),
            ("Accounting-On", 7),
            ("Accounting-Off", 8),
            ("Failed", 15),
        ] {
            dict.insert_enum(status, alias, value);
        }

        dict
    }

    /// ARP dictionary: the fixed header fields plus `Packet-Type` (the opcode).
    pub fn arp() -> Self {
        let mut dict = Dictionary::new("arp");

        dict.insert_attr(attrs::HARDWARE_FORMAT, 1, ValueType::Uint16);
        dict.insert_attr(attrs::PROTOCOL_FORMAT, 2, ValueType::Uint16);
        dict.insert_attr(attrs::HARDWARE_LENGTH, 3, ValueType::Uint8);
        dict.insert_attr(attrs::PROTOCOL_LENGTH, 4, ValueType::Uint8);
        dict.insert_attr(attrs::SENDER_HARDWARE_ADDRESS, 6, ValueType::Ether);
        dict.insert_attr(attrs::SENDER_PROTOCOL_ADDRESS, 7, ValueType::Ipv4Addr);
        dict.insert_attr(attrs::TARGET_HARDWARE_ADDRESS, 8, ValueType::Ether);
        dict.insert_attr(attrs::TARGET_PROTOCOL_ADDRESS, 9, ValueType::Ipv4Addr);
        let packet_type = dict.insert_attr(PACKET_TYPE, PACKET_TYPE_NUMBER, ValueType::Uint32);

        for (alias, value) in [
            ("Request", 1),
            ("Reply", 2),
            ("Reverse-Request", 3),
            ("Reverse-Reply", 4),
            (DO_NOT_RESPOND, DO_NOT_RESPOND_CODE),
        ] {
            dict.insert_enum(packet_type, alias, value);
        }

        dict
    }
}
