//! Attribute/value pairs carried by requests and replies.

use std::fmt;
use std::net::Ipv4Addr;

use bytes::Bytes;

use super::{AttrId, ValueType};

/// A typed attribute value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Uint8(u8),
    Uint16(u16),
    Uint32(u32),
    Octets(Bytes),
    String(String),
    Ipv4Addr(Ipv4Addr),
    Ether([u8; 6]),
}

impl Value {
    /// Data type of this value.
    pub fn value_type(&self) -> ValueType {
        match self {
            Value::Uint8(_) => ValueType::Uint8,
            Value::Uint16(_) => ValueType::Uint16,
            Value::Uint32(_) => ValueType::Uint32,
            Value::Octets(_) => ValueType::Octets,
            Value::String(_) => ValueType::String,
            Value::Ipv4Addr(_) => ValueType::Ipv4Addr,
            Value::Ether(_) => ValueType::Ether,
        }
    }

    /// Widen an integer value. Non-integers return `None`.
    pub fn as_u32(&self) -> Option<u32> {
        match self {
            Value::Uint8(v) => Some(u32::from(*v)),
            Value::Uint16(v) => Some(u32::from(*v)),
            Value::Uint32(v) => Some(*v),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Uint8(v) => write!(f, "{}", v),
            Value::Uint16(v) => write!(f, "{}", v),
            Value::Uint32(v) => write!(f, "{}", v),
            Value::Octets(v) => {
                write!(f, "0x")?;
                for b in v.iter() {
                    write!(f, "{:02x}", b)?;
                }
                Ok(())
            }
            Value::String(v) => write!(f, "\"{}\"", v),
            Value::Ipv4Addr(v) => write!(f, "{}", v),
            Value::Ether(m) => write!(
                f,
                "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
                m[0], m[1], m[2], m[3], m[4], m[5]
            ),
        }
    }
}

/// One attribute with its value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pair {
    pub attr: AttrId,
    pub value: Value,
}

impl Pair {
    pub fn new(attr: AttrId, value: Value) -> Self {
        Self { attr, value }
    }
}

/// Ordered list of pairs. Duplicates are allowed; lookups return the first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PairList {
    pairs: Vec<Pair>,
}

impl PairList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a pair.
    pub fn push(&mut self, attr: AttrId, value: Value) {
        self.pairs.push(Pair::new(attr, value));
    }

    /// Replace the first pair for `attr`, or append one.
    pub fn set(&mut self, attr: AttrId, value: Value) {
        match self.pairs.iter_mut().find(|p| p.attr == attr) {
            Some(pair) => pair.value = value,
            None => self.push(attr, value),
        }
    }

    /// First value for `attr`.
    pub fn find(&self, attr: AttrId) -> Option<&Value> {
        self.pairs.iter().find(|p| p.attr == attr).map(|p| &p.value)
    }

    /// Remove every pair for `attr`, returning how many were removed.
    pub fn remove(&mut self, attr: AttrId) -> usize {
        let before = self.pairs.len();
        self.pairs.retain(|p| p.attr != attr);
        before - self.pairs.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Pair> {
        self.pairs.iter()
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}

impl FromIterator<Pair> for PairList {
    fn from_iter<I: IntoIterator<Item = Pair>>(iter: I) -> Self {
        Self {
            pairs: iter.into_iter().collect(),
        }
    }
}
