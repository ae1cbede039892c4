//! Dictionary module - attribute definitions and enumerated value aliases.
//!
//! A [`Dictionary`] is built once at startup, wrapped in an `Arc` and handed
//! to the codec, the dispatch table and the pipeline. Nothing mutates it after
//! bootstrap.
//!
//! # Example
//!
//! ```
//! use wirestage::dict::{Dictionary, PACKET_TYPE};
//!
//! let dict = Dictionary::radius();
//! let packet_type = dict.attr_by_name(PACKET_TYPE).unwrap();
//!
//! assert_eq!(dict.enum_value(packet_type.id, "Accounting-Request"), Some(4));
//! assert_eq!(dict.enum_alias(packet_type.id, 5), Some("Accounting-Response"));
//! ```

mod builtin;
mod pair;

use std::collections::HashMap;
use std::fmt;

use crate::error::{Error, Result};

pub use builtin::{attrs, DO_NOT_RESPOND, DO_NOT_RESPOND_CODE, PACKET_TYPE};
pub use pair::{Pair, PairList, Value};

/// Attribute number inside one dictionary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AttrId(pub u32);

impl fmt::Display for AttrId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Data type carried by an attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueType {
    Uint8,
    Uint16,
    Uint32,
    Octets,
    String,
    Ipv4Addr,
    Ether,
}

/// One attribute definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttrDef {
    /// Attribute number.
    pub id: AttrId,
    /// Symbolic name, e.g. `Acct-Status-Type`.
    pub name: String,
    /// Data type of values.
    pub value_type: ValueType,
}

/// One enumerated value of an integer attribute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumValue {
    /// Symbolic alias, e.g. `Stop`.
    pub alias: String,
    /// Numeric value on the wire.
    pub value: u32,
}

/// Read-only attribute registry for one protocol.
#[derive(Debug, Clone)]
pub struct Dictionary {
    protocol: String,
    attrs: HashMap<AttrId, AttrDef>,
    by_name: HashMap<String, AttrId>,
    enums: HashMap<AttrId, Vec<EnumValue>>,
}

impl Dictionary {
    /// Create an empty dictionary for a protocol.
    pub fn new(protocol: &str) -> Self {
        Self {
            protocol: protocol.to_string(),
            attrs: HashMap::new(),
            by_name: HashMap::new(),
            enums: HashMap::new(),
        }
    }

    /// Protocol this dictionary describes.
    pub fn protocol(&self) -> &str {
        &self.protocol
    }

    /// Define an attribute.
    ///
    /// Fails if the number or the name is already taken.
    pub fn add_attr(&mut self, name: &str, number: u32, value_type: ValueType) -> Result<AttrId> {
        let id = AttrId(number);
        if self.attrs.contains_key(&id) {
            return Err(Error::Dictionary(format!(
                "Attribute number {} is already defined in dictionary {}",
                number, self.protocol
            )));
        }
        if self.by_name.contains_key(name) {
            return Err(Error::Dictionary(format!(
                "Attribute {} is already defined in dictionary {}",
                name, self.protocol
            )));
        }

        Ok(self.insert_attr(name, number, value_type))
    }

    /// Define an enumerated value for an integer attribute.
    pub fn add_enum(&mut self, attr: &str, alias: &str, value: u32) -> Result<()> {
        let def = self.attr_by_name(attr).ok_or_else(|| {
            Error::Dictionary(format!("No attribute {} for value {}", attr, alias))
        })?;

        if !matches!(
            def.value_type,
            ValueType::Uint8 | ValueType::Uint16 | ValueType::Uint32
        ) {
            return Err(Error::Dictionary(format!(
                "Attribute {} is not an integer, cannot name value {}",
                attr, alias
            )));
        }

        let id = def.id;
        if self.enum_value(id, alias).is_some() {
            return Err(Error::Dictionary(format!(
                "Value {} is already defined for {}",
                alias, attr
            )));
        }
        self.insert_enum(id, alias, value);
        Ok(())
    }

    /// Unchecked insert used by the built-in tables.
    fn insert_attr(&mut self, name: &str, number: u32, value_type: ValueType) -> AttrId {
        let id = AttrId(number);
        self.attrs.insert(
            id,
            AttrDef {
                id,
                name: name.to_string(),
                value_type,
            },
        );
        self.by_name.insert(name.to_string(), id);
        id
    }

    fn insert_enum(&mut self, attr: AttrId, alias: &str, value: u32) {
        self.enums.entry(attr).or_default().push(EnumValue {
            alias: alias.to_string(),
            value,
        });
    }

    /// Look up an attribute by number.
    pub fn attr(&self, id: AttrId) -> Option<&AttrDef> {
        self.attrs.get(&id)
    }

    /// Look up an attribute by name.
    pub fn attr_by_name(&self, name: &str) -> Option<&AttrDef> {
        self.by_name.get(name).and_then(|id| self.attrs.get(id))
    }

    /// Resolve an attribute that bootstrap cannot do without.
    pub fn require(&self, name: &str, value_type: ValueType) -> Result<AttrId> {
        let def = self.attr_by_name(name).ok_or_else(|| {
            Error::Dictionary(format!(
                "Failed resolving attribute {} in dictionary {}",
                name, self.protocol
            ))
        })?;

        if def.value_type != value_type {
            return Err(Error::Dictionary(format!(
                "Attribute {} has type {:?}, expected {:?}",
                name, def.value_type, value_type
            )));
        }
        Ok(def.id)
    }

    /// Symbolic alias for a numeric value.
    pub fn enum_alias(&self, attr: AttrId, value: u32) -> Option<&str> {
        self.enums
            .get(&attr)?
            .iter()
            .find(|v| v.value == value)
            .map(|v| v.alias.as_str())
    }

    /// Numeric value for a symbolic alias.
    pub fn enum_value(&self, attr: AttrId, alias: &str) -> Option<u32> {
        self.enums
            .get(&attr)?
            .iter()
            .find(|v| v.alias == alias)
            .map(|v| v.value)
    }

    /// All enumerated values of an attribute, in definition order.
    pub fn enum_values(&self, attr: AttrId) -> &[EnumValue] {
        self.enums.get(&attr).map(Vec::as_slice).unwrap_or(&[])
    }
}
