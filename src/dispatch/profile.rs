//! Protocol profiles.
//!
//! A [`Profile`] says which request type a listener processes, which reply is
//! the canonical success for it, which `send` sections exist and which
//! attribute (if any) drives sub-type dispatch. Profiles are resolved against
//! a dictionary exactly once, at bootstrap.

use crate::dict::{AttrId, Dictionary, ValueType, DO_NOT_RESPOND, PACKET_TYPE};
use crate::error::{Error, Result};

/// Unresolved profile description.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Profile {
    /// Name used in logs.
    pub name: String,
    /// Dictionary protocol this profile expects.
    pub protocol: String,
    /// `Packet-Type` alias of the handled request, e.g. `Accounting-Request`.
    pub request: String,
    /// `Packet-Type` alias of the canonical success reply.
    pub reply: String,
    /// `Packet-Type` aliases that may have a `send` section.
    pub sends: Vec<String>,
    /// Attribute whose value selects a sub-type stage.
    pub subtype: Option<String>,
}

impl Profile {
    /// RADIUS accounting.
    pub fn radius_accounting() -> Self {
        Self {
            name: "radius_acct".to_string(),
            protocol: "radius".to_string(),
            request: "Accounting-Request".to_string(),
            reply: "Accounting-Response".to_string(),
            sends: vec![
                "Accounting-Response".to_string(),
                DO_NOT_RESPOND.to_string(),
                "Protocol-Error".to_string(),
            ],
            subtype: Some(crate::dict::attrs::ACCT_STATUS_TYPE.to_string()),
        }
    }

    /// ARP requests.
    pub fn arp() -> Self {
        Self {
            name: "arp".to_string(),
            protocol: "arp".to_string(),
            request: "Request".to_string(),
            reply: "Reply".to_string(),
            sends: vec!["Reply".to_string(), DO_NOT_RESPOND.to_string()],
            subtype: None,
        }
    }

    /// Resolve every name against `dict`.
    pub fn resolve(&self, dict: &Dictionary) -> Result<ResolvedProfile> {
        if dict.protocol() != self.protocol {
            return Err(Error::Dictionary(format!(
                "Profile {} needs the {} dictionary, got {}",
                self.name,
                self.protocol,
                dict.protocol()
            )));
        }

        let packet_type = dict.require(PACKET_TYPE, ValueType::Uint32)?;
        let code = |alias: &str| {
            dict.enum_value(packet_type, alias).ok_or_else(|| {
                Error::Dictionary(format!(
                    "No {} value {} in dictionary {}",
                    PACKET_TYPE,
                    alias,
                    dict.protocol()
                ))
            })
        };

        let request_code = code(&self.request)?;
        let reply_code = code(&self.reply)?;
        let do_not_respond = code(DO_NOT_RESPOND)?;
        let sends = self
            .sends
            .iter()
            .map(|alias| -> Result<(String, u32)> { Ok((alias.clone(), code(alias)?)) })
            .collect::<Result<Vec<_>>>()?;

        let subtype = match &self.subtype {
            Some(name) => {
                let def = dict.attr_by_name(name).ok_or_else(|| {
                    Error::Dictionary(format!(
                        "Failed resolving attribute {} in dictionary {}",
                        name,
                        dict.protocol()
                    ))
                })?;
                Some((def.name.clone(), def.id))
            }
            None => None,
        };

        Ok(ResolvedProfile {
            name: self.name.clone(),
            request: self.request.clone(),
            packet_type,
            request_code,
            reply_code,
            do_not_respond,
            sends,
            subtype,
        })
    }
}

/// A profile with every name resolved to dictionary handles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedProfile {
    pub name: String,
    /// Alias of the handled request type (the `recv` section name).
    pub request: String,
    /// The `Packet-Type` attribute.
    pub packet_type: AttrId,
    pub request_code: u32,
    pub reply_code: u32,
    pub do_not_respond: u32,
    /// `(alias, code)` of every possible `send` section.
    pub sends: Vec<(String, u32)>,
    /// `(category name, attribute)` for sub-type dispatch.
    pub subtype: Option<(String, AttrId)>,
}
