//! Dispatch table compiled from a virtual server at bootstrap.
//!
//! Compilation checks the one mandatory stage (`recv <request>`), collects the
//! optional `send` stages and the sub-type stages, and fails the listener's
//! startup if anything the profile needs is missing.

use std::collections::HashMap;
use std::sync::Arc;

use super::profile::{Profile, ResolvedProfile};
use super::stage::{Stage, StageLookup, StageName};
use crate::dict::{Dictionary, PairList};
use crate::error::{Error, Result};

/// Category of the mandatory receive stage.
pub const RECV: &str = "recv";

/// Category of the optional reply stages.
pub const SEND: &str = "send";

/// Stages selected for one profile on one virtual server.
#[derive(Debug)]
pub struct DispatchTable {
    scope: String,
    profile: ResolvedProfile,
    dict: Arc<Dictionary>,
    recv: Arc<Stage>,
    /// Sub-type stages by attribute value.
    subtypes: HashMap<u32, Arc<Stage>>,
    /// Wildcard sub-type stage.
    subtype_default: Option<Arc<Stage>>,
    /// Send stages by reply code.
    sends: HashMap<u32, Arc<Stage>>,
}

impl DispatchTable {
    /// Compile the table for `profile` from `server`.
    pub fn compile(
        server: &dyn StageLookup,
        profile: &Profile,
        dict: Arc<Dictionary>,
    ) -> Result<Self> {
        let resolved = profile.resolve(&dict)?;

        let recv = server
            .find_stage(RECV, StageName::Named(&resolved.request))
            .ok_or_else(|| {
                Error::Config(format!(
                    "Failed to find '{} {}' section in virtual server {}",
                    RECV,
                    resolved.request,
                    server.scope()
                ))
            })?;

        let mut sends = HashMap::new();
        for (alias, code) in &resolved.sends {
            if let Some(stage) = server.find_stage(SEND, StageName::Named(alias)) {
                sends.insert(*code, stage);
            }
        }

        let mut subtypes = HashMap::new();
        let mut subtype_default = None;
        if let Some((category, attr)) = &resolved.subtype {
            for value in dict.enum_values(*attr) {
                if let Some(stage) = server.find_stage(category, StageName::Named(&value.alias)) {
                    subtypes.insert(value.value, stage);
                }
            }
            subtype_default = server.find_stage(category, StageName::Any);
        }

        tracing::debug!(
            "Compiled {} for virtual server {}: {} sub-type stage(s), {} send stage(s)",
            resolved.name,
            server.scope(),
            subtypes.len() + usize::from(subtype_default.is_some()),
            sends.len()
        );

        Ok(Self {
            scope: server.scope().to_string(),
            profile: resolved,
            dict,
            recv,
            subtypes,
            subtype_default,
            sends,
        })
    }

    /// Virtual server this table was compiled from.
    pub fn scope(&self) -> &str {
        &self.scope
    }

    pub fn profile(&self) -> &ResolvedProfile {
        &self.profile
    }

    pub fn dictionary(&self) -> &Arc<Dictionary> {
        &self.dict
    }

    /// The mandatory receive stage.
    pub fn receive(&self) -> &Arc<Stage> {
        &self.recv
    }

    /// Sub-type stage for a request's attributes.
    ///
    /// Returns `None` when the profile has no sub-type attribute, the request
    /// lacks it, its value has no alias, or neither a named nor a wildcard
    /// stage is configured.
    pub fn subtype_stage(&self, pairs: &PairList) -> Option<Arc<Stage>> {
        let (category, attr) = self.profile.subtype.as_ref()?;
        let value = pairs.find(*attr)?.as_u32()?;

        let Some(alias) = self.dict.enum_alias(*attr, value) else {
            tracing::debug!("No {} alias for value {}, skipping", category, value);
            return None;
        };

        match self.subtypes.get(&value).or(self.subtype_default.as_ref()) {
            Some(stage) => Some(stage.clone()),
            None => {
                tracing::debug!("No '{} {}' section found: Ignoring it.", category, alias);
                None
            }
        }
    }

    /// Send stage for a reply code.
    pub fn send_stage(&self, code: u32) -> Option<Arc<Stage>> {
        self.sends.get(&code).cloned()
    }

    /// Symbolic name of a packet code.
    pub fn code_name(&self, code: u32) -> Option<&str> {
        self.dict.enum_alias(self.profile.packet_type, code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dict::{attrs, Value};
    use crate::dispatch::{VirtualServer, ANY};
    use crate::pipeline::Outcome;

    fn radius() -> Arc<Dictionary> {
        Arc::new(Dictionary::radius())
    }

    fn status(dict: &Dictionary, value: u32) -> PairList {
        let attr = dict.attr_by_name(attrs::ACCT_STATUS_TYPE).unwrap().id;
        let mut pairs = PairList::new();
        pairs.push(attr, Value::Uint32(value));
        pairs
    }

    #[test]
    fn test_missing_recv_is_config_error() {
        let mut server = VirtualServer::new("acct");
        server.register("Acct-Status-Type", "Stop", |_| Outcome::Ok);

        let err =
            DispatchTable::compile(&server, &Profile::radius_accounting(), radius()).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        assert!(err
            .to_string()
            .contains("'recv Accounting-Request' section in virtual server acct"));
    }

    #[test]
    fn test_compile_collects_stages() {
        let mut server = VirtualServer::new("acct");
        let recv = server.register("recv", "Accounting-Request", |_| Outcome::Ok);
        let stop = server.register("Acct-Status-Type", "Stop", |_| Outcome::Ok);
        let send = server.declare("send", "Accounting-Response");
        server.declare("send", "Access-Accept");

        let dict = radius();
        let table =
            DispatchTable::compile(&server, &Profile::radius_accounting(), dict.clone()).unwrap();

        assert_eq!(table.scope(), "acct");
        assert_eq!(table.receive().id(), recv.id());
        assert_eq!(table.subtype_stage(&status(&dict, 2)).unwrap().id(), stop.id());
        assert!(table.subtype_stage(&status(&dict, 1)).is_none());
        assert_eq!(table.send_stage(5).unwrap().id(), send.id());
        // Not a send section of this profile.
        assert!(table.send_stage(2).is_none());
        assert_eq!(table.code_name(5), Some("Accounting-Response"));
    }

    #[test]
    fn test_wildcard_subtype_fallback() {
        let mut server = VirtualServer::new("acct");
        server.register("recv", "Accounting-Request", |_| Outcome::Ok);
        let stop = server.register("Acct-Status-Type", "Stop", |_| Outcome::Ok);
        let any = server.register("Acct-Status-Type", ANY, |_| Outcome::Ok);

        let dict = radius();
        let table =
            DispatchTable::compile(&server, &Profile::radius_accounting(), dict.clone()).unwrap();

        assert_eq!(table.subtype_stage(&status(&dict, 2)).unwrap().id(), stop.id());
        assert_eq!(table.subtype_stage(&status(&dict, 3)).unwrap().id(), any.id());
        // No alias for 99: skipped even with a wildcard.
        assert!(table.subtype_stage(&status(&dict, 99)).is_none());
        assert!(table.subtype_stage(&PairList::new()).is_none());
    }

    #[test]
    fn test_profile_without_subtype() {
        let mut server = VirtualServer::new("arp");
        server.register("recv", "Request", |_| Outcome::Ok);

        let table =
            DispatchTable::compile(&server, &Profile::arp(), Arc::new(Dictionary::arp())).unwrap();
        assert!(table.subtype_stage(&PairList::new()).is_none());
        assert!(table.send_stage(2).is_none());
    }

    #[test]
    fn test_dictionary_mismatch_is_fatal() {
        let mut server = VirtualServer::new("arp");
        server.register("recv", "Request", |_| Outcome::Ok);

        let err = DispatchTable::compile(&server, &Profile::arp(), radius()).unwrap_err();
        assert!(matches!(err, Error::Dictionary(_)));
    }
}
