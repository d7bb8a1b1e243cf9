//! Policy feed records.
//!
//! A feed is a stream of JSON objects, one per relay, separated by
//! whitespace (usually newlines). Each record is validated in full before
//! it becomes a [`Policy`]; the first bad record aborts the load.

use serde::{Deserialize, Serialize};
use std::io::Read;
use std::net::IpAddr;
use std::sync::Arc;

use crate::error::{Error, RecordError, Result};
use crate::policy::{Policy, RuleList};
use crate::rule::{AddressSpec, PortRange, Rule};

/// Relay addresses: newer feeds send a list, older ones a single string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Addresses {
    One(String),
    Many(Vec<String>),
}

impl Addresses {
    pub fn as_slice(&self) -> &[String] {
        match self {
            Addresses::One(addr) => std::slice::from_ref(addr),
            Addresses::Many(addrs) => addrs,
        }
    }
}

/// One rule as it appears in the feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RuleRecord {
    pub is_accept: bool,
    #[serde(default)]
    pub is_address_wildcard: bool,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub mask: Option<String>,
    pub min_port: i64,
    pub max_port: i64,
}

impl RuleRecord {
    /// Validate this record as rule number `index` of its policy.
    pub fn to_rule(&self, index: usize) -> std::result::Result<Rule, RecordError> {
        let ports = PortRange::from_feed(index, self.min_port, self.max_port)?;

        let address = if self.is_address_wildcard {
            AddressSpec::Wildcard
        } else {
            let base = self
                .address
                .as_deref()
                .map(str::trim)
                .filter(|a| !a.is_empty())
                .ok_or(RecordError::MissingRuleAddress(index))?;
            AddressSpec::from_parts(index, base, self.mask.as_deref())?
        };

        Ok(Rule::new(self.is_accept, address, ports))
    }
}

/// One relay as it appears in the feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PolicyRecord {
    #[serde(default)]
    pub fingerprint: String,
    pub address: Addresses,
    #[serde(default)]
    pub is_allowed_default: bool,
    #[serde(default)]
    pub tminus: u32,
    #[serde(default)]
    pub rules: Vec<RuleRecord>,
}

impl PolicyRecord {
    /// Identity used for merging: the fingerprint, or the first address
    /// for records that predate fingerprints.
    pub fn identity(&self) -> String {
        let fingerprint = self.fingerprint.trim();
        if !fingerprint.is_empty() {
            return fingerprint.to_string();
        }
        self.address
            .as_slice()
            .first()
            .map(|a| a.trim().to_string())
            .unwrap_or_default()
    }

    fn validate(&self) -> std::result::Result<(Vec<IpAddr>, Vec<Rule>), RecordError> {
        let raw = self.address.as_slice();
        if raw.is_empty() {
            return Err(RecordError::NoAddresses);
        }
        let addresses = raw
            .iter()
            .map(|a| {
                a.trim()
                    .parse::<IpAddr>()
                    .map_err(|_| RecordError::InvalidRelayAddress(a.clone()))
            })
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let rules = self
            .rules
            .iter()
            .enumerate()
            .map(|(i, r)| r.to_rule(i))
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok((addresses, rules))
    }

    /// Convert record number `index` of a feed into a policy.
    pub fn into_policy(self, index: usize, memo_capacity: usize) -> Result<Policy> {
        let identity = self.identity();
        let (addresses, rules) = self
            .validate()
            .map_err(|source| Error::MalformedRecord {
                index,
                identity: identity.clone(),
                source,
            })?;

        let rules = Arc::new(RuleList::new(rules, self.is_allowed_default, memo_capacity));
        Ok(Policy::from_parts(identity, addresses, rules, self.tminus))
    }
}

/// Stream records from a feed.
pub fn read_records<R: Read>(reader: R) -> impl Iterator<Item = Result<PolicyRecord>> {
    serde_json::Deserializer::from_reader(reader)
        .into_iter::<PolicyRecord>()
        .map(|r| r.map_err(Error::from))
}
