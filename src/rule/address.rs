//! Address specifiers for exit-policy rules.

use ipnet::{IpNet, Ipv4Net, Ipv6Net};
use std::fmt;
use std::net::IpAddr;

use crate::error::RecordError;

/// AddressSpec is the destination-address half of an exit-policy rule.
///
/// Subnets are normalized to their network address when built, so a
/// query is a single `contains` check with no allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AddressSpec {
    /// Any IPv4 or IPv6 address
    Wildcard,
    /// Exactly one address
    Exact(IpAddr),
    /// A masked network
    Subnet(IpNet),
}

impl AddressSpec {
    /// Build a specifier from a feed rule's `Address` and optional `Mask`.
    ///
    /// `rule` is the rule's position within its policy, used for error
    /// reporting only. An empty mask is treated as no mask. A full-length
    /// mask (255.255.255.255 or all-ones IPv6) yields an exact match.
    pub fn from_parts(
        rule: usize,
        address: &str,
        mask: Option<&str>,
    ) -> Result<Self, RecordError> {
        let address = address.trim();
        let ip: IpAddr = address
            .parse()
            .map_err(|_| RecordError::InvalidRuleAddress {
                rule,
                address: address.to_string(),
            })?;

        let mask = match mask.map(str::trim) {
            Some(m) if !m.is_empty() => m,
            _ => return Ok(AddressSpec::Exact(ip.to_canonical())),
        };

        let invalid_mask = || RecordError::InvalidMask {
            rule,
            mask: mask.to_string(),
        };
        let mask_ip: IpAddr = mask.parse().map_err(|_| invalid_mask())?;

        let net = match (ip, mask_ip) {
            (IpAddr::V4(ip), IpAddr::V4(m)) => {
                let prefix = ipnet::ipv4_mask_to_prefix(m).map_err(|_| invalid_mask())?;
                IpNet::V4(Ipv4Net::new(ip, prefix).map_err(|_| invalid_mask())?.trunc())
            }
            (IpAddr::V6(ip), IpAddr::V6(m)) => {
                let prefix = ipnet::ipv6_mask_to_prefix(m).map_err(|_| invalid_mask())?;
                IpNet::V6(Ipv6Net::new(ip, prefix).map_err(|_| invalid_mask())?.trunc())
            }
            _ => {
                return Err(RecordError::MaskFamilyMismatch {
                    rule,
                    address: address.to_string(),
                    mask: mask.to_string(),
                })
            }
        };

        if net.prefix_len() == net.max_prefix_len() {
            return Ok(AddressSpec::Exact(ip));
        }
        Ok(AddressSpec::Subnet(net))
    }

    /// Check whether a destination address satisfies this specifier.
    #[inline]
    pub fn matches(&self, candidate: IpAddr) -> bool {
        match self {
            AddressSpec::Wildcard => true,
            AddressSpec::Exact(ip) => *ip == candidate,
            AddressSpec::Subnet(net) => net.contains(&candidate),
        }
    }

    /// Whether this is the wildcard specifier.
    pub fn is_wildcard(&self) -> bool {
        matches!(self, AddressSpec::Wildcard)
    }
}

impl fmt::Display for AddressSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AddressSpec::Wildcard => write!(f, "*"),
            AddressSpec::Exact(IpAddr::V4(ip)) => write!(f, "{}", ip),
            AddressSpec::Exact(IpAddr::V6(ip)) => write!(f, "[{}]", ip),
            AddressSpec::Subnet(IpNet::V4(net)) => write!(f, "{}", net),
            AddressSpec::Subnet(IpNet::V6(net)) => {
                write!(f, "[{}]/{}", net.network(), net.prefix_len())
            }
        }
    }
}
