//! Exit-policy rules.
//!
//! A rule is one line of a relay's exit policy: an action, an address
//! specifier and a port range. Rules are built once when a feed is loaded
//! and never change afterwards.

mod address;
mod ports;

pub use address::AddressSpec;
pub use ports::PortRange;

use ipnet::IpNet;
use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

use crate::error::RecordError;
use crate::target::Destination;

/// Rule is a single accept/reject line of an exit policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Rule {
    accept: bool,
    address: AddressSpec,
    ports: PortRange,
}

impl Rule {
    /// Create a new rule.
    pub fn new(accept: bool, address: AddressSpec, ports: PortRange) -> Self {
        Self {
            accept,
            address,
            ports,
        }
    }

    /// The action taken when this rule matches.
    pub fn is_accept(&self) -> bool {
        self.accept
    }

    pub fn address(&self) -> &AddressSpec {
        &self.address
    }

    pub fn ports(&self) -> PortRange {
        self.ports
    }

    /// A rule matches iff both the port and the address check pass.
    #[inline]
    pub fn matches(&self, dest: Destination) -> bool {
        self.ports.contains(dest.port) && self.address.matches(dest.ip)
    }
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let action = if self.accept { "accept" } else { "reject" };
        write!(f, "{} {}:{}", action, self.address, self.ports)
    }
}

/// Parses the exit-policy line syntax, e.g. `reject 10.0.0.0/8:*` or
/// `accept [2001:db8::]/32:80-443`.
impl FromStr for Rule {
    type Err = RecordError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let syntax = || RecordError::InvalidRuleSyntax(s.to_string());

        let (action, spec) = s.trim().split_once(char::is_whitespace).ok_or_else(syntax)?;
        let accept = match action {
            "accept" => true,
            "reject" => false,
            _ => return Err(syntax()),
        };

        let (addr, ports) = spec.trim().rsplit_once(':').ok_or_else(syntax)?;
        let address = parse_addrspec(addr).ok_or_else(syntax)?;
        let ports = parse_portspec(ports).ok_or_else(syntax)?;

        Ok(Rule::new(accept, address, ports))
    }
}

fn parse_addrspec(addr: &str) -> Option<AddressSpec> {
    if addr == "*" {
        return Some(AddressSpec::Wildcard);
    }

    let (host, bits) = match addr.split_once('/') {
        Some((host, bits)) => (host, Some(bits)),
        None => (addr, None),
    };
    let host = host
        .strip_prefix('[')
        .and_then(|h| h.strip_suffix(']'))
        .unwrap_or(host);

    match bits {
        None => host
            .parse::<IpAddr>()
            .ok()
            .map(|ip| AddressSpec::Exact(ip.to_canonical())),
        Some(bits) if bits.contains('.') || bits.contains(':') => {
            AddressSpec::from_parts(0, host, Some(bits)).ok()
        }
        Some(bits) => {
            let net: IpNet = format!("{}/{}", host, bits).parse().ok()?;
            if net.prefix_len() == net.max_prefix_len() {
                Some(AddressSpec::Exact(net.addr()))
            } else {
                Some(AddressSpec::Subnet(net.trunc()))
            }
        }
    }
}

fn parse_portspec(ports: &str) -> Option<PortRange> {
    if ports == "*" {
        return Some(PortRange::new(1, u16::MAX)?);
    }
    match ports.split_once('-') {
        Some((min, max)) => PortRange::new(min.parse().ok()?, max.parse().ok()?),
        None => ports.parse().ok().map(PortRange::single),
    }
}
