//! Destination query keys.

use std::fmt;
use std::net::IpAddr;

/// Highest valid TCP port.
pub const MAX_PORT: i64 = 65535;

/// Check whether an integer is a usable port number (0-65535).
pub fn valid_port(port: i64) -> bool {
    (0..=MAX_PORT).contains(&port)
}

/// AddressPort is the destination a query asks about.
///
/// The address stays a string so that unparsable input coming from an
/// outer layer can still be represented; it is parsed once per query and
/// an address that does not parse simply never matches.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AddressPort {
    pub address: String,
    pub port: u16,
}

impl AddressPort {
    /// Create a new query key.
    pub fn new(address: impl Into<String>, port: u16) -> Self {
        Self {
            address: address.into(),
            port,
        }
    }

    /// Build a query key from an untrusted integer port.
    ///
    /// Returns `None` for ports outside 0-65535.
    pub fn checked(address: impl Into<String>, port: i64) -> Option<Self> {
        if !valid_port(port) {
            return None;
        }
        Some(Self::new(address, port as u16))
    }

    /// Parse the address part. IPv4-mapped IPv6 addresses come back as
    /// plain IPv4.
    pub fn ip(&self) -> Option<IpAddr> {
        self.address
            .trim()
            .parse::<IpAddr>()
            .ok()
            .map(|ip| ip.to_canonical())
    }

    /// Parse into the form the matching engine works on.
    pub fn destination(&self) -> Option<Destination> {
        self.ip().map(|ip| Destination { ip, port: self.port })
    }
}

impl fmt::Display for AddressPort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.address, self.port)
    }
}

/// A validated destination: parsed IP plus port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Destination {
    pub ip: IpAddr,
    pub port: u16,
}

impl Destination {
    pub fn new(ip: IpAddr, port: u16) -> Self {
        Self { ip, port }
    }
}
