//! Error types for exitlist.

use thiserror::Error;

/// Error type for exitlist operations.
#[derive(Error, Debug)]
pub enum Error {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Feed is not valid JSON
    #[error("feed JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML parsing error
    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// A feed record parsed as JSON but describes an impossible policy
    #[error("malformed feed record #{index} ({identity}): {source}")]
    MalformedRecord {
        index: usize,
        identity: String,
        #[source]
        source: RecordError,
    },

    /// Download error
    #[error("download error: {0}")]
    Download(String),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// No snapshot has been published yet
    #[error("policy set not initialized")]
    NotInitialized,
}

/// Result type alias for exitlist operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for a single feed record.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RecordError {
    /// A relay must list at least one address
    #[error("relay has no addresses")]
    NoAddresses,

    /// Relay address does not parse as an IP
    #[error("invalid relay address: {0}")]
    InvalidRelayAddress(String),

    /// Non-wildcard rule without a base address
    #[error("rule {0} is not a wildcard but has no address")]
    MissingRuleAddress(usize),

    /// Rule address does not parse as an IP
    #[error("rule {rule}: invalid address {address:?}")]
    InvalidRuleAddress { rule: usize, address: String },

    /// Mask is not an IP or not a contiguous netmask
    #[error("rule {rule}: invalid mask {mask:?}")]
    InvalidMask { rule: usize, mask: String },

    /// IPv4 address with IPv6 mask or vice versa
    #[error("rule {rule}: mask {mask:?} does not match address family of {address:?}")]
    MaskFamilyMismatch {
        rule: usize,
        address: String,
        mask: String,
    },

    /// Port outside 0-65535
    #[error("rule {rule}: port {port} out of range")]
    PortOutOfRange { rule: usize, port: i64 },

    /// MinPort greater than MaxPort
    #[error("rule {rule}: inverted port range {min}-{max}")]
    InvertedPortRange { rule: usize, min: u16, max: u16 },

    /// Not of the form `accept|reject addrspec:portspec`
    #[error("invalid rule syntax: {0:?}")]
    InvalidRuleSyntax(String),
}
