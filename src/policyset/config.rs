//! PolicySet configuration types.

use serde::{Deserialize, Serialize};

use crate::target::AddressPort;

/// Address of the server the hot-path lookup table is computed for.
pub const DEFAULT_CANONICAL_ADDRESS: &str = "38.229.70.31";

/// Port of the canonical target.
pub const DEFAULT_CANONICAL_PORT: u16 = 443;

/// Relays absent from more than this many consecutive feeds stop being
/// reported by the canonical lookup.
pub const DEFAULT_MAX_AGE: u32 = 16;

/// Base URL printed in the bulk-list header.
pub const DEFAULT_BULK_LIST_URL: &str = "https://check.torproject.org/cgi-bin/TorBulkExitList.py";

/// How a snapshot answers "which relays can exit to this destination".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    /// Evaluate every policy in order
    #[default]
    Scan,
    /// Stab an interval index over rule port ranges
    Index,
}

impl Strategy {
    /// Get the internal name of this strategy.
    pub fn name(&self) -> &'static str {
        match self {
            Strategy::Scan => "scan",
            Strategy::Index => "index",
        }
    }

    /// Parse a strategy from a string.
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "scan" | "linear" => Some(Strategy::Scan),
            "index" | "interval" | "tree" => Some(Strategy::Index),
            _ => None,
        }
    }
}

/// Configuration shared by every snapshot built from the same feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Address of the canonical target
    pub canonical_address: String,
    /// Port of the canonical target
    pub canonical_port: u16,
    /// Freshness cut-off used for the canonical lookup table
    pub max_age: u32,
    /// Evaluation strategy for enumerations
    pub strategy: Strategy,
    /// Per-policy memo entries; 0 disables memoization
    pub memo_capacity: usize,
    /// Drop carried-forward relays older than this many cycles
    pub evict_after: Option<u32>,
    /// Base URL shown in text dumps
    pub bulk_list_url: String,
}

impl EngineConfig {
    /// The destination the canonical lookup table answers for.
    pub fn canonical_target(&self) -> AddressPort {
        AddressPort::new(self.canonical_address.clone(), self.canonical_port)
    }

    pub fn with_strategy(mut self, strategy: Strategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_max_age(mut self, max_age: u32) -> Self {
        self.max_age = max_age;
        self
    }

    pub fn with_canonical_target(mut self, target: &AddressPort) -> Self {
        self.canonical_address = target.address.clone();
        self.canonical_port = target.port;
        self
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            canonical_address: DEFAULT_CANONICAL_ADDRESS.to_string(),
            canonical_port: DEFAULT_CANONICAL_PORT,
            max_age: DEFAULT_MAX_AGE,
            strategy: Strategy::default(),
            memo_capacity: 0,
            evict_after: None,
            bulk_list_url: DEFAULT_BULK_LIST_URL.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strategy_names() {
        assert_eq!(Strategy::Scan.name(), "scan");
        assert_eq!(Strategy::Index.name(), "index");
        assert_eq!(Strategy::default(), Strategy::Scan);
    }

    #[test]
    fn test_strategy_from_str() {
        assert_eq!(Strategy::from_str("scan"), Some(Strategy::Scan));
        assert_eq!(Strategy::from_str("INDEX"), Some(Strategy::Index));
        assert_eq!(Strategy::from_str("interval"), Some(Strategy::Index));
        assert_eq!(Strategy::from_str("unknown"), None);
    }

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(
            config.canonical_target(),
            AddressPort::new("38.229.70.31", 443)
        );
        assert_eq!(config.max_age, 16);
        assert_eq!(config.memo_capacity, 0);
        assert!(config.evict_after.is_none());
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let config: EngineConfig =
            serde_yaml::from_str("strategy: index\nmax_age: 4\n").unwrap();
        assert_eq!(config.strategy, Strategy::Index);
        assert_eq!(config.max_age, 4);
        assert_eq!(config.canonical_port, 443);
        assert_eq!(config.bulk_list_url, DEFAULT_BULK_LIST_URL);
    }
}
