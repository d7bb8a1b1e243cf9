//! PolicySet snapshots and configuration.

mod config;
mod index;

pub use config::{
    EngineConfig, Strategy, DEFAULT_BULK_LIST_URL, DEFAULT_CANONICAL_ADDRESS,
    DEFAULT_CANONICAL_PORT, DEFAULT_MAX_AGE,
};
pub use index::IntervalIndex;

use ahash::{AHashMap, AHashSet};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::net::IpAddr;

use crate::policy::Policy;
use crate::target::{AddressPort, Destination};

/// One line of an enumeration: a relay address and the relay that owns it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ExitEntry<'a> {
    #[serde(rename = "Address")]
    pub address: IpAddr,
    #[serde(rename = "Fingerprint")]
    pub fingerprint: &'a str,
}

/// Per-query evaluator chosen at build time.
enum Evaluator {
    Scan,
    Index(IntervalIndex),
}

/// PolicySet is an immutable snapshot of every known relay policy.
///
/// Queries are answered in three tiers:
/// 1. `is_tor`: one hash lookup in the table precomputed for the
///    canonical target
/// 2. `can_exit`: short-circuit scan over all policies
/// 3. `enumerate`: every fresh relay address that can reach a target,
///    via the configured [`Strategy`]
pub struct PolicySet {
    /// Policies ordered by (primary address, identity)
    policies: Vec<Policy>,
    by_identity: AHashMap<String, usize>,
    evaluator: Evaluator,
    /// Canonical-target answers: address -> index into `policies`
    canonical: AHashMap<IpAddr, usize>,
    config: EngineConfig,
    built_at: DateTime<Utc>,
}

impl PolicySet {
    /// Build a snapshot. Policies are reordered deterministically and the
    /// canonical lookup table is computed before this returns.
    pub fn build(mut policies: Vec<Policy>, config: EngineConfig) -> Self {
        policies.sort_by(|a, b| {
            (a.primary_address(), a.identity()).cmp(&(b.primary_address(), b.identity()))
        });

        let by_identity = policies
            .iter()
            .enumerate()
            .map(|(i, p)| (p.identity().to_string(), i))
            .collect();

        let evaluator = match config.strategy {
            Strategy::Scan => Evaluator::Scan,
            Strategy::Index => Evaluator::Index(IntervalIndex::build(&policies)),
        };

        let mut set = Self {
            policies,
            by_identity,
            evaluator,
            canonical: AHashMap::new(),
            config,
            built_at: Utc::now(),
        };
        set.precompute_canonical();
        set
    }

    /// A snapshot with no relays; classifies everything as non-Tor.
    pub fn empty(config: EngineConfig) -> Self {
        Self::build(Vec::new(), config)
    }

    fn precompute_canonical(&mut self) {
        let target = self.config.canonical_target();
        let mut canonical = AHashMap::new();
        if let Some(dest) = target.destination() {
            for idx in self.exits(dest, self.config.max_age) {
                for &addr in self.policies[idx].addresses() {
                    canonical.entry(addr).or_insert(idx);
                }
            }
        } else {
            log::warn!("canonical target {} is not a valid address", target);
        }
        self.canonical = canonical;
    }

    /// Indices of policies that can exit to `dest`, ascending.
    fn exits(&self, dest: Destination, max_age: u32) -> Vec<usize> {
        match &self.evaluator {
            Evaluator::Scan => self
                .policies
                .iter()
                .enumerate()
                .filter(|(_, p)| p.freshness_age() <= max_age && p.can_exit_to(dest))
                .map(|(i, _)| i)
                .collect(),
            Evaluator::Index(index) => index.exits(&self.policies, dest, max_age),
        }
    }

    /// Number of relays in this snapshot.
    pub fn len(&self) -> usize {
        self.policies.len()
    }

    /// Check if this snapshot has no relays.
    pub fn is_empty(&self) -> bool {
        self.policies.is_empty()
    }

    /// All policies in enumeration order.
    pub fn policies(&self) -> &[Policy] {
        &self.policies
    }

    /// Look up a relay by fingerprint.
    pub fn get(&self, identity: &str) -> Option<&Policy> {
        self.by_identity.get(identity).map(|&i| &self.policies[i])
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn strategy(&self) -> Strategy {
        self.config.strategy
    }

    /// When this snapshot was built.
    pub fn built_at(&self) -> DateTime<Utc> {
        self.built_at
    }

    /// Number of addresses in the canonical lookup table.
    pub fn canonical_len(&self) -> usize {
        self.canonical.len()
    }

    /// Whether any relay, regardless of freshness, would carry traffic
    /// to `target`. Invalid targets yield `false`.
    pub fn can_exit(&self, target: &AddressPort) -> bool {
        match target.destination() {
            Some(dest) => self.policies.iter().any(|p| p.can_exit_to(dest)),
            None => false,
        }
    }

    /// If `address` belongs to a fresh relay that can reach the canonical
    /// target, return that relay's fingerprint.
    pub fn is_tor(&self, address: &str) -> Option<&str> {
        address
            .trim()
            .parse()
            .ok()
            .and_then(|ip| self.is_tor_ip(ip))
    }

    /// [`PolicySet::is_tor`] for an already-parsed address.
    pub fn is_tor_ip(&self, ip: IpAddr) -> Option<&str> {
        self.canonical
            .get(&ip.to_canonical())
            .map(|&i| self.policies[i].identity())
    }

    /// Every address of every relay with `freshness_age <= max_age` that
    /// can exit to `target`. Entries follow policy order, then address
    /// order; an address appears at most once.
    pub fn enumerate(&self, target: &AddressPort, max_age: u32) -> Vec<ExitEntry<'_>> {
        let dest = match target.destination() {
            Some(dest) => dest,
            None => return Vec::new(),
        };

        let mut seen = AHashSet::new();
        let mut out = Vec::new();
        for idx in self.exits(dest, max_age) {
            let policy = &self.policies[idx];
            for &address in policy.addresses() {
                if seen.insert(address) {
                    out.push(ExitEntry {
                        address,
                        fingerprint: policy.identity(),
                    });
                }
            }
        }
        out
    }
}

impl std::fmt::Debug for PolicySet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PolicySet")
            .field("relays", &self.policies.len())
            .field("canonical", &self.canonical.len())
            .field("strategy", &self.config.strategy)
            .field("built_at", &self.built_at)
            .finish()
    }
}
