//! Turning feeds into PolicySet snapshots.

use ahash::{AHashMap, AHashSet};
use std::io::Read;

use crate::error::Result;
use crate::feed::read_records;
use crate::policy::Policy;
use crate::policyset::{EngineConfig, PolicySet};

/// How a new feed relates to the snapshot currently being served.
#[derive(Debug, Clone, Copy)]
pub enum LoadMode<'a> {
    /// Discard prior state; the feed is the whole truth
    Full,
    /// Merge with the previous snapshot by relay identity
    Incremental(&'a PolicySet),
}

/// Loader parses feeds and builds snapshots with one [`EngineConfig`].
#[derive(Debug, Clone, Default)]
pub struct Loader {
    config: EngineConfig,
}

impl Loader {
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }

    /// Parse `feed` and build a new snapshot.
    ///
    /// Any malformed record fails the whole load; nothing is built.
    pub fn load<R: Read>(&self, feed: R, mode: LoadMode<'_>) -> Result<PolicySet> {
        let fresh = self.parse(feed)?;
        let fresh_count = fresh.len();

        let policies = match mode {
            LoadMode::Full => fresh,
            LoadMode::Incremental(previous) => self.merge(fresh, previous),
        };

        let set = PolicySet::build(policies, self.config.clone());
        log::info!(
            "Built policy set: {} relays ({} in feed), {} canonical addresses",
            set.len(),
            fresh_count,
            set.canonical_len()
        );
        Ok(set)
    }

    /// Parse every record, folding duplicate identities together.
    fn parse<R: Read>(&self, feed: R) -> Result<Vec<Policy>> {
        let mut policies: Vec<Policy> = Vec::new();
        let mut positions: AHashMap<String, usize> = AHashMap::new();

        for (index, record) in read_records(feed).enumerate() {
            let mut policy = record?.into_policy(index, self.config.memo_capacity)?;

            match positions.get(policy.identity()).copied() {
                Some(pos) => {
                    log::warn!(
                        "Duplicate relay {} at record #{}, later rules win",
                        policy.identity(),
                        index
                    );
                    policy.absorb_addresses(&policies[pos]);
                    policies[pos] = policy;
                }
                None => {
                    positions.insert(policy.identity().to_string(), policies.len());
                    policies.push(policy);
                }
            }
        }

        log::debug!("Parsed {} relays from feed", policies.len());
        Ok(policies)
    }

    /// Merge freshly parsed policies with the previous snapshot.
    fn merge(&self, mut fresh: Vec<Policy>, previous: &PolicySet) -> Vec<Policy> {
        for policy in fresh.iter_mut() {
            if let Some(prev) = previous.get(policy.identity()) {
                policy.absorb_addresses(prev);
                policy.adopt_rules_if_unchanged(prev);
            }
        }

        let present: AHashSet<String> = fresh.iter().map(|p| p.identity().to_string()).collect();

        let mut carried = 0usize;
        let mut evicted = 0usize;
        for prev in previous.policies() {
            if present.contains(prev.identity()) {
                continue;
            }
            let aged = prev.carried_forward();
            match self.config.evict_after {
                Some(horizon) if aged.freshness_age() > horizon => {
                    log::debug!(
                        "Evicting relay {} (age {})",
                        aged.identity(),
                        aged.freshness_age()
                    );
                    evicted += 1;
                }
                _ => {
                    fresh.push(aged);
                    carried += 1;
                }
            }
        }

        log::debug!(
            "Merged feed: {} carried forward, {} evicted",
            carried,
            evicted
        );
        fresh
    }
}
