//! Per-relay exit policies.

use quick_cache::sync::Cache;
use std::collections::BTreeSet;
use std::fmt;
use std::net::IpAddr;
use std::sync::Arc;

use crate::rule::Rule;
use crate::target::{AddressPort, Destination};

/// RuleList is the immutable decision half of a policy: ordered rules,
/// the default action, and an optional memo of past answers.
///
/// A `RuleList` is shared (via `Arc`) by every snapshot that carries the
/// relay forward unchanged, so its memo survives reloads that do not
/// touch the relay's rules.
pub struct RuleList {
    rules: Vec<Rule>,
    default_allow: bool,
    /// Answers already computed for this exact rule list
    memo: Option<Cache<Destination, bool>>,
}

impl RuleList {
    /// Create a rule list. A `memo_capacity` of 0 disables memoization.
    pub fn new(rules: Vec<Rule>, default_allow: bool, memo_capacity: usize) -> Self {
        let memo = (memo_capacity > 0).then(|| Cache::new(memo_capacity));
        Self {
            rules,
            default_allow,
            memo,
        }
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn default_allow(&self) -> bool {
        self.default_allow
    }

    /// The first rule matching `dest`, in document order.
    pub fn first_match(&self, dest: Destination) -> Option<&Rule> {
        self.rules.iter().find(|rule| rule.matches(dest))
    }

    /// First-match-wins evaluation, falling back to the default action.
    pub fn evaluate(&self, dest: Destination) -> bool {
        if let Some(ref memo) = self.memo {
            if let Some(allowed) = memo.get(&dest) {
                return allowed;
            }
        }

        let allowed = self
            .first_match(dest)
            .map(Rule::is_accept)
            .unwrap_or(self.default_allow);

        if let Some(ref memo) = self.memo {
            memo.insert(dest, allowed);
        }
        allowed
    }

    /// Number of memoized answers (0 when memoization is off).
    pub fn memo_len(&self) -> usize {
        self.memo.as_ref().map(|m| m.len()).unwrap_or(0)
    }
}

impl fmt::Debug for RuleList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuleList")
            .field("rules", &self.rules)
            .field("default_allow", &self.default_allow)
            .field("memo", &self.memo.is_some())
            .finish()
    }
}

/// Policy is one relay's exit policy plus the relay's identity and
/// freshness bookkeeping.
#[derive(Debug, Clone)]
pub struct Policy {
    identity: String,
    addresses: BTreeSet<IpAddr>,
    freshness_age: u32,
    rules: Arc<RuleList>,
}

impl Policy {
    /// Create a fresh policy without memoization.
    pub fn new(
        identity: impl Into<String>,
        addresses: impl IntoIterator<Item = IpAddr>,
        rules: Vec<Rule>,
        default_allow: bool,
    ) -> Self {
        Self::from_parts(
            identity,
            addresses,
            Arc::new(RuleList::new(rules, default_allow, 0)),
            0,
        )
    }

    /// Assemble a policy from an existing (possibly shared) rule list.
    pub fn from_parts(
        identity: impl Into<String>,
        addresses: impl IntoIterator<Item = IpAddr>,
        rules: Arc<RuleList>,
        freshness_age: u32,
    ) -> Self {
        Self {
            identity: identity.into(),
            addresses: addresses.into_iter().map(|ip| ip.to_canonical()).collect(),
            freshness_age,
            rules,
        }
    }

    /// Set the freshness age.
    pub fn with_freshness_age(mut self, age: u32) -> Self {
        self.freshness_age = age;
        self
    }

    /// The relay fingerprint.
    pub fn identity(&self) -> &str {
        &self.identity
    }

    /// Every address ever observed for this relay, in ascending order.
    pub fn addresses(&self) -> &BTreeSet<IpAddr> {
        &self.addresses
    }

    /// The lowest known address; used to order snapshots.
    pub fn primary_address(&self) -> Option<IpAddr> {
        self.addresses.iter().next().copied()
    }

    /// Reload cycles since the relay was last present in the feed.
    pub fn freshness_age(&self) -> u32 {
        self.freshness_age
    }

    pub fn default_allow(&self) -> bool {
        self.rules.default_allow()
    }

    pub fn rules(&self) -> &[Rule] {
        self.rules.rules()
    }

    pub fn rule_list(&self) -> &Arc<RuleList> {
        &self.rules
    }

    /// Whether this relay would carry traffic to `target`.
    ///
    /// An unparsable target address never matches and yields `false`.
    pub fn can_exit(&self, target: &AddressPort) -> bool {
        match target.destination() {
            Some(dest) => self.can_exit_to(dest),
            None => false,
        }
    }

    /// Whether this relay would carry traffic to an already-parsed destination.
    #[inline]
    pub fn can_exit_to(&self, dest: Destination) -> bool {
        self.rules.evaluate(dest)
    }

    /// The copy of this policy kept for a cycle in which the relay was
    /// absent from the feed.
    pub(crate) fn carried_forward(&self) -> Self {
        Self {
            identity: self.identity.clone(),
            addresses: self.addresses.clone(),
            freshness_age: self.freshness_age.saturating_add(1),
            rules: Arc::clone(&self.rules),
        }
    }

    /// Add every address of `other` to this policy.
    pub(crate) fn absorb_addresses(&mut self, other: &Policy) {
        self.addresses.extend(other.addresses.iter().copied());
    }

    /// Share `prev`'s rule list, memo included, when the rules are identical.
    pub(crate) fn adopt_rules_if_unchanged(&mut self, prev: &Policy) {
        if self.default_allow() == prev.default_allow() && self.rules() == prev.rules() {
            self.rules = Arc::clone(&prev.rules);
        }
    }
}
