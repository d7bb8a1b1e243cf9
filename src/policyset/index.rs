//! Centered interval tree over rule port ranges.
//!
//! Every rule of every policy contributes one interval keyed by its port
//! range. Stabbing the tree with a port yields every rule whose range
//! covers it; address matching and first-match resolution happen after
//! the stab, per policy, in rule order.

use crate::policy::Policy;
use crate::target::Destination;

/// One rule (or synthetic default) of one policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Entry {
    min: u16,
    max: u16,
    policy: u32,
    /// Position within the policy; `rules().len()` marks the default
    order: u32,
}

impl Entry {
    fn key(&self) -> (u32, u32) {
        (self.policy, self.order)
    }
}

#[derive(Debug)]
struct Node {
    center: u16,
    /// Entries overlapping `center`, ascending by `min`
    by_min: Vec<u32>,
    /// The same entries, descending by `max`
    by_max: Vec<u32>,
    left: Option<Box<Node>>,
    right: Option<Box<Node>>,
}

/// IntervalIndex answers "which rules cover port p" in
/// O(log n + hits).
#[derive(Debug, Default)]
pub struct IntervalIndex {
    entries: Vec<Entry>,
    root: Option<Box<Node>>,
}

impl IntervalIndex {
    /// Build an index over `policies`. The slice must be the one later
    /// passed to [`IntervalIndex::exits`].
    pub fn build(policies: &[Policy]) -> Self {
        let mut entries = Vec::new();
        for (p, policy) in policies.iter().enumerate() {
            for (order, rule) in policy.rules().iter().enumerate() {
                entries.push(Entry {
                    min: rule.ports().min(),
                    max: rule.ports().max(),
                    policy: p as u32,
                    order: order as u32,
                });
            }
            // Nothing matched but the policy allows by default: a trailing
            // accept-everything entry keeps that answer inside the index.
            if policy.default_allow() {
                entries.push(Entry {
                    min: 0,
                    max: u16::MAX,
                    policy: p as u32,
                    order: policy.rules().len() as u32,
                });
            }
        }

        let all: Vec<u32> = (0..entries.len() as u32).collect();
        let root = build_node(&entries, all);
        Self { entries, root }
    }

    /// Number of indexed intervals, synthetic defaults included.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Every entry whose port range contains `port`, sorted by
    /// (policy, rule order).
    fn stab(&self, port: u16) -> Vec<Entry> {
        let mut hits = Vec::new();
        let mut node = self.root.as_deref();

        while let Some(n) = node {
            if port < n.center {
                hits.extend(
                    n.by_min
                        .iter()
                        .map(|&i| self.entries[i as usize])
                        .take_while(|e| e.min <= port),
                );
                node = n.left.as_deref();
            } else if port > n.center {
                hits.extend(
                    n.by_max
                        .iter()
                        .map(|&i| self.entries[i as usize])
                        .take_while(|e| e.max >= port),
                );
                node = n.right.as_deref();
            } else {
                hits.extend(n.by_min.iter().map(|&i| self.entries[i as usize]));
                break;
            }
        }

        hits.sort_unstable_by_key(Entry::key);
        hits
    }

    /// Indices of the policies that carry traffic to `dest`, ascending,
    /// limited to policies no older than `max_age`.
    pub fn exits(&self, policies: &[Policy], dest: Destination, max_age: u32) -> Vec<usize> {
        let hits = self.stab(dest.port);
        let mut out = Vec::new();

        let mut i = 0;
        while i < hits.len() {
            let policy_idx = hits[i].policy;
            let group_end = hits[i..]
                .iter()
                .position(|e| e.policy != policy_idx)
                .map(|n| i + n)
                .unwrap_or(hits.len());

            let policy = &policies[policy_idx as usize];
            if policy.freshness_age() <= max_age {
                // Port already matched; the first rule whose address also
                // matches decides, exactly as a linear scan would.
                let decision = hits[i..group_end].iter().find_map(|e| {
                    match policy.rules().get(e.order as usize) {
                        Some(rule) if rule.address().matches(dest.ip) => Some(rule.is_accept()),
                        Some(_) => None,
                        None => Some(true),
                    }
                });
                if decision == Some(true) {
                    out.push(policy_idx as usize);
                }
            }

            i = group_end;
        }

        out
    }
}

fn build_node(entries: &[Entry], ids: Vec<u32>) -> Option<Box<Node>> {
    if ids.is_empty() {
        return None;
    }

    let mut endpoints: Vec<u16> = ids
        .iter()
        .flat_map(|&i| {
            let e = &entries[i as usize];
            [e.min, e.max]
        })
        .collect();
    endpoints.sort_unstable();
    // An endpoint of some entry, so that entry overlaps the center and
    // every recursive call works on strictly fewer entries.
    let center = endpoints[endpoints.len() / 2];

    let mut left = Vec::new();
    let mut right = Vec::new();
    let mut overlap = Vec::new();
    for id in ids {
        let e = &entries[id as usize];
        if e.max < center {
            left.push(id);
        } else if e.min > center {
            right.push(id);
        } else {
            overlap.push(id);
        }
    }

    let mut by_min = overlap.clone();
    by_min.sort_unstable_by_key(|&i| entries[i as usize].min);
    let mut by_max = overlap;
    by_max.sort_unstable_by_key(|&i| std::cmp::Reverse(entries[i as usize].max));

    Some(Box::new(Node {
        center,
        by_min,
        by_max,
        left: build_node(entries, left),
        right: build_node(entries, right),
    }))
}
