/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! CPU-share maps.
//!
//! A [`CpuMap`] maps a core identifier (`"0"`, `"1"`, …) to an amount of
//! CPU-shares.  One whole core is worth `share_base` shares (see
//! [`AllocConfig::share_base`](crate::config::AllocConfig::share_base)), so a
//! quota of `0.5` cores on a base of `100` is `50` shares on a single core.
//!
//! The same type is used for three different things:
//!
//! * the free capacity of a node (`Node::cpu`, `NodeInfo::cpu`),
//! * the cores consumed by one instance (one entry of a CPU plan),
//! * the accumulated cost committed to the resource ledger.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Core identifier → CPU-shares.
///
/// `BTreeMap` so iteration (and therefore plan construction and transcript
/// output) is always ordered by core id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CpuMap(BTreeMap<String, u64>);

impl CpuMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Shares recorded for `core`, `0` when absent.
    pub fn get(&self, core: &str) -> u64 {
        self.0.get(core).copied().unwrap_or(0)
    }

    pub fn insert(&mut self, core: impl Into<String>, shares: u64) {
        self.0.insert(core.into(), shares);
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Sum of shares over every core.
    pub fn total(&self) -> u64 {
        self.0.values().sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, u64)> {
        self.0.iter().map(|(k, v)| (k.as_str(), *v))
    }

    /// Additive merge: for every core in `other`, add its shares to this map.
    ///
    /// Commutative and associative, so the order in which per-instance maps
    /// are folded into a cost never changes the result.
    pub fn add(&mut self, other: &CpuMap) {
        for (core, shares) in &other.0 {
            let slot = self.0.entry(core.clone()).or_insert(0);
            *slot = slot.saturating_add(*shares);
        }
    }

    /// Subtract `other` core by core.
    ///
    /// Returns the first core that would go negative and leaves `self`
    /// untouched in that case.
    pub fn checked_sub(&mut self, other: &CpuMap) -> Result<(), (String, u64, u64)> {
        for (core, shares) in &other.0 {
            let have = self.get(core);
            if have < *shares {
                return Err((core.clone(), have, *shares));
            }
        }
        for (core, shares) in &other.0 {
            if let Some(slot) = self.0.get_mut(core) {
                *slot -= *shares;
            }
        }
        Ok(())
    }

    /// Fold a sequence of maps into one with [`add`](Self::add).
    pub fn merge<'a>(maps: impl IntoIterator<Item = &'a CpuMap>) -> CpuMap {
        let mut acc = CpuMap::new();
        for m in maps {
            acc.add(m);
        }
        acc
    }
}

impl<K: Into<String>> FromIterator<(K, u64)> for CpuMap {
    fn from_iter<I: IntoIterator<Item = (K, u64)>>(iter: I) -> Self {
        CpuMap(iter.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }
}

impl fmt::Display for CpuMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, (core, shares)) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{core}: {shares}")?;
        }
        write!(f, "}}")
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn map(pairs: &[(&str, u64)]) -> CpuMap {
        pairs.iter().map(|(k, v)| (*k, *v)).collect()
    }

    #[test]
    fn add_sums_shares_per_core() {
        let mut a = map(&[("0", 50), ("1", 100)]);
        a.add(&map(&[("1", 20), ("2", 30)]));
        assert_eq!(a, map(&[("0", 50), ("1", 120), ("2", 30)]));
    }

    #[test]
    fn merge_is_order_independent() {
        let plans = vec![
            map(&[("0", 100)]),
            map(&[("1", 40)]),
            map(&[("0", 10), ("1", 10)]),
        ];
        let forward = CpuMap::merge(plans.iter());
        let backward = CpuMap::merge(plans.iter().rev());
        assert_eq!(forward, backward);
        assert_eq!(forward, map(&[("0", 110), ("1", 50)]));
    }

    #[test]
    fn merge_of_nothing_is_empty() {
        assert!(CpuMap::merge(std::iter::empty::<&CpuMap>()).is_empty());
    }

    #[test]
    fn checked_sub_rejects_and_leaves_map_untouched() {
        let mut free = map(&[("0", 100), ("1", 30)]);
        let err = free.checked_sub(&map(&[("0", 50), ("1", 40)])).unwrap_err();
        assert_eq!(err, ("1".to_string(), 30, 40));
        assert_eq!(free, map(&[("0", 100), ("1", 30)]));

        free.checked_sub(&map(&[("0", 50), ("1", 30)])).unwrap();
        assert_eq!(free, map(&[("0", 50), ("1", 0)]));
    }

    #[test]
    fn total_and_display() {
        let m = map(&[("1", 25), ("0", 100)]);
        assert_eq!(m.total(), 125);
        assert_eq!(m.to_string(), "{0: 100, 1: 25}");
    }
}
