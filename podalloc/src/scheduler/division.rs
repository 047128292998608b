/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Division strategies: turn per-node capacities into per-node deploy counts.
//!
//! Every strategy resets `deploy` to zero first and then assigns; nodes that
//! get nothing stay in the returned list with `deploy == 0` (the allocator
//! filters them).  None of them fail on insufficient capacity, they simply
//! place what fits.

use std::cmp::Ordering;

use tracing::debug;

use crate::types::NodeInfo;

fn reset(nodes: &mut [NodeInfo]) {
    for n in nodes.iter_mut() {
        n.deploy = 0;
    }
}

/// `auto`: spread `need` proportionally to capacity.
///
/// Each node first receives `floor(placed × capacity / total)`.  The
/// remainder goes one instance at a time to the largest fractional parts;
/// ties prefer the node with fewer pending instances, then the lower name.
///
/// `total` is raised to the sum of the nodes' capacities when it is smaller.
pub fn common(mut nodes: Vec<NodeInfo>, need: usize, total: usize) -> Vec<NodeInfo> {
    reset(&mut nodes);
    let total = total.max(nodes.iter().map(|n| n.capacity).sum::<usize>());
    if need == 0 || total == 0 {
        return nodes;
    }
    let placed = need.min(total);

    let mut remainders = Vec::with_capacity(nodes.len());
    let mut assigned = 0usize;
    for n in nodes.iter_mut() {
        let share = placed as u128 * n.capacity as u128;
        n.deploy = ((share / total as u128) as usize).min(n.capacity);
        assigned += n.deploy;
        remainders.push(share % total as u128);
    }

    let mut order: Vec<usize> = (0..nodes.len()).collect();
    order.sort_by(|&a, &b| {
        remainders[b]
            .cmp(&remainders[a])
            .then(nodes[a].count.cmp(&nodes[b].count))
            .then_with(|| nodes[a].name.cmp(&nodes[b].name))
    });

    let mut left = placed.saturating_sub(assigned);
    while left > 0 {
        let mut progressed = false;
        for &i in &order {
            if left == 0 {
                break;
            }
            if nodes[i].deploy < nodes[i].capacity {
                nodes[i].deploy += 1;
                left -= 1;
                progressed = true;
            }
        }
        if !progressed {
            break;
        }
    }

    debug!(need, total, placed, "common division done");
    nodes
}

/// `each`: every chosen node gets exactly `need` instances.
///
/// Only nodes with `capacity >= need` qualify.  They are ranked by fewest
/// pending instances, then largest capacity, then name; at most
/// `nodes_limit` of them are used (`0` = no limit).
pub fn each(mut nodes: Vec<NodeInfo>, need: usize, nodes_limit: usize) -> Vec<NodeInfo> {
    reset(&mut nodes);
    if need == 0 {
        return nodes;
    }

    let mut order: Vec<usize> = (0..nodes.len())
        .filter(|&i| nodes[i].capacity >= need)
        .collect();
    order.sort_by(|&a, &b| {
        nodes[a]
            .count
            .cmp(&nodes[b].count)
            .then(nodes[b].capacity.cmp(&nodes[a].capacity))
            .then_with(|| nodes[a].name.cmp(&nodes[b].name))
    });

    let take = limit(order.len(), nodes_limit);
    for &i in &order[..take] {
        nodes[i].deploy = need;
    }

    debug!(need, nodes_limit, used = take, "each division done");
    nodes
}

/// `fill`: largest capacity first, each node filled before the next one is
/// touched, at most `nodes_limit` nodes (`0` = no limit).
pub fn fill(mut nodes: Vec<NodeInfo>, need: usize, nodes_limit: usize) -> Vec<NodeInfo> {
    reset(&mut nodes);

    let mut order: Vec<usize> = (0..nodes.len())
        .filter(|&i| nodes[i].capacity > 0)
        .collect();
    order.sort_by(|&a, &b| match nodes[b].capacity.cmp(&nodes[a].capacity) {
        Ordering::Equal => nodes[a].name.cmp(&nodes[b].name),
        other => other,
    });

    let take = limit(order.len(), nodes_limit);
    let mut left = need;
    for &i in &order[..take] {
        if left == 0 {
            break;
        }
        let d = nodes[i].capacity.min(left);
        nodes[i].deploy = d;
        left -= d;
    }

    debug!(need, nodes_limit, unplaced = left, "fill division done");
    nodes
}

fn limit(available: usize, nodes_limit: usize) -> usize {
    if nodes_limit == 0 {
        available
    } else {
        nodes_limit.min(available)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn node(name: &str, capacity: usize) -> NodeInfo {
        NodeInfo {
            name: name.to_string(),
            capacity,
            deploy: capacity,
            ..Default::default()
        }
    }

    fn deploys(nodes: &[NodeInfo]) -> Vec<(String, usize)> {
        let mut v: Vec<_> = nodes.iter().map(|n| (n.name.clone(), n.deploy)).collect();
        v.sort();
        v
    }

    // ── common ────────────────────────────────────────────────────────────────

    #[test]
    fn common_splits_equal_capacity_with_name_tie_break() {
        let out = common(vec![node("b", 4), node("a", 4)], 3, 8);
        assert_eq!(deploys(&out), vec![("a".into(), 2), ("b".into(), 1)]);
    }

    #[test]
    fn common_is_proportional_to_capacity() {
        let out = common(vec![node("a", 6), node("b", 2)], 4, 8);
        assert_eq!(deploys(&out), vec![("a".into(), 3), ("b".into(), 1)]);
    }

    #[test]
    fn common_places_at_most_total() {
        let out = common(vec![node("a", 1), node("b", 2)], 10, 3);
        assert_eq!(deploys(&out), vec![("a".into(), 1), ("b".into(), 2)]);
    }

    #[test]
    fn common_tolerates_total_below_capacity_sum() {
        let out = common(vec![node("a", 4), node("b", 4)], 3, 2);
        assert_eq!(deploys(&out), vec![("a".into(), 2), ("b".into(), 1)]);
    }

    #[test]
    fn common_with_no_capacity_places_nothing() {
        let out = common(vec![node("a", 0)], 3, 0);
        assert_eq!(out[0].deploy, 0);
    }

    #[test]
    fn common_prefers_node_with_fewer_pending_on_tie() {
        let mut busy = node("a", 2);
        busy.count = 5;
        let out = common(vec![busy, node("b", 2)], 1, 4);
        assert_eq!(deploys(&out), vec![("a".into(), 0), ("b".into(), 1)]);
    }

    // ── each ──────────────────────────────────────────────────────────────────

    #[test]
    fn each_respects_nodes_limit() {
        let out = each(vec![node("a", 4), node("b", 4)], 2, 1);
        assert_eq!(deploys(&out), vec![("a".into(), 2), ("b".into(), 0)]);
    }

    #[test]
    fn each_skips_nodes_below_need() {
        let out = each(vec![node("a", 1), node("b", 3)], 2, 0);
        assert_eq!(deploys(&out), vec![("a".into(), 0), ("b".into(), 2)]);
    }

    // ── fill ──────────────────────────────────────────────────────────────────

    #[test]
    fn fill_exhausts_largest_node_first() {
        let out = fill(vec![node("a", 2), node("b", 5)], 6, 0);
        assert_eq!(deploys(&out), vec![("a".into(), 1), ("b".into(), 5)]);
    }

    #[test]
    fn fill_stops_at_nodes_limit() {
        let out = fill(vec![node("a", 2), node("b", 5)], 6, 1);
        assert_eq!(deploys(&out), vec![("a".into(), 0), ("b".into(), 5)]);
    }
}
