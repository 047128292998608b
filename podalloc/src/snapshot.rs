/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Resource snapshot builder.
//!
//! Resolves the candidate node set of a request and turns it into one
//! free-capacity [`NodeInfo`] per node:
//!
//! * a named node → exactly that node (labels are ignored);
//! * otherwise → every *available* node in the pod whose labels satisfy all
//!   constraints.
//!
//! An empty candidate set is [`AllocError::InsufficientNodes`].

use std::collections::BTreeMap;

use tracing::debug;

use crate::error::AllocError;
use crate::ports::NodeDirectory;
use crate::types::{Node, NodeInfo};

/// Resolve the candidate nodes for (`podname`, `nodename`, `labels`).
pub async fn resolve_candidates(
    directory: &dyn NodeDirectory,
    podname: &str,
    nodename: Option<&str>,
    labels: &BTreeMap<String, String>,
) -> Result<Vec<Node>, AllocError> {
    let nodes = match nodename {
        Some(name) => {
            let node = directory
                .get_node(podname, name)
                .await?
                .ok_or_else(|| AllocError::NodeNotFound {
                    pod: podname.to_string(),
                    node: name.to_string(),
                })?;
            vec![node]
        }
        None => {
            let listed = directory.list_nodes(podname).await?;
            let listed_count = listed.len();
            let kept: Vec<Node> = listed
                .into_iter()
                .filter(|n| n.available && n.matches_labels(labels))
                .collect();
            debug!(
                pod = %podname,
                listed = listed_count,
                kept = kept.len(),
                labels = ?labels,
                "label filter applied"
            );
            kept
        }
    };

    if nodes.is_empty() {
        return Err(AllocError::InsufficientNodes {
            pod: podname.to_string(),
        });
    }
    Ok(nodes)
}

/// Resolve candidates and snapshot their free CPU shares and memory.
pub async fn build(
    directory: &dyn NodeDirectory,
    podname: &str,
    nodename: Option<&str>,
    labels: &BTreeMap<String, String>,
) -> Result<Vec<NodeInfo>, AllocError> {
    let nodes = resolve_candidates(directory, podname, nodename, labels).await?;
    Ok(nodes.iter().map(NodeInfo::from_node).collect())
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cpu::CpuMap;
    use crate::store::MemStore;

    fn labels(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn store() -> MemStore {
        let cpu: CpuMap = [("0", 100u64), ("1", 100)].into_iter().collect();
        let store = MemStore::new();
        store.add_node(
            Node::new("pod1", "n1", cpu.clone(), 1024).with_labels(labels(&[("zone", "a")])),
        );
        store.add_node(
            Node::new("pod1", "n2", cpu.clone(), 2048).with_labels(labels(&[("zone", "b")])),
        );
        let mut down = Node::new("pod1", "n3", cpu.clone(), 4096)
            .with_labels(labels(&[("zone", "a")]));
        down.available = false;
        store.add_node(down);
        store.add_node(Node::new("pod2", "m1", cpu, 512));
        store
    }

    #[tokio::test]
    async fn lists_whole_pod_without_constraints() {
        let store = store();
        let nodes = build(&store, "pod1", None, &BTreeMap::new()).await.unwrap();
        let names: Vec<_> = nodes.iter().map(|n| n.name.as_str()).collect();
        assert_eq!(names, vec!["n1", "n2"], "unavailable n3 must be skipped");
    }

    #[tokio::test]
    async fn label_constraints_filter_candidates() {
        let store = store();
        let nodes = build(&store, "pod1", None, &labels(&[("zone", "b")]))
            .await
            .unwrap();
        assert_eq!(nodes.len(), 1);
        assert_eq!(nodes[0].name, "n2");
        assert_eq!(nodes[0].memory, 2048);
    }

    #[tokio::test]
    async fn no_match_is_insufficient_nodes() {
        let store = store();
        let err = build(&store, "pod1", None, &labels(&[("zone", "z")]))
            .await
            .unwrap_err();
        assert!(matches!(err, AllocError::InsufficientNodes { ref pod } if pod == "pod1"));
    }

    #[tokio::test]
    async fn named_node_ignores_labels() {
        let store = store();
        let nodes = build(&store, "pod1", Some("n1"), &labels(&[("zone", "b")]))
            .await
            .unwrap();
        assert_eq!(nodes.len(), 1);
        assert_eq!(nodes[0].name, "n1");
    }

    #[tokio::test]
    async fn named_node_must_exist_in_pod() {
        let store = store();
        let err = build(&store, "pod1", Some("m1"), &BTreeMap::new())
            .await
            .unwrap_err();
        assert!(matches!(err, AllocError::NodeNotFound { .. }));
    }

    #[tokio::test]
    async fn empty_pod_is_insufficient_nodes() {
        let store = store();
        let err = build(&store, "nope", None, &BTreeMap::new())
            .await
            .unwrap_err();
        assert!(matches!(err, AllocError::InsufficientNodes { .. }));
    }
}
