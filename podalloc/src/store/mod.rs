/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! In-memory cluster state store.
//!
//! [`MemStore`] implements every state capability the allocator consumes:
//!
//! | Capability | Backing map |
//! |---|---|
//! | [`NodeDirectory`] | `nodes` keyed by (pod, node) |
//! | [`ResourceLedger`] | same entries, free figures updated under the shard lock |
//! | [`ProcessingStore`] | `processing` keyed by [`ProcessingRecord::key`] |
//! | [`PendingMerger`] | reads `processing` |
//!
//! Ledger deltas are applied while holding the entry's shard lock, so two
//! deltas on one node never interleave and a reserving delta that would drive
//! free capacity below zero is rejected as a whole.

pub mod lock;

pub use lock::MemLockService;

use async_trait::async_trait;
use dashmap::DashMap;
use tracing::debug;

use crate::config::ClusterConfig;
use crate::cpu::CpuMap;
use crate::ports::{
    NodeDirectory, PendingMerger, ProcessingStore, ResourceLedger, StoreError, StoreResult,
};
use crate::types::{processing_key, DeployOptions, Node, NodeInfo, ProcessingRecord, Sign};

type NodeKey = (String, String);

fn node_key(podname: &str, nodename: &str) -> NodeKey {
    (podname.to_string(), nodename.to_string())
}

#[derive(Debug, Default)]
pub struct MemStore {
    nodes: DashMap<NodeKey, Node>,
    processing: DashMap<String, ProcessingRecord>,
}

impl MemStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_cluster(cluster: &ClusterConfig) -> Self {
        let store = Self::new();
        for node in &cluster.nodes {
            store.add_node(node.clone());
        }
        store
    }

    /// Register (or replace) a node.
    pub fn add_node(&self, node: Node) {
        self.nodes
            .insert(node_key(&node.podname, &node.name), node);
    }

    /// Current state of a node, including its free figures.
    pub fn node(&self, podname: &str, nodename: &str) -> Option<Node> {
        self.nodes
            .get(&node_key(podname, nodename))
            .map(|n| n.value().clone())
    }

    /// Every processing record, ordered by key.
    pub fn processing_records(&self) -> Vec<ProcessingRecord> {
        let mut records: Vec<ProcessingRecord> =
            self.processing.iter().map(|r| r.value().clone()).collect();
        records.sort_by_key(|r| r.key());
        records
    }
}

#[async_trait]
impl NodeDirectory for MemStore {
    async fn list_nodes(&self, podname: &str) -> StoreResult<Vec<Node>> {
        let mut nodes: Vec<Node> = self
            .nodes
            .iter()
            .filter(|e| e.key().0 == podname)
            .map(|e| e.value().clone())
            .collect();
        nodes.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(nodes)
    }

    async fn get_node(&self, podname: &str, nodename: &str) -> StoreResult<Option<Node>> {
        Ok(self.node(podname, nodename))
    }
}

#[async_trait]
impl PendingMerger for MemStore {
    /// Free figures already reflect every ledger commit, so the merge only
    /// has to report how many instances of the same entrypoint each node
    /// already holds in processing records.
    async fn apply_pending(
        &self,
        opts: &DeployOptions,
        mut nodes: Vec<NodeInfo>,
    ) -> StoreResult<Vec<NodeInfo>> {
        for node in nodes.iter_mut() {
            node.count = self
                .processing
                .iter()
                .filter(|r| {
                    let r = r.value();
                    r.podname == opts.podname
                        && r.appname == opts.appname
                        && r.entrypoint == opts.entrypoint
                        && r.nodename == node.name
                })
                .map(|r| r.value().count)
                .sum();
            if node.count > 0 {
                debug!(node = %node.name, pending = node.count, "pending instances merged");
            }
        }
        Ok(nodes)
    }
}

#[async_trait]
impl ResourceLedger for MemStore {
    async fn commit_delta(
        &self,
        podname: &str,
        nodename: &str,
        cpu: &CpuMap,
        memory: u64,
        sign: Sign,
    ) -> StoreResult<()> {
        let mut entry = self
            .nodes
            .get_mut(&node_key(podname, nodename))
            .ok_or_else(|| StoreError::NodeNotFound {
                pod: podname.to_string(),
                node: nodename.to_string(),
            })?;
        let node = entry.value_mut();

        match sign {
            Sign::Reserve => {
                if node.memory < memory {
                    return Err(StoreError::Overcommit {
                        node: nodename.to_string(),
                        resource: "memory".to_string(),
                        available: node.memory,
                        requested: memory,
                    });
                }
                node.cpu
                    .checked_sub(cpu)
                    .map_err(|(core, available, requested)| StoreError::Overcommit {
                        node: nodename.to_string(),
                        resource: format!("cpu core {core}"),
                        available,
                        requested,
                    })?;
                node.memory -= memory;
            }
            Sign::Release => {
                node.cpu.add(cpu);
                node.memory = node.memory.saturating_add(memory);
            }
        }

        debug!(
            pod = %podname,
            node = %nodename,
            sign = ?sign,
            cpu = %cpu,
            memory,
            free_memory = node.memory,
            "ledger delta applied"
        );
        Ok(())
    }
}

#[async_trait]
impl ProcessingStore for MemStore {
    async fn save(&self, opts: &DeployOptions, node: &NodeInfo) -> StoreResult<()> {
        let record = ProcessingRecord::new(opts, node);
        self.processing.insert(record.key(), record);
        Ok(())
    }

    async fn delete(&self, opts: &DeployOptions, nodename: &str) -> StoreResult<()> {
        let key = processing_key(
            &opts.appname,
            &opts.entrypoint,
            nodename,
            &opts.process_ident,
        );
        self.processing.remove(&key);
        Ok(())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn cores(pairs: &[(&str, u64)]) -> CpuMap {
        pairs.iter().map(|(k, v)| (*k, *v)).collect()
    }

    fn store() -> MemStore {
        let store = MemStore::new();
        store.add_node(Node::new("pod", "n1", cores(&[("0", 100), ("1", 100)]), 1000));
        store
    }

    fn opts(ident: &str) -> DeployOptions {
        DeployOptions {
            appname: "web".into(),
            entrypoint: "api".into(),
            process_ident: ident.into(),
            podname: "pod".into(),
            memory: 100,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn reserve_then_release_restores_free_capacity() {
        let store = store();
        store
            .commit_delta("pod", "n1", &cores(&[("0", 60)]), 300, Sign::Reserve)
            .await
            .unwrap();
        let n = store.node("pod", "n1").unwrap();
        assert_eq!(n.cpu.get("0"), 40);
        assert_eq!(n.memory, 700);

        store
            .commit_delta("pod", "n1", &cores(&[("0", 60)]), 300, Sign::Release)
            .await
            .unwrap();
        let n = store.node("pod", "n1").unwrap();
        assert_eq!(n.cpu, n.init_cpu);
        assert_eq!(n.memory, n.init_memory);
    }

    #[tokio::test]
    async fn overcommit_is_rejected_without_partial_update() {
        let store = store();
        let err = store
            .commit_delta("pod", "n1", &cores(&[("0", 50), ("1", 150)]), 10, Sign::Reserve)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Overcommit { ref resource, .. } if resource == "cpu core 1"));

        let err = store
            .commit_delta("pod", "n1", &CpuMap::new(), 5000, Sign::Reserve)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Overcommit { ref resource, .. } if resource == "memory"));

        let n = store.node("pod", "n1").unwrap();
        assert_eq!(n.cpu, n.init_cpu);
        assert_eq!(n.memory, 1000);
    }

    #[tokio::test]
    async fn delta_on_unknown_node_fails() {
        let store = store();
        let err = store
            .commit_delta("pod", "ghost", &CpuMap::new(), 1, Sign::Reserve)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NodeNotFound { .. }));
    }

    #[tokio::test]
    async fn processing_records_feed_pending_counts() {
        let store = store();
        let info = NodeInfo {
            name: "n1".into(),
            deploy: 2,
            ..Default::default()
        };
        store.save(&opts("a"), &info).await.unwrap();
        store.save(&opts("b"), &info).await.unwrap();

        let merged = store
            .apply_pending(&opts("c"), vec![NodeInfo { name: "n1".into(), ..Default::default() }])
            .await
            .unwrap();
        assert_eq!(merged[0].count, 4);

        store.delete(&opts("a"), "n1").await.unwrap();
        store.delete(&opts("a"), "n1").await.unwrap();
        assert_eq!(store.processing_records().len(), 1);
        assert_eq!(store.processing_records()[0].process_ident, "b");
    }

    #[tokio::test]
    async fn list_nodes_is_pod_scoped_and_sorted() {
        let store = store();
        store.add_node(Node::new("pod", "a0", CpuMap::new(), 1));
        store.add_node(Node::new("other", "z", CpuMap::new(), 1));
        let names: Vec<_> = store
            .list_nodes("pod")
            .await
            .unwrap()
            .into_iter()
            .map(|n| n.name)
            .collect();
        assert_eq!(names, vec!["a0", "n1"]);
    }
}
