/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Core data structures for the allocation pipeline.
//!
//! Three types model the three stages of one allocation call:
//!
//! ```text
//! store ──(Node)──►  NodeInfo  ──(scheduler + division)──►  NodeInfo { deploy, cpu_plan }
//!                     ↑ snapshot                               │
//!                     free capacity                            ▼
//!                                                    ProcessingRecord ──► store
//! ```
//!
//! # Ownership model
//! A [`Node`] is owned by the store; the allocator only ever sees clones.
//! [`NodeInfo`] values are created fresh per call, **moved** through the
//! scheduler and division strategy, and returned to the caller.  Nothing in
//! this module is shared between concurrent calls.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::cpu::CpuMap;
use crate::error::AllocError;

// ── Resource priority mode ────────────────────────────────────────────────────

/// Which resource axis the scheduler optimises for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourcePriority {
    /// Rank nodes by free memory; CPU quota is only validated, no pinning.
    Memory,
    /// Pin each instance to concrete CPU shares (a CPU plan per instance).
    Cpu,
}

impl FromStr for ResourcePriority {
    type Err = AllocError;

    /// Accepts the long form (`memory-prior`, `cpu-prior`) and the short pod
    /// favor names (`MEM`, `CPU`), case-insensitively.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "memory-prior" | "mem" => Ok(ResourcePriority::Memory),
            "cpu-prior" | "cpu" => Ok(ResourcePriority::Cpu),
            _ => Err(AllocError::BadPodType(s.to_string())),
        }
    }
}

impl fmt::Display for ResourcePriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourcePriority::Memory => write!(f, "memory-prior"),
            ResourcePriority::Cpu => write!(f, "cpu-prior"),
        }
    }
}

// ── Division strategy ─────────────────────────────────────────────────────────

/// How the requested instance count is spread over eligible nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeployMethod {
    /// Proportional to each node's capacity.
    Auto,
    /// The same count on every chosen node.
    Each,
    /// Exhaust one node before moving to the next.
    Fill,
}

impl FromStr for DeployMethod {
    type Err = AllocError;

    /// Accepts `auto`, `each` and `fill`, case-insensitively like
    /// [`ResourcePriority`].
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "auto" => Ok(DeployMethod::Auto),
            "each" => Ok(DeployMethod::Each),
            "fill" => Ok(DeployMethod::Fill),
            _ => Err(AllocError::BadDeployMethod(s.to_string())),
        }
    }
}

impl fmt::Display for DeployMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeployMethod::Auto => write!(f, "auto"),
            DeployMethod::Each => write!(f, "each"),
            DeployMethod::Fill => write!(f, "fill"),
        }
    }
}

// ── Ledger delta sign ─────────────────────────────────────────────────────────

/// Direction of a resource-ledger delta.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Sign {
    /// Subtract from the node's free capacity (add to reserved).
    Reserve,
    /// Give capacity back.
    Release,
}

// ── Node ──────────────────────────────────────────────────────────────────────

/// A compute host as held by the node directory.
///
/// `cpu` and `memory` are the **free** figures maintained by the ledger;
/// `init_cpu` / `init_memory` are the totals the node registered with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub name: String,
    pub podname: String,
    pub init_cpu: CpuMap,
    pub cpu: CpuMap,
    pub init_memory: u64,
    pub memory: u64,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    /// Unavailable nodes are skipped by label-based selection.
    pub available: bool,
}

impl Node {
    /// A fresh node whose free capacity equals its totals.
    pub fn new(
        podname: impl Into<String>,
        name: impl Into<String>,
        cpu: CpuMap,
        memory: u64,
    ) -> Self {
        Self {
            name: name.into(),
            podname: podname.into(),
            init_cpu: cpu.clone(),
            cpu,
            init_memory: memory,
            memory,
            labels: BTreeMap::new(),
            available: true,
        }
    }

    pub fn with_labels(mut self, labels: BTreeMap<String, String>) -> Self {
        self.labels = labels;
        self
    }

    /// `true` if every `key = value` pair in `constraints` is present on this
    /// node.  An empty constraint set matches every node.
    pub fn matches_labels(&self, constraints: &BTreeMap<String, String>) -> bool {
        constraints
            .iter()
            .all(|(k, v)| self.labels.get(k).is_some_and(|nv| nv == v))
    }
}

// ── DeployOptions (request) ───────────────────────────────────────────────────

/// One allocation request.  Immutable for the duration of the call.
///
/// `pod_type` and `deploy_method` are kept as the raw strings the caller
/// sent; they are parsed (and rejected with `BadPodType` / `BadDeployMethod`)
/// at the start of [`Allocator::allocate`](crate::allocator::Allocator::allocate).
#[derive(Debug, Clone, Default)]
pub struct DeployOptions {
    // ── Identity ──────────────────────────────────────────────────────────────
    /// Application the instances belong to.
    pub appname: String,

    /// Entrypoint within the application.
    pub entrypoint: String,

    /// Unique per request; distinguishes processing records of concurrent
    /// requests for the same entrypoint.
    pub process_ident: String,

    // ── Placement ─────────────────────────────────────────────────────────────
    pub podname: String,

    /// Target exactly this node.  Label constraints are ignored when set.
    pub nodename: Option<String>,

    /// Exact-match label constraints for label-based selection.
    pub node_labels: BTreeMap<String, String>,

    /// Maximum number of nodes `each` / `fill` may use.  `0` = unlimited.
    pub nodes_limit: usize,

    // ── Resources ─────────────────────────────────────────────────────────────
    /// Requested instance count.
    pub count: usize,

    /// CPU quota per instance, in cores (fractional allowed).
    pub cpu_quota: f64,

    /// Memory per instance, in bytes.
    pub memory: u64,

    // ── Strategy ──────────────────────────────────────────────────────────────
    /// `memory-prior` | `cpu-prior` (see [`ResourcePriority`]).
    pub pod_type: String,

    /// `auto` | `each` | `fill` (see [`DeployMethod`]).
    pub deploy_method: String,
}

// ── NodeInfo (working allocation unit) ────────────────────────────────────────

/// Per-node working state of one allocation call.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct NodeInfo {
    pub name: String,

    /// Free CPU shares at snapshot time.
    pub cpu: CpuMap,

    /// Free memory at snapshot time, in bytes.
    pub memory: u64,

    /// Instances of the same deployment already reserved on this node but not
    /// yet running (filled by the pending-allocation merger).
    pub count: usize,

    /// Instances this node can host for the request (filled by the scheduler).
    pub capacity: usize,

    /// Instances assigned by the division strategy.  Starts at `capacity`.
    pub deploy: usize,

    /// One CPU map per instance to place, CPU-priority mode only.
    /// When non-empty, `cpu_plan.len() == deploy`.
    pub cpu_plan: Vec<CpuMap>,
}

impl NodeInfo {
    /// Snapshot the free capacity of `node`.
    pub fn from_node(node: &Node) -> Self {
        Self {
            name: node.name.clone(),
            cpu: node.cpu.clone(),
            memory: node.memory,
            ..Default::default()
        }
    }

    /// Total CPU cost of the plan: the additive merge of every entry.
    pub fn cpu_cost(&self) -> CpuMap {
        CpuMap::merge(&self.cpu_plan)
    }
}

// ── ProcessingRecord ──────────────────────────────────────────────────────────

/// Durable marker: `count` instances' worth of resources are reserved on
/// `nodename` for this request, ahead of the instances existing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessingRecord {
    pub appname: String,
    pub entrypoint: String,
    pub process_ident: String,
    pub podname: String,
    pub nodename: String,
    pub count: usize,
    pub memory: u64,
    pub cpu_plan: Vec<CpuMap>,
}

impl ProcessingRecord {
    pub fn new(opts: &DeployOptions, node: &NodeInfo) -> Self {
        Self {
            appname: opts.appname.clone(),
            entrypoint: opts.entrypoint.clone(),
            process_ident: opts.process_ident.clone(),
            podname: opts.podname.clone(),
            nodename: node.name.clone(),
            count: node.deploy,
            memory: opts.memory.saturating_mul(node.deploy as u64),
            cpu_plan: node.cpu_plan.clone(),
        }
    }

    /// Store key, `/processing/<app>/<entrypoint>/<node>/<ident>`.
    pub fn key(&self) -> String {
        processing_key(
            &self.appname,
            &self.entrypoint,
            &self.nodename,
            &self.process_ident,
        )
    }
}

/// Key under which the record of (`appname`, `entrypoint`, `nodename`,
/// `process_ident`) is stored.
pub fn processing_key(appname: &str, entrypoint: &str, nodename: &str, ident: &str) -> String {
    format!("/processing/{appname}/{entrypoint}/{nodename}/{ident}")
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    // ── ResourcePriority / DeployMethod ───────────────────────────────────────

    #[test]
    fn resource_priority_parses_long_and_short_forms() {
        assert_eq!("memory-prior".parse::<ResourcePriority>().unwrap(), ResourcePriority::Memory);
        assert_eq!("MEM".parse::<ResourcePriority>().unwrap(), ResourcePriority::Memory);
        assert_eq!("cpu-prior".parse::<ResourcePriority>().unwrap(), ResourcePriority::Cpu);
        assert_eq!("CPU".parse::<ResourcePriority>().unwrap(), ResourcePriority::Cpu);
    }

    #[test]
    fn unknown_resource_priority_is_bad_pod_type() {
        let err = "gpu-prior".parse::<ResourcePriority>().unwrap_err();
        assert!(matches!(err, AllocError::BadPodType(ref s) if s == "gpu-prior"));
    }

    #[test]
    fn deploy_method_parses_known_values_only() {
        assert_eq!("auto".parse::<DeployMethod>().unwrap(), DeployMethod::Auto);
        assert_eq!("each".parse::<DeployMethod>().unwrap(), DeployMethod::Each);
        assert_eq!("fill".parse::<DeployMethod>().unwrap(), DeployMethod::Fill);
        let err = "spread".parse::<DeployMethod>().unwrap_err();
        assert!(matches!(err, AllocError::BadDeployMethod(_)));
    }

    #[test]
    fn deploy_method_ignores_case() {
        assert_eq!("AUTO".parse::<DeployMethod>().unwrap(), DeployMethod::Auto);
        assert_eq!("Each".parse::<DeployMethod>().unwrap(), DeployMethod::Each);
        assert_eq!("fiLL".parse::<DeployMethod>().unwrap(), DeployMethod::Fill);
        let err = "Spread".parse::<DeployMethod>().unwrap_err();
        assert!(matches!(err, AllocError::BadDeployMethod(ref s) if s == "Spread"));
    }

    // ── Node ──────────────────────────────────────────────────────────────────

    #[test]
    fn label_match_requires_every_constraint() {
        let node = Node::new("pod", "n1", CpuMap::new(), 0)
            .with_labels(labels(&[("zone", "a"), ("disk", "ssd")]));

        assert!(node.matches_labels(&labels(&[])));
        assert!(node.matches_labels(&labels(&[("zone", "a")])));
        assert!(node.matches_labels(&labels(&[("zone", "a"), ("disk", "ssd")])));
        assert!(!node.matches_labels(&labels(&[("zone", "b")])));
        assert!(!node.matches_labels(&labels(&[("gpu", "yes")])), "missing key excludes");
    }

    #[test]
    fn new_node_is_fully_free() {
        let cpu: CpuMap = [("0", 100u64), ("1", 100)].into_iter().collect();
        let node = Node::new("pod", "n1", cpu.clone(), 1024);
        assert_eq!(node.init_cpu, cpu);
        assert_eq!(node.cpu, cpu);
        assert_eq!(node.init_memory, 1024);
        assert_eq!(node.memory, 1024);
        assert!(node.available);
    }

    // ── NodeInfo / ProcessingRecord ───────────────────────────────────────────

    #[test]
    fn node_info_cpu_cost_merges_whole_plan() {
        let info = NodeInfo {
            name: "n1".into(),
            deploy: 2,
            cpu_plan: vec![
                [("0", 50u64)].into_iter().collect(),
                [("0", 50u64), ("1", 100)].into_iter().collect(),
            ],
            ..Default::default()
        };
        let expected: CpuMap = [("0", 100u64), ("1", 100)].into_iter().collect();
        assert_eq!(info.cpu_cost(), expected);
    }

    #[test]
    fn processing_record_carries_request_identity() {
        let opts = DeployOptions {
            appname: "web".into(),
            entrypoint: "api".into(),
            process_ident: "req-1".into(),
            podname: "pod".into(),
            memory: 256,
            ..Default::default()
        };
        let info = NodeInfo {
            name: "n1".into(),
            deploy: 3,
            ..Default::default()
        };
        let rec = ProcessingRecord::new(&opts, &info);
        assert_eq!(rec.count, 3);
        assert_eq!(rec.memory, 768);
        assert_eq!(rec.key(), "/processing/web/api/n1/req-1");
    }
}
