//! Scheduler capability.
//!
//! The allocator never decides *how many* instances a node can take or how a
//! request is spread; it asks a [`Scheduler`].  The trait mirrors the five
//! calls the allocation sequence makes:
//!
//! | Step | Call |
//! |---|---|
//! | select (memory-prior) | [`Scheduler::select_memory_nodes`] |
//! | select (cpu-prior) | [`Scheduler::select_cpu_nodes`] |
//! | divide `auto` | [`Scheduler::common_division`] |
//! | divide `each` | [`Scheduler::each_division`] |
//! | divide `fill` | [`Scheduler::fill_division`] |
//!
//! [`BasicScheduler`] is the reference implementation shipped with the crate.
//! It is deterministic: node ranking always falls back to the node name.
//!
//! # Example
//! ```rust,ignore
//! let sched = BasicScheduler::new(100);
//! let (nodes, total) = sched.select_memory_nodes(snapshots, 0.5, 512 << 20)?;
//! let nodes = sched.common_division(nodes, 3, total)?;
//! ```

pub mod division;
pub mod error;

pub use error::{SchedulerError, SchedulerResult};

use std::collections::BTreeMap;

use tracing::{debug, info};

use crate::cpu::CpuMap;
use crate::types::NodeInfo;

/// Node name → CPU maps the node can bind, one per instance, best first.
pub type CpuPlans = BTreeMap<String, Vec<CpuMap>>;

// ── Trait ─────────────────────────────────────────────────────────────────────

/// Placement heuristics consumed by the allocator.
///
/// Implementations take ownership of the snapshots and hand them back with
/// `capacity` / `deploy` filled in.  Returned plans are treated as read-only
/// by the caller.
pub trait Scheduler: Send + Sync {
    /// Rank by free memory; returns the nodes and the cluster-wide capacity.
    fn select_memory_nodes(
        &self,
        nodes: Vec<NodeInfo>,
        cpu_quota: f64,
        memory: u64,
    ) -> SchedulerResult<(Vec<NodeInfo>, usize)>;

    /// Like [`select_memory_nodes`](Self::select_memory_nodes), plus per-node
    /// CPU plans with at least `capacity` entries each.
    fn select_cpu_nodes(
        &self,
        nodes: Vec<NodeInfo>,
        cpu_quota: f64,
        memory: u64,
    ) -> SchedulerResult<(Vec<NodeInfo>, CpuPlans, usize)>;

    fn common_division(
        &self,
        nodes: Vec<NodeInfo>,
        need: usize,
        total: usize,
    ) -> SchedulerResult<Vec<NodeInfo>>;

    fn each_division(
        &self,
        nodes: Vec<NodeInfo>,
        need: usize,
        nodes_limit: usize,
    ) -> SchedulerResult<Vec<NodeInfo>>;

    fn fill_division(
        &self,
        nodes: Vec<NodeInfo>,
        need: usize,
        nodes_limit: usize,
    ) -> SchedulerResult<Vec<NodeInfo>>;
}

// ── BasicScheduler ────────────────────────────────────────────────────────────

/// Reference scheduler.
///
/// Stateless apart from the share base, so one instance can serve every
/// concurrent allocation (`Send + Sync`, no interior mutability).
#[derive(Debug, Clone)]
pub struct BasicScheduler {
    /// CPU-shares per whole core.
    share_base: u64,
}

impl BasicScheduler {
    pub fn new(share_base: u64) -> Self {
        Self {
            share_base: share_base.max(1),
        }
    }

    /// Convert a per-instance quota in cores into shares.
    fn quota_shares(&self, cpu_quota: f64) -> SchedulerResult<u64> {
        if !cpu_quota.is_finite() || cpu_quota < 0.0 {
            return Err(SchedulerError::InvalidRequest(format!(
                "cpu quota must be a non-negative number, got {cpu_quota}"
            )));
        }
        Ok((cpu_quota * self.share_base as f64).round() as u64)
    }

    fn check_memory(memory: u64) -> SchedulerResult<()> {
        if memory == 0 {
            return Err(SchedulerError::InvalidRequest(
                "memory per instance must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Build up to `limit` CPU maps from `free`.
    ///
    /// Each map takes `quota / base` whole cores (cores with a full `base` of
    /// free shares, lowest id first) plus `quota % base` shares from one more
    /// core, picked best-fit: the core with the least free shares that still
    /// covers the fraction.
    fn plan_node(&self, free: &CpuMap, quota: u64, limit: usize) -> Vec<CpuMap> {
        let base = self.share_base;
        let whole = (quota / base) as usize;
        let fraction = quota % base;

        let mut pool = free.clone();
        let mut plans = Vec::new();

        while plans.len() < limit {
            let cores: Vec<String> = pool
                .iter()
                .filter(|(_, shares)| *shares >= base)
                .map(|(core, _)| core.to_string())
                .take(whole)
                .collect();
            if cores.len() < whole {
                break;
            }

            let mut plan: CpuMap = cores.iter().map(|c| (c.as_str(), base)).collect();

            if fraction > 0 {
                let pick = pool
                    .iter()
                    .filter(|(core, shares)| {
                        *shares >= fraction && !cores.iter().any(|c| c.as_str() == *core)
                    })
                    .min_by_key(|(core, shares)| (*shares, core.to_string()))
                    .map(|(core, _)| core.to_string());
                match pick {
                    Some(core) => plan.insert(core, fraction),
                    None => break,
                }
            }

            if pool.checked_sub(&plan).is_err() {
                break;
            }
            plans.push(plan);
        }

        plans
    }
}

impl Scheduler for BasicScheduler {
    fn select_memory_nodes(
        &self,
        mut nodes: Vec<NodeInfo>,
        cpu_quota: f64,
        memory: u64,
    ) -> SchedulerResult<(Vec<NodeInfo>, usize)> {
        Self::check_memory(memory)?;
        let quota = self.quota_shares(cpu_quota)?;

        for node in nodes.iter_mut() {
            let mem_cap = (node.memory / memory) as usize;
            let cpu_cap = if quota == 0 {
                usize::MAX
            } else {
                (node.cpu.total() / quota) as usize
            };
            node.capacity = mem_cap.min(cpu_cap);
            node.deploy = node.capacity;
            debug!(
                node = %node.name,
                free_memory = node.memory,
                free_shares = node.cpu.total(),
                capacity = node.capacity,
                "memory-prior capacity"
            );
        }

        // Most free memory first, name for determinism
        nodes.sort_by(|a, b| b.memory.cmp(&a.memory).then_with(|| a.name.cmp(&b.name)));

        let total: usize = nodes.iter().map(|n| n.capacity).sum();
        info!(node_count = nodes.len(), total, "memory-prior selection done");
        Ok((nodes, total))
    }

    fn select_cpu_nodes(
        &self,
        mut nodes: Vec<NodeInfo>,
        cpu_quota: f64,
        memory: u64,
    ) -> SchedulerResult<(Vec<NodeInfo>, CpuPlans, usize)> {
        Self::check_memory(memory)?;
        let quota = self.quota_shares(cpu_quota)?;
        if quota == 0 {
            return Err(SchedulerError::InvalidRequest(
                "cpu-prior placement needs a positive cpu quota".to_string(),
            ));
        }

        let mut plans = CpuPlans::new();
        for node in nodes.iter_mut() {
            let mem_cap = (node.memory / memory) as usize;
            let node_plans = self.plan_node(&node.cpu, quota, mem_cap);
            node.capacity = node_plans.len();
            node.deploy = node.capacity;
            debug!(
                node = %node.name,
                quota_shares = quota,
                mem_cap,
                capacity = node.capacity,
                "cpu-prior plans built"
            );
            plans.insert(node.name.clone(), node_plans);
        }

        nodes.sort_by(|a, b| b.capacity.cmp(&a.capacity).then_with(|| a.name.cmp(&b.name)));

        let total: usize = nodes.iter().map(|n| n.capacity).sum();
        info!(node_count = nodes.len(), total, "cpu-prior selection done");
        Ok((nodes, plans, total))
    }

    fn common_division(
        &self,
        nodes: Vec<NodeInfo>,
        need: usize,
        total: usize,
    ) -> SchedulerResult<Vec<NodeInfo>> {
        Ok(division::common(nodes, need, total))
    }

    fn each_division(
        &self,
        nodes: Vec<NodeInfo>,
        need: usize,
        nodes_limit: usize,
    ) -> SchedulerResult<Vec<NodeInfo>> {
        Ok(division::each(nodes, need, nodes_limit))
    }

    fn fill_division(
        &self,
        nodes: Vec<NodeInfo>,
        need: usize,
        nodes_limit: usize,
    ) -> SchedulerResult<Vec<NodeInfo>> {
        Ok(division::fill(nodes, need, nodes_limit))
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
