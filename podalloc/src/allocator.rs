/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Resource allocation orchestrator.
//!
//! [`Allocator::allocate`] runs the whole placement sequence for one request
//! inside a pod-scoped lock:
//!
//! ```text
//! lock ─► snapshot ─► merge pending ─► select ─► divide ─► drop zero-deploy
//!      ─► commit ledger (per node) ─► save processing records ─► transcript ─► unlock
//! ```
//!
//! # Failure semantics
//! Every error aborts the sequence and is returned as-is; the lock is always
//! released.  Commits are all-or-nothing per call:
//!
//! * a failed ledger commit reverts the deltas already applied in this call;
//! * a failed record write deletes the records already written and reverts
//!   every ledger delta of this call.
//!
//! Rollback is itself best effort: a failing revert is logged and the
//! original error is still the one returned.
//!
//! A deadline ([`Allocator::allocate_with_deadline`]) cuts off lock waits and
//! planning outright; during the commit phases it is only checked between
//! steps, and expiry there goes through the same rollback.

use std::future::Future;
use std::sync::Arc;

use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::AllocConfig;
use crate::cpu::CpuMap;
use crate::error::AllocError;
use crate::ports::{LockService, NodeDirectory, PendingMerger, ProcessingStore, ResourceLedger};
use crate::scheduler::{CpuPlans, Scheduler, SchedulerError};
use crate::snapshot;
use crate::transcript::Transcript;
use crate::types::{DeployMethod, DeployOptions, NodeInfo, ResourcePriority, Sign};

/// The capabilities an [`Allocator`] is wired with.
#[derive(Clone)]
pub struct Collaborators {
    pub locks: Arc<dyn LockService>,
    pub directory: Arc<dyn NodeDirectory>,
    pub pending: Arc<dyn PendingMerger>,
    pub scheduler: Arc<dyn Scheduler>,
    pub ledger: Arc<dyn ResourceLedger>,
    pub processing: Arc<dyn ProcessingStore>,
}

/// Places instances onto nodes and reserves their resources.
///
/// Cheap to share: all state lives in the collaborators, so one `Allocator`
/// behind an `Arc` serves every concurrent request.
pub struct Allocator {
    config: AllocConfig,
    deps: Collaborators,
    transcript: Transcript,
}

impl Allocator {
    pub fn new(config: AllocConfig, deps: Collaborators, transcript: Transcript) -> Self {
        Self {
            config,
            deps,
            transcript,
        }
    }

    // ── Public entry points ───────────────────────────────────────────────────

    /// Allocate resources for `opts`.
    ///
    /// Returns the nodes that received at least one instance, ordered by
    /// ascending `deploy`.  In CPU-priority mode each node's `cpu_plan` holds
    /// exactly `deploy` maps.
    ///
    /// # Errors
    /// See [`AllocError`].  Request-shape errors (`BadPodType`,
    /// `BadDeployMethod`) are detected before the lock is taken.
    pub async fn allocate(&self, opts: &DeployOptions) -> Result<Vec<NodeInfo>, AllocError> {
        self.run(opts, None).await
    }

    /// [`allocate`](Self::allocate) bounded by `deadline`.
    ///
    /// Lock acquisition and planning are abandoned as soon as the deadline
    /// passes.  Once reservations have started the sequence is never dropped
    /// midway: the deadline is checked before every ledger delta and record
    /// write, and an expiry there unwinds everything this call committed.
    pub async fn allocate_with_deadline(
        &self,
        opts: &DeployOptions,
        deadline: Instant,
    ) -> Result<Vec<NodeInfo>, AllocError> {
        self.run(opts, Some(deadline)).await
    }

    async fn run(
        &self,
        opts: &DeployOptions,
        deadline: Option<Instant>,
    ) -> Result<Vec<NodeInfo>, AllocError> {
        let priority: ResourcePriority = opts.pod_type.parse()?;
        let method: DeployMethod = opts.deploy_method.parse()?;

        let key = self.config.lock_key(&opts.podname);
        let mut lease = within(
            deadline,
            self.deps.locks.acquire(&key, self.config.lock_timeout),
        )
        .await??;

        let result = self.allocate_locked(opts, priority, method, deadline).await;

        debug!(key = %lease.key(), "releasing pod lock");
        lease.release().await;
        if let Err(e) = &result {
            warn!(pod = %opts.podname, app = %opts.appname, error = %e, "allocation failed");
        }
        result
    }

    // ── Locked sequence ───────────────────────────────────────────────────────

    async fn allocate_locked(
        &self,
        opts: &DeployOptions,
        priority: ResourcePriority,
        method: DeployMethod,
        deadline: Option<Instant>,
    ) -> Result<Vec<NodeInfo>, AllocError> {
        let pod = opts.podname.as_str();
        info!(
            pod = %pod,
            app = %opts.appname,
            entrypoint = %opts.entrypoint,
            count = opts.count,
            cpu_quota = opts.cpu_quota,
            memory = opts.memory,
            priority = %priority,
            method = %method,
            "=== allocate ==="
        );

        // Planning has no side effects, so it may be cut off anywhere.
        let nodes = within(deadline, self.plan(opts, priority, method)).await??;

        self.commit(opts, &nodes, deadline).await?;
        self.persist(opts, &nodes, deadline).await?;

        self.transcript.record(pod, nodes.clone());

        info!(
            pod = %pod,
            nodes = nodes.len(),
            placed = nodes.iter().map(|n| n.deploy).sum::<usize>(),
            requested = opts.count,
            "=== allocate done ==="
        );
        Ok(nodes)
    }

    /// Snapshot, merge pending, select and divide.  Returns the nodes that
    /// get at least one instance, with CPU plans attached in CPU mode.
    async fn plan(
        &self,
        opts: &DeployOptions,
        priority: ResourcePriority,
        method: DeployMethod,
    ) -> Result<Vec<NodeInfo>, AllocError> {
        let pod = opts.podname.as_str();
        let nodes = snapshot::build(
            self.deps.directory.as_ref(),
            pod,
            opts.nodename.as_deref(),
            &opts.node_labels,
        )
        .await?;

        let nodes = self.deps.pending.apply_pending(opts, nodes).await?;

        let sched = self.deps.scheduler.as_ref();
        let (nodes, plans, total) = match priority {
            ResourcePriority::Memory => {
                let (nodes, total) =
                    sched.select_memory_nodes(nodes, opts.cpu_quota, opts.memory)?;
                (nodes, CpuPlans::new(), total)
            }
            ResourcePriority::Cpu => {
                sched.select_cpu_nodes(nodes, opts.cpu_quota, opts.memory)?
            }
        };

        let nodes = match method {
            DeployMethod::Auto => sched.common_division(nodes, opts.count, total)?,
            DeployMethod::Each => sched.each_division(nodes, opts.count, opts.nodes_limit)?,
            DeployMethod::Fill => sched.fill_division(nodes, opts.count, opts.nodes_limit)?,
        };

        let mut nodes = retain_deployed(nodes).ok_or_else(|| AllocError::InsufficientResource {
            pod: pod.to_string(),
        })?;

        if priority == ResourcePriority::Cpu {
            attach_cpu_plans(&mut nodes, &plans)?;
        }
        Ok(nodes)
    }

    // ── Commit phases ─────────────────────────────────────────────────────────

    /// Reserve each node's cost in the ledger, reverting this call's earlier
    /// deltas if one fails or the deadline passes.
    async fn commit(
        &self,
        opts: &DeployOptions,
        nodes: &[NodeInfo],
        deadline: Option<Instant>,
    ) -> Result<(), AllocError> {
        for (i, node) in nodes.iter().enumerate() {
            let cpu = node.cpu_cost();
            let memory = memory_cost(opts, node);
            let outcome = if expired(deadline) {
                Err(AllocError::DeadlineExceeded)
            } else {
                self.deps
                    .ledger
                    .commit_delta(&opts.podname, &node.name, &cpu, memory, Sign::Reserve)
                    .await
                    .map_err(AllocError::from)
            };
            if let Err(e) = outcome {
                warn!(
                    pod = %opts.podname,
                    node = %node.name,
                    error = %e,
                    reverting = i,
                    "ledger commit failed"
                );
                self.revert_ledger(opts, &nodes[..i]).await;
                return Err(e);
            }
            debug!(
                pod = %opts.podname,
                node = %node.name,
                deploy = node.deploy,
                cpu = %cpu,
                memory,
                "resources reserved"
            );
        }
        Ok(())
    }

    /// Save one processing record per node; on failure or expiry retire the
    /// ones already saved and revert every ledger delta of this call.
    async fn persist(
        &self,
        opts: &DeployOptions,
        nodes: &[NodeInfo],
        deadline: Option<Instant>,
    ) -> Result<(), AllocError> {
        for (i, node) in nodes.iter().enumerate() {
            let outcome = if expired(deadline) {
                Err(AllocError::DeadlineExceeded)
            } else {
                self.deps
                    .processing
                    .save(opts, node)
                    .await
                    .map_err(AllocError::from)
            };
            if let Err(e) = outcome {
                warn!(
                    pod = %opts.podname,
                    node = %node.name,
                    error = %e,
                    "processing record write failed"
                );
                for saved in &nodes[..i] {
                    if let Err(e) = self.deps.processing.delete(opts, &saved.name).await {
                        warn!(node = %saved.name, error = %e, "cannot retire processing record");
                    }
                }
                self.revert_ledger(opts, nodes).await;
                return Err(e);
            }
        }
        Ok(())
    }

    async fn revert_ledger(&self, opts: &DeployOptions, nodes: &[NodeInfo]) {
        for node in nodes {
            let cpu = node.cpu_cost();
            let memory = memory_cost(opts, node);
            if let Err(e) = self
                .deps
                .ledger
                .commit_delta(&opts.podname, &node.name, &cpu, memory, Sign::Release)
                .await
            {
                warn!(
                    pod = %opts.podname,
                    node = %node.name,
                    error = %e,
                    "cannot revert ledger delta, node left reserved"
                );
            }
        }
    }
}

// ── Helpers ───────────────────────────────────────────────────────────────────

/// Await `fut`, giving up with `DeadlineExceeded` once `deadline` passes.
async fn within<F: Future>(deadline: Option<Instant>, fut: F) -> Result<F::Output, AllocError> {
    match deadline {
        None => Ok(fut.await),
        Some(deadline) => tokio::time::timeout_at(deadline, fut)
            .await
            .map_err(|_| AllocError::DeadlineExceeded),
    }
}

fn expired(deadline: Option<Instant>) -> bool {
    deadline.is_some_and(|d| Instant::now() >= d)
}

fn memory_cost(opts: &DeployOptions, node: &NodeInfo) -> u64 {
    opts.memory.saturating_mul(node.deploy as u64)
}

/// Sort ascending by `deploy` and drop the zero prefix.
///
/// `None` when no node got an instance.
fn retain_deployed(mut nodes: Vec<NodeInfo>) -> Option<Vec<NodeInfo>> {
    nodes.sort_by_key(|n| n.deploy);
    let first = nodes.partition_point(|n| n.deploy == 0);
    if first == nodes.len() {
        return None;
    }
    nodes.drain(..first);
    Some(nodes)
}

/// Copy the first `deploy` maps of each node's plan list into `cpu_plan`.
///
/// The scheduler's plan lists are only read; each node owns its copy.
fn attach_cpu_plans(nodes: &mut [NodeInfo], plans: &CpuPlans) -> Result<(), SchedulerError> {
    for node in nodes.iter_mut() {
        let available: &[CpuMap] = plans.get(&node.name).map(Vec::as_slice).unwrap_or(&[]);
        if available.len() < node.deploy {
            return Err(SchedulerError::PlanShortfall {
                node: node.name.clone(),
                deploy: node.deploy,
                planned: available.len(),
            });
        }
        node.cpu_plan = available[..node.deploy].to_vec();
    }
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
