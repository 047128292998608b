/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Capabilities the allocator consumes.
//!
//! Every collaborator is injected as an `Arc<dyn Trait>` so tests can swap in
//! deterministic fakes and production can back them with etcd, Redis or
//! whatever the cluster state store happens to be.  In-memory
//! implementations of all of them live in [`crate::store`].
//!
//! The scheduler capability is synchronous and lives in
//! [`crate::scheduler::Scheduler`].

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::cpu::CpuMap;
use crate::error::AllocError;
use crate::types::{DeployOptions, Node, NodeInfo, Sign};

/// Errors from the state store backends.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A ledger delta referenced a node the store does not know.
    #[error("node '{node}' not found in pod '{pod}'")]
    NodeNotFound { pod: String, node: String },

    /// A reserving delta would drive a node's free capacity below zero.
    #[error("overcommit on node '{node}' ({resource}): {available} available, {requested} requested")]
    Overcommit {
        node: String,
        resource: String,
        available: u64,
        requested: u64,
    },

    #[error("backend error: {0}")]
    Backend(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

// ── Distributed lock ──────────────────────────────────────────────────────────

/// A held lock.
///
/// `release` is idempotent.  Implementations must also give the lock up when
/// dropped without an explicit release, so a cancelled allocation never
/// leaves its pod locked.
#[async_trait]
pub trait Lease: Send {
    fn key(&self) -> &str;

    async fn release(&mut self);
}

#[async_trait]
pub trait LockService: Send + Sync {
    /// Wait at most `timeout` for `key`.  Fails with
    /// [`AllocError::LockTimeout`] when the wait runs out.
    async fn acquire(&self, key: &str, timeout: Duration) -> Result<Box<dyn Lease>, AllocError>;
}

// ── Cluster state ─────────────────────────────────────────────────────────────

#[async_trait]
pub trait NodeDirectory: Send + Sync {
    /// Every node registered under `podname`, available or not.
    async fn list_nodes(&self, podname: &str) -> StoreResult<Vec<Node>>;

    async fn get_node(&self, podname: &str, nodename: &str) -> StoreResult<Option<Node>>;
}

/// Folds reservations that exist only as processing records into the
/// snapshots, so capacity is never counted twice across requests.
#[async_trait]
pub trait PendingMerger: Send + Sync {
    async fn apply_pending(
        &self,
        opts: &DeployOptions,
        nodes: Vec<NodeInfo>,
    ) -> StoreResult<Vec<NodeInfo>>;
}

/// Per-node running totals of reserved resources.
///
/// Only ever mutated through atomic deltas; callers never read-modify-write.
#[async_trait]
pub trait ResourceLedger: Send + Sync {
    async fn commit_delta(
        &self,
        podname: &str,
        nodename: &str,
        cpu: &CpuMap,
        memory: u64,
        sign: Sign,
    ) -> StoreResult<()>;
}

#[async_trait]
pub trait ProcessingStore: Send + Sync {
    async fn save(&self, opts: &DeployOptions, node: &NodeInfo) -> StoreResult<()>;

    /// Retire the record of `opts` on `nodename`.  Deleting a missing record
    /// is not an error.
    async fn delete(&self, opts: &DeployOptions, nodename: &str) -> StoreResult<()>;
}
