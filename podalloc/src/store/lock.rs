/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! In-process lock service.
//!
//! One `tokio::sync::Mutex<()>` per key, created on first use.  A lease owns
//! the mutex guard, so dropping it (explicitly via `release` or implicitly
//! when a cancelled allocation unwinds) frees the key.  The entry itself is
//! removed once no lease holds it and nobody is waiting for it.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::debug;

use crate::error::AllocError;
use crate::ports::{Lease, LockService};

type LockTable = Arc<DashMap<String, Arc<Mutex<()>>>>;

#[derive(Debug, Default)]
pub struct MemLockService {
    locks: LockTable,
}

impl MemLockService {
    pub fn new() -> Self {
        Self::default()
    }

    /// `true` while some lease holds `key`.
    pub fn is_locked(&self, key: &str) -> bool {
        let Some(mutex) = self.locks.get(key).map(|m| Arc::clone(m.value())) else {
            return false;
        };
        let held = mutex.try_lock().is_err();
        held
    }

    /// Number of keys currently held or waited on.
    pub fn tracked_keys(&self) -> usize {
        self.locks.len()
    }
}

#[async_trait]
impl LockService for MemLockService {
    async fn acquire(&self, key: &str, timeout: Duration) -> Result<Box<dyn Lease>, AllocError> {
        let mutex = Arc::clone(self.locks.entry(key.to_string()).or_default().value());

        match tokio::time::timeout(timeout, mutex.lock_owned()).await {
            Ok(guard) => {
                debug!(key = %key, "lock acquired");
                Ok(Box::new(MemLease {
                    key: key.to_string(),
                    guard: Some(guard),
                    table: Arc::clone(&self.locks),
                }))
            }
            Err(_) => {
                prune(&self.locks, key);
                Err(AllocError::LockTimeout {
                    key: key.to_string(),
                    timeout,
                })
            }
        }
    }
}

/// Drop the entry for `key` if the table holds the only reference to it.
///
/// Runs under the shard lock, so it cannot race with `acquire` cloning the
/// same entry.
fn prune(table: &DashMap<String, Arc<Mutex<()>>>, key: &str) {
    table.remove_if(key, |_, mutex| Arc::strong_count(mutex) == 1);
}

struct MemLease {
    key: String,
    guard: Option<OwnedMutexGuard<()>>,
    table: LockTable,
}

impl MemLease {
    fn unlock(&mut self) -> bool {
        let Some(guard) = self.guard.take() else {
            return false;
        };
        drop(guard);
        prune(&self.table, &self.key);
        true
    }
}

impl Drop for MemLease {
    fn drop(&mut self) {
        if self.unlock() {
            debug!(key = %self.key, "lock released on drop");
        }
    }
}

#[async_trait]
impl Lease for MemLease {
    fn key(&self) -> &str {
        &self.key
    }

    async fn release(&mut self) {
        if self.unlock() {
            debug!(key = %self.key, "lock released");
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
