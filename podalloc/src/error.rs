/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Structured error type for the allocation core.
//!
//! [`AllocError`] is the single error returned from
//! [`Allocator::allocate()`](crate::allocator::Allocator::allocate).  Errors
//! raised by the consumed capabilities are wrapped with `#[from]`, never
//! flattened into strings, so callers can always match on the original kind:
//!
//! | Variant | Meaning | Caller's usual reaction |
//! |---|---|---|
//! | `BadPodType` / `BadDeployMethod` | malformed request | reject |
//! | `InsufficientNodes` | no candidate node passed selection | reject or relax labels |
//! | `InsufficientResource` | candidates exist, none got an instance | retry later or shrink |
//! | `LockTimeout` / `DeadlineExceeded` | contention | retry |
//! | `NodeNotFound` | targeted node does not exist in the pod | reject |
//! | `Schedule(_)` | scheduler / division failure | inspect inner |
//! | `Store(_)` | directory, ledger or record store failure | inspect inner |

use std::time::Duration;

use thiserror::Error;

use crate::ports::StoreError;
use crate::scheduler::SchedulerError;

/// Top-level allocation error.
#[derive(Debug, Error)]
pub enum AllocError {
    /// The request's resource priority mode is not recognised.
    #[error("bad pod type: '{0}' (valid: memory-prior, cpu-prior)")]
    BadPodType(String),

    /// The request's division strategy is not recognised.
    #[error("bad deploy method: '{0}' (valid: auto, each, fill)")]
    BadDeployMethod(String),

    /// No node in the pod survived label / availability filtering.
    #[error("insufficient nodes in pod '{pod}': no candidate matches the request")]
    InsufficientNodes { pod: String },

    /// Every candidate ended up with zero instances after division.
    #[error("insufficient resource in pod '{pod}': no node can host an instance")]
    InsufficientResource { pod: String },

    /// The pod lock could not be acquired within the configured timeout.
    #[error("timed out after {timeout:?} waiting for lock '{key}'")]
    LockTimeout { key: String, timeout: Duration },

    /// A node addressed by name does not exist in the pod.
    #[error("node '{node}' not found in pod '{pod}'")]
    NodeNotFound { pod: String, node: String },

    /// The caller's deadline expired before the allocation finished.
    #[error("allocation deadline exceeded")]
    DeadlineExceeded,

    #[error("scheduler: {0}")]
    Schedule(#[from] SchedulerError),

    #[error("store: {0}")]
    Store(#[from] StoreError),
}

impl AllocError {
    /// `true` when the same request may succeed if simply sent again later.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AllocError::LockTimeout { .. }
                | AllocError::DeadlineExceeded
                | AllocError::InsufficientResource { .. }
                | AllocError::Store(StoreError::Overcommit { .. })
        )
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wrapped_errors_keep_their_kind() {
        let err: AllocError = StoreError::Backend("etcd down".into()).into();
        assert!(matches!(err, AllocError::Store(StoreError::Backend(_))));
        assert_eq!(err.to_string(), "store: backend error: etcd down");

        let err: AllocError = SchedulerError::InvalidRequest("quota".into()).into();
        assert!(matches!(err, AllocError::Schedule(SchedulerError::InvalidRequest(_))));
    }

    #[test]
    fn retryable_classification() {
        assert!(AllocError::DeadlineExceeded.is_retryable());
        assert!(AllocError::LockTimeout {
            key: "k".into(),
            timeout: Duration::from_secs(1)
        }
        .is_retryable());
        assert!(AllocError::InsufficientResource { pod: "p".into() }.is_retryable());
        assert!(!AllocError::BadPodType("x".into()).is_retryable());
        assert!(!AllocError::InsufficientNodes { pod: "p".into() }.is_retryable());
    }
}
