/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Structured error type for the scheduler capability.
//!
//! Capacity shortfall is **not** an error at this layer: selection reports a
//! capacity of zero and division places as many instances as fit.  The
//! allocator turns "nothing placed" into
//! [`AllocError::InsufficientResource`](crate::error::AllocError::InsufficientResource).
//!
//! | Variant | Raised by |
//! |---|---|
//! | `InvalidRequest` | selection, on a quota / memory it cannot plan for |
//! | `PlanShortfall` | the allocator, when a CPU plan list is shorter than `deploy` |

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SchedulerError {
    /// The request's resource figures cannot be planned for (negative or
    /// non-finite quota, zero memory, zero quota in CPU-priority mode).
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The scheduler granted `deploy` instances on a node but produced fewer
    /// CPU maps than that.
    #[error("node '{node}' was assigned {deploy} instance(s) but only {planned} CPU plan(s) exist")]
    PlanShortfall {
        node: String,
        deploy: usize,
        planned: usize,
    },
}

pub type SchedulerResult<T> = Result<T, SchedulerError>;
