/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! podalloc – pod-scoped resource allocator
//!
//! Module layout:
//!
//! ```text
//! lib.rs
//! ├── allocator     – lock → snapshot → select → divide → commit → record
//! ├── config/       – YAML tunables and cluster seed
//! ├── cpu           – per-core share maps (CpuMap)
//! ├── error         – AllocError
//! ├── ports         – capability traits (lock, directory, ledger, records)
//! ├── scheduler/    – Scheduler trait, BasicScheduler, division strategies
//! ├── snapshot      – candidate nodes → NodeInfo snapshots
//! ├── store/        – in-memory backends (MemStore, MemLockService)
//! ├── transcript    – best-effort result log
//! └── types         – request / node / record types
//! ```

pub mod allocator;
pub mod config;
pub mod cpu;
pub mod error;
pub mod ports;
pub mod scheduler;
pub mod snapshot;
pub mod store;
pub mod transcript;
pub mod types;

pub use allocator::{Allocator, Collaborators};
pub use error::AllocError;
pub use types::{DeployOptions, NodeInfo};
