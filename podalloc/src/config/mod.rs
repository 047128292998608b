//! Configuration loading.
//!
//! One YAML file carries both the allocation tunables and, optionally, a
//! cluster seed used to populate the in-memory store:
//! ```yaml
//! lock_timeout_ms: 30000
//! lock_prefix: "podalloc"
//! share_base: 100
//! transcript_capacity: 64
//! pods:
//!   pod1:
//!     node01:
//!       cpu: {"0": 100, "1": 100}
//!       memory: 4294967296
//!       labels: {zone: "a"}
//!     node02:
//!       cpu: {"0": 100}
//!       memory: 2147483648
//!       available: false
//! ```
//!
//! Core ids are strings; quote them so YAML does not read them as integers.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::cpu::CpuMap;
use crate::types::Node;

// ── Defaults ──────────────────────────────────────────────────────────────────

const DEFAULT_LOCK_TIMEOUT_MS: u64 = 30_000;
const DEFAULT_LOCK_PREFIX: &str = "podalloc";
const DEFAULT_SHARE_BASE: u64 = 100;
const DEFAULT_TRANSCRIPT_CAPACITY: usize = 64;

// ── Private YAML deserialization types ────────────────────────────────────────

/// Top-level wrapper that maps directly onto the YAML file layout.
///
/// This is kept private – callers work with [`AllocConfig`] / [`ClusterConfig`]
/// instead.
#[derive(Debug, Deserialize)]
struct RawConfigFile {
    #[serde(default = "default_lock_timeout_ms")]
    lock_timeout_ms: u64,
    #[serde(default = "default_lock_prefix")]
    lock_prefix: String,
    #[serde(default = "default_share_base")]
    share_base: u64,
    #[serde(default = "default_transcript_capacity")]
    transcript_capacity: usize,
    #[serde(default)]
    pods: BTreeMap<String, BTreeMap<String, NodeEntry>>,
}

/// Per-node fields as they appear in the YAML file.
#[derive(Debug, Deserialize)]
struct NodeEntry {
    #[serde(default)]
    cpu: CpuMap,
    #[serde(default)]
    memory: u64,
    #[serde(default)]
    labels: BTreeMap<String, String>,
    #[serde(default = "default_available")]
    available: bool,
}

fn default_lock_timeout_ms() -> u64 {
    DEFAULT_LOCK_TIMEOUT_MS
}

fn default_lock_prefix() -> String {
    DEFAULT_LOCK_PREFIX.to_string()
}

fn default_share_base() -> u64 {
    DEFAULT_SHARE_BASE
}

fn default_transcript_capacity() -> usize {
    DEFAULT_TRANSCRIPT_CAPACITY
}

fn default_available() -> bool {
    true
}

// ── Public data structures ────────────────────────────────────────────────────

/// Tunables of the allocator.
#[derive(Debug, Clone)]
pub struct AllocConfig {
    /// How long `allocate` waits for the pod lock.
    pub lock_timeout: Duration,
    /// Lock keys are `<lock_prefix>/pod/<podname>`.
    pub lock_prefix: String,
    /// CPU-shares per whole core.
    pub share_base: u64,
    /// Bound of the diagnostic transcript queue.
    pub transcript_capacity: usize,
}

impl Default for AllocConfig {
    fn default() -> Self {
        Self {
            lock_timeout: Duration::from_millis(DEFAULT_LOCK_TIMEOUT_MS),
            lock_prefix: DEFAULT_LOCK_PREFIX.to_string(),
            share_base: DEFAULT_SHARE_BASE,
            transcript_capacity: DEFAULT_TRANSCRIPT_CAPACITY,
        }
    }
}

impl AllocConfig {
    /// The lock key that serialises allocations for `podname`.
    pub fn lock_key(&self, podname: &str) -> String {
        format!("{}/pod/{}", self.lock_prefix, podname)
    }
}

/// Nodes to seed the in-memory store with, sorted by (pod, name).
#[derive(Debug, Clone, Default)]
pub struct ClusterConfig {
    pub nodes: Vec<Node>,
}

/// A fully parsed configuration file.
#[derive(Debug, Clone, Default)]
pub struct ConfigFile {
    pub alloc: AllocConfig,
    pub cluster: ClusterConfig,
}

impl ConfigFile {
    /// Parses `path`.
    ///
    /// # Errors
    /// Returns an error if the file cannot be opened, if the YAML is
    /// structurally invalid, or if a tunable is out of range.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        info!("Loading configuration from: {}", path.display());

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Cannot open configuration file: {}", path.display()))?;

        Self::from_yaml_str(&content)
            .with_context(|| format!("Invalid configuration file: {}", path.display()))
    }

    pub fn from_yaml_str(content: &str) -> Result<Self> {
        let raw: RawConfigFile =
            serde_yaml::from_str(content).context("Failed to parse YAML configuration")?;

        if raw.share_base == 0 {
            bail!("share_base must be positive");
        }
        if raw.transcript_capacity == 0 {
            bail!("transcript_capacity must be positive");
        }

        let alloc = AllocConfig {
            lock_timeout: Duration::from_millis(raw.lock_timeout_ms),
            lock_prefix: raw.lock_prefix,
            share_base: raw.share_base,
            transcript_capacity: raw.transcript_capacity,
        };

        let mut nodes = Vec::new();
        for (pod, entries) in raw.pods {
            for (name, entry) in entries {
                let mut node = Node::new(pod.clone(), name, entry.cpu, entry.memory)
                    .with_labels(entry.labels);
                node.available = entry.available;

                debug!(
                    "  Node: {}/{} | Cores: {} | Shares: {} | Memory: {}B | Available: {}",
                    node.podname,
                    node.name,
                    node.cpu.len(),
                    node.cpu.total(),
                    node.memory,
                    node.available,
                );
                nodes.push(node);
            }
        }

        if nodes.is_empty() {
            warn!("No nodes found in configuration, the cluster seed is empty");
        }

        info!(
            lock_timeout_ms = alloc.lock_timeout.as_millis() as u64,
            share_base = alloc.share_base,
            node_count = nodes.len(),
            "Configuration loaded"
        );

        Ok(Self {
            alloc,
            cluster: ClusterConfig { nodes },
        })
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
