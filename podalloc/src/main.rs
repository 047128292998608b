/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use clap::Parser;
use tracing::{error, info, warn};

use podalloc::config::ConfigFile;
use podalloc::scheduler::BasicScheduler;
use podalloc::store::{MemLockService, MemStore};
use podalloc::transcript::Transcript;
use podalloc::{Allocator, Collaborators, DeployOptions};

// ── CLI argument definition ───────────────────────────────────────────────────

/// Allocate once against an in-memory cluster seeded from a YAML file.
///
/// Example:
///   podalloc -c cluster.yaml --pod pod1 --count 3 --cpu 0.5 --memory 536870912 \
///            --priority cpu-prior --method auto --label zone=a
#[derive(Debug, Parser)]
#[command(
    name = "podalloc",
    about = "Pod-scoped resource allocator",
    long_about = None,
)]
struct Cli {
    /// Path to the YAML configuration file (tunables + cluster seed).
    #[arg(short = 'c', long = "config")]
    config: Option<PathBuf>,

    /// Pod to allocate in.
    #[arg(long = "pod")]
    pod: String,

    /// Allocate on this node only (label constraints are ignored).
    #[arg(long = "node")]
    node: Option<String>,

    /// Label constraint `key=value`; repeatable.
    #[arg(long = "label", value_parser = parse_label)]
    labels: Vec<(String, String)>,

    /// Number of instances.
    #[arg(short = 'n', long = "count", default_value_t = 1)]
    count: usize,

    /// CPU quota per instance, in cores.
    #[arg(long = "cpu", default_value_t = 1.0)]
    cpu: f64,

    /// Memory per instance, in bytes.
    #[arg(long = "memory", default_value_t = 512 * 1024 * 1024)]
    memory: u64,

    /// Resource priority: `memory-prior` or `cpu-prior`.
    #[arg(long = "priority", default_value = "memory-prior")]
    priority: String,

    /// Deploy method: `auto`, `each` or `fill`.
    #[arg(long = "method", default_value = "auto")]
    method: String,

    /// Maximum number of nodes to use (0 = no limit).
    #[arg(long = "nodes-limit", default_value_t = 0)]
    nodes_limit: usize,

    #[arg(long = "app", default_value = "demo")]
    app: String,

    #[arg(long = "entrypoint", default_value = "main")]
    entrypoint: String,
}

fn parse_label(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((k, v)) if !k.is_empty() => Ok((k.to_string(), v.to_string())),
        _ => Err(format!("expected key=value, got `{s}`")),
    }
}

/// Request identity: pid plus wall-clock nanoseconds.
fn process_ident() -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or_default();
    format!("{}-{:x}", process::id(), nanos)
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() {
    // Level is controlled by the RUST_LOG env-var (e.g. RUST_LOG=debug).
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    info!(
        pod         = %cli.pod,
        node        = ?cli.node,
        count       = cli.count,
        cpu         = cli.cpu,
        memory      = cli.memory,
        priority    = %cli.priority,
        method      = %cli.method,
        nodes_limit = cli.nodes_limit,
        config      = ?cli.config,
        "Request"
    );

    // ── Load configuration ────────────────────────────────────────────────────
    let config = match &cli.config {
        Some(path) => match ConfigFile::load_from_file(path) {
            Ok(cfg) => cfg,
            Err(e) => {
                error!("Failed to load configuration: {:#}", e);
                process::exit(1);
            }
        },
        None => {
            warn!("No configuration file provided, the cluster is empty");
            ConfigFile::default()
        }
    };

    // ── Wire the allocator ────────────────────────────────────────────────────
    let store = Arc::new(MemStore::from_cluster(&config.cluster));
    let deps = Collaborators {
        locks: Arc::new(MemLockService::new()),
        directory: store.clone(),
        pending: store.clone(),
        scheduler: Arc::new(BasicScheduler::new(config.alloc.share_base)),
        ledger: store.clone(),
        processing: store.clone(),
    };
    let transcript = Transcript::spawn(config.alloc.transcript_capacity);
    let allocator = Allocator::new(config.alloc, deps, transcript);

    let opts = DeployOptions {
        appname: cli.app,
        entrypoint: cli.entrypoint,
        process_ident: process_ident(),
        podname: cli.pod,
        nodename: cli.node,
        node_labels: cli.labels.into_iter().collect::<BTreeMap<_, _>>(),
        nodes_limit: cli.nodes_limit,
        count: cli.count,
        cpu_quota: cli.cpu,
        memory: cli.memory,
        pod_type: cli.priority,
        deploy_method: cli.method,
    };

    // ── Allocate ──────────────────────────────────────────────────────────────
    match allocator.allocate(&opts).await {
        Ok(nodes) => {
            info!("Allocated on {} node(s):", nodes.len());
            for node in &nodes {
                info!(
                    "  [{name}]  deploy={deploy}  capacity={cap}  plans={plans}",
                    name = node.name,
                    deploy = node.deploy,
                    cap = node.capacity,
                    plans = node.cpu_plan.len(),
                );
            }
            for record in store.processing_records() {
                info!("  processing {} count={}", record.key(), record.count);
            }
            // Let the transcript worker drain before the runtime shuts down.
            tokio::task::yield_now().await;
        }
        Err(e) => {
            error!(retryable = e.is_retryable(), "Allocation failed: {}", e);
            process::exit(1);
        }
    }
}
