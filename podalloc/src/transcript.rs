/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Best-effort allocation transcript.
//!
//! After a successful allocation the allocator hands an owned copy of the
//! result to [`Transcript::record`].  The copy travels over a bounded channel
//! to a background task that logs one entry per node, CPU plan rendered as
//! YAML.  `record` never waits: when the queue is full, or the worker is
//! gone, the summary is dropped.

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::types::NodeInfo;

/// One allocation result, as submitted to the transcript.
#[derive(Debug)]
struct Summary {
    podname: String,
    nodes: Vec<NodeInfo>,
}

#[derive(Debug, Clone)]
pub struct Transcript {
    tx: Option<mpsc::Sender<Summary>>,
}

impl Transcript {
    /// Start the worker on the current tokio runtime.
    ///
    /// Outside a runtime the transcript is created disabled.
    pub fn spawn(capacity: usize) -> Self {
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            warn!("no tokio runtime, allocation transcript disabled");
            return Self::disabled();
        };
        let (tx, rx) = mpsc::channel(capacity.max(1));
        handle.spawn(run(rx));
        Self { tx: Some(tx) }
    }

    /// A transcript that drops everything.
    pub fn disabled() -> Self {
        Self { tx: None }
    }

    /// Queue `nodes` for logging.  Returns `false` if the summary was dropped.
    pub fn record(&self, podname: &str, nodes: Vec<NodeInfo>) -> bool {
        let Some(tx) = &self.tx else {
            return false;
        };
        let summary = Summary {
            podname: podname.to_string(),
            nodes,
        };
        match tx.try_send(summary) {
            Ok(()) => true,
            Err(e) => {
                debug!(pod = %podname, reason = %e, "allocation transcript dropped");
                false
            }
        }
    }
}

async fn run(mut rx: mpsc::Receiver<Summary>) {
    while let Some(summary) = rx.recv().await {
        info!(pod = %summary.podname, nodes = summary.nodes.len(), "[allocate] result");
        for node in &summary.nodes {
            match serde_yaml::to_string(&node.cpu_plan) {
                Ok(plan) => info!(
                    "[allocate] deploy {} to {}\n{}",
                    node.deploy,
                    node.name,
                    plan
                ),
                Err(e) => warn!(node = %node.name, error = %e, "cannot render cpu plan"),
            }
        }
    }
    debug!("allocation transcript closed");
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn result() -> Vec<NodeInfo> {
        vec![NodeInfo {
            name: "n1".into(),
            deploy: 1,
            cpu_plan: vec![[("0", 100u64)].into_iter().collect()],
            ..Default::default()
        }]
    }

    #[test]
    fn disabled_transcript_drops_everything() {
        assert!(!Transcript::disabled().record("pod", result()));
    }

    #[test]
    fn spawn_outside_runtime_is_disabled() {
        assert!(!Transcript::spawn(4).record("pod", result()));
    }

    #[tokio::test]
    async fn record_never_blocks_when_full() {
        // current-thread runtime: the worker cannot drain until we yield
        let t = Transcript::spawn(1);
        assert!(t.record("pod", result()));
        assert!(!t.record("pod", result()), "second summary must be dropped");
    }
}
