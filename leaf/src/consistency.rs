//! The pull-model consistency checker (§4.5): a periodic task that re-validates replicas against
//! their origin, plus the origin-side responder for inbound `status` probes.

use std::sync::Arc;
use std::time::{Duration, Instant};

use common::{ConsistencyModel, Frame};
use net::Connection;
use tokio_util::sync::CancellationToken;

use crate::invalidation::{drop_registry_entry, send_deregister};
use crate::node::LeafNode;

/// Spawns the periodic checker. A no-op (returns immediately) under the push model: pull is the
/// only model that polls.
pub fn spawn(node: Arc<LeafNode>, shutdown: CancellationToken) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let ConsistencyModel::Pull { ttr_minutes } = node.model else {
            return;
        };
        let ttr = Duration::from_secs(ttr_minutes * 60);
        let period = Duration::from_secs(common::CONSISTENCY_CHECK_PERIOD_SECS);
        let mut tick = tokio::time::interval(period);
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tick.tick() => check_all(&node, ttr).await,
            }
        }
    })
}

/// Runs one polling pass over every replica due for a status probe. Exposed beyond this module
/// so integration tests can drive a deterministic pull-model tick without waiting out the real
/// `CONSISTENCY_CHECK_PERIOD_SECS` timer that [`spawn`] runs on.
pub async fn check_all(node: &Arc<LeafNode>, ttr: Duration) {
    let now = Instant::now();
    for (name, info, last_checked) in node.registry.replicas_not_owned_by(&node.address) {
        let due = match last_checked {
            Some(at) => now.duration_since(at) >= ttr,
            None => true,
        };
        if due {
            check_one(node, &name, &info).await;
        }
    }
}

async fn check_one(node: &Arc<LeafNode>, name: &str, info: &common::FileInfo) {
    match probe_origin(node, info).await {
        Ok(Frame::Deleted) => {
            tracing::info!(file = %name, "origin reports file deleted, dropping replica");
            drop_registry_entry(node, name, true).await;
            deregister_replica(node, info.clone()).await;
        }
        Ok(Frame::Outdated) => {
            tracing::info!(file = %name, "replica is outdated, dropping registry entry");
            drop_registry_entry(node, name, false).await;
            deregister_replica(node, info.clone()).await;
        }
        Ok(Frame::UpToDate) => {
            node.registry.set_last_checked(name, Instant::now());
        }
        Ok(other) => {
            tracing::warn!(file = %name, frame = %other, "unexpected reply to status probe");
        }
        Err(err) => {
            tracing::warn!(file = %name, error = %err, "status probe failed, will retry next tick");
        }
    }
}

async fn deregister_replica(node: &Arc<LeafNode>, info: common::FileInfo) {
    if let Err(err) = send_deregister(node, info).await {
        tracing::warn!(error = %err, "failed to deregister stale replica with super-peer");
    }
}

async fn probe_origin(node: &Arc<LeafNode>, info: &common::FileInfo) -> anyhow::Result<Frame> {
    let mut conn = Connection::connect(&info.origin, &node.address).await?;
    conn.write_frame(&Frame::Status(info.clone())).await?;
    match conn.read_frame().await? {
        Some(frame) => Ok(frame),
        None => Err(anyhow::anyhow!("origin closed the connection before replying")),
    }
}

/// Handles an inbound `status <fileinfo>` probe at a file's origin leaf: compares the caller's
/// version against this leaf's own registry entry.
pub async fn respond_to_status(node: &Arc<LeafNode>, probe: common::FileInfo) -> Frame {
    match node.registry.get(&probe.name) {
        None => Frame::Deleted,
        Some(current) if current.version != probe.version => Frame::Outdated,
        Some(_) => Frame::UpToDate,
    }
}
