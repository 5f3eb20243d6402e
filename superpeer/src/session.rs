//! Per-connection dispatch (§4.1, §4.8): read the handshake, classify the remote party as
//! neighbor super-peer, own leaf, or foreign, then either run a persistent leaf session or serve
//! a single one-shot neighbor request.

use std::sync::Arc;

use anyhow::Context;
use common::{Address, Frame};
use net::Connection;
use tokio::sync::mpsc;

use crate::invalidation::handle_invalidate;
use crate::node::SuperPeerNode;
use crate::router::{handle_query, relay_queryhit};

/// Entry point for every accepted connection: classify, then dispatch.
pub async fn handle_connection(node: Arc<SuperPeerNode>, mut conn: Connection) -> anyhow::Result<()> {
    let peer = conn.read_handshake().await.context("handshake failed")?;
    if node.is_leaf(&peer) {
        tracing::debug!(%peer, "leaf session opened");
        run_leaf_session(node, conn, peer).await;
    } else if node.is_neighbor(&peer) {
        tracing::debug!(%peer, "neighbor exchange opened");
        run_one_shot(node, conn, peer).await;
    } else {
        tracing::warn!(%peer, "rejecting connection from party unknown to topology");
    }
    Ok(())
}

/// A leaf's persistent connection: loop reading frames until EOF while also draining any
/// queryhits the query router pushes onto this session (§4.3 requires a leaf's queryhits arrive
/// over its existing persistent connection, not a fresh one), cascading deregister of every file
/// this leaf advertised once the session closes (§4.8).
async fn run_leaf_session(node: Arc<SuperPeerNode>, mut conn: Connection, leaf: Address) {
    let (tx, mut rx) = mpsc::unbounded_channel::<Frame>();
    node.register_leaf_link(leaf.clone(), tx);

    loop {
        tokio::select! {
            read = conn.read_frame() => {
                let frame = match read {
                    Ok(Some(frame)) => frame,
                    Ok(None) => break,
                    Err(err) => {
                        tracing::warn!(%leaf, error = %err, "leaf session read failed");
                        break;
                    }
                };
                if let Err(err) = dispatch_frame(&node, &mut conn, frame, leaf.clone(), true).await {
                    tracing::warn!(%leaf, error = %err, "leaf session frame handling failed");
                    break;
                }
            }
            pushed = rx.recv() => {
                let Some(frame) = pushed else { continue };
                if let Err(err) = conn.write_frame(&frame).await {
                    tracing::warn!(%leaf, error = %err, "failed to push queryhit to leaf session");
                    break;
                }
            }
        }
    }
    node.unregister_leaf_link(&leaf);
    tracing::info!(%leaf, "leaf session closed, cascading deregister");
    node.registry.deregister_all(&leaf);
}

/// A neighbor's per-message exchange: one request, then the connection is expected to close.
async fn run_one_shot(node: Arc<SuperPeerNode>, mut conn: Connection, neighbor: Address) {
    let frame = match conn.read_frame().await {
        Ok(Some(frame)) => frame,
        Ok(None) => return,
        Err(err) => {
            tracing::warn!(%neighbor, error = %err, "neighbor exchange read failed");
            return;
        }
    };
    if let Err(err) = dispatch_frame(&node, &mut conn, frame, neighbor.clone(), false).await {
        tracing::warn!(%neighbor, error = %err, "neighbor exchange frame handling failed");
    }
}

/// Dispatches one frame. `from_leaf_session` selects the `source_address` rule of §4.3/§4.4: a
/// query or invalidate arriving over a leaf's own session is sourced from that leaf; arriving
/// from a neighbor it is sourced from `msg.sender` (the upstream super-peer carried on the wire).
async fn dispatch_frame(
    node: &Arc<SuperPeerNode>,
    conn: &mut Connection,
    frame: Frame,
    peer: Address,
    from_leaf_session: bool,
) -> anyhow::Result<()> {
    match frame {
        Frame::Register(msg) => {
            node.registry.register(&msg.file_info.name, peer.clone());
            tracing::info!(leaf = %peer, file = %msg.file_info.name, "registered");
            conn.write_frame(&Frame::StatusCode(0)).await?;
        }
        Frame::Deregister(msg) => {
            node.registry.deregister(&msg.file_info.name, &peer);
            tracing::info!(leaf = %peer, file = %msg.file_info.name, "deregistered");
            conn.write_frame(&Frame::StatusCode(0)).await?;
        }
        Frame::Query(msg) => {
            let source = if from_leaf_session {
                peer.clone()
            } else {
                msg.sender.clone()
            };
            handle_query(node.clone(), msg, source).await;
        }
        Frame::QueryHit(msg, holder) => {
            relay_queryhit(node.clone(), msg, holder).await;
        }
        Frame::Invalidate(msg) => {
            let source = if from_leaf_session {
                peer.clone()
            } else {
                msg.sender.clone()
            };
            handle_invalidate(node.clone(), msg, source).await;
        }
        other => {
            tracing::warn!(%peer, frame = %other, "unexpected frame at super-peer");
        }
    }
    Ok(())
}
