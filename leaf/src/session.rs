//! Leaf-side connection handling (§4.1): the leaf's own inbound listener serves one-shot peer
//! requests (`obtain`, `status`, `invalidate`), while the persistent outbound link to its
//! super-peer is driven by a dedicated receive loop that demultiplexes pushed `queryhit`/
//! `invalidate` frames and `StatusCode` replies.

use std::sync::Arc;

use common::{Address, Frame};
use net::{Connection, ConnectionReadHalf};

use crate::consistency::respond_to_status;
use crate::download::{handle_queryhit, serve_obtain};
use crate::invalidation::handle_invalidate as handle_invalidate_push;
use crate::node::LeafNode;

/// Entry point for every connection accepted by the leaf's own listener: every inbound
/// connection here is a single peer-to-peer request, never a persistent session (unlike the
/// super-peer's leaf sessions).
pub async fn handle_inbound(node: Arc<LeafNode>, mut conn: Connection) -> anyhow::Result<()> {
    let peer = conn.read_handshake().await?;
    let frame = match conn.read_frame().await? {
        Some(frame) => frame,
        None => return Ok(()),
    };
    match frame {
        Frame::Obtain(msg) => {
            serve_obtain(node, conn, msg).await?;
        }
        Frame::Status(probe) => {
            let reply = respond_to_status(&node, probe).await;
            conn.write_frame(&reply).await?;
        }
        Frame::Invalidate(msg) => {
            // A direct invalidate from a peer other than our super-peer is not part of the
            // protocol (invalidations are always relayed through the backbone), but handle it
            // the same way rather than special-casing the source.
            handle_invalidate_push(node, msg).await;
        }
        other => {
            tracing::warn!(%peer, frame = %other, "unexpected frame at leaf listener");
        }
    }
    Ok(())
}

/// Drives the persistent super-peer link's read half for the lifetime of the connection: pushes
/// (`queryhit`, `invalidate`) are dispatched to their handlers, and `StatusCode` replies are
/// handed back to whichever call in [`crate::node::SuperPeerLink`] is waiting for one.
pub async fn run_super_peer_receive_loop(node: Arc<LeafNode>, mut read_half: ConnectionReadHalf) {
    loop {
        let frame = match read_half.read_frame().await {
            Ok(Some(frame)) => frame,
            Ok(None) => {
                tracing::warn!("super-peer link closed");
                break;
            }
            Err(err) => {
                tracing::warn!(error = %err, "super-peer link read failed");
                break;
            }
        };
        dispatch_push(&node, frame).await;
    }
}

async fn dispatch_push(node: &Arc<LeafNode>, frame: Frame) {
    match frame {
        Frame::QueryHit(msg, holder) => {
            handle_queryhit(node.clone(), msg, holder).await;
        }
        Frame::Invalidate(msg) => {
            handle_invalidate_push(node.clone(), msg).await;
        }
        Frame::StatusCode(code) => {
            node.link.deliver_status(code).await;
        }
        other => {
            tracing::warn!(frame = %other, "unexpected frame on super-peer link");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::{ConsistencyModel, FileInfo, Message};
    use tempfile::TempDir;

    fn addr(port: u16) -> Address {
        Address::new("127.0.0.1", port)
    }

    async fn test_node(tmp: &TempDir) -> Arc<LeafNode> {
        let owned = tmp.path().join("owned");
        let downloads = tmp.path().join("downloads");
        tokio::fs::create_dir_all(&owned).await.unwrap();
        tokio::fs::create_dir_all(&downloads).await.unwrap();
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let sp_addr = listener.local_addr().unwrap();
        let sp = addr(sp_addr.port());
        tokio::spawn(async move {
            let _ = listener.accept().await;
        });
        let me = addr(1);
        let (link, _read) = crate::node::connect_super_peer(&sp, &me).await.unwrap();
        LeafNode::new(
            me,
            sp,
            owned,
            downloads,
            ConsistencyModel::Push,
            common::TTL_DEFAULT,
            link,
        )
    }

    async fn loopback_pair() -> (Connection, Connection) {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let local = listener.local_addr().unwrap();
        let connect_fut = tokio::net::TcpStream::connect(local);
        let (server_res, client_res) = tokio::join!(listener.accept(), connect_fut);
        (
            Connection::new(server_res.unwrap().0),
            Connection::new(client_res.unwrap()),
        )
    }

    #[tokio::test]
    async fn status_probe_is_answered_from_the_local_registry() {
        let tmp = TempDir::new().unwrap();
        let node = test_node(&tmp).await;
        node.registry.insert(FileInfo::new("Coco.mp4", node.address.clone(), 3));

        let (server, mut client) = loopback_pair().await;
        client.write_frame(&Frame::Handshake(addr(9999))).await.unwrap();
        let server_task = tokio::spawn(handle_inbound(node.clone(), server));

        let probe = FileInfo::new("Coco.mp4", node.address.clone(), 1);
        client.write_frame(&Frame::Status(probe)).await.unwrap();
        let reply = client.read_frame().await.unwrap().unwrap();
        assert_eq!(reply, Frame::Outdated);
        server_task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn status_code_push_is_delivered_to_the_waiting_caller() {
        let tmp = TempDir::new().unwrap();
        let node = test_node(&tmp).await;
        dispatch_push(&node, Frame::StatusCode(0)).await;
        // No pending caller: delivery is a harmless no-op, exercised for coverage of the
        // "reply arrives with nobody waiting" path.
        assert!(node.registry.is_empty());
    }

    #[tokio::test]
    async fn unrelated_frame_on_super_peer_link_is_logged_and_ignored() {
        let tmp = TempDir::new().unwrap();
        let node = test_node(&tmp).await;
        let msg = Message::new(
            "127.0.0.1:9000-1",
            1,
            FileInfo::new("a.txt", addr(9000), 1),
            addr(9000),
        );
        dispatch_push(&node, Frame::Register(msg)).await;
        assert!(node.registry.is_empty());
    }
}
