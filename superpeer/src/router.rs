//! The query router: dedup, local resolution, neighbor forwarding, and reverse-path queryhit
//! relay (§4.3).

use std::sync::Arc;

use common::{Address, Frame, Message};

use crate::node::SuperPeerNode;

/// Handles one inbound `query m`, arriving either from `node`'s own leaf or from a neighbor
/// super-peer. `source_address` is the leaf that issued the query if this is a leaf session,
/// otherwise `m.sender` (the upstream super-peer) — the caller resolves which, since only it
/// knows whether the connection is a leaf session or a neighbor exchange.
pub async fn handle_query(node: Arc<SuperPeerNode>, msg: Message, source_address: Address) {
    if !node.history.try_record(&msg.message_id, source_address.clone()) {
        tracing::debug!(message_id = %msg.message_id, "duplicate query dropped");
        return;
    }

    let holders = node.registry.holders(&msg.file_info.name);
    if !holders.is_empty() {
        reply_with_queryhits(&node, &msg, &source_address, &holders).await;
    }

    if msg.ttl > 0 {
        let pre_rewrite_sender = msg.sender.clone();
        let forwarded = msg.forwarded(node.address.clone());
        for neighbor in node.forward_targets(&pre_rewrite_sender) {
            let neighbor = neighbor.clone();
            let node = node.clone();
            let forwarded = forwarded.clone();
            tokio::spawn(async move {
                if let Err(err) =
                    net::send_one_shot(&neighbor, &node.address, &Frame::Query(forwarded.clone()), false)
                        .await
                {
                    tracing::warn!(%neighbor, error = %err, "failed to forward query");
                }
            });
        }
    }
}

async fn reply_with_queryhits(
    node: &Arc<SuperPeerNode>,
    msg: &Message,
    source_address: &Address,
    holders: &[Address],
) {
    if node.is_leaf(source_address) {
        for holder in holders {
            let frame = Frame::QueryHit(msg.clone(), holder.clone());
            if !node.push_to_leaf(source_address, frame) {
                tracing::warn!(%source_address, "no live session for leaf, dropping queryhit");
                break;
            }
        }
        return;
    }

    let mut conn = match net::Connection::connect(source_address, &node.address).await {
        Ok(conn) => conn,
        Err(err) => {
            tracing::warn!(%source_address, error = %err, "failed to open queryhit back-connection");
            return;
        }
    };
    for holder in holders {
        let frame = Frame::QueryHit(msg.clone(), holder.clone());
        if let Err(err) = conn.write_frame(&frame).await {
            tracing::warn!(%source_address, error = %err, "failed to deliver queryhit");
            return;
        }
    }
    let _ = conn.shutdown().await;
}

/// Handles an inbound `queryhit m h` at a super-peer: relays it one hop further back toward
/// the originator via the history's recorded return address, or drops it silently if the
/// history entry has already been evicted.
pub async fn relay_queryhit(node: Arc<SuperPeerNode>, msg: Message, holder: Address) {
    let Some(return_address) = node.history.return_address(&msg.message_id) else {
        tracing::debug!(message_id = %msg.message_id, "queryhit for evicted history entry dropped");
        return;
    };
    let frame = Frame::QueryHit(msg, holder);
    if node.is_leaf(&return_address) {
        if !node.push_to_leaf(&return_address, frame) {
            tracing::warn!(%return_address, "no live session for leaf, dropping queryhit");
        }
        return;
    }
    if let Err(err) = net::send_one_shot(&return_address, &node.address, &frame, false).await {
        tracing::warn!(%return_address, error = %err, "failed to relay queryhit");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(port: u16) -> Address {
        Address::new("127.0.0.1", port)
    }

    fn msg(ttl: u32, sender: Address) -> Message {
        Message::new("127.0.0.1:6001-1", ttl, common::FileInfo::new("Coco.mp4", addr(6003), 1), sender)
    }

    #[tokio::test]
    async fn duplicate_query_is_not_recorded_twice() {
        let node = SuperPeerNode::new(addr(5000), vec![], vec![addr(6001)]);
        let m = msg(5, addr(6001));
        handle_query(node.clone(), m.clone(), addr(6001)).await;
        assert_eq!(node.history.len(), 1);
        handle_query(node.clone(), m, addr(6001)).await;
        assert_eq!(node.history.len(), 1);
    }

    #[tokio::test]
    async fn ttl_zero_query_is_recorded_but_not_forwarded() {
        let node = SuperPeerNode::new(addr(5000), vec![addr(5001)], vec![]);
        let m = msg(0, addr(6001));
        handle_query(node.clone(), m, addr(6001)).await;
        assert_eq!(node.history.len(), 1);
    }

    #[tokio::test]
    async fn relay_queryhit_drops_silently_when_history_entry_missing() {
        let node = SuperPeerNode::new(addr(5000), vec![], vec![]);
        relay_queryhit(node, msg(5, addr(5000)), addr(6001)).await;
    }

    #[tokio::test]
    async fn query_with_a_local_holder_pushes_the_queryhit_onto_the_leaf_s_live_session() {
        let node = SuperPeerNode::new(addr(5000), vec![], vec![addr(6001), addr(6002)]);
        node.registry.register("Coco.mp4", addr(6002));
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        node.register_leaf_link(addr(6001), tx);

        handle_query(node.clone(), msg(5, addr(6001)), addr(6001)).await;

        let delivered = rx.try_recv().unwrap();
        assert_eq!(delivered, Frame::QueryHit(msg(5, addr(6001)), addr(6002)));
    }

    #[tokio::test]
    async fn relay_queryhit_pushes_onto_the_originating_leaf_s_session_when_known() {
        let node = SuperPeerNode::new(addr(5000), vec![], vec![addr(6001)]);
        node.history.try_record("127.0.0.1:6001-1", addr(6001));
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        node.register_leaf_link(addr(6001), tx);

        relay_queryhit(node, msg(5, addr(5000)), addr(9000)).await;

        let delivered = rx.try_recv().unwrap();
        assert_eq!(delivered, Frame::QueryHit(msg(5, addr(5000)), addr(9000)));
    }
}
