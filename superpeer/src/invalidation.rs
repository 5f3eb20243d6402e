//! The super-peer side of the invalidation propagator (§4.4): notify every holder but the
//! sender, drop them from the registry, and flood onward while `ttl > 0`, using the same
//! forwarding rule the query router uses (decrement TTL, rewrite sender, skip the non-sender
//! neighbors) on every path, not just some.

use std::sync::Arc;

use common::{Address, Frame, Message};

use crate::node::SuperPeerNode;

pub async fn handle_invalidate(node: Arc<SuperPeerNode>, msg: Message, source_address: Address) {
    if !node.history.try_record(&msg.message_id, source_address.clone()) {
        tracing::debug!(message_id = %msg.message_id, "duplicate invalidate dropped");
        return;
    }

    let name = msg.file_info.name.clone();
    let holders = node.registry.holders(&name);
    for holder in holders {
        if holder == source_address {
            continue;
        }
        let frame = Frame::Invalidate(msg.clone());
        if let Err(err) = net::send_one_shot(&holder, &node.address, &frame, false).await {
            tracing::warn!(%holder, error = %err, "failed to deliver invalidate");
        }
        node.registry.deregister(&name, &holder);
    }

    if msg.ttl > 0 {
        let pre_rewrite_sender = msg.sender.clone();
        let forwarded = msg.forwarded(node.address.clone());
        for neighbor in node.forward_targets(&pre_rewrite_sender) {
            let neighbor = neighbor.clone();
            let node = node.clone();
            let forwarded = forwarded.clone();
            tokio::spawn(async move {
                if let Err(err) = net::send_one_shot(
                    &neighbor,
                    &node.address,
                    &Frame::Invalidate(forwarded.clone()),
                    false,
                )
                .await
                {
                    tracing::warn!(%neighbor, error = %err, "failed to forward invalidate");
                }
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(port: u16) -> Address {
        Address::new("127.0.0.1", port)
    }

    #[tokio::test]
    async fn deregisters_holders_other_than_the_sender() {
        let node = SuperPeerNode::new(addr(5000), vec![], vec![addr(6001), addr(6003)]);
        node.registry.register("Coco.mp4", addr(6001));
        node.registry.register("Coco.mp4", addr(6003));
        let msg = Message::new(
            "127.0.0.1:6003-1",
            5,
            common::FileInfo::new("Coco.mp4", addr(6003), 2),
            addr(6003),
        );
        handle_invalidate(node.clone(), msg, addr(6003)).await;
        // holder 6003 is the sender and is skipped; 6001 gets notified (best-effort network
        // call may fail in-test since nothing is listening, but registry removal happens
        // regardless of delivery outcome per §7's "log and drop" transient-failure policy).
        assert!(!node.registry.contains("Coco.mp4", &addr(6001)));
        assert!(node.registry.contains("Coco.mp4", &addr(6003)));
    }

    #[tokio::test]
    async fn duplicate_invalidate_is_a_noop() {
        let node = SuperPeerNode::new(addr(5000), vec![], vec![]);
        let msg = Message::new(
            "127.0.0.1:6003-1",
            5,
            common::FileInfo::new("Coco.mp4", addr(6003), 2),
            addr(6003),
        );
        handle_invalidate(node.clone(), msg.clone(), addr(6003)).await;
        assert_eq!(node.history.len(), 1);
        handle_invalidate(node.clone(), msg, addr(6003)).await;
        assert_eq!(node.history.len(), 1);
    }
}
