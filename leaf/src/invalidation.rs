//! The leaf side of invalidation handling and the "leaf-side deregister path" shared by
//! `invalidate` receipt, pull-mode status verdicts, and the CLI/watcher owned-file deregister
//! commands (§4.4, §4.5).

use std::sync::Arc;

use common::{ConsistencyModel, FileInfo, Frame, Message};

use crate::node::LeafNode;

/// Removes `name` from the registry. If `delete_replica`, the corresponding `downloads/<name>`
/// file is also deleted: an invalidate receipt and a pull-mode `deleted` verdict delete the
/// replica, while a pull `outdated` verdict and the owned-file deregister paths do not (§4.4,
/// §4.5).
pub async fn drop_registry_entry(node: &Arc<LeafNode>, name: &str, delete_replica: bool) {
    node.registry.remove(name);
    if delete_replica {
        let path = node.downloads_path(name);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {}
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => {
                tracing::warn!(file = %name, error = %err, "failed to delete replica file")
            }
        }
    }
}

/// Announces `info` to this leaf's own super-peer.
pub async fn send_register(node: &Arc<LeafNode>, info: FileInfo) -> anyhow::Result<i32> {
    let msg = Message::new(node.make_message_id(), node.ttl, info, node.address.clone());
    node.link.send_awaiting_status(&Frame::Register(msg)).await
}

/// Retracts `info` at this leaf's own super-peer.
pub async fn send_deregister(node: &Arc<LeafNode>, info: FileInfo) -> anyhow::Result<i32> {
    let msg = Message::new(node.make_message_id(), node.ttl, info, node.address.clone());
    node.link
        .send_awaiting_status(&Frame::Deregister(msg))
        .await
}

/// Emits a fresh `invalidate` flood for `info`, under the push model only (§4.4).
pub async fn maybe_emit_invalidate(node: &Arc<LeafNode>, info: FileInfo) {
    if !matches!(node.model, ConsistencyModel::Push) {
        return;
    }
    let msg = Message::new(node.make_message_id(), node.ttl, info, node.address.clone());
    if let Err(err) = node.link.send(&Frame::Invalidate(msg)).await {
        tracing::warn!(error = %err, "failed to emit invalidate");
    }
}

/// The full leaf-side deregister path used on `deregister` of an owned file (§4.4): retract at
/// the super-peer and, under push, emit an invalidate. Does not touch the file on disk — the
/// caller (CLI or filesystem watcher) already knows whether the file still exists.
pub async fn deregister_owned(node: &Arc<LeafNode>, info: FileInfo) {
    let name = info.name.clone();
    if let Err(err) = send_deregister(node, info.clone()).await {
        tracing::warn!(file = %name, error = %err, "failed to deregister with super-peer");
    }
    maybe_emit_invalidate(node, info).await;
}

/// Handles an inbound `invalidate m` pushed by the super-peer (§4.4). By protocol construction a
/// leaf never receives an invalidate for a file it originates, so this only ever affects a
/// replica in *downloads/*.
pub async fn handle_invalidate(node: Arc<LeafNode>, msg: Message) {
    let name = msg.file_info.name.clone();
    tracing::info!(file = %name, "invalidate received, dropping replica");
    drop_registry_entry(&node, &name, true).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::Address;
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

    #[tokio::test]
    async fn invalidate_receipt_removes_registry_and_deletes_replica_file() {
        let tmp = TempDir::new().unwrap();
        let node = test_node(&tmp).await;
        let info = FileInfo::new("Coco.mp4", addr(6003), 1);
        node.registry.insert(info.clone());
        tokio::fs::write(node.downloads_path("Coco.mp4"), b"data").await.unwrap();

        let msg = Message::new("127.0.0.1:6003-1", 5, info, addr(5000));
        handle_invalidate(node.clone(), msg).await;

        assert!(!node.registry.contains("Coco.mp4"));
        assert!(tokio::fs::metadata(node.downloads_path("Coco.mp4")).await.is_err());
    }

    #[tokio::test]
    async fn outdated_path_drops_registry_but_preserves_file() {
        let tmp = TempDir::new().unwrap();
        let node = test_node(&tmp).await;
        node.registry.insert(FileInfo::new("Coco.mp4", addr(6003), 1));
        tokio::fs::write(node.downloads_path("Coco.mp4"), b"data").await.unwrap();

        drop_registry_entry(&node, "Coco.mp4", false).await;

        assert!(!node.registry.contains("Coco.mp4"));
        assert!(tokio::fs::metadata(node.downloads_path("Coco.mp4")).await.is_ok());
    }
}
