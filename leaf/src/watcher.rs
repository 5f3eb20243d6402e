//! Filesystem watcher over `owned/` (§4.7): bridges `notify`'s blocking callback through a
//! forwarding thread into an async task that registers, re-registers, and deregisters owned
//! files as they appear, change, and disappear on disk.

use std::path::{Path, PathBuf};
use std::sync::mpsc as std_mpsc;
use std::sync::Arc;

use anyhow::Context;
use common::FileInfo;
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::invalidation::{deregister_owned, maybe_emit_invalidate, send_register};
use crate::node::LeafNode;

/// Registers every file already present in `owned/` at process startup (§3: "leaf FileInfos are
/// created on directory scan at startup"). Must run after the super-peer link's receive loop is
/// already draining replies, since [`send_register`] awaits a `StatusCode` delivered by it.
/// `downloads/` is never scanned: a replica's origin/version can't be recovered from the
/// filename alone, and the registry is process-memory only (§1 Non-goals), so a restarted leaf
/// simply forgets replicas it held before.
pub async fn initial_scan(node: &Arc<LeafNode>) -> anyhow::Result<()> {
    let mut entries = tokio::fs::read_dir(&node.owned_dir)
        .await
        .with_context(|| format!("failed to scan {:?}", node.owned_dir))?;
    while let Some(entry) = entries.next_entry().await? {
        if !entry.file_type().await?.is_file() {
            continue;
        }
        let Some(name) = entry.file_name().to_str().map(str::to_string) else {
            continue;
        };
        if node.registry.contains(&name) {
            continue;
        }
        let info = FileInfo::new(name.clone(), node.address.clone(), 1);
        node.registry.insert(info.clone());
        tracing::info!(file = %name, "owned file found at startup, registering");
        if let Err(err) = send_register(node, info).await {
            tracing::warn!(file = %name, error = %err, "failed to register owned file found at startup");
        }
    }
    Ok(())
}

/// Starts the watcher task. Returns once the initial `notify::Watcher` is installed; the
/// returned join handle runs until `shutdown` is cancelled or the watch channel closes.
pub fn spawn(node: std::sync::Arc<LeafNode>, shutdown: CancellationToken) -> anyhow::Result<tokio::task::JoinHandle<()>> {
    let (std_tx, std_rx) = std_mpsc::channel::<notify::Result<Event>>();
    let mut watcher: RecommendedWatcher = notify::recommended_watcher(move |res| {
        // notify delivers events from its own OS-level watch thread; forwarding errors here
        // just mean the async side has already shut down.
        let _ = std_tx.send(res);
    })?;
    watcher.watch(&node.owned_dir, RecursiveMode::NonRecursive)?;

    let (tx, mut rx) = mpsc::unbounded_channel::<notify::Result<Event>>();
    std::thread::Builder::new()
        .name("owned-watcher-bridge".into())
        .spawn(move || {
            while let Ok(res) = std_rx.recv() {
                if tx.send(res).is_err() {
                    break;
                }
            }
        })?;

    let handle = tokio::spawn(async move {
        // Keep the watcher alive for the task's lifetime; dropping it would stop delivery.
        let _watcher = watcher;
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                event = rx.recv() => {
                    match event {
                        Some(Ok(event)) => handle_event(&node, event).await,
                        Some(Err(err)) => tracing::warn!(error = %err, "filesystem watch error"),
                        None => break,
                    }
                }
            }
        }
    });
    Ok(handle)
}

async fn handle_event(node: &std::sync::Arc<LeafNode>, event: Event) {
    for path in event.paths {
        let Some(name) = file_name(&path) else { continue };
        match event.kind {
            EventKind::Create(_) => on_create(node, &name).await,
            EventKind::Modify(_) => on_modify(node, &name).await,
            EventKind::Remove(_) => on_remove(node, &name).await,
            _ => {}
        }
    }
}

fn file_name(path: &Path) -> Option<String> {
    path.file_name().map(|n| n.to_string_lossy().into_owned())
}

/// A new file appeared in *owned/*: register it at version 1.
async fn on_create(node: &std::sync::Arc<LeafNode>, name: &str) {
    if node.registry.contains(name) {
        // Some platforms report a Create followed immediately by a Modify for the same write;
        // treat a Create for an already-known name as a no-op rather than resetting its version.
        return;
    }
    let info = FileInfo::new(name.to_string(), node.address.clone(), 1);
    node.registry.insert(info.clone());
    tracing::info!(file = %name, "new owned file detected, registering");
    if let Err(err) = send_register(node, info).await {
        tracing::warn!(file = %name, error = %err, "failed to register new owned file");
    }
}

/// An owned file changed on disk: bump its version and, under push, invalidate replicas.
async fn on_modify(node: &std::sync::Arc<LeafNode>, name: &str) {
    let info = match node.registry.bump_version(name) {
        Some(info) => info,
        None => {
            // Modify for a file we never saw a Create for (e.g. watcher started after the file
            // already existed); treat it like a fresh registration.
            let info = FileInfo::new(name.to_string(), node.address.clone(), 1);
            node.registry.insert(info.clone());
            if let Err(err) = send_register(node, info.clone()).await {
                tracing::warn!(file = %name, error = %err, "failed to register owned file on modify");
            }
            info
        }
    };
    tracing::info!(file = %name, version = info.version, "owned file modified, bumping version");
    maybe_emit_invalidate(node, info).await;
}

/// An owned file was deleted on disk: deregister at the super-peer and, under push, invalidate.
async fn on_remove(node: &std::sync::Arc<LeafNode>, name: &str) {
    let Some(info) = node.registry.remove(name) else {
        return;
    };
    tracing::info!(file = %name, "owned file removed, deregistering");
    deregister_owned(node, info).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::{Address, ConsistencyModel};
    use net::Connection;
    use tempfile::TempDir;

    fn addr(port: u16) -> Address {
        Address::new("127.0.0.1", port)
    }

    async fn test_node(tmp: &TempDir) -> (std::sync::Arc<LeafNode>, tokio::task::JoinHandle<Vec<common::Frame>>) {
        let owned = tmp.path().join("owned");
        let downloads = tmp.path().join("downloads");
        tokio::fs::create_dir_all(&owned).await.unwrap();
        tokio::fs::create_dir_all(&downloads).await.unwrap();
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let sp_addr = listener.local_addr().unwrap();
        let sp = addr(sp_addr.port());
        let recorder = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut conn = Connection::new(stream);
            let _ = conn.read_handshake().await;
            let mut seen = Vec::new();
            loop {
                match conn.read_frame().await {
                    Ok(Some(frame)) => {
                        if matches!(frame, common::Frame::Register(_) | common::Frame::Deregister(_)) {
                            let _ = conn.write_frame(&common::Frame::StatusCode(0)).await;
                        }
                        seen.push(frame);
                    }
                    _ => break,
                }
            }
            seen
        });
        let me = addr(1);
        let (link, read_half) = crate::node::connect_super_peer(&sp, &me).await.unwrap();
        let node = LeafNode::new(
            me,
            sp,
            owned,
            downloads,
            ConsistencyModel::Push,
            common::TTL_DEFAULT,
            link,
        );
        tokio::spawn(crate::session::run_super_peer_receive_loop(node.clone(), read_half));
        (node, recorder)
    }

    #[tokio::test]
    async fn create_then_modify_then_remove_drive_registry_lifecycle() {
        let tmp = TempDir::new().unwrap();
        let (node, _recorder) = test_node(&tmp).await;

        on_create(&node, "Coco.mp4").await;
        assert!(node.registry.contains("Coco.mp4"));
        assert_eq!(node.registry.get("Coco.mp4").unwrap().version, 1);

        on_modify(&node, "Coco.mp4").await;
        assert_eq!(node.registry.get("Coco.mp4").unwrap().version, 2);

        on_remove(&node, "Coco.mp4").await;
        assert!(!node.registry.contains("Coco.mp4"));
    }

    #[tokio::test]
    async fn create_is_a_no_op_for_an_already_registered_name() {
        let tmp = TempDir::new().unwrap();
        let (node, _recorder) = test_node(&tmp).await;
        on_create(&node, "Coco.mp4").await;
        on_modify(&node, "Coco.mp4").await;
        assert_eq!(node.registry.get("Coco.mp4").unwrap().version, 2);
        on_create(&node, "Coco.mp4").await;
        assert_eq!(node.registry.get("Coco.mp4").unwrap().version, 2);
    }

    #[tokio::test]
    async fn remove_of_an_unknown_name_does_nothing() {
        let tmp = TempDir::new().unwrap();
        let (node, _recorder) = test_node(&tmp).await;
        on_remove(&node, "never-seen.txt").await;
        assert!(!node.registry.contains("never-seen.txt"));
    }
}
