//! Shared harness for the end-to-end scenario tests: spins up real
//! `leaf`/`superpeer` nodes (actual listener, watcher, and link tasks — no mocked protocol
//! handling) bound to ephemeral `127.0.0.1` ports inside a `tempfile::TempDir`, the same
//! ephemeral-port-plus-tempdir idiom the unit tests throughout this workspace already use.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use common::{Address, ConsistencyModel, FileInfo, Frame, Message};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

pub fn addr(port: u16) -> Address {
    Address::new("127.0.0.1", port)
}

/// Reserves an OS-assigned ephemeral port by binding then immediately dropping a throwaway
/// listener, the same trick `net::listener`'s own tests use to learn a free port before the
/// real bind happens.
pub async fn reserve_port() -> u16 {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap().port()
}

/// Polls `pred` at a short interval until it's true or `timeout` elapses, returning whether it
/// ever became true. Used for every "eventually" assertion below since propagation across
/// spawned tasks isn't instantaneous even on localhost.
pub async fn wait_until<F: Fn() -> bool>(pred: F, timeout: Duration) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if pred() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

pub struct RunningSuperPeer {
    pub address: Address,
    pub node: Arc<superpeer::SuperPeerNode>,
    shutdown: CancellationToken,
}

impl Drop for RunningSuperPeer {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

/// Brings up a super-peer at a pre-reserved `address` with the given neighbor/leaf lists and
/// starts its real inbound listener (`superpeer::session::handle_connection` via `net::serve`).
/// `address` must be reserved by the caller ahead of time whenever other nodes in the same
/// topology need to name this super-peer in their own neighbor/leaf lists before it exists.
pub async fn spawn_superpeer(address: Address, neighbors: Vec<Address>, leaves: Vec<Address>) -> RunningSuperPeer {
    let node = superpeer::SuperPeerNode::new(address.clone(), neighbors, leaves);
    let shutdown = CancellationToken::new();

    let handler_node = node.clone();
    let handler = Arc::new(move |conn: net::Connection| {
        let node = handler_node.clone();
        async move { superpeer::session::handle_connection(node, conn).await }
    });
    let listen_addr = address.socket_addr();
    let listen_shutdown = shutdown.clone();
    tokio::spawn(async move { net::serve(&listen_addr, listen_shutdown, handler).await });

    tokio::time::sleep(Duration::from_millis(50)).await;
    RunningSuperPeer { address, node, shutdown }
}

pub struct RunningLeaf {
    pub address: Address,
    pub node: Arc<leaf::node::LeafNode>,
    _tmp: TempDir,
    shutdown: CancellationToken,
}

impl Drop for RunningLeaf {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

impl RunningLeaf {
    pub fn owned_path(&self, name: &str) -> PathBuf {
        self.node.owned_path(name)
    }

    pub fn downloads_path(&self, name: &str) -> PathBuf {
        self.node.downloads_path(name)
    }
}

/// Brings up a leaf at a pre-reserved `address` with no pre-existing owned files: connects to
/// `super_peer`, starts the super-peer link receive loop, the `owned/` watcher, the pull-model
/// consistency checker (a no-op background task under push), and the leaf's own inbound
/// listener. `address` must already appear in the super-peer's `leaves` list (a super-peer's
/// neighbor/leaf lists are fixed at construction, so the test must reserve every leaf's address
/// before building the super-peer it will attach to).
pub async fn spawn_leaf(address: Address, super_peer: Address, model: ConsistencyModel, ttl: u32) -> RunningLeaf {
    spawn_leaf_with_owned_files(address, super_peer, model, ttl, &[]).await
}

/// Like [`spawn_leaf`], but first writes `owned_files` (name, content) under `owned/` so the
/// leaf's startup directory scan (§3: "leaf FileInfos are created on directory scan at
/// startup") registers them with its super-peer before the node is handed back to the caller.
pub async fn spawn_leaf_with_owned_files(
    address: Address,
    super_peer: Address,
    model: ConsistencyModel,
    ttl: u32,
    owned_files: &[(&str, &[u8])],
) -> RunningLeaf {
    let tmp = TempDir::new().unwrap();
    let owned = tmp.path().join("owned");
    let downloads = tmp.path().join("downloads");
    tokio::fs::create_dir_all(&owned).await.unwrap();
    tokio::fs::create_dir_all(&downloads).await.unwrap();
    for (name, content) in owned_files {
        tokio::fs::write(owned.join(name), content).await.unwrap();
    }

    let (link, read_half) = leaf::node::connect_super_peer(&super_peer, &address).await.unwrap();
    let node = leaf::node::LeafNode::new(address.clone(), super_peer, owned, downloads, model, ttl, link);

    tokio::spawn(leaf::session::run_super_peer_receive_loop(node.clone(), read_half));

    leaf::watcher::initial_scan(&node).await.unwrap();

    let shutdown = CancellationToken::new();
    leaf::watcher::spawn(node.clone(), shutdown.clone()).unwrap();
    leaf::consistency::spawn(node.clone(), shutdown.clone());

    let listen_node = node.clone();
    let handler = Arc::new(move |conn: net::Connection| {
        let node = listen_node.clone();
        async move { leaf::session::handle_inbound(node, conn).await }
    });
    let listen_addr = address.socket_addr();
    let listen_shutdown = shutdown.clone();
    tokio::spawn(async move { net::serve(&listen_addr, listen_shutdown, handler).await });

    tokio::time::sleep(Duration::from_millis(50)).await;
    RunningLeaf { address, node, _tmp: tmp, shutdown }
}

/// Issues a `search <name>` query exactly as `leaf::cli`'s shell command does: a fresh
/// `message_id`, the leaf's own `ttl`, and a placeholder origin/version that the router never
/// reads (only `file_info.name` is matched on, per §4.3).
pub async fn issue_query(leaf: &RunningLeaf, name: &str) {
    let info = FileInfo::new(name.to_string(), leaf.node.address.clone(), 0);
    let msg = Message::new(leaf.node.make_message_id(), leaf.node.ttl, info, leaf.node.address.clone());
    leaf.node.link.send(&Frame::Query(msg)).await.unwrap();
}
