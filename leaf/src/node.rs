//! The leaf's shared state: address, directories, consistency model, file registry, single-flight
//! download tracker, and the persistent link to its super-peer.

use std::collections::{HashSet, VecDeque};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use anyhow::Context;
use common::{Address, ConsistencyModel, Frame};
use net::{Connection, ConnectionWriteHalf};
use tokio::sync::{oneshot, Mutex};

use crate::registry::FileRegistry;

/// Single-flight download dedup (§4.6, §5): a `message_id` is claimed before its transfer
/// starts and un-claimed only on failure, so a later duplicate (or a fresh attempt after
/// failure) can proceed.
pub struct DownloadState {
    claimed: Mutex<HashSet<String>>,
}

impl DownloadState {
    pub fn new() -> Self {
        Self {
            claimed: Mutex::new(HashSet::new()),
        }
    }

    /// Returns `true` if this call claimed `message_id` (caller should download); `false` if
    /// another call already claimed or completed it.
    pub async fn try_claim(&self, message_id: &str) -> bool {
        self.claimed.lock().await.insert(message_id.to_string())
    }

    pub async fn mark_failed(&self, message_id: &str) {
        self.claimed.lock().await.remove(message_id);
    }
}

impl Default for DownloadState {
    fn default() -> Self {
        Self::new()
    }
}

/// The leaf's persistent outbound connection to its super-peer. Writes (register, deregister,
/// query, invalidate) are issued by whichever task needs them, serialized on one write-half
/// mutex; a single dedicated task owns the read half and demultiplexes StatusCode replies back
/// to their caller via a FIFO queue of one-shot channels, since request/response ordering is
/// guaranteed by the single persistent connection (§5) even though replies interleave with
/// unsolicited queryhit/invalidate pushes.
pub struct SuperPeerLink {
    writer: Mutex<ConnectionWriteHalf>,
    pending_replies: Mutex<VecDeque<oneshot::Sender<i32>>>,
}

impl SuperPeerLink {
    pub fn new(writer: ConnectionWriteHalf) -> Self {
        Self {
            writer: Mutex::new(writer),
            pending_replies: Mutex::new(VecDeque::new()),
        }
    }

    /// Writes `frame` and, for a register/deregister that expects a `StatusCode` reply, awaits
    /// it. The write and the pending-reply registration happen under the same write-lock hold so
    /// a concurrent sender can't interleave a second register between this write and its reply.
    pub async fn send_awaiting_status(&self, frame: &Frame) -> anyhow::Result<i32> {
        let (tx, rx) = oneshot::channel();
        {
            let mut writer = self.writer.lock().await;
            self.pending_replies.lock().await.push_back(tx);
            writer.write_frame(frame).await?;
        }
        rx.await.context("super-peer link closed before a reply arrived")
    }

    /// Writes `frame` with no reply expected (query, invalidate).
    pub async fn send(&self, frame: &Frame) -> anyhow::Result<()> {
        self.writer.lock().await.write_frame(frame).await
    }

    /// Delivers a `StatusCode` frame read by the receive loop to the oldest outstanding caller.
    pub async fn deliver_status(&self, code: i32) {
        if let Some(tx) = self.pending_replies.lock().await.pop_front() {
            let _ = tx.send(code);
        }
    }
}

/// Shared leaf state, cloned (as `Arc`s) into every connection handler and background task.
pub struct LeafNode {
    pub address: Address,
    pub super_peer: Address,
    pub owned_dir: PathBuf,
    pub downloads_dir: PathBuf,
    pub model: ConsistencyModel,
    pub ttl: u32,
    pub registry: Arc<FileRegistry>,
    pub downloads: Arc<DownloadState>,
    pub link: Arc<SuperPeerLink>,
    sequence: AtomicU64,
}

impl LeafNode {
    pub fn new(
        address: Address,
        super_peer: Address,
        owned_dir: PathBuf,
        downloads_dir: PathBuf,
        model: ConsistencyModel,
        ttl: u32,
        link: Arc<SuperPeerLink>,
    ) -> Arc<Self> {
        Arc::new(Self {
            address,
            super_peer,
            owned_dir,
            downloads_dir,
            model,
            ttl,
            registry: Arc::new(FileRegistry::new()),
            downloads: Arc::new(DownloadState::new()),
            link,
            sequence: AtomicU64::new(1),
        })
    }

    /// Allocates the next sequence number for this leaf's own `message_id`s (§3: `<origin>-<seq>`).
    pub fn next_sequence(&self) -> u64 {
        self.sequence.fetch_add(1, Ordering::SeqCst)
    }

    pub fn make_message_id(&self) -> String {
        common::Message::make_id(&self.address, self.next_sequence())
    }

    pub fn is_pull(&self) -> bool {
        matches!(self.model, ConsistencyModel::Pull { .. })
    }

    pub fn owned_path(&self, name: &str) -> PathBuf {
        self.owned_dir.join(name)
    }

    pub fn downloads_path(&self, name: &str) -> PathBuf {
        self.downloads_dir.join(name)
    }

    /// Resolves `name` to a readable path for serving an `obtain`: *owned/* first, then
    /// *downloads/* (§4.6).
    pub async fn resolve_for_upload(&self, name: &str) -> Option<PathBuf> {
        let owned = self.owned_path(name);
        if tokio::fs::metadata(&owned).await.is_ok() {
            return Some(owned);
        }
        let replica = self.downloads_path(name);
        if tokio::fs::metadata(&replica).await.is_ok() {
            return Some(replica);
        }
        None
    }
}

/// Connects to the leaf's super-peer, performs the handshake, and splits the connection into a
/// write-guarded [`SuperPeerLink`] plus the raw read half for the caller to drive in a dedicated
/// receive-loop task.
pub async fn connect_super_peer(
    super_peer: &Address,
    self_addr: &Address,
) -> anyhow::Result<(Arc<SuperPeerLink>, net::ConnectionReadHalf)> {
    let conn = Connection::connect(super_peer, self_addr)
        .await
        .with_context(|| format!("failed to connect to super-peer {super_peer}"))?;
    let (read_half, write_half) = conn.into_split();
    Ok((Arc::new(SuperPeerLink::new(write_half)), read_half))
}
