//! The super-peer's shared state: its static neighbor/leaf lists plus the registry and history
//! every connection handler task needs a handle to.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use common::{Address, Frame};
use tokio::sync::mpsc;

use crate::history::MessageHistory;
use crate::registry::LeafRegistry;

/// Shared super-peer state. Cloned cheaply (it's just `Arc`s) into every spawned connection
/// task and background worker; there is no ownership cycle back from a listener to the node
/// the way the original's nested thread classes had.
pub struct SuperPeerNode {
    pub address: Address,
    pub neighbors: Vec<Address>,
    pub leaves: Vec<Address>,
    pub registry: Arc<LeafRegistry>,
    pub history: Arc<MessageHistory>,
    leaf_links: Mutex<HashMap<Address, mpsc::UnboundedSender<Frame>>>,
}

impl SuperPeerNode {
    pub fn new(address: Address, neighbors: Vec<Address>, leaves: Vec<Address>) -> Arc<Self> {
        Arc::new(Self {
            address,
            neighbors,
            leaves,
            registry: Arc::new(LeafRegistry::new()),
            history: Arc::new(MessageHistory::new()),
            leaf_links: Mutex::new(HashMap::new()),
        })
    }

    pub fn is_neighbor(&self, addr: &Address) -> bool {
        self.neighbors.contains(addr)
    }

    pub fn is_leaf(&self, addr: &Address) -> bool {
        self.leaves.contains(addr)
    }

    /// Neighbors to forward to, excluding the one a message arrived from (loop-avoidance).
    pub fn forward_targets<'a>(&'a self, exclude: &'a Address) -> impl Iterator<Item = &'a Address> {
        self.neighbors.iter().filter(move |n| *n != exclude)
    }

    /// Registers the live persistent session for `leaf`, so queryhits destined for it (§4.3:
    /// delivered "via the leaf's persistent super-peer connection", not a fresh one-shot
    /// connection) can be pushed onto it. Replaces any prior link for the same address.
    pub fn register_leaf_link(&self, leaf: Address, tx: mpsc::UnboundedSender<Frame>) {
        self.leaf_links.lock().unwrap().insert(leaf, tx);
    }

    /// Drops the live link for `leaf`, e.g. once its session ends. A no-op if a newer session
    /// already replaced it.
    pub fn unregister_leaf_link(&self, leaf: &Address) {
        self.leaf_links.lock().unwrap().remove(leaf);
    }

    /// Pushes `frame` onto `leaf`'s live persistent session, if one is currently open. Returns
    /// whether it was handed off.
    pub fn push_to_leaf(&self, leaf: &Address, frame: Frame) -> bool {
        match self.leaf_links.lock().unwrap().get(leaf) {
            Some(tx) => tx.send(frame).is_ok(),
            None => false,
        }
    }
}
