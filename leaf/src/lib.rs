//! Leaf node for the overlay file-sharing network: local file registry, the persistent link to a
//! super-peer, download/upload workers, the `owned/` filesystem watcher, the pull-model
//! consistency checker, and the interactive command shell.

pub mod cli;
pub mod consistency;
pub mod download;
pub mod invalidation;
pub mod node;
pub mod registry;
pub mod session;
pub mod watcher;

pub use node::{connect_super_peer, LeafNode};
