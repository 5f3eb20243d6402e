//! Shared types and plumbing for the overlay file-sharing network: wire protocol, topology
//! config, and error/logging setup used by both the `leaf` and `superpeer` binaries.

pub mod address;
pub mod config;
pub mod error;
pub mod fileinfo;
pub mod logging;
pub mod message;
pub mod wire;

pub use address::Address;
pub use config::{ConsistencyModel, Topology};
pub use fileinfo::FileInfo;
pub use message::Message;
pub use wire::Frame;

/// Default hop budget for a freshly originated query or invalidate.
pub const TTL_DEFAULT: u32 = 10;

/// Maximum size of a super-peer's message history before oldest-first eviction.
pub const HISTORY_CAPACITY: usize = 50;

/// Period between consistency-checker ticks at a leaf, in seconds.
pub const CONSISTENCY_CHECK_PERIOD_SECS: u64 = 30;

/// Default per-connection read/write deadline.
pub const CONNECTION_TIMEOUT_SECS: u64 = 30;
