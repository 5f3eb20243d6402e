//! TCP transport plumbing shared by the `leaf` and `superpeer` binaries: a line-framed
//! connection wrapper, a one-shot connect/handshake/send helper, and a generic accept-dispatch
//! loop.

pub mod connection;
pub mod listener;

pub use connection::{send_one_shot, Connection, ConnectionReadHalf, ConnectionWriteHalf, DEFAULT_TIMEOUT};
pub use listener::serve;
