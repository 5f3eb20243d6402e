//! Generic connection-dispatch loop, shared by the leaf's inbound listener and the super-peer's
//! inbound listener.
//!
//! The original source specialized a listener per node role via a class hierarchy of "threads"
//! nested inside the node. Here that's flattened into one free function parameterized by a
//! handler closure; the handler takes ownership of the accepted connection plus its own cloned
//! handle to whatever shared state it needs, so there's no cyclic reference between a node and
//! its listener.

use std::future::Future;
use std::sync::Arc;

use anyhow::Context;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::connection::Connection;

/// Binds `listen_addr` and accepts connections until `shutdown` is triggered, spawning
/// `handler(connection)` as an independent task per accepted connection.
///
/// Connection handler failures are logged and do not affect the listener or other connections.
pub async fn serve<H, Fut>(
    listen_addr: &str,
    shutdown: CancellationToken,
    handler: Arc<H>,
) -> anyhow::Result<()>
where
    H: Fn(Connection) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    let listener = TcpListener::bind(listen_addr)
        .await
        .with_context(|| format!("failed to bind listener on {listen_addr}"))?;
    tracing::info!(%listen_addr, "listening for inbound connections");
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                tracing::info!(%listen_addr, "listener shutting down");
                return Ok(());
            }
            accepted = listener.accept() => {
                let (stream, peer) = match accepted {
                    Ok(pair) => pair,
                    Err(err) => {
                        tracing::warn!(error = %err, "failed to accept inbound connection");
                        continue;
                    }
                };
                tracing::debug!(%peer, "accepted inbound connection");
                let handler = handler.clone();
                tokio::spawn(async move {
                    let conn = Connection::new(stream);
                    if let Err(err) = handler(conn).await {
                        tracing::warn!(%peer, error = %err, "connection handler failed");
                    }
                });
            }
        }
    }
}
