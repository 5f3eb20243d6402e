//! Download/upload workers (§4.6): serial per-`message_id` file transfer with a single-flight
//! guard on the download side.

use std::sync::Arc;

use anyhow::Context;
use common::{Address, Frame, Message};
use net::Connection;

use crate::invalidation::send_register;
use crate::node::LeafNode;

/// Handles an inbound `queryhit m h` delivered over the super-peer link: claims the message_id
/// (single-flight, §4.6) and, if this call won the claim, spawns the actual transfer. A second
/// queryhit for the same `message_id` — whether a genuine duplicate offer or one learned via a
/// different super-peer path — observes the claim and does nothing.
pub async fn handle_queryhit(node: Arc<LeafNode>, msg: Message, holder: Address) {
    if !node.downloads.try_claim(&msg.message_id).await {
        tracing::debug!(
            message_id = %msg.message_id,
            "duplicate queryhit, download already claimed"
        );
        return;
    }
    let message_id = msg.message_id.clone();
    tokio::spawn(async move {
        if let Err(err) = download(&node, &holder, &msg).await {
            tracing::error!(%holder, file = %msg.file_info.name, error = %err, "download failed");
            node.downloads.mark_failed(&message_id).await;
            // TODO: retry against a second holder for this message_id instead of giving up
            // (intentionally left unimplemented).
            let partial = node.downloads_path(&msg.file_info.name);
            let _ = tokio::fs::remove_file(&partial).await;
        }
    });
}

async fn download(node: &Arc<LeafNode>, holder: &Address, msg: &Message) -> anyhow::Result<()> {
    let name = msg.file_info.name.clone();
    let mut conn = Connection::connect(holder, &node.address)
        .await
        .with_context(|| format!("failed to connect to holder {holder}"))?;
    let obtain = Message::new(
        msg.message_id.clone(),
        msg.ttl,
        msg.file_info.clone(),
        node.address.clone(),
    );
    conn.write_frame(&Frame::Obtain(obtain)).await?;

    let info = conn
        .read_fileinfo()
        .await
        .context("holder did not send a file info header")?;

    let dest_path = node.downloads_path(&name);
    if let Some(parent) = dest_path.parent() {
        let _ = tokio::fs::create_dir_all(parent).await;
    }
    let mut dest = tokio::fs::File::create(&dest_path)
        .await
        .with_context(|| format!("failed to create {dest_path:?}"))?;
    conn.copy_to_end(&mut dest)
        .await
        .context("failed to copy file bytes")?;

    node.registry.insert(info.clone());
    tracing::info!(file = %name, %holder, "download complete");

    if let Err(err) = send_register(node, info).await {
        tracing::warn!(file = %name, error = %err, "failed to announce downloaded replica to super-peer");
    }
    Ok(())
}

/// Serves an inbound `obtain m` at the leaf's own listener (§4.6): resolve the file in
/// *owned/* then *downloads/*, write the current FileInfo header, then stream the full byte
/// count until EOF of the local file (no off-by-one truncation on the byte count).
pub async fn serve_obtain(node: Arc<LeafNode>, mut conn: Connection, msg: Message) -> anyhow::Result<()> {
    let name = msg.file_info.name.clone();
    let Some(path) = node.resolve_for_upload(&name).await else {
        tracing::warn!(file = %name, "obtain for a file we don't hold, closing connection");
        return Ok(());
    };
    let Some(info) = node.registry.get(&name) else {
        tracing::warn!(file = %name, "obtain for a file missing from the registry, closing connection");
        return Ok(());
    };
    conn.write_fileinfo(&info).await?;
    let mut src = tokio::fs::File::open(&path)
        .await
        .with_context(|| format!("failed to open {path:?}"))?;
    conn.copy_from_and_close(&mut src)
        .await
        .context("failed to stream file bytes")?;
    tracing::info!(file = %name, "served obtain request");
    Ok(())
}
