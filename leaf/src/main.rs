//! Leaf binary: loads the topology's consistency model, connects to its super-peer, and runs
//! the listener, filesystem watcher, and consistency-checker background tasks alongside the
//! interactive command shell.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;

use leaf::node::LeafNode;
use leaf::{cli, consistency, session, watcher};

#[derive(Parser, Debug)]
#[command(name = "leaf", about = "Overlay file-sharing leaf node")]
struct Args {
    /// This leaf's own listen address, e.g. 127.0.0.1:6001.
    #[arg(long)]
    address: common::Address,

    /// Directory root; `owned/` and `downloads/` are created under it if absent.
    #[arg(long)]
    root: PathBuf,

    /// This leaf's super-peer address.
    #[arg(long)]
    super_peer: common::Address,

    /// Path to the topology config file (§6), used to determine the consistency model.
    #[arg(long)]
    topology: PathBuf,

    /// Overrides the default hop budget for queries and invalidates this leaf originates.
    #[arg(long)]
    ttl: Option<u32>,
}

#[tokio::main]
async fn main() -> Result<()> {
    common::logging::init("info");
    if let Err(err) = run().await {
        tracing::error!(error = %err, "leaf exiting with an error");
        std::process::exit(1);
    }
    Ok(())
}

async fn run() -> Result<()> {
    let args = Args::parse();

    let topology = common::Topology::load(&args.topology, &args.address)
        .context("failed to load topology")?;

    let owned_dir = args.root.join("owned");
    let downloads_dir = args.root.join("downloads");
    tokio::fs::create_dir_all(&owned_dir)
        .await
        .with_context(|| format!("failed to create {owned_dir:?}"))?;
    tokio::fs::create_dir_all(&downloads_dir)
        .await
        .with_context(|| format!("failed to create {downloads_dir:?}"))?;

    tracing::info!(
        address = %args.address,
        super_peer = %args.super_peer,
        model = ?topology.model,
        "starting leaf"
    );

    let (link, read_half) = leaf::connect_super_peer(&args.super_peer, &args.address)
        .await
        .context("failed to connect to super-peer")?;

    let node = LeafNode::new(
        args.address.clone(),
        args.super_peer.clone(),
        owned_dir,
        downloads_dir,
        topology.model,
        args.ttl.unwrap_or(common::TTL_DEFAULT),
        link,
    );

    let shutdown = CancellationToken::new();
    let ctrl_c_shutdown = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("received shutdown signal");
            ctrl_c_shutdown.cancel();
        }
    });

    let receive_loop = tokio::spawn(session::run_super_peer_receive_loop(node.clone(), read_half));

    watcher::initial_scan(&node)
        .await
        .context("failed to scan owned/ at startup")?;

    let watcher_handle = watcher::spawn(node.clone(), shutdown.clone())
        .context("failed to start filesystem watcher")?;
    let consistency_handle = consistency::spawn(node.clone(), shutdown.clone());

    let listen_node = node.clone();
    let handler = Arc::new(move |conn: net::Connection| {
        let node = listen_node.clone();
        async move { session::handle_inbound(node, conn).await }
    });
    let listen_shutdown = shutdown.clone();
    let listen_addr = node.address.socket_addr();
    let listener_task = tokio::spawn(async move { net::serve(&listen_addr, listen_shutdown, handler).await });

    cli::run(node.clone()).await?;
    shutdown.cancel();

    let _ = tokio::join!(listener_task, watcher_handle, consistency_handle);
    receive_loop.abort();

    Ok(())
}
