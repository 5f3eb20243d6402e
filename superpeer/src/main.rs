//! Super-peer binary: loads the static topology, binds the listen address, and serves inbound
//! connections until shutdown.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;

use superpeer::session::handle_connection;
use superpeer::SuperPeerNode;

#[derive(Parser, Debug)]
#[command(name = "superpeer", about = "Overlay file-sharing backbone node")]
struct Args {
    /// This super-peer's own address, e.g. 127.0.0.1:5000. Must match an address mentioned in
    /// the topology file.
    #[arg(long)]
    address: common::Address,

    /// Path to the topology config file (§6).
    #[arg(long)]
    topology: std::path::PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    common::logging::init("info");
    if let Err(err) = run().await {
        tracing::error!(error = %err, "super-peer exiting with an error");
        std::process::exit(1);
    }
    Ok(())
}

async fn run() -> Result<()> {
    let args = Args::parse();

    let topology = common::Topology::load(&args.topology, &args.address)
        .context("failed to load topology")?;
    let neighbors = topology.neighbors_of(&args.address).to_vec();
    let leaves = topology.leaves_of(&args.address).to_vec();
    tracing::info!(
        address = %args.address,
        neighbors = neighbors.len(),
        leaves = leaves.len(),
        "starting super-peer"
    );

    let node = SuperPeerNode::new(args.address.clone(), neighbors, leaves);
    let shutdown = CancellationToken::new();

    let ctrl_c_shutdown = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("received shutdown signal");
            ctrl_c_shutdown.cancel();
        }
    });

    let handler = Arc::new(move |conn: net::Connection| {
        let node = node.clone();
        async move { handle_connection(node, conn).await }
    });

    net::serve(&args.address.socket_addr(), shutdown, handler)
        .await
        .context("super-peer listener failed")
}
