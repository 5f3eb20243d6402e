//! The interactive command shell (§6): a line-oriented `<command> <fileName>` REPL read from
//! stdin after startup, alongside the background listener/watcher/consistency tasks.

use std::sync::Arc;

use common::{Frame, Message};
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::invalidation::{deregister_owned, send_register};
use crate::node::LeafNode;

/// Runs the shell to completion (on `exit` or stdin EOF).
pub async fn run(node: Arc<LeafNode>) -> anyhow::Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    println!("overlay leaf shell — commands: print, register <name>, deregister <name>, search <name>, refresh <name>, exit");
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let mut parts = line.splitn(2, char::is_whitespace);
        let command = parts.next().unwrap_or_default();
        let arg = parts.next().map(str::trim).unwrap_or_default();
        match command {
            "print" => print_status(&node),
            "register" => register(&node, arg).await,
            "deregister" => deregister(&node, arg).await,
            "search" => search(&node, arg).await,
            "refresh" => refresh(&node, arg).await,
            "exit" => break,
            other => println!("unrecognized command: {other:?}"),
        }
    }
    Ok(())
}

fn print_status(node: &Arc<LeafNode>) {
    println!("address:     {}", node.address);
    println!("super-peer:  {}", node.super_peer);
    println!("owned dir:   {}", node.owned_dir.display());
    println!("downloads:   {}", node.downloads_dir.display());
    println!("ttl:         {}", node.ttl);
    match node.model {
        common::ConsistencyModel::Push => println!("model:       push"),
        common::ConsistencyModel::Pull { ttr_minutes } => {
            println!("model:       pull (ttr {ttr_minutes}m)")
        }
    }
    for name in node.registry.names() {
        if let Some(info) = node.registry.get(&name) {
            println!("  {} v{} origin={}", info.name, info.version, info.origin);
        }
    }
}

async fn register(node: &Arc<LeafNode>, name: &str) {
    if name.is_empty() {
        println!("usage: register <name>");
        return;
    }
    let path = node.owned_path(name);
    if tokio::fs::metadata(&path).await.is_err() {
        println!("{name}: not found in owned/");
        return;
    }
    let info = match node.registry.get(name) {
        Some(existing) => existing,
        None => common::FileInfo::new(name.to_string(), node.address.clone(), 1),
    };
    node.registry.insert(info.clone());
    match send_register(node, info).await {
        Ok(0) => println!("{name}: registered"),
        Ok(code) => println!("{name}: register failed (status {code})"),
        Err(err) => println!("{name}: register failed: {err}"),
    }
}

async fn deregister(node: &Arc<LeafNode>, name: &str) {
    if name.is_empty() {
        println!("usage: deregister <name>");
        return;
    }
    let Some(info) = node.registry.remove(name) else {
        println!("{name}: not registered");
        return;
    };
    deregister_owned(node, info).await;
    println!("{name}: deregistered");
}

async fn search(node: &Arc<LeafNode>, name: &str) {
    if name.is_empty() {
        println!("usage: search <name>");
        return;
    }
    if node.registry.contains(name) {
        println!("{name}: already present locally");
        return;
    }
    issue_query(node, name).await;
}

async fn refresh(node: &Arc<LeafNode>, name: &str) {
    if !node.is_pull() {
        println!("refresh is only meaningful under the pull consistency model");
        return;
    }
    if name.is_empty() {
        println!("usage: refresh <name>");
        return;
    }
    issue_query(node, name).await;
}

async fn issue_query(node: &Arc<LeafNode>, name: &str) {
    let origin_hint = node.address.clone();
    let info = common::FileInfo::new(name.to_string(), origin_hint, 0);
    let msg = Message::new(node.make_message_id(), node.ttl, info, node.address.clone());
    if let Err(err) = node.link.send(&Frame::Query(msg)).await {
        println!("{name}: query failed: {err}");
        return;
    }
    println!("{name}: query sent");
}
