//! Duplicate offers deduped: a 3-super-peer chain
//! `SPa - SPb - SPc`, with one holder attached to each end (`H1` at `SPa`, `H2` at `SPc`) both
//! owning a file of the same name, and the querier `L` attached to the middle super-peer `SPb`.
//! The flood reaches both holders, so `L`'s persistent session receives two `queryhit` frames for
//! the same `message_id` — only one download must proceed (§4.6 single-flight).

mod support;

use std::time::Duration;

use support::{addr, issue_query, reserve_port, spawn_leaf_with_owned_files, spawn_superpeer};

#[tokio::test]
async fn duplicate_offers_deduped() {
    let sp_a_addr = addr(reserve_port().await);
    let sp_b_addr = addr(reserve_port().await);
    let sp_c_addr = addr(reserve_port().await);
    let h1_addr = addr(reserve_port().await);
    let h2_addr = addr(reserve_port().await);
    let l_addr = addr(reserve_port().await);

    let _sp_a = spawn_superpeer(sp_a_addr.clone(), vec![sp_b_addr.clone()], vec![h1_addr.clone()]).await;
    let _sp_b = spawn_superpeer(
        sp_b_addr.clone(),
        vec![sp_a_addr.clone(), sp_c_addr.clone()],
        vec![l_addr.clone()],
    )
    .await;
    let _sp_c = spawn_superpeer(sp_c_addr.clone(), vec![sp_b_addr.clone()], vec![h2_addr.clone()]).await;

    let h1 = spawn_leaf_with_owned_files(
        h1_addr,
        sp_a_addr,
        common::ConsistencyModel::Push,
        common::TTL_DEFAULT,
        &[("Coco.mp4", b"payload from h1")],
    )
    .await;
    let h2 = spawn_leaf_with_owned_files(
        h2_addr,
        sp_c_addr,
        common::ConsistencyModel::Push,
        common::TTL_DEFAULT,
        &[("Coco.mp4", b"payload from h2")],
    )
    .await;
    let l = support::spawn_leaf(l_addr, sp_b_addr, common::ConsistencyModel::Push, common::TTL_DEFAULT).await;

    issue_query(&l, "Coco.mp4").await;

    let downloaded = support::wait_until(|| l.node.registry.contains("Coco.mp4"), Duration::from_secs(5)).await;
    assert!(downloaded, "L never downloaded Coco.mp4 after the flood reached both holders");

    // Give the (dropped) duplicate queryhit time to arrive and be rejected before asserting.
    tokio::time::sleep(Duration::from_millis(200)).await;

    let info = l.node.registry.get("Coco.mp4").unwrap();
    let bytes = tokio::fs::read(l.downloads_path("Coco.mp4")).await.unwrap();
    if info.origin == h1.address {
        assert_eq!(bytes, b"payload from h1");
    } else {
        assert_eq!(info.origin, h2.address);
        assert_eq!(bytes, b"payload from h2");
    }
}
