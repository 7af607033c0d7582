//! End-to-end store scenarios: ingestion, rollback, and lookups against an
//! in-memory database.

use std::str::FromStr;

use bitcoin::block::{Header, Version};
use bitcoin::hashes::Hash;
use bitcoin::{BlockHash, CompactTarget, Network, TxMerkleNode};
use ombindex_core::types::{BlockRecord, BulletinRecord, EndorsementRecord, IndexedBlock};
use ombindex_core::{IndexerError, PegBlock, StoreConfig};
use ombindex_storage::SqliteStorage;

const AUTHOR: &str = "1BgGZ9tcN4rm9KBzDn7KprQz87SZ26SAMH";

fn header(prev: BlockHash, time: u32, nonce: u32) -> Header {
    Header {
        version: Version::from_consensus(0x2000_0000),
        prev_blockhash: prev,
        merkle_root: TxMerkleNode::all_zeros(),
        time,
        bits: CompactTarget::from_consensus(0x207fffff),
        nonce,
    }
}

fn child_of(parent: &BlockRecord, nonce: u32) -> BlockRecord {
    let prev = BlockHash::from_str(&parent.hash).unwrap();
    let time = parent.timestamp as u32 + 600;
    BlockRecord::from_header(&header(prev, time, nonce), parent.height + 1)
}

fn bulletin(txid: &str, block: &BlockRecord, message: &str) -> BulletinRecord {
    BulletinRecord {
        txid: txid.into(),
        block_hash: block.hash.clone(),
        author: AUTHOR.into(),
        message: message.into(),
        timestamp: block.timestamp,
        location: None,
    }
}

fn endorsement(txid: &str, block: &BlockRecord, bid: &str) -> EndorsementRecord {
    EndorsementRecord {
        txid: txid.into(),
        block_hash: block.hash.clone(),
        bid: bid.into(),
        author: AUTHOR.into(),
        timestamp: block.timestamp,
    }
}

async fn regtest_store() -> SqliteStorage {
    SqliteStorage::in_memory(StoreConfig::default()).await.unwrap()
}

/// Peg → A → B → C, with a bulletin in C.
async fn three_block_chain(
    store: &SqliteStorage,
) -> (BlockRecord, BlockRecord, BlockRecord) {
    let a = child_of(store.peg(), 1);
    let b = child_of(&a, 2);
    let c = child_of(&b, 3);
    store.insert_block(&a).await.unwrap();
    store.insert_block(&b).await.unwrap();

    let mut indexed = IndexedBlock::empty(c.clone());
    indexed
        .bulletins
        .push(bulletin("c-bulletin", &c, "doomed #fork #chain"));
    store.insert_block_with_records(&indexed).await.unwrap();
    (a, b, c)
}

#[tokio::test]
async fn only_the_tip_can_be_deleted() {
    let store = regtest_store().await;
    let (a, b, c) = three_block_chain(&store).await;

    for not_tip in [&a, &b] {
        let err = store.delete_tip(&not_tip.hash).await.unwrap_err();
        assert!(matches!(err, IndexerError::NotTip { .. }));
        assert!(err.is_caller_error());
    }
    assert!(matches!(
        store.delete_tip(&"00".repeat(32)).await,
        Err(IndexerError::NotTip { .. })
    ));

    store.delete_tip(&c.hash).await.unwrap();
    assert_eq!(store.current_tip().await.unwrap(), b);
    store.delete_tip(&b.hash).await.unwrap();
    assert_eq!(store.current_tip().await.unwrap(), a);
}

#[tokio::test]
async fn deleting_a_block_cascades_to_its_records() {
    let store = regtest_store().await;
    let (_, _, c) = three_block_chain(&store).await;
    assert_eq!(store.get_tags("c-bulletin").await.unwrap(), vec!["#fork", "#chain"]);

    store.delete_tip(&c.hash).await.unwrap();

    assert!(matches!(
        store.get_bulletin("c-bulletin").await,
        Err(IndexerError::NotFound { .. })
    ));
    assert!(matches!(
        store.get_tags("c-bulletin").await,
        Err(IndexerError::NotFound { .. })
    ));
    assert!(store.get_by_tag("#fork").await.unwrap().is_empty());
}

#[tokio::test]
async fn hello_world_above_the_peg() {
    let store = regtest_store().await;
    let peg = store.peg().clone();
    let block = child_of(&peg, 9);
    let mut hello = bulletin("hello", &block, "Hello #world");
    hello.timestamp = 12_345_678;
    let mut indexed = IndexedBlock::empty(block.clone());
    indexed.bulletins.push(hello);
    store.insert_block_with_records(&indexed).await.unwrap();

    let detail = store.get_bulletin("hello").await.unwrap();
    assert_eq!(detail.bulletin.message, "Hello #world");
    assert_eq!(detail.bulletin.timestamp, 12_345_678);
    assert_eq!(detail.bulletin.tags, vec!["#world"]);
    assert_eq!(detail.bulletin.block_height, peg.height + 1);
    assert!(detail.bulletin.location.is_none());
    assert!(detail.endorsements.is_empty());

    let found = store.get_by_tag("#WORLD").await.unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].author, AUTHOR);
}

#[tokio::test]
async fn at_most_five_tags_are_kept() {
    let store = regtest_store().await;
    let peg = store.peg().clone();
    store
        .insert_bulletin(&bulletin("many", &peg, "#a #b #a #c #d #e #f #g"))
        .await
        .unwrap();
    assert_eq!(
        store.get_tags("many").await.unwrap(),
        vec!["#a", "#b", "#c", "#d", "#e"]
    );
}

#[tokio::test]
async fn endorsements_of_a_missing_bulletin_are_ranked() {
    let store = regtest_store().await;
    let peg = store.peg().clone();
    let first = child_of(&peg, 1);
    let second = child_of(&first, 2);
    let ghost = "ab".repeat(32);

    let mut indexed = IndexedBlock::empty(first.clone());
    indexed.endorsements.push(endorsement("e1", &first, &ghost));
    indexed.bulletins.push(bulletin("real", &first, "hi"));
    store.insert_block_with_records(&indexed).await.unwrap();

    let mut indexed = IndexedBlock::empty(second.clone());
    indexed.endorsements.push(endorsement("e2", &second, &ghost));
    indexed.endorsements.push(endorsement("e3", &second, "real"));
    store.insert_block_with_records(&indexed).await.unwrap();

    let ranked = store.get_most_endorsed(10).await.unwrap();
    assert_eq!(ranked.len(), 2);
    assert_eq!(ranked[0].bid, ghost);
    assert_eq!(ranked[0].count, 2);
    assert!(ranked[0].bulletin.is_none());
    assert_eq!(ranked[1].count, 1);
    assert_eq!(
        ranked[1].bulletin.as_ref().map(|b| b.txid.as_str()),
        Some("real")
    );

    let by_bid = store.get_endorsements_by_bid(&ghost).await.unwrap();
    assert_eq!(by_bid.len(), 2);
    assert!(by_bid.iter().all(|e| !e.bulletin_exists));
}

#[tokio::test]
async fn a_rejected_block_writes_nothing() {
    let store = regtest_store().await;
    let peg = store.peg().clone();
    let stray_parent = child_of(&peg, 77);
    let orphan = child_of(&stray_parent, 1);

    let mut indexed = IndexedBlock::empty(orphan.clone());
    indexed.bulletins.push(bulletin("lost", &orphan, "#lost"));
    let err = store.insert_block_with_records(&indexed).await.unwrap_err();
    assert!(matches!(err, IndexerError::UnknownParent { .. }));

    assert_eq!(store.block_count().await.unwrap(), 1);
    assert!(store.get_by_tag("#lost").await.unwrap().is_empty());
}

#[tokio::test]
async fn nothing_at_or_below_the_peg_is_removed() {
    let peg_header = header(BlockHash::from_byte_array([7; 32]), 1_451_606_601, 0);
    let config =
        StoreConfig::for_network(Network::Regtest, PegBlock::from_header(&peg_header, 100));
    let store = SqliteStorage::in_memory(config).await.unwrap();
    let peg = store.peg().clone();
    assert_eq!(peg.height, 100);

    let next = child_of(&peg, 1);
    store.insert_block(&next).await.unwrap();

    assert!(matches!(
        store.drop_after_height(50).await,
        Err(IndexerError::PegProtected { .. })
    ));
    assert_eq!(store.drop_after_height(100).await.unwrap(), 1);
    assert!(matches!(
        store.delete_tip(&peg.hash).await,
        Err(IndexerError::PegProtected { .. })
    ));
    assert_eq!(store.find_height(&peg.prev_hash).await.unwrap(), 99);
    assert_eq!(store.current_tip().await.unwrap(), peg);
}

#[tokio::test]
async fn writes_through_the_query_gateway_are_refused() {
    let store = regtest_store().await;
    for sql in [
        "DELETE FROM blocks",
        "UPDATE blocks SET height = 5",
        "SELECT 1; DELETE FROM blocks",
        "WITH t AS (SELECT 1) INSERT INTO blacklist SELECT 'x', 'y' FROM t",
    ] {
        let err = store.execute_read_only(sql).await.unwrap_err();
        assert!(
            matches!(err, IndexerError::NotReadOnly { .. }),
            "{sql:?} gave {err}"
        );
    }
    assert_eq!(store.block_count().await.unwrap(), 1);

    let rows = store
        .execute_read_only("SELECT COUNT(*) AS n FROM blocks")
        .await
        .unwrap();
    assert_eq!(rows[0]["n"], serde_json::Value::from(1));
}
