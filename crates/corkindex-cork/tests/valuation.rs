mod common;

use common::*;
use serde_json::json;

use corkindex_core::amount::{wad, Amount};
use corkindex_core::model::{AssetPrice, Pool, PoolAsset};
use corkindex_core::types::ContractKind;
use corkindex_core::Processed;

const TEN_TOKENS: &str = "10000000000000000000";

async fn pool_tvl(idx: &corkindex_core::Indexer) -> Amount {
    let pool: Pool = load(idx, &id(MARKET)).await;
    pool.tvl_usd
}

#[tokio::test]
async fn two_hop_price_values_the_reserve() {
    let (idx, _) = indexer();
    idx.replay(vec![
        market_created(100),
        pool_deposit(101, TEN_TOKENS),
        // 1 collateral = 2 reference
        answer(FEED_COLLATERAL_REF, 102, "2000000000000000000"),
    ])
    .await
    .unwrap();
    // no USD edge yet
    assert_eq!(pool_tvl(&idx).await, Amount::from(0));

    // 1 reference = 1000 USD
    idx.process(&answer(FEED_REF_USD, 103, "100000000000")).await.unwrap();
    let expected = Amount::from(20_000) * wad();
    assert_eq!(pool_tvl(&idx).await, expected);

    let slot: PoolAsset = load(&idx, &id(&format!("{COLLATERAL}:{MARKET}"))).await;
    assert_eq!(slot.tvl_usd, expected);
    assert_eq!(slot.tvl_updated_at, Some(1_700_000_000 + 103 * 12));

    let edge: AssetPrice = load(&idx, &id(&format!("{REFERENCE}:USD"))).await;
    assert_eq!(edge.decimals, 8);
    assert_eq!(edge.block_number, 103);
}

#[tokio::test]
async fn scaling_an_upstream_edge_scales_downstream_valuations() {
    let (idx, _) = indexer();
    idx.replay(vec![
        market_created(100),
        pool_deposit(101, TEN_TOKENS),
        answer(FEED_COLLATERAL_REF, 102, "2000000000000000000"),
        answer(FEED_REF_USD, 103, "100000000000"),
    ])
    .await
    .unwrap();
    let before = pool_tvl(&idx).await;

    // double the reference price
    idx.process(&answer(FEED_REF_USD, 104, "200000000000")).await.unwrap();
    let after = pool_tvl(&idx).await;

    let diff = after - before * 2;
    assert!(diff >= Amount::from(-1) && diff <= Amount::from(1), "diff {diff}");
}

#[tokio::test]
async fn scaling_an_intermediate_edge_revalues_only_the_dependent_reserve() {
    let (idx, _) = indexer();
    idx.replay(vec![
        market_created(100),
        pool_deposit(101, TEN_TOKENS),
        // 10 reference in, 5 collateral out
        event(
            CORK_POOL,
            102,
            0,
            "Swap",
            json!({
                "id": MARKET, "swaper": BOB, "paUsed": TEN_TOKENS, "swapTokenUsed": "0",
                "raReceived": "5000000000000000000", "dsExchangeRate": "1", "feePercentage": "0", "fee": "0",
            }),
        ),
        answer(FEED_COLLATERAL_REF, 103, "2000000000000000000"),
        answer(FEED_REF_USD, 104, "100000000000"),
    ])
    .await
    .unwrap();
    let collateral_slot = id(&format!("{COLLATERAL}:{MARKET}"));
    let reference_slot = id(&format!("{REFERENCE}:{MARKET}"));
    let collateral_before: PoolAsset = load(&idx, &collateral_slot).await;
    let reference_before: PoolAsset = load(&idx, &reference_slot).await;
    // 5 * 2000 + 10 * 1000
    assert_eq!(pool_tvl(&idx).await, Amount::from(20_000) * wad());

    // 1 collateral = 4 reference
    idx.process(&answer(FEED_COLLATERAL_REF, 105, "4000000000000000000")).await.unwrap();

    let collateral_after: PoolAsset = load(&idx, &collateral_slot).await;
    let reference_after: PoolAsset = load(&idx, &reference_slot).await;
    let diff = collateral_after.tvl_usd.clone() - collateral_before.tvl_usd.clone() * 2;
    assert!(diff >= Amount::from(-1) && diff <= Amount::from(1), "diff {diff}");
    assert_eq!(reference_after.tvl_usd, reference_before.tvl_usd);
    assert_eq!(collateral_after.tvl_updated_at, Some(1_700_000_000 + 105 * 12));
    assert_eq!(pool_tvl(&idx).await, Amount::from(30_000) * wad());
}

#[tokio::test]
async fn reissued_market_keeps_its_valuation() {
    let (idx, _) = indexer();
    idx.replay(vec![
        market_created(100),
        pool_deposit(101, TEN_TOKENS),
        answer(FEED_COLLATERAL_REF, 102, "2000000000000000000"),
        answer(FEED_REF_USD, 103, "100000000000"),
    ])
    .await
    .unwrap();
    let before = pool_tvl(&idx).await;
    assert!(before > Amount::from(0));

    idx.process(&market_created(104)).await.unwrap();
    let pool: Pool = load(&idx, &id(MARKET)).await;
    assert_eq!(pool.tvl_usd, before);
    assert_eq!(pool.start_block, 104);
    assert_eq!(pool.tvl_updated_at, Some(1_700_000_000 + 104 * 12));
}

#[tokio::test]
async fn non_positive_answers_leave_the_path_unresolved() {
    let (idx, _) = indexer();
    idx.replay(vec![
        market_created(100),
        pool_deposit(101, TEN_TOKENS),
        answer(FEED_COLLATERAL_REF, 102, "2000000000000000000"),
        answer(FEED_REF_USD, 103, "100000000000"),
        answer(FEED_REF_USD, 104, "-1"),
    ])
    .await
    .unwrap();
    assert_eq!(pool_tvl(&idx).await, Amount::from(0));

    let edge: AssetPrice = load(&idx, &id(&format!("{REFERENCE}:USD"))).await;
    assert_eq!(edge.last_answer, Amount::from(-1));
}

#[tokio::test]
async fn price_cycles_resolve_to_zero() {
    let (idx, _) = indexer();
    let cycle_market = json!({
        "id": "0xbb",
        "referenceAsset": CYCLE_B,
        "collateralAsset": CYCLE_A,
        "expiry": 0,
        "exchangeRateProvider": RATE_PROVIDER,
        "principalToken": "0x00000000000000000000000000000000000000c1",
        "swapToken": "0x00000000000000000000000000000000000000c2",
    });
    let stats = idx
        .replay(vec![
            event(CORK_POOL, 100, 0, "MarketCreated", cycle_market),
            event(
                CORK_POOL,
                101,
                0,
                "Deposit",
                json!({ "marketId": "0xbb", "sender": ALICE, "owner": ALICE, "assets": "5", "shares": "5" }),
            ),
            answer(FEED_CYCLE_AB, 102, "1000000000000000000"),
            answer(FEED_CYCLE_BA, 103, "1000000000000000000"),
        ])
        .await
        .unwrap();
    assert_eq!(stats.applied, 4);

    let pool: Pool = load(&idx, &id("0xbb")).await;
    assert_eq!(pool.tvl_usd, Amount::from(0));
    assert!(pool.tvl_updated_at.is_some());
}

#[tokio::test]
async fn unknown_aggregator_is_only_recorded() {
    let (idx, store) = indexer();
    let stray = as_kind(
        answer("0x00000000000000000000000000000000000000ff", 10, "5"),
        ContractKind::PriceFeed,
    );
    assert!(matches!(idx.process(&stray).await.unwrap(), Processed::Applied { writes: 1 }));
    assert!(store.all(corkindex_core::EntityKind::AssetPrice).is_empty());
}
