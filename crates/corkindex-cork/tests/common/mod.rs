#![allow(dead_code)]

use std::sync::Arc;

use serde_json::{json, Value};

use corkindex_core::model::{Entity, EntityKind};
use corkindex_core::types::{Block, ContractKind, RawEvent};
use corkindex_core::{Indexer, IndexerConfig, MemoryStore};

pub const CHAIN: u64 = 1;

pub const CORK_POOL: &str = "0x00000000000000000000000000000000000000c0";
pub const MODULE_CORE: &str = "0x00000000000000000000000000000000000000d0";
pub const HOOK: &str = "0x00000000000000000000000000000000000000e0";

pub const PRINCIPAL: &str = "0x00000000000000000000000000000000000000a1";
pub const SWAP: &str = "0x00000000000000000000000000000000000000a2";
pub const COLLATERAL: &str = "0x00000000000000000000000000000000000000a3";
pub const REFERENCE: &str = "0x00000000000000000000000000000000000000a4";
pub const RATE_PROVIDER: &str = "0x00000000000000000000000000000000000000a5";

pub const ALICE: &str = "0x000000000000000000000000000000000000a11c";
pub const BOB: &str = "0x0000000000000000000000000000000000000b0b";
pub const CAROL: &str = "0x00000000000000000000000000000000000ca401";
pub const ZERO: &str = "0x0000000000000000000000000000000000000000";

/// Feed pricing COLLATERAL in REFERENCE (18 decimals).
pub const FEED_COLLATERAL_REF: &str = "0x00000000000000000000000000000000000000f1";
/// Feed pricing REFERENCE in USD (8 decimals).
pub const FEED_REF_USD: &str = "0x00000000000000000000000000000000000000f2";
/// Feeds forming a cycle between two tokens.
pub const FEED_CYCLE_AB: &str = "0x00000000000000000000000000000000000000f3";
pub const FEED_CYCLE_BA: &str = "0x00000000000000000000000000000000000000f4";
pub const CYCLE_A: &str = "0x00000000000000000000000000000000000000b1";
pub const CYCLE_B: &str = "0x00000000000000000000000000000000000000b2";

pub fn config() -> IndexerConfig {
    let yaml = format!(
        r#"
id: it
checkpoint_interval: 10
chains:
  - chain_id: 1
    contracts:
      - {{ kind: CorkPool, address: "{CORK_POOL}" }}
      - {{ kind: ModuleCore, address: "{MODULE_CORE}" }}
      - {{ kind: CorkHook, address: "{HOOK}" }}
      - {{ kind: PriceFeed, address: "{FEED_COLLATERAL_REF}" }}
      - {{ kind: PriceFeed, address: "{FEED_REF_USD}" }}
      - {{ kind: PriceFeed, address: "{FEED_CYCLE_AB}" }}
      - {{ kind: PriceFeed, address: "{FEED_CYCLE_BA}" }}
    price_feeds:
      - {{ aggregator: "{FEED_COLLATERAL_REF}", from_token: "{COLLATERAL}", to_token: "{REFERENCE}", decimals: 18 }}
      - {{ aggregator: "{FEED_REF_USD}", from_token: "{REFERENCE}", to_currency: USD, decimals: 8 }}
      - {{ aggregator: "{FEED_CYCLE_AB}", from_token: "{CYCLE_A}", to_token: "{CYCLE_B}", decimals: 18 }}
      - {{ aggregator: "{FEED_CYCLE_BA}", from_token: "{CYCLE_B}", to_token: "{CYCLE_A}", decimals: 18 }}
"#
    );
    IndexerConfig::from_yaml_str(&yaml).unwrap()
}

pub fn indexer() -> (Indexer, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    let table = corkindex_cork::compose_dispatch_table().unwrap();
    (Indexer::new(&config(), table, store.clone()), store)
}

pub fn event(src: &str, block: u64, log_index: u32, name: &str, params: Value) -> RawEvent {
    RawEvent {
        chain_id: CHAIN,
        block: Block {
            number: block,
            timestamp: 1_700_000_000 + block as i64 * 12,
        },
        log_index,
        src_address: src.to_string(),
        event: name.to_string(),
        contract: None,
        params,
    }
}

/// The same event with its contract family given explicitly.
pub fn as_kind(mut raw: RawEvent, kind: ContractKind) -> RawEvent {
    raw.contract = Some(kind);
    raw
}

pub const MARKET: &str = "0x00000000000000000000000000000000000000000000000000000000000000aa";

pub fn market_created(block: u64) -> RawEvent {
    event(
        CORK_POOL,
        block,
        0,
        "MarketCreated",
        json!({
            "id": MARKET,
            "referenceAsset": REFERENCE,
            "collateralAsset": COLLATERAL,
            "expiry": 1_700_000_000u64,
            "exchangeRateProvider": RATE_PROVIDER,
            "principalToken": PRINCIPAL,
            "swapToken": SWAP,
        }),
    )
}

pub fn pool_deposit(block: u64, assets: &str) -> RawEvent {
    event(
        CORK_POOL,
        block,
        0,
        "Deposit",
        json!({ "marketId": MARKET, "sender": ALICE, "owner": ALICE, "assets": assets, "shares": "900" }),
    )
}

pub fn transfer(token: &str, block: u64, log_index: u32, from: &str, to: &str, value: &str) -> RawEvent {
    event(token, block, log_index, "Transfer", json!({ "from": from, "to": to, "value": value }))
}

pub fn answer(feed: &str, block: u64, current: &str) -> RawEvent {
    event(feed, block, 0, "AnswerUpdated", json!({ "current": current, "roundId": 1, "updatedAt": 0 }))
}

pub fn id(local: &str) -> String {
    format!("{CHAIN}:{local}")
}

pub async fn load<E: Entity>(idx: &Indexer, id: &str) -> E {
    idx.db()
        .load::<E>(id)
        .await
        .unwrap()
        .unwrap_or_else(|| panic!("{} {id} missing", E::KIND))
}

/// Every stored document, by kind.
pub fn snapshot(store: &MemoryStore) -> Vec<(EntityKind, Vec<Value>)> {
    EntityKind::ALL
        .iter()
        .map(|kind| (*kind, store.all(*kind)))
        .collect()
}
