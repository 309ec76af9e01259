mod common;

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};

use common::*;
use corkindex_core::config::ChainSettings;
use corkindex_core::context::WarmContext;
use corkindex_core::handler::{EventHandler, Outcome};
use corkindex_core::model::EntityKind;
use corkindex_core::store::{Db, EntityStore, MemoryStore, Write};
use corkindex_core::types::{ContractKind, Event, RawEvent};
use corkindex_core::{Indexer, IndexerError};
use corkindex_cork::events;
use corkindex_cork::handlers::{hook, pool, psm};

const MK: &str = "0x00000000000000000000000000000000000000000000000000000000000000dd";
const PA: &str = "0x0000000000000000000000000000000000000b01";
const RA: &str = "0x0000000000000000000000000000000000000b02";
const LV: &str = "0x0000000000000000000000000000000000000b03";
const DS: &str = "0x0000000000000000000000000000000000000b04";
const CT: &str = "0x0000000000000000000000000000000000000b05";
const LP: &str = "0x0000000000000000000000000000000000000b06";

/// Memory store that remembers every point lookup.
#[derive(Default)]
struct RecordingStore {
    inner: MemoryStore,
    reads: Mutex<Vec<(EntityKind, String)>>,
}

impl RecordingStore {
    fn take_reads(&self) -> Vec<(EntityKind, String)> {
        std::mem::take(&mut *self.reads.lock().unwrap())
    }
}

#[async_trait]
impl EntityStore for RecordingStore {
    async fn get(&self, kind: EntityKind, id: &str) -> Result<Option<Value>, IndexerError> {
        self.reads.lock().unwrap().push((kind, id.to_string()));
        self.inner.get(kind, id).await
    }

    async fn find(&self, kind: EntityKind, field: &str, value: &str) -> Result<Vec<Value>, IndexerError> {
        self.inner.find(kind, field, value).await
    }

    async fn upsert_batch(&self, writes: Vec<Write>) -> Result<(), IndexerError> {
        self.inner.upsert_batch(writes).await
    }

    async fn count(&self, kind: EntityKind) -> Result<u64, IndexerError> {
        self.inner.count(kind).await
    }
}

async fn seeded(events: Vec<RawEvent>) -> Arc<RecordingStore> {
    let store = Arc::new(RecordingStore::default());
    let table = corkindex_cork::compose_dispatch_table().unwrap();
    let idx = Indexer::new(&config(), table, store.clone());
    let stats = idx.replay(events).await.unwrap();
    assert_eq!(stats.failed + stats.skipped, 0);
    store
}

fn typed<P: DeserializeOwned>(raw: &RawEvent, contract: ContractKind) -> Event<P> {
    Event {
        chain_id: raw.chain_id,
        block: raw.block,
        log_index: raw.log_index,
        src_address: raw.src_address.to_lowercase(),
        contract,
        name: raw.event.clone(),
        params: serde_json::from_value(raw.params.clone()).unwrap(),
    }
}

/// Run both phases of `handler` and return the store lookups apply made.
async fn apply_reads<H: EventHandler>(
    store: &Arc<RecordingStore>,
    handler: &H,
    event: &Event<H::Params>,
) -> Vec<(EntityKind, String)> {
    let warm = WarmContext::new(Db::new(store.clone()), Arc::new(ChainSettings::new(CHAIN)));
    let loaded = handler.warm(event, &warm).await.unwrap();
    store.take_reads();

    let mut ctx = warm.into_apply();
    let outcome = handler.apply(event, loaded, &mut ctx).await.unwrap();
    assert_eq!(outcome, Outcome::Applied);
    store.take_reads()
}

/// Rows a reserve flow touches; none of them may reach the store in apply.
fn assert_all_cached(reads: &[(EntityKind, String)]) {
    let missed: Vec<_> = reads
        .iter()
        .filter(|(kind, _)| {
            matches!(
                kind,
                EntityKind::Pool | EntityKind::PoolAsset | EntityKind::Token | EntityKind::Account
            )
        })
        .collect();
    assert!(missed.is_empty(), "read in apply: {missed:?}");
}

fn psm_setup() -> Vec<RawEvent> {
    vec![
        event(
            MODULE_CORE,
            10,
            0,
            "InitializedModuleCore",
            json!({
                "id": MK, "pa": PA, "ra": RA, "lv": LV, "expiry": 86_400,
                "initialArp": "0", "exchangeRateProvider": RATE_PROVIDER,
            }),
        ),
        event(
            MODULE_CORE,
            11,
            0,
            "Issued",
            json!({ "id": MK, "dsId": 1, "expiry": 1_800_000_000u64, "ds": DS, "ct": CT }),
        ),
    ]
}

#[tokio::test]
async fn cork_pool_flows_read_only_prefetched_rows() {
    let store = seeded(vec![market_created(100), pool_deposit(101, "1000")]).await;

    let deposit = typed::<events::PoolDeposit>(&pool_deposit(102, "500"), ContractKind::CorkPool);
    assert_all_cached(&apply_reads(&store, &pool::Deposit, &deposit).await);

    let swap = event(
        CORK_POOL,
        103,
        0,
        "Swap",
        json!({
            "id": MARKET, "swaper": BOB, "paUsed": "50", "swapTokenUsed": "50",
            "raReceived": "45", "dsExchangeRate": "1", "feePercentage": "0", "fee": "5",
        }),
    );
    let swap = typed::<events::Swap>(&swap, ContractKind::CorkPool);
    assert_all_cached(&apply_reads(&store, &pool::Swap, &swap).await);
}

#[tokio::test]
async fn psm_flows_read_only_prefetched_rows() {
    let store = seeded(psm_setup()).await;
    let deposited = event(
        MODULE_CORE,
        12,
        0,
        "PsmDeposited",
        json!({ "id": MK, "dsId": 1, "depositor": ALICE, "amount": "1000", "received": "1000", "exchangeRate": "1" }),
    );
    let deposited = typed::<events::PsmDeposited>(&deposited, ContractKind::ModuleCore);
    assert_all_cached(&apply_reads(&store, &psm::PsmDeposited, &deposited).await);
}

#[tokio::test]
async fn hook_flows_read_only_prefetched_rows() {
    let mut setup = psm_setup();
    setup.push(event(HOOK, 12, 0, "Initialized", json!({ "ra": RA, "ct": CT, "liquidityToken": LP })));
    let store = seeded(setup).await;

    let added = event(
        HOOK,
        13,
        0,
        "AddedLiquidity",
        json!({ "ra": RA, "ct": CT, "raAmount": "100", "ctAmount": "200", "mintedLp": "10", "who": ALICE }),
    );
    let added = typed::<events::AddedLiquidity>(&added, ContractKind::CorkHook);
    assert_all_cached(&apply_reads(&store, &hook::AddedLiquidity, &added).await);

    let swapped = event(
        HOOK,
        14,
        0,
        "Swapped",
        json!({
            "input": CT, "output": RA, "amountIn": "10", "amountOut": "8", "who": BOB,
            "baseFeePercentage": "0", "realizedFeePercentage": "0", "realizedFeeAmount": "0",
        }),
    );
    let swapped = typed::<events::Swapped>(&swapped, ContractKind::CorkHook);
    assert_all_cached(&apply_reads(&store, &hook::Swapped, &swapped).await);
}
