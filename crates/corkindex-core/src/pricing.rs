//! Price graph and reserve valuation.
//!
//! Oracle feeds write directed [`AssetPrice`] edges (token → token or
//! token → currency). A token's USD price is found by walking edges until a
//! USD edge is reached, multiplying rates end to end in 18-decimal fixed
//! point. Unresolvable prices are zero, which is a normal outcome.

use bigdecimal::num_traits::{Signed, Zero};
use futures::future::{BoxFuture, FutureExt};
use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use tracing::{debug, warn};

use crate::amount::{mul_wad, Amount};
use crate::config::{PriceFeedConfig, PriceTarget};
use crate::context::ApplyContext;
use crate::error::IndexerError;
use crate::ids::{self, USD};
use crate::model::{AssetPrice, Pool, PoolAsset, Token, TokenPoolsIndex};
use crate::types::Event;

pub use crate::amount::scale_to_wad;

/// Upsert the edge fed by `feed` with its latest answer.
///
/// Non-positive answers are stored as reported; resolution treats them as
/// unresolved.
pub async fn upsert_edge<P>(
    ctx: &mut ApplyContext,
    event: &Event<P>,
    feed: &PriceFeedConfig,
    answer: &Amount,
) -> Result<AssetPrice, IndexerError> {
    let chain_id = ctx.chain_id();
    let (id, to_token_id, to_currency) = match feed.target()? {
        PriceTarget::Token(to) => (
            ids::asset_price_to_token(chain_id, &feed.from_token, &to),
            Some(ids::token(chain_id, &to)),
            None,
        ),
        PriceTarget::Currency(currency) => (
            ids::asset_price_to_currency(chain_id, &feed.from_token, &currency),
            None,
            Some(currency),
        ),
    };

    if !answer.is_positive() {
        warn!(edge = %id, answer = %answer, "non-positive oracle answer");
    }

    let edge = AssetPrice {
        id,
        chain_id,
        from_token_id: ids::token(chain_id, &feed.from_token),
        to_token_id,
        to_currency,
        last_answer: answer.clone(),
        decimals: feed.decimals,
        updated_at: event.block.timestamp,
        block_number: event.block.number,
    };
    ctx.set(&edge)?;
    Ok(edge)
}

/// USD price of `token_id` in WAD, or zero when no path to USD exists.
pub async fn resolve_usd_price(ctx: &mut ApplyContext, token_id: &str) -> Result<Amount, IndexerError> {
    let mut visited = HashSet::new();
    resolve(ctx, token_id.to_string(), &mut visited).await
}

fn resolve<'a>(
    ctx: &'a mut ApplyContext,
    token_id: String,
    visited: &'a mut HashSet<String>,
) -> BoxFuture<'a, Result<Amount, IndexerError>> {
    async move {
        if !visited.insert(token_id.clone()) {
            return Ok(Amount::zero());
        }
        let chain_id = ctx.chain_id();

        let direct_id = ids::asset_price_to_currency(chain_id, ids::local_part(&token_id), USD);
        if let Some(direct) = ctx.get::<AssetPrice>(&direct_id).await? {
            if direct.last_answer.is_positive() {
                return Ok(scale_to_wad(&direct.last_answer, direct.decimals));
            }
        }

        let edges: Vec<AssetPrice> = ctx.find("from_token_id", &token_id).await?;
        for edge in edges {
            let Some(next) = edge.to_token_id.clone() else {
                continue;
            };
            if !edge.last_answer.is_positive() {
                continue;
            }
            let next_usd = resolve(ctx, next, visited).await?;
            if next_usd.is_positive() {
                let rate = scale_to_wad(&edge.last_answer, edge.decimals);
                return Ok(mul_wad(&rate, &next_usd));
            }
        }
        Ok(Amount::zero())
    }
    .boxed()
}

/// `token_id` plus every token whose path to USD may run through it, found by
/// walking edges backwards.
pub async fn impacted_tokens(ctx: &mut ApplyContext, token_id: &str) -> Result<Vec<String>, IndexerError> {
    let mut visited: HashSet<String> = HashSet::new();
    let mut order = Vec::new();
    let mut queue = VecDeque::from([token_id.to_string()]);

    while let Some(current) = queue.pop_front() {
        if !visited.insert(current.clone()) {
            continue;
        }
        let upstream: Vec<AssetPrice> = ctx.find("to_token_id", &current).await?;
        for edge in upstream {
            if !visited.contains(&edge.from_token_id) {
                queue.push_back(edge.from_token_id);
            }
        }
        order.push(current);
    }
    Ok(order)
}

/// Recompute the USD valuation of every reserve of a pool and the pool
/// aggregate. Returns `false` when the pool does not exist.
pub async fn recompute_pool_tvl(
    ctx: &mut ApplyContext,
    pool_id: &str,
    timestamp: i64,
) -> Result<bool, IndexerError> {
    let mut prices = HashMap::new();
    recompute_with(ctx, pool_id, timestamp, &mut prices).await
}

async fn recompute_with(
    ctx: &mut ApplyContext,
    pool_id: &str,
    timestamp: i64,
    prices: &mut HashMap<String, Amount>,
) -> Result<bool, IndexerError> {
    let Some(mut pool) = ctx.get::<Pool>(pool_id).await? else {
        debug!(pool_id, "no pool to value");
        return Ok(false);
    };

    let slots: Vec<PoolAsset> = ctx.find("pool_id", pool_id).await?;
    let mut total = Amount::zero();
    for mut slot in slots {
        let price = match prices.get(&slot.token_id) {
            Some(p) => p.clone(),
            None => {
                let p = resolve_usd_price(ctx, &slot.token_id).await?;
                prices.insert(slot.token_id.clone(), p.clone());
                p
            }
        };
        let decimals = token_decimals(ctx, &slot.token_id, &slot.token_address).await?;
        let value = mul_wad(&scale_to_wad(&slot.balance, decimals), &price);

        total += &value;
        slot.tvl_usd = value;
        slot.tvl_updated_at = Some(timestamp);
        ctx.set(&slot)?;
    }

    debug!(pool_id, tvl_usd = %total, "pool revalued");
    pool.tvl_usd = total;
    pool.tvl_updated_at = Some(timestamp);
    ctx.set(&pool)?;
    Ok(true)
}

async fn token_decimals(
    ctx: &mut ApplyContext,
    token_id: &str,
    token_addr: &str,
) -> Result<u8, IndexerError> {
    Ok(match ctx.get::<Token>(token_id).await? {
        Some(token) => token.decimals,
        None => ctx.chain().decimals_of(token_addr),
    })
}

/// Revalue every pool holding `token_id` or a token priced through it.
/// Returns the revalued pool ids in order.
pub async fn revalue_token(
    ctx: &mut ApplyContext,
    token_id: &str,
    timestamp: i64,
) -> Result<Vec<String>, IndexerError> {
    let mut pools = BTreeSet::new();
    for token in impacted_tokens(ctx, token_id).await? {
        if let Some(index) = ctx.get::<TokenPoolsIndex>(&token).await? {
            pools.extend(index.pool_ids);
        }
    }

    let mut prices = HashMap::new();
    let mut revalued = Vec::with_capacity(pools.len());
    for pool_id in pools {
        if recompute_with(ctx, &pool_id, timestamp, &mut prices).await? {
            revalued.push(pool_id);
        }
    }
    Ok(revalued)
}
