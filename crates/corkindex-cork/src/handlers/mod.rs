//! Handler sets, one module per contract family.

pub mod admin;
pub mod hook;
pub mod pool;
pub mod price_feed;
pub mod psm;
pub mod token;

use bigdecimal::num_traits::ToPrimitive;
use futures::future::try_join_all;
use tracing::warn;

use corkindex_core::amount::Amount;
use corkindex_core::context::{ApplyContext, WarmContext};
use corkindex_core::error::IndexerError;
use corkindex_core::ids;
use corkindex_core::ledger::{credit_reserve, debit_reserve};
use corkindex_core::model::{Account, Pool, PoolAsset, Token};
use corkindex_core::pricing::recompute_pool_tvl;
use corkindex_core::types::Event;

/// One signed move on a pool reserve.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Move<'a> {
    Credit(&'a str, &'a Amount),
    Debit(&'a str, &'a Amount),
}

/// Prefetch everything a reserve flow on `pool` reads: the slots of
/// `reserve_tokens`, the pool's tokens, the `accounts` involved and the
/// pool's slot listing used for revaluation. All reads go out as one batch.
pub(crate) async fn warm_reserves(
    ctx: &WarmContext,
    pool: &Pool,
    reserve_tokens: &[&str],
    accounts: &[&str],
) -> Result<(), IndexerError> {
    let chain = ctx.chain_id();
    let slots: Vec<String> = reserve_tokens
        .iter()
        .map(|t| ids::pool_asset(chain, &pool.pool_key, t))
        .collect();
    let mut tokens: Vec<String> = reserve_tokens
        .iter()
        .copied()
        .chain(pool.reserve_addrs())
        .chain(pool.principal_token_addr.as_deref())
        .chain(pool.swap_token_addr.as_deref())
        .map(|t| ids::token(chain, t))
        .collect();
    tokens.sort();
    tokens.dedup();
    let mut accounts: Vec<String> = accounts.iter().map(|a| ids::account(chain, a)).collect();
    accounts.sort();
    accounts.dedup();

    futures::try_join!(
        try_join_all(slots.iter().map(|id| ctx.get::<PoolAsset>(id))),
        try_join_all(tokens.iter().map(|id| ctx.get::<Token>(id))),
        try_join_all(accounts.iter().map(|id| ctx.get::<Account>(id))),
        ctx.find::<PoolAsset>("pool_id", &pool.id),
    )?;
    Ok(())
}

/// Apply `moves` to `pool`'s reserves, then revalue the pool.
pub(crate) async fn move_reserves<P>(
    ctx: &mut ApplyContext,
    event: &Event<P>,
    pool: &Pool,
    moves: &[Move<'_>],
) -> Result<(), IndexerError> {
    for m in moves {
        match *m {
            Move::Credit(token, amount) => {
                credit_reserve(ctx, event, &pool.pool_key, token, amount).await?;
            }
            Move::Debit(token, amount) => {
                debit_reserve(ctx, event, &pool.pool_key, token, amount).await?;
            }
        }
    }
    recompute_pool_tvl(ctx, &pool.id, event.block.timestamp).await?;
    Ok(())
}

/// A `uint256` timestamp that fits in `u64`, if any.
pub(crate) fn to_expiry(value: &Amount) -> Option<u64> {
    let expiry = value.to_u64();
    if expiry.is_none() {
        warn!(%value, "expiry out of range");
    }
    expiry
}
