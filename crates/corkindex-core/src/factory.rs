//! Get-or-create combinators for lazily materialized entities.
//!
//! A lookup that misses constructs the entity with defaults and stages the
//! write immediately, so later lookups within the same event observe it.
//! Existing entities are returned untouched: a zero balance is a present
//! entity, never a missing one.

use tracing::debug;

use crate::amount::Amount;
use crate::context::ApplyContext;
use crate::error::IndexerError;
use crate::ids;
use crate::model::{Account, AccountToken, Entity, Pool, PoolAsset, Token, TokenPoolsIndex, TokenRole};

/// Return the entity stored under `id`, or stage and return `make()`.
pub async fn get_or_create<E, F>(ctx: &mut ApplyContext, id: &str, make: F) -> Result<E, IndexerError>
where
    E: Entity,
    F: FnOnce() -> E,
{
    if let Some(existing) = ctx.get::<E>(id).await? {
        return Ok(existing);
    }
    let created = make();
    debug!(kind = %E::KIND, id, "created");
    ctx.set(&created)?;
    Ok(created)
}

pub async fn ensure_account(ctx: &mut ApplyContext, addr: &str) -> Result<Account, IndexerError> {
    let chain_id = ctx.chain_id();
    let id = ids::account(chain_id, addr);
    get_or_create(ctx, &id, || Account {
        id: id.clone(),
        chain_id,
        address: ids::normalize(addr),
    })
    .await
}

/// The first creator's role sticks; later calls with another role return the
/// existing token unchanged.
pub async fn ensure_token(
    ctx: &mut ApplyContext,
    addr: &str,
    role: TokenRole,
) -> Result<Token, IndexerError> {
    let chain_id = ctx.chain_id();
    let decimals = ctx.chain().decimals_of(addr);
    let id = ids::token(chain_id, addr);
    let token = get_or_create(ctx, &id, || Token {
        id: id.clone(),
        chain_id,
        address: ids::normalize(addr),
        role,
        decimals,
        total_supply: Amount::default(),
    })
    .await?;
    if token.role != role {
        debug!(token = %token.id, existing = token.role.as_str(), requested = role.as_str(), "token role already assigned");
    }
    Ok(token)
}

pub async fn ensure_account_token(
    ctx: &mut ApplyContext,
    token_addr: &str,
    account_addr: &str,
) -> Result<AccountToken, IndexerError> {
    let chain_id = ctx.chain_id();
    let id = ids::account_token(chain_id, token_addr, account_addr);
    get_or_create(ctx, &id, || AccountToken {
        id: id.clone(),
        chain_id,
        account_id: ids::account(chain_id, account_addr),
        token_id: ids::token(chain_id, token_addr),
        balance: Amount::default(),
    })
    .await
}

/// Reserve slot of `token_addr` in the pool with key `pool_key`. Creating a
/// slot also records the pool in the token's [`TokenPoolsIndex`].
pub async fn ensure_pool_asset(
    ctx: &mut ApplyContext,
    pool_key: &str,
    token_addr: &str,
) -> Result<PoolAsset, IndexerError> {
    let chain_id = ctx.chain_id();
    let id = ids::pool_asset(chain_id, pool_key, token_addr);
    if let Some(existing) = ctx.get::<PoolAsset>(&id).await? {
        return Ok(existing);
    }

    let pool_id = ids::pool(chain_id, pool_key);
    let token_id = ids::token(chain_id, token_addr);
    let slot = PoolAsset {
        id: id.clone(),
        chain_id,
        pool_id: pool_id.clone(),
        token_id: token_id.clone(),
        token_address: ids::normalize(token_addr),
        balance: Amount::default(),
        tvl_usd: Amount::default(),
        tvl_updated_at: None,
    };
    debug!(kind = "PoolAsset", id = %id, "created");
    ctx.set(&slot)?;
    index_token_pool(ctx, &token_id, &pool_id).await?;
    Ok(slot)
}

/// Add `pool_id` to the reverse index of `token_id`. Idempotent.
pub async fn index_token_pool(
    ctx: &mut ApplyContext,
    token_id: &str,
    pool_id: &str,
) -> Result<(), IndexerError> {
    let chain_id = ctx.chain_id();
    let mut index = get_or_create(ctx, token_id, || TokenPoolsIndex {
        id: token_id.to_string(),
        chain_id,
        pool_ids: vec![],
    })
    .await?;
    if !index.pool_ids.iter().any(|p| p == pool_id) {
        index.pool_ids.push(pool_id.to_string());
        ctx.set(&index)?;
    }
    Ok(())
}

/// Write `pool` over whatever is stored under its id.
///
/// Pool creation events are authoritative for pool metadata, so this is the
/// one factory operation that overwrites.
pub fn replace_pool(ctx: &mut ApplyContext, pool: &Pool) -> Result<(), IndexerError> {
    debug!(pool_id = %pool.id, typ = ?pool.typ, "pool written");
    ctx.set(pool)
}
