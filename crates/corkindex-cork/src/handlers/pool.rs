//! CorkPool markets: creation and reserve flows.

use async_trait::async_trait;
use tracing::{error, info};

use corkindex_core::amount::Amount;
use corkindex_core::context::{ApplyContext, WarmContext};
use corkindex_core::error::IndexerError;
use corkindex_core::factory::{ensure_account, ensure_pool_asset, ensure_token, replace_pool};
use corkindex_core::handler::{EventHandler, Outcome};
use corkindex_core::ids;
use corkindex_core::model::{Pool, PoolAsset, PoolType, Token, TokenRole};
use corkindex_core::pricing::recompute_pool_tvl;
use corkindex_core::registration::Registrations;
use corkindex_core::types::{ContractKind, Event};

use super::{move_reserves, to_expiry, warm_reserves, Move};
use crate::events;

/// The market's pool, with its reserves, tokens and `accounts` prefetched.
async fn load_market(
    ctx: &WarmContext,
    market_id: &str,
    accounts: &[&str],
) -> Result<Option<Pool>, IndexerError> {
    let pool_id = ids::pool(ctx.chain_id(), &ids::market_pool_key(market_id));
    let pool = ctx.get::<Pool>(&pool_id).await?;
    if let Some(pool) = &pool {
        let reserves: Vec<&str> = pool.reserve_addrs().collect();
        warm_reserves(ctx, pool, &reserves, accounts).await?;
    }
    Ok(pool)
}

/// Make sure every token of the market exists, each with its market role.
async fn ensure_market_tokens(ctx: &mut ApplyContext, pool: &Pool) -> Result<(), IndexerError> {
    let tokens = [
        (&pool.reference_asset_addr, TokenRole::Reference),
        (&pool.collateral_asset_addr, TokenRole::Collateral),
        (&pool.principal_token_addr, TokenRole::Principal),
        (&pool.swap_token_addr, TokenRole::Swap),
    ];
    for (addr, role) in tokens {
        if let Some(addr) = addr {
            ensure_token(ctx, addr, role).await?;
        }
    }
    Ok(())
}

fn unknown_market<P>(event: &Event<P>, market_id: &str) -> Outcome {
    error!(
        chain_id = event.chain_id,
        block = event.block.number,
        log_index = event.log_index,
        market_id,
        event = %event.name,
        "event for unknown market"
    );
    Outcome::skipped(format!("unknown market {market_id}"))
}

fn reserves(pool: &Pool) -> Option<(&str, &str)> {
    Some((
        pool.collateral_asset_addr.as_deref()?,
        pool.reference_asset_addr.as_deref()?,
    ))
}

// ─── MarketCreated ────────────────────────────────────────────────────────────

/// Creates the market's four tokens and its pool, and subscribes to the
/// principal and swap tokens.
pub struct MarketCreated;

#[async_trait]
impl EventHandler for MarketCreated {
    type Params = events::MarketCreated;
    type Loaded = ();

    fn register(&self, event: &Event<Self::Params>, out: &mut Registrations) {
        out.add(ContractKind::PrincipalToken, &event.params.principal_token);
        out.add(ContractKind::SwapToken, &event.params.swap_token);
    }

    async fn warm(&self, event: &Event<Self::Params>, ctx: &WarmContext) -> Result<(), IndexerError> {
        let chain = ctx.chain_id();
        let p = &event.params;
        let pool_key = ids::market_pool_key(&p.id);
        let (reference, collateral, principal, swap) = (
            ids::token(chain, &p.reference_asset),
            ids::token(chain, &p.collateral_asset),
            ids::token(chain, &p.principal_token),
            ids::token(chain, &p.swap_token),
        );
        let pool_id = ids::pool(chain, &pool_key);
        let (collateral_slot, reference_slot) = (
            ids::pool_asset(chain, &pool_key, &p.collateral_asset),
            ids::pool_asset(chain, &pool_key, &p.reference_asset),
        );
        futures::try_join!(
            ctx.get::<Token>(&reference),
            ctx.get::<Token>(&collateral),
            ctx.get::<Token>(&principal),
            ctx.get::<Token>(&swap),
            ctx.get::<PoolAsset>(&collateral_slot),
            ctx.get::<PoolAsset>(&reference_slot),
            ctx.find::<PoolAsset>("pool_id", &pool_id),
        )?;
        Ok(())
    }

    async fn apply(
        &self,
        event: &Event<Self::Params>,
        _loaded: (),
        ctx: &mut ApplyContext,
    ) -> Result<Outcome, IndexerError> {
        let chain_id = ctx.chain_id();
        let p = &event.params;

        ensure_token(ctx, &p.reference_asset, TokenRole::Reference).await?;
        ensure_token(ctx, &p.collateral_asset, TokenRole::Collateral).await?;
        ensure_token(ctx, &p.principal_token, TokenRole::Principal).await?;
        ensure_token(ctx, &p.swap_token, TokenRole::Swap).await?;

        let pool_key = ids::market_pool_key(&p.id);
        let pool = Pool {
            id: ids::pool(chain_id, &pool_key),
            chain_id,
            pool_key: pool_key.clone(),
            typ: PoolType::CorkPool,
            principal_token_addr: Some(ids::normalize(&p.principal_token)),
            swap_token_addr: Some(ids::normalize(&p.swap_token)),
            collateral_asset_addr: Some(ids::normalize(&p.collateral_asset)),
            reference_asset_addr: Some(ids::normalize(&p.reference_asset)),
            exchange_rate_provider_addr: Some(ids::normalize(&p.exchange_rate_provider)),
            manager_addr: event.src_address.clone(),
            share_token_id: Some(ids::token(chain_id, &p.principal_token)),
            market_id: None,
            expiry: to_expiry(&p.expiry),
            start_block: event.block.number,
            tvl_usd: Amount::default(),
            tvl_updated_at: None,
        };
        replace_pool(ctx, &pool)?;

        ensure_pool_asset(ctx, &pool_key, &p.collateral_asset).await?;
        ensure_pool_asset(ctx, &pool_key, &p.reference_asset).await?;
        // a re-emitted creation keeps its reserves; value them again
        recompute_pool_tvl(ctx, &pool.id, event.block.timestamp).await?;

        info!(chain_id, pool_id = %pool.id, expiry = ?pool.expiry, "market created");
        Ok(Outcome::Applied)
    }
}

// ─── Reserve flows ────────────────────────────────────────────────────────────

/// `Deposit`: collateral in.
pub struct Deposit;

#[async_trait]
impl EventHandler for Deposit {
    type Params = events::PoolDeposit;
    type Loaded = Option<Pool>;

    async fn warm(&self, event: &Event<Self::Params>, ctx: &WarmContext) -> Result<Option<Pool>, IndexerError> {
        let p = &event.params;
        load_market(ctx, &p.market_id, &[p.sender.as_str(), p.owner.as_str()]).await
    }

    async fn apply(
        &self,
        event: &Event<Self::Params>,
        pool: Option<Pool>,
        ctx: &mut ApplyContext,
    ) -> Result<Outcome, IndexerError> {
        let p = &event.params;
        let Some(pool) = pool else {
            return Ok(unknown_market(event, &p.market_id));
        };
        let Some((collateral, _)) = reserves(&pool) else {
            return Ok(unknown_market(event, &p.market_id));
        };
        ensure_market_tokens(ctx, &pool).await?;
        ensure_account(ctx, &p.sender).await?;
        ensure_account(ctx, &p.owner).await?;
        move_reserves(ctx, event, &pool, &[Move::Credit(collateral, &p.assets)]).await?;
        Ok(Outcome::Applied)
    }
}

/// `WithdrawExtended`: collateral and reference out.
pub struct WithdrawExtended;

#[async_trait]
impl EventHandler for WithdrawExtended {
    type Params = events::WithdrawExtended;
    type Loaded = Option<Pool>;

    async fn warm(&self, event: &Event<Self::Params>, ctx: &WarmContext) -> Result<Option<Pool>, IndexerError> {
        let p = &event.params;
        load_market(ctx, &p.market_id, &[p.sender.as_str(), p.owner.as_str()]).await
    }

    async fn apply(
        &self,
        event: &Event<Self::Params>,
        pool: Option<Pool>,
        ctx: &mut ApplyContext,
    ) -> Result<Outcome, IndexerError> {
        let p = &event.params;
        let Some((pool, (collateral, reference))) = pool.as_ref().and_then(|pl| Some((pl, reserves(pl)?))) else {
            return Ok(unknown_market(event, &p.market_id));
        };
        ensure_account(ctx, &p.sender).await?;
        ensure_account(ctx, &p.owner).await?;
        move_reserves(
            ctx,
            event,
            pool,
            &[Move::Debit(collateral, &p.assets0), Move::Debit(reference, &p.assets1)],
        )
        .await?;
        Ok(Outcome::Applied)
    }
}

/// `Swap`: reference in, collateral out.
pub struct Swap;

#[async_trait]
impl EventHandler for Swap {
    type Params = events::Swap;
    type Loaded = Option<Pool>;

    async fn warm(&self, event: &Event<Self::Params>, ctx: &WarmContext) -> Result<Option<Pool>, IndexerError> {
        load_market(ctx, &event.params.id, &[event.params.swaper.as_str()]).await
    }

    async fn apply(
        &self,
        event: &Event<Self::Params>,
        pool: Option<Pool>,
        ctx: &mut ApplyContext,
    ) -> Result<Outcome, IndexerError> {
        let p = &event.params;
        let Some((pool, (collateral, reference))) = pool.as_ref().and_then(|pl| Some((pl, reserves(pl)?))) else {
            return Ok(unknown_market(event, &p.id));
        };
        ensure_account(ctx, &p.swaper).await?;
        move_reserves(
            ctx,
            event,
            pool,
            &[Move::Credit(reference, &p.pa_used), Move::Debit(collateral, &p.ra_received)],
        )
        .await?;
        Ok(Outcome::Applied)
    }
}

/// `UnwindSwap`: collateral in, reference out.
pub struct UnwindSwap;

#[async_trait]
impl EventHandler for UnwindSwap {
    type Params = events::UnwindSwap;
    type Loaded = Option<Pool>;

    async fn warm(&self, event: &Event<Self::Params>, ctx: &WarmContext) -> Result<Option<Pool>, IndexerError> {
        load_market(ctx, &event.params.id, &[event.params.buyer.as_str()]).await
    }

    async fn apply(
        &self,
        event: &Event<Self::Params>,
        pool: Option<Pool>,
        ctx: &mut ApplyContext,
    ) -> Result<Outcome, IndexerError> {
        let p = &event.params;
        let Some((pool, (collateral, reference))) = pool.as_ref().and_then(|pl| Some((pl, reserves(pl)?))) else {
            return Ok(unknown_market(event, &p.id));
        };
        ensure_account(ctx, &p.buyer).await?;
        move_reserves(
            ctx,
            event,
            pool,
            &[
                Move::Credit(collateral, &p.ra_used),
                Move::Debit(reference, &p.received_reference_asset),
            ],
        )
        .await?;
        Ok(Outcome::Applied)
    }
}
