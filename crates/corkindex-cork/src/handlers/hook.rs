//! CorkHook AMM: pool splicing and liquidity/swap reserves.
//!
//! Each AMM pool pairs a term's RA with its cover token. The hook's
//! `Initialized` copies the term's PSM pool under the `:AMM` id; later hook
//! events find that copy through the cover token.

use async_trait::async_trait;
use tracing::{error, info};

use corkindex_core::amount::Amount;
use corkindex_core::context::{ApplyContext, WarmContext};
use corkindex_core::error::IndexerError;
use corkindex_core::factory::{ensure_account, ensure_pool_asset, ensure_token, replace_pool};
use corkindex_core::handler::{EventHandler, Outcome};
use corkindex_core::ids;
use corkindex_core::model::{Pool, PoolType, TokenRole};
use corkindex_core::registration::Registrations;
use corkindex_core::types::{ContractKind, Event};

use super::{move_reserves, warm_reserves, Move};
use crate::events;

/// The PSM pool whose share token is `ct`.
async fn psm_pool_of(ctx: &WarmContext, ct: &str) -> Result<Option<Pool>, IndexerError> {
    let share = ids::token(ctx.chain_id(), ct);
    let pools: Vec<Pool> = ctx.find("share_token_id", &share).await?;
    Ok(pools.into_iter().find(|p| p.typ == PoolType::TermPsm))
}

/// The AMM pool spliced from the PSM pool of `ct`.
async fn amm_pool_of(ctx: &WarmContext, ct: &str) -> Result<Option<Pool>, IndexerError> {
    match psm_pool_of(ctx, ct).await? {
        Some(psm) => ctx.get(&ids::amm_pool_id(&psm.id)).await,
        None => Ok(None),
    }
}

/// The AMM pool of `ct`, with the reserves of `tokens` and the account `who`
/// prefetched.
async fn load_amm(
    ctx: &WarmContext,
    ct: &str,
    tokens: &[&str],
    who: &str,
) -> Result<Option<Pool>, IndexerError> {
    let pool = amm_pool_of(ctx, ct).await?;
    if let Some(pool) = &pool {
        warm_reserves(ctx, pool, tokens, &[who]).await?;
    }
    Ok(pool)
}

fn no_amm_pool<P>(event: &Event<P>, ct: &str) -> Outcome {
    error!(
        chain_id = event.chain_id,
        block = event.block.number,
        log_index = event.log_index,
        ct,
        event = %event.name,
        "no AMM pool for cover token"
    );
    Outcome::skipped(format!("no AMM pool for {ct}"))
}

/// `Initialized`: splice the AMM pool of a term and subscribe to its LP token.
pub struct Initialized;

#[async_trait]
impl EventHandler for Initialized {
    type Params = events::HookInitialized;
    type Loaded = Option<Pool>;

    fn register(&self, event: &Event<Self::Params>, out: &mut Registrations) {
        out.add(ContractKind::LiquidityToken, &event.params.liquidity_token);
    }

    async fn warm(&self, event: &Event<Self::Params>, ctx: &WarmContext) -> Result<Option<Pool>, IndexerError> {
        psm_pool_of(ctx, &event.params.ct).await
    }

    async fn apply(
        &self,
        event: &Event<Self::Params>,
        psm: Option<Pool>,
        ctx: &mut ApplyContext,
    ) -> Result<Outcome, IndexerError> {
        let chain_id = ctx.chain_id();
        let p = &event.params;
        let Some(psm) = psm else {
            error!(chain_id, block = event.block.number, ct = %p.ct, "no PSM pool for cover token");
            return Ok(Outcome::skipped(format!("no PSM pool for {}", p.ct)));
        };

        let lp = ensure_token(ctx, &p.liquidity_token, TokenRole::LiquidityProvider).await?;
        let amm = Pool {
            id: ids::amm_pool_id(&psm.id),
            pool_key: psm.pool_key.replacen(":PSM", ":AMM", 1),
            typ: PoolType::TermAmm,
            manager_addr: event.src_address.clone(),
            share_token_id: Some(lp.id),
            tvl_usd: Amount::default(),
            tvl_updated_at: None,
            ..psm
        };
        replace_pool(ctx, &amm)?;
        ensure_pool_asset(ctx, &amm.pool_key, &p.ra).await?;
        ensure_pool_asset(ctx, &amm.pool_key, &p.ct).await?;

        info!(chain_id, pool_id = %amm.id, "AMM pool spliced");
        Ok(Outcome::Applied)
    }
}

/// `AddedLiquidity`: RA and CT in.
pub struct AddedLiquidity;

#[async_trait]
impl EventHandler for AddedLiquidity {
    type Params = events::AddedLiquidity;
    type Loaded = Option<Pool>;

    async fn warm(&self, event: &Event<Self::Params>, ctx: &WarmContext) -> Result<Option<Pool>, IndexerError> {
        let p = &event.params;
        load_amm(ctx, &p.ct, &[p.ra.as_str(), p.ct.as_str()], &p.who).await
    }

    async fn apply(
        &self,
        event: &Event<Self::Params>,
        pool: Option<Pool>,
        ctx: &mut ApplyContext,
    ) -> Result<Outcome, IndexerError> {
        let p = &event.params;
        let Some(pool) = pool else {
            return Ok(no_amm_pool(event, &p.ct));
        };
        ensure_account(ctx, &p.who).await?;
        move_reserves(
            ctx,
            event,
            &pool,
            &[Move::Credit(&p.ra, &p.ra_amount), Move::Credit(&p.ct, &p.ct_amount)],
        )
        .await?;
        Ok(Outcome::Applied)
    }
}

/// `RemovedLiquidity`: RA and CT out.
pub struct RemovedLiquidity;

#[async_trait]
impl EventHandler for RemovedLiquidity {
    type Params = events::RemovedLiquidity;
    type Loaded = Option<Pool>;

    async fn warm(&self, event: &Event<Self::Params>, ctx: &WarmContext) -> Result<Option<Pool>, IndexerError> {
        let p = &event.params;
        load_amm(ctx, &p.ct, &[p.ra.as_str(), p.ct.as_str()], &p.who).await
    }

    async fn apply(
        &self,
        event: &Event<Self::Params>,
        pool: Option<Pool>,
        ctx: &mut ApplyContext,
    ) -> Result<Outcome, IndexerError> {
        let p = &event.params;
        let Some(pool) = pool else {
            return Ok(no_amm_pool(event, &p.ct));
        };
        ensure_account(ctx, &p.who).await?;
        move_reserves(
            ctx,
            event,
            &pool,
            &[Move::Debit(&p.ra, &p.ra_amount), Move::Debit(&p.ct, &p.ct_amount)],
        )
        .await?;
        Ok(Outcome::Applied)
    }
}

/// `Swapped`: input in, output out. Either side may be the cover token.
pub struct Swapped;

#[async_trait]
impl EventHandler for Swapped {
    type Params = events::Swapped;
    type Loaded = Option<Pool>;

    async fn warm(&self, event: &Event<Self::Params>, ctx: &WarmContext) -> Result<Option<Pool>, IndexerError> {
        let p = &event.params;
        let sides = [p.input.as_str(), p.output.as_str()];
        match load_amm(ctx, &p.input, &sides, &p.who).await? {
            Some(pool) => Ok(Some(pool)),
            None => load_amm(ctx, &p.output, &sides, &p.who).await,
        }
    }

    async fn apply(
        &self,
        event: &Event<Self::Params>,
        pool: Option<Pool>,
        ctx: &mut ApplyContext,
    ) -> Result<Outcome, IndexerError> {
        let p = &event.params;
        let Some(pool) = pool else {
            return Ok(no_amm_pool(event, &format!("{}/{}", p.input, p.output)));
        };
        ensure_account(ctx, &p.who).await?;
        move_reserves(
            ctx,
            event,
            &pool,
            &[Move::Credit(&p.input, &p.amount_in), Move::Debit(&p.output, &p.amount_out)],
        )
        .await?;
        Ok(Outcome::Applied)
    }
}
