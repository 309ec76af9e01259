//! ModuleCore (peg-stability module): isolated markets, their terms, and the
//! term pools' RA/PA reserves.

use async_trait::async_trait;
use tracing::{error, info};

use corkindex_core::amount::Amount;
use corkindex_core::context::{ApplyContext, WarmContext};
use corkindex_core::error::IndexerError;
use corkindex_core::factory::{ensure_pool_asset, ensure_token, replace_pool};
use corkindex_core::handler::{EventHandler, Outcome};
use corkindex_core::ids;
use corkindex_core::model::{CoverTerm, IsolatedMarket, Pool, PoolType, TokenRole};
use corkindex_core::registration::Registrations;
use corkindex_core::types::{ContractKind, Event};

use super::{move_reserves, to_expiry, warm_reserves, Move};
use crate::events;

type Term = (Option<IsolatedMarket>, Option<Pool>);

/// The market and term pool of a PSM event, with the pool's RA/PA reserves
/// prefetched.
async fn load_term(ctx: &WarmContext, market_key: &str, ds_id: &Amount) -> Result<Term, IndexerError> {
    let chain = ctx.chain_id();
    let market_id = ids::isolated_market(chain, market_key);
    let pool_id = ids::pool(chain, &ids::psm_pool_key(market_key, &ds_id.to_string()));
    let (market, pool) =
        futures::try_join!(ctx.get::<IsolatedMarket>(&market_id), ctx.get::<Pool>(&pool_id))?;
    if let (Some(market), Some(pool)) = (&market, &pool) {
        let reserves = [market.ra_token_addr.as_str(), market.pa_token_addr.as_str()];
        warm_reserves(ctx, pool, &reserves, &[]).await?;
    }
    Ok((market, pool))
}

fn not_found<P>(event: &Event<P>, market_key: &str, what: &str) -> Outcome {
    error!(
        chain_id = event.chain_id,
        block = event.block.number,
        log_index = event.log_index,
        market_key,
        event = %event.name,
        "{what} not found"
    );
    Outcome::skipped(format!("{what} not found for {market_key}"))
}

fn resolve_term<P>(event: &Event<P>, market_key: &str, loaded: Term) -> Result<(IsolatedMarket, Pool), Outcome> {
    match loaded {
        (Some(market), Some(pool)) => Ok((market, pool)),
        (None, _) => Err(not_found(event, market_key, "isolated market")),
        (Some(_), None) => Err(not_found(event, market_key, "term pool")),
    }
}

// ─── Market & term lifecycle ──────────────────────────────────────────────────

/// `InitializedModuleCore`: a new isolated market with its liquidity vault.
pub struct InitializedModuleCore;

#[async_trait]
impl EventHandler for InitializedModuleCore {
    type Params = events::InitializedModuleCore;
    type Loaded = ();

    fn register(&self, event: &Event<Self::Params>, out: &mut Registrations) {
        out.add(ContractKind::VaultToken, &event.params.lv);
    }

    async fn apply(
        &self,
        event: &Event<Self::Params>,
        _loaded: (),
        ctx: &mut ApplyContext,
    ) -> Result<Outcome, IndexerError> {
        let chain_id = ctx.chain_id();
        let p = &event.params;

        ensure_token(ctx, &p.pa, TokenRole::Erc20).await?;
        ensure_token(ctx, &p.ra, TokenRole::Erc20).await?;
        ensure_token(ctx, &p.lv, TokenRole::VaultShare).await?;

        let market = IsolatedMarket {
            id: ids::isolated_market(chain_id, &p.id),
            chain_id,
            market_key: ids::normalize(&p.id),
            pa_token_addr: ids::normalize(&p.pa),
            ra_token_addr: ids::normalize(&p.ra),
            vault_token_addr: ids::normalize(&p.lv),
            initial_arp: p.initial_arp.clone(),
            expiry_interval: p.expiry.clone(),
            exchange_rate_provider: ids::normalize(&p.exchange_rate_provider),
            manager_addr: event.src_address.clone(),
            block_number: event.block.number,
        };
        ctx.set(&market)?;

        let pool_key = ids::vault_pool_key(&p.id);
        replace_pool(
            ctx,
            &Pool {
                id: ids::pool(chain_id, &pool_key),
                chain_id,
                pool_key,
                typ: PoolType::Vault,
                principal_token_addr: None,
                swap_token_addr: None,
                collateral_asset_addr: Some(market.ra_token_addr.clone()),
                reference_asset_addr: Some(market.pa_token_addr.clone()),
                exchange_rate_provider_addr: Some(market.exchange_rate_provider.clone()),
                manager_addr: event.src_address.clone(),
                share_token_id: Some(ids::token(chain_id, &p.lv)),
                market_id: Some(market.id.clone()),
                expiry: None,
                start_block: event.block.number,
                tvl_usd: Amount::default(),
                tvl_updated_at: None,
            },
        )?;

        info!(chain_id, market_id = %market.id, "isolated market initialized");
        Ok(Outcome::Applied)
    }
}

/// `Issued`: a new term of a market, with its PSM pool.
pub struct Issued;

#[async_trait]
impl EventHandler for Issued {
    type Params = events::Issued;
    type Loaded = Option<IsolatedMarket>;

    fn register(&self, event: &Event<Self::Params>, out: &mut Registrations) {
        out.add(ContractKind::SwapToken, &event.params.ds);
        out.add(ContractKind::CoverToken, &event.params.ct);
    }

    async fn warm(
        &self,
        event: &Event<Self::Params>,
        ctx: &WarmContext,
    ) -> Result<Option<IsolatedMarket>, IndexerError> {
        ctx.get(&ids::isolated_market(ctx.chain_id(), &event.params.id)).await
    }

    async fn apply(
        &self,
        event: &Event<Self::Params>,
        market: Option<IsolatedMarket>,
        ctx: &mut ApplyContext,
    ) -> Result<Outcome, IndexerError> {
        let chain_id = ctx.chain_id();
        let p = &event.params;
        let Some(market) = market else {
            return Ok(not_found(event, &p.id, "isolated market"));
        };

        let term_key = p.ds_id.to_string();
        let expiry = to_expiry(&p.expiry);
        ctx.set(&CoverTerm {
            id: ids::cover_term(chain_id, &p.id, &term_key),
            chain_id,
            market_id: market.id.clone(),
            term_key: term_key.clone(),
            expiry,
            ds_token_addr: ids::normalize(&p.ds),
            ct_token_addr: ids::normalize(&p.ct),
            block_number: event.block.number,
        })?;
        ensure_token(ctx, &p.ds, TokenRole::Swap).await?;
        ensure_token(ctx, &p.ct, TokenRole::CoverTerm).await?;

        let pool_key = ids::psm_pool_key(&p.id, &term_key);
        let pool = Pool {
            id: ids::pool(chain_id, &pool_key),
            chain_id,
            pool_key: pool_key.clone(),
            typ: PoolType::TermPsm,
            principal_token_addr: None,
            swap_token_addr: Some(ids::normalize(&p.ds)),
            collateral_asset_addr: Some(market.ra_token_addr.clone()),
            reference_asset_addr: Some(market.pa_token_addr.clone()),
            exchange_rate_provider_addr: Some(market.exchange_rate_provider.clone()),
            manager_addr: event.src_address.clone(),
            share_token_id: Some(ids::token(chain_id, &p.ct)),
            market_id: Some(market.id.clone()),
            expiry,
            start_block: event.block.number,
            tvl_usd: Amount::default(),
            tvl_updated_at: None,
        };
        replace_pool(ctx, &pool)?;
        ensure_pool_asset(ctx, &pool_key, &market.ra_token_addr).await?;
        ensure_pool_asset(ctx, &pool_key, &market.pa_token_addr).await?;

        info!(chain_id, pool_id = %pool.id, term_key = %term_key, "term issued");
        Ok(Outcome::Applied)
    }
}

// ─── Reserve flows ────────────────────────────────────────────────────────────

/// `PsmDeposited`: RA in.
pub struct PsmDeposited;

#[async_trait]
impl EventHandler for PsmDeposited {
    type Params = events::PsmDeposited;
    type Loaded = Term;

    async fn warm(&self, event: &Event<Self::Params>, ctx: &WarmContext) -> Result<Term, IndexerError> {
        load_term(ctx, &event.params.id, &event.params.ds_id).await
    }

    async fn apply(&self, event: &Event<Self::Params>, loaded: Term, ctx: &mut ApplyContext) -> Result<Outcome, IndexerError> {
        let p = &event.params;
        let (market, pool) = match resolve_term(event, &p.id, loaded) {
            Ok(term) => term,
            Err(skipped) => return Ok(skipped),
        };
        move_reserves(ctx, event, &pool, &[Move::Credit(&market.ra_token_addr, &p.amount)]).await?;
        Ok(Outcome::Applied)
    }
}

/// `Cancelled`: RA out.
pub struct Cancelled;

#[async_trait]
impl EventHandler for Cancelled {
    type Params = events::Cancelled;
    type Loaded = Term;

    async fn warm(&self, event: &Event<Self::Params>, ctx: &WarmContext) -> Result<Term, IndexerError> {
        load_term(ctx, &event.params.id, &event.params.ds_id).await
    }

    async fn apply(&self, event: &Event<Self::Params>, loaded: Term, ctx: &mut ApplyContext) -> Result<Outcome, IndexerError> {
        let p = &event.params;
        let (market, pool) = match resolve_term(event, &p.id, loaded) {
            Ok(term) => term,
            Err(skipped) => return Ok(skipped),
        };
        move_reserves(ctx, event, &pool, &[Move::Debit(&market.ra_token_addr, &p.ra_amount)]).await?;
        Ok(Outcome::Applied)
    }
}

/// `CtRedeemed`: PA and RA out.
pub struct CtRedeemed;

#[async_trait]
impl EventHandler for CtRedeemed {
    type Params = events::CtRedeemed;
    type Loaded = Term;

    async fn warm(&self, event: &Event<Self::Params>, ctx: &WarmContext) -> Result<Term, IndexerError> {
        load_term(ctx, &event.params.id, &event.params.ds_id).await
    }

    async fn apply(&self, event: &Event<Self::Params>, loaded: Term, ctx: &mut ApplyContext) -> Result<Outcome, IndexerError> {
        let p = &event.params;
        let (market, pool) = match resolve_term(event, &p.id, loaded) {
            Ok(term) => term,
            Err(skipped) => return Ok(skipped),
        };
        move_reserves(
            ctx,
            event,
            &pool,
            &[
                Move::Debit(&market.pa_token_addr, &p.pa_received),
                Move::Debit(&market.ra_token_addr, &p.ra_received),
            ],
        )
        .await?;
        Ok(Outcome::Applied)
    }
}

/// `DsRedeemed`: PA in; RA out including the fee.
pub struct DsRedeemed;

#[async_trait]
impl EventHandler for DsRedeemed {
    type Params = events::DsRedeemed;
    type Loaded = Term;

    async fn warm(&self, event: &Event<Self::Params>, ctx: &WarmContext) -> Result<Term, IndexerError> {
        load_term(ctx, &event.params.id, &event.params.ds_id).await
    }

    async fn apply(&self, event: &Event<Self::Params>, loaded: Term, ctx: &mut ApplyContext) -> Result<Outcome, IndexerError> {
        let p = &event.params;
        let (market, pool) = match resolve_term(event, &p.id, loaded) {
            Ok(term) => term,
            Err(skipped) => return Ok(skipped),
        };
        let ra_out = &p.ra_received + &p.fee;
        move_reserves(
            ctx,
            event,
            &pool,
            &[
                Move::Credit(&market.pa_token_addr, &p.pa_used),
                Move::Debit(&market.ra_token_addr, &ra_out),
            ],
        )
        .await?;
        Ok(Outcome::Applied)
    }
}

/// `Repurchased`: PA out; RA in net of the fee.
pub struct Repurchased;

#[async_trait]
impl EventHandler for Repurchased {
    type Params = events::Repurchased;
    type Loaded = Term;

    async fn warm(&self, event: &Event<Self::Params>, ctx: &WarmContext) -> Result<Term, IndexerError> {
        load_term(ctx, &event.params.id, &event.params.ds_id).await
    }

    async fn apply(&self, event: &Event<Self::Params>, loaded: Term, ctx: &mut ApplyContext) -> Result<Outcome, IndexerError> {
        let p = &event.params;
        let (market, pool) = match resolve_term(event, &p.id, loaded) {
            Ok(term) => term,
            Err(skipped) => return Ok(skipped),
        };
        let ra_in = &p.ra_used - &p.fee;
        move_reserves(
            ctx,
            event,
            &pool,
            &[
                Move::Debit(&market.pa_token_addr, &p.received_pa),
                Move::Credit(&market.ra_token_addr, &ra_in),
            ],
        )
        .await?;
        Ok(Outcome::Applied)
    }
}
