//! Balance and reserve mutation rules.
//!
//! Every leg appends an immutable ledger line with the signed delta and then
//! upserts the running balance. Arithmetic is arbitrary precision and never
//! checked: a balance that goes negative is stored as-is and logged.

use bigdecimal::num_traits::{Signed, Zero};
use tracing::warn;

use crate::amount::Amount;
use crate::context::ApplyContext;
use crate::error::IndexerError;
use crate::factory::{ensure_account, ensure_account_token, ensure_pool_asset, ensure_token};
use crate::ids::{self, Leg};
use crate::model::{AccountTokenEntry, PoolAsset, PoolAssetEntry, TokenApproval, TokenRole, TokenTransfer};
use crate::types::{Event, ZERO_ADDRESS};

/// How a transfer was classified.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferKind {
    Mint,
    Burn,
    Transfer,
}

fn is_zero_address(addr: &str) -> bool {
    ids::normalize(addr) == ZERO_ADDRESS
}

/// ERC20 transfer rule for the token at `event.src_address`.
///
/// A zero-address sender mints (total supply up, no sender line), a
/// zero-address receiver burns (total supply down, no receiver line). One
/// [`TokenTransfer`] snapshot is written regardless.
pub async fn apply_transfer<P>(
    ctx: &mut ApplyContext,
    event: &Event<P>,
    role: TokenRole,
    from: &str,
    to: &str,
    value: &Amount,
) -> Result<TransferKind, IndexerError> {
    let chain_id = ctx.chain_id();
    let token_addr = event.src_address.as_str();
    let mut token = ensure_token(ctx, token_addr, role).await?;

    let minted = is_zero_address(from);
    let burned = is_zero_address(to);

    if minted {
        token.total_supply += value;
    } else {
        ensure_account(ctx, from).await?;
        move_balance(ctx, event, token_addr, from, Leg::Debit, value).await?;
    }

    if burned {
        token.total_supply -= value;
    } else {
        ensure_account(ctx, to).await?;
        move_balance(ctx, event, token_addr, to, Leg::Credit, value).await?;
    }

    if minted || burned {
        if token.total_supply.is_negative() {
            warn!(token = %token.id, supply = %token.total_supply, "negative total supply");
        }
        ctx.set(&token)?;
    }

    ctx.set(&TokenTransfer {
        id: event.event_id(),
        chain_id,
        token_id: token.id.clone(),
        from_id: ids::account(chain_id, from),
        to_id: ids::account(chain_id, to),
        amount: value.clone(),
        block_number: event.block.number,
        timestamp: event.block.timestamp,
    })?;

    Ok(match (minted, burned) {
        (true, _) => TransferKind::Mint,
        (false, true) => TransferKind::Burn,
        (false, false) => TransferKind::Transfer,
    })
}

async fn move_balance<P>(
    ctx: &mut ApplyContext,
    event: &Event<P>,
    token_addr: &str,
    account_addr: &str,
    leg: Leg,
    value: &Amount,
) -> Result<(), IndexerError> {
    let chain_id = ctx.chain_id();
    let delta = match leg {
        Leg::Debit => -value.clone(),
        Leg::Credit => value.clone(),
    };

    let mut holding = ensure_account_token(ctx, token_addr, account_addr).await?;
    holding.balance += &delta;
    if holding.balance.is_negative() {
        warn!(
            chain_id,
            block = event.block.number,
            log_index = event.log_index,
            holding = %holding.id,
            balance = %holding.balance,
            "negative balance"
        );
    }
    ctx.set(&holding)?;

    ctx.set(&AccountTokenEntry {
        id: ids::account_token_entry(chain_id, event.block.number, event.log_index, account_addr, leg),
        chain_id,
        account_id: holding.account_id.clone(),
        token_id: holding.token_id.clone(),
        transfer_id: event.event_id(),
        amount: delta,
        block_number: event.block.number,
        timestamp: event.block.timestamp,
    })
}

/// Add `amount` to a pool reserve.
pub async fn credit_reserve<P>(
    ctx: &mut ApplyContext,
    event: &Event<P>,
    pool_key: &str,
    token_addr: &str,
    amount: &Amount,
) -> Result<PoolAsset, IndexerError> {
    move_reserve(ctx, event, pool_key, token_addr, amount.clone()).await
}

/// Subtract `amount` from a pool reserve.
pub async fn debit_reserve<P>(
    ctx: &mut ApplyContext,
    event: &Event<P>,
    pool_key: &str,
    token_addr: &str,
    amount: &Amount,
) -> Result<PoolAsset, IndexerError> {
    move_reserve(ctx, event, pool_key, token_addr, -amount.clone()).await
}

/// Zero deltas touch nothing and write no ledger line.
async fn move_reserve<P>(
    ctx: &mut ApplyContext,
    event: &Event<P>,
    pool_key: &str,
    token_addr: &str,
    delta: Amount,
) -> Result<PoolAsset, IndexerError> {
    let chain_id = ctx.chain_id();
    let mut slot = ensure_pool_asset(ctx, pool_key, token_addr).await?;
    if delta.is_zero() {
        return Ok(slot);
    }

    slot.balance += &delta;
    if slot.balance.is_negative() {
        warn!(
            chain_id,
            block = event.block.number,
            log_index = event.log_index,
            pool_asset = %slot.id,
            balance = %slot.balance,
            "negative reserve"
        );
    }
    ctx.set(&slot)?;

    ctx.set(&PoolAssetEntry {
        id: ids::pool_asset_entry(chain_id, event.block.number, event.log_index, pool_key, token_addr),
        chain_id,
        pool_id: slot.pool_id.clone(),
        pool_asset_id: slot.id.clone(),
        token_id: slot.token_id.clone(),
        amount: delta,
        block_number: event.block.number,
        timestamp: event.block.timestamp,
    })?;
    Ok(slot)
}

/// ERC20 `Approval`: ensures the token and both parties, then snapshots the
/// allowance under the event id.
pub async fn record_approval<P>(
    ctx: &mut ApplyContext,
    event: &Event<P>,
    role: TokenRole,
    owner: &str,
    spender: &str,
    value: &Amount,
) -> Result<(), IndexerError> {
    let chain_id = ctx.chain_id();
    let token = ensure_token(ctx, &event.src_address, role).await?;
    let owner_account = ensure_account(ctx, owner).await?;
    let spender_account = ensure_account(ctx, spender).await?;

    ctx.set(&TokenApproval {
        id: event.event_id(),
        chain_id,
        token_id: token.id,
        owner_id: owner_account.id,
        spender_id: spender_account.id,
        amount: value.clone(),
        block_number: event.block.number,
        timestamp: event.block.timestamp,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ChainSettings;
    use crate::context::WarmCache;
    use crate::model::{AccountToken, Token};
    use crate::store::{Db, MemoryStore};
    use crate::types::{Block, ContractKind};
    use std::sync::Arc;

    fn ctx() -> ApplyContext {
        ApplyContext::new(
            Db::new(Arc::new(MemoryStore::new())),
            Arc::new(ChainSettings::new(1)),
            WarmCache::default(),
        )
    }

    fn event(log_index: u32) -> Event<()> {
        Event {
            chain_id: 1,
            block: Block { number: 7, timestamp: 1_000 },
            log_index,
            src_address: "0xtoken".into(),
            contract: ContractKind::PrincipalToken,
            name: "Transfer".into(),
            params: (),
        }
    }

    async fn balance(ctx: &mut ApplyContext, account: &str) -> Amount {
        ctx.get::<AccountToken>(&ids::account_token(1, "0xtoken", account))
            .await
            .unwrap()
            .map(|h| h.balance)
            .unwrap_or_default()
    }

    #[tokio::test]
    async fn mint_transfer_burn() {
        let mut ctx = ctx();
        let kind = apply_transfer(&mut ctx, &event(0), TokenRole::Principal, ZERO_ADDRESS, "0xa", &Amount::from(100))
            .await
            .unwrap();
        assert_eq!(kind, TransferKind::Mint);
        apply_transfer(&mut ctx, &event(1), TokenRole::Principal, "0xa", "0xb", &Amount::from(30))
            .await
            .unwrap();
        let kind = apply_transfer(&mut ctx, &event(2), TokenRole::Principal, "0xb", ZERO_ADDRESS, &Amount::from(10))
            .await
            .unwrap();
        assert_eq!(kind, TransferKind::Burn);

        assert_eq!(balance(&mut ctx, "0xa").await, Amount::from(70));
        assert_eq!(balance(&mut ctx, "0xb").await, Amount::from(20));
        let token: Token = ctx.get("1:0xtoken").await.unwrap().unwrap();
        assert_eq!(token.total_supply, Amount::from(90));

        // mint writes no sender line, burn no receiver line
        let lines = ctx.pending().of_kind(crate::model::EntityKind::AccountTokenEntry).count();
        assert_eq!(lines, 4);
        let snapshots = ctx.pending().of_kind(crate::model::EntityKind::TokenTransfer).count();
        assert_eq!(snapshots, 3);
    }

    #[tokio::test]
    async fn self_transfer_nets_to_zero_with_two_lines() {
        let mut ctx = ctx();
        apply_transfer(&mut ctx, &event(0), TokenRole::Erc20, "0xa", "0xa", &Amount::from(5))
            .await
            .unwrap();
        assert_eq!(balance(&mut ctx, "0xa").await, Amount::from(0));
        let lines = ctx.pending().of_kind(crate::model::EntityKind::AccountTokenEntry).count();
        assert_eq!(lines, 2);
    }

    #[tokio::test]
    async fn overdraft_is_stored_negative() {
        let mut ctx = ctx();
        apply_transfer(&mut ctx, &event(0), TokenRole::Erc20, "0xa", "0xb", &Amount::from(5))
            .await
            .unwrap();
        assert_eq!(balance(&mut ctx, "0xa").await, Amount::from(-5));
    }

    #[tokio::test]
    async fn reserve_moves_write_signed_lines() {
        let mut ctx = ctx();
        let ev = event(3);
        credit_reserve(&mut ctx, &ev, "0xm", "0xca", &Amount::from(1000)).await.unwrap();
        let slot = debit_reserve(&mut ctx, &ev, "0xm", "0xref", &Amount::from(40)).await.unwrap();
        assert_eq!(slot.balance, Amount::from(-40));

        let entries: Vec<PoolAssetEntry> = ctx.find("pool_id", "1:0xm").await.unwrap();
        assert_eq!(entries.len(), 2);
        let amounts: Vec<Amount> = entries.into_iter().map(|e| e.amount).collect();
        assert!(amounts.contains(&Amount::from(1000)));
        assert!(amounts.contains(&Amount::from(-40)));
    }

    #[tokio::test]
    async fn zero_reserve_delta_writes_nothing() {
        let mut ctx = ctx();
        credit_reserve(&mut ctx, &event(0), "0xm", "0xca", &Amount::from(0)).await.unwrap();
        let entries = ctx.pending().of_kind(crate::model::EntityKind::PoolAssetEntry).count();
        assert_eq!(entries, 0);
    }

    #[tokio::test]
    async fn approval_snapshot_keyed_by_event() {
        let mut ctx = ctx();
        record_approval(&mut ctx, &event(9), TokenRole::VaultShare, "0xo", "0xs", &Amount::from(1))
            .await
            .unwrap();
        let approval: TokenApproval = ctx.get("1:7:9").await.unwrap().unwrap();
        assert_eq!(approval.owner_id, "1:0xo");
        let token: Token = ctx.get("1:0xtoken").await.unwrap().unwrap();
        assert_eq!(token.role, TokenRole::VaultShare);
    }
}
