//! Typed parameter records of every event the protocol handlers decode.
//!
//! Field names follow the contract ABIs (camelCase on the wire). Integer
//! fields accept JSON numbers, decimal strings or `0x` hex.

use serde::Deserialize;

use corkindex_core::amount::{decimal, Amount};

// ─── CorkConfig ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CorkPoolSet {
    pub cork_pool: String,
}

// ─── CorkPool ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketCreated {
    /// Market id (`bytes32`).
    pub id: String,
    pub reference_asset: String,
    pub collateral_asset: String,
    #[serde(with = "decimal")]
    pub expiry: Amount,
    pub exchange_rate_provider: String,
    pub principal_token: String,
    pub swap_token: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolDeposit {
    pub market_id: String,
    pub sender: String,
    pub owner: String,
    #[serde(with = "decimal")]
    pub assets: Amount,
    #[serde(with = "decimal")]
    pub shares: Amount,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WithdrawExtended {
    pub market_id: String,
    pub sender: String,
    pub owner: String,
    /// Collateral paid out.
    #[serde(with = "decimal")]
    pub assets0: Amount,
    /// Reference asset paid out.
    #[serde(with = "decimal")]
    pub assets1: Amount,
    #[serde(with = "decimal")]
    pub shares0: Amount,
    #[serde(with = "decimal")]
    pub shares1: Amount,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Swap {
    pub id: String,
    pub swaper: String,
    #[serde(with = "decimal")]
    pub pa_used: Amount,
    #[serde(with = "decimal")]
    pub swap_token_used: Amount,
    #[serde(with = "decimal")]
    pub ra_received: Amount,
    #[serde(with = "decimal", default)]
    pub ds_exchange_rate: Amount,
    #[serde(with = "decimal", default)]
    pub fee_percentage: Amount,
    #[serde(with = "decimal", default)]
    pub fee: Amount,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnwindSwap {
    pub id: String,
    pub buyer: String,
    #[serde(with = "decimal")]
    pub ra_used: Amount,
    #[serde(with = "decimal")]
    pub received_reference_asset: Amount,
    #[serde(with = "decimal")]
    pub received_swap_token: Amount,
    #[serde(with = "decimal", default)]
    pub fee_percentage: Amount,
    #[serde(with = "decimal", default)]
    pub fee: Amount,
    #[serde(with = "decimal", default)]
    pub exchange_rates: Amount,
}

// ─── ERC20 families ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct Transfer {
    pub from: String,
    pub to: String,
    #[serde(with = "decimal")]
    pub value: Amount,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Approval {
    pub owner: String,
    pub spender: String,
    #[serde(with = "decimal")]
    pub value: Amount,
}

// ─── ModuleCore (PSM) ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializedModuleCore {
    pub id: String,
    pub pa: String,
    pub ra: String,
    pub lv: String,
    /// Term length of the market's issuances.
    #[serde(with = "decimal")]
    pub expiry: Amount,
    #[serde(with = "decimal")]
    pub initial_arp: Amount,
    pub exchange_rate_provider: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Issued {
    pub id: String,
    #[serde(with = "decimal")]
    pub ds_id: Amount,
    #[serde(with = "decimal")]
    pub expiry: Amount,
    pub ds: String,
    pub ct: String,
    #[serde(default)]
    pub ra_ct_uni_pair_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PsmDeposited {
    pub id: String,
    #[serde(with = "decimal")]
    pub ds_id: Amount,
    pub depositor: String,
    #[serde(with = "decimal")]
    pub amount: Amount,
    #[serde(with = "decimal", default)]
    pub received: Amount,
    #[serde(with = "decimal", default)]
    pub exchange_rate: Amount,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cancelled {
    pub id: String,
    #[serde(with = "decimal")]
    pub ds_id: Amount,
    pub redeemer: String,
    #[serde(with = "decimal")]
    pub ra_amount: Amount,
    #[serde(with = "decimal", default)]
    pub swap_amount: Amount,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CtRedeemed {
    pub id: String,
    #[serde(with = "decimal")]
    pub ds_id: Amount,
    pub redeemer: String,
    #[serde(with = "decimal", default)]
    pub amount: Amount,
    #[serde(with = "decimal")]
    pub pa_received: Amount,
    #[serde(with = "decimal")]
    pub ra_received: Amount,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DsRedeemed {
    pub id: String,
    #[serde(with = "decimal")]
    pub ds_id: Amount,
    pub redeemer: String,
    #[serde(with = "decimal")]
    pub pa_used: Amount,
    #[serde(with = "decimal", default)]
    pub ds_used: Amount,
    #[serde(with = "decimal")]
    pub ra_received: Amount,
    #[serde(with = "decimal", default)]
    pub ds_exchange_rate: Amount,
    #[serde(with = "decimal", default)]
    pub fee_percentage: Amount,
    #[serde(with = "decimal")]
    pub fee: Amount,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Repurchased {
    pub id: String,
    pub buyer: String,
    #[serde(with = "decimal")]
    pub ds_id: Amount,
    #[serde(with = "decimal")]
    pub ra_used: Amount,
    #[serde(with = "decimal")]
    pub received_pa: Amount,
    #[serde(with = "decimal", default)]
    pub received_ds: Amount,
    #[serde(with = "decimal", default)]
    pub fee_percentage: Amount,
    #[serde(with = "decimal")]
    pub fee: Amount,
    #[serde(with = "decimal", default)]
    pub exchange_rates: Amount,
}

// ─── CorkHook ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HookInitialized {
    pub ra: String,
    pub ct: String,
    pub liquidity_token: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddedLiquidity {
    pub ra: String,
    pub ct: String,
    #[serde(with = "decimal")]
    pub ra_amount: Amount,
    #[serde(with = "decimal")]
    pub ct_amount: Amount,
    #[serde(with = "decimal", default)]
    pub minted_lp: Amount,
    pub who: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemovedLiquidity {
    pub ra: String,
    pub ct: String,
    #[serde(with = "decimal")]
    pub ra_amount: Amount,
    #[serde(with = "decimal")]
    pub ct_amount: Amount,
    pub who: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Swapped {
    pub input: String,
    pub output: String,
    #[serde(with = "decimal")]
    pub amount_in: Amount,
    #[serde(with = "decimal")]
    pub amount_out: Amount,
    pub who: String,
    #[serde(with = "decimal", default)]
    pub base_fee_percentage: Amount,
    #[serde(with = "decimal", default)]
    pub realized_fee_percentage: Amount,
    #[serde(with = "decimal", default)]
    pub realized_fee_amount: Amount,
}

// ─── Price feeds ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerUpdated {
    /// Latest answer, signed.
    #[serde(with = "decimal")]
    pub current: Amount,
    #[serde(with = "decimal", default)]
    pub round_id: Amount,
    #[serde(with = "decimal", default)]
    pub updated_at: Amount,
}
