//! Derived entities materialized from the event stream.
//!
//! Every entity carries a chain-scoped string id built by [`crate::ids`] and is
//! stored as a JSON document; field names are the document keys that
//! [`crate::store::EntityStore::find`] filters on.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::amount::{decimal, Amount};
use crate::types::{ChainId, ContractKind};

// ─── EntityKind ───────────────────────────────────────────────────────────────

/// One collection per entity type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EntityKind {
    Account,
    Token,
    AccountToken,
    AccountTokenEntry,
    TokenTransfer,
    TokenApproval,
    Pool,
    PoolAsset,
    PoolAssetEntry,
    AssetPrice,
    TokenPoolsIndex,
    IsolatedMarket,
    CoverTerm,
    EventRecord,
}

impl EntityKind {
    pub const ALL: [EntityKind; 14] = [
        Self::Account,
        Self::Token,
        Self::AccountToken,
        Self::AccountTokenEntry,
        Self::TokenTransfer,
        Self::TokenApproval,
        Self::Pool,
        Self::PoolAsset,
        Self::PoolAssetEntry,
        Self::AssetPrice,
        Self::TokenPoolsIndex,
        Self::IsolatedMarket,
        Self::CoverTerm,
        Self::EventRecord,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Account => "Account",
            Self::Token => "Token",
            Self::AccountToken => "AccountToken",
            Self::AccountTokenEntry => "AccountTokenEntry",
            Self::TokenTransfer => "TokenTransfer",
            Self::TokenApproval => "TokenApproval",
            Self::Pool => "Pool",
            Self::PoolAsset => "PoolAsset",
            Self::PoolAssetEntry => "PoolAssetEntry",
            Self::AssetPrice => "AssetPrice",
            Self::TokenPoolsIndex => "TokenPoolsIndex",
            Self::IsolatedMarket => "IsolatedMarket",
            Self::CoverTerm => "CoverTerm",
            Self::EventRecord => "EventRecord",
        }
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for EntityKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|k| k.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown entity kind '{s}'"))
    }
}

/// A typed entity stored under [`Entity::KIND`].
pub trait Entity: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    const KIND: EntityKind;

    fn id(&self) -> &str;
}

macro_rules! entity {
    ($ty:ident) => {
        impl Entity for $ty {
            const KIND: EntityKind = EntityKind::$ty;

            fn id(&self) -> &str {
                &self.id
            }
        }
    };
}

// ─── Tags ─────────────────────────────────────────────────────────────────────

/// Role a token plays in the protocol. Assigned by the first creator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TokenRole {
    /// Generic fungible token.
    #[serde(rename = "ERC20")]
    Erc20,
    #[serde(rename = "CPT")]
    Principal,
    /// Swap token of a CorkPool market, also the depeg-swap token of a PSM term.
    #[serde(rename = "CST")]
    Swap,
    #[serde(rename = "CA")]
    Collateral,
    #[serde(rename = "REF")]
    Reference,
    #[serde(rename = "CT")]
    CoverTerm,
    #[serde(rename = "LPT")]
    LiquidityProvider,
    #[serde(rename = "LVT")]
    VaultShare,
}

impl TokenRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Erc20 => "ERC20",
            Self::Principal => "CPT",
            Self::Swap => "CST",
            Self::Collateral => "CA",
            Self::Reference => "REF",
            Self::CoverTerm => "CT",
            Self::LiquidityProvider => "LPT",
            Self::VaultShare => "LVT",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PoolType {
    #[serde(rename = "CORK_POOL")]
    CorkPool,
    #[serde(rename = "TERM_PSM")]
    TermPsm,
    #[serde(rename = "TERM_AMM")]
    TermAmm,
    #[serde(rename = "LV")]
    Vault,
}

// ─── Accounts & tokens ────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub id: String,
    pub chain_id: ChainId,
    pub address: String,
}
entity!(Account);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Token {
    pub id: String,
    pub chain_id: ChainId,
    pub address: String,
    pub role: TokenRole,
    pub decimals: u8,
    /// Mutated only by mint and burn transfers.
    #[serde(with = "decimal")]
    pub total_supply: Amount,
}
entity!(Token);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountToken {
    pub id: String,
    pub chain_id: ChainId,
    pub account_id: String,
    pub token_id: String,
    #[serde(with = "decimal")]
    pub balance: Amount,
}
entity!(AccountToken);

/// Immutable signed delta on an account balance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountTokenEntry {
    pub id: String,
    pub chain_id: ChainId,
    pub account_id: String,
    pub token_id: String,
    pub transfer_id: String,
    #[serde(with = "decimal")]
    pub amount: Amount,
    pub block_number: u64,
    pub timestamp: i64,
}
entity!(AccountTokenEntry);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenTransfer {
    pub id: String,
    pub chain_id: ChainId,
    pub token_id: String,
    pub from_id: String,
    pub to_id: String,
    #[serde(with = "decimal")]
    pub amount: Amount,
    pub block_number: u64,
    pub timestamp: i64,
}
entity!(TokenTransfer);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenApproval {
    pub id: String,
    pub chain_id: ChainId,
    pub token_id: String,
    pub owner_id: String,
    pub spender_id: String,
    #[serde(with = "decimal")]
    pub amount: Amount,
    pub block_number: u64,
    pub timestamp: i64,
}
entity!(TokenApproval);

// ─── Pools ────────────────────────────────────────────────────────────────────

/// A market instance. Constituent addresses are fixed at creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pool {
    pub id: String,
    pub chain_id: ChainId,
    pub pool_key: String,
    pub typ: PoolType,
    pub principal_token_addr: Option<String>,
    pub swap_token_addr: Option<String>,
    pub collateral_asset_addr: Option<String>,
    pub reference_asset_addr: Option<String>,
    pub exchange_rate_provider_addr: Option<String>,
    pub manager_addr: String,
    /// Token id of the receipt/share token, if the pool issues one.
    pub share_token_id: Option<String>,
    /// IsolatedMarket id for PSM-family pools.
    pub market_id: Option<String>,
    pub expiry: Option<u64>,
    pub start_block: u64,
    /// Sum of the pool's reserve valuations (WAD USD).
    #[serde(with = "decimal")]
    pub tvl_usd: Amount,
    pub tvl_updated_at: Option<i64>,
}
entity!(Pool);

impl Pool {
    /// Collateral and reference addresses, in that order, when present.
    pub fn reserve_addrs(&self) -> impl Iterator<Item = &str> {
        [&self.collateral_asset_addr, &self.reference_asset_addr]
            .into_iter()
            .filter_map(|a| a.as_deref())
    }
}

/// A (pool, token) reserve slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoolAsset {
    pub id: String,
    pub chain_id: ChainId,
    pub pool_id: String,
    pub token_id: String,
    pub token_address: String,
    #[serde(with = "decimal")]
    pub balance: Amount,
    /// Cached valuation (WAD USD), stale until the next trigger.
    #[serde(with = "decimal")]
    pub tvl_usd: Amount,
    pub tvl_updated_at: Option<i64>,
}
entity!(PoolAsset);

/// Immutable signed delta on a pool reserve.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoolAssetEntry {
    pub id: String,
    pub chain_id: ChainId,
    pub pool_id: String,
    pub pool_asset_id: String,
    pub token_id: String,
    #[serde(with = "decimal")]
    pub amount: Amount,
    pub block_number: u64,
    pub timestamp: i64,
}
entity!(PoolAssetEntry);

/// Reverse index: token id -> pools holding it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenPoolsIndex {
    pub id: String,
    pub chain_id: ChainId,
    pub pool_ids: Vec<String>,
}
entity!(TokenPoolsIndex);

// ─── Prices ───────────────────────────────────────────────────────────────────

/// Directed price-graph edge. Exactly one of `to_token_id` and `to_currency`
/// is set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetPrice {
    pub id: String,
    pub chain_id: ChainId,
    pub from_token_id: String,
    pub to_token_id: Option<String>,
    pub to_currency: Option<String>,
    #[serde(with = "decimal")]
    pub last_answer: Amount,
    pub decimals: u8,
    pub updated_at: i64,
    pub block_number: u64,
}
entity!(AssetPrice);

// ─── PSM metadata ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IsolatedMarket {
    pub id: String,
    pub chain_id: ChainId,
    pub market_key: String,
    pub pa_token_addr: String,
    pub ra_token_addr: String,
    pub vault_token_addr: String,
    #[serde(with = "decimal")]
    pub initial_arp: Amount,
    #[serde(with = "decimal")]
    pub expiry_interval: Amount,
    pub exchange_rate_provider: String,
    pub manager_addr: String,
    pub block_number: u64,
}
entity!(IsolatedMarket);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoverTerm {
    pub id: String,
    pub chain_id: ChainId,
    /// Parent IsolatedMarket id.
    pub market_id: String,
    pub term_key: String,
    pub expiry: Option<u64>,
    pub ds_token_addr: String,
    pub ct_token_addr: String,
    pub block_number: u64,
}
entity!(CoverTerm);

// ─── Audit ────────────────────────────────────────────────────────────────────

/// Raw decoded parameters of one applied event, keyed by `chain:block:log`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    pub id: String,
    pub chain_id: ChainId,
    pub contract: ContractKind,
    pub event: String,
    pub src_address: String,
    pub block_number: u64,
    pub timestamp: i64,
    pub log_index: u32,
    pub params: serde_json::Value,
}
entity!(EventRecord);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_document_shape() {
        let token = Token {
            id: "1:0xa".into(),
            chain_id: 1,
            address: "0xa".into(),
            role: TokenRole::Collateral,
            decimals: 18,
            total_supply: Amount::from(1000),
        };
        let doc = serde_json::to_value(&token).unwrap();
        assert_eq!(doc["role"], "CA");
        assert_eq!(doc["total_supply"], "1000");
        let back: Token = serde_json::from_value(doc).unwrap();
        assert_eq!(back, token);
    }

    #[test]
    fn entity_kind_parses_case_insensitively() {
        assert_eq!("pool".parse::<EntityKind>().unwrap(), EntityKind::Pool);
        assert_eq!("PoolAsset".parse::<EntityKind>().unwrap(), EntityKind::PoolAsset);
        assert!("Nope".parse::<EntityKind>().is_err());
    }

    #[test]
    fn pool_type_tags() {
        assert_eq!(serde_json::to_value(PoolType::TermAmm).unwrap(), "TERM_AMM");
        assert_eq!(serde_json::to_value(PoolType::Vault).unwrap(), "LV");
    }
}
