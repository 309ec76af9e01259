//! Deterministic id construction.
//!
//! Every id is a pure function of immutable inputs (chain, address, block,
//! log index, protocol keys). Addresses and hex keys are lowercased so the
//! same contract always maps to the same id regardless of checksum casing.

use crate::types::ChainId;

/// Currency symbol terminating every price path.
pub const USD: &str = "USD";

/// Lowercase an address or hex key.
pub fn normalize(addr: &str) -> String {
    addr.trim().to_ascii_lowercase()
}

/// `chain:blockNumber:logIndex`, the id of one log occurrence.
pub fn event_id(chain: ChainId, block: u64, log_index: u32) -> String {
    format!("{chain}:{block}:{log_index}")
}

pub fn account(chain: ChainId, addr: &str) -> String {
    format!("{chain}:{}", normalize(addr))
}

pub fn token(chain: ChainId, addr: &str) -> String {
    format!("{chain}:{}", normalize(addr))
}

/// `chain:token:account`.
pub fn account_token(chain: ChainId, token_addr: &str, account_addr: &str) -> String {
    format!("{chain}:{}:{}", normalize(token_addr), normalize(account_addr))
}

/// Which side of a transfer a ledger line records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Leg {
    Debit,
    Credit,
}

impl Leg {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Debit => "out",
            Self::Credit => "in",
        }
    }
}

/// One transfer can write two lines for the same token, and a self-transfer
/// writes two lines for the same account, so both the account and the leg are
/// part of the id.
pub fn account_token_entry(
    chain: ChainId,
    block: u64,
    log_index: u32,
    account_addr: &str,
    leg: Leg,
) -> String {
    format!(
        "{}:{}:{}",
        event_id(chain, block, log_index),
        normalize(account_addr),
        leg.as_str()
    )
}

/// `chain:poolKey`. Pool keys come from the builders below or from
/// [`market_pool_key`] and are already normalized.
pub fn pool(chain: ChainId, pool_key: &str) -> String {
    format!("{chain}:{pool_key}")
}

/// `chain:token:poolKey`.
pub fn pool_asset(chain: ChainId, pool_key: &str, token_addr: &str) -> String {
    format!("{chain}:{}:{pool_key}", normalize(token_addr))
}

/// Reserve ledger line. Swaps move two reserves of one pool in a single
/// event, so the token is part of the disambiguator.
pub fn pool_asset_entry(
    chain: ChainId,
    block: u64,
    log_index: u32,
    pool_key: &str,
    token_addr: &str,
) -> String {
    format!(
        "{}:{pool_key}:{}",
        event_id(chain, block, log_index),
        normalize(token_addr)
    )
}

/// Edge id towards another token.
pub fn asset_price_to_token(chain: ChainId, from_addr: &str, to_addr: &str) -> String {
    format!("{chain}:{}:{}", normalize(from_addr), normalize(to_addr))
}

/// Edge id towards a currency. The currency symbol keeps its case.
pub fn asset_price_to_currency(chain: ChainId, from_addr: &str, currency: &str) -> String {
    format!("{chain}:{}:{currency}", normalize(from_addr))
}

pub fn isolated_market(chain: ChainId, market_key: &str) -> String {
    format!("{chain}:{}", normalize(market_key))
}

pub fn cover_term(chain: ChainId, market_key: &str, term_key: &str) -> String {
    format!("{chain}:{}:{}", normalize(market_key), normalize(term_key))
}

// ─── Pool keys ────────────────────────────────────────────────────────────────

/// Pool key of a CorkPool market.
pub fn market_pool_key(market_id: &str) -> String {
    normalize(market_id)
}

/// Pool key of a PSM term pool.
pub fn psm_pool_key(market_key: &str, term_key: &str) -> String {
    format!("{}:{}:PSM", normalize(market_key), normalize(term_key))
}

/// Pool key of a market's liquidity vault.
pub fn vault_pool_key(market_key: &str) -> String {
    format!("{}:LV", normalize(market_key))
}

/// The AMM counterpart of a PSM pool id.
pub fn amm_pool_id(psm_pool_id: &str) -> String {
    psm_pool_id.replacen(":PSM", ":AMM", 1)
}

/// Strip the `chain:` prefix off a chain-scoped id.
pub fn local_part(id: &str) -> &str {
    id.split_once(':').map(|(_, rest)| rest).unwrap_or(id)
}
