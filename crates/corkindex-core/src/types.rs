//! Shared types for the event pipeline.

use serde::{Deserialize, Serialize};

use crate::ids;

/// EVM chain id (e.g. `1` for Ethereum mainnet).
pub type ChainId = u64;

/// The zero-address sentinel used by ERC20 mint/burn transfers.
pub const ZERO_ADDRESS: &str = "0x0000000000000000000000000000000000000000";

// ─── Block ────────────────────────────────────────────────────────────────────

/// The block an event was emitted in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    /// Block number.
    pub number: u64,
    /// Unix timestamp of the block (seconds since epoch).
    pub timestamp: i64,
}

// ─── ContractKind ─────────────────────────────────────────────────────────────

/// The closed set of contract families the indexer understands.
///
/// Every subscribed address is bound to exactly one kind, either statically
/// through configuration or dynamically when a factory-style event reveals it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ContractKind {
    CorkConfig,
    CorkPool,
    SharesFactory,
    ExchangeRateProvider,
    PrincipalToken,
    SwapToken,
    CoverToken,
    LiquidityToken,
    VaultToken,
    ModuleCore,
    CorkHook,
    PriceFeed,
}

impl ContractKind {
    pub const ALL: [ContractKind; 12] = [
        Self::CorkConfig,
        Self::CorkPool,
        Self::SharesFactory,
        Self::ExchangeRateProvider,
        Self::PrincipalToken,
        Self::SwapToken,
        Self::CoverToken,
        Self::LiquidityToken,
        Self::VaultToken,
        Self::ModuleCore,
        Self::CorkHook,
        Self::PriceFeed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CorkConfig => "CorkConfig",
            Self::CorkPool => "CorkPool",
            Self::SharesFactory => "SharesFactory",
            Self::ExchangeRateProvider => "ExchangeRateProvider",
            Self::PrincipalToken => "PrincipalToken",
            Self::SwapToken => "SwapToken",
            Self::CoverToken => "CoverToken",
            Self::LiquidityToken => "LiquidityToken",
            Self::VaultToken => "VaultToken",
            Self::ModuleCore => "ModuleCore",
            Self::CorkHook => "CorkHook",
            Self::PriceFeed => "PriceFeed",
        }
    }
}

impl std::fmt::Display for ContractKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ─── RawEvent ─────────────────────────────────────────────────────────────────

/// A decoded log as delivered by the subscription collaborator.
///
/// `params` holds the event's named fields; large integers may be encoded as
/// JSON numbers or decimal strings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawEvent {
    pub chain_id: ChainId,
    pub block: Block,
    pub log_index: u32,
    pub src_address: String,
    /// Event name as declared in the contract ABI (e.g. `"Transfer"`).
    pub event: String,
    /// Explicit contract family. When absent the engine resolves it from
    /// `src_address` through the contract directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contract: Option<ContractKind>,
    #[serde(default)]
    pub params: serde_json::Value,
}

impl RawEvent {
    /// `(block, log_index)` ordering key within a chain.
    pub fn position(&self) -> (u64, u32) {
        (self.block.number, self.log_index)
    }

    /// Deterministic id of this log occurrence (`chain:block:logIndex`).
    pub fn event_id(&self) -> String {
        ids::event_id(self.chain_id, self.block.number, self.log_index)
    }
}

// ─── Event ────────────────────────────────────────────────────────────────────

/// A routed event with its parameters decoded into `P`.
#[derive(Debug, Clone)]
pub struct Event<P> {
    pub chain_id: ChainId,
    pub block: Block,
    pub log_index: u32,
    /// Emitting contract, lowercased.
    pub src_address: String,
    pub contract: ContractKind,
    pub name: String,
    pub params: P,
}

impl<P> Event<P> {
    /// Deterministic id of this log occurrence (`chain:block:logIndex`).
    pub fn event_id(&self) -> String {
        ids::event_id(self.chain_id, self.block.number, self.log_index)
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_event_parses_camel_case() {
        let raw: RawEvent = serde_json::from_value(serde_json::json!({
            "chainId": 1,
            "block": { "number": 100, "timestamp": 1_700_000_000 },
            "logIndex": 3,
            "srcAddress": "0xAbC",
            "event": "Transfer",
            "params": { "from": "0x1", "to": "0x2", "value": "5" }
        }))
        .unwrap();
        assert_eq!(raw.chain_id, 1);
        assert_eq!(raw.position(), (100, 3));
        assert!(raw.contract.is_none());
        assert_eq!(raw.event_id(), "1:100:3");
    }

    #[test]
    fn contract_kind_serde_names() {
        let kind: ContractKind = serde_json::from_str("\"ModuleCore\"").unwrap();
        assert_eq!(kind, ContractKind::ModuleCore);
        for kind in ContractKind::ALL {
            let json = serde_json::to_string(&kind).unwrap();
            assert_eq!(json, format!("\"{}\"", kind.as_str()));
        }
    }
}
