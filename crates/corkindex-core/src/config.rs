//! Indexer configuration.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;

use crate::error::IndexerError;
use crate::ids;
use crate::logging::LogConfig;
use crate::types::{ChainId, ContractKind};

/// Decimals assumed for tokens without an override.
pub const DEFAULT_TOKEN_DECIMALS: u8 = 18;

/// A statically subscribed contract.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContractConfig {
    pub kind: ContractKind,
    pub address: String,
    /// First block to deliver events from.
    #[serde(default)]
    pub start_block: u64,
}

/// One oracle feed: the aggregator's answers price `from_token` in either
/// `to_token` or `to_currency`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceFeedConfig {
    pub aggregator: String,
    pub from_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to_currency: Option<String>,
    /// Decimals of the feed's answer.
    pub decimals: u8,
}

/// Where a feed's edge points.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PriceTarget {
    Token(String),
    Currency(String),
}

impl PriceFeedConfig {
    pub fn target(&self) -> Result<PriceTarget, IndexerError> {
        match (&self.to_token, &self.to_currency) {
            (Some(token), None) => Ok(PriceTarget::Token(ids::normalize(token))),
            (None, Some(currency)) => Ok(PriceTarget::Currency(currency.clone())),
            _ => Err(IndexerError::Config(format!(
                "price feed {} must set exactly one of to_token / to_currency",
                self.aggregator
            ))),
        }
    }
}

/// Per-chain configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainConfig {
    pub chain_id: ChainId,
    #[serde(default)]
    pub contracts: Vec<ContractConfig>,
    #[serde(default)]
    pub price_feeds: Vec<PriceFeedConfig>,
    /// token address → decimals (default 18)
    #[serde(default)]
    pub token_decimals: BTreeMap<String, u8>,
}

/// Top-level indexer configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexerConfig {
    /// Unique indexer id, used as the checkpoint key.
    #[serde(default = "default_id")]
    pub id: String,
    /// Save a checkpoint every N processed blocks.
    #[serde(default = "default_checkpoint_interval")]
    pub checkpoint_interval: u64,
    /// Queue depth of each per-chain worker.
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
    #[serde(default)]
    pub log: LogConfig,
    #[serde(default)]
    pub chains: Vec<ChainConfig>,
}

fn default_id() -> String { "corkindex".to_string() }
fn default_checkpoint_interval() -> u64 { 100 }
fn default_channel_capacity() -> usize { 1_024 }

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            id: default_id(),
            checkpoint_interval: default_checkpoint_interval(),
            channel_capacity: default_channel_capacity(),
            log: LogConfig::default(),
            chains: vec![],
        }
    }
}

impl IndexerConfig {
    pub fn from_yaml_str(yaml: &str) -> Result<Self, IndexerError> {
        let config: Self =
            serde_yaml::from_str(yaml).map_err(|e| IndexerError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, IndexerError> {
        let path = path.as_ref();
        let yaml = std::fs::read_to_string(path)
            .map_err(|e| IndexerError::Config(format!("{}: {e}", path.display())))?;
        Self::from_yaml_str(&yaml)
    }

    pub fn chain(&self, chain_id: ChainId) -> Option<&ChainConfig> {
        self.chains.iter().find(|c| c.chain_id == chain_id)
    }

    pub fn validate(&self) -> Result<(), IndexerError> {
        if self.checkpoint_interval == 0 {
            return Err(IndexerError::Config("checkpoint_interval must be > 0".into()));
        }
        if self.channel_capacity == 0 {
            return Err(IndexerError::Config("channel_capacity must be > 0".into()));
        }

        let mut seen_chains = HashSet::new();
        for chain in &self.chains {
            if !seen_chains.insert(chain.chain_id) {
                return Err(IndexerError::Config(format!(
                    "duplicate chain_id {}",
                    chain.chain_id
                )));
            }

            let mut kinds: HashMap<String, ContractKind> = HashMap::new();
            for contract in &chain.contracts {
                let addr = ids::normalize(&contract.address);
                if let Some(prev) = kinds.insert(addr.clone(), contract.kind) {
                    if prev != contract.kind {
                        return Err(IndexerError::Config(format!(
                            "chain {}: {addr} bound to both {prev} and {}",
                            chain.chain_id, contract.kind
                        )));
                    }
                }
            }

            let mut aggregators = HashSet::new();
            for feed in &chain.price_feeds {
                feed.target()?;
                if !aggregators.insert(ids::normalize(&feed.aggregator)) {
                    return Err(IndexerError::Config(format!(
                        "chain {}: duplicate price feed {}",
                        chain.chain_id, feed.aggregator
                    )));
                }
            }
        }
        Ok(())
    }
}

// ─── ChainSettings ────────────────────────────────────────────────────────────

/// Resolved, normalized per-chain settings handed to handlers.
#[derive(Debug, Clone, Default)]
pub struct ChainSettings {
    pub chain_id: ChainId,
    token_decimals: HashMap<String, u8>,
    feeds: HashMap<String, PriceFeedConfig>,
}

impl ChainSettings {
    pub fn new(chain_id: ChainId) -> Self {
        Self {
            chain_id,
            ..Default::default()
        }
    }

    pub fn from_config(config: &ChainConfig) -> Self {
        let mut settings = Self::new(config.chain_id);
        for (addr, decimals) in &config.token_decimals {
            settings = settings.with_token_decimals(addr, *decimals);
        }
        for feed in &config.price_feeds {
            settings = settings.with_feed(feed.clone());
        }
        settings
    }

    pub fn with_token_decimals(mut self, addr: &str, decimals: u8) -> Self {
        self.token_decimals.insert(ids::normalize(addr), decimals);
        self
    }

    pub fn with_feed(mut self, feed: PriceFeedConfig) -> Self {
        self.feeds.insert(ids::normalize(&feed.aggregator), feed);
        self
    }

    pub fn decimals_of(&self, token_addr: &str) -> u8 {
        self.token_decimals
            .get(&ids::normalize(token_addr))
            .copied()
            .unwrap_or(DEFAULT_TOKEN_DECIMALS)
    }

    /// The feed configured for an aggregator address.
    pub fn feed(&self, aggregator: &str) -> Option<&PriceFeedConfig> {
        self.feeds.get(&ids::normalize(aggregator))
    }

    pub fn feed_count(&self) -> usize {
        self.feeds.len()
    }
}
