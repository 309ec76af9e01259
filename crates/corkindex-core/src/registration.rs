//! Contract directory and dynamic contract registration.
//!
//! The directory binds `(chain, address)` to a [`ContractKind`]. Static
//! bindings come from configuration; dynamic ones are requested by handlers
//! during the registration phase, before any state is mutated, and only take
//! effect from the block after the one that revealed them.

use std::collections::{BTreeMap, HashMap};
use tracing::{debug, info};

use crate::config::IndexerConfig;
use crate::ids;
use crate::types::{ChainId, ContractKind};

/// How a binding entered the directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    Config,
    Dynamic,
}

/// One subscribed contract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registration {
    pub chain_id: ChainId,
    /// Lowercased address.
    pub address: String,
    pub kind: ContractKind,
    /// Events from blocks before this one are not routed to the contract.
    pub effective_from: u64,
    pub origin: Origin,
}

/// Registration requests collected while handling one event.
#[derive(Debug, Default, Clone)]
pub struct Registrations {
    requested: Vec<(ContractKind, String)>,
}

impl Registrations {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request that `address` be subscribed as `kind`.
    pub fn add(&mut self, kind: ContractKind, address: &str) {
        self.requested.push((kind, ids::normalize(address)));
    }

    pub fn iter(&self) -> impl Iterator<Item = &(ContractKind, String)> {
        self.requested.iter()
    }

    pub fn len(&self) -> usize {
        self.requested.len()
    }

    pub fn is_empty(&self) -> bool {
        self.requested.is_empty()
    }
}

/// All static and dynamic contract bindings, per chain.
#[derive(Debug, Default, Clone)]
pub struct ContractDirectory {
    entries: HashMap<(ChainId, String), Registration>,
}

impl ContractDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the directory with every statically configured contract.
    pub fn from_config(config: &IndexerConfig) -> Self {
        let mut dir = Self::new();
        for chain in &config.chains {
            for contract in &chain.contracts {
                dir.insert(Registration {
                    chain_id: chain.chain_id,
                    address: ids::normalize(&contract.address),
                    kind: contract.kind,
                    effective_from: contract.start_block,
                    origin: Origin::Config,
                });
            }
        }
        dir
    }

    fn insert(&mut self, reg: Registration) -> bool {
        let key = (reg.chain_id, reg.address.clone());
        if self.entries.contains_key(&key) {
            return false;
        }
        self.entries.insert(key, reg);
        true
    }

    /// Apply the requests revealed at `block`. The first binding of an
    /// address wins; repeats are no-ops. Returns the newly added bindings.
    pub fn register(
        &mut self,
        chain_id: ChainId,
        block: u64,
        requests: &Registrations,
    ) -> Vec<Registration> {
        let mut added = Vec::new();
        for (kind, address) in requests.iter() {
            let reg = Registration {
                chain_id,
                address: address.clone(),
                kind: *kind,
                effective_from: block + 1,
                origin: Origin::Dynamic,
            };
            if self.insert(reg.clone()) {
                info!(chain_id, %address, kind = %kind, effective_from = block + 1, "contract registered");
                added.push(reg);
            } else {
                debug!(chain_id, %address, kind = %kind, "contract already registered");
            }
        }
        added
    }

    pub fn lookup(&self, chain_id: ChainId, address: &str) -> Option<&Registration> {
        self.entries.get(&(chain_id, ids::normalize(address)))
    }

    /// The contract kind an event at `block` from `address` routes to, if the
    /// binding is in effect.
    pub fn resolve(&self, chain_id: ChainId, address: &str, block: u64) -> Option<ContractKind> {
        self.lookup(chain_id, address)
            .filter(|reg| block >= reg.effective_from)
            .map(|reg| reg.kind)
    }

    /// Every binding on a chain, ordered by address.
    pub fn contracts(&self, chain_id: ChainId) -> Vec<&Registration> {
        let sorted: BTreeMap<&str, &Registration> = self
            .entries
            .iter()
            .filter(|((chain, _), _)| *chain == chain_id)
            .map(|((_, addr), reg)| (addr.as_str(), reg))
            .collect();
        sorted.into_values().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dynamic_binding_applies_from_next_block() {
        let mut dir = ContractDirectory::new();
        let mut req = Registrations::new();
        req.add(ContractKind::PrincipalToken, "0xABC");
        let added = dir.register(1, 100, &req);
        assert_eq!(added.len(), 1);

        assert_eq!(dir.resolve(1, "0xabc", 100), None);
        assert_eq!(dir.resolve(1, "0xabc", 101), Some(ContractKind::PrincipalToken));
        assert_eq!(dir.resolve(2, "0xabc", 101), None);
    }

    #[test]
    fn registration_is_idempotent_and_first_wins() {
        let mut dir = ContractDirectory::new();
        let mut req = Registrations::new();
        req.add(ContractKind::SwapToken, "0xabc");
        dir.register(1, 10, &req);

        let mut again = Registrations::new();
        again.add(ContractKind::CoverToken, "0xabc");
        assert!(dir.register(1, 20, &again).is_empty());
        let reg = dir.lookup(1, "0xabc").unwrap();
        assert_eq!(reg.kind, ContractKind::SwapToken);
        assert_eq!(reg.effective_from, 11);
    }

    #[test]
    fn static_contracts_respect_start_block() {
        let config = IndexerConfig::from_yaml_str(
            "chains:\n  - chain_id: 1\n    contracts:\n      - { kind: CorkPool, address: \"0xP\", start_block: 50 }\n",
        )
        .unwrap();
        let dir = ContractDirectory::from_config(&config);
        assert_eq!(dir.resolve(1, "0xp", 49), None);
        assert_eq!(dir.resolve(1, "0xp", 50), Some(ContractKind::CorkPool));
        assert_eq!(dir.contracts(1)[0].origin, Origin::Config);
    }
}
