//! Composition of the protocol's dispatch table.

use std::sync::Arc;

use corkindex_core::error::IndexerError;
use corkindex_core::handler::DispatchTable;
use corkindex_core::types::ContractKind;

use crate::handlers::{admin, hook, pool, price_feed, psm, token};

/// Build the `(contract kind, event) → handler` table for every contract
/// family. Called once at startup; the table is immutable afterwards.
pub fn compose_dispatch_table() -> Result<DispatchTable, IndexerError> {
    let mut builder = DispatchTable::builder()
        // CorkConfig
        .on(ContractKind::CorkConfig, "CorkPoolSet", admin::CorkPoolSet)
        .record(ContractKind::CorkConfig, admin::CORK_CONFIG_EVENTS)
        // CorkPool
        .on(ContractKind::CorkPool, "MarketCreated", pool::MarketCreated)
        .on(ContractKind::CorkPool, "Deposit", pool::Deposit)
        .on(ContractKind::CorkPool, "WithdrawExtended", pool::WithdrawExtended)
        .on(ContractKind::CorkPool, "Swap", pool::Swap)
        .on(ContractKind::CorkPool, "UnwindSwap", pool::UnwindSwap)
        .record(ContractKind::CorkPool, admin::CORK_POOL_EVENTS)
        // ModuleCore
        .on(ContractKind::ModuleCore, "InitializedModuleCore", psm::InitializedModuleCore)
        .on(ContractKind::ModuleCore, "Issued", psm::Issued)
        .on(ContractKind::ModuleCore, "PsmDeposited", psm::PsmDeposited)
        .on(ContractKind::ModuleCore, "Cancelled", psm::Cancelled)
        .on(ContractKind::ModuleCore, "CtRedeemed", psm::CtRedeemed)
        .on(ContractKind::ModuleCore, "DsRedeemed", psm::DsRedeemed)
        .on(ContractKind::ModuleCore, "Repurchased", psm::Repurchased)
        // CorkHook
        .on(ContractKind::CorkHook, "Initialized", hook::Initialized)
        .on(ContractKind::CorkHook, "AddedLiquidity", hook::AddedLiquidity)
        .on(ContractKind::CorkHook, "RemovedLiquidity", hook::RemovedLiquidity)
        .on(ContractKind::CorkHook, "Swapped", hook::Swapped)
        .record(ContractKind::CorkHook, admin::HOOK_EVENTS)
        // Audit-only families
        .record(ContractKind::SharesFactory, admin::SHARES_FACTORY_EVENTS)
        .record(ContractKind::ExchangeRateProvider, admin::EXCHANGE_RATE_PROVIDER_EVENTS)
        // Oracles
        .on(ContractKind::PriceFeed, "AnswerUpdated", price_feed::AnswerUpdated);

    for kind in token::FAMILIES {
        let Some(role) = token::family_role(kind) else {
            continue;
        };
        builder = builder
            .on_shared(kind, "Transfer", Arc::new(token::Transfer { role }))
            .on_shared(kind, "Approval", Arc::new(token::Approval { role }))
            .record(kind, admin::TOKEN_EVENTS);
    }

    builder.build()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_composes_without_duplicates() {
        let table = compose_dispatch_table().unwrap();
        assert!(table.route(ContractKind::CorkPool, "MarketCreated").is_some());
        assert!(table.route(ContractKind::VaultToken, "Transfer").is_some());
        assert!(table.route(ContractKind::PriceFeed, "AnswerUpdated").is_some());
        assert!(table.route(ContractKind::PriceFeed, "Transfer").is_none());
    }

    #[test]
    fn every_family_has_routes() {
        let table = compose_dispatch_table().unwrap();
        let routes = table.routes();
        for kind in ContractKind::ALL {
            assert!(routes.iter().any(|(k, _, _)| *k == kind), "{kind} has no routes");
        }
    }

    #[test]
    fn admin_events_are_record_only() {
        let table = compose_dispatch_table().unwrap();
        let routes = table.routes();
        let paused = routes
            .iter()
            .find(|(k, e, _)| *k == ContractKind::CorkConfig && *e == "Paused")
            .unwrap();
        assert_eq!(paused.2, "RecordOnly");
        let transfer = routes
            .iter()
            .find(|(k, e, _)| *k == ContractKind::CoverToken && *e == "Transfer")
            .unwrap();
        assert_eq!(transfer.2, "Transfer");
    }
}
