//! Configuration contracts, and the audit-only events of every family.

use async_trait::async_trait;

use corkindex_core::context::ApplyContext;
use corkindex_core::error::IndexerError;
use corkindex_core::handler::{EventHandler, Outcome};
use corkindex_core::registration::Registrations;
use corkindex_core::types::{ContractKind, Event};

use crate::events;

/// `CorkPoolSet`: subscribe to the configured CorkPool.
pub struct CorkPoolSet;

#[async_trait]
impl EventHandler for CorkPoolSet {
    type Params = events::CorkPoolSet;
    type Loaded = ();

    fn register(&self, event: &Event<Self::Params>, out: &mut Registrations) {
        out.add(ContractKind::CorkPool, &event.params.cork_pool);
    }

    async fn apply(
        &self,
        _event: &Event<Self::Params>,
        _loaded: (),
        _ctx: &mut ApplyContext,
    ) -> Result<Outcome, IndexerError> {
        Ok(Outcome::Applied)
    }
}

pub const CORK_CONFIG_EVENTS: &[&str] = &[
    "Paused",
    "Unpaused",
    "RoleAdminChanged",
    "RoleGranted",
    "RoleRevoked",
    "TreasurySet",
];

pub const CORK_POOL_EVENTS: &[&str] = &[
    "BaseRedemptionFeePercentageUpdated",
    "DepositPaused",
    "DepositUnpaused",
    "Initialized",
    "OwnershipTransferred",
    "ReturnPaused",
    "ReturnUnpaused",
    "SwapPaused",
    "SwapUnpaused",
    "UnwindSwapFeeRateUpdated",
    "UnwindSwapPaused",
    "UnwindSwapUnpaused",
    "Upgraded",
    "WithdrawalPaused",
    "WithdrawalUnpaused",
];

pub const SHARES_FACTORY_EVENTS: &[&str] = &[
    "CorkPoolChanged",
    "Initialized",
    "OwnershipTransferred",
    "Upgraded",
];

pub const EXCHANGE_RATE_PROVIDER_EVENTS: &[&str] = &["RateUpdated"];

/// Token-family events beyond `Transfer`/`Approval`.
pub const TOKEN_EVENTS: &[&str] = &[
    "Deposit",
    "Withdraw",
    "Initialized",
    "OwnershipTransferred",
    "EIP712DomainChanged",
];

pub const HOOK_EVENTS: &[&str] = &["OwnershipTransferred"];
