//! ERC20 handlers shared by every token family. The family decides the role
//! a token gets when one of its events is the first to mention it.

use async_trait::async_trait;

use corkindex_core::context::{ApplyContext, WarmContext};
use corkindex_core::error::IndexerError;
use corkindex_core::handler::{EventHandler, Outcome};
use corkindex_core::ids;
use corkindex_core::ledger::{apply_transfer, record_approval};
use corkindex_core::model::{AccountToken, Token, TokenRole};
use corkindex_core::types::{ContractKind, Event, ZERO_ADDRESS};

use crate::events;

/// Role assigned to tokens first seen through a family's own events.
pub fn family_role(kind: ContractKind) -> Option<TokenRole> {
    match kind {
        ContractKind::PrincipalToken => Some(TokenRole::Principal),
        ContractKind::SwapToken => Some(TokenRole::Swap),
        ContractKind::CoverToken => Some(TokenRole::CoverTerm),
        ContractKind::LiquidityToken => Some(TokenRole::LiquidityProvider),
        ContractKind::VaultToken => Some(TokenRole::VaultShare),
        _ => None,
    }
}

/// The token families.
pub const FAMILIES: [ContractKind; 5] = [
    ContractKind::PrincipalToken,
    ContractKind::SwapToken,
    ContractKind::CoverToken,
    ContractKind::LiquidityToken,
    ContractKind::VaultToken,
];

/// ERC20 `Transfer` for one token family.
#[derive(Debug, Clone, Copy)]
pub struct Transfer {
    pub role: TokenRole,
}

#[async_trait]
impl EventHandler for Transfer {
    type Params = events::Transfer;
    type Loaded = ();

    async fn warm(&self, event: &Event<Self::Params>, ctx: &WarmContext) -> Result<(), IndexerError> {
        let chain = ctx.chain_id();
        let token_addr = &event.src_address;
        let holding = |addr: &str| {
            (ids::normalize(addr) != ZERO_ADDRESS).then(|| ids::account_token(chain, token_addr, addr))
        };
        let (from, to) = (holding(&event.params.from), holding(&event.params.to));
        let token_id = ids::token(chain, token_addr);

        futures::try_join!(
            ctx.get::<Token>(&token_id),
            async {
                match &from {
                    Some(id) => ctx.get::<AccountToken>(id).await,
                    None => Ok(None),
                }
            },
            async {
                match &to {
                    Some(id) => ctx.get::<AccountToken>(id).await,
                    None => Ok(None),
                }
            },
        )?;
        Ok(())
    }

    async fn apply(
        &self,
        event: &Event<Self::Params>,
        _loaded: (),
        ctx: &mut ApplyContext,
    ) -> Result<Outcome, IndexerError> {
        let p = &event.params;
        apply_transfer(ctx, event, self.role, &p.from, &p.to, &p.value).await?;
        Ok(Outcome::Applied)
    }

    fn name(&self) -> &'static str {
        "Transfer"
    }
}

/// ERC20 `Approval` for one token family.
#[derive(Debug, Clone, Copy)]
pub struct Approval {
    pub role: TokenRole,
}

#[async_trait]
impl EventHandler for Approval {
    type Params = events::Approval;
    type Loaded = ();

    async fn apply(
        &self,
        event: &Event<Self::Params>,
        _loaded: (),
        ctx: &mut ApplyContext,
    ) -> Result<Outcome, IndexerError> {
        let p = &event.params;
        record_approval(ctx, event, self.role, &p.owner, &p.spender, &p.value).await?;
        Ok(Outcome::Applied)
    }

    fn name(&self) -> &'static str {
        "Approval"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_family_has_a_role() {
        for kind in FAMILIES {
            assert!(family_role(kind).is_some(), "{kind}");
        }
        assert_eq!(family_role(ContractKind::CorkPool), None);
        assert_eq!(family_role(ContractKind::CoverToken), Some(TokenRole::CoverTerm));
    }
}
