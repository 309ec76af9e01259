//! Oracle aggregators: `AnswerUpdated` moves one price-graph edge and
//! revalues every pool whose valuation depends on it.

use async_trait::async_trait;
use tracing::{debug, info};

use corkindex_core::context::{ApplyContext, WarmContext};
use corkindex_core::error::IndexerError;
use corkindex_core::handler::{EventHandler, Outcome};
use corkindex_core::ids;
use corkindex_core::model::TokenPoolsIndex;
use corkindex_core::pricing::{revalue_token, upsert_edge};
use corkindex_core::types::Event;

use crate::events;

pub struct AnswerUpdated;

#[async_trait]
impl EventHandler for AnswerUpdated {
    type Params = events::AnswerUpdated;
    type Loaded = ();

    async fn warm(&self, event: &Event<Self::Params>, ctx: &WarmContext) -> Result<(), IndexerError> {
        if let Some(feed) = ctx.chain().feed(&event.src_address) {
            let token_id = ids::token(ctx.chain_id(), &feed.from_token);
            ctx.get::<TokenPoolsIndex>(&token_id).await?;
        }
        Ok(())
    }

    async fn apply(
        &self,
        event: &Event<Self::Params>,
        _loaded: (),
        ctx: &mut ApplyContext,
    ) -> Result<Outcome, IndexerError> {
        let Some(feed) = ctx.chain().feed(&event.src_address).cloned() else {
            debug!(chain_id = event.chain_id, aggregator = %event.src_address, "answer from unknown aggregator");
            return Ok(Outcome::Applied);
        };

        let edge = upsert_edge(ctx, event, &feed, &event.params.current).await?;
        let pools = revalue_token(ctx, &edge.from_token_id, event.block.timestamp).await?;
        info!(
            chain_id = event.chain_id,
            block = event.block.number,
            edge = %edge.id,
            answer = %edge.last_answer,
            pools = pools.len(),
            "price updated"
        );
        Ok(Outcome::Applied)
    }
}
