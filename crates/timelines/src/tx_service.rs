use crate::api::ListResponse;
use crate::error::ServiceError;
use crate::service::{IdentifiableTimeline, TimelineCreateReq, TimelineService};
use async_trait::async_trait;
use database::{Connector, Database, PgConnector, TxContext, TxOf, execute_in_tx};
use std::sync::Arc;

/// Runs every call of the wrapped service inside a transaction.
///
/// A call made with a scope that already carries a transaction joins it and
/// leaves closing to the caller. Results and errors pass through unchanged.
pub struct TxTimelineService<S, C: Connector = PgConnector> {
    db: Arc<Database<C>>,
    delegate: S,
}

impl<S, C: Connector> TxTimelineService<S, C> {
    pub fn new(db: Arc<Database<C>>, delegate: S) -> Self {
        Self { db, delegate }
    }
}

#[async_trait]
impl<S, C> TimelineService<TxOf<C>> for TxTimelineService<S, C>
where
    C: Connector,
    S: TimelineService<TxOf<C>>,
{
    async fn create_timeline(
        &self,
        ctx: TxContext<TxOf<C>>,
        user_id: &str,
        req: TimelineCreateReq,
    ) -> Result<IdentifiableTimeline, ServiceError> {
        execute_in_tx(&ctx, &self.db, |ctx| {
            self.delegate.create_timeline(ctx, user_id, req)
        })
        .await
    }

    async fn list_timelines(
        &self,
        ctx: TxContext<TxOf<C>>,
        user_id: &str,
    ) -> Result<ListResponse<IdentifiableTimeline>, ServiceError> {
        execute_in_tx(&ctx, &self.db, |ctx| self.delegate.list_timelines(ctx, user_id)).await
    }
}
