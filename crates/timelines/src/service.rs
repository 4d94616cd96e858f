use crate::api::ListResponse;
use crate::dao::{NewTimeline, TimelineDao, TimelineRecord};
use crate::error::ServiceError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use core_types::CoreError;
use database::{PgTx, TxContext};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timeline {
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A stored timeline together with its identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentifiableTimeline {
    pub id: Uuid,
    pub user_id: String,
    #[serde(flatten)]
    pub timeline: Timeline,
}

impl From<TimelineRecord> for IdentifiableTimeline {
    fn from(r: TimelineRecord) -> Self {
        Self {
            id: r.id,
            user_id: r.user_id,
            timeline: Timeline {
                name: r.name,
                created_at: r.created_at,
                updated_at: r.updated_at,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimelineCreateReq {
    pub name: String,
}

/// Timeline operations. `T` is the transaction type carried by the scope.
#[async_trait]
pub trait TimelineService<T: Send + 'static = PgTx>: Send + Sync {
    /// Validates and stores a new timeline for `user_id`.
    async fn create_timeline(
        &self,
        ctx: TxContext<T>,
        user_id: &str,
        req: TimelineCreateReq,
    ) -> Result<IdentifiableTimeline, ServiceError>;

    /// All timelines owned by `user_id`.
    async fn list_timelines(
        &self,
        ctx: TxContext<T>,
        user_id: &str,
    ) -> Result<ListResponse<IdentifiableTimeline>, ServiceError>;
}

/// The business logic. Expects to be called inside a transaction; see
/// [`TxTimelineService`](crate::TxTimelineService).
#[derive(Debug, Clone, Default)]
pub struct Timelines {
    dao: TimelineDao,
}

impl Timelines {
    pub fn new(dao: TimelineDao) -> Self {
        Self { dao }
    }
}

fn require(field: &str, value: &str) -> Result<(), CoreError> {
    if value.trim().is_empty() {
        return Err(CoreError::InvalidInput(
            field.to_string(),
            "must not be blank".to_string(),
        ));
    }
    Ok(())
}

#[async_trait]
impl TimelineService for Timelines {
    async fn create_timeline(
        &self,
        ctx: TxContext,
        user_id: &str,
        req: TimelineCreateReq,
    ) -> Result<IdentifiableTimeline, ServiceError> {
        require("user_id", user_id)?;
        require("name", &req.name)?;

        let now = Utc::now();
        let new = NewTimeline {
            name: req.name,
            created_at: now,
        };
        let id = self
            .dao
            .create_timeline(&ctx, user_id, &new)
            .await
            .map_err(ServiceError::storage("inserting timeline"))?;

        tracing::info!(%id, user_id, "created timeline");
        Ok(IdentifiableTimeline {
            id,
            user_id: user_id.to_string(),
            timeline: Timeline {
                name: new.name,
                created_at: now,
                updated_at: now,
            },
        })
    }

    async fn list_timelines(
        &self,
        ctx: TxContext,
        user_id: &str,
    ) -> Result<ListResponse<IdentifiableTimeline>, ServiceError> {
        require("user_id", user_id)?;

        let records = self
            .dao
            .list_timelines(&ctx, user_id)
            .await
            .map_err(ServiceError::storage("listing timelines"))?;
        Ok(ListResponse::new(
            records.into_iter().map(IdentifiableTimeline::from).collect(),
        ))
    }
}
