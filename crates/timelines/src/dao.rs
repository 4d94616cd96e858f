//! Storage for timelines. Every call runs on the transaction carried by the
//! scope it is given.

use chrono::{DateTime, Utc};
use database::query;
use database::{DbError, PgTx, TxContext};
use uuid::Uuid;

const INSERT_TIMELINE: &str = include_str!("../sql/insert-timeline.sql");
const LIST_TIMELINES: &str = include_str!("../sql/list-timelines.sql");

/// A `timelines` row.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct TimelineRecord {
    pub id: Uuid,
    pub user_id: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewTimeline {
    pub name: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TimelineDao;

impl TimelineDao {
    pub fn new() -> Self {
        Self
    }

    /// Inserts a timeline and returns its generated id.
    pub async fn create_timeline(
        &self,
        ctx: &TxContext<PgTx>,
        user_id: &str,
        timeline: &NewTimeline,
    ) -> Result<Uuid, DbError> {
        query::exec_insert_for_primary_key::<Uuid>(
            ctx,
            sqlx::query(INSERT_TIMELINE)
                .bind(&timeline.name)
                .bind(user_id)
                .bind(timeline.created_at)
                .bind(timeline.created_at),
        )
        .await
    }

    /// Every timeline owned by `user_id`, newest first.
    pub async fn list_timelines(
        &self,
        ctx: &TxContext<PgTx>,
        user_id: &str,
    ) -> Result<Vec<TimelineRecord>, DbError> {
        query::scan_all(ctx, sqlx::query(LIST_TIMELINES).bind(user_id)).await
    }
}
