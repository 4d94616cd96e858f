//! `TxTimelineService` against an in-memory pool and a scripted delegate.

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use configuration::DatabaseConfig;
use core_types::{Categorized, CoreError, ErrorCategory};
use database::{
    AccessMode, Connector, Database, DbError, DbStats, PoolBackend, TxContext, TxHandle,
    close_owned,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use timelines::{
    IdentifiableTimeline, ListResponse, ServiceError, Timeline, TimelineCreateReq,
    TimelineService, TxTimelineService,
};
use uuid::Uuid;

#[derive(Debug, Default)]
struct Counts {
    begins: AtomicU32,
    commits: AtomicU32,
    rollbacks: AtomicU32,
}

impl Counts {
    fn snapshot(&self) -> (u32, u32, u32) {
        (
            self.begins.load(Ordering::SeqCst),
            self.commits.load(Ordering::SeqCst),
            self.rollbacks.load(Ordering::SeqCst),
        )
    }
}

struct MemoryConnector(Arc<Counts>);
struct MemoryPool(Arc<Counts>);
struct MemoryTx(Arc<Counts>);

#[async_trait]
impl Connector for MemoryConnector {
    type Pool = MemoryPool;

    async fn connect(&self, _cfg: &DatabaseConfig) -> Result<MemoryPool, DbError> {
        Ok(MemoryPool(self.0.clone()))
    }
}

#[async_trait]
impl PoolBackend for MemoryPool {
    type Connection = ();
    type Transaction = MemoryTx;

    async fn acquire(&self) -> Result<(), sqlx::Error> {
        Ok(())
    }

    async fn begin(&self, _access: AccessMode) -> Result<MemoryTx, sqlx::Error> {
        self.0.begins.fetch_add(1, Ordering::SeqCst);
        Ok(MemoryTx(self.0.clone()))
    }

    async fn close(&self) {}

    fn stats(&self) -> DbStats {
        DbStats::default()
    }
}

#[async_trait]
impl TxHandle for MemoryTx {
    async fn commit(self) -> Result<(), sqlx::Error> {
        self.0.commits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn rollback(self) -> Result<(), sqlx::Error> {
        self.0.rollbacks.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Answers from a script and checks it always runs inside a transaction.
struct Scripted {
    reject: bool,
}

fn launch_timeline(user_id: &str, name: String) -> IdentifiableTimeline {
    let at = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
    IdentifiableTimeline {
        id: Uuid::nil(),
        user_id: user_id.to_string(),
        timeline: Timeline {
            name,
            created_at: at,
            updated_at: at,
        },
    }
}

#[async_trait]
impl TimelineService<MemoryTx> for Scripted {
    async fn create_timeline(
        &self,
        ctx: TxContext<MemoryTx>,
        user_id: &str,
        req: TimelineCreateReq,
    ) -> Result<IdentifiableTimeline, ServiceError> {
        assert!(ctx.has_tx());
        if self.reject {
            return Err(CoreError::InvalidInput("name".to_string(), "already taken".to_string()).into());
        }
        Ok(launch_timeline(user_id, req.name))
    }

    async fn list_timelines(
        &self,
        ctx: TxContext<MemoryTx>,
        user_id: &str,
    ) -> Result<ListResponse<IdentifiableTimeline>, ServiceError> {
        assert!(ctx.has_tx());
        Ok(ListResponse::new(vec![launch_timeline(user_id, "Launch".to_string())]))
    }
}

async fn service(reject: bool) -> (TxTimelineService<Scripted, MemoryConnector>, Arc<Database<MemoryConnector>>, Arc<Counts>) {
    let counts = Arc::new(Counts::default());
    let db = Arc::new(Database::with_connector(
        DatabaseConfig::default(),
        MemoryConnector(counts.clone()),
    ));
    db.connect().await.unwrap();
    (TxTimelineService::new(db.clone(), Scripted { reject }), db, counts)
}

fn launch() -> TimelineCreateReq {
    TimelineCreateReq {
        name: "Launch".to_string(),
    }
}

#[tokio::test]
async fn successful_call_commits_and_passes_the_result_through() {
    let (svc, _db, counts) = service(false).await;

    let created = svc
        .create_timeline(TxContext::new(), "user-1", launch())
        .await
        .unwrap();

    assert_eq!(created, launch_timeline("user-1", "Launch".to_string()));
    assert_eq!(counts.snapshot(), (1, 1, 0));
}

#[tokio::test]
async fn failed_call_rolls_back_and_keeps_the_error() {
    let (svc, _db, counts) = service(true).await;

    let err = svc
        .create_timeline(TxContext::new(), "user-1", launch())
        .await
        .unwrap_err();

    assert!(matches!(err, ServiceError::InvalidInput(_)));
    assert_eq!(err.category(), ErrorCategory::InvalidInput);
    assert_eq!(counts.snapshot(), (1, 0, 1));
}

#[tokio::test]
async fn call_inside_an_outer_transaction_leaves_closing_to_the_caller() {
    let (svc, db, counts) = service(false).await;
    let (outer, owner) = db.begin_writable(&TxContext::new()).await.unwrap();
    assert!(owner);

    let listed = svc.list_timelines(outer.clone(), "user-1").await.unwrap();
    assert_eq!(listed.records.len(), 1);
    assert_eq!(counts.snapshot(), (1, 0, 0));

    close_owned(&outer, None).await.unwrap();
    assert_eq!(counts.snapshot(), (1, 1, 0));
}
