//! # Accelerate Timelines Crate
//!
//! A small business service built on the `database` crate: user-owned
//! timelines stored in PostgreSQL.
//!
//! [`new_service`] returns the service most callers want, with every
//! operation wrapped in a transaction by [`TxTimelineService`].

pub mod api;
pub mod dao;
pub mod error;
pub mod service;
pub mod tx_service;

pub use api::{ListMeta, ListResponse};
pub use dao::TimelineDao;
pub use error::ServiceError;
pub use service::{IdentifiableTimeline, Timeline, TimelineCreateReq, TimelineService, Timelines};
pub use tx_service::TxTimelineService;

use database::Database;
use std::sync::Arc;

/// The timeline service over `db`, transactional per call.
pub fn new_service(db: Arc<Database>) -> TxTimelineService<Timelines> {
    TxTimelineService::new(db, Timelines::new(TimelineDao::new()))
}

