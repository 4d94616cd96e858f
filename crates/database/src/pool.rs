//! The seam between the pool manager and the actual connection pool.
//!
//! [`Database`](crate::Database) only talks to a pool through these traits.
//! Production uses [`PgConnector`] / [`PgBackend`], a thin layer over
//! `sqlx::PgPool` that adds checkout counters and lifetime jitter.

use crate::connection::{connect_options, pool_options};
use crate::error::DbError;
use async_trait::async_trait;
use configuration::DatabaseConfig;
use rand::Rng;
use sqlx::pool::PoolConnection;
use sqlx::postgres::{PgPool, Postgres};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// The concrete transaction handed out by the production pool.
pub type PgTx = sqlx::Transaction<'static, Postgres>;

/// Whether a transaction may write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessMode {
    ReadWrite,
    ReadOnly,
}

/// Creates pools. Configuration errors must be reported with a variant for
/// which [`DbError::is_configuration`] is `true` so the connect loop stops.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    type Pool: PoolBackend;

    async fn connect(&self, cfg: &DatabaseConfig) -> Result<Self::Pool, DbError>;
}

/// A live pool of connections.
#[async_trait]
pub trait PoolBackend: Send + Sync + 'static {
    type Connection: Send;
    type Transaction: TxHandle;

    /// Checks out one connection.
    async fn acquire(&self) -> Result<Self::Connection, sqlx::Error>;

    /// Starts a transaction on a connection of its own.
    async fn begin(&self, access: AccessMode) -> Result<Self::Transaction, sqlx::Error>;

    /// Closes every connection. Called exactly once, during shutdown.
    async fn close(&self);

    fn stats(&self) -> DbStats;
}

/// A transaction that can be finished exactly once.
#[async_trait]
pub trait TxHandle: Send + 'static {
    async fn commit(self) -> Result<(), sqlx::Error>;
    async fn rollback(self) -> Result<(), sqlx::Error>;
}

#[async_trait]
impl TxHandle for PgTx {
    async fn commit(self) -> Result<(), sqlx::Error> {
        sqlx::Transaction::commit(self).await
    }

    async fn rollback(self) -> Result<(), sqlx::Error> {
        sqlx::Transaction::rollback(self).await
    }
}

/// A point-in-time snapshot of pool activity.
///
/// The two destroy counters only see connections discarded at checkout.
/// Connections the pool's own reaper closes in the background for passing
/// `idle_timeout` or `max_lifetime` are not counted, so both are lower bounds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DbStats {
    /// Configured upper bound on connections.
    pub max_connections: u32,
    /// Connections currently open, idle or in use.
    pub current_connections: u32,
    /// Idle connections ready for checkout.
    pub available_connections: u32,
    /// Connections currently checked out.
    pub acquired_connections: u32,
    /// Checkouts that found no idle connection and had to wait or dial.
    pub empty_acquire_count: u64,
    /// Connections opened since the pool was created.
    pub new_connections_total: u64,
    /// Connections discarded at checkout for exceeding their lifetime.
    pub max_lifetime_destroy_total: u64,
    /// Connections discarded at checkout for sitting idle too long.
    pub max_idle_destroy_total: u64,
}

#[derive(Debug, Default)]
struct PoolCounters {
    empty_acquire: AtomicU64,
    new_connections: AtomicU64,
    lifetime_destroys: AtomicU64,
    idle_destroys: AtomicU64,
}

/// Opens [`PgBackend`] pools from a [`DatabaseConfig`].
#[derive(Debug, Clone, Copy, Default)]
pub struct PgConnector;

#[async_trait]
impl Connector for PgConnector {
    type Pool = PgBackend;

    async fn connect(&self, cfg: &DatabaseConfig) -> Result<PgBackend, DbError> {
        let connect = connect_options(cfg)?;
        let counters = Arc::new(PoolCounters::default());

        let lifetime = cfg.connection_max_lifetime;
        let jitter = cfg.connection_max_lifetime_jitter;
        let max_idle = cfg.connection_max_idle_time;

        let on_connect = counters.clone();
        let on_acquire = counters.clone();
        let pool = pool_options(cfg)
            .after_connect(move |_conn, _meta| {
                on_connect.new_connections.fetch_add(1, Ordering::Relaxed);
                Box::pin(async { Ok(()) })
            })
            .before_acquire(move |_conn, meta| {
                let keep = match checkout_verdict(meta.age, meta.idle_for, lifetime, jitter, max_idle) {
                    Verdict::Keep => true,
                    Verdict::Expired => {
                        on_acquire.lifetime_destroys.fetch_add(1, Ordering::Relaxed);
                        false
                    }
                    Verdict::Idle => {
                        on_acquire.idle_destroys.fetch_add(1, Ordering::Relaxed);
                        false
                    }
                };
                Box::pin(async move { Ok(keep) })
            })
            .connect_with(connect)
            .await
            .map_err(DbError::ConnectionError)?;

        Ok(PgBackend { pool, counters })
    }
}

#[derive(Debug, PartialEq, Eq)]
enum Verdict {
    Keep,
    Expired,
    Idle,
}

/// Decides at checkout whether a pooled connection is still fit for use.
///
/// Past `lifetime` a connection is discarded at a uniformly random point of
/// the jitter window, re-drawn on every checkout.
fn checkout_verdict(
    age: Duration,
    idle_for: Duration,
    lifetime: Duration,
    jitter: Duration,
    max_idle: Duration,
) -> Verdict {
    if !max_idle.is_zero() && idle_for > max_idle {
        return Verdict::Idle;
    }
    if lifetime.is_zero() {
        return Verdict::Keep;
    }
    let deadline = if jitter.is_zero() {
        lifetime
    } else {
        let jitter_ms = u64::try_from(jitter.as_millis()).unwrap_or(u64::MAX);
        lifetime + Duration::from_millis(rand::thread_rng().gen_range(0..=jitter_ms))
    };
    if age >= deadline {
        Verdict::Expired
    } else {
        Verdict::Keep
    }
}

/// `sqlx::PgPool` plus the counters behind [`DbStats`].
#[derive(Debug, Clone)]
pub struct PgBackend {
    pool: PgPool,
    counters: Arc<PoolCounters>,
}

impl PgBackend {
    /// The underlying sqlx pool, for callers that need it directly.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl PoolBackend for PgBackend {
    type Connection = PoolConnection<Postgres>;
    type Transaction = PgTx;

    async fn acquire(&self) -> Result<Self::Connection, sqlx::Error> {
        if self.pool.num_idle() == 0 {
            self.counters.empty_acquire.fetch_add(1, Ordering::Relaxed);
        }
        self.pool.acquire().await
    }

    async fn begin(&self, access: AccessMode) -> Result<PgTx, sqlx::Error> {
        let mut tx = self.pool.begin().await?;
        if access == AccessMode::ReadOnly {
            sqlx::query("SET TRANSACTION READ ONLY")
                .execute(&mut *tx)
                .await?;
        }
        Ok(tx)
    }

    async fn close(&self) {
        self.pool.close().await;
    }

    fn stats(&self) -> DbStats {
        let current = self.pool.size();
        let idle = u32::try_from(self.pool.num_idle()).unwrap_or(u32::MAX);
        DbStats {
            max_connections: self.pool.options().get_max_connections(),
            current_connections: current,
            available_connections: idle,
            acquired_connections: current.saturating_sub(idle),
            empty_acquire_count: self.counters.empty_acquire.load(Ordering::Relaxed),
            new_connections_total: self.counters.new_connections.load(Ordering::Relaxed),
            max_lifetime_destroy_total: self.counters.lifetime_destroys.load(Ordering::Relaxed),
            max_idle_destroy_total: self.counters.idle_destroys.load(Ordering::Relaxed),
        }
    }
}
