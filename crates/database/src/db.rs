use crate::connection::redacted_url;
use crate::error::DbError;
use crate::pool::{Connector, DbStats, PgConnector, PoolBackend};
use configuration::{DatabaseConfig, SecurityString};
use core_types::{State, StateMachine};
use std::future::Future;
use std::sync::{Arc, RwLock};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

/// The transaction type handed out by a connector's pools.
pub type TxOf<C> = <<C as Connector>::Pool as PoolBackend>::Transaction;

/// The connection type handed out by a connector's pools.
pub type ConnOf<C> = <<C as Connector>::Pool as PoolBackend>::Connection;

const COMPONENT_NAME: &str = "postgres_database";

/// Owns the connection pool and everything that runs alongside it.
///
/// `connect` and `shutdown` are guarded by a [`StateMachine`]: each runs at
/// most once, and a second `shutdown` is a silent no-op.
pub struct Database<C: Connector = PgConnector> {
    config: Arc<DatabaseConfig>,
    connector: C,
    state: StateMachine,
    pool: RwLock<Option<Arc<C::Pool>>>,
    tracker: TaskTracker,
    stop: CancellationToken,
}

impl Database<PgConnector> {
    /// A database backed by a real PostgreSQL pool. Nothing is dialled until
    /// [`connect`](Database::connect).
    pub fn new(config: DatabaseConfig) -> Self {
        Self::with_connector(config, PgConnector)
    }

    /// Creates a database and connects it straight away.
    pub async fn new_connected(config: DatabaseConfig) -> Result<Self, DbError> {
        let db = Self::new(config);
        db.connect().await?;
        Ok(db)
    }
}

impl<C: Connector> Database<C> {
    pub fn with_connector(config: DatabaseConfig, connector: C) -> Self {
        Self {
            config: Arc::new(config),
            connector,
            state: StateMachine::builder()
                .component_name(COMPONENT_NAME)
                .ignore_already_at_end(true)
                .build(),
            pool: RwLock::new(None),
            tracker: TaskTracker::new(),
            stop: CancellationToken::new(),
        }
    }

    pub fn config(&self) -> &DatabaseConfig {
        &self.config
    }

    /// Establishes the pool, retrying connectivity failures.
    ///
    /// Configuration errors end the attempt immediately. Connectivity errors
    /// are retried after `connection_retry_wait_time`, forever unless
    /// `connect_max_attempts` is set.
    pub async fn connect(&self) -> Result<(), DbError> {
        self.state.start(|| self.establish()).await?;
        Ok(())
    }

    async fn establish(&self) -> Result<(), DbError> {
        let cfg = &self.config;
        let mut attempt: u32 = 0;

        let pool = loop {
            attempt += 1;
            match self.connector.connect(cfg).await {
                Ok(pool) => break pool,
                Err(e) if e.is_configuration() => {
                    tracing::error!(error = %e, "invalid database configuration");
                    return Err(e);
                }
                Err(e) => {
                    if cfg.connect_max_attempts > 0 && attempt >= cfg.connect_max_attempts {
                        return Err(DbError::ConnectExhausted {
                            attempts: attempt,
                            source: Box::new(e),
                        });
                    }
                    tracing::error!(
                        error = %e,
                        attempt,
                        retry_in = ?cfg.retry_wait(),
                        "failed to connect to database, retrying"
                    );
                    tokio::time::sleep(cfg.retry_wait()).await;
                }
            }
        };

        let pool = Arc::new(pool);
        self.spawn_stats_reporter(pool.clone());
        *self.pool.write().unwrap_or_else(|e| e.into_inner()) = Some(pool);

        tracing::info!(
            url = %redacted_url(cfg),
            attempts = attempt,
            "connected to database"
        );
        Ok(())
    }

    fn spawn_stats_reporter(&self, pool: Arc<C::Pool>) {
        let interval = self.config.stats_interval;
        if interval.is_zero() {
            return;
        }
        let stop = self.stop.clone();
        let subsystem = self.config.subsystem.clone();

        self.tracker.spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = stop.cancelled() => break,
                    _ = ticker.tick() => {
                        let s = pool.stats();
                        tracing::debug!(
                            subsystem = %subsystem,
                            max = s.max_connections,
                            current = s.current_connections,
                            available = s.available_connections,
                            acquired = s.acquired_connections,
                            empty_acquire = s.empty_acquire_count,
                            new_connections = s.new_connections_total,
                            max_lifetime_destroy = s.max_lifetime_destroy_total,
                            max_idle_destroy = s.max_idle_destroy_total,
                            "connection pool stats"
                        );
                    }
                }
            }
            tracing::debug!(subsystem = %subsystem, "stats reporter stopped");
        });
    }

    /// Runs `work` in the background alongside the pool.
    ///
    /// `work` is handed the stop token. [`shutdown`](Self::shutdown) cancels
    /// it and waits for `work` to return before closing the pool.
    pub fn spawn_worker<F, Fut>(&self, work: F) -> tokio::task::JoinHandle<()>
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.tracker.spawn(work(self.stop.clone()))
    }

    /// Checks out one connection.
    ///
    /// A failed checkout is retried immediately, `connection_retries` times.
    pub async fn acquire(&self) -> Result<ConnOf<C>, DbError> {
        let pool = self.pool()?;
        let attempts = self.config.connection_retries.saturating_add(1);

        let mut attempt = 0;
        loop {
            attempt += 1;
            match pool.acquire().await {
                Ok(conn) => return Ok(conn),
                Err(source) if attempt >= attempts => {
                    return Err(DbError::Unavailable { attempts: attempt, source });
                }
                Err(e) => {
                    tracing::warn!(error = %e, attempt, "failed to acquire connection, retrying");
                }
            }
        }
    }

    /// Checks out a connection and hands it to `f`.
    pub async fn run<R, E, F, Fut>(&self, f: F) -> Result<R, E>
    where
        F: FnOnce(ConnOf<C>) -> Fut,
        Fut: Future<Output = Result<R, E>>,
        E: From<DbError>,
    {
        let conn = self.acquire().await?;
        f(conn).await
    }

    /// Stops background work, then closes the pool.
    ///
    /// Fails when called before `connect`. Repeated calls after a successful
    /// shutdown return `Ok` without doing anything.
    pub async fn shutdown(&self) -> Result<(), DbError> {
        self.state.shutdown(|| self.close()).await?;
        Ok(())
    }

    async fn close(&self) -> Result<(), DbError> {
        self.stop.cancel();
        self.tracker.close();

        let timeout = self.config.shutdown_timeout;
        if tokio::time::timeout(timeout, self.tracker.wait()).await.is_err() {
            tracing::error!(?timeout, "background workers did not stop in time");
            return Err(DbError::ShutdownTimeout(timeout));
        }

        let pool = self.pool.write().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(pool) = pool {
            pool.close().await;
        }
        tracing::info!("database connection pool closed");
        Ok(())
    }

    pub fn security_string(&self) -> SecurityString {
        self.config.security_string
    }

    /// A snapshot of pool activity. All zeroes while not connected.
    pub fn stats(&self) -> DbStats {
        self.pool().map(|p| p.stats()).unwrap_or_default()
    }

    pub async fn state(&self) -> State {
        self.state.current().await
    }

    pub(crate) fn pool(&self) -> Result<Arc<C::Pool>, DbError> {
        self.pool
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
            .ok_or(DbError::NotConnected)
    }
}

impl<C: Connector> std::fmt::Debug for Database<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("url", &redacted_url(&self.config))
            .field("connected", &self.pool().is_ok())
            .finish()
    }
}
